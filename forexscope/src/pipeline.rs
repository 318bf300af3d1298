use std::collections::BTreeSet;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use common::Settings;

use crate::error::PipelineError;
use crate::feed::{self, RawEntry};
use crate::ingestion;
use crate::llm::Analyzer;

/// Number of feed entries analyzed per run, taken from the front of the feed.
pub const MAX_ARTICLES: usize = 5;

/// Analysis text substituted when a per-article analysis call fails during a
/// full run.
pub const ANALYSIS_FALLBACK: &str = "Error analyzing this article";

/// One analyzed (or about-to-be-analyzed) feed article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    /// Plain-text body used as LLM input and shown to the user.
    pub content: String,
    /// Original feed date text, kept verbatim.
    pub published_at: String,
    pub author: Option<String>,
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Fetching,
    Parsing,
    Analyzing,
    Ready,
    Failed,
}

/// User-visible error recorded in the shared state.
#[derive(Debug, Clone, Serialize)]
pub struct StateError {
    pub kind: &'static str,
    pub message: String,
}

/// Shared pipeline state as seen by the presentation layer.
///
/// `generation` is bumped every time a completed run publishes its list; a
/// single-article refresh that raced against a newer run compares generations
/// and discards its result instead of writing into the new list.
#[derive(Debug, Clone, Serialize)]
pub struct NewsState {
    pub phase: Phase,
    pub error: Option<StateError>,
    pub articles: Vec<Article>,
    pub generation: u64,
    pub refreshing: BTreeSet<usize>,
}

impl Default for NewsState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            error: None,
            articles: Vec::new(),
            generation: 0,
            refreshing: BTreeSet::new(),
        }
    }
}

/// Fetch → parse → fan-out-analyze orchestrator.
///
/// All state mutation happens in short critical sections that never span an
/// I/O call. Overlapping runs are not deduplicated or cancelled: whichever
/// run publishes later supersedes the earlier list.
pub struct Pipeline {
    state: RwLock<NewsState>,
    fetch_timeout_secs: u64,
}

impl Pipeline {
    pub fn new(fetch_timeout_secs: u64) -> Self {
        Self {
            state: RwLock::new(NewsState::default()),
            fetch_timeout_secs,
        }
    }

    /// Cloned view of the current state.
    pub async fn view(&self) -> NewsState {
        self.state.read().await.clone()
    }

    async fn fail(&self, kind: &'static str, err: &PipelineError) {
        let mut state = self.state.write().await;
        state.phase = Phase::Failed;
        state.error = Some(StateError {
            kind,
            message: err.to_string(),
        });
    }

    /// Run the whole pipeline: fetch the configured feed, parse it, analyze
    /// the first [`MAX_ARTICLES`] entries concurrently, and publish the
    /// resulting list atomically.
    ///
    /// Fetch and parse failures abort the run with no partial result. An
    /// individual analysis failure does not: that article gets
    /// [`ANALYSIS_FALLBACK`] and the run proceeds.
    pub async fn run(
        &self,
        settings: &Settings,
        analyzer: &dyn Analyzer,
    ) -> Result<Vec<Article>, PipelineError> {
        if settings.api_key.is_empty() {
            let err = PipelineError::MissingCredential;
            let mut state = self.state.write().await;
            state.error = Some(StateError {
                kind: "missing_credential",
                message: err.to_string(),
            });
            return Err(err);
        }

        {
            let mut state = self.state.write().await;
            state.phase = Phase::Fetching;
            state.error = None;
        }

        let body = match ingestion::fetch_feed(&settings.feed_url, self.fetch_timeout_secs).await {
            Ok(body) => body,
            Err(e) => {
                error!(url = %settings.feed_url, "feed fetch failed: {}", e);
                let err = PipelineError::FeedFetch(e);
                self.fail("feed_fetch", &err).await;
                return Err(err);
            }
        };

        {
            let mut state = self.state.write().await;
            state.phase = Phase::Parsing;
        }

        // The fetch hands back raw bytes; decoding happens only here, at the
        // parse boundary.
        let text = String::from_utf8_lossy(&body);
        let entries = match feed::parse(&text) {
            Ok(entries) => entries,
            Err(e) => {
                error!(url = %settings.feed_url, "feed parse failed: {}", e);
                let err = PipelineError::FeedParse(e);
                self.fail("feed_parse", &err).await;
                return Err(err);
            }
        };

        let mut articles: Vec<Article> = entries
            .into_iter()
            .take(MAX_ARTICLES)
            .map(entry_to_article)
            .collect();

        {
            let mut state = self.state.write().await;
            state.phase = Phase::Analyzing;
        }

        // Fan-out: one independent analysis per article, joined regardless of
        // individual outcome so one bad upstream call cannot sink the rest.
        let outcomes = join_all(
            articles
                .iter()
                .map(|a| analyzer.analyze(&a.title, &a.content)),
        )
        .await;

        for (article, outcome) in articles.iter_mut().zip(outcomes) {
            article.analysis = Some(match outcome {
                Ok(text) => text,
                Err(e) => {
                    warn!(title = %article.title, "article analysis failed: {}", e);
                    ANALYSIS_FALLBACK.to_string()
                }
            });
        }

        let mut state = self.state.write().await;
        state.articles = articles.clone();
        state.phase = Phase::Ready;
        state.error = None;
        state.generation += 1;
        state.refreshing.clear();
        info!(
            count = articles.len(),
            generation = state.generation,
            "pipeline run published"
        );

        Ok(articles)
    }

    /// Re-run the analysis for one article in the current list, leaving the
    /// relay, the parser and every other article untouched.
    ///
    /// On failure the stored analysis keeps its previous value: a failed
    /// refresh must not destroy an earlier successful one. A result that
    /// lands after a newer run has published its list is discarded.
    pub async fn refresh_one(
        &self,
        index: usize,
        settings: &Settings,
        analyzer: &dyn Analyzer,
    ) -> Result<Article, PipelineError> {
        if settings.api_key.is_empty() {
            return Err(PipelineError::MissingCredential);
        }

        let (mut article, generation) = {
            let mut state = self.state.write().await;
            let article = state
                .articles
                .get(index)
                .cloned()
                .ok_or(PipelineError::UnknownArticle(index))?;
            state.refreshing.insert(index);
            (article, state.generation)
        };

        let outcome = analyzer.analyze(&article.title, &article.content).await;

        let mut state = self.state.write().await;
        state.refreshing.remove(&index);
        match outcome {
            Ok(text) => {
                article.analysis = Some(text.clone());
                if state.generation == generation {
                    if let Some(live) = state.articles.get_mut(index) {
                        live.analysis = Some(text);
                    }
                } else {
                    info!(index, "discarding stale refresh result from superseded list");
                }
                Ok(article)
            }
            Err(e) => {
                warn!(index, "article refresh failed: {}", e);
                Err(PipelineError::Analysis(e))
            }
        }
    }
}

fn entry_to_article(entry: RawEntry) -> Article {
    // Prefer the full-content field, fall back to the short summary
    let raw = entry.content.or(entry.summary).unwrap_or_default();
    Article {
        title: entry.title.unwrap_or_default(),
        link: entry.link.unwrap_or_default(),
        content: plain_text(&raw),
        published_at: entry.pub_date.unwrap_or_default(),
        author: entry.creator,
        analysis: None,
    }
}

/// Render an HTML fragment as plain text for LLM input and display.
fn plain_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 80) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("failed to convert entry HTML to text: {}", e);
            html.trim().to_string()
        }
    }
}
