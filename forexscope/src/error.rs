use thiserror::Error;

/// Relay / outbound feed fetch failures. These abort a whole pipeline run.
#[derive(Debug, Error)]
pub enum FeedFetchError {
    #[error("feed fetch failed with status: {0}")]
    Status(reqwest::StatusCode),
    #[error("network error during fetch: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Feed document rejection. A malformed document is not partially recovered.
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("malformed feed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document is neither an RSS nor an Atom feed")]
    UnrecognizedFormat,
}

/// Chat-completion call failures. Absorbed during a full run (the article gets
/// the fallback text), surfaced directly by a single-article refresh.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("completion API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion request timed out after {0}s")]
    Timeout(u64),
    #[error("failed to decode completion response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Errors surfaced by the article pipeline to its caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no API key configured; set one in the settings")]
    MissingCredential,
    #[error("failed to fetch RSS feed: {0}")]
    FeedFetch(#[from] FeedFetchError),
    #[error("failed to parse feed: {0}")]
    FeedParse(#[from] FeedParseError),
    #[error("failed to analyze article: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("no article at index {0}")]
    UnknownArticle(usize),
}
