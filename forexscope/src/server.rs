use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, put, routes, Build, Rocket, State};
use serde::Serialize;

use common::{Config, Settings, SettingsPatch, SettingsStore};

use crate::error::PipelineError;
use crate::ingestion;
use crate::llm::remote::RemoteAnalyzer;
use crate::pipeline::{NewsState, Phase, Pipeline};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub config: Arc<Config>,
    pub settings: Arc<SettingsStore>,
    pub pipeline: Arc<Pipeline>,
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    phase: Phase,
    article_count: usize,
    generation: u64,
    credential_configured: bool,
}

/// Build the concrete analyzer for one pipeline invocation from the settings
/// snapshot it will run with.
pub fn build_analyzer(config: &Config, settings: &Settings) -> RemoteAnalyzer {
    RemoteAnalyzer::new(config.llm_api_url(), settings)
        .with_timeout(config.llm_timeout_seconds())
}

/// Spawn a full pipeline run in the background. Used at startup, by the
/// manual refresh endpoint, and whenever the settings change materially.
/// Failures are recorded in the pipeline state and logged here.
pub fn spawn_pipeline_run(pipeline: Arc<Pipeline>, config: Arc<Config>, settings: Settings) {
    tokio::spawn(async move {
        let analyzer = build_analyzer(&config, &settings);
        if let Err(e) = pipeline.run(&settings, &analyzer).await {
            tracing::error!("pipeline run failed: {}", e);
        }
    });
}

fn error_body(error: &str, details: Option<String>) -> Json<serde_json::Value> {
    match details {
        Some(details) => Json(serde_json::json!({ "error": error, "details": details })),
        None => Json(serde_json::json!({ "error": error })),
    }
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Status endpoint returning simple JSON with uptime and pipeline info.
#[get("/api/v1/status")]
async fn status(state: &State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    let uptime = (now - state.started_at).num_seconds();
    let news = state.pipeline.view().await;
    let settings = state.settings.snapshot().await;

    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        phase: news.phase,
        article_count: news.articles.len(),
        generation: news.generation,
        credential_configured: !settings.api_key.is_empty(),
    })
}

/// Feed relay: fetch an arbitrary feed URL on behalf of a client that cannot
/// make the cross-origin request itself, and pass the body through untouched.
#[get("/api/feed?<url>")]
async fn relay_feed(
    state: &State<AppState>,
    url: Option<String>,
) -> Custom<(ContentType, Vec<u8>)> {
    let raw_url = match url {
        Some(u) => u,
        None => {
            return Custom(
                Status::BadRequest,
                (
                    ContentType::JSON,
                    serde_json::json!({ "error": "URL parameter is required" })
                        .to_string()
                        .into_bytes(),
                ),
            )
        }
    };

    if url::Url::parse(&raw_url).is_err() {
        return Custom(
            Status::BadRequest,
            (
                ContentType::JSON,
                serde_json::json!({ "error": "URL parameter must be a valid absolute URL" })
                    .to_string()
                    .into_bytes(),
            ),
        );
    }

    match ingestion::fetch_feed(&raw_url, state.config.fetch_timeout_seconds()).await {
        // Upstream bytes pass through untranscoded: the body may carry a
        // non-UTF-8 charset named in its XML declaration. Rocket's
        // ContentType::XML is text/xml; the relay contract is application/xml.
        Ok(body) => Custom(Status::Ok, (ContentType::new("application", "xml"), body)),
        Err(e) => {
            tracing::error!(url = %raw_url, "relay fetch failed: {}", e);
            Custom(
                Status::InternalServerError,
                (
                    ContentType::JSON,
                    serde_json::json!({
                        "error": "Failed to fetch RSS feed",
                        "details": e.to_string(),
                    })
                    .to_string()
                    .into_bytes(),
                ),
            )
        }
    }
}

/// Current pipeline state: phase, error, article list, refresh set.
#[get("/api/v1/news")]
async fn get_news(state: &State<AppState>) -> Json<NewsState> {
    Json(state.pipeline.view().await)
}

/// Trigger a full pipeline run in the background.
#[post("/api/v1/news/refresh")]
async fn trigger_run(state: &State<AppState>) -> Status {
    let settings = state.settings.snapshot().await;
    spawn_pipeline_run(state.pipeline.clone(), state.config.clone(), settings);
    Status::Accepted
}

/// Re-analyze a single article in place, awaited. Other articles and the feed
/// itself are untouched.
#[post("/api/v1/news/<index>/refresh")]
async fn refresh_article(
    state: &State<AppState>,
    index: usize,
) -> Result<Json<crate::pipeline::Article>, Custom<Json<serde_json::Value>>> {
    let settings = state.settings.snapshot().await;
    let analyzer = build_analyzer(&state.config, &settings);

    match state.pipeline.refresh_one(index, &settings, &analyzer).await {
        Ok(article) => Ok(Json(article)),
        Err(e @ PipelineError::MissingCredential) => Err(Custom(
            Status::BadRequest,
            error_body(&e.to_string(), None),
        )),
        Err(PipelineError::UnknownArticle(_)) => Err(Custom(
            Status::NotFound,
            error_body("No such article", None),
        )),
        Err(e) => Err(Custom(
            Status::BadGateway,
            error_body("Failed to analyze article", Some(e.to_string())),
        )),
    }
}

/// Current settings snapshot (the editor round-trips all four fields).
#[get("/api/v1/settings")]
async fn get_settings(state: &State<AppState>) -> Json<Settings> {
    Json(state.settings.snapshot().await)
}

/// Persist a partial settings update. A material change to any of the four
/// fields re-triggers a pipeline run; the re-run lives here in the caller,
/// not in the pipeline itself.
#[put("/api/v1/settings", data = "<body>")]
async fn put_settings(
    state: &State<AppState>,
    body: Json<SettingsPatch>,
) -> Result<Json<Settings>, Status> {
    let before = state.settings.snapshot().await;
    let after = state.settings.update(body.into_inner()).await.map_err(|e| {
        tracing::error!("failed to persist settings: {}", e);
        Status::InternalServerError
    })?;

    if after != before {
        tracing::info!("settings changed; re-running pipeline");
        spawn_pipeline_run(
            state.pipeline.clone(),
            state.config.clone(),
            after.clone(),
        );
    }

    Ok(Json(after))
}

/// Build the Rocket instance with managed state and all routes mounted,
/// applying server.bind and server.port from the application config.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let fig = rocket::Config::figment()
        .merge(("address", state.config.bind()))
        .merge(("port", state.config.port()));

    rocket::custom(fig).manage(state).mount(
        "/",
        routes![
            health,
            status,
            relay_feed,
            get_news,
            trigger_run,
            refresh_article,
            get_settings,
            put_settings,
        ],
    )
}

/// Launch the Rocket server. Blocks until Rocket shuts down and returns an
/// error if it fails to start.
pub async fn launch_rocket(state: AppState) -> Result<()> {
    tracing::info!("Starting Rocket HTTP server");
    build_rocket(state)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
