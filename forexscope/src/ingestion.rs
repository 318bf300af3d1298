use reqwest::Client;
use std::time::Duration;

use crate::error::FeedFetchError;

/// Fixed identity presented to upstream feed servers.
pub const FEED_USER_AGENT: &str = "Mozilla/5.0 (compatible; ForexNewsBot/1.0)";

/// Media types we are willing to accept, in preference order.
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/xml, application/atom+xml, text/xml;q=0.9, */*;q=0.8";

/// Fetches the raw body of a feed from the given URL.
///
/// Enforces a timeout and a fixed User-Agent / Accept header pair. Any
/// non-success status or network failure is an error; there is no retry, the
/// caller decides whether and when to run again.
///
/// Returns the upstream bytes untouched: the relay must pass them through
/// without transcoding (the document's XML declaration may name a non-UTF-8
/// charset), so any decoding is left to the consumer.
pub async fn fetch_feed(url: &str, timeout_secs: u64) -> Result<Vec<u8>, FeedFetchError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(FEED_USER_AGENT)
        .build()?;

    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, FEED_ACCEPT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedFetchError::Status(status));
    }

    let body = response.bytes().await?;
    Ok(body.to_vec())
}
