use crate::error::AnalysisError;

/// Seam for the article analysis backend.
///
/// The pipeline depends on this trait rather than on a concrete HTTP client so
/// the credential path can be swapped (remote API today, a server-held key or
/// a local model later) without touching pipeline logic. Tests substitute
/// stubs here.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    /// Produce the analysis text for one article.
    async fn analyze(&self, title: &str, content: &str) -> Result<String, AnalysisError>;
}

/// Build the single user-role prompt sent to the completion endpoint:
/// instruction, then title, then content, blank-line separated, in that order.
pub fn build_prompt(template: &str, title: &str, content: &str) -> String {
    format!("{template}\n\n{title}\n\n{content}")
}

pub mod remote;
