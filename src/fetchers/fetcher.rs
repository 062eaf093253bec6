use crate::errors::FetchError;
use async_trait::async_trait;
use url::Url;

/// A successful retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Response body decoded as text
    pub body: String,

    /// URL after redirects
    pub final_url: Url,

    pub status: u16,
}

/// Retrieves raw page content.
///
/// Implementations own their transport (connection pool, headers) and are
/// shared across all tasks of a check cycle.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a validated absolute `http`/`https` URL
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}
