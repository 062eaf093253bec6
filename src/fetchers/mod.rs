pub mod fetcher;
pub mod http;

pub use fetcher::{FetchedPage, PageFetcher};
pub use http::HttpFetcher;

use crate::errors::FetchError;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Parse a stored URL and check that it can be fetched over HTTP
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Fetch `url`, giving up after `limit` even if the fetcher itself never does
pub async fn fetch_with_timeout<F>(
    fetcher: &F,
    url: &Url,
    limit: Duration,
) -> Result<FetchedPage, FetchError>
where
    F: PageFetcher + ?Sized,
{
    match timeout(limit, fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            after: limit,
        }),
    }
}
