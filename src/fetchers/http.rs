use super::fetcher::{FetchedPage, PageFetcher};
use crate::config::MonitorConfig;
use crate::errors::FetchError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::error::Error as _;
use std::time::Duration;
use url::Url;

/// Redirects followed before a fetch is treated as a network error
const MAX_REDIRECTS: usize = 5;

/// HTTP GET over a pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a client from the monitor configuration
    pub fn new(config: &MonitorConfig) -> Result<Self, reqwest::Error> {
        let client = Self::client_builder(config).build()?;
        Ok(Self::with_client(
            client,
            Duration::from_secs(config.fetch_timeout_secs),
        ))
    }

    /// Use an existing client. `timeout` is only used to describe timeouts the client reports.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Client settings derived from the configuration
    pub fn client_builder(config: &MonitorConfig) -> reqwest::ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
    }

    fn classify(&self, url: &Url, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            };
        }

        // reqwest's own message rarely names the root cause
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        FetchError::Network {
            url: url.to_string(),
            message,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        ::log::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NonSuccessStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        if &final_url != url {
            ::log::debug!("{} redirected to {}", url, final_url);
        }

        let body = response.text().await.map_err(|e| self.classify(url, e))?;

        Ok(FetchedPage {
            body,
            final_url,
            status: status.as_u16(),
        })
    }
}
