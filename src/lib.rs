pub mod config;
pub mod diff;
pub mod errors;
pub mod fetchers;
pub mod filter;
pub mod normalizer;
pub mod results;
pub mod runner;
pub mod store;
pub mod summary;
pub mod tracker;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::MonitorConfig;
pub use diff::{BlockKind, DiffBlock};
pub use errors::{CheckFailure, ConfigError, FailureKind, FetchError, StoreError};
pub use fetchers::{HttpFetcher, PageFetcher};
pub use normalizer::Normalizer;
pub use results::{CycleReport, PageReport, TrackedPage, Transition};
pub use store::{JsonFileStore, MemoryStore, PageStore};
pub use summary::SummaryRequest;

use runner::BatchRunner;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Main entry point: tracked pages, how to fetch them, and how to compare them
pub struct Monitor<S: ?Sized, F: ?Sized> {
    store: Arc<S>,
    fetcher: Arc<F>,
    normalizer: Arc<Normalizer>,
    max_concurrency: usize,
    fetch_timeout: Duration,
    runner: BatchRunner<S, F>,
}

impl<S, F> Monitor<S, F>
where
    S: PageStore + ?Sized + 'static,
    F: PageFetcher + ?Sized + 'static,
{
    /// Create a monitor with the default configuration
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        let defaults = MonitorConfig::default();
        let normalizer = Arc::new(Normalizer::default());
        let fetch_timeout = Duration::from_secs(defaults.fetch_timeout_secs);
        let runner = BatchRunner::new(
            Arc::clone(&store),
            Arc::clone(&fetcher),
            Arc::clone(&normalizer),
            defaults.max_concurrency,
            fetch_timeout,
        );

        Self {
            store,
            fetcher,
            normalizer,
            max_concurrency: defaults.max_concurrency,
            fetch_timeout,
            runner,
        }
    }

    /// Set the maximum number of fetches in flight
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self.rebuild_runner()
    }

    /// Set the per-fetch timeout
    pub fn with_fetch_timeout(mut self, timeout_seconds: u64) -> Self {
        self.fetch_timeout = Duration::from_secs(timeout_seconds);
        self.rebuild_runner()
    }

    /// Replace the normalization pipeline
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self.rebuild_runner()
    }

    /// Apply concurrency, timeout and normalizer settings from a configuration
    pub fn with_config(self, config: &MonitorConfig) -> Result<Self, ConfigError> {
        let normalizer = Normalizer::from_config(&config.normalizer)?;
        Ok(self
            .with_normalizer(normalizer)
            .with_max_concurrency(config.max_concurrency)
            .with_fetch_timeout(config.fetch_timeout_secs))
    }

    /// Load configuration from a file
    pub fn with_config_file(self, path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = MonitorConfig::from_file(path)?;
        self.with_config(&config)
    }

    fn rebuild_runner(mut self) -> Self {
        self.runner = BatchRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.normalizer),
            self.max_concurrency,
            self.fetch_timeout,
        );
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Start tracking a page.
    ///
    /// The URL is stored as given; one that cannot be fetched is reported as
    /// `InvalidUrl` by every check cycle. Without a display name one is derived
    /// from the URL's host.
    pub async fn register(
        &self,
        url: &str,
        display_name: Option<&str>,
    ) -> Result<TrackedPage, StoreError> {
        let display_name = match display_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => utils::display_name_from_url(url),
        };
        let page = TrackedPage::new(url, display_name);

        self.store.insert(page.clone()).await?;
        ::log::info!("Tracking {} as {:?} ({})", page.url, page.display_name, page.id);
        Ok(page)
    }

    /// Stop tracking a page
    pub async fn remove(&self, id: Uuid) -> Result<TrackedPage, StoreError> {
        let removed = self.store.remove(id).await?.ok_or(StoreError::NotFound(id))?;
        ::log::info!("Stopped tracking {} ({})", removed.url, id);
        Ok(removed)
    }

    pub async fn pages(&self) -> Result<Vec<TrackedPage>, StoreError> {
        self.store.list().await
    }

    /// Check every tracked page once and report what happened to each
    pub async fn run_check_cycle(&self) -> Result<CycleReport, StoreError> {
        self.runner.run_cycle().await
    }
}
