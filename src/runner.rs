//! Check cycles over every tracked page.
//!
//! Each page is checked in its own task. Fetches are bounded by a semaphore
//! shared by every cycle of the runner, and each page's transition runs under
//! a per-page lock so two overlapping cycles never race on one record.

use crate::errors::{CheckFailure, FailureKind, StoreError};
use crate::fetchers::{self, PageFetcher};
use crate::normalizer::Normalizer;
use crate::results::{CheckState, CycleReport, PageReport, TrackedPage, Transition};
use crate::store::PageStore;
use crate::tracker::{self, Observation};
use crate::utils;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

type LockRegistry = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// Drives fetch, normalize and compare across all tracked pages
pub struct BatchRunner<S: ?Sized, F: ?Sized> {
    store: Arc<S>,
    fetcher: Arc<F>,
    normalizer: Arc<Normalizer>,
    fetch_permits: Arc<Semaphore>,
    fetch_timeout: Duration,
    page_locks: LockRegistry,
}

impl<S: ?Sized, F: ?Sized> Clone for BatchRunner<S, F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            normalizer: Arc::clone(&self.normalizer),
            fetch_permits: Arc::clone(&self.fetch_permits),
            fetch_timeout: self.fetch_timeout,
            page_locks: Arc::clone(&self.page_locks),
        }
    }
}

impl<S, F> BatchRunner<S, F>
where
    S: PageStore + ?Sized + 'static,
    F: PageFetcher + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        fetcher: Arc<F>,
        normalizer: Arc<Normalizer>,
        max_concurrency: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            normalizer,
            fetch_permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            fetch_timeout,
            page_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check every tracked page once.
    ///
    /// Only a failure to list the pages fails the cycle; everything after that
    /// is reported per page.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let started_at = Utc::now();
        let pages = self.store.list().await?;
        ::log::info!("Starting check cycle over {} pages", pages.len());

        self.prune_locks().await;

        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();
        for page in pages {
            let runner = self.clone();
            let listed = page.clone();
            let handle = tasks.spawn(async move { runner.check_page(page).await });
            in_flight.insert(handle.id(), listed);
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Some(report))) => reports.push(report),
                Ok((_, None)) => {}
                Err(e) => {
                    let Some(listed) = in_flight.remove(&e.id()) else {
                        ::log::error!("Page check task failed: {}", e);
                        continue;
                    };
                    ::log::error!("Check of {} crashed: {}", listed.url, e);
                    let failure = CheckFailure::new(
                        FailureKind::Internal,
                        format!("check of {} crashed: {}", listed.url, e),
                    );
                    if let Some(report) = self.record_failure(listed, failure).await {
                        reports.push(report);
                    }
                }
            }
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            pages: reports,
        };
        ::log::info!(
            "Check cycle finished: {} pages, {} changed, {} failed in {} ms",
            report.pages.len(),
            report.changed().count(),
            report.failed().count(),
            (report.finished_at - report.started_at).num_milliseconds()
        );

        Ok(report)
    }

    /// Run one page's transition under its lock. `None` if the page was removed meanwhile.
    async fn check_page(&self, listed: TrackedPage) -> Option<PageReport> {
        let lock = self.lock_for(listed.id).await;
        let _guard = lock.lock().await;

        // An overlapping cycle may have moved the record on while we waited
        let page = match self.reread(listed).await {
            Ok(page) => page,
            Err(report) => return report,
        };
        let observation = self.observe(&page).await;
        let (state, transition) = compare(&page, observation).await;
        self.record(page, state, transition).await
    }

    /// Record a failed check for a page whose task died before recording anything
    async fn record_failure(&self, listed: TrackedPage, failure: CheckFailure) -> Option<PageReport> {
        let lock = self.lock_for(listed.id).await;
        let _guard = lock.lock().await;

        let page = match self.reread(listed).await {
            Ok(page) => page,
            Err(report) => return report,
        };
        let (state, transition) =
            tracker::transition(&page, Observation::Failed(failure), Utc::now());
        self.record(page, state, transition).await
    }

    /// Current stored record. `Err` carries the report to hand back instead, if any.
    async fn reread(&self, listed: TrackedPage) -> Result<TrackedPage, Option<PageReport>> {
        match self.store.get(listed.id).await {
            Ok(Some(page)) => Ok(page),
            Ok(None) => {
                ::log::debug!("Page {} was removed before it was checked", listed.id);
                Err(None)
            }
            Err(e) => {
                ::log::error!("Failed to read page {}: {}", listed.id, e);
                Err(Some(storage_failure(listed, &e)))
            }
        }
    }

    async fn record(
        &self,
        page: TrackedPage,
        state: CheckState,
        transition: Transition,
    ) -> Option<PageReport> {
        match &transition {
            Transition::Baseline => {
                ::log::debug!("Recorded baseline for {} ({})", page.display_name, page.url)
            }
            Transition::Unchanged => ::log::debug!("No change on {}", page.url),
            Transition::Changed { blocks } => ::log::info!(
                "Content changed on {} ({}): {} blocks",
                page.display_name,
                page.url,
                blocks
            ),
            Transition::Failed(failure) => {
                ::log::warn!("Check failed for {}: {}", page.url, failure)
            }
        }

        match self.store.record_check(page.id, state).await {
            Ok(updated) => Some(PageReport {
                page: updated,
                transition,
            }),
            Err(StoreError::NotFound(id)) => {
                ::log::debug!("Page {} was removed while it was being checked", id);
                None
            }
            Err(e) => {
                ::log::error!("Failed to record check for {}: {}", page.url, e);
                Some(storage_failure(page, &e))
            }
        }
    }

    /// Fetch and normalize the page's current content
    async fn observe(&self, page: &TrackedPage) -> Observation {
        let url = match fetchers::validate_url(&page.url) {
            Ok(url) => url,
            Err(e) => return Observation::Failed(CheckFailure::from(e)),
        };

        let fetched = {
            let _permit = match self.fetch_permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return Observation::Failed(CheckFailure::new(
                        FailureKind::NetworkError,
                        "fetch pool is closed",
                    ));
                }
            };
            fetchers::fetch_with_timeout(self.fetcher.as_ref(), &url, self.fetch_timeout).await
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => return Observation::Failed(CheckFailure::from(e)),
        };
        ::log::trace!(
            "Fetched {} bytes from {}: {}",
            fetched.body.len(),
            fetched.final_url,
            utils::preview(&fetched.body, 80)
        );

        // Parsing is CPU-bound and may panic on pathological input
        let normalizer = Arc::clone(&self.normalizer);
        match tokio::task::spawn_blocking(move || normalizer.normalize(&fetched.body)).await {
            Ok(canonical) => Observation::Fetched(canonical),
            Err(e) => Observation::Failed(CheckFailure::new(
                FailureKind::ParseFailure,
                format!("normalization of {} failed: {}", page.url, e),
            )),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.page_locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    /// Drop lock entries no running check holds
    async fn prune_locks(&self) {
        let mut locks = self.page_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Compute the page's transition off the runtime threads; diffing is CPU-bound
async fn compare(page: &TrackedPage, observation: Observation) -> (CheckState, Transition) {
    let current = page.clone();
    let compared =
        tokio::task::spawn_blocking(move || tracker::transition(&current, observation, Utc::now()))
            .await;

    compared.unwrap_or_else(|e| {
        let failure = CheckFailure::new(
            FailureKind::Internal,
            format!("comparison of {} failed: {}", page.url, e),
        );
        tracker::transition(page, Observation::Failed(failure), Utc::now())
    })
}

fn storage_failure(page: TrackedPage, error: &StoreError) -> PageReport {
    PageReport {
        page,
        transition: Transition::Failed(CheckFailure::new(
            FailureKind::StorageError,
            error.to_string(),
        )),
    }
}
