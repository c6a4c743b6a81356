//! Bounded-concurrency fetch/persist driver.
//!
//! The driver owns the work list and the concurrency cap; fetchers return
//! values and never touch storage, sinks upsert one item's terminal outcome.
//! Each completed fetch is persisted immediately so partial progress
//! survives a crash, and no item's failure aborts its siblings.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{FetchError, PersistError};
use crate::retry::RetryPolicy;

/// What the remote source reported for one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus<P> {
    Found(P),
    NotFound,
}

/// Terminal fetch result handed to the sink once retries are exhausted.
#[derive(Debug)]
pub enum FetchOutcome<P> {
    Found(P),
    NotFound,
    Failed(FetchError),
}

/// One outbound lookup per work item. Implementations must not write to
/// storage; the driver hands results to the sink.
#[async_trait]
pub trait Fetcher: Send + Sync {
    type Item: Display + Send + Sync;
    type Payload: Send + Sync;

    async fn fetch(&self, item: &Self::Item) -> Result<FetchStatus<Self::Payload>, FetchError>;
}

/// Upserts one item's terminal outcome. Must be idempotent: persisting the
/// same outcome twice leaves the row in the same state.
#[async_trait]
pub trait Sink<I, P>: Send + Sync {
    async fn persist(&self, item: &I, outcome: &FetchOutcome<P>) -> Result<(), PersistError>;
}

/// Terminal state of one scheduled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    NotFound,
    Failed,
    NotPersisted,
}

impl ItemOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemOutcome::Succeeded => "succeeded",
            ItemOutcome::NotFound => "not-found",
            ItemOutcome::Failed => "failed",
            ItemOutcome::NotPersisted => "not-persisted",
        }
    }
}

/// Aggregate counts reported when a run drains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
    pub not_persisted: usize,
    pub elapsed: Duration,
}

pub struct Pipeline<F, S> {
    fetcher: Arc<F>,
    sink: Arc<S>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl<F, S> Pipeline<F, S>
where
    F: Fetcher,
    S: Sink<F::Item, F::Payload>,
{
    pub fn new(fetcher: F, sink: S, concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            sink: Arc::new(sink),
            concurrency,
            retry,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Drive the full work list to completion: schedule every item against
    /// the shared cap, persist each result as it lands, wait for all
    /// scheduled units, and report per-outcome counts plus elapsed wall time.
    pub async fn run(&self, items: Vec<F::Item>) -> RunSummary {
        let started = Instant::now();
        let total = items.len();
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        if items.is_empty() {
            info!("work list is empty; nothing to do");
            summary.elapsed = started.elapsed();
            return summary;
        }

        let sem = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut units: FuturesUnordered<_> = items
            .into_iter()
            .map(|item| {
                let sem = Arc::clone(&sem);
                let fetcher = Arc::clone(&self.fetcher);
                let sink = Arc::clone(&self.sink);
                let retry = self.retry;
                async move {
                    // The permit covers only the network call; it is dropped
                    // on every exit path before the database round-trip.
                    let outcome = {
                        let _permit = sem.acquire_owned().await.expect("semaphore closed");
                        fetch_with_retry(fetcher.as_ref(), &item, retry).await
                    };
                    let result = match sink.persist(&item, &outcome).await {
                        Ok(()) => match &outcome {
                            FetchOutcome::Found(_) => ItemOutcome::Succeeded,
                            FetchOutcome::NotFound => ItemOutcome::NotFound,
                            FetchOutcome::Failed(_) => ItemOutcome::Failed,
                        },
                        Err(err) => {
                            warn!(item = %item, error = %err, "persist failed");
                            ItemOutcome::NotPersisted
                        }
                    };
                    (item, result)
                }
            })
            .collect();

        let mut completed = 0usize;
        while let Some((item, result)) = units.next().await {
            completed += 1;
            match result {
                ItemOutcome::Succeeded => summary.succeeded += 1,
                ItemOutcome::NotFound => summary.not_found += 1,
                ItemOutcome::Failed => summary.failed += 1,
                ItemOutcome::NotPersisted => summary.not_persisted += 1,
            }
            info!(
                item = %item,
                outcome = result.as_str(),
                completed,
                total,
                "item finished"
            );
        }

        summary.elapsed = started.elapsed();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            not_found = summary.not_found,
            failed = summary.failed,
            not_persisted = summary.not_persisted,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );
        summary
    }
}

async fn fetch_with_retry<F: Fetcher>(
    fetcher: &F,
    item: &F::Item,
    policy: RetryPolicy,
) -> FetchOutcome<F::Payload> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match fetcher.fetch(item).await {
            Ok(FetchStatus::Found(payload)) => return FetchOutcome::Found(payload),
            Ok(FetchStatus::NotFound) => return FetchOutcome::NotFound,
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    item = %item,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "fetch failed; retrying"
                );
                sleep(policy.delay_for(attempt)).await;
            }
            Err(err) => return FetchOutcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone)]
    enum Step {
        Found(&'static str),
        NotFound,
        Transport,
        Rejected,
    }

    /// Replays a per-item script of responses; the last step repeats once the
    /// script is exhausted.
    struct ScriptedFetcher {
        scripts: HashMap<String, Vec<Step>>,
        attempts: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedFetcher {
        fn new(scripts: Vec<(&str, Vec<Step>)>) -> Self {
            Self {
                scripts: scripts
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                attempts: Mutex::new(HashMap::new()),
            }
        }

        fn attempts_for(&self, item: &str) -> u32 {
            self.attempts.lock().unwrap().get(item).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        type Item = String;
        type Payload = String;

        async fn fetch(&self, item: &String) -> Result<FetchStatus<String>, FetchError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let counter = attempts.entry(item.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            let script = self.scripts.get(item).expect("unscripted item");
            let step = script
                .get((attempt - 1) as usize)
                .unwrap_or_else(|| script.last().expect("empty script"));
            match step {
                Step::Found(payload) => Ok(FetchStatus::Found(payload.to_string())),
                Step::NotFound => Ok(FetchStatus::NotFound),
                Step::Transport => Err(FetchError::Transport("simulated timeout".into())),
                Step::Rejected => Err(FetchError::Rejected {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }),
            }
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Row {
        value: Option<String>,
        status: String,
    }

    /// In-memory stand-in for a keyed table with upsert-merge semantics:
    /// found outcomes set the value, negative outcomes only touch the status.
    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<HashMap<String, Row>>,
        fail_on: Option<String>,
    }

    impl MemorySink {
        fn snapshot(&self) -> HashMap<String, Row> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sink<String, String> for MemorySink {
        async fn persist(
            &self,
            item: &String,
            outcome: &FetchOutcome<String>,
        ) -> Result<(), PersistError> {
            if self.fail_on.as_deref() == Some(item.as_str()) {
                return Err(PersistError(sqlx::Error::PoolClosed));
            }
            let mut rows = self.rows.lock().unwrap();
            let row = rows.entry(item.clone()).or_default();
            match outcome {
                FetchOutcome::Found(payload) => {
                    row.value = Some(payload.clone());
                    row.status = "done".into();
                }
                FetchOutcome::NotFound => row.status = "not found".into(),
                FetchOutcome::Failed(_) => row.status = "failed".into(),
            }
            Ok(())
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            multiplier: 2,
        }
    }

    #[tokio::test]
    async fn empty_work_list_reports_zero_counts() {
        let pipeline = Pipeline::new(
            ScriptedFetcher::new(vec![]),
            MemorySink::default(),
            5,
            quick_retry(),
        );
        let summary = pipeline.run(Vec::new()).await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.not_found, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.not_persisted, 0);
        assert!(pipeline.sink().snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_timeout_does_not_abort_siblings() {
        let pipeline = Pipeline::new(
            ScriptedFetcher::new(vec![
                ("x", vec![Step::Transport]),
                ("y", vec![Step::Found("payload-y")]),
            ]),
            MemorySink::default(),
            2,
            quick_retry(),
        );
        let summary = pipeline.run(vec!["x".into(), "y".into()]).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let rows = pipeline.sink().snapshot();
        assert_eq!(rows["y"].value.as_deref(), Some("payload-y"));
        assert_eq!(rows["y"].status, "done");
        assert_eq!(rows["x"].value, None);
        assert_eq!(rows["x"].status, "failed");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_to_success() {
        let pipeline = Pipeline::new(
            ScriptedFetcher::new(vec![(
                "flaky",
                vec![Step::Transport, Step::Transport, Step::Found("third time")],
            )]),
            MemorySink::default(),
            1,
            quick_retry(),
        );
        let summary = pipeline.run(vec!["flaky".into()]).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(pipeline.fetcher.attempts_for("flaky"), 3);
        assert_eq!(
            pipeline.sink().snapshot()["flaky"].value.as_deref(),
            Some("third time")
        );
    }

    #[tokio::test]
    async fn rejection_is_terminal_on_first_attempt() {
        let pipeline = Pipeline::new(
            ScriptedFetcher::new(vec![("denied", vec![Step::Rejected])]),
            MemorySink::default(),
            1,
            quick_retry(),
        );
        let summary = pipeline.run(vec!["denied".into()]).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(pipeline.fetcher.attempts_for("denied"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_is_counted_not_fatal() {
        let sink = MemorySink {
            fail_on: Some("bad".into()),
            ..MemorySink::default()
        };
        let pipeline = Pipeline::new(
            ScriptedFetcher::new(vec![
                ("bad", vec![Step::Found("a")]),
                ("good", vec![Step::Found("b")]),
            ]),
            sink,
            2,
            quick_retry(),
        );
        let summary = pipeline.run(vec!["bad".into(), "good".into()]).await;
        assert_eq!(summary.not_persisted, 1);
        assert_eq!(summary.succeeded, 1);
        let rows = pipeline.sink().snapshot();
        assert!(!rows.contains_key("bad"));
        assert_eq!(rows["good"].value.as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_is_idempotent() {
        let scripts = || {
            ScriptedFetcher::new(vec![
                ("a", vec![Step::Found("1")]),
                ("b", vec![Step::NotFound]),
                ("c", vec![Step::Found("3")]),
            ])
        };
        let items: Vec<String> = vec!["a".into(), "b".into(), "c".into()];

        let pipeline = Pipeline::new(scripts(), MemorySink::default(), 2, quick_retry());
        pipeline.run(items.clone()).await;
        let first = pipeline.sink().snapshot();
        assert_eq!(first.len(), items.len());

        let pipeline = Pipeline::new(scripts(), MemorySink::default(), 2, quick_retry());
        pipeline.run(items.clone()).await;
        pipeline.run(items).await;
        assert_eq!(pipeline.sink().snapshot(), first);
    }

    /// Records how many fetches are in flight at once.
    struct GaugedFetcher {
        current: AtomicUsize,
        max_seen: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for GaugedFetcher {
        type Item = String;
        type Payload = String;

        async fn fetch(&self, item: &String) -> Result<FetchStatus<String>, FetchError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(FetchStatus::Found(item.clone()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cap_bounds_in_flight_fetches() {
        let pipeline = Pipeline::new(
            GaugedFetcher {
                current: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
            },
            MemorySink::default(),
            5,
            quick_retry(),
        );
        let items: Vec<String> = (0..20).map(|i| format!("item-{i}")).collect();
        let summary = pipeline.run(items).await;
        assert_eq!(summary.succeeded, 20);
        assert_eq!(pipeline.fetcher.max_seen.load(Ordering::SeqCst), 5);
    }
}
