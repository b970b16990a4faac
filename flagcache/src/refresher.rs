//! Background refresh loop that keeps the flag cache current.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use crate::cache::FlagCache;
use crate::fetcher::{FetchError, SourceFetcher, build_snapshot};
use crate::metrics_defs::{REFRESH_DURATION, REFRESH_FAILURE, REFRESH_SUCCESS};
use crate::persistence::SnapshotStore;
use crate::types::unix_now;

#[derive(Debug)]
pub enum Command {
    /// Trigger a refresh outside of the normal interval. The worker sends
    /// the attempt's result once it finishes.
    Refresh(oneshot::Sender<Result<(), FetchError>>),
    /// Stop the loop after the current cycle.
    Shutdown,
}

pub struct Refresher {
    fetcher: SourceFetcher,
    cache: Arc<FlagCache>,
    store: Arc<dyn SnapshotStore>,
    interval: Duration,
    retry_backoff: Duration,
}

impl Refresher {
    pub fn new(
        fetcher: SourceFetcher,
        cache: Arc<FlagCache>,
        store: Arc<dyn SnapshotStore>,
        interval: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Refresher {
            fetcher,
            cache,
            store,
            interval,
            retry_backoff,
        }
    }

    /// Pre-warms the cache from the persisted snapshot, then performs the
    /// first live fetch. Neither step is fatal: with no snapshot on disk and
    /// no reachable upstream the service starts with empty caches and fills
    /// them on a later cycle.
    pub async fn initial_load(&self) {
        match self.store.load() {
            Ok(raw) if !raw.is_empty() => {
                let applications = raw.len();
                self.cache.apply(build_snapshot(&raw, unix_now()));
                tracing::info!(applications, "pre-warmed cache from persisted snapshot");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "no usable persisted snapshot");
            }
        }

        if let Err(err) = self.run_cycle().await {
            tracing::error!(error = %err, "initial flag fetch failed");
        }
    }

    /// Runs until `Shutdown` is received or every command sender is dropped.
    /// A failed cycle leaves the cache untouched and retries after the short
    /// backoff instead of the full interval.
    pub async fn run(self, mut rx: mpsc::Receiver<Command>) {
        let mut delay = self.interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    delay = match self.run_cycle().await {
                        Ok(()) => self.interval,
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                backoff_secs = self.retry_backoff.as_secs(),
                                "refresh failed, retrying sooner"
                            );
                            self.retry_backoff
                        }
                    };
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::Refresh(ack)) => {
                        let result = self.run_cycle().await;
                        delay = match &result {
                            Ok(()) => self.interval,
                            Err(_) => self.retry_backoff,
                        };
                        let _ = ack.send(result);
                    }
                    Some(Command::Shutdown) | None => break,
                }
            }
        }

        tracing::info!("refresh loop stopped");
    }

    /// One fetch-merge-apply cycle. The snapshot is applied only after the
    /// whole merge completes; persistence is best-effort and never fails the
    /// cycle.
    async fn run_cycle(&self) -> Result<(), FetchError> {
        let started = Instant::now();

        let raw = match self.fetcher.fetch_all().await {
            Ok(raw) => raw,
            Err(err) => {
                metrics::counter!(REFRESH_FAILURE.name).increment(1);
                return Err(err);
            }
        };

        let now = unix_now();
        let mut snapshot = build_snapshot(&raw, now);
        snapshot.last_fetch = Some(now);
        self.cache.apply(snapshot);

        metrics::counter!(REFRESH_SUCCESS.name).increment(1);
        metrics::histogram!(REFRESH_DURATION.name).record(started.elapsed().as_secs_f64());

        if let Err(err) = self.store.store(&raw) {
            tracing::warn!(error = %err, "failed to persist snapshot");
        }

        tracing::info!(
            applications = raw.len(),
            cached_flags = self.cache.stats().cache_size,
            "flag cache refreshed"
        );
        Ok(())
    }
}
