use std::sync::Arc;
use std::time::Duration;

use ingest_bench_core::prelude::{wait_until_true, DelegatedShutdownListener};
use ingest_bench_instruments::IngestStats;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Why a benchmark run was considered done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The document count stopped changing between two polls.
    Stable { hits: u64 },
    /// The configured benchmark period elapsed with data in the data stream.
    DurationElapsed,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("timed out waiting for data ingestion after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),
}

/// Gates the end of a benchmark run on the target data stream.
pub struct CompletionWaiter {
    pub ingest: Arc<dyn IngestStats>,
    pub data_stream: String,
    /// When set, the run lasts at least this long and ends once data has arrived
    pub benchmark_period: Option<Duration>,
    /// Longest wait for the run to complete, benchmark period included
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl CompletionWaiter {
    /// Wait until the run is complete.
    ///
    /// The document count is polled every `retry_interval`. Without a benchmark period the run
    /// is complete once the count is non-zero and unchanged between two polls. With one, it is
    /// complete once the period has passed and the data stream holds documents.
    ///
    /// Fails with [CompletionError::TimedOut] when neither happens within `timeout` and with
    /// a shutdown signal error when interrupted.
    pub async fn wait(&self, shutdown: &mut DelegatedShutdownListener) -> anyhow::Result<Completion> {
        match self.benchmark_period {
            Some(period) => log::info!(
                "Running benchmark for {}",
                humantime::format_duration(period)
            ),
            None => log::debug!("checking for all data in data stream {}...", self.data_stream),
        }

        let started = Instant::now();
        let previous = Arc::new(Mutex::new(None::<u64>));

        let done = wait_until_true(
            || {
                let previous = previous.clone();
                async move {
                    let hits = self.ingest.count_docs(&self.data_stream).await?;
                    log::debug!("found {hits} hits in {} data stream", self.data_stream);

                    let mut previous = previous.lock();
                    let done = match self.benchmark_period {
                        Some(period) => hits > 0 && started.elapsed() >= period,
                        None => hits > 0 && *previous == Some(hits),
                    };
                    *previous = Some(hits);
                    Ok::<_, anyhow::Error>(done)
                }
            },
            self.timeout,
            self.retry_interval,
            shutdown,
        )
        .await?;

        if !done {
            return Err(CompletionError::TimedOut(self.timeout).into());
        }

        match self.benchmark_period {
            Some(_) => Ok(Completion::DurationElapsed),
            None => Ok(Completion::Stable {
                hits: previous.lock().unwrap_or_default(),
            }),
        }
    }
}
