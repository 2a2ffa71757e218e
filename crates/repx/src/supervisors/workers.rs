//! 🧵 Workers: the ones who actually do the lookups while the Supervisor takes all the
//! credit in the run summary.
//!
//! 🚀 Two kinds of minion live here:
//! - [`LookupWorker`]: pulls one target at a time off the job queue, classifies it, fetches
//!   it, hands records to the output. Then the next one. Never two at once.
//! - [`SinkWorker`]: the single writer. Drains the save queue until it closes.
//!
//! [`WorkerPool`] owns the job queue: capacity 2W, fed by the [`TargetSource`], so at most
//! W fetches are in flight and at most W + 2W targets are outstanding. 🦆
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::debug;

mod lookup_worker;
mod sink_worker;

pub(crate) use lookup_worker::{FetchStyle, LookupWorker, TargetLookup};
pub(crate) use sink_worker::{SinkReport, SinkWorker};

use crate::detect::TypeDetector;
use crate::summary::RunSummary;
use crate::targets::TargetSource;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" - Seinfeld, on Rust
pub(crate) trait Worker {
    /// 📋 what the worker hands back when it clocks out
    type Output;

    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

/// 🏭 A fixed crew of [`LookupWorker`]s behind one bounded job queue.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    threads: usize,
    detector: TypeDetector,
    lookup: TargetLookup,
    style: FetchStyle,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize, detector: TypeDetector, lookup: TargetLookup, style: FetchStyle) -> Self {
        Self {
            threads: threads.max(1),
            detector,
            lookup,
            style,
        }
    }

    /// 🧵 Feed every target from `source` through the crew and add up what they report.
    ///
    /// A read fault on the source is fatal and returned immediately; workers are not
    /// waited on in that case.
    pub(crate) async fn run(self, mut source: TargetSource) -> Result<RunSummary> {
        let (jobs_tx, jobs_rx) = async_channel::bounded::<String>(self.threads * 2);

        let crew: Vec<_> = (0..self.threads)
            .map(|id| {
                LookupWorker::new(
                    id,
                    jobs_rx.clone(),
                    self.detector.clone(),
                    self.lookup.clone(),
                    self.style,
                )
                .start()
            })
            .collect();
        drop(jobs_rx);
        debug!("🧵 {} lookup workers clocked in", self.threads);

        let fed = async {
            let mut count = 0usize;
            while let Some(target) = source.next_target().await? {
                if jobs_tx.send(target).await.is_err() {
                    break;
                }
                count += 1;
            }
            Ok::<_, crate::error::RepError>(count)
        }
        .await;
        // 🚪 no more jobs: workers finish what is queued, then see the closed channel
        jobs_tx.close();
        let fed = fed.context("💀 The target list stopped making sense partway through")?;
        debug!("📂 fed {fed} targets from {} lines", source.lines_read());

        let mut tally = RunSummary::default();
        for finished in futures::future::join_all(crew).await {
            let report = finished.context("💀 A lookup worker panicked. It did not leave a note.")??;
            tally.absorb(&report);
        }
        Ok(tally)
    }
}
