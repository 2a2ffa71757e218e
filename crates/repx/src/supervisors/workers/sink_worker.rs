//! 🎬 *[a channel fills with save tasks. somewhere, a writer waits.]*
//! *[the clock on the wall reads 2:47am.]*
//! *[nobody asked for ten thousand nameservers. and yet, here we are.]*
//!
//! 🗑️ The SinkWorker module - patient, tireless, and the ONLY task that touches the output
//! files of a run. It receives save tasks. It writes them. It asks no questions.
//!
//! 🧠 Knowledge graph:
//! - ndjson / txt tasks are written through on arrival (append mode, one write each).
//! - json tasks are held per path and appended in batches: once a path holds `flush_every`
//!   items (the queue capacity) it gets one read-modify-write, and whatever is left goes out
//!   when the queue closes. Every rewrite re-reads the whole array, so a huge json output
//!   costs O(n) per batch. Pick ndjson for big scans.
//! - csv tasks are held per path until the queue closes, because csv is overwrite-only and
//!   has to be written whole. ⚠️ That means every csv record of the run sits in memory.
//!   An uncapped full scan into csv can hold millions of rows.
//! - A failed save is logged and counted. The worker keeps draining; a bad disk for one
//!   path must not cost the other paths their data.
//! - Shutdown: every producer's `SinkHandle::close()` → channel drains → held files flush →
//!   the JoinHandle resolves with a [`SinkReport`]. The run is not done until that happens.
//!
//! 🦆 (the duck has no comment at this time)

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::Worker;
use crate::sink::{BackpressurePolicy, OutputFormat, Payload, SaveTask, SinkHandle, WriteMode, save};

/// 📋 What the writer did with its life.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SinkReport {
    /// ✅ items that made it to disk
    pub(crate) written: u64,
    /// 💀 save calls that failed
    pub(crate) write_failures: u64,
}

/// 🗑️ The SinkWorker: takes save tasks from a channel, throws them at the disk.
#[derive(Debug)]
pub(crate) struct SinkWorker {
    rx: Receiver<SaveTask>,
    flush_every: usize,
}

impl SinkWorker {
    pub(crate) fn new(rx: Receiver<SaveTask>, flush_every: usize) -> Self {
        Self {
            rx,
            flush_every: flush_every.max(1),
        }
    }

    /// 🔧 Both ends at once: the handle producers clone, and the worker that drains it.
    /// Held json is flushed every `capacity` items.
    pub(crate) fn channel(capacity: usize, policy: BackpressurePolicy) -> (SinkHandle, SinkWorker) {
        let capacity = capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);
        (SinkHandle::new(tx, policy), SinkWorker::new(rx, capacity))
    }
}

impl Worker for SinkWorker {
    type Output = SinkReport;

    fn start(self) -> JoinHandle<Result<SinkReport>> {
        tokio::spawn(async move {
            debug!("📥 SinkWorker started draining the save queue...");
            let mut report = SinkReport::default();
            let mut held: HashMap<PathBuf, Payload> = HashMap::new();

            while let Ok(task) = self.rx.recv().await {
                if task.format.is_whole_file() {
                    trace!("🧺 holding {} item(s) for {}", task.payload.len(), task.path.display());
                    let path = task.path.clone();
                    let pending = match held.entry(task.path) {
                        Entry::Occupied(mut slot) => {
                            slot.get_mut().merge(task.payload);
                            slot.get().len()
                        }
                        Entry::Vacant(slot) => slot.insert(task.payload).len(),
                    };
                    if task.format == OutputFormat::Json && pending >= self.flush_every {
                        if let Some(batch) = held.remove(&path) {
                            trace!("🪣 json batch of {pending} for {} is full, appending", path.display());
                            write(&batch, path, &mut report).await;
                        }
                    }
                    continue;
                }
                write(&task.payload, task.path, &mut report).await;
            }

            debug!("🏁 SinkWorker: queue closed, flushing {} held file(s)", held.len());
            for (path, payload) in held {
                write(&payload, path, &mut report).await;
            }
            Ok(report)
        })
    }
}

async fn write(payload: &Payload, path: PathBuf, report: &mut SinkReport) {
    match save(payload, &path, WriteMode::Append).await {
        Ok(()) => report.written += payload.len() as u64,
        Err(err) => {
            warn!("💾 {err}");
            report.write_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Record;
    use crate::sink::RecordOutput;
    use std::time::Duration;

    fn record(n: i64) -> Record {
        Record {
            ip: format!("192.0.2.{n}"),
            domain_id: format!("d{n}.example"),
            record_type: "NS".into(),
            timestamp: n,
        }
    }

    #[tokio::test]
    async fn the_one_where_closing_the_queue_flushes_everything() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let (handle, worker) = SinkWorker::channel(4, BackpressurePolicy::Block);
        let join = worker.start();

        let ndjson = RecordOutput::Queued {
            handle: handle.clone(),
            path: dir.path().join("stream.ndjson"),
            format: OutputFormat::Ndjson,
        };
        let csv = RecordOutput::Queued {
            handle: handle.clone(),
            path: dir.path().join("a.csv"),
            format: OutputFormat::Csv,
        };
        for n in 1..=10 {
            ndjson.emit(&record(n)).await.expect("💀 enqueue");
            csv.emit(&record(n)).await.expect("💀 enqueue");
        }
        handle.close();

        let report = join.await.expect("💀 join").expect("💀 sink report");
        assert_eq!(report, SinkReport { written: 20, write_failures: 0 });

        let lines = tokio::fs::read_to_string(dir.path().join("stream.ndjson")).await.expect("💀");
        assert_eq!(lines.lines().count(), 10);
        let table = tokio::fs::read_to_string(dir.path().join("a.csv")).await.expect("💀");
        assert_eq!(table.lines().count(), 11, "one header, ten rows, one write");
    }

    #[tokio::test]
    async fn the_one_where_held_json_lands_as_one_array() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let path = dir.path().join("stream.json");
        let (handle, worker) = SinkWorker::channel(2, BackpressurePolicy::Block);
        let join = worker.start();

        let out = RecordOutput::Queued {
            handle: handle.clone(),
            path: path.clone(),
            format: OutputFormat::Json,
        };
        out.emit_all(&[record(1), record(2)]).await.expect("💀 enqueue");
        out.emit(&record(3)).await.expect("💀 enqueue");
        handle.close();
        join.await.expect("💀 join").expect("💀 report");

        let back: Vec<Record> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.expect("💀")).expect("💀 array");
        assert_eq!(back, vec![record(1), record(2), record(3)]);
    }

    #[tokio::test]
    async fn the_one_where_a_full_json_batch_hits_the_disk_before_close() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let path = dir.path().join("aaaa.json");
        let (handle, worker) = SinkWorker::channel(2, BackpressurePolicy::Block);
        let join = worker.start();

        let out = RecordOutput::Queued {
            handle: handle.clone(),
            path: path.clone(),
            format: OutputFormat::Json,
        };
        out.emit(&record(1)).await.expect("💀 enqueue");
        out.emit(&record(2)).await.expect("💀 enqueue");

        // ⏳ the queue is still open; the batch of two must land on its own
        let mut landed = false;
        for _ in 0..200 {
            if let Ok(body) = tokio::fs::read_to_string(&path).await {
                if serde_json::from_str::<Vec<Record>>(&body).is_ok_and(|r| r.len() == 2) {
                    landed = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(landed, "💀 a full json batch waited for close");

        out.emit(&record(3)).await.expect("💀 enqueue");
        handle.close();
        let report = join.await.expect("💀 join").expect("💀 report");
        assert_eq!(report.written, 3);

        let back: Vec<Record> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.expect("💀")).expect("💀 array");
        assert_eq!(back, vec![record(1), record(2), record(3)], "the tail is appended to the flushed batch");
    }

    #[tokio::test]
    async fn the_one_where_a_bad_path_does_not_stop_the_good_one() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let (handle, worker) = SinkWorker::channel(4, BackpressurePolicy::Block);
        let join = worker.start();

        let missing_dir = RecordOutput::Queued {
            handle: handle.clone(),
            path: dir.path().join("nope").join("stream.ndjson"),
            format: OutputFormat::Ndjson,
        };
        let fine = RecordOutput::Queued {
            handle: handle.clone(),
            path: dir.path().join("stream.ndjson"),
            format: OutputFormat::Ndjson,
        };
        missing_dir.emit(&record(1)).await.expect("💀 enqueue");
        fine.emit(&record(2)).await.expect("💀 enqueue");
        handle.close();

        let report = join.await.expect("💀 join").expect("💀 report");
        assert_eq!(report, SinkReport { written: 1, write_failures: 1 });
    }
}
