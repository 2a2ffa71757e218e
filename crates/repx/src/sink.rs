//! 💾 OutputSink - where records go to live on disk.
//!
//! 🎬 *[a record leaves the network. it needs a home. the extension decides which one.]*
//!
//! 🧠 Knowledge graph:
//! - [`save`] is the synchronous path: one call, one payload, one file, dispatched on the
//!   path's extension. Used directly for single-shot lookups.
//! - [`SinkHandle`] is the producer side of the asynchronous path: a bounded queue of
//!   [`SaveTask`]s drained by the one `SinkWorker`. The backpressure policy is one
//!   configured value applied to every enqueue. Drops are counted, never silent.
//! - [`RecordOutput`] is what lookups actually hold: off, direct, or queued. Lookups do not
//!   care which.
//!
//! | format | append | overwrite |
//! |---|---|---|
//! | ndjson | one `write_all` on an `O_APPEND` handle | truncate + write |
//! | json | read whole array, extend, rewrite (O(n)) | write array |
//! | txt | one `write_all` on an `O_APPEND` handle | truncate + write |
//! | csv | always overwrites | truncate + write |
//!
//! ⚠️ json append is a read-modify-write. Two writers on one json path WILL lose data.
//! Only one task may ever own a json or csv path; the `SinkWorker` is that task.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_channel::{Sender, TrySendError};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{trace, warn};

use crate::common::DnsRecord;
use crate::composers::{Composer, ComposerBackend, JsonArrayComposer};
use crate::error::RepError;

// ===== Formats & modes =====

/// 🗂️ The four on-disk shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Ndjson,
    Json,
    Txt,
    Csv,
}

impl OutputFormat {
    /// 🔍 Pick the format from a path's extension, case-insensitive.
    pub fn from_path(path: &Path) -> Result<Self, RepError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        ext.parse().map_err(|_| {
            RepError::config(format!(
                "unsupported output file extension '.{ext}' in '{}'",
                path.display()
            ))
        })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ndjson => "ndjson",
            Self::Json => "json",
            Self::Txt => "txt",
            Self::Csv => "csv",
        }
    }

    /// 🧠 txt files hold the domain-only projection, everything else the whole record.
    pub fn is_domain_only(&self) -> bool {
        matches!(self, Self::Txt)
    }

    /// 📦 Formats whose files can only be produced whole. The writer holds these until close.
    pub fn is_whole_file(&self) -> bool {
        matches!(self, Self::Json | Self::Csv)
    }
}

impl FromStr for OutputFormat {
    type Err = RepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndjson" => Ok(Self::Ndjson),
            "json" => Ok(Self::Json),
            "txt" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            other => Err(RepError::config(format!(
                "unsupported output format '{other}' (expected ndjson, json, txt or csv)"
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

// ===== Payloads & tasks =====

/// 📦 What gets written: whole records as JSON values, or plain lines.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Records(Vec<Value>),
    Lines(Vec<String>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Self::Records(items) => items.len(),
            Self::Lines(lines) => lines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 🔄 Every item as a JSON value. Lines become JSON strings.
    pub fn to_values(&self) -> Vec<Value> {
        match self {
            Self::Records(items) => items.clone(),
            Self::Lines(lines) => lines.iter().cloned().map(Value::String).collect(),
        }
    }

    /// 🧺 Fold another payload into this one. Mixed kinds degrade to records.
    pub fn merge(&mut self, other: Payload) {
        let mine = std::mem::replace(self, Self::Records(Vec::new()));
        *self = match (mine, other) {
            (Self::Records(mut mine), Self::Records(theirs)) => {
                mine.extend(theirs);
                Self::Records(mine)
            }
            (Self::Lines(mut mine), Self::Lines(theirs)) => {
                mine.extend(theirs);
                Self::Lines(mine)
            }
            (mine, theirs) => {
                let mut values = mine.to_values();
                values.extend(theirs.to_values());
                Self::Records(values)
            }
        };
    }

    /// 🎯 Project one record for the given format.
    pub fn for_record<R: DnsRecord>(record: &R, format: OutputFormat) -> Result<Self, RepError> {
        if format.is_domain_only() {
            return Ok(Self::Lines(vec![record.domain_id().to_string()]));
        }
        let value = serde_json::to_value(record)
            .map_err(|e| RepError::output(format!("<{format}>"), e))?;
        Ok(Self::Records(vec![value]))
    }

    /// 🎯 Project a batch of records for the given format.
    pub fn for_records<R: DnsRecord>(records: &[R], format: OutputFormat) -> Result<Self, RepError> {
        if format.is_domain_only() {
            return Ok(Self::Lines(
                records.iter().map(|r| r.domain_id().to_string()).collect(),
            ));
        }
        records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Records)
            .map_err(|e| RepError::output(format!("<{format}>"), e))
    }
}

/// 📬 One unit of work for the writer. Ownership moves into the queue on enqueue.
#[derive(Debug, Clone)]
pub struct SaveTask {
    pub payload: Payload,
    pub path: PathBuf,
    pub format: OutputFormat,
}

// ===== The synchronous save =====

/// 💾 Write `payload` to `path`, format chosen by the extension.
///
/// ⚠️ json + `Append` reads and rewrites the whole file. Not safe for concurrent writers.
pub async fn save(payload: &Payload, path: &Path, mode: WriteMode) -> Result<(), RepError> {
    let format = OutputFormat::from_path(path)?;
    trace!("💾 saving {} item(s) to {} as {format} ({mode:?})", payload.len(), path.display());

    match (format, mode) {
        (OutputFormat::Json, WriteMode::Append) => append_json_array(payload, path).await,
        (OutputFormat::Csv, _) | (_, WriteMode::Overwrite) => {
            let body = compose(format, payload, path)?;
            write_file(path, body.as_bytes(), false).await
        }
        (OutputFormat::Ndjson | OutputFormat::Txt, WriteMode::Append) => {
            let body = compose(format, payload, path)?;
            if body.is_empty() {
                return Ok(());
            }
            // 🧠 one write_all on an append handle, so lines from different writers never interleave mid-line
            write_file(path, body.as_bytes(), true).await
        }
    }
}

fn compose(format: OutputFormat, payload: &Payload, path: &Path) -> Result<String, RepError> {
    ComposerBackend::for_format(format)
        .compose(payload)
        .map_err(|err| match err {
            RepError::OutputWrite { reason, .. } => RepError::output(path, reason),
            other => other,
        })
}

async fn append_json_array(payload: &Payload, path: &Path) -> Result<(), RepError> {
    let mut existing: Vec<Value> = match tokio::fs::read_to_string(path).await {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!("⚠️ {} is not a JSON array ({err}), starting a fresh one", path.display());
            Vec::new()
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(RepError::output(path, err)),
    };
    existing.extend(payload.to_values());
    let body = JsonArrayComposer.compose_values(&existing)?;
    write_file(path, body.as_bytes(), false).await
}

async fn write_file(path: &Path, bytes: &[u8], append: bool) -> Result<(), RepError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    let mut file = options.open(path).await.map_err(|e| RepError::output(path, e))?;
    file.write_all(bytes).await.map_err(|e| RepError::output(path, e))?;
    file.flush().await.map_err(|e| RepError::output(path, e))
}

// ===== The asynchronous path =====

/// 🚦 What happens when the writer's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// ⏳ wait for room. Nothing is lost; a slow disk slows the fetchers.
    #[default]
    Block,
    /// 🗑️ drop the task, warn, and count it.
    DropWithWarning,
}

/// 📮 The producer side of the writer queue. Cheap to clone, one per lookup.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: Sender<SaveTask>,
    policy: BackpressurePolicy,
    dropped: Arc<AtomicU64>,
}

impl SinkHandle {
    pub(crate) fn new(tx: Sender<SaveTask>, policy: BackpressurePolicy) -> Self {
        Self {
            tx,
            policy,
            dropped: Arc::default(),
        }
    }

    /// 📬 Hand a task to the writer under the configured policy.
    pub async fn enqueue(&self, task: SaveTask) -> Result<(), RepError> {
        match self.policy {
            BackpressurePolicy::Block => self
                .tx
                .send(task)
                .await
                .map_err(|rejected| RepError::output(&rejected.0.path, "writer queue is closed")),
            BackpressurePolicy::DropWithWarning => match self.tx.try_send(task) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(task)) => {
                    self.dropped.fetch_add(task.payload.len() as u64, Ordering::Relaxed);
                    warn!(
                        "🗑️ writer queue full, dropping {} item(s) bound for {}",
                        task.payload.len(),
                        task.path.display()
                    );
                    Ok(())
                }
                Err(TrySendError::Closed(task)) => {
                    Err(RepError::output(&task.path, "writer queue is closed"))
                }
            },
        }
    }

    /// 🔢 Items dropped by backpressure so far, across every clone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 🚪 Signal that no more tasks are coming. The writer drains what is queued, then stops.
    pub fn close(&self) {
        self.tx.close();
    }
}

// ===== Routing =====

/// 🧭 Where a lookup sends its records.
#[derive(Debug, Clone)]
pub enum RecordOutput {
    /// 🙈 output disabled, records are only logged and counted
    Off,
    /// 💾 call [`save`] in place, append mode
    Direct { path: PathBuf, format: OutputFormat },
    /// 📮 enqueue for the writer
    Queued {
        handle: SinkHandle,
        path: PathBuf,
        format: OutputFormat,
    },
}

impl RecordOutput {
    pub async fn emit<R: DnsRecord>(&self, record: &R) -> Result<(), RepError> {
        match self {
            Self::Off => Ok(()),
            Self::Direct { path, format } => {
                save(&Payload::for_record(record, *format)?, path, WriteMode::Append).await
            }
            Self::Queued { handle, path, format } => {
                handle
                    .enqueue(SaveTask {
                        payload: Payload::for_record(record, *format)?,
                        path: path.clone(),
                        format: *format,
                    })
                    .await
            }
        }
    }

    /// 📦 Emit a whole batch as one payload.
    pub async fn emit_all<R: DnsRecord>(&self, records: &[R]) -> Result<(), RepError> {
        if records.is_empty() {
            return Ok(());
        }
        match self {
            Self::Off => Ok(()),
            Self::Direct { path, format } => {
                save(&Payload::for_records(records, *format)?, path, WriteMode::Append).await
            }
            Self::Queued { handle, path, format } => {
                handle
                    .enqueue(SaveTask {
                        payload: Payload::for_records(records, *format)?,
                        path: path.clone(),
                        format: *format,
                    })
                    .await
            }
        }
    }
}
