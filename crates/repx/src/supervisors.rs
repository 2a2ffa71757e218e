//! 🎬 *[camera pans across a dimly lit terminal]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where targets arrive by the thousand..."
//! 🎬 "One supervisor decided how to look them all up."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module - picks the run mode once, wires the client, the detector, the
//! workers and the writer together, and waits until every byte is on disk.
//!
//! 🧠 Knowledge graph - mode precedence, first match wins:
//! 1. trial + no list → [`RunMode::TrialSingle`] (single-shot fetch, direct save)
//! 2. trial + list → [`RunMode::TrialBulk`] (pool, single-shot fetches)
//! 3. `--ipv6` + full → [`RunMode::FullAaaa`] (typed AAAA scan)
//! 4. `--ipv4` + full → [`RunMode::FullA`] (typed A scan)
//! 5. list → [`RunMode::Bulk`] (pool, capped streaming)
//! 6. otherwise → [`RunMode::Single`] (one capped streaming scan)
//!
//! ⚠️ DO NOT MAKE `workers` PUB EVER
//! 🔒 Like Fight Club, but for async tasks. First rule: you don't pub the workers.

mod workers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span};

use crate::app_config::RunConfig;
use crate::client::RepClient;
use crate::common::{QueryKind, TypedKind};
use crate::detect::TypeDetector;
use crate::error::RepError;
use crate::sink::{RecordOutput, SinkHandle};
use crate::summary::RunSummary;
use crate::targets::TargetSource;
use workers::{FetchStyle, SinkReport, SinkWorker, TargetLookup, Worker, WorkerPool};

/// 🎯 What the operator asked for. Selectors are optional; the mode decides which matter.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub trial: bool,
    pub full: bool,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub ns: Option<String>,
    pub cname: Option<String>,
    pub txt: Option<String>,
    pub mx: Option<String>,
    pub list_file: Option<PathBuf>,
}

impl RunRequest {
    fn selector(&self, kind: QueryKind) -> Option<&str> {
        let value = match kind {
            QueryKind::Ip => &self.ipv4,
            QueryKind::Ns => &self.ns,
            QueryKind::Cname => &self.cname,
            QueryKind::Txt => &self.txt,
            QueryKind::Mx => &self.mx,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// 🔍 First non-empty selector in ip, ns, cname, txt, mx order.
    fn first_selector(&self) -> Option<(QueryKind, String)> {
        QueryKind::SELECTOR_ORDER
            .into_iter()
            .find_map(|kind| self.selector(kind).map(|value| (kind, value.to_string())))
    }

    fn ipv6(&self) -> Option<&str> {
        self.ipv6.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// 🎭 The six ways a run can go. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    TrialSingle { kind: QueryKind, target: String },
    TrialBulk { list: PathBuf },
    FullAaaa { ip: String },
    FullA { ip: String },
    Bulk { list: PathBuf },
    Single { kind: QueryKind, target: String },
}

const NO_SELECTOR: &str = "you must provide at least one of: --ipv4, --ns, --cname, --txt, --mx";

impl RunMode {
    /// 🧭 Resolve the mode. Impossible combinations are configuration errors, before any work.
    pub fn select(request: &RunRequest) -> Result<Self, RepError> {
        if request.trial {
            return match &request.list_file {
                Some(list) => Ok(Self::TrialBulk { list: list.clone() }),
                None if request.ipv6().is_some() => Err(RepError::config(
                    "IPv6 lookups are only available on paid plans",
                )),
                None => request
                    .first_selector()
                    .map(|(kind, target)| Self::TrialSingle { kind, target })
                    .ok_or_else(|| RepError::config(NO_SELECTOR)),
            };
        }

        if request.full {
            if let Some(ip) = request.ipv6() {
                return Ok(Self::FullAaaa { ip: ip.to_string() });
            }
            if let Some(ip) = request.selector(QueryKind::Ip) {
                return Ok(Self::FullA { ip: ip.to_string() });
            }
        }

        if let Some(list) = &request.list_file {
            return Ok(Self::Bulk { list: list.clone() });
        }

        if request.ipv6().is_some() {
            return Err(RepError::config("IPv6 lookups need full mode: add --full / -f"));
        }
        request
            .first_selector()
            .map(|(kind, target)| Self::Single { kind, target })
            .ok_or_else(|| RepError::config(NO_SELECTOR))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TrialSingle { .. } => "trial single-target",
            Self::TrialBulk { .. } => "trial bulk",
            Self::FullAaaa { .. } => "full-detail AAAA",
            Self::FullA { .. } => "full-detail A",
            Self::Bulk { .. } => "bulk",
            Self::Single { .. } => "single-target",
        }
    }
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
#[derive(Debug)]
pub struct Supervisor {
    config: Arc<RunConfig>,
    client: RepClient,
    detector: TypeDetector,
}

// 📮 a running writer: the handle producers use, and the task draining it
type Writer = (SinkHandle, JoinHandle<Result<SinkReport>>);

impl Supervisor {
    pub fn new(config: Arc<RunConfig>, client: RepClient, detector: TypeDetector) -> Self {
        Self {
            config,
            client,
            detector,
        }
    }

    /// 🧵 Run one mode to completion and report what happened.
    ///
    /// Per-target failures land in the summary. Only setup faults (output directory, an
    /// unreadable target list, a crashed worker) come back as `Err`.
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary> {
        let started = Instant::now();
        if self.config.output_enabled {
            tokio::fs::create_dir_all(&self.config.output_dir)
                .await
                .with_context(|| {
                    format!(
                        "💀 Could not create the output directory '{}'. The path stared back.",
                        self.config.output_dir.display()
                    )
                })?;
        }
        info!("🚀 starting {} run", mode.label());

        let tally = match &mode {
            RunMode::TrialSingle { kind, target } => {
                let output = self.direct_output("stream");
                let lookup = TargetLookup::new(self.client.clone(), self.config.clone(), output);
                let mut tally = RunSummary::default();
                lookup
                    .scan_once(*kind, target)
                    .instrument(info_span!("lookup", %kind, target_name = %target))
                    .await
                    .tally_into(&mut tally, target);
                tally
            }
            RunMode::TrialBulk { list } => self.run_pool(list, FetchStyle::SingleShot).await?,
            RunMode::FullAaaa { ip } => self.run_typed(TypedKind::Aaaa, ip).await?,
            RunMode::FullA { ip } => self.run_typed(TypedKind::A, ip).await?,
            RunMode::Bulk { list } => self.run_pool(list, FetchStyle::Streaming).await?,
            RunMode::Single { kind, target } => {
                let (output, writer) = self.queued_output("stream");
                let lookup = TargetLookup::new(self.client.clone(), self.config.clone(), output);
                let mut tally = RunSummary::default();
                lookup
                    .scan_generic(*kind, target)
                    .instrument(info_span!("lookup", %kind, target_name = %target))
                    .await
                    .tally_into(&mut tally, target);
                finish_writer(writer, &mut tally).await?;
                tally
            }
        };

        let mut summary = RunSummary::new(mode.label());
        summary.absorb(&tally);
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    async fn run_pool(&self, list: &Path, style: FetchStyle) -> Result<RunSummary> {
        let source = TargetSource::open(list)
            .await
            .context("💀 The target list could not be opened")?;
        let (output, writer) = self.queued_output("stream");
        let lookup = TargetLookup::new(self.client.clone(), self.config.clone(), output);
        let pool = WorkerPool::new(self.config.threads, self.detector.clone(), lookup, style);

        // 💾 drain and flush the writer even when the pool bailed, so what was fetched is kept
        let pooled = pool.run(source).await;
        let mut tally = RunSummary::default();
        let flushed = finish_writer(writer, &mut tally).await;
        tally.absorb(&pooled?);
        flushed?;
        Ok(tally)
    }

    async fn run_typed(&self, kind: TypedKind, ip: &str) -> Result<RunSummary> {
        let (output, writer) = self.queued_output(kind.file_stem());
        let lookup = TargetLookup::new(self.client.clone(), self.config.clone(), output);
        let mut tally = RunSummary::default();
        lookup
            .scan_typed(kind, ip)
            .instrument(info_span!("full_scan", %kind, ip))
            .await
            .tally_into(&mut tally, ip);
        finish_writer(writer, &mut tally).await?;
        Ok(tally)
    }

    fn direct_output(&self, stem: &str) -> RecordOutput {
        if !self.config.output_enabled {
            return RecordOutput::Off;
        }
        RecordOutput::Direct {
            path: self.config.output_path(stem),
            format: self.config.output_format,
        }
    }

    fn queued_output(&self, stem: &str) -> (RecordOutput, Option<Writer>) {
        if !self.config.output_enabled {
            return (RecordOutput::Off, None);
        }
        let (handle, worker) =
            SinkWorker::channel(self.config.sink_queue_capacity, self.config.backpressure);
        let output = RecordOutput::Queued {
            handle: handle.clone(),
            path: self.config.output_path(stem),
            format: self.config.output_format,
        };
        (output, Some((handle, worker.start())))
    }
}

/// 🚪 Close the queue, wait for the writer to drain, fold its numbers into the tally.
async fn finish_writer(writer: Option<Writer>, tally: &mut RunSummary) -> Result<()> {
    let Some((handle, join)) = writer else {
        return Ok(());
    };
    handle.close();
    let report = join
        .await
        .context("💀 The writer task panicked. The disk may have opinions.")??;
    debug!("💾 writer done: {} written, {} failed saves", report.written, report.write_failures);
    tally.dropped += handle.dropped();
    tally.write_failures += report.write_failures;
    Ok(())
}
