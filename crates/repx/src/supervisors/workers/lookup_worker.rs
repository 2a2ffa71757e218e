//! 🎬 *[a target comes off the queue. the worker squints at it. "IP? Nameserver? Typo?"]*
//! *[the detector answers. the client fetches. the sink swallows. next.]*
//!
//! 🔎 The LookupWorker module - one target at a time, start to finish, then the next.
//!
//! 🧠 Knowledge graph:
//! - [`TargetLookup`] is the per-target dispatch shared by the pool AND the single-target
//!   modes: capped generic streaming, single-shot trial fetch, or uncapped typed A/AAAA scan.
//! - Every lookup ends in a [`TargetOutcome`]. A fetch error is carried IN the outcome,
//!   not returned, so nothing upstream can accidentally `?` a sibling's failure into a
//!   run-wide abort. Records saved before the failure stay saved.
//! - Save errors are logged and counted. The target keeps going.

use std::sync::Arc;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, info, info_span, trace, warn};

use super::Worker;
use crate::app_config::RunConfig;
use crate::client::{FetchEvent, RepClient};
use crate::common::{DnsRecord, QueryKind, TypedKind};
use crate::detect::TypeDetector;
use crate::error::RepError;
use crate::sink::RecordOutput;
use crate::summary::RunSummary;

/// 🎚️ Which fetch a generic target gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchStyle {
    /// 🚰 paginated, capped at `max_records_per_target`
    Streaming,
    /// 🎯 one unpaginated request, trial plans
    SingleShot,
}

/// 📋 What happened to one target.
#[derive(Debug, Default)]
pub(crate) struct TargetOutcome {
    pub(crate) records: u64,
    pub(crate) write_failures: u64,
    pub(crate) failure: Option<RepError>,
}

impl TargetOutcome {
    /// 🧮 Fold into a run tally as one processed target.
    pub(crate) fn tally_into(self, tally: &mut RunSummary, target: &str) {
        tally.processed += 1;
        tally.records += self.records;
        tally.write_failures += self.write_failures;
        if let Some(err) = self.failure {
            warn!("💀 lookup for '{target}' failed after {} record(s): {err}", self.records);
            tally.failed += 1;
        }
    }
}

/// 🔎 Everything needed to look up one target and put its records somewhere.
#[derive(Debug, Clone)]
pub(crate) struct TargetLookup {
    client: RepClient,
    config: Arc<RunConfig>,
    output: RecordOutput,
}

impl TargetLookup {
    pub(crate) fn new(client: RepClient, config: Arc<RunConfig>, output: RecordOutput) -> Self {
        Self {
            client,
            config,
            output,
        }
    }

    pub(crate) async fn dispatch(&self, style: FetchStyle, kind: QueryKind, target: &str) -> TargetOutcome {
        match style {
            FetchStyle::Streaming => self.scan_generic(kind, target).await,
            FetchStyle::SingleShot => self.scan_once(kind, target).await,
        }
    }

    /// 🚰 Stream generic records, stop reading at the per-target cap.
    ///
    /// Hitting the cap closes the stream. A page request already on the wire still runs
    /// to completion in the producer; we just stop listening.
    pub(crate) async fn scan_generic(&self, kind: QueryKind, target: &str) -> TargetOutcome {
        let max = self.config.max_records_per_target;
        let progress_every = self.config.page_size.max(1) as u64;
        trace!("📡 fetching ({kind}) records for {target} with max records: {max}");

        let mut stream = self.client.stream_generic(kind, target, max);
        let mut outcome = TargetOutcome::default();
        while let Some(event) = stream.next().await {
            match event {
                FetchEvent::Record(record) => {
                    outcome.records += 1;
                    trace!(
                        "{} -> {} ({}) at {}",
                        record.ip, record.domain_id, record.record_type, record.timestamp
                    );
                    self.emit(&record, &mut outcome).await;
                    if outcome.records % progress_every == 0 {
                        debug!("📦 fetched {} ({kind}) records for {target}", outcome.records);
                    }
                    if max > 0 && outcome.records >= max as u64 {
                        debug!("🧢 cap of {max} reached for {target}");
                        stream.close();
                        break;
                    }
                }
                FetchEvent::Failed(err) => {
                    outcome.failure = Some(err);
                    break;
                }
                FetchEvent::Done { pages, records } => {
                    trace!("🏁 producer done: {records} records over {pages} pages");
                }
            }
        }

        if outcome.failure.is_none() {
            info!(kind = %kind, target_name = %target, total = outcome.records, "✅ fetched all records");
        }
        outcome
    }

    /// 🎯 Trial plans: one request, the whole answer, no cursor.
    pub(crate) async fn scan_once(&self, kind: QueryKind, target: &str) -> TargetOutcome {
        trace!("📡 single-shot fetch of ({kind}) records for {target}");
        let mut outcome = TargetOutcome::default();
        match self.client.fetch_once(kind, target).await {
            Ok(records) => {
                outcome.records = records.len() as u64;
                if let Err(err) = self.output.emit_all(&records).await {
                    warn!("💾 could not save {} record(s) for {target}: {err}", records.len());
                    outcome.write_failures += 1;
                }
                info!(kind = %kind, target_name = %target, total = outcome.records, "✅ fetched all records");
            }
            Err(err) => outcome.failure = Some(err),
        }
        outcome
    }

    /// 🌍 Full-detail A/AAAA scan. Every record is logged with its geo fields. No cap.
    pub(crate) async fn scan_typed(&self, kind: TypedKind, ip: &str) -> TargetOutcome {
        let mut stream = self.client.stream_typed(kind, ip, 0);
        let mut outcome = TargetOutcome::default();
        while let Some(event) = stream.next().await {
            match event {
                FetchEvent::Record(record) => {
                    outcome.records += 1;
                    info!(
                        domain = %record.domain_id,
                        ip = %record.ip,
                        asn = record.asn,
                        asn_name = %record.asn_name,
                        country = %record.country,
                        city = %record.city,
                        latlong = %record.latlong,
                        "🌍 {kind} record found"
                    );
                    self.emit(&record, &mut outcome).await;
                }
                FetchEvent::Failed(err) => {
                    outcome.failure = Some(err);
                    break;
                }
                FetchEvent::Done { .. } => {}
            }
        }
        info!("📊 total {kind} records for {ip}: {}", outcome.records);
        outcome
    }

    async fn emit<R: DnsRecord>(&self, record: &R, outcome: &mut TargetOutcome) {
        if let Err(err) = self.output.emit(record).await {
            warn!("💾 could not save record for {}: {err}", record.domain_id());
            outcome.write_failures += 1;
        }
    }
}

/// 🔎 Pulls targets until the job queue closes. One in flight, always.
#[derive(Debug)]
pub(crate) struct LookupWorker {
    id: usize,
    jobs: Receiver<String>,
    detector: TypeDetector,
    lookup: TargetLookup,
    style: FetchStyle,
}

impl LookupWorker {
    pub(crate) fn new(
        id: usize,
        jobs: Receiver<String>,
        detector: TypeDetector,
        lookup: TargetLookup,
        style: FetchStyle,
    ) -> Self {
        Self {
            id,
            jobs,
            detector,
            lookup,
            style,
        }
    }
}

impl Worker for LookupWorker {
    type Output = RunSummary;

    fn start(self) -> JoinHandle<Result<RunSummary>> {
        let span = info_span!("lookup_worker", worker = self.id);
        tokio::spawn(
            async move {
                trace!("🧵 worker {} started", self.id);
                let mut tally = RunSummary::default();
                while let Ok(target) = self.jobs.recv().await {
                    let Some(kind) = self.detector.classify(&target).await else {
                        warn!("🤷 {}", RepError::UnclassifiableTarget(target.clone()));
                        tally.processed += 1;
                        tally.skipped += 1;
                        continue;
                    };
                    let outcome = self
                        .lookup
                        .dispatch(self.style, kind, &target)
                        .instrument(debug_span!("lookup", %kind, target_name = %target))
                        .await;
                    outcome.tally_into(&mut tally, &target);
                }
                debug!("🏁 worker {} clocking out after {} targets", self.id, tally.processed);
                Ok(tally)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{AppConfig, RunOverrides};
    use crate::common::Record;
    use crate::sink::OutputFormat;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(domains: &[&str], token: &str, has_more: bool) -> serde_json::Value {
        let data: Vec<_> = domains
            .iter()
            .map(|d| serde_json::json!({"ip": "9.9.9.9", "domain_id": d, "record_type": "A", "timestamp": 3}))
            .collect();
        serde_json::json!({
            "data": data,
            "pagination": {"page_size": 2, "next_page_token": token, "has_more": has_more}
        })
    }

    fn lookup(server: &MockServer, max: usize, output: RecordOutput) -> TargetLookup {
        let mut app = AppConfig::default();
        app.api.host = server.uri();
        let config = Arc::new(
            app.resolve(&RunOverrides {
                page_size: Some(2),
                max_records_per_target: Some(max),
                ..Default::default()
            })
            .expect("💀 test config"),
        );
        let client = RepClient::new(&config.api_host, "k", config.page_size).expect("💀 client");
        TargetLookup::new(client, config, output)
    }

    #[tokio::test]
    async fn the_one_where_the_cap_stops_the_reading_and_the_saving() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .and(query_param_is_missing("page_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&["a", "b"], "p2", true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .and(query_param("page_token", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&["c", "d"], "p3", true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .and(query_param("page_token", "p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&["e", "f"], "", false)))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir");
        let out_path = dir.path().join("stream.txt");
        let output = RecordOutput::Direct {
            path: out_path.clone(),
            format: OutputFormat::Txt,
        };
        let outcome = lookup(&server, 3, output).scan_generic(QueryKind::Ip, "9.9.9.9").await;

        assert!(outcome.failure.is_none());
        assert_eq!(outcome.records, 3);
        let text = tokio::fs::read_to_string(&out_path).await.expect("💀 read back");
        assert_eq!(text, "a\nb\nc\n");
        server.verify().await;
    }

    #[tokio::test]
    async fn the_one_where_a_failure_keeps_what_was_already_saved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .and(query_param_is_missing("page_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&["a", "b"], "p2", true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .and(query_param("page_token", "p2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("later"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir");
        let out_path = dir.path().join("stream.ndjson");
        let output = RecordOutput::Direct {
            path: out_path.clone(),
            format: OutputFormat::Ndjson,
        };
        let outcome = lookup(&server, 0, output).scan_generic(QueryKind::Ns, "ns1.example").await;

        assert!(matches!(outcome.failure, Some(RepError::UpstreamStatus { code: 503, .. })));
        assert_eq!(outcome.records, 2);
        let text = tokio::fs::read_to_string(&out_path).await.expect("💀 read back");
        let saved: Vec<Record> = text.lines().map(|l| serde_json::from_str(l).expect("💀")).collect();
        assert_eq!(saved.len(), 2);

        let mut tally = RunSummary::default();
        outcome.tally_into(&mut tally, "ns1.example");
        assert_eq!((tally.processed, tally.failed, tally.records), (1, 1, 2));
    }

    #[tokio::test]
    async fn the_one_where_trial_mode_asks_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns"))
            .and(query_param("mx", "mail.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"ip": "1.2.3.4", "domain_id": "x.example", "record_type": "MX", "timestamp": 1},
                {"ip": "1.2.3.5", "domain_id": "y.example", "record_type": "MX", "timestamp": 2}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = lookup(&server, 1, RecordOutput::Off)
            .dispatch(FetchStyle::SingleShot, QueryKind::Mx, "mail.example")
            .await;
        assert_eq!(outcome.records, 2, "the cap does not apply to single-shot fetches");
        server.verify().await;
    }

    #[tokio::test]
    async fn the_one_where_typed_scans_ignore_the_cap() {
        let server = MockServer::start().await;
        let geo = |d: &str| {
            serde_json::json!({"domain_id": d, "ip": "1.1.1.1", "asn": 13335, "asn_name": "CLOUDFLARENET",
                "country": "US", "city": "SF", "latlong": "0,0", "timestamp": 5})
        };
        Mock::given(method("GET"))
            .and(path("/api/dns/a"))
            .and(query_param("ipv4", "1.1.1.1"))
            .and(query_param_is_missing("page_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [geo("a"), geo("b")],
                "pagination": {"page_size": 2, "next_page_token": "t", "has_more": true}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dns/a"))
            .and(query_param("page_token", "t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [geo("c")],
                "pagination": {"page_size": 2, "next_page_token": "", "has_more": false}
            })))
            .mount(&server)
            .await;

        let outcome = lookup(&server, 1, RecordOutput::Off).scan_typed(TypedKind::A, "1.1.1.1").await;
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.records, 3);
    }
}
