//! 🎬 *[a cursor moves forward. it never looks back. it is not allowed to.]*
//!
//! 🚰 `RecordStream` - one producer task walking the cursor, one consumer reading
//! a single channel of tagged events. No second error channel. No nulling out
//! finished channels mid-select. One wait point, three outcomes.
//!
//! 🧠 Knowledge graph:
//! - Producer: `fetch_page("")` → emit records → `fetch_page(next_page_token)` → ...
//!   until `has_more == false` (→ `Done`), a page fails (→ `Failed`), the record cap is
//!   reached (→ `Done`), or the consumer hangs up (→ silent exit).
//! - The cursor is strictly forward-only: a `has_more` page whose token is empty or
//!   already spent in this cycle ends the stream with `CursorStalled`.
//! - Page requests never overlap for one target. The next page is requested only after
//!   every record of the current page has been handed to the channel.
//! - Dropping the stream does not abort an in-flight HTTP request. The producer finishes
//!   that request, notices the closed channel on its next send, and exits on its own.

use std::collections::HashSet;

use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span};

use super::RepClient;
use crate::common::DnsRecord;
use crate::error::RepError;

// 📦 how many records may sit between producer and consumer. one page-ish of slack.
const STREAM_BUFFER: usize = 100;

/// 🏷️ Everything the consumer can hear from the producer. After `Failed` or `Done`
/// the channel closes; nothing else follows.
#[derive(Debug)]
pub enum FetchEvent<R> {
    /// 📦 one record, in page order
    Record(R),
    /// 💀 terminal error, at most one per stream
    Failed(RepError),
    /// 🏁 clean finish: how many pages were requested and records emitted
    Done { pages: usize, records: usize },
}

/// 🚰 A single-pass, forward-only sequence of records for one target.
#[derive(Debug)]
pub struct RecordStream<R> {
    rx: Receiver<FetchEvent<R>>,
    producer: JoinHandle<()>,
}

impl<R: DnsRecord> RecordStream<R> {
    pub(super) fn spawn(
        client: RepClient,
        endpoint: &'static str,
        filter_param: &'static str,
        filter_value: String,
        max_records: usize,
    ) -> Self {
        let (tx, rx) = async_channel::bounded(STREAM_BUFFER);
        let span = debug_span!("page_producer", endpoint, filter = filter_param, value = %filter_value);
        let producer = tokio::spawn(
            produce(client, endpoint, filter_param, filter_value, max_records, tx).instrument(span),
        );
        Self { rx, producer }
    }

    /// 🎯 Next event, or `None` once the producer has closed up shop.
    pub async fn next(&mut self) -> Option<FetchEvent<R>> {
        self.rx.recv().await.ok()
    }

    /// 🚪 Stop listening. The producer exits at its next send; an in-flight request still
    /// runs to completion first. Does not wait.
    pub fn close(&self) {
        self.rx.close();
    }

    /// ⏳ Stop listening and wait for the producer to wind down.
    pub async fn finish(self) {
        self.rx.close();
        if let Err(join_err) = self.producer.await {
            debug!("🧟 page producer did not exit cleanly: {join_err}");
        }
    }
}

// 🔁 the producer loop. every early `return` drops `tx`, which is what closes the stream.
async fn produce<R: DnsRecord>(
    client: RepClient,
    endpoint: &'static str,
    filter_param: &'static str,
    filter_value: String,
    max_records: usize,
    tx: Sender<FetchEvent<R>>,
) {
    let mut page_token = String::new();
    let mut spent_tokens: HashSet<String> = HashSet::new();
    let mut pages = 0usize;
    let mut records = 0usize;

    loop {
        let page = match client
            .fetch_page::<R>(endpoint, filter_param, &filter_value, &page_token)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                let _ = tx.send(FetchEvent::Failed(err)).await;
                return;
            }
        };
        pages += 1;
        if !page_token.is_empty() {
            spent_tokens.insert(std::mem::take(&mut page_token));
        }

        for record in page.data {
            if tx.send(FetchEvent::Record(record)).await.is_err() {
                debug!("🚪 consumer hung up after {records} records, producer bowing out");
                return;
            }
            records += 1;
        }

        if !page.pagination.has_more {
            break;
        }
        if max_records > 0 && records >= max_records {
            debug!("🧢 cap of {max_records} reached after {pages} pages, not asking for more");
            break;
        }

        let next = page.pagination.next_page_token;
        if next.is_empty() || spent_tokens.contains(&next) {
            let _ = tx
                .send(FetchEvent::Failed(RepError::CursorStalled {
                    filter: format!("{filter_param}={filter_value}"),
                    token: next,
                }))
                .await;
            return;
        }
        page_token = next;
    }

    let _ = tx.send(FetchEvent::Done { pages, records }).await;
}
