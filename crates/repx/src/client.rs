//! # 📡 THE DNS API CLIENT
//!
//! 🎬 COLD OPEN - INT. TERMINAL - 3:47 AM
//!
//! "How many domains ever pointed at 1.1.1.1?" someone asked.
//! The API did not answer with a number. The API answered with a page,
//! a cursor, and the words `has_more: true`. And then it did it again.
//!
//! 🚀 This module speaks HTTP to the DNS-intelligence service. Every request is a GET,
//! every request carries `Authorization: Bearer <key>`, and every paginated request
//! carries `page_size` plus (after the first page) the opaque `page_token` the server
//! handed us last time.
//!
//! 🧠 Knowledge graph:
//! - `fetch_page`: one HTTP round trip → one decoded `Page<R>`. The atom.
//! - `fetch_all`: spawns a producer that walks the cursor forward and hands back a
//!   [`RecordStream`]. `stream_generic` / `stream_typed` are the two shapes built on it.
//! - `fetch_once`: the trial-plan path. One call to `/api/dns`, a plain array back, no paging.
//! - Page size and bearer token are fixed for the client's lifetime.
//!
//! 🔄 This client does not retry. A failed page ends that target's fetch. The worker
//! logs it and moves to the next target. 🦆

mod stream;

use std::time::Duration;

use reqwest::Url;
use tracing::trace;

pub use stream::{FetchEvent, RecordStream};

use crate::common::{DnsRecord, GeoRecord, Page, QueryKind, Record, TypedKind};
use crate::error::RepError;

/// 📡 The generic single-shot endpoint - returns a bare JSON array, no envelope.
pub const SINGLE_SHOT_ENDPOINT: &str = "/api/dns";
/// 📄 The generic paginated endpoint.
pub const PAGING_ENDPOINT: &str = "/api/dns/paging";

/// 📡 The HTTP muscle. Cheap to clone: the inner `reqwest::Client` is an `Arc` in a trench coat,
/// so every stream producer gets its own handle onto the same connection pool.
#[derive(Clone)]
pub struct RepClient {
    http: reqwest::Client,
    base_url: Url,
    page_size: usize,
    api_key: String,
}

// 🔒 hand-rolled Debug so the bearer token never lands in a log line
impl std::fmt::Debug for RepClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepClient")
            .field("base_url", &self.base_url.as_str())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl RepClient {
    /// 🚀 Stand up a client against `api_host` (scheme + host, e.g. `https://api.example.com`).
    ///
    /// 10s to connect, 60s for the whole request. We will wait, but not forever.
    /// The request timeout is the only cancellation this pipeline has, so it had better exist.
    pub fn new(api_host: &str, api_key: impl Into<String>, page_size: usize) -> Result<Self, RepError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RepError::config(format!("the HTTP client refused to be born: {e}")))?;
        Self::with_http_client(http, api_host, api_key, page_size)
    }

    /// 🔧 Same as [`RepClient::new`] but with a caller-provided `reqwest::Client`.
    pub fn with_http_client(
        http: reqwest::Client,
        api_host: &str,
        api_key: impl Into<String>,
        page_size: usize,
    ) -> Result<Self, RepError> {
        let base_url = Url::parse(api_host)
            .map_err(|e| RepError::config(format!("invalid API host '{api_host}': {e}")))?;
        if page_size == 0 {
            return Err(RepError::config("page size must be at least 1"));
        }
        Ok(Self {
            http,
            base_url,
            page_size,
            api_key: api_key.into(),
        })
    }

    /// 📄 Fetch exactly one page. One GET, one decode, zero retries.
    ///
    /// An empty `page_token` means "first page" and the parameter is left off the query.
    pub async fn fetch_page<R: DnsRecord>(
        &self,
        endpoint: &str,
        filter_param: &str,
        filter_value: &str,
        page_token: &str,
    ) -> Result<Page<R>, RepError> {
        let url = self.build_url(endpoint, filter_param, filter_value, Some(page_token));
        let body = self.get_body(url).await?;
        serde_json::from_str(&body).map_err(RepError::Decode)
    }

    /// 🎯 The trial-plan path: one request, whatever the server returns, no pagination.
    ///
    /// A `null` body is how the server says "nothing matched", so it comes back as zero records.
    pub async fn fetch_once(&self, kind: QueryKind, value: &str) -> Result<Vec<Record>, RepError> {
        let url = self.build_url(SINGLE_SHOT_ENDPOINT, kind.as_str(), value, None);
        let body = self.get_body(url).await?;
        let records: Option<Vec<Record>> = serde_json::from_str(&body).map_err(RepError::Decode)?;
        Ok(records.unwrap_or_default())
    }

    /// 🚰 Walk every page for `filter_param=filter_value` on `endpoint`.
    ///
    /// `max_records` > 0 tells the producer to stop requesting new pages once it has
    /// emitted that many records. 0 means "all of them, however many that is".
    pub fn fetch_all<R: DnsRecord>(
        &self,
        endpoint: &'static str,
        filter_param: &'static str,
        filter_value: impl Into<String>,
        max_records: usize,
    ) -> RecordStream<R> {
        RecordStream::spawn(
            self.clone(),
            endpoint,
            filter_param,
            filter_value.into(),
            max_records,
        )
    }

    /// 📦 Generic records from the paging endpoint, filtered by the caller-chosen kind.
    pub fn stream_generic(
        &self,
        kind: QueryKind,
        value: impl Into<String>,
        max_records: usize,
    ) -> RecordStream<Record> {
        self.fetch_all(PAGING_ENDPOINT, kind.as_str(), value, max_records)
    }

    /// 🌍 Typed A/AAAA records. The filter parameter comes from the kind, not the caller.
    pub fn stream_typed(
        &self,
        kind: TypedKind,
        ip: impl Into<String>,
        max_records: usize,
    ) -> RecordStream<GeoRecord> {
        self.fetch_all(kind.endpoint(), kind.filter_param(), ip, max_records)
    }

    // 🔗 `{host}{path}?{param}={value}[&page_size=N][&page_token=T]`
    // page_size rides along only when `page_token` is Some (i.e. on paginated calls).
    fn build_url(&self, path: &str, param: &str, value: &str, page_token: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(param, value);
            if let Some(token) = page_token {
                query.append_pair("page_size", &self.page_size.to_string());
                if !token.is_empty() {
                    query.append_pair("page_token", token);
                }
            }
        }
        url
    }

    async fn get_body(&self, url: Url) -> Result<String, RepError> {
        trace!("📡 GET {}{}", url.path(), url.query().map(|q| format!("?{q}")).unwrap_or_default());
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(RepError::Transport)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            // 💀 read what we can of the body for the postmortem, then bail
            let body = response.text().await.unwrap_or_default();
            return Err(RepError::UpstreamStatus {
                code: status.as_u16(),
                body,
            });
        }
        response.text().await.map_err(RepError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record_json(ip: &str, domain: &str) -> serde_json::Value {
        serde_json::json!({"ip": ip, "domain_id": domain, "record_type": "A", "timestamp": 1})
    }

    #[test]
    fn the_one_where_the_url_only_carries_a_token_when_there_is_one() {
        let client = RepClient::new("https://api.example.com", "k", 50).expect("💀 client");
        let first = client.build_url(PAGING_ENDPOINT, "ip", "1.1.1.1", Some(""));
        assert_eq!(first.path(), "/api/dns/paging");
        assert_eq!(first.query(), Some("ip=1.1.1.1&page_size=50"));

        let next = client.build_url(PAGING_ENDPOINT, "ip", "1.1.1.1", Some("abc"));
        assert_eq!(next.query(), Some("ip=1.1.1.1&page_size=50&page_token=abc"));

        let once = client.build_url(SINGLE_SHOT_ENDPOINT, "ns", "ns1.example.com", None);
        assert_eq!(once.path(), "/api/dns");
        assert_eq!(once.query(), Some("ns=ns1.example.com"));
    }

    #[test]
    fn the_one_where_a_zero_page_size_is_rejected_up_front() {
        assert!(matches!(
            RepClient::new("https://api.example.com", "k", 0),
            Err(RepError::Configuration(_))
        ));
        assert!(matches!(
            RepClient::new("not a url", "k", 10),
            Err(RepError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn the_one_where_fetch_page_sends_the_bearer_and_decodes_the_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .and(header("Authorization", "Bearer sekrit"))
            .and(query_param("ip", "1.1.1.1"))
            .and(query_param("page_size", "2"))
            .and(query_param_is_missing("page_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [record_json("1.1.1.1", "a.example"), record_json("1.1.1.1", "b.example")],
                "pagination": {"page_size": 2, "next_page_token": "abc", "has_more": true}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RepClient::new(&server.uri(), "sekrit", 2).expect("💀 client");
        let page: Page<Record> = client
            .fetch_page(PAGING_ENDPOINT, "ip", "1.1.1.1", "")
            .await
            .expect("💀 page should come back");
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.next_page_token, "abc");
    }

    #[tokio::test]
    async fn the_one_where_a_non_200_becomes_an_upstream_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns/paging"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = RepClient::new(&server.uri(), "k", 10).expect("💀 client");
        let err = client
            .fetch_page::<Record>(PAGING_ENDPOINT, "ip", "1.1.1.1", "")
            .await
            .expect_err("💀 429 is not a success, no matter how politely it is phrased");
        match err {
            RepError::UpstreamStatus { code, body } => {
                assert_eq!(code, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("💀 expected UpstreamStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_a_mangled_body_becomes_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": [oops"))
            .mount(&server)
            .await;

        let client = RepClient::new(&server.uri(), "k", 10).expect("💀 client");
        let err = client
            .fetch_page::<Record>(PAGING_ENDPOINT, "ip", "1.1.1.1", "")
            .await
            .expect_err("💀 that body is not JSON");
        assert!(matches!(err, RepError::Decode(_)));
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_listening_becomes_a_transport_error() {
        // 🕳️ grab a port, then let the server go so the port is (very likely) dead
        let dead_uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let client = RepClient::new(&dead_uri, "k", 10).expect("💀 client");
        let err = client
            .fetch_once(QueryKind::Ip, "1.1.1.1")
            .await
            .expect_err("💀 nobody should be home");
        assert!(matches!(err, RepError::Transport(_)));
    }

    #[tokio::test]
    async fn the_one_where_fetch_once_takes_the_plain_array_and_leaves() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns"))
            .and(query_param("mx", "mail.example.com"))
            .and(query_param_is_missing("page_size"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                record_json("10.0.0.1", "x.example"),
                record_json("10.0.0.2", "y.example"),
                record_json("10.0.0.3", "z.example"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = RepClient::new(&server.uri(), "k", 10).expect("💀 client");
        let records = client
            .fetch_once(QueryKind::Mx, "mail.example.com")
            .await
            .expect("💀 single shot should land");
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].domain_id, "z.example");
    }

    #[tokio::test]
    async fn the_one_where_a_null_body_means_no_matches_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dns"))
            .and(query_param("ip", "203.0.113.9"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RepClient::new(&server.uri(), "k", 10).expect("💀 client");
        let records = client
            .fetch_once(QueryKind::Ip, "203.0.113.9")
            .await
            .expect("💀 null is an empty answer, not a broken one");
        assert!(records.is_empty());
    }
}
