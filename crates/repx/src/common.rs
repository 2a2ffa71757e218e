//! 📦 Common data structures - the building blocks of repx
//!
//! ---
//!
//! 🎬 COLD OPEN - INT. SOC - 3:47 AM
//!
//! An analyst pastes one IP into a terminal. "Who else lives here?" they ask.
//! The API answers in pages. Each page carries records. Each record carries a
//! domain that once pointed at that IP, and a timestamp that says when.
//! Nobody asked how many pages there would be. Nobody ever does.
//!
//! 🦆
//!
//! This module defines the humble, load-bearing shapes that ferry those answers
//! from the wire to the disk: the generic `Record`, the geolocated `GeoRecord`
//! (served by the A/AAAA endpoints), the `Page` envelope that wraps them, and
//! the `QueryKind` / `TypedKind` tags that decide which endpoint gets asked.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::RepError;

// ============================================================
//  🏷️ QueryKind - what flavor of lookup is this target?
// ============================================================

/// 🏷️ The detected lookup category for a target. Also the query parameter name
/// sent to the generic endpoints (`?ip=...`, `?ns=...`, and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Ip,
    Ns,
    Cname,
    Txt,
    Mx,
}

impl QueryKind {
    /// 🎯 Fixed order the single-target selectors are consulted in.
    pub const SELECTOR_ORDER: [QueryKind; 5] = [
        QueryKind::Ip,
        QueryKind::Ns,
        QueryKind::Cname,
        QueryKind::Txt,
        QueryKind::Mx,
    ];

    /// 📡 The query parameter name, exactly as the API spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Ns => "ns",
            Self::Cname => "cname",
            Self::Txt => "txt",
            Self::Mx => "mx",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = RepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "ns" => Ok(Self::Ns),
            "cname" => Ok(Self::Cname),
            "txt" => Ok(Self::Txt),
            "mx" => Ok(Self::Mx),
            other => Err(RepError::config(format!("unknown query kind '{other}'"))),
        }
    }
}

// ============================================================
//  🛰️ TypedKind - the full-detail A/AAAA endpoints
// ============================================================

/// 🛰️ Which full-detail endpoint to page through.
///
/// The filter parameter is welded to the kind: A asks with `ipv4`, AAAA asks with
/// `ipv6`. Callers pick the kind, never the parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedKind {
    A,
    Aaaa,
}

impl TypedKind {
    /// 📡 API path for this record shape
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::A => "/api/dns/a",
            Self::Aaaa => "/api/dns/aaaa",
        }
    }

    /// 🔒 The fixed filter parameter. Not configurable. Not negotiable.
    pub fn filter_param(&self) -> &'static str {
        match self {
            Self::A => "ipv4",
            Self::Aaaa => "ipv6",
        }
    }

    /// 📂 Output file stem: `a.<fmt>` / `aaaa.<fmt>`
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::Aaaa => "aaaa",
        }
    }

    /// 🏷️ What the logs shout
    pub fn label(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for TypedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================
//  📜 DnsRecord - the capability every record shape signs up for
// ============================================================

/// 📜 Anything that can come out of a page envelope and go into an output file.
///
/// The stream producer only needs "decodable", the txt projection only needs
/// "has a domain id". One small trait, implemented by each concrete shape, picked
/// at the call site. No runtime type switches were harmed.
pub trait DnsRecord: DeserializeOwned + Serialize + fmt::Debug + Send + 'static {
    /// 🏷️ The domain identifier, used by the domain-only txt projection.
    fn domain_id(&self) -> &str;
}

/// 📦 The generic record shape served by `/api/dns` and `/api/dns/paging`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    #[serde(deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub domain_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub record_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: i64,
}

impl DnsRecord for Record {
    fn domain_id(&self) -> &str {
        &self.domain_id
    }
}

/// 🌍 The enriched A/AAAA record - same domain, plus where on Earth the IP sleeps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub domain_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub asn: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub asn_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub latlong: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: i64,
}

impl DnsRecord for GeoRecord {
    fn domain_id(&self) -> &str {
        &self.domain_id
    }
}

// ============================================================
//  📄 Page - the paginated envelope
// ============================================================

/// 🔖 Cursor metadata. An empty `next_page_token` means "no cursor".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    #[serde(deserialize_with = "null_as_default")]
    pub page_size: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub next_page_token: String,
    #[serde(deserialize_with = "null_as_default")]
    pub has_more: bool,
}

/// 📄 One page of records plus the breadcrumbs to the next one.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "R: DeserializeOwned"))]
pub struct Page<R> {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<R>,
    pub pagination: Pagination,
}

// 🕳️ `"data": null` shows up when a page is empty. Treat it like `[]`, not a decode failure.
fn null_as_empty<'de, D, R>(deserializer: D) -> Result<Vec<R>, D::Error>
where
    D: Deserializer<'de>,
    R: Deserialize<'de>,
{
    Ok(Option::<Vec<R>>::deserialize(deserializer)?.unwrap_or_default())
}

// 🕳️ same deal for scalar fields: `null` keeps the zero value instead of failing the page.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_page_envelope_decodes_with_its_cursor() {
        let body = r#"{
            "data": [
                {"ip": "1.1.1.1", "domain_id": "one.one", "record_type": "A", "timestamp": 1700000000}
            ],
            "pagination": {"page_size": 100, "next_page_token": "abc", "has_more": true}
        }"#;
        let page: Page<Record> = serde_json::from_str(body).expect("💀 envelope should decode");
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].domain_id(), "one.one");
        assert_eq!(page.pagination.next_page_token, "abc");
        assert!(page.pagination.has_more);
    }

    #[test]
    fn the_one_where_null_data_and_missing_token_mean_nothing_left() {
        let body = r#"{"data": null, "pagination": {"page_size": 100, "has_more": false}}"#;
        let page: Page<GeoRecord> = serde_json::from_str(body).expect("💀 null data is still a page");
        assert!(page.data.is_empty());
        assert!(page.pagination.next_page_token.is_empty());
        assert!(!page.pagination.has_more);
    }

    #[test]
    fn the_one_where_the_envelope_is_missing_its_pagination() {
        let body = r#"{"data": []}"#;
        assert!(serde_json::from_str::<Page<Record>>(body).is_err());
    }

    #[test]
    fn the_one_where_typed_kinds_keep_their_welded_parameters() {
        assert_eq!(TypedKind::A.filter_param(), "ipv4");
        assert_eq!(TypedKind::Aaaa.filter_param(), "ipv6");
        assert_eq!(TypedKind::A.endpoint(), "/api/dns/a");
        assert_eq!(TypedKind::Aaaa.endpoint(), "/api/dns/aaaa");
    }

    #[test]
    fn the_one_where_query_kinds_parse_and_display_symmetrically() {
        for kind in QueryKind::SELECTOR_ORDER {
            let parsed: QueryKind = kind.as_str().parse().expect("💀 round trip");
            assert_eq!(parsed, kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert!("aaaa".parse::<QueryKind>().is_err());
    }

    #[test]
    fn the_one_where_null_fields_fall_back_to_zero_values() {
        let body = r#"{
            "data": [
                {"ip": "1.1.1.1", "domain_id": "one.one", "record_type": null, "timestamp": null}
            ],
            "pagination": {"page_size": null, "next_page_token": null, "has_more": false}
        }"#;
        let page: Page<Record> = serde_json::from_str(body).expect("💀 nulls are not a reason to lose a page");
        assert_eq!(page.data[0].domain_id, "one.one");
        assert_eq!(page.data[0].record_type, "");
        assert_eq!(page.data[0].timestamp, 0);
        assert!(page.pagination.next_page_token.is_empty());

        let geo: GeoRecord =
            serde_json::from_str(r#"{"domain_id": "x.example", "asn": null, "city": null}"#).expect("💀 geo");
        assert_eq!(geo.asn, 0);
        assert_eq!(geo.city, "");
    }
}
