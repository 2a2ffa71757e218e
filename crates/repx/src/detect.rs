//! 🧭 TypeDetector - "what even IS this string?"
//!
//! 🎬 *[a line from a target list walks in. it could be an IP. it could be a mail server.
//! it could be a typo. the detector squints.]*
//!
//! Classification priority, first match wins, no fallback:
//! 1. parses as a literal IP address → `ip` (pure parsing, no network)
//! 2. an NS lookup succeeds → `ns`
//! 3. a CNAME lookup succeeds, or the name resolves to addresses at all → `cname`
//! 4. a TXT lookup succeeds → `txt`
//! 5. an MX lookup succeeds → `mx`
//! 6. otherwise → `None`. The caller skips the target and warns. The run carries on.
//!
//! ⚠️ COST: for anything that is not an IP, classification is a live DNS probe, up to five
//! round trips, and it runs once per target BEFORE any API fetch. A list of ten thousand
//! hostnames is also ten to fifty thousand DNS queries. Budget accordingly.
//!
//! 🧠 Knowledge graph: the probes sit behind the [`DnsProbe`] trait so the priority logic
//! can be exercised without the internet. Production uses [`HickoryProbe`]. 🦆

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use tracing::{debug, trace};

use crate::common::QueryKind;

/// 🔎 One DNS record family the detector can ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Ns,
    Cname,
    Txt,
    Mx,
}

impl ProbeKind {
    // 🎯 probe order, highest priority first
    const PRIORITY: [(ProbeKind, QueryKind); 4] = [
        (ProbeKind::Ns, QueryKind::Ns),
        (ProbeKind::Cname, QueryKind::Cname),
        (ProbeKind::Txt, QueryKind::Txt),
        (ProbeKind::Mx, QueryKind::Mx),
    ];

    fn record_type(&self) -> RecordType {
        match self {
            Self::Ns => RecordType::NS,
            Self::Cname => RecordType::CNAME,
            Self::Txt => RecordType::TXT,
            Self::Mx => RecordType::MX,
        }
    }
}

/// 📡 "Does `name` have at least one record of this kind?" Any failure counts as no.
#[async_trait]
pub trait DnsProbe: std::fmt::Debug + Send + Sync {
    async fn resolves(&self, name: &str, kind: ProbeKind) -> bool;
}

/// 🧭 The production probe, backed by hickory's tokio resolver.
#[derive(Clone)]
pub struct HickoryProbe {
    resolver: TokioAsyncResolver,
}

impl std::fmt::Debug for HickoryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryProbe").finish_non_exhaustive()
    }
}

impl HickoryProbe {
    /// 🔧 Use the system resolver config (`/etc/resolv.conf` and friends), falling back to
    /// hickory's defaults when the system config cannot be read.
    pub fn from_system() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|err| {
            debug!("🧭 system resolver config unavailable ({err}), using hickory defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }
}

#[async_trait]
impl DnsProbe for HickoryProbe {
    async fn resolves(&self, name: &str, kind: ProbeKind) -> bool {
        let answer: Vec<RecordType> = match self.resolver.lookup(name, kind.record_type()).await {
            Ok(lookup) => lookup.record_iter().map(|record| record.record_type()).collect(),
            Err(err) => {
                trace!("🔎 {:?} probe for '{}' came back empty: {}", kind, name, err);
                Vec::new()
            }
        };
        if answer_matches(kind, &answer) {
            return true;
        }
        falls_back_to_address(kind) && self.resolves_to_address(name).await
    }
}

impl HickoryProbe {
    async fn resolves_to_address(&self, name: &str) -> bool {
        match self.resolver.lookup_ip(name).await {
            Ok(ips) => ips.iter().next().is_some(),
            Err(err) => {
                trace!("🔎 address probe for '{}' came back empty: {}", name, err);
                false
            }
        }
    }
}

// 🎯 only records of the asked-for type count. a CNAME picked up while chasing an NS is not an NS.
fn answer_matches(kind: ProbeKind, answer: &[RecordType]) -> bool {
    answer.contains(&kind.record_type())
}

// 🧭 a host with only A/AAAA records still counts as a cname target
fn falls_back_to_address(kind: ProbeKind) -> bool {
    kind == ProbeKind::Cname
}

/// 🧭 Classifies raw targets into a [`QueryKind`]. Cheap to clone, shared by every worker.
#[derive(Debug, Clone)]
pub struct TypeDetector {
    probe: Arc<dyn DnsProbe>,
}

impl TypeDetector {
    pub fn new(probe: impl DnsProbe + 'static) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    /// 🧭 The real thing: hickory against the system resolver.
    pub fn system() -> Self {
        Self::new(HickoryProbe::from_system())
    }

    /// 🎯 First match wins. Lower-priority probes never run once a higher one matched.
    pub async fn classify(&self, target: &str) -> Option<QueryKind> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        if target.parse::<IpAddr>().is_ok() {
            return Some(QueryKind::Ip);
        }
        for (probe_kind, query_kind) in ProbeKind::PRIORITY {
            if self.probe.resolves(target, probe_kind).await {
                return Some(query_kind);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 🎭 A probe that answers from a script and writes down every question it was asked.
    #[derive(Debug, Default, Clone)]
    struct ScriptedProbe {
        answers_yes_to: Vec<ProbeKind>,
        asked: Arc<Mutex<Vec<ProbeKind>>>,
    }

    #[async_trait]
    impl DnsProbe for ScriptedProbe {
        async fn resolves(&self, _name: &str, kind: ProbeKind) -> bool {
            self.asked.lock().expect("💀 poisoned").push(kind);
            self.answers_yes_to.contains(&kind)
        }
    }

    fn scripted(yes: &[ProbeKind]) -> ScriptedProbe {
        ScriptedProbe {
            answers_yes_to: yes.to_vec(),
            asked: Arc::default(),
        }
    }

    #[tokio::test]
    async fn the_one_where_an_ip_wins_before_any_dns_is_asked() {
        // 🧪 the probe would happily say "yes, NS" - it must not even get the question
        let probe = scripted(&[ProbeKind::Ns, ProbeKind::Mx]);
        let asked = probe.asked.clone();
        let detector = TypeDetector::new(probe);

        assert_eq!(detector.classify("1.1.1.1").await, Some(QueryKind::Ip));
        assert_eq!(detector.classify("  2606:4700::1111 ").await, Some(QueryKind::Ip));
        assert!(asked.lock().expect("💀 poisoned").is_empty(), "no probes for literal IPs");
    }

    #[tokio::test]
    async fn the_one_where_ns_outranks_everything_below_it() {
        let probe = scripted(&[ProbeKind::Ns, ProbeKind::Cname, ProbeKind::Txt, ProbeKind::Mx]);
        let asked = probe.asked.clone();
        let detector = TypeDetector::new(probe);

        assert_eq!(detector.classify("example.com").await, Some(QueryKind::Ns));
        assert_eq!(*asked.lock().expect("💀 poisoned"), vec![ProbeKind::Ns]);
    }

    #[tokio::test]
    async fn the_one_where_mx_is_the_last_resort() {
        let probe = scripted(&[ProbeKind::Mx]);
        let asked = probe.asked.clone();
        let detector = TypeDetector::new(probe);

        assert_eq!(detector.classify("mail.example.com").await, Some(QueryKind::Mx));
        assert_eq!(
            *asked.lock().expect("💀 poisoned"),
            vec![ProbeKind::Ns, ProbeKind::Cname, ProbeKind::Txt, ProbeKind::Mx]
        );
    }

    #[tokio::test]
    async fn the_one_where_nothing_resolves_and_the_target_is_unclassifiable() {
        let detector = TypeDetector::new(scripted(&[]));
        assert_eq!(detector.classify("definitely-not-a-domain.invalid").await, None);
        assert_eq!(detector.classify("   ").await, None);
    }

    #[test]
    fn the_one_where_only_the_asked_for_record_type_counts() {
        assert!(answer_matches(ProbeKind::Ns, &[RecordType::NS, RecordType::NS]));
        assert!(answer_matches(ProbeKind::Mx, &[RecordType::CNAME, RecordType::MX]));
        assert!(!answer_matches(ProbeKind::Ns, &[RecordType::CNAME]));
        assert!(!answer_matches(ProbeKind::Txt, &[]));
    }

    /// 🎭 Resolves like a host with A records and nothing else: no NS, no CNAME, no TXT, no MX.
    #[derive(Debug)]
    struct AddressOnlyHost;

    #[async_trait]
    impl DnsProbe for AddressOnlyHost {
        async fn resolves(&self, _name: &str, kind: ProbeKind) -> bool {
            answer_matches(kind, &[RecordType::A]) || falls_back_to_address(kind)
        }
    }

    #[test]
    fn the_one_where_only_the_cname_step_settles_for_addresses() {
        assert!(falls_back_to_address(ProbeKind::Cname));
        assert!(!falls_back_to_address(ProbeKind::Ns));
        assert!(!falls_back_to_address(ProbeKind::Txt));
        assert!(!falls_back_to_address(ProbeKind::Mx));
    }

    #[tokio::test]
    async fn the_one_where_an_address_only_host_lands_on_cname() {
        let detector = TypeDetector::new(AddressOnlyHost);
        assert_eq!(detector.classify("api.example.com").await, Some(QueryKind::Cname));
    }
}
