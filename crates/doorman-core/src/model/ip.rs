// ── IP rule types ──

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IpAction {
    Deny,
    Allow,
}

/// Block or allow traffic from an address or CIDR range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedIpRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// IPv4/IPv6 address, optionally with a prefix length.
    pub ip: String,
    /// Restrict the rule to one hostname; `None` applies everywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub action: IpAction,
}

impl UnifiedIpRule {
    pub fn new(ip: impl Into<String>, action: IpAction) -> Self {
        Self {
            id: None,
            ip: ip.into(),
            hostname: None,
            notes: None,
            action,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Parsed network, `None` if `ip` is not a valid address or CIDR.
    pub fn network(&self) -> Option<IpNetwork> {
        parse_network(&self.ip)
    }

    /// Canonical text of `ip`, used as the reconciliation key.
    ///
    /// Invalid input is returned trimmed but otherwise untouched.
    pub fn normalized_ip(&self) -> String {
        normalize_ip(&self.ip)
    }

    /// Structural equality ignoring `id`, comparing addresses canonically.
    pub fn same_content(&self, other: &Self) -> bool {
        self.normalized_ip() == other.normalized_ip()
            && self.hostname == other.hostname
            && self.notes == other.notes
            && self.action == other.action
    }
}

/// Parse an address or CIDR. The prefix must fit the family's bit width.
pub fn parse_network(raw: &str) -> Option<IpNetwork> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some((addr, prefix)) = raw.split_once('/') {
        let addr: IpAddr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        IpNetwork::new(addr, prefix).ok()
    } else {
        raw.parse::<IpAddr>().ok().map(IpNetwork::from)
    }
}

/// `10.0.0.1/32` and `10.0.0.1` normalize to `10.0.0.1`; IPv6 text is
/// compressed; ranges keep their prefix.
pub fn normalize_ip(raw: &str) -> String {
    match parse_network(raw) {
        Some(net) if net.prefix() == max_prefix(net.ip()) => net.ip().to_string(),
        Some(net) => format!("{}/{}", net.ip(), net.prefix()),
        None => raw.trim().to_owned(),
    }
}

/// Whether `raw` names a single host rather than a range.
pub fn is_single_host(raw: &str) -> bool {
    parse_network(raw).is_some_and(|net| net.prefix() == max_prefix(net.ip()))
}

fn max_prefix(ip: IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_addresses_and_ranges() {
        assert!(parse_network("10.0.0.1").is_some());
        assert!(parse_network("10.0.0.0/8").is_some());
        assert!(parse_network("2001:db8::/32").is_some());
        assert!(parse_network("::1").is_some());
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(parse_network("").is_none());
        assert!(parse_network("10.0.0.256").is_none());
        assert!(parse_network("10.0.0.0/33").is_none());
        assert!(parse_network("2001:db8::/129").is_none());
        assert!(parse_network("example.com").is_none());
        assert!(parse_network("10.0.0.0/").is_none());
    }

    #[test]
    fn normalization_is_canonical() {
        assert_eq!(normalize_ip("10.0.0.1/32"), "10.0.0.1");
        assert_eq!(normalize_ip(" 10.0.0.1 "), "10.0.0.1");
        assert_eq!(normalize_ip("2001:0db8:0000::0001"), "2001:db8::1");
        assert_eq!(normalize_ip("10.1.0.0/16"), "10.1.0.0/16");
        assert_eq!(normalize_ip("nonsense"), "nonsense");
        assert!(is_single_host("::1/128"));
        assert!(!is_single_host("10.0.0.0/24"));
    }

    #[test]
    fn same_content_compares_normalized_ip() {
        let a = UnifiedIpRule::new("10.0.0.1", IpAction::Deny);
        let mut b = UnifiedIpRule::new("10.0.0.1/32", IpAction::Deny);
        b.id = Some("ip1".into());
        assert!(a.same_content(&b));
        assert!(!a.same_content(&b.clone().with_hostname("h")));
    }

    proptest! {
        #[test]
        fn any_ipv4_with_valid_prefix_parses(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>(), prefix in 0u8..=32) {
            let raw = format!("{a}.{b}.{c}.{d}/{prefix}");
            prop_assert!(parse_network(&raw).is_some());
        }

        #[test]
        fn ipv4_prefix_above_32_is_rejected(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>(), prefix in 33u8..=255) {
            let raw = format!("{a}.{b}.{c}.{d}/{prefix}");
            prop_assert!(parse_network(&raw).is_none());
        }
    }
}
