//! Wire types for the Vercel Firewall API.
//!
//! Field names use camelCase via `#[serde(rename_all = "camelCase")]`.
//! Optional fields are skipped on serialization so a locally rendered rule
//! compares equal to the same rule fetched from the API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

// ── Firewall config ──────────────────────────────────────────────────

/// Firewall configuration of a project.
///
/// From `GET /v1/security/firewall/config/{active|version}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// ISO 8601 date-time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default = "default_true")]
    pub firewall_enabled: bool,
    #[serde(default)]
    pub rules: Vec<CustomRule>,
    #[serde(default)]
    pub ips: Vec<IpRule>,
    /// Managed rulesets, CRS settings and other fields not modeled here.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// The config endpoints answer either `{ "active": {...} }` or the bare
/// config object depending on the route.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ConfigResponse {
    Wrapped { active: FirewallConfig },
    Bare(FirewallConfig),
}

impl ConfigResponse {
    pub(crate) fn into_config(self) -> FirewallConfig {
        match self {
            Self::Wrapped { active } | Self::Bare(active) => active,
        }
    }
}

/// Body of `PUT /v1/security/firewall/config` (full replacement).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallConfigUpdate {
    pub firewall_enabled: bool,
    pub rules: Vec<CustomRule>,
    pub ips: Vec<IpRule>,
}

// ── Custom rules ─────────────────────────────────────────────────────

/// A custom firewall rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Groups are OR-ed; conditions within a group are AND-ed.
    #[serde(default)]
    pub condition_group: Vec<ConditionGroup>,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A single match condition, e.g. `{"type":"path","op":"pre","value":"/admin"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field: `path`, `host`, `header`, `geo_country`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Operator: `eq`, `sub`, `pre`, `suf`, `re`, `inc`, `ex`, ...
    pub op: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub neg: bool,
    /// Header / query / cookie name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigate: Option<Mitigation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mitigation {
    /// `log`, `deny`, `challenge`, `bypass`, `rate_limit`, `redirect`.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
    /// Persistent-action duration, e.g. `"1h"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// `fixed_window` or `token_bucket`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algo: Option<String>,
    /// Window in seconds.
    pub window: u64,
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// Action once the limit is exceeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub location: String,
    #[serde(default)]
    pub permanent: bool,
}

// ── IP rules ─────────────────────────────────────────────────────────

/// IP blocking / allow rule. `hostname` of `"*"` applies to every domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub hostname: String,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// `deny`, `challenge`, `log` or `bypass`.
    pub action: String,
}

// ── PATCH actions ────────────────────────────────────────────────────

/// A discrete change sent to `PATCH /v1/security/firewall/config`.
#[derive(Debug, Clone, PartialEq)]
pub enum FirewallPatch {
    InsertRule(CustomRule),
    UpdateRule { id: String, rule: CustomRule },
    RemoveRule { id: String },
    InsertIp(IpRule),
    UpdateIp { id: String, rule: IpRule },
    RemoveIp { id: String },
}

impl FirewallPatch {
    /// Wire name of the action, e.g. `rules.insert`.
    pub fn action(&self) -> &'static str {
        match self {
            Self::InsertRule(_) => "rules.insert",
            Self::UpdateRule { .. } => "rules.update",
            Self::RemoveRule { .. } => "rules.remove",
            Self::InsertIp(_) => "ip.insert",
            Self::UpdateIp { .. } => "ip.update",
            Self::RemoveIp { .. } => "ip.remove",
        }
    }

    /// Request body: `{ "action": ..., "id"?: ..., "value"?: ... }`.
    pub fn to_body(&self) -> Result<Value, serde_json::Error> {
        let mut body = serde_json::Map::new();
        body.insert("action".into(), Value::from(self.action()));

        match self {
            Self::InsertRule(rule) => {
                body.insert("value".into(), serde_json::to_value(rule)?);
            }
            Self::InsertIp(rule) => {
                body.insert("value".into(), serde_json::to_value(rule)?);
            }
            Self::UpdateRule { id, rule } => {
                body.insert("id".into(), Value::from(id.as_str()));
                body.insert("value".into(), serde_json::to_value(rule)?);
            }
            Self::UpdateIp { id, rule } => {
                body.insert("id".into(), Value::from(id.as_str()));
                body.insert("value".into(), serde_json::to_value(rule)?);
            }
            Self::RemoveRule { id } | Self::RemoveIp { id } => {
                body.insert("id".into(), Value::from(id.as_str()));
            }
        }

        Ok(Value::Object(body))
    }
}
