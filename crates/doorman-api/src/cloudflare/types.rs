//! Wire types for the Cloudflare Rulesets and IP Access Rules APIs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase holding user-defined WAF custom rules.
pub const CUSTOM_RULES_PHASE: &str = "http_request_firewall_custom";

// ── Envelope ─────────────────────────────────────────────────────────

/// Standard Cloudflare v4 response envelope.
///
/// ```json
/// { "success": true, "errors": [], "messages": [], "result": {...} }
/// ```
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ResponseMessage>,
    #[serde(default)]
    pub messages: Vec<ResponseMessage>,
    pub result: Option<T>,
    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

/// Pagination block of list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub total_pages: u32,
}

// ── Rulesets ─────────────────────────────────────────────────────────

/// A ruleset, as returned by get/create and by every rule mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `zone`, `root`, `custom`, `managed`.
    pub kind: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Entry of `GET .../rulesets` (no rules attached).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesetSummary {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub phase: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of `POST .../rulesets`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRuleset {
    pub name: String,
    pub description: String,
    pub kind: String,
    pub phase: String,
    pub rules: Vec<Rule>,
}

// ── Rules ────────────────────────────────────────────────────────────

/// A ruleset rule. `description` carries the human-readable rule name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `block`, `challenge`, `managed_challenge`, `js_challenge`, `log`, `skip`.
    pub action: String,
    /// Wirefilter expression.
    pub expression: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_parameters: Option<ActionParameters>,
    #[serde(default, skip_serializing)]
    pub version: Option<String>,
    #[serde(default, skip_serializing)]
    pub last_updated: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParameters {
    /// Custom block response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<BlockResponse>,
    /// `skip` action: `"current"` skips the rest of the ruleset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<String>,
    /// Anything else (phases, products, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResponse {
    pub status_code: u16,
    pub content: String,
    pub content_type: String,
}

// ── IP access rules ──────────────────────────────────────────────────

/// `block`, `challenge`, `whitelist`, `js_challenge`, `managed_challenge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub mode: String,
    pub configuration: AccessRuleTarget,
    #[serde(default)]
    pub notes: String,
}

/// `{ "target": "ip" | "ip6" | "ip_range", "value": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRuleTarget {
    pub target: String,
    pub value: String,
}

/// Body of `PATCH .../firewall/access_rules/rules/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessRuleUpdate {
    pub mode: String,
    pub notes: String,
}
