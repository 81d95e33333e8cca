// ── Unified custom rule types ──
//
// Provider-neutral representation of a firewall rule. Local config files
// store rules in this shape; translators convert to and from each
// provider's native schema.

use std::fmt;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

// ── Enumerations ─────────────────────────────────────────────────────

/// Request attribute a condition inspects.
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
pub enum ConditionField {
    Path,
    RawPath,
    Host,
    Method,
    IpAddress,
    Header,
    Query,
    Cookie,
    UserAgent,
    GeoCountry,
    GeoContinent,
    GeoAsn,
    Scheme,
    Ja4Digest,
    Environment,
    /// Raw provider expression that could not be decomposed.
    Expression,
}

impl ConditionField {
    /// Header, query and cookie conditions name the entry they inspect.
    pub const fn requires_key(self) -> bool {
        matches!(self, Self::Header | Self::Query | Self::Cookie)
    }

    /// Fields whose values are numbers rather than strings.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::GeoAsn)
    }
}

/// Comparison applied to a field.
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
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    /// Regular-expression match.
    Matches,
    /// Set membership; value is a list.
    In,
    /// Presence check; takes no value.
    Exists,
}

/// How a rule's conditions combine.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleLogic {
    #[default]
    And,
    Or,
}

impl RuleLogic {
    #[allow(clippy::trivially_copy_pass_by_ref)]
    fn is_and(&self) -> bool {
        *self == Self::And
    }
}

/// What happens when a rule matches.
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
pub enum ActionType {
    Log,
    Deny,
    Challenge,
    Bypass,
    RateLimit,
    Redirect,
    Allow,
    Block,
}

// ── Conditions ───────────────────────────────────────────────────────

/// Condition operand: a string, an integer, or a homogeneous string list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Text(String),
    Number(i64),
    List(Vec<String>),
}

impl ConditionValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for ConditionValue {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub negate: bool,
    /// Header / query / cookie name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl UnifiedCondition {
    pub fn new(field: ConditionField, operator: ConditionOperator, value: impl Into<ConditionValue>) -> Self {
        Self {
            field,
            operator,
            value: Some(value.into()),
            negate: false,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

// ── Actions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub limit: u64,
    /// Request attributes the counter is keyed on, e.g. `ip`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exceeded_action: Option<ActionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub location: String,
    #[serde(default)]
    pub permanent: bool,
}

/// Custom response returned by blocking actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOverride {
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "text/plain".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseOverride>,
    /// Temporary-block duration, e.g. `"1h"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl UnifiedAction {
    pub fn new(kind: ActionType) -> Self {
        Self {
            kind,
            rate_limit: None,
            redirect: None,
            response: None,
            duration: None,
        }
    }
}

impl From<ActionType> for UnifiedAction {
    fn from(kind: ActionType) -> Self {
        Self::new(kind)
    }
}

// ── Rule ─────────────────────────────────────────────────────────────

/// A provider-neutral custom firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedRule {
    /// Provider-assigned identifier; absent for rules not yet synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<UnifiedCondition>,
    #[serde(default, skip_serializing_if = "RuleLogic::is_and")]
    pub logic: RuleLogic,
    pub action: UnifiedAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl UnifiedRule {
    /// Enabled rule with AND logic and no conditions.
    pub fn new(name: impl Into<String>, action: impl Into<UnifiedAction>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            enabled: true,
            conditions: Vec::new(),
            logic: RuleLogic::And,
            action: action.into(),
            priority: None,
            categories: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: UnifiedCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_logic(mut self, logic: RuleLogic) -> Self {
        self.logic = logic;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Structural equality ignoring `id`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.enabled == other.enabled
            && self.conditions == other.conditions
            && self.logic == other.logic
            && self.action == other.action
            && self.priority == other.priority
            && self.categories == other.categories
    }
}
