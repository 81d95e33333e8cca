// ── Rule translation ──
//
// Bidirectional mapping between the unified model and each provider's
// native schema. Every field, operator and action name comes from the
// compatibility matrix; partial mappings emit warnings and unsupported
// constructs are rejected.

pub mod cloudflare;
pub mod expression;
pub mod vercel;

use serde_json::Value;

use crate::compat::{self, Feature, SupportLevel};
use crate::error::CoreError;
use crate::model::{ConditionValue, ProviderKind, UnifiedIpRule, UnifiedRule};

pub use cloudflare::CloudflareTranslator;
pub use vercel::{canonical_rule_id, VercelTranslator};

/// A translated value plus the lossy-conversion warnings it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Translated<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Translated<U> {
        Translated {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// Per-provider translation contract. Pure functions of their input.
pub trait RuleTranslator {
    type Rule: Clone;
    type IpRule: Clone;

    const PROVIDER: ProviderKind;

    fn to_unified(native: &Self::Rule) -> Translated<UnifiedRule>;

    fn to_provider(rule: &UnifiedRule) -> Result<Translated<Self::Rule>, CoreError>;

    fn ip_to_unified(native: &Self::IpRule) -> Translated<UnifiedIpRule>;

    fn ip_to_provider(rule: &UnifiedIpRule) -> Result<Translated<Self::IpRule>, CoreError>;
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Tracks warnings while translating one rule and enforces the matrix.
pub(crate) struct Ctx<'a> {
    provider: ProviderKind,
    subject: &'a str,
    warnings: Vec<String>,
}

impl<'a> Ctx<'a> {
    pub(crate) fn new(provider: ProviderKind, subject: &'a str) -> Self {
        Self {
            provider,
            subject,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn warn(&mut self, message: impl AsRef<str>) {
        self.warnings
            .push(format!("{:?}: {}", self.subject, message.as_ref()));
    }

    pub(crate) fn reject(&self, construct: impl Into<String>) -> CoreError {
        CoreError::Translation {
            rule: self.subject.to_owned(),
            construct: construct.into(),
            provider: self.provider,
        }
    }

    /// Require `feature`; warn when support is partial. Returns the native
    /// spelling, if the matrix has one.
    pub(crate) fn require(&mut self, feature: Feature) -> Result<Option<&'static str>, CoreError> {
        let support = compat::support(feature, self.provider);
        match support.level {
            SupportLevel::Full => Ok(support.native),
            SupportLevel::Partial => {
                let mut message = format!("{feature} is approximated");
                if !support.notes.is_empty() {
                    message = format!("{message} ({})", support.notes);
                }
                self.warn(message);
                Ok(support.native)
            }
            SupportLevel::NotSupported => {
                let mut construct = format!("{feature} is not supported");
                if !support.notes.is_empty() {
                    construct = format!("{construct} ({})", support.notes);
                }
                Err(self.reject(construct))
            }
        }
    }

    /// Like [`Ctx::require`] but the native name must exist.
    pub(crate) fn native(&mut self, feature: Feature) -> Result<&'static str, CoreError> {
        self.require(feature)?
            .ok_or_else(|| self.reject(format!("{feature} has no native equivalent")))
    }

    pub(crate) fn finish<T>(self, value: T) -> Translated<T> {
        Translated::with_warnings(value, self.warnings)
    }
}

pub(crate) fn value_to_json(value: &ConditionValue) -> Value {
    match value {
        ConditionValue::Text(s) => Value::from(s.as_str()),
        ConditionValue::Number(n) => Value::from(*n),
        ConditionValue::List(items) => Value::from(items.clone()),
    }
}

/// Convert a native JSON operand. Non-string scalars inside lists and
/// non-integer numbers are stringified with a warning.
pub(crate) fn value_from_json(value: &Value, ctx: &mut Ctx<'_>) -> Option<ConditionValue> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(ConditionValue::Text(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ConditionValue::Number(i)),
            None => {
                ctx.warn(format!("non-integer value {n} kept as text"));
                Some(ConditionValue::Text(n.to_string()))
            }
        },
        Value::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => list.push(s.clone()),
                    other => {
                        ctx.warn(format!("list item {other} kept as text"));
                        list.push(other.to_string());
                    }
                }
            }
            Some(ConditionValue::List(list))
        }
        other => {
            ctx.warn(format!("value {other} kept as text"));
            Some(ConditionValue::Text(other.to_string()))
        }
    }
}
