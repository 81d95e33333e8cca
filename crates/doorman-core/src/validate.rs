// ── Config validation ──
//
// One pass over a `UnifiedConfig` producing every issue, tagged with a
// JSON-ish path and a severity. Structural checks always run; provider
// checks run against the compatibility matrix when a provider is given.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::compat::{self, Feature, RuleFeature, SupportLevel};
use crate::model::{
    ActionType, ConditionField, ConditionOperator, ConditionValue, ProviderKind, RuleLogic,
    UnifiedCondition, UnifiedConfig, UnifiedIpRule, UnifiedRule, MIN_SCHEMA_VERSION,
    SCHEMA_VERSION,
};
use crate::model::ip::parse_network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Location in the config, e.g. `rules[2].conditions[0].value`.
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.message, self.severity)
    }
}

/// Outcome of [`validate`]. `valid` is false iff any issue is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = issues.iter().all(|i| i.severity != Severity::Error);
        Self { valid, issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Error-level issues, for `CoreError::Validation`.
    pub fn into_errors(self) -> Vec<ValidationIssue> {
        self.issues
            .into_iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }
}

// ── Validator ────────────────────────────────────────────────────────

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue::new(path, message, Severity::Error));
    }

    fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0
            .push(ValidationIssue::new(path, message, Severity::Warning));
    }
}

/// Validate `config`; with `provider`, also check matrix support.
pub fn validate(config: &UnifiedConfig, provider: Option<ProviderKind>) -> ValidationResult {
    let mut issues = Issues::default();

    if !(MIN_SCHEMA_VERSION..=SCHEMA_VERSION).contains(&config.schema_version) {
        issues.error(
            "schemaVersion",
            format!(
                "unsupported schema version {} (expected {MIN_SCHEMA_VERSION}..={SCHEMA_VERSION})",
                config.schema_version
            ),
        );
    }
    if let (Some(pinned), Some(target)) = (config.provider, provider) {
        if pinned != target {
            issues.warning(
                "provider",
                format!("config is pinned to {pinned} but is being validated for {target}"),
            );
        }
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    for (i, rule) in config.rules.iter().enumerate() {
        let path = format!("rules[{i}]");
        let name = rule.name.trim();
        if name.is_empty() {
            issues.error(format!("{path}.name"), "rule name must not be empty");
        } else if let Some(first) = names.insert(name, i) {
            issues.error(
                format!("{path}.name"),
                format!("duplicate rule name {name:?} (also rules[{first}])"),
            );
        }
        check_rule(rule, &path, &mut issues);
        if let Some(provider) = provider {
            check_rule_support(rule, &path, provider, &mut issues);
        }
    }

    let mut seen_ips: HashMap<String, usize> = HashMap::new();
    for (i, ip) in config.ips.iter().enumerate() {
        let path = format!("ips[{i}]");
        check_ip(ip, &path, &mut issues);
        // One rule per address; the hostname is content, not identity.
        if ip.network().is_some() {
            if let Some(first) = seen_ips.insert(ip.normalized_ip(), i) {
                let message = if config.ips[first].hostname == ip.hostname {
                    format!("duplicate IP rule for {} (also ips[{first}])", ip.ip)
                } else {
                    format!(
                        "IP {} is already scoped to another hostname in ips[{first}]",
                        ip.ip
                    )
                };
                issues.error(format!("{path}.ip"), message);
            }
        }
        if let Some(provider) = provider {
            check_ip_support(ip, &path, provider, &mut issues);
        }
    }

    ValidationResult::from_issues(issues.0)
}

fn check_rule(rule: &UnifiedRule, path: &str, issues: &mut Issues) {
    if rule.conditions.is_empty() {
        issues.error(format!("{path}.conditions"), "rule must have at least one condition");
    }
    if rule.description.as_deref().is_some_and(|d| d.trim().is_empty()) {
        issues.warning(format!("{path}.description"), "description is blank");
    }
    if rule.logic == RuleLogic::Or && rule.conditions.len() < 2 {
        issues.warning(format!("{path}.logic"), "OR logic with fewer than two conditions");
    }
    for (j, condition) in rule.conditions.iter().enumerate() {
        check_condition(condition, &format!("{path}.conditions[{j}]"), issues);
    }

    let action = &rule.action;
    let apath = format!("{path}.action");
    match action.kind {
        ActionType::RateLimit => match action.rate_limit {
            None => issues.error(
                format!("{apath}.rateLimit"),
                "rate_limit action requires rateLimit settings",
            ),
            Some(ref rl) => {
                if rl.window_secs == 0 {
                    issues.error(format!("{apath}.rateLimit.windowSecs"), "must be greater than 0");
                }
                if rl.limit == 0 {
                    issues.error(format!("{apath}.rateLimit.limit"), "must be greater than 0");
                }
                if matches!(rl.exceeded_action, Some(ActionType::RateLimit | ActionType::Redirect)) {
                    issues.error(
                        format!("{apath}.rateLimit.exceededAction"),
                        "exceeded action must be a terminal action",
                    );
                }
            }
        },
        ActionType::Redirect => match action.redirect {
            Some(ref r) if !r.location.trim().is_empty() => {}
            _ => issues.error(
                format!("{apath}.redirect.location"),
                "redirect action requires a location",
            ),
        },
        _ => {}
    }
    if action.rate_limit.is_some() && action.kind != ActionType::RateLimit {
        issues.warning(format!("{apath}.rateLimit"), "ignored unless the action is rate_limit");
    }
    if action.redirect.is_some() && action.kind != ActionType::Redirect {
        issues.warning(format!("{apath}.redirect"), "ignored unless the action is redirect");
    }
    if let Some(ref response) = action.response {
        if !matches!(action.kind, ActionType::Deny | ActionType::Block) {
            issues.error(
                format!("{apath}.response"),
                "response override requires a deny or block action",
            );
        }
        if !(100..=599).contains(&response.status) {
            issues.error(
                format!("{apath}.response.status"),
                format!("invalid HTTP status {}", response.status),
            );
        }
    }
    if action.duration.as_deref().is_some_and(|d| d.trim().is_empty()) {
        issues.error(format!("{apath}.duration"), "duration must not be blank");
    }
}

fn check_condition(c: &UnifiedCondition, path: &str, issues: &mut Issues) {
    if c.field == ConditionField::Expression {
        match c.value {
            Some(ConditionValue::Text(ref s)) if !s.trim().is_empty() => {}
            _ => issues.error(format!("{path}.value"), "expression condition requires expression text"),
        }
        return;
    }

    if c.field.requires_key() {
        if c.key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            issues.error(format!("{path}.key"), format!("{} conditions require a key", c.field));
        }
    } else if c.key.is_some() {
        issues.warning(format!("{path}.key"), format!("key is ignored for {} conditions", c.field));
    }

    let vpath = format!("{path}.value");
    match (c.operator, &c.value) {
        (ConditionOperator::Exists, None) => {}
        (ConditionOperator::Exists, Some(_)) => {
            issues.error(vpath, "exists takes no value");
        }
        (_, None) => issues.error(vpath, format!("{} requires a value", c.operator)),
        (ConditionOperator::In, Some(ConditionValue::List(items))) => {
            if items.is_empty() {
                issues.error(vpath, "in requires a non-empty list");
            }
        }
        (ConditionOperator::In, Some(_)) => issues.error(vpath, "in requires a list value"),
        (op, Some(ConditionValue::List(_))) => {
            issues.error(vpath, format!("{op} requires a single value, not a list"));
        }
        (_, Some(ConditionValue::Number(_))) if !c.field.is_numeric() => {
            issues.error(vpath, format!("{} takes a string value", c.field));
        }
        (ConditionOperator::Equals, Some(ConditionValue::Text(s))) if c.field.is_numeric() => {
            if s.parse::<i64>().is_err() {
                issues.error(vpath, format!("{} takes a number", c.field));
            }
        }
        (ConditionOperator::Matches, Some(ConditionValue::Text(s))) if s.is_empty() => {
            issues.error(vpath, "regular expression must not be empty");
        }
        _ => {}
    }

    if c.field == ConditionField::IpAddress && c.operator == ConditionOperator::Equals {
        if let Some(ConditionValue::Text(ref ip)) = c.value {
            if parse_network(ip).is_none() {
                issues.error(format!("{path}.value"), format!("invalid IP address or CIDR {ip:?}"));
            }
        }
    }
}

fn check_ip(ip: &UnifiedIpRule, path: &str, issues: &mut Issues) {
    if ip.network().is_none() {
        issues.error(format!("{path}.ip"), format!("invalid IP address or CIDR {:?}", ip.ip));
    }
    if ip.hostname.as_deref().is_some_and(|h| h.trim().is_empty()) {
        issues.warning(format!("{path}.hostname"), "blank hostname applies to all hosts");
    }
}

// ── Provider support ─────────────────────────────────────────────────

fn check_feature(
    feature: Feature,
    provider: ProviderKind,
    path: String,
    issues: &mut Issues,
) {
    let support = compat::support(feature, provider);
    let suffix = if support.notes.is_empty() {
        String::new()
    } else {
        format!(": {}", support.notes)
    };
    match support.level {
        SupportLevel::Full => {}
        SupportLevel::Partial => {
            issues.warning(path, format!("{feature} is only partially supported on {provider}{suffix}"));
        }
        SupportLevel::NotSupported => {
            issues.error(path, format!("{feature} is not supported on {provider}{suffix}"));
        }
    }
}

fn check_rule_support(rule: &UnifiedRule, path: &str, provider: ProviderKind, issues: &mut Issues) {
    check_feature(
        Feature::Action(rule.action.kind),
        provider,
        format!("{path}.action.type"),
        issues,
    );
    if rule.description.as_deref().is_some_and(|d| !d.is_empty()) {
        check_feature(
            Feature::Rule(RuleFeature::Description),
            provider,
            format!("{path}.description"),
            issues,
        );
    }
    if rule.priority.is_some() {
        check_feature(
            Feature::Rule(RuleFeature::Priority),
            provider,
            format!("{path}.priority"),
            issues,
        );
    }
    if rule.logic == RuleLogic::Or && rule.conditions.len() > 1 {
        check_feature(
            Feature::Rule(RuleFeature::OrLogic),
            provider,
            format!("{path}.logic"),
            issues,
        );
    }
    if rule.action.response.is_some() {
        check_feature(
            Feature::Rule(RuleFeature::ResponseOverride),
            provider,
            format!("{path}.action.response"),
            issues,
        );
    }
    if rule.action.duration.is_some() {
        check_feature(
            Feature::Rule(RuleFeature::ActionDuration),
            provider,
            format!("{path}.action.duration"),
            issues,
        );
    }
    for (j, c) in rule.conditions.iter().enumerate() {
        let cpath = format!("{path}.conditions[{j}]");
        check_feature(Feature::Field(c.field), provider, format!("{cpath}.field"), issues);
        if c.field != ConditionField::Expression {
            check_feature(
                Feature::Operator(c.operator),
                provider,
                format!("{cpath}.operator"),
                issues,
            );
        }
        if c.negate {
            check_feature(
                Feature::Rule(RuleFeature::Negation),
                provider,
                format!("{cpath}.negate"),
                issues,
            );
        }
    }
}

fn check_ip_support(ip: &UnifiedIpRule, path: &str, provider: ProviderKind, issues: &mut Issues) {
    check_feature(Feature::IpAction(ip.action), provider, format!("{path}.action"), issues);
    if ip.hostname.is_some() {
        check_feature(
            Feature::Rule(RuleFeature::IpHostnameScope),
            provider,
            format!("{path}.hostname"),
            issues,
        );
    }
}
