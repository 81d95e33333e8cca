// ── Provider compatibility matrix ──
//
// Static table of per-provider feature support. Translators look up every
// field, operator and action mapping here; a missing entry means the
// provider does not support the feature.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use strum::IntoEnumIterator;

use crate::model::{
    ActionType, ConditionField, ConditionOperator, IpAction, ProviderKind, RuleLogic,
    UnifiedConfig,
};

// ── Features ─────────────────────────────────────────────────────────

/// Rule-level capabilities that are not a field, operator or action.
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
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleFeature {
    Description,
    Priority,
    Categories,
    OrLogic,
    Negation,
    ResponseOverride,
    ActionDuration,
    IpRules,
    IpHostnameScope,
    VersionHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Feature {
    Action(ActionType),
    IpAction(IpAction),
    Field(ConditionField),
    Operator(ConditionOperator),
    Rule(RuleFeature),
}

impl Feature {
    /// Every feature known to the matrix.
    pub fn all() -> Vec<Feature> {
        ActionType::iter()
            .map(Feature::Action)
            .chain(IpAction::iter().map(Feature::IpAction))
            .chain(ConditionField::iter().map(Feature::Field))
            .chain(ConditionOperator::iter().map(Feature::Operator))
            .chain(RuleFeature::iter().map(Feature::Rule))
            .collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(a) => write!(f, "action `{a}`"),
            Self::IpAction(a) => write!(f, "ip action `{a}`"),
            Self::Field(x) => write!(f, "field `{x}`"),
            Self::Operator(o) => write!(f, "operator `{o}`"),
            Self::Rule(r) => write!(f, "{}", r.as_ref().replace('_', " ")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SupportLevel {
    Full,
    Partial,
    NotSupported,
}

/// One matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompatEntry {
    pub feature: Feature,
    pub provider: ProviderKind,
    pub level: SupportLevel,
    /// Native spelling on the provider, where one exists.
    pub native: Option<&'static str>,
    pub notes: &'static str,
    pub limitations: &'static [&'static str],
}

/// Result of a support lookup. Missing entries report `NotSupported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Support {
    pub level: SupportLevel,
    pub native: Option<&'static str>,
    pub notes: &'static str,
    pub limitations: &'static [&'static str],
}

impl Support {
    const UNSUPPORTED: Support = Support {
        level: SupportLevel::NotSupported,
        native: None,
        notes: "",
        limitations: &[],
    };

    pub fn is_supported(&self) -> bool {
        self.level != SupportLevel::NotSupported
    }
}

// ── The table ────────────────────────────────────────────────────────

use ProviderKind::{Cloudflare as CF, Vercel as VC};

const fn full(feature: Feature, provider: ProviderKind, native: &'static str) -> CompatEntry {
    CompatEntry {
        feature,
        provider,
        level: SupportLevel::Full,
        native: Some(native),
        notes: "",
        limitations: &[],
    }
}

const fn partial(
    feature: Feature,
    provider: ProviderKind,
    native: Option<&'static str>,
    notes: &'static str,
    limitations: &'static [&'static str],
) -> CompatEntry {
    CompatEntry {
        feature,
        provider,
        level: SupportLevel::Partial,
        native,
        notes,
        limitations,
    }
}

const fn unsupported(feature: Feature, provider: ProviderKind, notes: &'static str) -> CompatEntry {
    CompatEntry {
        feature,
        provider,
        level: SupportLevel::NotSupported,
        native: None,
        notes,
        limitations: &[],
    }
}

const fn action(a: ActionType) -> Feature {
    Feature::Action(a)
}

const fn field(f: ConditionField) -> Feature {
    Feature::Field(f)
}

const fn op(o: ConditionOperator) -> Feature {
    Feature::Operator(o)
}

const fn rule(r: RuleFeature) -> Feature {
    Feature::Rule(r)
}

/// Order matters for reverse lookups with several partial entries sharing a
/// native name: the earlier entry wins.
static ENTRIES: &[CompatEntry] = &[
    // ── Vercel: actions ──
    full(action(ActionType::Log), VC, "log"),
    full(action(ActionType::Deny), VC, "deny"),
    full(action(ActionType::Challenge), VC, "challenge"),
    full(action(ActionType::Bypass), VC, "bypass"),
    full(action(ActionType::RateLimit), VC, "rate_limit"),
    full(action(ActionType::Redirect), VC, "redirect"),
    partial(
        action(ActionType::Allow),
        VC,
        Some("bypass"),
        "allow is approximated by bypass",
        &["bypass skips the remaining custom rules, not the whole firewall"],
    ),
    partial(
        action(ActionType::Block),
        VC,
        Some("deny"),
        "block is approximated by deny",
        &[],
    ),
    // ── Vercel: IP actions ──
    full(Feature::IpAction(IpAction::Deny), VC, "deny"),
    full(Feature::IpAction(IpAction::Allow), VC, "bypass"),
    // ── Vercel: fields ──
    full(field(ConditionField::Path), VC, "path"),
    full(field(ConditionField::RawPath), VC, "raw_path"),
    full(field(ConditionField::Host), VC, "host"),
    full(field(ConditionField::Method), VC, "method"),
    full(field(ConditionField::IpAddress), VC, "ip_address"),
    full(field(ConditionField::Header), VC, "header"),
    full(field(ConditionField::Query), VC, "query"),
    full(field(ConditionField::Cookie), VC, "cookie"),
    full(field(ConditionField::UserAgent), VC, "user_agent"),
    full(field(ConditionField::GeoCountry), VC, "geo_country"),
    full(field(ConditionField::GeoContinent), VC, "geo_continent"),
    full(field(ConditionField::GeoAsn), VC, "geo_as_number"),
    full(field(ConditionField::Scheme), VC, "scheme"),
    full(field(ConditionField::Ja4Digest), VC, "ja4_digest"),
    full(field(ConditionField::Environment), VC, "environment"),
    unsupported(
        field(ConditionField::Expression),
        VC,
        "raw provider expressions cannot be expressed as Vercel conditions",
    ),
    // ── Vercel: operators ──
    full(op(ConditionOperator::Equals), VC, "eq"),
    full(op(ConditionOperator::Contains), VC, "sub"),
    full(op(ConditionOperator::StartsWith), VC, "pre"),
    full(op(ConditionOperator::EndsWith), VC, "suf"),
    full(op(ConditionOperator::Matches), VC, "re"),
    full(op(ConditionOperator::In), VC, "inc"),
    full(op(ConditionOperator::Exists), VC, "ex"),
    // ── Vercel: rule features ──
    full(rule(RuleFeature::Description), VC, "description"),
    partial(
        rule(RuleFeature::Priority),
        VC,
        None,
        "rules are evaluated in list order",
        &["explicit priority values are not stored"],
    ),
    partial(
        rule(RuleFeature::Categories),
        VC,
        None,
        "categories are local metadata only",
        &["categories are not stored remotely"],
    ),
    full(rule(RuleFeature::OrLogic), VC, "conditionGroup"),
    full(rule(RuleFeature::Negation), VC, "neg"),
    unsupported(
        rule(RuleFeature::ResponseOverride),
        VC,
        "custom block responses are not configurable per rule",
    ),
    full(rule(RuleFeature::ActionDuration), VC, "actionDuration"),
    full(rule(RuleFeature::IpRules), VC, "ips"),
    full(rule(RuleFeature::IpHostnameScope), VC, "hostname"),
    full(rule(RuleFeature::VersionHistory), VC, "version"),
    // ── Cloudflare: actions ──
    full(action(ActionType::Log), CF, "log"),
    full(action(ActionType::Deny), CF, "block"),
    full(action(ActionType::Challenge), CF, "managed_challenge"),
    partial(
        action(ActionType::Bypass),
        CF,
        Some("skip"),
        "bypass is approximated by skipping the remaining custom rules",
        &["managed rules and rate limiting still apply"],
    ),
    partial(
        action(ActionType::Allow),
        CF,
        Some("skip"),
        "allow is approximated by skipping the remaining custom rules",
        &["managed rules and rate limiting still apply"],
    ),
    partial(
        action(ActionType::Block),
        CF,
        Some("block"),
        "block is the same native action as deny",
        &["reads back as deny"],
    ),
    unsupported(
        action(ActionType::RateLimit),
        CF,
        "rate limiting lives in the http_ratelimit phase, not in custom rules",
    ),
    unsupported(
        action(ActionType::Redirect),
        CF,
        "redirects live in the http_request_dynamic_redirect phase",
    ),
    // ── Cloudflare: IP actions ──
    full(Feature::IpAction(IpAction::Deny), CF, "block"),
    full(Feature::IpAction(IpAction::Allow), CF, "whitelist"),
    // ── Cloudflare: fields ──
    full(field(ConditionField::Path), CF, "http.request.uri.path"),
    full(field(ConditionField::RawPath), CF, "raw.http.request.uri.path"),
    full(field(ConditionField::Host), CF, "http.host"),
    full(field(ConditionField::Method), CF, "http.request.method"),
    full(field(ConditionField::IpAddress), CF, "ip.src"),
    full(field(ConditionField::Header), CF, "http.request.headers"),
    full(field(ConditionField::Query), CF, "http.request.uri.args"),
    full(field(ConditionField::Cookie), CF, "http.request.cookies"),
    full(field(ConditionField::UserAgent), CF, "http.user_agent"),
    full(field(ConditionField::GeoCountry), CF, "ip.src.country"),
    full(field(ConditionField::GeoContinent), CF, "ip.src.continent"),
    full(field(ConditionField::GeoAsn), CF, "ip.src.asnum"),
    partial(
        field(ConditionField::Ja4Digest),
        CF,
        Some("cf.bot_management.ja4"),
        "requires Bot Management",
        &["unavailable on plans without Bot Management"],
    ),
    unsupported(
        field(ConditionField::Scheme),
        CF,
        "no direct scheme field; use a raw expression on `ssl`",
    ),
    unsupported(
        field(ConditionField::Environment),
        CF,
        "Cloudflare has no deployment environments",
    ),
    partial(
        field(ConditionField::Expression),
        CF,
        Some("expression"),
        "expressions in the structured subset read back as conditions",
        &[
            "a decomposable expression reads back as structured conditions",
            "mixed with other conditions the rule reads back as one expression",
        ],
    ),
    // ── Cloudflare: operators ──
    full(op(ConditionOperator::Equals), CF, "eq"),
    full(op(ConditionOperator::Contains), CF, "contains"),
    full(op(ConditionOperator::StartsWith), CF, "starts_with"),
    full(op(ConditionOperator::EndsWith), CF, "ends_with"),
    partial(
        op(ConditionOperator::Matches),
        CF,
        Some("matches"),
        "regular expressions require a Business or Enterprise plan",
        &["Rust regex syntax; no lookaround"],
    ),
    full(op(ConditionOperator::In), CF, "in"),
    unsupported(
        op(ConditionOperator::Exists),
        CF,
        "presence checks are not expressible in the supported expression subset",
    ),
    // ── Cloudflare: rule features ──
    partial(
        rule(RuleFeature::Description),
        CF,
        None,
        "the rule description field holds the rule name",
        &["descriptions are dropped"],
    ),
    partial(
        rule(RuleFeature::Priority),
        CF,
        None,
        "rules are evaluated in ruleset order",
        &["explicit priority values are not stored"],
    ),
    partial(
        rule(RuleFeature::Categories),
        CF,
        None,
        "categories are local metadata only",
        &["categories are not stored remotely"],
    ),
    full(rule(RuleFeature::OrLogic), CF, "or"),
    full(rule(RuleFeature::Negation), CF, "not"),
    full(rule(RuleFeature::ResponseOverride), CF, "action_parameters.response"),
    unsupported(
        rule(RuleFeature::ActionDuration),
        CF,
        "custom rules cannot block for a fixed duration",
    ),
    full(rule(RuleFeature::IpRules), CF, "firewall/access_rules"),
    unsupported(
        rule(RuleFeature::IpHostnameScope),
        CF,
        "IP access rules apply to the whole zone or account",
    ),
    unsupported(
        rule(RuleFeature::VersionHistory),
        CF,
        "historical ruleset versions cannot be fetched as a config",
    ),
];

// ── Lookups ──────────────────────────────────────────────────────────

pub fn entries() -> &'static [CompatEntry] {
    ENTRIES
}

fn entry(feature: Feature, provider: ProviderKind) -> Option<&'static CompatEntry> {
    ENTRIES
        .iter()
        .find(|e| e.feature == feature && e.provider == provider)
}

pub fn support(feature: Feature, provider: ProviderKind) -> Support {
    entry(feature, provider).map_or(Support::UNSUPPORTED, |e| Support {
        level: e.level,
        native: e.native,
        notes: e.notes,
        limitations: e.limitations,
    })
}

pub fn is_action_supported(provider: ProviderKind, action: ActionType) -> bool {
    support(Feature::Action(action), provider).is_supported()
}

pub fn is_field_supported(provider: ProviderKind, field: ConditionField) -> bool {
    support(Feature::Field(field), provider).is_supported()
}

pub fn is_operator_supported(provider: ProviderKind, operator: ConditionOperator) -> bool {
    support(Feature::Operator(operator), provider).is_supported()
}

fn native(feature: Feature, provider: ProviderKind) -> Option<&'static str> {
    entry(feature, provider)
        .filter(|e| e.level != SupportLevel::NotSupported)
        .and_then(|e| e.native)
}

pub fn native_action(provider: ProviderKind, action: ActionType) -> Option<&'static str> {
    native(Feature::Action(action), provider)
}

pub fn native_ip_action(provider: ProviderKind, action: IpAction) -> Option<&'static str> {
    native(Feature::IpAction(action), provider)
}

pub fn native_field(provider: ProviderKind, field: ConditionField) -> Option<&'static str> {
    native(Feature::Field(field), provider)
}

pub fn native_operator(provider: ProviderKind, operator: ConditionOperator) -> Option<&'static str> {
    native(Feature::Operator(operator), provider)
}

/// Reverse lookup: the feature whose native spelling is `name`, preferring
/// a `Full` entry over partial ones.
fn reverse(
    provider: ProviderKind,
    name: &str,
    pick: impl Fn(Feature) -> bool,
) -> Option<Feature> {
    let mut candidates = ENTRIES.iter().filter(|e| {
        e.provider == provider
            && e.level != SupportLevel::NotSupported
            && e.native == Some(name)
            && pick(e.feature)
    });
    let first = candidates.next()?;
    if first.level == SupportLevel::Full {
        return Some(first.feature);
    }
    Some(
        candidates
            .find(|e| e.level == SupportLevel::Full)
            .unwrap_or(first)
            .feature,
    )
}

pub fn action_from_native(provider: ProviderKind, name: &str) -> Option<ActionType> {
    match reverse(provider, name, |f| matches!(f, Feature::Action(_)))? {
        Feature::Action(a) => Some(a),
        _ => None,
    }
}

pub fn ip_action_from_native(provider: ProviderKind, name: &str) -> Option<IpAction> {
    match reverse(provider, name, |f| matches!(f, Feature::IpAction(_)))? {
        Feature::IpAction(a) => Some(a),
        _ => None,
    }
}

pub fn field_from_native(provider: ProviderKind, name: &str) -> Option<ConditionField> {
    match reverse(provider, name, |f| matches!(f, Feature::Field(_)))? {
        Feature::Field(x) => Some(x),
        _ => None,
    }
}

pub fn operator_from_native(provider: ProviderKind, name: &str) -> Option<ConditionOperator> {
    match reverse(provider, name, |f| matches!(f, Feature::Operator(_)))? {
        Feature::Operator(o) => Some(o),
        _ => None,
    }
}

/// Features the provider cannot express at all.
pub fn unsupported_features(provider: ProviderKind) -> Vec<Feature> {
    Feature::all()
        .into_iter()
        .filter(|f| !support(*f, provider).is_supported())
        .collect()
}

// ── Reports ──────────────────────────────────────────────────────────

/// Feature classification for moving rules onto `to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub fully_supported: Vec<Feature>,
    pub partially_supported: Vec<Feature>,
    pub not_supported: Vec<Feature>,
    pub warnings: Vec<String>,
}

impl MigrationReport {
    fn classify(features: impl IntoIterator<Item = Feature>, from: ProviderKind, to: ProviderKind) -> Self {
        let mut report = Self::default();
        for feature in features {
            let target = support(feature, to);
            match target.level {
                SupportLevel::Full => report.fully_supported.push(feature),
                SupportLevel::Partial => {
                    let mut warning = format!("{feature} is only partially supported on {to}");
                    if !target.notes.is_empty() {
                        warning.push_str(": ");
                        warning.push_str(target.notes);
                    }
                    report.warnings.push(warning);
                    report.partially_supported.push(feature);
                }
                SupportLevel::NotSupported => {
                    let mut warning = format!("{feature} is not supported on {to}");
                    if !target.notes.is_empty() {
                        warning.push_str(": ");
                        warning.push_str(target.notes);
                    }
                    if support(feature, from).is_supported() {
                        warning.push_str(&format!(" (supported on {from})"));
                    }
                    report.warnings.push(warning);
                    report.not_supported.push(feature);
                }
            }
        }
        report
    }

    /// Nothing is lost.
    pub fn is_lossless(&self) -> bool {
        self.partially_supported.is_empty() && self.not_supported.is_empty()
    }
}

/// Compare every feature `from` supports against `to`.
pub fn migration_report(from: ProviderKind, to: ProviderKind) -> MigrationReport {
    let features = Feature::all()
        .into_iter()
        .filter(|f| support(*f, from).is_supported());
    MigrationReport::classify(features, from, to)
}

/// Features a concrete config relies on.
pub fn features_used(config: &UnifiedConfig) -> BTreeSet<Feature> {
    let mut used = BTreeSet::new();

    for rule in &config.rules {
        used.insert(Feature::Action(rule.action.kind));
        if let Some(exceeded) = rule.action.rate_limit.as_ref().and_then(|r| r.exceeded_action) {
            used.insert(Feature::Action(exceeded));
        }
        if rule.description.as_deref().is_some_and(|d| !d.is_empty()) {
            used.insert(Feature::Rule(RuleFeature::Description));
        }
        if rule.priority.is_some() {
            used.insert(Feature::Rule(RuleFeature::Priority));
        }
        if !rule.categories.is_empty() {
            used.insert(Feature::Rule(RuleFeature::Categories));
        }
        if rule.logic == RuleLogic::Or && rule.conditions.len() > 1 {
            used.insert(Feature::Rule(RuleFeature::OrLogic));
        }
        if rule.action.response.is_some() {
            used.insert(Feature::Rule(RuleFeature::ResponseOverride));
        }
        if rule.action.duration.is_some() {
            used.insert(Feature::Rule(RuleFeature::ActionDuration));
        }
        for condition in &rule.conditions {
            used.insert(Feature::Field(condition.field));
            if condition.field != ConditionField::Expression {
                used.insert(Feature::Operator(condition.operator));
            }
            if condition.negate {
                used.insert(Feature::Rule(RuleFeature::Negation));
            }
        }
    }

    if !config.ips.is_empty() {
        used.insert(Feature::Rule(RuleFeature::IpRules));
    }
    for ip in &config.ips {
        used.insert(Feature::IpAction(ip.action));
        if ip.hostname.is_some() {
            used.insert(Feature::Rule(RuleFeature::IpHostnameScope));
        }
    }

    used
}

/// Pre-flight: classify the features `config` uses against `provider`.
pub fn assess_config(config: &UnifiedConfig, provider: ProviderKind) -> MigrationReport {
    let from = config.provider.unwrap_or(provider);
    MigrationReport::classify(features_used(config), from, provider)
}
