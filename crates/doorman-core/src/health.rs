// ── Health score ──
//
// Heuristic 0..=100 score of a rule set. Shared checks apply to every
// provider; each provider adds its own advisories.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{
    ActionType, ConditionField, ConditionOperator, ConditionValue, ProviderKind, UnifiedConfig,
    UnifiedRule,
};

const EMPTY_PENALTY: u8 = 40;
const NO_RATE_LIMIT_PENALTY: u8 = 15;
const DISABLED_RATIO_PENALTY: u8 = 15;
const DISABLED_RATIO_LIMIT: f64 = 0.5;
const MISSING_DESCRIPTION_PENALTY: u8 = 2;
const MISSING_DESCRIPTION_CAP: u8 = 10;
const LOG_ONLY_PENALTY: u8 = 20;
const DUPLICATE_PENALTY: u8 = 10;
const DUPLICATE_CAP: u8 = 20;
const RAW_EXPRESSION_PENALTY: u8 = 5;
const RAW_EXPRESSION_CAP: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::A,
            80..=89 => Self::B,
            70..=79 => Self::C,
            60..=69 => Self::D,
            _ => Self::F,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthScore {
    pub score: u8,
    pub grade: Grade,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Accumulates deductions while scoring.
struct Scorer {
    score: u8,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

impl Scorer {
    fn deduct(&mut self, points: u8, issue: impl Into<String>) {
        self.score = self.score.saturating_sub(points);
        self.issues.push(issue.into());
    }

    fn recommend(&mut self, text: impl Into<String>) {
        self.recommendations.push(text.into());
    }

    fn finish(self) -> HealthScore {
        HealthScore {
            score: self.score,
            grade: Grade::from_score(self.score),
            issues: self.issues,
            recommendations: self.recommendations,
        }
    }
}

/// Score `config` as it would run on `provider`.
pub fn score(config: &UnifiedConfig, provider: ProviderKind) -> HealthScore {
    let mut scorer = Scorer {
        score: 100,
        issues: Vec::new(),
        recommendations: Vec::new(),
    };

    if config.rules.is_empty() && config.ips.is_empty() {
        scorer.deduct(EMPTY_PENALTY, "no firewall rules configured");
        scorer.recommend("start with a rate limit on sensitive paths and a block for known-bad IPs");
        return scorer.finish();
    }

    shared_checks(config, &mut scorer);
    match provider {
        ProviderKind::Vercel => vercel_checks(config, &mut scorer),
        ProviderKind::Cloudflare => cloudflare_checks(config, &mut scorer),
    }
    scorer.finish()
}

fn shared_checks(config: &UnifiedConfig, scorer: &mut Scorer) {
    let rules = &config.rules;
    let enabled: Vec<&UnifiedRule> = rules.iter().filter(|r| r.enabled).collect();

    if !enabled.iter().any(|r| r.action.kind == ActionType::RateLimit) {
        scorer.deduct(NO_RATE_LIMIT_PENALTY, "no rate limiting rule");
        scorer.recommend("add a rate_limit rule for login and API paths");
    }

    if !rules.is_empty() {
        let disabled = rules.len() - enabled.len();
        #[allow(clippy::cast_precision_loss)]
        let ratio = disabled as f64 / rules.len() as f64;
        if ratio > DISABLED_RATIO_LIMIT {
            scorer.deduct(
                DISABLED_RATIO_PENALTY,
                format!("{disabled} of {} rules are disabled", rules.len()),
            );
            scorer.recommend("delete rules that are no longer needed instead of disabling them");
        }
    }

    let undocumented = rules
        .iter()
        .filter(|r| r.description.as_deref().is_none_or(|d| d.trim().is_empty()))
        .count();
    if undocumented > 0 {
        let points = u8::try_from(undocumented)
            .unwrap_or(u8::MAX)
            .saturating_mul(MISSING_DESCRIPTION_PENALTY)
            .min(MISSING_DESCRIPTION_CAP);
        scorer.deduct(points, format!("{undocumented} rule(s) have no description"));
    }

    if !enabled.is_empty() && enabled.iter().all(|r| r.action.kind == ActionType::Log) {
        scorer.deduct(LOG_ONLY_PENALTY, "every enabled rule only logs");
        scorer.recommend("promote proven log rules to deny or challenge");
    }

    let duplicates = duplicate_groups(rules);
    let mut budget = DUPLICATE_CAP;
    for names in &duplicates {
        let points = DUPLICATE_PENALTY.min(budget);
        budget -= points;
        scorer.deduct(points, format!("rules look duplicated: {}", names.join(", ")));
    }
    if !duplicates.is_empty() {
        scorer.recommend("merge rules with identical conditions and actions");
    }
}

/// Names of rules sharing the same conditions, logic and action.
fn duplicate_groups(rules: &[UnifiedRule]) -> Vec<Vec<String>> {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for rule in rules {
        let Ok(signature) = serde_json::to_string(&(&rule.conditions, rule.logic, &rule.action))
        else {
            continue;
        };
        groups.entry(signature).or_default().push(rule.name.clone());
    }
    let mut duplicates: Vec<Vec<String>> = groups
        .into_values()
        .filter(|names| names.len() > 1)
        .map(|mut names| {
            names.sort();
            names
        })
        .collect();
    duplicates.sort();
    duplicates
}

fn vercel_checks(config: &UnifiedConfig, scorer: &mut Scorer) {
    let has_health_bypass = config.rules.iter().any(|rule| {
        rule.enabled
            && rule.action.kind == ActionType::Bypass
            && rule.conditions.iter().any(|c| {
                c.field == ConditionField::Path
                    && matches!(c.value, Some(ConditionValue::Text(ref p)) if p.contains("health"))
            })
    });
    if !has_health_bypass {
        scorer.recommend("add a bypass rule for health-check paths so uptime probes are never challenged");
    }
}

fn cloudflare_checks(config: &UnifiedConfig, scorer: &mut Scorer) {
    let raw: Vec<&str> = config
        .rules
        .iter()
        .filter(|rule| {
            rule.conditions
                .iter()
                .any(|c| c.field == ConditionField::Expression && c.operator == ConditionOperator::Equals)
        })
        .map(|rule| rule.name.as_str())
        .collect();
    if !raw.is_empty() {
        let points = u8::try_from(raw.len())
            .unwrap_or(u8::MAX)
            .saturating_mul(RAW_EXPRESSION_PENALTY)
            .min(RAW_EXPRESSION_CAP);
        scorer.deduct(
            points,
            format!("raw expressions cannot be checked or migrated: {}", raw.join(", ")),
        );
        scorer.recommend("rewrite raw expressions with structured conditions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RateLimitConfig, UnifiedAction, UnifiedCondition};
    use pretty_assertions::assert_eq;

    fn documented(mut rule: UnifiedRule) -> UnifiedRule {
        rule.description = Some("why".into());
        rule
    }

    fn rate_limited(name: &str) -> UnifiedRule {
        let mut action = UnifiedAction::new(ActionType::RateLimit);
        action.rate_limit = Some(RateLimitConfig {
            window_secs: 60,
            limit: 100,
            keys: Vec::new(),
            algorithm: None,
            exceeded_action: None,
        });
        documented(
            UnifiedRule::new(name, action).with_condition(UnifiedCondition::new(
                ConditionField::Path,
                ConditionOperator::StartsWith,
                "/api",
            )),
        )
    }

    fn health_bypass() -> UnifiedRule {
        documented(UnifiedRule::new("Health", ActionType::Bypass).with_condition(
            UnifiedCondition::new(ConditionField::Path, ConditionOperator::Equals, "/healthz"),
        ))
    }

    #[test]
    fn empty_config_scores_low() {
        let health = score(&UnifiedConfig::default(), ProviderKind::Vercel);
        assert_eq!(health.score, 60);
        assert_eq!(health.grade, Grade::D);
        assert_eq!(health.issues, vec!["no firewall rules configured".to_owned()]);
    }

    #[test]
    fn healthy_vercel_config_is_perfect() {
        let config = UnifiedConfig::default().with_rules(vec![rate_limited("API"), health_bypass()]);
        let health = score(&config, ProviderKind::Vercel);
        assert_eq!(health.score, 100);
        assert_eq!(health.grade, Grade::A);
        assert!(health.recommendations.is_empty());
    }

    #[test]
    fn log_only_and_undocumented_rules_are_penalized() {
        let config = UnifiedConfig::default().with_rules(vec![
            UnifiedRule::new("A", ActionType::Log),
            UnifiedRule::new("B", ActionType::Log).with_condition(UnifiedCondition::new(
                ConditionField::Host,
                ConditionOperator::Equals,
                "x",
            )),
        ]);
        let health = score(&config, ProviderKind::Cloudflare);
        // no rate limit 15, two undocumented 4, log only 20
        assert_eq!(health.score, 61);
        assert_eq!(health.issues.len(), 3);
    }

    #[test]
    fn duplicates_and_disabled_rules() {
        let mut off = rate_limited("Off 1");
        off.enabled = false;
        let mut off2 = rate_limited("Off 2");
        off2.enabled = false;
        let config = UnifiedConfig::default().with_rules(vec![rate_limited("On"), off, off2]);
        let health = score(&config, ProviderKind::Cloudflare);
        // disabled ratio 15, one duplicate group 10
        assert_eq!(health.score, 75);
        assert!(health.issues.iter().any(|i| i.contains("Off 1, Off 2, On")));
    }

    #[test]
    fn cloudflare_flags_raw_expressions() {
        let raw = documented(UnifiedRule::new("Raw", ActionType::Deny).with_condition(
            UnifiedCondition::new(
                ConditionField::Expression,
                ConditionOperator::Equals,
                "cf.threat_score gt 10",
            ),
        ));
        let config = UnifiedConfig::default().with_rules(vec![rate_limited("API"), raw]);
        let health = score(&config, ProviderKind::Cloudflare);
        assert_eq!(health.score, 95);
        assert!(health.issues[0].contains("Raw"));
    }
}
