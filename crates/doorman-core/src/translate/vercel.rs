// ── Vercel translator ──
//
// Conditions live in `conditionGroup`: groups are OR-ed, conditions inside
// a group are AND-ed. AND logic renders as one group, OR logic as one
// group per condition.

use doorman_api::vercel::types::{
    Condition, ConditionGroup, CustomRule, IpRule, Mitigation, RateLimit, Redirect, RuleAction,
};

use super::{value_from_json, value_to_json, Ctx, RuleTranslator, Translated};
use crate::compat::{self, Feature, RuleFeature};
use crate::error::CoreError;
use crate::model::{
    ActionType, IpAction, ProviderKind, RateLimitConfig, RedirectConfig, RuleLogic,
    UnifiedAction, UnifiedCondition, UnifiedIpRule, UnifiedRule,
};

const PROVIDER: ProviderKind = ProviderKind::Vercel;

/// Hostname Vercel uses for "every domain of the project".
pub const ANY_HOST: &str = "*";

/// Canonical rule id Vercel derives from a rule name:
/// `"Block Admin"` becomes `rule_block_admin`.
pub fn canonical_rule_id(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    format!("rule_{slug}")
}

pub struct VercelTranslator;

impl RuleTranslator for VercelTranslator {
    type Rule = CustomRule;
    type IpRule = IpRule;

    const PROVIDER: ProviderKind = PROVIDER;

    fn to_unified(native: &CustomRule) -> Translated<UnifiedRule> {
        let mut ctx = Ctx::new(PROVIDER, &native.name);

        let groups = &native.condition_group;
        let logic = if groups.len() > 1 && groups.iter().all(|g| g.conditions.len() == 1) {
            RuleLogic::Or
        } else {
            if groups.len() > 1 {
                ctx.warn("mixed condition groups flattened to AND");
            }
            RuleLogic::And
        };
        let conditions = groups
            .iter()
            .flat_map(|g| &g.conditions)
            .filter_map(|c| condition_to_unified(c, &mut ctx))
            .collect();

        let action = match native.action.mitigate {
            Some(ref m) => action_to_unified(m, &mut ctx),
            None => {
                ctx.warn("rule has no mitigation, treated as log");
                UnifiedAction::new(ActionType::Log)
            }
        };

        let rule = UnifiedRule {
            id: native.id.clone(),
            name: native.name.clone(),
            description: (!native.description.is_empty()).then(|| native.description.clone()),
            enabled: native.active,
            conditions,
            logic,
            action,
            priority: None,
            categories: Vec::new(),
        };
        ctx.finish(rule)
    }

    fn to_provider(rule: &UnifiedRule) -> Result<Translated<CustomRule>, CoreError> {
        let mut ctx = Ctx::new(PROVIDER, &rule.name);

        if rule.description.as_deref().is_some_and(|d| !d.is_empty()) {
            ctx.require(Feature::Rule(RuleFeature::Description))?;
        }
        if rule.priority.is_some() {
            ctx.require(Feature::Rule(RuleFeature::Priority))?;
        }
        if !rule.categories.is_empty() {
            ctx.require(Feature::Rule(RuleFeature::Categories))?;
        }

        let mut conditions = Vec::with_capacity(rule.conditions.len());
        for c in &rule.conditions {
            conditions.push(condition_to_native(c, &mut ctx)?);
        }
        let condition_group = if conditions.is_empty() {
            Vec::new()
        } else if rule.logic == RuleLogic::Or && conditions.len() > 1 {
            ctx.require(Feature::Rule(RuleFeature::OrLogic))?;
            conditions
                .into_iter()
                .map(|c| ConditionGroup {
                    conditions: vec![c],
                })
                .collect()
        } else {
            vec![ConditionGroup { conditions }]
        };

        let mitigate = action_to_native(&rule.action, &mut ctx)?;

        let native = CustomRule {
            id: rule.id.clone(),
            name: rule.name.clone(),
            description: rule.description.clone().unwrap_or_default(),
            active: rule.enabled,
            condition_group,
            action: RuleAction {
                mitigate: Some(mitigate),
            },
        };
        Ok(ctx.finish(native))
    }

    fn ip_to_unified(native: &IpRule) -> Translated<UnifiedIpRule> {
        let mut ctx = Ctx::new(PROVIDER, &native.ip);
        let action = compat::ip_action_from_native(PROVIDER, &native.action).unwrap_or_else(|| {
            ctx.warn(format!("unknown IP action {:?}, treated as deny", native.action));
            IpAction::Deny
        });
        let hostname = match native.hostname.trim() {
            "" | ANY_HOST => None,
            host => Some(host.to_owned()),
        };
        ctx.finish(UnifiedIpRule {
            id: native.id.clone(),
            ip: native.ip.clone(),
            hostname,
            notes: native.notes.clone().filter(|n| !n.is_empty()),
            action,
        })
    }

    fn ip_to_provider(rule: &UnifiedIpRule) -> Result<Translated<IpRule>, CoreError> {
        let mut ctx = Ctx::new(PROVIDER, &rule.ip);
        if rule.network().is_none() {
            return Err(ctx.reject(format!("invalid IP address or CIDR {:?}", rule.ip)));
        }
        let action = ctx.native(Feature::IpAction(rule.action))?;
        if rule.hostname.is_some() {
            ctx.require(Feature::Rule(RuleFeature::IpHostnameScope))?;
        }
        Ok(ctx.finish(IpRule {
            id: rule.id.clone(),
            hostname: rule.hostname.clone().unwrap_or_else(|| ANY_HOST.to_owned()),
            ip: rule.ip.trim().to_owned(),
            notes: rule.notes.clone(),
            action: action.to_owned(),
        }))
    }
}

// ── Conditions ───────────────────────────────────────────────────────

fn condition_to_native(c: &UnifiedCondition, ctx: &mut Ctx<'_>) -> Result<Condition, CoreError> {
    let kind = ctx.native(Feature::Field(c.field))?;
    let op = ctx.native(Feature::Operator(c.operator))?;
    if c.negate {
        ctx.require(Feature::Rule(RuleFeature::Negation))?;
    }
    Ok(Condition {
        kind: kind.to_owned(),
        op: op.to_owned(),
        neg: c.negate,
        key: c.key.clone(),
        value: c.value.as_ref().map(value_to_json),
    })
}

fn condition_to_unified(c: &Condition, ctx: &mut Ctx<'_>) -> Option<UnifiedCondition> {
    let Some(field) = compat::field_from_native(PROVIDER, &c.kind) else {
        ctx.warn(format!("unknown condition type {:?} skipped", c.kind));
        return None;
    };
    let Some(operator) = compat::operator_from_native(PROVIDER, &c.op) else {
        ctx.warn(format!("unknown operator {:?} on {field} skipped", c.op));
        return None;
    };
    let value = c.value.as_ref().and_then(|v| value_from_json(v, ctx));
    Some(UnifiedCondition {
        field,
        operator,
        value,
        negate: c.neg,
        key: c.key.clone(),
    })
}

// ── Actions ──────────────────────────────────────────────────────────

fn action_to_native(action: &UnifiedAction, ctx: &mut Ctx<'_>) -> Result<Mitigation, CoreError> {
    let name = ctx.native(Feature::Action(action.kind))?;

    if action.response.is_some() {
        ctx.require(Feature::Rule(RuleFeature::ResponseOverride))?;
    }
    if action.duration.is_some() {
        ctx.require(Feature::Rule(RuleFeature::ActionDuration))?;
    }

    let rate_limit = match action.rate_limit {
        Some(ref rl) => {
            let exceeded = match rl.exceeded_action {
                Some(a) => Some(ctx.native(Feature::Action(a))?.to_owned()),
                None => None,
            };
            Some(RateLimit {
                algo: rl.algorithm.clone(),
                window: rl.window_secs,
                limit: rl.limit,
                keys: rl.keys.clone(),
                action: exceeded,
            })
        }
        None => None,
    };

    Ok(Mitigation {
        action: name.to_owned(),
        rate_limit,
        redirect: action.redirect.as_ref().map(|r| Redirect {
            location: r.location.clone(),
            permanent: r.permanent,
        }),
        action_duration: action.duration.clone(),
    })
}

fn action_to_unified(m: &Mitigation, ctx: &mut Ctx<'_>) -> UnifiedAction {
    let kind = compat::action_from_native(PROVIDER, &m.action).unwrap_or_else(|| {
        ctx.warn(format!("unknown action {:?}, treated as log", m.action));
        ActionType::Log
    });

    let rate_limit = m.rate_limit.as_ref().map(|rl| RateLimitConfig {
        window_secs: rl.window,
        limit: rl.limit,
        keys: rl.keys.clone(),
        algorithm: rl.algo.clone(),
        exceeded_action: rl.action.as_deref().and_then(|a| {
            let mapped = compat::action_from_native(PROVIDER, a);
            if mapped.is_none() {
                ctx.warn(format!("unknown rate limit action {a:?} dropped"));
            }
            mapped
        }),
    });

    UnifiedAction {
        kind,
        rate_limit,
        redirect: m.redirect.as_ref().map(|r| RedirectConfig {
            location: r.location.clone(),
            permanent: r.permanent,
        }),
        response: None,
        duration: m.action_duration.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ConditionField, ConditionOperator, ConditionValue, ResponseOverride};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn block_admin() -> UnifiedRule {
        UnifiedRule::new("Block Admin", ActionType::Deny).with_condition(UnifiedCondition::new(
            ConditionField::Path,
            ConditionOperator::StartsWith,
            "/admin",
        ))
    }

    #[test]
    fn canonical_ids() {
        assert_eq!(canonical_rule_id("Block Admin"), "rule_block_admin");
        assert_eq!(canonical_rule_id("  API -- limit!! v2 "), "rule_api_limit_v2");
        assert_eq!(canonical_rule_id("already_snake"), "rule_already_snake");
    }

    #[test]
    fn and_logic_renders_one_group() {
        let rule = block_admin().with_condition(
            UnifiedCondition::new(ConditionField::Header, ConditionOperator::Equals, "1")
                .with_key("x-debug")
                .negated(),
        );
        let native = VercelTranslator::to_provider(&rule).unwrap();
        assert!(native.warnings.is_empty());
        assert_eq!(
            serde_json::to_value(&native.value).unwrap(),
            json!({
                "name": "Block Admin",
                "active": true,
                "conditionGroup": [{ "conditions": [
                    { "type": "path", "op": "pre", "value": "/admin" },
                    { "type": "header", "op": "eq", "neg": true, "key": "x-debug", "value": "1" }
                ]}],
                "action": { "mitigate": { "action": "deny" } }
            })
        );
    }

    #[test]
    fn or_logic_renders_one_group_per_condition() {
        let rule = block_admin()
            .with_condition(UnifiedCondition::new(
                ConditionField::Path,
                ConditionOperator::StartsWith,
                "/wp-admin",
            ))
            .with_logic(RuleLogic::Or);
        let native = VercelTranslator::to_provider(&rule).unwrap().value;
        assert_eq!(native.condition_group.len(), 2);

        let back = VercelTranslator::to_unified(&native);
        assert!(back.warnings.is_empty());
        assert_eq!(back.value, rule);
    }

    #[test]
    fn mixed_groups_flatten_to_and_with_warning() {
        let native: CustomRule = serde_json::from_value(json!({
            "id": "rule_mixed",
            "name": "Mixed",
            "conditionGroup": [
                { "conditions": [
                    { "type": "path", "op": "eq", "value": "/a" },
                    { "type": "method", "op": "eq", "value": "POST" }
                ]},
                { "conditions": [{ "type": "path", "op": "eq", "value": "/b" }] }
            ],
            "action": { "mitigate": { "action": "challenge" } }
        }))
        .unwrap();

        let back = VercelTranslator::to_unified(&native);
        assert_eq!(back.value.logic, RuleLogic::And);
        assert_eq!(back.value.conditions.len(), 3);
        assert_eq!(back.value.action.kind, ActionType::Challenge);
        assert_eq!(back.warnings.len(), 1);
        assert!(back.warnings[0].contains("flattened"));
    }

    #[test]
    fn unknown_native_constructs_warn() {
        let native: CustomRule = serde_json::from_value(json!({
            "name": "Odd",
            "conditionGroup": [{ "conditions": [
                { "type": "bot_name", "op": "eq", "value": "x" },
                { "type": "path", "op": "gte", "value": "/" },
                { "type": "geo_as_number", "op": "eq", "value": 13335 }
            ]}],
            "action": { "mitigate": { "action": "quarantine" } }
        }))
        .unwrap();

        let back = VercelTranslator::to_unified(&native);
        assert_eq!(
            back.value.conditions,
            vec![UnifiedCondition::new(
                ConditionField::GeoAsn,
                ConditionOperator::Equals,
                ConditionValue::Number(13_335)
            )]
        );
        assert_eq!(back.value.action.kind, ActionType::Log);
        assert_eq!(back.warnings.len(), 3);
    }

    #[test]
    fn partial_and_unsupported_features() {
        let mut rule = block_admin();
        rule.action = UnifiedAction::new(ActionType::Allow);
        rule.categories = vec!["ops".into()];
        let native = VercelTranslator::to_provider(&rule).unwrap();
        assert_eq!(native.value.action.mitigate.unwrap().action, "bypass");
        assert_eq!(native.warnings.len(), 2);

        let mut rule = block_admin();
        rule.action.response = Some(ResponseOverride {
            status: 403,
            body: "no".into(),
            content_type: "text/plain".into(),
        });
        let err = VercelTranslator::to_provider(&rule).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Translation { ref rule, provider: ProviderKind::Vercel, .. } if rule == "Block Admin"
        ));
    }

    #[test]
    fn rate_limit_payload_round_trips() {
        let rule = UnifiedRule {
            action: UnifiedAction {
                rate_limit: Some(RateLimitConfig {
                    window_secs: 60,
                    limit: 100,
                    keys: vec!["ip".into()],
                    algorithm: Some("fixed_window".into()),
                    exceeded_action: Some(ActionType::Deny),
                }),
                duration: Some("1h".into()),
                ..UnifiedAction::new(ActionType::RateLimit)
            },
            ..block_admin()
        };
        let native = VercelTranslator::to_provider(&rule).unwrap().value;
        assert_eq!(
            serde_json::to_value(&native.action).unwrap(),
            json!({ "mitigate": {
                "action": "rate_limit",
                "rateLimit": { "algo": "fixed_window", "window": 60, "limit": 100, "keys": ["ip"], "action": "deny" },
                "actionDuration": "1h"
            }})
        );
        assert_eq!(VercelTranslator::to_unified(&native).value, rule);
    }

    #[test]
    fn ip_rules_map_wildcard_hostname() {
        let ip = UnifiedIpRule::new("10.0.0.0/8", IpAction::Allow);
        let native = VercelTranslator::ip_to_provider(&ip).unwrap().value;
        assert_eq!(native.hostname, "*");
        assert_eq!(native.action, "bypass");
        assert_eq!(VercelTranslator::ip_to_unified(&native).value, ip);

        let scoped = UnifiedIpRule::new("10.0.0.1", IpAction::Deny).with_hostname("h");
        let native = VercelTranslator::ip_to_provider(&scoped).unwrap().value;
        assert_eq!(native.hostname, "h");

        assert!(VercelTranslator::ip_to_provider(&UnifiedIpRule::new("nope", IpAction::Deny)).is_err());
    }

    #[test]
    fn unknown_ip_action_defaults_to_deny() {
        let native = IpRule {
            id: Some("ip1".into()),
            hostname: String::new(),
            ip: "10.0.0.1".into(),
            notes: None,
            action: "challenge".into(),
        };
        let back = VercelTranslator::ip_to_unified(&native);
        assert_eq!(back.value.action, IpAction::Deny);
        assert_eq!(back.value.hostname, None);
        assert_eq!(back.warnings.len(), 1);
    }

    // ── Round-trip property ──

    fn arb_condition() -> impl Strategy<Value = UnifiedCondition> {
        use strum::IntoEnumIterator;
        let fields: Vec<ConditionField> = ConditionField::iter()
            .filter(|f| *f != ConditionField::Expression)
            .collect();
        let ops: Vec<ConditionOperator> = ConditionOperator::iter().collect();
        (
            proptest::sample::select(fields),
            proptest::sample::select(ops),
            "[a-z0-9/_.-]{1,12}",
            proptest::collection::vec("[A-Z]{1,6}", 1..4),
            any::<i64>(),
            any::<bool>(),
            "[a-z][a-z0-9-]{0,8}",
        )
            .prop_map(|(field, operator, text, list, number, negate, key)| {
                let value = match operator {
                    ConditionOperator::Exists => None,
                    ConditionOperator::In => Some(ConditionValue::List(list)),
                    _ if field.is_numeric() => Some(ConditionValue::Number(number)),
                    _ => Some(ConditionValue::Text(text)),
                };
                UnifiedCondition {
                    field,
                    operator,
                    value,
                    negate,
                    key: field.requires_key().then_some(key),
                }
            })
    }

    fn arb_rule() -> impl Strategy<Value = UnifiedRule> {
        let actions = vec![
            ActionType::Log,
            ActionType::Deny,
            ActionType::Challenge,
            ActionType::Bypass,
        ];
        (
            "[A-Za-z][A-Za-z0-9 ]{0,20}",
            proptest::option::of("[a-z ]{1,20}"),
            any::<bool>(),
            proptest::collection::vec(arb_condition(), 1..5),
            any::<bool>(),
            proptest::sample::select(actions),
            proptest::option::of("[1-9][0-9]?[smhd]"),
        )
            .prop_map(|(name, description, enabled, conditions, or, kind, duration)| {
                let logic = if or && conditions.len() > 1 {
                    RuleLogic::Or
                } else {
                    RuleLogic::And
                };
                UnifiedRule {
                    id: None,
                    name,
                    description,
                    enabled,
                    conditions,
                    logic,
                    action: UnifiedAction {
                        duration,
                        ..UnifiedAction::new(kind)
                    },
                    priority: None,
                    categories: Vec::new(),
                }
            })
    }

    proptest! {
        #[test]
        fn full_support_rules_round_trip(rule in arb_rule()) {
            let native = VercelTranslator::to_provider(&rule).unwrap();
            prop_assert!(native.warnings.is_empty());
            let back = VercelTranslator::to_unified(&native.value);
            prop_assert!(back.warnings.is_empty());
            prop_assert_eq!(back.value, rule);
        }
    }
}
