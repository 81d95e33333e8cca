// ── Cloudflare translator ──
//
// Custom rules become ruleset rules whose `expression` is rendered from the
// unified conditions; the rule name is carried in `description`. IP rules
// become IP Access Rules targeting `ip`, `ip6` or `ip_range`.

use std::net::IpAddr;

use doorman_api::cloudflare::types::{
    AccessRule, AccessRuleTarget, ActionParameters, BlockResponse, Rule,
};

use super::expression::{self, is_bare_word, Expr, FieldRef, Literal, Test};
use super::{Ctx, RuleTranslator, Translated};
use crate::compat::{self, Feature, RuleFeature};
use crate::error::CoreError;
use crate::model::ip::normalize_ip;
use crate::model::{
    ActionType, ConditionField, ConditionOperator, ConditionValue, IpAction, ProviderKind,
    ResponseOverride, RuleLogic, UnifiedAction, UnifiedCondition, UnifiedIpRule, UnifiedRule,
};

const PROVIDER: ProviderKind = ProviderKind::Cloudflare;

/// `action_parameters.ruleset` value that skips the rest of the ruleset.
pub const SKIP_CURRENT_RULESET: &str = "current";

/// Access-rule targets that carry an IP address or range.
pub fn is_ip_target(target: &str) -> bool {
    matches!(target, "ip" | "ip6" | "ip_range")
}

pub struct CloudflareTranslator;

impl RuleTranslator for CloudflareTranslator {
    type Rule = Rule;
    type IpRule = AccessRule;

    const PROVIDER: ProviderKind = PROVIDER;

    fn to_unified(native: &Rule) -> Translated<UnifiedRule> {
        let name = if native.description.is_empty() {
            native.id.clone().unwrap_or_default()
        } else {
            native.description.clone()
        };
        let mut ctx = Ctx::new(PROVIDER, &name);
        if native.description.is_empty() {
            ctx.warn("rule has no description, named after its id");
        }

        let kind = match compat::action_from_native(PROVIDER, &native.action) {
            Some(kind) => kind,
            None if native.action.ends_with("challenge") => {
                ctx.warn(format!("action {:?} approximated as challenge", native.action));
                ActionType::Challenge
            }
            None => {
                ctx.warn(format!("unknown action {:?}, treated as log", native.action));
                ActionType::Log
            }
        };

        let mut action = UnifiedAction::new(kind);
        if let Some(ref params) = native.action_parameters {
            action.response = params.response.as_ref().map(|r| ResponseOverride {
                status: r.status_code,
                body: r.content.clone(),
                content_type: r.content_type.clone(),
            });
            if !params.extra.is_empty() {
                let mut keys: Vec<&str> = params.extra.keys().map(String::as_str).collect();
                keys.sort_unstable();
                ctx.warn(format!("action parameters not represented: {}", keys.join(", ")));
            }
        }

        let (conditions, logic) = match expression::parse(&native.expression) {
            Ok(expr) => decompose(&expr),
            Err(_) => None,
        }
        .unwrap_or_else(|| {
            ctx.warn("expression could not be decomposed and is kept verbatim");
            (vec![raw_condition(&native.expression)], RuleLogic::And)
        });

        let rule = UnifiedRule {
            id: native.id.clone(),
            name: name.clone(),
            description: None,
            enabled: native.enabled,
            conditions,
            logic,
            action,
            priority: None,
            categories: Vec::new(),
        };
        ctx.finish(rule)
    }

    fn to_provider(rule: &UnifiedRule) -> Result<Translated<Rule>, CoreError> {
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

        let action = ctx.native(Feature::Action(rule.action.kind))?;
        if rule.action.duration.is_some() {
            ctx.require(Feature::Rule(RuleFeature::ActionDuration))?;
        }

        let mut params = ActionParameters::default();
        if action == "skip" {
            params.ruleset = Some(SKIP_CURRENT_RULESET.to_owned());
        }
        if let Some(ref response) = rule.action.response {
            ctx.require(Feature::Rule(RuleFeature::ResponseOverride))?;
            if action != "block" {
                return Err(ctx.reject("response override requires a blocking action"));
            }
            params.response = Some(BlockResponse {
                status_code: response.status,
                content: response.body.clone(),
                content_type: response.content_type.clone(),
            });
        }
        let action_parameters = (params != ActionParameters::default()).then_some(params);

        let expression = render(rule, &mut ctx)?.to_string();

        Ok(ctx.finish(Rule {
            id: rule.id.clone(),
            action: action.to_owned(),
            expression,
            description: rule.name.clone(),
            enabled: rule.enabled,
            action_parameters,
            version: None,
            last_updated: None,
        }))
    }

    fn ip_to_unified(native: &AccessRule) -> Translated<UnifiedIpRule> {
        let mut ctx = Ctx::new(PROVIDER, &native.configuration.value);
        let action = compat::ip_action_from_native(PROVIDER, &native.mode).unwrap_or_else(|| {
            ctx.warn(format!("access rule mode {:?} treated as deny", native.mode));
            IpAction::Deny
        });
        ctx.finish(UnifiedIpRule {
            id: native.id.clone(),
            ip: native.configuration.value.clone(),
            hostname: None,
            notes: (!native.notes.is_empty()).then(|| native.notes.clone()),
            action,
        })
    }

    fn ip_to_provider(rule: &UnifiedIpRule) -> Result<Translated<AccessRule>, CoreError> {
        let mut ctx = Ctx::new(PROVIDER, &rule.ip);
        let Some(network) = rule.network() else {
            return Err(ctx.reject(format!("invalid IP address or CIDR {:?}", rule.ip)));
        };
        let mode = ctx.native(Feature::IpAction(rule.action))?;
        if rule.hostname.is_some() {
            ctx.require(Feature::Rule(RuleFeature::IpHostnameScope))?;
        }

        let target = match (network.ip(), network.prefix()) {
            (IpAddr::V4(_), 32) => "ip",
            (IpAddr::V6(_), 128) => "ip6",
            (IpAddr::V4(_), 16 | 24) | (IpAddr::V6(_), 32 | 48 | 64) => "ip_range",
            (_, prefix) => {
                return Err(ctx.reject(format!(
                    "/{prefix} ranges are not accepted (IPv4 /16 or /24, IPv6 /32, /48 or /64)"
                )));
            }
        };

        Ok(ctx.finish(AccessRule {
            id: rule.id.clone(),
            mode: mode.to_owned(),
            configuration: AccessRuleTarget {
                target: target.to_owned(),
                value: normalize_ip(&rule.ip),
            },
            notes: rule.notes.clone().unwrap_or_default(),
        }))
    }
}

// ── Rendering ────────────────────────────────────────────────────────

fn raw_condition(expression: &str) -> UnifiedCondition {
    UnifiedCondition::new(
        ConditionField::Expression,
        ConditionOperator::Equals,
        expression,
    )
}

fn render(rule: &UnifiedRule, ctx: &mut Ctx<'_>) -> Result<Expr, CoreError> {
    if let [only] = rule.conditions.as_slice() {
        if only.field == ConditionField::Expression && !only.negate {
            ctx.require(Feature::Field(ConditionField::Expression))?;
            return Ok(Expr::Raw(raw_text(only, ctx)?));
        }
    }
    if rule.conditions.is_empty() {
        return Ok(Expr::True);
    }

    let mut items = Vec::with_capacity(rule.conditions.len());
    for c in &rule.conditions {
        let term = if c.field == ConditionField::Expression {
            ctx.require(Feature::Field(ConditionField::Expression))?;
            Expr::Raw(raw_text(c, ctx)?)
        } else {
            Expr::Test(condition_test(c, ctx)?)
        };
        if c.negate {
            ctx.require(Feature::Rule(RuleFeature::Negation))?;
            items.push(Expr::Not(Box::new(term)));
        } else {
            items.push(term);
        }
    }

    if rule.logic == RuleLogic::Or && items.len() > 1 {
        ctx.require(Feature::Rule(RuleFeature::OrLogic))?;
        Ok(Expr::Or(items))
    } else {
        Ok(Expr::And(items))
    }
}

fn raw_text(c: &UnifiedCondition, ctx: &Ctx<'_>) -> Result<String, CoreError> {
    match c.value {
        Some(ConditionValue::Text(ref text)) if !text.trim().is_empty() => Ok(text.clone()),
        _ => Err(ctx.reject("expression condition without expression text")),
    }
}

fn condition_test(c: &UnifiedCondition, ctx: &mut Ctx<'_>) -> Result<Test, CoreError> {
    let name = ctx.native(Feature::Field(c.field))?;
    let op = ctx.native(Feature::Operator(c.operator))?;

    let key = if c.field.requires_key() {
        let Some(key) = c.key.as_deref() else {
            return Err(ctx.reject(format!("{} condition without a key", c.field)));
        };
        if c.field == ConditionField::Header {
            let lower = key.to_ascii_lowercase();
            if lower != key {
                ctx.warn(format!("header name {key:?} lowercased"));
            }
            Some(lower)
        } else {
            Some(key.to_owned())
        }
    } else {
        None
    };

    let Some(ref value) = c.value else {
        return Err(ctx.reject(format!("{} requires a value", c.operator)));
    };
    let bare = c.field == ConditionField::IpAddress || c.field.is_numeric();
    let scalar = |s: &str| {
        if bare && is_bare_word(s) {
            Literal::Raw(s.to_owned())
        } else {
            Literal::Str(s.to_owned())
        }
    };
    let literal = match (c.operator, value) {
        (ConditionOperator::In, ConditionValue::List(items)) => {
            Literal::Set(items.iter().map(|s| scalar(s.as_str())).collect())
        }
        (ConditionOperator::In, ConditionValue::Text(s)) => Literal::Set(vec![scalar(s)]),
        (ConditionOperator::In, ConditionValue::Number(n)) => {
            Literal::Set(vec![Literal::Raw(n.to_string())])
        }
        (_, ConditionValue::List(_)) => {
            return Err(ctx.reject(format!("{} does not take a list", c.operator)));
        }
        (_, ConditionValue::Text(s)) => scalar(s),
        (_, ConditionValue::Number(n)) => Literal::Raw(n.to_string()),
    };

    Ok(Test {
        field: FieldRef {
            name: name.to_owned(),
            key,
        },
        op: op.to_owned(),
        value: literal,
    })
}

// ── Decomposition ────────────────────────────────────────────────────

/// Flat AND / OR of (possibly negated) comparisons, or `None`.
fn decompose(expr: &Expr) -> Option<(Vec<UnifiedCondition>, RuleLogic)> {
    let mut leaves = Vec::new();
    let logic = match expr {
        Expr::True => return Some((Vec::new(), RuleLogic::And)),
        Expr::And(items) => {
            flatten(items, false, &mut leaves);
            RuleLogic::And
        }
        Expr::Or(items) => {
            flatten(items, true, &mut leaves);
            RuleLogic::Or
        }
        leaf => {
            leaves.push(leaf);
            RuleLogic::And
        }
    };
    let conditions = leaves
        .into_iter()
        .map(|leaf| leaf_condition(leaf, false))
        .collect::<Option<Vec<_>>>()?;
    Some((conditions, logic))
}

fn flatten<'a>(items: &'a [Expr], or: bool, out: &mut Vec<&'a Expr>) {
    for item in items {
        match item {
            Expr::Or(inner) if or => flatten(inner, or, out),
            Expr::And(inner) if !or => flatten(inner, or, out),
            other => out.push(other),
        }
    }
}

fn leaf_condition(expr: &Expr, negate: bool) -> Option<UnifiedCondition> {
    match expr {
        Expr::Not(inner) => leaf_condition(inner, !negate),
        Expr::Test(test) => test_condition(test, negate),
        _ => None,
    }
}

fn test_condition(test: &Test, negate: bool) -> Option<UnifiedCondition> {
    let field = compat::field_from_native(PROVIDER, &test.field.name)
        .filter(|f| *f != ConditionField::Expression)?;
    let (op, negate) = if test.op == "ne" {
        ("eq", !negate)
    } else {
        (test.op.as_str(), negate)
    };
    let operator = compat::operator_from_native(PROVIDER, op)?;
    if field.requires_key() != test.field.key.is_some() {
        return None;
    }

    let text = |lit: &Literal| match lit {
        Literal::Str(s) | Literal::Raw(s) => Some(s.clone()),
        Literal::Set(_) => None,
    };
    let value = match (operator, &test.value) {
        (ConditionOperator::In, Literal::Set(items)) => {
            ConditionValue::List(items.iter().map(text).collect::<Option<Vec<_>>>()?)
        }
        (ConditionOperator::In, _) | (_, Literal::Set(_)) => return None,
        (_, Literal::Str(s)) => ConditionValue::Text(s.clone()),
        (_, Literal::Raw(s)) => s
            .parse::<i64>()
            .map_or_else(|_| ConditionValue::Text(s.clone()), ConditionValue::Number),
    };

    Some(UnifiedCondition {
        field,
        operator,
        value: Some(value),
        negate,
        key: test.field.key.clone(),
    })
}
