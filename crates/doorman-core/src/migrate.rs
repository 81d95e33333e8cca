// ── Provider migration ──
//
// Converts a config for another provider. Rules and IP rules are rendered
// with the target translator and read back, so the result holds exactly what
// the target can store. Whatever the target rejects is dropped with a
// warning.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::compat::{self, MigrationReport};
use crate::model::{
    MigrationInfo, ProviderKind, UnifiedConfig, UnifiedIpRule, UnifiedRule, VercelSection,
    SCHEMA_VERSION,
};
use crate::translate::{CloudflareTranslator, RuleTranslator, VercelTranslator};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Migration {
    pub config: UnifiedConfig,
    /// Feature classification of the source config against the target.
    pub report: MigrationReport,
    /// Names of rules and addresses of IP rules that were dropped.
    pub dropped: Vec<String>,
    pub warnings: Vec<String>,
}

/// Convert `config` (written for `from`) into a config for `to`.
pub fn migrate(config: &UnifiedConfig, from: ProviderKind, to: ProviderKind) -> Migration {
    let report = compat::assess_config(config, to);
    let outcome = match to {
        ProviderKind::Vercel => convert::<VercelTranslator>(config),
        ProviderKind::Cloudflare => convert::<CloudflareTranslator>(config),
    };
    let Converted {
        rules,
        ips,
        dropped,
        warnings,
    } = outcome;

    let mut migrated = UnifiedConfig::for_provider(to)
        .with_rules(rules)
        .with_ips(ips);
    migrated.providers = config.providers.clone();
    if config.is_legacy_shape() && migrated.providers.vercel.is_none() {
        let (project_id, team_id) = config.vercel_ids();
        migrated.providers.vercel = Some(VercelSection {
            project_id: project_id.map(str::to_owned),
            team_id: team_id.map(str::to_owned),
        });
    }
    migrated.schema_version = SCHEMA_VERSION;
    migrated.migration = Some(MigrationInfo {
        from,
        to,
        at: Utc::now(),
        warnings: warnings.clone(),
    });

    for name in &dropped {
        warn!(%from, %to, entry = %name, "dropped during migration");
    }
    info!(
        %from,
        %to,
        rules = migrated.rules.len(),
        ips = migrated.ips.len(),
        dropped = dropped.len(),
        "migrated config"
    );

    Migration {
        config: migrated,
        report,
        dropped,
        warnings,
    }
}

struct Converted {
    rules: Vec<UnifiedRule>,
    ips: Vec<UnifiedIpRule>,
    dropped: Vec<String>,
    warnings: Vec<String>,
}

fn convert<T: RuleTranslator>(config: &UnifiedConfig) -> Converted {
    let mut out = Converted {
        rules: Vec::new(),
        ips: Vec::new(),
        dropped: Vec::new(),
        warnings: Vec::new(),
    };

    for rule in &config.rules {
        match T::to_provider(rule) {
            Ok(native) => {
                out.warnings.extend(native.warnings);
                let mut converted = T::to_unified(&native.value).value;
                converted.id = None;
                out.rules.push(converted);
            }
            Err(e) => {
                out.warnings.push(format!("dropped rule {:?}: {e}", rule.name));
                out.dropped.push(rule.name.clone());
            }
        }
    }

    for ip in &config.ips {
        match T::ip_to_provider(ip) {
            Ok(native) => {
                out.warnings.extend(native.warnings);
                let mut converted = T::ip_to_unified(&native.value).value;
                converted.id = None;
                out.ips.push(converted);
            }
            Err(e) => {
                out.warnings.push(format!("dropped IP rule {}: {e}", ip.ip));
                out.dropped.push(ip.ip.clone());
            }
        }
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{
        ActionType, ConditionField, ConditionOperator, IpAction, RateLimitConfig, UnifiedAction,
        UnifiedCondition,
    };
    use pretty_assertions::assert_eq;

    fn vercel_config() -> UnifiedConfig {
        let mut limited = UnifiedAction::new(ActionType::RateLimit);
        limited.rate_limit = Some(RateLimitConfig {
            window_secs: 60,
            limit: 10,
            keys: Vec::new(),
            algorithm: None,
            exceeded_action: None,
        });
        UnifiedConfig {
            project_id: Some("prj_1".into()),
            ..UnifiedConfig::for_provider(ProviderKind::Vercel)
        }
        .with_rules(vec![
            UnifiedRule::new("Block Admin", ActionType::Deny)
                .with_id("rule_block_admin")
                .with_condition(UnifiedCondition::new(
                    ConditionField::Path,
                    ConditionOperator::StartsWith,
                    "/admin",
                )),
            UnifiedRule::new("Throttle", limited).with_condition(UnifiedCondition::new(
                ConditionField::Path,
                ConditionOperator::StartsWith,
                "/api",
            )),
        ])
        .with_ips(vec![
            UnifiedIpRule::new("10.0.0.1", IpAction::Deny),
            UnifiedIpRule::new("10.0.0.2", IpAction::Deny).with_hostname("example.com"),
        ])
    }

    #[test]
    fn vercel_to_cloudflare_drops_unsupported_entries() {
        let migration = migrate(&vercel_config(), ProviderKind::Vercel, ProviderKind::Cloudflare);

        assert_eq!(migration.dropped, vec!["Throttle".to_owned(), "10.0.0.2".to_owned()]);
        assert_eq!(migration.config.rules.len(), 1);
        assert_eq!(migration.config.rules[0].name, "Block Admin");
        assert_eq!(migration.config.rules[0].id, None);
        assert_eq!(migration.config.ips.len(), 1);
        assert_eq!(migration.config.provider, Some(ProviderKind::Cloudflare));
        assert!(!migration.report.is_lossless());

        let info = migration.config.migration.as_ref().unwrap();
        assert_eq!((info.from, info.to), (ProviderKind::Vercel, ProviderKind::Cloudflare));
        assert_eq!(info.warnings, migration.warnings);
    }

    #[test]
    fn legacy_ids_move_into_provider_section() {
        let migration = migrate(&vercel_config(), ProviderKind::Vercel, ProviderKind::Cloudflare);
        let section = migration.config.providers.vercel.as_ref().unwrap();
        assert_eq!(section.project_id.as_deref(), Some("prj_1"));
        assert!(!migration.config.is_legacy_shape());
    }

    #[test]
    fn same_provider_migration_is_lossless() {
        let mut config = vercel_config();
        config.ips.truncate(1);
        let migration = migrate(&config, ProviderKind::Vercel, ProviderKind::Vercel);
        assert!(migration.dropped.is_empty());
        assert_eq!(migration.config.rules.len(), 2);
        assert!(migration.config.rules.iter().all(|r| r.id.is_none()));
    }
}
