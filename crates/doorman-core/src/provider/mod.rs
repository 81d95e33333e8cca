// ── Provider services ──
//
// One service per remote provider, each wrapping its API client and
// translator. `Provider` dispatches the shared contract over the closed set
// of providers.

pub mod cloudflare;
pub mod vercel;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::diff::{adopt_identities_by_name, diff, Identified, Paired, Reconcile};
use crate::error::CoreError;
use crate::health::{self, HealthScore};
use crate::model::{
    ChangeSet, IdRepair, MutationLog, ProviderChanges, ProviderKind, SyncOptions, SyncResult,
    UnifiedConfig, UnifiedIpRule, UnifiedRule,
};
use crate::settings::ProviderSettings;
use crate::translate::{CloudflareTranslator, RuleTranslator, VercelTranslator};
use crate::validate::{self, ValidationResult};

pub use cloudflare::CloudflareService;
pub use vercel::VercelService;

/// A connected provider.
pub enum Provider {
    Vercel(VercelService),
    Cloudflare(CloudflareService),
}

impl Provider {
    /// Build the service for `kind` from resolved settings.
    pub fn connect(kind: ProviderKind, settings: &ProviderSettings) -> Result<Self, CoreError> {
        match kind {
            ProviderKind::Vercel => Ok(Self::Vercel(VercelService::new(
                settings.vercel()?,
                &settings.transport,
            )?)),
            ProviderKind::Cloudflare => Ok(Self::Cloudflare(CloudflareService::new(
                settings.cloudflare()?,
                &settings.transport,
            )?)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Vercel(_) => ProviderKind::Vercel,
            Self::Cloudflare(_) => ProviderKind::Cloudflare,
        }
    }

    /// Remote rules as a unified config. `version` selects a historical
    /// snapshot where the provider keeps one.
    pub async fn fetch_config(&self, version: Option<u64>) -> Result<UnifiedConfig, CoreError> {
        match self {
            Self::Vercel(s) => s.fetch_config(version).await,
            Self::Cloudflare(s) => s.fetch_config(version).await,
        }
    }

    /// Remote changes needed to reach `local`.
    pub async fn get_changes(&self, local: &UnifiedConfig) -> Result<ProviderChanges, CoreError> {
        match self {
            Self::Vercel(s) => s.get_changes(local).await,
            Self::Cloudflare(s) => s.get_changes(local).await,
        }
    }

    /// Push `local` to the remote: deletes, then adds, then updates.
    pub async fn sync_rules(
        &self,
        local: &UnifiedConfig,
        options: SyncOptions,
    ) -> Result<SyncResult, CoreError> {
        match self {
            Self::Vercel(s) => s.sync_rules(local, options).await,
            Self::Cloudflare(s) => s.sync_rules(local, options).await,
        }
    }

    /// `rule` as this provider will store it: rendered natively and read
    /// back, so lossy mappings compare equal to the fetched remote.
    pub fn canonicalize_rule(&self, rule: &UnifiedRule) -> Result<UnifiedRule, CoreError> {
        match self.kind() {
            ProviderKind::Vercel => round_trip_rule::<VercelTranslator>(rule),
            ProviderKind::Cloudflare => round_trip_rule::<CloudflareTranslator>(rule),
        }
    }

    pub fn canonicalize_ip(&self, ip: &UnifiedIpRule) -> Result<UnifiedIpRule, CoreError> {
        match self.kind() {
            ProviderKind::Vercel => round_trip_ip::<VercelTranslator>(ip),
            ProviderKind::Cloudflare => round_trip_ip::<CloudflareTranslator>(ip),
        }
    }

    pub fn validate_config(&self, config: &UnifiedConfig) -> ValidationResult {
        validate::validate(config, Some(self.kind()))
    }

    pub fn health_score(&self, config: &UnifiedConfig) -> HealthScore {
        health::score(config, self.kind())
    }
}

fn round_trip_rule<T: RuleTranslator>(rule: &UnifiedRule) -> Result<UnifiedRule, CoreError> {
    let native = T::to_provider(rule)?.value;
    Ok(T::to_unified(&native).value)
}

fn round_trip_ip<T: RuleTranslator>(ip: &UnifiedIpRule) -> Result<UnifiedIpRule, CoreError> {
    let native = T::ip_to_provider(ip)?.value;
    Ok(T::ip_to_unified(&native).value)
}

// ── Shared planning ──────────────────────────────────────────────────

pub(crate) type RulePair<T> = Paired<UnifiedRule, <T as RuleTranslator>::Rule>;
pub(crate) type IpPair<T> = Paired<UnifiedIpRule, <T as RuleTranslator>::IpRule>;

/// Provider-form change sets for one local config against one remote state.
pub(crate) struct Plan<T: RuleTranslator> {
    pub rules: ChangeSet<RulePair<T>>,
    pub ips: ChangeSet<IpPair<T>>,
    /// Local rules that took over the id of a same-named remote rule.
    pub adopted: Vec<IdRepair>,
    pub remote_version: Option<u64>,
    pub warnings: Vec<String>,
}

impl<T: RuleTranslator> Plan<T> {
    /// Translate both sides and diff them on the native representation.
    pub(crate) fn build(
        local: &UnifiedConfig,
        remote_rules: &[T::Rule],
        remote_ips: &[T::IpRule],
        remote_version: Option<u64>,
    ) -> Result<Self, CoreError>
    where
        T::Rule: Reconcile + Identified,
        T::IpRule: Reconcile + Identified,
    {
        let mut warnings = Vec::new();

        let mut local_rules = Vec::with_capacity(local.rules.len());
        for rule in &local.rules {
            let native = T::to_provider(rule)?;
            warnings.extend(native.warnings);
            local_rules.push(Paired::new(rule.clone(), native.value));
        }
        let remote_rules: Vec<RulePair<T>> = remote_rules
            .iter()
            .map(|native| Paired::new(T::to_unified(native).value, native.clone()))
            .collect();

        let adopted_rules = adopt_identities_by_name(&local_rules, &remote_rules);
        let adopted = local_rules
            .iter()
            .zip(&adopted_rules)
            .filter_map(|(before, after)| {
                let new_id = after.id()?;
                (before.id() != Some(new_id)).then(|| IdRepair {
                    old_id: before.id().unwrap_or_default().to_owned(),
                    new_id: new_id.to_owned(),
                    name: after.display_name().to_owned(),
                })
            })
            .collect();

        let mut local_ips = Vec::with_capacity(local.ips.len());
        for ip in &local.ips {
            let native = T::ip_to_provider(ip)?;
            warnings.extend(native.warnings);
            local_ips.push(Paired::new(ip.clone(), native.value));
        }
        let remote_ips: Vec<IpPair<T>> = remote_ips
            .iter()
            .map(|native| Paired::new(T::ip_to_unified(native).value, native.clone()))
            .collect();

        Ok(Self {
            rules: diff(&adopted_rules, &remote_rules)?,
            ips: diff(&local_ips, &remote_ips)?,
            adopted,
            remote_version,
            warnings,
        })
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.rules.has_changes() || self.ips.has_changes()
    }

    pub(crate) fn changes(&self) -> ProviderChanges {
        ProviderChanges {
            rules: self.rules.clone().map(|p| p.unified),
            ips: self.ips.clone().map(|p| p.unified),
            remote_version: self.remote_version,
            warnings: self.warnings.clone(),
        }
    }

    /// Result skeleton before any mutation runs.
    pub(crate) fn result(&self, dry_run: bool) -> SyncResult {
        SyncResult {
            dry_run,
            rules: self.rules.counts(),
            ips: self.ips.counts(),
            id_repairs: self.adopted.clone(),
            mutations: MutationLog::default(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Wrap a failed mutation, keeping what already went through.
pub(crate) fn aborted(log: &MutationLog, err: impl Into<CoreError>) -> CoreError {
    let source = err.into();
    warn!(applied = log.len(), error = %source, "sync aborted");
    CoreError::SyncAborted {
        completed: log.clone(),
        source: Box::new(source),
    }
}

pub(crate) fn log_warnings(provider: ProviderKind, warnings: &[String]) {
    for warning in warnings {
        warn!(%provider, "{warning}");
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Repairs after adds: record `new_id` for every added rule whose local id
/// differs.
pub(crate) fn add_repair(repairs: &mut Vec<IdRepair>, local: &UnifiedRule, new_id: &str) {
    if local.id.as_deref() == Some(new_id) {
        return;
    }
    repairs.push(IdRepair {
        old_id: local.id.clone().unwrap_or_default(),
        new_id: new_id.to_owned(),
        name: local.name.clone(),
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ActionType, IpAction};
    use doorman_api::vercel::types::{CustomRule, IpRule, Mitigation, RuleAction};
    use pretty_assertions::assert_eq;

    fn remote_rule(id: &str, name: &str) -> CustomRule {
        CustomRule {
            id: Some(id.into()),
            name: name.into(),
            description: String::new(),
            active: true,
            condition_group: Vec::new(),
            action: RuleAction {
                mitigate: Some(Mitigation {
                    action: "deny".into(),
                    rate_limit: None,
                    redirect: None,
                    action_duration: None,
                }),
            },
        }
    }

    #[test]
    fn same_named_rule_is_updated_not_duplicated() {
        let local = UnifiedConfig::default()
            .with_rules(vec![UnifiedRule::new("Block Admin", ActionType::Deny)]);
        let remote = vec![remote_rule("rule_block_admin", "Block Admin")];

        let plan = Plan::<VercelTranslator>::build(&local, &remote, &[], Some(3)).unwrap();

        assert!(plan.rules.to_add.is_empty());
        assert!(plan.rules.to_delete.is_empty());
        assert_eq!(
            plan.adopted,
            vec![IdRepair {
                old_id: String::new(),
                new_id: "rule_block_admin".into(),
                name: "Block Admin".into(),
            }]
        );
        assert_eq!(plan.changes().remote_version, Some(3));
    }

    #[test]
    fn ip_update_adopts_remote_id() {
        let local = UnifiedConfig::default().with_ips(vec![
            UnifiedIpRule::new("10.0.0.1", IpAction::Deny).with_hostname("h"),
        ]);
        let remote = vec![IpRule {
            id: Some("ip1".into()),
            hostname: "h-old".into(),
            ip: "10.0.0.1".into(),
            notes: None,
            action: "deny".into(),
        }];

        let changes = Plan::<VercelTranslator>::build(&local, &[], &remote, None)
            .unwrap()
            .changes();

        assert!(changes.ips.to_add.is_empty());
        assert!(changes.ips.to_delete.is_empty());
        assert_eq!(changes.ips.to_update.len(), 1);
        assert_eq!(changes.ips.to_update[0].id.as_deref(), Some("ip1"));
        assert_eq!(changes.ips.to_update[0].hostname.as_deref(), Some("h"));
    }

    #[test]
    fn add_repair_skips_matching_ids() {
        let mut repairs = Vec::new();
        let rule = UnifiedRule::new("A", ActionType::Log).with_id("rule_a");
        add_repair(&mut repairs, &rule, "rule_a");
        assert!(repairs.is_empty());
        add_repair(&mut repairs, &UnifiedRule::new("A", ActionType::Log), "rule_a");
        assert_eq!(repairs[0].old_id, "");
    }
}
