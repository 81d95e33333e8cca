// ── Cloudflare provider service ──
//
// Custom rules live in one ruleset (the custom-rules phase entrypoint, or a
// configured ruleset id); IP rules are the ip / ip6 / ip_range access rules
// of the same zone or account. Cloudflare keeps no version history.

use std::collections::HashSet;

use doorman_api::cloudflare::client::DEFAULT_BASE_URL;
use doorman_api::cloudflare::types::{AccessRule, AccessRuleUpdate, Rule, Ruleset};
use doorman_api::{CloudflareClient, Scope, TransportConfig};
use tracing::{debug, info, warn};

use super::{add_repair, aborted, log_warnings, parse_timestamp, Plan};
use crate::error::CoreError;
use crate::model::{
    CloudflareSection, EntityKind, MutationKind, MutationLog, ProviderChanges, ProviderKind,
    SyncOptions, SyncResult, UnifiedConfig,
};
use crate::settings::CloudflareSettings;
use crate::translate::cloudflare::is_ip_target;
use crate::translate::{CloudflareTranslator, RuleTranslator};

const KIND: ProviderKind = ProviderKind::Cloudflare;

/// Remote state the service reconciles against.
struct Remote {
    /// `None` until the custom-rules phase has been configured.
    ruleset: Option<Ruleset>,
    access_rules: Vec<AccessRule>,
}

impl Remote {
    fn rules(&self) -> &[Rule] {
        self.ruleset
            .as_ref()
            .map(|rs| rs.rules.as_slice())
            .unwrap_or_default()
    }

    fn version(&self) -> Option<u64> {
        self.ruleset
            .as_ref()
            .and_then(|rs| rs.version.as_deref())
            .and_then(|v| v.parse().ok())
    }
}

/// Firewall of one Cloudflare zone or account.
pub struct CloudflareService {
    client: CloudflareClient,
    ruleset_id: Option<String>,
}

impl CloudflareService {
    pub fn new(
        settings: &CloudflareSettings,
        transport: &TransportConfig,
    ) -> Result<Self, CoreError> {
        let client = CloudflareClient::new(
            settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            &settings.token,
            settings.scope()?,
            transport,
        )?;
        Ok(Self::from_client(client, settings.ruleset_id.clone()))
    }

    pub fn from_client(client: CloudflareClient, ruleset_id: Option<String>) -> Self {
        Self { client, ruleset_id }
    }

    pub fn client(&self) -> &CloudflareClient {
        &self.client
    }

    async fn remote(&self) -> Result<Remote, CoreError> {
        let ruleset = match self.ruleset_id {
            Some(ref id) => Some(self.client.get_ruleset(id).await?),
            None => self.client.custom_rules_entrypoint().await?,
        };
        let access_rules = self
            .client
            .list_access_rules()
            .await?
            .into_iter()
            .filter(|rule| is_ip_target(&rule.configuration.target))
            .collect();
        Ok(Remote {
            ruleset,
            access_rules,
        })
    }

    fn plan(local: &UnifiedConfig, remote: &Remote) -> Result<Plan<CloudflareTranslator>, CoreError> {
        Plan::build(local, remote.rules(), &remote.access_rules, remote.version())
    }

    /// Id of the ruleset to write to, creating the entrypoint if needed.
    async fn writable_ruleset(&self, remote: &Remote) -> Result<String, CoreError> {
        if let Some(ref ruleset) = remote.ruleset {
            return Ok(ruleset.id.clone());
        }
        if let Some(ref id) = self.ruleset_id {
            return Ok(id.clone());
        }
        let created = self.client.ensure_custom_ruleset().await?;
        info!(scope = %self.client.scope(), ruleset_id = %created.id, "created custom rules ruleset");
        Ok(created.id)
    }

    pub async fn fetch_config(&self, version: Option<u64>) -> Result<UnifiedConfig, CoreError> {
        if version.is_some() {
            return Err(CoreError::Unsupported {
                operation: "fetching a historical configuration version".into(),
                provider: KIND,
            });
        }
        let remote = self.remote().await?;

        let mut warnings = Vec::new();
        let rules = remote
            .rules()
            .iter()
            .map(|native| {
                let translated = CloudflareTranslator::to_unified(native);
                warnings.extend(translated.warnings);
                translated.value
            })
            .collect();
        let ips = remote
            .access_rules
            .iter()
            .map(|native| {
                let translated = CloudflareTranslator::ip_to_unified(native);
                warnings.extend(translated.warnings);
                translated.value
            })
            .collect();
        log_warnings(KIND, &warnings);

        let (zone_id, account_id) = match self.client.scope() {
            Scope::Zone(id) => (Some(id.clone()), None),
            Scope::Account(id) => (None, Some(id.clone())),
        };
        let mut config = UnifiedConfig::for_provider(KIND).with_rules(rules).with_ips(ips);
        config.providers.cloudflare = Some(CloudflareSection {
            zone_id,
            account_id,
            ruleset_id: self.ruleset_id.clone(),
        });
        config.version = remote.version();
        config.updated_at = remote
            .ruleset
            .as_ref()
            .and_then(|rs| rs.last_updated.as_deref())
            .and_then(parse_timestamp);
        Ok(config)
    }

    pub async fn get_changes(&self, local: &UnifiedConfig) -> Result<ProviderChanges, CoreError> {
        let remote = self.remote().await?;
        Ok(Self::plan(local, &remote)?.changes())
    }

    pub async fn sync_rules(
        &self,
        local: &UnifiedConfig,
        options: SyncOptions,
    ) -> Result<SyncResult, CoreError> {
        let remote = self.remote().await?;
        let plan = Self::plan(local, &remote)?;
        log_warnings(KIND, &plan.warnings);

        let mut result = plan.result(options.dry_run);
        if options.dry_run || !plan.has_changes() {
            debug!(
                scope = %self.client.scope(),
                dry_run = options.dry_run,
                changes = result.total_changes(),
                "nothing to apply"
            );
            return Ok(result);
        }

        let mut log = MutationLog::default();
        let ruleset_id = if plan.rules.has_changes() {
            Some(
                self.writable_ruleset(&remote)
                    .await
                    .map_err(|e| aborted(&log, e))?,
            )
        } else {
            None
        };
        let ruleset_id = ruleset_id.as_deref().unwrap_or_default();
        let mut known_ids: HashSet<String> =
            remote.rules().iter().filter_map(|r| r.id.clone()).collect();

        // ── Delete ──
        info!(
            rules = plan.rules.to_delete.len(),
            ips = plan.ips.to_delete.len(),
            "deleting remote entries"
        );
        for pair in &plan.rules.to_delete {
            let id = pair.native.id.clone().unwrap_or_default();
            self.client
                .delete_rule(ruleset_id, &id)
                .await
                .map_err(|e| aborted(&log, e))?;
            known_ids.remove(&id);
            log.record(MutationKind::Delete, EntityKind::Rule, Some(id), &pair.unified.name);
        }
        for pair in &plan.ips.to_delete {
            let id = pair.native.id.clone().unwrap_or_default();
            self.client
                .delete_access_rule(&id)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(
                MutationKind::Delete,
                EntityKind::Ip,
                Some(id),
                &pair.native.configuration.value,
            );
        }

        // ── Add ──
        info!(
            rules = plan.rules.to_add.len(),
            ips = plan.ips.to_add.len(),
            "adding remote entries"
        );
        for pair in &plan.rules.to_add {
            let mut native = pair.native.clone();
            native.id = None;
            let updated = self
                .client
                .add_rule(ruleset_id, &native)
                .await
                .map_err(|e| aborted(&log, e))?;
            let new_id = created_rule_id(&updated, &known_ids, &native.description);
            match new_id {
                Some(ref id) => {
                    known_ids.insert(id.clone());
                    add_repair(&mut result.id_repairs, &pair.unified, id);
                }
                None => warn!(
                    name = %pair.unified.name,
                    "created rule not found in returned ruleset"
                ),
            }
            log.record(MutationKind::Add, EntityKind::Rule, new_id, &pair.unified.name);
        }
        for pair in &plan.ips.to_add {
            let mut native = pair.native.clone();
            native.id = None;
            let created = self
                .client
                .create_access_rule(&native)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(
                MutationKind::Add,
                EntityKind::Ip,
                created.id,
                &native.configuration.value,
            );
        }

        // ── Update ──
        info!(
            rules = plan.rules.to_update.len(),
            ips = plan.ips.to_update.len(),
            "updating remote entries"
        );
        for pair in &plan.rules.to_update {
            let id = pair.native.id.clone().unwrap_or_default();
            let mut body = pair.native.clone();
            body.id = None;
            self.client
                .update_rule(ruleset_id, &id, &body)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(MutationKind::Update, EntityKind::Rule, Some(id), &pair.unified.name);
        }
        for pair in &plan.ips.to_update {
            let id = pair.native.id.clone().unwrap_or_default();
            let update = AccessRuleUpdate {
                mode: pair.native.mode.clone(),
                notes: pair.native.notes.clone(),
            };
            self.client
                .update_access_rule(&id, &update)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(
                MutationKind::Update,
                EntityKind::Ip,
                Some(id),
                &pair.native.configuration.value,
            );
        }

        info!(scope = %self.client.scope(), applied = log.len(), "sync complete");
        result.mutations = log;
        Ok(result)
    }
}

/// The rule `add_rule` just created: an id not seen before, preferring one
/// whose description matches.
fn created_rule_id(ruleset: &Ruleset, known: &HashSet<String>, description: &str) -> Option<String> {
    let fresh: Vec<&Rule> = ruleset
        .rules
        .iter()
        .filter(|r| r.id.as_ref().is_some_and(|id| !known.contains(id)))
        .collect();
    fresh
        .iter()
        .find(|r| r.description == description)
        .or_else(|| fresh.last())
        .and_then(|r| r.id.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rule(id: &str, description: &str) -> Rule {
        Rule {
            id: Some(id.into()),
            action: "block".into(),
            expression: "true".into(),
            description: description.into(),
            enabled: true,
            action_parameters: None,
            version: None,
            last_updated: None,
        }
    }

    fn ruleset(rules: Vec<Rule>, version: Option<&str>) -> Ruleset {
        Ruleset {
            id: "rs1".into(),
            name: "default".into(),
            description: String::new(),
            kind: "zone".into(),
            phase: "http_request_firewall_custom".into(),
            version: version.map(str::to_owned),
            last_updated: None,
            rules,
        }
    }

    #[test]
    fn created_rule_is_the_unseen_one() {
        let known: HashSet<String> = ["a".to_owned()].into();
        let rs = ruleset(vec![rule("a", "Old"), rule("b", "Other"), rule("c", "New")], None);
        assert_eq!(created_rule_id(&rs, &known, "New").as_deref(), Some("c"));
        assert_eq!(created_rule_id(&rs, &known, "Missing").as_deref(), Some("c"));

        let all: HashSet<String> = ["a", "b", "c"].map(str::to_owned).into();
        assert_eq!(created_rule_id(&rs, &all, "New"), None);
    }

    #[test]
    fn ruleset_version_is_numeric() {
        let remote = Remote {
            ruleset: Some(ruleset(Vec::new(), Some("12"))),
            access_rules: Vec::new(),
        };
        assert_eq!(remote.version(), Some(12));

        let empty = Remote {
            ruleset: None,
            access_rules: Vec::new(),
        };
        assert_eq!(empty.version(), None);
        assert!(empty.rules().is_empty());
    }
}
