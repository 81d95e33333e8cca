// ── Vercel provider service ──

use doorman_api::vercel::client::DEFAULT_BASE_URL;
use doorman_api::vercel::types::FirewallConfig;
use doorman_api::{TransportConfig, VercelClient};
use tracing::{debug, info};

use super::{add_repair, aborted, log_warnings, parse_timestamp, Plan};
use crate::error::CoreError;
use crate::model::{
    EntityKind, MutationKind, MutationLog, ProviderChanges, ProviderKind, SyncOptions,
    SyncResult, UnifiedConfig, VercelSection,
};
use crate::settings::VercelSettings;
use crate::translate::{canonical_rule_id, RuleTranslator, VercelTranslator};

const KIND: ProviderKind = ProviderKind::Vercel;

/// Firewall of one Vercel project.
pub struct VercelService {
    client: VercelClient,
}

impl VercelService {
    pub fn new(settings: &VercelSettings, transport: &TransportConfig) -> Result<Self, CoreError> {
        let client = VercelClient::new(
            settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            &settings.token,
            settings.project_id.clone(),
            settings.team_id.clone(),
            transport,
        )?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: VercelClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &VercelClient {
        &self.client
    }

    async fn remote(&self, version: Option<u64>) -> Result<FirewallConfig, CoreError> {
        Ok(self.client.get_config(version).await?)
    }

    fn plan(
        local: &UnifiedConfig,
        remote: &FirewallConfig,
    ) -> Result<Plan<VercelTranslator>, CoreError> {
        Plan::build(local, &remote.rules, &remote.ips, remote.version)
    }

    pub async fn fetch_config(&self, version: Option<u64>) -> Result<UnifiedConfig, CoreError> {
        let remote = self.remote(version).await?;

        let mut warnings = Vec::new();
        let rules = remote
            .rules
            .iter()
            .map(|native| {
                let translated = VercelTranslator::to_unified(native);
                warnings.extend(translated.warnings);
                translated.value
            })
            .collect();
        let ips = remote
            .ips
            .iter()
            .map(|native| {
                let translated = VercelTranslator::ip_to_unified(native);
                warnings.extend(translated.warnings);
                translated.value
            })
            .collect();
        log_warnings(KIND, &warnings);

        let mut config = UnifiedConfig::for_provider(KIND).with_rules(rules).with_ips(ips);
        config.providers.vercel = Some(VercelSection {
            project_id: Some(self.client.project_id().to_owned()),
            team_id: self.client.team_id().map(str::to_owned),
        });
        config.version = remote.version;
        config.updated_at = remote.updated_at.as_deref().and_then(parse_timestamp);
        Ok(config)
    }

    pub async fn get_changes(&self, local: &UnifiedConfig) -> Result<ProviderChanges, CoreError> {
        let remote = self.remote(None).await?;
        Ok(Self::plan(local, &remote)?.changes())
    }

    pub async fn sync_rules(
        &self,
        local: &UnifiedConfig,
        options: SyncOptions,
    ) -> Result<SyncResult, CoreError> {
        let remote = self.remote(None).await?;
        let plan = Self::plan(local, &remote)?;
        log_warnings(KIND, &plan.warnings);

        let mut result = plan.result(options.dry_run);
        if options.dry_run || !plan.has_changes() {
            debug!(
                project = %self.client.project_id(),
                dry_run = options.dry_run,
                changes = result.total_changes(),
                "nothing to apply"
            );
            return Ok(result);
        }

        let mut log = MutationLog::default();

        // ── Delete ──
        info!(
            rules = plan.rules.to_delete.len(),
            ips = plan.ips.to_delete.len(),
            "deleting remote entries"
        );
        for pair in &plan.rules.to_delete {
            let id = pair.native.id.clone().unwrap_or_default();
            self.client
                .remove_rule(&id)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(MutationKind::Delete, EntityKind::Rule, Some(id), &pair.unified.name);
        }
        for pair in &plan.ips.to_delete {
            let id = pair.native.id.clone().unwrap_or_default();
            self.client
                .remove_ip(&id)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(MutationKind::Delete, EntityKind::Ip, Some(id), &pair.native.ip);
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
            self.client
                .insert_rule(&native)
                .await
                .map_err(|e| aborted(&log, e))?;
            let new_id = canonical_rule_id(&pair.unified.name);
            add_repair(&mut result.id_repairs, &pair.unified, &new_id);
            log.record(MutationKind::Add, EntityKind::Rule, Some(new_id), &pair.unified.name);
        }
        for pair in &plan.ips.to_add {
            let mut native = pair.native.clone();
            native.id = None;
            self.client
                .insert_ip(&native)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(MutationKind::Add, EntityKind::Ip, None, &native.ip);
        }

        // ── Update ──
        info!(
            rules = plan.rules.to_update.len(),
            ips = plan.ips.to_update.len(),
            "updating remote entries"
        );
        for pair in &plan.rules.to_update {
            let id = pair.native.id.clone().unwrap_or_default();
            self.client
                .update_rule(&id, &pair.native)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(MutationKind::Update, EntityKind::Rule, Some(id), &pair.unified.name);
        }
        for pair in &plan.ips.to_update {
            let id = pair.native.id.clone().unwrap_or_default();
            self.client
                .update_ip(&id, &pair.native)
                .await
                .map_err(|e| aborted(&log, e))?;
            log.record(MutationKind::Update, EntityKind::Ip, Some(id), &pair.native.ip);
        }

        info!(
            project = %self.client.project_id(),
            applied = log.len(),
            "sync complete"
        );
        result.mutations = log;
        Ok(result)
    }
}
