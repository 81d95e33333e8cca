// ── Sync orchestration ──
//
// load → validate → snapshot → sync → re-fetch → verify → save. A failed
// verification restores the snapshot locally; the remote is left as-is.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::model::{IdRepair, SyncOptions, SyncResult, UnifiedConfig};
use crate::provider::Provider;
use crate::store::ConfigStore;

/// Outcome of one orchestrated sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub result: SyncResult,
    /// Remote version after the sync. `None` for dry runs.
    pub remote_version: Option<u64>,
    /// Whether the local config was rewritten.
    pub saved: bool,
}

/// Drives a provider sync against a local config store.
pub struct SyncOrchestrator<S> {
    provider: Arc<Provider>,
    store: S,
}

impl<S: ConfigStore> SyncOrchestrator<S> {
    pub fn new(provider: Arc<Provider>, store: S) -> Self {
        Self { provider, store }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport, CoreError> {
        let provider = self.provider.kind();
        let local = self.store.load()?;

        let validation = self.provider.validate_config(&local);
        for issue in validation.warnings() {
            warn!(%provider, "{issue}");
        }
        if !validation.valid {
            return Err(CoreError::Validation {
                issues: validation.into_errors(),
            });
        }

        let snapshot = local.clone();
        info!(%provider, rules = local.rules.len(), ips = local.ips.len(), dry_run = options.dry_run, "starting sync");
        let result = self.provider.sync_rules(&local, options).await?;

        if options.dry_run {
            info!(%provider, changes = result.total_changes(), "dry run complete");
            return Ok(SyncReport {
                result,
                remote_version: None,
                saved: false,
            });
        }

        let remote = self.provider.fetch_config(None).await?;
        let divergences = self.verify(&local, &remote)?;
        if !divergences.is_empty() {
            warn!(
                %provider,
                divergences = divergences.len(),
                "remote diverges after sync, restoring local snapshot"
            );
            self.store.save(&snapshot)?;
            return Err(CoreError::PostSyncValidation { divergences });
        }

        let mut updated = local;
        updated.version = remote.version;
        updated.updated_at = remote.updated_at.or_else(|| Some(Utc::now()));
        if options.apply_id_repairs {
            apply_repairs(&mut updated, &result.id_repairs, &remote);
        }
        self.store.save(&updated)?;

        info!(%provider, version = ?remote.version, applied = result.mutations.len(), "sync verified");
        Ok(SyncReport {
            result,
            remote_version: remote.version,
            saved: true,
        })
    }

    /// Differences between intent and the re-fetched remote: every local
    /// rule (by name) and IP rule (by address) present exactly once with
    /// matching content, and nothing else.
    fn verify(
        &self,
        local: &UnifiedConfig,
        remote: &UnifiedConfig,
    ) -> Result<Vec<String>, CoreError> {
        let mut divergences = Vec::new();

        let mut remote_rules: HashMap<&str, Vec<_>> = HashMap::new();
        for rule in &remote.rules {
            remote_rules.entry(rule.name.as_str()).or_default().push(rule);
        }
        for rule in &local.rules {
            let expected = self.provider.canonicalize_rule(rule)?;
            match remote_rules.get(rule.name.as_str()).map(Vec::as_slice) {
                None | Some([]) => {
                    divergences.push(format!("rule {:?} is missing on the remote", rule.name));
                }
                Some(copies) => {
                    if copies.len() > 1 {
                        divergences.push(format!(
                            "rule {:?} appears {} times on the remote",
                            rule.name,
                            copies.len()
                        ));
                    }
                    if copies.iter().any(|actual| !expected.same_content(actual)) {
                        divergences.push(format!("rule {:?} differs on the remote", rule.name));
                    }
                }
            }
        }
        let local_names: HashSet<&str> = local.rules.iter().map(|r| r.name.as_str()).collect();
        for rule in &remote.rules {
            if !local_names.contains(rule.name.as_str()) {
                divergences.push(format!("unexpected remote rule {:?}", rule.name));
            }
        }

        let mut remote_ips: HashMap<String, Vec<_>> = HashMap::new();
        for ip in &remote.ips {
            remote_ips.entry(ip.normalized_ip()).or_default().push(ip);
        }
        for ip in &local.ips {
            let expected = self.provider.canonicalize_ip(ip)?;
            match remote_ips.get(&ip.normalized_ip()).map(Vec::as_slice) {
                None | Some([]) => {
                    divergences.push(format!("IP rule {} is missing on the remote", ip.ip));
                }
                Some(copies) => {
                    if copies.len() > 1 {
                        divergences.push(format!(
                            "IP rule {} appears {} times on the remote",
                            ip.ip,
                            copies.len()
                        ));
                    }
                    if copies.iter().any(|actual| !expected.same_content(actual)) {
                        divergences.push(format!("IP rule {} differs on the remote", ip.ip));
                    }
                }
            }
        }
        let local_ips: HashSet<String> = local.ips.iter().map(|ip| ip.normalized_ip()).collect();
        for ip in &remote.ips {
            if !local_ips.contains(&ip.normalized_ip()) {
                divergences.push(format!("unexpected remote IP rule {}", ip.ip));
            }
        }

        Ok(divergences)
    }
}

/// Rewrite rule ids from `repairs` and IP ids from the verified remote.
fn apply_repairs(config: &mut UnifiedConfig, repairs: &[IdRepair], remote: &UnifiedConfig) {
    for repair in repairs {
        let old = (!repair.old_id.is_empty()).then_some(repair.old_id.as_str());
        if let Some(rule) = config
            .rules
            .iter_mut()
            .find(|r| r.name == repair.name && r.id.as_deref() == old)
        {
            rule.id = Some(repair.new_id.clone());
        }
    }

    let remote_ids: HashMap<String, &str> = remote
        .ips
        .iter()
        .filter_map(|ip| Some((ip.normalized_ip(), ip.id.as_deref()?)))
        .collect();
    for ip in &mut config.ips {
        if let Some(id) = remote_ids.get(&ip.normalized_ip()) {
            ip.id = Some((*id).to_owned());
        }
    }
}
