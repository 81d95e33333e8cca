// ── Provider connection settings ──
//
// Resolved credentials and identifiers needed to build provider clients.
// Produced by `doorman-config`; tokens never leave `SecretString`.

use doorman_api::{Scope, TransportConfig};
use secrecy::SecretString;

use crate::error::CoreError;
use crate::model::ProviderKind;

#[derive(Debug, Clone)]
pub struct VercelSettings {
    pub token: SecretString,
    pub project_id: String,
    pub team_id: Option<String>,
    /// Override for tests and proxies.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudflareSettings {
    pub token: SecretString,
    pub zone_id: Option<String>,
    pub account_id: Option<String>,
    /// Manage this ruleset instead of the custom-rules phase entrypoint.
    pub ruleset_id: Option<String>,
    pub base_url: Option<String>,
}

impl CloudflareSettings {
    /// Zone scope wins over account scope.
    pub fn scope(&self) -> Result<Scope, CoreError> {
        match (&self.zone_id, &self.account_id) {
            (Some(zone), _) => Ok(Scope::Zone(zone.clone())),
            (None, Some(account)) => Ok(Scope::Account(account.clone())),
            (None, None) => Err(CoreError::ProviderNotConfigured {
                provider: ProviderKind::Cloudflare,
                missing: "zone id or account id (CLOUDFLARE_ZONE_ID / CLOUDFLARE_ACCOUNT_ID)"
                    .into(),
            }),
        }
    }
}

/// Everything needed to talk to any configured provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub transport: TransportConfig,
    pub vercel: Option<VercelSettings>,
    pub cloudflare: Option<CloudflareSettings>,
}

impl ProviderSettings {
    pub fn vercel(&self) -> Result<&VercelSettings, CoreError> {
        self.vercel
            .as_ref()
            .ok_or_else(|| CoreError::ProviderNotConfigured {
                provider: ProviderKind::Vercel,
                missing: "token and project id (VERCEL_TOKEN / VERCEL_PROJECT_ID)".into(),
            })
    }

    pub fn cloudflare(&self) -> Result<&CloudflareSettings, CoreError> {
        self.cloudflare
            .as_ref()
            .ok_or_else(|| CoreError::ProviderNotConfigured {
                provider: ProviderKind::Cloudflare,
                missing: "API token (CLOUDFLARE_API_TOKEN)".into(),
            })
    }

    /// Providers with usable credentials.
    pub fn configured(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        if self.vercel.is_some() {
            kinds.push(ProviderKind::Vercel);
        }
        if self.cloudflare.is_some() {
            kinds.push(ProviderKind::Cloudflare);
        }
        kinds
    }
}
