// Async client for the Vercel Firewall API.
//
// Base URL: https://api.vercel.com/
// Auth: Authorization: Bearer <token>

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use super::types::{
    ConfigResponse, CustomRule, FirewallConfig, FirewallConfigUpdate, FirewallPatch, IpRule,
};
use crate::error::Error;
use crate::rate_limit::RateLimitInfo;
use crate::transport::{bearer_headers, ApiClient, ApiRequest, TransportConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.vercel.com/";

const CONFIG_PATH: &str = "v1/security/firewall/config";

/// Client for one Vercel project's firewall.
pub struct VercelClient {
    api: ApiClient,
    project_id: String,
    team_id: Option<String>,
}

impl VercelClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a bearer token. `base_url` is normally [`DEFAULT_BASE_URL`].
    pub fn new(
        base_url: &str,
        token: &SecretString,
        project_id: impl Into<String>,
        team_id: Option<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let api = ApiClient::new(base_url, bearer_headers(token)?, transport)?;
        Ok(Self::from_api(api, project_id, team_id))
    }

    /// Wrap an already configured transport.
    pub fn from_api(api: ApiClient, project_id: impl Into<String>, team_id: Option<String>) -> Self {
        Self {
            api,
            project_id: project_id.into(),
            team_id,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn rate_limit(&self) -> RateLimitInfo {
        self.api.rate_limit()
    }

    /// Attach the `projectId` / `teamId` scope.
    fn scoped(&self, request: ApiRequest) -> ApiRequest {
        request
            .query("projectId", self.project_id.as_str())
            .query_opt("teamId", self.team_id.as_deref())
    }

    // ── Config ───────────────────────────────────────────────────────

    /// Fetch the active configuration, or a historical `version`.
    ///
    /// `GET /v1/security/firewall/config/{active|version}`
    pub async fn get_config(&self, version: Option<u64>) -> Result<FirewallConfig, Error> {
        let selector = version.map_or_else(|| "active".to_owned(), |v| v.to_string());
        debug!(project = %self.project_id, %selector, "fetching firewall config");

        let request = self.scoped(ApiRequest::get(format!("{CONFIG_PATH}/{selector}")));
        let response: ConfigResponse = self.api.execute(&request).await?;
        Ok(response.into_config())
    }

    /// Replace the whole configuration.
    ///
    /// `PUT /v1/security/firewall/config`
    pub async fn put_config(&self, update: &FirewallConfigUpdate) -> Result<FirewallConfig, Error> {
        debug!(
            project = %self.project_id,
            rules = update.rules.len(),
            ips = update.ips.len(),
            "replacing firewall config"
        );
        let request = self.scoped(ApiRequest::put(CONFIG_PATH)).json(update)?;
        let response: ConfigResponse = self.api.execute(&request).await?;
        Ok(response.into_config())
    }

    /// Apply one discrete change.
    ///
    /// `PATCH /v1/security/firewall/config`
    pub async fn patch(&self, patch: &FirewallPatch) -> Result<Value, Error> {
        debug!(project = %self.project_id, action = patch.action(), "patching firewall config");
        let body = patch.to_body()?;
        let request = self.scoped(ApiRequest::patch(CONFIG_PATH)).json(&body)?;
        self.api.execute(&request).await
    }

    // ── Convenience wrappers ─────────────────────────────────────────

    pub async fn insert_rule(&self, rule: &CustomRule) -> Result<Value, Error> {
        self.patch(&FirewallPatch::InsertRule(rule.clone())).await
    }

    pub async fn update_rule(&self, id: &str, rule: &CustomRule) -> Result<Value, Error> {
        self.patch(&FirewallPatch::UpdateRule {
            id: id.to_owned(),
            rule: rule.clone(),
        })
        .await
    }

    pub async fn remove_rule(&self, id: &str) -> Result<Value, Error> {
        self.patch(&FirewallPatch::RemoveRule { id: id.to_owned() }).await
    }

    pub async fn insert_ip(&self, rule: &IpRule) -> Result<Value, Error> {
        self.patch(&FirewallPatch::InsertIp(rule.clone())).await
    }

    pub async fn update_ip(&self, id: &str, rule: &IpRule) -> Result<Value, Error> {
        self.patch(&FirewallPatch::UpdateIp {
            id: id.to_owned(),
            rule: rule.clone(),
        })
        .await
    }

    pub async fn remove_ip(&self, id: &str) -> Result<Value, Error> {
        self.patch(&FirewallPatch::RemoveIp { id: id.to_owned() }).await
    }
}
