// Async client for the Cloudflare v4 API (Rulesets + IP Access Rules).
//
// Base URL: https://api.cloudflare.com/client/v4/
// Auth: Authorization: Bearer <api token>

use std::fmt;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::types::{
    AccessRule, AccessRuleUpdate, CreateRuleset, Envelope, ResultInfo, Rule, Ruleset,
    RulesetSummary, CUSTOM_RULES_PHASE,
};
use crate::error::Error;
use crate::rate_limit::RateLimitInfo;
use crate::transport::{bearer_headers, ApiClient, ApiRequest, TransportConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4/";

const ACCESS_RULES_PER_PAGE: u32 = 100;

// ── Scope ────────────────────────────────────────────────────────────

/// Zone- or account-level ruleset scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Zone(String),
    Account(String),
}

impl Scope {
    /// Path prefix, e.g. `zones/023e105f4ecef8ad9ca31a8372d0c353`.
    pub fn path(&self) -> String {
        match self {
            Self::Zone(id) => format!("zones/{id}"),
            Self::Account(id) => format!("accounts/{id}"),
        }
    }

    /// Ruleset `kind` for a new phase entrypoint in this scope.
    pub fn entrypoint_kind(&self) -> &'static str {
        match self {
            Self::Zone(_) => "zone",
            Self::Account(_) => "root",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Deserialize)]
struct Deleted {
    #[allow(dead_code)]
    id: String,
}

// ── Client ───────────────────────────────────────────────────────────

/// Client for one Cloudflare zone or account.
pub struct CloudflareClient {
    api: ApiClient,
    scope: Scope,
}

impl CloudflareClient {
    /// Build from an API token. `base_url` is normally [`DEFAULT_BASE_URL`].
    pub fn new(
        base_url: &str,
        token: &SecretString,
        scope: Scope,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let api = ApiClient::new(base_url, bearer_headers(token)?, transport)?;
        Ok(Self::from_api(api, scope))
    }

    pub fn from_api(api: ApiClient, scope: Scope) -> Self {
        Self { api, scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn rate_limit(&self) -> RateLimitInfo {
        self.api.rate_limit()
    }

    fn path(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.scope.path())
    }

    /// Execute and strip the envelope, returning `result` and `result_info`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<(T, Option<ResultInfo>), Error> {
        let envelope: Envelope<T> = self.api.execute(request).await?;

        if !envelope.success {
            let first = envelope.errors.first();
            let message = if envelope.errors.is_empty() {
                "request failed without error details".to_owned()
            } else {
                envelope
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(Error::Cloudflare {
                code: first.and_then(|e| e.code),
                message,
            });
        }

        for msg in &envelope.messages {
            debug!(code = ?msg.code, "cloudflare: {}", msg.message);
        }

        let result = envelope.result.ok_or_else(|| Error::Deserialization {
            message: format!("{} {}: envelope has no result", request.method(), request.path()),
            body: String::new(),
        })?;
        Ok((result, envelope.result_info))
    }

    async fn result<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        self.send(request).await.map(|(result, _)| result)
    }

    // ── Rulesets ─────────────────────────────────────────────────────

    /// `GET {scope}/rulesets`
    pub async fn list_rulesets(&self) -> Result<Vec<RulesetSummary>, Error> {
        debug!(scope = %self.scope, "listing rulesets");
        self.result(&ApiRequest::get(self.path("rulesets"))).await
    }

    /// `GET {scope}/rulesets/{id}`
    pub async fn get_ruleset(&self, ruleset_id: &str) -> Result<Ruleset, Error> {
        debug!(scope = %self.scope, ruleset_id, "fetching ruleset");
        self.result(&ApiRequest::get(self.path(&format!("rulesets/{ruleset_id}"))))
            .await
    }

    /// `POST {scope}/rulesets`
    pub async fn create_ruleset(&self, body: &CreateRuleset) -> Result<Ruleset, Error> {
        debug!(scope = %self.scope, phase = %body.phase, "creating ruleset");
        let request = ApiRequest::post(self.path("rulesets")).json(body)?;
        self.result(&request).await
    }

    /// Entry point ruleset of the custom-rules phase, `None` when the phase
    /// has never been configured.
    ///
    /// `GET {scope}/rulesets/phases/http_request_firewall_custom/entrypoint`
    pub async fn custom_rules_entrypoint(&self) -> Result<Option<Ruleset>, Error> {
        let path = self.path(&format!("rulesets/phases/{CUSTOM_RULES_PHASE}/entrypoint"));
        match self.result(&ApiRequest::get(path)).await {
            Ok(ruleset) => Ok(Some(ruleset)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch the custom-rules entrypoint, creating an empty one if missing.
    pub async fn ensure_custom_ruleset(&self) -> Result<Ruleset, Error> {
        if let Some(ruleset) = self.custom_rules_entrypoint().await? {
            return Ok(ruleset);
        }

        self.create_ruleset(&CreateRuleset {
            name: "default".into(),
            description: "Custom firewall rules managed by doorman".into(),
            kind: self.scope.entrypoint_kind().into(),
            phase: CUSTOM_RULES_PHASE.into(),
            rules: Vec::new(),
        })
        .await
    }

    // ── Rules ────────────────────────────────────────────────────────

    /// `POST {scope}/rulesets/{id}/rules`. Returns the updated ruleset.
    pub async fn add_rule(&self, ruleset_id: &str, rule: &Rule) -> Result<Ruleset, Error> {
        debug!(scope = %self.scope, ruleset_id, name = %rule.description, "adding rule");
        let request =
            ApiRequest::post(self.path(&format!("rulesets/{ruleset_id}/rules"))).json(rule)?;
        self.result(&request).await
    }

    /// `PATCH {scope}/rulesets/{id}/rules/{rule_id}`
    pub async fn update_rule(
        &self,
        ruleset_id: &str,
        rule_id: &str,
        rule: &Rule,
    ) -> Result<Ruleset, Error> {
        debug!(scope = %self.scope, ruleset_id, rule_id, "updating rule");
        let request = ApiRequest::patch(self.path(&format!("rulesets/{ruleset_id}/rules/{rule_id}")))
            .json(rule)?;
        self.result(&request).await
    }

    /// `DELETE {scope}/rulesets/{id}/rules/{rule_id}`
    pub async fn delete_rule(&self, ruleset_id: &str, rule_id: &str) -> Result<Ruleset, Error> {
        debug!(scope = %self.scope, ruleset_id, rule_id, "deleting rule");
        self.result(&ApiRequest::delete(
            self.path(&format!("rulesets/{ruleset_id}/rules/{rule_id}")),
        ))
        .await
    }

    // ── IP access rules ──────────────────────────────────────────────

    /// All IP access rules, following pagination.
    ///
    /// `GET {scope}/firewall/access_rules/rules?page=N&per_page=100`
    pub async fn list_access_rules(&self) -> Result<Vec<AccessRule>, Error> {
        let mut rules = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = ApiRequest::get(self.path("firewall/access_rules/rules"))
                .query("page", page.to_string())
                .query("per_page", ACCESS_RULES_PER_PAGE.to_string());
            let (batch, info): (Vec<AccessRule>, _) = self.send(&request).await?;
            let fetched = batch.len();
            rules.extend(batch);

            let total_pages = info.map_or(1, |i| i.total_pages);
            if fetched == 0 || page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!(scope = %self.scope, count = rules.len(), "listed access rules");
        Ok(rules)
    }

    /// `POST {scope}/firewall/access_rules/rules`
    pub async fn create_access_rule(&self, rule: &AccessRule) -> Result<AccessRule, Error> {
        debug!(scope = %self.scope, ip = %rule.configuration.value, "creating access rule");
        let request = ApiRequest::post(self.path("firewall/access_rules/rules")).json(rule)?;
        self.result(&request).await
    }

    /// `PATCH {scope}/firewall/access_rules/rules/{id}`
    pub async fn update_access_rule(
        &self,
        rule_id: &str,
        update: &AccessRuleUpdate,
    ) -> Result<AccessRule, Error> {
        debug!(scope = %self.scope, rule_id, "updating access rule");
        let request =
            ApiRequest::patch(self.path(&format!("firewall/access_rules/rules/{rule_id}")))
                .json(update)?;
        self.result(&request).await
    }

    /// `DELETE {scope}/firewall/access_rules/rules/{id}`
    pub async fn delete_access_rule(&self, rule_id: &str) -> Result<(), Error> {
        debug!(scope = %self.scope, rule_id, "deleting access rule");
        let _: Deleted = self
            .result(&ApiRequest::delete(
                self.path(&format!("firewall/access_rules/rules/{rule_id}")),
            ))
            .await?;
        Ok(())
    }
}
