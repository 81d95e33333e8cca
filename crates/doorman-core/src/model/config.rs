// ── Unified configuration document ──
//
// The shape of the local JSON config file. Keys are camelCase; enum values
// are snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ip::UnifiedIpRule;
use super::rule::UnifiedRule;

/// Current config schema version. Version 1 is the legacy Vercel-only
/// shape with top-level `projectId` / `teamId`.
pub const SCHEMA_VERSION: u32 = 2;

/// Oldest schema version still accepted.
pub const MIN_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Supported remote firewall providers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProviderKind {
    Vercel,
    Cloudflare,
}

// ── Provider sections ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VercelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Custom ruleset to manage instead of the phase entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset_id: Option<String>,
}

/// Per-provider identifiers. Credentials never live in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vercel: Option<VercelSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudflare: Option<CloudflareSection>,
}

impl ProviderSections {
    pub fn is_empty(&self) -> bool {
        self.vercel.is_none() && self.cloudflare.is_none()
    }

    /// Providers that have a section.
    pub fn present(&self) -> Vec<ProviderKind> {
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

/// Provenance of a config produced by provider migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub from: ProviderKind,
    pub to: ProviderKind,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ── Config ───────────────────────────────────────────────────────────

/// The local firewall configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Active provider, when pinned explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "ProviderSections::is_empty")]
    pub providers: ProviderSections,
    /// Legacy single-provider (Vercel) shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Legacy single-provider (Vercel) shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub rules: Vec<UnifiedRule>,
    #[serde(default)]
    pub ips: Vec<UnifiedIpRule>,
    /// Remote version this config was last synced against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationInfo>,
}

impl Default for UnifiedConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            provider: None,
            providers: ProviderSections::default(),
            project_id: None,
            team_id: None,
            rules: Vec::new(),
            ips: Vec::new(),
            version: None,
            updated_at: None,
            migration: None,
        }
    }
}

impl UnifiedConfig {
    /// Empty config pinned to `provider`.
    pub fn for_provider(provider: ProviderKind) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }

    pub fn with_rules(mut self, rules: Vec<UnifiedRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_ips(mut self, ips: Vec<UnifiedIpRule>) -> Self {
        self.ips = ips;
        self
    }

    pub fn rule_by_name(&self, name: &str) -> Option<&UnifiedRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Uses the legacy top-level Vercel identifiers.
    pub fn is_legacy_shape(&self) -> bool {
        self.project_id.is_some() || self.team_id.is_some()
    }

    /// Vercel project/team, preferring the provider section over the
    /// legacy top-level fields.
    pub fn vercel_ids(&self) -> (Option<&str>, Option<&str>) {
        let section = self.providers.vercel.as_ref();
        let project = section
            .and_then(|s| s.project_id.as_deref())
            .or(self.project_id.as_deref());
        let team = section
            .and_then(|s| s.team_id.as_deref())
            .or(self.team_id.as_deref());
        (project, team)
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn legacy_shape_parses_and_defaults_schema() {
        let config = UnifiedConfig::from_json(
            r#"{ "projectId": "prj_1", "teamId": "team_1", "rules": [], "ips": [] }"#,
        )
        .unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert!(config.is_legacy_shape());
        assert_eq!(config.vercel_ids(), (Some("prj_1"), Some("team_1")));
    }

    #[test]
    fn provider_sections_round_trip() {
        let text = r#"{
            "schemaVersion": 2,
            "provider": "cloudflare",
            "providers": { "cloudflare": { "zoneId": "z1", "rulesetId": "rs1" } },
            "rules": [],
            "ips": [{ "ip": "10.0.0.1", "action": "deny" }],
            "version": 7,
            "updatedAt": "2026-05-01T12:00:00Z"
        }"#;
        let config = UnifiedConfig::from_json(text).unwrap();

        assert_eq!(config.provider, Some(ProviderKind::Cloudflare));
        assert_eq!(config.providers.present(), vec![ProviderKind::Cloudflare]);
        assert_eq!(
            config.providers.cloudflare.as_ref().unwrap().ruleset_id.as_deref(),
            Some("rs1")
        );

        let reparsed = UnifiedConfig::from_json(&config.to_json_pretty().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn section_ids_win_over_legacy() {
        let mut config = UnifiedConfig {
            project_id: Some("legacy".into()),
            ..UnifiedConfig::default()
        };
        config.providers.vercel = Some(VercelSection {
            project_id: Some("modern".into()),
            team_id: None,
        });
        assert_eq!(config.vercel_ids(), (Some("modern"), None));
    }

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Vercel".parse::<ProviderKind>().unwrap(), ProviderKind::Vercel);
        assert_eq!("CLOUDFLARE".parse::<ProviderKind>().unwrap(), ProviderKind::Cloudflare);
        assert!("akamai".parse::<ProviderKind>().is_err());
    }
}
