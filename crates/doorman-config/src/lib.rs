//! Environment, credential and path resolution for doorman.
//!
//! Extracts the handful of environment variables doorman reads with figment,
//! resolves provider tokens (environment first, then the system keyring) and
//! merges provider ids from the local config file into
//! [`doorman_core::ProviderSettings`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{Figment, providers::Env};
use secrecy::{ExposeSecret, SecretString};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use doorman_api::{RetryPolicy, TransportConfig};
use doorman_core::{
    CloudflareSettings, EnvSnapshot, ProviderKind, ProviderSettings, UnifiedConfig, VercelSettings,
};

/// Config file used when neither `--config` nor `DOORMAN_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "doorman.json";

/// Keyring service name; entries are `<provider>-token`.
pub const KEYRING_SERVICE: &str = "doorman";

const ENV_KEYS: [&str; 10] = [
    "VERCEL_TOKEN",
    "VERCEL_PROJECT_ID",
    "VERCEL_TEAM_ID",
    "CLOUDFLARE_API_TOKEN",
    "CLOUDFLARE_ZONE_ID",
    "CLOUDFLARE_ACCOUNT_ID",
    "DOORMAN_PROVIDER",
    "DOORMAN_TIMEOUT",
    "DOORMAN_MAX_RETRIES",
    "DOORMAN_CONFIG",
];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("environment loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Environment ─────────────────────────────────────────────────────

/// The environment variables doorman reads, keyed by their lowercased names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnvSettings {
    #[serde(deserialize_with = "secret")]
    pub vercel_token: Option<SecretString>,
    #[serde(deserialize_with = "lenient")]
    pub vercel_project_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub vercel_team_id: Option<String>,
    #[serde(deserialize_with = "secret")]
    pub cloudflare_api_token: Option<SecretString>,
    #[serde(deserialize_with = "lenient")]
    pub cloudflare_zone_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub cloudflare_account_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub doorman_provider: Option<String>,
    /// Per-request timeout in seconds.
    pub doorman_timeout: Option<u64>,
    pub doorman_max_retries: Option<u32>,
    pub doorman_config: Option<PathBuf>,
}

impl EnvSettings {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(&Figment::from(env_provider()))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// What provider detection needs to know about the environment.
    pub fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            provider: self.doorman_provider.clone(),
            vercel_token: self.vercel_token.is_some(),
            cloudflare_token: self.cloudflare_api_token.is_some(),
        }
    }

    pub fn transport(&self) -> Result<TransportConfig, ConfigError> {
        let defaults = TransportConfig::default();
        let timeout = match self.doorman_timeout {
            Some(0) => {
                return Err(ConfigError::Validation {
                    field: "DOORMAN_TIMEOUT".into(),
                    reason: "must be at least 1 second".into(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.timeout,
        };
        Ok(TransportConfig {
            timeout,
            retry: RetryPolicy {
                max_retries: self
                    .doorman_max_retries
                    .unwrap_or(defaults.retry.max_retries),
                ..defaults.retry
            },
        })
    }
}

fn env_provider() -> Env {
    Env::raw().filter(|key| ENV_KEYS.iter().any(|k| key.as_str().eq_ignore_ascii_case(k)))
}

/// Accept strings, numbers and booleans as text; blank means unset.
fn lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    struct Lenient;

    impl<'de> Visitor<'de> for Lenient {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            Ok((!v.is_empty()).then(|| v.to_owned()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(Lenient)
        }
    }

    deserializer.deserialize_any(Lenient)
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    Ok(lenient(deserializer)?.map(SecretString::from))
}

// ── Tokens ──────────────────────────────────────────────────────────

/// Fallback source for provider tokens missing from the environment.
pub trait TokenStore {
    fn token(&self, provider: ProviderKind) -> Option<SecretString>;
}

/// The OS keyring, entries `doorman/<provider>-token`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKeyring;

impl SystemKeyring {
    fn entry(provider: ProviderKind) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{provider}-token"))
    }

    pub fn store(self, provider: ProviderKind, token: &SecretString) -> Result<(), ConfigError> {
        Self::entry(provider)?.set_password(token.expose_secret())?;
        Ok(())
    }

    pub fn delete(self, provider: ProviderKind) -> Result<(), ConfigError> {
        match Self::entry(provider)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl TokenStore for SystemKeyring {
    fn token(&self, provider: ProviderKind) -> Option<SecretString> {
        match Self::entry(provider).and_then(|entry| entry.get_password()) {
            Ok(token) => Some(SecretString::from(token)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(%provider, error = %e, "keyring unavailable");
                None
            }
        }
    }
}

/// Environment first, then `store`.
pub fn resolve_token(
    provider: ProviderKind,
    env: &EnvSettings,
    store: &dyn TokenStore,
) -> Option<SecretString> {
    let from_env = match provider {
        ProviderKind::Vercel => env.vercel_token.clone(),
        ProviderKind::Cloudflare => env.cloudflare_api_token.clone(),
    };
    from_env.or_else(|| store.token(provider))
}

// ── Provider settings ───────────────────────────────────────────────

/// Build provider settings from the environment, token store and the ids
/// recorded in the local config. Environment ids win over file ids.
///
/// A provider without a token is left out. Vercel also needs a project id;
/// Cloudflare is kept without a zone or account so the missing scope is
/// reported when it is used.
pub fn provider_settings(
    env: &EnvSettings,
    config: Option<&UnifiedConfig>,
    tokens: &dyn TokenStore,
) -> Result<ProviderSettings, ConfigError> {
    let transport = env.transport()?;

    let (file_project, file_team) = config.map_or((None, None), UnifiedConfig::vercel_ids);
    let project_id = env
        .vercel_project_id
        .clone()
        .or_else(|| file_project.map(str::to_owned));
    let vercel = match (resolve_token(ProviderKind::Vercel, env, tokens), project_id) {
        (Some(token), Some(project_id)) => Some(VercelSettings {
            token,
            project_id,
            team_id: env
                .vercel_team_id
                .clone()
                .or_else(|| file_team.map(str::to_owned)),
            base_url: None,
        }),
        (Some(_), None) => {
            debug!("vercel token present without a project id");
            None
        }
        (None, _) => None,
    };

    let section = config.and_then(|c| c.providers.cloudflare.as_ref());
    let cloudflare =
        resolve_token(ProviderKind::Cloudflare, env, tokens).map(|token| CloudflareSettings {
            token,
            zone_id: env
                .cloudflare_zone_id
                .clone()
                .or_else(|| section.and_then(|s| s.zone_id.clone())),
            account_id: env
                .cloudflare_account_id
                .clone()
                .or_else(|| section.and_then(|s| s.account_id.clone())),
            ruleset_id: section.and_then(|s| s.ruleset_id.clone()),
            base_url: None,
        });

    Ok(ProviderSettings {
        transport,
        vercel,
        cloudflare,
    })
}

// ── Paths ───────────────────────────────────────────────────────────

/// `--config`, then `DOORMAN_CONFIG`, then `./doorman.json`.
pub fn config_path(flag: Option<&Path>, env: &EnvSettings) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| env.doorman_config.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Platform data directory for config backups.
pub fn backup_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "doorman", "doorman").map(|dirs| dirs.data_dir().join("backups"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use doorman_core::model::{CloudflareSection, VercelSection};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FixedTokens(HashMap<ProviderKind, &'static str>);

    impl TokenStore for FixedTokens {
        fn token(&self, provider: ProviderKind) -> Option<SecretString> {
            self.0.get(&provider).map(|t| SecretString::from(*t))
        }
    }

    fn env(pairs: &[(&str, &str)]) -> EnvSettings {
        let figment = pairs
            .iter()
            .fold(Figment::new(), |f, (k, v)| f.merge((*k, *v)));
        EnvSettings::from_figment(&figment).unwrap()
    }

    #[test]
    fn empty_environment_is_all_unset() {
        let env = EnvSettings::from_figment(&Figment::new()).unwrap();
        assert!(env.vercel_token.is_none());
        assert_eq!(env.snapshot(), EnvSnapshot::default());
        assert_eq!(env.transport().unwrap(), TransportConfig::default());
    }

    #[test]
    fn raw_env_is_filtered_to_known_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VERCEL_PROJECT_ID", "prj_env");
            jail.set_env("CLOUDFLARE_ACCOUNT_ID", "123456");
            jail.set_env("DOORMAN_TIMEOUT", "12");
            jail.set_env("DOORMAN_UNRELATED", "ignored");
            let env = EnvSettings::from_env().map_err(|e| e.to_string())?;
            assert_eq!(env.vercel_project_id.as_deref(), Some("prj_env"));
            assert_eq!(env.cloudflare_account_id.as_deref(), Some("123456"));
            assert_eq!(env.doorman_timeout, Some(12));
            Ok(())
        });
    }

    #[test]
    fn blank_values_count_as_unset() {
        let env = env(&[("vercel_token", "  "), ("doorman_provider", "cloudflare")]);
        assert!(env.vercel_token.is_none());
        assert_eq!(env.snapshot().provider.as_deref(), Some("cloudflare"));
    }

    #[test]
    fn transport_overrides_and_zero_timeout() {
        let figment = Figment::new()
            .merge(("doorman_timeout", 5))
            .merge(("doorman_max_retries", 0));
        let transport = EnvSettings::from_figment(&figment)
            .unwrap()
            .transport()
            .unwrap();
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.retry.max_retries, 0);

        let zero = EnvSettings::from_figment(&Figment::new().merge(("doorman_timeout", 0))).unwrap();
        assert!(matches!(
            zero.transport(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn environment_token_wins_over_store() {
        let env = env(&[("vercel_token", "from-env")]);
        let store = FixedTokens(HashMap::from([
            (ProviderKind::Vercel, "from-keyring"),
            (ProviderKind::Cloudflare, "cf-keyring"),
        ]));
        let vercel = resolve_token(ProviderKind::Vercel, &env, &store).unwrap();
        assert_eq!(vercel.expose_secret(), "from-env");
        let cf = resolve_token(ProviderKind::Cloudflare, &env, &store).unwrap();
        assert_eq!(cf.expose_secret(), "cf-keyring");
    }

    #[test]
    fn settings_merge_file_ids() {
        let mut config = UnifiedConfig::default();
        config.providers.vercel = Some(VercelSection {
            project_id: Some("prj_file".into()),
            team_id: Some("team_file".into()),
        });
        config.providers.cloudflare = Some(CloudflareSection {
            zone_id: Some("zone_file".into()),
            account_id: None,
            ruleset_id: Some("rs_file".into()),
        });
        let env = env(&[
            ("vercel_token", "t"),
            ("vercel_team_id", "team_env"),
            ("cloudflare_api_token", "c"),
        ]);

        let settings = provider_settings(&env, Some(&config), &FixedTokens::default()).unwrap();
        let vercel = settings.vercel().unwrap();
        assert_eq!(vercel.project_id, "prj_file");
        assert_eq!(vercel.team_id.as_deref(), Some("team_env"));
        let cf = settings.cloudflare().unwrap();
        assert_eq!(cf.zone_id.as_deref(), Some("zone_file"));
        assert_eq!(cf.ruleset_id.as_deref(), Some("rs_file"));
        assert_eq!(
            settings.configured(),
            vec![ProviderKind::Vercel, ProviderKind::Cloudflare]
        );
    }

    #[test]
    fn legacy_project_id_and_missing_pieces() {
        let config = UnifiedConfig {
            project_id: Some("prj_legacy".into()),
            ..UnifiedConfig::default()
        };
        let with_token = env(&[("vercel_token", "t")]);
        let settings =
            provider_settings(&with_token, Some(&config), &FixedTokens::default()).unwrap();
        assert_eq!(settings.vercel().unwrap().project_id, "prj_legacy");

        let settings = provider_settings(&with_token, None, &FixedTokens::default()).unwrap();
        assert!(settings.vercel.is_none());
        assert!(settings.cloudflare.is_none());
    }

    #[test]
    fn config_path_precedence() {
        let default = EnvSettings::default();
        assert_eq!(config_path(None, &default), PathBuf::from("doorman.json"));

        let env = env(&[("doorman_config", "/etc/doorman/fw.json")]);
        assert_eq!(config_path(None, &env), PathBuf::from("/etc/doorman/fw.json"));
        assert_eq!(
            config_path(Some(Path::new("local.json")), &env),
            PathBuf::from("local.json")
        );
    }
}
