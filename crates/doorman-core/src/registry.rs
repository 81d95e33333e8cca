// ── Provider registry & detection ──
//
// The registry builds provider services on demand from registered factories
// and memoizes them. Detection picks which provider a run targets from flags,
// the config document, the environment and, as a last resort, the user.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{ProviderKind, UnifiedConfig};
use crate::provider::Provider;
use crate::settings::ProviderSettings;

/// Builds a provider from resolved settings.
pub type ProviderFactory =
    Box<dyn Fn(&ProviderSettings) -> Result<Provider, CoreError> + Send + Sync>;

/// Explicitly constructed provider registry.
pub struct ProviderRegistry {
    settings: ProviderSettings,
    factories: HashMap<ProviderKind, ProviderFactory>,
    instances: DashMap<ProviderKind, Arc<Provider>>,
}

impl ProviderRegistry {
    /// Empty registry; see [`ProviderRegistry::with_defaults`].
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            factories: HashMap::new(),
            instances: DashMap::new(),
        }
    }

    /// Registry with a factory for every built-in provider.
    pub fn with_defaults(settings: ProviderSettings) -> Self {
        let mut registry = Self::new(settings);
        for kind in ProviderKind::iter() {
            registry.register(kind, Box::new(move |s: &ProviderSettings| Provider::connect(kind, s)));
        }
        registry
    }

    /// Register (or replace) the factory for `kind`. Drops any instance
    /// already built for it.
    pub fn register(&mut self, kind: ProviderKind, factory: ProviderFactory) {
        self.instances.remove(&kind);
        self.factories.insert(kind, factory);
    }

    pub fn is_registered(&self, kind: ProviderKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// The provider for `kind`, built on first use.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<Provider>, CoreError> {
        if let Some(existing) = self.instances.get(&kind) {
            return Ok(Arc::clone(existing.value()));
        }

        let factory = self.factories.get(&kind).ok_or_else(|| CoreError::Unsupported {
            operation: "provider is not registered".into(),
            provider: kind,
        })?;
        let built = Arc::new(factory(&self.settings)?);
        debug!(provider = %kind, "provider instantiated");

        let entry = self.instances.entry(kind).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }
}

// ── Detection ────────────────────────────────────────────────────────

/// The subset of the environment detection looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// Raw `DOORMAN_PROVIDER`.
    pub provider: Option<String>,
    /// `VERCEL_TOKEN` is set.
    pub vercel_token: bool,
    /// `CLOUDFLARE_API_TOKEN` is set.
    pub cloudflare_token: bool,
}

/// Interactive fallback when nothing else decides.
pub trait ProviderPrompt {
    /// Pick one of `candidates`; `None` if the user declines.
    fn choose(&self, candidates: &[ProviderKind]) -> Option<ProviderKind>;
}

#[derive(Default)]
pub struct DetectionInput<'a> {
    /// `--provider` flag.
    pub explicit: Option<ProviderKind>,
    pub config: Option<&'a UnifiedConfig>,
    pub env: EnvSnapshot,
    pub prompt: Option<&'a dyn ProviderPrompt>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub provider: ProviderKind,
    pub confidence: Confidence,
    /// Why this provider was chosen, plus anything skipped on the way.
    pub reasons: Vec<String>,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} confidence)", self.provider, self.confidence)
    }
}

/// Decide which provider to target.
///
/// Priority: explicit flag or `provider` field, a single provider section,
/// the legacy Vercel shape, the environment, the prompt, then Vercel.
pub fn detect_provider(input: &DetectionInput<'_>) -> Detection {
    let mut reasons = Vec::new();
    let mut candidates: Vec<ProviderKind> = Vec::new();
    let done = |provider, confidence, mut reasons: Vec<String>, reason: String| {
        reasons.push(reason);
        Detection {
            provider,
            confidence,
            reasons,
        }
    };

    // 1. Explicit directive.
    if let Some(kind) = input.explicit {
        return done(kind, Confidence::High, reasons, "--provider flag".into());
    }
    if let Some(kind) = input.config.and_then(|c| c.provider) {
        return done(kind, Confidence::High, reasons, "config \"provider\" field".into());
    }

    // 2. Provider sections.
    if let Some(config) = input.config {
        let present = config.providers.present();
        match present.as_slice() {
            [only] => {
                return done(
                    *only,
                    Confidence::High,
                    reasons,
                    format!("config has only a {only} provider section"),
                );
            }
            [] => {}
            several => {
                reasons.push("config has several provider sections".into());
                candidates = several.to_vec();
            }
        }

        // 3. Legacy single-provider shape.
        if config.is_legacy_shape() {
            return done(
                ProviderKind::Vercel,
                Confidence::Medium,
                reasons,
                "config uses legacy projectId/teamId".into(),
            );
        }
    }

    // 4. Environment.
    if let Some(ref raw) = input.env.provider {
        match raw.parse::<ProviderKind>() {
            Ok(kind) => {
                return done(kind, Confidence::Medium, reasons, "DOORMAN_PROVIDER".into());
            }
            Err(_) => reasons.push(format!("ignored unknown DOORMAN_PROVIDER {raw:?}")),
        }
    }
    match (input.env.vercel_token, input.env.cloudflare_token) {
        (true, false) => {
            return done(ProviderKind::Vercel, Confidence::Medium, reasons, "VERCEL_TOKEN is set".into());
        }
        (false, true) => {
            return done(
                ProviderKind::Cloudflare,
                Confidence::Medium,
                reasons,
                "CLOUDFLARE_API_TOKEN is set".into(),
            );
        }
        (true, true) => {
            reasons.push("tokens for several providers are set".into());
            if candidates.is_empty() {
                candidates = ProviderKind::iter().collect();
            }
        }
        (false, false) => {}
    }

    // 5. Ask.
    if let Some(prompt) = input.prompt {
        if candidates.is_empty() {
            candidates = ProviderKind::iter().collect();
        }
        if let Some(kind) = prompt.choose(&candidates) {
            return done(kind, Confidence::High, reasons, "selected interactively".into());
        }
        reasons.push("no provider selected interactively".into());
    }

    // 6. Default.
    done(ProviderKind::Vercel, Confidence::Low, reasons, "default provider".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::model::{CloudflareSection, VercelSection};
    use crate::settings::VercelSettings;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    struct FixedPrompt {
        answer: Option<ProviderKind>,
        seen: RefCell<Vec<ProviderKind>>,
    }

    impl ProviderPrompt for FixedPrompt {
        fn choose(&self, candidates: &[ProviderKind]) -> Option<ProviderKind> {
            self.seen.borrow_mut().extend_from_slice(candidates);
            self.answer
        }
    }

    fn both_sections() -> UnifiedConfig {
        let mut config = UnifiedConfig::default();
        config.providers.vercel = Some(VercelSection::default());
        config.providers.cloudflare = Some(CloudflareSection::default());
        config
    }

    #[test]
    fn explicit_flag_wins() {
        let config = UnifiedConfig::for_provider(ProviderKind::Vercel);
        let detection = detect_provider(&DetectionInput {
            explicit: Some(ProviderKind::Cloudflare),
            config: Some(&config),
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Cloudflare);
        assert_eq!(detection.confidence, Confidence::High);
    }

    #[test]
    fn config_field_beats_sections() {
        let mut config = both_sections();
        config.provider = Some(ProviderKind::Cloudflare);
        let detection = detect_provider(&DetectionInput {
            config: Some(&config),
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Cloudflare);
    }

    #[test]
    fn single_section_is_high_confidence() {
        let mut config = UnifiedConfig::default();
        config.providers.cloudflare = Some(CloudflareSection::default());
        let detection = detect_provider(&DetectionInput {
            config: Some(&config),
            env: EnvSnapshot {
                vercel_token: true,
                ..EnvSnapshot::default()
            },
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Cloudflare);
        assert_eq!(detection.confidence, Confidence::High);
    }

    #[test]
    fn legacy_shape_means_vercel() {
        let config = UnifiedConfig {
            project_id: Some("prj".into()),
            ..UnifiedConfig::default()
        };
        let detection = detect_provider(&DetectionInput {
            config: Some(&config),
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Vercel);
        assert_eq!(detection.confidence, Confidence::Medium);
    }

    #[test]
    fn environment_variable_then_tokens() {
        let detection = detect_provider(&DetectionInput {
            env: EnvSnapshot {
                provider: Some("Cloudflare".into()),
                vercel_token: true,
                cloudflare_token: false,
            },
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Cloudflare);

        let detection = detect_provider(&DetectionInput {
            env: EnvSnapshot {
                provider: Some("akamai".into()),
                vercel_token: false,
                cloudflare_token: true,
            },
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Cloudflare);
        assert!(detection.reasons[0].contains("akamai"));
    }

    #[test]
    fn ambiguity_goes_to_the_prompt() {
        let config = both_sections();
        let prompt = FixedPrompt {
            answer: Some(ProviderKind::Cloudflare),
            seen: RefCell::new(Vec::new()),
        };
        let detection = detect_provider(&DetectionInput {
            config: Some(&config),
            prompt: Some(&prompt),
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Cloudflare);
        assert_eq!(
            *prompt.seen.borrow(),
            vec![ProviderKind::Vercel, ProviderKind::Cloudflare]
        );
    }

    #[test]
    fn falls_back_to_vercel() {
        let prompt = FixedPrompt {
            answer: None,
            seen: RefCell::new(Vec::new()),
        };
        let detection = detect_provider(&DetectionInput {
            prompt: Some(&prompt),
            ..DetectionInput::default()
        });
        assert_eq!(detection.provider, ProviderKind::Vercel);
        assert_eq!(detection.confidence, Confidence::Low);
        assert_eq!(detection.to_string(), "vercel (low confidence)");
    }

    #[test]
    fn registry_memoizes_instances() {
        let settings = ProviderSettings {
            vercel: Some(VercelSettings {
                token: SecretString::from("token"),
                project_id: "prj".into(),
                team_id: None,
                base_url: Some("http://127.0.0.1:9/".into()),
            }),
            ..ProviderSettings::default()
        };
        let registry = ProviderRegistry::with_defaults(settings);

        let first = registry.get(ProviderKind::Vercel).unwrap();
        let second = registry.get(ProviderKind::Vercel).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            registry.get(ProviderKind::Cloudflare),
            Err(CoreError::ProviderNotConfigured { .. })
        ));
    }

    #[test]
    fn unregistered_provider_is_unsupported() {
        let registry = ProviderRegistry::new(ProviderSettings::default());
        assert!(!registry.is_registered(ProviderKind::Vercel));
        assert!(matches!(
            registry.get(ProviderKind::Vercel),
            Err(CoreError::Unsupported { .. })
        ));
    }
}
