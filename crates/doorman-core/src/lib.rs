//! Provider-agnostic firewall rules between a local JSON config and remote
//! providers.
//!
//! - **Domain model** ([`model`]): [`UnifiedConfig`], [`UnifiedRule`] and
//!   [`UnifiedIpRule`], plus change sets and sync results.
//!
//! - **Translation** ([`translate`]): [`RuleTranslator`] maps between the
//!   unified model and each provider's native schema, driven by the
//!   compatibility matrix in [`compat`].
//!
//! - **Reconciliation** ([`diff`]): partitions local vs remote into add,
//!   update and delete on provider-form values.
//!
//! - **[`Provider`]**: closed set of provider services exposing
//!   `fetch_config`, `get_changes`, `sync_rules`, validation and health.
//!
//! - **[`SyncOrchestrator`]**: validate, snapshot, sync, verify and either
//!   save or roll back the local config through a [`ConfigStore`].
//!
//! - **[`ProviderRegistry`]** and [`detect_provider`]: explicit provider
//!   construction and target selection.

pub mod compat;
pub mod diff;
pub mod error;
pub mod health;
pub mod migrate;
pub mod model;
pub mod provider;
pub mod registry;
pub mod settings;
pub mod store;
pub mod sync;
pub mod translate;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::CoreError;
pub use health::{Grade, HealthScore};
pub use migrate::{migrate, Migration};
pub use provider::{CloudflareService, Provider, VercelService};
pub use registry::{
    detect_provider, Confidence, Detection, DetectionInput, EnvSnapshot, ProviderPrompt,
    ProviderRegistry,
};
pub use settings::{CloudflareSettings, ProviderSettings, VercelSettings};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use sync::{SyncOrchestrator, SyncReport};
pub use translate::{RuleTranslator, Translated};
pub use validate::{validate, Severity, ValidationIssue, ValidationResult};

pub use model::{
    ActionType, ChangeSet, ConditionField, ConditionOperator, ConditionValue, IdRepair, IpAction,
    MutationLog, ProviderChanges, ProviderKind, RuleLogic, SyncOptions, SyncResult, UnifiedAction,
    UnifiedCondition, UnifiedConfig, UnifiedIpRule, UnifiedRule,
};
