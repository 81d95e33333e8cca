// ── Domain model ──
//
// Provider-neutral types shared by translators, the diff engine and the
// provider services.

pub mod change;
pub mod config;
pub mod ip;
pub mod rule;

pub use change::{
    ChangeSet, EntityKind, IdRepair, Mutation, MutationKind, MutationLog, ProviderChanges,
    SyncCounts, SyncOptions, SyncResult,
};
pub use config::{
    CloudflareSection, MigrationInfo, ProviderKind, ProviderSections, UnifiedConfig,
    VercelSection, MIN_SCHEMA_VERSION, SCHEMA_VERSION,
};
pub use ip::{IpAction, UnifiedIpRule};
pub use rule::{
    ActionType, ConditionField, ConditionOperator, ConditionValue, RateLimitConfig,
    RedirectConfig, ResponseOverride, RuleLogic, UnifiedAction, UnifiedCondition, UnifiedRule,
};
