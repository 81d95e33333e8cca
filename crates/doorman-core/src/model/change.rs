// ── Change sets and sync results ──
//
// Ephemeral values computed per diff / sync request. Never persisted.

use std::fmt;

use serde::Serialize;

use super::ip::UnifiedIpRule;
use super::rule::UnifiedRule;

/// Partition of local-vs-remote differences. The three lists are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet<T> {
    pub to_add: Vec<T>,
    pub to_update: Vec<T>,
    pub to_delete: Vec<T>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

impl<T> ChangeSet<T> {
    pub fn has_changes(&self) -> bool {
        !(self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty())
    }

    /// Total number of changes.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }

    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            added: self.to_add.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
        }
    }

    /// Apply `f` to every item, keeping partitions.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> ChangeSet<U> {
        ChangeSet {
            to_add: self.to_add.into_iter().map(&mut f).collect(),
            to_update: self.to_update.into_iter().map(&mut f).collect(),
            to_delete: self.to_delete.into_iter().map(&mut f).collect(),
        }
    }
}

/// Add / update / delete counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncCounts {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted
    }
}

/// Remote changes needed to make the remote match a local config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderChanges {
    pub rules: ChangeSet<UnifiedRule>,
    pub ips: ChangeSet<UnifiedIpRule>,
    /// Remote version marker at diff time.
    pub remote_version: Option<u64>,
    /// Translation warnings collected while diffing.
    pub warnings: Vec<String>,
}

impl ProviderChanges {
    pub fn has_changes(&self) -> bool {
        self.rules.has_changes() || self.ips.has_changes()
    }
}

/// Rewrite of a locally stored rule id to the provider's canonical id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRepair {
    /// Previous id; empty when the rule had none.
    pub old_id: String,
    pub new_id: String,
    pub name: String,
}

// ── Mutation log ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Delete,
    Add,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Rule,
    Ip,
}

/// One remote mutation that completed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub entity: EntityKind,
    /// Remote id, when known.
    pub id: Option<String>,
    /// Rule name or IP address.
    pub label: String,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.kind, self.entity, self.label)?;
        if let Some(ref id) = self.id {
            write!(f, " ({id})")?;
        }
        Ok(())
    }
}

/// Ordered record of applied mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationLog {
    entries: Vec<Mutation>,
}

impl MutationLog {
    pub fn record(
        &mut self,
        kind: MutationKind,
        entity: EntityKind,
        id: Option<String>,
        label: impl Into<String>,
    ) {
        self.entries.push(Mutation {
            kind,
            entity,
            id,
            label: label.into(),
        });
    }

    pub fn entries(&self) -> &[Mutation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for MutationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("no mutations applied");
        }
        let lines: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        f.write_str(&lines.join("; "))
    }
}

// ── Sync ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Compute changes without calling mutating endpoints.
    pub dry_run: bool,
    /// Rewrite local rule ids to the canonical remote ids after sync.
    pub apply_id_repairs: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub dry_run: bool,
    pub rules: SyncCounts,
    pub ips: SyncCounts,
    pub id_repairs: Vec<IdRepair>,
    pub mutations: MutationLog,
    pub warnings: Vec<String>,
}

impl SyncResult {
    pub fn total_changes(&self) -> usize {
        self.rules.total() + self.ips.total()
    }
}
