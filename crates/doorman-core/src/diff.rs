// ── Diff / reconciliation engine ──
//
// Partitions local-vs-remote items into add / update / delete. Generic over
// `Reconcile`, implemented for the unified types and for every native
// provider type so diffs can run on like-for-like provider values.

use std::collections::{BTreeMap, HashMap, HashSet};

use doorman_api::cloudflare::types::{AccessRule, Rule};
use doorman_api::vercel::types::{CustomRule, IpRule};

use crate::error::CoreError;
use crate::model::ip::normalize_ip;
use crate::model::{ChangeSet, UnifiedIpRule, UnifiedRule};

/// Matching and comparison rules for one item type.
pub trait Reconcile {
    /// Identity used to pair local and remote items. `None` means "new".
    fn reconcile_key(&self) -> Option<String>;

    /// Equality ignoring identifiers and other server-owned fields.
    fn same_content(&self, other: &Self) -> bool;

    /// Take over the remote item's identifiers.
    fn adopt_identity(&mut self, remote: &Self);
}

/// Items with a provider id and a human-facing name.
pub trait Identified {
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: Option<String>);
    fn display_name(&self) -> &str;
}

/// Diff `local` against `remote`.
///
/// Keyed partitions are sorted by key; unkeyed adds follow in local order.
/// Duplicate keys on either side, or a remote item without a key, are
/// reconciliation errors.
pub fn diff<T: Reconcile + Clone>(local: &[T], remote: &[T]) -> Result<ChangeSet<T>, CoreError> {
    let mut remote_by_key: BTreeMap<String, &T> = BTreeMap::new();
    for item in remote {
        let key = item
            .reconcile_key()
            .ok_or_else(|| CoreError::reconciliation("remote item has no identifier"))?;
        if remote_by_key.insert(key.clone(), item).is_some() {
            return Err(CoreError::reconciliation(format!(
                "duplicate remote key {key:?}"
            )));
        }
    }

    let mut keyed_adds: BTreeMap<String, T> = BTreeMap::new();
    let mut unkeyed_adds = Vec::new();
    let mut updates: BTreeMap<String, T> = BTreeMap::new();
    let mut local_keys: HashSet<String> = HashSet::new();

    for item in local {
        let Some(key) = item.reconcile_key() else {
            unkeyed_adds.push(item.clone());
            continue;
        };
        if !local_keys.insert(key.clone()) {
            return Err(CoreError::reconciliation(format!(
                "duplicate local key {key:?}"
            )));
        }
        match remote_by_key.get(&key) {
            Some(remote_item) if item.same_content(remote_item) => {}
            Some(remote_item) => {
                let mut updated = item.clone();
                updated.adopt_identity(remote_item);
                updates.insert(key, updated);
            }
            None => {
                keyed_adds.insert(key, item.clone());
            }
        }
    }

    let to_delete = remote_by_key
        .into_iter()
        .filter(|(key, _)| !local_keys.contains(key))
        .map(|(_, item)| item.clone())
        .collect();

    let mut to_add: Vec<T> = keyed_adds.into_values().collect();
    to_add.extend(unkeyed_adds);

    Ok(ChangeSet {
        to_add,
        to_update: updates.into_values().collect(),
        to_delete,
    })
}

/// Give id-less or stale-id local items the id of the same-named remote
/// item. Names shared by several remote items are left alone, as are ids
/// another local item already holds.
pub fn adopt_identities_by_name<T: Identified + Clone>(local: &[T], remote: &[T]) -> Vec<T> {
    let remote_ids: HashSet<&str> = remote.iter().filter_map(Identified::id).collect();

    let mut by_name: HashMap<&str, Option<&str>> = HashMap::new();
    for item in remote {
        let Some(id) = item.id() else { continue };
        by_name
            .entry(item.display_name())
            .and_modify(|slot| *slot = None)
            .or_insert(Some(id));
    }

    let mut claimed: HashSet<String> = local
        .iter()
        .filter_map(Identified::id)
        .filter(|id| remote_ids.contains(id))
        .map(str::to_owned)
        .collect();

    local
        .iter()
        .map(|item| {
            let mut item = item.clone();
            let current_is_live = item.id().is_some_and(|id| remote_ids.contains(id));
            if !current_is_live {
                if let Some(Some(remote_id)) = by_name.get(item.display_name()) {
                    if claimed.insert((*remote_id).to_owned()) {
                        item.set_id(Some((*remote_id).to_owned()));
                    }
                }
            }
            item
        })
        .collect()
}

// ── Paired values ────────────────────────────────────────────────────

/// A unified value and its native rendering, reconciled on the native side.
#[derive(Debug, Clone, PartialEq)]
pub struct Paired<U, N> {
    pub unified: U,
    pub native: N,
}

impl<U, N> Paired<U, N> {
    pub fn new(unified: U, native: N) -> Self {
        Self { unified, native }
    }
}

impl<U: Identified, N: Reconcile + Identified> Reconcile for Paired<U, N> {
    fn reconcile_key(&self) -> Option<String> {
        self.native.reconcile_key()
    }

    fn same_content(&self, other: &Self) -> bool {
        self.native.same_content(&other.native)
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.native.adopt_identity(&remote.native);
        self.unified.set_id(remote.native.id().map(str::to_owned));
    }
}

impl<U: Identified, N: Identified> Identified for Paired<U, N> {
    fn id(&self) -> Option<&str> {
        self.native.id()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.unified.set_id(id.clone());
        self.native.set_id(id);
    }

    fn display_name(&self) -> &str {
        self.unified.display_name()
    }
}

// ── Unified types ────────────────────────────────────────────────────

impl Reconcile for UnifiedRule {
    fn reconcile_key(&self) -> Option<String> {
        self.id.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        UnifiedRule::same_content(self, other)
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.id.clone_from(&remote.id);
    }
}

impl Identified for UnifiedRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Reconcile for UnifiedIpRule {
    fn reconcile_key(&self) -> Option<String> {
        Some(self.normalized_ip())
    }

    fn same_content(&self, other: &Self) -> bool {
        UnifiedIpRule::same_content(self, other)
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.id.clone_from(&remote.id);
    }
}

impl Identified for UnifiedIpRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &str {
        &self.ip
    }
}

// ── Vercel types ─────────────────────────────────────────────────────

impl Reconcile for CustomRule {
    fn reconcile_key(&self) -> Option<String> {
        self.id.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.active == other.active
            && self.condition_group == other.condition_group
            && self.action == other.action
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.id.clone_from(&remote.id);
    }
}

impl Identified for CustomRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Reconcile for IpRule {
    fn reconcile_key(&self) -> Option<String> {
        Some(normalize_ip(&self.ip))
    }

    fn same_content(&self, other: &Self) -> bool {
        normalize_ip(&self.ip) == normalize_ip(&other.ip)
            && self.hostname == other.hostname
            && self.notes.as_deref().unwrap_or_default() == other.notes.as_deref().unwrap_or_default()
            && self.action == other.action
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.id.clone_from(&remote.id);
    }
}

impl Identified for IpRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &str {
        &self.ip
    }
}

// ── Cloudflare types ─────────────────────────────────────────────────

impl Reconcile for Rule {
    fn reconcile_key(&self) -> Option<String> {
        self.id.clone()
    }

    /// Ignores `version` and `last_updated`, which the API bumps.
    fn same_content(&self, other: &Self) -> bool {
        self.action == other.action
            && self.expression == other.expression
            && self.description == other.description
            && self.enabled == other.enabled
            && self.action_parameters == other.action_parameters
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.id.clone_from(&remote.id);
    }
}

impl Identified for Rule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &str {
        &self.description
    }
}

impl Reconcile for AccessRule {
    fn reconcile_key(&self) -> Option<String> {
        Some(normalize_ip(&self.configuration.value))
    }

    fn same_content(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.configuration.target == other.configuration.target
            && normalize_ip(&self.configuration.value) == normalize_ip(&other.configuration.value)
            && self.notes == other.notes
    }

    fn adopt_identity(&mut self, remote: &Self) {
        self.id.clone_from(&remote.id);
    }
}

impl Identified for AccessRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &str {
        &self.configuration.value
    }
}
