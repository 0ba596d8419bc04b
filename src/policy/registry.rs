//! Named policy registry.
//!
//! # Responsibilities
//! - Hold one policy per dependency name
//! - Lock-free resolution for concurrent callers
//! - Atomic replacement of a single policy or of the whole table
//!
//! # Design Decisions
//! - The table is an immutable map behind `ArcSwap`; writers clone, edit, swap
//! - Writers serialize on a mutex so concurrent registrations don't lose updates
//! - Readers get an `Arc<Policy>` snapshot and never see a partial update

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::validation::{validate_policies, validate_policy};
use crate::error::RegistryError;
use crate::policy::Policy;

type PolicyTable = HashMap<String, Arc<Policy>>;

/// Names touched by a bulk [`PolicyRegistry::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ReloadSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Thread-safe registry of resilience policies.
#[derive(Debug)]
pub struct PolicyRegistry {
    table: ArcSwap<PolicyTable>,
    write_lock: Mutex<()>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a registry pre-populated with validated policies.
    pub fn from_policies(policies: Vec<Policy>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.apply(policies)?;
        Ok(registry)
    }

    /// Register a policy.
    ///
    /// Fails with `DuplicatePolicy` when the name exists and `replace` is false.
    pub fn register(&self, policy: Policy, replace: bool) -> Result<Arc<Policy>, RegistryError> {
        validate_policy(&policy).map_err(RegistryError::InvalidPolicy)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.table.load();

        let replaced = current.contains_key(&policy.name);
        if replaced && !replace {
            return Err(RegistryError::DuplicatePolicy(policy.name));
        }

        let policy = Arc::new(policy);
        let mut next = PolicyTable::clone(&current);
        next.insert(policy.name.clone(), policy.clone());
        self.table.store(Arc::new(next));

        if replaced {
            tracing::info!(policy = %policy.name, "Policy replaced");
        } else {
            tracing::info!(policy = %policy.name, "Policy registered");
        }
        Ok(policy)
    }

    /// Resolve a policy by name. Never blocks.
    pub fn resolve(&self, name: &str) -> Result<Arc<Policy>, RegistryError> {
        self.table
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPolicy(name.to_string()))
    }

    /// Remove a policy by name.
    pub fn remove(&self, name: &str) -> Result<Arc<Policy>, RegistryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.table.load();

        let mut next = PolicyTable::clone(&current);
        let removed = next
            .remove(name)
            .ok_or_else(|| RegistryError::UnknownPolicy(name.to_string()))?;
        self.table.store(Arc::new(next));

        tracing::info!(policy = %name, "Policy removed");
        Ok(removed)
    }

    /// Replace the whole policy table in one atomic swap.
    ///
    /// Policies whose configuration is unchanged keep their existing `Arc`.
    pub fn apply(&self, policies: Vec<Policy>) -> Result<ReloadSummary, RegistryError> {
        validate_policies(&policies).map_err(RegistryError::InvalidPolicy)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.table.load();

        let mut summary = ReloadSummary::default();
        let mut next = PolicyTable::with_capacity(policies.len());

        for policy in policies {
            let entry = match current.get(&policy.name) {
                Some(existing) if **existing == policy => existing.clone(),
                Some(_) => {
                    summary.updated.push(policy.name.clone());
                    Arc::new(policy)
                }
                None => {
                    summary.added.push(policy.name.clone());
                    Arc::new(policy)
                }
            };
            next.insert(entry.name.clone(), entry);
        }

        summary.removed = current
            .keys()
            .filter(|name| !next.contains_key(*name))
            .cloned()
            .collect();

        summary.added.sort();
        summary.updated.sort();
        summary.removed.sort();

        self.table.store(Arc::new(next));

        tracing::info!(
            added = ?summary.added,
            updated = ?summary.updated,
            removed = ?summary.removed,
            "Policy table applied"
        );
        Ok(summary)
    }

    /// Sorted list of registered policy names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered policies, sorted by name.
    pub fn snapshot(&self) -> Vec<Arc<Policy>> {
        let mut policies: Vec<Arc<Policy>> = self.table.load().values().cloned().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        policies
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
