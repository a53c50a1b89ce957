//! Diff computation between observed and desired state
//!
//! Every entity kind is compared by an explicit identity key, and the result
//! is the full symmetric difference: what is observed but not desired is
//! removed, what is desired but not observed is added. Both lists keep the
//! order of their inputs so plans are stable from run to run.

use crate::config::DesiredConfig;
use crate::observe::ObservedState;
use crate::resolve::PathResolver;
use crate::types::{Database, Mount, Site};
use std::collections::HashSet;
use std::hash::Hash;

/// Removals and additions for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changes<T> {
    /// Observed but not desired
    pub remove: Vec<T>,
    /// Desired but not observed
    pub add: Vec<T>,
}

impl<T> Default for Changes<T> {
    fn default() -> Self {
        Self {
            remove: Vec::new(),
            add: Vec::new(),
        }
    }
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    pub fn len(&self) -> usize {
        self.remove.len() + self.add.len()
    }
}

/// Symmetric difference of two lists under `key`.
///
/// Duplicates within either side collapse to their first occurrence.
pub fn symmetric_difference<T, K, F>(observed: &[T], desired: &[T], key: F) -> Changes<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let observed_keys: HashSet<K> = observed.iter().map(&key).collect();
    let desired_keys: HashSet<K> = desired.iter().map(&key).collect();

    Changes {
        remove: only_in(observed, &desired_keys, &key),
        add: only_in(desired, &observed_keys, &key),
    }
}

fn only_in<T, K, F>(items: &[T], other: &HashSet<K>, key: &F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let k = key(item);
        if !other.contains(&k) && seen.insert(k) {
            out.push(item.clone());
        }
    }
    out
}

/// Mount changes, keyed by resolved source and normalized destination.
///
/// The returned mounts carry resolved sources, ready for the VM manager.
pub fn diff_mounts(attached: &[Mount], desired: &[Mount], resolver: &PathResolver) -> Changes<Mount> {
    let attached: Vec<Mount> = attached.iter().map(|m| resolver.resolve_mount(m)).collect();
    let desired: Vec<Mount> = desired.iter().map(|m| resolver.resolve_mount(m)).collect();
    symmetric_difference(&attached, &desired, |m| (m.source.clone(), m.dest.clone()))
}

/// Site changes, keyed by hostname, served directory and aliases.
///
/// A site whose webroot or aliases changed shows up as a removal plus an
/// addition of the same hostname; removals run first, so the result is a
/// re-stage.
pub fn diff_sites(observed: &[Site], desired: &[Site]) -> Changes<Site> {
    symmetric_difference(observed, desired, Site::identity)
}

/// Database changes, keyed by container name.
pub fn diff_databases(observed: &[Database], desired: &[Database]) -> Changes<Database> {
    symmetric_difference(observed, desired, Database::name)
}

/// Desired databases found among the stopped containers, in desired order.
fn stopped_and_desired(stopped: &[Database], desired: &[Database]) -> Vec<Database> {
    desired
        .iter()
        .filter(|d| stopped.iter().any(|s| s.name() == d.name()))
        .cloned()
        .collect()
}

/// Everything that differs between the machine and the config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub mounts: Changes<Mount>,
    pub sites: Changes<Site>,
    pub databases: Changes<Database>,
    /// Desired databases whose containers exist but are stopped
    pub start_databases: Vec<Database>,
    /// Desired PHP version when it differs from the observed one
    pub php: Option<String>,
}

impl StateDiff {
    /// Compare a config against the observed machine.
    pub fn compute(
        observed: &ObservedState,
        desired: &DesiredConfig,
        resolver: &PathResolver,
    ) -> Self {
        let php = if observed.php.as_deref() == Some(desired.php.as_str()) {
            None
        } else {
            Some(desired.php.clone())
        };

        Self {
            mounts: diff_mounts(&observed.mounts, &desired.mounts, resolver),
            sites: diff_sites(&observed.sites, &desired.sites),
            databases: diff_databases(&observed.databases, &desired.databases),
            start_databases: stopped_and_desired(&observed.stopped_databases, &desired.databases),
            php,
        }
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            additions: self.mounts.add.len() + self.sites.add.len() + self.databases.add.len(),
            removals: self.mounts.remove.len()
                + self.sites.remove.len()
                + self.databases.remove.len(),
            modifications: usize::from(self.php.is_some()) + self.start_databases.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.summary().has_changes()
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of entities to add
    pub additions: usize,
    /// Number of entities to remove
    pub removals: usize,
    /// Number of settings to change in place
    pub modifications: usize,
}

impl DiffSummary {
    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
