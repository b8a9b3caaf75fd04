//! Summary of an import run

use crate::entity::EntityKind;
use crate::mapping::BatchStats;
use serde::Serialize;
use std::collections::BTreeMap;

/// A sweep that tripped the safety threshold and deleted nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSweep {
    pub kind: EntityKind,
    pub to_delete: usize,
    pub existing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub stats: BTreeMap<EntityKind, BatchStats>,
    /// Entities swept per kind
    pub deleted: BTreeMap<EntityKind, usize>,
    /// Events dropped for a broken parent reference
    pub pruned: usize,
    pub skipped_sweeps: Vec<SkippedSweep>,
}

impl ImportReport {
    pub fn stats(&self, kind: EntityKind) -> BatchStats {
        self.stats.get(&kind).cloned().unwrap_or_default()
    }

    pub fn deleted(&self, kind: EntityKind) -> usize {
        self.deleted.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_deleted(&self) -> usize {
        self.deleted.values().sum()
    }
}
