//! Safety valve for sweeps

use serde::{Deserialize, Serialize};

/// Upper bounds on how much a single sweep may delete.
///
/// A sweep with at least one candidate trips the valve when it exceeds any
/// configured limit. `None` disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThreshold {
    /// Largest number of entities one sweep may delete
    pub max_deletions: Option<usize>,
    /// Largest share of the pre-existing entities one sweep may delete
    pub max_fraction: Option<f64>,
}

impl Default for SafetyThreshold {
    fn default() -> Self {
        Self {
            max_deletions: None,
            max_fraction: Some(0.2),
        }
    }
}

impl SafetyThreshold {
    /// A threshold that never trips
    pub fn unlimited() -> Self {
        Self {
            max_deletions: None,
            max_fraction: None,
        }
    }

    pub fn is_exceeded(&self, to_delete: usize, existing: usize) -> bool {
        if to_delete == 0 {
            return false;
        }
        let over_count = self.max_deletions.is_some_and(|max| to_delete > max);
        let over_fraction = self.max_fraction.is_some_and(|max| {
            existing == 0 || to_delete as f64 / existing as f64 > max
        });
        over_count || over_fraction
    }
}
