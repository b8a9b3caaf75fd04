//! Removal of records whose parent reference cannot be satisfied

use crate::entity::OriginRecord;
use std::collections::HashSet;
use tracing::warn;

/// Drop every record whose `parent_field` points at a record outside the
/// batch, repeating until no more records fall out.
///
/// Records without a parent are roots and always survive; a parent value
/// that names no id counts as broken. Survivors keep their input order.
pub fn purge_orphans(records: Vec<OriginRecord>, parent_field: &str) -> Vec<OriginRecord> {
    let mut records = records;

    loop {
        let present: HashSet<String> = records.iter().map(|r| r.origin_id().to_string()).collect();
        let before = records.len();

        records.retain(|record| match record.relation_id(parent_field) {
            Ok(Some(parent)) if !present.contains(&parent) => {
                warn!(
                    record = record.origin_id(),
                    field = parent_field,
                    parent = %parent,
                    "dropping record with broken parent reference"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(
                    record = record.origin_id(),
                    field = parent_field,
                    error = %e,
                    "dropping record with malformed parent reference"
                );
                false
            }
        });

        if records.len() == before {
            return records;
        }
    }
}
