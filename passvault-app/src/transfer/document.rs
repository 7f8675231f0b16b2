use std::collections::HashSet;

use serde_json::Value;

use crate::error::{PassVaultError, Result};
use crate::vault::Entry;

/// Encode the full collection, expired entries included.
pub fn export_document(entries: &[Entry], pretty: bool) -> Result<String> {
    let document = if pretty {
        serde_json::to_string_pretty(entries)?
    } else {
        serde_json::to_string(entries)?
    };
    Ok(document)
}

/// Decode and validate an import document.
///
/// The document must be a JSON array of entry records. One bad record
/// rejects the whole document.
pub fn parse_document(text: &str) -> Result<Vec<Entry>> {
    let records: Vec<Value> = serde_json::from_str(text)
        .map_err(|e| PassVaultError::Parse(format!("Not an entry list: {}", e)))?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| parse_record(index, record))
        .collect()
}

fn parse_record(index: usize, record: Value) -> Result<Entry> {
    let entry: Entry = serde_json::from_value(record).map_err(|e| PassVaultError::InvalidRecord {
        index,
        reason: e.to_string(),
    })?;

    let reason = if entry.description.trim().is_empty() {
        "description is empty"
    } else if entry.secret.is_empty() {
        "password is empty"
    } else {
        return Ok(entry);
    };
    Err(PassVaultError::InvalidRecord {
        index,
        reason: reason.to_string(),
    })
}

/// Append `imported` after `existing`, renumbering imported ids that are
/// already taken.
///
/// Fails with `InvalidRecord` when a colliding record cannot get a new id
/// because the id space is used up.
pub fn merge_entries(existing: &[Entry], imported: Vec<Entry>) -> Result<Vec<Entry>> {
    Ok(merge_with_report(existing, imported)?.0)
}

/// Same as [`merge_entries`], also returning how many ids were reassigned.
pub(crate) fn merge_with_report(
    existing: &[Entry],
    imported: Vec<Entry>,
) -> Result<(Vec<Entry>, usize)> {
    let mut running_max = existing
        .iter()
        .chain(imported.iter())
        .map(|e| e.id)
        .max()
        .unwrap_or(0);
    let mut taken: HashSet<u64> = existing.iter().map(|e| e.id).collect();
    let mut merged = Vec::with_capacity(existing.len() + imported.len());
    merged.extend_from_slice(existing);

    let mut renumbered = 0;
    for (index, mut entry) in imported.into_iter().enumerate() {
        if !taken.insert(entry.id) {
            running_max = running_max
                .checked_add(1)
                .ok_or_else(|| PassVaultError::InvalidRecord {
                    index,
                    reason: format!("id {} is taken and no free id is left", entry.id),
                })?;
            entry.id = running_max;
            taken.insert(entry.id);
            renumbered += 1;
        }
        merged.push(entry);
    }

    Ok((merged, renumbered))
}
