//! Sample table differ.
//!
//! Reconciles the stored sample rows of a project with a desired sample
//! table. Rows are matched by GUID, never by sample name or position, so a
//! row keeps its identity across edits even when every visible attribute
//! changes. The output is the minimal set of deletes, in-place updates,
//! inserts and position rewrites that turns the stored table into the
//! desired one.
//!
//! All validation happens in [`SampleDiffer::diff`] before a diff is
//! returned; a caller that applies a returned diff never sees an integrity
//! error halfway through.

use crate::config::PepConfig;
use crate::error::{PepDbError, Result};
use crate::identity::{assign_guid, compute_digest, guid_from_value};
use crate::models::SampleAttributes;
use crate::ordering::reorder_after_mutation;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Whether desired rows must carry the identifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// Every row must contain the identifier key. A `null` or empty value
    /// still marks the row as new.
    Required,
    /// Rows without the key are treated as new.
    Optional,
}

/// A stored sample row.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentRow {
    pub guid: String,
    pub attributes: SampleAttributes,
    pub row_number: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleUpdate {
    pub guid: String,
    pub attributes: SampleAttributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleInsert {
    pub guid: String,
    pub attributes: SampleAttributes,
    pub row_number: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMove<'a> {
    pub guid: &'a str,
    pub from: usize,
    pub to: usize,
}

/// One row of the reconciled table.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalRow {
    pub guid: String,
    pub attributes: SampleAttributes,
    pub row_number: usize,
    /// Position before the update; `None` for inserted rows.
    pub previous_row_number: Option<usize>,
}

/// Row-level changes that reconcile two sample tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleDiff {
    /// GUIDs of stored rows to remove, in stored order.
    pub deletions: Vec<String>,
    pub updates: Vec<SampleUpdate>,
    pub insertions: Vec<SampleInsert>,
    /// The reconciled table in desired order.
    pub rows: Vec<FinalRow>,
}

impl SampleDiff {
    /// Retained rows whose position changed.
    pub fn moves(&self) -> Vec<RowMove<'_>> {
        self.rows
            .iter()
            .filter_map(|row| match row.previous_row_number {
                Some(from) if from != row.row_number => Some(RowMove {
                    guid: &row.guid,
                    from,
                    to: row.row_number,
                }),
                _ => None,
            })
            .collect()
    }

    /// No insert, update, delete or move.
    pub fn is_noop(&self) -> bool {
        self.deletions.is_empty()
            && self.updates.is_empty()
            && self.insertions.is_empty()
            && self.moves().is_empty()
    }

    /// Attributes of the reconciled table, in order.
    pub fn final_attributes(&self) -> Vec<SampleAttributes> {
        self.rows.iter().map(|row| row.attributes.clone()).collect()
    }

    /// Digest of the reconciled table.
    pub fn digest(&self) -> String {
        compute_digest(&self.final_attributes())
    }
}

/// A desired row after its identifier has been split off.
#[derive(Debug, Clone)]
struct DesiredRow {
    guid: Option<String>,
    attributes: SampleAttributes,
}

/// Computes [`SampleDiff`]s.
#[derive(Debug, Clone)]
pub struct SampleDiffer {
    mode: IdentityMode,
}

impl SampleDiffer {
    pub fn new(mode: IdentityMode) -> Self {
        Self { mode }
    }

    /// Diff `current` against `desired`.
    ///
    /// Stale identifiers (present on a desired row but unknown to `current`)
    /// are kept as the GUID of the inserted row.
    pub fn diff(&self, current: &[CurrentRow], desired: &[SampleAttributes]) -> Result<SampleDiff> {
        let desired = self.split_identifiers(desired)?;

        let mut current_by_guid: HashMap<&str, &CurrentRow> = HashMap::with_capacity(current.len());
        for row in current {
            if current_by_guid.insert(row.guid.as_str(), row).is_some() {
                return Err(PepDbError::SampleTableUpdate {
                    message: format!("stored sample table repeats identifier '{}'", row.guid),
                });
            }
        }

        let mut updates = Vec::new();
        let mut order: Vec<String> = Vec::with_capacity(desired.len());
        let mut new_rows: HashMap<String, SampleAttributes> = HashMap::new();
        let mut attributes_by_guid: HashMap<String, SampleAttributes> = HashMap::new();

        for row in desired {
            let guid = match row.guid {
                Some(guid) => {
                    if let Some(existing) = current_by_guid.get(guid.as_str()) {
                        if existing.attributes != row.attributes {
                            updates.push(SampleUpdate {
                                guid: guid.clone(),
                                attributes: row.attributes.clone(),
                            });
                        }
                    } else {
                        debug!("Identifier {} is not stored; inserting row under it", guid);
                        new_rows.insert(guid.clone(), row.attributes.clone());
                    }
                    guid
                }
                None => {
                    let guid = assign_guid();
                    new_rows.insert(guid.clone(), row.attributes.clone());
                    guid
                }
            };
            attributes_by_guid.insert(guid.clone(), row.attributes);
            order.push(guid);
        }

        let kept: HashSet<&str> = order.iter().map(String::as_str).collect();
        let deletions: Vec<String> = current
            .iter()
            .filter(|row| !kept.contains(row.guid.as_str()))
            .map(|row| row.guid.clone())
            .collect();

        let previous: HashMap<String, usize> = current
            .iter()
            .map(|row| (row.guid.clone(), row.row_number))
            .collect();
        let deleted: HashSet<String> = deletions.iter().cloned().collect();
        let placements = reorder_after_mutation(&previous, &deleted, &order);

        let mut insertions = Vec::new();
        let mut rows = Vec::with_capacity(placements.len());
        for placement in placements {
            let attributes = attributes_by_guid
                .remove(&placement.key)
                .unwrap_or_default();
            if let Some(new_attributes) = new_rows.remove(&placement.key) {
                insertions.push(SampleInsert {
                    guid: placement.key.clone(),
                    attributes: new_attributes,
                    row_number: placement.position,
                });
            }
            rows.push(FinalRow {
                guid: placement.key,
                attributes,
                row_number: placement.position,
                previous_row_number: placement.previous,
            });
        }

        debug!(
            "Sample diff: {} deleted, {} updated, {} inserted, {} rows",
            deletions.len(),
            updates.len(),
            insertions.len(),
            rows.len()
        );

        Ok(SampleDiff {
            deletions,
            updates,
            insertions,
            rows,
        })
    }

    /// Separate identifiers from attributes and validate them.
    fn split_identifiers(&self, desired: &[SampleAttributes]) -> Result<Vec<DesiredRow>> {
        let mut seen: HashSet<String> = HashSet::with_capacity(desired.len());
        let mut rows = Vec::with_capacity(desired.len());

        for (index, sample) in desired.iter().enumerate() {
            let guid = match sample.get(PepConfig::SAMPLE_ID_KEY) {
                Some(value) => guid_from_value(value),
                None if self.mode == IdentityMode::Required => {
                    return Err(PepDbError::MissingIdentifier {
                        row: index,
                        key: PepConfig::SAMPLE_ID_KEY.to_string(),
                    });
                }
                None => None,
            };

            if let Some(guid) = &guid {
                if !seen.insert(guid.clone()) {
                    return Err(PepDbError::DuplicatedIdentifier { guid: guid.clone() });
                }
            }

            let attributes = without_identifier(sample, PepConfig::SAMPLE_ID_KEY);

            rows.push(DesiredRow { guid, attributes });
        }

        Ok(rows)
    }
}

/// Copy of `sample` without the identifier attribute, column order kept.
pub(crate) fn without_identifier(sample: &SampleAttributes, id_key: &str) -> SampleAttributes {
    sample
        .iter()
        .filter(|(key, _)| key.as_str() != id_key)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl Default for SampleDiffer {
    fn default() -> Self {
        Self::new(IdentityMode::Required)
    }
}
