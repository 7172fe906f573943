//! Storage for imported resources and import logs
//!
//! A store holds two tables: the resource table, keyed by [`ResourceId`], and
//! the append-only import log. Stores only know how to swap in a complete new
//! resource table; deciding what that table contains after a batch is the
//! [`Reconciler`]'s job, which keeps duplicate handling identical across
//! storage engines.

pub mod dir;
pub mod memory;
pub mod reconcile;

pub use dir::DirStore;
pub use memory::MemoryStore;
pub use reconcile::Reconciler;

use crate::config::DuplicatePolicy;
use crate::error::Result;
use crate::types::{ImportLog, ResourceId, StoredResource};
use std::collections::HashMap;

/// What happened to one incoming row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Resource rows in insertion order, indexed by identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTable {
    rows: Vec<StoredResource>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows; a repeated identifier keeps its last row
    pub fn from_rows(rows: impl IntoIterator<Item = StoredResource>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.upsert(row, DuplicatePolicy::Overwrite);
        }
        table
    }

    pub fn get(&self, id: &ResourceId) -> Option<&StoredResource> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredResource> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a new row or apply `policy` to an existing one
    ///
    /// Overwrite replaces the whole row in place, keeping its position.
    pub fn upsert(&mut self, row: StoredResource, policy: DuplicatePolicy) -> UpsertOutcome {
        match self.index.get(&row.id) {
            Some(&i) => match policy {
                DuplicatePolicy::Overwrite => {
                    self.rows[i] = row;
                    UpsertOutcome::Updated
                }
                DuplicatePolicy::Skip => UpsertOutcome::Skipped,
            },
            None => {
                self.index.insert(row.id.clone(), self.rows.len());
                self.rows.push(row);
                UpsertOutcome::Inserted
            }
        }
    }
}

/// Equality/suffix filter over stored resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub resource_type: Option<String>,

    /// `Patient/PT-001` matches exactly; a bare `PT-001` matches any
    /// reference ending in `/PT-001`
    pub subject: Option<String>,
}

impl ResourceFilter {
    pub fn matches(&self, resource: &StoredResource) -> bool {
        if let Some(resource_type) = &self.resource_type {
            if &resource.resource_type != resource_type {
                return false;
            }
        }

        if let Some(subject) = &self.subject {
            let Some(reference) = resource.subject_reference.as_deref() else {
                return false;
            };
            let matched = if subject.contains('/') {
                reference == subject
            } else {
                reference.ends_with(&format!("/{}", subject))
            };
            if !matched {
                return false;
            }
        }

        true
    }
}

/// A storage engine for resources and import logs
pub trait ResourceStore {
    /// The committed resource table
    fn table(&self) -> &ResourceTable;

    /// Durably replace the resource table; on error the previous table stays in effect
    fn replace_table(&mut self, table: ResourceTable) -> Result<()>;

    /// Import logs, oldest first
    fn logs(&self) -> &[ImportLog];

    fn append_log(&mut self, log: ImportLog) -> Result<()>;

    fn get(&self, id: &ResourceId) -> Option<&StoredResource> {
        self.table().get(id)
    }

    fn find(&self, filter: &ResourceFilter) -> Vec<&StoredResource> {
        self.table().iter().filter(|r| filter.matches(r)).collect()
    }

    /// Newest `limit` logs, newest first
    fn recent_logs(&self, limit: usize) -> Vec<&ImportLog> {
        let mut logs: Vec<&ImportLog> = self.logs().iter().rev().collect();
        logs.sort_by(|a, b| b.imported_at.cmp(&a.imported_at));
        logs.truncate(limit);
        logs
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{ResourceId, StoredResource};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    pub fn stored(id: &str, resource_type: &str, subject: Option<&str>) -> StoredResource {
        let mut raw = json!({"id": id, "resourceType": resource_type});
        if let Some(subject) = subject {
            raw["subject"] = json!({"reference": subject});
        }
        let raw = serde_json::from_value(raw).unwrap();
        StoredResource {
            id: ResourceId::new(id),
            resource_type: resource_type.to_string(),
            subject_reference: subject.map(str::to_string),
            extracted_fields: crate::extract::Extractor::default().extract(&raw),
            raw_data: raw,
            imported_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}
