//! Insert/update/skip decisions for a batch, committed all-or-nothing

use crate::config::DuplicatePolicy;
use crate::error::{KilnError, Result};
use crate::store::{ResourceStore, ResourceTable, UpsertOutcome};
use crate::types::{StoredResource, UpsertStats};
use tracing::{info, warn};

/// Applies a batch of rows to a store under a [`DuplicatePolicy`]
///
/// The batch is staged against a copy of the committed table and swapped in
/// only if every row is accepted and the store persists the result. Any
/// failure leaves the committed table untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: DuplicatePolicy,
}

impl Reconciler {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Reconciler { policy }
    }

    /// Build the table that would result from applying `batch` to `current`
    ///
    /// Rows are applied in order, so a repeated identifier within the batch
    /// behaves exactly like one repeated across batches.
    pub fn stage(
        &self,
        current: &ResourceTable,
        batch: Vec<StoredResource>,
    ) -> Result<(ResourceTable, UpsertStats)> {
        let mut staged = current.clone();
        let mut stats = UpsertStats::default();

        for row in batch {
            check_row(&row)?;
            match staged.upsert(row, self.policy) {
                UpsertOutcome::Inserted => stats.inserted += 1,
                UpsertOutcome::Updated => stats.updated += 1,
                UpsertOutcome::Skipped => stats.skipped += 1,
            }
        }

        Ok((staged, stats))
    }

    /// Stage `batch` and commit it to `store` as one unit
    pub fn commit<S: ResourceStore + ?Sized>(
        &self,
        store: &mut S,
        batch: Vec<StoredResource>,
    ) -> Result<UpsertStats> {
        let rows = batch.len();

        let (staged, stats) = self.stage(store.table(), batch).map_err(|e| {
            warn!(rows, error = %e, "batch rejected, nothing committed");
            e
        })?;

        store.replace_table(staged).map_err(|e| {
            warn!(rows, error = %e, "batch rolled back");
            KilnError::Persistence(e.to_string())
        })?;

        info!(
            policy = %self.policy,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            "batch committed"
        );
        Ok(stats)
    }
}

fn check_row(row: &StoredResource) -> Result<()> {
    if row.id.as_str().is_empty() {
        return Err(KilnError::Persistence(format!(
            "row of type '{}' has an empty identifier",
            row.resource_type
        )));
    }
    if row.resource_type.is_empty() {
        return Err(KilnError::Persistence(format!(
            "row '{}' has an empty resource type",
            row.id
        )));
    }
    Ok(())
}
