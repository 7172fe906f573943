use crate::error::Result;
use crate::store::{ResourceStore, ResourceTable};
use crate::types::ImportLog;

/// Keeps both tables in memory; nothing survives the process
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: ResourceTable,
    logs: Vec<ImportLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceStore for MemoryStore {
    fn table(&self) -> &ResourceTable {
        &self.table
    }

    fn replace_table(&mut self, table: ResourceTable) -> Result<()> {
        self.table = table;
        Ok(())
    }

    fn logs(&self) -> &[ImportLog] {
        &self.logs
    }

    fn append_log(&mut self, log: ImportLog) -> Result<()> {
        self.logs.push(log);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImportStatistics;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn log_at(minutes_ago: i64) -> ImportLog {
        ImportLog {
            id: Uuid::new_v4(),
            imported_at: Utc::now() - Duration::minutes(minutes_ago),
            total_lines: 1,
            successful: 1,
            failed: 0,
            errors: Vec::new(),
            statistics: ImportStatistics::default(),
        }
    }

    #[test]
    fn test_recent_logs_newest_first() {
        let mut store = MemoryStore::new();
        let oldest = log_at(30);
        let newest = log_at(1);
        let middle = log_at(10);
        store.append_log(oldest.clone()).unwrap();
        store.append_log(newest.clone()).unwrap();
        store.append_log(middle.clone()).unwrap();

        let recent = store.recent_logs(2);
        assert_eq!(recent, vec![&newest, &middle]);
        assert_eq!(store.recent_logs(10).len(), 3);
        assert_eq!(store.logs()[0], oldest);
    }
}
