//! Directory-backed store: one JSON Lines file per table

use crate::error::{KilnError, Result};
use crate::store::{ResourceStore, ResourceTable};
use crate::types::{ImportLog, StoredResource};
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const RESOURCES_FILE: &str = "resources.jsonl";
const IMPORT_LOGS_FILE: &str = "import_logs.jsonl";

/// Persists the resource table and the import log under a directory
///
/// The resource table is rewritten whole on every commit: rows go to a
/// temporary file which is then renamed over `resources.jsonl`, so a failed
/// write leaves the previous table on disk. Import logs are appended.
#[derive(Debug)]
pub struct DirStore {
    dir: PathBuf,
    table: ResourceTable,
    logs: Vec<ImportLog>,
}

impl DirStore {
    /// Open the store in `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let rows: Vec<StoredResource> = read_jsonl(&dir.join(RESOURCES_FILE))?;
        let logs: Vec<ImportLog> = read_jsonl(&dir.join(IMPORT_LOGS_FILE))?;
        debug!(dir = %dir.display(), resources = rows.len(), logs = logs.len(), "opened store");

        Ok(DirStore {
            dir,
            table: ResourceTable::from_rows(rows),
            logs,
        })
    }

    fn write_table(&self, table: &ResourceTable) -> Result<()> {
        let target = self.dir.join(RESOURCES_FILE);
        let staging = self.dir.join(format!("{}.tmp", RESOURCES_FILE));

        let file = File::create(&staging)?;
        let mut writer = BufWriter::new(file);
        for row in table.iter() {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| KilnError::Io(e.into_error()))?;
        file.sync_all()?;

        fs::rename(&staging, &target)?;
        Ok(())
    }
}

impl ResourceStore for DirStore {
    fn table(&self) -> &ResourceTable {
        &self.table
    }

    fn replace_table(&mut self, table: ResourceTable) -> Result<()> {
        if let Err(e) = self.write_table(&table) {
            let _ = fs::remove_file(self.dir.join(format!("{}.tmp", RESOURCES_FILE)));
            return Err(e);
        }
        self.table = table;
        Ok(())
    }

    fn logs(&self) -> &[ImportLog] {
        &self.logs
    }

    fn append_log(&mut self, log: ImportLog) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(IMPORT_LOGS_FILE))?;
        let line = serde_json::to_string(&log)?;
        writeln!(file, "{}", line)?;
        self.logs.push(log);
        Ok(())
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| {
            KilnError::Config(format!("{} line {}: {}", path.display(), i + 1, e))
        })?;
        items.push(item);
    }
    Ok(items)
}
