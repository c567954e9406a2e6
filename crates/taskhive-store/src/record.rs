//! Record store - the JSON Lines file holding every work item.
//!
//! The store keeps no state between calls. Every `load` parses the file from
//! scratch so writes made by other worker processes are always visible, and
//! every `save` replaces the whole file through a temporary sibling and a
//! rename so a reader never observes a half-written record set.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use taskhive_core::WorkItem;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// Handle to the on-disk record file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full record set. A missing file is an empty queue.
    pub fn load(&self) -> Result<Vec<WorkItem>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Record store does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        parse_records(&contents)
    }

    /// Atomically replace the record file with `items`.
    pub fn save(&self, items: &[WorkItem]) -> Result<(), StoreError> {
        let rendered = render_records(items)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "queue.jsonl".to_string());
        let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        if let Err(e) = write_synced(&tmp_path, rendered.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            warn!(error = %e, tmp = %tmp_path.display(), "Failed to replace record store");
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), records = items.len(), "Record store rewritten");
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Parse JSON Lines content. Blank lines are skipped; line numbers in errors
/// are 1-based.
pub fn parse_records(contents: &str) -> Result<Vec<WorkItem>, StoreError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Render one record per line with a trailing newline.
pub fn render_records(items: &[WorkItem]) -> Result<String, StoreError> {
    let mut out = String::new();
    for item in items {
        out.push_str(&serde_json::to_string(item)?);
        out.push('\n');
    }
    Ok(out)
}
