use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::StoreError;
use crate::tickets::TicketRecord;

pub type TicketMap = BTreeMap<String, TicketRecord>;

/// JSON file of ticket records keyed by ticket id.
///
/// The whole document is rewritten on every mutation. Callers build the new
/// map, write it, and only then swap it in, so a failed write leaves the
/// in-memory view matching the file.
#[derive(Debug)]
pub struct TicketStore {
    path: PathBuf,
    records: TicketMap,
}

impl TicketStore {
    /// Reads the store, creating an empty document if the file is absent.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => TicketMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Ticket store missing, initializing empty file");
                let empty = TicketMap::new();
                write_atomic(&path, &render(&empty)?).await?;
                empty
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        info!(path = %path.display(), records = records.len(), "Ticket store loaded");
        Ok(Self { path, records })
    }

    pub fn get(&self, ticket_id: &str) -> Option<&TicketRecord> {
        self.records.get(ticket_id)
    }

    #[cfg(test)]
    pub fn records(&self) -> &TicketMap {
        &self.records
    }

    /// Persists `record` and, once the write succeeds, applies it in memory.
    pub async fn put(&mut self, record: TicketRecord) -> Result<(), StoreError> {
        let mut next = self.records.clone();
        next.insert(record.ticket_id.clone(), record);
        write_atomic(&self.path, &render(&next)?).await?;
        self.records = next;
        debug!(path = %self.path.display(), records = self.records.len(), "Ticket store written");
        Ok(())
    }
}

fn render(records: &TicketMap) -> Result<String, StoreError> {
    let mut payload = serde_json::to_string_pretty(records)?;
    payload.push('\n');
    Ok(payload)
}

/// Writes to a sibling temp file, then renames it over `path`.
async fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tickets.json");
    let temp_path = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

    tokio::fs::write(&temp_path, content).await.map_err(io_err)?;
    if let Err(source) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_err(source));
    }
    Ok(())
}
