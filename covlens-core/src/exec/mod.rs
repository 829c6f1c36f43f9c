//! Execution records: probe hit data recorded while tests ran.
//!
//! The on-disk format is a sequence of typed blocks (header, session info,
//! per-class execution data). [`ExecDataReader`] and [`ExecDataWriter`] are the
//! codec; [`ExecutionStore`] holds the merged result keyed by class id.

mod reader;
mod writer;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::RecordLoadError;

pub use reader::ExecDataReader;
pub use writer::ExecDataWriter;

pub const BLOCK_HEADER: u8 = 0x01;
pub const BLOCK_SESSION_INFO: u8 = 0x10;
pub const BLOCK_EXECUTION_DATA: u8 = 0x11;

pub const MAGIC_NUMBER: u16 = 0xC0C0;
pub const FORMAT_VERSION: u16 = 0x1007;

/// Metadata of one recording session (one test JVM dump).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    /// Epoch milliseconds when the session started.
    pub start: i64,
    /// Epoch milliseconds when the data was dumped.
    pub dump: i64,
}

/// Probe hits recorded for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionData {
    pub id: i64,
    /// Internal (slash-separated) class name.
    pub name: String,
    pub probes: Vec<bool>,
}

impl ExecutionData {
    pub fn new(id: i64, name: impl Into<String>, probes: Vec<bool>) -> Self {
        Self {
            id,
            name: name.into(),
            probes,
        }
    }

    /// Whether probe `index` fired. Out-of-range probes count as not executed.
    pub fn probe(&self, index: usize) -> bool {
        self.probes.get(index).copied().unwrap_or(false)
    }

    /// OR another record for the same class into this one.
    pub fn merge(&mut self, other: &ExecutionData) -> Result<(), RecordLoadError> {
        if self.name != other.name {
            return Err(RecordLoadError::NameConflict {
                id: self.id,
                existing: self.name.clone(),
                incoming: other.name.clone(),
            });
        }
        if self.probes.len() != other.probes.len() {
            return Err(RecordLoadError::ProbeCountMismatch {
                id: self.id,
                name: self.name.clone(),
            });
        }
        for (mine, theirs) in self.probes.iter_mut().zip(&other.probes) {
            *mine |= *theirs;
        }
        Ok(())
    }
}

/// Merged execution data of one record file, keyed by class id.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStore {
    entries: BTreeMap<i64, ExecutionData>,
    names: HashSet<String>,
    sessions: Vec<SessionInfo>,
}

impl ExecutionStore {
    /// An empty store: every probe reads as not executed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge a record file.
    #[instrument(skip_all, name = "exec_load", fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, RecordLoadError> {
        let file = std::fs::File::open(path).map_err(|source| RecordLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::read_from(std::io::BufReader::new(file))?;
        debug!(
            classes = store.len(),
            sessions = store.sessions.len(),
            "Execution data loaded"
        );
        Ok(store)
    }

    /// Read a complete record stream into a new store.
    pub fn read_from<R: std::io::Read>(input: R) -> Result<Self, RecordLoadError> {
        let mut store = Self::new();
        ExecDataReader::new(input).read_into(&mut store)?;
        Ok(store)
    }

    /// Add execution data, merging with an existing entry for the same id.
    pub fn put(&mut self, data: ExecutionData) -> Result<(), RecordLoadError> {
        if let Some(existing) = self.entries.get_mut(&data.id) {
            existing.merge(&data)?;
        } else {
            self.names.insert(data.name.clone());
            self.entries.insert(data.id, data);
        }
        Ok(())
    }

    pub fn add_session(&mut self, session: SessionInfo) {
        self.sessions.push(session);
    }

    pub fn get(&self, id: i64) -> Option<&ExecutionData> {
        self.entries.get(&id)
    }

    /// Whether any entry carries this internal class name, regardless of id.
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn sessions(&self) -> &[SessionInfo] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
