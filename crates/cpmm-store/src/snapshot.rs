//! JSON snapshots of the pool tables.
//!
//! A snapshot is what `MemoryStore` loads at startup and writes back after
//! each drizzle cycle. Saving goes through a temporary file and a rename so
//! a crash mid-write leaves the previous snapshot intact.

use crate::error::StoreResult;
use crate::store::PoolRecord;
use cpmm_core::{Answer, Contract};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Market row: metadata plus its pool state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    #[serde(flatten)]
    pub contract: Contract,
    #[serde(flatten)]
    pub state: PoolRecord,
}

/// Full contents of the pool tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub markets: Vec<MarketRecord>,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Snapshot {
    /// Read a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        info!(
            path = %path.display(),
            markets = snapshot.markets.len(),
            answers = snapshot.answers.len(),
            "Loaded snapshot"
        );
        Ok(snapshot)
    }

    /// Write the snapshot, replacing `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("json.tmp");

        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
