//! In-memory adventure collection backed by a [`ByteStore`].
//!
//! The in-memory list is authoritative. Persistence is a best-effort cache:
//! a failed write is logged and the mutation stands, and an unreadable
//! snapshot loads as an empty collection. With a [`SnapshotWriter`] attached,
//! mutations only queue their snapshot and return.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use log::{info, warn};

use crate::config::TrackerConfig;
use crate::error::StoreError;
use crate::geo::distance_meters;
use crate::models::{Adventure, AdventureId};
use crate::storage::ByteStore;
use crate::writer::SnapshotWriter;

/// Outcome of merging an imported snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub added: u32,
    pub skipped_duplicates: u32,
}

pub struct RecordStore {
    adventures: Vec<Adventure>,
    backend: Arc<dyn ByteStore>,
    key: String,
    duplicate_window: Duration,
    duplicate_radius_m: f64,
    utc_offset: FixedOffset,
    default_name: String,
    writer: Option<SnapshotWriter>,
}

impl RecordStore {
    /// An empty store that has not read from `backend`.
    pub fn new(backend: Arc<dyn ByteStore>, config: &TrackerConfig) -> Self {
        Self {
            adventures: Vec::new(),
            backend,
            key: config.storage_key.clone(),
            duplicate_window: config.duplicate_window,
            duplicate_radius_m: config.duplicate_radius_m,
            utc_offset: config.utc_offset,
            default_name: config.default_name.clone(),
            writer: None,
        }
    }

    /// A store populated from `backend`. Missing or corrupt data yields an
    /// empty collection.
    pub fn load(backend: Arc<dyn ByteStore>, config: &TrackerConfig) -> Self {
        let mut store = Self::new(backend, config);
        store.reload();
        store
    }

    /// Replace the in-memory collection with the persisted snapshot.
    pub fn reload(&mut self) {
        self.adventures = match self.backend.get(self.key.clone()) {
            Ok(Some(bytes)) => match self.decode(&bytes) {
                Ok(adventures) => unique_by_id(adventures),
                Err(e) => {
                    warn!("discarding unreadable adventure snapshot: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("failed to read adventures: {e}");
                Vec::new()
            }
        };
        info!("loaded {} adventures", self.adventures.len());
    }

    /// Route mutation snapshots through `writer` instead of writing inline.
    pub fn with_writer(mut self, writer: SnapshotWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Detach the writer so the owner can drain it on shutdown.
    pub fn take_writer(&mut self) -> Option<SnapshotWriter> {
        self.writer.take()
    }

    pub fn len(&self) -> usize {
        self.adventures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adventures.is_empty()
    }

    /// Records in insertion order.
    pub fn all(&self) -> &[Adventure] {
        &self.adventures
    }

    pub fn get(&self, id: &AdventureId) -> Option<&Adventure> {
        self.adventures.iter().find(|a| a.id() == id)
    }

    pub fn append(&mut self, adventure: Adventure) {
        info!("recording adventure {} ({})", adventure.id(), adventure.name());
        self.adventures.push(adventure);
        self.persist_best_effort();
    }

    /// Remove the record with `id`. Absent ids are ignored.
    pub fn delete(&mut self, id: &AdventureId) -> Option<Adventure> {
        let index = self.adventures.iter().position(|a| a.id() == id)?;
        let removed = self.adventures.remove(index);
        info!("deleted adventure {id}");
        self.persist_best_effort();
        Some(removed)
    }

    /// Newest first; equal timestamps keep insertion order.
    pub fn sorted_by_recency(&self) -> Vec<&Adventure> {
        let mut sorted: Vec<&Adventure> = self.adventures.iter().collect();
        sorted.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        sorted
    }

    /// Records in the same calendar month and year as `now`, newest first.
    pub fn filter_by_current_month(&self, now: DateTime<Utc>) -> Vec<&Adventure> {
        let now_local = now.with_timezone(&self.utc_offset);
        let current = (now_local.year(), now_local.month());
        self.sorted_by_recency()
            .into_iter()
            .filter(|a| a.year_month(&self.utc_offset) == current)
            .collect()
    }

    /// Number of distinct (year, month) pairs across all records.
    pub fn unique_month_count(&self) -> usize {
        self.adventures
            .iter()
            .map(|a| a.year_month(&self.utc_offset))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Write the full collection to the backend.
    pub fn persist(&self) -> Result<(), StoreError> {
        let bytes = self.export_bytes()?;
        self.backend.set(self.key.clone(), bytes)
    }

    fn persist_best_effort(&self) {
        let bytes = match self.export_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode adventures: {e}");
                return;
            }
        };
        match &self.writer {
            Some(writer) => writer.submit(bytes),
            None => {
                if let Err(e) = self.backend.set(self.key.clone(), bytes) {
                    warn!("failed to persist adventures: {e}");
                }
            }
        }
    }

    /// Full serialized snapshot.
    pub fn export_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(&self.adventures).map_err(StoreError::serialize)
    }

    /// Merge a serialized snapshot into the collection.
    ///
    /// An incoming record is dropped when some record already held (or
    /// merged earlier in this import) is within the duplicate window and
    /// radius. A decode failure changes nothing.
    pub fn import_merge(&mut self, bytes: &[u8]) -> Result<ImportSummary, StoreError> {
        let incoming = self.decode(bytes)?;
        let mut summary = ImportSummary::default();

        for adventure in incoming {
            if self.is_duplicate(&adventure) {
                summary.skipped_duplicates += 1;
                continue;
            }
            let adventure = if self.get(adventure.id()).is_some() {
                rekey(adventure)
            } else {
                adventure
            };
            self.adventures.push(adventure);
            summary.added += 1;
        }

        info!(
            "imported {} adventures, skipped {} duplicates",
            summary.added, summary.skipped_duplicates
        );
        if summary.added > 0 {
            self.persist_best_effort();
        }
        Ok(summary)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Adventure>, StoreError> {
        let adventures: Vec<Adventure> =
            serde_json::from_slice(bytes).map_err(StoreError::deserialize)?;
        Ok(adventures
            .into_iter()
            .map(|a| a.normalized(&self.default_name))
            .collect())
    }

    fn is_duplicate(&self, candidate: &Adventure) -> bool {
        self.adventures.iter().any(|existing| {
            let gap = (existing.timestamp() - candidate.timestamp()).abs();
            gap < self.duplicate_window
                && distance_meters(existing.coordinate(), candidate.coordinate())
                    < self.duplicate_radius_m
        })
    }
}

fn unique_by_id(adventures: Vec<Adventure>) -> Vec<Adventure> {
    let mut seen = HashSet::new();
    let before = adventures.len();
    let unique: Vec<Adventure> = adventures
        .into_iter()
        .filter(|a| seen.insert(a.id().clone()))
        .collect();
    if unique.len() != before {
        warn!("dropped {} adventures with repeated ids", before - unique.len());
    }
    unique
}

/// Same record under a fresh id, for imports whose id is already taken.
fn rekey(adventure: Adventure) -> Adventure {
    Adventure::new(
        AdventureId::generate(),
        adventure.name().to_string(),
        adventure.coordinate(),
        adventure.timestamp(),
        adventure.attachments().to_vec(),
        adventure.address().map(str::to_string),
    )
}
