pub mod classifier;
pub mod config;
pub mod controller;
pub mod dwell;
pub mod error;
pub mod ffi;
pub mod filter;
pub mod geo;
pub mod models;
pub mod record_store;
pub mod storage;
pub mod ticker;
pub mod writer;

uniffi::setup_scaffolding!("adventurelog");

pub use config::TrackerConfig;
pub use controller::{AdventureController, ControllerSnapshot, FixOutcome, TrackerEvent};
pub use dwell::{DwellProgress, DwellSession, DwellState, DwellTimer, TickOutcome};
pub use error::StoreError;
pub use ffi::{AdventureRecord, AdventureTracker, FixInput, TrackerSnapshot, TrackerUpdate};
pub use geo::{distance_meters, Coordinate};
pub use models::{Adventure, AdventureId, LocationFix, TimeFormat};
pub use record_store::{ImportSummary, RecordStore};
pub use storage::{ByteStore, FileByteStore, MemoryByteStore};
