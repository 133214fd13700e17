//! Adventure lifecycle controller.
//!
//! Owns the filter, the dwell timer and the record store, and is the only
//! place where a fix, a tick or a user decision changes state. Callers
//! serialize access (the FFI tracker holds it behind a mutex) and drain
//! [`TrackerEvent`]s after each call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::classifier::{is_new_place, nearest};
use crate::config::TrackerConfig;
use crate::dwell::{DwellProgress, DwellState, DwellTimer, TickOutcome};
use crate::error::StoreError;
use crate::filter::{FixGate, FixRejection, LocationFilter};
use crate::geo::Coordinate;
use crate::models::{normalize_name, Adventure, AdventureId, LocationFix};
use crate::record_store::{ImportSummary, RecordStore};
use crate::storage::ByteStore;
use crate::writer::SnapshotWriter;

/// Published state changes, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    SessionStarted {
        anchor: Coordinate,
        generation: u64,
        superseded: bool,
    },
    /// The user is back at a known place; the session was dropped.
    SessionCleared { anchor: Coordinate },
    Progress(DwellProgress),
    PromptRaised { anchor: Coordinate },
    AdventureCreated(Adventure),
    PromptDismissed,
    AdventureDeleted(AdventureId),
    Imported(ImportSummary),
}

/// What happened to a submitted fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Rejected(FixRejection),
    /// Too close to the last processed fix.
    Jitter,
    /// A prompt is waiting for the user; fixes do not touch the session.
    PromptPending,
    /// Within range of a stored adventure.
    KnownPlace { session_cleared: bool },
    SessionStarted { generation: u64 },
}

/// Point-in-time view for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: DwellState,
    pub anchor: Option<Coordinate>,
    pub progress: Option<DwellProgress>,
    pub adventure_count: usize,
    pub unique_month_count: usize,
}

impl ControllerSnapshot {
    pub fn prompt_pending(&self) -> bool {
        self.state == DwellState::Prompting
    }
}

pub struct AdventureController {
    config: TrackerConfig,
    gate: FixGate,
    filter: LocationFilter,
    timer: DwellTimer,
    records: RecordStore,
    events: Vec<TrackerEvent>,
}

impl AdventureController {
    /// Build a controller over `backend`, loading any persisted adventures.
    pub fn new(config: TrackerConfig, backend: Arc<dyn ByteStore>) -> Self {
        let records = RecordStore::load(backend, &config);
        Self::with_records(config, records)
    }

    pub fn with_records(config: TrackerConfig, records: RecordStore) -> Self {
        Self {
            gate: FixGate::from_config(&config),
            filter: LocationFilter::new(config.jitter_threshold_m),
            timer: DwellTimer::new(config.minimum_stay),
            records,
            events: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> DwellState {
        self.timer.state()
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Detach the record store's background writer, if any.
    pub fn take_writer(&mut self) -> Option<SnapshotWriter> {
        self.records.take_writer()
    }

    /// Generation of the live session, for addressing ticks.
    pub fn session_generation(&self) -> Option<u64> {
        self.timer.generation()
    }

    /// Route a fix through gate, filter and classifier, then drive the timer.
    ///
    /// `forced` bypasses the jitter filter and restarts any tracking session
    /// from this fix. It does not override a pending prompt.
    pub fn submit_fix(&mut self, fix: LocationFix, now: DateTime<Utc>, forced: bool) -> FixOutcome {
        if let Err(rejection) = self.gate.check(&fix, now) {
            debug!("rejected fix: {rejection:?}");
            return FixOutcome::Rejected(rejection);
        }
        if self.timer.state() == DwellState::Prompting {
            return FixOutcome::PromptPending;
        }
        if !self.filter.should_process(fix.coordinate, forced) {
            return FixOutcome::Jitter;
        }

        let was_tracking = self.timer.state() == DwellState::Tracking;
        let invalidated = if forced { self.timer.reset() } else { None };

        let radius = self.config.new_location_radius_m;
        if is_new_place(fix.coordinate, self.records.all(), radius) {
            // never start ahead of the clock, or elapsed would sit at zero
            let generation = self.timer.start(fix.coordinate, fix.timestamp.min(now));
            info!(
                "tracking new place ({}, {}) as session {generation}",
                fix.coordinate.latitude, fix.coordinate.longitude
            );
            self.events.push(TrackerEvent::SessionStarted {
                anchor: fix.coordinate,
                generation,
                superseded: was_tracking,
            });
            return FixOutcome::SessionStarted { generation };
        }

        if let Some((adventure, meters)) = nearest(fix.coordinate, self.records.all()) {
            debug!("fix is {meters:.0} m from known adventure {}", adventure.id());
        }
        let cleared = invalidated.or_else(|| self.timer.reset());
        if let Some(session) = cleared {
            info!("back at a known place, dropping session {}", session.generation);
            self.events.push(TrackerEvent::SessionCleared {
                anchor: session.anchor,
            });
        }
        FixOutcome::KnownPlace {
            session_cleared: cleared.is_some(),
        }
    }

    /// Deliver a tick addressed to session `generation`.
    pub fn tick(&mut self, generation: u64, now: DateTime<Utc>) -> TickOutcome {
        let outcome = self.timer.tick(generation, now);
        match outcome {
            TickOutcome::Progress(progress) => {
                self.events.push(TrackerEvent::Progress(progress));
            }
            TickOutcome::PromptRaised(progress) => {
                self.events.push(TrackerEvent::Progress(progress));
                if let Some(anchor) = self.timer.anchor() {
                    info!("dwell threshold reached, prompting");
                    self.events.push(TrackerEvent::PromptRaised { anchor });
                }
            }
            TickOutcome::Ignored => {}
        }
        outcome
    }

    /// Tick whatever session is live.
    pub fn tick_current(&mut self, now: DateTime<Utc>) -> TickOutcome {
        match self.timer.generation() {
            Some(generation) => self.tick(generation, now),
            None => TickOutcome::Ignored,
        }
    }

    /// Resolve the pending prompt by recording an adventure at its anchor.
    ///
    /// Returns `None` (and does nothing) when no prompt is pending.
    pub fn create_adventure(
        &mut self,
        name: &str,
        attachments: Vec<Vec<u8>>,
        address: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Adventure> {
        let session = self.timer.resolve()?;
        let adventure = Adventure::new(
            AdventureId::generate(),
            normalize_name(name, &self.config.default_name),
            session.anchor,
            now,
            attachments,
            address.filter(|a| !a.trim().is_empty()),
        );
        self.records.append(adventure.clone());
        self.events
            .push(TrackerEvent::AdventureCreated(adventure.clone()));
        Some(adventure)
    }

    /// Resolve the pending prompt without recording anything.
    pub fn dismiss_prompt(&mut self) -> bool {
        if self.timer.resolve().is_none() {
            return false;
        }
        info!("prompt dismissed");
        self.events.push(TrackerEvent::PromptDismissed);
        true
    }

    pub fn delete_adventure(&mut self, id: &AdventureId) -> bool {
        if self.records.delete(id).is_none() {
            return false;
        }
        self.events.push(TrackerEvent::AdventureDeleted(id.clone()));
        true
    }

    pub fn export_bytes(&self) -> Result<Vec<u8>, StoreError> {
        self.records.export_bytes()
    }

    pub fn import_bytes(&mut self, bytes: &[u8]) -> Result<ImportSummary, StoreError> {
        let summary = self.records.import_merge(bytes)?;
        self.events.push(TrackerEvent::Imported(summary));
        Ok(summary)
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.timer.state(),
            anchor: self.timer.anchor(),
            progress: self.timer.progress(),
            adventure_count: self.records.len(),
            unique_month_count: self.records.unique_month_count(),
        }
    }

    /// Take all events published since the last drain.
    pub fn drain_events(&mut self) -> Vec<TrackerEvent> {
        std::mem::take(&mut self.events)
    }
}
