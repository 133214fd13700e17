//! Host-facing surface.
//!
//! [`AdventureTracker`] owns one [`AdventureController`] behind a mutex, a
//! small tokio runtime for dwell ticks and snapshot writes, and an optional
//! foreign observer.
//! Events are drained under the lock and delivered after it is released, so
//! an observer may call straight back into the tracker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::runtime::{Handle, Runtime};

use crate::config::{self, TrackerConfig};
use crate::controller::{AdventureController, TrackerEvent};
use crate::dwell::{DwellProgress, DwellState, TickOutcome};
use crate::error::StoreError;
use crate::geo::Coordinate;
use crate::models::{Adventure, AdventureId, LocationFix, TimeFormat};
use crate::record_store::RecordStore;
use crate::storage::ByteStore;
use crate::ticker::DwellTicker;
use crate::writer::SnapshotWriter;

// ============================================================================
// FFI Types
// ============================================================================

/// A location fix as delivered by the host's location service.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FixInput {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters; negative means invalid.
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct AdventureRecord {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
    pub attachments: Vec<Vec<u8>>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct ProgressInfo {
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
    pub fraction: f64,
    pub elapsed_text: String,
    pub remaining_text: String,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct TrackerSnapshot {
    pub state: DwellState,
    pub prompt_pending: bool,
    pub pending_anchor: Option<Coordinate>,
    pub progress: Option<ProgressInfo>,
    pub adventure_count: u64,
    pub unique_month_count: u64,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct TrackerSettings {
    pub minimum_stay_secs: i64,
    pub new_location_radius_m: f64,
    pub jitter_threshold_m: f64,
    pub tick_interval_ms: u64,
    pub storage_key: String,
    pub default_name: String,
    pub utc_offset_secs: i32,
    pub time_format: TimeFormat,
}

#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum TrackerUpdate {
    SessionStarted { anchor: Coordinate, superseded: bool },
    SessionCleared { anchor: Coordinate },
    Progress { progress: ProgressInfo },
    PromptRaised { anchor: Coordinate },
    AdventureCreated { adventure: AdventureRecord },
    PromptDismissed,
    AdventureDeleted { id: String },
    Imported { added: u32, skipped_duplicates: u32 },
}

/// Receives tracker updates. Called outside the tracker's lock.
#[uniffi::export(with_foreign)]
pub trait TrackerObserver: Send + Sync {
    fn on_update(&self, update: TrackerUpdate);
}

/// Default settings (5 minute stay, 100 m radius).
#[uniffi::export]
pub fn default_tracker_settings() -> TrackerSettings {
    TrackerSettings::from(&TrackerConfig::default())
}

/// Quick settings (1 minute stay, 27 m radius).
#[uniffi::export]
pub fn quick_tracker_settings() -> TrackerSettings {
    TrackerSettings::from(&TrackerConfig::quick_profile())
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            minimum_stay_secs: config.minimum_stay.num_seconds(),
            new_location_radius_m: config.new_location_radius_m,
            jitter_threshold_m: config.jitter_threshold_m,
            tick_interval_ms: config.tick_interval.as_millis() as u64,
            storage_key: config.storage_key.clone(),
            default_name: config.default_name.clone(),
            utc_offset_secs: config.utc_offset.local_minus_utc(),
            time_format: config.time_format,
        }
    }
}

impl From<TrackerSettings> for TrackerConfig {
    fn from(settings: TrackerSettings) -> Self {
        let storage_key = if settings.storage_key.is_empty() {
            config::DEFAULT_STORAGE_KEY.to_string()
        } else {
            settings.storage_key
        };
        TrackerConfig::default()
            .with_minimum_stay_secs(settings.minimum_stay_secs)
            .with_new_location_radius(settings.new_location_radius_m)
            .with_jitter_threshold(settings.jitter_threshold_m)
            .with_tick_interval_ms(settings.tick_interval_ms)
            .with_storage_key(storage_key)
            .with_default_name(settings.default_name)
            .with_utc_offset_secs(settings.utc_offset_secs)
            .with_time_format(settings.time_format)
    }
}

impl From<&Adventure> for AdventureRecord {
    fn from(adventure: &Adventure) -> Self {
        let coordinate = adventure.coordinate();
        Self {
            id: adventure.id().to_string(),
            name: adventure.name().to_string(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            timestamp_ms: adventure.timestamp().timestamp_millis(),
            attachments: adventure.attachments().to_vec(),
            address: adventure.address().map(str::to_string),
        }
    }
}

impl ProgressInfo {
    fn new(progress: &DwellProgress, format: TimeFormat) -> Self {
        Self {
            elapsed_secs: progress.elapsed.num_milliseconds() as f64 / 1000.0,
            remaining_secs: progress.remaining.num_milliseconds() as f64 / 1000.0,
            fraction: progress.fraction,
            elapsed_text: progress.elapsed_text(format),
            remaining_text: progress.remaining_text(format),
        }
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn to_update(event: TrackerEvent, format: TimeFormat) -> TrackerUpdate {
    match event {
        TrackerEvent::SessionStarted {
            anchor, superseded, ..
        } => TrackerUpdate::SessionStarted { anchor, superseded },
        TrackerEvent::SessionCleared { anchor } => TrackerUpdate::SessionCleared { anchor },
        TrackerEvent::Progress(progress) => TrackerUpdate::Progress {
            progress: ProgressInfo::new(&progress, format),
        },
        TrackerEvent::PromptRaised { anchor } => TrackerUpdate::PromptRaised { anchor },
        TrackerEvent::AdventureCreated(adventure) => TrackerUpdate::AdventureCreated {
            adventure: AdventureRecord::from(&adventure),
        },
        TrackerEvent::PromptDismissed => TrackerUpdate::PromptDismissed,
        TrackerEvent::AdventureDeleted(id) => TrackerUpdate::AdventureDeleted { id: id.0 },
        TrackerEvent::Imported(summary) => TrackerUpdate::Imported {
            added: summary.added,
            skipped_duplicates: summary.skipped_duplicates,
        },
    }
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// State shared between the tracker and its tick task.
struct Shared {
    controller: Mutex<AdventureController>,
    ticker: Mutex<DwellTicker>,
    observer: Option<Arc<dyn TrackerObserver>>,
    clock: Arc<dyn Clock>,
    time_format: TimeFormat,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AdventureController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ticker(&self) -> MutexGuard<'_, DwellTicker> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, then deliver whatever it published.
    ///
    /// The tick task is brought in line with the session before the lock is
    /// released, so a call made from an observer can't be undone by the
    /// call that notified it.
    fn with_controller<R>(self: &Arc<Self>, f: impl FnOnce(&mut AdventureController) -> R) -> R {
        let (result, events) = {
            let mut controller = self.lock();
            let result = f(&mut controller);
            self.sync_ticker(&controller);
            (result, controller.drain_events())
        };
        if let Some(observer) = &self.observer {
            for event in events {
                observer.on_update(to_update(event, self.time_format));
            }
        }
        result
    }

    /// Tick while a session is tracking, and only for that session.
    /// Lock order is controller, then ticker.
    fn sync_ticker(self: &Arc<Self>, controller: &AdventureController) {
        let mut ticker = self.lock_ticker();
        match (controller.state(), controller.session_generation()) {
            (DwellState::Tracking, Some(generation)) => {
                if ticker.scheduled_generation() != Some(generation) {
                    let shared = Arc::clone(self);
                    ticker.schedule(generation, move |g| shared.tick(g));
                }
            }
            _ => ticker.cancel(),
        }
    }

    /// Tick session `generation`. Returns whether ticking should continue.
    fn tick(self: &Arc<Self>, generation: u64) -> bool {
        let now = self.clock.now();
        let outcome = self.with_controller(|c| c.tick(generation, now));
        matches!(outcome, TickOutcome::Progress(_))
    }
}

#[derive(uniffi::Object)]
pub struct AdventureTracker {
    shared: Arc<Shared>,
    runtime: Option<Runtime>,
}

#[uniffi::export]
impl AdventureTracker {
    /// Load persisted adventures from `store` and start idle.
    #[uniffi::constructor]
    pub fn new(
        settings: TrackerSettings,
        store: Arc<dyn ByteStore>,
        observer: Option<Arc<dyn TrackerObserver>>,
    ) -> Result<Arc<Self>, StoreError> {
        let tracker = Self::with_clock(settings.into(), store, observer, Arc::new(SystemClock))?;
        Ok(Arc::new(tracker))
    }

    /// Feed a location fix. `forced` bypasses the movement filter and
    /// restarts any tracking session from this fix.
    pub fn submit_fix(&self, fix: FixInput, forced: bool) {
        let fix = LocationFix::new(
            Coordinate::new(fix.latitude, fix.longitude),
            fix.accuracy_m,
            millis_to_datetime(fix.timestamp_ms),
        );
        let now = self.shared.clock.now();
        self.shared.with_controller(|c| c.submit_fix(fix, now, forced));
    }

    /// Recompute progress now instead of waiting for the next tick.
    pub fn refresh_progress(&self) {
        let now = self.shared.clock.now();
        self.shared.with_controller(|c| c.tick_current(now));
    }

    /// Record the pending prompt as an adventure. `None` if nothing was pending.
    pub fn create_adventure(
        &self,
        name: String,
        attachments: Vec<Vec<u8>>,
        address: Option<String>,
    ) -> Option<AdventureRecord> {
        let now = self.shared.clock.now();
        let created = self
            .shared
            .with_controller(|c| c.create_adventure(&name, attachments, address, now));
        created.as_ref().map(AdventureRecord::from)
    }

    /// Drop the pending prompt. Returns false if nothing was pending.
    pub fn dismiss_prompt(&self) -> bool {
        self.shared.with_controller(|c| c.dismiss_prompt())
    }

    pub fn delete_adventure(&self, id: String) -> bool {
        self.shared
            .with_controller(|c| c.delete_adventure(&AdventureId(id)))
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let snapshot = self.shared.lock().snapshot();
        TrackerSnapshot {
            state: snapshot.state,
            prompt_pending: snapshot.prompt_pending(),
            pending_anchor: snapshot.anchor,
            progress: snapshot
                .progress
                .map(|p| ProgressInfo::new(&p, self.shared.time_format)),
            adventure_count: snapshot.adventure_count as u64,
            unique_month_count: snapshot.unique_month_count as u64,
        }
    }

    pub fn adventures_by_recency(&self) -> Vec<AdventureRecord> {
        self.shared
            .lock()
            .records()
            .sorted_by_recency()
            .into_iter()
            .map(AdventureRecord::from)
            .collect()
    }

    pub fn adventures_this_month(&self) -> Vec<AdventureRecord> {
        let now = self.shared.clock.now();
        self.shared
            .lock()
            .records()
            .filter_by_current_month(now)
            .into_iter()
            .map(AdventureRecord::from)
            .collect()
    }

    pub fn unique_month_count(&self) -> u64 {
        self.shared.lock().records().unique_month_count() as u64
    }

    /// Full serialized snapshot of every adventure.
    pub fn export_adventures(&self) -> Result<Vec<u8>, StoreError> {
        self.shared.lock().export_bytes()
    }

    /// Merge a snapshot produced by `export_adventures`. False if it could
    /// not be decoded, in which case nothing changed.
    pub fn import_adventures(&self, bytes: Vec<u8>) -> bool {
        match self.shared.with_controller(|c| c.import_bytes(&bytes)) {
            Ok(_) => true,
            Err(e) => {
                warn!("import failed: {e}");
                false
            }
        }
    }
}

impl AdventureTracker {
    /// Build a tracker reading time from `clock`.
    pub fn with_clock(
        config: TrackerConfig,
        store: Arc<dyn ByteStore>,
        observer: Option<Arc<dyn TrackerObserver>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("adventure-ticker")
            .enable_time()
            .build()?;
        let ticker = DwellTicker::new(runtime.handle().clone(), config.tick_interval);
        let time_format = config.time_format;
        let writer =
            SnapshotWriter::spawn(runtime.handle(), Arc::clone(&store), config.storage_key.clone());
        let records = RecordStore::load(store, &config).with_writer(writer);
        let controller = AdventureController::with_records(config, records);
        info!(
            "adventure tracker ready with {} adventures",
            controller.records().len()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                controller: Mutex::new(controller),
                ticker: Mutex::new(ticker),
                observer,
                clock,
                time_format,
            }),
            runtime: Some(runtime),
        })
    }

    #[cfg(test)]
    fn is_ticking(&self) -> bool {
        self.shared.lock_ticker().is_active()
    }
}

impl Drop for AdventureTracker {
    fn drop(&mut self) {
        self.shared.lock_ticker().cancel();
        let writer = self.shared.lock().take_writer();
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        match writer {
            // block_on panics inside another runtime; queued writes may be lost there
            Some(writer) if Handle::try_current().is_err() => runtime.block_on(writer.close()),
            Some(_) => warn!("tracker dropped on an async thread; pending writes abandoned"),
            None => {}
        }
        runtime.shutdown_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryByteStore;
    use chrono::{Duration, TimeZone};

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(secs: i64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc.timestamp_opt(secs, 0).unwrap())))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TrackerUpdate>>);

    impl TrackerObserver for Recorder {
        fn on_update(&self, update: TrackerUpdate) {
            self.0.lock().unwrap().push(update);
        }
    }

    const START: i64 = 1_700_000_000;

    fn tracker(
        clock: Arc<ManualClock>,
        observer: Option<Arc<dyn TrackerObserver>>,
    ) -> AdventureTracker {
        // long tick interval so only explicit refreshes advance the session
        let config = TrackerConfig::default().with_tick_interval_ms(3_600_000);
        AdventureTracker::with_clock(config, Arc::new(MemoryByteStore::new()), observer, clock)
            .unwrap()
    }

    /// A tracker whose tick task runs every 10 ms, so sessions advance with
    /// the manual clock without any explicit refresh.
    fn ticking_tracker(
        clock: Arc<ManualClock>,
        observer: Option<Arc<dyn TrackerObserver>>,
        store: Arc<dyn ByteStore>,
    ) -> Arc<AdventureTracker> {
        let config = TrackerConfig::default().with_tick_interval_ms(10);
        Arc::new(AdventureTracker::with_clock(config, store, observer, clock).unwrap())
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..300 {
            if condition() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        condition()
    }

    /// Forwards to `inner`, and on the first update matching `trigger` calls
    /// `action` with the tracker it was wired to.
    struct Reacting {
        inner: Arc<Recorder>,
        tracker: Mutex<Option<Arc<AdventureTracker>>>,
        trigger: fn(&TrackerUpdate) -> bool,
        action: fn(&AdventureTracker),
    }

    impl Reacting {
        fn wire(
            trigger: fn(&TrackerUpdate) -> bool,
            action: fn(&AdventureTracker),
        ) -> (Arc<Self>, Arc<Recorder>) {
            let inner = Arc::new(Recorder::default());
            let observer = Arc::new(Self {
                inner: inner.clone(),
                tracker: Mutex::new(None),
                trigger,
                action,
            });
            (observer, inner)
        }
    }

    impl TrackerObserver for Reacting {
        fn on_update(&self, update: TrackerUpdate) {
            let fire = (self.trigger)(&update);
            self.inner.on_update(update);
            if fire {
                // taking the tracker both fires once and breaks the cycle
                let tracker = self.tracker.lock().unwrap().take();
                if let Some(tracker) = tracker {
                    (self.action)(&tracker);
                }
            }
        }
    }

    fn tracker_with_store(clock: Arc<ManualClock>, store: Arc<dyn ByteStore>) -> AdventureTracker {
        let config = TrackerConfig::default().with_tick_interval_ms(3_600_000);
        AdventureTracker::with_clock(config, store, None, clock).unwrap()
    }

    fn fix_at(lat: f64, lon: f64, secs: i64) -> FixInput {
        FixInput {
            latitude: lat,
            longitude: lon,
            accuracy_m: 8.0,
            timestamp_ms: secs * 1000,
        }
    }

    #[test]
    fn test_settings_round_trip() {
        let settings = quick_tracker_settings();
        assert_eq!(settings.minimum_stay_secs, 60);
        assert_eq!(settings.new_location_radius_m, 27.0);

        let config: TrackerConfig = settings.into();
        assert_eq!(config, TrackerConfig::quick_profile());
    }

    #[test]
    fn test_empty_storage_key_falls_back() {
        let mut settings = default_tracker_settings();
        settings.storage_key = String::new();
        let config: TrackerConfig = settings.into();
        assert_eq!(config.storage_key, config::DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn test_prompt_flow_through_tracker() {
        let clock = ManualClock::at(START);
        let recorder = Arc::new(Recorder::default());
        let t = tracker(clock.clone(), Some(recorder.clone()));

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        assert_eq!(t.snapshot().state, DwellState::Tracking);

        clock.advance(299);
        t.refresh_progress();
        let snapshot = t.snapshot();
        assert!(!snapshot.prompt_pending);
        let progress = snapshot.progress.unwrap();
        assert!((progress.fraction - 299.0 / 300.0).abs() < 1e-9);
        assert_eq!(progress.remaining_text, "00:01");

        clock.advance(1);
        t.refresh_progress();
        let snapshot = t.snapshot();
        assert!(snapshot.prompt_pending);
        assert_eq!(snapshot.pending_anchor, Some(Coordinate::new(37.0, -122.0)));

        let record = t
            .create_adventure("Cafe".to_string(), vec![vec![1]], None)
            .unwrap();
        assert_eq!(record.name, "Cafe");
        assert_eq!(record.timestamp_ms, (START + 300) * 1000);
        assert_eq!(t.snapshot().state, DwellState::Idle);
        assert_eq!(t.adventures_by_recency(), vec![record.clone()]);

        let updates = recorder.0.lock().unwrap().clone();
        assert!(matches!(updates[0], TrackerUpdate::SessionStarted { .. }));
        assert!(updates.contains(&TrackerUpdate::PromptRaised {
            anchor: Coordinate::new(37.0, -122.0)
        }));
        assert_eq!(
            updates.last(),
            Some(&TrackerUpdate::AdventureCreated { adventure: record })
        );
    }

    #[test]
    fn test_dismiss_and_delete() {
        let clock = ManualClock::at(START);
        let t = tracker(clock.clone(), None);

        assert!(!t.dismiss_prompt());
        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        t.refresh_progress();
        assert!(t.dismiss_prompt());
        assert!(t.snapshot().progress.is_none());
        assert!(t.create_adventure("late".to_string(), vec![], None).is_none());

        t.submit_fix(fix_at(37.0, -122.0, START + 300), true);
        clock.advance(300);
        t.refresh_progress();
        let record = t.create_adventure(String::new(), vec![], None).unwrap();
        assert_eq!(record.name, config::DEFAULT_ADVENTURE_NAME);

        assert!(t.delete_adventure(record.id.clone()));
        assert!(!t.delete_adventure(record.id));
        assert_eq!(t.snapshot().adventure_count, 0);
    }

    #[test]
    fn test_export_import() {
        let clock = ManualClock::at(START);
        let source = tracker(clock.clone(), None);
        source.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        source.refresh_progress();
        source.create_adventure("Cafe".to_string(), vec![], None);

        let bytes = source.export_adventures().unwrap();
        let target = tracker(clock.clone(), None);
        assert!(target.import_adventures(bytes.clone()));
        assert!(target.import_adventures(bytes));
        assert_eq!(target.snapshot().adventure_count, 1);
        assert!(!target.import_adventures(b"not json".to_vec()));
        assert_eq!(target.unique_month_count(), 1);
        assert_eq!(target.adventures_this_month().len(), 1);
    }

    #[test]
    fn test_observer_may_reenter() {
        struct Reentrant(Mutex<Option<Arc<AdventureTracker>>>);

        impl TrackerObserver for Reentrant {
            fn on_update(&self, update: TrackerUpdate) {
                if let TrackerUpdate::PromptRaised { .. } = update {
                    if let Some(tracker) = self.0.lock().unwrap().as_ref() {
                        tracker.dismiss_prompt();
                    }
                }
            }
        }

        let clock = ManualClock::at(START);
        let observer = Arc::new(Reentrant(Mutex::new(None)));
        let t = Arc::new(tracker(clock.clone(), Some(observer.clone())));
        *observer.0.lock().unwrap() = Some(t.clone());

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        t.refresh_progress();
        assert_eq!(t.snapshot().state, DwellState::Idle);

        // break the cycle
        observer.0.lock().unwrap().take();
    }

    #[test]
    fn test_ticker_raises_prompt_unaided() {
        let clock = ManualClock::at(START);
        let recorder = Arc::new(Recorder::default());
        let t = ticking_tracker(
            clock.clone(),
            Some(recorder.clone()),
            Arc::new(MemoryByteStore::new()),
        );

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        assert!(t.is_ticking());
        clock.advance(300);

        assert!(wait_until(|| t.snapshot().prompt_pending));
        assert!(wait_until(|| !t.is_ticking()));
        std::thread::sleep(std::time::Duration::from_millis(50));

        let prompts = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|u| matches!(u, TrackerUpdate::PromptRaised { .. }))
            .count();
        assert_eq!(prompts, 1);
    }

    #[test]
    fn test_known_place_stops_ticker() {
        let clock = ManualClock::at(START);
        let t = ticking_tracker(clock.clone(), None, Arc::new(MemoryByteStore::new()));

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        assert!(wait_until(|| t.snapshot().prompt_pending));
        t.create_adventure("Cafe".to_string(), vec![], None).unwrap();
        assert!(!t.is_ticking());

        t.submit_fix(fix_at(38.0, -122.0, START + 300), false);
        assert_eq!(t.snapshot().state, DwellState::Tracking);
        assert!(t.is_ticking());

        t.submit_fix(fix_at(37.0, -122.0, START + 300), false);
        assert_eq!(t.snapshot().state, DwellState::Idle);
        assert!(!t.is_ticking());
    }

    #[test]
    fn test_forced_fix_replaces_tick_task() {
        let clock = ManualClock::at(START);
        let t = ticking_tracker(clock.clone(), None, Arc::new(MemoryByteStore::new()));

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(100);
        t.submit_fix(fix_at(40.0, -100.0, START + 100), true);
        assert!(t.is_ticking());

        clock.advance(200);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!t.snapshot().prompt_pending);

        clock.advance(100);
        assert!(wait_until(|| t.snapshot().prompt_pending));
        assert_eq!(
            t.snapshot().pending_anchor,
            Some(Coordinate::new(40.0, -100.0))
        );
    }

    #[test]
    fn test_observer_restart_keeps_ticking() {
        fn first_session(update: &TrackerUpdate) -> bool {
            matches!(
                update,
                TrackerUpdate::SessionStarted {
                    superseded: false,
                    ..
                }
            )
        }
        fn move_elsewhere(tracker: &AdventureTracker) {
            tracker.submit_fix(fix_at(40.0, -100.0, START), true);
        }

        let clock = ManualClock::at(START);
        let (observer, recorder) = Reacting::wire(first_session, move_elsewhere);
        let t = ticking_tracker(
            clock.clone(),
            Some(observer.clone()),
            Arc::new(MemoryByteStore::new()),
        );
        *observer.tracker.lock().unwrap() = Some(t.clone());

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        assert!(t.is_ticking());
        clock.advance(300);

        assert!(wait_until(|| t.snapshot().prompt_pending));
        assert_eq!(
            t.snapshot().pending_anchor,
            Some(Coordinate::new(40.0, -100.0))
        );
        assert!(recorder.0.lock().unwrap().contains(&TrackerUpdate::PromptRaised {
            anchor: Coordinate::new(40.0, -100.0)
        }));
    }

    #[test]
    fn test_session_started_from_created_callback_keeps_ticking() {
        fn created(update: &TrackerUpdate) -> bool {
            matches!(update, TrackerUpdate::AdventureCreated { .. })
        }
        fn move_on(tracker: &AdventureTracker) {
            tracker.submit_fix(fix_at(38.0, -122.0, START + 300), false);
        }

        let clock = ManualClock::at(START);
        let (observer, _) = Reacting::wire(created, move_on);
        let t = ticking_tracker(
            clock.clone(),
            Some(observer.clone()),
            Arc::new(MemoryByteStore::new()),
        );
        *observer.tracker.lock().unwrap() = Some(t.clone());

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        assert!(wait_until(|| t.snapshot().prompt_pending));
        t.create_adventure("Cafe".to_string(), vec![], None).unwrap();

        assert_eq!(t.snapshot().state, DwellState::Tracking);
        assert!(t.is_ticking());
        clock.advance(300);
        assert!(wait_until(|| t.snapshot().prompt_pending));
        assert_eq!(
            t.snapshot().pending_anchor,
            Some(Coordinate::new(38.0, -122.0))
        );
    }

    #[test]
    fn test_slow_store_does_not_hold_tracker() {
        struct GatedStore {
            inner: MemoryByteStore,
            gate: Mutex<std::sync::mpsc::Receiver<()>>,
        }

        impl ByteStore for GatedStore {
            fn get(&self, key: String) -> Result<Option<Vec<u8>>, StoreError> {
                self.inner.get(key)
            }

            fn set(&self, key: String, value: Vec<u8>) -> Result<(), StoreError> {
                let _ = self
                    .gate
                    .lock()
                    .unwrap()
                    .recv_timeout(std::time::Duration::from_secs(5));
                self.inner.set(key, value)
            }
        }

        let (release, gate) = std::sync::mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryByteStore::new(),
            gate: Mutex::new(gate),
        });
        let clock = ManualClock::at(START);
        let t = tracker_with_store(clock.clone(), store.clone());

        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        t.refresh_progress();
        let record = t.create_adventure("Cafe".to_string(), vec![], None).unwrap();

        // the write is still parked in the store; the tracker keeps answering
        assert_eq!(t.snapshot().adventure_count, 1);
        assert!(store.inner.get("adventures".to_string()).unwrap().is_none());
        t.submit_fix(fix_at(38.0, -122.0, START + 300), false);
        assert_eq!(t.snapshot().state, DwellState::Tracking);

        release.send(()).unwrap();
        assert!(wait_until(|| store
            .inner
            .get("adventures".to_string())
            .unwrap()
            .is_some()));
        let persisted: Vec<Adventure> =
            serde_json::from_slice(&store.inner.get("adventures".to_string()).unwrap().unwrap())
                .unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id().as_str(), record.id);
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let backend = Arc::new(MemoryByteStore::new());
        let clock = ManualClock::at(START);
        let t = tracker_with_store(clock.clone(), backend.clone());
        t.submit_fix(fix_at(37.0, -122.0, START), false);
        clock.advance(300);
        t.refresh_progress();
        t.create_adventure("Cafe".to_string(), vec![], None).unwrap();
        drop(t);

        let reopened = tracker_with_store(clock, backend);
        assert_eq!(reopened.snapshot().adventure_count, 1);
    }
}
