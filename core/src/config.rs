//! Tunables for adventure detection.
//!
//! Every threshold the tracker uses lives here once. Two profiles exist in
//! practice: the default (5 minute stay, 100 m radius) and the quick profile
//! (1 minute stay, 27 m radius).

use chrono::{Duration, FixedOffset, Offset, Utc};

use crate::models::TimeFormat;

pub const DEFAULT_MINIMUM_STAY_SECS: i64 = 300;
pub const DEFAULT_NEW_LOCATION_RADIUS_M: f64 = 100.0;
pub const QUICK_MINIMUM_STAY_SECS: i64 = 60;
pub const QUICK_NEW_LOCATION_RADIUS_M: f64 = 27.0;
pub const DEFAULT_JITTER_THRESHOLD_M: f64 = 5.0;
pub const DEFAULT_DUPLICATE_WINDOW_SECS: i64 = 3600;
pub const DEFAULT_DUPLICATE_RADIUS_M: f64 = 50.0;
pub const DEFAULT_MAX_FIX_AGE_SECS: i64 = 30;
pub const DEFAULT_MAX_FUTURE_SKEW_SECS: i64 = 5;
pub const DEFAULT_MAX_ACCURACY_M: f64 = 100.0;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_STORAGE_KEY: &str = "adventures";
pub const DEFAULT_ADVENTURE_NAME: &str = "Unnamed Adventure";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Time a user must stay at a new place before being prompted.
    pub minimum_stay: Duration,
    /// A fix farther than this from every stored adventure is a new place.
    pub new_location_radius_m: f64,
    /// Non-forced fixes closer than this to the last processed fix are skipped.
    pub jitter_threshold_m: f64,
    /// Imported records within this window and radius of an existing one are duplicates.
    pub duplicate_window: Duration,
    pub duplicate_radius_m: f64,
    /// Fixes older than this at submission are stale.
    pub max_fix_age: Duration,
    /// Fixes stamped further ahead of the clock than this are rejected.
    pub max_future_skew: Duration,
    /// Fixes with a worse horizontal accuracy are dropped.
    pub max_accuracy_m: f64,
    pub tick_interval: std::time::Duration,
    /// Byte-store key holding the serialized adventure collection.
    pub storage_key: String,
    /// Name given to adventures created with a blank name.
    pub default_name: String,
    /// Offset used to bucket timestamps into calendar months.
    pub utc_offset: FixedOffset,
    pub time_format: TimeFormat,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            minimum_stay: Duration::seconds(DEFAULT_MINIMUM_STAY_SECS),
            new_location_radius_m: DEFAULT_NEW_LOCATION_RADIUS_M,
            jitter_threshold_m: DEFAULT_JITTER_THRESHOLD_M,
            duplicate_window: Duration::seconds(DEFAULT_DUPLICATE_WINDOW_SECS),
            duplicate_radius_m: DEFAULT_DUPLICATE_RADIUS_M,
            max_fix_age: Duration::seconds(DEFAULT_MAX_FIX_AGE_SECS),
            max_future_skew: Duration::seconds(DEFAULT_MAX_FUTURE_SKEW_SECS),
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            tick_interval: std::time::Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            default_name: DEFAULT_ADVENTURE_NAME.to_string(),
            utc_offset: Utc.fix(),
            time_format: TimeFormat::MmSs,
        }
    }
}

impl TrackerConfig {
    /// One minute stay within a 27 m radius.
    pub fn quick_profile() -> Self {
        Self::default()
            .with_minimum_stay_secs(QUICK_MINIMUM_STAY_SECS)
            .with_new_location_radius(QUICK_NEW_LOCATION_RADIUS_M)
    }

    /// Set the dwell threshold. Clamped to at least one second.
    pub fn with_minimum_stay_secs(mut self, secs: i64) -> Self {
        self.minimum_stay = Duration::seconds(secs.max(1));
        self
    }

    pub fn with_new_location_radius(mut self, meters: f64) -> Self {
        self.new_location_radius_m = meters.max(0.0);
        self
    }

    pub fn with_jitter_threshold(mut self, meters: f64) -> Self {
        self.jitter_threshold_m = meters.max(0.0);
        self
    }

    pub fn with_tick_interval_ms(mut self, millis: u64) -> Self {
        self.tick_interval = std::time::Duration::from_millis(millis.max(1));
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Offsets outside +/-24h are ignored.
    pub fn with_utc_offset_secs(mut self, secs: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(secs) {
            self.utc_offset = offset;
        }
        self
    }

    pub fn with_time_format(mut self, format: TimeFormat) -> Self {
        self.time_format = format;
        self
    }
}
