//! Location event filtering.
//!
//! Two stages run before classification: the [`FixGate`] drops stale or
//! inaccurate fixes, then the [`LocationFilter`] drops fixes that have not
//! moved meaningfully since the last one processed.

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::config::TrackerConfig;
use crate::geo::{distance_meters, Coordinate};
use crate::models::LocationFix;

/// Why a fix was refused by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixRejection {
    Stale,
    /// Stamped later than the submission clock allows.
    FromFuture,
    InvalidAccuracy,
    Inaccurate,
}

/// Staleness and accuracy gate applied at the location-source boundary.
#[derive(Debug, Clone)]
pub struct FixGate {
    max_age: Duration,
    max_future_skew: Duration,
    max_accuracy_m: f64,
}

impl FixGate {
    pub fn new(max_age: Duration, max_future_skew: Duration, max_accuracy_m: f64) -> Self {
        Self {
            max_age,
            max_future_skew,
            max_accuracy_m,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.max_fix_age,
            config.max_future_skew,
            config.max_accuracy_m,
        )
    }

    pub fn check(&self, fix: &LocationFix, now: DateTime<Utc>) -> Result<(), FixRejection> {
        let age = now - fix.timestamp;
        if age > self.max_age {
            return Err(FixRejection::Stale);
        }
        if -age > self.max_future_skew {
            return Err(FixRejection::FromFuture);
        }
        if fix.accuracy_m < 0.0 || fix.accuracy_m.is_nan() {
            return Err(FixRejection::InvalidAccuracy);
        }
        if fix.accuracy_m > self.max_accuracy_m {
            return Err(FixRejection::Inaccurate);
        }
        Ok(())
    }
}

/// Whether `new_fix` warrants processing given the last processed fix.
///
/// Forced checks always pass. Otherwise a fix within `threshold_m` of the
/// previous one is jitter.
pub fn should_process(
    new_fix: Coordinate,
    last_processed: Option<Coordinate>,
    forced: bool,
    threshold_m: f64,
) -> bool {
    if forced {
        return true;
    }
    match last_processed {
        Some(last) => distance_meters(new_fix, last) >= threshold_m,
        None => true,
    }
}

/// Jitter filter retaining the single most recent processed fix.
#[derive(Debug, Clone)]
pub struct LocationFilter {
    threshold_m: f64,
    last_processed: Option<Coordinate>,
}

impl LocationFilter {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            last_processed: None,
        }
    }

    /// Decide on `fix`, remembering it when accepted.
    pub fn should_process(&mut self, fix: Coordinate, forced: bool) -> bool {
        let accept = should_process(fix, self.last_processed, forced, self.threshold_m);
        if accept {
            self.last_processed = Some(fix);
        } else {
            debug!(
                "skipping fix ({}, {}): within {} m of last processed fix",
                fix.latitude, fix.longitude, self.threshold_m
            );
        }
        accept
    }

    pub fn last_processed(&self) -> Option<Coordinate> {
        self.last_processed
    }
}
