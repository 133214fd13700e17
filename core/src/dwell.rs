//! Dwell timer state machine.
//!
//! ```text
//! Idle --start--> Tracking --tick, elapsed >= minimum--> Prompting --resolve--> Idle
//!                 Tracking --start (new anchor)--> Tracking
//!                 Tracking --reset--> Idle
//! ```
//!
//! Each session carries a generation number. Ticks are addressed to a
//! generation, so a tick scheduled for an earlier session can never touch a
//! later one, and a tick arriving after the session was cleared does nothing.

use chrono::{DateTime, Duration, Utc};

use crate::geo::Coordinate;
use crate::models::TimeFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum DwellState {
    Idle,
    Tracking,
    Prompting,
}

/// The candidate place currently being timed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellSession {
    pub anchor: Coordinate,
    pub started_at: DateTime<Utc>,
    pub generation: u64,
    prompting: bool,
}

impl DwellSession {
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    pub fn is_prompting(&self) -> bool {
        self.prompting
    }
}

/// Published view of how far along the current session is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellProgress {
    pub elapsed: Duration,
    pub remaining: Duration,
    /// Elapsed over minimum stay, clamped to `0.0..=1.0`.
    pub fraction: f64,
}

impl DwellProgress {
    pub fn compute(elapsed: Duration, minimum_stay: Duration) -> Self {
        let elapsed = elapsed.max(Duration::zero());
        let remaining = (minimum_stay - elapsed).max(Duration::zero());
        let total_ms = minimum_stay.num_milliseconds();
        let fraction = if total_ms > 0 {
            (elapsed.num_milliseconds() as f64 / total_ms as f64).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            elapsed,
            remaining,
            fraction,
        }
    }

    pub fn elapsed_text(&self, format: TimeFormat) -> String {
        format.format_secs(self.elapsed.num_seconds())
    }

    /// Remaining time rounded up, so "00:00" only shows once the threshold is met.
    pub fn remaining_text(&self, format: TimeFormat) -> String {
        let ms = self.remaining.num_milliseconds();
        format.format_secs((ms + 999) / 1000)
    }
}

/// Result of delivering a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No session, a stale generation, or the prompt was already raised.
    Ignored,
    Progress(DwellProgress),
    /// The threshold was crossed by this tick. Raised once per session.
    PromptRaised(DwellProgress),
}

#[derive(Debug, Clone)]
pub struct DwellTimer {
    minimum_stay: Duration,
    session: Option<DwellSession>,
    last_generation: u64,
    progress: Option<DwellProgress>,
}

impl DwellTimer {
    pub fn new(minimum_stay: Duration) -> Self {
        Self {
            minimum_stay,
            session: None,
            last_generation: 0,
            progress: None,
        }
    }

    pub fn minimum_stay(&self) -> Duration {
        self.minimum_stay
    }

    pub fn state(&self) -> DwellState {
        match &self.session {
            None => DwellState::Idle,
            Some(s) if s.prompting => DwellState::Prompting,
            Some(_) => DwellState::Tracking,
        }
    }

    pub fn session(&self) -> Option<&DwellSession> {
        self.session.as_ref()
    }

    pub fn anchor(&self) -> Option<Coordinate> {
        self.session.map(|s| s.anchor)
    }

    /// Generation of the live session, if any.
    pub fn generation(&self) -> Option<u64> {
        self.session.map(|s| s.generation)
    }

    /// Last published progress; `None` while idle.
    pub fn progress(&self) -> Option<DwellProgress> {
        self.progress
    }

    /// Begin timing `anchor`, superseding any current session.
    ///
    /// Returns the new session's generation.
    pub fn start(&mut self, anchor: Coordinate, now: DateTime<Utc>) -> u64 {
        self.last_generation += 1;
        self.session = Some(DwellSession {
            anchor,
            started_at: now,
            generation: self.last_generation,
            prompting: false,
        });
        self.progress = Some(DwellProgress::compute(Duration::zero(), self.minimum_stay));
        self.last_generation
    }

    /// Advance the session addressed by `generation` to `now`.
    pub fn tick(&mut self, generation: u64, now: DateTime<Utc>) -> TickOutcome {
        let minimum_stay = self.minimum_stay;
        let session = match self.session.as_mut() {
            Some(s) if s.generation == generation => s,
            _ => return TickOutcome::Ignored,
        };
        if session.prompting {
            return TickOutcome::Ignored;
        }

        let progress = DwellProgress::compute(session.elapsed(now), minimum_stay);
        self.progress = Some(progress);
        if progress.elapsed >= minimum_stay {
            session.prompting = true;
            TickOutcome::PromptRaised(progress)
        } else {
            TickOutcome::Progress(progress)
        }
    }

    /// Drop the session without resolving it. Returns what was discarded.
    pub fn reset(&mut self) -> Option<DwellSession> {
        self.progress = None;
        self.session.take()
    }

    /// Consume a pending prompt, returning the machine to idle.
    ///
    /// Does nothing unless a prompt is pending.
    pub fn resolve(&mut self) -> Option<DwellSession> {
        match self.session {
            Some(s) if s.prompting => self.reset(),
            _ => None,
        }
    }
}
