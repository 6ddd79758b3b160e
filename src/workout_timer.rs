use crate::anchor::TimerAnchor;
use crate::util::max_zero;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused { since: DateTime<Utc> },
    Stopped { elapsed: Duration },
}

/// Counts workout duration from a start anchor with pause accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutTimer {
    anchor: DateTime<Utc>,
    paused_accumulated: Duration,
    state: RunState,
}

impl WorkoutTimer {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            anchor: now,
            paused_accumulated: Duration::zero(),
            state: RunState::Running,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, RunState::Paused { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, RunState::Stopped { .. })
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.state {
            RunState::Running => max_zero(now - self.anchor - self.paused_accumulated),
            // Everything after `since` is pause time, so the clock reads as of `since`.
            RunState::Paused { since } => {
                max_zero(since - self.anchor - self.paused_accumulated)
            }
            RunState::Stopped { elapsed } => elapsed,
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        self.state = RunState::Paused { since: now };
        true
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        let RunState::Paused { since } = self.state else {
            return false;
        };
        self.paused_accumulated = self.paused_accumulated + max_zero(now - since);
        self.state = RunState::Running;
        true
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.anchor = now;
        self.paused_accumulated = Duration::zero();
        self.state = RunState::Running;
    }

    pub fn stop(&mut self, now: DateTime<Utc>) -> Duration {
        let elapsed = self.elapsed(now);
        self.state = RunState::Stopped { elapsed };
        elapsed
    }

    pub fn to_anchor(&self, now: DateTime<Utc>) -> TimerAnchor {
        TimerAnchor {
            started_at: self.anchor,
            total_duration_ms: None,
            paused_accumulated_ms: self.paused_accumulated.num_milliseconds(),
            pause_started_at: match self.state {
                RunState::Paused { since } => Some(since),
                _ => None,
            },
            saved_remaining_ms: None,
            saved_at: now,
        }
    }

    /// Rebuild from a persisted anchor, repairing anchors that sit in the future.
    pub fn from_anchor(anchor: &TimerAnchor, now: DateTime<Utc>) -> Self {
        if anchor.started_at > now {
            tracing::warn!(
                started_at = %anchor.started_at,
                %now,
                "workout timer anchor is in the future; re-anchoring at now"
            );
            return Self::start(now);
        }
        let state = match anchor.pause_started_at {
            Some(since) if since > now => RunState::Paused { since: now },
            Some(since) if since < anchor.started_at => RunState::Paused {
                since: anchor.started_at,
            },
            Some(since) => RunState::Paused { since },
            None => RunState::Running,
        };
        Self {
            anchor: anchor.started_at,
            // pauses cannot outlast the workout itself
            paused_accumulated: anchor
                .paused_accumulated()
                .min(now - anchor.started_at),
            state,
        }
    }
}
