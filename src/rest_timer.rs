use crate::anchor::TimerAnchor;
use crate::error::{EngineError, EngineResult};
use crate::util::max_zero;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How a rest period ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RestOutcome {
    Skipped,
    Completed,
    AutoAdvanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestState {
    Idle,
    Active {
        started_at: DateTime<Utc>,
        total: Duration,
    },
    Finished(RestOutcome),
}

/// Countdown between sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestTimer {
    state: RestState,
}

impl Default for RestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RestTimer {
    pub fn new() -> Self {
        Self {
            state: RestState::Idle,
        }
    }

    pub fn state(&self) -> RestState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, RestState::Active { .. })
    }

    pub fn start(&mut self, duration: Duration, now: DateTime<Utc>) -> EngineResult<()> {
        if duration <= Duration::zero() {
            return Err(EngineError::InvalidDuration(duration.num_seconds()));
        }
        self.state = RestState::Active {
            started_at: now,
            total: duration,
        };
        Ok(())
    }

    /// Resume a countdown from a known anchor (restoration).
    pub fn resume_from(&mut self, started_at: DateTime<Utc>, total: Duration) {
        self.state = RestState::Active { started_at, total };
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.state {
            RestState::Active { started_at, total } => max_zero(total - (now - started_at)),
            _ => Duration::zero(),
        }
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.state {
            RestState::Active { total, .. } => total - self.remaining(now).min(total),
            _ => Duration::zero(),
        }
    }

    pub fn extend(&mut self, by: Duration) -> bool {
        match &mut self.state {
            RestState::Active { total, .. } => {
                match total.checked_add(&max_zero(by)) {
                    Some(extended) => {
                        *total = extended;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Shortens the countdown; completes it when nothing is left.
    pub fn reduce(&mut self, by: Duration, now: DateTime<Utc>) -> Option<RestOutcome> {
        let RestState::Active { started_at, total } = self.state else {
            return None;
        };
        let total = max_zero(total - max_zero(by));
        self.state = RestState::Active { started_at, total };
        if self.remaining(now) <= Duration::zero() {
            self.state = RestState::Finished(RestOutcome::Completed);
            return Some(RestOutcome::Completed);
        }
        None
    }

    pub fn skip(&mut self) -> Option<RestOutcome> {
        self.finish(RestOutcome::Skipped)
    }

    pub fn complete(&mut self) -> Option<RestOutcome> {
        self.finish(RestOutcome::Completed)
    }

    /// Direct transition used when auto-advance has no visible countdown
    pub fn auto_advance(&mut self) -> RestOutcome {
        self.state = RestState::Finished(RestOutcome::AutoAdvanced);
        RestOutcome::AutoAdvanced
    }

    /// `auto_advance_after` is the minimum rest before advancing on its own.
    ///
    /// Returns the outcome with the instant the rest actually ended, which
    /// is earlier than `now` when ticks arrive late.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        auto_advance_after: Option<Duration>,
    ) -> Option<(RestOutcome, DateTime<Utc>)> {
        let RestState::Active { started_at, total } = self.state else {
            return None;
        };
        let ended_at = |after: Duration| {
            started_at
                .checked_add_signed(after)
                .map_or(now, |at| at.min(now))
        };
        if self.remaining(now) <= Duration::zero() {
            let outcome = self.finish(RestOutcome::Completed)?;
            return Some((outcome, ended_at(total)));
        }
        match auto_advance_after {
            Some(min_rest) if min_rest > Duration::zero() && self.elapsed(now) >= min_rest => {
                let outcome = self.finish(RestOutcome::AutoAdvanced)?;
                Some((outcome, ended_at(min_rest)))
            }
            _ => None,
        }
    }

    pub fn to_anchor(&self, now: DateTime<Utc>) -> Option<TimerAnchor> {
        let RestState::Active { started_at, total } = self.state else {
            return None;
        };
        Some(TimerAnchor {
            started_at,
            total_duration_ms: Some(total.num_milliseconds()),
            paused_accumulated_ms: 0,
            pause_started_at: None,
            saved_remaining_ms: Some(self.remaining(now).num_milliseconds()),
            saved_at: now,
        })
    }

    fn finish(&mut self, outcome: RestOutcome) -> Option<RestOutcome> {
        if !self.is_active() {
            return None;
        }
        self.state = RestState::Finished(outcome);
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn start_rejects_non_positive() {
        let mut timer = RestTimer::new();
        assert_matches!(timer.start(secs(0), t0()), Err(EngineError::InvalidDuration(0)));
        assert_matches!(
            timer.start(secs(-5), t0()),
            Err(EngineError::InvalidDuration(-5))
        );
        assert_eq!(timer.state(), RestState::Idle);
    }

    #[test]
    fn remaining_counts_down_and_floors() {
        let mut timer = RestTimer::new();
        timer.start(secs(90), t0()).unwrap();
        assert_eq!(timer.remaining(t0()), secs(90));
        assert_eq!(timer.remaining(t0() + secs(30)), secs(60));
        assert_eq!(timer.remaining(t0() + secs(200)), Duration::zero());
        assert_eq!(timer.elapsed(t0() + secs(30)), secs(30));
    }

    #[test]
    fn tick_completes_at_zero() {
        let mut timer = RestTimer::new();
        timer.start(secs(5), t0()).unwrap();
        assert_eq!(timer.tick(t0() + secs(4), None), None);
        assert_eq!(
            timer.tick(t0() + secs(5), None),
            Some((RestOutcome::Completed, t0() + secs(5)))
        );
        assert_eq!(timer.tick(t0() + secs(6), None), None);
        assert_eq!(timer.state(), RestState::Finished(RestOutcome::Completed));
    }

    #[test]
    fn auto_advance_after_minimum_rest() {
        let mut timer = RestTimer::new();
        timer.start(secs(90), t0()).unwrap();
        assert_eq!(timer.tick(t0() + secs(29), Some(secs(30))), None);
        assert_eq!(
            timer.tick(t0() + secs(30), Some(secs(30))),
            Some((RestOutcome::AutoAdvanced, t0() + secs(30)))
        );
    }

    #[test]
    fn late_tick_reports_when_rest_ran_out() {
        let mut timer = RestTimer::new();
        timer.start(secs(90), t0()).unwrap();
        assert_eq!(
            timer.tick(t0() + secs(400), None),
            Some((RestOutcome::Completed, t0() + secs(90)))
        );

        let mut timer = RestTimer::new();
        timer.start(secs(90), t0()).unwrap();
        assert_eq!(
            timer.tick(t0() + secs(75), Some(secs(45))),
            Some((RestOutcome::AutoAdvanced, t0() + secs(45)))
        );
    }

    #[test]
    fn extend_refuses_to_overflow() {
        let mut timer = RestTimer::new();
        timer.start(secs(60), t0()).unwrap();
        assert!(!timer.extend(Duration::MAX));
        assert_eq!(timer.remaining(t0()), secs(60));
    }

    #[test]
    fn extend_and_reduce() {
        let mut timer = RestTimer::new();
        timer.start(secs(60), t0()).unwrap();
        assert!(timer.extend(secs(15)));
        assert_eq!(timer.remaining(t0() + secs(10)), secs(65));

        assert_eq!(timer.reduce(secs(30), t0() + secs(10)), None);
        assert_eq!(timer.remaining(t0() + secs(10)), secs(35));

        assert_eq!(
            timer.reduce(secs(35), t0() + secs(10)),
            Some(RestOutcome::Completed)
        );
        assert!(!timer.extend(secs(15)));
    }

    #[test]
    fn reduce_below_zero_floors() {
        let mut timer = RestTimer::new();
        timer.start(secs(30), t0()).unwrap();
        assert_eq!(timer.reduce(secs(120), t0()), Some(RestOutcome::Completed));
        assert_eq!(timer.remaining(t0()), Duration::zero());
    }

    #[test]
    fn skip_is_terminal() {
        let mut timer = RestTimer::new();
        assert_eq!(timer.skip(), None);
        timer.start(secs(60), t0()).unwrap();
        assert_eq!(timer.skip(), Some(RestOutcome::Skipped));
        assert_eq!(timer.complete(), None);
        assert_eq!(timer.state(), RestState::Finished(RestOutcome::Skipped));
    }

    #[test]
    fn anchor_carries_remaining() {
        let mut timer = RestTimer::new();
        assert!(timer.to_anchor(t0()).is_none());
        timer.start(secs(90), t0()).unwrap();
        let anchor = timer.to_anchor(t0() + secs(20)).unwrap();
        assert_eq!(anchor.total_duration_ms, Some(90_000));
        assert_eq!(anchor.saved_remaining_ms, Some(70_000));
        assert_eq!(anchor.saved_at, t0() + secs(20));
    }
}
