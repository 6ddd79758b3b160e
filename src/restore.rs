//! Rebuilds live timer values from persisted anchors after suspension.
//!
//! The anchor plus the current wall clock is the ground truth. The remaining
//! time saved alongside the anchor is only used to detect an anchor that has
//! been invalidated, typically by a wall-clock change while suspended.

use crate::anchor::TimerAnchor;
use crate::util::max_zero;
use chrono::{DateTime, Duration, Utc};

/// Outcome of restoring a rest countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestRestore {
    /// Still counting; `started_at` is re-anchored so ticks continue smoothly
    Running {
        started_at: DateTime<Utc>,
        total: Duration,
        remaining: Duration,
        corrected: bool,
    },
    /// Ran out while suspended, at `ended_at` (never later than the restore time)
    Expired {
        ended_at: DateTime<Utc>,
        corrected: bool,
    },
    /// Anchor had no usable countdown
    Invalid,
}

pub fn reconcile_rest(anchor: &TimerAnchor, now: DateTime<Utc>, epsilon: Duration) -> RestRestore {
    reconcile_checked(anchor, now, epsilon).unwrap_or_else(|| {
        tracing::warn!(?anchor, "rest anchor values out of range; discarding");
        RestRestore::Invalid
    })
}

/// `None` when the anchor's values overflow time arithmetic.
fn reconcile_checked(
    anchor: &TimerAnchor,
    now: DateTime<Utc>,
    epsilon: Duration,
) -> Option<RestRestore> {
    let Some(total) = anchor.total_duration() else {
        return Some(RestRestore::Invalid);
    };
    if total <= Duration::zero() {
        return Some(RestRestore::Invalid);
    }

    let since_start = now.signed_duration_since(anchor.started_at);
    let computed = total.checked_sub(&since_start)?;
    // computed exceeds total exactly when the anchor starts in the future
    let beyond_total = -since_start > epsilon;
    let (remaining, ends_at, corrected) = match anchor.saved_remaining() {
        Some(saved) if computed.checked_sub(&saved)? > epsilon || beyond_total => {
            let suspended = max_zero(now.signed_duration_since(anchor.saved_at));
            let fallback = max_zero(saved.checked_sub(&suspended)?);
            tracing::warn!(
                computed_ms = computed.num_milliseconds(),
                saved_ms = saved.num_milliseconds(),
                fallback_ms = fallback.num_milliseconds(),
                "rest anchor inconsistent with saved remaining; using fallback"
            );
            let ends_at = anchor.saved_at.checked_add_signed(max_zero(saved))?;
            (fallback, ends_at, true)
        }
        None if beyond_total => {
            tracing::warn!(
                computed_ms = computed.num_milliseconds(),
                "rest anchor is in the future; restarting countdown"
            );
            (total, now, true)
        }
        _ => {
            let ends_at = anchor.started_at.checked_add_signed(total)?;
            (max_zero(computed).min(total), ends_at, false)
        }
    };

    if remaining <= Duration::zero() {
        return Some(RestRestore::Expired {
            ended_at: ends_at.min(now),
            corrected,
        });
    }
    let elapsed_so_far = total - remaining;
    Some(RestRestore::Running {
        started_at: now.checked_sub_signed(elapsed_so_far)?,
        total,
        remaining,
        corrected,
    })
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

    fn anchor(total: i64, saved_remaining: Option<i64>, saved_at: DateTime<Utc>) -> TimerAnchor {
        TimerAnchor {
            started_at: t0(),
            total_duration_ms: Some(total * 1000),
            paused_accumulated_ms: 0,
            pause_started_at: None,
            saved_remaining_ms: saved_remaining.map(|s| s * 1000),
            saved_at,
        }
    }

    #[test]
    fn remaining_follows_wall_clock() {
        let a = anchor(90, Some(90), t0());
        let restored = reconcile_rest(&a, t0() + secs(40), secs(2));
        assert_eq!(
            restored,
            RestRestore::Running {
                started_at: t0(),
                total: secs(90),
                remaining: secs(50),
                corrected: false,
            }
        );
    }

    #[test]
    fn zero_suspension_is_idempotent() {
        let a = anchor(90, Some(70), t0() + secs(20));
        let restored = reconcile_rest(&a, t0() + secs(20), secs(2));
        assert_matches!(
            restored,
            RestRestore::Running { remaining, corrected: false, .. } if remaining == secs(70)
        );
    }

    #[test]
    fn expired_while_suspended() {
        let a = anchor(90, Some(90), t0());
        assert_eq!(
            reconcile_rest(&a, t0() + secs(90), secs(2)),
            RestRestore::Expired {
                ended_at: t0() + secs(90),
                corrected: false
            }
        );
        assert_eq!(
            reconcile_rest(&a, t0() + secs(3600), secs(2)),
            RestRestore::Expired {
                ended_at: t0() + secs(90),
                corrected: false
            }
        );
    }

    #[test]
    fn clock_moved_backwards_uses_fallback() {
        // saved 60s remaining at t0+30; the wall clock now reads t0-100
        let a = anchor(90, Some(60), t0() + secs(30));
        let restored = reconcile_rest(&a, t0() - secs(100), secs(2));
        assert_matches!(
            restored,
            RestRestore::Running { remaining, corrected: true, .. } if remaining == secs(60)
        );
    }

    #[test]
    fn fallback_subtracts_observed_suspension() {
        // anchor start was corrupted to be far later than reality
        let mut a = anchor(90, Some(60), t0() + secs(30));
        a.started_at = t0() + secs(600);
        let restored = reconcile_rest(&a, t0() + secs(50), secs(2));
        assert_matches!(
            restored,
            RestRestore::Running { remaining, corrected: true, .. } if remaining == secs(40)
        );

        let restored = reconcile_rest(&a, t0() + secs(500), secs(2));
        // saved 60s at t0+30, so the countdown ran out at t0+90
        assert_eq!(
            restored,
            RestRestore::Expired {
                ended_at: t0() + secs(90),
                corrected: true
            }
        );
    }

    #[test]
    fn small_drift_within_epsilon_is_accepted() {
        let a = anchor(90, Some(59), t0() + secs(30));
        let restored = reconcile_rest(&a, t0() + secs(30), secs(2));
        assert_matches!(
            restored,
            RestRestore::Running { remaining, corrected: false, .. } if remaining == secs(60)
        );
    }

    #[test]
    fn re_anchors_for_smooth_ticks() {
        let mut a = anchor(90, Some(60), t0() + secs(30));
        a.started_at = t0() + secs(600);
        let now = t0() + secs(40);
        let RestRestore::Running {
            started_at,
            total,
            remaining,
            ..
        } = reconcile_rest(&a, now, secs(2))
        else {
            panic!("expected running");
        };
        assert_eq!(total - (now - started_at), remaining);
    }

    #[test]
    fn missing_total_is_invalid() {
        let mut a = anchor(90, None, t0());
        a.total_duration_ms = None;
        assert_eq!(reconcile_rest(&a, t0(), secs(2)), RestRestore::Invalid);
    }

    #[test]
    fn oversized_saved_remaining_defers_to_wall_clock() {
        let mut a = anchor(90, Some(60), t0() + secs(30));
        a.saved_remaining_ms = Some(i64::MAX);
        assert_matches!(
            reconcile_rest(&a, t0() + secs(40), secs(2)),
            RestRestore::Running { remaining, corrected: false, .. } if remaining == secs(50)
        );
    }

    #[test]
    fn out_of_range_anchor_is_invalid() {
        let mut a = anchor(90, Some(60), t0() + secs(30));
        a.total_duration_ms = Some(i64::MAX);
        assert_eq!(reconcile_rest(&a, t0() + secs(40), secs(2)), RestRestore::Invalid);

        let mut a = anchor(90, Some(60), t0() + secs(30));
        a.total_duration_ms = Some(i64::MIN);
        assert_eq!(reconcile_rest(&a, t0() + secs(40), secs(2)), RestRestore::Invalid);
    }

    #[test]
    fn large_epsilon_does_not_overflow() {
        let a = anchor(90, Some(90), t0());
        let restored = reconcile_rest(&a, t0() + secs(40), Duration::MAX);
        assert_matches!(
            restored,
            RestRestore::Running { remaining, corrected: false, .. } if remaining == secs(50)
        );
    }
}
