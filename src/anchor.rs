use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of a running timer.
///
/// Live values are always recomputed from these fields and the wall clock;
/// tick counts are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerAnchor {
    pub started_at: DateTime<Utc>,
    /// Countdown length; absent for the workout's elapsed timer
    #[serde(default)]
    pub total_duration_ms: Option<i64>,
    #[serde(default)]
    pub paused_accumulated_ms: i64,
    #[serde(default)]
    pub pause_started_at: Option<DateTime<Utc>>,
    /// Remaining time observed when the anchor was written
    #[serde(default)]
    pub saved_remaining_ms: Option<i64>,
    pub saved_at: DateTime<Utc>,
}

impl TimerAnchor {
    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    /// `None` when absent or outside the representable range
    pub fn total_duration(&self) -> Option<Duration> {
        self.total_duration_ms.and_then(Duration::try_milliseconds)
    }

    pub fn paused_accumulated(&self) -> Duration {
        Duration::try_milliseconds(self.paused_accumulated_ms.max(0))
            .unwrap_or_else(Duration::zero)
    }

    pub fn saved_remaining(&self) -> Option<Duration> {
        self.saved_remaining_ms.and_then(Duration::try_milliseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_with_missing_optional_fields() {
        let json = r#"{"started_at":"2024-03-01T09:00:00Z","saved_at":"2024-03-01T09:00:00Z"}"#;
        let anchor: TimerAnchor = serde_json::from_str(json).unwrap();

        assert_eq!(
            anchor.started_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );
        assert!(!anchor.is_paused());
        assert_eq!(anchor.total_duration(), None);
        assert_eq!(anchor.paused_accumulated(), Duration::zero());
    }

    #[test]
    fn negative_paused_total_is_ignored() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let anchor = TimerAnchor {
            started_at: at,
            total_duration_ms: Some(90_000),
            paused_accumulated_ms: -500,
            pause_started_at: None,
            saved_remaining_ms: Some(30_000),
            saved_at: at,
        };
        assert_eq!(anchor.paused_accumulated(), Duration::zero());
        assert_eq!(anchor.total_duration(), Some(Duration::seconds(90)));
        assert_eq!(anchor.saved_remaining(), Some(Duration::seconds(30)));
    }

    #[test]
    fn out_of_range_values_do_not_build_durations() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let anchor = TimerAnchor {
            started_at: at,
            total_duration_ms: Some(i64::MIN),
            paused_accumulated_ms: i64::MIN,
            pause_started_at: None,
            saved_remaining_ms: Some(i64::MIN),
            saved_at: at,
        };
        assert_eq!(anchor.total_duration(), None);
        assert_eq!(anchor.saved_remaining(), None);
        assert_eq!(anchor.paused_accumulated(), Duration::zero());
    }
}
