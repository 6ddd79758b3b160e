use crate::history::WorkoutSummary;
use crate::rest_timer::RestOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse display state of the session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    Lifting,
    Resting,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrAchievement {
    pub exercise: String,
    pub weight: f64,
    pub reps: u32,
    pub achieved_at: DateTime<Utc>,
}

/// Everything the engine reports to its listeners, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SetCompleted {
        exercise_index: usize,
        exercise: String,
        set_number: i32,
        weight: f64,
        reps: u32,
        is_warmup: bool,
        dropsets: usize,
    },
    PrAchieved(PrAchievement),
    ExerciseAdvanced {
        from: usize,
        to: usize,
    },
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    RestStarted {
        total_secs: i64,
    },
    RestFinished {
        outcome: RestOutcome,
    },
    SetUndone {
        exercise_index: usize,
        removed: usize,
        pr_removed: bool,
    },
    SessionFinished(WorkoutSummary),
    WorkoutCancelled,
}

pub type EventListener = Box<dyn FnMut(&SessionEvent)>;
