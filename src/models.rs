use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_WEIGHT: f64 = 1000.0;
pub const MAX_REPS: u32 = 100;
pub const MIN_HOLD_SECS: u32 = 1;
pub const MAX_HOLD_SECS: u32 = 3600;
pub const MIN_SETS: u32 = 1;
pub const MAX_SETS: u32 = 20;
pub const MIN_DROPSETS: u32 = 1;
pub const MAX_DROPSETS: u32 = 5;
pub const MIN_WEIGHT_REDUCTION: f64 = 5.0;

/// One performed set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    /// Working sets count up from 1; warm-ups count down from -1.
    pub set_number: i32,
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub hold_secs: Option<u32>,
    #[serde(default)]
    pub is_warmup: bool,
    #[serde(default)]
    pub is_dropset: bool,
    #[serde(default)]
    pub dropset_number: Option<u32>,
}

impl ExerciseSet {
    pub fn working(set_number: i32, weight: f64, reps: u32) -> Self {
        Self {
            set_number,
            weight,
            reps,
            hold_secs: None,
            is_warmup: false,
            is_dropset: false,
            dropset_number: None,
        }
    }

    pub fn warmup(set_number: i32, weight: f64, reps: u32) -> Self {
        Self {
            is_warmup: true,
            ..Self::working(set_number, weight, reps)
        }
    }

    pub fn hold(set_number: i32, hold_secs: u32) -> Self {
        Self {
            hold_secs: Some(hold_secs),
            ..Self::working(set_number, 0.0, 0)
        }
    }

    pub fn dropset(set_number: i32, dropset_number: u32, weight: f64, reps: u32) -> Self {
        Self {
            is_dropset: true,
            dropset_number: Some(dropset_number),
            ..Self::working(set_number, weight, reps)
        }
    }

    /// Counts toward the exercise's target
    pub fn is_working(&self) -> bool {
        !self.is_warmup && !self.is_dropset
    }

    pub fn volume(&self) -> f64 {
        if self.is_warmup {
            0.0
        } else {
            self.weight * self.reps as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ExerciseKind {
    #[strum(serialize = "weight/reps")]
    WeightReps,
    #[strum(serialize = "hold")]
    Hold { target_secs: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropsetConfig {
    pub enabled: bool,
    pub count: u32,
    pub reduction_per_drop: f64,
}

impl Default for DropsetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            count: MIN_DROPSETS,
            reduction_per_drop: MIN_WEIGHT_REDUCTION,
        }
    }
}

impl DropsetConfig {
    pub fn enabled(count: u32, reduction_per_drop: f64) -> Self {
        Self {
            enabled: true,
            count,
            reduction_per_drop,
        }
    }

    /// Count clamped to the supported range, reduction raised to the minimum
    pub fn normalized(&self) -> (u32, f64) {
        let count = self.count.clamp(MIN_DROPSETS, MAX_DROPSETS);
        let reduction = if self.reduction_per_drop.is_finite() {
            self.reduction_per_drop.max(MIN_WEIGHT_REDUCTION)
        } else {
            MIN_WEIGHT_REDUCTION
        };
        (count, reduction)
    }
}

/// One exercise within a workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    pub kind: ExerciseKind,
    pub target_sets: u32,
    /// 1-based number of the next working set
    pub current_set: u32,
    #[serde(default)]
    pub sets: Vec<ExerciseSet>,
    #[serde(default)]
    pub dropsets: DropsetConfig,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

impl Exercise {
    pub fn new(name: impl Into<String>, target_sets: u32) -> Self {
        Self {
            name: name.into(),
            kind: ExerciseKind::WeightReps,
            target_sets,
            current_set: 1,
            sets: Vec::new(),
            dropsets: DropsetConfig::default(),
            alternatives: Vec::new(),
        }
    }

    pub fn hold(name: impl Into<String>, target_sets: u32, target_secs: Option<u32>) -> Self {
        Self {
            kind: ExerciseKind::Hold { target_secs },
            ..Self::new(name, target_sets)
        }
    }

    pub fn with_dropsets(mut self, dropsets: DropsetConfig) -> Self {
        self.dropsets = dropsets;
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn working_count(&self) -> u32 {
        self.sets.iter().filter(|s| s.is_working()).count() as u32
    }

    pub fn warmup_count(&self) -> u32 {
        self.sets.iter().filter(|s| s.is_warmup).count() as u32
    }

    /// Entries that are not warm-ups (working sets plus their dropsets)
    pub fn non_warmup_len(&self) -> usize {
        self.sets.iter().filter(|s| !s.is_warmup).count()
    }

    pub fn is_complete(&self) -> bool {
        self.working_count() >= self.target_sets
    }

    pub fn is_hold(&self) -> bool {
        matches!(self.kind, ExerciseKind::Hold { .. })
    }

    pub fn sync_current_set(&mut self) {
        self.current_set = self.working_count() + 1;
    }
}

/// One in-progress or completed workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub name: String,
    pub exercises: Vec<Exercise>,
    pub started_at: DateTime<Utc>,
}

impl Workout {
    pub fn new(name: impl Into<String>, exercises: Vec<Exercise>, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            exercises,
            started_at,
        }
    }

    /// Vacuously true for a workout without exercises
    pub fn is_complete(&self) -> bool {
        self.exercises.iter().all(Exercise::is_complete)
    }

    pub fn total_volume(&self) -> f64 {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .map(ExerciseSet::volume)
            .sum()
    }

    pub fn total_sets(&self) -> u32 {
        self.exercises
            .iter()
            .map(|e| e.non_warmup_len() as u32)
            .sum()
    }

    /// Exercises with at least one logged non-warm-up set
    pub fn performed_exercise_count(&self) -> u32 {
        self.exercises
            .iter()
            .filter(|e| e.non_warmup_len() > 0)
            .count() as u32
    }
}

/// Best-ever or historical (weight, reps) entry for an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    pub exercise: String,
    pub weight: f64,
    pub reps: u32,
    pub achieved_at: DateTime<Utc>,
}

impl PersonalRecord {
    /// Higher weight wins; equal weight, higher reps wins.
    pub fn is_beaten_by(&self, weight: f64, reps: u32) -> bool {
        weight > self.weight || (weight == self.weight && reps > self.reps)
    }
}
