//! Pure operations on an exercise's set list.
//!
//! Every function takes the exercise by reference and returns a new value;
//! nothing here touches timers, storage or the PR registry.

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Exercise, ExerciseSet, MAX_HOLD_SECS, MAX_REPS, MAX_WEIGHT, MIN_HOLD_SECS,
};
use crate::util::round_to_nearest;
use itertools::Itertools;

pub const WARMUP_ROUNDING: f64 = 2.5;
pub const WARMUP_LIGHT_PERCENT: f64 = 50.0;
pub const WARMUP_LIGHT_MAX_REPS: u32 = 5;

pub fn validate_set(weight: f64, reps: u32, is_warmup: bool) -> EngineResult<()> {
    if !weight.is_finite() {
        return Err(EngineError::InvalidInput("weight must be a number".into()));
    }
    if is_warmup {
        if weight < 0.0 {
            return Err(EngineError::InvalidInput(
                "warm-up weight cannot be negative".into(),
            ));
        }
    } else if weight <= 0.0 {
        return Err(EngineError::InvalidInput("weight must be positive".into()));
    }
    if weight > MAX_WEIGHT {
        return Err(EngineError::InvalidInput(format!(
            "weight must be at most {MAX_WEIGHT}"
        )));
    }
    if reps == 0 {
        return Err(EngineError::InvalidInput("reps must be positive".into()));
    }
    if reps > MAX_REPS {
        return Err(EngineError::InvalidInput(format!(
            "reps must be at most {MAX_REPS}"
        )));
    }
    Ok(())
}

pub fn validate_hold(hold_secs: u32) -> EngineResult<()> {
    if !(MIN_HOLD_SECS..=MAX_HOLD_SECS).contains(&hold_secs) {
        return Err(EngineError::InvalidInput(format!(
            "hold duration must be between {MIN_HOLD_SECS} and {MAX_HOLD_SECS} seconds"
        )));
    }
    Ok(())
}

pub fn append_working_set(
    exercise: &Exercise,
    weight: f64,
    reps: u32,
    is_warmup: bool,
) -> EngineResult<Exercise> {
    validate_set(weight, reps, is_warmup)?;
    let mut next = exercise.clone();
    let set = if is_warmup {
        ExerciseSet::warmup(-(exercise.warmup_count() as i32 + 1), weight, reps)
    } else {
        ExerciseSet::working(exercise.working_count() as i32 + 1, weight, reps)
    };
    next.sets.push(set);
    next.sync_current_set();
    Ok(next)
}

pub fn append_hold_set(exercise: &Exercise, hold_secs: u32) -> EngineResult<Exercise> {
    validate_hold(hold_secs)?;
    let mut next = exercise.clone();
    next.sets.push(ExerciseSet::hold(
        exercise.working_count() as i32 + 1,
        hold_secs,
    ));
    next.sync_current_set();
    Ok(next)
}

/// Dropsets following the most recent working set, or none when disabled.
pub fn expand_dropsets(exercise: &Exercise, base_weight: f64, reps: u32) -> Vec<ExerciseSet> {
    if !exercise.dropsets.enabled {
        return Vec::new();
    }
    let (count, reduction) = exercise.dropsets.normalized();
    let set_number = exercise
        .sets
        .iter()
        .rev()
        .find(|s| s.is_working())
        .map(|s| s.set_number)
        .unwrap_or(exercise.working_count() as i32);

    (1..=count)
        .map(|i| {
            let weight = (base_weight - i as f64 * reduction).max(0.0);
            ExerciseSet::dropset(set_number, i, weight, reps)
        })
        .collect()
}

/// Prepends warm-up sets ramping toward `working_weight`.
///
/// No-op once the exercise has any working set or warm-up.
pub fn insert_warmup_sets(
    exercise: &Exercise,
    working_weight: f64,
    reps: u32,
    percentages: &[f64],
) -> Exercise {
    if exercise.working_count() > 0 || exercise.warmup_count() > 0 {
        return exercise.clone();
    }

    let warmups: Vec<ExerciseSet> = percentages
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .sorted_by(|a, b| a.total_cmp(b))
        .enumerate()
        .map(|(index, p)| {
            let weight = round_to_nearest(working_weight * p / 100.0, WARMUP_ROUNDING);
            let reps = if p < WARMUP_LIGHT_PERCENT {
                reps.min(WARMUP_LIGHT_MAX_REPS)
            } else {
                reps
            };
            ExerciseSet::warmup(-(index as i32 + 1), weight, reps)
        })
        .collect();

    let mut next = exercise.clone();
    next.sets.splice(0..0, warmups);
    next.sync_current_set();
    next
}

/// Removes the last `count` non-warm-up entries, leaving warm-ups in place.
pub fn remove_most_recent_working(exercise: &Exercise, count: usize) -> Exercise {
    let mut next = exercise.clone();
    let mut remaining = count;
    let mut idx = next.sets.len();
    while remaining > 0 && idx > 0 {
        idx -= 1;
        if next.sets[idx].is_warmup {
            continue;
        }
        next.sets.remove(idx);
        remaining -= 1;
    }
    next.sync_current_set();
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DropsetConfig;
    use assert_matches::assert_matches;

    fn bench() -> Exercise {
        Exercise::new("Bench Press", 3)
    }

    #[test]
    fn append_assigns_sequential_numbers() {
        let ex = append_working_set(&bench(), 185.0, 8, false).unwrap();
        let ex = append_working_set(&ex, 185.0, 8, false).unwrap();

        assert_eq!(ex.sets[0].set_number, 1);
        assert_eq!(ex.sets[1].set_number, 2);
        assert_eq!(ex.current_set, 3);
    }

    #[test]
    fn append_rejects_non_positive_values() {
        assert_matches!(
            append_working_set(&bench(), 0.0, 8, false),
            Err(EngineError::InvalidInput(_))
        );
        assert_matches!(
            append_working_set(&bench(), -5.0, 8, false),
            Err(EngineError::InvalidInput(_))
        );
        assert_matches!(
            append_working_set(&bench(), 185.0, 0, false),
            Err(EngineError::InvalidInput(_))
        );
        assert_matches!(
            append_working_set(&bench(), f64::NAN, 5, false),
            Err(EngineError::InvalidInput(_))
        );
        assert_matches!(
            append_working_set(&bench(), 1200.0, 5, false),
            Err(EngineError::InvalidInput(_))
        );
        assert_matches!(
            append_working_set(&bench(), 100.0, 101, false),
            Err(EngineError::InvalidInput(_))
        );
    }

    #[test]
    fn warmup_is_exempt_from_weight_check() {
        let ex = append_working_set(&bench(), 0.0, 10, true).unwrap();
        assert_eq!(ex.sets[0].set_number, -1);
        assert!(ex.sets[0].is_warmup);
        assert_eq!(ex.current_set, 1);

        let ex = append_working_set(&ex, 45.0, 10, true).unwrap();
        assert_eq!(ex.sets[1].set_number, -2);
    }

    #[test]
    fn dropsets_follow_reduction() {
        let ex = bench().with_dropsets(DropsetConfig::enabled(2, 10.0));
        let ex = append_working_set(&ex, 200.0, 6, false).unwrap();
        let drops = expand_dropsets(&ex, 200.0, 6);

        assert_eq!(drops.len(), 2);
        assert_eq!(drops[0].weight, 190.0);
        assert_eq!(drops[1].weight, 180.0);
        assert!(drops.iter().all(|d| d.set_number == 1 && d.reps == 6 && d.is_dropset));
        assert_eq!(drops[0].dropset_number, Some(1));
        assert_eq!(drops[1].dropset_number, Some(2));
    }

    #[test]
    fn dropsets_floor_at_zero_and_never_increase() {
        let ex = bench().with_dropsets(DropsetConfig::enabled(5, 20.0));
        let ex = append_working_set(&ex, 50.0, 10, false).unwrap();
        let drops = expand_dropsets(&ex, 50.0, 10);

        let weights: Vec<f64> = drops.iter().map(|d| d.weight).collect();
        assert_eq!(weights, vec![30.0, 10.0, 0.0, 0.0, 0.0]);
        assert!(weights.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn dropset_reduction_uses_minimum() {
        let ex = bench().with_dropsets(DropsetConfig::enabled(1, 1.0));
        let ex = append_working_set(&ex, 100.0, 10, false).unwrap();
        let drops = expand_dropsets(&ex, 100.0, 10);
        assert_eq!(drops[0].weight, 95.0);
    }

    #[test]
    fn dropsets_disabled_yields_nothing() {
        let ex = append_working_set(&bench(), 100.0, 10, false).unwrap();
        assert!(expand_dropsets(&ex, 100.0, 10).is_empty());
    }

    #[test]
    fn warmups_are_prepended_in_ascending_order() {
        let ex = insert_warmup_sets(&bench(), 185.0, 8, &[90.0, 40.0, 70.0]);

        assert_eq!(ex.sets.len(), 3);
        assert_eq!(ex.sets[0].weight, 75.0);
        assert_eq!(ex.sets[0].reps, 5);
        assert_eq!(ex.sets[0].set_number, -1);
        assert_eq!(ex.sets[1].weight, 130.0);
        assert_eq!(ex.sets[1].reps, 8);
        assert_eq!(ex.sets[1].set_number, -2);
        assert_eq!(ex.sets[2].weight, 167.5);
        assert_eq!(ex.sets[2].set_number, -3);
        assert!(ex.sets.iter().all(|s| s.is_warmup));
        assert_eq!(ex.current_set, 1);
    }

    #[test]
    fn warmups_are_idempotent() {
        let once = insert_warmup_sets(&bench(), 185.0, 8, &[50.0, 70.0]);
        let twice = insert_warmup_sets(&once, 185.0, 8, &[50.0, 70.0]);
        assert_eq!(once, twice);

        let worked = append_working_set(&bench(), 185.0, 8, false).unwrap();
        let unchanged = insert_warmup_sets(&worked, 185.0, 8, &[50.0]);
        assert_eq!(worked, unchanged);
    }

    #[test]
    fn remove_skips_warmups() {
        let ex = insert_warmup_sets(&bench(), 200.0, 6, &[50.0]);
        let ex = append_working_set(&ex, 200.0, 6, false).unwrap();
        let ex = append_working_set(&ex, 200.0, 6, false).unwrap();

        let ex = remove_most_recent_working(&ex, 2);
        assert_eq!(ex.sets.len(), 1);
        assert!(ex.sets[0].is_warmup);
        assert_eq!(ex.current_set, 1);

        let ex = remove_most_recent_working(&ex, 3);
        assert_eq!(ex.sets.len(), 1);
    }

    #[test]
    fn remove_takes_dropset_block() {
        let ex = bench().with_dropsets(DropsetConfig::enabled(2, 10.0));
        let first = append_working_set(&ex, 200.0, 6, false).unwrap();
        let mut ex = append_working_set(&first, 200.0, 6, false).unwrap();
        let drops = expand_dropsets(&ex, 200.0, 6);
        ex.sets.extend(drops);
        assert_eq!(ex.sets.len(), 4);

        let ex = remove_most_recent_working(&ex, 3);
        assert_eq!(ex, first);
    }

    #[test]
    fn hold_set_validation() {
        let plank = Exercise::hold("Plank", 3, Some(60));
        let ex = append_hold_set(&plank, 45).unwrap();
        assert_eq!(ex.sets[0].hold_secs, Some(45));
        assert_eq!(ex.current_set, 2);
        assert_matches!(append_hold_set(&plank, 0), Err(EngineError::InvalidInput(_)));
        assert_matches!(
            append_hold_set(&plank, 4000),
            Err(EngineError::InvalidInput(_))
        );
    }
}
