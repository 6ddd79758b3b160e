use crate::models::Workout;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Progress {
    InProgress { exercise_index: usize },
    Finished,
}

/// Result of evaluating the workout after a set completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Advanced { from: usize, to: usize },
    Finished,
}

/// Tracks which exercise is current and when the workout is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    state: Progress,
}

impl Default for Progression {
    fn default() -> Self {
        Self::new()
    }
}

impl Progression {
    pub fn new() -> Self {
        Self {
            state: Progress::InProgress { exercise_index: 0 },
        }
    }

    pub fn at(exercise_index: usize) -> Self {
        Self {
            state: Progress::InProgress { exercise_index },
        }
    }

    pub fn state(&self) -> Progress {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == Progress::Finished
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            Progress::InProgress { exercise_index } => Some(exercise_index),
            Progress::Finished => None,
        }
    }

    /// Evaluate after a set was added to `completed_index`.
    ///
    /// The whole-workout check comes first, so the last exercise completed
    /// need not be the last one in list order.
    pub fn evaluate(&mut self, workout: &Workout, completed_index: usize) -> Transition {
        let Progress::InProgress { exercise_index } = self.state else {
            return Transition::Stay;
        };
        if !workout.exercises.is_empty() && workout.is_complete() {
            self.state = Progress::Finished;
            return Transition::Finished;
        }
        let just_completed = completed_index == exercise_index
            && workout
                .exercises
                .get(exercise_index)
                .is_some_and(|e| e.is_complete());
        if just_completed && exercise_index + 1 < workout.exercises.len() {
            let to = exercise_index + 1;
            self.state = Progress::InProgress { exercise_index: to };
            return Transition::Advanced {
                from: exercise_index,
                to,
            };
        }
        Transition::Stay
    }

    /// Manual jump; ignored when out of bounds or finished.
    pub fn select(&mut self, index: usize, len: usize) -> bool {
        match self.state {
            Progress::InProgress { .. } if index < len => {
                self.state = Progress::InProgress {
                    exercise_index: index,
                };
                true
            }
            _ => false,
        }
    }

    /// Move back to an exercise that lost a set (undo).
    pub fn reopen(&mut self, index: usize, len: usize) {
        if index < len {
            self.state = Progress::InProgress {
                exercise_index: index,
            };
        }
    }

    /// Keep pointing at the same exercise after `removed` was deleted.
    pub fn on_removed(&mut self, removed: usize, new_len: usize) {
        let Progress::InProgress { exercise_index } = self.state else {
            return;
        };
        let mut idx = exercise_index;
        if removed < idx {
            idx -= 1;
        }
        self.state = Progress::InProgress {
            exercise_index: clamp_index(idx, new_len),
        };
    }

    /// Keep pointing at the same exercise after an element moved `from` → `to`.
    pub fn on_moved(&mut self, from: usize, to: usize, len: usize) {
        let Progress::InProgress { exercise_index } = self.state else {
            return;
        };
        let idx = if from == exercise_index {
            to
        } else if from < exercise_index && to >= exercise_index {
            exercise_index - 1
        } else if from > exercise_index && to <= exercise_index {
            exercise_index + 1
        } else {
            exercise_index
        };
        self.state = Progress::InProgress {
            exercise_index: clamp_index(idx, len),
        };
    }
}

fn clamp_index(idx: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        idx.min(len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exercise, ExerciseSet};
    use chrono::Utc;

    fn workout(targets: &[u32]) -> Workout {
        let exercises = targets
            .iter()
            .enumerate()
            .map(|(i, t)| Exercise::new(format!("Exercise {i}"), *t))
            .collect();
        Workout::new("Test", exercises, Utc::now())
    }

    fn log(workout: &mut Workout, idx: usize) {
        let ex = &mut workout.exercises[idx];
        let n = ex.working_count() as i32 + 1;
        ex.sets.push(ExerciseSet::working(n, 100.0, 5));
        ex.sync_current_set();
    }

    #[test]
    fn stays_until_target_reached() {
        let mut w = workout(&[2, 2]);
        let mut p = Progression::new();

        log(&mut w, 0);
        assert_eq!(p.evaluate(&w, 0), Transition::Stay);
        assert_eq!(p.current_index(), Some(0));

        log(&mut w, 0);
        assert_eq!(p.evaluate(&w, 0), Transition::Advanced { from: 0, to: 1 });
        assert_eq!(p.current_index(), Some(1));
    }

    #[test]
    fn finishes_regardless_of_order() {
        let mut w = workout(&[1, 1, 1]);
        let mut p = Progression::at(2);

        log(&mut w, 2);
        assert_eq!(p.evaluate(&w, 2), Transition::Stay);

        assert!(p.select(0, 3));
        log(&mut w, 0);
        assert_eq!(p.evaluate(&w, 0), Transition::Advanced { from: 0, to: 1 });

        log(&mut w, 1);
        assert_eq!(p.evaluate(&w, 1), Transition::Finished);
        assert!(p.is_finished());
        assert_eq!(p.current_index(), None);
    }

    #[test]
    fn last_exercise_complete_but_others_pending() {
        let mut w = workout(&[2, 1]);
        let mut p = Progression::at(1);
        log(&mut w, 1);
        assert_eq!(p.evaluate(&w, 1), Transition::Stay);
        assert_eq!(p.current_index(), Some(1));
    }

    #[test]
    fn select_out_of_bounds_is_ignored() {
        let mut p = Progression::new();
        assert!(!p.select(5, 2));
        assert_eq!(p.current_index(), Some(0));
    }

    #[test]
    fn removal_tracks_current_exercise() {
        let mut p = Progression::at(2);
        p.on_removed(0, 3);
        assert_eq!(p.current_index(), Some(1));

        let mut p = Progression::at(1);
        p.on_removed(3, 3);
        assert_eq!(p.current_index(), Some(1));

        let mut p = Progression::at(2);
        p.on_removed(2, 2);
        assert_eq!(p.current_index(), Some(1));

        let mut p = Progression::at(0);
        p.on_removed(0, 0);
        assert_eq!(p.current_index(), Some(0));
    }

    #[test]
    fn move_tracks_current_exercise() {
        let mut p = Progression::at(1);
        p.on_moved(1, 3, 4);
        assert_eq!(p.current_index(), Some(3));

        let mut p = Progression::at(2);
        p.on_moved(0, 3, 4);
        assert_eq!(p.current_index(), Some(1));

        let mut p = Progression::at(1);
        p.on_moved(3, 0, 4);
        assert_eq!(p.current_index(), Some(2));

        let mut p = Progression::at(1);
        p.on_moved(2, 3, 4);
        assert_eq!(p.current_index(), Some(1));
    }
}
