//! The workout session engine.
//!
//! Owns the in-progress workout and both timers, drives progression, PR
//! detection and undo, and keeps the durable store in step so a relaunch can
//! pick up where the previous process stopped.

use crate::anchor::TimerAnchor;
use crate::clock::Clock;
use crate::config::{EngineConfig, MAX_REST_SECS};
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventListener, PrAchievement, SessionEvent, SessionPhase};
use crate::history::{HistorySink, MemoryHistory, SqliteHistory, WorkoutSummary};
use crate::ledger;
use crate::models::{DropsetConfig, Exercise, PersonalRecord, Workout, MAX_SETS, MIN_SETS};
use crate::notify::{NoopScheduler, NotificationScheduler, REST_DONE_BODY, REST_DONE_TITLE};
use crate::progression::{Progression, Transition};
use crate::records::{MemoryRecords, RecordRegistry, SqliteRecords};
use crate::rest_timer::{RestOutcome, RestState, RestTimer};
use crate::restore::{reconcile_rest, RestRestore};
use crate::store::{
    self, DurableStore, MemoryStore, SqliteStore, KEY_EXERCISE_INDEX, KEY_LAST_WEIGHTS,
    KEY_REST_TIMER, KEY_SESSION, KEY_WORKOUT_TIMER,
};
use crate::util::{ceil_secs, max_zero};
use crate::workout_timer::WorkoutTimer;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// External collaborators, constructed by the host
pub struct Services {
    pub store: Box<dyn DurableStore>,
    pub records: Box<dyn RecordRegistry>,
    pub notifier: Box<dyn NotificationScheduler>,
    pub history: Box<dyn HistorySink>,
}

impl Services {
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemoryStore::new()),
            records: Box::new(MemoryRecords::new()),
            notifier: Box::new(NoopScheduler),
            history: Box::new(MemoryHistory::new()),
        }
    }

    /// Store, registry and history backed by one SQLite database
    pub fn sqlite(db: Database, notifier: Box<dyn NotificationScheduler>) -> Self {
        Self {
            store: Box::new(SqliteStore::new(db.clone())),
            records: Box::new(SqliteRecords::new(db.clone())),
            notifier,
            history: Box::new(SqliteHistory::new(db)),
        }
    }
}

/// Single-use buffer for reverting the most recent completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub exercise_index: usize,
    pub exercise: String,
    /// Non-warm-up entries the exercise had before the completion
    pub entries_before: usize,
    pub was_pr: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Last logged working set for an exercise, used to prefill the next one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastWeight {
    pub weight: f64,
    pub reps: u32,
}

/// What a set completion did
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub exercise_index: usize,
    pub set_number: i32,
    pub dropsets: usize,
    pub is_pr: bool,
    pub advanced_to: Option<usize>,
    pub summary: Option<WorkoutSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionSnapshot {
    workout: Workout,
    #[serde(default)]
    undo: Option<UndoEntry>,
    #[serde(default)]
    pending_advance_at: Option<DateTime<Utc>>,
    #[serde(default)]
    paused_for_rest: bool,
    #[serde(default)]
    prs: Vec<PrAchievement>,
}

struct ActiveSession {
    workout: Workout,
    progression: Progression,
    workout_timer: WorkoutTimer,
    rest: RestTimer,
    /// Deadline of an auto-advance that has no visible countdown
    pending_advance_at: Option<DateTime<Utc>>,
    paused_for_rest: bool,
    undo: Option<UndoEntry>,
    prs: Vec<PrAchievement>,
    phase: SessionPhase,
}

impl ActiveSession {
    fn set_phase(&mut self, to: SessionPhase, events: &mut Vec<SessionEvent>) {
        if self.phase != to {
            events.push(SessionEvent::PhaseChanged {
                from: self.phase,
                to,
            });
            self.phase = to;
        }
    }

    fn is_resting(&self) -> bool {
        self.rest.is_active() || self.pending_advance_at.is_some()
    }

    fn current_index(&self) -> EngineResult<usize> {
        self.progression
            .current_index()
            .filter(|i| *i < self.workout.exercises.len())
            .ok_or(EngineError::NoCurrentExercise)
    }
}

pub struct SessionEngine {
    services: Services,
    clock: Box<dyn Clock>,
    config: EngineConfig,
    listeners: Vec<EventListener>,
    active: Option<ActiveSession>,
}

impl SessionEngine {
    pub fn new(services: Services, clock: Box<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            services,
            clock,
            config: config.sanitized(),
            listeners: Vec::new(),
            active: None,
        }
    }

    /// Cold start: build the engine and reload whatever the store holds
    pub fn restore(services: Services, clock: Box<dyn Clock>, config: EngineConfig) -> Self {
        let mut engine = Self::new(services, clock, config);
        engine.resume();
        engine
    }

    pub fn subscribe(&mut self, listener: EventListener) {
        self.listeners.push(listener);
    }

    fn emit(&mut self, events: Vec<SessionEvent>) {
        for event in &events {
            tracing::debug!(?event, "session event");
            for listener in self.listeners.iter_mut() {
                listener(event);
            }
        }
    }

    // ---- queries ----

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn workout(&self) -> Option<&Workout> {
        self.active.as_ref().map(|s| &s.workout)
    }

    pub fn current_exercise_index(&self) -> Option<usize> {
        self.active.as_ref().and_then(|s| s.current_index().ok())
    }

    pub fn current_exercise(&self) -> Option<&Exercise> {
        let session = self.active.as_ref()?;
        let index = session.current_index().ok()?;
        session.workout.exercises.get(index)
    }

    pub fn phase(&self) -> Option<SessionPhase> {
        self.active.as_ref().map(|s| s.phase)
    }

    pub fn workout_elapsed(&self) -> Duration {
        self.active
            .as_ref()
            .map(|s| s.workout_timer.elapsed(self.clock.now()))
            .unwrap_or_else(Duration::zero)
    }

    pub fn is_workout_timer_paused(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|s| s.workout_timer.is_paused())
    }

    pub fn rest_state(&self) -> RestState {
        self.active
            .as_ref()
            .map(|s| s.rest.state())
            .unwrap_or(RestState::Idle)
    }

    /// Remaining rest while a countdown is running
    pub fn rest_remaining(&self) -> Option<Duration> {
        let session = self.active.as_ref()?;
        session
            .rest
            .is_active()
            .then(|| session.rest.remaining(self.clock.now()))
    }

    pub fn pending_advance_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().and_then(|s| s.pending_advance_at)
    }

    pub fn can_undo(&self) -> bool {
        let now = self.clock.now();
        self.active
            .as_ref()
            .and_then(|s| s.undo.as_ref())
            .is_some_and(|u| now - u.recorded_at <= self.config.undo_window())
    }

    pub fn session_prs(&self) -> &[PrAchievement] {
        self.active.as_ref().map(|s| s.prs.as_slice()).unwrap_or(&[])
    }

    pub fn suggested_weight(&self, exercise: &str) -> Option<LastWeight> {
        self.load_last_weights().remove(exercise)
    }

    // ---- workout structure ----

    pub fn start_workout(&mut self, name: &str, exercises: Vec<Exercise>) -> EngineResult<()> {
        if self.active.is_some() {
            return Err(EngineError::SessionAlreadyActive);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("workout name is empty".into()));
        }
        let now = self.clock.now();
        let exercises = exercises.into_iter().map(normalize_exercise).collect();
        let workout = Workout::new(name, exercises, now);
        tracing::info!(
            workout = %workout.name,
            exercises = workout.exercises.len(),
            "workout started"
        );
        self.active = Some(ActiveSession {
            workout,
            progression: Progression::new(),
            workout_timer: WorkoutTimer::start(now),
            rest: RestTimer::new(),
            pending_advance_at: None,
            paused_for_rest: false,
            undo: None,
            prs: Vec::new(),
            phase: SessionPhase::Lifting,
        });
        self.persist();
        Ok(())
    }

    pub fn add_exercise(&mut self, exercise: Exercise) -> EngineResult<usize> {
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        if exercise.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("exercise name is empty".into()));
        }
        session.workout.exercises.push(normalize_exercise(exercise));
        let index = session.workout.exercises.len() - 1;
        tracing::debug!(index, "exercise added");
        self.persist();
        Ok(index)
    }

    pub fn remove_exercise(&mut self, index: usize) -> EngineResult<Exercise> {
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        if index >= session.workout.exercises.len() {
            return Err(EngineError::InvalidInput(format!(
                "no exercise at position {}",
                index + 1
            )));
        }
        let removed = session.workout.exercises.remove(index);
        let len = session.workout.exercises.len();
        session.progression.on_removed(index, len);
        session.undo = None;
        tracing::debug!(index, exercise = %removed.name, "exercise removed");
        self.persist();
        Ok(removed)
    }

    pub fn move_exercise(&mut self, from: usize, to: usize) -> EngineResult<()> {
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let len = session.workout.exercises.len();
        if from >= len || to >= len {
            return Err(EngineError::InvalidInput("exercise position out of range".into()));
        }
        if from == to {
            return Ok(());
        }
        let exercise = session.workout.exercises.remove(from);
        session.workout.exercises.insert(to, exercise);
        session.progression.on_moved(from, to, len);
        session.undo = None;
        self.persist();
        Ok(())
    }

    /// Manual jump to another exercise; false when out of range.
    pub fn select_exercise(&mut self, index: usize) -> bool {
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        let len = session.workout.exercises.len();
        let previous = session.progression.current_index();
        if !session.progression.select(index, len) {
            return false;
        }
        if previous != Some(index) {
            // undo would drag progression back to the exercise just left
            session.undo = None;
        }
        self.persist();
        true
    }

    /// Renames the current exercise to one of its alternatives, keeping its sets
    pub fn switch_to_alternative(&mut self, name: &str) -> EngineResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("exercise name is empty".into()));
        }
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let index = session.current_index()?;
        let exercise = &mut session.workout.exercises[index];
        let previous = std::mem::replace(&mut exercise.name, name.to_string());
        exercise.alternatives.retain(|a| a != name);
        if previous != name {
            exercise.alternatives.push(previous.clone());
        }
        if let Some(undo) = session.undo.as_mut().filter(|u| u.exercise_index == index) {
            undo.exercise = name.to_string();
        }
        tracing::info!(from = %previous, to = name, "switched exercise");
        self.persist();
        Ok(())
    }

    /// `None` falls back to the configured defaults
    pub fn configure_dropsets(
        &mut self,
        enabled: bool,
        count: Option<u32>,
        reduction_per_drop: Option<f64>,
    ) -> EngineResult<()> {
        let count = count.unwrap_or(self.config.default_dropsets);
        let reduction = reduction_per_drop.unwrap_or(self.config.default_weight_reduction);
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let index = session.current_index()?;
        let exercise = &mut session.workout.exercises[index];
        if exercise.is_hold() {
            return Err(EngineError::WrongExerciseKind);
        }
        let config = DropsetConfig {
            enabled,
            count,
            reduction_per_drop: reduction,
        };
        let (count, reduction_per_drop) = config.normalized();
        exercise.dropsets = DropsetConfig {
            enabled,
            count,
            reduction_per_drop,
        };
        self.persist();
        Ok(())
    }

    // ---- set completion ----

    pub fn complete_set(&mut self, weight: f64, reps: u32, is_warmup: bool) -> EngineResult<SetOutcome> {
        let now = self.clock.now();
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let index = session.current_index()?;
        let exercise = &session.workout.exercises[index];
        if exercise.is_hold() {
            return Err(EngineError::WrongExerciseKind);
        }

        let mut updated = match ledger::append_working_set(exercise, weight, reps, is_warmup) {
            Ok(updated) => updated,
            Err(err) => {
                tracing::warn!(exercise = %exercise.name, weight, reps, error = %err, "set rejected");
                return Err(err);
            }
        };
        let set_number = updated.sets.last().map(|s| s.set_number).unwrap_or_default();
        let mut events = Vec::new();

        if is_warmup {
            session.workout.exercises[index] = updated;
            events.push(SessionEvent::SetCompleted {
                exercise_index: index,
                exercise: session.workout.exercises[index].name.clone(),
                set_number,
                weight,
                reps,
                is_warmup: true,
                dropsets: 0,
            });
            self.persist();
            self.emit(events);
            return Ok(SetOutcome {
                exercise_index: index,
                set_number,
                dropsets: 0,
                is_pr: false,
                advanced_to: None,
                summary: None,
            });
        }

        let entries_before = exercise.non_warmup_len();
        let drops = ledger::expand_dropsets(&updated, weight, reps);
        let dropsets = drops.len();
        updated.sets.extend(drops);
        let name = updated.name.clone();
        session.workout.exercises[index] = updated;
        tracing::info!(exercise = %name, set_number, weight, reps, dropsets, "set completed");

        let pr = evaluate_pr(self.services.records.as_ref(), &name, weight, reps, now);
        let is_pr = pr.is_some();
        session.undo = Some(UndoEntry {
            exercise_index: index,
            exercise: name.clone(),
            entries_before,
            was_pr: is_pr,
            recorded_at: now,
        });

        let transition = session.progression.evaluate(&session.workout, index);
        events.push(SessionEvent::SetCompleted {
            exercise_index: index,
            exercise: name.clone(),
            set_number,
            weight,
            reps,
            is_warmup: false,
            dropsets,
        });
        if let Some(pr) = pr {
            session.prs.push(pr.clone());
            events.push(SessionEvent::PrAchieved(pr));
        }

        self.save_last_weight(&name, weight, reps);
        let (advanced_to, summary) = self.after_completion(transition, now, &mut events);
        self.persist();
        self.emit(events);
        Ok(SetOutcome {
            exercise_index: index,
            set_number,
            dropsets,
            is_pr,
            advanced_to,
            summary,
        })
    }

    pub fn complete_hold_set(&mut self, hold_secs: u32) -> EngineResult<SetOutcome> {
        let now = self.clock.now();
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let index = session.current_index()?;
        let exercise = &session.workout.exercises[index];
        if !exercise.is_hold() {
            return Err(EngineError::WrongExerciseKind);
        }
        let updated = match ledger::append_hold_set(exercise, hold_secs) {
            Ok(updated) => updated,
            Err(err) => {
                tracing::warn!(exercise = %exercise.name, hold_secs, error = %err, "hold rejected");
                return Err(err);
            }
        };
        let entries_before = exercise.non_warmup_len();
        let set_number = updated.sets.last().map(|s| s.set_number).unwrap_or_default();
        let name = updated.name.clone();
        session.workout.exercises[index] = updated;
        session.undo = Some(UndoEntry {
            exercise_index: index,
            exercise: name.clone(),
            entries_before,
            was_pr: false,
            recorded_at: now,
        });
        let transition = session.progression.evaluate(&session.workout, index);

        let mut events = vec![SessionEvent::SetCompleted {
            exercise_index: index,
            exercise: name,
            set_number,
            weight: 0.0,
            reps: 0,
            is_warmup: false,
            dropsets: 0,
        }];
        let (advanced_to, summary) = self.after_completion(transition, now, &mut events);
        self.persist();
        self.emit(events);
        Ok(SetOutcome {
            exercise_index: index,
            set_number,
            dropsets: 0,
            is_pr: false,
            advanced_to,
            summary,
        })
    }

    fn after_completion(
        &mut self,
        transition: Transition,
        now: DateTime<Utc>,
        events: &mut Vec<SessionEvent>,
    ) -> (Option<usize>, Option<WorkoutSummary>) {
        match transition {
            Transition::Finished => (None, self.finish_inner(now, events)),
            Transition::Advanced { from, to } => {
                tracing::info!(from, to, "advanced to next exercise");
                events.push(SessionEvent::ExerciseAdvanced { from, to });
                self.begin_rest(now, events);
                (Some(to), None)
            }
            Transition::Stay => {
                self.begin_rest(now, events);
                (None, None)
            }
        }
    }

    /// Prepends warm-ups to the current exercise; returns how many were added.
    pub fn add_warmup_sets(&mut self, working_weight: f64, reps: u32) -> EngineResult<usize> {
        ledger::validate_set(working_weight, reps, false)?;
        let session = self.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let index = session.current_index()?;
        let exercise = &session.workout.exercises[index];
        if exercise.is_hold() {
            return Err(EngineError::WrongExerciseKind);
        }
        let updated = ledger::insert_warmup_sets(
            exercise,
            working_weight,
            reps,
            &self.config.warmup_percentages,
        );
        let added = updated.sets.len() - exercise.sets.len();
        session.workout.exercises[index] = updated;
        if added > 0 {
            tracing::debug!(added, "warm-up sets inserted");
            self.persist();
        }
        Ok(added)
    }

    /// Reverts the most recent working set and its dropsets while the undo
    /// window is open.
    pub fn undo_last_set(&mut self) -> bool {
        let now = self.clock.now();
        let window = self.config.undo_window();
        let grace = self.config.pr_grace();
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        let Some(entry) = session.undo.take() else {
            return false;
        };
        if now - entry.recorded_at > window {
            tracing::debug!("undo window expired");
            self.persist();
            return false;
        }
        let Some(exercise) = session.workout.exercises.get(entry.exercise_index) else {
            self.persist();
            return false;
        };
        let removed = exercise.non_warmup_len().saturating_sub(entry.entries_before);
        if removed == 0 {
            self.persist();
            return false;
        }
        session.workout.exercises[entry.exercise_index] =
            ledger::remove_most_recent_working(exercise, removed);

        let len = session.workout.exercises.len();
        if session
            .progression
            .current_index()
            .is_some_and(|current| current > entry.exercise_index)
        {
            session.progression.reopen(entry.exercise_index, len);
        }

        let mut pr_removed = false;
        if entry.was_pr {
            pr_removed = match self
                .services
                .records
                .remove_latest_since(&entry.exercise, now - grace)
            {
                Ok(removed) => removed,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to remove personal record");
                    false
                }
            };
            if let Some(pos) = session.prs.iter().rposition(|p| p.exercise == entry.exercise) {
                session.prs.remove(pos);
            }
        }
        tracing::info!(
            exercise = %entry.exercise,
            removed,
            pr_removed,
            "set undone"
        );
        let events = vec![SessionEvent::SetUndone {
            exercise_index: entry.exercise_index,
            removed,
            pr_removed,
        }];
        self.persist();
        self.emit(events);
        true
    }

    // ---- rest ----

    fn begin_rest(&mut self, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        let auto_after = self.config.auto_advance_after();
        let rest_duration = self.config.rest_duration();
        let delay = self.config.auto_advance_delay();
        let pause_timer = self.config.pause_timer_during_rest;
        let Some(session) = self.active.as_mut() else {
            return;
        };

        session.rest = RestTimer::new();
        session.pending_advance_at = None;
        let total_secs = match auto_after {
            Some(min_rest) if min_rest <= Duration::zero() => {
                session.pending_advance_at = Some(now + delay);
                0
            }
            _ => {
                if let Err(err) = session.rest.start(rest_duration, now) {
                    tracing::warn!(error = %err, "rest timer not started");
                    return;
                }
                rest_duration.num_seconds()
            }
        };
        if pause_timer && !session.paused_for_rest {
            session.paused_for_rest = session.workout_timer.pause(now);
        }
        session.set_phase(SessionPhase::Resting, events);
        events.push(SessionEvent::RestStarted { total_secs });
        tracing::debug!(total_secs, "rest started");

        if total_secs > 0 {
            self.reschedule_notification(rest_duration);
        } else {
            self.cancel_notifications();
        }
    }

    /// Side effects shared by every way a rest period can end.
    ///
    /// `ended_at` is when the rest actually ran out; a workout timer paused
    /// for the rest counts again from that instant.
    fn end_rest(
        &mut self,
        outcome: RestOutcome,
        ended_at: DateTime<Utc>,
        events: &mut Vec<SessionEvent>,
    ) {
        let Some(session) = self.active.as_mut() else {
            return;
        };
        session.pending_advance_at = None;
        if session.paused_for_rest {
            session.workout_timer.resume(ended_at);
            session.paused_for_rest = false;
        }
        events.push(SessionEvent::RestFinished { outcome });
        session.set_phase(SessionPhase::Lifting, events);
        tracing::info!(%outcome, "rest finished");
        self.cancel_notifications();
        store::remove(self.services.store.as_ref(), KEY_REST_TIMER);
    }

    fn finish_rest_with(&mut self, outcome: RestOutcome) -> bool {
        let now = self.clock.now();
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        let finished = if session.rest.is_active() {
            let ended = match outcome {
                RestOutcome::Skipped => session.rest.skip(),
                RestOutcome::Completed => session.rest.complete(),
                RestOutcome::AutoAdvanced => Some(session.rest.auto_advance()),
            };
            ended.is_some()
        } else {
            session.pending_advance_at.is_some()
        };
        if !finished {
            return false;
        }
        let mut events = Vec::new();
        self.end_rest(outcome, now, &mut events);
        self.persist();
        self.emit(events);
        true
    }

    pub fn skip_rest(&mut self) -> bool {
        self.finish_rest_with(RestOutcome::Skipped)
    }

    pub fn complete_rest(&mut self) -> bool {
        self.finish_rest_with(RestOutcome::Completed)
    }

    pub fn extend_rest(&mut self, secs: i64) -> EngineResult<bool> {
        if secs <= 0 || secs > i64::from(MAX_REST_SECS) {
            return Err(EngineError::InvalidDuration(secs));
        }
        let now = self.clock.now();
        let Some(session) = self.active.as_mut() else {
            return Ok(false);
        };
        if !session.rest.extend(Duration::seconds(secs)) {
            return Ok(false);
        }
        let remaining = session.rest.remaining(now);
        tracing::debug!(secs, remaining_secs = remaining.num_seconds(), "rest extended");
        self.reschedule_notification(remaining);
        self.persist();
        Ok(true)
    }

    pub fn reduce_rest(&mut self, secs: i64) -> EngineResult<bool> {
        if secs <= 0 || secs > i64::from(MAX_REST_SECS) {
            return Err(EngineError::InvalidDuration(secs));
        }
        let now = self.clock.now();
        let Some(session) = self.active.as_mut() else {
            return Ok(false);
        };
        if !session.rest.is_active() {
            return Ok(false);
        }
        match session.rest.reduce(Duration::seconds(secs), now) {
            Some(outcome) => {
                let mut events = Vec::new();
                self.end_rest(outcome, now, &mut events);
                self.persist();
                self.emit(events);
            }
            None => {
                let remaining = session.rest.remaining(now);
                self.reschedule_notification(remaining);
                self.persist();
            }
        }
        Ok(true)
    }

    /// Advances time-driven state; returns how a rest ended, if one did.
    pub fn tick(&mut self) -> Option<RestOutcome> {
        let now = self.clock.now();
        let auto_after = self.config.auto_advance_after();
        let window = self.config.undo_window();
        let session = self.active.as_mut()?;

        if session
            .undo
            .as_ref()
            .is_some_and(|u| now - u.recorded_at > window)
        {
            session.undo = None;
            tracing::debug!("undo entry expired");
        }

        let (outcome, ended_at) = match session.pending_advance_at {
            Some(deadline) if now >= deadline => Some((session.rest.auto_advance(), deadline)),
            Some(_) => None,
            None => session.rest.tick(now, auto_after),
        }?;
        let mut events = Vec::new();
        self.end_rest(outcome, ended_at, &mut events);
        self.persist();
        self.emit(events);
        Some(outcome)
    }

    // ---- workout timer ----

    pub fn pause_workout_timer(&mut self) -> bool {
        let now = self.clock.now();
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        if !session.workout_timer.pause(now) {
            return false;
        }
        tracing::debug!("workout timer paused");
        self.persist();
        true
    }

    pub fn resume_workout_timer(&mut self) -> bool {
        let now = self.clock.now();
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        if !session.workout_timer.resume(now) {
            return false;
        }
        session.paused_for_rest = false;
        tracing::debug!("workout timer resumed");
        self.persist();
        true
    }

    pub fn reset_workout_timer(&mut self) -> bool {
        let now = self.clock.now();
        let Some(session) = self.active.as_mut() else {
            return false;
        };
        session.workout_timer.reset(now);
        session.paused_for_rest = false;
        tracing::info!("workout timer reset");
        self.persist();
        true
    }

    // ---- lifecycle ----

    pub fn finish_workout(&mut self) -> EngineResult<WorkoutSummary> {
        if self.active.is_none() {
            return Err(EngineError::NoActiveSession);
        }
        let now = self.clock.now();
        let mut events = Vec::new();
        let summary = self
            .finish_inner(now, &mut events)
            .ok_or(EngineError::NoActiveSession)?;
        self.emit(events);
        Ok(summary)
    }

    fn finish_inner(&mut self, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) -> Option<WorkoutSummary> {
        let mut session = self.active.take()?;
        if session.rest.is_active() {
            session.rest.skip();
        }
        session.pending_advance_at = None;
        let duration = session.workout_timer.stop(now);

        let workout = &session.workout;
        let summary = WorkoutSummary {
            name: workout.name.clone(),
            started_at: workout.started_at,
            finished_at: now,
            duration_secs: duration.num_seconds(),
            exercise_count: workout.performed_exercise_count(),
            total_sets: workout.total_sets(),
            total_volume: workout.total_volume(),
            prs: std::mem::take(&mut session.prs),
        };
        session.set_phase(SessionPhase::Finished, events);
        events.push(SessionEvent::SessionFinished(summary.clone()));
        tracing::info!(
            workout = %summary.name,
            duration_secs = summary.duration_secs,
            total_sets = summary.total_sets,
            total_volume = summary.total_volume,
            "workout finished"
        );

        if let Err(err) = self.services.history.record_workout(&summary) {
            tracing::warn!(error = %err, "failed to record workout history");
        }
        self.cancel_notifications();
        self.clear_durable_session();
        Some(summary)
    }

    /// Abandons the workout without recording statistics
    pub fn cancel_workout(&mut self) -> EngineResult<()> {
        let mut session = self.active.take().ok_or(EngineError::NoActiveSession)?;
        let now = self.clock.now();
        session.rest.skip();
        session.workout_timer.stop(now);
        tracing::info!(workout = %session.workout.name, "workout cancelled");
        self.cancel_notifications();
        self.clear_durable_session();
        self.emit(vec![SessionEvent::WorkoutCancelled]);
        Ok(())
    }

    // ---- suspension ----

    /// Writes both timer anchors with the values observed right now
    pub fn suspend(&mut self) {
        if self.active.is_none() {
            return;
        }
        tracing::debug!("suspending session");
        self.persist();
    }

    /// Rebuilds the session from the durable store, reconciling timers
    /// against the current wall clock.
    pub fn resume(&mut self) {
        let now = self.clock.now();
        let store = self.services.store.as_ref();
        let Some(snapshot) = store::load_json::<SessionSnapshot>(store, KEY_SESSION) else {
            self.active = None;
            store::remove(store, KEY_EXERCISE_INDEX);
            store::remove(store, KEY_WORKOUT_TIMER);
            store::remove(store, KEY_REST_TIMER);
            return;
        };

        let len = snapshot.workout.exercises.len();
        let mut progression =
            store::load_json::<Progression>(store, KEY_EXERCISE_INDEX).unwrap_or_default();
        if let Some(index) = progression.current_index() {
            if index >= len && len > 0 {
                tracing::warn!(index, len, "stored exercise index out of range; clamping");
                progression = Progression::at(len - 1);
            }
        }

        let workout_anchor = store::load_json::<TimerAnchor>(store, KEY_WORKOUT_TIMER)
            .unwrap_or_else(|| TimerAnchor {
                started_at: snapshot.workout.started_at,
                total_duration_ms: None,
                paused_accumulated_ms: 0,
                pause_started_at: None,
                saved_remaining_ms: None,
                saved_at: now,
            });
        let workout_timer = WorkoutTimer::from_anchor(&workout_anchor, now);

        let mut rest = RestTimer::new();
        let mut expired_at = None;
        let mut reschedule = None;
        if let Some(anchor) = store::load_json::<TimerAnchor>(store, KEY_REST_TIMER) {
            match reconcile_rest(&anchor, now, self.config.reconcile_epsilon()) {
                RestRestore::Running {
                    started_at,
                    total,
                    remaining,
                    corrected,
                } => {
                    rest.resume_from(started_at, total);
                    reschedule = Some(remaining);
                    tracing::info!(
                        remaining_secs = ceil_secs(remaining),
                        corrected,
                        "rest timer restored"
                    );
                }
                RestRestore::Expired {
                    ended_at,
                    corrected,
                } => {
                    expired_at = Some(ended_at);
                    tracing::info!(%ended_at, corrected, "rest timer ran out while suspended");
                }
                RestRestore::Invalid => {
                    tracing::warn!("discarding invalid rest anchor");
                    store::remove(store, KEY_REST_TIMER);
                }
            }
        }

        let resting =
            rest.is_active() || expired_at.is_some() || snapshot.pending_advance_at.is_some();
        self.active = Some(ActiveSession {
            workout: snapshot.workout,
            progression,
            workout_timer,
            rest,
            pending_advance_at: snapshot.pending_advance_at,
            paused_for_rest: snapshot.paused_for_rest,
            undo: snapshot.undo,
            prs: snapshot.prs,
            phase: if resting {
                SessionPhase::Resting
            } else {
                SessionPhase::Lifting
            },
        });
        tracing::info!(elapsed_secs = self.workout_elapsed().num_seconds(), "session restored");

        if let Some(ended_at) = expired_at {
            let mut events = Vec::new();
            self.end_rest(RestOutcome::Completed, ended_at, &mut events);
            self.persist();
            self.emit(events);
        } else {
            if let Some(remaining) = reschedule {
                self.reschedule_notification(remaining);
            }
            self.persist();
        }
        self.tick();
    }

    // ---- persistence ----

    fn persist(&self) {
        let Some(session) = self.active.as_ref() else {
            return;
        };
        let now = self.clock.now();
        let store = self.services.store.as_ref();
        let snapshot = SessionSnapshot {
            workout: session.workout.clone(),
            undo: session.undo.clone(),
            pending_advance_at: session.pending_advance_at,
            paused_for_rest: session.paused_for_rest,
            prs: session.prs.clone(),
        };
        store::save_json(store, KEY_SESSION, &snapshot);
        store::save_json(store, KEY_EXERCISE_INDEX, &session.progression);
        store::save_json(store, KEY_WORKOUT_TIMER, &session.workout_timer.to_anchor(now));
        match session.rest.to_anchor(now) {
            Some(anchor) => {
                store::save_json(store, KEY_REST_TIMER, &anchor);
            }
            None => store::remove(store, KEY_REST_TIMER),
        }
    }

    fn clear_durable_session(&self) {
        let store = self.services.store.as_ref();
        for key in [KEY_SESSION, KEY_EXERCISE_INDEX, KEY_WORKOUT_TIMER, KEY_REST_TIMER] {
            store::remove(store, key);
        }
    }

    fn load_last_weights(&self) -> HashMap<String, LastWeight> {
        store::load_json(self.services.store.as_ref(), KEY_LAST_WEIGHTS).unwrap_or_default()
    }

    fn save_last_weight(&self, exercise: &str, weight: f64, reps: u32) {
        let mut weights = self.load_last_weights();
        weights.insert(exercise.to_string(), LastWeight { weight, reps });
        store::save_json(self.services.store.as_ref(), KEY_LAST_WEIGHTS, &weights);
    }

    fn reschedule_notification(&self, remaining: Duration) {
        self.cancel_notifications();
        if !self.config.notifications_enabled {
            return;
        }
        let secs = ceil_secs(max_zero(remaining));
        if secs <= 0 {
            return;
        }
        if let Err(err) = self
            .services
            .notifier
            .schedule(secs as u64, REST_DONE_TITLE, REST_DONE_BODY)
        {
            tracing::warn!(error = %err, "failed to schedule rest notification");
        }
    }

    fn cancel_notifications(&self) {
        if let Err(err) = self.services.notifier.cancel_all() {
            tracing::warn!(error = %err, "failed to cancel notifications");
        }
    }
}

fn normalize_exercise(mut exercise: Exercise) -> Exercise {
    exercise.name = exercise.name.trim().to_string();
    exercise.target_sets = exercise.target_sets.clamp(MIN_SETS, MAX_SETS);
    exercise.sync_current_set();
    exercise
}

/// Compares against the stored best. The very first entry seeds the registry
/// without counting as a PR.
fn evaluate_pr(
    records: &dyn RecordRegistry,
    exercise: &str,
    weight: f64,
    reps: u32,
    now: DateTime<Utc>,
) -> Option<PrAchievement> {
    let best = match records.best_record(exercise) {
        Ok(best) => best,
        Err(err) => {
            tracing::warn!(exercise, error = %err, "failed to read personal records");
            return None;
        }
    };
    let record = PersonalRecord {
        exercise: exercise.to_string(),
        weight,
        reps,
        achieved_at: now,
    };
    let is_pr = match &best {
        None => false,
        Some(best) if best.is_beaten_by(weight, reps) => true,
        Some(_) => return None,
    };
    if let Err(err) = records.record(&record) {
        tracing::warn!(exercise, error = %err, "failed to store personal record");
        return None;
    }
    if !is_pr {
        tracing::debug!(exercise, weight, reps, "seeded personal record");
        return None;
    }
    tracing::info!(exercise, weight, reps, "new personal record");
    Some(PrAchievement {
        exercise: record.exercise,
        weight,
        reps,
        achieved_at: now,
    })
}
