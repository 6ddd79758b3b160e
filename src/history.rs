use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::events::PrAchievement;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Statistics for one finished workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub exercise_count: u32,
    pub total_sets: u32,
    pub total_volume: f64,
    #[serde(default)]
    pub prs: Vec<PrAchievement>,
}

pub trait HistorySink {
    fn record_workout(&self, summary: &WorkoutSummary) -> ServiceResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    workouts: Rc<RefCell<Vec<WorkoutSummary>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workouts(&self) -> Vec<WorkoutSummary> {
        self.workouts.borrow().clone()
    }
}

impl HistorySink for MemoryHistory {
    fn record_workout(&self, summary: &WorkoutSummary) -> ServiceResult<()> {
        self.workouts.borrow_mut().push(summary.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteHistory {
    db: Database,
}

impl SqliteHistory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recently finished workouts first
    pub fn list_recent(&self, limit: usize) -> ServiceResult<Vec<WorkoutSummary>> {
        let mut stmt = self.db.connection().prepare(
            r#"
            SELECT name, started_at, finished_at, duration_secs, exercise_count,
                   total_sets, total_volume, prs
            FROM workout_history
            ORDER BY finished_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name, started, finished, duration_secs, exercise_count, total_sets, volume, prs) =
                row?;
            out.push(WorkoutSummary {
                name,
                started_at: parse_timestamp(&started)?,
                finished_at: parse_timestamp(&finished)?,
                duration_secs,
                exercise_count,
                total_sets,
                total_volume: volume,
                prs: serde_json::from_str(&prs)?,
            });
        }
        Ok(out)
    }
}

fn parse_timestamp(value: &str) -> ServiceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| ServiceError::History(format!("bad timestamp {value:?}: {err}")))
}

impl HistorySink for SqliteHistory {
    fn record_workout(&self, summary: &WorkoutSummary) -> ServiceResult<()> {
        let prs = serde_json::to_string(&summary.prs)?;
        self.db.connection().execute(
            r#"
            INSERT INTO workout_history (
                name, started_at, finished_at, duration_secs, exercise_count,
                total_sets, total_volume, prs
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                summary.name,
                summary.started_at.to_rfc3339(),
                summary.finished_at.to_rfc3339(),
                summary.duration_secs,
                summary.exercise_count,
                summary.total_sets,
                summary.total_volume,
                prs,
            ],
        )?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    name: &'a str,
    started_at: String,
    finished_at: String,
    duration_secs: i64,
    exercise_count: u32,
    total_sets: u32,
    total_volume: f64,
    prs: usize,
}

/// Writes one CSV row per workout, with a header
pub fn export_csv<W: Write>(summaries: &[WorkoutSummary], out: W) -> ServiceResult<()> {
    let mut writer = csv::Writer::from_writer(out);
    for s in summaries {
        writer.serialize(CsvRow {
            name: &s.name,
            started_at: s.started_at.to_rfc3339(),
            finished_at: s.finished_at.to_rfc3339(),
            duration_secs: s.duration_secs,
            exercise_count: s.exercise_count,
            total_sets: s.total_sets,
            total_volume: s.total_volume,
            prs: s.prs.len(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
