use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::models::PersonalRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::cell::RefCell;
use std::rc::Rc;

/// Read/write contract for personal records
pub trait RecordRegistry {
    /// Best entry for the exercise, by weight then reps
    fn best_record(&self, exercise: &str) -> ServiceResult<Option<PersonalRecord>>;
    fn record(&self, record: &PersonalRecord) -> ServiceResult<()>;
    /// Removes the most recently added entry for the exercise if it was
    /// achieved at or after `cutoff`. Returns whether anything was removed.
    fn remove_latest_since(&self, exercise: &str, cutoff: DateTime<Utc>) -> ServiceResult<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    records: Rc<RefCell<Vec<PersonalRecord>>>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self, exercise: &str) -> Vec<PersonalRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.exercise == exercise)
            .cloned()
            .collect()
    }
}

impl RecordRegistry for MemoryRecords {
    fn best_record(&self, exercise: &str) -> ServiceResult<Option<PersonalRecord>> {
        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|r| r.exercise == exercise)
            .max_by(|a, b| {
                a.weight
                    .total_cmp(&b.weight)
                    .then_with(|| a.reps.cmp(&b.reps))
            })
            .cloned())
    }

    fn record(&self, record: &PersonalRecord) -> ServiceResult<()> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }

    fn remove_latest_since(&self, exercise: &str, cutoff: DateTime<Utc>) -> ServiceResult<bool> {
        let mut records = self.records.borrow_mut();
        let latest = records
            .iter()
            .enumerate()
            .rev()
            .find(|(_, r)| r.exercise == exercise)
            .map(|(i, r)| (i, r.achieved_at));
        match latest {
            Some((idx, at)) if at >= cutoff => {
                records.remove(idx);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Personal records stored in the shared SQLite database
#[derive(Debug, Clone)]
pub struct SqliteRecords {
    db: Database,
}

impl SqliteRecords {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every record for the exercise, newest first
    pub fn history(&self, exercise: &str) -> ServiceResult<Vec<PersonalRecord>> {
        let mut stmt = self.db.connection().prepare(
            r#"
            SELECT exercise, weight, reps, achieved_at
            FROM personal_records
            WHERE exercise = ?1
            ORDER BY id DESC
            "#,
        )?;
        let rows = stmt.query_map([exercise], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (exercise, weight, reps, achieved_at) = row?;
            records.push(PersonalRecord {
                exercise,
                weight,
                reps,
                achieved_at: parse_timestamp(&achieved_at)?,
            });
        }
        Ok(records)
    }
}

fn parse_timestamp(value: &str) -> ServiceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| ServiceError::Storage(format!("bad timestamp {value:?}: {err}")))
}

impl RecordRegistry for SqliteRecords {
    fn best_record(&self, exercise: &str) -> ServiceResult<Option<PersonalRecord>> {
        let row = self
            .db
            .connection()
            .query_row(
                r#"
                SELECT exercise, weight, reps, achieved_at
                FROM personal_records
                WHERE exercise = ?1
                ORDER BY weight DESC, reps DESC, id DESC
                LIMIT 1
                "#,
                [exercise],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(exercise, weight, reps, achieved_at)| -> ServiceResult<PersonalRecord> {
            Ok(PersonalRecord {
                exercise,
                weight,
                reps,
                achieved_at: parse_timestamp(&achieved_at)?,
            })
        })
        .transpose()
    }

    fn record(&self, record: &PersonalRecord) -> ServiceResult<()> {
        self.db.connection().execute(
            r#"
            INSERT INTO personal_records (exercise, weight, reps, achieved_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.exercise,
                record.weight,
                record.reps,
                record.achieved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn remove_latest_since(&self, exercise: &str, cutoff: DateTime<Utc>) -> ServiceResult<bool> {
        let latest = self
            .db
            .connection()
            .query_row(
                "SELECT id, achieved_at FROM personal_records WHERE exercise = ?1 ORDER BY id DESC LIMIT 1",
                [exercise],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((id, achieved_at)) = latest else {
            return Ok(false);
        };
        if parse_timestamp(&achieved_at)? < cutoff {
            return Ok(false);
        }
        self.db
            .connection()
            .execute("DELETE FROM personal_records WHERE id = ?1", [id])?;
        Ok(true)
    }
}
