use crate::error::ServiceResult;
use rusqlite::Connection;
use std::path::Path;
use std::rc::Rc;

/// One SQLite connection shared by the key/value store, the PR registry and
/// the workout history
#[derive(Debug, Clone)]
pub struct Database {
    conn: Rc<Connection>,
}

impl Database {
    /// Open (creating if needed) the database file and its tables
    pub fn open<P: AsRef<Path>>(path: P) -> ServiceResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> ServiceResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ServiceResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS personal_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exercise TEXT NOT NULL,
                weight REAL NOT NULL,
                reps INTEGER NOT NULL,
                achieved_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_personal_records_exercise
                ON personal_records(exercise);

            CREATE TABLE IF NOT EXISTS workout_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                exercise_count INTEGER NOT NULL,
                total_sets INTEGER NOT NULL,
                total_volume REAL NOT NULL,
                prs TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_workout_history_finished
                ON workout_history(finished_at);
            "#,
        )?;
        Ok(Self {
            conn: Rc::new(conn),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
