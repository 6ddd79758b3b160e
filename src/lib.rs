// Library surface for the command-line host and integration tests.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod anchor;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod history;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod progression;
pub mod records;
pub mod rest_timer;
pub mod restore;
pub mod runtime;
pub mod session;
pub mod store;
pub mod util;
pub mod workout_timer;

pub use error::{EngineError, EngineResult, ServiceError, ServiceResult};
pub use session::{SessionEngine, Services};
