use crate::error::ServiceResult;
use std::cell::RefCell;
use std::rc::Rc;

pub const REST_DONE_TITLE: &str = "Rest Timer Complete";
pub const REST_DONE_BODY: &str = "Your rest period is over. Time for the next set.";

/// Schedules the rest-expiry notification on the host platform
pub trait NotificationScheduler {
    fn schedule(&self, after_secs: u64, title: &str, body: &str) -> ServiceResult<()>;
    fn cancel_all(&self) -> ServiceResult<()>;
}

/// Used when notifications are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl NotificationScheduler for NoopScheduler {
    fn schedule(&self, _after_secs: u64, _title: &str, _body: &str) -> ServiceResult<()> {
        Ok(())
    }

    fn cancel_all(&self) -> ServiceResult<()> {
        Ok(())
    }
}

/// Writes scheduling requests to the log; the terminal host has no
/// notification center to hand them to.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogScheduler;

impl NotificationScheduler for LogScheduler {
    fn schedule(&self, after_secs: u64, title: &str, body: &str) -> ServiceResult<()> {
        tracing::info!(after_secs, title, body, "rest notification scheduled");
        Ok(())
    }

    fn cancel_all(&self) -> ServiceResult<()> {
        tracing::debug!("rest notifications cancelled");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    Notify { after_secs: u64, title: String },
    CancelAll,
}

/// Keeps every call for inspection; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingScheduler {
    calls: Rc<RefCell<Vec<Scheduled>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Scheduled> {
        self.calls.borrow().clone()
    }

    /// Delay of the most recent schedule request, if any
    pub fn last_scheduled(&self) -> Option<u64> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            Scheduled::Notify { after_secs, .. } => Some(*after_secs),
            Scheduled::CancelAll => None,
        })
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl NotificationScheduler for RecordingScheduler {
    fn schedule(&self, after_secs: u64, title: &str, _body: &str) -> ServiceResult<()> {
        self.calls.borrow_mut().push(Scheduled::Notify {
            after_secs,
            title: title.to_string(),
        });
        Ok(())
    }

    fn cancel_all(&self) -> ServiceResult<()> {
        self.calls.borrow_mut().push(Scheduled::CancelAll);
        Ok(())
    }
}
