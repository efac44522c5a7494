//! services/client/src/app/notice.rs
//!
//! User-facing notices for failed operations.

use docqa_core::ports::PortError;
use std::time::Duration;
use tokio::time::Instant;

pub const GENERIC_FAILURE_NOTICE: &str = "Something went wrong. Please try again in a moment.";
pub const UNAUTHORIZED_NOTICE: &str = "You are not allowed to do that.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    /// `None` means the notice stays until dismissed.
    pub dismiss_after: Option<Duration>,
}

impl Notice {
    pub fn sticky(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dismiss_after: None,
        }
    }

    pub fn transient(message: impl Into<String>, dismiss_after: Duration) -> Self {
        Self {
            message: message.into(),
            dismiss_after: Some(dismiss_after),
        }
    }
}

/// Maps an error to the notice the user should see.
///
/// Request errors carry the server's own wording and stay up; server and
/// connectivity failures get a generic message that goes away by itself. An
/// expired session produces nothing because the login prompt replaces the view.
pub fn notice_for(error: &PortError, dismiss_after: Duration) -> Option<Notice> {
    match error {
        PortError::SessionExpired => None,
        PortError::Validation(_) | PortError::Rejected { .. } => {
            Some(Notice::sticky(error.to_string()))
        }
        PortError::Unauthorized => Some(Notice::sticky(UNAUTHORIZED_NOTICE)),
        PortError::Server { .. }
        | PortError::Network(_)
        | PortError::Storage(_)
        | PortError::Unexpected(_) => {
            Some(Notice::transient(GENERIC_FAILURE_NOTICE, dismiss_after))
        }
    }
}

/// The notices currently on screen.
#[derive(Debug)]
pub struct NoticeBoard {
    dismiss_after: Duration,
    posted: Vec<(Notice, Instant)>,
}

impl NoticeBoard {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            dismiss_after,
            posted: Vec::new(),
        }
    }

    /// Posts the notice for `error`, if it has one. Returns whether anything was posted.
    pub fn report(&mut self, error: &PortError) -> bool {
        match notice_for(error, self.dismiss_after) {
            Some(notice) => {
                self.post(notice);
                true
            }
            None => false,
        }
    }

    pub fn post(&mut self, notice: Notice) {
        self.posted.push((notice, Instant::now()));
    }

    /// Drops expired notices and returns the rest, oldest first.
    pub fn active(&mut self) -> Vec<Notice> {
        let now = Instant::now();
        self.posted.retain(|(notice, posted_at)| match notice.dismiss_after {
            Some(after) => now.duration_since(*posted_at) < after,
            None => true,
        });
        self.posted.iter().map(|(notice, _)| notice.clone()).collect()
    }

    pub fn dismiss_all(&mut self) {
        self.posted.clear();
    }
}
