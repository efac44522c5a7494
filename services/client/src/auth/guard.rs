//! services/client/src/auth/guard.rs
//!
//! Tracks whether the user is logged in and gates everything that needs a session.

use docqa_core::ports::TokenStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Lifecycle of the session as seen by protected views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unchecked,
    Checking,
    Authenticated,
    /// The user has to go through the login entry point.
    Unauthenticated,
}

pub struct SessionGuard {
    store: Arc<dyn TokenStore>,
    status: watch::Sender<SessionStatus>,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Unchecked);
        Self { store, status }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Runs when a protected view mounts: a stored credential means authenticated.
    pub fn check(&self) -> SessionStatus {
        self.status.send_replace(SessionStatus::Checking);
        let next = if self.store.get().is_some() {
            SessionStatus::Authenticated
        } else {
            info!("No stored credentials; routing to login.");
            SessionStatus::Unauthenticated
        };
        self.status.send_replace(next);
        next
    }

    /// Called after a successful login.
    pub fn mark_authenticated(&self) {
        self.status.send_replace(SessionStatus::Authenticated);
    }

    /// Forces the session to `Unauthenticated`.
    ///
    /// Returns `true` only for the call that performed the transition, so concurrent
    /// failures produce a single transition.
    pub fn terminate(&self) -> bool {
        let transitioned = self.status.send_if_modified(|status| {
            if *status == SessionStatus::Unauthenticated {
                false
            } else {
                *status = SessionStatus::Unauthenticated;
                true
            }
        });
        if transitioned {
            warn!("Session terminated; re-authentication required.");
        }
        transitioned
    }

    /// Resolves once the session is (or becomes) unauthenticated.
    pub async fn terminated(&self) {
        let mut status = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = status
            .wait_for(|status| *status == SessionStatus::Unauthenticated)
            .await;
    }
}
