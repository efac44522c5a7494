//! services/client/src/auth/refresh.rs
//!
//! Exchanges the refresh credential for a new access credential, with at most one
//! exchange in flight no matter how many requests are waiting on it.

use crate::auth::guard::{SessionGuard, SessionStatus};
use docqa_core::{
    domain::CredentialPair,
    ports::{ApiRequest, HttpTransport, PortError, PortResult, TokenStore},
};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

pub const REFRESH_PATH: &str = "/token/refresh/";

/// Body of a successful refresh. Servers that rotate refresh credentials send both.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// The pending refresh every concurrent 401 subscribes to. Resolves to the new access credential.
type PendingRefresh = Shared<BoxFuture<'static, PortResult<String>>>;

type RefreshSlot = Arc<Mutex<Option<PendingRefresh>>>;

pub struct RefreshCoordinator {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    guard: Arc<SessionGuard>,
    in_flight: RefreshSlot,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        guard: Arc<SessionGuard>,
    ) -> Self {
        Self {
            transport,
            store,
            guard,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Recovers from a 401 received for a request sent with `rejected_access`.
    ///
    /// When the store already holds a different access credential, another request has
    /// refreshed in the meantime and the caller can replay straight away.
    pub async fn recover(&self, rejected_access: Option<&str>) -> PortResult<()> {
        if self.guard.status() == SessionStatus::Unauthenticated {
            return Err(PortError::SessionExpired);
        }
        if let Some(current) = self.store.get() {
            if rejected_access != Some(current.access.as_str()) {
                debug!("Access credential was already replaced; replaying without a refresh.");
                return Ok(());
            }
        }
        self.refresh().await.map(|_| ())
    }

    /// Joins the refresh in flight, or starts one when there is none.
    ///
    /// The exchange runs in its own task, so it settles (and leaves the slot) even when
    /// every caller waiting on it has been cancelled.
    pub async fn refresh(&self) -> PortResult<String> {
        let pending = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining the refresh already in flight.");
                    pending.clone()
                }
                None => {
                    let pending = spawn_refresh(
                        self.transport.clone(),
                        self.store.clone(),
                        self.guard.clone(),
                        self.in_flight.clone(),
                    );
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }
}

/// Empties the slot when the refresh task ends, however it ends.
struct ReleaseSlot(RefreshSlot);

impl Drop for ReleaseSlot {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Starts the exchange on its own task. The caller must hold the slot lock and store the
/// returned handle before releasing it.
fn spawn_refresh(
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    guard: Arc<SessionGuard>,
    slot: RefreshSlot,
) -> PendingRefresh {
    let task = tokio::spawn(async move {
        let _release = ReleaseSlot(slot);
        run_refresh(transport, store, guard).await
    });
    async move {
        task.await.unwrap_or_else(|e| {
            error!("Refresh task did not complete: {}", e);
            Err(PortError::SessionExpired)
        })
    }
    .boxed()
    .shared()
}

/// Performs one exchange and commits it.
///
/// A failure ends the session only while the store still holds the pair the exchange
/// started from. A pair replaced in the meantime (a new login) is kept as is.
async fn run_refresh(
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    guard: Arc<SessionGuard>,
) -> PortResult<String> {
    let Some(pair) = store.get() else {
        warn!("No refresh credential is stored; ending the session.");
        guard.terminate();
        return Err(PortError::SessionExpired);
    };

    let exchanged = exchange(transport.as_ref(), &pair).await;

    match store.get() {
        None => {
            warn!("Credentials were cleared while refreshing; ending the session.");
            guard.terminate();
            Err(PortError::SessionExpired)
        }
        Some(current) if current.refresh != pair.refresh => {
            info!("Credentials were replaced while refreshing; keeping the newer ones.");
            Ok(current.access)
        }
        Some(_) => {
            let committed = exchanged.and_then(|body| {
                store.set(pair.with_access(body.access.clone(), body.refresh))?;
                Ok(body.access)
            });
            match committed {
                Ok(access) => {
                    info!("Access credential refreshed.");
                    Ok(access)
                }
                Err(e) => {
                    warn!("Token refresh failed, ending the session: {}", e);
                    if let Err(clear_err) = store.clear() {
                        error!("Failed to clear stored credentials: {}", clear_err);
                    }
                    guard.terminate();
                    Err(PortError::SessionExpired)
                }
            }
        }
    }
}

async fn exchange(transport: &dyn HttpTransport, pair: &CredentialPair) -> PortResult<RefreshResponse> {
    info!("Refreshing access credential.");
    let response = transport
        .send(ApiRequest::post_json(
            REFRESH_PATH,
            json!({ "refresh": pair.refresh }),
        ))
        .await?;
    if !response.is_success() {
        return Err(PortError::Rejected {
            status: response.status,
            message: "refresh credential rejected".to_string(),
        });
    }
    response.json()
}
