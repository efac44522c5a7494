//! services/client/src/auth/client.rs
//!
//! The authenticated client: a plain transport composed with the request
//! authenticator and the refresh coordinator.

use crate::auth::{
    authenticator::authenticate,
    guard::SessionGuard,
    refresh::RefreshCoordinator,
};
use docqa_core::ports::{ApiRequest, ApiResponse, HttpTransport, PortError, PortResult, TokenStore};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    guard: Arc<SessionGuard>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        guard: Arc<SessionGuard>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            guard.clone(),
        ));
        Self {
            transport,
            store,
            guard,
            coordinator,
        }
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    /// Sends `request` with the current access credential.
    ///
    /// A 401 on a request that has not been retried goes through exactly one
    /// refresh-and-replay; the replay's response is returned as-is, even if it is
    /// another 401. Only transport failures and session termination are errors here.
    pub async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        if !self.guard.is_authenticated() {
            debug!("No authenticated session; request not sent.");
            return Err(PortError::SessionExpired);
        }

        let attempt = authenticate(request.clone(), self.store.as_ref());
        let rejected_access = attempt.bearer_token().map(str::to_string);
        let response = self.transport.send(attempt).await?;
        if !response.is_unauthorized() || request.retried {
            return Ok(response);
        }

        let mut replay = request;
        replay.retried = true;
        debug!("401 on {}; recovering the session before replaying.", replay.path);
        self.coordinator.recover(rejected_access.as_deref()).await?;

        // Read the store only now, after the refresh has committed.
        let replay = authenticate(replay, self.store.as_ref());
        self.transport.send(replay).await
    }
}
