//! services/client/src/auth/session.rs
//!
//! Login, registration and logout. These talk to the public endpoints directly,
//! without the authenticated client, so a 401 here means bad credentials rather
//! than an expired session.

use crate::adapters::api::error_from_response;
use crate::auth::guard::SessionGuard;
use docqa_core::{
    domain::CredentialPair,
    ports::{ApiRequest, ApiResponse, HttpTransport, PortResult, TokenStore},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub const LOGIN_PATH: &str = "/token/";
pub const REGISTER_PATH: &str = "/users/";

/// The echo `/users/` returns for a created account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisteredUser {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub struct SessionService {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    guard: Arc<SessionGuard>,
}

impl SessionService {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        guard: Arc<SessionGuard>,
    ) -> Self {
        Self {
            transport,
            store,
            guard,
        }
    }

    /// Exchanges username and password for a credential pair and stores it.
    pub async fn login(&self, username: &str, password: &str) -> PortResult<()> {
        let response = self
            .transport
            .send(ApiRequest::post_json(
                LOGIN_PATH,
                json!({ "username": username, "password": password }),
            ))
            .await?;
        let pair: CredentialPair = expect_success(response)?.json()?;

        self.store.set(pair)?;
        self.guard.mark_authenticated();
        info!("Logged in as {}.", username);
        Ok(())
    }

    /// Creates an account. The user still has to log in afterwards.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> PortResult<RegisteredUser> {
        let response = self
            .transport
            .send(ApiRequest::post_json(
                REGISTER_PATH,
                json!({ "username": username, "email": email, "password": password }),
            ))
            .await?;
        let user: RegisteredUser = expect_success(response)?.json()?;
        info!("Registered account {}.", user.username);
        Ok(user)
    }

    /// Drops both credentials and ends the session.
    pub fn logout(&self) -> PortResult<()> {
        let cleared = self.store.clear();
        if let Err(e) = &cleared {
            error!("Failed to clear stored credentials on logout: {}", e);
        }
        self.guard.terminate();
        info!("Logged out.");
        cleared
    }
}

fn expect_success(response: ApiResponse) -> PortResult<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(error_from_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::token_store::MemoryTokenStore;
    use crate::auth::guard::SessionStatus;
    use crate::test_support::{json as respond, FakeTransport};
    use docqa_core::ports::PortError;

    fn service(transport: FakeTransport) -> (SessionService, Arc<MemoryTokenStore>, Arc<SessionGuard>) {
        let store = Arc::new(MemoryTokenStore::new());
        let guard = Arc::new(SessionGuard::new(store.clone()));
        guard.check();
        let service = SessionService::new(Arc::new(transport), store.clone(), guard.clone());
        (service, store, guard)
    }

    #[tokio::test]
    async fn login_stores_the_pair_without_an_authorization_header() {
        let (service, store, guard) = service(FakeTransport::new(|request| {
            assert_eq!(request.authorization, None);
            respond(200, serde_json::json!({ "access": "a1", "refresh": "r1" }))
        }));

        service.login("ada", "pw").await.unwrap();

        assert_eq!(store.get(), Some(CredentialPair::new("a1", "r1")));
        assert_eq!(guard.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn bad_credentials_surface_the_server_detail() {
        let (service, store, guard) = service(FakeTransport::new(|_| {
            respond(
                401,
                serde_json::json!({ "detail": "No active account found with the given credentials" }),
            )
        }));

        let err = service.login("ada", "wrong").await.unwrap_err();

        assert_eq!(
            err,
            PortError::Rejected {
                status: 401,
                message: "No active account found with the given credentials".to_string()
            }
        );
        assert!(store.get().is_none());
        assert_eq!(guard.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn register_reports_field_errors() {
        let (service, _, _) = service(FakeTransport::new(|_| {
            respond(400, serde_json::json!({ "username": ["This field must be unique."] }))
        }));

        let err = service.register("ada", "ada@example.com", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "username: This field must be unique.");
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let (service, store, guard) = service(FakeTransport::new(|_| {
            respond(200, serde_json::json!({ "access": "a1", "refresh": "r1" }))
        }));
        service.login("ada", "pw").await.unwrap();

        service.logout().unwrap();

        assert!(store.get().is_none());
        assert_eq!(guard.status(), SessionStatus::Unauthenticated);
    }
}
