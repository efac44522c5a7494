//! services/client/src/auth/authenticator.rs
//!
//! Attaches the stored access credential to outgoing requests.

use docqa_core::ports::{ApiRequest, TokenStore};

/// Sets a bearer `Authorization` value from the store, or none when the store is empty.
///
/// Applied immediately before every dispatch, including replays, so a replay always
/// carries whatever the store holds at that moment.
pub fn authenticate(mut request: ApiRequest, store: &dyn TokenStore) -> ApiRequest {
    request.authorization = store
        .get()
        .map(|pair| format!("Bearer {}", pair.access));
    request
}
