pub mod authenticator;
pub mod client;
pub mod guard;
pub mod refresh;
pub mod session;

pub use authenticator::authenticate;
pub use client::AuthenticatedClient;
pub use guard::{SessionGuard, SessionStatus};
pub use refresh::RefreshCoordinator;
pub use session::SessionService;
