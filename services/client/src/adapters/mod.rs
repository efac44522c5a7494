pub mod api;
pub mod http;
pub mod token_store;

pub use api::ApiClient;
pub use http::ReqwestTransport;
pub use token_store::{FileTokenStore, MemoryTokenStore};
