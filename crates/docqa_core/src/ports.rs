//! crates/docqa_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client logic is written against.
//! Concrete HTTP, storage and API implementations live in the `client` service and
//! are injected, so every component can be exercised with in-memory fakes.

use crate::domain::{
    Answer, ChatScope, CredentialPair, Document, DocumentId, DocumentUpload, ValidationError,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by every port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    /// Rejected locally before any request was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The server still answered 401 after the one permitted refresh-and-retry.
    #[error("Unauthorized")]
    Unauthorized,
    /// A 4xx response other than 401, with the server's message when it sent one.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Server error (HTTP {status})")]
    Server { status: u16 },
    /// Timeouts and connectivity failures.
    #[error("Network error: {0}")]
    Network(String),
    /// The session could not be recovered; the user has to log in again.
    #[error("Your session has expired. Please log in again.")]
    SessionExpired,
    #[error("Credential storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// HTTP Request/Response Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(DocumentUpload),
}

/// One attempt at an API call, described independently of any HTTP library.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path relative to the configured base URL, e.g. `/documents/`.
    pub path: String,
    pub body: RequestBody,
    /// Full `Authorization` header value, set just before dispatch.
    pub authorization: Option<String>,
    /// Set once the request has been through a refresh-and-retry cycle.
    pub retried: bool,
}

impl ApiRequest {
    fn new(method: HttpMethod, path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            authorization: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path, RequestBody::Empty)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path, RequestBody::Empty)
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, path, RequestBody::Json(body))
    }

    pub fn post_multipart(path: impl Into<String>, upload: DocumentUpload) -> Self {
        Self::new(HttpMethod::Post, path, RequestBody::Multipart(upload))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path, RequestBody::Empty)
    }

    /// The bearer token this attempt carries, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// A raw response: status plus undecoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> PortResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            PortError::Unexpected(format!("Malformed response body: {}", e))
        })
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Sends one request and returns whatever the server answered.
///
/// Implementations never interpret status codes; only transport failures are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse>;
}

/// Durable holder of the credential pair.
///
/// Reads are synchronous and may run concurrently with a refresh; they observe the
/// previous access credential until the new one is committed.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<CredentialPair>;
    fn set(&self, pair: CredentialPair) -> PortResult<()>;
    fn clear(&self) -> PortResult<()>;
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn list_documents(&self) -> PortResult<Vec<Document>>;

    async fn upload_document(&self, upload: DocumentUpload) -> PortResult<Document>;

    /// Asks the server to start background processing of a document.
    async fn analyze_document(&self, document_id: &DocumentId) -> PortResult<()>;

    async fn delete_document(&self, document_id: &DocumentId) -> PortResult<()>;
}

#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Asks a question against one document or, for `ChatScope::Global`, all of them.
    async fn ask(&self, scope: &ChatScope, question: &str) -> PortResult<Answer>;
}
