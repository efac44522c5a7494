//! crates/docqa_core/src/domain.rs
//!
//! Defines the pure, core data structures for the client.
//! These structs mirror the shapes the remote API exchanges but carry no I/O.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// The only document type the API accepts.
pub const DOCUMENT_MEDIA_TYPE: &str = "application/pdf";

/// Largest upload the client will dispatch (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

//=========================================================================================
// Credentials
//=========================================================================================

/// The access/refresh credential pair issued by the token endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// Returns a copy carrying a new access credential and, when rotated, a new refresh one.
    pub fn with_access(&self, access: String, refresh: Option<String>) -> Self {
        Self {
            access,
            refresh: refresh.unwrap_or_else(|| self.refresh.clone()),
        }
    }
}

// Tokens must never reach the logs.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

//=========================================================================================
// Documents
//=========================================================================================

/// Server-assigned document identifier. The API may send it as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => DocumentId(text),
            RawId::Number(number) => DocumentId(number.to_string()),
        })
    }
}

/// Processing state of a document. Only the server moves a document between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// `completed` and `failed` never change again without user action.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

/// A document as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    pub status: DocumentStatus,
    #[serde(default, alias = "analysisResult")]
    pub analysis_result: Option<serde_json::Value>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "fileSize")]
    pub file_size: Option<u64>,
}

impl Document {
    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }
}

/// True while at least one document still awaits server-side processing.
pub fn has_outstanding_work(documents: &[Document]) -> bool {
    documents.iter().any(|doc| !doc.status.is_terminal())
}

//=========================================================================================
// Uploads
//=========================================================================================

/// A file picked for upload, already read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A validated upload: exactly one file of the document type within the size limit.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    title: String,
    file: UploadFile,
}

impl DocumentUpload {
    /// Validates a file selection locally. Nothing here touches the network.
    ///
    /// An empty or missing title falls back to the file name without its extension.
    pub fn new(mut files: Vec<UploadFile>, title: Option<&str>) -> Result<Self, ValidationError> {
        if files.len() != 1 {
            return Err(ValidationError::FileCount(files.len()));
        }
        let file = files.remove(0);

        let media_type = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if media_type != DOCUMENT_MEDIA_TYPE {
            return Err(ValidationError::UnsupportedMediaType(file.content_type));
        }

        let size = file.bytes.len() as u64;
        if size > MAX_UPLOAD_BYTES {
            return Err(ValidationError::FileTooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let title = match title.map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => default_title(&file.file_name),
        };

        Ok(Self { title, file })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }
}

fn default_title(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

//=========================================================================================
// Chat
//=========================================================================================

/// A citation the server attached to an answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, alias = "documentId")]
    pub document_id: Option<DocumentId>,
    #[serde(default, alias = "documentTitle")]
    pub document_title: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, alias = "chunkIndex")]
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default, alias = "relevanceScore")]
    pub relevance_score: Option<f64>,
}

/// The body of a successful ask response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
}

/// Which conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatScope {
    Global,
    Document(DocumentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Identifier generated when a message is created; unique even within one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One entry of a chat log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<Source>,
    pub scope: ChatScope,
}

impl Message {
    pub fn user(scope: ChatScope, content: impl Into<String>) -> Self {
        Self::new(scope, Role::User, content.into(), Vec::new())
    }

    pub fn assistant(scope: ChatScope, content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self::new(scope, Role::Assistant, content.into(), sources)
    }

    fn new(scope: ChatScope, role: Role, content: String, sources: Vec<Source>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content,
            timestamp: Utc::now(),
            sources,
            scope,
        }
    }
}

//=========================================================================================
// Local validation
//=========================================================================================

/// Pre-flight failures. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error("Select exactly one file to upload (got {0}).")]
    FileCount(usize),
    #[error("Only PDF documents can be uploaded (got '{0}').")]
    UnsupportedMediaType(String),
    #[error("The file is {size} bytes; the limit is {limit} bytes.")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("Document {0} has not finished processing yet.")]
    DocumentNotReady(DocumentId),
    #[error("Upload and analyze a document before asking questions.")]
    NoCompletedDocuments,
}
