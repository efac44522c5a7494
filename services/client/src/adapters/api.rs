//! services/client/src/adapters/api.rs
//!
//! This module contains the adapter for the document Q&A REST API.
//! It implements the `DocumentService` and `QuestionService` ports from the `core`
//! crate on top of the authenticated client.

use crate::auth::client::AuthenticatedClient;
use async_trait::async_trait;
use docqa_core::{
    domain::{Answer, ChatScope, Document, DocumentId, DocumentUpload},
    ports::{ApiRequest, ApiResponse, DocumentService, PortError, PortResult, QuestionService},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const DOCUMENTS_PATH: &str = "/documents/";
pub const GLOBAL_ASK_PATH: &str = "/documents/global_ask/";

const GENERIC_REQUEST_ERROR: &str = "The request could not be completed. Please try again.";

fn document_path(id: &DocumentId) -> String {
    format!("/documents/{}/", id)
}

fn analyze_path(id: &DocumentId) -> String {
    format!("/documents/{}/analyze/", id)
}

fn ask_path(id: &DocumentId) -> String {
    format!("/documents/{}/ask/", id)
}

//=========================================================================================
// Error Extraction
//=========================================================================================

/// Maps a non-2xx response to a `PortError`.
///
/// 4xx bodies are searched for a human-readable message: a `detail`/`error`/`message`
/// string first, then field-level errors rendered as `field: message`.
pub fn error_from_response(response: &ApiResponse) -> PortError {
    if response.status >= 500 {
        return PortError::Server {
            status: response.status,
        };
    }
    let message = extract_message(&response.body)
        .unwrap_or_else(|| GENERIC_REQUEST_ERROR.to_string());
    PortError::Rejected {
        status: response.status,
        message,
    }
}

fn extract_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match &value {
        Value::Object(map) => {
            for key in ["detail", "error", "message"] {
                if let Some(text) = map.get(key).and_then(flatten_text) {
                    return Some(text);
                }
            }
            let fields: Vec<String> = map
                .iter()
                .filter_map(|(field, errors)| {
                    flatten_text(errors).map(|text| {
                        if field == "non_field_errors" {
                            text
                        } else {
                            format!("{}: {}", field, text)
                        }
                    })
                })
                .collect();
            (!fields.is_empty()).then(|| fields.join("\n"))
        }
        other => flatten_text(other),
    }
}

fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten_text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// `GET /documents/` answers either a paginated envelope or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentList {
    Paginated { results: Vec<Document> },
    Plain(Vec<Document>),
}

impl From<DocumentList> for Vec<Document> {
    fn from(list: DocumentList) -> Self {
        match list {
            DocumentList::Paginated { results } => results,
            DocumentList::Plain(documents) => documents,
        }
    }
}

/// An adapter that implements the document and question ports over HTTP.
#[derive(Clone)]
pub struct ApiClient {
    http: AuthenticatedClient,
}

impl ApiClient {
    pub fn new(http: AuthenticatedClient) -> Self {
        Self { http }
    }

    /// Sends through the authenticated client and turns non-2xx answers into errors.
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        let response = self.http.send(request).await?;
        if response.is_success() {
            Ok(response)
        } else if response.is_unauthorized() {
            Err(PortError::Unauthorized)
        } else {
            Err(error_from_response(&response))
        }
    }
}

//=========================================================================================
// `DocumentService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentService for ApiClient {
    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        let response = self.send(ApiRequest::get(DOCUMENTS_PATH)).await?;
        let documents: Vec<Document> = response.json::<DocumentList>()?.into();
        debug!("Fetched {} documents.", documents.len());
        Ok(documents)
    }

    async fn upload_document(&self, upload: DocumentUpload) -> PortResult<Document> {
        info!(
            "Uploading '{}' ({} bytes).",
            upload.title(),
            upload.file().bytes.len()
        );
        let response = self
            .send(ApiRequest::post_multipart(DOCUMENTS_PATH, upload))
            .await?;
        response.json()
    }

    async fn analyze_document(&self, document_id: &DocumentId) -> PortResult<()> {
        info!("Requesting analysis of document {}.", document_id);
        self.send(ApiRequest::post(analyze_path(document_id)))
            .await
            .map(|_| ())
    }

    async fn delete_document(&self, document_id: &DocumentId) -> PortResult<()> {
        info!("Deleting document {}.", document_id);
        self.send(ApiRequest::delete(document_path(document_id)))
            .await
            .map(|_| ())
    }
}

//=========================================================================================
// `QuestionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionService for ApiClient {
    async fn ask(&self, scope: &ChatScope, question: &str) -> PortResult<Answer> {
        let path = match scope {
            ChatScope::Global => GLOBAL_ASK_PATH.to_string(),
            ChatScope::Document(id) => ask_path(id),
        };
        let response = self
            .send(ApiRequest::post_json(path, json!({ "question": question })))
            .await?;
        response.json()
    }
}
