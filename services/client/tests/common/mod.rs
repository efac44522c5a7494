//! An in-memory stand-in for the document Q&A server.

#![allow(dead_code)]

use async_trait::async_trait;
use client_lib::{
    adapters::{ApiClient, MemoryTokenStore},
    auth::{AuthenticatedClient, SessionGuard},
};
use docqa_core::{
    domain::CredentialPair,
    ports::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortResult, RequestBody},
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

pub const ACCESS: &str = "access-1";
pub const REFRESH: &str = "refresh-1";

struct StoredDocument {
    id: u64,
    title: String,
    status: &'static str,
    file_size: u64,
    polls_left: usize,
}

struct State {
    next_id: u64,
    documents: Vec<StoredDocument>,
    valid_access: String,
    valid_refresh: String,
}

/// Serves the document endpoints from memory. Documents being analyzed report
/// `processing` for `polls_to_complete` list calls, then `completed`.
pub struct FakeBackend {
    state: Mutex<State>,
    log: Mutex<Vec<ApiRequest>>,
    polls_to_complete: usize,
}

impl FakeBackend {
    pub fn new(polls_to_complete: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_id: 100,
                documents: Vec::new(),
                valid_access: ACCESS.to_string(),
                valid_refresh: REFRESH.to_string(),
            }),
            log: Mutex::new(Vec::new()),
            polls_to_complete,
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    /// Invalidates the current access credential; the next refresh hands out `next`.
    pub fn expire_access(&self, next: &str) {
        self.state.lock().unwrap().valid_access = next.to_string();
    }

    pub fn revoke_refresh(&self) {
        self.state.lock().unwrap().valid_refresh.clear();
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state.lock().unwrap();

        if request.path == "/token/refresh/" {
            let presented = match &request.body {
                RequestBody::Json(body) => body["refresh"].as_str().unwrap_or_default().to_string(),
                _ => String::new(),
            };
            if presented.is_empty() || presented != state.valid_refresh {
                return respond(
                    401,
                    json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" }),
                );
            }
            return respond(200, json!({ "access": state.valid_access }));
        }

        let expected = format!("Bearer {}", state.valid_access);
        if request.authorization.as_deref() != Some(expected.as_str()) {
            return respond(
                401,
                json!({ "detail": "Given token not valid for any token type" }),
            );
        }

        let path = request.path.as_str();
        match (request.method, path) {
            (HttpMethod::Get, "/documents/") => {
                for document in state.documents.iter_mut() {
                    if document.status == "processing" {
                        if document.polls_left == 0 {
                            document.status = "completed";
                        } else {
                            document.polls_left -= 1;
                        }
                    }
                }
                let results: Vec<Value> = state.documents.iter().map(document_json).collect();
                respond(200, json!({ "count": results.len(), "results": results }))
            }
            (HttpMethod::Post, "/documents/") => {
                let RequestBody::Multipart(upload) = &request.body else {
                    return respond(400, json!({ "file": ["No file was submitted."] }));
                };
                let id = state.next_id;
                state.next_id += 1;
                state.documents.push(StoredDocument {
                    id,
                    title: upload.title().to_string(),
                    status: "pending",
                    file_size: upload.file().bytes.len() as u64,
                    polls_left: 0,
                });
                let created = state.documents.last().map(document_json).unwrap_or_default();
                respond(201, created)
            }
            (HttpMethod::Post, "/documents/global_ask/") => {
                let titles: Vec<String> = state
                    .documents
                    .iter()
                    .filter(|d| d.status == "completed")
                    .map(|d| d.title.clone())
                    .collect();
                if titles.is_empty() {
                    return respond(400, json!({ "detail": "No analyzed documents." }));
                }
                respond(
                    200,
                    json!({
                        "answer": format!("Found in {} document(s).", titles.len()),
                        "sources": titles
                            .iter()
                            .map(|title| json!({ "documentTitle": title, "page": 1 }))
                            .collect::<Vec<_>>(),
                    }),
                )
            }
            (method, _) => match parse_document_path(path) {
                Some((id, rest)) => match state.documents.iter().position(|d| d.id == id) {
                    None => respond(404, json!({ "detail": "Not found." })),
                    Some(index) => match (method, rest) {
                        (HttpMethod::Post, "analyze/") => {
                            let polls = self.polls_to_complete;
                            let document = &mut state.documents[index];
                            document.status = "processing";
                            document.polls_left = polls;
                            respond(202, json!({ "status": "processing" }))
                        }
                        (HttpMethod::Post, "ask/") => respond(
                            200,
                            json!({ "answer": format!("About {}.", state.documents[index].title) }),
                        ),
                        (HttpMethod::Delete, "") => {
                            state.documents.remove(index);
                            ApiResponse::new(204, "")
                        }
                        _ => respond(405, json!({ "detail": "Method not allowed." })),
                    },
                },
                None => respond(404, json!({ "detail": "Not found." })),
            },
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        self.log.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        Ok(self.handle(&request))
    }
}

fn parse_document_path(path: &str) -> Option<(u64, &str)> {
    let rest = path.strip_prefix("/documents/")?;
    let (id, rest) = rest.split_once('/')?;
    Some((id.parse().ok()?, rest))
}

fn document_json(document: &StoredDocument) -> Value {
    let analysis = match document.status {
        "completed" => json!({ "pages": 1 }),
        _ => Value::Null,
    };
    json!({
        "id": document.id,
        "title": document.title,
        "status": document.status,
        "analysis_result": analysis,
        "created_at": "2024-05-01T12:00:00Z",
        "file_size": document.file_size,
    })
}

fn respond(status: u16, body: Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

/// A logged-in client stack on top of `backend`.
pub struct Stack {
    pub store: Arc<MemoryTokenStore>,
    pub guard: Arc<SessionGuard>,
    pub api: Arc<ApiClient>,
}

pub fn logged_in(backend: Arc<FakeBackend>) -> Stack {
    let store = Arc::new(MemoryTokenStore::with_pair(CredentialPair::new(ACCESS, REFRESH)));
    let guard = Arc::new(SessionGuard::new(store.clone()));
    let api = Arc::new(ApiClient::new(AuthenticatedClient::new(
        backend,
        store.clone(),
        guard.clone(),
    )));
    Stack { store, guard, api }
}
