//! services/client/src/app/dashboard.rs
//!
//! The protected view: document list, document actions, and the two chat scopes.
//!
//! Mounting runs the session check. While mounted, the dashboard owns the poller,
//! the global chat and at most one document-scoped chat. Every document action
//! asks the poller for an immediate fetch so status changes show up (and polling
//! re-arms) without waiting for a timer.

use crate::app::chat::ChatSession;
use crate::app::notice::{Notice, NoticeBoard};
use crate::app::poller::{DocumentCollection, DocumentPoller};
use crate::auth::guard::{SessionGuard, SessionStatus};
use crate::config::Config;
use docqa_core::{
    domain::{Document, DocumentId, DocumentUpload, ValidationError},
    ports::{DocumentService, PortError, PortResult, QuestionService},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardOptions {
    pub poll_interval: Duration,
    pub notice_dismiss_after: Duration,
}

impl From<&Config> for DashboardOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            notice_dismiss_after: config.notice_dismiss_after,
        }
    }
}

struct ActiveDocument {
    id: DocumentId,
    chat: Arc<ChatSession>,
}

pub struct Dashboard {
    documents: Arc<dyn DocumentService>,
    questions: Arc<dyn QuestionService>,
    guard: Arc<SessionGuard>,
    poller: DocumentPoller,
    global_chat: Arc<ChatSession>,
    active: Option<ActiveDocument>,
    notices: NoticeBoard,
}

impl Dashboard {
    /// Checks the session and, when authenticated, starts polling.
    ///
    /// Fails with `SessionExpired` when there is no stored credential; the caller
    /// routes to login.
    pub fn mount(
        documents: Arc<dyn DocumentService>,
        questions: Arc<dyn QuestionService>,
        guard: Arc<SessionGuard>,
        options: DashboardOptions,
    ) -> PortResult<Self> {
        if guard.check() != SessionStatus::Authenticated {
            return Err(PortError::SessionExpired);
        }

        let poller = DocumentPoller::spawn(documents.clone(), guard.clone(), options.poll_interval);
        let global_chat = Arc::new(ChatSession::global(questions.clone(), poller.subscribe()));
        info!("Dashboard mounted.");

        Ok(Self {
            documents,
            questions,
            guard,
            poller,
            global_chat,
            active: None,
            notices: NoticeBoard::new(options.notice_dismiss_after),
        })
    }

    pub fn documents(&self) -> Vec<Document> {
        self.poller.documents()
    }

    pub fn collection(&self) -> DocumentCollection {
        self.poller.collection()
    }

    pub fn subscribe(&self) -> watch::Receiver<DocumentCollection> {
        self.poller.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn refresh(&self) {
        self.poller.refresh_now();
    }

    pub fn global_chat(&self) -> Arc<ChatSession> {
        self.global_chat.clone()
    }

    pub fn active_document(&self) -> Option<&DocumentId> {
        self.active.as_ref().map(|active| &active.id)
    }

    pub fn active_chat(&self) -> Option<Arc<ChatSession>> {
        self.active.as_ref().map(|active| active.chat.clone())
    }

    /// Opens a completed document for chat.
    ///
    /// Reopening the active document keeps its conversation; opening another one
    /// discards it.
    pub fn open_document(&mut self, id: &DocumentId) -> PortResult<Arc<ChatSession>> {
        if let Some(active) = &self.active {
            if &active.id == id {
                return Ok(active.chat.clone());
            }
        }

        let collection = self.poller.collection();
        let document = collection
            .get(id)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown document {}", id)))?;
        let chat = ChatSession::for_document(self.questions.clone(), self.poller.subscribe(), document)
            .map_err(|e| self.record(e.into()))?;

        self.close_document();
        let chat = Arc::new(chat);
        info!("Opened document {}.", id);
        self.active = Some(ActiveDocument {
            id: id.clone(),
            chat: chat.clone(),
        });
        Ok(chat)
    }

    /// Discards the document-scoped conversation, abandoning any question in flight.
    pub fn close_document(&mut self) {
        if let Some(active) = self.active.take() {
            active.chat.close();
            info!("Closed document {}.", active.id);
        }
    }

    pub async fn upload(&mut self, upload: DocumentUpload) -> PortResult<Document> {
        let result = self.documents.upload_document(upload).await;
        self.poller.refresh_now();
        let document = result.map_err(|e| self.record(e))?;
        info!("Uploaded document {} ({}).", document.id, document.title);
        Ok(document)
    }

    pub async fn analyze(&mut self, id: &DocumentId) -> PortResult<()> {
        let result = self.documents.analyze_document(id).await;
        self.poller.refresh_now();
        result.map_err(|e| self.record(e))?;
        info!("Requested analysis of document {}.", id);
        Ok(())
    }

    pub async fn delete(&mut self, id: &DocumentId) -> PortResult<()> {
        let result = self.documents.delete_document(id).await;
        self.poller.refresh_now();
        result.map_err(|e| self.record(e))?;
        if self.active_document() == Some(id) {
            self.close_document();
        }
        info!("Deleted document {}.", id);
        Ok(())
    }

    /// Whether a global question could be sent right now.
    pub fn global_readiness(&self) -> Result<(), ValidationError> {
        self.global_chat.readiness()
    }

    /// Posts the notice for an error raised elsewhere, such as a failed ask.
    pub fn report(&mut self, error: &PortError) {
        self.notices.report(error);
    }

    pub fn notices(&mut self) -> Vec<Notice> {
        self.notices.active()
    }

    pub fn dismiss_notices(&mut self) {
        self.notices.dismiss_all();
    }

    /// Resolves when the session ends while mounted.
    pub async fn session_ended(&self) {
        self.guard.terminated().await;
    }

    /// Stops polling and abandons every question in flight.
    pub async fn teardown(&mut self) {
        self.close_document();
        self.global_chat.close();
        self.poller.shutdown().await;
        info!("Dashboard torn down.");
    }

    fn record(&mut self, error: PortError) -> PortError {
        self.notices.report(&error);
        error
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.close_document();
        self.global_chat.close();
        self.poller.stop();
    }
}
