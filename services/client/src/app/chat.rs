//! services/client/src/app/chat.rs
//!
//! One chat conversation, either about a single document or across all of them.
//!
//! The user's message is appended before the request goes out; the reply (or a
//! readable failure) is appended when it resolves. Only one question may be in
//! flight per session, so a second question can never be answered out of order
//! within the same log.

use crate::app::poller::DocumentCollection;
use docqa_core::{
    domain::{ChatScope, Document, Message, ValidationError},
    ports::{PortError, QuestionService},
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shown in place of an answer when the question could not be answered.
pub const ASK_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't get an answer to that question. Please try again.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub input: String,
    pub asking: bool,
}

/// Why an `ask` did nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    EmptyQuestion,
    /// Another question is still waiting for its answer.
    Busy,
    Closed,
    NotReady(ValidationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Answered,
    /// A failure entry was appended to the log.
    Failed(PortError),
    Cancelled,
    Skipped(SkipReason),
}

pub struct ChatSession {
    scope: ChatScope,
    service: Arc<dyn QuestionService>,
    documents: watch::Receiver<DocumentCollection>,
    state: watch::Sender<ChatState>,
    cancel: CancellationToken,
}

impl ChatSession {
    /// The cross-document conversation.
    pub fn global(
        service: Arc<dyn QuestionService>,
        documents: watch::Receiver<DocumentCollection>,
    ) -> Self {
        Self::new(ChatScope::Global, service, documents)
    }

    /// A conversation about one document, which must have finished processing.
    pub fn for_document(
        service: Arc<dyn QuestionService>,
        documents: watch::Receiver<DocumentCollection>,
        document: &Document,
    ) -> Result<Self, ValidationError> {
        if !document.is_completed() {
            return Err(ValidationError::DocumentNotReady(document.id.clone()));
        }
        Ok(Self::new(
            ChatScope::Document(document.id.clone()),
            service,
            documents,
        ))
    }

    fn new(
        scope: ChatScope,
        service: Arc<dyn QuestionService>,
        documents: watch::Receiver<DocumentCollection>,
    ) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            scope,
            service,
            documents,
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scope(&self) -> &ChatScope {
        &self.scope
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    pub fn is_asking(&self) -> bool {
        self.state.borrow().asking
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    /// Whether the scope currently has something to ask about.
    pub fn readiness(&self) -> Result<(), ValidationError> {
        let collection = self.documents.borrow();
        match &self.scope {
            ChatScope::Global if collection.has_completed() => Ok(()),
            ChatScope::Global => Err(ValidationError::NoCompletedDocuments),
            ChatScope::Document(id) => match collection.get(id) {
                Some(doc) if doc.is_completed() => Ok(()),
                _ => Err(ValidationError::DocumentNotReady(id.clone())),
            },
        }
    }

    /// Submission is disabled while a question is in flight or the scope is not ready.
    pub fn is_submission_enabled(&self) -> bool {
        !self.is_asking() && self.readiness().is_ok()
    }

    /// Asks whatever is in the input buffer.
    pub async fn submit(&self) -> AskOutcome {
        let question = self.state.borrow().input.clone();
        self.ask(&question).await
    }

    /// Appends the question, sends it, and appends the answer or a failure entry.
    ///
    /// Never returns an error: every failure after the question is accepted shows up
    /// in the log as an assistant message.
    pub async fn ask(&self, question: &str) -> AskOutcome {
        if self.is_closed() {
            return AskOutcome::Skipped(SkipReason::Closed);
        }
        let question = question.trim();
        if question.is_empty() {
            return AskOutcome::Skipped(SkipReason::EmptyQuestion);
        }
        if self.is_asking() {
            return AskOutcome::Skipped(SkipReason::Busy);
        }
        if let Err(reason) = self.readiness() {
            return AskOutcome::Skipped(SkipReason::NotReady(reason));
        }

        let accepted = self.state.send_if_modified(|state| {
            if state.asking {
                return false;
            }
            state
                .messages
                .push(Message::user(self.scope.clone(), question));
            state.input.clear();
            state.asking = true;
            true
        });
        if !accepted {
            return AskOutcome::Skipped(SkipReason::Busy);
        }
        let _asking = AskingFlag(&self.state);

        info!("Asking a question in scope {:?}.", self.scope);
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.service.ask(&self.scope, question) => Some(result),
        };

        match result {
            None => {
                info!("Question cancelled in scope {:?}.", self.scope);
                AskOutcome::Cancelled
            }
            Some(Ok(answer)) => {
                let reply = Message::assistant(
                    self.scope.clone(),
                    answer.answer,
                    answer.sources.unwrap_or_default(),
                );
                self.finish(reply);
                AskOutcome::Answered
            }
            Some(Err(e)) => {
                warn!("Question failed in scope {:?}: {}", self.scope, e);
                self.finish(Message::assistant(
                    self.scope.clone(),
                    ASK_FAILURE_MESSAGE,
                    Vec::new(),
                ));
                AskOutcome::Failed(e)
            }
        }
    }

    fn finish(&self, reply: Message) {
        self.state.send_modify(|state| {
            state.messages.push(reply);
            state.asking = false;
        });
    }

    /// Abandons any question in flight. Used when the conversation is discarded.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("scope", &self.scope)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Clears `asking` however the ask ends, including when its future is dropped.
struct AskingFlag<'a>(&'a watch::Sender<ChatState>);

impl Drop for AskingFlag<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|state| std::mem::replace(&mut state.asking, false));
    }
}
