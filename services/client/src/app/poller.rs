//! services/client/src/app/poller.rs
//!
//! Keeps the local document collection in step with the server while any document
//! is still being processed.
//!
//! The poller is a single task that fetches, publishes the snapshot, and only then
//! decides whether to arm the next timer. A slow fetch therefore delays the next one
//! instead of overlapping with it.

use crate::auth::guard::SessionGuard;
use docqa_core::{
    domain::{has_outstanding_work, Document},
    ports::{DocumentService, PortError},
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The latest server snapshot, plus the error from the most recent failed fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentCollection {
    pub documents: Vec<Document>,
    pub last_error: Option<PortError>,
}

impl DocumentCollection {
    pub fn get(&self, id: &docqa_core::domain::DocumentId) -> Option<&Document> {
        self.documents.iter().find(|doc| &doc.id == id)
    }

    pub fn has_completed(&self) -> bool {
        self.documents.iter().any(Document::is_completed)
    }
}

pub struct DocumentPoller {
    collection: watch::Sender<DocumentCollection>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DocumentPoller {
    /// Starts the poller. The first fetch happens immediately.
    pub fn spawn(
        service: Arc<dyn DocumentService>,
        guard: Arc<SessionGuard>,
        interval: Duration,
    ) -> Self {
        let (collection, _) = watch::channel(DocumentCollection::default());
        let wake = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poll_loop(
            service,
            guard,
            interval,
            collection.clone(),
            wake.clone(),
            cancel.clone(),
        ));

        Self {
            collection,
            wake,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn collection(&self) -> DocumentCollection {
        self.collection.borrow().clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.collection.borrow().documents.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DocumentCollection> {
        self.collection.subscribe()
    }

    /// Asks for a fetch as soon as the current one (if any) settles.
    ///
    /// Used after uploads, analysis requests and deletions so polling re-arms when the
    /// server reports new outstanding work.
    pub fn refresh_now(&self) {
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Abandons any in-flight fetch and pending timer.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stops the poller and waits for its task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for DocumentPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    service: Arc<dyn DocumentService>,
    guard: Arc<SessionGuard>,
    interval: Duration,
    collection: watch::Sender<DocumentCollection>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    info!("Document poller started.");

    loop {
        if !guard.is_authenticated() {
            info!("Session is not authenticated; poller will not fetch.");
            break;
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = guard.terminated() => break,
            fetched = service.list_documents() => fetched,
        };

        let outstanding = match fetched {
            Ok(documents) => {
                let outstanding = has_outstanding_work(&documents);
                collection.send_replace(DocumentCollection {
                    documents,
                    last_error: None,
                });
                outstanding
            }
            Err(PortError::SessionExpired) => {
                warn!("Session ended during a document fetch; poller stopping.");
                break;
            }
            Err(e) => {
                warn!("Document fetch failed: {}", e);
                let mut outstanding = false;
                collection.send_modify(|current| {
                    outstanding = has_outstanding_work(&current.documents);
                    current.last_error = Some(e);
                });
                outstanding
            }
        };

        if outstanding {
            debug!("Documents still processing; next fetch in {:?}.", interval);
        } else {
            debug!("No documents processing; polling idle.");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = guard.terminated() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(interval), if outstanding => {}
        }
    }

    info!("Document poller stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::token_store::MemoryTokenStore;
    use async_trait::async_trait;
    use docqa_core::domain::{CredentialPair, DocumentId, DocumentStatus, DocumentUpload};
    use docqa_core::ports::PortResult;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_millis(4000);

    fn doc(id: &str, status: DocumentStatus) -> Document {
        Document {
            id: DocumentId::from(id),
            title: format!("doc {}", id),
            status,
            analysis_result: None,
            created_at: chrono::Utc::now(),
            file_size: None,
        }
    }

    /// Serves scripted snapshots in order, repeating the last one.
    struct ScriptedDocuments {
        script: Mutex<VecDeque<PortResult<Vec<Document>>>>,
        latency: Duration,
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedDocuments {
        fn new(script: Vec<PortResult<Vec<Document>>>) -> Arc<Self> {
            Self::with_latency(script, Duration::ZERO)
        }

        fn with_latency(script: Vec<PortResult<Vec<Document>>>, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                latency,
                fetches: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentService for ScriptedDocuments {
        async fn list_documents(&self) -> PortResult<Vec<Document>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }

        async fn upload_document(&self, _upload: DocumentUpload) -> PortResult<Document> {
            unreachable!()
        }

        async fn analyze_document(&self, _id: &DocumentId) -> PortResult<()> {
            unreachable!()
        }

        async fn delete_document(&self, _id: &DocumentId) -> PortResult<()> {
            unreachable!()
        }
    }

    fn authenticated_guard() -> Arc<SessionGuard> {
        let guard = Arc::new(SessionGuard::new(Arc::new(MemoryTokenStore::with_pair(
            CredentialPair::new("a", "r"),
        ))));
        guard.check();
        guard
    }

    async fn run_for(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn settled_collection_is_fetched_once() {
        let service = ScriptedDocuments::new(vec![Ok(vec![doc("1", DocumentStatus::Completed)])]);
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        run_for(INTERVAL * 5).await;

        assert_eq!(service.fetches(), 1);
        assert_eq!(poller.documents().len(), 1);
        assert!(poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_processing_completes() {
        let service = ScriptedDocuments::new(vec![
            Ok(vec![doc("1", DocumentStatus::Processing)]),
            Ok(vec![doc("1", DocumentStatus::Completed)]),
        ]);
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        run_for(Duration::from_millis(10)).await;
        assert_eq!(service.fetches(), 1);
        assert_eq!(poller.documents()[0].status, DocumentStatus::Processing);

        run_for(INTERVAL).await;
        assert_eq!(service.fetches(), 2);
        assert_eq!(poller.documents()[0].status, DocumentStatus::Completed);

        run_for(INTERVAL * 5).await;
        assert_eq!(service.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_never_overlap() {
        let service = ScriptedDocuments::with_latency(
            vec![Ok(vec![doc("1", DocumentStatus::Pending)])],
            INTERVAL * 3,
        );
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        // Requests for an immediate fetch while one is in flight are coalesced.
        for _ in 0..3 {
            poller.refresh_now();
        }
        run_for(INTERVAL * 20).await;

        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
        // Each cycle is one slow fetch followed by one interval.
        assert!(service.fetches() <= 6, "fetched {} times", service.fetches());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_rearms_an_idle_poller() {
        let service = ScriptedDocuments::new(vec![
            Ok(vec![]),
            Ok(vec![doc("1", DocumentStatus::Pending)]),
            Ok(vec![doc("1", DocumentStatus::Completed)]),
        ]);
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        run_for(INTERVAL * 3).await;
        assert_eq!(service.fetches(), 1);

        poller.refresh_now();
        run_for(Duration::from_millis(10)).await;
        assert_eq!(service.fetches(), 2);

        run_for(INTERVAL * 3).await;
        assert_eq!(service.fetches(), 3);
        assert!(poller.documents()[0].is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn session_expiry_stops_the_poller_for_good() {
        let service = ScriptedDocuments::new(vec![
            Ok(vec![doc("1", DocumentStatus::Processing)]),
            Err(PortError::SessionExpired),
        ]);
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        run_for(INTERVAL * 10).await;

        assert_eq!(service.fetches(), 2);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn guard_termination_stops_a_waiting_poller() {
        let service = ScriptedDocuments::new(vec![Ok(vec![doc("1", DocumentStatus::Pending)])]);
        let guard = authenticated_guard();
        let poller = DocumentPoller::spawn(service.clone(), guard.clone(), INTERVAL);

        run_for(Duration::from_millis(10)).await;
        guard.terminate();
        run_for(INTERVAL * 3).await;

        assert_eq!(service.fetches(), 1);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_the_last_snapshot() {
        let service = ScriptedDocuments::new(vec![
            Ok(vec![doc("1", DocumentStatus::Processing)]),
            Err(PortError::Server { status: 502 }),
            Ok(vec![doc("1", DocumentStatus::Completed)]),
        ]);
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        run_for(INTERVAL + Duration::from_millis(10)).await;
        let collection = poller.collection();
        assert_eq!(collection.documents[0].status, DocumentStatus::Processing);
        assert_eq!(collection.last_error, Some(PortError::Server { status: 502 }));

        run_for(INTERVAL).await;
        let collection = poller.collection();
        assert!(collection.documents[0].is_completed());
        assert_eq!(collection.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_the_in_flight_fetch() {
        let service = ScriptedDocuments::with_latency(
            vec![Ok(vec![doc("1", DocumentStatus::Pending)])],
            INTERVAL * 10,
        );
        let poller = DocumentPoller::spawn(service.clone(), authenticated_guard(), INTERVAL);

        run_for(Duration::from_millis(10)).await;
        poller.shutdown().await;

        assert!(!poller.is_running());
        assert!(poller.documents().is_empty());
    }
}
