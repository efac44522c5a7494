//! services/client/src/test_support.rs
//!
//! In-memory fakes shared by the unit tests.

use async_trait::async_trait;
use docqa_core::ports::{ApiRequest, ApiResponse, HttpTransport, PortResult};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

type Handler = dyn Fn(&ApiRequest) -> PortResult<ApiResponse> + Send + Sync;

/// A transport that answers from a closure and records every request it sees.
pub struct FakeTransport {
    handler: Box<Handler>,
    latency: Vec<(String, Duration)>,
    log: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> PortResult<ApiResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Vec::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Delays responses for `path`; combine with a paused clock to hold a request in flight.
    pub fn with_latency(mut self, path: &str, delay: Duration) -> Self {
        self.latency.push((path.to_string(), delay));
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        self.log.lock().unwrap().push(request.clone());
        let delay = self
            .latency
            .iter()
            .find(|(path, _)| *path == request.path)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&request)
    }
}

pub fn json(status: u16, value: Value) -> PortResult<ApiResponse> {
    Ok(ApiResponse::new(status, value.to_string()))
}
