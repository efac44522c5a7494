//! services/client/src/adapters/http.rs
//!
//! This module contains the adapter that puts `ApiRequest`s on the wire with reqwest.
//! It implements the `HttpTransport` port from the `core` crate.

use async_trait::async_trait;
use docqa_core::ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult, RequestBody,
};
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
    Client,
};
use std::time::Duration;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `HttpTransport` port on top of `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a new `ReqwestTransport` rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

//=========================================================================================
// `HttpTransport` Trait Implementation
//=========================================================================================

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        if let Some(authorization) = &request.authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(upload) => {
                let file = upload.file();
                let part = Part::bytes(file.bytes.to_vec())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.content_type)
                    .map_err(|e| PortError::Unexpected(format!("Invalid media type: {}", e)))?;
                let form = Form::new()
                    .text("title", upload.title().to_string())
                    .part("file", part);
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;

        debug!("{:?} {} -> {}", request.method, request.path, status);
        Ok(ApiResponse { status, body })
    }
}
