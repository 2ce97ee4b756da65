//! Test utilities shared by the unit tests.

use crate::config::{Config, UpstreamConfig};
use crate::gateway::{FileBatch, FileBuffer, FileRole, MultipartPayload, TransportFailure, Upstream, UpstreamResponse};
use async_trait::async_trait;
use axum_test::TestServer;
use std::sync::{Arc, Mutex};
use url::Url;

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        upstream: UpstreamConfig {
            url: Some(Url::parse("http://127.0.0.1:5000").unwrap()),
            ..Default::default()
        },
        // The prometheus recorder is process-global, so it stays off unless a test asks for it
        enable_metrics: false,
        ..Default::default()
    }
}

pub fn create_test_app(config: Config, upstream: Arc<dyn Upstream>) -> TestServer {
    crate::Application::with_upstream(config, upstream)
        .expect("Failed to create application")
        .into_test_server()
}

/// A PDF, an EML and an XLSX file.
pub fn sample_batch() -> FileBatch {
    FileBatch::new()
        .with_file(FileBuffer::new(FileRole::Pdf, "remittance.pdf", Some("application/pdf"), b"%PDF-1.7".to_vec()))
        .unwrap()
        .with_file(FileBuffer::new(FileRole::Eml, "advice.eml", None, b"From: bank".to_vec()))
        .unwrap()
        .with_file(FileBuffer::new(FileRole::Xlsx, "ledger.xlsx", None, b"PK-ledger".to_vec()))
        .unwrap()
}

/// An [`Upstream`] that records every payload it is given and answers with a fixed reply.
pub struct RecordingUpstream {
    endpoint: Url,
    reply: Result<UpstreamResponse, TransportFailure>,
    calls: Mutex<Vec<MultipartPayload>>,
}

impl RecordingUpstream {
    pub fn responding(response: UpstreamResponse) -> Self {
        Self::new(Ok(response))
    }

    pub fn failing(failure: TransportFailure) -> Self {
        Self::new(Err(failure))
    }

    fn new(reply: Result<UpstreamResponse, TransportFailure>) -> Self {
        Self {
            endpoint: Url::parse("http://127.0.0.1:5000/process").unwrap(),
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn recorded(&self) -> Vec<MultipartPayload> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for RecordingUpstream {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn submit(&self, payload: MultipartPayload) -> Result<UpstreamResponse, TransportFailure> {
        self.calls.lock().unwrap().push(payload);
        self.reply.clone()
    }
}
