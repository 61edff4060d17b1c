//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::Request,
    response::Response,
};
use plugin_adapter::{
    dns::{Changes, Endpoint},
    Provider, ProviderError,
};

/// Provider that returns canned records, remembers what it was asked to
/// apply and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingProvider {
    pub records: Vec<Endpoint>,
    pub fail: bool,
    pub stall: Option<Duration>,
    pub applied: Mutex<Vec<Changes>>,
    pub apply_calls: AtomicUsize,
}

impl RecordingProvider {
    pub fn with_records(records: Vec<Endpoint>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn stalling(delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Default::default()
        }
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ProviderError::BackendUnavailable(anyhow!(
                "connection refused: secret-backend.internal:2379"
            )));
        }
        Ok(self.records.clone())
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), ProviderError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::BackendUnavailable(anyhow!(
                "connection refused: secret-backend.internal:2379"
            )));
        }
        self.applied.lock().unwrap().push(changes);
        Ok(())
    }
}

pub fn shared(p: RecordingProvider) -> Arc<RecordingProvider> {
    Arc::new(p)
}

pub fn request(method: &str, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .expect("request")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn read_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

pub async fn read_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&read_bytes(response).await).expect("json")
}
