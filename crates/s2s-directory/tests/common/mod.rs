//! Shared helpers for directory integration tests.

#![allow(dead_code)]

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use s2s_common::auth::{sign, SharedSecret};
use s2s_common::liveness::HttpLiveness;
use s2s_common::RegistrationDescriptor;
use s2s_directory::{Directory, DirectoryConfig, ProbeConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "integration-secret";

/// A provider that answers `/ping` while its health flag is set.
pub struct MockProvider {
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
    pings: Arc<AtomicUsize>,
    _handle: tokio::task::JoinHandle<()>,
}

#[derive(Clone)]
struct ProviderState {
    healthy: Arc<AtomicBool>,
    pings: Arc<AtomicUsize>,
}

async fn handle_ping(State(state): State<ProviderState>) -> impl IntoResponse {
    state.pings.fetch_add(1, Ordering::SeqCst);
    if state.healthy.load(Ordering::SeqCst) {
        (StatusCode::OK, "pong")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

impl MockProvider {
    pub async fn start() -> Self {
        let healthy = Arc::new(AtomicBool::new(true));
        let pings = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/ping", get(handle_ping))
            .with_state(ProviderState {
                healthy: healthy.clone(),
                pings: pings.clone(),
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock provider");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            healthy,
            pings,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        self.addr.to_string()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

/// Probe settings short enough for tests.
pub fn fast_config() -> DirectoryConfig {
    DirectoryConfig {
        probe: ProbeConfig {
            attempts: 5,
            delay: Duration::from_millis(10),
            timeout: Duration::from_millis(500),
        },
        call_timeout: Duration::from_millis(500),
    }
}

pub fn directory() -> Arc<Directory> {
    Arc::new(Directory::with_config(
        SharedSecret::new(SECRET),
        Arc::new(HttpLiveness::new().with_timeout(Duration::from_millis(500))),
        fast_config(),
    ))
}

pub fn descriptor(name: &str, url: &str) -> RegistrationDescriptor {
    signed_with(SECRET, name, url)
}

pub fn signed_with(secret: &str, name: &str, url: &str) -> RegistrationDescriptor {
    let token = sign(&SharedSecret::new(secret), name, url);
    RegistrationDescriptor::new(name, url, "test", token)
}

pub fn node_urls(directory: &Directory, service: &str) -> Vec<String> {
    directory
        .service(service)
        .map(|s| s.nodes().iter().map(|n| n.addr().to_string()).collect())
        .unwrap_or_default()
}
