//! Liveness checks against provider nodes.
//!
//! A liveness check is a short, bounded remote call that tells the directory
//! whether a provider is reachable and answering. The directory only depends
//! on the [`LivenessCheck`] trait; [`HttpLiveness`] is the stock
//! implementation, which issues `GET {addr}{path}` and expects a 2xx with a
//! non-empty body.

use crate::error::{Result, S2sError};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::future::Future;
use std::time::Duration;

/// Tests whether a provider at `addr` is alive.
///
/// Implementations should fail rather than hang, but callers still wrap every
/// check in [`check_within`] so a misbehaving implementation cannot stall a
/// registration or a probe.
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn check(&self, addr: &str) -> Result<()>;
}

/// Runs `checker` against `addr`, failing with [`S2sError::Timeout`] once
/// `timeout` elapses.
pub async fn check_within(
    checker: &dyn LivenessCheck,
    addr: &str,
    timeout: Duration,
) -> Result<()> {
    with_deadline(timeout, checker.check(addr)).await
}

/// Awaits `fut`, turning an elapsed deadline into [`S2sError::Timeout`].
pub async fn with_deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| S2sError::Timeout(timeout.as_millis() as u64))?
}

/// Builds the URL for `path` on the provider at `addr`.
///
/// Bare `host:port` addresses get an `http://` scheme.
pub fn provider_url(addr: &str, path: &str) -> String {
    let base = addr.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}/{}", base, path)
    } else {
        format!("http://{}/{}", base, path)
    }
}

/// HTTP liveness check: `GET {addr}{path}` must return 2xx with a body.
#[derive(Clone)]
pub struct HttpLiveness {
    client: Client<HttpConnector, Full<Bytes>>,
    path: String,
    timeout: Duration,
}

impl HttpLiveness {
    pub const DEFAULT_PATH: &'static str = "/ping";

    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            path: Self::DEFAULT_PATH.to_string(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn ping(&self, addr: &str) -> Result<()> {
        let url = provider_url(addr, &self.path);
        let request = Request::builder()
            .method("GET")
            .uri(&url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| S2sError::Transport(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| S2sError::Transport(format!("{}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| S2sError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            return Err(S2sError::LivenessCheckFailed(format!(
                "{} answered {}",
                url, status
            )));
        }
        if body.is_empty() {
            return Err(S2sError::LivenessCheckFailed(format!(
                "{} answered with an empty body",
                url
            )));
        }
        Ok(())
    }
}

impl Default for HttpLiveness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LivenessCheck for HttpLiveness {
    async fn check(&self, addr: &str) -> Result<()> {
        let result = with_deadline(self.timeout, self.ping(addr)).await;
        if let Err(ref e) = result {
            tracing::debug!("Liveness check against {} failed: {}", addr, e);
        }
        result
    }
}
