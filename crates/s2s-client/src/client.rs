use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use s2s_common::auth::API_KEY_HEADER;
use s2s_common::liveness::with_deadline;
use s2s_common::{
    Ack, NodeAction, RegistrationDescriptor, Result, S2sError, ServiceOverview,
    SetNodeStatusRequest,
};
use std::time::Duration;
use tracing::debug;

/// HTTP client for a directory's registration and admin routes.
///
/// Every request opens through a shared hyper connection pool and is bounded
/// by the client's timeout. The admin key, when set, is sent on every
/// request as `X-API-Key`.
#[derive(Clone)]
pub struct DirectoryClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl DirectoryClient {
    /// `base_url` must include the scheme, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, method: Method, path: &str, body: Vec<u8>) -> Result<(StatusCode, Bytes)> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = Request::builder()
            .method(method)
            .uri(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| S2sError::Transport(format!("Failed to build request: {}", e)))?;

        with_deadline(self.timeout, async {
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
            debug!("{} answered {}", url, status);
            Ok((status, body))
        })
        .await
    }

    async fn post_for_ack(
        &self,
        path: &str,
        body: Vec<u8>,
        service: &str,
        addr: &str,
    ) -> Result<()> {
        let (status, body) = self.send(Method::POST, path, body).await?;
        let msg = serde_json::from_slice::<Ack>(&body)
            .map(|ack| ack.msg)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());

        if status.is_success() {
            return Ok(());
        }
        Err(match status {
            StatusCode::UNAUTHORIZED => S2sError::AuthenticationFailed,
            StatusCode::BAD_REQUEST => S2sError::InvalidDescriptor(msg),
            StatusCode::NOT_FOUND => S2sError::NodeNotFound {
                service: service.to_string(),
                addr: addr.to_string(),
            },
            StatusCode::SERVICE_UNAVAILABLE => S2sError::LivenessCheckFailed(msg),
            other => S2sError::Transport(format!("Directory answered {}: {}", other, msg)),
        })
    }

    /// Submits a signed descriptor. The directory answers 207 on success.
    pub async fn register(&self, desc: &RegistrationDescriptor) -> Result<()> {
        let body = serde_json::to_vec(desc)?;
        self.post_for_ack("/s2s/register", body, &desc.name, &desc.url)
            .await
    }

    pub async fn unregister(&self, desc: &RegistrationDescriptor) -> Result<()> {
        let body = serde_json::to_vec(desc)?;
        self.post_for_ack("/s2s/unregister", body, &desc.name, &desc.url)
            .await
    }

    pub async fn set_node_status(&self, service: &str, addr: &str, action: NodeAction) -> Result<()> {
        let request = SetNodeStatusRequest {
            service: service.to_string(),
            addr: addr.to_string(),
            ope: action.to_string(),
        };
        let body = serde_json::to_vec(&request)?;
        self.post_for_ack("/s2s/node-status", body, service, addr)
            .await
    }

    pub async fn overview(&self) -> Result<Vec<ServiceOverview>> {
        let (status, body) = self.send(Method::GET, "/s2s/overview", Vec::new()).await?;
        match status {
            StatusCode::OK => Ok(serde_json::from_slice(&body)?),
            StatusCode::UNAUTHORIZED => Err(S2sError::AuthenticationFailed),
            other => Err(S2sError::Transport(format!(
                "Directory answered {} to overview",
                other
            ))),
        }
    }
}
