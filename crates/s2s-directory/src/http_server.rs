//! HTTP Server for the Directory
//!
//! Exposes registration, administration and the overview over axum.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use s2s_common::auth::AuthConfig;
use s2s_common::{Ack, S2sError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::directory::Directory;
use crate::http_router::DirectoryRouter;

/// HTTP server for the directory.
///
/// Routes:
/// - `POST /s2s/register` and `POST /s2s/unregister` take a signed descriptor
/// - `GET /s2s/overview` and `POST /s2s/node-status` are admin routes,
///   guarded by `X-API-Key` when an admin key is configured
/// - `GET /__health` answers `OK`
pub struct HttpServer {
    router: Arc<DirectoryRouter>,
}

impl HttpServer {
    /// Creates a server with admin authentication disabled.
    pub fn new(directory: Arc<Directory>) -> Self {
        Self::with_auth(directory, AuthConfig::disabled())
    }

    pub fn with_auth(directory: Arc<Directory>, auth: AuthConfig) -> Self {
        Self {
            router: Arc::new(DirectoryRouter::new(directory, auth)),
        }
    }

    /// Builds the axum app without binding it.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .route("/s2s/register", post(handle_register))
            .route("/s2s/unregister", post(handle_unregister))
            .route("/s2s/overview", get(handle_overview))
            .route("/s2s/node-status", post(handle_node_status))
            .route("/__health", get(health_check))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.router))
    }

    /// Runs the HTTP server.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8080")
    ///
    /// # Returns
    /// - `Ok(())` - The server stopped
    /// - `Err(S2sError)` - Binding or serving failed
    ///
    /// # Example
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use s2s_common::auth::SharedSecret;
    /// # use s2s_common::liveness::HttpLiveness;
    /// # use s2s_directory::{Directory, HttpServer};
    /// # async fn demo() -> Result<(), s2s_common::S2sError> {
    /// let directory = Arc::new(Directory::new(
    ///     SharedSecret::new("shared-secret"),
    ///     Arc::new(HttpLiveness::new()),
    /// ));
    /// HttpServer::new(directory).run("0.0.0.0:8080".parse().unwrap()).await
    /// # }
    /// ```
    pub async fn run(self, addr: SocketAddr) -> Result<(), S2sError> {
        let app = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| S2sError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        info!(
            "Directory HTTP server listening on {}",
            listener
                .local_addr()
                .map_err(|e| S2sError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| S2sError::Transport(format!("Server error: {}", e)))?;

        Ok(())
    }
}

fn unauthorized() -> (StatusCode, Json<Ack>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(Ack::error("Missing or invalid API key")),
    )
}

async fn handle_register(
    State(router): State<Arc<DirectoryRouter>>,
    body: Bytes,
) -> (StatusCode, Json<Ack>) {
    let (status, ack) = router.register(&body).await;
    (status, Json(ack))
}

async fn handle_unregister(
    State(router): State<Arc<DirectoryRouter>>,
    body: Bytes,
) -> (StatusCode, Json<Ack>) {
    let (status, ack) = router.unregister(&body);
    (status, Json(ack))
}

async fn handle_overview(
    State(router): State<Arc<DirectoryRouter>>,
    headers: HeaderMap,
) -> Response {
    if !router.authorize(&headers) {
        return unauthorized().into_response();
    }
    Json(router.overview()).into_response()
}

async fn handle_node_status(
    State(router): State<Arc<DirectoryRouter>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Ack>) {
    if !router.authorize(&headers) {
        return unauthorized();
    }
    let (status, ack) = router.set_node_status(&body);
    (status, Json(ack))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
