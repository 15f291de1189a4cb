//! Request handling for the directory's HTTP surface.
//!
//! [`DirectoryRouter`] turns decoded requests into directory calls and
//! directory results into `(StatusCode, body)` pairs. The axum wiring lives
//! in [`crate::http_server`].

use axum::http::{HeaderMap, StatusCode};
use s2s_common::auth::{AuthConfig, API_KEY_HEADER};
use s2s_common::{Ack, NodeAction, RegistrationDescriptor, S2sError, ServiceOverview, SetNodeStatusRequest};
use std::sync::Arc;
use tracing::warn;

use crate::directory::Directory;

/// Status used for a successful registration.
pub const REGISTERED: StatusCode = StatusCode::MULTI_STATUS;

/// Maps a directory error onto an HTTP status.
pub fn status_for(error: &S2sError) -> StatusCode {
    match error {
        S2sError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        S2sError::InvalidDescriptor(_)
        | S2sError::InvalidAction(_)
        | S2sError::JsonSerialization(_) => StatusCode::BAD_REQUEST,
        S2sError::ServiceNotFound(_) | S2sError::NodeNotFound { .. } => StatusCode::NOT_FOUND,
        S2sError::NoHealthyNode(_) => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_node_failure() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: &S2sError) -> (StatusCode, Ack) {
    (status_for(error), Ack::error(error.to_string()))
}

/// Directory handle plus the admin key guarding administrative routes.
pub struct DirectoryRouter {
    directory: Arc<Directory>,
    auth: AuthConfig,
}

impl DirectoryRouter {
    pub fn new(directory: Arc<Directory>, auth: AuthConfig) -> Self {
        Self { directory, auth }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Checks the `X-API-Key` header of an admin request.
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        if !self.auth.requires_auth() {
            return true;
        }
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|key| self.auth.validate_api_key(key))
    }

    pub async fn register(&self, body: &[u8]) -> (StatusCode, Ack) {
        let desc: RegistrationDescriptor = match serde_json::from_slice(body) {
            Ok(desc) => desc,
            Err(e) => return reject(&S2sError::from(e)),
        };

        match self.directory.register(&desc).await {
            Ok(_) => (REGISTERED, Ack::ok()),
            Err(e) => reject(&e),
        }
    }

    pub fn unregister(&self, body: &[u8]) -> (StatusCode, Ack) {
        let desc: RegistrationDescriptor = match serde_json::from_slice(body) {
            Ok(desc) => desc,
            Err(e) => return reject(&S2sError::from(e)),
        };

        match self.directory.unregister(&desc) {
            Ok(true) => (StatusCode::OK, Ack::ok()),
            Ok(false) => reject(&S2sError::NodeNotFound {
                service: desc.name,
                addr: desc.url,
            }),
            Err(e) => reject(&e),
        }
    }

    pub fn set_node_status(&self, body: &[u8]) -> (StatusCode, Ack) {
        let request: SetNodeStatusRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => return reject(&S2sError::from(e)),
        };

        let result = request
            .ope
            .parse::<NodeAction>()
            .and_then(|action| {
                self.directory
                    .set_node_status(&request.service, &request.addr, action)
            });

        match result {
            Ok(()) => (StatusCode::OK, Ack::ok()),
            Err(e) => {
                warn!(
                    "Admin action {} on {} of {} failed: {}",
                    request.ope, request.addr, request.service, e
                );
                reject(&e)
            }
        }
    }

    pub fn overview(&self) -> Vec<ServiceOverview> {
        self.directory.overview()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&S2sError::AuthenticationFailed), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&S2sError::InvalidDescriptor("name".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&S2sError::LivenessCheckFailed("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&S2sError::Timeout(2000)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&S2sError::NodeNotFound {
                service: "exec".into(),
                addr: "a:1".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&S2sError::Persistence("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(REGISTERED.as_u16(), 207);
    }
}
