use thiserror::Error;

#[derive(Error, Debug)]
pub enum S2sError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("No healthy node for service: {0}")]
    NoHealthyNode(String),

    #[error("Node {addr} not found in service {service}")]
    NodeNotFound { service: String, addr: String },

    #[error("Liveness check failed: {0}")]
    LivenessCheckFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl S2sError {
    /// Returns `true` if this error counts as a failure report against the
    /// node that produced it.
    ///
    /// Connection problems, deadlines and failed liveness checks all do.
    /// Lookup and credential errors never reach a node, so they don't.
    pub fn is_node_failure(&self) -> bool {
        matches!(
            self,
            S2sError::Transport(_)
                | S2sError::Timeout(_)
                | S2sError::LivenessCheckFailed(_)
                | S2sError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, S2sError>;
