//! s2s Directory
//!
//! A self-registering service directory with client-side, health-aware
//! round-robin selection.
//!
//! Providers register a signed [`RegistrationDescriptor`](s2s_common::RegistrationDescriptor);
//! the [`Directory`] checks the token, runs a liveness check, and adds the
//! provider as an `Active` node of its service. Callers [`Directory::select`]
//! a node per attempt and report failures back, which quarantines the node
//! while a [`HealthProber`] re-verifies it. Nodes that never answer are
//! evicted.
//!
//! The node list can be snapshotted to a [`SnapshotStore`] and replayed on
//! startup, and the whole directory is served over HTTP by [`HttpServer`].

pub mod directory;
pub mod http_router;
pub mod http_server;
pub mod node;
pub mod prober;
pub mod service;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use directory::{Directory, DirectoryConfig, RegisterOutcome, RestoreReport};
pub use http_server::HttpServer;
pub use node::Node;
pub use prober::{HealthProber, ProbeConfig, ProbeOutcome};
pub use service::{NodeRef, Service};
pub use snapshot::{
    FileStore, MemoryStore, SnapshotConfig, SnapshotHandle, SnapshotStore, SnapshotTask,
    SNAPSHOT_KEY,
};
