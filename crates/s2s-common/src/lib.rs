//! s2s Common Types
//!
//! This crate holds everything the service directory and its clients agree on:
//!
//! - **Protocol**: registration descriptors, admin requests, overview records
//! - **Auth**: the signed-token Credential Validator and the admin API key
//! - **Liveness**: the seam used to test whether a provider is reachable
//! - **Errors**: the shared [`S2sError`] enum
//!
//! # Example
//!
//! ```
//! use s2s_common::auth::{sign, SharedSecret};
//! use s2s_common::RegistrationDescriptor;
//!
//! let secret = SharedSecret::new("s3cret");
//! let token = sign(&secret, "exec", "10.0.0.7:9090");
//! let desc = RegistrationDescriptor::new("exec", "10.0.0.7:9090", "rack-a", token);
//! assert!(s2s_common::auth::validate(&desc, &secret));
//! ```

pub mod auth;
pub mod error;
pub mod liveness;
pub mod protocol;

pub use error::{Result, S2sError};
pub use protocol::*;
