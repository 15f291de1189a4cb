//! Client side of the s2s directory: [`DirectoryClient`] talks to the HTTP
//! surface, [`Registrar`] signs and submits a provider's descriptors.

pub mod client;
pub mod registrar;

pub use client::DirectoryClient;
pub use registrar::Registrar;
