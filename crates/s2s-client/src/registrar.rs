use s2s_common::auth::{sign, SharedSecret};
use s2s_common::{RegistrationDescriptor, Result};
use tracing::info;

use crate::client::DirectoryClient;

/// Provider-side registration: signs descriptors with the shared secret and
/// submits them.
pub struct Registrar {
    client: DirectoryClient,
    secret: SharedSecret,
}

impl Registrar {
    pub fn new(client: DirectoryClient, secret: SharedSecret) -> Self {
        Self { client, secret }
    }

    pub fn client(&self) -> &DirectoryClient {
        &self.client
    }

    /// Builds a signed descriptor for `url` in service `name`.
    pub fn descriptor(&self, name: &str, url: &str, tag: &str) -> RegistrationDescriptor {
        RegistrationDescriptor::new(name, url, tag, sign(&self.secret, name, url))
    }

    pub async fn register(&self, name: &str, url: &str, tag: &str) -> Result<()> {
        self.client.register(&self.descriptor(name, url, tag)).await?;
        info!("Registered {} for service {} at {}", url, name, self.client.base_url());
        Ok(())
    }

    pub async fn unregister(&self, name: &str, url: &str) -> Result<()> {
        self.client.unregister(&self.descriptor(name, url, "")).await?;
        info!("Unregistered {} from service {}", url, name);
        Ok(())
    }
}
