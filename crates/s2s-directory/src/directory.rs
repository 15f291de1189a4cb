use parking_lot::Mutex;
use s2s_common::auth::{sign, validate, SharedSecret};
use s2s_common::liveness::{check_within, with_deadline, LivenessCheck};
use s2s_common::{
    NodeAction, NodeStatus, RegistrationDescriptor, Result, S2sError, ServiceOverview,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prober::{HealthProber, ProbeConfig, ProbeOutcome};
use crate::service::{Admission, NodeRef, Service};

/// Directory configuration.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Quarantine probing, also used for the registration liveness check
    pub probe: ProbeConfig,
    /// Deadline for one caller attempt made through [`Directory::call`]
    pub call_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// What a successful registration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new node was added
    Registered,
    /// A paused or probing node was made active again
    Reinstated,
    /// The node was already active; only its tag was refreshed
    AlreadyActive,
}

/// Result of replaying a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub rejected: usize,
}

/// The service directory.
///
/// Maps service names to [`Service`]s and owns the shared secret used to
/// validate registrations. It is constructed once at startup and shared as
/// an `Arc<Directory>` by the HTTP surface, the snapshot task and any
/// in-process callers.
///
/// # Locking
///
/// The directory lock only guards the name map. It is taken first, released
/// before any service lock, and never held across a liveness check or a
/// caller's attempt. Services are created lazily on first registration and
/// never removed, even when they run out of nodes.
pub struct Directory {
    secret: SharedSecret,
    services: Mutex<HashMap<String, Arc<Service>>>,
    liveness: Arc<dyn LivenessCheck>,
    config: DirectoryConfig,
}

impl Directory {
    pub fn new(secret: SharedSecret, liveness: Arc<dyn LivenessCheck>) -> Self {
        Self::with_config(secret, liveness, DirectoryConfig::default())
    }

    pub fn with_config(
        secret: SharedSecret,
        liveness: Arc<dyn LivenessCheck>,
        config: DirectoryConfig,
    ) -> Self {
        Self {
            secret,
            services: Mutex::new(HashMap::new()),
            liveness,
            config,
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Looks up a service by name.
    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.services.lock().get(name).cloned()
    }

    fn service_or_create(&self, name: &str) -> Arc<Service> {
        let mut services = self.services.lock();
        Arc::clone(
            services
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Service::new(name))),
        )
    }

    fn authenticate(&self, desc: &RegistrationDescriptor) -> Result<()> {
        desc.check_fields()?;
        if !validate(desc, &self.secret) {
            warn!(
                "Rejected descriptor for {} in service {}: bad token",
                desc.url, desc.name
            );
            return Err(S2sError::AuthenticationFailed);
        }
        Ok(())
    }

    /// Registers a provider.
    ///
    /// The descriptor's fields and token are checked before anything else;
    /// a rejected descriptor leaves the directory untouched. An address that
    /// is already active only gets its tag refreshed. Otherwise the provider
    /// must pass a liveness check, run without any lock held, before it is
    /// added (or reinstated) as `Active`.
    ///
    /// # Arguments
    /// * `desc` - Descriptor signed with the directory's shared secret
    ///
    /// # Returns
    /// - `Ok(RegisterOutcome::Registered)` - A new node was appended
    /// - `Ok(RegisterOutcome::Reinstated)` - A paused or probing node is active again
    /// - `Ok(RegisterOutcome::AlreadyActive)` - Only the tag changed
    ///
    /// # Example
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use s2s_common::auth::{sign, SharedSecret};
    /// # use s2s_common::liveness::HttpLiveness;
    /// # use s2s_common::RegistrationDescriptor;
    /// # use s2s_directory::Directory;
    /// # async fn demo() -> s2s_common::Result<()> {
    /// let secret = SharedSecret::new("shared-secret");
    /// let directory = Directory::new(secret.clone(), Arc::new(HttpLiveness::new()));
    ///
    /// let token = sign(&secret, "exec", "http://10.0.0.5:9000");
    /// let desc = RegistrationDescriptor::new("exec", "http://10.0.0.5:9000", "v1", token);
    /// directory.register(&desc).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - `InvalidDescriptor` for an empty name or url
    /// - `AuthenticationFailed` for a missing or wrong token
    /// - the liveness error (`LivenessCheckFailed`, `Transport`, `Timeout`)
    ///   if the provider doesn't answer
    pub async fn register(&self, desc: &RegistrationDescriptor) -> Result<RegisterOutcome> {
        self.authenticate(desc)?;

        if let Some(node) = self.service(&desc.name).and_then(|s| s.find(&desc.url)) {
            if node.is_active() {
                node.set_tag(&desc.tag);
                debug!("Node {} already active in service {}", desc.url, desc.name);
                return Ok(RegisterOutcome::AlreadyActive);
            }
        }

        if let Err(e) = check_within(self.liveness.as_ref(), &desc.url, self.config.probe.timeout).await {
            warn!(
                "Refused node {} for service {}: liveness check failed: {}",
                desc.url, desc.name, e
            );
            return Err(e);
        }

        let service = self.service_or_create(&desc.name);
        let outcome = match service.admit(&desc.url, &desc.tag) {
            Admission::Added(_) => RegisterOutcome::Registered,
            Admission::Existing {
                previous: NodeStatus::Active,
                ..
            } => RegisterOutcome::AlreadyActive,
            Admission::Existing { .. } => RegisterOutcome::Reinstated,
        };

        info!(
            "Node {} of service {} registered ({:?})",
            desc.url, desc.name, outcome
        );
        Ok(outcome)
    }

    /// Removes the provider named by a signed descriptor.
    ///
    /// Returns `false` if no such node was registered.
    pub fn unregister(&self, desc: &RegistrationDescriptor) -> Result<bool> {
        self.authenticate(desc)?;

        let removed = self
            .service(&desc.name)
            .and_then(|service| service.remove(&desc.url))
            .is_some();
        if removed {
            info!("Node {} unregistered from service {}", desc.url, desc.name);
        }
        Ok(removed)
    }

    /// Picks the next active node of `service` with round robin.
    ///
    /// The returned [`NodeRef`] is good for one attempt. Report a failed
    /// attempt with [`Directory::report_failure`].
    pub fn select(&self, service: &str) -> Result<NodeRef> {
        let svc = self
            .service(service)
            .ok_or_else(|| S2sError::ServiceNotFound(service.to_string()))?;
        let node = svc
            .select()
            .ok_or_else(|| S2sError::NoHealthyNode(service.to_string()))?;
        Ok(NodeRef::new(service, &node))
    }

    /// Reports a failed attempt against a node.
    ///
    /// Every report counts against the node. If the node was `Active` it moves
    /// to `Probing` and a prober is spawned; the handle is returned so callers
    /// may await the verdict, but dropping it is fine. Reports against a node
    /// that is already probing, paused or gone launch nothing.
    pub fn report_failure(&self, node_ref: &NodeRef) -> Option<tokio::task::JoinHandle<ProbeOutcome>> {
        let node = node_ref.upgrade()?;
        let service = self.service(node_ref.service())?;

        if !node.begin_probe() {
            debug!(
                "Failure on node {} recorded, status {}",
                node.addr(),
                node.status()
            );
            return None;
        }

        warn!(
            "Node {} of service {} reported failing, quarantining",
            node.addr(),
            service.name()
        );
        let prober = HealthProber::new(
            service,
            node,
            Arc::clone(&self.liveness),
            self.config.probe.clone(),
        );
        Some(prober.spawn())
    }

    /// Runs one caller attempt against the next node of `service`.
    ///
    /// The attempt is bounded by [`DirectoryConfig::call_timeout`]. A node
    /// failure ([`S2sError::is_node_failure`], which includes the deadline)
    /// is reported against the node before the error is returned.
    pub async fn call<F, Fut, T>(&self, service: &str, attempt: F) -> Result<T>
    where
        F: FnOnce(NodeRef) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let node_ref = self.select(service)?;
        let result = with_deadline(self.config.call_timeout, attempt(node_ref.clone())).await;

        if let Err(ref e) = result {
            if e.is_node_failure() {
                self.report_failure(&node_ref);
            }
        }
        result
    }

    /// Applies an administrative action to one node.
    pub fn set_node_status(&self, service: &str, addr: &str, action: NodeAction) -> Result<()> {
        let svc = self
            .service(service)
            .ok_or_else(|| S2sError::ServiceNotFound(service.to_string()))?;
        let not_found = || S2sError::NodeNotFound {
            service: service.to_string(),
            addr: addr.to_string(),
        };

        match action {
            // A node evicted between the lookup and the transition is dead
            NodeAction::Pause => {
                let node = svc.find(addr).ok_or_else(not_found)?;
                if !node.pause() {
                    return Err(not_found());
                }
            }
            NodeAction::Restore => {
                let node = svc.find(addr).ok_or_else(not_found)?;
                node.reactivate().ok_or_else(not_found)?;
            }
            NodeAction::Remove => {
                svc.remove(addr).ok_or_else(not_found)?;
            }
        }

        info!("Node {} of service {}: {}", addr, service, action);
        Ok(())
    }

    fn sorted_services(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self.services.lock().values().cloned().collect();
        services.sort_by(|a, b| a.name().cmp(b.name()));
        services
    }

    /// Names of all known services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        self.sorted_services()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Per-service node listing with counters, sorted by service name.
    pub fn overview(&self) -> Vec<ServiceOverview> {
        self.sorted_services()
            .iter()
            .map(|service| service.overview())
            .collect()
    }

    /// Descriptors for every known node, each with a freshly signed token.
    ///
    /// Services come in name order and nodes in round-robin order, so
    /// replaying the list rebuilds the same selection order.
    pub fn snapshot(&self) -> Vec<RegistrationDescriptor> {
        self.sorted_services()
            .iter()
            .flat_map(|service| {
                service.nodes().into_iter().map(|node| {
                    let token = sign(&self.secret, service.name(), node.addr());
                    RegistrationDescriptor::new(service.name(), node.addr(), node.tag(), token)
                })
            })
            .collect()
    }

    /// Replays descriptors through [`Directory::register`], in order.
    ///
    /// Each one is authenticated and liveness-checked like a live
    /// registration; failures are counted and skipped.
    pub async fn restore(&self, descriptors: Vec<RegistrationDescriptor>) -> RestoreReport {
        let mut report = RestoreReport::default();
        for desc in &descriptors {
            match self.register(desc).await {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    warn!("Skipped restoring {} for service {}: {}", desc.url, desc.name, e);
                    report.rejected += 1;
                }
            }
        }
        info!(
            "Restored {} node(s), rejected {}",
            report.restored, report.rejected
        );
        report
    }
}
