use s2s_common::liveness::{check_within, LivenessCheck};
use s2s_common::NodeStatus;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::node::Node;
use crate::service::Service;

/// Quarantine probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Liveness checks before giving up on a node
    pub attempts: u32,
    /// Pause between two failed checks
    pub delay: Duration,
    /// Deadline for each individual check
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(2),
        }
    }
}

/// How a probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A check passed and the node is active again
    Recovered { attempts: u32 },
    /// Every check failed and the node was removed from its service
    Evicted,
    /// Something else (an admin command, a re-registration, a removal) moved
    /// the node out of `Probing` first, so the probe left it alone
    Superseded,
}

/// Re-verifies one suspected node.
///
/// A prober only exists after its node took the `Active -> Probing`
/// transition, which admits exactly one prober per failure episode. It runs
/// as its own task and holds no directory or service lock while it checks or
/// sleeps; the only locked step is the final eviction.
pub struct HealthProber {
    service: Arc<Service>,
    node: Arc<Node>,
    liveness: Arc<dyn LivenessCheck>,
    config: ProbeConfig,
}

impl HealthProber {
    pub(crate) fn new(
        service: Arc<Service>,
        node: Arc<Node>,
        liveness: Arc<dyn LivenessCheck>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            service,
            node,
            liveness,
            config,
        }
    }

    /// Starts the probe as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<ProbeOutcome> {
        tokio::spawn(self.run())
    }

    /// Runs the probe to its verdict.
    ///
    /// Makes up to `attempts` liveness checks, each bounded by `timeout`,
    /// with `delay` between two failures. Before each check the node must
    /// still be `Probing`.
    ///
    /// # Returns
    /// - `Recovered { attempts }` - A check passed and the node is active again
    /// - `Evicted` - Every check failed and the node left its service
    /// - `Superseded` - The node left `Probing` some other way first
    pub async fn run(self) -> ProbeOutcome {
        let addr = self.node.addr().to_string();
        let service = self.service.name().to_string();
        info!("Probing node {} of service {}", addr, service);

        for attempt in 1..=self.config.attempts {
            if self.node.status() != NodeStatus::Probing {
                debug!("Node {} left probing, stopping probe", addr);
                return ProbeOutcome::Superseded;
            }

            match check_within(self.liveness.as_ref(), &addr, self.config.timeout).await {
                Ok(()) => {
                    if !self.node.end_probe() {
                        return ProbeOutcome::Superseded;
                    }
                    info!("Node {} of service {} recovered after {} attempt(s)", addr, service, attempt);
                    return ProbeOutcome::Recovered { attempts: attempt };
                }
                Err(e) => {
                    warn!(
                        "Probe {}/{} against node {} failed: {}",
                        attempt, self.config.attempts, addr, e
                    );
                }
            }

            if attempt < self.config.attempts {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        if self.service.evict(&self.node) {
            warn!(
                "Evicted node {} from service {} after {} failed probes",
                addr, service, self.config.attempts
            );
            ProbeOutcome::Evicted
        } else {
            ProbeOutcome::Superseded
        }
    }
}
