//! Scripted liveness check for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use s2s_common::liveness::LivenessCheck;
use s2s_common::{Result, S2sError};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Answers liveness checks from a per-address script.
///
/// Scripted answers are consumed first; after that the address's standing
/// health flag applies. Unknown addresses are healthy. An optional delay
/// makes every check take that long before answering.
#[derive(Default)]
pub(crate) struct ScriptedLiveness {
    delay: Option<Duration>,
    healthy: Mutex<HashMap<String, bool>>,
    scripts: Mutex<HashMap<String, VecDeque<bool>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedLiveness {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn set_healthy(&self, addr: &str, healthy: bool) {
        self.healthy.lock().insert(addr.to_string(), healthy);
    }

    pub(crate) fn script(&self, addr: &str, answers: &[bool]) {
        self.scripts
            .lock()
            .entry(addr.to_string())
            .or_default()
            .extend(answers.iter().copied());
    }

    pub(crate) fn calls(&self, addr: &str) -> usize {
        self.calls.lock().get(addr).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LivenessCheck for ScriptedLiveness {
    async fn check(&self, addr: &str) -> Result<()> {
        *self.calls.lock().entry(addr.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripts.lock().get_mut(addr).and_then(|q| q.pop_front());
        let healthy = scripted
            .unwrap_or_else(|| self.healthy.lock().get(addr).copied().unwrap_or(true));

        if healthy {
            Ok(())
        } else {
            Err(S2sError::LivenessCheckFailed(format!("{} is down", addr)))
        }
    }
}
