use parking_lot::Mutex;
use s2s_common::{NodeOverview, NodeStatus};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, 0 if the clock is set before it.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Mutable part of a node, guarded by the node's own lock.
#[derive(Debug, Clone)]
struct NodeState {
    tag: String,
    status: NodeStatus,
    last_used: u64,
    calls: u64,
    failures: u64,
}

/// One registered provider instance.
///
/// The address and registration time never change. Everything else sits
/// behind a per-node lock that is only held for a field read or write, never
/// across a remote call. All status changes go through the methods below,
/// which enforce the allowed transitions:
///
/// ```text
///            failure report            probe exhausted
///   Active ─────────────────► Probing ─────────────────► Dead (removed)
///     ▲  ◄─────────────────────┘
///     │     probe succeeded
///     │
///     └──── restore / re-register ──── Paused ◄──── pause (from any live state)
/// ```
#[derive(Debug)]
pub struct Node {
    addr: String,
    registered_at: u64,
    state: Mutex<NodeState>,
}

impl Node {
    pub fn new(addr: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            registered_at: unix_now(),
            state: Mutex::new(NodeState {
                tag: tag.into(),
                status: NodeStatus::Active,
                last_used: 0,
                calls: 0,
                failures: 0,
            }),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn registered_at(&self) -> u64 {
        self.registered_at
    }

    pub fn status(&self) -> NodeStatus {
        self.state.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status().is_selectable()
    }

    pub fn tag(&self) -> String {
        self.state.lock().tag.clone()
    }

    pub(crate) fn set_tag(&self, tag: &str) {
        self.state.lock().tag = tag.to_string();
    }

    /// Counts a selection: bumps the call counter and last-used time.
    pub(crate) fn record_selection(&self) {
        let mut state = self.state.lock();
        state.calls += 1;
        state.last_used = unix_now();
    }

    /// Records a failure report and tries to take the `Active -> Probing`
    /// transition.
    ///
    /// Returns `true` only for the one caller that made the transition; that
    /// caller owns the probe. Reports against a node that is already probing
    /// or paused are counted but change nothing else.
    pub(crate) fn begin_probe(&self) -> bool {
        let mut state = self.state.lock();
        state.failures += 1;
        if state.status == NodeStatus::Active {
            state.status = NodeStatus::Probing;
            true
        } else {
            false
        }
    }

    /// `Probing -> Active`. Returns `false` if the node left `Probing` in
    /// the meantime (paused, restored, re-registered or removed).
    pub(crate) fn end_probe(&self) -> bool {
        let mut state = self.state.lock();
        if state.status == NodeStatus::Probing {
            state.status = NodeStatus::Active;
            true
        } else {
            false
        }
    }

    /// `Active | Probing | Paused -> Paused`.
    pub(crate) fn pause(&self) -> bool {
        let mut state = self.state.lock();
        match state.status {
            NodeStatus::Dead => false,
            _ => {
                state.status = NodeStatus::Paused;
                true
            }
        }
    }

    /// Makes the node selectable again after a restore command or a
    /// successful re-registration. Returns the status it left, or `None` if
    /// the node is dead.
    pub(crate) fn reactivate(&self) -> Option<NodeStatus> {
        let mut state = self.state.lock();
        match state.status {
            NodeStatus::Dead => None,
            previous => {
                state.status = NodeStatus::Active;
                Some(previous)
            }
        }
    }

    /// Marks the node dead if it is still probing. Called by the service
    /// while it holds its structural lock, right before removing the node.
    pub(crate) fn kill_if_probing(&self) -> bool {
        let mut state = self.state.lock();
        if state.status == NodeStatus::Probing {
            state.status = NodeStatus::Dead;
            true
        } else {
            false
        }
    }

    /// Unconditionally marks the node dead, for explicit removal.
    pub(crate) fn kill(&self) {
        self.state.lock().status = NodeStatus::Dead;
    }

    pub fn calls(&self) -> u64 {
        self.state.lock().calls
    }

    pub fn failures(&self) -> u64 {
        self.state.lock().failures
    }

    pub fn overview(&self) -> NodeOverview {
        let state = self.state.lock().clone();
        NodeOverview {
            tag: state.tag,
            url: self.addr.clone(),
            status: state.status,
            counter: state.calls,
            failed: state.failures,
            reg_time: self.registered_at,
            last_time: state.last_used,
        }
    }
}
