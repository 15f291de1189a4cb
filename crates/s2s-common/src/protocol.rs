//! Wire types exchanged between providers, admins and the directory.
//!
//! Field names follow the JSON conventions providers already speak
//! (`s2sKey`, `regTime`, ...), so renames are spelled out per field.

use crate::error::{Result, S2sError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A provider's request to join (or leave) a service.
///
/// Also the unit of the persistence snapshot: the directory re-derives a
/// fresh token for each known node when it writes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tag: String,
    #[serde(rename = "s2sKey", default)]
    pub s2s_key: String,
}

impl RegistrationDescriptor {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        tag: impl Into<String>,
        s2s_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            tag: tag.into(),
            s2s_key: s2s_key.into(),
        }
    }

    /// Checks the required fields are present.
    ///
    /// This is a shape check only; token validation lives in
    /// [`crate::auth::validate`].
    pub fn check_fields(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(S2sError::InvalidDescriptor("empty service name".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(S2sError::InvalidDescriptor("empty provider url".to_string()));
        }
        if self.s2s_key.is_empty() {
            return Err(S2sError::AuthenticationFailed);
        }
        Ok(())
    }
}

/// Health status of a node.
///
/// `Dead` is terminal and only exists for the instant a node is being
/// removed from its service, so it never shows up in an overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Eligible for selection
    Active,
    /// Suspected after a failure report, under re-verification
    Probing,
    /// Administratively suspended
    Paused,
    /// Removed from its service
    Dead,
}

impl NodeStatus {
    pub fn is_selectable(self) -> bool {
        self == NodeStatus::Active
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Active => "active",
            NodeStatus::Probing => "probing",
            NodeStatus::Paused => "paused",
            NodeStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Administrative command against a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    Pause,
    Restore,
    Remove,
}

impl FromStr for NodeAction {
    type Err = S2sError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // "hang" is what older admin consoles send
            "pause" | "hang" => Ok(NodeAction::Pause),
            "restore" => Ok(NodeAction::Restore),
            "remove" => Ok(NodeAction::Remove),
            other => Err(S2sError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeAction::Pause => "pause",
            NodeAction::Restore => "restore",
            NodeAction::Remove => "remove",
        };
        f.write_str(s)
    }
}

/// Body of the admin node-status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNodeStatusRequest {
    #[serde(rename = "s2sName")]
    pub service: String,
    pub addr: String,
    pub ope: String,
}

/// Generic acknowledgement returned by registration and admin endpoints.
///
/// `status` is 0 on success and -1 on failure; `msg` carries the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: i32,
    pub msg: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: 0,
            msg: "OK".to_string(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: -1,
            msg: msg.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Per-node line of the overview query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOverview {
    pub tag: String,
    pub url: String,
    pub status: NodeStatus,
    /// Times this node was handed out by selection
    pub counter: u64,
    /// Failure reports received against this node
    pub failed: u64,
    /// Unix seconds
    #[serde(rename = "regTime")]
    pub reg_time: u64,
    /// Unix seconds, 0 before the first selection
    #[serde(rename = "lastTime")]
    pub last_time: u64,
}

/// Per-service block of the overview query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOverview {
    pub name: String,
    pub members: Vec<NodeOverview>,
    /// Sum of the members' selection counters
    pub counter: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_json_field_names() {
        let desc: RegistrationDescriptor = serde_json::from_value(json!({
            "name": "exec",
            "url": "10.0.0.1:81",
            "tag": "gpu",
            "s2sKey": "abcd",
        }))
        .unwrap();
        assert_eq!(desc.name, "exec");
        assert_eq!(desc.s2s_key, "abcd");

        let back = serde_json::to_value(&desc).unwrap();
        assert_eq!(back["s2sKey"], "abcd");
    }

    #[test]
    fn test_descriptor_tag_optional() {
        let desc: RegistrationDescriptor = serde_json::from_value(json!({
            "name": "exec",
            "url": "10.0.0.1:81",
            "s2sKey": "abcd",
        }))
        .unwrap();
        assert_eq!(desc.tag, "");
        assert!(desc.check_fields().is_ok());
    }

    #[test]
    fn test_descriptor_check_fields() {
        let empty_name = RegistrationDescriptor::new("", "a:1", "", "k");
        assert!(matches!(
            empty_name.check_fields(),
            Err(S2sError::InvalidDescriptor(_))
        ));

        let empty_url = RegistrationDescriptor::new("exec", "  ", "", "k");
        assert!(matches!(
            empty_url.check_fields(),
            Err(S2sError::InvalidDescriptor(_))
        ));

        let missing_key = RegistrationDescriptor::new("exec", "a:1", "", "");
        assert!(matches!(
            missing_key.check_fields(),
            Err(S2sError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_node_action_parse() {
        assert_eq!("pause".parse::<NodeAction>().unwrap(), NodeAction::Pause);
        assert_eq!("hang".parse::<NodeAction>().unwrap(), NodeAction::Pause);
        assert_eq!("restore".parse::<NodeAction>().unwrap(), NodeAction::Restore);
        assert_eq!("remove".parse::<NodeAction>().unwrap(), NodeAction::Remove);
        assert!(matches!(
            "reboot".parse::<NodeAction>(),
            Err(S2sError::InvalidAction(a)) if a == "reboot"
        ));
    }

    #[test]
    fn test_node_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(NodeStatus::Probing).unwrap(), json!("probing"));
        assert_eq!(NodeStatus::Paused.to_string(), "paused");
        assert!(NodeStatus::Active.is_selectable());
        assert!(!NodeStatus::Probing.is_selectable());
    }

    #[test]
    fn test_set_node_status_request_field_names() {
        let req: SetNodeStatusRequest = serde_json::from_value(json!({
            "s2sName": "exec",
            "addr": "a:1",
            "ope": "remove",
        }))
        .unwrap();
        assert_eq!(req.service, "exec");
        assert_eq!(req.ope, "remove");
    }

    #[test]
    fn test_overview_field_names() {
        let node = NodeOverview {
            tag: "t".to_string(),
            url: "a:1".to_string(),
            status: NodeStatus::Active,
            counter: 3,
            failed: 1,
            reg_time: 100,
            last_time: 0,
        };
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["regTime"], 100);
        assert_eq!(value["lastTime"], 0);
        assert_eq!(value["status"], "active");
    }

    #[test]
    fn test_ack() {
        assert!(Ack::ok().is_ok());
        let err = Ack::error("s2s key not right");
        assert!(!err.is_ok());
        assert_eq!(err.status, -1);
    }
}
