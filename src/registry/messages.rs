//! Typed registry messages and their wire schema.
//!
//! Every message carries an [`Action`] tag as its `action` field. Save-style parsers
//! reject a message whose tag differs from the one they expect; an action string outside
//! the closed set fails deserialization outright.

use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    registry::contracts::{AgentRegistry, Dispatch, ScannerRegistry},
    FeedError,
};

/// Closed set of domain event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    SaveAgent,
    EnableAgent,
    DisableAgent,
    SaveScanner,
    EnableScanner,
    DisableScanner,
    Link,
    Unlink,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::SaveAgent => "SaveAgent",
            Action::EnableAgent => "EnableAgent",
            Action::DisableAgent => "DisableAgent",
            Action::SaveScanner => "SaveScanner",
            Action::EnableScanner => "EnableScanner",
            Action::DisableScanner => "DisableScanner",
            Action::Link => "Link",
            Action::Unlink => "Unlink",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent enable/disable notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub action: Action,
    pub agent_id: String,
    pub tx_hash: String,
}

impl AgentMessage {
    pub fn from_enabled(event: &AgentRegistry::AgentEnabled, tx_hash: String) -> Self {
        let action = if event.enabled { Action::EnableAgent } else { Action::DisableAgent };
        Self { action, agent_id: hex_id(event.agentId), tx_hash }
    }

    /// Parses an agent action message from its wire form.
    ///
    /// # Errors
    ///
    /// [`FeedError::InvalidMessage`] on malformed JSON or an unknown action.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Full agent registration state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSaveMessage {
    #[serde(flatten)]
    pub agent: AgentMessage,
    pub enabled: bool,
    pub name: String,
    pub chain_ids: Vec<i64>,
    pub metadata: String,
    pub owner: String,
}

impl AgentSaveMessage {
    pub fn from_updated(event: &AgentRegistry::AgentUpdated, tx_hash: String) -> Self {
        Self {
            agent: AgentMessage {
                action: Action::SaveAgent,
                agent_id: hex_id(event.agentId),
                tx_hash,
            },
            enabled: true,
            // the on-chain metadata string doubles as the display name
            name: event.metadata.clone(),
            chain_ids: event.chainIds.iter().map(|id| chain_id(*id)).collect(),
            metadata: event.metadata.clone(),
            owner: event.by.to_string(),
        }
    }

    /// Parses an agent save message, rejecting any other action tag.
    ///
    /// # Errors
    ///
    /// [`FeedError::InvalidMessage`] on malformed JSON;
    /// [`FeedError::UnexpectedAction`] if `action` is not `SaveAgent`.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        let message: Self = serde_json::from_str(raw)?;
        if message.agent.action != Action::SaveAgent {
            return Err(FeedError::UnexpectedAction {
                expected: Action::SaveAgent,
                actual: message.agent.action,
            });
        }
        Ok(message)
    }
}

/// Scanner enable/disable notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerMessage {
    pub action: Action,
    pub scanner_id: String,
    pub tx_hash: String,
}

impl ScannerMessage {
    pub fn from_enabled(event: &ScannerRegistry::ScannerEnabled, tx_hash: String) -> Self {
        let action = if event.enabled { Action::EnableScanner } else { Action::DisableScanner };
        Self { action, scanner_id: hex_id(event.scannerId), tx_hash }
    }

    /// # Errors
    ///
    /// [`FeedError::InvalidMessage`] on malformed JSON or an unknown action.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Full scanner registration state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerSaveMessage {
    #[serde(flatten)]
    pub scanner: ScannerMessage,
    pub enabled: bool,
    pub chain_id: i64,
    pub metadata: String,
}

impl ScannerSaveMessage {
    pub fn from_updated(event: &ScannerRegistry::ScannerUpdated, tx_hash: String) -> Self {
        Self {
            scanner: ScannerMessage {
                action: Action::SaveScanner,
                scanner_id: hex_id(event.scannerId),
                tx_hash,
            },
            enabled: true,
            chain_id: chain_id(event.chainId),
            metadata: event.metadata.clone(),
        }
    }

    /// Parses a scanner save message, rejecting any other action tag.
    ///
    /// # Errors
    ///
    /// [`FeedError::InvalidMessage`] on malformed JSON;
    /// [`FeedError::UnexpectedAction`] if `action` is not `SaveScanner`.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        let message: Self = serde_json::from_str(raw)?;
        if message.scanner.action != Action::SaveScanner {
            return Err(FeedError::UnexpectedAction {
                expected: Action::SaveScanner,
                actual: message.scanner.action,
            });
        }
        Ok(message)
    }
}

/// Agent-to-scanner assignment change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    pub action: Action,
    pub agent_id: String,
    pub scanner_id: String,
    pub tx_hash: String,
}

impl DispatchMessage {
    pub fn from_link(event: &Dispatch::Link, tx_hash: String) -> Self {
        let action = if event.enable { Action::Link } else { Action::Unlink };
        Self {
            action,
            agent_id: hex_id(event.agentId),
            scanner_id: hex_id(event.scannerId),
            tx_hash,
        }
    }

    /// # Errors
    ///
    /// [`FeedError::InvalidMessage`] on malformed JSON or an unknown action.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

fn hex_id(id: U256) -> String {
    format!("{id:#x}")
}

fn chain_id(id: U256) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_save_round_trips_with_camel_case_keys() {
        let message = AgentSaveMessage {
            agent: AgentMessage {
                action: Action::SaveAgent,
                agent_id: "0x2a".to_owned(),
                tx_hash: "0xdead".to_owned(),
            },
            enabled: true,
            name: "meta".to_owned(),
            chain_ids: vec![1, 137],
            metadata: "meta".to_owned(),
            owner: "0x0000000000000000000000000000000000000001".to_owned(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""action":"SaveAgent""#));
        assert!(json.contains(r#""agentId":"0x2a""#));
        assert!(json.contains(r#""txHash":"0xdead""#));
        assert!(json.contains(r#""chainIds":[1,137]"#));
        assert_eq!(AgentSaveMessage::parse(&json).unwrap(), message);
    }

    #[test]
    fn agent_save_rejects_wrong_action() {
        let raw = r#"{"action":"EnableAgent","agentId":"0x2a","txHash":"0x1",
                      "enabled":true,"name":"n","chainIds":[1],"metadata":"m","owner":"0x0"}"#;
        let err = AgentSaveMessage::parse(raw).unwrap_err();
        assert!(matches!(
            err,
            FeedError::UnexpectedAction { expected: Action::SaveAgent, actual: Action::EnableAgent }
        ));
    }

    #[test]
    fn unknown_action_fails_deserialization() {
        let raw = r#"{"action":"DestroyAgent","agentId":"0x2a","txHash":"0x1"}"#;
        assert!(matches!(AgentMessage::parse(raw), Err(FeedError::InvalidMessage(_))));
    }

    #[test]
    fn scanner_save_rejects_wrong_action() {
        let raw = r#"{"action":"DisableScanner","scannerId":"0x1","txHash":"0x1",
                      "enabled":false,"chainId":1,"metadata":"m"}"#;
        assert!(matches!(
            ScannerSaveMessage::parse(raw),
            Err(FeedError::UnexpectedAction { expected: Action::SaveScanner, .. })
        ));
    }

    #[test]
    fn enabled_flag_selects_action() {
        let enabled = AgentRegistry::AgentEnabled { agentId: U256::from(7), enabled: true };
        let disabled = AgentRegistry::AgentEnabled { agentId: U256::from(7), enabled: false };
        assert_eq!(
            AgentMessage::from_enabled(&enabled, "0x1".to_owned()).action,
            Action::EnableAgent
        );
        assert_eq!(
            AgentMessage::from_enabled(&disabled, "0x1".to_owned()).action,
            Action::DisableAgent
        );
    }

    #[test]
    fn link_event_maps_to_link_or_unlink() {
        let link = Dispatch::Link {
            agentId: U256::from(1),
            scannerId: U256::from(2),
            enable: true,
        };
        let message = DispatchMessage::from_link(&link, "0x1".to_owned());
        assert_eq!(message.action, Action::Link);
        assert_eq!(message.agent_id, "0x1");
        assert_eq!(message.scanner_id, "0x2");

        let unlink = Dispatch::Link {
            agentId: U256::from(1),
            scannerId: U256::from(2),
            enable: false,
        };
        assert_eq!(DispatchMessage::from_link(&unlink, "0x1".to_owned()).action, Action::Unlink);
    }
}
