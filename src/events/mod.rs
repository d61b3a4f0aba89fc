//! Events module for hotkey lifecycle notifications
//!
//! Emitted by the settings bridge and the activation sink, and pushed to
//! subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::hotkey::HotkeySpec;

/// Events describing what the hotkey subsystem just did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotkeyEvent {
    /// Both channels are live and matching `spec`
    Armed { spec: HotkeySpec },

    /// The hotkey was turned off in settings
    Disarmed,

    /// The configured gesture was recognized
    Activated,

    /// A channel could not be established; nothing is armed
    Unavailable { reason: String },

    /// Settings were malformed and ignored
    Rejected { reason: String },
}

impl std::fmt::Display for HotkeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotkeyEvent::Armed { spec } => write!(f, "ARMED ({spec})"),
            HotkeyEvent::Disarmed => write!(f, "DISARMED"),
            HotkeyEvent::Activated => write!(f, "ACTIVATED"),
            HotkeyEvent::Unavailable { reason } => write!(f, "UNAVAILABLE ({reason})"),
            HotkeyEvent::Rejected { reason } => write!(f, "REJECTED ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{KeyCode, ModifierSet};

    #[test]
    fn test_event_serialization() {
        let event = HotkeyEvent::Armed {
            spec: HotkeySpec {
                modifiers: ModifierSet {
                    command: true,
                    ..ModifierSet::default()
                },
                key_code: Some(KeyCode(49)),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"armed""#));
        assert!(json.contains(r#""key_code":49"#));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"unavailable","reason":"no permission"}"#;
        let event: HotkeyEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            HotkeyEvent::Unavailable {
                reason: "no permission".to_string()
            }
        );
        assert_eq!(event.to_string(), "UNAVAILABLE (no permission)");
    }
}
