//! Hotkey specification and the settings view it is built from

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::HotkeyError;
use super::keys::{KeyCode, ModifierSet};

/// The gesture to recognize
///
/// `key_code == None` selects modifier-only (chord) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeySpec {
    pub modifiers: ModifierSet,
    pub key_code: Option<KeyCode>,
}

impl HotkeySpec {
    pub fn is_chord(&self) -> bool {
        self.key_code.is_none()
    }
}

impl fmt::Display for HotkeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_code {
            Some(key) => write!(f, "{}+{}", self.modifiers, key),
            None => write!(f, "{} (chord)", self.modifiers),
        }
    }
}

/// Hotkey configuration as supplied by the settings source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub enabled: bool,
    pub modifiers: ModifierSet,
    pub key_code: Option<KeyCode>,
}

impl Default for HotkeySettings {
    /// Control+Shift chord
    fn default() -> Self {
        Self {
            enabled: true,
            modifiers: ModifierSet {
                control: true,
                shift: true,
                ..ModifierSet::default()
            },
            key_code: None,
        }
    }
}

impl HotkeySettings {
    /// Turn settings into the spec to arm, `None` when disabled
    pub fn validate(&self) -> Result<Option<HotkeySpec>, HotkeyError> {
        if !self.enabled {
            return Ok(None);
        }
        if self.modifiers.is_empty() {
            return Err(HotkeyError::EmptyModifiers);
        }
        Ok(Some(HotkeySpec {
            modifiers: self.modifiers,
            key_code: self.key_code,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_yields_no_spec() {
        let settings = HotkeySettings {
            enabled: false,
            modifiers: ModifierSet::default(),
            key_code: None,
        };
        assert_eq!(settings.validate(), Ok(None));
    }

    #[test]
    fn test_empty_modifiers_rejected() {
        let settings = HotkeySettings {
            enabled: true,
            modifiers: ModifierSet::default(),
            key_code: Some(KeyCode(9)),
        };
        assert_eq!(settings.validate(), Err(HotkeyError::EmptyModifiers));
    }

    #[test]
    fn test_literal_spec() {
        let settings = HotkeySettings {
            key_code: Some(KeyCode(9)),
            ..HotkeySettings::default()
        };
        let spec = settings.validate().unwrap().unwrap();
        assert!(!spec.is_chord());
        assert_eq!(spec.to_string(), "ctrl+shift+key#9");
    }

    #[test]
    fn test_settings_json_shape() {
        let json = r#"{"enabled":true,"modifiers":{"option":true},"key_code":49}"#;
        let settings: HotkeySettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.key_code, Some(KeyCode(49)));
        assert!(settings.modifiers.option);
        assert_eq!(settings.modifiers.len(), 1);
    }
}
