//! Modifier key definitions and set arithmetic
//!
//! Provides the fixed modifier universe, masking of raw platform flag
//! words and the set comparisons used by the gesture matcher.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Modifier flag masks, laid out like macOS `CGEventFlags`
pub mod flags {
    /// Shift key modifier flag
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key modifier flag
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 0x0008_0000;
    /// Command/Super key modifier flag
    pub const COMMAND: u64 = 0x0010_0000;
    /// Function key modifier flag
    pub const FUNCTION: u64 = 0x0080_0000;

    /// Every bit the matcher is allowed to look at
    pub const UNIVERSE: u64 = SHIFT | CONTROL | OPTION | COMMAND | FUNCTION;
}

/// Platform virtual key code of a non-modifier key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl KeyCode {
    /// Stand-in for a key code that does not fit in 16 bits
    pub const UNKNOWN: KeyCode = KeyCode(u16::MAX);

    /// Convert a raw platform key code, downgrading out-of-range values to
    /// [`KeyCode::UNKNOWN`] instead of dropping the key press
    pub fn from_raw(raw: i64) -> Self {
        u16::try_from(raw).map(KeyCode).unwrap_or(Self::UNKNOWN)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

/// A set of modifier keys drawn from {control, option, command, shift, function}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierSet {
    /// Control key is held
    pub control: bool,
    /// Option/Alt key is held
    pub option: bool,
    /// Command/Super key is held
    pub command: bool,
    /// Shift key is held
    pub shift: bool,
    /// Function key is held
    pub function: bool,
}

impl ModifierSet {
    pub const EMPTY: Self = Self {
        control: false,
        option: false,
        command: false,
        shift: false,
        function: false,
    };

    /// Decode a raw platform flag word, ignoring bits outside the universe
    pub fn from_raw(raw: u64) -> Self {
        Self::from_bits(raw & flags::UNIVERSE)
    }

    fn from_bits(bits: u64) -> Self {
        Self {
            control: bits & flags::CONTROL != 0,
            option: bits & flags::OPTION != 0,
            command: bits & flags::COMMAND != 0,
            shift: bits & flags::SHIFT != 0,
            function: bits & flags::FUNCTION != 0,
        }
    }

    /// Encode back into the raw flag layout
    pub fn bits(&self) -> u64 {
        let mut bits = 0;
        if self.control {
            bits |= flags::CONTROL;
        }
        if self.option {
            bits |= flags::OPTION;
        }
        if self.command {
            bits |= flags::COMMAND;
        }
        if self.shift {
            bits |= flags::SHIFT;
        }
        if self.function {
            bits |= flags::FUNCTION;
        }
        bits
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }

    /// Every modifier held in `self` is also held in `other`
    pub fn is_subset(&self, other: &Self) -> bool {
        self.bits() & !other.bits() == 0
    }

    /// Subset of `other` and not equal to it
    pub fn is_strict_subset(&self, other: &Self) -> bool {
        self != other && self.is_subset(other)
    }

    /// Superset of `other` and not equal to it
    pub fn is_strict_superset(&self, other: &Self) -> bool {
        other.is_strict_subset(self)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self::from_bits(self.bits() | other.bits())
    }

    pub fn len(&self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.control, "ctrl"),
            (self.option, "opt"),
            (self.command, "cmd"),
            (self.shift, "shift"),
            (self.function, "fn"),
        ];
        let held: Vec<&str> = names
            .iter()
            .filter(|(held, _)| *held)
            .map(|(_, name)| *name)
            .collect();

        if held.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", held.join("+"))
        }
    }
}
