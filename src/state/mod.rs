//! Gesture state machine
//!
//! Provides the matcher that turns keyboard events into activations:
//! - Literal-key gestures: exact key plus exact modifiers on key-down
//! - Chords: modifier-only press followed by a clean release

mod machine;

pub use machine::{ChordState, Matcher};
