//! Hotkey module for global keyboard event listening
//!
//! Holds the gesture specification, the event sources that observe the
//! keyboard on the global and local channels, and the monitor that arms
//! both channels against one matcher.

mod error;
mod keys;
#[cfg(target_os = "macos")]
mod listener;
mod monitor;
mod source;
mod spec;

pub use error::HotkeyError;
pub use keys::{flags, KeyCode, ModifierSet};
#[cfg(target_os = "macos")]
pub use listener::EventTapSource;
pub use monitor::Monitor;
pub use source::{Channel, EventHandler, EventSource, KeyboardEvent, ManualSource, MonitorHandle, Verdict};
pub use spec::{HotkeySettings, HotkeySpec};
