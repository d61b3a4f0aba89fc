//! hotkey-daemon: global activation hotkey for a Vietnamese input-method utility
//!
//! Recognizes one user-configured gesture no matter which application has
//! keyboard focus:
//! - Literal-key gestures: an exact key pressed with an exact modifier set
//! - Chords: a modifier set pressed and released with no other key between
//!
//! Settings arrive through a [`settings::SettingsSource`] and recognized
//! gestures leave through an [`activation::ActivationSink`]. Everything in
//! between (debounced re-arming, the dual-channel monitor and the gesture
//! matcher) lives here.

pub mod activation;
pub mod config;
pub mod events;
pub mod hotkey;
pub mod ipc;
pub mod lifecycle;
pub mod settings;
pub mod state;
