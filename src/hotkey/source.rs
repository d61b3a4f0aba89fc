//! Keyboard event sources feeding the monitor
//!
//! A source hands out one subscription per [`Channel`]. The native macOS
//! backend lives in `listener`; [`ManualSource`] is an in-process source
//! that callers drive by injecting events.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::HotkeyError;
use super::keys::{KeyCode, ModifierSet};

/// Which facility delivered an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Sees events for every process, cannot suppress them
    Global,
    /// Sees events only while this process has focus, can suppress them
    Local,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Global => write!(f, "global"),
            Channel::Local => write!(f, "local"),
        }
    }
}

/// Primitive keyboard notifications delivered to the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardEvent {
    /// The set of held modifiers changed
    ModifiersChanged(ModifierSet),
    /// A non-modifier key went down
    KeyDown {
        key_code: KeyCode,
        modifiers: ModifierSet,
    },
}

/// Outcome of delivering one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    /// The gesture completed with this event
    pub activated: bool,
    /// The event should not propagate further (local channel only)
    pub consumed: bool,
}

impl Verdict {
    pub const PASS: Self = Self {
        activated: false,
        consumed: false,
    };
}

/// Callback a source invokes for every event on a channel
pub type EventHandler = Arc<dyn Fn(KeyboardEvent) -> Verdict + Send + Sync + 'static>;

/// One live subscription; dropping it tears the subscription down
pub struct MonitorHandle {
    channel: Channel,
    teardown: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl MonitorHandle {
    pub fn new(channel: Channel, teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            channel,
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("channel", &self.channel)
            .finish()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
            debug!(channel = %self.channel, "subscription removed");
        }
    }
}

/// A facility that can observe keyboard events on a channel
pub trait EventSource: Send + Sync {
    fn subscribe(
        &self,
        channel: Channel,
        handler: EventHandler,
    ) -> Result<MonitorHandle, HotkeyError>;
}

#[derive(Default)]
struct ManualState {
    handlers: HashMap<Channel, (u64, EventHandler)>,
    failing: HashMap<Channel, HotkeyError>,
}

/// Event source driven by explicit [`ManualSource::inject`] calls
#[derive(Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
    next_id: Arc<AtomicU64>,
    subscriptions: Arc<AtomicU64>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to whoever is subscribed on `channel`
    ///
    /// Returns `None` when the channel has no live subscription.
    pub fn inject(&self, channel: Channel, event: KeyboardEvent) -> Option<Verdict> {
        let handler = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.handlers.get(&channel).map(|(_, h)| Arc::clone(h))
        };
        handler.map(|handler| handler(event))
    }

    pub fn is_live(&self, channel: Channel) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.handlers.contains_key(&channel)
    }

    /// Total number of successful subscriptions so far
    pub fn subscription_count(&self) -> u64 {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Make every later subscription on `channel` fail with `error`
    pub fn fail_channel(&self, channel: Channel, error: HotkeyError) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failing.insert(channel, error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failing.clear();
    }
}

impl EventSource for ManualSource {
    fn subscribe(
        &self,
        channel: Channel,
        handler: EventHandler,
    ) -> Result<MonitorHandle, HotkeyError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().map_err(|_| HotkeyError::Poisoned)?;
            if let Some(error) = state.failing.get(&channel) {
                return Err(error.clone());
            }
            state.handlers.insert(channel, (id, handler));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        Ok(MonitorHandle::new(channel, move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            // a newer subscription may already own the slot
            if matches!(state.handlers.get(&channel), Some((live, _)) if *live == id) {
                state.handlers.remove(&channel);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_handler(verdict: Verdict) -> (EventHandler, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        let handler: EventHandler = Arc::new(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
            verdict
        });
        (handler, count)
    }

    #[test]
    fn test_inject_without_subscriber() {
        let source = ManualSource::new();
        let event = KeyboardEvent::ModifiersChanged(ModifierSet::default());
        assert_eq!(source.inject(Channel::Global, event), None);
    }

    #[test]
    fn test_handle_drop_unsubscribes() {
        let source = ManualSource::new();
        let (handler, count) = counting_handler(Verdict::PASS);
        let handle = source.subscribe(Channel::Local, handler).unwrap();
        assert_eq!(handle.channel(), Channel::Local);
        assert!(source.is_live(Channel::Local));
        assert!(!source.is_live(Channel::Global));

        let event = KeyboardEvent::ModifiersChanged(ModifierSet::default());
        assert_eq!(source.inject(Channel::Local, event), Some(Verdict::PASS));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(handle);
        assert!(!source.is_live(Channel::Local));
        assert_eq!(source.inject(Channel::Local, event), None);
    }

    #[test]
    fn test_stale_handle_keeps_newer_subscription() {
        let source = ManualSource::new();
        let (first, _) = counting_handler(Verdict::PASS);
        let (second, _) = counting_handler(Verdict::PASS);
        let old = source.subscribe(Channel::Global, first).unwrap();
        let _new = source.subscribe(Channel::Global, second).unwrap();

        drop(old);
        assert!(source.is_live(Channel::Global));
        assert_eq!(source.subscription_count(), 2);
    }

    #[test]
    fn test_failing_channel() {
        let source = ManualSource::new();
        source.fail_channel(Channel::Global, HotkeyError::PermissionDenied);
        let (handler, _) = counting_handler(Verdict::PASS);
        let err = source.subscribe(Channel::Global, handler).unwrap_err();
        assert_eq!(err, HotkeyError::PermissionDenied);
        assert!(!source.is_live(Channel::Global));

        source.clear_failures();
        let (handler, _) = counting_handler(Verdict::PASS);
        assert!(source.subscribe(Channel::Global, handler).is_ok());
    }
}
