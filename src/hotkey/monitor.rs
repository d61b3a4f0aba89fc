//! Dual-channel monitor
//!
//! Arms the global and local channels of an [`EventSource`] against a
//! single matcher. Both channels call [`Monitor::deliver`], so matching
//! logic is shared. An arming generation counter makes arm/disarm atomic
//! with respect to delivery: events from torn-down or not-yet-complete
//! subscriptions are ignored.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::activation::ActivationDispatcher;
use crate::state::{ChordState, Matcher};

use super::error::HotkeyError;
use super::source::{Channel, EventHandler, EventSource, KeyboardEvent, MonitorHandle, Verdict};
use super::spec::HotkeySpec;

#[derive(Debug, Default)]
struct Armed {
    generation: u64,
    matcher: Option<Matcher>,
    handles: Vec<MonitorHandle>,
}

struct Inner {
    source: Box<dyn EventSource>,
    dispatcher: ActivationDispatcher,
    armed: Mutex<Armed>,
}

/// Owns both keyboard subscriptions and the matcher they feed
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(source: impl EventSource + 'static, dispatcher: ActivationDispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Box::new(source),
                dispatcher,
                armed: Mutex::new(Armed::default()),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Armed>, HotkeyError> {
        self.inner.armed.lock().map_err(|_| HotkeyError::Poisoned)
    }

    /// Subscribe both channels and start matching `spec`
    ///
    /// On failure both channels are down and the monitor stays disarmed.
    pub fn arm(&self, spec: HotkeySpec) -> Result<(), HotkeyError> {
        let generation = self.disarm()?;

        let mut handles = Vec::with_capacity(2);
        for channel in [Channel::Global, Channel::Local] {
            let handler = self.handler(channel, generation);
            match self.inner.source.subscribe(channel, handler) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(%channel, error = %e, "failed to subscribe, hotkey unavailable");
                    // dropping the handles tears down whatever did subscribe
                    drop(handles);
                    return Err(e);
                }
            }
        }

        let mut armed = self.lock()?;
        if armed.generation != generation {
            // disarmed or re-armed while we were subscribing
            debug!(generation, "arming superseded");
            drop(armed);
            drop(handles);
            return Ok(());
        }
        armed.matcher = Some(Matcher::new(spec));
        armed.handles = handles;
        info!(%spec, generation, "hotkey armed");
        Ok(())
    }

    /// Remove both subscriptions and forget any chord in progress
    ///
    /// Returns the new arming generation.
    pub fn disarm(&self) -> Result<u64, HotkeyError> {
        let (generation, handles, was_armed) = {
            let mut armed = self.lock()?;
            armed.generation += 1;
            let was_armed = armed.matcher.take().is_some();
            (armed.generation, std::mem::take(&mut armed.handles), was_armed)
        };

        // subscriptions are torn down outside the lock since a delivery
        // thread may be waiting on it
        drop(handles);
        if was_armed {
            info!(generation, "hotkey disarmed");
        }
        Ok(generation)
    }

    pub fn is_armed(&self) -> bool {
        self.lock().map(|armed| armed.matcher.is_some()).unwrap_or(false)
    }

    /// Spec currently being matched
    pub fn spec(&self) -> Option<HotkeySpec> {
        self.lock()
            .ok()
            .and_then(|armed| armed.matcher.as_ref().map(|m| *m.spec()))
    }

    pub fn chord_state(&self) -> Option<ChordState> {
        self.lock()
            .ok()
            .and_then(|armed| armed.matcher.as_ref().map(Matcher::chord_state))
    }

    /// Match one event from the current arming
    pub fn deliver(&self, channel: Channel, event: KeyboardEvent) -> Verdict {
        self.deliver_for(self.current_generation(), channel, event)
    }

    fn current_generation(&self) -> u64 {
        self.lock().map(|armed| armed.generation).unwrap_or(0)
    }

    fn deliver_for(&self, generation: u64, channel: Channel, event: KeyboardEvent) -> Verdict {
        let Ok(mut armed) = self.lock() else {
            return Verdict::PASS;
        };
        if armed.generation != generation {
            return Verdict::PASS;
        }
        let Some(matcher) = armed.matcher.as_mut() else {
            return Verdict::PASS;
        };

        let verdict = matcher.handle(channel, event);
        if verdict.activated {
            self.inner.dispatcher.fire(*matcher.spec());
        }
        verdict
    }

    fn handler(&self, channel: Channel, generation: u64) -> EventHandler {
        let monitor = self.clone();
        Arc::new(move |event| monitor.deliver_for(generation, channel, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::hotkey::{flags, KeyCode, ManualSource, ModifierSet};
    use tokio::sync::mpsc::UnboundedReceiver;

    type Setup = (Monitor, ManualSource, ActivationDispatcher, UnboundedReceiver<Activation>);

    fn setup() -> Setup {
        let source = ManualSource::new();
        let (dispatcher, rx) = ActivationDispatcher::new();
        let monitor = Monitor::new(source.clone(), dispatcher.clone());
        (monitor, source, dispatcher, rx)
    }

    fn chord(raw: u64) -> HotkeySpec {
        HotkeySpec {
            modifiers: ModifierSet::from_raw(raw),
            key_code: None,
        }
    }

    fn changed(raw: u64) -> KeyboardEvent {
        KeyboardEvent::ModifiersChanged(ModifierSet::from_raw(raw))
    }

    #[test]
    fn test_arm_subscribes_both_channels() {
        let (monitor, source, _, _rx) = setup();
        monitor.arm(chord(flags::CONTROL)).unwrap();
        assert!(monitor.is_armed());
        assert!(source.is_live(Channel::Global));
        assert!(source.is_live(Channel::Local));

        monitor.disarm().unwrap();
        assert!(!monitor.is_armed());
        assert!(!source.is_live(Channel::Global));
        assert!(!source.is_live(Channel::Local));
        assert_eq!(monitor.spec(), None);
    }

    #[test]
    fn test_failed_channel_leaves_nothing_armed() {
        let (monitor, source, _, _rx) = setup();
        source.fail_channel(Channel::Local, HotkeyError::PermissionDenied);

        let err = monitor.arm(chord(flags::CONTROL)).unwrap_err();
        assert_eq!(err, HotkeyError::PermissionDenied);
        assert!(!monitor.is_armed());
        assert!(!source.is_live(Channel::Global));
        assert!(!source.is_live(Channel::Local));
    }

    #[test]
    fn test_literal_key_through_both_channels() {
        let (monitor, source, dispatcher, _rx) = setup();
        monitor
            .arm(HotkeySpec {
                modifiers: ModifierSet::from_raw(flags::COMMAND),
                key_code: Some(KeyCode(9)),
            })
            .unwrap();

        let event = KeyboardEvent::KeyDown {
            key_code: KeyCode(9),
            modifiers: ModifierSet::from_raw(flags::COMMAND | 0x100),
        };
        let local = source.inject(Channel::Local, event).unwrap();
        assert_eq!(local, Verdict { activated: true, consumed: true });
        let global = source.inject(Channel::Global, event).unwrap();
        assert_eq!(global, Verdict { activated: true, consumed: false });
        assert_eq!(dispatcher.fired(), 2);
    }

    #[test]
    fn test_chord_fires_once() {
        let (monitor, source, dispatcher, _rx) = setup();
        monitor.arm(chord(flags::CONTROL | flags::SHIFT)).unwrap();

        for raw in [flags::CONTROL, flags::CONTROL | flags::SHIFT, flags::SHIFT, 0] {
            source.inject(Channel::Global, changed(raw));
        }
        assert_eq!(dispatcher.fired(), 1);
    }

    #[test]
    fn test_rearm_mid_chord_uses_fresh_state() {
        let (monitor, source, dispatcher, _rx) = setup();
        monitor.arm(chord(flags::CONTROL | flags::SHIFT)).unwrap();
        source.inject(Channel::Global, changed(flags::CONTROL | flags::SHIFT));

        // the user switches to a command chord while ctrl+shift is held
        monitor.arm(chord(flags::COMMAND)).unwrap();
        assert_eq!(monitor.chord_state(), Some(ChordState::default()));

        source.inject(Channel::Global, changed(0));
        assert_eq!(dispatcher.fired(), 0);

        source.inject(Channel::Global, changed(flags::COMMAND));
        source.inject(Channel::Global, changed(0));
        assert_eq!(dispatcher.fired(), 1);
    }

    #[test]
    fn test_rearm_with_same_spec_keeps_coverage() {
        let (monitor, source, dispatcher, _rx) = setup();
        let spec = chord(flags::OPTION);
        monitor.arm(spec).unwrap();
        monitor.arm(spec).unwrap();
        assert_eq!(source.subscription_count(), 4);
        assert!(source.is_live(Channel::Global));
        assert!(source.is_live(Channel::Local));

        source.inject(Channel::Local, changed(flags::OPTION));
        source.inject(Channel::Local, changed(0));
        assert_eq!(dispatcher.fired(), 1);
    }

    #[test]
    fn test_stale_handler_is_ignored() {
        let (monitor, _source, dispatcher, _rx) = setup();
        monitor.arm(chord(flags::CONTROL)).unwrap();
        let stale = monitor.handler(Channel::Global, 0);

        stale(changed(flags::CONTROL));
        stale(changed(0));
        assert_eq!(dispatcher.fired(), 0);
        assert_eq!(monitor.chord_state(), Some(ChordState::default()));
    }

    #[test]
    fn test_deliver_while_disarmed() {
        let (monitor, _, dispatcher, _rx) = setup();
        assert_eq!(monitor.deliver(Channel::Local, changed(flags::CONTROL)), Verdict::PASS);
        assert_eq!(dispatcher.fired(), 0);
    }
}
