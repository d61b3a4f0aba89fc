//! Native keyboard channels using macOS CGEventTap
//!
//! Each subscription runs one event tap on a dedicated thread with its own
//! CFRunLoop. The global channel is a listen-only tap that skips events
//! headed for this process. The local channel is an active tap that only
//! handles events headed for this process and can drop the ones it consumes,
//! which also suppresses the alert sound for an unhandled shortcut.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use core_foundation::base::Boolean;
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tracing::{debug, error, info, warn};

use super::error::HotkeyError;
use super::keys::{KeyCode, ModifierSet};
use super::source::{Channel, EventHandler, EventSource, KeyboardEvent, MonitorHandle};

const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> Boolean;
}

/// Event source backed by two session event taps
#[derive(Debug, Default, Clone, Copy)]
pub struct EventTapSource;

impl EventTapSource {
    pub fn new() -> Self {
        Self
    }

    pub fn has_accessibility_permission() -> bool {
        // SAFETY: AXIsProcessTrusted takes no parameters and only reads process trust state.
        unsafe { AXIsProcessTrusted() != 0 }
    }
}

impl EventSource for EventTapSource {
    fn subscribe(
        &self,
        channel: Channel,
        handler: EventHandler,
    ) -> Result<MonitorHandle, HotkeyError> {
        if !Self::has_accessibility_permission() {
            return Err(HotkeyError::PermissionDenied);
        }

        let running = Arc::new(AtomicBool::new(true));
        let (startup_tx, startup_rx) = mpsc::channel::<Result<(), HotkeyError>>();
        let thread_running = Arc::clone(&running);

        let join_handle = thread::Builder::new()
            .name(format!("hotkey-{channel}-tap"))
            .spawn(move || {
                info!(%channel, "event tap thread started");
                if let Err(e) = run_event_loop(channel, handler, &thread_running, &startup_tx) {
                    error!(%channel, ?e, "event tap error");
                    let _ = startup_tx.send(Err(e));
                }
                info!(%channel, "event tap thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(MonitorHandle::new(channel, move || {
                running.store(false, Ordering::SeqCst);
                if join_handle.join().is_err() {
                    warn!(%channel, "event tap thread panicked");
                }
            })),
            Ok(Err(e)) => {
                let _ = join_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = join_handle.join();
                Err(HotkeyError::TapCreation(channel))
            }
        }
    }
}

/// Translate a tapped event into the matcher's vocabulary
fn decode(event_type: CGEventType, event: &CGEvent) -> Option<KeyboardEvent> {
    let modifiers = ModifierSet::from_raw(event.get_flags().bits());
    match event_type {
        CGEventType::FlagsChanged => Some(KeyboardEvent::ModifiersChanged(modifiers)),
        CGEventType::KeyDown => {
            let raw = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            Some(KeyboardEvent::KeyDown {
                key_code: KeyCode::from_raw(raw),
                modifiers,
            })
        }
        _ => None,
    }
}

/// Run the CFRunLoop with the event tap until `running` is cleared
fn run_event_loop(
    channel: Channel,
    handler: EventHandler,
    running: &AtomicBool,
    startup_tx: &mpsc::Sender<Result<(), HotkeyError>>,
) -> Result<(), HotkeyError> {
    let own_pid = i64::from(std::process::id());
    let tap_disabled = Arc::new(AtomicBool::new(false));
    let callback_disabled = Arc::clone(&tap_disabled);

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        if matches!(
            event_type,
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput
        ) {
            callback_disabled.store(true, Ordering::SeqCst);
            return Some(event.clone());
        }

        let target = event.get_integer_value_field(EventField::EVENT_TARGET_UNIX_PROCESS_ID);
        if (target == own_pid) != (channel == Channel::Local) {
            return Some(event.clone());
        }

        let Some(keyboard_event) = decode(event_type, event) else {
            return Some(event.clone());
        };
        if handler(keyboard_event).consumed {
            None
        } else {
            Some(event.clone())
        }
    };

    let options = match channel {
        Channel::Global => CGEventTapOptions::ListenOnly,
        Channel::Local => CGEventTapOptions::Default,
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::AnnotatedSession,
        CGEventTapPlacement::HeadInsertEventTap,
        options,
        vec![CGEventType::FlagsChanged, CGEventType::KeyDown],
        callback,
    )
    .map_err(|_| {
        error!(%channel, "failed to create event tap - is Accessibility permission granted?");
        HotkeyError::TapCreation(channel)
    })?;

    tap.enable();

    let run_loop_source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HotkeyError::TapCreation(channel))?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    debug!(%channel, "event tap created and enabled");
    let _ = startup_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
        }

        if tap_disabled.swap(false, Ordering::SeqCst) {
            warn!(%channel, "event tap disabled by the system, re-enabling");
            tap.enable();
        }
    }

    // Tap is cleaned up when it goes out of scope
    Ok(())
}
