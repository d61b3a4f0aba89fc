//! Activation dispatch
//!
//! The matcher runs on the keyboard delivery thread. Activations are handed
//! to a tokio task through an unbounded channel so a slow sink never stalls
//! event delivery and no recognized gesture is lost while it catches up.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hotkey::HotkeySpec;

/// One recognized gesture
#[derive(Debug, Clone, Copy)]
pub struct Activation {
    /// Monotonic activation counter, starting at 1
    pub sequence: u64,
    /// Spec that was armed when the gesture completed
    pub spec: HotkeySpec,
    pub at: Instant,
}

/// Receiver of recognized gestures
pub trait ActivationSink: Send + Sync {
    fn on_activated(&self);
}

impl<F> ActivationSink for F
where
    F: Fn() + Send + Sync,
{
    fn on_activated(&self) {
        self()
    }
}

/// Fire-and-forget hand-off from the matcher to the sink task
#[derive(Debug, Clone)]
pub struct ActivationDispatcher {
    tx: mpsc::UnboundedSender<Activation>,
    sequence: Arc<Mutex<u64>>,
}

impl ActivationDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Activation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            tx,
            sequence: Arc::new(Mutex::new(0)),
        };
        (dispatcher, rx)
    }

    /// Queue an activation without blocking the caller.
    ///
    /// Only activations the sink task will actually see are counted.
    pub fn fire(&self, spec: HotkeySpec) {
        // Sequence numbers stay dense when concurrent fires race each other
        let mut sequence = self.sequence.lock().unwrap_or_else(|e| e.into_inner());
        let activation = Activation {
            sequence: *sequence + 1,
            spec,
            at: Instant::now(),
        };

        match self.tx.send(activation) {
            Ok(()) => {
                *sequence = activation.sequence;
                debug!(sequence = activation.sequence, "activation queued");
            }
            Err(_) => warn!(%spec, "activation sink task is gone, dropping"),
        }
    }

    /// Number of activations delivered to the sink queue so far
    pub fn fired(&self) -> u64 {
        *self.sequence.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drain activations into `sink` until every dispatcher is dropped
    pub async fn run<S: ActivationSink>(mut rx: mpsc::UnboundedReceiver<Activation>, sink: S) {
        info!("activation dispatcher started");

        while let Some(activation) = rx.recv().await {
            debug!(
                sequence = activation.sequence,
                spec = %activation.spec,
                latency_us = activation.at.elapsed().as_micros() as u64,
                "delivering activation"
            );
            sink.on_activated();
        }

        info!("activation dispatcher stopped");
    }
}
