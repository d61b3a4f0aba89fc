//! Gesture matcher
//!
//! Decides from a stream of modifier changes and key presses whether the
//! configured gesture has just completed. Literal-key gestures are matched
//! statelessly on key-down; chords are tracked by [`ChordState`].

use tracing::{debug, trace};

use crate::hotkey::{Channel, HotkeySpec, KeyboardEvent, ModifierSet, Verdict};

/// Bookkeeping for modifier-only gestures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChordState {
    /// Modifiers currently believed to be held
    pub last_flags: ModifierSet,
    /// A non-modifier key went down since the chord started
    pub interleaved_key_pressed: bool,
}

/// How a modifier change relates to the previously held set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Press,
    Release,
    Unchanged,
}

impl Transition {
    fn classify(previous: &ModifierSet, current: &ModifierSet) -> Self {
        if current == previous {
            Self::Unchanged
        } else if current.is_strict_superset(previous) {
            Self::Press
        } else {
            // strict subsets and mixed add/remove both count as a release
            Self::Release
        }
    }
}

/// Matches events against one armed [`HotkeySpec`]
#[derive(Debug)]
pub struct Matcher {
    spec: HotkeySpec,
    chord: ChordState,
}

impl Matcher {
    pub fn new(spec: HotkeySpec) -> Self {
        Self {
            spec,
            chord: ChordState::default(),
        }
    }

    pub fn spec(&self) -> &HotkeySpec {
        &self.spec
    }

    pub fn chord_state(&self) -> ChordState {
        self.chord
    }

    /// Process one event, returning whether it completed the gesture
    pub fn handle(&mut self, channel: Channel, event: KeyboardEvent) -> Verdict {
        match (self.spec.key_code, event) {
            (Some(expected), KeyboardEvent::KeyDown { key_code, modifiers }) => {
                let activated = key_code == expected && modifiers == self.spec.modifiers;
                if activated {
                    debug!(%channel, spec = %self.spec, "literal hotkey matched");
                }
                Verdict {
                    activated,
                    consumed: activated && channel == Channel::Local,
                }
            }
            (Some(_), KeyboardEvent::ModifiersChanged(_)) => Verdict::PASS,
            (None, KeyboardEvent::KeyDown { .. }) => {
                self.chord.interleaved_key_pressed = true;
                Verdict::PASS
            }
            (None, KeyboardEvent::ModifiersChanged(current)) => {
                let activated = self.handle_modifier_change(current);
                if activated {
                    debug!(%channel, spec = %self.spec, "chord released");
                }
                Verdict {
                    activated,
                    consumed: false,
                }
            }
        }
    }

    fn handle_modifier_change(&mut self, current: ModifierSet) -> bool {
        let previous = self.chord.last_flags;
        let transition = Transition::classify(&previous, &current);
        trace!(?transition, %previous, %current, "modifier transition");

        match transition {
            Transition::Unchanged => false,
            Transition::Press => {
                self.chord.interleaved_key_pressed = false;
                self.chord.last_flags = current;
                false
            }
            Transition::Release => {
                let fire =
                    previous == self.spec.modifiers && !self.chord.interleaved_key_pressed;
                self.chord.last_flags = current;
                if current.is_empty() {
                    self.chord.interleaved_key_pressed = false;
                }
                fire
            }
        }
    }
}
