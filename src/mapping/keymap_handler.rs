//! Owner of the key handlers for one input context.
//!
//! The [`KeymapHandler`] is where feature-level input enters the mapping
//! layer. Scalar features map one to one onto a [`KeyHandler`]; sticks,
//! wheels and throttles are first split into cardinal directions so that at
//! most one direction of a control is ever held:
//!
//! ```text
//! (x, y) ──► dominant direction ──► release every other direction
//!                                └─► press dominant with max(|x|, |y|)
//! ```

use crate::config::TimingSettings;
use crate::controller::primitive::{CardinalDirection, InputType, KeyName};
use crate::mapping::actions::{Action, ActionDispatcher};
use crate::mapping::key_handler::{KeyContext, KeyHandler, PressTracker};
use crate::mapping::keymap::Keymap;
use crate::mapping::sequence::{ButtonSequence, SequenceProgress};
use crate::mapping::{WindowId, GLOBAL_WINDOW};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct KeymapHandler<D: ActionDispatcher> {
    keymap: Arc<Keymap>,
    window: WindowId,
    dispatcher: D,
    timing: TimingSettings,
    key_handlers: HashMap<KeyName, KeyHandler>,
    presses: PressTracker,
    sequence: Option<ButtonSequence>,
}

impl<D: ActionDispatcher> KeymapHandler<D> {
    pub fn new(keymap: Arc<Keymap>, dispatcher: D, timing: TimingSettings) -> Self {
        Self {
            keymap,
            window: GLOBAL_WINDOW,
            dispatcher,
            timing,
            key_handlers: HashMap::new(),
            presses: PressTracker::default(),
            sequence: None,
        }
    }

    pub fn with_button_sequence(mut self, sequence: ButtonSequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Swaps in a rebuilt keymap. All key state is dropped.
    pub fn set_keymap(&mut self, keymap: Arc<Keymap>) {
        info!(
            "Keymap swapped ({} windows), dropping {} key handlers",
            keymap.window_count(),
            self.key_handlers.len()
        );
        self.keymap = keymap;
        self.key_handlers.clear();
        self.presses.clear();
    }

    pub fn keymap(&self) -> &Arc<Keymap> {
        &self.keymap
    }

    pub fn set_window(&mut self, window: WindowId) {
        if window != self.window {
            debug!("Active window {} -> {}", self.window, window);
            self.window = window;
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn timing(&self) -> &TimingSettings {
        &self.timing
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.keymap.has_feature(self.window, feature)
    }

    /// Analog when any action bound to the feature consumes a magnitude.
    pub fn input_type(&self, feature: &str) -> InputType {
        let analog = self
            .keymap
            .feature_actions(self.window, feature)
            .any(|action| self.dispatcher.is_analog(action.action_id));
        if analog {
            InputType::Analog
        } else {
            InputType::Digital
        }
    }

    /// Digital press or release of a scalar feature.
    pub fn on_button_press(&mut self, feature: &str, pressed: bool, now_ms: u64) -> bool {
        if pressed && self.observe_sequence(feature) {
            return true;
        }
        self.key_motion(KeyName::feature(feature), if pressed { 1.0 } else { 0.0 }, now_ms)
    }

    /// Periodic tick for a feature that is still held.
    pub fn on_button_hold(&mut self, feature: &str, now_ms: u64) -> bool {
        let key = KeyName::feature(feature);
        if !self.is_key_pressed(&key) {
            return false;
        }
        self.key_motion(key, 1.0, now_ms)
    }

    /// Analog magnitude of a scalar feature.
    pub fn on_button_motion(&mut self, feature: &str, magnitude: f32, now_ms: u64) -> bool {
        self.key_motion(KeyName::feature(feature), magnitude.clamp(0.0, 1.0), now_ms)
    }

    pub fn on_analog_stick_motion(&mut self, feature: &str, x: f32, y: f32, now_ms: u64) -> bool {
        self.on_composite_motion(feature, &CardinalDirection::ALL, x, y, now_ms)
    }

    /// Wheel position in `[-1, 1]`, negative turning left.
    pub fn on_wheel_motion(&mut self, feature: &str, position: f32, now_ms: u64) -> bool {
        self.on_composite_motion(feature, &CardinalDirection::HORIZONTAL, position, 0.0, now_ms)
    }

    /// Throttle position in `[-1, 1]`, negative pulling down.
    pub fn on_throttle_motion(&mut self, feature: &str, position: f32, now_ms: u64) -> bool {
        self.on_composite_motion(feature, &CardinalDirection::VERTICAL, 0.0, position, now_ms)
    }

    /// Whether every named key is currently held.
    ///
    /// Same rule the key handlers gate on: a key name without direction is
    /// held while any direction of that feature is.
    pub fn hotkeys_pressed<'a, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'a KeyName>,
    {
        keys.into_iter().all(|key| self.presses.is_hotkey_held(key))
    }

    pub fn last_pressed(&self) -> Option<&KeyName> {
        self.presses.last_pressed()
    }

    pub fn is_key_pressed(&self, key: &KeyName) -> bool {
        self.presses.is_held(key)
    }

    fn on_composite_motion(
        &mut self,
        feature: &str,
        directions: &[CardinalDirection],
        x: f32,
        y: f32,
        now_ms: u64,
    ) -> bool {
        let dominant = CardinalDirection::from_vector(x, y).filter(|d| directions.contains(d));
        let magnitude = x.abs().max(y.abs()).min(1.0);

        let mut handled = false;
        for &direction in directions {
            if Some(direction) != dominant {
                handled |= self.key_motion(KeyName::directional(feature, direction), 0.0, now_ms);
            }
        }
        if let Some(direction) = dominant {
            handled |= self.key_motion(KeyName::directional(feature, direction), magnitude, now_ms);
        }
        handled
    }

    fn key_motion(&mut self, key: KeyName, magnitude: f32, now_ms: u64) -> bool {
        if magnitude == 0.0 && !self.key_handlers.contains_key(&key) {
            return false;
        }

        let actions = self.keymap.actions(self.window, &key);
        let handler = self
            .key_handlers
            .entry(key)
            .or_insert_with_key(|key| KeyHandler::new(key.clone()));

        let mut ctx = KeyContext {
            window: self.window,
            presses: &mut self.presses,
            dispatcher: &mut self.dispatcher,
            timing: &self.timing,
        };
        handler.on_analog_motion(magnitude, now_ms, actions, &mut ctx)
    }

    /// Returns true when the press was consumed by the button sequence.
    fn observe_sequence(&mut self, feature: &str) -> bool {
        let Some(sequence) = self.sequence.as_mut() else {
            return false;
        };

        match sequence.on_button_press(feature) {
            SequenceProgress::Ignored => false,
            SequenceProgress::Capturing => {
                debug!("{} captured by button sequence", feature);
                true
            }
            SequenceProgress::Finished => {
                if let Some(action) = sequence.action() {
                    self.dispatcher.dispatch(Action {
                        id: action.action_id,
                        name: action.action_string.clone(),
                        amount: 1.0,
                        hold_time_ms: 0,
                        key: KeyName::feature(feature),
                        window: self.window,
                    });
                }
                true
            }
        }
    }
}
