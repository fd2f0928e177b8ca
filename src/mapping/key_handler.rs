//! Per-key timing state machine.
//!
//! ```text
//!            magnitude >= threshold
//!   Idle ─────────────────────────────► Pressed ──(hold >= hold_timeout)──► Repeating
//!    ▲                                     │                                   │
//!    └──────────── release (may fire a tap action) ◄──────────────────────────┘
//! ```
//!
//! A [`KeyHandler`] never owns its keymap entries. Every call receives the
//! current candidate list for its key plus a [`KeyContext`] borrowed from the
//! owning handler, so the same state machine serves any window and survives a
//! window switch without stale references.

use crate::config::TimingSettings;
use crate::controller::primitive::KeyName;
use crate::mapping::actions::{Action, ActionDispatcher, KeymapAction};
use crate::mapping::WindowId;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Keys currently held by one input context and the most recent press.
#[derive(Debug, Default, Clone)]
pub struct PressTracker {
    held: HashSet<KeyName>,
    last_pressed: Option<KeyName>,
}

impl PressTracker {
    pub fn on_press(&mut self, key: &KeyName) {
        self.held.insert(key.clone());
        self.last_pressed = Some(key.clone());
    }

    pub fn on_release(&mut self, key: &KeyName) {
        self.held.remove(key);
        if self.last_pressed.as_ref() == Some(key) {
            self.last_pressed = None;
        }
    }

    pub fn is_held(&self, key: &KeyName) -> bool {
        self.held.contains(key)
    }

    /// A hotkey without direction is held when any direction of it is held.
    pub fn is_hotkey_held(&self, hotkey: &KeyName) -> bool {
        if self.held.contains(hotkey) {
            return true;
        }
        hotkey.direction().is_none()
            && self
                .held
                .iter()
                .any(|key| key.feature_name() == hotkey.feature_name())
    }

    pub fn all_held(&self, hotkeys: &BTreeSet<KeyName>) -> bool {
        hotkeys.iter().all(|hotkey| self.is_hotkey_held(hotkey))
    }

    pub fn last_pressed(&self) -> Option<&KeyName> {
        self.last_pressed.as_ref()
    }

    /// Whether `key` is the most recently pressed key still held.
    ///
    /// A recorded last press that is no longer held means a release was lost;
    /// the record is dropped.
    pub fn is_last_pressed(&mut self, key: &KeyName) -> bool {
        if let Some(last) = self.last_pressed.take_if(|last| !self.held.contains(&*last)) {
            warn!("Last pressed key {} is not held anymore, resetting", last);
            return false;
        }
        self.last_pressed.as_ref() == Some(key)
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.last_pressed = None;
    }
}

/// Collaborators a [`KeyHandler`] needs for a single call.
pub struct KeyContext<'a> {
    pub window: WindowId,
    pub presses: &'a mut PressTracker,
    pub dispatcher: &'a mut dyn ActionDispatcher,
    pub timing: &'a TimingSettings,
}

#[derive(Debug, Clone)]
pub struct KeyHandler {
    key: KeyName,
    held: bool,
    magnitude: f32,
    hold_start_ms: u64,
    last_hold_time_ms: u32,
    action_sent: bool,
    last_action_ms: u32,
}

impl KeyHandler {
    pub fn new(key: KeyName) -> Self {
        Self {
            key,
            held: false,
            magnitude: 0.0,
            hold_start_ms: 0,
            last_hold_time_ms: 0,
            action_sent: false,
            last_action_ms: 0,
        }
    }

    pub fn key(&self) -> &KeyName {
        &self.key
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    pub fn on_digital_motion(
        &mut self,
        pressed: bool,
        now_ms: u64,
        actions: &[KeymapAction],
        ctx: &mut KeyContext<'_>,
    ) -> bool {
        let magnitude = if pressed { 1.0 } else { 0.0 };
        self.on_analog_motion(magnitude, now_ms, actions, ctx)
    }

    /// Feeds one magnitude sample. Returns whether an action was dispatched.
    pub fn on_analog_motion(
        &mut self,
        magnitude: f32,
        now_ms: u64,
        actions: &[KeymapAction],
        ctx: &mut KeyContext<'_>,
    ) -> bool {
        // Release is reported once
        if self.magnitude == 0.0 && magnitude == 0.0 {
            return false;
        }

        let pressed = magnitude >= ctx.timing.digital_threshold;
        if pressed && !self.held {
            self.hold_start_ms = now_ms;
            self.last_hold_time_ms = 0;
            self.action_sent = false;
            self.last_action_ms = 0;
            ctx.presses.on_press(&self.key);
        }

        let handled = self.handle_actions(magnitude, pressed, now_ms, actions, ctx);

        if !pressed && self.held {
            ctx.presses.on_release(&self.key);
        }
        self.held = pressed;
        self.magnitude = magnitude;
        handled
    }

    fn handle_actions(
        &mut self,
        magnitude: f32,
        pressed: bool,
        now_ms: u64,
        actions: &[KeymapAction],
        ctx: &mut KeyContext<'_>,
    ) -> bool {
        let candidates = Self::active_candidates(actions, ctx.presses);
        let Some(final_action) = candidates.last().copied() else {
            return false;
        };

        if ctx.dispatcher.is_analog(final_action.action_id) {
            let hold_time = if pressed { self.hold_time(now_ms) } else { 0 };
            self.send_action(final_action, magnitude, hold_time, ctx);
            return true;
        }

        if pressed {
            let hold_time = self.hold_time(now_ms);
            self.last_hold_time_ms = hold_time;
            self.handle_action(final_action, hold_time, ctx)
        } else if self.held {
            self.handle_release(&candidates, now_ms, ctx)
        } else {
            false
        }
    }

    /// Actions gated by fully held hotkeys, or the ungated ones if none apply.
    fn active_candidates<'a>(
        actions: &'a [KeymapAction],
        presses: &PressTracker,
    ) -> Vec<&'a KeymapAction> {
        let gated: Vec<&KeymapAction> = actions
            .iter()
            .filter(|a| !a.hotkeys.is_empty() && presses.all_held(&a.hotkeys))
            .collect();
        if !gated.is_empty() {
            return gated;
        }
        actions.iter().filter(|a| a.hotkeys.is_empty()).collect()
    }

    fn handle_action(
        &mut self,
        action: &KeymapAction,
        hold_time: u32,
        ctx: &mut KeyContext<'_>,
    ) -> bool {
        if hold_time < action.hold_time_ms {
            return false;
        }

        if !self.action_sent {
            self.action_sent = true;
            self.last_action_ms = hold_time;
            self.send_action(action, 1.0, hold_time - action.hold_time_ms, ctx);
            return true;
        }

        // Long-hold actions fire once
        if action.hold_time_ms == 0 {
            return self.send_repeat_action(action, hold_time, ctx);
        }
        false
    }

    fn send_repeat_action(
        &mut self,
        action: &KeymapAction,
        hold_time: u32,
        ctx: &mut KeyContext<'_>,
    ) -> bool {
        let timing = ctx.timing;
        if hold_time < timing.hold_timeout_ms
            || hold_time < self.last_action_ms.saturating_add(timing.repeat_timeout_ms)
        {
            return false;
        }
        if !ctx.presses.is_last_pressed(&self.key) {
            return false;
        }

        self.last_action_ms = hold_time;
        self.send_action(action, 1.0, hold_time, ctx);
        true
    }

    /// Fires the tap action whose hold interval contains the elapsed hold.
    fn handle_release(
        &mut self,
        candidates: &[&KeymapAction],
        now_ms: u64,
        ctx: &mut KeyContext<'_>,
    ) -> bool {
        if self.action_sent {
            return false;
        }

        let elapsed = self.last_hold_time_ms.max(self.hold_time(now_ms));
        let selected = candidates.iter().enumerate().find(|(i, action)| {
            let next = candidates
                .get(i + 1)
                .map_or(u32::MAX, |next| next.hold_time_ms);
            action.hold_time_ms <= elapsed && elapsed < next
        });

        match selected {
            Some((_, action)) => {
                debug!("{} released after {} ms", self.key, elapsed);
                self.action_sent = true;
                self.send_action(action, 1.0, elapsed - action.hold_time_ms, ctx);
                true
            }
            None => false,
        }
    }

    fn send_action(
        &self,
        action: &KeymapAction,
        amount: f32,
        hold_time_ms: u32,
        ctx: &mut KeyContext<'_>,
    ) {
        ctx.dispatcher.dispatch(Action {
            id: action.action_id,
            name: action.action_string.clone(),
            amount,
            hold_time_ms,
            key: self.key.clone(),
            window: ctx.window,
        });
    }

    fn hold_time(&self, now_ms: u64) -> u32 {
        u32::try_from(now_ms.saturating_sub(self.hold_start_ms)).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controller::primitive::CardinalDirection;
    use crate::mapping::GLOBAL_WINDOW;

    /// Dispatcher that records every action; ids >= 100 are analog.
    #[derive(Default)]
    pub(crate) struct RecordingDispatcher {
        pub actions: Vec<Action>,
        pub analog: HashSet<u32>,
    }

    impl RecordingDispatcher {
        pub fn ids(&self) -> Vec<u32> {
            self.actions.iter().map(|a| a.id).collect()
        }
    }

    impl ActionDispatcher for RecordingDispatcher {
        fn is_analog(&self, action_id: u32) -> bool {
            self.analog.contains(&action_id)
        }

        fn dispatch(&mut self, action: Action) {
            self.actions.push(action);
        }
    }

    struct Harness {
        handler: KeyHandler,
        presses: PressTracker,
        dispatcher: RecordingDispatcher,
        timing: TimingSettings,
        actions: Vec<KeymapAction>,
    }

    impl Harness {
        fn new(actions: Vec<KeymapAction>) -> Self {
            Self {
                handler: KeyHandler::new(KeyName::feature("a")),
                presses: PressTracker::default(),
                dispatcher: RecordingDispatcher::default(),
                timing: TimingSettings::default(),
                actions,
            }
        }

        fn motion(&mut self, magnitude: f32, now_ms: u64) -> bool {
            let mut ctx = KeyContext {
                window: GLOBAL_WINDOW,
                presses: &mut self.presses,
                dispatcher: &mut self.dispatcher,
                timing: &self.timing,
            };
            self.handler
                .on_analog_motion(magnitude, now_ms, &self.actions, &mut ctx)
        }
    }

    #[test]
    fn test_press_dispatches_once() {
        let mut h = Harness::new(vec![KeymapAction::new(7, "select")]);

        assert!(h.motion(1.0, 0));
        assert!(!h.motion(1.0, 100));
        assert!(!h.motion(0.8, 200));
        assert_eq!(h.dispatcher.ids(), vec![7]);
    }

    #[test]
    fn test_below_threshold_is_not_a_press() {
        let mut h = Harness::new(vec![KeymapAction::new(7, "select")]);

        assert!(!h.motion(0.4, 0));
        assert!(h.motion(0.5, 10));
        assert_eq!(h.dispatcher.ids(), vec![7]);
    }

    #[test]
    fn test_release_sequence_is_idempotent() {
        let mut h = Harness::new(vec![KeymapAction::new(7, "select")]);

        let results: Vec<bool> = [(1.0, 0), (1.0, 10), (0.0, 20), (0.0, 20)]
            .into_iter()
            .map(|(m, t)| h.motion(m, t))
            .collect();

        assert_eq!(results, vec![true, false, false, false]);
        assert_eq!(h.dispatcher.ids(), vec![7]);
        assert!(!h.handler.is_held());
        assert_eq!(h.presses.held_count(), 0);
    }

    #[test]
    fn test_tap_selects_short_action() {
        let mut h = Harness::new(vec![
            KeymapAction::new(1, "tap"),
            KeymapAction::new(2, "hold").with_hold_time(300),
        ]);

        assert!(!h.motion(1.0, 0));
        assert!(!h.motion(1.0, 100));
        assert!(h.motion(0.0, 150));
        assert_eq!(h.dispatcher.ids(), vec![1]);
    }

    #[test]
    fn test_hold_selects_long_action() {
        let mut h = Harness::new(vec![
            KeymapAction::new(1, "tap"),
            KeymapAction::new(2, "hold").with_hold_time(300),
        ]);

        assert!(!h.motion(1.0, 0));
        assert!(!h.motion(1.0, 200));
        assert!(h.motion(1.0, 310));
        assert!(!h.motion(1.0, 900));
        assert!(!h.motion(0.0, 1000));
        assert_eq!(h.dispatcher.ids(), vec![2]);
        assert_eq!(h.dispatcher.actions[0].hold_time_ms, 10);
    }

    #[test]
    fn test_release_without_hold_samples_uses_elapsed_time() {
        let mut h = Harness::new(vec![
            KeymapAction::new(1, "tap"),
            KeymapAction::new(2, "hold").with_hold_time(300),
        ]);

        assert!(!h.motion(1.0, 0));
        assert!(h.motion(0.0, 400));
        assert_eq!(h.dispatcher.ids(), vec![2]);
    }

    #[test]
    fn test_repeat_cadence() {
        let mut h = Harness::new(vec![KeymapAction::new(3, "up")]);

        let mut dispatched_at = Vec::new();
        for t in (0..=1200u64).step_by(10) {
            if h.motion(1.0, t) {
                dispatched_at.push(t);
            }
        }
        h.motion(0.0, 1210);

        let mut expected = vec![0];
        expected.extend((500..=1200).step_by(50));
        assert_eq!(dispatched_at, expected);
        assert_eq!(h.dispatcher.actions.len(), 16);
    }

    #[test]
    fn test_no_repeat_when_another_key_pressed_later() {
        let mut h = Harness::new(vec![KeymapAction::new(3, "up")]);

        assert!(h.motion(1.0, 0));
        h.presses.on_press(&KeyName::feature("b"));
        assert!(!h.motion(1.0, 600));

        // Releasing "b" leaves no last-pressed key
        h.presses.on_release(&KeyName::feature("b"));
        assert!(!h.motion(1.0, 700));
        assert_eq!(h.dispatcher.ids(), vec![3]);
    }

    #[test]
    fn test_hotkey_gated_action_preferred() {
        let mut h = Harness::new(vec![
            KeymapAction::new(7, "select"),
            KeymapAction::new(85, "screenshot").with_hotkeys(["lefttrigger"]),
        ]);

        h.presses.on_press(&KeyName::feature("lefttrigger"));
        assert!(h.motion(1.0, 0));
        h.motion(0.0, 50);
        h.presses.on_release(&KeyName::feature("lefttrigger"));
        assert!(h.motion(1.0, 100));

        assert_eq!(h.dispatcher.ids(), vec![85, 7]);
    }

    #[test]
    fn test_gated_actions_ordered_by_hold_time() {
        let mut h = Harness::new(vec![
            KeymapAction::new(7, "select"),
            KeymapAction::new(85, "screenshot").with_hotkeys(["lefttrigger"]),
            KeymapAction::new(18, "fullscreen")
                .with_hold_time(300)
                .with_hotkeys(["lefttrigger"]),
        ]);

        h.presses.on_press(&KeyName::feature("lefttrigger"));
        assert!(!h.motion(1.0, 0));
        assert!(h.motion(0.0, 100));
        assert_eq!(h.dispatcher.ids(), vec![85]);
    }

    #[test]
    fn test_hotkey_released_first_selects_ungated_tap() {
        let mut h = Harness::new(vec![
            KeymapAction::new(7, "select"),
            KeymapAction::new(18, "fullscreen")
                .with_hold_time(300)
                .with_hotkeys(["lefttrigger"]),
        ]);

        h.presses.on_press(&KeyName::feature("lefttrigger"));
        assert!(!h.motion(1.0, 0));

        // Candidates are filtered again at release time
        h.presses.on_release(&KeyName::feature("lefttrigger"));
        assert!(h.motion(0.0, 100));
        assert_eq!(h.dispatcher.ids(), vec![7]);
    }

    #[test]
    fn test_directional_key_satisfies_feature_hotkey() {
        let mut h = Harness::new(vec![
            KeymapAction::new(7, "select"),
            KeymapAction::new(85, "screenshot").with_hotkeys(["leftstick"]),
        ]);

        let stick_up = KeyName::directional("leftstick", CardinalDirection::Up);
        h.presses.on_press(&stick_up);
        assert!(h.presses.is_hotkey_held(&KeyName::feature("leftstick")));
        assert!(!h.presses.is_hotkey_held(&KeyName::directional(
            "leftstick",
            CardinalDirection::Down
        )));

        assert!(h.motion(1.0, 0));
        assert_eq!(h.dispatcher.ids(), vec![85]);
    }

    #[test]
    fn test_analog_action_dispatches_live_magnitude() {
        let mut h = Harness::new(vec![KeymapAction::new(124, "analogseekforward")]);
        h.dispatcher.analog.insert(124);

        assert!(h.motion(0.2, 0));
        assert!(h.motion(0.7, 10));
        assert!(h.motion(0.0, 20));
        assert!(!h.motion(0.0, 30));

        let amounts: Vec<f32> = h.dispatcher.actions.iter().map(|a| a.amount).collect();
        assert_eq!(amounts, vec![0.2, 0.7, 0.0]);
    }

    #[test]
    fn test_unbound_key_not_handled() {
        let mut h = Harness::new(Vec::new());
        assert!(!h.motion(1.0, 0));
        assert!(h.handler.is_held());
        assert!(!h.motion(0.0, 10));
        assert!(h.dispatcher.actions.is_empty());
    }

    #[test]
    fn test_press_tracker_detects_stale_last_pressed() {
        let mut presses = PressTracker::default();
        let a = KeyName::feature("a");
        presses.on_press(&a);
        presses.held.remove(&a);

        assert!(!presses.is_last_pressed(&a));
        assert!(presses.last_pressed().is_none());
    }
}
