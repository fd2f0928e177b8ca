//! Immutable per-window joystick tables.
//!
//! A [`Keymap`] is built once through [`KeymapBuilder`] and then shared as an
//! `Arc<Keymap>`. Reloading never mutates a keymap in place; a new one is built
//! and swapped in between ticks.

use crate::controller::primitive::KeyName;
use crate::mapping::actions::KeymapAction;
use crate::mapping::window::WindowFallbacks;
use crate::mapping::{WindowId, GLOBAL_WINDOW};
use std::collections::HashMap;
use tracing::debug;

type WindowTable = HashMap<KeyName, Vec<KeymapAction>>;

#[derive(Debug, Clone, Default)]
pub struct Keymap {
    windows: HashMap<WindowId, WindowTable>,
    fallbacks: WindowFallbacks,
}

impl Keymap {
    pub fn builder(fallbacks: WindowFallbacks) -> KeymapBuilder {
        KeymapBuilder {
            keymap: Keymap {
                windows: HashMap::new(),
                fallbacks,
            },
        }
    }

    /// Convenience for a keymap that only binds the global window.
    pub fn global<I>(bindings: I) -> Keymap
    where
        I: IntoIterator<Item = (KeyName, KeymapAction)>,
    {
        let mut builder = KeymapBuilder::default();
        for (key, action) in bindings {
            builder.bind(GLOBAL_WINDOW, key, action);
        }
        builder.build()
    }

    /// Candidate actions for `key` as seen from `window`.
    ///
    /// The first window along the fallback chain that binds `key` at all
    /// provides the whole list; lists are never merged across windows.
    pub fn actions(&self, window: WindowId, key: &KeyName) -> &[KeymapAction] {
        for candidate in self.fallbacks.chain(window, true) {
            if let Some(actions) = self.windows.get(&candidate).and_then(|t| t.get(key)) {
                return actions;
            }
        }
        &[]
    }

    /// Whether any key name of `feature` is bound along the chain of `window`.
    pub fn has_feature(&self, window: WindowId, feature: &str) -> bool {
        self.fallbacks.chain(window, true).into_iter().any(|candidate| {
            self.windows
                .get(&candidate)
                .is_some_and(|table| table.keys().any(|key| key.feature_name() == feature))
        })
    }

    /// Every action reachable for `feature` from `window`, in any direction.
    pub fn feature_actions<'a>(
        &'a self,
        window: WindowId,
        feature: &'a str,
    ) -> impl Iterator<Item = &'a KeymapAction> + 'a {
        self.fallbacks
            .chain(window, true)
            .into_iter()
            .filter_map(move |candidate| self.windows.get(&candidate))
            .flat_map(move |table| {
                table
                    .iter()
                    .filter(move |(key, _)| key.feature_name() == feature)
                    .flat_map(|(_, actions)| actions.iter())
            })
    }

    pub fn fallbacks(&self) -> &WindowFallbacks {
        &self.fallbacks
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.values().all(HashMap::is_empty)
    }
}

pub struct KeymapBuilder {
    keymap: Keymap,
}

impl KeymapBuilder {
    /// Adds a candidate action for `key` in `window`.
    ///
    /// A later action in the same slot (same hold time and hotkeys) replaces
    /// the earlier one.
    pub fn bind(&mut self, window: WindowId, key: KeyName, action: KeymapAction) -> &mut Self {
        let actions = self
            .keymap
            .windows
            .entry(window)
            .or_default()
            .entry(key)
            .or_default();

        if let Some(existing) = actions.iter_mut().find(|a| a.same_slot(&action)) {
            debug!(
                "Replacing {} with {} in window {}",
                existing.action_string, action.action_string, window
            );
            *existing = action;
        } else {
            actions.push(action);
        }
        self
    }

    pub fn build(mut self) -> Keymap {
        for table in self.keymap.windows.values_mut() {
            for actions in table.values_mut() {
                // Hold time ascending; more specific hotkey sets first within a slot
                actions.sort_by(|a, b| {
                    a.hold_time_ms
                        .cmp(&b.hold_time_ms)
                        .then_with(|| b.hotkeys.len().cmp(&a.hotkeys.len()))
                });
            }
        }
        self.keymap
    }
}

impl Default for KeymapBuilder {
    fn default() -> Self {
        Keymap::builder(WindowFallbacks::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::primitive::CardinalDirection;

    #[test]
    fn test_actions_sorted_by_hold_time() {
        let mut builder = KeymapBuilder::default();
        builder
            .bind(GLOBAL_WINDOW, "a".into(), KeymapAction::new(2, "long").with_hold_time(300))
            .bind(GLOBAL_WINDOW, "a".into(), KeymapAction::new(1, "tap"));
        let keymap = builder.build();

        let ids: Vec<u32> = keymap
            .actions(GLOBAL_WINDOW, &"a".into())
            .iter()
            .map(|a| a.action_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_same_slot_is_replaced() {
        let mut builder = KeymapBuilder::default();
        builder
            .bind(GLOBAL_WINDOW, "a".into(), KeymapAction::new(1, "select"))
            .bind(GLOBAL_WINDOW, "a".into(), KeymapAction::new(92, "back"))
            .bind(
                GLOBAL_WINDOW,
                "a".into(),
                KeymapAction::new(7, "select").with_hotkeys(["lefttrigger"]),
            );
        let keymap = builder.build();

        let actions = keymap.actions(GLOBAL_WINDOW, &"a".into());
        assert_eq!(actions.len(), 2);
        // Gated binding sorts ahead of the ungated one at the same hold time
        assert_eq!(actions[0].action_id, 7);
        assert_eq!(actions[1].action_id, 92);
    }

    #[test]
    fn test_window_list_shadows_global() {
        let fallbacks = WindowFallbacks::new([(10, 20)]).unwrap();
        let mut builder = Keymap::builder(fallbacks);
        builder
            .bind(GLOBAL_WINDOW, "b".into(), KeymapAction::new(92, "back"))
            .bind(20, "b".into(), KeymapAction::new(10, "previousmenu"))
            .bind(GLOBAL_WINDOW, "x".into(), KeymapAction::new(11, "info"));
        let keymap = builder.build();

        assert_eq!(keymap.actions(10, &"b".into())[0].action_id, 10);
        assert_eq!(keymap.actions(30, &"b".into())[0].action_id, 92);
        assert_eq!(keymap.actions(10, &"x".into())[0].action_id, 11);
        assert!(keymap.actions(10, &"y".into()).is_empty());
    }

    #[test]
    fn test_has_feature_matches_directional_keys() {
        let keymap = Keymap::global([(
            KeyName::directional("leftstick", CardinalDirection::Up),
            KeymapAction::new(3, "up"),
        )]);

        assert!(keymap.has_feature(5, "leftstick"));
        assert!(!keymap.has_feature(5, "rightstick"));
        assert_eq!(keymap.feature_actions(5, "leftstick").count(), 1);
    }
}
