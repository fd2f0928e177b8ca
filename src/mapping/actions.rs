//! Application actions and the collaborators that name and consume them.

use crate::controller::primitive::KeyName;
use crate::mapping::WindowId;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Id of "no action"
pub const ACTION_NONE: u32 = 0;
/// Id shared by every builtin function call (`Name(args)`)
pub const ACTION_BUILTIN_FUNCTION: u32 = 122;

/// One candidate binding for a key name.
#[derive(Debug, Clone, PartialEq)]
pub struct KeymapAction {
    pub action_id: u32,
    pub action_string: String,
    /// Hold time before this action becomes eligible; 0 fires on press
    pub hold_time_ms: u32,
    /// Features that must all be held for this binding to apply
    pub hotkeys: BTreeSet<KeyName>,
}

impl KeymapAction {
    pub fn new(action_id: u32, action_string: impl Into<String>) -> Self {
        Self {
            action_id,
            action_string: action_string.into(),
            hold_time_ms: 0,
            hotkeys: BTreeSet::new(),
        }
    }

    pub fn with_hold_time(mut self, hold_time_ms: u32) -> Self {
        self.hold_time_ms = hold_time_ms;
        self
    }

    pub fn with_hotkeys<I, K>(mut self, hotkeys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyName>,
    {
        self.hotkeys = hotkeys.into_iter().map(Into::into).collect();
        self
    }

    /// Whether two bindings occupy the same slot (same hold time and hotkeys).
    pub fn same_slot(&self, other: &KeymapAction) -> bool {
        self.hold_time_ms == other.hold_time_ms && self.hotkeys == other.hotkeys
    }
}

/// An action emitted by a key handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: u32,
    pub name: String,
    /// Magnitude of the input at dispatch time
    pub amount: f32,
    /// Hold time relative to when the action became eligible
    pub hold_time_ms: u32,
    pub key: KeyName,
    pub window: WindowId,
}

/// Consumer of resolved actions.
pub trait ActionDispatcher {
    /// Whether the action consumes a continuous magnitude instead of presses.
    fn is_analog(&self, action_id: u32) -> bool;

    fn dispatch(&mut self, action: Action);
}

/// Translates action names found in keymap sources into action ids.
pub trait ActionTranslator {
    fn translate(&self, name: &str) -> Option<u32>;
}

/// Name → id table for actions, also recording which ids are analog.
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    by_name: HashMap<String, u32>,
    names: HashMap<u32, String>,
    analog: HashSet<u32>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the common navigation and playback actions.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for (name, id) in [
            ("left", 1),
            ("right", 2),
            ("up", 3),
            ("down", 4),
            ("pageup", 5),
            ("pagedown", 6),
            ("select", 7),
            ("highlight", 8),
            ("parentdir", 9),
            ("previousmenu", 10),
            ("info", 11),
            ("pause", 12),
            ("stop", 13),
            ("skipnext", 14),
            ("skipprevious", 15),
            ("fastforward", 16),
            ("rewind", 17),
            ("fullscreen", 18),
            ("osd", 24),
            ("screenshot", 85),
            ("volumeup", 88),
            ("volumedown", 89),
            ("mute", 91),
            ("back", 92),
            ("contextmenu", 117),
            ("playpause", 229),
        ] {
            table.insert(name, id, false);
        }
        for (name, id) in [
            ("analogmove", 49),
            ("analogfastforward", 113),
            ("analogrewind", 114),
            ("analogseekforward", 124),
            ("analogseekback", 125),
            ("analogmovexleft", 601),
            ("analogmovexright", 602),
            ("analogmoveyup", 603),
            ("analogmoveydown", 604),
        ] {
            table.insert(name, id, true);
        }
        table
    }

    pub fn insert(&mut self, name: &str, id: u32, analog: bool) {
        let name = name.to_ascii_lowercase();
        self.names.insert(id, name.clone());
        self.by_name.insert(name, id);
        if analog {
            self.analog.insert(id);
        } else {
            self.analog.remove(&id);
        }
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn is_analog(&self, id: u32) -> bool {
        self.analog.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl ActionTranslator for ActionTable {
    fn translate(&self, name: &str) -> Option<u32> {
        let trimmed = name.trim();
        if trimmed.ends_with(')') && trimmed.contains('(') {
            return Some(ACTION_BUILTIN_FUNCTION);
        }
        self.by_name.get(&trimmed.to_ascii_lowercase()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_is_case_insensitive() {
        let table = ActionTable::standard();
        assert_eq!(table.translate("Select"), Some(7));
        assert_eq!(table.translate("  back "), Some(92));
        assert_eq!(table.translate("nonsense"), None);
    }

    #[test]
    fn test_builtin_functions_share_an_id() {
        let table = ActionTable::standard();
        assert_eq!(
            table.translate("ActivateWindow(Home)"),
            Some(ACTION_BUILTIN_FUNCTION)
        );
    }

    #[test]
    fn test_analog_lookup() {
        let table = ActionTable::standard();
        assert!(table.is_analog(124));
        assert!(!table.is_analog(7));
        assert_eq!(table.name(124), Some("analogseekforward"));
    }
}
