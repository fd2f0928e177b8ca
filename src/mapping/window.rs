//! Per-window binding scopes and the fallback chain between them.
//!
//! Every lookup walks the same chain:
//!
//! ```text
//! window ──► fallback window (if declared) ──► global (-1)
//! ```
//!
//! Fallbacks are declared once when the tables are built. The declarations
//! must form a forest rooted at the global window; that is checked in
//! [`WindowFallbacks::new`] and never again per lookup.

use crate::controller::primitive::MouseButton;
use crate::mapping::error::MappingError;
use crate::mapping::{WindowId, GLOBAL_WINDOW};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Validated fallback declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowFallbacks {
    fallbacks: HashMap<WindowId, WindowId>,
}

impl WindowFallbacks {
    pub fn new<I>(declarations: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (WindowId, WindowId)>,
    {
        let mut fallbacks: HashMap<WindowId, WindowId> = HashMap::new();

        for (window, fallback) in declarations {
            if window == GLOBAL_WINDOW {
                return Err(MappingError::GlobalFallback);
            }
            if window == fallback {
                return Err(MappingError::SelfFallback(window));
            }
            if let Some(&first) = fallbacks.get(&window) {
                if first != fallback {
                    return Err(MappingError::ConflictingFallback {
                        window,
                        first,
                        second: fallback,
                    });
                }
            }
            fallbacks.insert(window, fallback);
        }

        // Every chain must terminate
        for &start in fallbacks.keys() {
            let mut visited = HashSet::from([start]);
            let mut current = start;
            while let Some(&next) = fallbacks.get(&current) {
                if !visited.insert(next) {
                    return Err(MappingError::FallbackCycle(start));
                }
                current = next;
            }
        }

        Ok(Self { fallbacks })
    }

    pub fn fallback(&self, window: WindowId) -> Option<WindowId> {
        self.fallbacks
            .get(&window)
            .copied()
            .filter(|&fallback| fallback != GLOBAL_WINDOW)
    }

    /// Windows consulted for a lookup in `window`, in order.
    ///
    /// Only the single declared fallback is consulted, never the fallback's
    /// own fallback.
    pub fn chain(&self, window: WindowId, use_fallback: bool) -> Vec<WindowId> {
        let mut chain = vec![window];
        if use_fallback {
            if let Some(fallback) = self.fallback(window) {
                chain.push(fallback);
            }
            if window != GLOBAL_WINDOW {
                chain.push(GLOBAL_WINDOW);
            }
        }
        chain
    }
}

/// Keyboard modifier mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: Modifiers = Modifiers(1 << 0);
    pub const SHIFT: Modifiers = Modifiers(1 << 1);
    pub const ALT: Modifiers = Modifiers(1 << 2);
    pub const SUPER: Modifiers = Modifiers(1 << 3);
    pub const META: Modifiers = Modifiers(1 << 4);
    /// Key was held past the long-press threshold
    pub const LONG: Modifiers = Modifiers(1 << 5);

    pub const fn union(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    pub const fn without(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 & !other.0)
    }

    pub const fn contains(&self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn from_name(name: &str) -> Option<Modifiers> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Self::CTRL),
            "shift" => Some(Self::SHIFT),
            "alt" => Some(Self::ALT),
            "super" | "win" => Some(Self::SUPER),
            "meta" | "cmd" => Some(Self::META),
            "long" => Some(Self::LONG),
            _ => None,
        }
    }
}

/// A discrete input looked up directly through the [`WindowResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputCode {
    Keyboard { key: u32, modifiers: Modifiers },
    Mouse(MouseButton),
    Remote(u32),
}

impl InputCode {
    pub fn key(key: u32) -> Self {
        InputCode::Keyboard {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    /// Same key without the long-press bit, if it carried one.
    fn short_press(&self) -> Option<InputCode> {
        match *self {
            InputCode::Keyboard { key, modifiers } if modifiers.contains(Modifiers::LONG) => {
                Some(InputCode::Keyboard {
                    key,
                    modifiers: modifiers.without(Modifiers::LONG),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for InputCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputCode::Keyboard { key, modifiers } => {
                write!(f, "key 0x{:x} (modifiers 0x{:x})", key, modifiers.0)
            }
            InputCode::Mouse(button) => write!(f, "mouse {:?}", button),
            InputCode::Remote(code) => write!(f, "remote {}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAction {
    pub action_id: u32,
    pub action_string: String,
}

/// Action lookup for keyboard, mouse and remote input.
#[derive(Debug, Clone, Default)]
pub struct WindowResolver {
    tables: HashMap<WindowId, HashMap<InputCode, BoundAction>>,
    fallbacks: WindowFallbacks,
}

impl WindowResolver {
    pub fn new(fallbacks: WindowFallbacks) -> Self {
        Self {
            tables: HashMap::new(),
            fallbacks,
        }
    }

    /// Binds `input` in `window`, replacing any previous binding.
    pub fn bind(&mut self, window: WindowId, input: InputCode, action: BoundAction) {
        self.tables.entry(window).or_default().insert(input, action);
    }

    pub fn fallbacks(&self) -> &WindowFallbacks {
        &self.fallbacks
    }

    pub fn window_count(&self) -> usize {
        self.tables.len()
    }

    /// Resolves `input` for `window`.
    ///
    /// With `fallback` set, the window's declared fallback and then the global
    /// table are consulted when the window has no binding. Within each window
    /// a long press falls back to the short-press binding of the same key.
    pub fn get_action(
        &self,
        window: WindowId,
        input: &InputCode,
        fallback: bool,
    ) -> Option<&BoundAction> {
        for candidate in self.fallbacks.chain(window, fallback) {
            if let Some(action) = self.lookup(candidate, input) {
                debug!(
                    "Resolved {} in window {} (requested {}) to {}",
                    input, candidate, window, action.action_string
                );
                return Some(action);
            }
        }
        None
    }

    fn lookup(&self, window: WindowId, input: &InputCode) -> Option<&BoundAction> {
        let table = self.tables.get(&window)?;
        table
            .get(input)
            .or_else(|| input.short_press().and_then(|short| table.get(&short)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(id: u32, name: &str) -> BoundAction {
        BoundAction {
            action_id: id,
            action_string: name.to_string(),
        }
    }

    fn resolver() -> WindowResolver {
        // 10 falls back to 20, 30 has no fallback
        let fallbacks = WindowFallbacks::new([(10, 20)]).unwrap();
        let mut resolver = WindowResolver::new(fallbacks);
        resolver.bind(10, InputCode::key(0x41), bound(1, "window"));
        resolver.bind(20, InputCode::key(0x42), bound(2, "fallback"));
        resolver.bind(GLOBAL_WINDOW, InputCode::key(0x43), bound(3, "global"));
        resolver.bind(GLOBAL_WINDOW, InputCode::key(0x41), bound(4, "global-a"));
        resolver.bind(20, InputCode::key(0x43), bound(5, "fallback-c"));
        resolver
    }

    #[test]
    fn test_window_binding_wins() {
        let resolver = resolver();
        let action = resolver.get_action(10, &InputCode::key(0x41), true).unwrap();
        assert_eq!(action.action_id, 1);
    }

    #[test]
    fn test_fallback_before_global() {
        let resolver = resolver();
        let action = resolver.get_action(10, &InputCode::key(0x43), true).unwrap();
        assert_eq!(action.action_id, 5);
    }

    #[test]
    fn test_global_only_binding_resolves_from_window() {
        let fallbacks = WindowFallbacks::new([(10, 20)]).unwrap();
        let mut resolver = WindowResolver::new(fallbacks);
        resolver.bind(GLOBAL_WINDOW, InputCode::Remote(11), bound(7, "select"));

        let action = resolver.get_action(10, &InputCode::Remote(11), true).unwrap();
        assert_eq!(action.action_string, "select");
    }

    #[test]
    fn test_chain_order() {
        let fallbacks = WindowFallbacks::new([(10, 20)]).unwrap();
        assert_eq!(fallbacks.chain(10, true), vec![10, 20, GLOBAL_WINDOW]);
        assert_eq!(fallbacks.chain(30, true), vec![30, GLOBAL_WINDOW]);
        assert_eq!(fallbacks.chain(GLOBAL_WINDOW, true), vec![GLOBAL_WINDOW]);
        assert_eq!(fallbacks.chain(10, false), vec![10]);
    }

    #[test]
    fn test_fallback_is_single_step() {
        // 10 -> 20 -> 30; a lookup from 10 never reaches 30
        let fallbacks = WindowFallbacks::new([(10, 20), (20, 30)]).unwrap();
        let mut resolver = WindowResolver::new(fallbacks);
        resolver.bind(30, InputCode::key(0x41), bound(1, "deep"));

        assert!(resolver.get_action(10, &InputCode::key(0x41), true).is_none());
        assert!(resolver.get_action(20, &InputCode::key(0x41), true).is_some());
    }

    #[test]
    fn test_no_fallback_when_disabled() {
        let resolver = resolver();
        assert!(resolver.get_action(10, &InputCode::key(0x43), false).is_none());
    }

    #[test]
    fn test_long_press_falls_back_to_short() {
        let mut resolver = WindowResolver::new(WindowFallbacks::default());
        resolver.bind(GLOBAL_WINDOW, InputCode::key(0x0d), bound(7, "select"));

        let long = InputCode::Keyboard {
            key: 0x0d,
            modifiers: Modifiers::LONG,
        };
        assert_eq!(
            resolver.get_action(GLOBAL_WINDOW, &long, true).unwrap().action_id,
            7
        );

        resolver.bind(GLOBAL_WINDOW, long, bound(117, "contextmenu"));
        assert_eq!(
            resolver.get_action(GLOBAL_WINDOW, &long, true).unwrap().action_id,
            117
        );
    }

    #[test]
    fn test_long_press_keeps_other_modifiers() {
        let mut resolver = WindowResolver::new(WindowFallbacks::default());
        let ctrl = InputCode::Keyboard {
            key: 0x53,
            modifiers: Modifiers::CTRL,
        };
        resolver.bind(GLOBAL_WINDOW, ctrl, bound(85, "screenshot"));

        let ctrl_long = InputCode::Keyboard {
            key: 0x53,
            modifiers: Modifiers::CTRL.union(Modifiers::LONG),
        };
        assert!(resolver.get_action(GLOBAL_WINDOW, &ctrl_long, true).is_some());
        assert!(resolver
            .get_action(GLOBAL_WINDOW, &InputCode::key(0x53), true)
            .is_none());
    }

    #[test]
    fn test_invalid_fallback_graphs() {
        assert!(matches!(
            WindowFallbacks::new([(GLOBAL_WINDOW, 10)]),
            Err(MappingError::GlobalFallback)
        ));
        assert!(matches!(
            WindowFallbacks::new([(10, 10)]),
            Err(MappingError::SelfFallback(10))
        ));
        assert!(matches!(
            WindowFallbacks::new([(10, 20), (20, 10)]),
            Err(MappingError::FallbackCycle(_))
        ));
        assert!(matches!(
            WindowFallbacks::new([(10, 20), (10, 30)]),
            Err(MappingError::ConflictingFallback { window: 10, .. })
        ));
        assert!(WindowFallbacks::new([(10, 20), (10, 20)]).is_ok());
    }
}
