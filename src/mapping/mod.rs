//! Resolution of features and discrete inputs into application actions.
//!
//! Joystick-style input arrives as features (`"a"`, `"leftstick"`) and is
//! routed through a [`KeymapHandler`], which keeps one [`KeyHandler`] per key
//! name and decides between press, hold, repeat and release actions.
//! Keyboard, mouse and remote input bypass the key handlers and query the
//! [`WindowResolver`] directly. Both sides share the same window fallback
//! chain.

pub mod actions;
pub mod error;
pub mod key_handler;
pub mod keymap;
pub mod keymap_handler;
pub mod sequence;
pub mod source;
pub mod window;

pub use actions::{Action, ActionDispatcher, ActionTable, ActionTranslator, KeymapAction};
pub use error::MappingError;
pub use key_handler::{KeyHandler, PressTracker};
pub use keymap::{Keymap, KeymapBuilder};
pub use keymap_handler::KeymapHandler;
pub use sequence::{ButtonSequence, SequenceProgress};
pub use source::KeymapSource;
pub use window::{BoundAction, InputCode, Modifiers, WindowFallbacks, WindowResolver};

/// Identifier of an application window.
pub type WindowId = i32;

/// Window whose bindings apply everywhere.
pub const GLOBAL_WINDOW: WindowId = -1;
