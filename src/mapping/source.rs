//! Declarative keymap documents.
//!
//! A keymap document lists windows; each window declares an optional
//! fallback and its bindings per device class:
//!
//! ```toml
//! [[window]]
//! id = -1
//!
//! [[window.joystick]]
//! key = "a"
//! action = "select"
//!
//! [[window.joystick]]
//! key = "leftstick"
//! direction = "up"
//! action = "up"
//!
//! [[window.joystick]]
//! key = "b"
//! action = "back"
//! holdtime = 300
//! hotkeys = "lefttrigger"
//!
//! [[window.keyboard]]
//! key = "enter"
//! modifiers = ["long"]
//! action = "contextmenu"
//!
//! [[window]]
//! id = 10
//! fallback = 20
//! ```

use crate::controller::primitive::{CardinalDirection, KeyName, MouseButton};
use crate::mapping::actions::{ActionTranslator, KeymapAction};
use crate::mapping::error::MappingError;
use crate::mapping::keymap::Keymap;
use crate::mapping::window::{BoundAction, InputCode, Modifiers, WindowFallbacks, WindowResolver};
use crate::mapping::WindowId;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeymapSource {
    #[serde(rename = "window", default)]
    pub windows: Vec<WindowSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowSource {
    pub id: WindowId,
    #[serde(default)]
    pub fallback: Option<WindowId>,
    #[serde(default)]
    pub joystick: Vec<JoystickEntry>,
    #[serde(default)]
    pub keyboard: Vec<KeyboardEntry>,
    #[serde(default)]
    pub mouse: Vec<MouseEntry>,
    #[serde(default)]
    pub remote: Vec<RemoteEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoystickEntry {
    /// Feature name
    pub key: String,
    pub action: String,
    #[serde(default)]
    pub direction: Option<CardinalDirection>,
    #[serde(default)]
    pub holdtime: Option<u32>,
    /// Comma-separated feature names
    #[serde(default)]
    pub hotkeys: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyboardEntry {
    pub key: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MouseEntry {
    pub button: MouseButton,
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub code: u32,
    pub action: String,
}

impl KeymapSource {
    pub fn from_toml_str(content: &str) -> Result<Self, MappingError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, MappingError> {
        debug!("Reading keymap from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Builds the joystick keymap and the discrete-input resolver.
    ///
    /// Entries with an unknown action, key or modifier name are skipped.
    pub fn build(
        &self,
        translator: &dyn ActionTranslator,
    ) -> Result<(Keymap, WindowResolver), MappingError> {
        let fallbacks = WindowFallbacks::new(
            self.windows
                .iter()
                .filter_map(|w| w.fallback.map(|fallback| (w.id, fallback))),
        )?;

        let mut builder = Keymap::builder(fallbacks.clone());
        let mut resolver = WindowResolver::new(fallbacks);
        let mut skipped = 0usize;

        for window in &self.windows {
            for entry in &window.joystick {
                let Some(action_id) = translate(translator, &entry.action, window.id) else {
                    skipped += 1;
                    continue;
                };
                let key = KeyName::new(entry.key.trim().to_ascii_lowercase(), entry.direction);
                let action = KeymapAction::new(action_id, entry.action.trim())
                    .with_hold_time(entry.holdtime.unwrap_or(0))
                    .with_hotkeys(parse_hotkeys(entry.hotkeys.as_deref()));
                builder.bind(window.id, key, action);
            }

            for entry in &window.keyboard {
                let Some(action_id) = translate(translator, &entry.action, window.id) else {
                    skipped += 1;
                    continue;
                };
                let key = match parse_key(&entry.key) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!("{} in window {}, skipping", e, window.id);
                        skipped += 1;
                        continue;
                    }
                };
                let modifiers = match parse_modifiers(&entry.modifiers) {
                    Ok(modifiers) => modifiers,
                    Err(e) => {
                        warn!("{} on key '{}' in window {}, skipping", e, entry.key, window.id);
                        skipped += 1;
                        continue;
                    }
                };
                resolver.bind(
                    window.id,
                    InputCode::Keyboard { key, modifiers },
                    bound(action_id, &entry.action),
                );
            }

            for entry in &window.mouse {
                let Some(action_id) = translate(translator, &entry.action, window.id) else {
                    skipped += 1;
                    continue;
                };
                resolver.bind(
                    window.id,
                    InputCode::Mouse(entry.button),
                    bound(action_id, &entry.action),
                );
            }

            for entry in &window.remote {
                let Some(action_id) = translate(translator, &entry.action, window.id) else {
                    skipped += 1;
                    continue;
                };
                resolver.bind(
                    window.id,
                    InputCode::Remote(entry.code),
                    bound(action_id, &entry.action),
                );
            }
        }

        let keymap = builder.build();
        info!(
            "Built keymap with {} windows ({} bindings skipped)",
            self.windows.len(),
            skipped
        );
        Ok((keymap, resolver))
    }
}

fn translate(translator: &dyn ActionTranslator, action: &str, window: WindowId) -> Option<u32> {
    let id = translator.translate(action);
    if id.is_none() {
        warn!("Unknown action '{}' in window {}, skipping", action, window);
    }
    id
}

fn bound(action_id: u32, action: &str) -> BoundAction {
    BoundAction {
        action_id,
        action_string: action.trim().to_string(),
    }
}

fn parse_hotkeys(hotkeys: Option<&str>) -> Vec<KeyName> {
    hotkeys
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| KeyName::feature(name.to_ascii_lowercase()))
        .collect()
}

fn parse_modifiers(names: &[String]) -> Result<Modifiers, MappingError> {
    names.iter().try_fold(Modifiers::NONE, |acc, name| {
        Modifiers::from_name(name)
            .map(|m| acc.union(m))
            .ok_or_else(|| MappingError::InvalidKey(name.clone()))
    })
}

/// Parses a keyboard key name into a virtual key code.
pub fn parse_key(name: &str) -> Result<u32, MappingError> {
    let lower = name.trim().to_ascii_lowercase();

    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphanumeric() {
            return Ok(c.to_ascii_uppercase() as u32);
        }
    }

    let code = match lower.as_str() {
        "backspace" => 0x08,
        "tab" => 0x09,
        "enter" | "return" => 0x0d,
        "escape" | "esc" => 0x1b,
        "space" => 0x20,
        "pageup" => 0x21,
        "pagedown" => 0x22,
        "end" => 0x23,
        "home" => 0x24,
        "left" => 0x25,
        "up" => 0x26,
        "right" => 0x27,
        "down" => 0x28,
        "delete" => 0x2e,
        other => match other.strip_prefix('f').and_then(|n| n.parse::<u32>().ok()) {
            Some(n @ 1..=12) => 0x70 + n - 1,
            _ => return Err(MappingError::InvalidKey(name.to_string())),
        },
    };
    Ok(code)
}
