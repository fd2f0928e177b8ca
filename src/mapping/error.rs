//! Error definitions for keymap construction and primitive learning.
//!
//! Resolution itself never fails: unbound input resolves to "not handled".
//! These errors only surface while tables are being built or while a learned
//! primitive is being written.

use crate::controller::primitive::DriverPrimitive;
use crate::mapping::WindowId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    /// The keymap source could not be read
    #[error("Failed to read keymap {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The keymap source is not valid TOML or does not match the schema
    #[error("Failed to parse keymap: {0}")]
    Parse(#[from] toml::de::Error),

    /// The global window cannot fall back anywhere
    #[error("Global window cannot declare a fallback window")]
    GlobalFallback,

    #[error("Window {0} declares itself as its fallback")]
    SelfFallback(WindowId),

    #[error("Window {window} declares conflicting fallbacks {first} and {second}")]
    ConflictingFallback {
        window: WindowId,
        first: WindowId,
        second: WindowId,
    },

    /// Following fallbacks from this window never reaches the global window
    #[error("Fallback cycle through window {0}")]
    FallbackCycle(WindowId),

    #[error("Unknown key name '{0}'")]
    InvalidKey(String),

    /// A learned primitive was refused by the button map
    #[error("Primitive {primitive} rejected: {reason}")]
    PrimitiveRejected {
        primitive: DriverPrimitive,
        reason: String,
    },

    /// A learned primitive arrived while no feature was waiting for one
    #[error("No feature is waiting for a primitive")]
    NothingToLearn,
}
