//! Device-facing half of the input pipeline
//!
//! Raw samples arrive from the device layer by index and leave as features
//! handed to the [`mapping`](crate::mapping) layer:
//!
//! 1. [`primitive`] - Physical input locations and logical key names
//! 2. [`input_router`] - Button map lookup and feature routing
//! 3. [`button_mapper`] - Learn mode, cooldown-gated primitive learning
//! 4. [`axis_calibrator`] - Runtime classification of unknown axes
//! 5. [`rumble`] - Background force feedback patterns
//!
//! # Architecture
//!
//! ```text
//!                      ┌──► ButtonMap ──► KeymapHandler ──► actions
//! Device ──► InputRouter
//!                      └──► PrimitiveButtonMapper ──► AxisCalibrator
//!                            (learn mode)             └──► ButtonMapper
//! ```
//!
//! Everything here runs on the caller's thread and uses caller-supplied
//! timestamps. Only the rumble generator runs as its own task.

pub mod axis_calibrator;
pub mod button_mapper;
pub mod input_router;
pub mod primitive;
pub mod rumble;

pub use axis_calibrator::{AxisCalibrator, AxisConfiguration};
pub use button_mapper::{ButtonMapper, PrimitiveButtonMapper, SequentialMapper};
pub use input_router::{ButtonMap, CompositeKind, FeatureBinding, InputRouter};
pub use primitive::{CardinalDirection, DriverPrimitive, FeatureName, HatState, KeyName};
pub use rumble::{RumbleDevice, RumbleError, RumbleGenerator, RumblePattern};
