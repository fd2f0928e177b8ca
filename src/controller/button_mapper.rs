//! Learn mode: turning raw activations into new primitive bindings.
//!
//! While learning, the [`InputRouter`](crate::controller::input_router::InputRouter)
//! hands every raw sample to a [`PrimitiveButtonMapper`]. It decides which
//! samples are deliberate activations (a button press, a newly pressed hat
//! direction, an axis pushed past the activation threshold) and forwards the
//! resulting [`DriverPrimitive`] to a [`ButtonMapper`], at most once per
//! cooldown period.

use crate::config::CalibrationSettings;
use crate::controller::axis_calibrator::{AxisCalibrator, AxisCommit, AxisConfiguration};
use crate::controller::input_router::{ButtonMap, FeatureBinding};
use crate::controller::primitive::{CardinalDirection, DriverPrimitive, HatState, PrimitiveType};
use crate::mapping::MappingError;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Receiver of learned primitives.
pub trait ButtonMapper {
    /// Whether primitives of this type can be learned at all.
    fn accepts_primitive(&self, primitive_type: PrimitiveType) -> bool;

    /// Whether successive primitives must be spaced by the mapping cooldown.
    fn needs_cooldown(&self) -> bool {
        true
    }

    fn map_primitive(&mut self, primitive: &DriverPrimitive) -> Result<(), MappingError>;

    /// Called for offset axes once their configuration is fixed.
    fn set_axis_configuration(&mut self, _index: u32, _configuration: &AxisConfiguration) {}

    /// Writes everything learned so far into `button_map`.
    fn save_button_map(&mut self, _button_map: &mut ButtonMap) {}
}

impl<M: ButtonMapper + ?Sized> ButtonMapper for Box<M> {
    fn accepts_primitive(&self, primitive_type: PrimitiveType) -> bool {
        (**self).accepts_primitive(primitive_type)
    }

    fn needs_cooldown(&self) -> bool {
        (**self).needs_cooldown()
    }

    fn map_primitive(&mut self, primitive: &DriverPrimitive) -> Result<(), MappingError> {
        (**self).map_primitive(primitive)
    }

    fn set_axis_configuration(&mut self, index: u32, configuration: &AxisConfiguration) {
        (**self).set_axis_configuration(index, configuration)
    }

    fn save_button_map(&mut self, button_map: &mut ButtonMap) {
        (**self).save_button_map(button_map)
    }
}

pub struct PrimitiveButtonMapper<M: ButtonMapper> {
    mapper: M,
    settings: CalibrationSettings,
    buttons: HashMap<u32, bool>,
    hats: HashMap<u32, HatState>,
    axes: HashMap<u32, AxisCalibrator>,
    known_axes: HashMap<u32, AxisConfiguration>,
    last_commit_ms: Option<u64>,
}

impl<M: ButtonMapper> PrimitiveButtonMapper<M> {
    pub fn new(mapper: M, settings: CalibrationSettings) -> Self {
        Self {
            mapper,
            settings,
            buttons: HashMap::new(),
            hats: HashMap::new(),
            axes: HashMap::new(),
            known_axes: HashMap::new(),
            last_commit_ms: None,
        }
    }

    /// Seeds axis configurations already known from an existing button map.
    pub fn with_axis_configurations(
        mut self,
        configurations: impl IntoIterator<Item = (u32, AxisConfiguration)>,
    ) -> Self {
        self.known_axes.extend(configurations);
        self
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut M {
        &mut self.mapper
    }

    pub fn into_inner(self) -> M {
        self.mapper
    }

    pub fn on_button_motion(&mut self, index: u32, pressed: bool, now_ms: u64) -> bool {
        let was_pressed = self.buttons.insert(index, pressed).unwrap_or(false);
        if pressed && !was_pressed {
            self.map_primitive(DriverPrimitive::Button { index }, now_ms);
        }
        self.mapper.accepts_primitive(PrimitiveType::Button)
    }

    pub fn on_hat_motion(&mut self, index: u32, state: HatState, now_ms: u64) -> bool {
        let previous = self.hats.insert(index, state).unwrap_or_default();

        for direction in CardinalDirection::ALL {
            if state.contains(direction) && !previous.contains(direction) {
                self.map_primitive(DriverPrimitive::Hat { index, direction }, now_ms);
            }
        }
        self.mapper.accepts_primitive(PrimitiveType::Hat)
    }

    pub fn on_axis_motion(&mut self, index: u32, position: f32, now_ms: u64) -> bool {
        let settings = &self.settings;
        let known = self.known_axes.get(&index).copied().unwrap_or_default();
        let calibrator = self
            .axes
            .entry(index)
            .or_insert_with(|| AxisCalibrator::new(index, known, settings));

        let active = calibrator.on_motion(position, now_ms);
        if let Some(commit) = calibrator.take_commit(now_ms) {
            self.commit_axis(commit, now_ms);
        }
        active
    }

    /// Commits axis activations whose delay has elapsed without new samples.
    pub fn process_axis_motions(&mut self, now_ms: u64) {
        let commits: Vec<AxisCommit> = self
            .axes
            .values_mut()
            .filter_map(|calibrator| calibrator.take_commit(now_ms))
            .collect();

        for commit in commits {
            self.commit_axis(commit, now_ms);
        }
    }

    fn commit_axis(&mut self, commit: AxisCommit, now_ms: u64) {
        let AxisCommit {
            primitive,
            configuration,
        } = commit;

        if self.map_primitive(primitive, now_ms) {
            if let (DriverPrimitive::Semiaxis { index, .. }, Some(configuration)) =
                (primitive, configuration)
            {
                self.known_axes.insert(index, configuration);
                self.mapper.set_axis_configuration(index, &configuration);
            }
        }
    }

    /// Returns whether the primitive was stored. Rejections are only logged.
    fn map_primitive(&mut self, primitive: DriverPrimitive, now_ms: u64) -> bool {
        if !self.mapper.accepts_primitive(primitive.primitive_type()) {
            debug!("Mapper does not accept {}", primitive);
            return false;
        }

        if self.mapper.needs_cooldown() {
            if let Some(last) = self.last_commit_ms {
                if now_ms.saturating_sub(last) < self.settings.mapping_cooldown_ms {
                    debug!("Ignoring {}: mapping cooldown active", primitive);
                    return false;
                }
            }
        }

        match self.mapper.map_primitive(&primitive) {
            Ok(()) => {
                info!("Learned {}", primitive);
                self.last_commit_ms = Some(now_ms);
                true
            }
            Err(e) => {
                warn!("Failed to learn {}: {}", primitive, e);
                false
            }
        }
    }
}

/// Learns one feature binding per primitive, in order.
#[derive(Debug, Default)]
pub struct SequentialMapper {
    pending: VecDeque<FeatureBinding>,
    learned: ButtonMap,
}

impl SequentialMapper {
    pub fn new(features: impl IntoIterator<Item = FeatureBinding>) -> Self {
        Self {
            pending: features.into_iter().collect(),
            learned: ButtonMap::default(),
        }
    }

    /// Next feature waiting for a primitive.
    pub fn current(&self) -> Option<&FeatureBinding> {
        self.pending.front()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn learned(&self) -> &ButtonMap {
        &self.learned
    }

    /// Leaves the current feature unbound.
    pub fn skip(&mut self) -> Option<FeatureBinding> {
        self.pending.pop_front()
    }
}

impl ButtonMapper for SequentialMapper {
    fn accepts_primitive(&self, primitive_type: PrimitiveType) -> bool {
        matches!(
            primitive_type,
            PrimitiveType::Button | PrimitiveType::Hat | PrimitiveType::Semiaxis
        )
    }

    fn map_primitive(&mut self, primitive: &DriverPrimitive) -> Result<(), MappingError> {
        if let Some(existing) = self.learned.get(primitive) {
            return Err(MappingError::PrimitiveRejected {
                primitive: *primitive,
                reason: format!("already bound to {}", existing),
            });
        }

        let binding = self.pending.pop_front().ok_or(MappingError::NothingToLearn)?;
        debug!("Binding {} to {}", primitive, binding);
        self.learned.bind(*primitive, binding);
        Ok(())
    }

    fn set_axis_configuration(&mut self, index: u32, configuration: &AxisConfiguration) {
        self.learned.set_axis_configuration(index, *configuration);
    }

    fn save_button_map(&mut self, button_map: &mut ButtonMap) {
        button_map.merge(std::mem::take(&mut self.learned));
    }
}
