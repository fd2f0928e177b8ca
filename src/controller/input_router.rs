//! Glue between the device layer and the keymap handler.
//!
//! The device layer reports raw samples by index. The [`InputRouter`] looks
//! each primitive up in its [`ButtonMap`] and forwards the resulting feature
//! to the [`KeymapHandler`]:
//!
//! ```text
//! button / hat / axis ──► ButtonMap ──► Scalar feature ──► press / magnitude
//!                                   └─► Directional ────► (x, y) per stick, wheel, throttle
//! ```
//!
//! While learning, every sample goes to the [`PrimitiveButtonMapper`] instead
//! and nothing is dispatched.

use crate::config::CalibrationSettings;
use crate::controller::axis_calibrator::AxisConfiguration;
use crate::controller::button_mapper::{ButtonMapper, PrimitiveButtonMapper};
use crate::controller::primitive::{
    CardinalDirection, DriverPrimitive, FeatureName, HatState, InputType,
};
use crate::mapping::{ActionDispatcher, KeymapHandler};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Kind of two-dimensional control a directional binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    AnalogStick,
    Wheel,
    Throttle,
}

/// What a primitive means on the controller profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureBinding {
    Scalar(FeatureName),
    Directional {
        feature: FeatureName,
        kind: CompositeKind,
        direction: CardinalDirection,
    },
}

impl FeatureBinding {
    pub fn feature(&self) -> &str {
        match self {
            FeatureBinding::Scalar(feature) => feature,
            FeatureBinding::Directional { feature, .. } => feature,
        }
    }
}

impl fmt::Display for FeatureBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureBinding::Scalar(feature) => f.write_str(feature),
            FeatureBinding::Directional {
                feature, direction, ..
            } => write!(f, "{}{}", feature, direction),
        }
    }
}

/// Primitive bindings of one device plus its learned axis shapes.
#[derive(Debug, Clone, Default)]
pub struct ButtonMap {
    primitives: HashMap<DriverPrimitive, FeatureBinding>,
    axis_configs: HashMap<u32, AxisConfiguration>,
}

impl ButtonMap {
    /// Binds `primitive`, returning the binding it replaced.
    pub fn bind(
        &mut self,
        primitive: DriverPrimitive,
        binding: FeatureBinding,
    ) -> Option<FeatureBinding> {
        self.primitives.insert(primitive, binding)
    }

    pub fn get(&self, primitive: &DriverPrimitive) -> Option<&FeatureBinding> {
        self.primitives.get(primitive)
    }

    /// All semiaxes bound on physical axis `index`.
    pub fn semiaxes(
        &self,
        index: u32,
    ) -> impl Iterator<Item = (&DriverPrimitive, &FeatureBinding)> + '_ {
        self.primitives.iter().filter(move |(primitive, _)| {
            matches!(primitive, DriverPrimitive::Semiaxis { index: i, .. } if *i == index)
        })
    }

    pub fn set_axis_configuration(&mut self, index: u32, configuration: AxisConfiguration) {
        self.axis_configs.insert(index, configuration);
    }

    pub fn axis_configuration(&self, index: u32) -> Option<&AxisConfiguration> {
        self.axis_configs.get(&index)
    }

    pub fn axis_configurations(&self) -> impl Iterator<Item = (u32, AxisConfiguration)> + '_ {
        self.axis_configs.iter().map(|(index, config)| (*index, *config))
    }

    /// Adds everything from `other`; its bindings win on conflict.
    pub fn merge(&mut self, other: ButtonMap) {
        self.primitives.extend(other.primitives);
        self.axis_configs.extend(other.axis_configs);
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// Per-direction magnitudes of one composite feature.
#[derive(Debug, Clone, Copy)]
struct CompositeState {
    kind: CompositeKind,
    up: f32,
    down: f32,
    right: f32,
    left: f32,
}

impl CompositeState {
    fn new(kind: CompositeKind) -> Self {
        Self {
            kind,
            up: 0.0,
            down: 0.0,
            right: 0.0,
            left: 0.0,
        }
    }

    fn set(&mut self, direction: CardinalDirection, magnitude: f32) {
        match direction {
            CardinalDirection::Up => self.up = magnitude,
            CardinalDirection::Down => self.down = magnitude,
            CardinalDirection::Right => self.right = magnitude,
            CardinalDirection::Left => self.left = magnitude,
        }
    }

    fn vector(&self) -> (f32, f32) {
        (self.right - self.left, self.up - self.down)
    }

    fn is_centered(&self) -> bool {
        self.vector() == (0.0, 0.0)
    }
}

pub struct InputRouter<D: ActionDispatcher> {
    handler: KeymapHandler<D>,
    button_map: ButtonMap,
    calibration: CalibrationSettings,
    held_features: BTreeSet<FeatureName>,
    hats: HashMap<u32, HatState>,
    composites: HashMap<FeatureName, CompositeState>,
    learner: Option<PrimitiveButtonMapper<Box<dyn ButtonMapper>>>,
}

impl<D: ActionDispatcher> InputRouter<D> {
    pub fn new(
        handler: KeymapHandler<D>,
        button_map: ButtonMap,
        calibration: CalibrationSettings,
    ) -> Self {
        Self {
            handler,
            button_map,
            calibration,
            held_features: BTreeSet::new(),
            hats: HashMap::new(),
            composites: HashMap::new(),
            learner: None,
        }
    }

    pub fn handler(&self) -> &KeymapHandler<D> {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut KeymapHandler<D> {
        &mut self.handler
    }

    pub fn button_map(&self) -> &ButtonMap {
        &self.button_map
    }

    pub fn is_learning(&self) -> bool {
        self.learner.is_some()
    }

    /// Routes all further samples to `mapper` until [`Self::stop_learning`].
    ///
    /// Held features are released first so no key stays stuck.
    pub fn start_learning(&mut self, mapper: Box<dyn ButtonMapper>, now_ms: u64) {
        for feature in std::mem::take(&mut self.held_features) {
            self.handler.on_button_press(&feature, false, now_ms);
        }
        let composites: Vec<FeatureName> = self.composites.keys().cloned().collect();
        for feature in composites {
            if let Some(state) = self.composites.get_mut(&feature) {
                *state = CompositeState::new(state.kind);
            }
            self.forward_composite(&feature, now_ms);
        }

        info!("Entering learn mode");
        self.learner = Some(
            PrimitiveButtonMapper::new(mapper, self.calibration.clone())
                .with_axis_configurations(self.button_map.axis_configurations()),
        );
    }

    /// Leaves learn mode and merges what was learned into the button map.
    pub fn stop_learning(&mut self) -> Option<Box<dyn ButtonMapper>> {
        let mut mapper = self.learner.take()?.into_inner();
        let before = self.button_map.len();
        mapper.save_button_map(&mut self.button_map);
        info!(
            "Leaving learn mode, button map has {} primitives ({} before)",
            self.button_map.len(),
            before
        );
        // Old samples refer to the previous map
        self.hats.clear();
        Some(mapper)
    }

    pub fn on_button_motion(&mut self, index: u32, pressed: bool, now_ms: u64) -> bool {
        if let Some(learner) = self.learner.as_mut() {
            return learner.on_button_motion(index, pressed, now_ms);
        }

        let primitive = DriverPrimitive::Button { index };
        match self.button_map.get(&primitive).cloned() {
            Some(binding) => self.route(binding, if pressed { 1.0 } else { 0.0 }, now_ms),
            None => {
                debug!("Unmapped {}", primitive);
                false
            }
        }
    }

    /// Forwards only the directions whose state changed.
    pub fn on_hat_motion(&mut self, index: u32, state: HatState, now_ms: u64) -> bool {
        if let Some(learner) = self.learner.as_mut() {
            return learner.on_hat_motion(index, state, now_ms);
        }

        let previous = self.hats.insert(index, state).unwrap_or_default();
        let mut handled = false;
        for direction in CardinalDirection::ALL {
            let pressed = state.contains(direction);
            if pressed == previous.contains(direction) {
                continue;
            }
            let primitive = DriverPrimitive::Hat { index, direction };
            if let Some(binding) = self.button_map.get(&primitive).cloned() {
                handled |= self.route(binding, if pressed { 1.0 } else { 0.0 }, now_ms);
            }
        }
        handled
    }

    pub fn on_axis_motion(&mut self, index: u32, position: f32, now_ms: u64) -> bool {
        if let Some(learner) = self.learner.as_mut() {
            return learner.on_axis_motion(index, position, now_ms);
        }

        let bindings: Vec<(f32, FeatureBinding)> = self
            .button_map
            .semiaxes(index)
            .map(|(primitive, binding)| (primitive.semiaxis_magnitude(position), binding.clone()))
            .collect();

        let mut handled = false;
        let mut touched: Vec<FeatureName> = Vec::new();
        for (magnitude, binding) in bindings {
            match binding {
                FeatureBinding::Scalar(_) => handled |= self.route(binding, magnitude, now_ms),
                FeatureBinding::Directional {
                    feature,
                    kind,
                    direction,
                } => {
                    self.composites
                        .entry(feature.clone())
                        .or_insert_with(|| CompositeState::new(kind))
                        .set(direction, magnitude);
                    if !touched.contains(&feature) {
                        touched.push(feature);
                    }
                }
            }
        }

        // Both semiaxes of a stick axis update before the stick is evaluated
        for feature in touched {
            handled |= self.forward_composite(&feature, now_ms);
        }
        handled
    }

    /// Periodic tick: repeats held digital features and deflected sticks,
    /// wheels and throttles, and commits delayed learn-mode axis activations.
    pub fn process_holds(&mut self, now_ms: u64) -> bool {
        if let Some(learner) = self.learner.as_mut() {
            learner.process_axis_motions(now_ms);
            return false;
        }

        let held: Vec<FeatureName> = self.held_features.iter().cloned().collect();
        let mut handled = false;
        for feature in held {
            handled |= self.handler.on_button_hold(&feature, now_ms);
        }

        // Axes only report changes, a steady deflection still has to repeat
        let deflected: Vec<FeatureName> = self
            .composites
            .iter()
            .filter(|(_, state)| !state.is_centered())
            .map(|(feature, _)| feature.clone())
            .collect();
        for feature in deflected {
            handled |= self.forward_composite(&feature, now_ms);
        }
        handled
    }

    fn route(&mut self, binding: FeatureBinding, magnitude: f32, now_ms: u64) -> bool {
        match binding {
            FeatureBinding::Scalar(feature) => match self.handler.input_type(&feature) {
                InputType::Digital => {
                    let pressed = magnitude >= self.handler.timing().digital_threshold;
                    let changed = if pressed {
                        self.held_features.insert(feature.clone())
                    } else {
                        self.held_features.remove(&feature)
                    };
                    changed && self.handler.on_button_press(&feature, pressed, now_ms)
                }
                InputType::Analog => self.handler.on_button_motion(&feature, magnitude, now_ms),
            },
            FeatureBinding::Directional {
                feature,
                kind,
                direction,
            } => {
                self.composites
                    .entry(feature.clone())
                    .or_insert_with(|| CompositeState::new(kind))
                    .set(direction, magnitude);
                self.forward_composite(&feature, now_ms)
            }
        }
    }

    fn forward_composite(&mut self, feature: &str, now_ms: u64) -> bool {
        let Some(state) = self.composites.get(feature).copied() else {
            return false;
        };
        let (x, y) = state.vector();
        match state.kind {
            CompositeKind::AnalogStick => self.handler.on_analog_stick_motion(feature, x, y, now_ms),
            CompositeKind::Wheel => self.handler.on_wheel_motion(feature, x, now_ms),
            CompositeKind::Throttle => self.handler.on_throttle_motion(feature, y, now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingSettings;
    use crate::controller::button_mapper::SequentialMapper;
    use crate::controller::primitive::{KeyName, SemiAxisDirection};
    use crate::mapping::key_handler::tests::RecordingDispatcher;
    use crate::mapping::{Keymap, KeymapAction};
    use std::sync::Arc;

    fn keymap() -> Arc<Keymap> {
        Arc::new(Keymap::global([
            (KeyName::feature("a"), KeymapAction::new(7, "select")),
            (KeyName::feature("up"), KeymapAction::new(3, "up")),
            (KeyName::feature("lefttrigger"), KeymapAction::new(92, "back")),
            (
                KeyName::feature("righttrigger"),
                KeymapAction::new(124, "analogseekforward"),
            ),
            (
                KeyName::directional("leftstick", CardinalDirection::Left),
                KeymapAction::new(1, "left"),
            ),
            (
                KeyName::directional("leftstick", CardinalDirection::Up),
                KeymapAction::new(3, "up"),
            ),
        ]))
    }

    fn button_map() -> ButtonMap {
        let mut map = ButtonMap::default();
        map.bind(
            DriverPrimitive::Button { index: 0 },
            FeatureBinding::Scalar("a".into()),
        );
        map.bind(
            DriverPrimitive::Hat {
                index: 0,
                direction: CardinalDirection::Up,
            },
            FeatureBinding::Scalar("up".into()),
        );
        map.bind(
            DriverPrimitive::semiaxis(2, SemiAxisDirection::Positive),
            FeatureBinding::Scalar("lefttrigger".into()),
        );
        map.bind(
            DriverPrimitive::semiaxis(5, SemiAxisDirection::Positive),
            FeatureBinding::Scalar("righttrigger".into()),
        );
        for (index, positive, negative) in [
            (0, CardinalDirection::Right, CardinalDirection::Left),
            (1, CardinalDirection::Up, CardinalDirection::Down),
        ] {
            for (direction, semi) in [
                (positive, SemiAxisDirection::Positive),
                (negative, SemiAxisDirection::Negative),
            ] {
                map.bind(
                    DriverPrimitive::semiaxis(index, semi),
                    FeatureBinding::Directional {
                        feature: "leftstick".into(),
                        kind: CompositeKind::AnalogStick,
                        direction,
                    },
                );
            }
        }
        map
    }

    fn router() -> InputRouter<RecordingDispatcher> {
        let mut dispatcher = RecordingDispatcher::default();
        dispatcher.analog.insert(124);
        let handler = KeymapHandler::new(keymap(), dispatcher, TimingSettings::default());
        InputRouter::new(handler, button_map(), CalibrationSettings::default())
    }

    fn ids(router: &InputRouter<RecordingDispatcher>) -> Vec<u32> {
        router.handler().dispatcher().ids()
    }

    #[test]
    fn test_button_routes_to_feature() {
        let mut router = router();
        assert!(router.on_button_motion(0, true, 0));
        assert!(!router.on_button_motion(0, false, 10));
        assert!(!router.on_button_motion(9, true, 20));
        assert_eq!(ids(&router), vec![7]);
    }

    #[test]
    fn test_hat_forwards_changed_directions_only() {
        let mut router = router();
        assert!(router.on_hat_motion(0, HatState::UP, 0));
        assert!(!router.on_hat_motion(0, HatState::UP.union(HatState::LEFT), 10));
        assert!(!router.on_hat_motion(0, HatState::CENTERED, 20));
        assert_eq!(ids(&router), vec![3]);
    }

    #[test]
    fn test_digital_trigger_pressed_once() {
        let mut router = router();
        assert!(!router.on_axis_motion(2, 0.3, 0));
        assert!(router.on_axis_motion(2, 0.6, 10));
        assert!(!router.on_axis_motion(2, 0.9, 20));
        assert!(!router.on_axis_motion(2, 0.1, 30));
        assert_eq!(ids(&router), vec![92]);
    }

    #[test]
    fn test_analog_trigger_forwards_magnitude() {
        let mut router = router();
        assert!(router.on_axis_motion(5, 0.25, 0));
        assert!(router.on_axis_motion(5, 0.75, 10));
        let amounts: Vec<f32> = router
            .handler()
            .dispatcher()
            .actions
            .iter()
            .map(|a| a.amount)
            .collect();
        assert_eq!(amounts, vec![0.25, 0.75]);
    }

    #[test]
    fn test_stick_axes_combine() {
        let mut router = router();
        assert!(router.on_axis_motion(0, -0.9, 0));
        // Y overtakes X: left is released and up pressed
        assert!(router.on_axis_motion(1, 0.95, 10));
        assert_eq!(ids(&router), vec![1, 3]);
        assert!(!router
            .handler()
            .is_key_pressed(&KeyName::directional("leftstick", CardinalDirection::Left)));
    }

    #[test]
    fn test_process_holds_repeats_held_buttons() {
        let mut router = router();
        router.on_button_motion(0, true, 0);
        assert!(!router.process_holds(100));
        assert!(router.process_holds(500));
        router.on_button_motion(0, false, 510);
        assert!(!router.process_holds(600));
        assert_eq!(ids(&router), vec![7, 7]);
    }

    #[test]
    fn test_process_holds_repeats_held_stick() {
        let mut router = router();
        assert!(router.on_axis_motion(0, -0.9, 0));

        let mut dispatched_at = vec![0];
        for t in (10..=1200u64).step_by(10) {
            if router.process_holds(t) {
                dispatched_at.push(t);
            }
        }

        let mut expected = vec![0];
        expected.extend((500..=1200).step_by(50));
        assert_eq!(dispatched_at, expected);
        assert!(ids(&router).iter().all(|&id| id == 1));
    }

    #[test]
    fn test_centered_stick_is_not_ticked() {
        let mut router = router();
        router.on_axis_motion(0, -0.9, 0);
        router.on_axis_motion(0, 0.0, 100);
        assert!(!router.process_holds(600));
        assert!(!router.process_holds(650));
        assert_eq!(ids(&router), vec![1]);
    }

    #[test]
    fn test_learn_mode_binds_new_primitives() {
        let mut router = router();
        let mapper = SequentialMapper::new([FeatureBinding::Scalar("x".into())]);
        router.start_learning(Box::new(mapper), 0);
        assert!(router.is_learning());

        assert!(router.on_button_motion(7, true, 100));
        router.on_button_motion(7, false, 150);
        assert!(ids(&router).is_empty());

        router.stop_learning().unwrap();
        assert!(!router.is_learning());
        assert_eq!(
            router.button_map().get(&DriverPrimitive::Button { index: 7 }),
            Some(&FeatureBinding::Scalar("x".into()))
        );
    }

    #[test]
    fn test_learn_mode_records_offset_axis_configuration() {
        let mut router = router();
        let mapper = SequentialMapper::new([FeatureBinding::Scalar("righttrigger".into())]);
        router.start_learning(Box::new(mapper), 0);

        router.on_axis_motion(6, -1.0, 0);
        router.on_axis_motion(6, 1.0, 10);
        router.process_holds(300);
        router.stop_learning();

        let configuration = router.button_map().axis_configuration(6).unwrap();
        assert_eq!(configuration.center, -1);
        assert_eq!(configuration.range, 2);
        assert_eq!(router.button_map().semiaxes(6).count(), 1);
    }

    #[test]
    fn test_start_learning_releases_held_features() {
        let mut router = router();
        router.on_button_motion(0, true, 0);
        router.start_learning(Box::new(SequentialMapper::default()), 10);
        assert!(!router.handler().is_key_pressed(&KeyName::feature("a")));
    }
}
