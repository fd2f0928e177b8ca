//! gilrs backed device layer for the demo binary.
//!
//! Translates gilrs events into raw button, hat and axis samples on the
//! indices used by [`standard_button_map`] and feeds them to an
//! [`InputRouter`].

use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Repeat, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use padmap::config::DriverSettings;
use padmap::controller::primitive::{CardinalDirection, SemiAxisDirection};
use padmap::controller::{
    ButtonMap, CompositeKind, DriverPrimitive, FeatureBinding, FeatureName, HatState,
    InputRouter, RumbleDevice, RumbleError,
};
use padmap::mapping::ActionDispatcher;
use statum::{machine, state};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

const BUTTON_COUNT: u32 = 11;
const AXIS_COUNT: u32 = 6;
const DPAD_HAT: u32 = 0;
const LEFT_TRIGGER_AXIS: u32 = 4;
const RIGHT_TRIGGER_AXIS: u32 = 5;

// Length of one effect cycle; effects repeat until stopped
const MOTOR_CYCLE_MS: u32 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to initialize gamepad driver: {0}")]
    Initialization(String),

    #[error("Force feedback unavailable: {0}")]
    ForceFeedback(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Initializing,
    Polling,
}

#[machine]
#[derive(Debug)]
pub struct GamepadDriver<S: DriverState> {
    gilrs: Gilrs,

    // Only events from this gamepad reach the router
    active_gamepad: Option<GamepadId>,

    settings: DriverSettings,

    // D-pad buttons folded into one hat
    hat: HatState,

    // Set when a gamepad was selected since the last check
    newly_connected: bool,
}

impl<S: DriverState> GamepadDriver<S> {
    pub fn active_gamepad(&self) -> Option<GamepadId> {
        self.active_gamepad
    }
}

impl GamepadDriver<Initializing> {
    pub fn create(settings: DriverSettings) -> Result<Self, DriverError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(DriverError::Initialization(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings, HatState::CENTERED, false))
    }

    /// Selects the first connected gamepad and starts polling.
    pub fn initialize(mut self) -> Result<GamepadDriver<Polling>, DriverError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!(
                    "  [{}] ID: {}, Name: {}, force feedback: {}",
                    idx,
                    id,
                    gamepad.name(),
                    gamepad.is_ff_supported()
                );
            }
            let (id, gamepad) = &gamepads[0];
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
            self.active_gamepad = Some(*id);
            self.newly_connected = true;
        }

        info!(
            "Gamepad driver ready, deadzone {}",
            self.settings.joystick_deadzone
        );
        Ok(self.transition())
    }
}

impl GamepadDriver<Polling> {
    /// Drains pending gilrs events into `router`. Returns the number of
    /// events that produced an action or learn result.
    pub fn poll<D: ActionDispatcher>(&mut self, router: &mut InputRouter<D>, now_ms: u64) -> usize {
        let mut handled = 0;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match self.active_gamepad {
                Some(active) if active != id => {
                    debug!("Skipping event from non-active gamepad: {}", id);
                    continue;
                }
                None if matches!(event, EventType::Connected) => {
                    info!("Gamepad {} connected, selecting it", id);
                    self.active_gamepad = Some(id);
                    self.newly_connected = true;
                    continue;
                }
                None => continue,
                _ => {}
            }

            if self.handle_event(event, router, now_ms) {
                handled += 1;
            }
        }
        handled
    }

    /// Returns true once after a gamepad has been selected.
    pub fn take_connected(&mut self) -> bool {
        std::mem::take(&mut self.newly_connected)
    }

    /// Rumble motors of the active gamepad, if it supports force feedback.
    pub fn rumble_device(&mut self) -> Option<GilrsRumble> {
        let id = self.active_gamepad?;
        let supported = self
            .gilrs
            .connected_gamepad(id)
            .is_some_and(|gamepad| gamepad.is_ff_supported());
        if !supported {
            info!("Gamepad {} has no force feedback", id);
            return None;
        }
        match GilrsRumble::new(&mut self.gilrs, id) {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn handle_event<D: ActionDispatcher>(
        &mut self,
        event: EventType,
        router: &mut InputRouter<D>,
        now_ms: u64,
    ) -> bool {
        match event {
            EventType::ButtonPressed(button, _) => self.on_button(button, true, router, now_ms),
            EventType::ButtonReleased(button, _) => self.on_button(button, false, router, now_ms),
            EventType::ButtonChanged(button, value, _) => match trigger_axis(button) {
                Some(index) => router.on_axis_motion(index, value, now_ms),
                None => false,
            },
            EventType::AxisChanged(axis, value, _) => {
                let Some(index) = axis_index(axis) else {
                    debug!("Ignoring unsupported axis: {:?}", axis);
                    return false;
                };
                let value = match axis {
                    // Triggers may rest at -1, leave them untouched
                    Axis::LeftZ | Axis::RightZ => value,
                    _ => apply_deadzone(value, self.settings.joystick_deadzone),
                };
                router.on_axis_motion(index, value, now_ms)
            }
            EventType::Disconnected => {
                warn!("Active gamepad disconnected, releasing all inputs");
                self.active_gamepad = None;
                self.release_all(router, now_ms);
                false
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                false
            }
        }
    }

    fn on_button<D: ActionDispatcher>(
        &mut self,
        button: Button,
        pressed: bool,
        router: &mut InputRouter<D>,
        now_ms: u64,
    ) -> bool {
        if let Some(direction) = dpad_direction(button) {
            self.hat = if pressed {
                self.hat.union(direction)
            } else {
                HatState::from_bits(self.hat.bits() & !direction.bits())
            };
            return router.on_hat_motion(DPAD_HAT, self.hat, now_ms);
        }

        match button_index(button) {
            Some(index) => router.on_button_motion(index, pressed, now_ms),
            None => {
                debug!("Ignoring unmapped button: {:?}", button);
                false
            }
        }
    }

    fn release_all<D: ActionDispatcher>(&mut self, router: &mut InputRouter<D>, now_ms: u64) {
        for index in 0..BUTTON_COUNT {
            router.on_button_motion(index, false, now_ms);
        }
        self.hat = HatState::CENTERED;
        router.on_hat_motion(DPAD_HAT, self.hat, now_ms);
        for index in 0..AXIS_COUNT {
            let rest = rest_position(router.button_map(), index);
            router.on_axis_motion(index, rest, now_ms);
        }
    }
}

/// Rumble motors driven through gilrs force feedback effects.
pub struct GilrsRumble {
    effects: Mutex<HashMap<FeatureName, Effect>>,
}

impl GilrsRumble {
    pub fn new(gilrs: &mut Gilrs, id: GamepadId) -> Result<Self, DriverError> {
        let mut effects = HashMap::new();
        for (motor, kind) in [
            ("strong", BaseEffectType::Strong { magnitude: u16::MAX }),
            ("weak", BaseEffectType::Weak { magnitude: u16::MAX }),
        ] {
            let effect = EffectBuilder::new()
                .add_effect(BaseEffect {
                    kind,
                    scheduling: Replay {
                        play_for: Ticks::from_ms(MOTOR_CYCLE_MS),
                        ..Default::default()
                    },
                    envelope: Default::default(),
                })
                .gamepads(&[id])
                .repeat(Repeat::Infinitely)
                .finish(gilrs)
                .map_err(|e| DriverError::ForceFeedback(e.to_string()))?;
            effects.insert(motor.to_string(), effect);
        }
        Ok(Self {
            effects: Mutex::new(effects),
        })
    }
}

impl RumbleDevice for GilrsRumble {
    fn motors(&self) -> Vec<FeatureName> {
        vec!["strong".to_string(), "weak".to_string()]
    }

    fn set_rumble(&self, motor: &str, magnitude: f32) -> Result<(), RumbleError> {
        let effects = self
            .effects
            .lock()
            .map_err(|e| RumbleError::Device(e.to_string()))?;
        let effect = effects
            .get(motor)
            .ok_or_else(|| RumbleError::UnknownMotor(motor.to_string()))?;

        let result = if magnitude <= 0.0 {
            effect.stop()
        } else {
            effect
                .set_gain(magnitude.min(1.0))
                .and_then(|_| effect.play())
        };
        result.map_err(|e| RumbleError::Device(e.to_string()))
    }
}

/// Profile for the gilrs standard layout.
pub fn standard_button_map() -> ButtonMap {
    let mut map = ButtonMap::default();

    for (index, feature) in [
        "a",
        "b",
        "x",
        "y",
        "leftbumper",
        "rightbumper",
        "back",
        "start",
        "guide",
        "leftthumb",
        "rightthumb",
    ]
    .into_iter()
    .enumerate()
    {
        map.bind(
            DriverPrimitive::Button {
                index: index as u32,
            },
            FeatureBinding::Scalar(feature.to_string()),
        );
    }

    for direction in CardinalDirection::ALL {
        map.bind(
            DriverPrimitive::Hat {
                index: DPAD_HAT,
                direction,
            },
            FeatureBinding::Scalar(direction.as_str().to_string()),
        );
    }

    for (feature, x_axis, y_axis) in [("leftstick", 0, 1), ("rightstick", 2, 3)] {
        for (index, negative, positive) in [
            (x_axis, CardinalDirection::Left, CardinalDirection::Right),
            (y_axis, CardinalDirection::Down, CardinalDirection::Up),
        ] {
            for (semiaxis, direction) in [
                (SemiAxisDirection::Negative, negative),
                (SemiAxisDirection::Positive, positive),
            ] {
                map.bind(
                    DriverPrimitive::semiaxis(index, semiaxis),
                    FeatureBinding::Directional {
                        feature: feature.to_string(),
                        kind: CompositeKind::AnalogStick,
                        direction,
                    },
                );
            }
        }
    }

    for (feature, index) in [
        ("lefttrigger", LEFT_TRIGGER_AXIS),
        ("righttrigger", RIGHT_TRIGGER_AXIS),
    ] {
        map.bind(
            DriverPrimitive::semiaxis(index, SemiAxisDirection::Positive),
            FeatureBinding::Scalar(feature.to_string()),
        );
    }

    map
}

fn button_index(button: Button) -> Option<u32> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::LeftTrigger => Some(4),
        Button::RightTrigger => Some(5),
        Button::Select => Some(6),
        Button::Start => Some(7),
        Button::Mode => Some(8),
        Button::LeftThumb => Some(9),
        Button::RightThumb => Some(10),
        _ => None,
    }
}

fn dpad_direction(button: Button) -> Option<HatState> {
    match button {
        Button::DPadUp => Some(HatState::UP),
        Button::DPadRight => Some(HatState::RIGHT),
        Button::DPadDown => Some(HatState::DOWN),
        Button::DPadLeft => Some(HatState::LEFT),
        _ => None,
    }
}

// Analog triggers reported as buttons with a value
fn trigger_axis(button: Button) -> Option<u32> {
    match button {
        Button::LeftTrigger2 => Some(LEFT_TRIGGER_AXIS),
        Button::RightTrigger2 => Some(RIGHT_TRIGGER_AXIS),
        _ => None,
    }
}

fn axis_index(axis: Axis) -> Option<u32> {
    match axis {
        Axis::LeftStickX => Some(0),
        Axis::LeftStickY => Some(1),
        Axis::RightStickX => Some(2),
        Axis::RightStickY => Some(3),
        Axis::LeftZ => Some(LEFT_TRIGGER_AXIS),
        Axis::RightZ => Some(RIGHT_TRIGGER_AXIS),
        _ => None,
    }
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale to the range outside the deadzone
        value.signum() * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

/// Value an axis reports when untouched; offset triggers rest at -1.
fn rest_position(map: &ButtonMap, index: u32) -> f32 {
    map.axis_configuration(index)
        .map_or(0.0, |config| f32::from(config.center))
}
