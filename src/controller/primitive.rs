//! Physical input locations and the logical names they are bound to.
//!
//! A [`DriverPrimitive`] says *where* an input came from on the device (button
//! 3, hat 0 pointing up, the positive half of axis 2). A [`FeatureName`] says
//! *what* it means on an abstract controller profile ("a", "leftstick"). A
//! [`KeyName`] is the unit of keymap lookup: a feature, optionally suffixed by
//! the cardinal direction of a stick, wheel or throttle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque logical control name on a controller profile.
pub type FeatureName = String;

/// Cardinal direction shared by hats, analog sticks, wheels, throttles and
/// relative pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardinalDirection {
    Up,
    Down,
    Right,
    Left,
}

impl CardinalDirection {
    pub const ALL: [CardinalDirection; 4] = [
        CardinalDirection::Up,
        CardinalDirection::Down,
        CardinalDirection::Right,
        CardinalDirection::Left,
    ];

    /// Directions a wheel can turn in.
    pub const HORIZONTAL: [CardinalDirection; 2] =
        [CardinalDirection::Left, CardinalDirection::Right];

    /// Directions a throttle can move in.
    pub const VERTICAL: [CardinalDirection; 2] = [CardinalDirection::Up, CardinalDirection::Down];

    /// Dominant direction of a 2D vector, or `None` at the exact origin.
    ///
    /// The four quadrants are split along the diagonals; ties on a diagonal
    /// resolve clockwise (up wins over right, right over down, and so on).
    pub fn from_vector(x: f32, y: f32) -> Option<Self> {
        if y >= x && y > -x {
            Some(CardinalDirection::Up)
        } else if y < x && y >= -x {
            Some(CardinalDirection::Right)
        } else if y <= x && y < -x {
            Some(CardinalDirection::Down)
        } else if y > x && y <= -x {
            Some(CardinalDirection::Left)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardinalDirection::Up => "up",
            CardinalDirection::Down => "down",
            CardinalDirection::Right => "right",
            CardinalDirection::Left => "left",
        }
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a physical axis a semiaxis covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemiAxisDirection {
    Negative,
    Positive,
}

impl SemiAxisDirection {
    /// Direction of a normalized position; `None` exactly at the center.
    pub fn of(position: f32) -> Option<Self> {
        if position > 0.0 {
            Some(SemiAxisDirection::Positive)
        } else if position < 0.0 {
            Some(SemiAxisDirection::Negative)
        } else {
            None
        }
    }

    pub fn sign(&self) -> f32 {
        match self {
            SemiAxisDirection::Negative => -1.0,
            SemiAxisDirection::Positive => 1.0,
        }
    }
}

/// Raw hat state as reported by the device layer, one bit per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct HatState(u8);

impl HatState {
    pub const CENTERED: HatState = HatState(0);
    pub const UP: HatState = HatState(1);
    pub const RIGHT: HatState = HatState(2);
    pub const DOWN: HatState = HatState(4);
    pub const LEFT: HatState = HatState(8);

    pub const fn from_bits(bits: u8) -> Self {
        HatState(bits & 0x0f)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn union(self, other: HatState) -> HatState {
        HatState(self.0 | other.0)
    }

    pub fn contains(&self, direction: CardinalDirection) -> bool {
        let bit = match direction {
            CardinalDirection::Up => Self::UP,
            CardinalDirection::Right => Self::RIGHT,
            CardinalDirection::Down => Self::DOWN,
            CardinalDirection::Left => Self::LEFT,
        };
        self.0 & bit.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Button4,
    Button5,
    WheelUp,
    WheelDown,
    WheelLeft,
    WheelRight,
}

/// Discriminant of [`DriverPrimitive`], used for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Button,
    Hat,
    Semiaxis,
    Key,
    MouseButton,
    RelativePointer,
    Motor,
}

/// A physical input location on a device.
///
/// A semiaxis with `center == 0` and one with `center == ±1` on the same
/// index are distinct primitives; this is how anomalous triggers that rest at
/// one end of their travel are represented without renumbering the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverPrimitive {
    Button {
        index: u32,
    },
    Hat {
        index: u32,
        direction: CardinalDirection,
    },
    Semiaxis {
        index: u32,
        center: i8,
        direction: SemiAxisDirection,
        range: u8,
    },
    Key {
        code: u32,
    },
    MouseButton {
        button: MouseButton,
    },
    RelativePointer {
        direction: CardinalDirection,
    },
    Motor {
        index: u32,
    },
}

impl DriverPrimitive {
    /// Semiaxis on a normal axis (rest position 0, range 1).
    pub fn semiaxis(index: u32, direction: SemiAxisDirection) -> Self {
        DriverPrimitive::Semiaxis {
            index,
            center: 0,
            direction,
            range: 1,
        }
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            DriverPrimitive::Button { .. } => PrimitiveType::Button,
            DriverPrimitive::Hat { .. } => PrimitiveType::Hat,
            DriverPrimitive::Semiaxis { .. } => PrimitiveType::Semiaxis,
            DriverPrimitive::Key { .. } => PrimitiveType::Key,
            DriverPrimitive::MouseButton { .. } => PrimitiveType::MouseButton,
            DriverPrimitive::RelativePointer { .. } => PrimitiveType::RelativePointer,
            DriverPrimitive::Motor { .. } => PrimitiveType::Motor,
        }
    }

    /// Whether the primitive describes a location a device can report.
    ///
    /// Offset semiaxes must point away from their center (a trigger resting at
    /// -1 can only travel in the positive direction) and may span a range of
    /// up to 2; normal semiaxes always have range 1.
    pub fn is_valid(&self) -> bool {
        match *self {
            DriverPrimitive::Semiaxis {
                center,
                direction,
                range,
                ..
            } => {
                let (valid_center, max_range) = match center {
                    -1 => (direction == SemiAxisDirection::Positive, 2),
                    0 => (true, 1),
                    1 => (direction == SemiAxisDirection::Negative, 2),
                    _ => (false, 0),
                };
                valid_center && (1..=max_range).contains(&range)
            }
            _ => true,
        }
    }

    /// Magnitude in `[0, 1]` of a raw axis position as seen by this semiaxis.
    ///
    /// Returns 0 for every other primitive type.
    pub fn semiaxis_magnitude(&self, position: f32) -> f32 {
        match *self {
            DriverPrimitive::Semiaxis {
                center,
                direction,
                range,
                ..
            } => {
                let normalized = (position - center as f32) / range.max(1) as f32;
                (normalized * direction.sign()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

impl fmt::Display for DriverPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverPrimitive::Button { index } => write!(f, "button {}", index),
            DriverPrimitive::Hat { index, direction } => write!(f, "hat {} {}", index, direction),
            DriverPrimitive::Semiaxis {
                index,
                center,
                direction,
                range,
            } => {
                let sign = match direction {
                    SemiAxisDirection::Negative => '-',
                    SemiAxisDirection::Positive => '+',
                };
                write!(
                    f,
                    "semiaxis {}{} (center {}, range {})",
                    sign, index, center, range
                )
            }
            DriverPrimitive::Key { code } => write!(f, "key 0x{:x}", code),
            DriverPrimitive::MouseButton { button } => write!(f, "mouse {:?}", button),
            DriverPrimitive::RelativePointer { direction } => write!(f, "pointer {}", direction),
            DriverPrimitive::Motor { index } => write!(f, "motor {}", index),
        }
    }
}

/// How a feature wants to be read: as a pressed/released switch or as a
/// continuous magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Digital,
    Analog,
}

/// Keymap lookup key: a feature name plus an optional direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyName {
    feature: FeatureName,
    direction: Option<CardinalDirection>,
}

impl KeyName {
    pub fn new(feature: impl Into<FeatureName>, direction: Option<CardinalDirection>) -> Self {
        Self {
            feature: feature.into(),
            direction,
        }
    }

    pub fn feature(feature: impl Into<FeatureName>) -> Self {
        Self::new(feature, None)
    }

    pub fn directional(feature: impl Into<FeatureName>, direction: CardinalDirection) -> Self {
        Self::new(feature, Some(direction))
    }

    pub fn feature_name(&self) -> &str {
        &self.feature
    }

    pub fn direction(&self) -> Option<CardinalDirection> {
        self.direction
    }
}

impl From<&str> for KeyName {
    fn from(feature: &str) -> Self {
        KeyName::feature(feature)
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Some(direction) => write!(f, "{}{}", self.feature, direction),
            None => f.write_str(&self.feature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_direction_quadrants() {
        assert_eq!(CardinalDirection::from_vector(0.9, 0.05), Some(CardinalDirection::Right));
        assert_eq!(CardinalDirection::from_vector(0.05, 0.9), Some(CardinalDirection::Up));
        assert_eq!(CardinalDirection::from_vector(-0.9, 0.2), Some(CardinalDirection::Left));
        assert_eq!(CardinalDirection::from_vector(0.1, -0.7), Some(CardinalDirection::Down));
        assert_eq!(CardinalDirection::from_vector(0.0, 0.0), None);
    }

    #[test]
    fn test_vector_direction_diagonal_ties() {
        // Diagonals resolve clockwise
        assert_eq!(CardinalDirection::from_vector(0.5, 0.5), Some(CardinalDirection::Up));
        assert_eq!(CardinalDirection::from_vector(0.5, -0.5), Some(CardinalDirection::Right));
        assert_eq!(CardinalDirection::from_vector(-0.5, -0.5), Some(CardinalDirection::Down));
        assert_eq!(CardinalDirection::from_vector(-0.5, 0.5), Some(CardinalDirection::Left));
    }

    #[test]
    fn test_offset_semiaxis_validity() {
        let trigger = DriverPrimitive::Semiaxis {
            index: 2,
            center: -1,
            direction: SemiAxisDirection::Positive,
            range: 2,
        };
        assert!(trigger.is_valid());

        let backwards = DriverPrimitive::Semiaxis {
            index: 2,
            center: -1,
            direction: SemiAxisDirection::Negative,
            range: 2,
        };
        assert!(!backwards.is_valid());

        let wide_normal = DriverPrimitive::Semiaxis {
            index: 0,
            center: 0,
            direction: SemiAxisDirection::Positive,
            range: 2,
        };
        assert!(!wide_normal.is_valid());
    }

    #[test]
    fn test_offset_and_normal_semiaxis_are_distinct() {
        let normal = DriverPrimitive::semiaxis(2, SemiAxisDirection::Positive);
        let offset = DriverPrimitive::Semiaxis {
            index: 2,
            center: -1,
            direction: SemiAxisDirection::Positive,
            range: 2,
        };
        assert_ne!(normal, offset);
    }

    #[test]
    fn test_semiaxis_magnitude() {
        let positive = DriverPrimitive::semiaxis(0, SemiAxisDirection::Positive);
        assert_eq!(positive.semiaxis_magnitude(0.6), 0.6);
        assert_eq!(positive.semiaxis_magnitude(-0.6), 0.0);

        let trigger = DriverPrimitive::Semiaxis {
            index: 2,
            center: -1,
            direction: SemiAxisDirection::Positive,
            range: 2,
        };
        assert_eq!(trigger.semiaxis_magnitude(-1.0), 0.0);
        assert_eq!(trigger.semiaxis_magnitude(0.0), 0.5);
        assert_eq!(trigger.semiaxis_magnitude(1.0), 1.0);
    }

    #[test]
    fn test_hat_state_bits() {
        let state = HatState::UP.union(HatState::LEFT);
        assert!(state.contains(CardinalDirection::Up));
        assert!(state.contains(CardinalDirection::Left));
        assert!(!state.contains(CardinalDirection::Down));
        assert_eq!(HatState::from_bits(0xff).bits(), 0x0f);
    }

    #[test]
    fn test_key_name_display() {
        assert_eq!(KeyName::feature("a").to_string(), "a");
        assert_eq!(
            KeyName::directional("leftstick", CardinalDirection::Up).to_string(),
            "leftstickup"
        );
    }
}
