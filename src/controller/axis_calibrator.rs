//! Runtime classification of unknown analog axes.
//!
//! Nothing is known about an axis until it moves. Sticks rest at 0 and are
//! NORMAL. Some triggers rest at one end of their travel (-1 or +1) and are
//! OFFSET; their semiaxis is anchored at that end instead of at 0.
//!
//! ```text
//!            |pos| >= threshold                 commit
//! Inactive ─────────────────────► Activated ─────────────► Mapped
//!    ▲        (offset: wait for the delay)                   │
//!    └──────────────── direction changes ────────────────────┘
//! ```

use crate::config::CalibrationSettings;
use crate::controller::primitive::{DriverPrimitive, SemiAxisDirection};
use tracing::{debug, info};

/// Learned shape of one physical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisConfiguration {
    /// Rest position: -1, 0 or 1
    pub center: i8,
    /// Travel from the center: 1, or 2 for a trigger spanning -1..1
    pub range: u8,
    /// Set once the configuration is fixed for the session
    pub known: bool,
    /// The backend never reported a resting position for this axis
    pub late_discovery: bool,
}

impl Default for AxisConfiguration {
    fn default() -> Self {
        Self {
            center: 0,
            range: 1,
            known: false,
            late_discovery: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisType {
    Unknown,
    Normal,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    Inactive,
    Activated,
    Mapped,
}

/// A semiaxis ready to be learned.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisCommit {
    pub primitive: DriverPrimitive,
    /// Present for offset axes, whose configuration differs from the default
    pub configuration: Option<AxisConfiguration>,
}

#[derive(Debug, Clone)]
pub struct AxisCalibrator {
    index: u32,
    config: AxisConfiguration,
    axis_type: AxisType,
    state: AxisState,
    initial_position: Option<f32>,
    direction: Option<SemiAxisDirection>,
    activated_at_ms: u64,
    activation_threshold: f32,
    trigger_delay_ms: u64,
}

impl AxisCalibrator {
    pub fn new(index: u32, config: AxisConfiguration, settings: &CalibrationSettings) -> Self {
        let axis_type = match (config.known, config.center) {
            (false, _) => AxisType::Unknown,
            (true, 0) => AxisType::Normal,
            (true, _) => AxisType::Offset,
        };

        Self {
            index,
            config,
            axis_type,
            state: AxisState::Inactive,
            initial_position: None,
            direction: None,
            activated_at_ms: 0,
            activation_threshold: settings.activation_threshold,
            trigger_delay_ms: settings.trigger_delay_ms,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn axis_type(&self) -> AxisType {
        self.axis_type
    }

    pub fn state(&self) -> AxisState {
        self.state
    }

    pub fn configuration(&self) -> &AxisConfiguration {
        &self.config
    }

    /// Feeds one normalized position in `[-1, 1]`.
    ///
    /// Returns true while the axis is activated or mapped, i.e. while its
    /// motion belongs to the learn step.
    pub fn on_motion(&mut self, position: f32, now_ms: u64) -> bool {
        self.detect_type(position);
        if self.axis_type == AxisType::Unknown {
            return false;
        }

        let offset = position - f32::from(self.config.center);
        let normalized = offset / f32::from(self.config.range);
        let direction = SemiAxisDirection::of(normalized);
        let active = normalized.abs() >= self.activation_threshold;

        match self.state {
            AxisState::Inactive => {}
            AxisState::Activated => {
                // Transient spike, or a reversal before the commit
                if !active || direction != self.direction {
                    debug!("Axis {} deactivated before commit", self.index);
                    self.state = AxisState::Inactive;
                    self.direction = None;
                }
            }
            AxisState::Mapped => {
                if direction != self.direction {
                    debug!("Axis {} left its mapped semiaxis", self.index);
                    self.state = AxisState::Inactive;
                    self.direction = None;
                }
            }
        }

        // A reversal in one sample activates the opposite semiaxis right away
        if self.state == AxisState::Inactive && active {
            debug!(
                "Axis {} activated ({:?}) at {:.3}",
                self.index, direction, position
            );
            self.state = AxisState::Activated;
            self.direction = direction;
            self.activated_at_ms = now_ms;
        }

        self.state != AxisState::Inactive
    }

    /// Takes the pending activation once it may be committed.
    ///
    /// The calibrator counts as mapped from here on, whether or not the
    /// caller manages to store the primitive.
    pub fn take_commit(&mut self, now_ms: u64) -> Option<AxisCommit> {
        if self.state != AxisState::Activated {
            return None;
        }
        let direction = self.direction?;

        if self.axis_type == AxisType::Offset
            && now_ms.saturating_sub(self.activated_at_ms) < self.trigger_delay_ms
        {
            return None;
        }

        self.state = AxisState::Mapped;
        let primitive = DriverPrimitive::Semiaxis {
            index: self.index,
            center: self.config.center,
            direction,
            range: self.config.range,
        };

        let configuration = (self.axis_type == AxisType::Offset).then(|| {
            self.config.known = true;
            self.config
        });

        Some(AxisCommit {
            primitive,
            configuration,
        })
    }

    fn detect_type(&mut self, position: f32) {
        // Without a resting sample there is nothing to classify against
        if self.config.late_discovery && !self.config.known {
            return;
        }

        if (position - f32::from(self.config.center)).abs() > 1.0 && self.config.range != 2 {
            debug!("Axis {} spans more than one unit, widening range", self.index);
            self.config.range = 2;
        }

        if self.axis_type != AxisType::Unknown {
            return;
        }

        let initial = *self.initial_position.get_or_insert(position);
        if position == initial {
            return;
        }

        if initial.abs() > 0.5 {
            self.config.center = if initial < 0.0 { -1 } else { 1 };
            self.axis_type = AxisType::Offset;
            info!(
                "Axis {} is an offset trigger (center {})",
                self.index, self.config.center
            );
            // Re-check the range against the new center
            if (position - f32::from(self.config.center)).abs() > 1.0 {
                self.config.range = 2;
            }
        } else {
            self.axis_type = AxisType::Normal;
            info!("Axis {} is a normal axis", self.index);
        }
    }
}
