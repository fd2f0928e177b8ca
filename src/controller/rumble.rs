//! Force feedback patterns played in a background task.
//!
//! The generator never touches mapping state. It talks to the device only
//! through [`RumbleDevice::set_rumble`] and checks for cancellation between
//! every step, so stopping takes effect within one step.

use crate::config::RumbleSettings;
use crate::controller::primitive::FeatureName;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RumbleError {
    #[error("Unknown motor '{0}'")]
    UnknownMotor(String),

    #[error("Device rejected rumble command: {0}")]
    Device(String),

    #[error("Rumble task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A device with one or more rumble motors.
pub trait RumbleDevice: Send + Sync + 'static {
    fn motors(&self) -> Vec<FeatureName>;

    /// Sets `motor` to `magnitude` in `[0, 1]`; 0 stops it.
    fn set_rumble(&self, motor: &str, magnitude: f32) -> Result<(), RumbleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RumblePattern {
    /// Each motor in turn at full strength
    Test,
    /// All motors together, briefly
    Notification,
}

pub struct RumbleGenerator {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RumbleGenerator {
    pub fn spawn(
        device: Arc<dyn RumbleDevice>,
        pattern: RumblePattern,
        settings: RumbleSettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        info!("Starting {:?} rumble pattern", pattern);
        let handle = tokio::spawn(async move {
            run_pattern(device, pattern, settings, token).await;
        });
        Self { cancel, handle }
    }

    /// Requests the pattern to stop. Motors are zeroed by the task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the pattern to end.
    pub async fn join(mut self) -> Result<(), RumbleError> {
        (&mut self.handle).await?;
        Ok(())
    }
}

impl Drop for RumbleGenerator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_pattern(
    device: Arc<dyn RumbleDevice>,
    pattern: RumblePattern,
    settings: RumbleSettings,
    cancel: CancellationToken,
) {
    let motors = device.motors();
    if motors.is_empty() {
        warn!("Device has no rumble motors");
        return;
    }

    match pattern {
        RumblePattern::Test => {
            let duration = Duration::from_millis(settings.test_duration_ms);
            for motor in &motors {
                let single = std::slice::from_ref(motor);
                if !play_step(device.as_ref(), single, 1.0, duration, &cancel).await {
                    break;
                }
            }
        }
        RumblePattern::Notification => {
            let duration = Duration::from_millis(settings.notification_duration_ms);
            let magnitude = settings.notification_magnitude.clamp(0.0, 1.0);
            play_step(device.as_ref(), &motors, magnitude, duration, &cancel).await;
        }
    }

    // Leave nothing running, whether finished or cancelled
    set_all(device.as_ref(), &motors, 0.0);
    debug!("Rumble pattern {:?} finished", pattern);
}

/// Runs `motors` for `duration`. Returns false when cancelled.
async fn play_step(
    device: &dyn RumbleDevice,
    motors: &[FeatureName],
    magnitude: f32,
    duration: Duration,
    cancel: &CancellationToken,
) -> bool {
    set_all(device, motors, magnitude);

    let completed = tokio::select! {
        _ = cancel.cancelled() => {
            info!("Rumble pattern cancelled");
            false
        }
        _ = tokio::time::sleep(duration) => true,
    };

    if completed {
        set_all(device, motors, 0.0);
    }
    completed
}

fn set_all(device: &dyn RumbleDevice, motors: &[FeatureName], magnitude: f32) {
    for motor in motors {
        if let Err(e) = device.set_rumble(motor, magnitude) {
            warn!("Failed to set rumble on {}: {}", motor, e);
        }
    }
}
