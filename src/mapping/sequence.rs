//! Detector for a fixed sequence of raw button presses.

use crate::controller::primitive::FeatureName;
use crate::mapping::actions::KeymapAction;
use tracing::{debug, info};

/// Result of feeding one press into a [`ButtonSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceProgress {
    /// The press is not part of the sequence
    Ignored,
    /// The press advanced the sequence; normal dispatch is suppressed
    Capturing,
    /// The press completed the sequence
    Finished,
}

#[derive(Debug, Clone)]
pub struct ButtonSequence {
    sequence: Vec<FeatureName>,
    /// Presses before this index reach the keymap as usual
    capture_from: usize,
    position: usize,
    action: Option<KeymapAction>,
}

impl ButtonSequence {
    pub fn new<I, S>(sequence: I, capture_from: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FeatureName>,
    {
        Self {
            sequence: sequence.into_iter().map(Into::into).collect(),
            capture_from,
            position: 0,
            action: None,
        }
    }

    /// The classic up, up, down, down, left, right, left, right, b, a sequence.
    ///
    /// The directional presses still navigate; only `b` and `a` are captured.
    pub fn konami() -> Self {
        Self::new(
            ["up", "up", "down", "down", "left", "right", "left", "right", "b", "a"],
            8,
        )
    }

    /// Action to dispatch once the sequence completes.
    pub fn with_action(mut self, action: KeymapAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn action(&self) -> Option<&KeymapAction> {
        self.action.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn on_button_press(&mut self, feature: &str) -> SequenceProgress {
        let Some(expected) = self.sequence.get(self.position) else {
            self.position = 0;
            return SequenceProgress::Ignored;
        };

        if expected != feature {
            if self.position > 0 {
                debug!("Button sequence broken at step {} by {}", self.position, feature);
            }
            // A mismatching press may itself start a new attempt
            self.position = usize::from(self.sequence.first().is_some_and(|first| first == feature));
            return SequenceProgress::Ignored;
        }

        self.position += 1;
        if self.position == self.sequence.len() {
            info!("Button sequence completed");
            self.position = 0;
            return SequenceProgress::Finished;
        }

        if self.position > self.capture_from {
            SequenceProgress::Capturing
        } else {
            SequenceProgress::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(sequence: &mut ButtonSequence, presses: &[&str]) -> Vec<SequenceProgress> {
        presses.iter().map(|p| sequence.on_button_press(p)).collect()
    }

    #[test]
    fn test_konami_completes() {
        let mut sequence = ButtonSequence::konami();
        let progress = feed(
            &mut sequence,
            &["up", "up", "down", "down", "left", "right", "left", "right", "b", "a"],
        );

        assert!(progress[..8].iter().all(|p| *p == SequenceProgress::Ignored));
        assert_eq!(progress[8], SequenceProgress::Capturing);
        assert_eq!(progress[9], SequenceProgress::Finished);
        assert_eq!(sequence.position(), 0);
    }

    #[test]
    fn test_mismatch_resets() {
        let mut sequence = ButtonSequence::konami();
        feed(&mut sequence, &["up", "up", "down"]);
        assert_eq!(sequence.position(), 3);

        assert_eq!(sequence.on_button_press("x"), SequenceProgress::Ignored);
        assert_eq!(sequence.position(), 0);

        // A breaking press that matches the first step starts over
        feed(&mut sequence, &["up", "up", "down", "down", "up"]);
        assert_eq!(sequence.position(), 1);
    }
}
