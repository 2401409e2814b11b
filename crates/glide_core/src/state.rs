//! Animation state machine values and failure policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single animation
///
/// Variants are ordered by "badness": anything past `UpdateSuccess` means the
/// animation is over.
///
/// ```text
/// NotYetBegun -> UpdateSuccess <-> UpdateSuccess
///                              -> ValueDidntUpdateAsExpected
///                              -> Completed
///                              -> Halted
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AnimationState {
    /// No tick has run yet
    #[default]
    NotYetBegun = 0,
    /// The live value diverged from what the animation last wrote
    ValueDidntUpdateAsExpected = 1,
    /// The last tick produced and applied a new value
    UpdateSuccess = 2,
    /// Target reached
    Completed = 3,
    /// Stopped externally, by a callback, or after a failure
    Halted = 4,
}

impl AnimationState {
    /// True for every state other than `NotYetBegun` and `UpdateSuccess`
    #[inline]
    pub fn is_finished(self) -> bool {
        !matches!(self, AnimationState::NotYetBegun | AnimationState::UpdateSuccess)
    }

    /// States that can never be left once entered
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, AnimationState::Completed | AnimationState::Halted)
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8); out-of-range values read as `Halted`
    #[inline]
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AnimationState::NotYetBegun,
            1 => AnimationState::ValueDidntUpdateAsExpected,
            2 => AnimationState::UpdateSuccess,
            3 => AnimationState::Completed,
            _ => AnimationState::Halted,
        }
    }
}

impl fmt::Display for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnimationState::NotYetBegun => "not-yet-begun",
            AnimationState::ValueDidntUpdateAsExpected => "value-didnt-update-as-expected",
            AnimationState::UpdateSuccess => "update-success",
            AnimationState::Completed => "completed",
            AnimationState::Halted => "halted",
        };
        f.write_str(name)
    }
}

/// What to do when a transition handler or an update callback fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionPolicy {
    /// Record a diagnostic entry and carry on
    #[default]
    Log,
    /// Return the error from the call that triggered the tick
    Throw,
    /// Stop the animation without a trace
    Silent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_finished() {
        assert!(!AnimationState::NotYetBegun.is_finished());
        assert!(!AnimationState::UpdateSuccess.is_finished());
        assert!(AnimationState::ValueDidntUpdateAsExpected.is_finished());
        assert!(AnimationState::Completed.is_finished());
        assert!(AnimationState::Halted.is_finished());
    }

    #[test]
    fn test_u8_round_trip() {
        for state in [
            AnimationState::NotYetBegun,
            AnimationState::ValueDidntUpdateAsExpected,
            AnimationState::UpdateSuccess,
            AnimationState::Completed,
            AnimationState::Halted,
        ] {
            assert_eq!(AnimationState::from_u8(state.as_u8()), state);
        }
        assert_eq!(AnimationState::from_u8(200), AnimationState::Halted);
    }

    #[test]
    fn test_badness_order() {
        assert!(AnimationState::Halted > AnimationState::Completed);
        assert!(AnimationState::Completed > AnimationState::UpdateSuccess);
    }
}
