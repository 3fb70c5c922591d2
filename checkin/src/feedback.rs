//! Operator feedback signals.
//!
//! The processor picks a signal from the outcome kind alone; a
//! [`FeedbackSink`] turns it into vibration, colour and sound on the device.

use serde::Serialize;

/// Feedback category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FeedbackKind {
    /// Ticket accepted
    Success,
    /// Ticket already used
    Warning,
    /// Ticket rejected
    Error,
}

impl FeedbackKind {
    /// Vibration pattern in milliseconds, alternating wait and vibrate
    #[must_use]
    pub const fn vibration_pattern(self) -> &'static [u64] {
        match self {
            Self::Success => &[100],
            Self::Warning => &[0, 100, 100, 100],
            Self::Error => &[0, 200, 100, 200],
        }
    }
}

/// One feedback emission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FeedbackSignal {
    /// Category driving colour and sound
    pub kind: FeedbackKind,
    /// Vibration pattern, absent when haptics are switched off
    pub vibration: Option<&'static [u64]>,
}

impl FeedbackSignal {
    /// Signal for `kind`, with or without vibration
    #[must_use]
    pub const fn new(kind: FeedbackKind, haptics_enabled: bool) -> Self {
        Self {
            kind,
            vibration: if haptics_enabled {
                Some(kind.vibration_pattern())
            } else {
                None
            },
        }
    }
}

/// Device feedback channel
///
/// Emission is fire-and-forget and must not block.
pub trait FeedbackSink: Send + Sync {
    /// Present a feedback signal to the operator
    fn emit(&self, signal: FeedbackSignal);
}

/// Sink that writes signals to the log, for headless runs
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn emit(&self, signal: FeedbackSignal) {
        tracing::info!(kind = ?signal.kind, vibration = ?signal.vibration, "Feedback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_match_outcome_severity() {
        assert_eq!(FeedbackKind::Success.vibration_pattern(), &[100]);
        assert_eq!(FeedbackKind::Warning.vibration_pattern(), &[0, 100, 100, 100]);
        assert_eq!(FeedbackKind::Error.vibration_pattern(), &[0, 200, 100, 200]);
    }

    #[test]
    fn disabled_haptics_drop_only_the_vibration() {
        let signal = FeedbackSignal::new(FeedbackKind::Warning, false);
        assert_eq!(signal.kind, FeedbackKind::Warning);
        assert_eq!(signal.vibration, None);
    }
}
