//! Annotation requests for the rendering layer
//!
//! The core never draws. It describes what should be drawn over the frame
//! and leaves pixels to whoever owns the video surface.

use forma_core::{Joint, Position};
use serde::Serialize;

use crate::{AngleKind, FeedbackKind, Phase, RepCounters, SkipReason};

/// One drawing request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// Line between two tracked joints
    Segment { from: Joint, to: Joint },

    /// Angle value next to its vertex joint
    AngleLabel {
        angle: AngleKind,
        degrees: f32,
        at: Position,
    },

    /// Current phase
    PhaseLabel { phase: Phase, text: &'static str },

    /// Active form warning
    FeedbackLabel {
        kind: FeedbackKind,
        text: &'static str,
    },

    /// Rep counters
    Counters { correct: u32, incorrect: u32 },

    /// Why the frame was not analysed
    Notice { reason: SkipReason, text: &'static str },
}

impl Annotation {
    pub fn phase(phase: Phase) -> Self {
        Annotation::PhaseLabel {
            phase,
            text: phase.label(),
        }
    }

    pub fn feedback(kind: FeedbackKind) -> Self {
        Annotation::FeedbackLabel {
            kind,
            text: kind.message(),
        }
    }

    pub fn counters(counters: RepCounters) -> Self {
        Annotation::Counters {
            correct: counters.correct,
            incorrect: counters.incorrect,
        }
    }

    pub fn notice(reason: SkipReason) -> Self {
        Annotation::Notice {
            reason,
            text: reason.message(),
        }
    }
}
