//! Feedback Generator - debounced form warnings
//!
//! Each rule owns an independent dwell counter. A violation has to persist
//! for `activate_frames` consecutive frames before the warning turns on,
//! and a clean run of `clear_frames` consecutive frames before it turns off.
//! A frame where the rule's input angle is unavailable leaves its counters
//! untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AngleSet, Phase, ThresholdProfile};

/// Form warnings the generator can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// Torso too upright while squatting
    BendForward,
    /// Torso leaning too far forward
    BendBackwards,
    /// Hip not flexed enough at the bottom
    LowerHips,
    /// Shin inclined too far, knee travelling past the toes
    KneeOverToe,
    /// Knee folded beyond the safe range at the bottom
    SquatTooDeep,
}

impl FeedbackKind {
    pub fn all() -> &'static [FeedbackKind] {
        &[
            FeedbackKind::BendForward,
            FeedbackKind::BendBackwards,
            FeedbackKind::LowerHips,
            FeedbackKind::KneeOverToe,
            FeedbackKind::SquatTooDeep,
        ]
    }

    /// Message shown to the user
    pub fn message(self) -> &'static str {
        match self {
            FeedbackKind::BendForward => "BEND FORWARD",
            FeedbackKind::BendBackwards => "BEND BACKWARDS",
            FeedbackKind::LowerHips => "LOWER YOUR HIPS",
            FeedbackKind::KneeOverToe => "KNEE FALLING OVER TOE",
            FeedbackKind::SquatTooDeep => "SQUAT TOO DEEP",
        }
    }

    /// Phases in which the rule is evaluated
    pub fn applies_in(self, phase: Phase) -> bool {
        match self {
            FeedbackKind::BendForward
            | FeedbackKind::BendBackwards
            | FeedbackKind::KneeOverToe => matches!(phase, Phase::Descending | Phase::Bottom),
            FeedbackKind::LowerHips | FeedbackKind::SquatTooDeep => phase == Phase::Bottom,
        }
    }

    /// Violation predicate.
    ///
    /// `Some(false)` outside the rule's phases, `None` when the angle it
    /// needs is unavailable.
    pub fn violated(self, angles: &AngleSet, phase: Phase, profile: &ThresholdProfile) -> Option<bool> {
        if !self.applies_in(phase) {
            return Some(false);
        }
        let violated = match self {
            FeedbackKind::BendForward => angles.back_inclination? < profile.back.min,
            FeedbackKind::BendBackwards => angles.back_inclination? > profile.back.max,
            FeedbackKind::LowerHips => angles.hip? > profile.hip.depth_max,
            FeedbackKind::KneeOverToe => angles.ankle? > profile.ankle.max,
            FeedbackKind::SquatTooDeep => angles.knee? < profile.knee.too_deep,
        };
        Some(violated)
    }
}

/// Activation state change of a single warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum FeedbackEvent {
    Raised(FeedbackKind),
    Cleared(FeedbackKind),
}

/// Dwell counters of one rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleState {
    pub active: bool,
    /// Consecutive violating frames while inactive
    pub violating_frames: u32,
    /// Consecutive clean frames while active
    pub clean_frames: u32,
}

/// Per-session feedback state for every enabled rule
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackGenerator {
    rules: BTreeMap<FeedbackKind, RuleState>,
}

impl FeedbackGenerator {
    /// Generator tracking the rules enabled in `profile`
    pub fn new(profile: &ThresholdProfile) -> Self {
        let rules = profile
            .rules
            .iter()
            .map(|kind| (*kind, RuleState::default()))
            .collect();
        Self { rules }
    }

    /// Evaluate every rule for one frame, returning activation changes
    pub fn update(
        &mut self,
        angles: &AngleSet,
        phase: Phase,
        profile: &ThresholdProfile,
    ) -> Vec<FeedbackEvent> {
        let mut events = Vec::new();

        for (kind, state) in self.rules.iter_mut() {
            let dwell = profile.dwell(*kind);
            match kind.violated(angles, phase, profile) {
                None => {}
                Some(true) => {
                    state.clean_frames = 0;
                    if !state.active {
                        state.violating_frames += 1;
                        if state.violating_frames >= dwell.activate_frames {
                            state.active = true;
                            state.violating_frames = 0;
                            debug!(feedback = ?kind, "feedback raised");
                            events.push(FeedbackEvent::Raised(*kind));
                        }
                    }
                }
                Some(false) => {
                    state.violating_frames = 0;
                    if state.active {
                        state.clean_frames += 1;
                        if state.clean_frames >= dwell.clear_frames {
                            state.active = false;
                            state.clean_frames = 0;
                            debug!(feedback = ?kind, "feedback cleared");
                            events.push(FeedbackEvent::Cleared(*kind));
                        }
                    }
                }
            }
        }

        events
    }

    /// Currently active warnings, in `FeedbackKind` order
    pub fn active(&self) -> Vec<FeedbackKind> {
        self.rules
            .iter()
            .filter(|(_, s)| s.active)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn is_active(&self, kind: FeedbackKind) -> bool {
        self.rules.get(&kind).map_or(false, |s| s.active)
    }

    pub fn any_active(&self) -> bool {
        self.rules.values().any(|s| s.active)
    }

    /// Dwell counters of one rule, `None` if the rule is disabled
    pub fn rule_state(&self, kind: FeedbackKind) -> Option<RuleState> {
        self.rules.get(&kind).copied()
    }
}
