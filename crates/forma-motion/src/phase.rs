//! Phase State Machine - squat cycle tracking and rep counting
//!
//! ```text
//!            knee < transition_enter            knee < bottom_enter
//! STANDING ───────────────────────────▶ DESCENDING ──────────────────▶ BOTTOM
//!    ▲      knee >= transition_exit         │  ▲    knee > bottom_exit    │
//!    └──────────────────────────────────────┘  └──────────────────────────┤
//!    ▲            knee > bottom_exit and knee >= transition_exit          │
//!    └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rep is counted exactly once, when BOTTOM is left upward. Whether it
//! counts as correct depends on whether any warning was active while the
//! machine sat in BOTTOM. Once BOTTOM has been left, the machine stays in
//! DESCENDING until STANDING is reached, so bouncing at the bottom of one
//! squat cannot count it twice.
//!
//! Transitions cascade within a frame until the phase is stable for the
//! current knee angle, so feeding the same angles twice never moves the
//! machine on the second call.

use std::fmt;
use std::time::Duration;

use forma_core::FrameTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{AngleSet, ThresholdProfile};

/// Stage of the squat cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Standing,
    Descending,
    Bottom,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Standing => "STANDING",
            Phase::Descending => "DESCENDING",
            Phase::Bottom => "BOTTOM",
        }
    }

    /// True if `from → to` is an edge of the machine
    pub fn is_allowed_edge(from: Phase, to: Phase) -> bool {
        matches!(
            (from, to),
            (Phase::Standing, Phase::Descending)
                | (Phase::Descending, Phase::Bottom)
                | (Phase::Descending, Phase::Standing)
                | (Phase::Bottom, Phase::Descending)
                | (Phase::Bottom, Phase::Standing)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Quality of a completed rep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepQuality {
    Correct,
    Incorrect,
}

/// Why an in-progress rep was thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Turned back up before reaching BOTTOM
    Aborted,
    /// No phase change or no valid frame for too long
    Inactive,
    /// Stream ended mid-rep
    SessionEnded,
}

/// Repetition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepCounters {
    pub correct: u32,
    pub incorrect: u32,
}

impl RepCounters {
    /// All counted reps
    pub fn total(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }

    fn record(&mut self, quality: RepQuality) {
        match quality {
            RepQuality::Correct => self.correct = self.correct.saturating_add(1),
            RepQuality::Incorrect => self.incorrect = self.incorrect.saturating_add(1),
        }
    }
}

/// Something the machine did during a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseEvent {
    Transition { from: Phase, to: Phase },
    RepCompleted { quality: RepQuality, total: u32 },
    RepDiscarded { reason: DiscardReason },
}

/// Squat phase machine and rep counters for one session
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMachine {
    phase: Phase,
    counters: RepCounters,
    /// A warning was active at some frame of the current BOTTOM dwell
    violation_in_bottom: bool,
    /// BOTTOM was reached during the current rep
    reached_bottom: bool,
    /// Time of the last transition
    phase_since: Option<FrameTime>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Standing,
            counters: RepCounters::default(),
            violation_in_bottom: false,
            reached_bottom: false,
            phase_since: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn counters(&self) -> RepCounters {
        self.counters
    }

    /// A rep has started and not yet completed or been discarded
    pub fn in_progress(&self) -> bool {
        self.phase != Phase::Standing
    }

    /// How long the machine has been in its current phase
    pub fn time_in_phase(&self, now: FrameTime) -> Duration {
        self.phase_since.map_or(Duration::ZERO, |since| now.since(since))
    }

    fn transition(&mut self, to: Phase, now: FrameTime, events: &mut Vec<PhaseEvent>) {
        let from = self.phase;
        debug_assert!(Phase::is_allowed_edge(from, to));
        debug!(%from, %to, "phase transition");
        self.phase = to;
        self.phase_since = Some(now);
        events.push(PhaseEvent::Transition { from, to });
    }

    /// Advance the machine with one frame's angles.
    ///
    /// Holds the current phase when the knee angle is unavailable.
    pub fn step(&mut self, angles: &AngleSet, profile: &ThresholdProfile, now: FrameTime) -> Vec<PhaseEvent> {
        let mut events = Vec::new();
        let Some(knee) = angles.knee else {
            return events;
        };
        let bounds = &profile.knee;

        if self.phase == Phase::Standing {
            let hip_flexed = angles.hip.map_or(true, |hip| hip < profile.hip.hinge_enter);
            if knee < bounds.transition_enter && hip_flexed {
                self.reached_bottom = false;
                self.transition(Phase::Descending, now, &mut events);
            }
        }

        match self.phase {
            Phase::Standing => {}
            Phase::Descending => {
                if knee < bounds.bottom_enter && !self.reached_bottom {
                    self.violation_in_bottom = false;
                    self.reached_bottom = true;
                    self.transition(Phase::Bottom, now, &mut events);
                } else if knee >= bounds.transition_exit {
                    if !self.reached_bottom {
                        debug!(knee, "rep aborted before bottom");
                        events.push(PhaseEvent::RepDiscarded {
                            reason: DiscardReason::Aborted,
                        });
                    }
                    self.reached_bottom = false;
                    self.transition(Phase::Standing, now, &mut events);
                }
            }
            Phase::Bottom => {
                if knee > bounds.bottom_exit {
                    let quality = if self.violation_in_bottom {
                        RepQuality::Incorrect
                    } else {
                        RepQuality::Correct
                    };
                    self.counters.record(quality);
                    self.violation_in_bottom = false;
                    info!(?quality, total = self.counters.total(), "rep completed");
                    events.push(PhaseEvent::RepCompleted {
                        quality,
                        total: self.counters.total(),
                    });

                    if knee >= bounds.transition_exit {
                        self.reached_bottom = false;
                        self.transition(Phase::Standing, now, &mut events);
                    } else {
                        self.transition(Phase::Descending, now, &mut events);
                    }
                }
            }
        }

        events
    }

    /// Record whether any warning is active this frame.
    ///
    /// Only matters while in BOTTOM, where it marks the current rep incorrect.
    pub fn observe_feedback(&mut self, any_active: bool) {
        if self.phase == Phase::Bottom && any_active {
            self.violation_in_bottom = true;
        }
    }

    /// Drop the in-progress rep and return to STANDING.
    ///
    /// Counters are left untouched. No-op when already standing.
    pub fn discard(&mut self, reason: DiscardReason, now: FrameTime) -> Vec<PhaseEvent> {
        let mut events = Vec::new();
        if !self.in_progress() {
            return events;
        }
        debug!(?reason, phase = %self.phase, "discarding in-progress rep");
        events.push(PhaseEvent::RepDiscarded { reason });
        self.violation_in_bottom = false;
        self.reached_bottom = false;
        self.transition(Phase::Standing, now, &mut events);
        events
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
