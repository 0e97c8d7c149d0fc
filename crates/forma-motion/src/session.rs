//! Session Processor - per-frame pipeline for one exercise session
//!
//! Owns every piece of mutable analysis state for a session. Callers feed
//! one landmark frame at a time and get back a [`FrameReport`] describing
//! counters, active warnings and what to draw.
//!
//! Frames that cannot be analysed (missing joints, low confidence, subject
//! facing the camera) are skipped without touching [`SessionState`].

use std::sync::Arc;

use forma_core::{FormaResult, FrameTime, LandmarkFrame, SessionId, Side};
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::{
    AngleCache, AngleCalculator, AngleSet, Annotation, DiscardReason, FeedbackEvent,
    FeedbackGenerator, FeedbackKind, Phase, PhaseEvent, PhaseMachine, ProfileTable, RepCounters,
    ThresholdProfile,
};

/// Why a frame was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Required joints are absent from the landmark set
    MissingJoints,
    /// Whole-frame confidence below the profile floor
    LowConfidence,
    /// Subject is not side-on to the camera
    CameraMisaligned,
}

impl SkipReason {
    pub fn message(self) -> &'static str {
        match self {
            SkipReason::MissingJoints => "SUBJECT NOT FULLY VISIBLE",
            SkipReason::LowConfidence => "LOW DETECTION CONFIDENCE",
            SkipReason::CameraMisaligned => "CAMERA NOT ALIGNED PROPERLY",
        }
    }
}

/// Result of feeding one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameOutcome {
    Processed { side: Side },
    Skipped { reason: SkipReason },
}

impl FrameOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, FrameOutcome::Skipped { .. })
    }
}

/// State change reported for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Phase(PhaseEvent),
    Feedback(FeedbackEvent),
}

/// Everything a session mutates while processing frames
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub machine: PhaseMachine,
    pub feedback: FeedbackGenerator,
    pub cache: AngleCache,
    pub last_valid_frame: Option<FrameTime>,
}

impl SessionState {
    pub fn new(profile: &ThresholdProfile) -> Self {
        Self {
            machine: PhaseMachine::new(),
            feedback: FeedbackGenerator::new(profile),
            cache: AngleCache::new(),
            last_valid_frame: None,
        }
    }
}

/// Frame counters, kept apart from analysis state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub processed: u64,
    pub skipped: u64,
    pub first_frame: Option<FrameTime>,
    pub last_frame: Option<FrameTime>,
}

/// Per-frame output handed to the transport / render layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub session: SessionId,
    pub timestamp: FrameTime,
    pub outcome: FrameOutcome,
    pub phase: Phase,
    pub counters: RepCounters,
    pub feedback: Vec<FeedbackKind>,
    pub angles: AngleSet,
    pub events: Vec<SessionEvent>,
    pub annotations: Vec<Annotation>,
}

impl FrameReport {
    /// Total reps, the figure most clients display
    pub fn count(&self) -> u32 {
        self.counters.total()
    }
}

/// Final tally when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnd {
    pub counters: RepCounters,
    /// An in-progress rep was thrown away
    pub discarded_rep: bool,
    pub stats: FrameStats,
}

/// Squat analysis for one session
#[derive(Debug, Clone)]
pub struct SessionProcessor {
    id: SessionId,
    profile: Arc<ThresholdProfile>,
    calculator: AngleCalculator,
    state: SessionState,
    stats: FrameStats,
}

impl SessionProcessor {
    /// Create a processor using an already resolved profile
    pub fn new(id: SessionId, profile: Arc<ThresholdProfile>) -> Self {
        Self {
            id,
            calculator: AngleCalculator::new(profile.min_confidence),
            state: SessionState::new(&profile),
            stats: FrameStats::default(),
            profile,
        }
    }

    /// Create a processor from a mode name; fails for unknown modes
    pub fn for_mode(id: SessionId, table: &ProfileTable, mode: &str) -> FormaResult<Self> {
        let profile = table.resolve(mode)?;
        Ok(Self::new(id, profile))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn profile(&self) -> &ThresholdProfile {
        &self.profile
    }

    pub fn phase(&self) -> Phase {
        self.state.machine.phase()
    }

    pub fn counters(&self) -> RepCounters {
        self.state.machine.counters()
    }

    /// Total repetitions, correct and incorrect
    pub fn rep_count(&self) -> u32 {
        self.counters().total()
    }

    pub fn incorrect_count(&self) -> u32 {
        self.counters().incorrect
    }

    pub fn active_feedback(&self) -> Vec<FeedbackKind> {
        self.state.feedback.active()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run the full pipeline for one frame
    pub fn process(&mut self, frame: &LandmarkFrame) -> FrameReport {
        let now = frame.timestamp;
        self.stats.first_frame.get_or_insert(now);
        self.stats.last_frame = Some(now);

        let side = match self.admit(frame) {
            Ok(side) => side,
            Err(reason) => {
                self.stats.skipped += 1;
                trace!(session = %self.id, ?reason, "frame skipped");
                return self.skipped_report(now, reason);
            }
        };
        self.stats.processed += 1;

        let raw = self.calculator.compute(frame, side);
        let angles = self.state.cache.bridge(&raw, self.profile.angle_hold_frames);

        let mut events = Vec::new();
        if self.stalled(now) {
            events.extend(
                self.state
                    .machine
                    .discard(DiscardReason::Inactive, now)
                    .into_iter()
                    .map(SessionEvent::Phase),
            );
        }

        let phase_events = self.state.machine.step(&angles, &self.profile, now);
        events.extend(phase_events.into_iter().map(SessionEvent::Phase));

        let phase = self.state.machine.phase();
        let feedback_events = self.state.feedback.update(&angles, phase, &self.profile);
        events.extend(feedback_events.into_iter().map(SessionEvent::Feedback));

        self.state
            .machine
            .observe_feedback(self.state.feedback.any_active());
        self.state.last_valid_frame = Some(now);

        let annotations = self.annotate(frame, side, &angles);
        FrameReport {
            session: self.id,
            timestamp: now,
            outcome: FrameOutcome::Processed { side },
            phase,
            counters: self.counters(),
            feedback: self.active_feedback(),
            angles,
            events,
            annotations,
        }
    }

    /// End the session, discarding any rep still in progress
    pub fn finish(&mut self) -> SessionEnd {
        let now = self.stats.last_frame.unwrap_or_default();
        let discarded = !self
            .state
            .machine
            .discard(DiscardReason::SessionEnded, now)
            .is_empty();
        let counters = self.counters();
        info!(
            session = %self.id,
            correct = counters.correct,
            incorrect = counters.incorrect,
            discarded,
            "session finished"
        );
        SessionEnd {
            counters,
            discarded_rep: discarded,
            stats: self.stats,
        }
    }

    /// Decide whether a frame can be analysed and on which side
    fn admit(&self, frame: &LandmarkFrame) -> Result<Side, SkipReason> {
        let side = self
            .calculator
            .select_side(frame)
            .ok_or(SkipReason::MissingJoints)?;

        let confidence = frame
            .presence
            .filter(|p| p.is_finite())
            .unwrap_or_else(|| frame.mean_visibility(&side.chain()));
        if confidence < self.profile.frame_confidence_floor {
            return Err(SkipReason::LowConfidence);
        }

        if let Some(offset) = self.calculator.camera_offset(frame) {
            if offset > self.profile.camera_offset_max {
                return Err(SkipReason::CameraMisaligned);
            }
        }

        Ok(side)
    }

    /// A rep in progress with no phase change, or no valid frame, for too long
    fn stalled(&self, now: FrameTime) -> bool {
        if !self.state.machine.in_progress() {
            return false;
        }
        let timeout = self.profile.inactivity_timeout;
        let gap = self
            .state
            .last_valid_frame
            .map_or(std::time::Duration::ZERO, |t| now.since(t));
        gap > timeout || self.state.machine.time_in_phase(now) > timeout
    }

    fn skipped_report(&self, now: FrameTime, reason: SkipReason) -> FrameReport {
        let mut annotations = vec![Annotation::notice(reason)];
        annotations.extend(self.status_annotations());
        FrameReport {
            session: self.id,
            timestamp: now,
            outcome: FrameOutcome::Skipped { reason },
            phase: self.phase(),
            counters: self.counters(),
            feedback: self.active_feedback(),
            angles: AngleSet::empty(),
            events: Vec::new(),
            annotations,
        }
    }

    fn status_annotations(&self) -> Vec<Annotation> {
        let mut out = vec![Annotation::phase(self.phase())];
        out.extend(self.active_feedback().into_iter().map(Annotation::feedback));
        out.push(Annotation::counters(self.counters()));
        out
    }

    fn annotate(&self, frame: &LandmarkFrame, side: Side, angles: &AngleSet) -> Vec<Annotation> {
        let mut out = Vec::new();

        let mut chain = side.chain().to_vec();
        if frame.get(side.foot()).is_some() {
            chain.push(side.foot());
        }
        out.extend(
            chain
                .windows(2)
                .map(|pair| Annotation::Segment {
                    from: pair[0],
                    to: pair[1],
                }),
        );

        for (kind, degrees) in angles.available() {
            if let Some(at) = self.calculator.anchor(frame, kind, side) {
                out.push(Annotation::AngleLabel {
                    angle: kind,
                    degrees,
                    at,
                });
            }
        }

        out.extend(self.status_annotations());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AngleKind;
    use forma_core::{Joint, Landmark, Position};

    /// Side-on skeleton with a vertical shin and upright torso.
    ///
    /// The knee interior angle equals `knee`.
    fn frame(t_ms: i64, knee: f32, vis: f32) -> LandmarkFrame {
        let ankle = (0.5f32, 0.9f32);
        let kn = (ankle.0, ankle.1 - 0.2);
        let rad = knee.to_radians();
        let hip = (kn.0 + 0.2 * rad.sin(), kn.1 + 0.2 * rad.cos());
        let shoulder = (hip.0, hip.1 - 0.3);

        let at = |joint, (x, y): (f32, f32)| Landmark::new(joint, Position::new(x, y), vis);
        LandmarkFrame::new(
            FrameTime::from_millis(t_ms),
            vec![
                at(Joint::LeftShoulder, shoulder),
                at(Joint::LeftHip, hip),
                at(Joint::LeftKnee, kn),
                at(Joint::LeftAnkle, ankle),
            ],
        )
    }

    fn processor() -> SessionProcessor {
        let profile = ThresholdProfile::beginner()
            .without_rule(FeedbackKind::LowerHips)
            .without_rule(FeedbackKind::BendForward);
        SessionProcessor::new(SessionId::new(1), Arc::new(profile))
    }

    #[test]
    fn test_scenario_trace() {
        use Phase::*;
        let mut p = processor();
        let knees = [170.0, 150.0, 135.0, 100.0, 85.0, 70.0, 95.0, 130.0, 160.0];
        let trace: Vec<Phase> = knees
            .iter()
            .enumerate()
            .map(|(i, k)| p.process(&frame(i as i64 * 100, *k, 0.9)).phase)
            .collect();

        assert_eq!(
            trace,
            vec![Standing, Standing, Descending, Descending, Bottom, Bottom, Bottom, Descending, Standing]
        );
        assert_eq!(p.rep_count(), 1);
        assert_eq!(p.incorrect_count(), 0);
    }

    #[test]
    fn test_low_confidence_frame_leaves_state_identical() {
        let mut p = processor();
        for (i, k) in [170.0, 130.0, 85.0].iter().enumerate() {
            p.process(&frame(i as i64 * 100, *k, 0.9));
        }
        let before = p.state().clone();

        let report = p.process(&frame(300, 150.0, 0.1));
        assert_eq!(
            report.outcome,
            FrameOutcome::Skipped {
                reason: SkipReason::LowConfidence
            }
        );
        assert_eq!(p.state(), &before);
        assert_eq!(report.phase, Phase::Bottom);
        assert_eq!(p.stats().skipped, 1);
    }

    #[test]
    fn test_missing_joints_is_skipped() {
        let mut p = processor();
        let mut f = frame(0, 120.0, 0.9);
        f.remove(Joint::LeftKnee);

        let report = p.process(&f);
        assert_eq!(
            report.outcome,
            FrameOutcome::Skipped {
                reason: SkipReason::MissingJoints
            }
        );
        assert!(matches!(report.annotations[0], Annotation::Notice { .. }));
        assert_eq!(p.phase(), Phase::Standing);
    }

    #[test]
    fn test_presence_score_overrides_visibility() {
        let mut p = processor();
        let report = p.process(&frame(0, 120.0, 0.9).with_presence(0.1));
        assert!(report.outcome.is_skipped());
    }

    #[test]
    fn test_repeated_frame_is_idempotent() {
        let mut p = processor();
        p.process(&frame(0, 170.0, 0.9));
        let f = frame(100, 80.0, 0.9);
        p.process(&f);
        let counters = p.counters();
        let phase = p.phase();

        let again = p.process(&f);
        assert_eq!(again.phase, phase);
        assert_eq!(again.counters, counters);
        assert!(!again
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::Phase(PhaseEvent::Transition { .. }))));
    }

    #[test]
    fn test_finish_discards_in_progress_rep() {
        let mut p = processor();
        for (i, k) in [170.0, 80.0].iter().enumerate() {
            p.process(&frame(i as i64 * 100, *k, 0.9));
        }
        let end = p.finish();
        assert!(end.discarded_rep);
        assert_eq!(end.counters.total(), 0);
        assert_eq!(p.phase(), Phase::Standing);
    }

    #[test]
    fn test_stalled_rep_is_discarded() {
        let mut p = processor();
        p.process(&frame(0, 170.0, 0.9));
        p.process(&frame(100, 80.0, 0.9));
        assert_eq!(p.phase(), Phase::Bottom);

        let report = p.process(&frame(20_000, 170.0, 0.9));
        assert_eq!(report.phase, Phase::Standing);
        assert_eq!(report.counters.total(), 0);
        assert!(report.events.contains(&SessionEvent::Phase(PhaseEvent::RepDiscarded {
            reason: DiscardReason::Inactive
        })));
    }

    #[test]
    fn test_processed_annotations() {
        let mut p = processor();
        let report = p.process(&frame(0, 120.0, 0.9));

        let segments = report
            .annotations
            .iter()
            .filter(|a| matches!(a, Annotation::Segment { .. }))
            .count();
        assert_eq!(segments, 3);
        let labels = report
            .annotations
            .iter()
            .filter(|a| matches!(a, Annotation::AngleLabel { .. }))
            .count();
        assert_eq!(labels, AngleKind::all().len());
        assert!(report
            .annotations
            .contains(&Annotation::Counters { correct: 0, incorrect: 0 }));
    }

    #[test]
    fn test_unknown_mode_fails_at_creation() {
        let err = SessionProcessor::for_mode(SessionId::new(2), ProfileTable::shared(), "expert")
            .unwrap_err();
        assert_eq!(err, forma_core::FormaError::UnknownMode("expert".into()));
    }
}
