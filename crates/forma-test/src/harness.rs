//! Session harness - end-to-end runs with invariant checking
//!
//! Feeds landmark streams through a [`SessionProcessor`] and verifies the
//! report stream against the counting guarantees:
//! - Counters never decrease and move by at most one rep per completion
//! - Phase changes follow the machine's edges
//! - Skipped frames change nothing
//! - Reported warnings match the raise / clear events

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use forma_core::{LandmarkFrame, SessionId};
use forma_motion::{
    FeedbackEvent, FeedbackKind, FrameOutcome, FrameReport, Mode, Phase, PhaseEvent,
    ProfileTable, RepCounters, SessionEnd, SessionEvent, SessionProcessor, SkipReason,
    ThresholdProfile,
};

// ============================================================================
// INVARIANT CHECKS
// ============================================================================

/// A broken guarantee, with the index of the offending report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub frame: usize,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}: {}", self.frame, self.message)
    }
}

/// Check a session's report stream, starting from a fresh session
pub fn verify_reports(reports: &[FrameReport]) -> Result<(), Violation> {
    let mut phase = Phase::Standing;
    let mut counters = RepCounters::default();
    let mut active: BTreeSet<FeedbackKind> = BTreeSet::new();

    for (i, report) in reports.iter().enumerate() {
        let fail = |message: String| Violation { frame: i, message };

        if report.counters.correct < counters.correct
            || report.counters.incorrect < counters.incorrect
        {
            return Err(fail(format!("counters went down: {:?} -> {:?}", counters, report.counters)));
        }

        let mut completed = 0u32;
        let mut at = phase;
        for event in &report.events {
            match event {
                SessionEvent::Phase(PhaseEvent::Transition { from, to }) => {
                    if *from != at || !Phase::is_allowed_edge(*from, *to) {
                        return Err(fail(format!("bad transition {} -> {} from {}", from, to, at)));
                    }
                    at = *to;
                }
                SessionEvent::Phase(PhaseEvent::RepCompleted { total, .. }) => {
                    completed += 1;
                    if *total != counters.total() + completed {
                        return Err(fail(format!("rep total {} out of sequence", total)));
                    }
                }
                SessionEvent::Phase(PhaseEvent::RepDiscarded { .. }) => {}
                SessionEvent::Feedback(FeedbackEvent::Raised(kind)) => {
                    if !active.insert(*kind) {
                        return Err(fail(format!("{:?} raised twice", kind)));
                    }
                }
                SessionEvent::Feedback(FeedbackEvent::Cleared(kind)) => {
                    if !active.remove(kind) {
                        return Err(fail(format!("{:?} cleared while inactive", kind)));
                    }
                }
            }
        }
        if !report.feedback.iter().eq(active.iter()) {
            return Err(fail(format!("reported warnings {:?}, expected {:?}", report.feedback, active)));
        }
        if at != report.phase {
            return Err(fail(format!("phase {} but transitions end in {}", report.phase, at)));
        }
        if report.count() != counters.total() + completed {
            return Err(fail(format!("count {} without matching completions", report.count())));
        }

        if report.outcome.is_skipped()
            && (report.phase != phase || report.counters != counters || !report.events.is_empty())
        {
            return Err(fail("skipped frame changed the session".to_string()));
        }

        phase = report.phase;
        counters = report.counters;
    }
    Ok(())
}

// ============================================================================
// HARNESS
// ============================================================================

/// Everything a run produced
#[derive(Clone, Debug)]
pub struct SessionRun {
    pub reports: Vec<FrameReport>,
    pub end: SessionEnd,
}

impl SessionRun {
    pub fn counters(&self) -> RepCounters {
        self.end.counters
    }

    /// Phase after each frame
    pub fn phases(&self) -> Vec<Phase> {
        self.reports.iter().map(|r| r.phase).collect()
    }

    /// Skipped frames per reason
    pub fn skipped(&self) -> HashMap<SkipReason, usize> {
        let mut out = HashMap::new();
        for report in &self.reports {
            if let FrameOutcome::Skipped { reason } = report.outcome {
                *out.entry(reason).or_insert(0) += 1;
            }
        }
        out
    }

    /// Every warning raised at least once
    pub fn raised(&self) -> Vec<FeedbackKind> {
        let mut kinds: Vec<FeedbackKind> = self
            .reports
            .iter()
            .flat_map(|r| r.events.iter())
            .filter_map(|e| match e {
                SessionEvent::Feedback(FeedbackEvent::Raised(kind)) => Some(*kind),
                _ => None,
            })
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn verify(&self) -> Result<(), Violation> {
        verify_reports(&self.reports)
    }
}

/// Runs landmark streams through a fresh processor
pub struct SessionHarness {
    profile: Arc<ThresholdProfile>,
    next_id: u64,
}

impl SessionHarness {
    pub fn new(profile: ThresholdProfile) -> Self {
        SessionHarness {
            profile: Arc::new(profile),
            next_id: 1,
        }
    }

    pub fn for_mode(mode: Mode) -> Self {
        SessionHarness {
            profile: ProfileTable::shared().get(mode),
            next_id: 1,
        }
    }

    pub fn profile(&self) -> &ThresholdProfile {
        &self.profile
    }

    /// Processor for a new session
    pub fn processor(&mut self) -> SessionProcessor {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        SessionProcessor::new(id, self.profile.clone())
    }

    /// Process every frame, then end the session
    pub fn run(&mut self, frames: &[LandmarkFrame]) -> SessionRun {
        let mut processor = self.processor();
        let reports = frames.iter().map(|f| processor.process(f)).collect();
        let end = processor.finish();
        SessionRun { reports, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BodyPose, Fault, RepShape, SimulatorConfig, SquatSimulator};
    use forma_core::Joint;
    use std::time::Duration;

    #[test]
    fn test_clean_beginner_set() {
        let mut sim = SquatSimulator::clean();
        let run = SessionHarness::for_mode(Mode::Beginner).run(&sim.set(&RepShape::beginner(), 5));

        run.verify().unwrap();
        assert_eq!(run.counters(), RepCounters { correct: 5, incorrect: 0 });
        assert!(run.raised().is_empty());
        assert!(run.skipped().is_empty());
        assert!(!run.end.discarded_rep);
    }

    #[test]
    fn test_clean_pro_set() {
        let mut sim = SquatSimulator::clean();
        let run = SessionHarness::for_mode(Mode::Pro).run(&sim.set(&RepShape::pro(), 3));

        run.verify().unwrap();
        assert_eq!(run.counters(), RepCounters { correct: 3, incorrect: 0 });
    }

    #[test]
    fn test_pro_rejects_beginner_depth() {
        let mut sim = SquatSimulator::clean();
        let run = SessionHarness::for_mode(Mode::Pro).run(&sim.set(&RepShape::beginner(), 3));

        run.verify().unwrap();
        assert_eq!(run.counters().total(), 0);
        assert!(!run.phases().contains(&Phase::Bottom));
    }

    #[test]
    fn test_each_fault_marks_rep_incorrect() {
        let cases = [
            (Fault::UprightTorso, FeedbackKind::BendForward),
            (Fault::ExcessiveLean, FeedbackKind::BendBackwards),
            (Fault::KneeOverToe, FeedbackKind::KneeOverToe),
            (Fault::TooDeep, FeedbackKind::SquatTooDeep),
        ];

        for (fault, expected) in cases {
            let mut sim = SquatSimulator::clean();
            let shape = RepShape::beginner().with_fault(fault);
            let run = SessionHarness::for_mode(Mode::Beginner).run(&sim.set(&shape, 2));

            run.verify().unwrap();
            assert_eq!(
                run.counters(),
                RepCounters { correct: 0, incorrect: 2 },
                "{:?}",
                fault
            );
            assert!(run.raised().contains(&expected), "{:?} raised {:?}", fault, run.raised());
        }
    }

    #[test]
    fn test_mixed_set() {
        let mut sim = SquatSimulator::clean();
        let mut frames = sim.set(&RepShape::beginner(), 2);
        frames.extend(sim.rep(&RepShape::beginner().with_fault(Fault::KneeOverToe)));
        frames.extend(sim.rep(&RepShape::beginner()));

        let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);
        run.verify().unwrap();
        assert_eq!(run.counters(), RepCounters { correct: 3, incorrect: 1 });
    }

    #[test]
    fn test_facing_camera_never_counts() {
        let mut sim = SquatSimulator::new(SimulatorConfig {
            facing_camera: true,
            ..SimulatorConfig::clean()
        });
        let frames = sim.set(&RepShape::beginner(), 2);
        let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);

        run.verify().unwrap();
        assert_eq!(run.counters().total(), 0);
        assert_eq!(run.skipped().get(&SkipReason::CameraMisaligned), Some(&frames.len()));
    }

    #[test]
    fn test_noisy_stream_keeps_invariants() {
        for seed in 0..8 {
            let mut sim = SquatSimulator::with_seed(SimulatorConfig::hostile(), seed);
            let frames = sim.set(&RepShape::beginner(), 4);
            let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);

            run.verify().unwrap_or_else(|v| panic!("seed {}: {}", seed, v));
            assert!(run.counters().total() <= 4, "seed {}: {:?}", seed, run.counters());
        }
    }

    #[test]
    fn test_mild_noise_counts_every_rep() {
        let config = SimulatorConfig {
            jitter: 0.002,
            ..SimulatorConfig::clean()
        };
        let mut sim = SquatSimulator::with_seed(config, 3);
        let run = SessionHarness::for_mode(Mode::Beginner).run(&sim.set(&RepShape::beginner(), 4));

        run.verify().unwrap();
        assert_eq!(run.counters().total(), 4);
    }

    #[test]
    fn test_short_occlusion_is_bridged() {
        let mut sim = SquatSimulator::clean();
        let shape = RepShape::beginner();
        let mut frames = sim.set(&shape, 1);

        // Near knee drops below the confidence threshold for one frame
        let mid = shape.rest_frames as usize + 4;
        for landmark in frames[mid].landmarks.iter_mut() {
            if landmark.joint == Joint::LeftKnee {
                landmark.visibility = 0.3;
            }
        }

        let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);
        run.verify().unwrap();
        assert!(run.skipped().is_empty());
        assert!(run.reports[mid].angles.knee.is_some());
        assert_eq!(run.reports[mid].angles.knee, run.reports[mid - 1].angles.knee);
        assert_eq!(run.counters().correct, 1);
    }

    #[test]
    fn test_whole_body_dropout_is_skipped() {
        let mut sim = SquatSimulator::clean();
        let shape = RepShape::beginner();
        let mut frames = sim.set(&shape, 1);
        let mid = shape.rest_frames as usize + 4;
        frames[mid] = LandmarkFrame::empty(frames[mid].timestamp);

        let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);
        run.verify().unwrap();
        assert_eq!(run.skipped().get(&SkipReason::MissingJoints), Some(&1));
        assert_eq!(run.counters().correct, 1);
    }

    #[test]
    fn test_stall_at_bottom_discards_rep() {
        let mut sim = SquatSimulator::clean();
        let shape = RepShape::beginner();
        let mut frames = sim.hold(&shape.standing, 3);
        for pose in shape.poses().iter().take(shape.descent_frames as usize) {
            frames.push(sim.frame(pose));
        }
        assert_eq!(SessionHarness::for_mode(Mode::Beginner).run(&frames).phases().last(), Some(&Phase::Bottom));

        // Subject walks off and comes back standing
        sim.advance(Duration::from_secs(20));
        frames.extend(sim.hold(&shape.standing, 3));

        let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);
        run.verify().unwrap();
        assert_eq!(run.counters().total(), 0);
        assert!(run.reports.iter().any(|r| r.events.iter().any(|e| matches!(
            e,
            SessionEvent::Phase(PhaseEvent::RepDiscarded { .. })
        ))));
    }

    #[test]
    fn test_stream_ending_mid_rep() {
        let mut sim = SquatSimulator::clean();
        let shape = RepShape::beginner();
        let mut frames = sim.set(&shape, 1);
        frames.extend(sim.hold(&BodyPose::new(80.0, 35.0, 25.0), 4));

        let run = SessionHarness::for_mode(Mode::Beginner).run(&frames);
        assert_eq!(run.counters().total(), 1);
        assert!(run.end.discarded_rep);
    }

    #[test]
    fn test_verifier_catches_decrease() {
        let mut sim = SquatSimulator::clean();
        let run = SessionHarness::for_mode(Mode::Beginner).run(&sim.set(&RepShape::beginner(), 1));
        let mut reports = run.reports.clone();
        let last = reports.len() - 1;
        reports[last].counters = RepCounters::default();

        let err = verify_reports(&reports).unwrap_err();
        assert_eq!(err.frame, last);
    }
}
