//! Property tests for the counting and feedback guarantees

use std::sync::Arc;

use forma_core::{FrameTime, SessionId};
use forma_motion::{
    AngleSet, FeedbackEvent, FeedbackGenerator, FeedbackKind, Phase, PhaseEvent, PhaseMachine,
    SessionEvent, SessionProcessor, ThresholdProfile,
};
use proptest::prelude::*;

use crate::{verify_reports, BodyPose, RepShape, SimulatorConfig, SquatSimulator};

fn pose() -> impl Strategy<Value = BodyPose> {
    (30.0f32..180.0, 0.0f32..60.0, 0.0f32..50.0).prop_map(|(knee, back, shin)| BodyPose::new(knee, back, shin))
}

fn processor() -> SessionProcessor {
    SessionProcessor::new(SessionId::new(1), Arc::new(ThresholdProfile::beginner()))
}

proptest! {
    #[test]
    fn prop_machine_counters_never_decrease(knees in prop::collection::vec(0.0f32..180.0, 1..300)) {
        let profile = ThresholdProfile::beginner();
        let mut machine = PhaseMachine::new();
        let mut previous = machine.counters();
        let mut started = 0u32;

        for (i, knee) in knees.iter().enumerate() {
            let events = machine.step(&AngleSet::knee_only(*knee), &profile, FrameTime::from_millis(i as i64 * 33));
            let counters = machine.counters();

            let completed = events
                .iter()
                .filter(|e| matches!(e, PhaseEvent::RepCompleted { .. }))
                .count() as u32;
            prop_assert!(counters.correct >= previous.correct);
            prop_assert!(counters.incorrect >= previous.incorrect);
            prop_assert_eq!(counters.total(), previous.total() + completed);
            prop_assert!(completed <= 1);

            for event in &events {
                if let PhaseEvent::Transition { from, to } = event {
                    prop_assert!(Phase::is_allowed_edge(*from, *to));
                    if *from == Phase::Standing {
                        started += 1;
                    }
                }
            }
            prop_assert!(counters.total() <= started);
            previous = counters;
        }
    }

    #[test]
    fn prop_repeated_frame_is_stable(prefix in prop::collection::vec(pose(), 0..40), last in pose()) {
        let mut sim = SquatSimulator::clean();
        let mut p = processor();
        for pose in &prefix {
            p.process(&sim.frame(pose));
        }

        let frame = sim.frame(&last);
        p.process(&frame);
        let counters = p.counters();
        let phase = p.phase();

        let again = p.process(&frame);
        prop_assert_eq!(again.phase, phase);
        prop_assert_eq!(again.counters, counters);
        prop_assert!(!again.events.iter().any(|e| matches!(e, SessionEvent::Phase(_))));
    }

    #[test]
    fn prop_unusable_frame_changes_nothing(prefix in prop::collection::vec(pose(), 0..40), dropout in any::<bool>()) {
        let mut sim = SquatSimulator::clean();
        let mut p = processor();
        for pose in &prefix {
            p.process(&sim.frame(pose));
        }
        let before = p.state().clone();

        let mut frame = sim.frame(&RepShape::beginner().standing);
        if dropout {
            frame.landmarks.clear();
        } else {
            for landmark in &mut frame.landmarks {
                landmark.visibility = 0.1;
            }
        }

        let report = p.process(&frame);
        prop_assert!(report.outcome.is_skipped());
        prop_assert!(report.events.is_empty());
        prop_assert_eq!(p.state(), &before);
    }

    #[test]
    fn prop_warning_needs_consecutive_violations(pattern in prop::collection::vec(any::<bool>(), 1..200)) {
        let profile = ThresholdProfile::beginner();
        let dwell = profile.dwell(FeedbackKind::BendForward);
        let mut generator = FeedbackGenerator::new(&profile);

        let mut run = 0u32;
        let mut clean = 0u32;
        let mut active = false;
        for violating in pattern {
            let back = if violating { 2.0 } else { 30.0 };
            let angles = AngleSet::empty().with(forma_motion::AngleKind::BackInclination, back);
            let events = generator.update(&angles, Phase::Descending, &profile);

            if violating {
                run += 1;
                clean = 0;
            } else {
                clean += 1;
                run = 0;
            }
            let raised = events.contains(&FeedbackEvent::Raised(FeedbackKind::BendForward));
            let cleared = events.contains(&FeedbackEvent::Cleared(FeedbackKind::BendForward));

            if raised {
                prop_assert!(!active);
                prop_assert!(run >= dwell.activate_frames);
                active = true;
            }
            if cleared {
                prop_assert!(active);
                prop_assert!(clean >= dwell.clear_frames);
                active = false;
            }
            if !active {
                prop_assert!(!violating || run < dwell.activate_frames || raised);
            }
            prop_assert_eq!(generator.is_active(FeedbackKind::BendForward), active);
        }
    }

    #[test]
    fn prop_noisy_streams_keep_invariants(seed in any::<u64>(), reps in 1usize..4) {
        let mut sim = SquatSimulator::with_seed(SimulatorConfig::hostile(), seed);
        let frames = sim.set(&RepShape::beginner(), reps);
        let mut p = processor();
        let reports: Vec<_> = frames.iter().map(|f| p.process(f)).collect();

        prop_assert!(verify_reports(&reports).is_ok());
        prop_assert!(p.rep_count() <= reps as u32);
    }
}
