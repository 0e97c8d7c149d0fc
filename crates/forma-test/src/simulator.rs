//! Squat simulator - synthetic side-view landmark streams
//!
//! Builds skeletons from three body angles and plays them back as rep
//! trajectories, optionally corrupted the way a real pose detector fails:
//! - Coordinate jitter
//! - Whole-frame dropouts (no subject)
//! - Low-confidence frames
//! - Single-joint occlusion
//!
//! Geometry is image-space, y pointing down, subject facing +x. For a pose
//! built here the hip interior angle is `knee + shin - back`.

use std::time::Duration;

use forma_core::{FrameTime, Joint, Landmark, LandmarkFrame, Position};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SHIN_LEN: f32 = 0.22;
const THIGH_LEN: f32 = 0.22;
const TORSO_LEN: f32 = 0.28;
const NECK_LEN: f32 = 0.08;
const ANKLE_AT: (f32, f32) = (0.45, 0.9);
/// Horizontal gap between the near and far side of the body
const FAR_SIDE_OFFSET: f32 = 0.012;

/// Body angles driving one skeleton, in degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyPose {
    /// Knee interior angle
    pub knee: f32,
    /// Torso inclination from vertical, forward positive
    pub back: f32,
    /// Shin inclination from vertical, forward positive
    pub shin: f32,
}

impl BodyPose {
    pub fn new(knee: f32, back: f32, shin: f32) -> Self {
        BodyPose { knee, back, shin }
    }

    /// Hip interior angle this pose produces
    pub fn hip(&self) -> f32 {
        let hip = self.knee + self.shin - self.back;
        if hip > 180.0 {
            360.0 - hip
        } else {
            hip.abs()
        }
    }

    fn lerp(&self, to: &BodyPose, t: f32) -> BodyPose {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        BodyPose {
            knee: mix(self.knee, to.knee),
            back: mix(self.back, to.back),
            shin: mix(self.shin, to.shin),
        }
    }
}

/// Typical form mistakes, applied to the bottom of a rep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Torso stays vertical
    UprightTorso,
    /// Chest dropped far forward
    ExcessiveLean,
    /// Knee travels past the toes
    KneeOverToe,
    /// Knee folded past the safe range
    TooDeep,
}

/// Shape of one rep: end poses and frame counts per stage
#[derive(Clone, Debug, PartialEq)]
pub struct RepShape {
    pub standing: BodyPose,
    pub bottom: BodyPose,
    pub descent_frames: u32,
    pub bottom_frames: u32,
    pub ascent_frames: u32,
    /// Standing frames after the rep
    pub rest_frames: u32,
}

impl Default for RepShape {
    fn default() -> Self {
        Self::beginner()
    }
}

impl RepShape {
    /// Clean rep deep enough for the beginner profile
    pub fn beginner() -> Self {
        RepShape {
            standing: BodyPose::new(175.0, 8.0, 2.0),
            bottom: BodyPose::new(85.0, 35.0, 25.0),
            descent_frames: 12,
            bottom_frames: 6,
            ascent_frames: 12,
            rest_frames: 6,
        }
    }

    /// Clean rep deep enough for the pro profile
    pub fn pro() -> Self {
        RepShape {
            bottom: BodyPose::new(70.0, 35.0, 25.0),
            ..Self::beginner()
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        match fault {
            Fault::UprightTorso => {
                self.standing.back = 2.0;
                self.bottom.back = 4.0;
            }
            Fault::ExcessiveLean => self.bottom.back = 60.0,
            Fault::KneeOverToe => self.bottom.shin = 55.0,
            Fault::TooDeep => self.bottom.knee = 40.0,
        }
        self
    }

    /// Frames in one full rep including the rest
    pub fn len(&self) -> usize {
        (self.descent_frames + self.bottom_frames + self.ascent_frames + self.rest_frames) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pose sequence of one rep
    pub fn poses(&self) -> Vec<BodyPose> {
        let mut out = Vec::with_capacity(self.len());

        for i in 1..=self.descent_frames {
            out.push(self.at(i as f32 / self.descent_frames as f32));
        }
        out.extend(std::iter::repeat(self.bottom).take(self.bottom_frames as usize));
        for i in 1..=self.ascent_frames {
            out.push(self.at(1.0 - i as f32 / self.ascent_frames as f32));
        }
        out.extend(std::iter::repeat(self.standing).take(self.rest_frames as usize));
        out
    }

    /// Pose at depth `t` (0 standing, 1 bottom).
    ///
    /// The torso hinges in the first half of the movement.
    fn at(&self, t: f32) -> BodyPose {
        let mut pose = self.standing.lerp(&self.bottom, t);
        let hinge = (2.0 * t).min(1.0);
        pose.back = self.standing.back + (self.bottom.back - self.standing.back) * hinge;
        pose
    }
}

/// Detector imperfections injected into generated frames
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatorConfig {
    /// Visibility of the side facing the camera
    pub visibility: f32,
    /// Visibility of the far side
    pub far_visibility: f32,
    /// Max absolute coordinate jitter
    pub jitter: f32,
    /// Probability of a frame with no landmarks
    pub dropout_rate: f64,
    /// Probability of a frame with every visibility at `low_visibility`
    pub low_confidence_rate: f64,
    pub low_visibility: f32,
    /// Probability of the near ankle being occluded
    pub occlusion_rate: f64,
    /// Subject turned to face the camera
    pub facing_camera: bool,
    pub frame_interval: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::clean()
    }
}

impl SimulatorConfig {
    /// Perfect detector
    pub fn clean() -> Self {
        SimulatorConfig {
            visibility: 0.95,
            far_visibility: 0.65,
            jitter: 0.0,
            dropout_rate: 0.0,
            low_confidence_rate: 0.0,
            low_visibility: 0.2,
            occlusion_rate: 0.0,
            facing_camera: false,
            frame_interval: Duration::from_millis(33),
        }
    }

    /// Realistic webcam conditions
    pub fn noisy() -> Self {
        SimulatorConfig {
            jitter: 0.002,
            dropout_rate: 0.02,
            low_confidence_rate: 0.02,
            occlusion_rate: 0.05,
            ..Self::clean()
        }
    }

    /// Bad lighting and a cluttered scene
    pub fn hostile() -> Self {
        SimulatorConfig {
            visibility: 0.8,
            jitter: 0.004,
            dropout_rate: 0.1,
            low_confidence_rate: 0.1,
            occlusion_rate: 0.15,
            ..Self::clean()
        }
    }
}

/// Deterministic landmark stream generator
pub struct SquatSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    clock: FrameTime,
}

impl SquatSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_seed(config, 0)
    }

    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Self {
        SquatSimulator {
            config,
            rng: StdRng::seed_from_u64(seed),
            clock: FrameTime::ZERO,
        }
    }

    pub fn clean() -> Self {
        Self::new(SimulatorConfig::clean())
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Timestamp the next frame will carry
    pub fn now(&self) -> FrameTime {
        self.clock
    }

    /// Move the clock without emitting frames
    pub fn advance(&mut self, by: Duration) {
        self.clock = self.clock + by;
    }

    /// One frame of `pose`, with configured corruption applied
    pub fn frame(&mut self, pose: &BodyPose) -> LandmarkFrame {
        let timestamp = self.clock;
        self.clock = self.clock + self.config.frame_interval;

        if self.rng.gen_bool(self.config.dropout_rate) {
            return LandmarkFrame::empty(timestamp);
        }

        let mut frame = self.skeleton(timestamp, pose);

        if self.rng.gen_bool(self.config.low_confidence_rate) {
            let low = self.config.low_visibility;
            for landmark in &mut frame.landmarks {
                landmark.visibility = low;
            }
        } else if self.rng.gen_bool(self.config.occlusion_rate) {
            if let Some(ankle) = frame.get(Joint::LeftAnkle).copied() {
                frame.set(Landmark { visibility: 0.3, ..ankle });
            }
        }

        frame
    }

    /// `count` identical frames of `pose`
    pub fn hold(&mut self, pose: &BodyPose, count: usize) -> Vec<LandmarkFrame> {
        (0..count).map(|_| self.frame(pose)).collect()
    }

    /// Frames of one rep
    pub fn rep(&mut self, shape: &RepShape) -> Vec<LandmarkFrame> {
        shape.poses().iter().map(|pose| self.frame(pose)).collect()
    }

    /// Frames of `count` consecutive reps, preceded by a standing lead-in
    pub fn set(&mut self, shape: &RepShape, count: usize) -> Vec<LandmarkFrame> {
        let mut frames = self.hold(&shape.standing, shape.rest_frames as usize);
        for _ in 0..count {
            frames.extend(self.rep(shape));
        }
        frames
    }

    fn skeleton(&mut self, timestamp: FrameTime, pose: &BodyPose) -> LandmarkFrame {
        let shin = pose.shin.to_radians();
        let ankle = ANKLE_AT;
        let knee = (ankle.0 + SHIN_LEN * shin.sin(), ankle.1 - SHIN_LEN * shin.cos());

        // Direction knee→ankle, rotated by the knee angle towards the back
        let thigh_dir = (90.0 + pose.shin + pose.knee).to_radians();
        let hip = (
            knee.0 + THIGH_LEN * thigh_dir.cos(),
            knee.1 + THIGH_LEN * thigh_dir.sin(),
        );

        let back = pose.back.to_radians();
        let shoulder = (hip.0 + TORSO_LEN * back.sin(), hip.1 - TORSO_LEN * back.cos());
        let nose = (
            shoulder.0 + NECK_LEN * back.sin() + 0.04,
            shoulder.1 - NECK_LEN * back.cos(),
        );
        let foot = (ankle.0 + 0.08, ankle.1 + 0.02);

        let far = |(x, y): (f32, f32)| (x + FAR_SIDE_OFFSET, y);
        let (left_shoulder, right_shoulder) = if self.config.facing_camera {
            ((shoulder.0 - 0.09, shoulder.1), (shoulder.0 + 0.09, shoulder.1))
        } else {
            (shoulder, far(shoulder))
        };

        let near = self.config.visibility;
        let far_vis = self.config.far_visibility;
        let joints = [
            (Joint::Nose, nose, near),
            (Joint::LeftShoulder, left_shoulder, near),
            (Joint::LeftHip, hip, near),
            (Joint::LeftKnee, knee, near),
            (Joint::LeftAnkle, ankle, near),
            (Joint::LeftFootIndex, foot, near),
            (Joint::RightShoulder, right_shoulder, far_vis),
            (Joint::RightHip, far(hip), far_vis),
            (Joint::RightKnee, far(knee), far_vis),
            (Joint::RightAnkle, far(ankle), far_vis),
            (Joint::RightFootIndex, far(foot), far_vis),
        ];

        let jitter = (self.config.jitter > 0.0).then(|| Uniform::new_inclusive(-self.config.jitter, self.config.jitter));
        let landmarks = joints
            .iter()
            .map(|(joint, (x, y), vis)| {
                let (dx, dy) = match &jitter {
                    Some(dist) => (dist.sample(&mut self.rng), dist.sample(&mut self.rng)),
                    None => (0.0, 0.0),
                };
                Landmark::new(*joint, Position::new(x + dx, y + dy), *vis)
            })
            .collect();

        LandmarkFrame::new(timestamp, landmarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forma_core::Side;
    use forma_motion::{AngleCalculator, AngleKind};

    fn assert_close(actual: Option<f32>, expected: f32) {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 0.05, "{} != {}", actual, expected);
    }

    #[test]
    fn test_skeleton_angles_match_pose() {
        let mut sim = SquatSimulator::clean();
        let pose = BodyPose::new(85.0, 35.0, 25.0);
        let frame = sim.frame(&pose);

        let calc = AngleCalculator::new(0.5);
        assert_eq!(calc.select_side(&frame), Some(Side::Left));

        let angles = calc.compute(&frame, Side::Left);
        assert_close(angles.get(AngleKind::Knee), 85.0);
        assert_close(angles.get(AngleKind::BackInclination), 35.0);
        assert_close(angles.get(AngleKind::Ankle), 25.0);
        assert_close(angles.get(AngleKind::Hip), pose.hip());
    }

    #[test]
    fn test_side_on_camera_is_aligned() {
        let mut sim = SquatSimulator::clean();
        let frame = sim.frame(&RepShape::beginner().standing);
        let offset = AngleCalculator::new(0.5).camera_offset(&frame).unwrap();
        assert!(offset < 35.0, "offset {}", offset);
    }

    #[test]
    fn test_facing_camera_is_misaligned() {
        let mut sim = SquatSimulator::new(SimulatorConfig {
            facing_camera: true,
            ..SimulatorConfig::clean()
        });
        let frame = sim.frame(&RepShape::beginner().standing);
        let offset = AngleCalculator::new(0.5).camera_offset(&frame).unwrap();
        assert!(offset > 35.0, "offset {}", offset);
    }

    #[test]
    fn test_rep_shape() {
        let shape = RepShape::beginner();
        let poses = shape.poses();
        assert_eq!(poses.len(), shape.len());

        let deepest = poses.iter().map(|p| p.knee).fold(f32::MAX, f32::min);
        assert_eq!(deepest, 85.0);
        assert_eq!(poses.last(), Some(&shape.standing));
    }

    #[test]
    fn test_clock_advances_per_frame() {
        let mut sim = SquatSimulator::clean();
        let frames = sim.hold(&RepShape::beginner().standing, 3);
        let stamps: Vec<i64> = frames.iter().map(|f| f.timestamp.as_millis()).collect();
        assert_eq!(stamps, vec![0, 33, 66]);
        assert_eq!(sim.now(), FrameTime::from_millis(99));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let shape = RepShape::beginner();
        let mut a = SquatSimulator::with_seed(SimulatorConfig::hostile(), 7);
        let mut b = SquatSimulator::with_seed(SimulatorConfig::hostile(), 7);
        assert_eq!(a.set(&shape, 2), b.set(&shape, 2));
    }
}
