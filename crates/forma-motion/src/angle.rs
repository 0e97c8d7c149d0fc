//! Angle Calculator - landmarks to named joint angles
//!
//! Every angle is the interior angle at a vertex joint, computed from the two
//! vectors vertex→from and vertex→to. Inclinations use a virtual reference
//! point straight above the vertex, so they read as degrees away from
//! vertical.
//!
//! Nothing in here fails: a landmark below the confidence threshold, a
//! missing joint, a non-finite coordinate or a degenerate (zero-length)
//! vector all make the affected angle unavailable for the frame.

use forma_core::{Joint, Landmark, LandmarkFrame, Position, Side};
use serde::{Deserialize, Serialize};

/// Vectors shorter than this are treated as degenerate
const MIN_VECTOR_LEN: f32 = 1e-6;

/// Named angles tracked per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleKind {
    /// Hip - Knee - Ankle
    Knee,
    /// Shoulder - Hip - Knee
    Hip,
    /// Knee - Ankle - vertical: shin inclination
    Ankle,
    /// Shoulder - Hip - vertical: torso inclination
    BackInclination,
}

impl AngleKind {
    pub fn all() -> &'static [AngleKind] {
        &[
            AngleKind::Knee,
            AngleKind::Hip,
            AngleKind::Ankle,
            AngleKind::BackInclination,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            AngleKind::Knee => "KNEE_ANGLE",
            AngleKind::Hip => "HIP_ANGLE",
            AngleKind::Ankle => "ANKLE_ANGLE",
            AngleKind::BackInclination => "BACK_INCLINATION",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

/// End point of one of the two angle arms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Joint(Joint),
    /// Virtual point straight above the vertex
    VerticalUp,
}

/// Joint triplet forming an angle at `vertex`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleDefinition {
    pub kind: AngleKind,
    pub from: Arm,
    pub vertex: Joint,
    pub to: Arm,
}

impl AngleDefinition {
    /// Definition of `kind` on the given body side
    pub fn for_side(kind: AngleKind, side: Side) -> Self {
        let (from, vertex, to) = match kind {
            AngleKind::Knee => (Arm::Joint(side.hip()), side.knee(), Arm::Joint(side.ankle())),
            AngleKind::Hip => (Arm::Joint(side.shoulder()), side.hip(), Arm::Joint(side.knee())),
            AngleKind::Ankle => (Arm::Joint(side.knee()), side.ankle(), Arm::VerticalUp),
            AngleKind::BackInclination => {
                (Arm::Joint(side.shoulder()), side.hip(), Arm::VerticalUp)
            }
        };
        Self {
            kind,
            from,
            vertex,
            to,
        }
    }
}

/// Named angles for one frame; `None` means unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleSet {
    pub knee: Option<f32>,
    pub hip: Option<f32>,
    pub ankle: Option<f32>,
    pub back_inclination: Option<f32>,
}

impl AngleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Angle set carrying only a knee angle
    pub fn knee_only(knee: f32) -> Self {
        Self {
            knee: Some(knee),
            ..Self::default()
        }
    }

    pub fn get(&self, kind: AngleKind) -> Option<f32> {
        match kind {
            AngleKind::Knee => self.knee,
            AngleKind::Hip => self.hip,
            AngleKind::Ankle => self.ankle,
            AngleKind::BackInclination => self.back_inclination,
        }
    }

    pub fn set(&mut self, kind: AngleKind, value: Option<f32>) {
        let slot = match kind {
            AngleKind::Knee => &mut self.knee,
            AngleKind::Hip => &mut self.hip,
            AngleKind::Ankle => &mut self.ankle,
            AngleKind::BackInclination => &mut self.back_inclination,
        };
        *slot = value;
    }

    pub fn with(mut self, kind: AngleKind, value: f32) -> Self {
        self.set(kind, Some(value));
        self
    }

    /// Available angles in `AngleKind::all()` order
    pub fn available(&self) -> impl Iterator<Item = (AngleKind, f32)> + '_ {
        AngleKind::all()
            .iter()
            .filter_map(move |k| self.get(*k).map(|v| (*k, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.available().next().is_none()
    }
}

/// Interior angle at `vertex` in degrees, clamped to [0, 180].
///
/// Uses depth when all three points carry it, the image plane otherwise.
/// Returns `None` for non-finite input or a degenerate arm.
pub fn interior_angle(from: &Position, vertex: &Position, to: &Position) -> Option<f32> {
    let use_depth = from.z.is_some() && vertex.z.is_some() && to.z.is_some();
    let depth = |p: &Position| if use_depth { p.z.unwrap_or(0.0) } else { 0.0 };

    let a = [from.x - vertex.x, from.y - vertex.y, depth(from) - depth(vertex)];
    let b = [to.x - vertex.x, to.y - vertex.y, depth(to) - depth(vertex)];

    let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    let len_a = (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    let len_b = (b[0] * b[0] + b[1] * b[1] + b[2] * b[2]).sqrt();

    if !(len_a.is_finite() && len_b.is_finite() && dot.is_finite()) {
        return None;
    }
    if len_a < MIN_VECTOR_LEN || len_b < MIN_VECTOR_LEN {
        return None;
    }

    let cos = (dot / (len_a * len_b)).clamp(-1.0, 1.0);
    let degrees = cos.acos().to_degrees();
    if degrees.is_finite() {
        Some(degrees.clamp(0.0, 180.0))
    } else {
        None
    }
}

/// Computes angle sets from landmark frames under a confidence threshold
#[derive(Debug, Clone, Copy)]
pub struct AngleCalculator {
    min_confidence: f32,
}

impl AngleCalculator {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    fn reliable<'a>(&self, frame: &'a LandmarkFrame, joint: Joint) -> Option<&'a Landmark> {
        let landmark = frame.get(joint)?;
        let ok = landmark.visibility >= self.min_confidence && landmark.position.is_finite();
        ok.then_some(landmark)
    }

    /// Pick the body side facing the camera.
    ///
    /// Only sides with every chain joint present qualify; among those the
    /// higher mean visibility wins, ties going to the left.
    pub fn select_side(&self, frame: &LandmarkFrame) -> Option<Side> {
        [Side::Left, Side::Right]
            .into_iter()
            .filter(|side| frame.contains_all(&side.chain()))
            .map(|side| (side, frame.mean_visibility(&side.chain())))
            .fold(None, |best: Option<(Side, f32)>, (side, vis)| match best {
                Some((_, best_vis)) if best_vis >= vis => best,
                _ => Some((side, vis)),
            })
            .map(|(side, _)| side)
    }

    /// Compute one angle, or `None` if it is unavailable this frame
    pub fn angle(&self, frame: &LandmarkFrame, def: &AngleDefinition) -> Option<f32> {
        let vertex = self.reliable(frame, def.vertex)?.position;
        let resolve = |arm: Arm| -> Option<Position> {
            match arm {
                Arm::Joint(joint) => self.reliable(frame, joint).map(|l| l.position),
                Arm::VerticalUp => Some(Position {
                    x: vertex.x,
                    y: vertex.y - 1.0,
                    z: vertex.z,
                }),
            }
        };
        let from = resolve(def.from)?;
        let to = resolve(def.to)?;
        interior_angle(&from, &vertex, &to)
    }

    /// Compute every named angle for one side
    pub fn compute(&self, frame: &LandmarkFrame, side: Side) -> AngleSet {
        let mut set = AngleSet::empty();
        for kind in AngleKind::all() {
            let def = AngleDefinition::for_side(*kind, side);
            set.set(*kind, self.angle(frame, &def));
        }
        set
    }

    /// Angle at the nose between the two shoulders.
    ///
    /// Small when the subject stands side-on, large when facing the camera.
    pub fn camera_offset(&self, frame: &LandmarkFrame) -> Option<f32> {
        let nose = self.reliable(frame, Joint::Nose)?.position;
        let left = self.reliable(frame, Joint::LeftShoulder)?.position;
        let right = self.reliable(frame, Joint::RightShoulder)?.position;
        interior_angle(&left, &nose, &right)
    }

    /// Image position at which an angle label should be drawn
    pub fn anchor(&self, frame: &LandmarkFrame, kind: AngleKind, side: Side) -> Option<Position> {
        let def = AngleDefinition::for_side(kind, side);
        frame.get(def.vertex).map(|l| l.position)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CacheSlot {
    value: Option<f32>,
    misses: u32,
}

/// Last-seen angle cache.
///
/// Bridges short occlusions by reusing the last available value for a
/// bounded number of consecutive frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngleCache {
    slots: [CacheSlot; 4],
}

impl AngleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value seen for `kind`, regardless of age
    pub fn last(&self, kind: AngleKind) -> Option<f32> {
        self.slots[kind.slot()].value
    }

    /// Merge a freshly computed set with the cache.
    ///
    /// Available angles refresh their slot. Unavailable angles reuse the
    /// cached value while fewer than `max_hold` frames have been bridged.
    pub fn bridge(&mut self, raw: &AngleSet, max_hold: u32) -> AngleSet {
        let mut out = AngleSet::empty();
        for kind in AngleKind::all() {
            let slot = &mut self.slots[kind.slot()];
            match raw.get(*kind) {
                Some(v) => {
                    slot.value = Some(v);
                    slot.misses = 0;
                    out.set(*kind, Some(v));
                }
                None if slot.misses < max_hold => {
                    slot.misses += 1;
                    out.set(*kind, slot.value);
                }
                None => {}
            }
        }
        out
    }
}
