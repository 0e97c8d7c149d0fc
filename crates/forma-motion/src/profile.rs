//! Threshold Profile - immutable bounds selected once per session
//!
//! A profile is chosen from a closed set of modes at session start and never
//! changes afterwards. The built-in table is constructed once and shared by
//! reference across every session in the process.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use forma_core::{FormaError, FormaResult};
use serde::{Deserialize, Serialize};

use crate::{AngleKind, FeedbackKind};

/// Difficulty mode selecting a threshold profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Beginner,
    Pro,
}

impl Mode {
    pub fn all() -> &'static [Mode] {
        &[Mode::Beginner, Mode::Pro]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Beginner => "beginner",
            Mode::Pro => "pro",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = FormaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Mode::Beginner),
            "pro" => Ok(Mode::Pro),
            _ => Err(FormaError::UnknownMode(s.to_string())),
        }
    }
}

/// Knee bounds driving the phase machine.
///
/// `transition_enter < transition_exit` and `bottom_enter < bottom_exit`
/// are the two hysteresis bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KneeBounds {
    /// STANDING → DESCENDING below this
    pub transition_enter: f32,
    /// DESCENDING → STANDING at or above this
    pub transition_exit: f32,
    /// DESCENDING → BOTTOM below this
    pub bottom_enter: f32,
    /// BOTTOM exits upward above this
    pub bottom_exit: f32,
    /// Squat too deep below this
    pub too_deep: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HipBounds {
    /// A rep only starts once the hip flexes below this
    pub hinge_enter: f32,
    /// At BOTTOM the hip must be at or below this
    pub depth_max: f32,
}

/// Torso inclination from vertical
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackBounds {
    pub min: f32,
    pub max: f32,
}

/// Shin inclination from vertical
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnkleBounds {
    pub max: f32,
}

/// Bounds for one named angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleBounds {
    Knee(KneeBounds),
    Hip(HipBounds),
    Ankle(AnkleBounds),
    BackInclination(BackBounds),
}

/// Consecutive-frame counts for feedback debouncing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dwell {
    /// Violating frames before a warning becomes active
    pub activate_frames: u32,
    /// Clean frames before an active warning clears
    pub clear_frames: u32,
}

impl Dwell {
    pub fn new(activate_frames: u32, clear_frames: u32) -> Self {
        Self {
            activate_frames,
            clear_frames,
        }
    }
}

/// Complete numeric configuration for one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub mode: Mode,
    pub knee: KneeBounds,
    pub hip: HipBounds,
    pub back: BackBounds,
    pub ankle: AnkleBounds,

    /// Shoulder offset seen from the nose above which the camera is misaligned
    pub camera_offset_max: f32,

    /// Per-landmark confidence needed for an angle to be computed
    pub min_confidence: f32,

    /// Whole-frame confidence below which the frame is skipped
    pub frame_confidence_floor: f32,

    /// Default debounce for every rule
    pub dwell: Dwell,

    /// Per-rule debounce overrides
    #[serde(default)]
    pub dwell_overrides: BTreeMap<FeedbackKind, Dwell>,

    /// Rules evaluated for this profile
    pub rules: BTreeSet<FeedbackKind>,

    /// Frames a missing angle is bridged from the cache
    pub angle_hold_frames: u32,

    /// An in-progress rep stalled this long is discarded
    #[serde(with = "millis")]
    pub inactivity_timeout: Duration,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

impl ThresholdProfile {
    /// Forgiving bounds for people learning the movement
    pub fn beginner() -> Self {
        Self {
            mode: Mode::Beginner,
            knee: KneeBounds {
                transition_enter: 140.0,
                transition_exit: 150.0,
                bottom_enter: 90.0,
                bottom_exit: 100.0,
                too_deep: 50.0,
            },
            hip: HipBounds {
                hinge_enter: 175.0,
                depth_max: 110.0,
            },
            back: BackBounds {
                min: 10.0,
                max: 50.0,
            },
            ankle: AnkleBounds { max: 45.0 },
            camera_offset_max: 35.0,
            min_confidence: 0.5,
            frame_confidence_floor: 0.4,
            dwell: Dwell::new(3, 3),
            dwell_overrides: BTreeMap::new(),
            rules: FeedbackKind::all().iter().copied().collect(),
            angle_hold_frames: 2,
            inactivity_timeout: Duration::from_secs(15),
        }
    }

    /// Stricter bounds: deeper bottom, tighter back and shin limits
    pub fn pro() -> Self {
        Self {
            mode: Mode::Pro,
            knee: KneeBounds {
                transition_enter: 145.0,
                transition_exit: 155.0,
                bottom_enter: 80.0,
                bottom_exit: 90.0,
                too_deep: 50.0,
            },
            hip: HipBounds {
                hinge_enter: 175.0,
                depth_max: 100.0,
            },
            back: BackBounds {
                min: 15.0,
                max: 45.0,
            },
            ankle: AnkleBounds { max: 30.0 },
            camera_offset_max: 35.0,
            min_confidence: 0.6,
            frame_confidence_floor: 0.5,
            dwell: Dwell::new(2, 4),
            dwell_overrides: BTreeMap::new(),
            rules: FeedbackKind::all().iter().copied().collect(),
            angle_hold_frames: 2,
            inactivity_timeout: Duration::from_secs(15),
        }
    }

    /// Built-in profile for a mode
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Beginner => Self::beginner(),
            Mode::Pro => Self::pro(),
        }
    }

    /// Bounds for a named angle
    pub fn bounds(&self, kind: AngleKind) -> AngleBounds {
        match kind {
            AngleKind::Knee => AngleBounds::Knee(self.knee),
            AngleKind::Hip => AngleBounds::Hip(self.hip),
            AngleKind::Ankle => AngleBounds::Ankle(self.ankle),
            AngleKind::BackInclination => AngleBounds::BackInclination(self.back),
        }
    }

    /// Debounce for a feedback rule
    pub fn dwell(&self, kind: FeedbackKind) -> Dwell {
        self.dwell_overrides.get(&kind).copied().unwrap_or(self.dwell)
    }

    pub fn rule_enabled(&self, kind: FeedbackKind) -> bool {
        self.rules.contains(&kind)
    }

    /// Copy with one rule switched off
    pub fn without_rule(mut self, kind: FeedbackKind) -> Self {
        self.rules.remove(&kind);
        self
    }

    /// Copy with a per-rule dwell override
    pub fn with_dwell(mut self, kind: FeedbackKind, dwell: Dwell) -> Self {
        self.dwell_overrides.insert(kind, dwell);
        self
    }

    /// Check internal consistency of a (possibly user supplied) profile
    pub fn validate(&self) -> FormaResult<()> {
        let invalid = |msg: String| Err(FormaError::InvalidProfile(msg));
        let k = &self.knee;

        let degrees = [
            ("knee.transition_enter", k.transition_enter),
            ("knee.transition_exit", k.transition_exit),
            ("knee.bottom_enter", k.bottom_enter),
            ("knee.bottom_exit", k.bottom_exit),
            ("knee.too_deep", k.too_deep),
            ("hip.hinge_enter", self.hip.hinge_enter),
            ("hip.depth_max", self.hip.depth_max),
            ("back.min", self.back.min),
            ("back.max", self.back.max),
            ("ankle.max", self.ankle.max),
            ("camera_offset_max", self.camera_offset_max),
        ];
        for (name, value) in degrees {
            if !(0.0..=180.0).contains(&value) {
                return invalid(format!("{name} = {value} outside [0, 180]"));
            }
        }

        if k.transition_enter >= k.transition_exit {
            return invalid("knee transition band must have enter < exit".into());
        }
        if k.bottom_enter >= k.bottom_exit {
            return invalid("knee bottom band must have enter < exit".into());
        }
        if k.bottom_exit > k.transition_enter {
            return invalid("knee bottom band must lie below the transition band".into());
        }
        if k.too_deep >= k.bottom_enter {
            return invalid("knee.too_deep must be below knee.bottom_enter".into());
        }
        if self.back.min >= self.back.max {
            return invalid("back.min must be below back.max".into());
        }

        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("frame_confidence_floor", self.frame_confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} = {value} outside [0, 1]"));
            }
        }

        let dwells = std::iter::once(self.dwell).chain(self.dwell_overrides.values().copied());
        for dwell in dwells {
            if dwell.activate_frames == 0 || dwell.clear_frames == 0 {
                return invalid("dwell frame counts must be at least 1".into());
            }
        }

        Ok(())
    }
}

/// Process-wide, read-only table of profiles keyed by mode
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: BTreeMap<Mode, Arc<ThresholdProfile>>,
}

impl ProfileTable {
    /// Table of the compiled-in profiles
    pub fn builtin() -> Self {
        let profiles = Mode::all()
            .iter()
            .map(|mode| (*mode, Arc::new(ThresholdProfile::for_mode(*mode))))
            .collect();
        Self { profiles }
    }

    /// Shared instance of the built-in table
    pub fn shared() -> &'static ProfileTable {
        static TABLE: OnceLock<ProfileTable> = OnceLock::new();
        TABLE.get_or_init(ProfileTable::builtin)
    }

    /// Table with some profiles replaced, each validated first
    pub fn with_overrides(
        overrides: impl IntoIterator<Item = ThresholdProfile>,
    ) -> FormaResult<Self> {
        let mut table = Self::builtin();
        for profile in overrides {
            profile.validate()?;
            table.profiles.insert(profile.mode, Arc::new(profile));
        }
        Ok(table)
    }

    /// Profile for a mode
    pub fn get(&self, mode: Mode) -> Arc<ThresholdProfile> {
        match self.profiles.get(&mode) {
            Some(profile) => Arc::clone(profile),
            None => Arc::new(ThresholdProfile::for_mode(mode)),
        }
    }

    /// Resolve a mode name; fails for unknown names
    pub fn resolve(&self, name: &str) -> FormaResult<Arc<ThresholdProfile>> {
        let mode: Mode = name.parse()?;
        Ok(self.get(mode))
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}
