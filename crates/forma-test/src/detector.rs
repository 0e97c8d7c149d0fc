//! Scripted pose detector
//!
//! Stands in for the real model in runtime tests: each raw frame is
//! answered with the landmark frame scripted for its timestamp.

use std::collections::HashMap;

use forma_core::{FormaError, FormaResult, FrameTime, LandmarkFrame};
use forma_runtime::{PoseDetector, RawFrame};

/// Detector replaying prepared landmark frames by timestamp
#[derive(Clone, Debug, Default)]
pub struct ScriptedDetector {
    frames: HashMap<FrameTime, LandmarkFrame>,
}

impl ScriptedDetector {
    pub fn new(frames: impl IntoIterator<Item = LandmarkFrame>) -> Self {
        ScriptedDetector {
            frames: frames.into_iter().map(|f| (f.timestamp, f)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Raw frames that will replay the script in timestamp order
    pub fn raw_frames(&self) -> Vec<RawFrame> {
        let mut stamps: Vec<FrameTime> = self.frames.keys().copied().collect();
        stamps.sort();
        stamps
            .into_iter()
            .map(|t| RawFrame::new(t, 640, 480, vec![0]))
            .collect()
    }
}

impl PoseDetector for ScriptedDetector {
    fn detect(&self, frame: &RawFrame) -> FormaResult<LandmarkFrame> {
        self.frames
            .get(&frame.timestamp)
            .cloned()
            .ok_or_else(|| FormaError::Detector(format!("nothing scripted at {:?}", frame.timestamp)))
    }
}
