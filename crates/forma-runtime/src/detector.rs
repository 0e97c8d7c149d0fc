//! Pose detector seam
//!
//! The detector is an expensive, process-wide resource (a loaded model).
//! It is constructed once at startup and handed to every session as a
//! shared reference; sessions never create their own.

use std::sync::Arc;

use forma_core::{FormaResult, FrameTime, LandmarkFrame};

/// Undecoded video frame as received from a client
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub timestamp: FrameTime,
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes; format is between client and detector
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(timestamp: FrameTime, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            width,
            height,
            data,
        }
    }
}

/// Turns a raw frame into landmarks.
///
/// Returning an empty landmark set means "no subject"; an error means the
/// frame could not be examined at all. Either way the session skips it.
pub trait PoseDetector: Send + Sync {
    fn detect(&self, frame: &RawFrame) -> FormaResult<LandmarkFrame>;
}

impl<F> PoseDetector for F
where
    F: Fn(&RawFrame) -> FormaResult<LandmarkFrame> + Send + Sync,
{
    fn detect(&self, frame: &RawFrame) -> FormaResult<LandmarkFrame> {
        self(frame)
    }
}

/// Shared handle to the process-wide detector
pub type SharedDetector = Arc<dyn PoseDetector>;
