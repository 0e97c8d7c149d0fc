//! FORMA Test Harness - synthetic squats and end-to-end validation
//!
//! This crate provides:
//! - A squat simulator producing side-view landmark streams
//! - Detector fault injection (jitter, dropouts, occlusion)
//! - A session harness that checks the counting guarantees
//! - A scripted pose detector for runtime tests

pub mod detector;
pub mod harness;
pub mod simulator;

#[cfg(test)]
mod properties;

pub use detector::*;
pub use harness::*;
pub use simulator::*;
