//! FORMA Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every FORMA crate:
//! - Identifiers (SessionId)
//! - Frame time (FrameTime)
//! - Skeleton schema and landmarks (Joint, Side, Landmark, LandmarkFrame)
//! - Error taxonomy for configuration-time failures

pub mod error;
pub mod id;
pub mod landmark;
pub mod time;

pub use error::*;
pub use id::*;
pub use landmark::*;
pub use time::*;
