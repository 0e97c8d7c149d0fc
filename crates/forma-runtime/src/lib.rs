//! FORMA Runtime - Session orchestration around the analysis core
//!
//! Everything here is plumbing: configuration loading, tracing setup,
//! the pose detector seam, the registry of live sessions and the tokio
//! workers that feed them. Rep counting and feedback live in
//! `forma-motion`.

pub mod config;
pub mod detector;
pub mod logging;
pub mod manager;
pub mod worker;

pub use config::*;
pub use detector::*;
pub use logging::*;
pub use manager::*;
pub use worker::*;
