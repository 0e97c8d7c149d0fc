//! FORMA Motion - squat analysis from pose landmarks
//!
//! Landmarks in, counters and feedback out. Every frame flows through:
//!
//! ```text
//! LandmarkFrame → AngleCalculator → AngleSet ─┬→ PhaseMachine ──────┐
//!                                             └→ FeedbackGenerator ─┴→ FrameReport
//! ```
//!
//! # Guarantees
//!
//! - Reps are counted once, on leaving BOTTOM upward, and never uncounted
//! - Correct + incorrect always equals the total
//! - Warnings are debounced both ways
//! - A frame that cannot be analysed changes nothing
//!
//! One [`SessionProcessor`] per session. Processors share nothing mutable;
//! the [`ProfileTable`] they read from is immutable.

pub mod angle;
pub mod annotation;
pub mod feedback;
pub mod phase;
pub mod profile;
pub mod session;

pub use angle::*;
pub use annotation::*;
pub use feedback::*;
pub use phase::*;
pub use profile::*;
pub use session::*;
