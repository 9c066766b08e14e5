//! OS process primitives
//!
//! - **Unix**: children run in their own process group so a forced kill
//!   reaches everything the command started.

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
