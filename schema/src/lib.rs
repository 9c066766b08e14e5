//! Schema definitions for conductor
//!
//! This crate contains the data structures shared between the core library
//! and the command-line host. All types here implement JSON Schema
//! generation for external consumption.

pub mod process;

pub use process::*;
