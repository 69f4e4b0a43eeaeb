//! FlowScope CLI library.
//!
//! Exposes the argument parser, input/schema loading, and output formatters
//! as a library so integration tests can drive them without spawning the
//! `flowscope` binary.

pub mod cli;
pub mod input;
pub mod output;
pub mod schema;

pub use cli::Args;
