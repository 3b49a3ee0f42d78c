//! Faultline CLI library: config discovery, rendering, and the interactive
//! oracle behind the `faultline` binary.

pub mod colors;
pub mod commands;
pub mod config;
pub mod error;
pub mod error_chain;
pub mod interactive;
pub mod report;

pub use error::CliError;
