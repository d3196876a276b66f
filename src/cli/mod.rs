//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Running the reference server
//! - The interactive sensor peer
//! - The interactive subscriber peer

pub mod commands;
pub mod handlers;
pub mod repl;

pub use handlers::{init_logging, run_sensor, run_server, run_subscriber};
