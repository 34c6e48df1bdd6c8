//! CLI interface for tapswitch
//!
//! This crate provides the command-line interface for the tapswitch bridge,
//! including argument parsing and configuration validation.

pub mod args;

pub use args::{Cli, LogLevel};
