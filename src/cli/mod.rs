//! Command-line interface for subject-cutout
//!
//! Only compiled with the `cli` feature.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, CliOutputFormat, Command};
