//! Command implementations for the Lodestar CLI.

pub mod config;
pub mod run;
pub mod stats;
pub mod tools;
