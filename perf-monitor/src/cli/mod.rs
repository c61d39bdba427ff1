//! Command-line argument parsing and configuration

pub mod args;

pub use args::Args;
