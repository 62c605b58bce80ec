//! Command-line interface
//!
//! `start` runs a node; every other command is a client that sends one
//! request to a running node and prints the answer.

pub mod commands;

pub use commands::{Command, Opt, DEFAULT_NODE};
