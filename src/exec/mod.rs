// src/exec/mod.rs

//! Process execution for configured scripts.
//!
//! - [`command`] turns a shell command into script work: it spawns the
//!   process, forwards its output through the script, and stops it when the
//!   script is cancelled.

pub mod command;

pub use command::command_work;
