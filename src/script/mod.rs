// src/script/mod.rs

//! Named units of work running on their own threads.
//!
//! - [`handle`] defines [`Script`], its lifecycle and its output helpers.
//! - [`label`] builds the `[name.label]` prefix and escapes text.
//! - [`output`] defines the [`Sink`] trait and the console/broadcast router.
//! - [`current`] tracks which script owns the calling thread.

pub mod current;
pub mod handle;
pub mod label;
pub mod output;

pub use handle::{Payload, Script};
pub use label::{Label, escape, format_line};
pub use output::{Output, Sink, StdoutSink};
