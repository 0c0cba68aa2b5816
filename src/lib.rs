//! freeloop: a live coding runtime for sample-based sequencing.
//!
//! Text blocks go through the [`dsl`] front end into [`ast`] blueprints,
//! names are tracked and resolved to audio by the [`symbol`] table, and the
//! [`event`] scheduler walks the resulting automata ahead of an [`audio`]
//! output clock. [`runtime::Runtime`] ties it together.

pub mod assets;
pub mod ast;
pub mod audio;
pub mod config;
pub mod dsl;
pub mod event;
pub mod feedback;
pub mod runtime;
pub mod symbol;

pub use runtime::{BlockAnalysis, Runtime, TickReport};
