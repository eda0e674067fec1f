//! nbe - NATS by Example tooling
//!
//! nbe ingests a library of short, annotated example programs and:
//!
//! - Segments each source file into alternating prose and code blocks
//! - Builds every example into a container image from layered build contexts
//! - Runs examples inside ephemeral compose projects and captures their output
//! - Runs examples against matrices of server and client versions

pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod index;
pub mod language;
pub mod parser;
pub mod runner;

pub use error::{NbeError, Result};
