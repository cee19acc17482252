//! testforge - AI-driven test artifact generator
//!
//! testforge drives generative-AI providers to produce test artifacts
//! (dimensions, scenarios, cases, steps, expected outputs) for a financial
//! application, validating every response against a declared schema and
//! optionally routing it through a second verifier model before accepting it.

pub mod ai;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod tables;
pub mod util;

pub use config::TestforgeConfig;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
