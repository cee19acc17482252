//! Domain schema contracts
//!
//! The declared shapes of the five artifact kinds the pipeline produces,
//! plus the verifier verdict shapes. These are payload descriptions only;
//! the pipeline never interprets the financial semantics, it just guarantees
//! schema-valid, verifier-gated output.

pub mod cases;
pub mod dimensions;
pub mod outputs;
pub mod scenarios;
pub mod steps;
pub mod verdicts;
