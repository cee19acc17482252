//! Generation pipeline
//!
//! The controller drives one record through the
//! Drafting/Validating/Verifying loop; stages adapt it to each artifact
//! type and iterate over input records.

pub mod controller;
pub mod stage_trait;
pub mod stages;

pub use controller::{
    AttemptOutcome, ControllerOutcome, GenerationAttempt, GenerationPlan, RetryVerifyController,
    Verdict, VerdictStyle, VerificationPlan,
};
pub use stage_trait::{PipelineStage, StageOptions, StageReport};
