//! Artifact stages
//!
//! One module per artifact type. Stages share the provider preparation and
//! option-override plumbing here; each module contributes its prompt
//! templates, schema and record wiring.

pub mod cases;
pub mod dimensions;
pub mod outputs;
pub mod scenarios;
pub mod steps;

use crate::ai::provider::{CacheRole, Provider};
use crate::config::{StageTuning, TestforgeConfig};
use crate::pipeline::stage_trait::StageOptions;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub use cases::CasesStage;
pub use dimensions::DimensionsStage;
pub use outputs::OutputsStage;
pub use scenarios::ScenariosStage;
pub use steps::StepsStage;

/// The five artifact stages, in pipeline order
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Extract test dimensions from the requirements
    Dimensions,
    /// Combine dimensions into test scenarios
    Scenarios,
    /// Generate test cases per scenario
    Cases,
    /// Generate executable steps per test case
    Steps,
    /// Generate expected-result snapshots per step
    Outputs,
}

impl StageKind {
    /// Environment-variable segment for per-stage overrides
    pub fn env_prefix(&self) -> &'static str {
        match self {
            StageKind::Dimensions => "DIMENSIONS",
            StageKind::Scenarios => "SCENARIOS",
            StageKind::Cases => "CASES",
            StageKind::Steps => "STEPS",
            StageKind::Outputs => "OUTPUTS",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Dimensions => "dimensions",
            StageKind::Scenarios => "scenarios",
            StageKind::Cases => "cases",
            StageKind::Steps => "steps",
            StageKind::Outputs => "outputs",
        };
        f.write_str(name)
    }
}

/// Builds the stage selected on the command line
pub fn build_stage(
    kind: StageKind,
    config: TestforgeConfig,
) -> Box<dyn crate::pipeline::stage_trait::PipelineStage + Send + Sync> {
    match kind {
        StageKind::Dimensions => Box::new(DimensionsStage::new(config)),
        StageKind::Scenarios => Box::new(ScenariosStage::new(config)),
        StageKind::Cases => Box::new(CasesStage::new(config)),
        StageKind::Steps => Box::new(StepsStage::new(config)),
        StageKind::Outputs => Box::new(OutputsStage::new(config)),
    }
}

/// Generator and verifier providers prepared for one stage run
pub(crate) struct StageProviders {
    pub tuning: StageTuning,
    pub generator: Arc<dyn Provider>,
    pub verifier: Option<Arc<dyn Provider>>,
}

/// Resolves tuning (with CLI overrides), constructs both providers and makes
/// the reference documents available to them before any record is processed.
pub(crate) async fn prepare_providers(
    config: &TestforgeConfig,
    kind: StageKind,
    options: &StageOptions,
) -> Result<StageProviders> {
    let mut tuning = config.stage_tuning(kind)?;
    if let Some(tries) = options.tries {
        tuning.tries = tries.max(1);
    }
    if options.no_verify {
        tuning.verify = false;
    }

    let generator = config
        .build_provider(tuning.provider, &tuning.model, CacheRole::Generator)
        .with_context(|| format!("Cannot build generator for stage {}", kind))?;
    generator
        .upload_reference_documents(&config.knowledge_dir)
        .await
        .with_context(|| format!("Cannot prepare reference documents for stage {}", kind))?;

    let verifier = if tuning.verify {
        let verifier = config
            .build_provider(
                tuning.verifier_provider,
                &tuning.verifier_model,
                CacheRole::Verifier,
            )
            .with_context(|| format!("Cannot build verifier for stage {}", kind))?;
        verifier
            .upload_reference_documents(&config.knowledge_dir)
            .await
            .with_context(|| format!("Cannot prepare verifier documents for stage {}", kind))?;
        Some(verifier)
    } else {
        None
    };

    info!(
        "Stage {} using generator {} ({}) verify={}",
        kind,
        generator.name(),
        tuning.model,
        tuning.verify
    );

    Ok(StageProviders {
        tuning,
        generator,
        verifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Dimensions.to_string(), "dimensions");
        assert_eq!(StageKind::Outputs.to_string(), "outputs");
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(StageKind::Cases.env_prefix(), "CASES");
        assert_eq!(StageKind::Scenarios.env_prefix(), "SCENARIOS");
    }
}
