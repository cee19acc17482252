//! Test dimension stage
//!
//! First stage of the pipeline: no input table, one controller invocation
//! over the requirements in the knowledge base, threshold verification.

use crate::ai::provider::SessionPolicy;
use crate::config::TestforgeConfig;
use crate::domain::{dimensions, verdicts};
use crate::pipeline::controller::{
    GenerationPlan, RetryVerifyController, VerdictStyle, VerificationPlan, DEFAULT_SCORE_GATE,
};
use crate::pipeline::stage_trait::{PipelineStage, StageOptions, StageReport};
use crate::pipeline::stages::{prepare_providers, StageKind};
use crate::prompt::{PromptBindings, TaskTemplate};
use crate::tables::{artifact_rows, JsonTable};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

pub struct DimensionsStage {
    config: TestforgeConfig,
}

impl DimensionsStage {
    pub fn new(config: TestforgeConfig) -> Self {
        Self { config }
    }

    fn generator_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test designer for a financial application. You understand the \
             nuances of the requirements provided.",
            "You are required to carefully understand the requirements and do the following:\n\
             1. Extract the test dimensions applicable for testing the requirements thoroughly.\n\
             2. For each dimension extract the list of valid values that will be used for \
             generating test scenarios.\n\
             3. List them in the format required.",
        )
    }

    fn verifier_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test case verifier for a financial application. You understand \
             the nuances of the requirements provided.",
            "You are required to carefully understand the requirements and the test dimensions \
             provided below.\n\
             1. Verify the candidate and provide a score of the correctness of the output.\n\n\
             Candidate output:\n{candidate}",
        )
    }
}

#[async_trait]
impl PipelineStage for DimensionsStage {
    fn name(&self) -> &'static str {
        "dimensions"
    }

    async fn execute(&self, options: &StageOptions) -> Result<StageReport> {
        info!("Generating test dimensions");
        let providers = prepare_providers(&self.config, StageKind::Dimensions, options).await?;

        let generator_task = Self::generator_template();
        let verifier_task = Self::verifier_template();

        let generation = GenerationPlan {
            provider: providers.generator.as_ref(),
            template: &generator_task,
            schema: dimensions::contract(),
            session: SessionPolicy::Reuse,
        };
        let verification = providers.verifier.as_deref().map(|verifier| VerificationPlan {
            provider: verifier,
            template: &verifier_task,
            schema: verdicts::score_contract(),
            style: VerdictStyle::Threshold {
                min_score: DEFAULT_SCORE_GATE,
            },
        });

        let controller =
            RetryVerifyController::new(generation, verification, providers.tuning.tries);
        let bindings = PromptBindings::new().with_extra_instructions(options.instructions.clone());

        let outcome = controller.resolve(bindings).await?;

        let mut report = StageReport::new(self.name());
        match outcome.artifact {
            Some(artifact) if outcome.accepted => {
                let rows = artifact_rows(artifact.value());
                report.produced = rows.len();
                JsonTable::new(&self.config.dimensions_file).write_records(&rows)?;
                info!(
                    "Wrote {} dimensions to {}",
                    rows.len(),
                    self.config.dimensions_file.display()
                );
            }
            _ => {
                warn!(
                    "Dimensions not accepted after {} attempts; nothing persisted",
                    outcome.attempts
                );
                report.unresolved.push("dimensions".to_string());
            }
        }

        Ok(report)
    }
}
