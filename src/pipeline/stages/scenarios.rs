//! Test scenario stage
//!
//! Combines the dimension table into scenario combinations. The whole
//! dimension table is the prompt input; the closed-world instruction keeps
//! the model from inventing dimensions or values the previous stage never
//! declared.

use crate::ai::provider::SessionPolicy;
use crate::config::TestforgeConfig;
use crate::domain::{scenarios, verdicts};
use crate::pipeline::controller::{
    GenerationPlan, RetryVerifyController, VerdictStyle, VerificationPlan, DEFAULT_SCORE_GATE,
};
use crate::pipeline::stage_trait::{PipelineStage, StageOptions, StageReport};
use crate::pipeline::stages::{prepare_providers, StageKind};
use crate::prompt::{PromptBindings, TaskTemplate};
use crate::tables::{artifact_rows, render_records, JsonTable};
use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{info, warn};

pub struct ScenariosStage {
    config: TestforgeConfig,
}

impl ScenariosStage {
    pub fn new(config: TestforgeConfig) -> Self {
        Self { config }
    }

    fn generator_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test designer for a financial application. You understand the \
             nuances of the requirements provided.",
            "You are required to carefully understand the requirements and the test dimensions \
             provided as **Input** and do the following:\n\
             1. Create an exhaustive list of combinations of dimensions from which test cases \
             can be generated. **DO NOT** miss any valid combinations.\n\
             2. Use only the dimensions and the respective values available in the **Input**. \
             **DO NOT** use any other dimensions.\n\
             3. Assign a criticality for the combinations for the purposes of test coverage.\n\
             4. List them in the format required.\n\n\
             Input:\n{input}",
        )
    }

    fn verifier_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test case verifier for a financial application. You understand \
             the nuances of the requirements provided.",
            "You are required to carefully understand the requirements, the test dimensions \
             provided and the test combinations attached below.\n\
             1. Verify the candidate and provide a score of the correctness of the output.\n\n\
             Test dimensions:\n{input}\n\nCandidate output:\n{candidate}",
        )
    }
}

#[async_trait]
impl PipelineStage for ScenariosStage {
    fn name(&self) -> &'static str {
        "scenarios"
    }

    async fn execute(&self, options: &StageOptions) -> Result<StageReport> {
        info!("Generating test scenarios");

        let input_rows = JsonTable::new(&self.config.dimensions_file).read_records()?;
        if input_rows.is_empty() {
            bail!(
                "No dimensions found at {}; run the dimensions stage first",
                self.config.dimensions_file.display()
            );
        }

        let providers = prepare_providers(&self.config, StageKind::Scenarios, options).await?;

        let generator_task = Self::generator_template();
        let verifier_task = Self::verifier_template();

        let generation = GenerationPlan {
            provider: providers.generator.as_ref(),
            template: &generator_task,
            schema: scenarios::contract(),
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
        let bindings = PromptBindings::new()
            .bind("input", render_records(&input_rows))
            .with_extra_instructions(options.instructions.clone());

        let outcome = controller.resolve(bindings).await?;

        let mut report = StageReport::new(self.name());
        match outcome.artifact {
            Some(artifact) if outcome.accepted => {
                let rows = artifact_rows(artifact.value());
                report.produced = rows.len();
                JsonTable::new(&self.config.scenarios_file).write_records(&rows)?;
                info!(
                    "Wrote {} scenarios to {}",
                    rows.len(),
                    self.config.scenarios_file.display()
                );
            }
            _ => {
                warn!(
                    "Scenarios not accepted after {} attempts; nothing persisted",
                    outcome.attempts
                );
                report.unresolved.push("scenarios".to_string());
            }
        }

        Ok(report)
    }
}
