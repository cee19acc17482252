//! Test step stage
//!
//! Per-case batch: each test case record drives one controller run, and the
//! accepted steps land in a per-case table so the expected-output stage can
//! pick them up case by case.

use crate::ai::provider::SessionPolicy;
use crate::config::TestforgeConfig;
use crate::domain::{steps, verdicts};
use crate::pipeline::controller::{
    GenerationPlan, RetryVerifyController, VerdictStyle, VerificationPlan, DEFAULT_SCORE_GATE,
};
use crate::pipeline::stage_trait::{PipelineStage, StageOptions, StageReport};
use crate::pipeline::stages::{prepare_providers, StageKind};
use crate::prompt::{PromptBindings, TaskTemplate};
use crate::tables::{artifact_rows, record_id, render_record, JsonTable};
use anyhow::{bail, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub struct StepsStage {
    config: TestforgeConfig,
}

impl StepsStage {
    pub fn new(config: TestforgeConfig) -> Self {
        Self { config }
    }

    fn generator_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are a senior financial application tester who can write the test steps \
             required to execute the test case, given the requirements and the test case.",
            "You are required to carefully understand the requirements and the test case \
             provided as **Input** and do the following:\n\
             1. Create the necessary and relevant test steps required to effectively test the \
             given test case.\n\
             2. Keep each test step comprehensive and independent to test effectively.\n\
             3. **DO NOT** generate steps for any other test case than the test case provided \
             as **Input**.\n\
             4. List them in the format required.\n\n\
             Input:\n{input}",
        )
    }

    fn verifier_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test case verifier for a financial application. You understand \
             the nuances of the requirements provided.",
            "You are required to carefully understand the requirements, the test case provided \
             and the test steps attached below.\n\
             1. Verify the candidate and provide a score of the correctness of the output.\n\n\
             Test case:\n{input}\n\nCandidate output:\n{candidate}",
        )
    }
}

#[async_trait]
impl PipelineStage for StepsStage {
    fn name(&self) -> &'static str {
        "steps"
    }

    async fn execute(&self, options: &StageOptions) -> Result<StageReport> {
        info!("Generating test steps");

        let input_rows = JsonTable::new(&self.config.cases_file).read_records()?;
        if input_rows.is_empty() {
            bail!(
                "No test cases found at {}; run the cases stage first",
                self.config.cases_file.display()
            );
        }

        let providers = prepare_providers(&self.config, StageKind::Steps, options).await?;

        let generator_task = Self::generator_template();
        let verifier_task = Self::verifier_template();

        let generation = GenerationPlan {
            provider: providers.generator.as_ref(),
            template: &generator_task,
            schema: steps::contract(),
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

        let (start, end) = options.clamp_range(input_rows.len());
        let bar = ProgressBar::new((end - start) as u64);
        bar.set_style(
            ProgressStyle::with_template("{prefix:>9} [{bar:40}] {pos}/{len} {msg}")
                .expect("static template")
                .progress_chars("=> "),
        );
        bar.set_prefix("steps");

        let mut report = StageReport::new(self.name());

        for (index, row) in input_rows[start..end].iter().enumerate() {
            let case_id = record_id(row, "test_case_id")
                .unwrap_or_else(|| format!("record-{}", start + index));
            bar.set_message(case_id.clone());
            info!(
                "Generating steps for test case {} ({}/{})",
                case_id,
                start + index + 1,
                end
            );

            let bindings = PromptBindings::new()
                .bind("input", render_record(row))
                .with_extra_instructions(options.instructions.clone());

            let outcome = controller.resolve(bindings).await?;
            match outcome.artifact {
                Some(artifact) if outcome.accepted => {
                    let rows = artifact_rows(artifact.value());
                    report.produced += rows.len();
                    let table = JsonTable::new(self.config.steps_file(&case_id));
                    table.write_records(&rows)?;
                    info!("Wrote {} steps to {}", rows.len(), table.path().display());
                }
                _ => {
                    warn!(
                        "Test case {} not resolved after {} attempts",
                        case_id, outcome.attempts
                    );
                    report.unresolved.push(case_id);
                }
            }
            bar.inc(1);
        }
        bar.finish_with_message("done");

        Ok(report)
    }
}
