//! Test case stage
//!
//! Per-scenario batch: each scenario record drives one controller run and
//! contributes its cases to a single accumulated table. A failed record is
//! reported and skipped; the batch always runs to the end of the range.

use crate::ai::provider::SessionPolicy;
use crate::config::TestforgeConfig;
use crate::domain::{cases, verdicts};
use crate::pipeline::controller::{
    GenerationPlan, RetryVerifyController, VerdictStyle, VerificationPlan, DEFAULT_SCORE_GATE,
};
use crate::pipeline::stage_trait::{PipelineStage, StageOptions, StageReport};
use crate::pipeline::stages::{prepare_providers, StageKind};
use crate::prompt::{PromptBindings, TaskTemplate};
use crate::tables::{artifact_rows, record_id, render_record, JsonTable, Record};
use anyhow::{bail, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub struct CasesStage {
    config: TestforgeConfig,
}

impl CasesStage {
    pub fn new(config: TestforgeConfig) -> Self {
        Self { config }
    }

    fn generator_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are a senior financial application tester who can write good test cases given \
             the requirements and the test scenarios.",
            "You are required to carefully understand the requirements and the test scenario \
             provided as **Input** and do the following:\n\
             1. Create an exhaustive list of test cases for the given scenario based on the \
             given requirements.\n\
             2. Keep each test case comprehensive and independent, with the necessary steps \
             required to test effectively.\n\
             3. **DO NOT** generate cases for any other test scenario than the scenario \
             provided as **Input**.\n\
             4. List them in the format required.\n\n\
             Input:\n{input}",
        )
    }

    fn verifier_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test case verifier for a financial application. You understand \
             the nuances of the requirements provided.",
            "You are required to carefully understand the requirements, the test scenario \
             provided and the test cases attached below.\n\
             1. Verify the candidate and provide a score of the correctness of the output.\n\n\
             Test scenario:\n{input}\n\nCandidate output:\n{candidate}",
        )
    }
}

#[async_trait]
impl PipelineStage for CasesStage {
    fn name(&self) -> &'static str {
        "cases"
    }

    async fn execute(&self, options: &StageOptions) -> Result<StageReport> {
        info!("Generating test cases");

        let input_rows = JsonTable::new(&self.config.scenarios_file).read_records()?;
        if input_rows.is_empty() {
            bail!(
                "No scenarios found at {}; run the scenarios stage first",
                self.config.scenarios_file.display()
            );
        }

        let providers = prepare_providers(&self.config, StageKind::Cases, options).await?;

        let generator_task = Self::generator_template();
        let verifier_task = Self::verifier_template();

        let generation = GenerationPlan {
            provider: providers.generator.as_ref(),
            template: &generator_task,
            schema: cases::contract(),
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
        bar.set_prefix("cases");

        let mut report = StageReport::new(self.name());
        let mut accumulated: Vec<Record> = Vec::new();

        for (index, row) in input_rows[start..end].iter().enumerate() {
            let scenario_id = record_id(row, "combo_id")
                .unwrap_or_else(|| format!("record-{}", start + index));
            bar.set_message(scenario_id.clone());
            info!(
                "Generating cases for scenario {} ({}/{})",
                scenario_id,
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
                    accumulated.extend(rows);
                }
                _ => {
                    warn!(
                        "Scenario {} not resolved after {} attempts",
                        scenario_id, outcome.attempts
                    );
                    report.unresolved.push(scenario_id);
                }
            }
            bar.inc(1);
        }
        bar.finish_with_message("done");

        JsonTable::new(&self.config.cases_file).write_records(&accumulated)?;
        info!(
            "Wrote {} test cases to {}",
            accumulated.len(),
            self.config.cases_file.display()
        );

        Ok(report)
    }
}
