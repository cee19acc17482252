//! Expected-result stage
//!
//! Walks the step table of each test case in order and generates the
//! collateral summary snapshot after every step. The accepted snapshot of
//! step N-1 is threaded into step N's prompt as the previous state, so the
//! model accumulates the waterfall instead of recomputing it blind.
//! Verification is boolean: a rejection's correction text feeds the next
//! attempt.

use crate::ai::provider::SessionPolicy;
use crate::config::TestforgeConfig;
use crate::domain::{outputs, verdicts};
use crate::pipeline::controller::{
    GenerationPlan, RetryVerifyController, VerdictStyle, VerificationPlan,
};
use crate::pipeline::stage_trait::{PipelineStage, StageOptions, StageReport};
use crate::pipeline::stages::{prepare_providers, StageKind};
use crate::prompt::{PromptBindings, TaskTemplate};
use crate::tables::{artifact_rows, record_id, render_record, JsonTable, Region, RegionBook};
use anyhow::{bail, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub struct OutputsStage {
    config: TestforgeConfig,
}

impl OutputsStage {
    pub fn new(config: TestforgeConfig) -> Self {
        Self { config }
    }

    fn generator_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are a senior financial application tester who can derive the expected \
             collateral allocation summary for a test step, given the requirements and the \
             executed steps.",
            "You are required to carefully understand the requirements and the test step \
             provided as **Input** and do the following:\n\
             1. Produce the expected collateral summary after this step is executed, one line \
             per unique combination of the key fields.\n\
             2. Start from the state after the previous step and apply only this step's \
             transaction to it.\n\
             3. Respect the allocation waterfall: MLN first, then compliance, capital cushion \
             and payin obligations, then requested allocations in priority order.\n\
             4. **DO NOT** produce output for any other step than the step provided as \
             **Input**.\n\n\
             Input:\n{input}\n\n\
             State after the previous step:\n{previous_state}",
        )
    }

    fn verifier_template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test case verifier for a financial application. You understand \
             the nuances of the requirements provided.",
            "You are required to carefully understand the requirements, the test step provided \
             and the expected result attached below.\n\
             1. Judge whether the expected result is correct; if not, explain exactly what is \
             wrong.\n\n\
             Test step:\n{input}\n\n\
             State after the previous step:\n{previous_state}\n\n\
             Candidate output:\n{candidate}",
        )
    }
}

#[async_trait]
impl PipelineStage for OutputsStage {
    fn name(&self) -> &'static str {
        "outputs"
    }

    async fn execute(&self, options: &StageOptions) -> Result<StageReport> {
        info!("Generating expected outputs");

        let case_rows = JsonTable::new(&self.config.cases_file).read_records()?;
        if case_rows.is_empty() {
            bail!(
                "No test cases found at {}; run the cases stage first",
                self.config.cases_file.display()
            );
        }

        let providers = prepare_providers(&self.config, StageKind::Outputs, options).await?;

        let generator_task = Self::generator_template();
        let verifier_task = Self::verifier_template();

        let generation = GenerationPlan {
            provider: providers.generator.as_ref(),
            template: &generator_task,
            schema: outputs::contract(),
            session: SessionPolicy::Reuse,
        };
        let verification = providers.verifier.as_deref().map(|verifier| VerificationPlan {
            provider: verifier,
            template: &verifier_task,
            schema: verdicts::boolean_contract(),
            style: VerdictStyle::Boolean,
        });

        let controller =
            RetryVerifyController::new(generation, verification, providers.tuning.tries);

        let (start, end) = options.clamp_range(case_rows.len());
        let mut report = StageReport::new(self.name());

        for (case_index, case_row) in case_rows[start..end].iter().enumerate() {
            let case_id = record_id(case_row, "test_case_id")
                .unwrap_or_else(|| format!("record-{}", start + case_index));

            let step_rows = JsonTable::new(self.config.steps_file(&case_id)).read_records()?;
            if step_rows.is_empty() {
                warn!("No steps found for test case {}; skipping", case_id);
                report.unresolved.push(case_id);
                continue;
            }

            let bar = ProgressBar::new(step_rows.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{prefix:>9} [{bar:40}] {pos}/{len} {msg}")
                    .expect("static template")
                    .progress_chars("=> "),
            );
            bar.set_prefix("outputs");
            bar.set_message(case_id.clone());

            let book = RegionBook::new(self.config.expected_output_file(&case_id));
            // Snapshot accumulates step over step within one test case
            let mut previous_state = String::from("{}");

            for step_row in &step_rows {
                let step_no =
                    record_id(step_row, "step").unwrap_or_else(|| "0".to_string());
                info!("Generating expected output for {} step {}", case_id, step_no);

                let bindings = PromptBindings::new()
                    .bind("input", render_record(step_row))
                    .bind("previous_state", previous_state.clone())
                    .with_extra_instructions(options.instructions.clone());

                let outcome = controller.resolve(bindings).await?;
                match outcome.artifact {
                    Some(artifact) if outcome.accepted => {
                        let rows = artifact_rows(artifact.value());
                        report.produced += rows.len();
                        book.write_region(Region {
                            start_marker: format!("STEP-{}-BEGIN", step_no),
                            end_marker: format!("STEP-{}-END", step_no),
                            rows,
                        })?;
                        previous_state = artifact.render();
                    }
                    _ => {
                        warn!(
                            "{} step {} not resolved after {} attempts",
                            case_id, step_no, outcome.attempts
                        );
                        report.unresolved.push(format!("{}/step-{}", case_id, step_no));
                        // later steps would compound a wrong baseline
                        bar.abandon_with_message("aborted");
                        break;
                    }
                }
                bar.inc(1);
            }

            if bar.position() == step_rows.len() as u64 {
                bar.finish_with_message("done");
                info!(
                    "Wrote expected outputs for {} to {}",
                    case_id,
                    self.config.expected_output_file(&case_id).display()
                );
            }
        }

        Ok(report)
    }
}
