//! Retry/verify controller
//!
//! State machine per record: Drafting renders the task prompt and calls the
//! generator; Validating checks the response against the schema contract;
//! Verifying (optional) asks a second model to judge the candidate. A
//! rejection feeds correction text back into the next draft; a schema
//! violation redrafts immediately without consuming a verifier call. The
//! attempt budget bounds the whole loop, and exhaustion returns the last
//! artifact with an explicit not-accepted marker rather than failing or
//! silently accepting.

use crate::ai::error::ProviderError;
use crate::ai::provider::{Provider, SessionPolicy};
use crate::prompt::{PromptBindings, TaskTemplate};
use crate::schema::{Artifact, SchemaContract};
use tracing::{debug, info, warn};

/// Score at or above which a threshold-style verdict accepts the candidate
pub const DEFAULT_SCORE_GATE: i64 = 70;

/// How a verifier's output is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStyle {
    /// Numeric score against a gate; rejection carries no feedback, so the
    /// next attempt is a blind retry
    Threshold { min_score: i64 },
    /// Boolean correctness plus correction text threaded into the next draft
    Boolean,
}

/// An interpreted verification verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub feedback: Option<String>,
}

impl VerdictStyle {
    /// Interprets a schema-valid verifier artifact.
    ///
    /// Total: a verdict payload missing its expected fields counts as a
    /// rejection with no feedback, logged, never a crash.
    pub fn interpret(&self, verdict: &Artifact) -> Verdict {
        match self {
            VerdictStyle::Threshold { min_score } => {
                let score = verdict.field("overall_score").and_then(|v| v.as_i64());
                match score {
                    Some(score) => Verdict {
                        accepted: score >= *min_score,
                        feedback: None,
                    },
                    None => {
                        warn!("Threshold verdict without an overall_score field");
                        Verdict {
                            accepted: false,
                            feedback: None,
                        }
                    }
                }
            }
            VerdictStyle::Boolean => {
                // Both field spellings appear across verifier schemas
                let correct = verdict
                    .field("correctness")
                    .or_else(|| verdict.field("isCorrect"))
                    .and_then(|v| v.as_bool());
                let correction = verdict
                    .field("correction")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .filter(|s| !s.trim().is_empty());

                match correct {
                    Some(true) => Verdict {
                        accepted: true,
                        feedback: None,
                    },
                    Some(false) => Verdict {
                        accepted: false,
                        feedback: correction,
                    },
                    None => {
                        warn!("Boolean verdict without a correctness field");
                        Verdict {
                            accepted: false,
                            feedback: correction,
                        }
                    }
                }
            }
        }
    }
}

/// What happened to one draft
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Response failed schema validation; redrafted immediately
    Invalid(String),
    /// Schema-valid but rejected by the verifier
    Rejected { correction: Option<String> },
    Accepted,
}

/// Ephemeral record of one try.
///
/// Lives only for the duration of one controller run; never persisted.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub index: u32,
    pub prompt: String,
    pub raw_response: Option<String>,
    pub outcome: AttemptOutcome,
}

/// Generator side of the loop
pub struct GenerationPlan<'a> {
    pub provider: &'a dyn Provider,
    pub template: &'a TaskTemplate,
    pub schema: SchemaContract,
    pub session: SessionPolicy,
}

/// Verifier side of the loop
pub struct VerificationPlan<'a> {
    pub provider: &'a dyn Provider,
    pub template: &'a TaskTemplate,
    pub schema: SchemaContract,
    pub style: VerdictStyle,
}

/// Result of one controller run over a single record
#[derive(Debug)]
pub struct ControllerOutcome {
    /// Most recent schema-valid artifact, if any attempt produced one
    pub artifact: Option<Artifact>,
    /// True only when the configured gate (schema, plus verifier when
    /// enabled) was passed. Stages must check this before persisting.
    pub accepted: bool,
    /// Attempts consumed
    pub attempts: u32,
}

impl ControllerOutcome {
    fn exhausted(artifact: Option<Artifact>, attempts: u32) -> Self {
        Self {
            artifact,
            accepted: false,
            attempts,
        }
    }

    fn accepted(artifact: Artifact, attempts: u32) -> Self {
        Self {
            artifact: Some(artifact),
            accepted: true,
            attempts,
        }
    }
}

/// Drives the Drafting/Validating/Verifying loop for one record at a time
pub struct RetryVerifyController<'a> {
    generation: GenerationPlan<'a>,
    verification: Option<VerificationPlan<'a>>,
    max_attempts: u32,
}

impl<'a> RetryVerifyController<'a> {
    pub fn new(
        generation: GenerationPlan<'a>,
        verification: Option<VerificationPlan<'a>>,
        max_attempts: u32,
    ) -> Self {
        Self {
            generation,
            verification,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs the loop with the given record bindings.
    ///
    /// Fatal provider errors propagate; a self-hosted content failure is an
    /// exhausted-equivalent outcome, not an error.
    pub async fn resolve(
        &self,
        mut bindings: PromptBindings,
    ) -> Result<ControllerOutcome, ProviderError> {
        let mut last_artifact: Option<Artifact> = None;
        let mut feedback: Option<String> = None;
        let mut attempts: Vec<GenerationAttempt> = Vec::new();

        for attempt in 1..=self.max_attempts {
            // Drafting
            bindings.set_feedback(feedback.take());
            let prompt = self.generation.template.render(&bindings);
            debug!(
                "Attempt {}/{}: drafting with prompt of {} chars",
                attempt,
                self.max_attempts,
                prompt.len()
            );

            let raw = match self
                .generation
                .provider
                .converse(&prompt, Some(&self.generation.schema), self.generation.session)
                .await
            {
                Ok(raw) => raw,
                Err(ProviderError::ContentFailure { attempts }) => {
                    warn!(
                        "Generator gave up after {} content attempts; treating as exhausted",
                        attempts
                    );
                    return Ok(ControllerOutcome::exhausted(last_artifact, attempt));
                }
                Err(e) => return Err(e),
            };

            // Validating
            let artifact = match self.generation.schema.validate(&raw) {
                Ok(artifact) => artifact,
                Err(violation) => {
                    warn!(
                        "Attempt {} failed schema validation: {}; redrafting",
                        attempt, violation
                    );
                    attempts.push(GenerationAttempt {
                        index: attempt,
                        prompt,
                        raw_response: Some(raw),
                        outcome: AttemptOutcome::Invalid(violation.to_string()),
                    });
                    continue;
                }
            };
            last_artifact = Some(artifact.clone());

            // Verifying
            let Some(verification) = &self.verification else {
                return Ok(ControllerOutcome::accepted(artifact, attempt));
            };

            let mut verifier_bindings = bindings.clone();
            verifier_bindings.set_feedback(None);
            verifier_bindings.set("candidate", artifact.render());
            let verifier_prompt = verification.template.render(&verifier_bindings);

            let verdict_raw = verification
                .provider
                .converse(
                    &verifier_prompt,
                    Some(&verification.schema),
                    SessionPolicy::Fresh,
                )
                .await?;

            let verdict = match verification.schema.validate(&verdict_raw) {
                Ok(verdict_artifact) => verification.style.interpret(&verdict_artifact),
                Err(violation) => {
                    warn!("Verifier produced an invalid verdict: {}", violation);
                    Verdict {
                        accepted: false,
                        feedback: None,
                    }
                }
            };

            if verdict.accepted {
                info!("Attempt {} accepted by verifier", attempt);
                return Ok(ControllerOutcome::accepted(artifact, attempt));
            }

            info!(
                "Attempt {} rejected by verifier{}",
                attempt,
                if verdict.feedback.is_some() {
                    " with correction"
                } else {
                    ""
                }
            );
            attempts.push(GenerationAttempt {
                index: attempt,
                prompt,
                raw_response: Some(raw),
                outcome: AttemptOutcome::Rejected {
                    correction: verdict.feedback.clone(),
                },
            });
            feedback = verdict.feedback;
        }

        for record in &attempts {
            debug!(
                "Attempt {} ended as {}",
                record.index,
                match &record.outcome {
                    AttemptOutcome::Invalid(violation) => format!("invalid: {}", violation),
                    AttemptOutcome::Rejected { correction: Some(_) } =>
                        "rejected with correction".to_string(),
                    AttemptOutcome::Rejected { correction: None } => "rejected".to_string(),
                    AttemptOutcome::Accepted => "accepted".to_string(),
                }
            );
        }

        Ok(ControllerOutcome::exhausted(last_artifact, self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{MockProvider, MockReply};
    use crate::schema::{FieldKind, FieldSpec, ObjectSpec};
    use serde_json::json;

    static NOTE: ObjectSpec = ObjectSpec {
        name: "note",
        fields: &[FieldSpec {
            name: "value",
            kind: FieldKind::Text,
            guidance: "",
        }],
    };

    static SCORE_VERDICT: ObjectSpec = ObjectSpec {
        name: "score_verdict",
        fields: &[FieldSpec {
            name: "overall_score",
            kind: FieldKind::Integer,
            guidance: "",
        }],
    };

    static BOOL_VERDICT: ObjectSpec = ObjectSpec {
        name: "bool_verdict",
        fields: &[
            FieldSpec {
                name: "correctness",
                kind: FieldKind::Flag,
                guidance: "",
            },
            FieldSpec {
                name: "correction",
                kind: FieldKind::Text,
                guidance: "",
            },
        ],
    };

    fn note(value: &str) -> String {
        json!({ "value": value }).to_string()
    }

    fn template() -> TaskTemplate {
        TaskTemplate::new("You are a generator.", "Produce a note for {record}.")
    }

    fn verifier_template() -> TaskTemplate {
        TaskTemplate::new("You are a verifier.", "Judge this candidate:\n{candidate}")
    }

    fn bindings() -> PromptBindings {
        PromptBindings::new().bind("record", "R-1")
    }

    fn generation<'a>(
        provider: &'a MockProvider,
        template: &'a TaskTemplate,
    ) -> GenerationPlan<'a> {
        GenerationPlan {
            provider,
            template,
            schema: SchemaContract::new(&NOTE),
            session: SessionPolicy::Reuse,
        }
    }

    fn verification<'a>(
        provider: &'a MockProvider,
        template: &'a TaskTemplate,
        schema: &'static ObjectSpec,
        style: VerdictStyle,
    ) -> VerificationPlan<'a> {
        VerificationPlan {
            provider,
            template,
            schema: SchemaContract::new(schema),
            style,
        }
    }

    #[tokio::test]
    async fn test_accepts_first_valid_artifact_without_verifier() {
        let generator = MockProvider::new();
        generator.enqueue(MockReply::text(note("hello")));

        let task = template();
        let controller = RetryVerifyController::new(generation(&generator, &task), None, 3);
        let outcome = controller.resolve(bindings()).await.unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(generator.call_count(), 1);
        assert_eq!(
            outcome.artifact.unwrap().field("value").unwrap(),
            &json!("hello")
        );
    }

    #[tokio::test]
    async fn test_schema_violation_redrafts_without_verifier_call() {
        let generator = MockProvider::new();
        generator.enqueue(MockReply::text("not json at all"));
        generator.enqueue(MockReply::text(note("second try")));

        let verifier = MockProvider::new();
        verifier.enqueue(MockReply::text(json!({ "overall_score": 95 }).to_string()));

        let verifier_task = verifier_template();
        let verification = verification(
            &verifier,
            &verifier_task,
            &SCORE_VERDICT,
            VerdictStyle::Threshold {
                min_score: DEFAULT_SCORE_GATE,
            },
        );

        let task = template();
        let controller =
            RetryVerifyController::new(generation(&generator, &task), Some(verification), 3);
        let outcome = controller.resolve(bindings()).await.unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(generator.call_count(), 2);
        // the malformed draft must not have consumed a verifier call
        assert_eq!(verifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_always_rejecting_verifier_exhausts_budget_with_feedback_threading() {
        let budget = 3;
        let generator = MockProvider::new();
        let verifier = MockProvider::new();
        for i in 1..=budget {
            generator.enqueue(MockReply::text(note(&format!("draft {}", i))));
            verifier.enqueue(MockReply::text(
                json!({
                    "correctness": false,
                    "correction": format!("correction #{}", i)
                })
                .to_string(),
            ));
        }

        let verifier_task = verifier_template();
        let verification = verification(&verifier, &verifier_task, &BOOL_VERDICT, VerdictStyle::Boolean);

        let task = template();
        let controller =
            RetryVerifyController::new(generation(&generator, &task), Some(verification), budget);
        let outcome = controller.resolve(bindings()).await.unwrap();

        assert!(!outcome.accepted);
        assert_eq!(outcome.attempts, budget);
        assert_eq!(generator.call_count(), budget as usize);
        assert_eq!(verifier.call_count(), budget as usize);

        // exhaustion still hands back the most recent artifact
        assert_eq!(
            outcome.artifact.unwrap().field("value").unwrap(),
            &json!("draft 3")
        );

        // every attempt after the first carries the immediately-preceding correction
        let prompts = generator.prompts();
        assert!(!prompts[0].contains("correction #"));
        for (idx, prompt) in prompts.iter().enumerate().skip(1) {
            assert!(
                prompt.contains(&format!("correction #{}", idx)),
                "prompt {} missing correction #{}",
                idx + 1,
                idx
            );
        }
    }

    #[tokio::test]
    async fn test_verifier_accepts_at_attempt_k_stops_calls() {
        let generator = MockProvider::new();
        let verifier = MockProvider::new();
        for i in 1..=3u32 {
            generator.enqueue(MockReply::text(note(&format!("draft {}", i))));
        }
        verifier.enqueue(MockReply::text(
            json!({ "correctness": false, "correction": "wrong totals" }).to_string(),
        ));
        verifier.enqueue(MockReply::text(
            json!({ "correctness": true, "correction": "" }).to_string(),
        ));

        let verifier_task = verifier_template();
        let verification = verification(&verifier, &verifier_task, &BOOL_VERDICT, VerdictStyle::Boolean);

        let task = template();
        let controller =
            RetryVerifyController::new(generation(&generator, &task), Some(verification), 5);
        let outcome = controller.resolve(bindings()).await.unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 2);
        // no further provider calls past the accepting attempt
        assert_eq!(generator.call_count(), 2);
        assert_eq!(verifier.call_count(), 2);
        assert_eq!(
            outcome.artifact.unwrap().field("value").unwrap(),
            &json!("draft 2")
        );
    }

    #[tokio::test]
    async fn test_threshold_rejection_is_a_blind_retry() {
        let generator = MockProvider::new();
        let verifier = MockProvider::new();
        generator.enqueue(MockReply::text(note("draft 1")));
        generator.enqueue(MockReply::text(note("draft 2")));
        verifier.enqueue(MockReply::text(json!({ "overall_score": 40 }).to_string()));
        verifier.enqueue(MockReply::text(json!({ "overall_score": 70 }).to_string()));

        let verifier_task = verifier_template();
        let verification = verification(
            &verifier,
            &verifier_task,
            &SCORE_VERDICT,
            VerdictStyle::Threshold {
                min_score: DEFAULT_SCORE_GATE,
            },
        );

        let task = template();
        let controller =
            RetryVerifyController::new(generation(&generator, &task), Some(verification), 3);
        let outcome = controller.resolve(bindings()).await.unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 2);
        // threshold style carries no correction text into the retry
        let prompts = generator.prompts();
        assert!(!prompts[1].contains("previous attempt"));
    }

    #[tokio::test]
    async fn test_content_failure_is_exhausted_equivalent() {
        let generator = MockProvider::new();
        generator.enqueue(MockReply::error(ProviderError::ContentFailure {
            attempts: 3,
        }));

        let task = template();
        let controller = RetryVerifyController::new(generation(&generator, &task), None, 3);
        let outcome = controller.resolve(bindings()).await.unwrap();

        assert!(!outcome.accepted);
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_fatal_provider_error_propagates() {
        let generator = MockProvider::new();
        generator.enqueue(MockReply::error(ProviderError::AuthenticationError {
            message: "bad key".to_string(),
        }));

        let task = template();
        let controller = RetryVerifyController::new(generation(&generator, &task), None, 3);
        let result = controller.resolve(bindings()).await;
        assert!(matches!(
            result,
            Err(ProviderError::AuthenticationError { .. })
        ));
    }

    #[test]
    fn test_verdict_interpretation_edge_cases() {
        let contract = SchemaContract::new(&SCORE_VERDICT);
        let at_gate = contract
            .validate(&json!({ "overall_score": 70 }).to_string())
            .unwrap();
        let verdict = VerdictStyle::Threshold { min_score: 70 }.interpret(&at_gate);
        assert!(verdict.accepted);

        let below = contract
            .validate(&json!({ "overall_score": 69 }).to_string())
            .unwrap();
        let verdict = VerdictStyle::Threshold { min_score: 70 }.interpret(&below);
        assert!(!verdict.accepted);
        assert!(verdict.feedback.is_none());
    }

    #[test]
    fn test_boolean_verdict_accepts_is_correct_spelling() {
        static ALT_VERDICT: ObjectSpec = ObjectSpec {
            name: "alt_verdict",
            fields: &[FieldSpec {
                name: "isCorrect",
                kind: FieldKind::Flag,
                guidance: "",
            }],
        };
        let contract = SchemaContract::new(&ALT_VERDICT);
        let artifact = contract
            .validate(&json!({ "isCorrect": true }).to_string())
            .unwrap();
        assert!(VerdictStyle::Boolean.interpret(&artifact).accepted);
    }
}
