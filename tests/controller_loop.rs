//! End-to-end controller loop tests over scripted providers
//!
//! Exercises the public crate surface the way a stage does: domain schema
//! contracts, prompt templates, verdict interpretation and the retry/verify
//! loop, with providers replaced by scripted mocks.

use serde_json::json;
use testforge::ai::{MockProvider, MockReply};
use testforge::ai::provider::SessionPolicy;
use testforge::domain::{scenarios, verdicts};
use testforge::pipeline::{
    GenerationPlan, RetryVerifyController, VerdictStyle, VerificationPlan,
};
use testforge::prompt::{PromptBindings, TaskTemplate};

fn scenario_payload(tag: &str) -> String {
    json!({
        "output": [{
            "combo_id": format!("SC-{}", tag),
            "combo_description": [
                {"dimension": "Allocation Level", "value": "Member"}
            ],
            "criticality": "HIGH",
            "traceability": "REQ-1"
        }]
    })
    .to_string()
}

fn generator_task() -> TaskTemplate {
    TaskTemplate::new(
        "You are an expert test designer.",
        "Create scenario combinations from the dimensions in:\n{input}",
    )
}

fn verifier_task() -> TaskTemplate {
    TaskTemplate::new(
        "You are an expert verifier.",
        "Judge the candidate:\n{candidate}",
    )
}

#[tokio::test]
async fn budget_three_with_acceptance_on_third_attempt() {
    let generator = MockProvider::new();
    let verifier = MockProvider::new();

    for tag in ["001", "002", "003"] {
        generator.enqueue(MockReply::text(scenario_payload(tag)));
    }
    verifier.enqueue(MockReply::text(
        json!({"correctness": false, "correction": "SC ids must be sequential"}).to_string(),
    ));
    verifier.enqueue(MockReply::text(
        json!({"correctness": false, "correction": "criticality must reflect coverage"})
            .to_string(),
    ));
    verifier.enqueue(MockReply::text(
        json!({"correctness": true, "correction": ""}).to_string(),
    ));

    let generator_template = generator_task();
    let verifier_template = verifier_task();

    let generation = GenerationPlan {
        provider: &generator,
        template: &generator_template,
        schema: scenarios::contract(),
        session: SessionPolicy::Reuse,
    };
    let verification = VerificationPlan {
        provider: &verifier,
        template: &verifier_template,
        schema: verdicts::boolean_contract(),
        style: VerdictStyle::Boolean,
    };

    let controller = RetryVerifyController::new(generation, Some(verification), 3);
    let bindings = PromptBindings::new().bind("input", "[dimensions table]");
    let outcome = controller.resolve(bindings).await.unwrap();

    // exactly 3 generation calls and 3 verification calls
    assert_eq!(generator.call_count(), 3);
    assert_eq!(verifier.call_count(), 3);

    // the accepted artifact is attempt 3's payload
    assert!(outcome.accepted);
    assert_eq!(outcome.attempts, 3);
    let artifact = outcome.artifact.unwrap();
    assert_eq!(
        artifact.value()["output"][0]["combo_id"],
        json!("SC-003")
    );

    // each regenerated prompt carries the immediately-preceding correction
    let prompts = generator.prompts();
    assert!(prompts[1].contains("SC ids must be sequential"));
    assert!(prompts[2].contains("criticality must reflect coverage"));
    assert!(!prompts[0].contains("previous attempt"));
}

#[tokio::test]
async fn threshold_verifier_gates_at_seventy() {
    let generator = MockProvider::new();
    let verifier = MockProvider::new();

    generator.enqueue(MockReply::text(scenario_payload("001")));
    generator.enqueue(MockReply::text(scenario_payload("002")));
    verifier.enqueue(MockReply::text(
        json!({"overall_score": 55, "rationale": "missing reverse-order combos"}).to_string(),
    ));
    verifier.enqueue(MockReply::text(
        json!({"overall_score": 82, "rationale": "coverage is adequate"}).to_string(),
    ));

    let generator_template = generator_task();
    let verifier_template = verifier_task();

    let generation = GenerationPlan {
        provider: &generator,
        template: &generator_template,
        schema: scenarios::contract(),
        session: SessionPolicy::Reuse,
    };
    let verification = VerificationPlan {
        provider: &verifier,
        template: &verifier_template,
        schema: verdicts::score_contract(),
        style: VerdictStyle::Threshold { min_score: 70 },
    };

    let controller = RetryVerifyController::new(generation, Some(verification), 3);
    let outcome = controller
        .resolve(PromptBindings::new().bind("input", "[dimensions table]"))
        .await
        .unwrap();

    assert!(outcome.accepted);
    assert_eq!(outcome.attempts, 2);
    // threshold rejections retry blind: no feedback label in the second prompt
    assert!(!generator.prompts()[1].contains("previous attempt"));
}

#[tokio::test]
async fn exhaustion_reports_unverified_artifact() {
    let generator = MockProvider::new();
    let verifier = MockProvider::new();

    generator.enqueue(MockReply::text(scenario_payload("001")));
    generator.enqueue(MockReply::text(scenario_payload("002")));
    for _ in 0..2 {
        verifier.enqueue(MockReply::text(
            json!({"overall_score": 10, "rationale": "wrong"}).to_string(),
        ));
    }

    let generator_template = generator_task();
    let verifier_template = verifier_task();

    let generation = GenerationPlan {
        provider: &generator,
        template: &generator_template,
        schema: scenarios::contract(),
        session: SessionPolicy::Reuse,
    };
    let verification = VerificationPlan {
        provider: &verifier,
        template: &verifier_template,
        schema: verdicts::score_contract(),
        style: VerdictStyle::Threshold { min_score: 70 },
    };

    let controller = RetryVerifyController::new(generation, Some(verification), 2);
    let outcome = controller
        .resolve(PromptBindings::new().bind("input", "x"))
        .await
        .unwrap();

    // never silently accepted: the marker is explicit, the artifact is the
    // most recent draft
    assert!(!outcome.accepted);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.artifact.unwrap().value()["output"][0]["combo_id"],
        json!("SC-002")
    );
}
