//! Verifier verdict schemas
//!
//! Two verdict shapes coexist across the stages: a numeric score against a
//! gate, and a boolean correctness flag with correction text that feeds the
//! next generation attempt.

use crate::schema::{FieldKind, FieldSpec, ObjectSpec, SchemaContract};

static SCORE_VERDICT: ObjectSpec = ObjectSpec {
    name: "score_verdict",
    fields: &[
        FieldSpec {
            name: "overall_score",
            kind: FieldKind::Integer,
            guidance: "A score out of 100 for the correctness of the input",
        },
        FieldSpec {
            name: "rationale",
            kind: FieldKind::Text,
            guidance: "The reasons for this score; what reduced it",
        },
    ],
};

static BOOLEAN_VERDICT: ObjectSpec = ObjectSpec {
    name: "boolean_verdict",
    fields: &[
        FieldSpec {
            name: "correctness",
            kind: FieldKind::Flag,
            guidance: "Whether the output is correct or not",
        },
        FieldSpec {
            name: "correction",
            kind: FieldKind::Text,
            guidance: "If incorrect, what is wrong. Keep it empty when the result is correct",
        },
    ],
};

/// Threshold-style verdict: score out of 100
pub fn score_contract() -> SchemaContract {
    SchemaContract::new(&SCORE_VERDICT)
}

/// Boolean-style verdict: correctness plus correction feedback
pub fn boolean_contract() -> SchemaContract {
    SchemaContract::new(&BOOLEAN_VERDICT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_verdict_validates() {
        let candidate = json!({
            "overall_score": 85,
            "rationale": "Combinations cover all core dimensions"
        })
        .to_string();
        assert!(score_contract().validate(&candidate).is_ok());
    }

    #[test]
    fn test_boolean_verdict_validates() {
        let candidate = json!({
            "correctness": false,
            "correction": "The cumulative amount in step 3 ignores the step 2 de-allocation"
        })
        .to_string();
        assert!(boolean_contract().validate(&candidate).is_ok());
    }
}
