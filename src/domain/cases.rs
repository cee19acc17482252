//! Test case artifact schema

use crate::schema::{FieldKind, FieldSpec, ObjectSpec, SchemaContract};

static CASE_STEP: ObjectSpec = ObjectSpec {
    name: "case_step",
    fields: &[
        FieldSpec {
            name: "step",
            kind: FieldKind::Integer,
            guidance: "Step number within the sequence of steps to be executed",
        },
        FieldSpec {
            name: "collateralGroup",
            kind: FieldKind::TextList,
            guidance: "The collateral groups to be used for this test case",
        },
        FieldSpec {
            name: "collateralComponent",
            kind: FieldKind::Text,
            guidance: "The collateral component used for this test case",
        },
        FieldSpec {
            name: "isFungible",
            kind: FieldKind::TextList,
            guidance: "The fungibility variants of the collaterals used for this test case",
        },
    ],
};

static TEST_CASE: ObjectSpec = ObjectSpec {
    name: "test_case",
    fields: &[
        FieldSpec {
            name: "test_scenario_id",
            kind: FieldKind::Text,
            guidance: "Reference to the combo id from the test scenarios input; the trace back \
                       to the scenario",
        },
        FieldSpec {
            name: "test_case_id",
            kind: FieldKind::Text,
            guidance: "Unique id in the format TC-0001, TC-0002 etc",
        },
        FieldSpec {
            name: "test_description",
            kind: FieldKind::Text,
            guidance: "Detailed description covering the overall scenario, MLN cash and \
                       non-cash coverage, compliance requirement coverage and capital cushion \
                       coverage",
        },
        FieldSpec {
            name: "key_validation",
            kind: FieldKind::Text,
            guidance: "Key validations for this test case as bullet points prefixed by *",
        },
        FieldSpec {
            name: "segment_scope",
            kind: FieldKind::Text,
            guidance: "Whether single segment or multiple segments",
        },
        FieldSpec {
            name: "order",
            kind: FieldKind::Text,
            guidance: "Forward (priority order) or Reverse (reverse priority order)",
        },
        FieldSpec {
            name: "test_steps",
            kind: FieldKind::ListOf(&CASE_STEP),
            guidance: "The sequence of steps that verify the test case. Use all applicable \
                       collateral types per the static data and keep good coverage of the \
                       relevant ones",
        },
        FieldSpec {
            name: "memberCode",
            kind: FieldKind::Text,
            guidance: "Member code from the masters data for whom the test case is generated. \
                       DO NOT repeat member codes; each test case gets a unique one",
        },
    ],
};

static CASE_LIST: ObjectSpec = ObjectSpec {
    name: "test_case_list",
    fields: &[FieldSpec {
        name: "output",
        kind: FieldKind::ListOf(&TEST_CASE),
        guidance: "All test cases generated for the given scenario",
    }],
};

pub fn contract() -> SchemaContract {
    SchemaContract::new(&CASE_LIST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_artifact_validates() {
        let candidate = json!({
            "output": [{
                "test_scenario_id": "SC-001",
                "test_case_id": "TC-0001",
                "test_description": "Insufficient MLN coverage across segments",
                "key_validation": "* MLN blocked first\n* No partial allocation",
                "segment_scope": "Multiple",
                "order": "Forward",
                "test_steps": [{
                    "step": 1,
                    "collateralGroup": ["CASH"],
                    "collateralComponent": "CASH",
                    "isFungible": ["True"]
                }],
                "memberCode": "A001"
            }]
        })
        .to_string();

        assert!(contract().validate(&candidate).is_ok());
    }

    #[test]
    fn test_case_step_with_scalar_group_rejected() {
        let candidate = json!({
            "output": [{
                "test_scenario_id": "SC-001",
                "test_case_id": "TC-0001",
                "test_description": "d",
                "key_validation": "",
                "segment_scope": "Single",
                "order": "Forward",
                "test_steps": [{
                    "step": 1,
                    "collateralGroup": "CASH",
                    "collateralComponent": "CASH",
                    "isFungible": ["True"]
                }],
                "memberCode": "A001"
            }]
        })
        .to_string();

        assert!(contract().validate(&candidate).is_err());
    }
}
