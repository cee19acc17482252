//! Test scenario (dimension combination) artifact schema

use crate::schema::{FieldKind, FieldSpec, ObjectSpec, SchemaContract};

static COMBO_VALUE: ObjectSpec = ObjectSpec {
    name: "combo_value",
    fields: &[
        FieldSpec {
            name: "dimension",
            kind: FieldKind::Text,
            guidance: "Dimension applicable. Use consistent naming throughout",
        },
        FieldSpec {
            name: "value",
            kind: FieldKind::Text,
            guidance: "Value applicable to the dimension. Use consistent naming throughout",
        },
    ],
};

static TEST_SCENARIO: ObjectSpec = ObjectSpec {
    name: "test_scenario",
    fields: &[
        FieldSpec {
            name: "combo_id",
            kind: FieldKind::Text,
            guidance: "Unique identifier for the combination, numbered SC-001, SC-002 etc",
        },
        FieldSpec {
            name: "combo_description",
            kind: FieldKind::ListOf(&COMBO_VALUE),
            guidance: "The list of combination values of dimensions",
        },
        FieldSpec {
            name: "criticality",
            kind: FieldKind::Choice(&["HIGH", "MEDIUM", "LOW"]),
            guidance: "Criticality of the combination for test coverage. HIGH: absolutely \
                       critical to test, failing which the application cannot be considered \
                       tested. MEDIUM: important but less critical. LOW: low importance for \
                       the general functioning of the application. No other value is allowed",
        },
        FieldSpec {
            name: "traceability",
            kind: FieldKind::Text,
            guidance: "Comma-separated references to the requirements the combination is \
                       derived from",
        },
    ],
};

static SCENARIO_LIST: ObjectSpec = ObjectSpec {
    name: "test_scenario_list",
    fields: &[FieldSpec {
        name: "output",
        kind: FieldKind::ListOf(&TEST_SCENARIO),
        guidance: "All the test combination sets",
    }],
};

pub fn contract() -> SchemaContract {
    SchemaContract::new(&SCENARIO_LIST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_artifact_validates() {
        let candidate = json!({
            "output": [{
                "combo_id": "SC-001",
                "combo_description": [
                    {"dimension": "Allocation Level", "value": "Member"},
                    {"dimension": "Order", "value": "Forward"}
                ],
                "criticality": "HIGH",
                "traceability": "REQ-4.2, REQ-7.1"
            }]
        })
        .to_string();

        assert!(contract().validate(&candidate).is_ok());
    }

    #[test]
    fn test_criticality_outside_set_rejected() {
        let candidate = json!({
            "output": [{
                "combo_id": "SC-001",
                "combo_description": [],
                "criticality": "SEVERE",
                "traceability": ""
            }]
        })
        .to_string();

        assert!(contract().validate(&candidate).is_err());
    }
}
