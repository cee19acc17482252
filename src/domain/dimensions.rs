//! Test dimension artifact schema

use crate::schema::{FieldKind, FieldSpec, ObjectSpec, SchemaContract};

static DIMENSION_VALUE: ObjectSpec = ObjectSpec {
    name: "dimension_value",
    fields: &[
        FieldSpec {
            name: "dim_val_id",
            kind: FieldKind::Text,
            guidance: "Unique id for the value within the dimension: the dimension id followed \
                       by a running suffix, e.g. TD-001-001, TD-001-002",
        },
        FieldSpec {
            name: "dim_value",
            kind: FieldKind::Text,
            guidance: "The allowed value for the dimension. Use a consistent naming pattern",
        },
    ],
};

static DIMENSION_CONSTRAINT: ObjectSpec = ObjectSpec {
    name: "dimension_constraint",
    fields: &[
        FieldSpec {
            name: "const_id",
            kind: FieldKind::Text,
            guidance: "Unique id for the constraint: the dimension id plus -C-001, -C-002 etc",
        },
        FieldSpec {
            name: "constraint",
            kind: FieldKind::Text,
            guidance: "The constraint to apply when combining this dimension's values with \
                       other dimensions",
        },
    ],
};

static TEST_DIMENSION: ObjectSpec = ObjectSpec {
    name: "test_dimension",
    fields: &[
        FieldSpec {
            name: "dim_id",
            kind: FieldKind::Text,
            guidance: "Unique identifier in the format TD-001, TD-002 etc",
        },
        FieldSpec {
            name: "dimension",
            kind: FieldKind::Text,
            guidance: "The dimension name extracted from the requirements, e.g. Allocation Level",
        },
        FieldSpec {
            name: "description",
            kind: FieldKind::Text,
            guidance: "What the dimension means",
        },
        FieldSpec {
            name: "dim_type",
            kind: FieldKind::Choice(&["Core", "Independent", "Ancillary"]),
            guidance: "The type of dimension for testing purposes",
        },
        FieldSpec {
            name: "values",
            kind: FieldKind::ListOf(&DIMENSION_VALUE),
            guidance: "The list of allowed values for this dimension",
        },
        FieldSpec {
            name: "constraints",
            kind: FieldKind::ListOf(&DIMENSION_CONSTRAINT),
            guidance: "Constraints to apply when combining this dimension's values into scenarios",
        },
        FieldSpec {
            name: "note",
            kind: FieldKind::Text,
            guidance: "Any notes useful for the scenario generation step later",
        },
    ],
};

static DIMENSION_LIST: ObjectSpec = ObjectSpec {
    name: "test_dimension_list",
    fields: &[FieldSpec {
        name: "output",
        kind: FieldKind::ListOf(&TEST_DIMENSION),
        guidance: "All valid dimensions extracted from the requirements with their value lists",
    }],
};

pub fn contract() -> SchemaContract {
    SchemaContract::new(&DIMENSION_LIST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dimension_artifact_validates() {
        let candidate = json!({
            "output": [{
                "dim_id": "TD-001",
                "dimension": "Allocation Level",
                "description": "Level at which cash is allocated",
                "dim_type": "Core",
                "values": [
                    {"dim_val_id": "TD-001-001", "dim_value": "Member"},
                    {"dim_val_id": "TD-001-002", "dim_value": "Client"}
                ],
                "constraints": [
                    {"const_id": "TD-001-C-001", "constraint": "Client level requires a client code"}
                ],
                "note": "Drives the allocation waterfall"
            }]
        })
        .to_string();

        assert!(contract().validate(&candidate).is_ok());
    }

    #[test]
    fn test_dimension_type_outside_set_rejected() {
        let candidate = json!({
            "output": [{
                "dim_id": "TD-001",
                "dimension": "Allocation Level",
                "description": "d",
                "dim_type": "Primary",
                "values": [],
                "constraints": [],
                "note": ""
            }]
        })
        .to_string();

        assert!(contract().validate(&candidate).is_err());
    }
}
