//! Expected-result artifact schema
//!
//! One line per unique key-field combination in the collateral allocation
//! summary. The amount fields follow the allocation waterfall: MLN is
//! blocked first, then compliance, capital cushion and payin obligations,
//! then requested allocations in priority order; the remainder is
//! unallocated.

use crate::schema::{FieldKind, FieldSpec, ObjectSpec, SchemaContract};

static EXPECTED_RESULT_LINE: ObjectSpec = ObjectSpec {
    name: "expected_result_line",
    fields: &[
        FieldSpec {
            name: "step",
            kind: FieldKind::Integer,
            guidance: "KEY FIELD: processing step number in the collateral allocation workflow",
        },
        FieldSpec {
            name: "memberCode",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: clearing member owning this collateral; a running series \
                       starting at A001",
        },
        FieldSpec {
            name: "segmentGroup",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: high-level grouping of market segments, e.g. Equity, \
                       Derivatives, Currency",
        },
        FieldSpec {
            name: "segment",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: specific market segment where the collateral is utilised. \
                       Use the same code as the static data in rd_tag_value",
        },
        FieldSpec {
            name: "purposeOfDeposit",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: always 'COLLATERAL' in this context",
        },
        FieldSpec {
            name: "collateralGroup",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: high-level collateral classification, e.g. CASH, SECURITIES. \
                       Use the same code as the static data in rd_tag_value",
        },
        FieldSpec {
            name: "collateralComponent",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: specific sub-type of the collateral, e.g. CASH, \
                       CASHEQUIVALENT, NONCASH. Use the same code as the static data",
        },
        FieldSpec {
            name: "isFungible",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: 'True' when the collateral can be shared across segments \
                       (Cash and FD always), 'False' otherwise",
        },
        FieldSpec {
            name: "currency",
            kind: FieldKind::Text,
            guidance: "KEY FIELD: always 'INR'",
        },
        FieldSpec {
            name: "applicable_limits",
            kind: FieldKind::Text,
            guidance: "The applicable MLN, compliance requirement and capital cushion limits \
                       for this line based on the member and segment in the masters data",
        },
        FieldSpec {
            name: "totalCollateralAmount",
            kind: FieldKind::Number,
            guidance: "Starting amount: total collateral in this line before any allocation. \
                       Equals the sum of every blocked, lent (minus borrowed) and allocated \
                       amount plus the unallocated remainder",
        },
        FieldSpec {
            name: "mlnBlockedAmount",
            kind: FieldKind::Number,
            guidance: "Amount blocked to meet MLN requirements from this specific line only, \
                       not the segment total. MLN takes priority in the waterfall; borrowed \
                       collateral is not added here",
        },
        FieldSpec {
            name: "mlnLentAmount",
            kind: FieldKind::Number,
            guidance: "Amount lent from this line to other segments' MLN needs. Fungible \
                       collateral only, after own MLN needs are met",
        },
        FieldSpec {
            name: "mlnBorrowedAmount",
            kind: FieldKind::Number,
            guidance: "Amount borrowed by this line from other segments for MLN. Fungible \
                       only. Reflected under the borrowing segment's keys; a new line is \
                       created there when the component does not exist yet",
        },
        FieldSpec {
            name: "obComplianceAmount",
            kind: FieldKind::Number,
            guidance: "Amount blocked for compliance obligations; only > 0 once MLN \
                       requirements are fully met",
        },
        FieldSpec {
            name: "obCapitalCushionAmount",
            kind: FieldKind::Number,
            guidance: "Amount blocked for the capital buffer; only > 0 once MLN and \
                       compliance are fully satisfied",
        },
        FieldSpec {
            name: "obPayinAdjustmentAmount",
            kind: FieldKind::Number,
            guidance: "Amount blocked for settlement payin adjustments; lowest priority in \
                       the obligation waterfall",
        },
        FieldSpec {
            name: "obPayinLent",
            kind: FieldKind::Number,
            guidance: "Amount lent from this line to other segments' payin adjustments; \
                       fungible collateral with excess after all obligations",
        },
        FieldSpec {
            name: "obPayinBorrowed",
            kind: FieldKind::Number,
            guidance: "Amount borrowed by this line from other segments for payin coverage",
        },
        FieldSpec {
            name: "allocated",
            kind: FieldKind::Number,
            guidance: "Filled from the allocationDetails lines of the test steps, line by \
                       line in priority order. A request is allocated in full only when it \
                       fits within the unallocated amount at that moment; no partial \
                       allocation. Successful allocation reduces unallocated",
        },
        FieldSpec {
            name: "allocatedLent",
            kind: FieldKind::Number,
            guidance: "Allocation capacity lent from this line to other segments; fungible \
                       collateral only",
        },
        FieldSpec {
            name: "allocatedBorrowed",
            kind: FieldKind::Number,
            guidance: "Allocation capacity borrowed by this line from other segments",
        },
        FieldSpec {
            name: "unallocated",
            kind: FieldKind::Number,
            guidance: "Final remainder after all obligations and allocations: \
                       totalCollateralAmount minus every blocked and allocated amount. \
                       Should never be negative",
        },
    ],
};

static EXPECTED_RESULT: ObjectSpec = ObjectSpec {
    name: "expected_result",
    fields: &[
        FieldSpec {
            name: "output",
            kind: FieldKind::ListOf(&EXPECTED_RESULT_LINE),
            guidance: "One record per unique combination of the key fields",
        },
        FieldSpec {
            name: "reason",
            kind: FieldKind::Text,
            guidance: "Why this is the expected result",
        },
    ],
};

pub fn contract() -> SchemaContract {
    SchemaContract::new(&EXPECTED_RESULT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expected_result_validates() {
        let candidate = json!({
            "output": [{
                "step": 1,
                "memberCode": "A001",
                "segmentGroup": "Equity",
                "segment": "CM",
                "purposeOfDeposit": "COLLATERAL",
                "collateralGroup": "CASH",
                "collateralComponent": "CASH",
                "isFungible": "True",
                "currency": "INR",
                "applicable_limits": "MLN 7.5M; Compliance 1M; Cushion 0.5M",
                "totalCollateralAmount": 10000000.0,
                "mlnBlockedAmount": 7500000.0,
                "mlnLentAmount": 0.0,
                "mlnBorrowedAmount": 0.0,
                "obComplianceAmount": 1000000.0,
                "obCapitalCushionAmount": 500000.0,
                "obPayinAdjustmentAmount": 0.0,
                "obPayinLent": 0.0,
                "obPayinBorrowed": 0.0,
                "allocated": 800000.0,
                "allocatedLent": 0.0,
                "allocatedBorrowed": 0.0,
                "unallocated": 200000.0
            }],
            "reason": "MLN blocked first, then compliance and cushion; the allocation request fits"
        })
        .to_string();

        assert!(contract().validate(&candidate).is_ok());
    }

    #[test]
    fn test_missing_reason_rejected() {
        let candidate = json!({ "output": [] }).to_string();
        assert!(contract().validate(&candidate).is_err());
    }
}
