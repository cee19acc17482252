//! Test step artifact schema
//!
//! The widest artifact: one row per executable collateral transaction, with
//! a nested allocation sub-table used when the event is Allocation.

use crate::schema::{FieldKind, FieldSpec, ObjectSpec, SchemaContract};

static ALLOCATION_DETAIL: ObjectSpec = ObjectSpec {
    name: "allocation_detail",
    fields: &[
        FieldSpec {
            name: "step",
            kind: FieldKind::Integer,
            guidance: "Same step number as the test case step in which the allocation data is \
                       generated",
        },
        FieldSpec {
            name: "cmCode",
            kind: FieldKind::Text,
            guidance: "Clearing member code",
        },
        FieldSpec {
            name: "segment",
            kind: FieldKind::Text,
            guidance: "Segment in which the allocation is created. Use the segment code from \
                       the static data, e.g. CM, FNO",
        },
        FieldSpec {
            name: "tmCode",
            kind: FieldKind::Text,
            guidance: "Trading member code",
        },
        FieldSpec {
            name: "cpCode",
            kind: FieldKind::Text,
            guidance: "Custodial participant code",
        },
        FieldSpec {
            name: "cliCode",
            kind: FieldKind::Text,
            guidance: "Client code",
        },
        FieldSpec {
            name: "txn_type",
            kind: FieldKind::Choice(&["Allocate", "De-allocate", "Transfer In", "Transfer Out"]),
            guidance: "The allocation transaction type",
        },
        FieldSpec {
            name: "amt",
            kind: FieldKind::Number,
            guidance: "Transaction amount. Allocate and Transfer In are positive; De-allocate \
                       and Transfer Out are negative",
        },
        FieldSpec {
            name: "cum_amt",
            kind: FieldKind::Number,
            guidance: "Cumulative allocation outstanding after this transaction, taking the \
                       allocation transactions of previous steps into account",
        },
        FieldSpec {
            name: "trfToSeg",
            kind: FieldKind::Text,
            guidance: "Segment to which the allocation is transferred",
        },
        FieldSpec {
            name: "pass_fail",
            kind: FieldKind::Text,
            guidance: "Whether the given allocation passes or fails",
        },
        FieldSpec {
            name: "reason",
            kind: FieldKind::Text,
            guidance: "If the allocation fails, a short reason in less than 20 words",
        },
    ],
};

static TEST_STEP: ObjectSpec = ObjectSpec {
    name: "test_step",
    fields: &[
        FieldSpec {
            name: "test_case_id",
            kind: FieldKind::Text,
            guidance: "The test case id these steps belong to; the traceability link",
        },
        FieldSpec {
            name: "step",
            kind: FieldKind::Integer,
            guidance: "Step number within the sequence of steps to be executed",
        },
        FieldSpec {
            name: "memberCode",
            kind: FieldKind::Text,
            guidance: "A running series starting at A001: A002, A003 etc",
        },
        FieldSpec {
            name: "segment",
            kind: FieldKind::Text,
            guidance: "Segment in which the collateral is transacted. Use the segment code \
                       from the static data, e.g. CM, FNO",
        },
        FieldSpec {
            name: "addReduce",
            kind: FieldKind::Text,
            guidance: "Whether collateral is being added or reduced",
        },
        FieldSpec {
            name: "collateralType",
            kind: FieldKind::Text,
            guidance: "Code for the collateral type. Use only Code values defined under Tag \
                       ID = 14 in rd_tag_value in the static data as applicable",
        },
        FieldSpec {
            name: "event",
            kind: FieldKind::Text,
            guidance: "Transaction type, e.g. Deposit, Withdraw, Invoke, Transfer, Renew, \
                       Allocation. Use a suitable event in this same format",
        },
        FieldSpec {
            name: "collateralGroup",
            kind: FieldKind::Text,
            guidance: "The collateral group this collateral type belongs to, coded as in the \
                       static data",
        },
        FieldSpec {
            name: "collateralComponent",
            kind: FieldKind::Text,
            guidance: "The collateral component this collateral type belongs to, coded as in \
                       the static data",
        },
        FieldSpec {
            name: "isFungible",
            kind: FieldKind::Text,
            guidance: "Whether the collateral is fungible across segments. Cash and FD are \
                       always fungible. 'True' for fungible, 'False' for non-fungible",
        },
        FieldSpec {
            name: "currency",
            kind: FieldKind::Text,
            guidance: "Always set to INR",
        },
        FieldSpec {
            name: "amount",
            kind: FieldKind::Number,
            guidance: "Transaction amount. For Renew events this is the renewal amount; for \
                       securities with quantity and price this is quantity * price",
        },
        FieldSpec {
            name: "amountInWords",
            kind: FieldKind::Text,
            guidance: "The transaction amount in words",
        },
        FieldSpec {
            name: "bank",
            kind: FieldKind::Text,
            guidance: "Always set to IDFC. Applicable for Cash, Fixed Deposit and Bank \
                       Guarantees",
        },
        FieldSpec {
            name: "account",
            kind: FieldKind::Text,
            guidance: "Suitable bank account from the masters data (Member Bank Account) based \
                       on the chosen memberCode",
        },
        FieldSpec {
            name: "instrumentNo",
            kind: FieldKind::Text,
            guidance: "Random 6 digit number for Fixed Deposit and Bank Guarantee; empty for \
                       Cash. For Renew events this is the old instrument number",
        },
        FieldSpec {
            name: "branch",
            kind: FieldKind::Text,
            guidance: "Fixed Deposit and Bank Guarantee only: a random city in India. Empty \
                       for Cash",
        },
        FieldSpec {
            name: "isElectronic",
            kind: FieldKind::Text,
            guidance: "Fixed Deposit and Bank Guarantee only. Set to False always",
        },
        FieldSpec {
            name: "quantity",
            kind: FieldKind::Integer,
            guidance: "Securities including G-Secs only; 0 for others",
        },
        FieldSpec {
            name: "isin",
            kind: FieldKind::Text,
            guidance: "Securities including G-Secs only; empty for others. Picked from the \
                       master data provided",
        },
        FieldSpec {
            name: "price",
            kind: FieldKind::Number,
            guidance: "Securities including G-Secs only; 0 for others. Picked from the master \
                       data provided",
        },
        FieldSpec {
            name: "value",
            kind: FieldKind::Number,
            guidance: "Securities including G-Secs only; 0 for others. quantity * price; the \
                       value used for blocking",
        },
        FieldSpec {
            name: "newInstrumentNo",
            kind: FieldKind::Text,
            guidance: "Renewal events only: random 6 digit number for Fixed Deposit and Bank \
                       Guarantee, empty for Cash",
        },
        FieldSpec {
            name: "toSegment",
            kind: FieldKind::Text,
            guidance: "Transfer events only: the segment the collateral moves to, coded as in \
                       the static data. Does not apply to transfer of allocation",
        },
        FieldSpec {
            name: "allocation",
            kind: FieldKind::ListOf(&ALLOCATION_DETAIL),
            guidance: "Allocation events only; empty for all other events. Holds Allocation, \
                       De-allocation and Transfer lines; every line is considered in order \
                       when allocating cash per the rules given",
        },
        FieldSpec {
            name: "pass_fail",
            kind: FieldKind::Text,
            guidance: "Whether the overall allocation passes or fails",
        },
        FieldSpec {
            name: "reason",
            kind: FieldKind::Text,
            guidance: "If the allocation fails, a short reason in less than 20 words",
        },
    ],
};

static STEP_LIST: ObjectSpec = ObjectSpec {
    name: "test_step_list",
    fields: &[FieldSpec {
        name: "output",
        kind: FieldKind::ListOf(&TEST_STEP),
        guidance: "The steps for the given test case only",
    }],
};

pub fn contract() -> SchemaContract {
    SchemaContract::new(&STEP_LIST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_row() -> serde_json::Value {
        json!({
            "test_case_id": "TC-0001",
            "step": 1,
            "memberCode": "A001",
            "segment": "CM",
            "addReduce": "Add",
            "collateralType": "CSH",
            "event": "Deposit",
            "collateralGroup": "CASH",
            "collateralComponent": "CASH",
            "isFungible": "True",
            "currency": "INR",
            "amount": 1000000.0,
            "amountInWords": "Ten Lakh",
            "bank": "IDFC",
            "account": "ACC-001",
            "instrumentNo": "",
            "branch": "",
            "isElectronic": "False",
            "quantity": 0,
            "isin": "",
            "price": 0.0,
            "value": 0.0,
            "newInstrumentNo": "",
            "toSegment": "",
            "allocation": [],
            "pass_fail": "Pass",
            "reason": ""
        })
    }

    #[test]
    fn test_step_artifact_validates() {
        let candidate = json!({ "output": [step_row()] }).to_string();
        assert!(contract().validate(&candidate).is_ok());
    }

    #[test]
    fn test_allocation_txn_type_outside_set_rejected() {
        let mut row = step_row();
        row["allocation"] = json!([{
            "step": 1,
            "cmCode": "A001",
            "segment": "CM",
            "tmCode": "",
            "cpCode": "",
            "cliCode": "",
            "txn_type": "Reverse",
            "amt": 100.0,
            "cum_amt": 100.0,
            "trfToSeg": "",
            "pass_fail": "Pass",
            "reason": ""
        }]);
        let candidate = json!({ "output": [row] }).to_string();
        assert!(contract().validate(&candidate).is_err());
    }
}
