//! Request and response bodies for the document store API.
//!
//! All structs use camelCase serialization to match the API's JSON format.

use serde::{Deserialize, Serialize};

use crate::models::BillStatus;

/// Response from POST /v1/{collection}.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordResponse {
    pub id: String,
}

/// Patch applied to `bills/{billId}` when a payment is recorded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPaymentPatch<'a> {
    pub status: BillStatus,
    pub payment_id: &'a str,
    /// Unix ms.
    pub paid_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_payment_patch_serialization() {
        let patch = BillPaymentPatch {
            status: BillStatus::Paid,
            payment_id: "1760000000000-abcdef",
            paid_at: 1760000000000,
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(
            json,
            r#"{"status":"paid","paymentId":"1760000000000-abcdef","paidAt":1760000000000}"#
        );
    }

    #[test]
    fn test_create_record_response_deserialization() {
        let resp: CreateRecordResponse =
            serde_json::from_str(r#"{"id":"abc","createTime":"2026-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(resp.id, "abc");
    }
}
