use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use remit_core::{
    ChequeStatus, EvidenceDocument, InstallmentObligation, ObligationKind, PaymentSnapshot,
    PaymentStatus, StatusEvent,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterObligationRequest {
    pub obligation_id: Option<Uuid>,
    #[serde(default = "default_obligation_kind")]
    pub kind: String,
    pub original_due_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationView {
    pub obligation_id: Uuid,
    pub kind: ObligationKind,
    pub original_due_date: NaiveDate,
    pub effective_due_date: NaiveDate,
}

impl From<InstallmentObligation> for ObligationView {
    fn from(obligation: InstallmentObligation) -> Self {
        Self {
            obligation_id: obligation.id,
            kind: obligation.kind,
            original_due_date: obligation.original_due_date,
            effective_due_date: obligation.effective_due_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: Decimal,
    pub currency: String,
    pub obligation_id: Uuid,
    pub payment: PaymentRequest,
    pub created_by: String,
    /// Resending an order with the same key returns the order already
    /// recorded for it.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Payment method chosen at order time. Only cheques are accepted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRequest {
    Cheque(ChequePaymentRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChequePaymentRequest {
    pub cheque_number: String,
    pub cheque_date: NaiveDate,
    #[serde(default)]
    pub evidence_documents: Vec<EvidenceDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub obligation_id: Uuid,
    pub status: ChequeStatus,
    pub effective_due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChequeStatusRequest {
    pub target_status: String,
    pub acting_user: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub evidence_documents: Vec<EvidenceDocument>,
    pub presentation_date: Option<NaiveDate>,
    pub clearance_date: Option<NaiveDate>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChequeStatusResponse {
    pub order_id: Uuid,
    pub status: ChequeStatus,
    pub previous_status: Option<ChequeStatus>,
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: Uuid,
    pub obligation_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: ChequeStatus,
    pub payment_status: PaymentStatus,
    /// Flat annotation bag kept for consumers that predate `snapshot`.
    pub notes: BTreeMap<String, String>,
    pub snapshot: PaymentSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryResponse {
    pub order_id: Uuid,
    pub events: Vec<StatusEvent>,
}

/// Change notification carried on the status channel.
pub const STATUS_CHANNEL: &str = "cheques.status";

pub fn snapshot_key(order_id: Uuid) -> String {
    format!("remit:payment-snapshot:{order_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub obligation_id: Uuid,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusBatchRequest {
    pub items: Vec<PaymentStatusQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRow {
    pub obligation_id: Uuid,
    pub order_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub cheque_status: Option<ChequeStatus>,
    pub effective_due_date: Option<NaiveDate>,
    /// The row fell back to the default because its snapshot could not be read.
    pub degraded: bool,
    /// Why the row is degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusBatchResponse {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<PaymentStatusRow>,
}

fn default_obligation_kind() -> String {
    "INSTALLMENT".to_string()
}
