use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChequeStatus {
    Received,
    Presented,
    Cleared,
    Rejected,
    Bounced,
    Returned,
}

impl ChequeStatus {
    pub const ALL: [ChequeStatus; 6] = [
        ChequeStatus::Received,
        ChequeStatus::Presented,
        ChequeStatus::Cleared,
        ChequeStatus::Rejected,
        ChequeStatus::Bounced,
        ChequeStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChequeStatus::Received => "RECEIVED",
            ChequeStatus::Presented => "PRESENTED",
            ChequeStatus::Cleared => "CLEARED",
            ChequeStatus::Rejected => "REJECTED",
            ChequeStatus::Bounced => "BOUNCED",
            ChequeStatus::Returned => "RETURNED",
        }
    }

    /// Cleared, Rejected and Bounced have no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChequeStatus::Cleared | ChequeStatus::Rejected | ChequeStatus::Bounced
        )
    }
}

impl fmt::Display for ChequeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChequeStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RECEIVED" => Ok(ChequeStatus::Received),
            "PRESENTED" => Ok(ChequeStatus::Presented),
            "CLEARED" => Ok(ChequeStatus::Cleared),
            "REJECTED" => Ok(ChequeStatus::Rejected),
            "BOUNCED" => Ok(ChequeStatus::Bounced),
            "RETURNED" => Ok(ChequeStatus::Returned),
            other => anyhow::bail!("unsupported cheque status: {other}"),
        }
    }
}

/// Externally visible payment status, derived at query time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    UnclearReceived,
    UnclearPresented,
    Paid,
    Pending,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::UnclearReceived => "UNCLEAR_RECEIVED",
            PaymentStatus::UnclearPresented => "UNCLEAR_PRESENTED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Overdue => "OVERDUE",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceDocument {
    pub document_hash: String,
    pub document_asset_url: String,
    pub document_name: String,
}

/// Everything an administrative action may carry alongside its target status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionEvidence {
    pub reason: Option<String>,
    pub presentation_date: Option<NaiveDate>,
    pub clearance_date: Option<NaiveDate>,
    #[serde(default)]
    pub documents: Vec<EvidenceDocument>,
    pub idempotency_key: Option<String>,
}

impl TransitionEvidence {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn presented_on(date: NaiveDate) -> Self {
        Self {
            presentation_date: Some(date),
            ..Self::default()
        }
    }

    pub fn cleared_on(date: NaiveDate) -> Self {
        Self {
            clearance_date: Some(date),
            ..Self::default()
        }
    }

    /// The reason with surrounding whitespace removed, if anything is left.
    pub fn trimmed_reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObligationKind {
    Installment,
    OneTime,
}

impl ObligationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObligationKind::Installment => "INSTALLMENT",
            ObligationKind::OneTime => "ONE_TIME",
        }
    }
}

impl FromStr for ObligationKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INSTALLMENT" => Ok(ObligationKind::Installment),
            "ONE_TIME" | "ONETIME" => Ok(ObligationKind::OneTime),
            other => anyhow::bail!("unsupported obligation kind: {other}"),
        }
    }
}

/// A payment obligation owned by another service. Only its due dates are
/// touched here, and the effective one only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallmentObligation {
    pub id: Uuid,
    pub kind: ObligationKind,
    pub original_due_date: NaiveDate,
    pub effective_due_date: NaiveDate,
}

impl InstallmentObligation {
    pub fn new(id: Uuid, kind: ObligationKind, original_due_date: NaiveDate) -> Self {
        Self {
            id,
            kind,
            original_due_date,
            effective_due_date: original_due_date,
        }
    }

    pub fn is_installment(&self) -> bool {
        self.kind == ObligationKind::Installment
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChequeInstrument {
    pub id: Uuid,
    pub obligation_id: Uuid,
    pub cheque_number: String,
    pub cheque_amount: Decimal,
    pub currency: String,
    pub cheque_date: NaiveDate,
    pub status: ChequeStatus,
    /// Number of committed status events, creation included.
    pub version: u64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
