use std::fmt;

use uuid::Uuid;

use crate::models::ChequeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceField {
    PresentationDate,
    ClearanceDate,
    Reason,
}

impl fmt::Display for EvidenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvidenceField::PresentationDate => "a presentation date",
            EvidenceField::ClearanceDate => "a clearance date",
            EvidenceField::Reason => "a non-empty reason",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClearanceError {
    #[error("cheque cannot move from {from} to {to}")]
    InvalidTransition { from: ChequeStatus, to: ChequeStatus },
    #[error("moving a cheque to {target} requires {field}")]
    MissingEvidence {
        target: ChequeStatus,
        field: EvidenceField,
    },
    #[error("cheque instrument {0} not found")]
    InstrumentNotFound(Uuid),
    #[error("obligation {0} not found")]
    ObligationNotFound(Uuid),
    #[error("obligation {0} is not an installment; cheques may only pay installments")]
    ObligationNotInstallment(Uuid),
    #[error("cheque instrument {0} was modified concurrently; re-read and retry")]
    ConcurrentModification(Uuid),
    #[error("idempotency key {0:?} was already used for a different request")]
    IdempotencyKeyReused(String),
    #[error("status publisher unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ClearanceError {
    /// Whether the same request may succeed after re-reading state or waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClearanceError::ConcurrentModification(_) | ClearanceError::UpstreamUnavailable(_)
        )
    }
}
