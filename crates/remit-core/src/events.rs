use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChequeInstrument, ChequeStatus, EvidenceDocument, TransitionEvidence};

/// One row of a cheque's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub id: Uuid,
    pub instrument_id: Uuid,
    /// 1-based position in the instrument's history.
    pub sequence: u64,
    /// `None` only for the creation event.
    pub previous_status: Option<ChequeStatus>,
    pub new_status: ChequeStatus,
    pub occurred_at: DateTime<Utc>,
    pub acting_user: String,
    pub reason: Option<String>,
    pub presentation_date: Option<NaiveDate>,
    pub clearance_date: Option<NaiveDate>,
    pub documents: Vec<EvidenceDocument>,
    pub idempotency_key: Option<String>,
}

impl StatusEvent {
    pub fn creation(
        instrument: &ChequeInstrument,
        documents: Vec<EvidenceDocument>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument_id: instrument.id,
            sequence: 1,
            previous_status: None,
            new_status: ChequeStatus::Received,
            occurred_at,
            acting_user: instrument.created_by.clone(),
            reason: None,
            presentation_date: None,
            clearance_date: None,
            documents,
            idempotency_key: None,
        }
    }

    pub fn transition(
        instrument: &ChequeInstrument,
        target: ChequeStatus,
        acting_user: &str,
        evidence: TransitionEvidence,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let reason = evidence.trimmed_reason().map(str::to_string);
        Self {
            id: Uuid::new_v4(),
            instrument_id: instrument.id,
            sequence: instrument.version + 1,
            previous_status: Some(instrument.status),
            new_status: target,
            occurred_at,
            acting_user: acting_user.trim().to_string(),
            reason,
            presentation_date: evidence.presentation_date,
            clearance_date: evidence.clearance_date,
            documents: evidence.documents,
            idempotency_key: evidence.idempotency_key,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.previous_status.is_none()
    }
}

/// Current status according to an ordered history.
pub fn current_status(history: &[StatusEvent]) -> Option<ChequeStatus> {
    history.last().map(|event| event.new_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn instrument() -> ChequeInstrument {
        ChequeInstrument {
            id: Uuid::new_v4(),
            obligation_id: Uuid::new_v4(),
            cheque_number: "000123".to_string(),
            cheque_amount: Decimal::new(150_000, 2),
            currency: "INR".to_string(),
            cheque_date: NaiveDate::from_ymd_opt(2025, 9, 20).unwrap(),
            status: ChequeStatus::Received,
            version: 1,
            created_by: "clerk@school".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn creation_event_has_no_previous_status() {
        let instrument = instrument();
        let event = StatusEvent::creation(&instrument, vec![], Utc::now());

        assert!(event.is_creation());
        assert_eq!(event.sequence, 1);
        assert_eq!(event.new_status, ChequeStatus::Received);
        assert_eq!(event.acting_user, "clerk@school");
    }

    #[test]
    fn transition_event_follows_instrument_version() {
        let instrument = instrument();
        let event = StatusEvent::transition(
            &instrument,
            ChequeStatus::Returned,
            "  admin@school ",
            TransitionEvidence::with_reason("  stale date  "),
            Utc::now(),
        );

        assert_eq!(event.sequence, 2);
        assert_eq!(event.previous_status, Some(ChequeStatus::Received));
        assert_eq!(event.reason.as_deref(), Some("stale date"));
        assert_eq!(event.acting_user, "admin@school");
    }

    #[test]
    fn current_status_is_last_event() {
        let mut instrument = instrument();
        let opening = StatusEvent::creation(&instrument, vec![], Utc::now());
        assert_eq!(current_status(&[]), None);
        assert_eq!(
            current_status(std::slice::from_ref(&opening)),
            Some(ChequeStatus::Received)
        );

        let presented = StatusEvent::transition(
            &instrument,
            ChequeStatus::Presented,
            "admin",
            TransitionEvidence::default(),
            Utc::now(),
        );
        instrument.status = ChequeStatus::Presented;
        assert_eq!(
            current_status(&[opening, presented]),
            Some(ChequeStatus::Presented)
        );
    }
}
