//! The record published to the obligation-owning service.
//!
//! One snapshot is written as a single value, so a reader sees either the
//! previous snapshot or the new one in full. `schemaVersion` is checked on
//! decode; a reader that meets a version it does not know treats the snapshot
//! as unreadable rather than guessing.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    events::StatusEvent,
    models::{ChequeInstrument, ChequeStatus, EvidenceDocument},
};

pub const SNAPSHOT_SCHEMA_VERSION: u16 = 1;

pub const KEY_CHEQUE_STATUS: &str = "chequeStatus";
pub const KEY_CHEQUE_NUMBER: &str = "chequeNumber";
pub const KEY_CHEQUE_DATE: &str = "chequeDate";
pub const KEY_PRESENTATION_DATE: &str = "presentationDate";
pub const KEY_CLEARANCE_DATE: &str = "clearanceDate";
pub const KEY_LAST_UPDATED_BY: &str = "lastUpdatedBy";
pub const KEY_LAST_STATUS_UPDATE: &str = "lastStatusUpdate";
pub const KEY_PRESENTED_REASON: &str = "presentedReason";
pub const KEY_RECEIVED_DOCUMENTS: &str = "receivedDocuments";
pub const KEY_PRESENTED_DOCUMENTS: &str = "presentedDocuments";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed payment snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported payment snapshot schema version {0:?}")]
    UnsupportedVersion(Option<u64>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSnapshot {
    pub schema_version: u16,
    pub order_id: Uuid,
    pub obligation_id: Uuid,
    pub effective_due_date: NaiveDate,
    pub instrument_version: u64,
    pub published_at: DateTime<Utc>,
    pub payment: PaymentDetails,
}

/// One variant per payment method, so each method carries its own state
/// machine instead of sharing a status enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentDetails {
    Cheque(ChequeDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChequeDetails {
    pub cheque_status: ChequeStatus,
    pub cheque_number: String,
    pub cheque_date: NaiveDate,
    pub presentation_date: Option<NaiveDate>,
    pub clearance_date: Option<NaiveDate>,
    pub last_updated_by: String,
    pub last_status_update: DateTime<Utc>,
    pub presented_reason: Option<String>,
    pub received_documents: Vec<EvidenceDocument>,
    pub presented_documents: Vec<EvidenceDocument>,
}

impl PaymentSnapshot {
    pub fn from_history(
        instrument: &ChequeInstrument,
        history: &[StatusEvent],
        effective_due_date: NaiveDate,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            order_id: instrument.id,
            obligation_id: instrument.obligation_id,
            effective_due_date,
            instrument_version: instrument.version,
            published_at,
            payment: PaymentDetails::Cheque(ChequeDetails::from_history(instrument, history)),
        }
    }

    pub fn cheque(&self) -> Option<&ChequeDetails> {
        match &self.payment {
            PaymentDetails::Cheque(details) => Some(details),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let version = value.get("schemaVersion").and_then(serde_json::Value::as_u64);
        if version != Some(u64::from(SNAPSHOT_SCHEMA_VERSION)) {
            return Err(SnapshotError::UnsupportedVersion(version));
        }

        Ok(serde_json::from_value(value)?)
    }
}

impl ChequeDetails {
    /// Dates are the most recent ones recorded anywhere in the history, so a
    /// cleared cheque still reports when it was presented. Reason and
    /// documents come from the latest transition only.
    pub fn from_history(instrument: &ChequeInstrument, history: &[StatusEvent]) -> Self {
        let latest = history.last();
        let received_documents = history
            .iter()
            .find(|event| event.is_creation())
            .map(|event| event.documents.clone())
            .unwrap_or_default();
        let presented_documents = latest
            .filter(|event| !event.is_creation())
            .map(|event| event.documents.clone())
            .unwrap_or_default();

        Self {
            cheque_status: latest.map_or(instrument.status, |event| event.new_status),
            cheque_number: instrument.cheque_number.clone(),
            cheque_date: instrument.cheque_date,
            presentation_date: history.iter().rev().find_map(|event| event.presentation_date),
            clearance_date: history.iter().rev().find_map(|event| event.clearance_date),
            last_updated_by: latest
                .map_or_else(|| instrument.created_by.clone(), |event| event.acting_user.clone()),
            last_status_update: latest.map_or(instrument.created_at, |event| event.occurred_at),
            presented_reason: latest.and_then(|event| event.reason.clone()),
            received_documents,
            presented_documents,
        }
    }

    /// Flat string-keyed encoding for consumers that still read order notes.
    pub fn to_annotations(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        let mut notes = BTreeMap::new();
        notes.insert(KEY_CHEQUE_STATUS.to_string(), self.cheque_status.to_string());
        notes.insert(KEY_CHEQUE_NUMBER.to_string(), self.cheque_number.clone());
        notes.insert(KEY_CHEQUE_DATE.to_string(), self.cheque_date.to_string());
        if let Some(date) = self.presentation_date {
            notes.insert(KEY_PRESENTATION_DATE.to_string(), date.to_string());
        }
        if let Some(date) = self.clearance_date {
            notes.insert(KEY_CLEARANCE_DATE.to_string(), date.to_string());
        }
        notes.insert(KEY_LAST_UPDATED_BY.to_string(), self.last_updated_by.clone());
        notes.insert(
            KEY_LAST_STATUS_UPDATE.to_string(),
            self.last_status_update.to_rfc3339(),
        );
        if let Some(reason) = &self.presented_reason {
            notes.insert(KEY_PRESENTED_REASON.to_string(), reason.clone());
        }
        notes.insert(
            KEY_RECEIVED_DOCUMENTS.to_string(),
            serde_json::to_string(&self.received_documents)?,
        );
        notes.insert(
            KEY_PRESENTED_DOCUMENTS.to_string(),
            serde_json::to_string(&self.presented_documents)?,
        );
        Ok(notes)
    }
}
