use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    events::StatusEvent,
    models::{ChequeInstrument, InstallmentObligation},
    snapshot::PaymentSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Someone else committed first; nothing was written.
    VersionConflict { current_version: u64 },
}

/// Read side of the append-only status history. There is no update or
/// delete; rows are only ever added inside an [`InstrumentStore`] commit.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn history(&self, instrument_id: Uuid) -> anyhow::Result<Vec<StatusEvent>>;
}

#[async_trait]
pub trait InstrumentStore: AuditTrail {
    /// Stores a new instrument with its opening event and moves the owning
    /// obligation's effective due date forward to at least
    /// `effective_due_date`. Either all of it lands or none of it does.
    async fn create(
        &self,
        instrument: &ChequeInstrument,
        opening: &StatusEvent,
        effective_due_date: NaiveDate,
    ) -> anyhow::Result<()>;

    async fn find(&self, instrument_id: Uuid) -> anyhow::Result<Option<ChequeInstrument>>;

    /// Every instrument recorded against the obligation, oldest first.
    async fn find_by_obligation(
        &self,
        obligation_id: Uuid,
    ) -> anyhow::Result<Vec<ChequeInstrument>>;

    /// The instrument whose opening event carries `idempotency_key`.
    async fn find_by_creation_key(
        &self,
        obligation_id: Uuid,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<ChequeInstrument>>;

    /// Appends `event` and moves the instrument to `event.new_status` as one
    /// unit, provided the stored version still equals `expected_version`.
    async fn commit(
        &self,
        expected_version: u64,
        event: &StatusEvent,
    ) -> anyhow::Result<CommitOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// An obligation with that id was already there; it was left untouched.
    AlreadyExists,
}

/// Lookup into obligations owned by another service. The effective due date
/// only moves through [`InstrumentStore::create`].
#[async_trait]
pub trait ObligationDirectory: Send + Sync {
    async fn register(&self, obligation: &InstallmentObligation) -> anyhow::Result<Registration>;

    async fn find(&self, obligation_id: Uuid) -> anyhow::Result<Option<InstallmentObligation>>;
}

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, snapshot: &PaymentSnapshot) -> anyhow::Result<()>;
}
