use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use remit_core::{
    AuditTrail, ChequeInstrument, CommitOutcome, InstallmentObligation, InstrumentStore,
    ObligationDirectory, Registration, StatusEvent,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only per-instrument event streams. Each append must carry the next
/// sequence number of its stream.
#[derive(Debug, Default)]
pub struct AuditLog {
    streams: HashMap<Uuid, Vec<StatusEvent>>,
}

impl AuditLog {
    pub fn append(&mut self, event: StatusEvent) -> anyhow::Result<()> {
        let stream = self.streams.entry(event.instrument_id).or_default();
        let expected = stream.len() as u64 + 1;
        if event.sequence != expected {
            anyhow::bail!(
                "out-of-order audit append for {}: expected sequence {expected}, got {}",
                event.instrument_id,
                event.sequence
            );
        }

        stream.push(event);
        Ok(())
    }

    pub fn stream(&self, instrument_id: Uuid) -> &[StatusEvent] {
        self.streams
            .get(&instrument_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct LedgerState {
    instruments: HashMap<Uuid, ChequeInstrument>,
    audit: AuditLog,
}

/// Instruments and their audit streams behind one lock, so a commit and the
/// matching history row become visible together. The store shares the
/// obligation directory it extends due dates in.
#[derive(Default)]
pub struct InMemoryInstrumentStore {
    state: RwLock<LedgerState>,
    obligations: Arc<InMemoryObligationDirectory>,
}

impl InMemoryInstrumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_obligations(obligations: Arc<InMemoryObligationDirectory>) -> Self {
        Self {
            state: RwLock::default(),
            obligations,
        }
    }

    pub fn obligations(&self) -> Arc<InMemoryObligationDirectory> {
        Arc::clone(&self.obligations)
    }
}

#[async_trait]
impl AuditTrail for InMemoryInstrumentStore {
    async fn history(&self, instrument_id: Uuid) -> anyhow::Result<Vec<StatusEvent>> {
        let state = self.state.read().await;
        Ok(state.audit.stream(instrument_id).to_vec())
    }
}

#[async_trait]
impl InstrumentStore for InMemoryInstrumentStore {
    async fn create(
        &self,
        instrument: &ChequeInstrument,
        opening: &StatusEvent,
        effective_due_date: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let mut obligations = self.obligations.obligations.write().await;

        let obligation = obligations
            .get_mut(&instrument.obligation_id)
            .with_context(|| format!("obligation {} not found", instrument.obligation_id))?;
        if state.instruments.contains_key(&instrument.id) {
            anyhow::bail!("cheque instrument {} already exists", instrument.id);
        }

        state.audit.append(opening.clone())?;
        state.instruments.insert(instrument.id, instrument.clone());
        obligation.effective_due_date = obligation.effective_due_date.max(effective_due_date);
        Ok(())
    }

    async fn find(&self, instrument_id: Uuid) -> anyhow::Result<Option<ChequeInstrument>> {
        let state = self.state.read().await;
        Ok(state.instruments.get(&instrument_id).cloned())
    }

    async fn find_by_obligation(
        &self,
        obligation_id: Uuid,
    ) -> anyhow::Result<Vec<ChequeInstrument>> {
        let state = self.state.read().await;
        let mut instruments: Vec<_> = state
            .instruments
            .values()
            .filter(|instrument| instrument.obligation_id == obligation_id)
            .cloned()
            .collect();
        instruments.sort_by_key(|instrument| instrument.created_at);
        Ok(instruments)
    }

    async fn find_by_creation_key(
        &self,
        obligation_id: Uuid,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<ChequeInstrument>> {
        let state = self.state.read().await;
        Ok(state
            .instruments
            .values()
            .filter(|instrument| instrument.obligation_id == obligation_id)
            .find(|instrument| {
                state.audit.stream(instrument.id).first().is_some_and(|opening| {
                    opening.idempotency_key.as_deref() == Some(idempotency_key)
                })
            })
            .cloned())
    }

    async fn commit(
        &self,
        expected_version: u64,
        event: &StatusEvent,
    ) -> anyhow::Result<CommitOutcome> {
        let mut state = self.state.write().await;
        let current_version = state
            .instruments
            .get(&event.instrument_id)
            .map(|instrument| instrument.version)
            .with_context(|| format!("cheque instrument {} not found", event.instrument_id))?;

        if current_version != expected_version {
            return Ok(CommitOutcome::VersionConflict { current_version });
        }

        state.audit.append(event.clone())?;
        let instrument = state
            .instruments
            .get_mut(&event.instrument_id)
            .with_context(|| format!("cheque instrument {} not found", event.instrument_id))?;
        instrument.status = event.new_status;
        instrument.version = event.sequence;

        Ok(CommitOutcome::Committed)
    }
}

#[derive(Default)]
pub struct InMemoryObligationDirectory {
    obligations: RwLock<HashMap<Uuid, InstallmentObligation>>,
}

impl InMemoryObligationDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObligationDirectory for InMemoryObligationDirectory {
    async fn register(&self, obligation: &InstallmentObligation) -> anyhow::Result<Registration> {
        let mut obligations = self.obligations.write().await;
        if obligations.contains_key(&obligation.id) {
            return Ok(Registration::AlreadyExists);
        }
        obligations.insert(obligation.id, obligation.clone());
        Ok(Registration::Registered)
    }

    async fn find(&self, obligation_id: Uuid) -> anyhow::Result<Option<InstallmentObligation>> {
        let obligations = self.obligations.read().await;
        Ok(obligations.get(&obligation_id).cloned())
    }
}
