#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use remit_core::{
    AuditTrail, ChequeInstrument, ChequeStatus, CommitOutcome, InstallmentObligation, InstrumentStore,
    ObligationDirectory, ObligationKind, PaymentSnapshot, StatusEvent, StatusPublisher,
    TransitionEvidence,
};
use remit_eventstore::{InMemoryInstrumentStore, InMemoryObligationDirectory};
use remit_ledger::{ChequeLedger, NewCheque, PublishPolicy};
use rust_decimal::Decimal;
use tokio::sync::Notify;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn fast_policy() -> PublishPolicy {
    PublishPolicy {
        timeout: Duration::from_millis(50),
        max_attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PaymentSnapshot>>,
}

impl RecordingPublisher {
    pub fn snapshots(&self) -> Vec<PaymentSnapshot> {
        self.published.lock().unwrap().clone()
    }

    pub fn last(&self) -> PaymentSnapshot {
        self.snapshots().pop().expect("nothing published")
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, snapshot: &PaymentSnapshot) -> anyhow::Result<()> {
        self.published.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Fails the next `failures` publishes, then records.
#[derive(Default)]
pub struct FlakyPublisher {
    pub failures: AtomicU32,
    pub attempts: AtomicU32,
    pub inner: RecordingPublisher,
}

#[async_trait]
impl StatusPublisher for FlakyPublisher {
    async fn publish(&self, snapshot: &PaymentSnapshot) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("redis connection refused");
        }
        self.inner.publish(snapshot).await
    }
}

/// Never answers.
pub struct HangingPublisher;

#[async_trait]
impl StatusPublisher for HangingPublisher {
    async fn publish(&self, _snapshot: &PaymentSnapshot) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Once armed, parks each publish until released.
#[derive(Default)]
pub struct GatedPublisher {
    pub armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
    pub inner: RecordingPublisher,
}

#[async_trait]
impl StatusPublisher for GatedPublisher {
    async fn publish(&self, snapshot: &PaymentSnapshot) -> anyhow::Result<()> {
        if self.armed.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.publish(snapshot).await
    }
}

/// Test stores that wrap the in-memory store and share its obligations.
pub trait Backed {
    fn backing(&self) -> &InMemoryInstrumentStore;
}

impl Backed for InMemoryInstrumentStore {
    fn backing(&self) -> &InMemoryInstrumentStore {
        self
    }
}

macro_rules! wrapped_store {
    ($store:ident) => {
        impl Backed for $store {
            fn backing(&self) -> &InMemoryInstrumentStore {
                &self.inner
            }
        }

        #[async_trait]
        impl AuditTrail for $store {
            async fn history(&self, instrument_id: Uuid) -> anyhow::Result<Vec<StatusEvent>> {
                self.inner.history(instrument_id).await
            }
        }
    };
}

/// Store whose commits fail, as if the database went away mid-write.
#[derive(Default)]
pub struct BrokenCommitStore {
    pub inner: InMemoryInstrumentStore,
}

wrapped_store!(BrokenCommitStore);

#[async_trait]
impl InstrumentStore for BrokenCommitStore {
    async fn create(
        &self,
        instrument: &ChequeInstrument,
        opening: &StatusEvent,
        effective_due_date: NaiveDate,
    ) -> anyhow::Result<()> {
        self.inner.create(instrument, opening, effective_due_date).await
    }

    async fn find(&self, instrument_id: Uuid) -> anyhow::Result<Option<ChequeInstrument>> {
        self.inner.find(instrument_id).await
    }

    async fn find_by_obligation(
        &self,
        obligation_id: Uuid,
    ) -> anyhow::Result<Vec<ChequeInstrument>> {
        self.inner.find_by_obligation(obligation_id).await
    }

    async fn find_by_creation_key(
        &self,
        obligation_id: Uuid,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<ChequeInstrument>> {
        self.inner.find_by_creation_key(obligation_id, idempotency_key).await
    }

    async fn commit(
        &self,
        _expected_version: u64,
        _event: &StatusEvent,
    ) -> anyhow::Result<CommitOutcome> {
        anyhow::bail!("connection reset by peer")
    }
}

/// Store that loses the connection while inserting a new instrument.
#[derive(Default)]
pub struct BrokenCreateStore {
    pub inner: InMemoryInstrumentStore,
}

wrapped_store!(BrokenCreateStore);

#[async_trait]
impl InstrumentStore for BrokenCreateStore {
    async fn create(
        &self,
        _instrument: &ChequeInstrument,
        _opening: &StatusEvent,
        _effective_due_date: NaiveDate,
    ) -> anyhow::Result<()> {
        anyhow::bail!("connection reset by peer")
    }

    async fn find(&self, instrument_id: Uuid) -> anyhow::Result<Option<ChequeInstrument>> {
        self.inner.find(instrument_id).await
    }

    async fn find_by_obligation(
        &self,
        obligation_id: Uuid,
    ) -> anyhow::Result<Vec<ChequeInstrument>> {
        self.inner.find_by_obligation(obligation_id).await
    }

    async fn find_by_creation_key(
        &self,
        obligation_id: Uuid,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<ChequeInstrument>> {
        self.inner.find_by_creation_key(obligation_id, idempotency_key).await
    }

    async fn commit(
        &self,
        expected_version: u64,
        event: &StatusEvent,
    ) -> anyhow::Result<CommitOutcome> {
        self.inner.commit(expected_version, event).await
    }
}

/// Store where another process sneaks one commit in right before ours.
pub struct RacingStore {
    pub inner: InMemoryInstrumentStore,
    pub rival: Mutex<Option<(ChequeStatus, TransitionEvidence)>>,
}

wrapped_store!(RacingStore);

#[async_trait]
impl InstrumentStore for RacingStore {
    async fn create(
        &self,
        instrument: &ChequeInstrument,
        opening: &StatusEvent,
        effective_due_date: NaiveDate,
    ) -> anyhow::Result<()> {
        self.inner.create(instrument, opening, effective_due_date).await
    }

    async fn find(&self, instrument_id: Uuid) -> anyhow::Result<Option<ChequeInstrument>> {
        self.inner.find(instrument_id).await
    }

    async fn find_by_obligation(
        &self,
        obligation_id: Uuid,
    ) -> anyhow::Result<Vec<ChequeInstrument>> {
        self.inner.find_by_obligation(obligation_id).await
    }

    async fn find_by_creation_key(
        &self,
        obligation_id: Uuid,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<ChequeInstrument>> {
        self.inner.find_by_creation_key(obligation_id, idempotency_key).await
    }

    async fn commit(
        &self,
        expected_version: u64,
        event: &StatusEvent,
    ) -> anyhow::Result<CommitOutcome> {
        let rival = self.rival.lock().unwrap().take();
        if let Some((target, evidence)) = rival {
            let current = self
                .inner
                .find(event.instrument_id)
                .await?
                .expect("instrument exists");
            let sneaked =
                StatusEvent::transition(&current, target, "other-admin", evidence, Utc::now());
            self.inner.commit(current.version, &sneaked).await?;
        }
        self.inner.commit(expected_version, event).await
    }
}

pub struct Harness<P: StatusPublisher + 'static> {
    pub ledger: Arc<ChequeLedger>,
    pub store: Arc<dyn InstrumentStore>,
    pub obligations: Arc<InMemoryObligationDirectory>,
    pub publisher: Arc<P>,
}

pub fn harness<P: StatusPublisher + Default + 'static>() -> Harness<P> {
    harness_with(Arc::new(InMemoryInstrumentStore::new()), Arc::new(P::default()))
}

pub fn harness_with<S, P>(store: Arc<S>, publisher: Arc<P>) -> Harness<P>
where
    S: InstrumentStore + Backed + 'static,
    P: StatusPublisher + 'static,
{
    let obligations = store.backing().obligations();
    let store: Arc<dyn InstrumentStore> = store;
    let ledger = Arc::new(ChequeLedger::new(
        store.clone(),
        obligations.clone(),
        publisher.clone(),
        fast_policy(),
    ));
    Harness {
        ledger,
        store,
        obligations,
        publisher,
    }
}

impl<P: StatusPublisher + 'static> Harness<P> {
    pub async fn obligation(&self, kind: ObligationKind, due: NaiveDate) -> Uuid {
        let obligation = InstallmentObligation::new(Uuid::new_v4(), kind, due);
        self.obligations.register(&obligation).await.unwrap();
        obligation.id
    }

    pub async fn effective_due_date(&self, obligation_id: Uuid) -> NaiveDate {
        self.obligations
            .find(obligation_id)
            .await
            .unwrap()
            .unwrap()
            .effective_due_date
    }

    pub async fn instrument_count(&self, obligation_id: Uuid) -> usize {
        self.store.find_by_obligation(obligation_id).await.unwrap().len()
    }
}

pub fn new_cheque(obligation_id: Uuid, cheque_date: NaiveDate) -> NewCheque {
    NewCheque {
        obligation_id,
        cheque_number: "004512".to_string(),
        cheque_amount: Decimal::new(18_500, 0),
        currency: "INR".to_string(),
        cheque_date,
        created_by: "accounts-clerk".to_string(),
        documents: vec![],
        idempotency_key: None,
    }
}
