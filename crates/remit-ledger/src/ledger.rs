//! The cheque instrument ledger.
//!
//! Transitions on one instrument are serialized: a second caller arriving
//! while a transition is in flight is turned away with
//! [`ClearanceError::ConcurrentModification`] instead of queueing, and the
//! store's version check catches writers in other processes. Instruments are
//! independent of each other; there is no global lock.
//!
//! A transition only counts as delivered once its snapshot has been
//! published. Publishing happens while the instrument is still held, with a
//! bounded timeout per attempt and a bounded number of attempts.
//!
//! Creates on one obligation queue behind each other. A create that pushes
//! the obligation's due date out also republishes the obligation's other
//! instruments, since their snapshots carry the due date too.

use std::{sync::Arc, time::Duration};

use chrono::{NaiveDate, Utc};
use remit_clearance::{reconcile, validate};
use remit_core::{
    ChequeInstrument, ChequeStatus, ClearanceError, CommitOutcome, EvidenceDocument,
    InstrumentStore, ObligationDirectory, PaymentSnapshot, StatusEvent, StatusPublisher,
    TransitionEvidence,
};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::locks::KeyedLocks;

#[derive(Debug, Clone, Copy)]
pub struct PublishPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCheque {
    pub obligation_id: Uuid,
    pub cheque_number: String,
    pub cheque_amount: Decimal,
    pub currency: String,
    pub cheque_date: NaiveDate,
    pub created_by: String,
    pub documents: Vec<EvidenceDocument>,
    /// Repeating a create with the same key returns the cheque recorded the
    /// first time instead of recording another one.
    pub idempotency_key: Option<String>,
}

pub struct ChequeLedger {
    instruments: Arc<dyn InstrumentStore>,
    obligations: Arc<dyn ObligationDirectory>,
    publisher: Arc<dyn StatusPublisher>,
    policy: PublishPolicy,
    locks: KeyedLocks,
    creates: KeyedLocks,
}

impl ChequeLedger {
    pub fn new(
        instruments: Arc<dyn InstrumentStore>,
        obligations: Arc<dyn ObligationDirectory>,
        publisher: Arc<dyn StatusPublisher>,
        policy: PublishPolicy,
    ) -> Self {
        Self {
            instruments,
            obligations,
            publisher,
            policy,
            locks: KeyedLocks::default(),
            creates: KeyedLocks::default(),
        }
    }

    /// Records a received cheque against an installment and pushes the
    /// installment's effective due date out to the cheque date if needed.
    pub async fn create(&self, request: NewCheque) -> Result<ChequeInstrument, ClearanceError> {
        let _create_guard = self.creates.acquire(request.obligation_id).await;

        let obligation = self
            .obligations
            .find(request.obligation_id)
            .await?
            .ok_or(ClearanceError::ObligationNotFound(request.obligation_id))?;

        if !obligation.is_installment() {
            return Err(ClearanceError::ObligationNotInstallment(obligation.id));
        }

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self.instruments.find_by_creation_key(obligation.id, key).await? {
                return self.replay_create(existing, &request, key).await;
            }
        }

        let effective_due_date = reconcile(request.cheque_date, obligation.effective_due_date);

        let now = Utc::now();
        let instrument = ChequeInstrument {
            id: Uuid::new_v4(),
            obligation_id: obligation.id,
            cheque_number: request.cheque_number.trim().to_string(),
            cheque_amount: request.cheque_amount,
            currency: request.currency.trim().to_string(),
            cheque_date: request.cheque_date,
            status: ChequeStatus::Received,
            version: 1,
            created_by: request.created_by.trim().to_string(),
            created_at: now,
        };
        let mut opening = StatusEvent::creation(&instrument, request.documents, now);
        opening.idempotency_key = request.idempotency_key;

        // hold the new id so a republish cannot interleave with the first publish
        let _guard = self.locks.try_acquire(instrument.id);
        self.instruments
            .create(&instrument, &opening, effective_due_date)
            .await?;
        info!(
            "cheque {} recorded as {} for obligation {}",
            instrument.cheque_number, instrument.id, obligation.id
        );

        let extended = effective_due_date != obligation.effective_due_date;
        if extended {
            info!(
                "obligation {} due date extended from {} to {}",
                obligation.id, obligation.effective_due_date, effective_due_date
            );
        }

        let snapshot = PaymentSnapshot::from_history(&instrument, &[opening], effective_due_date, now);
        self.publish(&snapshot).await?;
        if extended {
            self.republish_siblings(obligation.id, instrument.id).await?;
        }

        Ok(instrument)
    }

    /// A create repeated with a key already on record: nothing new is stored,
    /// but the earlier create may not have finished publishing, so everything
    /// it would have published goes out again.
    async fn replay_create(
        &self,
        existing: ChequeInstrument,
        request: &NewCheque,
        key: &str,
    ) -> Result<ChequeInstrument, ClearanceError> {
        if existing.cheque_number != request.cheque_number.trim()
            || existing.cheque_amount != request.cheque_amount
            || existing.cheque_date != request.cheque_date
        {
            warn!(
                "create key {key} already recorded cheque {} on {}; refusing a different cheque",
                existing.cheque_number, existing.id
            );
            return Err(ClearanceError::IdempotencyKeyReused(key.to_string()));
        }

        info!("cheque {}: replaying create {key}, republishing", existing.id);
        let current = {
            let Some(_guard) = self.locks.try_acquire(existing.id) else {
                return Err(ClearanceError::ConcurrentModification(existing.id));
            };
            let current = self.load(existing.id).await?;
            let history = self.instruments.history(current.id).await?;
            self.publish_current(&current, &history).await?;
            current
        };
        self.republish_siblings(current.obligation_id, current.id).await?;

        Ok(current)
    }

    pub async fn transition(
        &self,
        instrument_id: Uuid,
        target: ChequeStatus,
        acting_user: &str,
        evidence: TransitionEvidence,
    ) -> Result<StatusEvent, ClearanceError> {
        let Some(_guard) = self.locks.try_acquire(instrument_id) else {
            warn!("cheque {instrument_id} busy; rejecting move to {target}");
            return Err(ClearanceError::ConcurrentModification(instrument_id));
        };

        let instrument = self.load(instrument_id).await?;
        let mut history = self.instruments.history(instrument_id).await?;

        if let Some(key) = evidence.idempotency_key.as_deref() {
            let replayed = history
                .iter()
                .rev()
                .find(|event| event.idempotency_key.as_deref() == Some(key))
                .cloned();
            if let Some(event) = replayed {
                if event.new_status != target {
                    warn!(
                        "cheque {instrument_id}: request {key} already moved it to {}, not {target}",
                        event.new_status
                    );
                    return Err(ClearanceError::IdempotencyKeyReused(key.to_string()));
                }
                info!("cheque {instrument_id}: replaying request {key}, republishing");
                self.publish_current(&instrument, &history).await?;
                return Ok(event);
            }
        }

        validate(instrument.status, target, &evidence)?;

        let event = StatusEvent::transition(&instrument, target, acting_user, evidence, Utc::now());
        match self.instruments.commit(instrument.version, &event).await? {
            CommitOutcome::Committed => {}
            CommitOutcome::VersionConflict { current_version } => {
                warn!(
                    "cheque {instrument_id} moved to version {current_version} underneath us (read {})",
                    instrument.version
                );
                return Err(ClearanceError::ConcurrentModification(instrument_id));
            }
        }

        info!(
            "cheque {instrument_id} moved {} -> {target} by {}",
            instrument.status, event.acting_user
        );

        let committed = ChequeInstrument {
            status: event.new_status,
            version: event.sequence,
            ..instrument
        };
        history.push(event.clone());
        self.publish_current(&committed, &history).await?;

        Ok(event)
    }

    /// Instrument and its full ordered history. Never takes the instrument lock.
    pub async fn get(
        &self,
        instrument_id: Uuid,
    ) -> Result<(ChequeInstrument, Vec<StatusEvent>), ClearanceError> {
        let instrument = self.load(instrument_id).await?;
        let history = self.instruments.history(instrument_id).await?;
        Ok((instrument, history))
    }

    /// What the next publish for this instrument would carry.
    pub async fn snapshot(&self, instrument_id: Uuid) -> Result<PaymentSnapshot, ClearanceError> {
        let (_, snapshot) = self.view(instrument_id).await?;
        Ok(snapshot)
    }

    /// Instrument alongside the snapshot built from its history.
    pub async fn view(
        &self,
        instrument_id: Uuid,
    ) -> Result<(ChequeInstrument, PaymentSnapshot), ClearanceError> {
        let (instrument, history) = self.get(instrument_id).await?;
        let snapshot = self.build_snapshot(&instrument, &history).await?;
        Ok((instrument, snapshot))
    }

    /// Publishes the current snapshot again, e.g. after a create whose
    /// publish ran out of attempts.
    pub async fn republish(&self, instrument_id: Uuid) -> Result<PaymentSnapshot, ClearanceError> {
        let Some(_guard) = self.locks.try_acquire(instrument_id) else {
            return Err(ClearanceError::ConcurrentModification(instrument_id));
        };

        let snapshot = self.snapshot(instrument_id).await?;
        self.publish(&snapshot).await?;
        Ok(snapshot)
    }

    /// Brings the obligation's other instruments up to its current due date.
    /// An instrument busy with a transition is skipped; that transition
    /// publishes the due date it reads after committing.
    async fn republish_siblings(
        &self,
        obligation_id: Uuid,
        except: Uuid,
    ) -> Result<(), ClearanceError> {
        for sibling in self.instruments.find_by_obligation(obligation_id).await? {
            if sibling.id == except {
                continue;
            }
            let Some(_guard) = self.locks.try_acquire(sibling.id) else {
                info!("cheque {} busy; its own publish carries the new due date", sibling.id);
                continue;
            };

            let sibling = self.load(sibling.id).await?;
            let history = self.instruments.history(sibling.id).await?;
            self.publish_current(&sibling, &history).await?;
        }
        Ok(())
    }

    async fn load(&self, instrument_id: Uuid) -> Result<ChequeInstrument, ClearanceError> {
        self.instruments
            .find(instrument_id)
            .await?
            .ok_or(ClearanceError::InstrumentNotFound(instrument_id))
    }

    async fn build_snapshot(
        &self,
        instrument: &ChequeInstrument,
        history: &[StatusEvent],
    ) -> Result<PaymentSnapshot, ClearanceError> {
        let obligation = self
            .obligations
            .find(instrument.obligation_id)
            .await?
            .ok_or(ClearanceError::ObligationNotFound(instrument.obligation_id))?;

        Ok(PaymentSnapshot::from_history(
            instrument,
            history,
            obligation.effective_due_date,
            Utc::now(),
        ))
    }

    async fn publish_current(
        &self,
        instrument: &ChequeInstrument,
        history: &[StatusEvent],
    ) -> Result<(), ClearanceError> {
        let snapshot = self.build_snapshot(instrument, history).await?;
        self.publish(&snapshot).await
    }

    async fn publish(&self, snapshot: &PaymentSnapshot) -> Result<(), ClearanceError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.policy.timeout, self.publisher.publish(snapshot)).await
            {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => {
                    warn!(
                        "publish of order {} failed (attempt {attempt}/{attempts}): {err:#}",
                        snapshot.order_id
                    );
                    last_failure = format!("{err:#}");
                }
                Err(_) => {
                    warn!(
                        "publish of order {} timed out after {:?} (attempt {attempt}/{attempts})",
                        snapshot.order_id, self.policy.timeout
                    );
                    last_failure = format!("timed out after {:?}", self.policy.timeout);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        Err(ClearanceError::UpstreamUnavailable(format!(
            "order {} committed but not published: {last_failure}",
            snapshot.order_id
        )))
    }
}
