//! Consumer side of the payment snapshot channel.
//!
//! A batch read never fails as a whole: each row that cannot be resolved
//! falls back to [`PaymentStatus::Pending`] on its own, and rows whose
//! snapshot was unreachable or unreadable are flagged `degraded`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use remit_clearance::project;
use remit_core::{PaymentDetails, PaymentSnapshot, PaymentStatus};
use tracing::warn;
use uuid::Uuid;

use crate::{
    contracts::{PaymentStatusQuery, PaymentStatusRow, snapshot_key},
    redis_bus::RedisBus,
};

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Raw snapshot payload, or `None` when nothing was published for the order.
    async fn fetch(&self, order_id: Uuid) -> anyhow::Result<Option<String>>;
}

#[derive(Clone)]
pub struct RedisSnapshotSource {
    bus: RedisBus,
}

impl RedisSnapshotSource {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl SnapshotSource for RedisSnapshotSource {
    async fn fetch(&self, order_id: Uuid) -> anyhow::Result<Option<String>> {
        self.bus.get_string(&snapshot_key(order_id)).await
    }
}

#[derive(Debug)]
pub enum SnapshotRead {
    Found(PaymentSnapshot),
    Absent,
    /// Fetch failed, timed out or returned something undecodable.
    Unreadable(String),
}

#[derive(Clone)]
pub struct SnapshotReader {
    source: Arc<dyn SnapshotSource>,
    timeout: Duration,
}

impl SnapshotReader {
    pub fn new(source: Arc<dyn SnapshotSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub async fn read(&self, order_id: Uuid) -> SnapshotRead {
        let raw = match tokio::time::timeout(self.timeout, self.source.fetch(order_id)).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => return SnapshotRead::Absent,
            Ok(Err(err)) => {
                warn!("order {order_id}: snapshot fetch failed, using default status: {err:#}");
                return SnapshotRead::Unreadable(format!("{err:#}"));
            }
            Err(_) => {
                warn!(
                    "order {order_id}: snapshot fetch timed out after {:?}, using default status",
                    self.timeout
                );
                return SnapshotRead::Unreadable(format!("timed out after {:?}", self.timeout));
            }
        };

        match PaymentSnapshot::decode(&raw) {
            Ok(snapshot) => SnapshotRead::Found(snapshot),
            Err(err) => {
                warn!("order {order_id}: {err}, using default status");
                SnapshotRead::Unreadable(err.to_string())
            }
        }
    }

    /// Resolves every row concurrently, each under its own fetch timeout.
    pub async fn payment_statuses(
        &self,
        queries: &[PaymentStatusQuery],
        now: DateTime<Utc>,
    ) -> Vec<PaymentStatusRow> {
        join_all(queries.iter().map(|query| self.resolve(query, now))).await
    }

    async fn resolve(&self, query: &PaymentStatusQuery, now: DateTime<Utc>) -> PaymentStatusRow {
        let Some(order_id) = query.order_id else {
            return fallback(query, None);
        };

        let snapshot = match self.read(order_id).await {
            SnapshotRead::Found(snapshot) => snapshot,
            SnapshotRead::Absent => return fallback(query, None),
            SnapshotRead::Unreadable(reason) => return fallback(query, Some(reason)),
        };

        if snapshot.obligation_id != query.obligation_id {
            warn!(
                "order {order_id} pays obligation {}, not {}; using default status",
                snapshot.obligation_id, query.obligation_id
            );
            let reason = format!("snapshot belongs to obligation {}", snapshot.obligation_id);
            return fallback(query, Some(reason));
        }

        let cheque_status = match &snapshot.payment {
            PaymentDetails::Cheque(details) => details.cheque_status,
        };

        PaymentStatusRow {
            obligation_id: query.obligation_id,
            order_id: Some(order_id),
            payment_status: project(cheque_status, snapshot.effective_due_date, now),
            cheque_status: Some(cheque_status),
            effective_due_date: Some(snapshot.effective_due_date),
            degraded: false,
            degraded_reason: None,
        }
    }
}

/// Default row; degraded when `reason` says why the snapshot was unusable.
fn fallback(query: &PaymentStatusQuery, reason: Option<String>) -> PaymentStatusRow {
    PaymentStatusRow {
        obligation_id: query.obligation_id,
        order_id: query.order_id,
        payment_status: PaymentStatus::Pending,
        cheque_status: None,
        effective_due_date: None,
        degraded: reason.is_some(),
        degraded_reason: reason,
    }
}
