use async_trait::async_trait;
use remit_core::{PaymentSnapshot, StatusPublisher};
use tracing::debug;

use crate::{
    contracts::{STATUS_CHANNEL, snapshot_key},
    redis_bus::RedisBus,
};

/// Publishes payment snapshots to the obligation-owning service through Redis.
#[derive(Clone)]
pub struct RedisStatusPublisher {
    bus: RedisBus,
}

impl RedisStatusPublisher {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl StatusPublisher for RedisStatusPublisher {
    async fn publish(&self, snapshot: &PaymentSnapshot) -> anyhow::Result<()> {
        let payload = snapshot.encode()?;
        self.bus
            .store_and_publish(&snapshot_key(snapshot.order_id), STATUS_CHANNEL, &payload)
            .await?;
        debug!(
            "published snapshot v{} for order {}",
            snapshot.instrument_version, snapshot.order_id
        );
        Ok(())
    }
}
