use anyhow::Result;
use redis::{AsyncCommands, Client};

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Stores `payload` under `key` and announces it on `channel` in one
    /// MULTI/EXEC, so the stored value is never behind the notification.
    pub async fn store_and_publish(&self, key: &str, channel: &str, payload: &str) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .set(key, payload)
            .ignore()
            .publish(channel, payload)
            .ignore()
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }
}
