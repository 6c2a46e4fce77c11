use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result as AnyResult};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use futures_util::StreamExt;
use redis::Msg;
use remit_clearance::project;
use remit_core::{PaymentDetails, PaymentSnapshot};
use remit_platform::{
    PaymentStatusBatchRequest, PaymentStatusBatchResponse, RedisBus, RedisSnapshotSource,
    STATUS_CHANNEL, ServiceConfig, SnapshotReader,
};
use tracing::{error, info, warn};

const MAX_BATCH_ROWS: usize = 500;
const FEED_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
    reader: SnapshotReader,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "remit_board=info".to_string()),
        )
        .init();

    let config = ServiceConfig::reader_from_env("0.0.0.0:8090")?;
    let redis = RedisBus::connect(&config.redis_url)?;

    tokio::spawn(watch_status_feed(redis.clone()));

    let state = AppState {
        reader: SnapshotReader::new(
            Arc::new(RedisSnapshotSource::new(redis)),
            config.fetch_timeout,
        ),
    };
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/obligations/payment-status", post(payment_status_batch))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("board listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn payment_status_batch(
    State(state): State<AppState>,
    Json(payload): Json<PaymentStatusBatchRequest>,
) -> Result<Json<PaymentStatusBatchResponse>, (StatusCode, String)> {
    if payload.items.len() > MAX_BATCH_ROWS {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("at most {MAX_BATCH_ROWS} rows per request"),
        ));
    }

    let now = Utc::now();
    let items = state.reader.payment_statuses(&payload.items, now).await;
    let reasons: Vec<&str> = items
        .iter()
        .filter_map(|row| row.degraded_reason.as_deref())
        .collect();
    if let Some(first) = reasons.first() {
        warn!(
            "{} of {} payment status rows degraded, first because: {first}",
            reasons.len(),
            items.len()
        );
    }

    Ok(Json(PaymentStatusBatchResponse {
        generated_at: now,
        items,
    }))
}

/// Logs every status change announced by the clearance service. Reads go
/// through the stored snapshot, so a missed notification loses nothing.
async fn watch_status_feed(redis: RedisBus) {
    loop {
        if let Err(err) = follow_status_feed(&redis).await {
            error!("status feed interrupted: {err:#}");
        }
        tokio::time::sleep(FEED_RECONNECT_DELAY).await;
    }
}

async fn follow_status_feed(redis: &RedisBus) -> AnyResult<()> {
    let mut pubsub = redis.client().get_async_pubsub().await?;
    pubsub.subscribe(STATUS_CHANNEL).await?;
    let mut messages = pubsub.on_message();

    info!("board subscribed to {STATUS_CHANNEL}");

    loop {
        let msg = messages
            .next()
            .await
            .with_context(|| format!("{STATUS_CHANNEL} stream ended unexpectedly"))?;
        if let Err(err) = log_status_change(msg) {
            warn!("ignoring unreadable status notification: {err:#}");
        }
    }
}

fn log_status_change(msg: Msg) -> AnyResult<()> {
    let payload: String = msg.get_payload()?;
    let snapshot = PaymentSnapshot::decode(&payload)?;
    let PaymentDetails::Cheque(details) = &snapshot.payment;

    info!(
        "order {} for obligation {}: cheque {} now {} ({})",
        snapshot.order_id,
        snapshot.obligation_id,
        details.cheque_number,
        details.cheque_status,
        project(details.cheque_status, snapshot.effective_due_date, Utc::now())
    );
    Ok(())
}
