use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use remit_clearance::project;
use remit_core::{
    ChequeStatus, ClearanceError, InstallmentObligation, ObligationDirectory, ObligationKind,
    PaymentDetails, PaymentSnapshot, Registration, TransitionEvidence,
};
use remit_eventstore::{PgInstrumentStore, PgObligationDirectory, apply_schema};
use remit_ledger::{ChequeLedger, NewCheque, PublishPolicy};
use remit_platform::{
    CreateOrderRequest, CreateOrderResponse, ObligationView, OrderHistoryResponse, OrderView,
    PaymentRequest, RedisBus, RedisStatusPublisher, RegisterObligationRequest, ServiceConfig,
    UpdateChequeStatusRequest, UpdateChequeStatusResponse, connect_database,
};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    ledger: Arc<ChequeLedger>,
    obligations: Arc<dyn ObligationDirectory>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "remit_gateway=info,remit_ledger=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let obligations: Arc<dyn ObligationDirectory> = Arc::new(PgObligationDirectory::new(pool.clone()));
    let policy = PublishPolicy {
        timeout: config.publish_timeout,
        max_attempts: config.publish_max_attempts,
        ..PublishPolicy::default()
    };
    let ledger = ChequeLedger::new(
        Arc::new(PgInstrumentStore::new(pool)),
        obligations.clone(),
        Arc::new(RedisStatusPublisher::new(redis)),
        policy,
    );

    let state = AppState {
        ledger: Arc::new(ledger),
        obligations,
    };

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/obligations", post(register_obligation))
        .route("/obligations/{obligation_id}", get(get_obligation))
        .route("/orders", post(create_order))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/status", post(update_cheque_status))
        .route("/orders/{order_id}/history", get(order_history))
        .route("/orders/{order_id}/publish", post(republish_order))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn register_obligation(
    State(state): State<AppState>,
    Json(payload): Json<RegisterObligationRequest>,
) -> Result<(StatusCode, Json<ObligationView>), (StatusCode, String)> {
    let kind = payload
        .kind
        .parse::<ObligationKind>()
        .map_err(invalid_request)?;
    let obligation_id = payload.obligation_id.unwrap_or_else(Uuid::new_v4);

    let obligation = InstallmentObligation::new(obligation_id, kind, payload.original_due_date);
    let registration = state
        .obligations
        .register(&obligation)
        .await
        .map_err(internal_error)?;
    if registration == Registration::AlreadyExists {
        return Err((
            StatusCode::CONFLICT,
            format!("obligation {obligation_id} is already registered"),
        ));
    }
    info!(
        "obligation {} registered as {} due {}",
        obligation.id,
        obligation.kind.as_str(),
        obligation.original_due_date
    );

    Ok((StatusCode::CREATED, Json(obligation.into())))
}

async fn get_obligation(
    State(state): State<AppState>,
    Path(obligation_id): Path<Uuid>,
) -> Result<Json<ObligationView>, (StatusCode, String)> {
    let obligation = state
        .obligations
        .find(obligation_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("obligation {obligation_id} not found"),
            )
        })?;

    Ok(Json(obligation.into()))
}

async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), (StatusCode, String)> {
    let request = validate_order_request(payload).map_err(invalid_request)?;
    let obligation_id = request.obligation_id;

    let instrument = state
        .ledger
        .create(request)
        .await
        .map_err(clearance_error)?;

    let snapshot = state
        .ledger
        .snapshot(instrument.id)
        .await
        .map_err(clearance_error)?;

    let response = CreateOrderResponse {
        order_id: instrument.id,
        obligation_id,
        status: instrument.status,
        effective_due_date: snapshot.effective_due_date,
        created_at: instrument.created_at,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

async fn update_cheque_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateChequeStatusRequest>,
) -> Result<Json<UpdateChequeStatusResponse>, (StatusCode, String)> {
    let (target, acting_user, evidence) =
        validate_status_request(payload).map_err(invalid_request)?;

    let event = state
        .ledger
        .transition(order_id, target, &acting_user, evidence)
        .await
        .map_err(clearance_error)?;

    Ok(Json(UpdateChequeStatusResponse {
        order_id,
        status: event.new_status,
        previous_status: event.previous_status,
        sequence: event.sequence,
        occurred_at: event.occurred_at,
    }))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, (StatusCode, String)> {
    let (instrument, snapshot) = state
        .ledger
        .view(order_id)
        .await
        .map_err(clearance_error)?;

    let PaymentDetails::Cheque(details) = &snapshot.payment;
    let notes = details.to_annotations().map_err(internal_error)?;
    let payment_status = project(details.cheque_status, snapshot.effective_due_date, Utc::now());

    Ok(Json(OrderView {
        order_id: instrument.id,
        obligation_id: instrument.obligation_id,
        amount: instrument.cheque_amount,
        currency: instrument.currency,
        status: instrument.status,
        payment_status,
        notes,
        snapshot,
    }))
}

async fn order_history(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderHistoryResponse>, (StatusCode, String)> {
    let (_, events) = state
        .ledger
        .get(order_id)
        .await
        .map_err(clearance_error)?;

    Ok(Json(OrderHistoryResponse { order_id, events }))
}

async fn republish_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentSnapshot>, (StatusCode, String)> {
    let snapshot = state
        .ledger
        .republish(order_id)
        .await
        .map_err(clearance_error)?;

    Ok(Json(snapshot))
}

fn validate_order_request(payload: CreateOrderRequest) -> AnyResult<NewCheque> {
    if payload.amount <= Decimal::ZERO {
        anyhow::bail!("amount must be positive");
    }
    let currency = normalize_currency(&payload.currency)?;

    let created_by = payload.created_by.trim().to_string();
    if created_by.is_empty() {
        anyhow::bail!("created_by is required");
    }

    let PaymentRequest::Cheque(cheque) = payload.payment;
    let cheque_number = cheque.cheque_number.trim().to_string();
    if cheque_number.is_empty() {
        anyhow::bail!("cheque_number is required");
    }

    let idempotency_key = payload
        .idempotency_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    Ok(NewCheque {
        obligation_id: payload.obligation_id,
        cheque_number,
        cheque_amount: payload.amount,
        currency,
        cheque_date: cheque.cheque_date,
        created_by,
        documents: cheque.evidence_documents,
        idempotency_key,
    })
}

fn validate_status_request(
    payload: UpdateChequeStatusRequest,
) -> AnyResult<(ChequeStatus, String, TransitionEvidence)> {
    let target = payload.target_status.parse::<ChequeStatus>()?;

    let acting_user = payload.acting_user.trim().to_string();
    if acting_user.is_empty() {
        anyhow::bail!("acting_user is required");
    }

    let idempotency_key = payload
        .idempotency_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    let evidence = TransitionEvidence {
        reason: payload.reason,
        presentation_date: payload.presentation_date,
        clearance_date: payload.clearance_date,
        documents: payload.evidence_documents,
        idempotency_key,
    };

    Ok((target, acting_user, evidence))
}

fn normalize_currency(value: &str) -> AnyResult<String> {
    let normalized = value.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        anyhow::bail!("currency is required");
    }
    if normalized.len() != 3 {
        anyhow::bail!("currency must be a 3-letter code");
    }
    Ok(normalized)
}

fn clearance_error(err: ClearanceError) -> (StatusCode, String) {
    let status = match &err {
        ClearanceError::MissingEvidence { .. } | ClearanceError::IdempotencyKeyReused(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ClearanceError::InvalidTransition { .. } | ClearanceError::ConcurrentModification(_) => {
            StatusCode::CONFLICT
        }
        ClearanceError::InstrumentNotFound(_) | ClearanceError::ObligationNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ClearanceError::ObligationNotInstallment(_) => StatusCode::BAD_REQUEST,
        ClearanceError::UpstreamUnavailable(_) => {
            warn!("{err}");
            StatusCode::SERVICE_UNAVAILABLE
        }
        ClearanceError::Storage(_) => {
            error!("{err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, err.to_string())
}

fn invalid_request(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    error!("{err}");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
