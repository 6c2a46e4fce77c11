//! Runs against a real Postgres when `DATABASE_URL` is set and is a no-op
//! otherwise. Every test works on freshly generated ids, so a shared database
//! is fine.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use remit_core::{
    AuditTrail, ChequeInstrument, ChequeStatus, CommitOutcome, EvidenceDocument,
    InstallmentObligation, InstrumentStore, ObligationDirectory, ObligationKind, Registration,
    StatusEvent, TransitionEvidence,
};
use remit_eventstore::{PgInstrumentStore, PgObligationDirectory, apply_schema};
use rust_decimal::Decimal;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::sync::OnceCell;
use uuid::Uuid;

static SCHEMA: OnceCell<()> = OnceCell::const_new();

async fn database() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    SCHEMA
        .get_or_init(|| async { apply_schema(&pool).await.expect("apply schema") })
        .await;
    Some(pool)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// Postgres keeps microseconds
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

async fn installment(pool: &PgPool, due: NaiveDate) -> InstallmentObligation {
    let obligation = InstallmentObligation::new(Uuid::new_v4(), ObligationKind::Installment, due);
    let registration = PgObligationDirectory::new(pool.clone())
        .register(&obligation)
        .await
        .unwrap();
    assert_eq!(registration, Registration::Registered);
    obligation
}

fn cheque(obligation_id: Uuid, cheque_date: NaiveDate) -> ChequeInstrument {
    ChequeInstrument {
        id: Uuid::new_v4(),
        obligation_id,
        cheque_number: "318204".to_string(),
        cheque_amount: Decimal::new(2_450_050, 2),
        currency: "INR".to_string(),
        cheque_date,
        status: ChequeStatus::Received,
        version: 1,
        created_by: "accounts-clerk".to_string(),
        created_at: now(),
    }
}

fn scan(name: &str) -> EvidenceDocument {
    EvidenceDocument {
        document_hash: format!("sha256:{name}"),
        document_asset_url: format!("s3://cheques/{name}.pdf"),
        document_name: format!("{name}.pdf"),
    }
}

async fn due_date(pool: &PgPool, obligation_id: Uuid) -> NaiveDate {
    PgObligationDirectory::new(pool.clone())
        .find(obligation_id)
        .await
        .unwrap()
        .unwrap()
        .effective_due_date
}

#[tokio::test]
async fn history_round_trips_in_commit_order() {
    let Some(pool) = database().await else { return };
    let store = PgInstrumentStore::new(pool.clone());
    let obligation = installment(&pool, date(2025, 9, 15)).await;
    let instrument = cheque(obligation.id, date(2025, 9, 10));

    let mut opening = StatusEvent::creation(&instrument, vec![scan("front"), scan("back")], now());
    opening.idempotency_key = Some("order-req-5".to_string());
    store
        .create(&instrument, &opening, obligation.effective_due_date)
        .await
        .unwrap();

    let presented = StatusEvent::transition(
        &instrument,
        ChequeStatus::Presented,
        "admin",
        TransitionEvidence {
            documents: vec![scan("deposit-slip")],
            ..TransitionEvidence::presented_on(date(2025, 9, 11))
        },
        now(),
    );
    assert_eq!(
        store.commit(1, &presented).await.unwrap(),
        CommitOutcome::Committed
    );

    let history = store.history(instrument.id).await.unwrap();
    assert_eq!(history, vec![opening, presented]);

    let stored = store.find(instrument.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ChequeStatus::Presented);
    assert_eq!(stored.version, 2);
    assert_eq!(stored.cheque_amount, instrument.cheque_amount);
}

#[tokio::test]
async fn stale_version_is_a_conflict_and_writes_nothing() {
    let Some(pool) = database().await else { return };
    let store = PgInstrumentStore::new(pool.clone());
    let obligation = installment(&pool, date(2025, 9, 15)).await;
    let instrument = cheque(obligation.id, date(2025, 9, 10));
    store
        .create(
            &instrument,
            &StatusEvent::creation(&instrument, vec![], now()),
            obligation.effective_due_date,
        )
        .await
        .unwrap();

    let presented = StatusEvent::transition(
        &instrument,
        ChequeStatus::Presented,
        "admin-a",
        TransitionEvidence::presented_on(date(2025, 9, 11)),
        now(),
    );
    store.commit(1, &presented).await.unwrap();

    let returned = StatusEvent::transition(
        &instrument,
        ChequeStatus::Returned,
        "admin-b",
        TransitionEvidence::with_reason("account closed"),
        now(),
    );
    let outcome = store.commit(1, &returned).await.unwrap();

    assert_eq!(outcome, CommitOutcome::VersionConflict { current_version: 2 });
    let history = store.history(instrument.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].acting_user, "admin-a");
    let stored = store.find(instrument.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ChequeStatus::Presented);
}

#[tokio::test]
async fn create_extends_the_due_date_in_the_same_transaction() {
    let Some(pool) = database().await else { return };
    let store = PgInstrumentStore::new(pool.clone());
    let obligation = installment(&pool, date(2025, 9, 15)).await;

    let later = cheque(obligation.id, date(2025, 9, 30));
    let opening = StatusEvent::creation(&later, vec![], now());
    store.create(&later, &opening, date(2025, 9, 30)).await.unwrap();
    assert_eq!(due_date(&pool, obligation.id).await, date(2025, 9, 30));

    let earlier = cheque(obligation.id, date(2025, 9, 20));
    let opening = StatusEvent::creation(&earlier, vec![], now());
    store.create(&earlier, &opening, date(2025, 9, 20)).await.unwrap();
    assert_eq!(due_date(&pool, obligation.id).await, date(2025, 9, 30));

    // same instrument id again: the insert fails and the extension rolls back
    let opening = StatusEvent::creation(&later, vec![], now());
    assert!(store.create(&later, &opening, date(2025, 10, 31)).await.is_err());
    assert_eq!(due_date(&pool, obligation.id).await, date(2025, 9, 30));
    assert_eq!(store.history(later.id).await.unwrap().len(), 1);

    let orphan = cheque(Uuid::new_v4(), date(2025, 9, 30));
    let opening = StatusEvent::creation(&orphan, vec![], now());
    assert!(store.create(&orphan, &opening, date(2025, 9, 30)).await.is_err());
    assert!(store.find(orphan.id).await.unwrap().is_none());
}

#[tokio::test]
async fn instruments_are_found_by_obligation_and_creation_key() {
    let Some(pool) = database().await else { return };
    let store = PgInstrumentStore::new(pool.clone());
    let obligation = installment(&pool, date(2025, 9, 15)).await;

    let keyed = cheque(obligation.id, date(2025, 9, 10));
    let mut opening = StatusEvent::creation(&keyed, vec![], now());
    opening.idempotency_key = Some("order-req-12".to_string());
    store.create(&keyed, &opening, date(2025, 9, 15)).await.unwrap();

    let mut second = cheque(obligation.id, date(2025, 9, 12));
    second.created_at = keyed.created_at + chrono::Duration::seconds(1);
    store
        .create(&second, &StatusEvent::creation(&second, vec![], now()), date(2025, 9, 15))
        .await
        .unwrap();

    let ids: Vec<_> = store
        .find_by_obligation(obligation.id)
        .await
        .unwrap()
        .into_iter()
        .map(|instrument| instrument.id)
        .collect();
    assert_eq!(ids, vec![keyed.id, second.id]);

    let found = store
        .find_by_creation_key(obligation.id, "order-req-12")
        .await
        .unwrap();
    assert_eq!(found.map(|instrument| instrument.id), Some(keyed.id));
    assert!(
        store
            .find_by_creation_key(Uuid::new_v4(), "order-req-12")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn registering_an_existing_obligation_changes_nothing() {
    let Some(pool) = database().await else { return };
    let directory = PgObligationDirectory::new(pool.clone());
    let obligation = installment(&pool, date(2025, 9, 15)).await;

    let clash = InstallmentObligation::new(obligation.id, ObligationKind::OneTime, date(2026, 1, 1));
    assert_eq!(
        directory.register(&clash).await.unwrap(),
        Registration::AlreadyExists
    );

    let stored = directory.find(obligation.id).await.unwrap().unwrap();
    assert_eq!(stored.kind, ObligationKind::Installment);
    assert_eq!(stored.original_due_date, date(2025, 9, 15));
}
