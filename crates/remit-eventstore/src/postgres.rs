use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use remit_core::{
    AuditTrail, ChequeInstrument, ChequeStatus, CommitOutcome, EvidenceDocument,
    InstallmentObligation, InstrumentStore, ObligationDirectory, ObligationKind, Registration,
    StatusEvent,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Creates the clearance tables if they are missing. Safe to run on every start.
pub async fn apply_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply clearance schema")?;
    Ok(())
}

#[derive(Clone)]
pub struct PgInstrumentStore {
    pool: PgPool,
}

impl PgInstrumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditTrail for PgInstrumentStore {
    async fn history(&self, instrument_id: Uuid) -> anyhow::Result<Vec<StatusEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, instrument_id, sequence, previous_status, new_status, occurred_at,
                   acting_user, reason, presentation_date, clearance_date, documents, idempotency_key
            FROM cheque_status_events
            WHERE instrument_id = $1
            ORDER BY position
            "#,
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait]
impl InstrumentStore for PgInstrumentStore {
    async fn create(
        &self,
        instrument: &ChequeInstrument,
        opening: &StatusEvent,
        effective_due_date: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cheque_instruments (
                id, obligation_id, cheque_number, cheque_amount, currency, cheque_date,
                status, version, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(instrument.id)
        .bind(instrument.obligation_id)
        .bind(&instrument.cheque_number)
        .bind(instrument.cheque_amount)
        .bind(&instrument.currency)
        .bind(instrument.cheque_date)
        .bind(instrument.status.as_str())
        .bind(to_db_version(instrument.version)?)
        .bind(&instrument.created_by)
        .bind(instrument.created_at)
        .execute(&mut *tx)
        .await?;

        append_event(&mut tx, opening).await?;

        let extended = sqlx::query(
            r#"
            UPDATE installment_obligations
            SET effective_due_date = GREATEST(effective_due_date, $2), updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(instrument.obligation_id)
        .bind(effective_due_date)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if extended == 0 {
            tx.rollback().await?;
            anyhow::bail!("obligation {} not found", instrument.obligation_id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, instrument_id: Uuid) -> anyhow::Result<Option<ChequeInstrument>> {
        let row = sqlx::query(
            r#"
            SELECT id, obligation_id, cheque_number, cheque_amount, currency, cheque_date,
                   status, version, created_by, created_at
            FROM cheque_instruments
            WHERE id = $1
            "#,
        )
        .bind(instrument_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(instrument_from_row).transpose()
    }

    async fn find_by_obligation(
        &self,
        obligation_id: Uuid,
    ) -> anyhow::Result<Vec<ChequeInstrument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, obligation_id, cheque_number, cheque_amount, currency, cheque_date,
                   status, version, created_by, created_at
            FROM cheque_instruments
            WHERE obligation_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(obligation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(instrument_from_row).collect()
    }

    async fn find_by_creation_key(
        &self,
        obligation_id: Uuid,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<ChequeInstrument>> {
        let row = sqlx::query(
            r#"
            SELECT i.id, i.obligation_id, i.cheque_number, i.cheque_amount, i.currency,
                   i.cheque_date, i.status, i.version, i.created_by, i.created_at
            FROM cheque_instruments i
            JOIN cheque_status_events e ON e.instrument_id = i.id AND e.sequence = 1
            WHERE i.obligation_id = $1 AND e.idempotency_key = $2
            ORDER BY e.position
            LIMIT 1
            "#,
        )
        .bind(obligation_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(instrument_from_row).transpose()
    }

    async fn commit(
        &self,
        expected_version: u64,
        event: &StatusEvent,
    ) -> anyhow::Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE cheque_instruments SET status = $2, version = $3 WHERE id = $1 AND version = $4",
        )
        .bind(event.instrument_id)
        .bind(event.new_status.as_str())
        .bind(to_db_version(event.sequence)?)
        .bind(to_db_version(expected_version)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let current = sqlx::query_scalar::<_, i64>(
                "SELECT version FROM cheque_instruments WHERE id = $1",
            )
            .bind(event.instrument_id)
            .fetch_optional(&mut *tx)
            .await?
            .with_context(|| format!("cheque instrument {} not found", event.instrument_id))?;
            tx.rollback().await?;

            return Ok(CommitOutcome::VersionConflict {
                current_version: from_db_version(current)?,
            });
        }

        append_event(&mut tx, event).await?;
        tx.commit().await?;

        Ok(CommitOutcome::Committed)
    }
}

/// The only write path into `cheque_status_events`.
async fn append_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &StatusEvent,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cheque_status_events (
            id, instrument_id, sequence, previous_status, new_status, occurred_at,
            acting_user, reason, presentation_date, clearance_date, documents, idempotency_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(event.id)
    .bind(event.instrument_id)
    .bind(to_db_version(event.sequence)?)
    .bind(event.previous_status.map(|status| status.as_str()))
    .bind(event.new_status.as_str())
    .bind(event.occurred_at)
    .bind(&event.acting_user)
    .bind(&event.reason)
    .bind(event.presentation_date)
    .bind(event.clearance_date)
    .bind(Json(&event.documents))
    .bind(&event.idempotency_key)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn instrument_from_row(row: &PgRow) -> anyhow::Result<ChequeInstrument> {
    let status: String = row.try_get("status")?;
    let version: i64 = row.try_get("version")?;

    Ok(ChequeInstrument {
        id: row.try_get("id")?,
        obligation_id: row.try_get("obligation_id")?,
        cheque_number: row.try_get("cheque_number")?,
        cheque_amount: row.try_get::<Decimal, _>("cheque_amount")?,
        currency: row.try_get("currency")?,
        cheque_date: row.try_get::<NaiveDate, _>("cheque_date")?,
        status: status.parse()?,
        version: from_db_version(version)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn event_from_row(row: &PgRow) -> anyhow::Result<StatusEvent> {
    let previous_status: Option<String> = row.try_get("previous_status")?;
    let new_status: String = row.try_get("new_status")?;
    let sequence: i64 = row.try_get("sequence")?;
    let Json(documents): Json<Vec<EvidenceDocument>> = row.try_get("documents")?;

    Ok(StatusEvent {
        id: row.try_get("id")?,
        instrument_id: row.try_get("instrument_id")?,
        sequence: from_db_version(sequence)?,
        previous_status: previous_status
            .map(|status| status.parse::<ChequeStatus>())
            .transpose()?,
        new_status: new_status.parse()?,
        occurred_at: row.try_get("occurred_at")?,
        acting_user: row.try_get("acting_user")?,
        reason: row.try_get("reason")?,
        presentation_date: row.try_get("presentation_date")?,
        clearance_date: row.try_get("clearance_date")?,
        documents,
        idempotency_key: row.try_get("idempotency_key")?,
    })
}

fn to_db_version(version: u64) -> anyhow::Result<i64> {
    i64::try_from(version).context("version does not fit BIGINT")
}

fn from_db_version(version: i64) -> anyhow::Result<u64> {
    u64::try_from(version).context("negative version stored")
}

#[derive(Clone)]
pub struct PgObligationDirectory {
    pool: PgPool,
}

impl PgObligationDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObligationDirectory for PgObligationDirectory {
    async fn register(&self, obligation: &InstallmentObligation) -> anyhow::Result<Registration> {
        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO installment_obligations (
                id, kind, original_due_date, effective_due_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(obligation.id)
        .bind(obligation.kind.as_str())
        .bind(obligation.original_due_date)
        .bind(obligation.effective_due_date)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if inserted == 0 {
            Registration::AlreadyExists
        } else {
            Registration::Registered
        })
    }

    async fn find(&self, obligation_id: Uuid) -> anyhow::Result<Option<InstallmentObligation>> {
        let row = sqlx::query(
            "SELECT id, kind, original_due_date, effective_due_date FROM installment_obligations WHERE id = $1",
        )
        .bind(obligation_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.try_get("kind")?;
        Ok(Some(InstallmentObligation {
            id: row.try_get("id")?,
            kind: kind.parse::<ObligationKind>()?,
            original_due_date: row.try_get("original_due_date")?,
            effective_due_date: row.try_get("effective_due_date")?,
        }))
    }
}
