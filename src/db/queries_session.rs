use crate::models::status::parse_column;
use crate::models::{
    ReconciliationSession, RequestLifecycle, ReviewedResult, SessionDiscrepancies, SessionState,
    SupplierInfo, SupplierRequestRow,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::FromRow;

/// 对账会话行
#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    organization_id: i64,
    supplier_request_id: i64,
    quote_id: i64,
    version: i32,
    state: String,
    supplier_info: Json<SupplierInfo>,
    results: Json<Vec<ReviewedResult>>,
    discrepancies: Json<SessionDiscrepancies>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for ReconciliationSession {
    type Error = sqlx::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ReconciliationSession {
            id: row.id,
            organization_id: row.organization_id,
            supplier_request_id: row.supplier_request_id,
            quote_id: row.quote_id,
            version: row.version,
            state: parse_column::<SessionState>(&row.state)?,
            supplier_info: row.supplier_info.0,
            results: row.results.0,
            discrepancies: row.discrepancies.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            finalized_at: row.finalized_at,
        })
    }
}

const SUPPLIER_REQUEST_COLUMNS: &str = r#"
    sr.id, sr.quote_request_id, sr.supplier_id, s.name AS supplier_name, sr.status,
    sr.viewed_at, sr.responded_at, sr.decline_reason
"#;

/// 查询供应商询价 (row-locked for the transaction)
pub async fn lock_supplier_request(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    supplier_request_id: i64,
) -> Result<Option<SupplierRequestRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM supplier_requests sr INNER JOIN suppliers s ON s.id = sr.supplier_id \
         WHERE sr.id = $1 AND sr.organization_id = $2 FOR UPDATE OF sr",
        SUPPLIER_REQUEST_COLUMNS
    );
    sqlx::query_as::<_, SupplierRequestRow>(&sql)
        .bind(supplier_request_id)
        .bind(organization_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_supplier_request(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    supplier_request_id: i64,
) -> Result<Option<SupplierRequestRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM supplier_requests sr INNER JOIN suppliers s ON s.id = sr.supplier_id \
         WHERE sr.id = $1 AND sr.organization_id = $2",
        SUPPLIER_REQUEST_COLUMNS
    );
    sqlx::query_as::<_, SupplierRequestRow>(&sql)
        .bind(supplier_request_id)
        .bind(organization_id)
        .fetch_optional(executor)
        .await
}

pub async fn list_supplier_requests(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    quote_request_id: i64,
) -> Result<Vec<SupplierRequestRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM supplier_requests sr INNER JOIN suppliers s ON s.id = sr.supplier_id \
         WHERE sr.quote_request_id = $1 AND sr.organization_id = $2 ORDER BY sr.id",
        SUPPLIER_REQUEST_COLUMNS
    );
    sqlx::query_as::<_, SupplierRequestRow>(&sql)
        .bind(quote_request_id)
        .bind(organization_id)
        .fetch_all(executor)
        .await
}

pub async fn quote_request_exists(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    quote_request_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM quote_requests WHERE id = $1 AND organization_id = $2)",
    )
    .bind(quote_request_id)
    .bind(organization_id)
    .fetch_one(executor)
    .await
}

/// Persist a lifecycle state; viewed_at is only stamped the first time.
pub async fn update_supplier_request_state(
    executor: impl PgExecutor<'_>,
    supplier_request_id: i64,
    state: RequestLifecycle,
    now: DateTime<Utc>,
    decline_reason: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE supplier_requests
        SET status = $1,
            viewed_at = CASE WHEN $1 = 'viewed' THEN COALESCE(viewed_at, $2) ELSE viewed_at END,
            responded_at = CASE WHEN $1 IN ('submitted', 'declined') THEN $2 ELSE responded_at END,
            decline_reason = COALESCE($3, decline_reason)
        WHERE id = $4
        "#,
    )
    .bind(state.as_str())
    .bind(now)
    .bind(decline_reason)
    .bind(supplier_request_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_quote(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    supplier_request_id: i64,
    supplier_id: i64,
    info: &SupplierInfo,
    notes: Option<&str>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO quotes (
            organization_id, supplier_request_id, supplier_id, quote_number,
            quote_date, valid_until, subtotal, shipping, taxes, total, notes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(organization_id)
    .bind(supplier_request_id)
    .bind(supplier_id)
    .bind(&info.quote_number)
    .bind(info.quote_date)
    .bind(info.valid_until)
    .bind(&info.subtotal)
    .bind(&info.shipping)
    .bind(&info.taxes)
    .bind(&info.total)
    .bind(notes)
    .fetch_one(executor)
    .await
}

pub async fn next_session_version(
    executor: impl PgExecutor<'_>,
    supplier_request_id: i64,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM reconciliation_sessions WHERE supplier_request_id = $1",
    )
    .bind(supplier_request_id)
    .fetch_one(executor)
    .await
}

/// Retire every earlier round of this supplier request.
pub async fn supersede_sessions(
    executor: impl PgExecutor<'_>,
    supplier_request_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE reconciliation_sessions
        SET state = $1, updated_at = $2
        WHERE supplier_request_id = $3 AND state <> $1
        "#,
    )
    .bind(SessionState::Superseded.as_str())
    .bind(now)
    .bind(supplier_request_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a new session round, returning its id.
pub async fn insert_session(
    executor: impl PgExecutor<'_>,
    session: &ReconciliationSession,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO reconciliation_sessions (
            organization_id, supplier_request_id, quote_id, version, state,
            supplier_info, results, discrepancies, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(session.organization_id)
    .bind(session.supplier_request_id)
    .bind(session.quote_id)
    .bind(session.version)
    .bind(session.state.as_str())
    .bind(Json(&session.supplier_info))
    .bind(Json(&session.results))
    .bind(Json(&session.discrepancies))
    .bind(session.created_at)
    .bind(session.updated_at)
    .fetch_one(executor)
    .await
}

const SESSION_COLUMNS: &str = r#"
    id, organization_id, supplier_request_id, quote_id, version, state,
    supplier_info, results, discrepancies, created_at, updated_at, finalized_at
"#;

pub async fn get_session(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    session_id: i64,
) -> Result<Option<ReconciliationSession>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM reconciliation_sessions WHERE id = $1 AND organization_id = $2",
        SESSION_COLUMNS
    );
    sqlx::query_as::<_, SessionRow>(&sql)
        .bind(session_id)
        .bind(organization_id)
        .fetch_optional(executor)
        .await?
        .map(ReconciliationSession::try_from)
        .transpose()
}

pub async fn lock_session(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    session_id: i64,
) -> Result<Option<ReconciliationSession>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM reconciliation_sessions WHERE id = $1 AND organization_id = $2 FOR UPDATE",
        SESSION_COLUMNS
    );
    sqlx::query_as::<_, SessionRow>(&sql)
        .bind(session_id)
        .bind(organization_id)
        .fetch_optional(executor)
        .await?
        .map(ReconciliationSession::try_from)
        .transpose()
}

/// Only review annotations, state and timestamps change after submission.
pub async fn update_session(
    executor: impl PgExecutor<'_>,
    session: &ReconciliationSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE reconciliation_sessions
        SET state = $1, results = $2, updated_at = $3, finalized_at = $4
        WHERE id = $5
        "#,
    )
    .bind(session.state.as_str())
    .bind(Json(&session.results))
    .bind(session.updated_at)
    .bind(session.finalized_at)
    .bind(session.id)
    .execute(executor)
    .await?;
    Ok(())
}
