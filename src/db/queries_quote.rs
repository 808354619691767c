use crate::models::{QuoteLineDraft, QuoteLineRow, QuoteLineStatus};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;

/// 批量写入报价行 (re-finalizing the same quote overwrites its lines)
pub async fn upsert_quote_lines(
    executor: impl PgExecutor<'_>,
    quote_id: i64,
    supplier_id: i64,
    drafts: &[QuoteLineDraft],
) -> Result<u64, sqlx::Error> {
    if drafts.is_empty() {
        return Ok(0);
    }

    let mut query_builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "INSERT INTO quote_lines (
            quote_id, item_id, supplier_id, product_name,
            unit_price, quantity, total_price, lead_time, status
        ) ",
    );

    query_builder.push_values(drafts, |mut b, d| {
        b.push_bind(quote_id)
            .push_bind(d.requested_item_id)
            .push_bind(supplier_id)
            .push_bind(d.product_name.clone())
            .push_bind(d.unit_price.clone())
            .push_bind(d.quantity)
            .push_bind(d.total_price.clone())
            .push_bind(d.lead_time.clone())
            .push_bind(QuoteLineStatus::Received.as_str());
    });
    query_builder.push(
        " ON CONFLICT (quote_id, item_id) DO UPDATE SET
            product_name = EXCLUDED.product_name,
            unit_price = EXCLUDED.unit_price,
            quantity = EXCLUDED.quantity,
            total_price = EXCLUDED.total_price,
            lead_time = EXCLUDED.lead_time",
    );

    let result = query_builder.build().execute(executor).await?;
    tracing::debug!("Upserted {} quote lines for quote {}", result.rows_affected(), quote_id);
    Ok(result.rows_affected())
}

/// 锁定报价行 (scoped through its quote's organization)
pub async fn lock_quote_line(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    quote_line_id: i64,
) -> Result<Option<QuoteLineRow>, sqlx::Error> {
    sqlx::query_as::<_, QuoteLineRow>(
        r#"
        SELECT ql.id, ql.quote_id, ql.item_id, ql.supplier_id, ql.unit_price,
               ql.quantity, ql.status, ql.created_at
        FROM quote_lines ql
        INNER JOIN quotes q ON q.id = ql.quote_id
        WHERE ql.id = $1 AND q.organization_id = $2
        FOR UPDATE OF ql
        "#,
    )
    .bind(quote_line_id)
    .bind(organization_id)
    .fetch_optional(executor)
    .await
}

/// Demote whichever other line of the item is currently accepted.
pub async fn supersede_accepted_lines(
    executor: impl PgExecutor<'_>,
    item_id: i64,
    keep_line_id: i64,
    demoted: QuoteLineStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE quote_lines
        SET status = $1
        WHERE item_id = $2 AND id <> $3 AND status = $4
        "#,
    )
    .bind(demoted.as_str())
    .bind(item_id)
    .bind(keep_line_id)
    .bind(QuoteLineStatus::Accepted.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn mark_line_accepted(
    executor: impl PgExecutor<'_>,
    quote_line_id: i64,
    status: QuoteLineStatus,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE quote_lines SET status = $1, accepted_at = $2 WHERE id = $3")
        .bind(status.as_str())
        .bind(now)
        .bind(quote_line_id)
        .execute(executor)
        .await?;
    Ok(())
}
