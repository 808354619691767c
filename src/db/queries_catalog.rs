use crate::models::{ItemComponent, ItemSpecStatus, PaymentStatus, RequestedItem};
use bigdecimal::BigDecimal;
use sqlx::postgres::PgExecutor;
use sqlx::FromRow;

/// 需求项状态列
#[derive(Debug, Clone, FromRow)]
pub struct ItemStatusRow {
    pub id: i64,
    pub status: String,
    pub payment_status: String,
}

/// 查询询价单下的全部需求项
pub async fn list_batch_items(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    quote_request_id: i64,
) -> Result<Vec<RequestedItem>, sqlx::Error> {
    sqlx::query_as::<_, RequestedItem>(
        r#"
        SELECT ri.id, ri.project_id, ri.name, ri.sku, ri.model_number, ri.brand,
               ri.quantity, ri.unit_type, ri.trade_price
        FROM requested_items ri
        INNER JOIN quote_request_items qri ON qri.item_id = ri.id
        WHERE qri.quote_request_id = $1
          AND ri.organization_id = $2
        ORDER BY ri.id
        "#,
    )
    .bind(quote_request_id)
    .bind(organization_id)
    .fetch_all(executor)
    .await
}

pub async fn get_item(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    item_id: i64,
) -> Result<Option<RequestedItem>, sqlx::Error> {
    sqlx::query_as::<_, RequestedItem>(
        r#"
        SELECT id, project_id, name, sku, model_number, brand, quantity, unit_type, trade_price
        FROM requested_items
        WHERE id = $1 AND organization_id = $2
        "#,
    )
    .bind(item_id)
    .bind(organization_id)
    .fetch_optional(executor)
    .await
}

/// Row-lock items for the rest of the transaction.
pub async fn lock_items(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    item_ids: &[i64],
) -> Result<Vec<ItemStatusRow>, sqlx::Error> {
    sqlx::query_as::<_, ItemStatusRow>(
        r#"
        SELECT id, status, payment_status
        FROM requested_items
        WHERE id = ANY($1) AND organization_id = $2
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(item_ids)
    .bind(organization_id)
    .fetch_all(executor)
    .await
}

pub async fn list_components(
    executor: impl PgExecutor<'_>,
    item_ids: &[i64],
) -> Result<Vec<ItemComponent>, sqlx::Error> {
    sqlx::query_as::<_, ItemComponent>(
        r#"
        SELECT id, item_id, name, sku, quantity, unit_price
        FROM item_components
        WHERE item_id = ANY($1)
        ORDER BY item_id, id
        "#,
    )
    .bind(item_ids)
    .fetch_all(executor)
    .await
}

pub async fn update_item_quantity(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    item_id: i64,
    quantity: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE requested_items
        SET quantity = $1, updated_at = now()
        WHERE id = $2 AND organization_id = $3
        "#,
    )
    .bind(quantity)
    .bind(item_id)
    .bind(organization_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_item_status(
    executor: impl PgExecutor<'_>,
    item_id: i64,
    status: ItemSpecStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE requested_items SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status.as_str())
        .bind(item_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_trade_price(
    executor: impl PgExecutor<'_>,
    item_id: i64,
    trade_price: &BigDecimal,
    status: ItemSpecStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE requested_items
        SET trade_price = $1, status = $2, updated_at = now()
        WHERE id = $3
        "#,
    )
    .bind(trade_price)
    .bind(status.as_str())
    .bind(item_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// 下单后批量更新状态
pub async fn mark_items_ordered(
    executor: impl PgExecutor<'_>,
    item_ids: &[i64],
    status: ItemSpecStatus,
    payment_status: PaymentStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE requested_items
        SET status = $1, payment_status = $2, updated_at = now()
        WHERE id = ANY($3)
        "#,
    )
    .bind(status.as_str())
    .bind(payment_status.as_str())
    .bind(item_ids)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
