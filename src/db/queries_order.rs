use crate::models::{
    ClientInvoice, OrderLineItem, OrderRow, OrderStatus, PlannedLine, RequestedItem, SupplierGroup,
    SupplierQuoteRef,
};
use bigdecimal::BigDecimal;
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;

/// 查询客户发票
pub async fn get_invoice(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    invoice_id: i64,
) -> Result<Option<ClientInvoice>, sqlx::Error> {
    sqlx::query_as::<_, ClientInvoice>(
        r#"
        SELECT id, organization_id, project_id, invoice_number, amount_paid
        FROM client_invoices
        WHERE id = $1 AND organization_id = $2
        "#,
    )
    .bind(invoice_id)
    .bind(organization_id)
    .fetch_optional(executor)
    .await
}

/// 发票下的需求项
pub async fn list_invoice_items(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    invoice_id: i64,
) -> Result<Vec<RequestedItem>, sqlx::Error> {
    sqlx::query_as::<_, RequestedItem>(
        r#"
        SELECT ri.id, ri.project_id, ri.name, ri.sku, ri.model_number, ri.brand,
               ri.quantity, ri.unit_type, ri.trade_price
        FROM requested_items ri
        INNER JOIN client_invoice_items cii ON cii.item_id = ri.id
        WHERE cii.invoice_id = $1 AND ri.organization_id = $2
        ORDER BY ri.id
        "#,
    )
    .bind(invoice_id)
    .bind(organization_id)
    .fetch_all(executor)
    .await
}

/// Accepted quote per item, or the most recent one when none is accepted.
pub async fn list_order_quotes(
    executor: impl PgExecutor<'_>,
    item_ids: &[i64],
) -> Result<Vec<SupplierQuoteRef>, sqlx::Error> {
    sqlx::query_as::<_, SupplierQuoteRef>(
        r#"
        SELECT DISTINCT ON (ql.item_id)
               ql.item_id,
               ql.supplier_id,
               s.name AS supplier_name,
               ql.quote_id,
               ql.id AS quote_line_id,
               ql.unit_price,
               q.shipping,
               (ql.status = 'accepted') AS accepted,
               s.default_deposit_percent
        FROM quote_lines ql
        INNER JOIN quotes q ON q.id = ql.quote_id
        INNER JOIN suppliers s ON s.id = ql.supplier_id
        WHERE ql.item_id = ANY($1)
        ORDER BY ql.item_id, (ql.status = 'accepted') DESC, ql.created_at DESC, ql.id DESC
        "#,
    )
    .bind(item_ids)
    .fetch_all(executor)
    .await
}

/// Items already on a non-cancelled order.
pub async fn list_already_ordered(
    executor: impl PgExecutor<'_>,
    item_ids: &[i64],
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT DISTINCT oli.item_id
        FROM order_line_items oli
        INNER JOIN orders o ON o.id = oli.order_id
        WHERE oli.item_id = ANY($1)
          AND oli.is_component = FALSE
          AND o.status <> $2
        "#,
    )
    .bind(item_ids)
    .bind(OrderStatus::Cancelled.as_str())
    .fetch_all(executor)
    .await
}

/// Serialize numbering for one organization and year until the transaction ends.
pub async fn lock_order_numbering(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    year: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
        .bind(format!("orders:{}:{}", organization_id, year))
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn count_orders_for_year(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    year: i32,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders WHERE organization_id = $1 AND order_year = $2",
    )
    .bind(organization_id)
    .bind(year)
    .fetch_one(executor)
    .await
}

const ORDER_COLUMNS: &str = r#"
    id, organization_id, supplier_id, invoice_id, order_number, order_year, status,
    subtotal, shipping_cost, total, deposit_percent, deposit_amount, balance_due,
    amount_paid, created_at
"#;

pub async fn insert_order(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    invoice_id: i64,
    order_number: &str,
    year: i32,
    group: &SupplierGroup,
) -> Result<OrderRow, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO orders (
            organization_id, supplier_id, invoice_id, order_number, order_year, status,
            subtotal, shipping_cost, total, deposit_percent, deposit_amount, balance_due
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {}
        "#,
        ORDER_COLUMNS
    );
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(organization_id)
        .bind(group.supplier_id)
        .bind(invoice_id)
        .bind(order_number)
        .bind(year)
        .bind(OrderStatus::Pending.as_str())
        .bind(&group.subtotal)
        .bind(&group.shipping_cost)
        .bind(&group.total)
        .bind(&group.deposit_percent)
        .bind(&group.deposit_amount)
        .bind(&group.balance_due)
        .fetch_one(executor)
        .await
}

pub async fn insert_order_line(
    executor: impl PgExecutor<'_>,
    order_id: i64,
    line: &PlannedLine,
    parent_line_id: Option<i64>,
) -> Result<OrderLineItem, sqlx::Error> {
    sqlx::query_as::<_, OrderLineItem>(
        r#"
        INSERT INTO order_line_items (
            order_id, item_id, component_id, parent_line_id, is_component,
            name, sku, quantity, unit_price, total_price
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, order_id, item_id, component_id, parent_line_id, is_component,
                  name, sku, quantity, unit_price, total_price
        "#,
    )
    .bind(order_id)
    .bind(line.item_id)
    .bind(line.component_id)
    .bind(parent_line_id)
    .bind(line.is_component)
    .bind(&line.name)
    .bind(&line.sku)
    .bind(line.quantity)
    .bind(&line.unit_price)
    .bind(&line.total_price)
    .fetch_one(executor)
    .await
}

pub async fn insert_activity(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    entity_type: &str,
    entity_id: i64,
    action: &str,
    details: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activity_log (organization_id, entity_type, entity_id, action, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(organization_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(action)
    .bind(Json(details))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_order(
    executor: impl PgExecutor<'_>,
    organization_id: i64,
    order_id: i64,
    for_update: bool,
) -> Result<Option<OrderRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = $1 AND organization_id = $2{}",
        ORDER_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_id)
        .bind(organization_id)
        .fetch_optional(executor)
        .await
}

pub async fn list_order_lines(
    executor: impl PgExecutor<'_>,
    order_id: i64,
) -> Result<Vec<OrderLineItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderLineItem>(
        r#"
        SELECT id, order_id, item_id, component_id, parent_line_id, is_component,
               name, sku, quantity, unit_price, total_price
        FROM order_line_items
        WHERE order_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(executor)
    .await
}

pub async fn update_order_status(
    executor: impl PgExecutor<'_>,
    order_id: i64,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
        .bind(status.as_str())
        .bind(order_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn update_order_payment(
    executor: impl PgExecutor<'_>,
    order_id: i64,
    amount_paid: &BigDecimal,
    balance_due: &BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET amount_paid = $1, balance_due = $2 WHERE id = $3")
        .bind(amount_paid)
        .bind(balance_due)
        .bind(order_id)
        .execute(executor)
        .await?;
    Ok(())
}
