use crate::models::status::{parse_column, OrderStatus};
use crate::models::{ItemComponent, RequestedItem};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 客户发票 (client_invoices)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClientInvoice {
    pub id: i64,
    pub organization_id: i64,
    pub project_id: i64,
    pub invoice_number: String,
    pub amount_paid: BigDecimal,
}

/// Supplier and price of the quote an item will be ordered against
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SupplierQuoteRef {
    pub item_id: i64,
    pub supplier_id: i64,
    pub supplier_name: String,
    pub quote_id: i64,
    pub quote_line_id: i64,
    pub unit_price: BigDecimal,
    pub shipping: Option<BigDecimal>,
    pub accepted: bool,
    pub default_deposit_percent: Option<BigDecimal>,
}

/// One invoice item with everything the planner needs
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCandidate {
    pub item: RequestedItem,
    pub quote: Option<SupplierQuoteRef>,
    pub components: Vec<ItemComponent>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DepositTerms {
    pub percent: Option<BigDecimal>,
    pub amount: Option<BigDecimal>,
}

/// 下单请求体; every field is optional, unknown keys are rejected
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CreateOrdersRequest {
    pub item_ids: Option<Vec<i64>>,
    pub deposit: Option<DepositTerms>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedLine {
    pub item_id: i64,
    pub component_id: Option<i64>,
    pub is_component: bool,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
}

/// 按供应商分组的待下单明细及金额
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierGroup {
    pub supplier_id: i64,
    pub supplier_name: String,
    pub item_ids: Vec<i64>,
    pub lines: Vec<PlannedLine>,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
    pub deposit_percent: Option<BigDecimal>,
    pub deposit_amount: Option<BigDecimal>,
    pub balance_due: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRef {
    pub item_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPlan {
    pub groups: Vec<SupplierGroup>,
    pub items_without_supplier: Vec<ItemRef>,
    pub already_ordered: Vec<ItemRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPreview {
    pub invoice_id: i64,
    #[serde(flatten)]
    pub plan: OrderPlan,
}

/// 采购单 (orders)
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub organization_id: i64,
    pub supplier_id: i64,
    pub invoice_id: i64,
    pub order_number: String,
    pub order_year: i32,
    pub status: String,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
    pub deposit_percent: Option<BigDecimal>,
    pub deposit_amount: Option<BigDecimal>,
    pub balance_due: BigDecimal,
    pub amount_paid: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderLineItem {
    pub id: i64,
    pub order_id: i64,
    pub item_id: i64,
    pub component_id: Option<i64>,
    pub parent_line_id: Option<i64>,
    pub is_component: bool,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i64,
    pub organization_id: i64,
    pub supplier_id: i64,
    pub invoice_id: i64,
    pub order_number: String,
    pub status: OrderStatus,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
    pub deposit_percent: Option<BigDecimal>,
    pub deposit_amount: Option<BigDecimal>,
    pub balance_due: BigDecimal,
    pub amount_paid: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineItem>,
}

impl Order {
    pub fn from_row(row: OrderRow, lines: Vec<OrderLineItem>) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.id,
            organization_id: row.organization_id,
            supplier_id: row.supplier_id,
            invoice_id: row.invoice_id,
            order_number: row.order_number,
            status: parse_column(&row.status)?,
            subtotal: row.subtotal,
            shipping_cost: row.shipping_cost,
            total: row.total,
            deposit_percent: row.deposit_percent,
            deposit_amount: row.deposit_amount,
            balance_due: row.balance_due,
            amount_paid: row.amount_paid,
            created_at: row.created_at,
            lines,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordPaymentRequest {
    pub amount: BigDecimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_orders_request_reads_camel_case_keys() {
        let req: CreateOrdersRequest = serde_json::from_value(json!({
            "itemIds": [5, 6],
            "deposit": { "percent": "30" }
        }))
        .unwrap();
        assert_eq!(req.item_ids, Some(vec![5, 6]));
        assert_eq!(req.deposit.unwrap().percent, Some(BigDecimal::from(30)));
    }

    #[test]
    fn create_orders_request_rejects_unknown_keys() {
        let err = serde_json::from_value::<CreateOrdersRequest>(json!({ "item_ids": [5] })).unwrap_err();
        assert!(err.to_string().contains("item_ids"));
        assert!(serde_json::from_value::<CreateOrdersRequest>(json!({ "deposit": { "pct": 10 } })).is_err());
    }

    #[test]
    fn empty_create_orders_request_orders_everything() {
        let req: CreateOrdersRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req, CreateOrdersRequest::default());
    }
}
