use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 需求项 (requested_items) - the canonical item a supplier was asked to price
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RequestedItem {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub model_number: Option<String>,
    pub brand: Option<String>,
    pub quantity: i32,
    pub unit_type: String,
    pub trade_price: Option<BigDecimal>,
}

/// 子部件 (item_components) - e.g. a transformer bundled with a fixture
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ItemComponent {
    pub id: i64,
    pub item_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<BigDecimal>,
}
