use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 报价行 (quote_lines) - one supplier price for one requested item
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuoteLineRow {
    pub id: i64,
    pub quote_id: i64,
    pub item_id: i64,
    pub supplier_id: i64,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// 接受报价请求体
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AcceptQuoteRequest {
    pub quote_line_id: i64,
    #[serde(default)]
    pub markup_percent: Option<BigDecimal>,
}

/// `{success, error?}` result of accepting a quote line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptQuoteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_price: Option<BigDecimal>,
}
