use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 报价单抽取行 - one row pulled from a supplier quote document, never mutated
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedLineItem {
    pub product_name: String,
    pub product_name_original: Option<String>,
    pub sku: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<BigDecimal>,
    pub total_price: Option<BigDecimal>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub lead_time: Option<String>,
}

impl ExtractedLineItem {
    /// Stated total, or unit price times quantity when the document omits it.
    pub fn line_total(&self) -> Option<BigDecimal> {
        match (&self.total_price, &self.unit_price) {
            (Some(total), _) => Some(total.clone()),
            (None, Some(unit)) => Some(unit * BigDecimal::from(self.quantity.unwrap_or(1))),
            (None, None) => None,
        }
    }
}

/// 供应商级元数据
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupplierInfo {
    pub company_name: Option<String>,
    pub quote_number: Option<String>,
    pub quote_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub subtotal: Option<BigDecimal>,
    pub shipping: Option<BigDecimal>,
    pub taxes: Option<BigDecimal>,
    pub total: Option<BigDecimal>,
}

/// Structured output of the document extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutput {
    #[serde(default)]
    pub supplier_info: SupplierInfo,
    /// None when the provider omitted the list entirely
    #[serde(default)]
    pub extracted_items: Option<Vec<ExtractedLineItem>>,
    #[serde(default)]
    pub notes: Option<String>,
}
