use crate::config::DiscrepancyConfig;
use crate::models::{ExtractedLineItem, MatchResult, RequestedItem, SessionDiscrepancies, SupplierInfo};
use crate::service::money::round_money;
use bigdecimal::{BigDecimal, Zero};

const QUANTITY_LABEL: &str = "Quantity:";

/// "Quantity: requested N, quoted M" when the quoted quantity differs.
pub fn quantity_discrepancy(requested: &RequestedItem, extracted: &ExtractedLineItem) -> Option<String> {
    match extracted.quantity {
        Some(quoted) if quoted != requested.quantity => Some(format!(
            "{} requested {}, quoted {}",
            QUANTITY_LABEL, requested.quantity, quoted
        )),
        _ => None,
    }
}

pub fn is_quantity_discrepancy(message: &str) -> bool {
    message.starts_with(QUANTITY_LABEL)
}

/// 差异分析 - informational only, never blocks review
#[derive(Debug, Clone, Default)]
pub struct DiscrepancyAnalyzer {
    config: DiscrepancyConfig,
}

impl DiscrepancyAnalyzer {
    pub fn new(config: DiscrepancyConfig) -> Self {
        Self { config }
    }

    fn exceeds_tolerance(&self, a: &BigDecimal, b: &BigDecimal) -> bool {
        (a - b).abs() > *self.config.tolerance()
    }

    /// Stated line total vs unit price × quantity.
    pub fn line_total_discrepancy(&self, extracted: &ExtractedLineItem) -> Option<String> {
        let (Some(stated), Some(unit), Some(qty)) =
            (&extracted.total_price, &extracted.unit_price, extracted.quantity)
        else {
            return None;
        };
        let computed = unit * BigDecimal::from(qty);
        if self.exceeds_tolerance(stated, &computed) {
            Some(format!(
                "Line total: stated {}, computed {}",
                round_money(stated),
                round_money(&computed)
            ))
        } else {
            None
        }
    }

    /// Attach quantity and line-total messages to every Matched/Partial result.
    pub fn annotate(&self, results: &mut [MatchResult]) {
        for result in results.iter_mut() {
            let messages: Vec<String> = match &*result {
                MatchResult::Matched { requested_item, extracted, .. }
                | MatchResult::Partial { requested_item, extracted, .. } => {
                    quantity_discrepancy(requested_item, extracted)
                        .into_iter()
                        .chain(self.line_total_discrepancy(extracted))
                        .collect()
                }
                _ => continue,
            };
            if let Some(d) = result.discrepancies_mut() {
                for m in messages {
                    if !d.contains(&m) {
                        d.push(m);
                    }
                }
            }
        }
    }

    /// Declared totals vs the sum of extracted lines, plus shipping/tax presence.
    pub fn analyze_session(&self, info: &SupplierInfo, items: &[ExtractedLineItem]) -> SessionDiscrepancies {
        let computed_lines = items
            .iter()
            .filter_map(ExtractedLineItem::line_total)
            .fold(BigDecimal::zero(), |acc, v| acc + v);

        let has_shipping = info.shipping.is_some();
        let has_taxes = info.taxes.is_some();
        let mut messages = Vec::new();
        let mut total_mismatch = false;

        if let Some(declared) = &info.total {
            let expected = &computed_lines
                + info.shipping.clone().unwrap_or_else(BigDecimal::zero)
                + info.taxes.clone().unwrap_or_else(BigDecimal::zero);
            if self.exceeds_tolerance(declared, &expected) {
                total_mismatch = true;
                messages.push(format!(
                    "Total: declared {}, computed {}",
                    round_money(declared),
                    round_money(&expected)
                ));
            }
        } else if let Some(subtotal) = &info.subtotal {
            if self.exceeds_tolerance(subtotal, &computed_lines) {
                total_mismatch = true;
                messages.push(format!(
                    "Subtotal: declared {}, computed {}",
                    round_money(subtotal),
                    round_money(&computed_lines)
                ));
            }
        }

        if !has_shipping {
            messages.push("No shipping amount quoted".to_string());
        }
        if !has_taxes {
            messages.push("No tax amount quoted".to_string());
        }

        SessionDiscrepancies {
            computed_total: round_money(&computed_lines),
            declared_total: info.total.clone(),
            total_mismatch,
            has_shipping,
            has_taxes,
            messages,
        }
    }
}
