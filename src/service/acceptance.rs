use crate::db::{queries_catalog, queries_quote};
use crate::error::{EngineError, Result};
use crate::models::status::parse_column;
use crate::models::{AcceptQuoteOutcome, ItemSpecStatus, QuoteLineStatus};
use crate::service::money::{percent_of, round_money};
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use sqlx::PgPool;

/// `unit_price * (1 + markup/100)`, rounded to cents.
pub fn trade_price(unit_price: &BigDecimal, markup_percent: Option<&BigDecimal>) -> BigDecimal {
    match markup_percent {
        Some(markup) => round_money(&(unit_price + percent_of(unit_price, markup))),
        None => round_money(unit_price),
    }
}

/// Status moves made by one acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AcceptanceMoves {
    line: QuoteLineStatus,
    demoted: QuoteLineStatus,
    item: ItemSpecStatus,
}

fn acceptance_moves(line: QuoteLineStatus, item: ItemSpecStatus) -> Result<AcceptanceMoves> {
    Ok(AcceptanceMoves {
        line: line.transition(QuoteLineStatus::Accepted)?,
        // 同一需求项此前被接受的报价行
        demoted: QuoteLineStatus::Accepted.transition(QuoteLineStatus::Superseded)?,
        item: item.transition(ItemSpecStatus::Priced)?,
    })
}

/// 报价接受服务
pub struct AcceptanceService {
    pool: PgPool,
}

impl AcceptanceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Business rejections come back as `{success: false, error}`; database failures propagate.
    pub async fn accept_quote_line(
        &self,
        organization_id: i64,
        item_id: i64,
        quote_line_id: i64,
        markup_percent: Option<BigDecimal>,
    ) -> Result<AcceptQuoteOutcome> {
        match self
            .try_accept(organization_id, item_id, quote_line_id, markup_percent.as_ref())
            .await
        {
            Ok(price) => Ok(AcceptQuoteOutcome {
                success: true,
                error: None,
                trade_price: Some(price),
            }),
            Err(e @ (EngineError::Validation(_) | EngineError::NotFound(_) | EngineError::Conflict(_))) => {
                tracing::info!(
                    "Quote line {} not accepted for item {}: {}",
                    quote_line_id, item_id, e
                );
                Ok(AcceptQuoteOutcome {
                    success: false,
                    error: Some(e.to_string()),
                    trade_price: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn try_accept(
        &self,
        organization_id: i64,
        item_id: i64,
        quote_line_id: i64,
        markup_percent: Option<&BigDecimal>,
    ) -> Result<BigDecimal> {
        if item_id <= 0 || quote_line_id <= 0 {
            return Err(EngineError::Validation("item id and quote line id are required".into()));
        }
        if let Some(markup) = markup_percent {
            if *markup < BigDecimal::zero() {
                return Err(EngineError::Validation("markup percent must not be negative".into()));
            }
        }

        let mut tx = self.pool.begin().await?;

        let line = queries_quote::lock_quote_line(&mut *tx, organization_id, quote_line_id)
            .await?
            .ok_or_else(|| EngineError::not_found("quote line", quote_line_id))?;
        if line.item_id != item_id {
            return Err(EngineError::Conflict(format!(
                "quote line {} belongs to item {}, not item {}",
                quote_line_id, line.item_id, item_id
            )));
        }

        let items = queries_catalog::lock_items(&mut *tx, organization_id, &[item_id]).await?;
        let Some(item) = items.first() else {
            return Err(EngineError::not_found("requested item", item_id));
        };
        let status: ItemSpecStatus = parse_column(&item.status)?;
        let moves = acceptance_moves(parse_column(&line.status)?, status)?;
        let next = moves.item;

        let demoted = queries_quote::supersede_accepted_lines(&mut *tx, item_id, quote_line_id, moves.demoted).await?;
        queries_quote::mark_line_accepted(&mut *tx, quote_line_id, moves.line, Utc::now()).await?;

        let price = trade_price(&line.unit_price, markup_percent);
        queries_catalog::set_trade_price(&mut *tx, item_id, &price, next).await?;
        tx.commit().await?;

        tracing::info!(
            "Item {}: accepted quote line {} (supplier {}), trade price {}, {} earlier acceptances superseded, {} -> {}",
            item_id, quote_line_id, line.supplier_id, price, demoted, status, next
        );
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn trade_price_without_markup_is_unit_price() {
        assert_eq!(trade_price(&dec("150"), None), dec("150.00"));
    }

    #[test]
    fn superseded_line_can_be_accepted_again() {
        let moves = acceptance_moves(QuoteLineStatus::Superseded, ItemSpecStatus::Priced).unwrap();
        assert_eq!(moves.line, QuoteLineStatus::Accepted);
        assert_eq!(moves.demoted, QuoteLineStatus::Superseded);
        assert_eq!(moves.item, ItemSpecStatus::Priced);
    }

    #[test]
    fn ordered_item_rejects_acceptance() {
        let err = acceptance_moves(QuoteLineStatus::Received, ItemSpecStatus::Ordered).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(err.to_string().contains("ordered to priced"));
    }

    #[test]
    fn trade_price_applies_markup() {
        assert_eq!(trade_price(&dec("150"), Some(&dec("20"))), dec("180.00"));
        assert_eq!(trade_price(&dec("19.99"), Some(&dec("12.5"))), dec("22.49"));
    }
}
