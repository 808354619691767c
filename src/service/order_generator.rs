use crate::db::queries_catalog::{self, ItemStatusRow};
use crate::db::queries_order;
use crate::error::{EngineError, Result};
use crate::models::status::parse_column;
use crate::models::{
    ClientInvoice, CreateOrdersRequest, DepositTerms, ItemComponent, ItemRef, ItemSpecStatus, Order,
    OrderCandidate, OrderPlan, OrderPreview, OrderStatus, PlannedLine, RequestedItem,
    PaymentStatus, SupplierGroup, SupplierQuoteRef,
};
use crate::service::money::{percent_of, round_money};
use crate::service::notify::{EngineEvent, Notifier};
use bigdecimal::{BigDecimal, Zero};
use chrono::{Datelike, Utc};
use indexmap::IndexMap;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use std::collections::{HashMap, HashSet};

/// `PO-<year>-<seq>`, sequence zero-padded to four digits.
pub fn format_order_number(year: i32, seq: i64) -> String {
    format!("PO-{}-{:04}", year, seq)
}

/// Next `n` numbers after the `existing` orders already issued this year.
pub fn allocate_order_numbers(year: i32, existing: i64, n: usize) -> Vec<String> {
    (1..=n as i64)
        .map(|i| format_order_number(year, existing + i))
        .collect()
}

fn line_total(unit_price: &BigDecimal, quantity: i32) -> BigDecimal {
    round_money(&(unit_price * BigDecimal::from(quantity)))
}

/// 供应商分组累加器
struct GroupBuilder {
    supplier_id: i64,
    supplier_name: String,
    default_deposit_percent: Option<BigDecimal>,
    item_ids: Vec<i64>,
    lines: Vec<PlannedLine>,
    shipping_by_quote: IndexMap<i64, BigDecimal>,
}

impl GroupBuilder {
    fn new(quote: &SupplierQuoteRef) -> Self {
        Self {
            supplier_id: quote.supplier_id,
            supplier_name: quote.supplier_name.clone(),
            default_deposit_percent: quote.default_deposit_percent.clone(),
            item_ids: Vec::new(),
            lines: Vec::new(),
            shipping_by_quote: IndexMap::new(),
        }
    }

    fn add(&mut self, item: &RequestedItem, quote: &SupplierQuoteRef, components: &[ItemComponent]) {
        self.item_ids.push(item.id);
        self.lines.push(PlannedLine {
            item_id: item.id,
            component_id: None,
            is_component: false,
            name: item.name.clone(),
            sku: item.sku.clone(),
            quantity: item.quantity,
            unit_price: quote.unit_price.clone(),
            total_price: line_total(&quote.unit_price, item.quantity),
        });
        // components carry their own catalog price, never a quoted one
        for c in components {
            let unit_price = c.unit_price.clone().unwrap_or_else(BigDecimal::zero);
            self.lines.push(PlannedLine {
                item_id: item.id,
                component_id: Some(c.id),
                is_component: true,
                name: c.name.clone(),
                sku: c.sku.clone(),
                quantity: c.quantity,
                total_price: line_total(&unit_price, c.quantity),
                unit_price,
            });
        }
        // shipping is quoted once per document, not per line
        self.shipping_by_quote
            .entry(quote.quote_id)
            .or_insert_with(|| quote.shipping.clone().unwrap_or_else(BigDecimal::zero));
    }

    fn finish(self, deposit: Option<&DepositTerms>) -> SupplierGroup {
        let subtotal = round_money(
            &self
                .lines
                .iter()
                .fold(BigDecimal::zero(), |acc, l| acc + &l.total_price),
        );
        let shipping_cost = round_money(
            &self
                .shipping_by_quote
                .values()
                .fold(BigDecimal::zero(), |acc, s| acc + s),
        );
        let total = round_money(&(&subtotal + &shipping_cost));

        let explicit_amount = deposit.and_then(|d| d.amount.clone());
        let percent = deposit
            .and_then(|d| d.percent.clone())
            .or(self.default_deposit_percent);
        let (deposit_percent, deposit_amount) = match (explicit_amount, percent) {
            (Some(amount), _) => (None, Some(round_money(&amount.min(total.clone())))),
            (None, Some(p)) => {
                let amount = percent_of(&total, &p);
                (Some(p), Some(amount))
            }
            (None, None) => (None, None),
        };
        let balance_due = match &deposit_amount {
            Some(d) => round_money(&(&total - d)),
            None => total.clone(),
        };

        SupplierGroup {
            supplier_id: self.supplier_id,
            supplier_name: self.supplier_name,
            item_ids: self.item_ids,
            lines: self.lines,
            subtotal,
            shipping_cost,
            total,
            deposit_percent,
            deposit_amount,
            balance_due,
        }
    }
}

/// 订单规划: exclusions first, then one group per supplier in first-seen order
pub fn plan_orders(
    candidates: &[OrderCandidate],
    already_ordered: &HashSet<i64>,
    deposit: Option<&DepositTerms>,
) -> OrderPlan {
    let mut groups: IndexMap<i64, GroupBuilder> = IndexMap::new();
    let mut items_without_supplier = Vec::new();
    let mut skipped = Vec::new();

    for c in candidates {
        let item_ref = || ItemRef {
            item_id: c.item.id,
            name: c.item.name.clone(),
        };
        if already_ordered.contains(&c.item.id) {
            skipped.push(item_ref());
            continue;
        }
        let Some(quote) = &c.quote else {
            items_without_supplier.push(item_ref());
            continue;
        };
        groups
            .entry(quote.supplier_id)
            .or_insert_with(|| GroupBuilder::new(quote))
            .add(&c.item, quote, &c.components);
    }

    OrderPlan {
        groups: groups.into_values().map(|g| g.finish(deposit)).collect(),
        items_without_supplier,
        already_ordered: skipped,
    }
}

/// 只有已收款的发票才能下单
pub fn ensure_paid(invoice: &ClientInvoice) -> Result<()> {
    if invoice.amount_paid <= BigDecimal::zero() {
        return Err(EngineError::Validation(format!(
            "invoice {} has no recorded payment",
            invoice.invoice_number
        )));
    }
    Ok(())
}

/// Target statuses for an item going onto an order.
fn order_transition(status: ItemSpecStatus, payment: PaymentStatus) -> Result<(ItemSpecStatus, PaymentStatus)> {
    // a cancelled order leaves its items Ordered
    let status = if status == ItemSpecStatus::Ordered {
        status
    } else {
        status.transition(ItemSpecStatus::Ordered)?
    };
    Ok((status, payment.transition(PaymentStatus::FullyPaid)?))
}

fn validate_deposit(deposit: Option<&DepositTerms>) -> Result<()> {
    let Some(d) = deposit else { return Ok(()) };
    if let Some(p) = &d.percent {
        if *p < BigDecimal::zero() || *p > BigDecimal::from(100) {
            return Err(EngineError::Validation("deposit percent must be between 0 and 100".into()));
        }
    }
    if let Some(a) = &d.amount {
        if *a < BigDecimal::zero() {
            return Err(EngineError::Validation("deposit amount must not be negative".into()));
        }
    }
    Ok(())
}

/// Render an order's lines for sending to the supplier.
pub fn render_order_csv(order: &Order) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "order_number",
        "line",
        "item_id",
        "component",
        "sku",
        "name",
        "quantity",
        "unit_price",
        "total_price",
    ])?;
    for (i, line) in order.lines.iter().enumerate() {
        writer.write_record(&[
            order.order_number.clone(),
            (i + 1).to_string(),
            line.item_id.to_string(),
            if line.is_component { "yes" } else { "no" }.to_string(),
            line.sku.clone().unwrap_or_default(),
            line.name.clone(),
            line.quantity.to_string(),
            line.unit_price.to_string(),
            line.total_price.to_string(),
        ])?;
    }
    writer.write_record(&[
        order.order_number.clone(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        "shipping".to_string(),
        String::new(),
        String::new(),
        order.shipping_cost.to_string(),
    ])?;
    let bytes = writer
        .into_inner()
        .map_err(|e| EngineError::Export(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 采购单生成服务
pub struct OrderService {
    pool: PgPool,
    notifier: Notifier,
}

impl OrderService {
    pub fn new(pool: PgPool, notifier: Notifier) -> Self {
        Self { pool, notifier }
    }

    /// Invoice items narrowed to the requested subset, plus their quotes and components.
    async fn load_candidates(
        conn: &mut PgConnection,
        organization_id: i64,
        invoice_id: i64,
        item_ids: Option<&[i64]>,
    ) -> Result<(Vec<OrderCandidate>, HashSet<i64>)> {
        let mut items = queries_order::list_invoice_items(&mut *conn, organization_id, invoice_id).await?;
        if let Some(wanted) = item_ids {
            if wanted.is_empty() {
                return Err(EngineError::Validation("itemIds must not be empty when given".into()));
            }
            let on_invoice: HashSet<i64> = items.iter().map(|i| i.id).collect();
            if let Some(stray) = wanted.iter().find(|id| !on_invoice.contains(id)) {
                return Err(EngineError::Validation(format!(
                    "item {} is not on invoice {}",
                    stray, invoice_id
                )));
            }
            let wanted: HashSet<i64> = wanted.iter().copied().collect();
            items.retain(|i| wanted.contains(&i.id));
        }

        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let already: HashSet<i64> = queries_order::list_already_ordered(&mut *conn, &ids)
            .await?
            .into_iter()
            .collect();
        let mut quotes: HashMap<i64, SupplierQuoteRef> = queries_order::list_order_quotes(&mut *conn, &ids)
            .await?
            .into_iter()
            .map(|q| (q.item_id, q))
            .collect();
        let mut components: HashMap<i64, Vec<ItemComponent>> = HashMap::new();
        for c in queries_catalog::list_components(&mut *conn, &ids).await? {
            components.entry(c.item_id).or_default().push(c);
        }

        let candidates = items
            .into_iter()
            .map(|item| OrderCandidate {
                quote: quotes.remove(&item.id),
                components: components.remove(&item.id).unwrap_or_default(),
                item,
            })
            .collect();
        Ok((candidates, already))
    }

    /// Dry run of `create_orders_from_invoice`: same grouping and totals, nothing persisted.
    pub async fn preview_orders(&self, organization_id: i64, invoice_id: i64) -> Result<OrderPreview> {
        if invoice_id <= 0 {
            return Err(EngineError::Validation("invoice id is required".into()));
        }
        let mut conn = self.pool.acquire().await?;
        queries_order::get_invoice(&mut *conn, organization_id, invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))?;

        let (candidates, already) = Self::load_candidates(&mut conn, organization_id, invoice_id, None).await?;
        let plan = plan_orders(&candidates, &already, None);
        tracing::info!(
            "Invoice {} preview: {} supplier groups, {} without supplier, {} already ordered",
            invoice_id,
            plan.groups.len(),
            plan.items_without_supplier.len(),
            plan.already_ordered.len()
        );
        Ok(OrderPreview { invoice_id, plan })
    }

    /// 发票生成采购单 - all supplier groups commit together or not at all
    pub async fn create_orders_from_invoice(
        &self,
        organization_id: i64,
        invoice_id: i64,
        req: CreateOrdersRequest,
    ) -> Result<Vec<Order>> {
        if invoice_id <= 0 {
            return Err(EngineError::Validation("invoice id is required".into()));
        }
        validate_deposit(req.deposit.as_ref())?;

        let mut tx = self.pool.begin().await?;

        // 1. 发票校验
        let invoice = queries_order::get_invoice(&mut *tx, organization_id, invoice_id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))?;
        ensure_paid(&invoice)?;

        // 2. 锁定需求项, then re-read the already-ordered set under the lock
        let item_scope = match &req.item_ids {
            Some(ids) => ids.clone(),
            None => queries_order::list_invoice_items(&mut *tx, organization_id, invoice_id)
                .await?
                .into_iter()
                .map(|i| i.id)
                .collect(),
        };
        let locked = queries_catalog::lock_items(&mut *tx, organization_id, &item_scope).await?;
        let (candidates, already) =
            Self::load_candidates(&mut tx, organization_id, invoice_id, req.item_ids.as_deref()).await?;
        let plan = plan_orders(&candidates, &already, req.deposit.as_ref());

        if plan.groups.is_empty() {
            tx.commit().await?;
            tracing::info!(
                "Invoice {}: nothing to order ({} already ordered, {} without supplier)",
                invoice_id,
                plan.already_ordered.len(),
                plan.items_without_supplier.len()
            );
            return Ok(Vec::new());
        }

        // 3. 状态校验: 需求项 -> ordered, 付款 -> fully_paid
        let locked: HashMap<i64, ItemStatusRow> = locked.into_iter().map(|r| (r.id, r)).collect();
        let ordered_ids: Vec<i64> = plan.groups.iter().flat_map(|g| g.item_ids.iter().copied()).collect();
        let mut target = (ItemSpecStatus::Ordered, PaymentStatus::FullyPaid);
        for id in &ordered_ids {
            let row = locked
                .get(id)
                .ok_or_else(|| EngineError::not_found("requested item", *id))?;
            target = order_transition(parse_column(&row.status)?, parse_column(&row.payment_status)?)?;
        }

        // 4. 编号分配
        let year = Utc::now().year();
        queries_order::lock_order_numbering(&mut *tx, organization_id, year).await?;
        let existing = queries_order::count_orders_for_year(&mut *tx, organization_id, year).await?;
        let numbers = allocate_order_numbers(year, existing, plan.groups.len());

        // 5. 写入订单及明细
        let mut orders = Vec::with_capacity(plan.groups.len());
        for (group, number) in plan.groups.iter().zip(numbers) {
            let row = queries_order::insert_order(&mut *tx, organization_id, invoice_id, &number, year, group).await?;

            let mut parent_lines: HashMap<i64, i64> = HashMap::new();
            let mut lines = Vec::with_capacity(group.lines.len());
            for line in &group.lines {
                let parent = if line.is_component {
                    parent_lines.get(&line.item_id).copied()
                } else {
                    None
                };
                let saved = queries_order::insert_order_line(&mut *tx, row.id, line, parent).await?;
                if !line.is_component {
                    parent_lines.insert(line.item_id, saved.id);
                }
                lines.push(saved);
            }

            queries_order::insert_activity(
                &mut *tx,
                organization_id,
                "order",
                row.id,
                "created",
                json!({
                    "order_number": row.order_number,
                    "invoice_id": invoice_id,
                    "supplier_id": row.supplier_id,
                    "item_ids": group.item_ids,
                    "total": row.total.to_string(),
                }),
            )
            .await?;

            orders.push(Order::from_row(row, lines)?);
        }

        // 6. 需求项状态
        let (status, payment) = target;
        let updated = queries_catalog::mark_items_ordered(&mut *tx, &ordered_ids, status, payment).await?;
        tx.commit().await?;

        tracing::info!(
            "Invoice {}: created {} orders covering {} items",
            invoice_id,
            orders.len(),
            updated
        );
        for order in &orders {
            self.notifier.emit(EngineEvent::OrderCreated {
                organization_id,
                order_id: order.id,
                order_number: order.order_number.clone(),
                supplier_id: order.supplier_id,
                total: order.total.clone(),
            });
        }
        Ok(orders)
    }

    pub async fn get_order(&self, organization_id: i64, order_id: i64) -> Result<Order> {
        if order_id <= 0 {
            return Err(EngineError::Validation("order id is required".into()));
        }
        let mut conn = self.pool.acquire().await?;
        Self::load_order(&mut conn, organization_id, order_id, false).await
    }

    async fn load_order(
        conn: &mut PgConnection,
        organization_id: i64,
        order_id: i64,
        for_update: bool,
    ) -> Result<Order> {
        let row = queries_order::get_order(&mut *conn, organization_id, order_id, for_update)
            .await?
            .ok_or_else(|| EngineError::not_found("order", order_id))?;
        let lines = queries_order::list_order_lines(&mut *conn, order_id).await?;
        Ok(Order::from_row(row, lines)?)
    }

    /// Status moves follow the order transition table; cancelling frees the items for re-ordering.
    pub async fn update_order_status(&self, organization_id: i64, order_id: i64, next: OrderStatus) -> Result<Order> {
        if order_id <= 0 {
            return Err(EngineError::Validation("order id is required".into()));
        }
        let mut tx = self.pool.begin().await?;
        let mut order = Self::load_order(&mut tx, organization_id, order_id, true).await?;
        let previous = order.status;
        order.status = previous.transition(next)?;

        queries_order::update_order_status(&mut *tx, order_id, order.status).await?;
        queries_order::insert_activity(
            &mut *tx,
            organization_id,
            "order",
            order_id,
            "status_changed",
            json!({ "from": previous.as_str(), "to": order.status.as_str() }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Order {}: {} -> {}", order.order_number, previous, order.status);
        Ok(order)
    }

    pub async fn record_order_payment(&self, organization_id: i64, order_id: i64, amount: BigDecimal) -> Result<Order> {
        if order_id <= 0 {
            return Err(EngineError::Validation("order id is required".into()));
        }
        if amount <= BigDecimal::zero() {
            return Err(EngineError::Validation("payment amount must be positive".into()));
        }
        let amount = round_money(&amount);

        let mut tx = self.pool.begin().await?;
        let mut order = Self::load_order(&mut tx, organization_id, order_id, true).await?;
        if order.status == OrderStatus::Cancelled {
            return Err(EngineError::Conflict(format!(
                "order {} is cancelled",
                order.order_number
            )));
        }

        order.amount_paid = round_money(&(&order.amount_paid + &amount));
        let remaining = &order.total - &order.amount_paid;
        order.balance_due = if remaining < BigDecimal::zero() {
            round_money(&BigDecimal::zero())
        } else {
            round_money(&remaining)
        };

        queries_order::update_order_payment(&mut *tx, order_id, &order.amount_paid, &order.balance_due).await?;
        queries_order::insert_activity(
            &mut *tx,
            organization_id,
            "order",
            order_id,
            "payment_recorded",
            json!({ "amount": amount.to_string(), "balance_due": order.balance_due.to_string() }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "Order {}: payment {} recorded, balance due {}",
            order.order_number, amount, order.balance_due
        );
        Ok(order)
    }

    pub async fn export_order_csv(&self, organization_id: i64, order_id: i64) -> Result<String> {
        let order = self.get_order(organization_id, order_id).await?;
        render_order_csv(&order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderLineItem;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn item(id: i64, quantity: i32) -> RequestedItem {
        RequestedItem {
            id,
            project_id: 1,
            name: format!("Item {}", id),
            sku: Some(format!("SKU-{}", id)),
            model_number: None,
            brand: None,
            quantity,
            unit_type: "each".into(),
            trade_price: None,
        }
    }

    fn quote(item_id: i64, supplier_id: i64, quote_id: i64, price: &str, shipping: Option<&str>) -> SupplierQuoteRef {
        SupplierQuoteRef {
            item_id,
            supplier_id,
            supplier_name: format!("Supplier {}", supplier_id),
            quote_id,
            quote_line_id: item_id * 10,
            unit_price: dec(price),
            shipping: shipping.map(dec),
            accepted: true,
            default_deposit_percent: None,
        }
    }

    fn candidate(item: RequestedItem, quote: Option<SupplierQuoteRef>) -> OrderCandidate {
        OrderCandidate {
            item,
            quote,
            components: Vec::new(),
        }
    }

    #[test]
    fn order_numbers_are_gap_free_and_padded() {
        let numbers = allocate_order_numbers(2026, 0, 3);
        assert_eq!(numbers, vec!["PO-2026-0001", "PO-2026-0002", "PO-2026-0003"]);

        let next = allocate_order_numbers(2026, 3, 2);
        assert_eq!(next, vec!["PO-2026-0004", "PO-2026-0005"]);
        assert_eq!(format_order_number(2027, 12345), "PO-2027-12345");
    }

    #[test]
    fn groups_by_supplier_in_first_seen_order() {
        let candidates = vec![
            candidate(item(1, 2), Some(quote(1, 20, 200, "10.00", Some("15.00")))),
            candidate(item(2, 1), Some(quote(2, 10, 100, "99.50", None))),
            candidate(item(3, 4), Some(quote(3, 20, 200, "2.25", Some("15.00")))),
        ];
        let plan = plan_orders(&candidates, &HashSet::new(), None);

        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.groups[0].supplier_id, 20);
        assert_eq!(plan.groups[0].item_ids, vec![1, 3]);
        assert_eq!(plan.groups[1].supplier_id, 10);

        let g = &plan.groups[0];
        assert_eq!(g.subtotal, dec("29.00"));
        // one quote, so its shipping counts once
        assert_eq!(g.shipping_cost, dec("15.00"));
        assert_eq!(g.total, dec("44.00"));
        assert_eq!(g.balance_due, g.total);
        assert!(g.deposit_amount.is_none());
    }

    #[test]
    fn totals_hold_for_every_group() {
        let candidates = vec![
            candidate(item(1, 3), Some(quote(1, 1, 11, "33.33", Some("7.10")))),
            candidate(item(2, 2), Some(quote(2, 1, 12, "0.99", Some("4.00")))),
            candidate(item(3, 1), Some(quote(3, 2, 21, "1250", None))),
        ];
        let deposit = DepositTerms {
            percent: Some(dec("30")),
            amount: None,
        };
        let plan = plan_orders(&candidates, &HashSet::new(), Some(&deposit));
        for g in &plan.groups {
            assert_eq!(g.total, &g.subtotal + &g.shipping_cost);
            let d = g.deposit_amount.clone().unwrap();
            assert_eq!(g.balance_due, &g.total - &d);
            assert_eq!(d, percent_of(&g.total, &dec("30")));
        }
        assert_eq!(plan.groups[0].shipping_cost, dec("11.10"));
    }

    #[test]
    fn explicit_deposit_amount_wins_over_percent() {
        let candidates = vec![candidate(item(1, 1), Some(quote(1, 1, 11, "200", None)))];
        let deposit = DepositTerms {
            percent: Some(dec("50")),
            amount: Some(dec("25")),
        };
        let plan = plan_orders(&candidates, &HashSet::new(), Some(&deposit));
        let g = &plan.groups[0];
        assert_eq!(g.deposit_amount, Some(dec("25.00")));
        assert_eq!(g.deposit_percent, None);
        assert_eq!(g.balance_due, dec("175.00"));
    }

    #[test]
    fn supplier_default_deposit_applies_when_none_given() {
        let mut q = quote(1, 1, 11, "100", Some("20"));
        q.default_deposit_percent = Some(dec("50"));
        let plan = plan_orders(&[candidate(item(1, 1), Some(q))], &HashSet::new(), None);
        let g = &plan.groups[0];
        assert_eq!(g.deposit_amount, Some(dec("60.00")));
        assert_eq!(g.balance_due, dec("60.00"));
    }

    #[test]
    fn already_ordered_and_unquoted_items_are_reported() {
        let candidates = vec![
            candidate(item(1, 1), Some(quote(1, 1, 11, "5", None))),
            candidate(item(2, 1), None),
            candidate(item(3, 1), Some(quote(3, 1, 11, "5", None))),
        ];
        let ordered: HashSet<i64> = [1].into_iter().collect();
        let plan = plan_orders(&candidates, &ordered, None);

        assert_eq!(plan.already_ordered.len(), 1);
        assert_eq!(plan.already_ordered[0].item_id, 1);
        assert_eq!(plan.items_without_supplier.len(), 1);
        assert_eq!(plan.items_without_supplier[0].item_id, 2);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].item_ids, vec![3]);
    }

    #[test]
    fn second_run_over_same_items_plans_nothing() {
        let candidates = vec![
            candidate(item(1, 1), Some(quote(1, 1, 11, "5", None))),
            candidate(item(2, 1), Some(quote(2, 2, 22, "8", None))),
        ];
        let first = plan_orders(&candidates, &HashSet::new(), None);
        let ordered: HashSet<i64> = first
            .groups
            .iter()
            .flat_map(|g| g.item_ids.iter().copied())
            .collect();
        let second = plan_orders(&candidates, &ordered, None);
        assert!(second.groups.is_empty());
        assert_eq!(second.already_ordered.len(), 2);
    }

    #[test]
    fn components_follow_their_parent_at_catalog_price() {
        let mut c = candidate(item(1, 2), Some(quote(1, 1, 11, "100", None)));
        c.components = vec![
            ItemComponent {
                id: 501,
                item_id: 1,
                name: "Transformer".into(),
                sku: Some("TR-60".into()),
                quantity: 2,
                unit_price: Some(dec("12.50")),
            },
            ItemComponent {
                id: 502,
                item_id: 1,
                name: "Mounting kit".into(),
                sku: None,
                quantity: 1,
                unit_price: None,
            },
        ];
        let plan = plan_orders(&[c], &HashSet::new(), None);
        let lines = &plan.groups[0].lines;

        assert_eq!(lines.len(), 3);
        assert!(!lines[0].is_component);
        assert!(lines[1].is_component && lines[2].is_component);
        assert_eq!(lines[1].component_id, Some(501));
        assert_eq!(lines[1].unit_price, dec("12.50"));
        assert_eq!(lines[1].total_price, dec("25.00"));
        assert_eq!(lines[2].total_price, dec("0.00"));
        assert_eq!(plan.groups[0].subtotal, dec("225.00"));
    }

    #[test]
    fn deposit_terms_are_checked() {
        let bad = DepositTerms {
            percent: Some(dec("120")),
            amount: None,
        };
        assert!(matches!(validate_deposit(Some(&bad)), Err(EngineError::Validation(_))));
        assert!(validate_deposit(None).is_ok());
    }

    fn invoice(amount_paid: &str) -> ClientInvoice {
        ClientInvoice {
            id: 12,
            organization_id: 1,
            project_id: 1,
            invoice_number: "INV-0012".into(),
            amount_paid: dec(amount_paid),
        }
    }

    #[test]
    fn unpaid_invoice_cannot_be_ordered() {
        let err = ensure_paid(&invoice("0")).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("INV-0012"));
        assert!(ensure_paid(&invoice("0.00")).is_err());
        assert!(ensure_paid(&invoice("250.00")).is_ok());
    }

    #[test]
    fn ordering_moves_item_and_payment_forward() {
        assert_eq!(
            order_transition(ItemSpecStatus::Priced, PaymentStatus::Unpaid).unwrap(),
            (ItemSpecStatus::Ordered, PaymentStatus::FullyPaid)
        );
        assert_eq!(
            order_transition(ItemSpecStatus::Ordered, PaymentStatus::DepositPaid).unwrap(),
            (ItemSpecStatus::Ordered, PaymentStatus::FullyPaid)
        );
        assert!(order_transition(ItemSpecStatus::Ordered, PaymentStatus::FullyPaid).is_ok());
    }

    #[test]
    fn delivered_item_cannot_be_reordered() {
        let err = order_transition(ItemSpecStatus::Delivered, PaymentStatus::FullyPaid).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn csv_export_lists_lines_and_shipping() {
        let order = Order {
            id: 1,
            organization_id: 1,
            supplier_id: 2,
            invoice_id: 3,
            order_number: "PO-2026-0001".into(),
            status: OrderStatus::Pending,
            subtotal: dec("20.00"),
            shipping_cost: dec("5.00"),
            total: dec("25.00"),
            deposit_percent: None,
            deposit_amount: None,
            balance_due: dec("25.00"),
            amount_paid: dec("0.00"),
            created_at: Utc::now(),
            lines: vec![OrderLineItem {
                id: 9,
                order_id: 1,
                item_id: 4,
                component_id: None,
                parent_line_id: None,
                is_component: false,
                name: "Brass pendant, large".into(),
                sku: Some("BP-L".into()),
                quantity: 2,
                unit_price: dec("10.00"),
                total_price: dec("20.00"),
            }],
        };
        let csv = render_order_csv(&order).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("order_number,line"));
        assert_eq!(rows[1], "PO-2026-0001,1,4,no,BP-L,\"Brass pendant, large\",2,10.00,20.00");
        assert!(rows[2].ends_with("shipping,,,5.00"));
    }
}
