use crate::error::{EngineError, Result};
use crate::models::{MatchResult, RequestedItem, SessionState, SupplierInfo};
use crate::service::discrepancy::{is_quantity_discrepancy, quantity_discrepancy};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional corrections applied when approving a match
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ApprovalOverrides {
    pub unit_price: Option<BigDecimal>,
    pub quantity: Option<i32>,
}

/// How an unmatched extracted line was handled outside the matching flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtraResolution {
    AddedToCatalog,
    #[serde(rename_all = "camelCase")]
    FiledAsComponent { parent_item_id: i64 },
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved { overrides: ApprovalOverrides },
    Rejected,
    Reassigned { requested_item_id: i64 },
    ResolvedExtra { resolution: ExtraResolution },
    /// A Missing entry made obsolete by a manual reassignment at `by_index`
    Superseded { by_index: usize },
}

impl ReviewDecision {
    pub fn is_approval(&self) -> bool {
        matches!(
            self,
            ReviewDecision::Approved { .. } | ReviewDecision::Reassigned { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub decision: ReviewDecision,
    pub reviewer: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedResult {
    pub result: MatchResult,
    pub review: Option<Review>,
    #[serde(default)]
    pub manually_matched: bool,
}

impl ReviewedResult {
    pub fn new(result: MatchResult) -> Self {
        Self {
            result,
            review: None,
            manually_matched: false,
        }
    }

    fn decision(&self) -> Option<&ReviewDecision> {
        self.review.as_ref().map(|r| &r.decision)
    }

    fn is_approved(&self) -> bool {
        self.decision().map(ReviewDecision::is_approval).unwrap_or(false)
    }
}

/// Reviewer action posted against a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewAction {
    #[serde(rename_all = "camelCase")]
    Approve {
        match_index: usize,
        #[serde(default)]
        overrides: ApprovalOverrides,
    },
    #[serde(rename_all = "camelCase")]
    Reassign {
        match_index: usize,
        requested_item_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    Reject {
        match_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    ResolveExtra {
        match_index: usize,
        resolution: ExtraResolution,
    },
    Finalize,
}

/// Quote line to record for an approved result when the session is finalized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteLineDraft {
    pub requested_item_id: i64,
    pub product_name: String,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub total_price: BigDecimal,
    pub lead_time: Option<String>,
}

/// 审核产生的外部副作用, executed and logged by the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SideEffect {
    PropagateQuantity {
        requested_item_id: i64,
        from: i32,
        to: i32,
    },
    SyncQuoteLine(QuoteLineDraft),
}

/// Session-level totals check
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionDiscrepancies {
    pub computed_total: BigDecimal,
    pub declared_total: Option<BigDecimal>,
    pub total_mismatch: bool,
    pub has_shipping: bool,
    pub has_taxes: bool,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub matched: usize,
    pub partial: usize,
    pub missing: usize,
    pub extra: usize,
    pub approved: usize,
    pub rejected: usize,
    pub unreviewed: usize,
}

/// 对账会话 - one round of match results for one quote submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSession {
    pub id: i64,
    pub organization_id: i64,
    pub supplier_request_id: i64,
    pub quote_id: i64,
    pub version: i32,
    pub state: SessionState,
    pub supplier_info: SupplierInfo,
    pub results: Vec<ReviewedResult>,
    pub discrepancies: SessionDiscrepancies,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ReconciliationSession {
    pub fn summary(&self) -> SessionSummary {
        let mut s = SessionSummary::default();
        for r in &self.results {
            if matches!(r.decision(), Some(ReviewDecision::Superseded { .. })) {
                continue;
            }
            match r.result {
                MatchResult::Matched { .. } => s.matched += 1,
                MatchResult::Partial { .. } => s.partial += 1,
                MatchResult::Missing { .. } => s.missing += 1,
                MatchResult::Extra { .. } => s.extra += 1,
            }
            match r.decision() {
                Some(d) if d.is_approval() => s.approved += 1,
                Some(ReviewDecision::Rejected) => s.rejected += 1,
                Some(_) => {}
                None => s.unreviewed += 1,
            }
        }
        s
    }

    fn ensure_reviewable(&self) -> Result<()> {
        if self.state.accepts_review() {
            Ok(())
        } else {
            Err(EngineError::Conflict(format!(
                "session {} is {} and no longer accepts review",
                self.id, self.state
            )))
        }
    }

    fn slot(&self, index: usize) -> Result<&ReviewedResult> {
        self.results.get(index).ok_or_else(|| {
            EngineError::Validation(format!(
                "match index {} out of range for session {} ({} results)",
                index,
                self.id,
                self.results.len()
            ))
        })
    }

    fn ensure_not_approved_elsewhere(&self, index: usize, item_id: i64) -> Result<()> {
        let holder = self.results.iter().enumerate().find(|(j, r)| {
            *j != index && r.is_approved() && r.result.claimed_item_id() == Some(item_id)
        });
        match holder {
            Some((j, _)) => Err(EngineError::Conflict(format!(
                "requested item {} is already approved at match index {}",
                item_id, j
            ))),
            None => Ok(()),
        }
    }

    fn mark_reviewed(&mut self, index: usize, decision: ReviewDecision, reviewer: &str, now: DateTime<Utc>) {
        self.results[index].review = Some(Review {
            decision,
            reviewer: reviewer.to_string(),
            reviewed_at: now,
        });
        if self.state == SessionState::Open {
            self.state = SessionState::UnderReview;
        }
        self.updated_at = now;
    }

    /// Re-open the Missing entry of an item that lost its claim, appending one if absent.
    fn restore_missing(&mut self, item: RequestedItem) {
        let still_claimed = self
            .results
            .iter()
            .any(|r| r.result.claimed_item_id() == Some(item.id));
        if still_claimed {
            return;
        }
        let existing = self.results.iter_mut().find(|r| {
            matches!(&r.result, MatchResult::Missing { requested_item } if requested_item.id == item.id)
        });
        match existing {
            Some(r) => {
                if matches!(r.decision(), Some(ReviewDecision::Superseded { .. })) {
                    r.review = None;
                }
            }
            None => self
                .results
                .push(ReviewedResult::new(MatchResult::Missing { requested_item: item })),
        }
    }

    /// Approve a Matched/Partial result with optional price/quantity corrections.
    pub fn approve(
        &mut self,
        index: usize,
        overrides: ApprovalOverrides,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SideEffect>> {
        self.ensure_reviewable()?;
        let slot = self.slot(index)?;
        let Some(item_id) = slot.result.claimed_item_id() else {
            return Err(EngineError::Validation(format!(
                "match index {} is {} and cannot be approved",
                index,
                slot.result.kind()
            )));
        };
        if let Some(price) = &overrides.unit_price {
            if *price < BigDecimal::from(0) {
                return Err(EngineError::Validation("unit price override must not be negative".into()));
            }
        }
        if let Some(q) = overrides.quantity {
            if q <= 0 {
                return Err(EngineError::Validation("quantity override must be positive".into()));
            }
        }

        let decision = ReviewDecision::Approved { overrides: overrides.clone() };
        if slot.decision() == Some(&decision) {
            return Ok(Vec::new());
        }
        self.ensure_not_approved_elsewhere(index, item_id)?;

        let mut effects = Vec::new();
        if let Some(corrected) = overrides.quantity {
            if let MatchResult::Matched { requested_item, extracted, discrepancies, .. }
            | MatchResult::Partial { requested_item, extracted, discrepancies, .. } =
                &mut self.results[index].result
            {
                if requested_item.quantity != corrected {
                    effects.push(SideEffect::PropagateQuantity {
                        requested_item_id: requested_item.id,
                        from: requested_item.quantity,
                        to: corrected,
                    });
                    requested_item.quantity = corrected;
                    // 只重算数量差异, 其余提示保留
                    discrepancies.retain(|m| !is_quantity_discrepancy(m));
                    if let Some(message) = quantity_discrepancy(requested_item, extracted) {
                        discrepancies.insert(0, message);
                    }
                }
            }
        }

        self.mark_reviewed(index, decision, reviewer, now);
        Ok(effects)
    }

    /// Link a result to a different requested item, as a manual full-confidence match.
    pub fn reassign(
        &mut self,
        index: usize,
        item: RequestedItem,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_reviewable()?;
        let slot = self.slot(index)?;
        let Some(extracted) = slot.result.extracted().cloned() else {
            return Err(EngineError::Validation(format!(
                "match index {} has no extracted line to reassign",
                index
            )));
        };
        let decision = ReviewDecision::Reassigned { requested_item_id: item.id };
        if slot.decision() == Some(&decision) && slot.result.claimed_item_id() == Some(item.id) {
            return Ok(());
        }
        self.ensure_not_approved_elsewhere(index, item.id)?;

        let previous = slot.result.requested_item().cloned();

        // displace any unapproved holder of the target and retire its Missing entry
        for j in 0..self.results.len() {
            if j == index {
                continue;
            }
            let other = &mut self.results[j];
            if other.result.claimed_item_id() == Some(item.id) {
                other.result = other.result.clone().unlinked();
                other.review = None;
                other.manually_matched = false;
            } else if matches!(&other.result, MatchResult::Missing { requested_item } if requested_item.id == item.id) {
                other.review = Some(Review {
                    decision: ReviewDecision::Superseded { by_index: index },
                    reviewer: reviewer.to_string(),
                    reviewed_at: now,
                });
            }
        }

        let discrepancies = quantity_discrepancy(&item, &extracted).into_iter().collect();
        self.results[index].result = MatchResult::Matched {
            confidence: 100,
            requested_item: item,
            extracted,
            discrepancies,
        };
        self.results[index].manually_matched = true;
        self.mark_reviewed(index, decision, reviewer, now);

        if let Some(prev) = previous {
            if self.results[index].result.claimed_item_id() != Some(prev.id) {
                self.restore_missing(prev);
            }
        }
        Ok(())
    }

    /// Mark a result rejected and drop its requested-item link.
    pub fn reject(&mut self, index: usize, reviewer: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_reviewable()?;
        let slot = self.slot(index)?;
        if slot.decision() == Some(&ReviewDecision::Rejected) {
            return Ok(());
        }

        let released = match &slot.result {
            MatchResult::Matched { requested_item, .. } | MatchResult::Partial { requested_item, .. } => {
                Some(requested_item.clone())
            }
            _ => None,
        };
        if released.is_some() {
            let r = &mut self.results[index];
            r.result = r.result.clone().unlinked();
            r.manually_matched = false;
        }
        self.mark_reviewed(index, ReviewDecision::Rejected, reviewer, now);
        if let Some(item) = released {
            self.restore_missing(item);
        }
        Ok(())
    }

    /// Close an Extra result without linking it to a requested item.
    pub fn resolve_extra(
        &mut self,
        index: usize,
        resolution: ExtraResolution,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_reviewable()?;
        let slot = self.slot(index)?;
        if !matches!(slot.result, MatchResult::Extra { .. }) {
            return Err(EngineError::Validation(format!(
                "match index {} is {}, only extra results can be resolved",
                index,
                slot.result.kind()
            )));
        }
        let decision = ReviewDecision::ResolvedExtra { resolution };
        if slot.decision() == Some(&decision) {
            return Ok(());
        }
        self.mark_reviewed(index, decision, reviewer, now);
        Ok(())
    }

    /// Close the session and emit one quote line per approved result.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<Vec<SideEffect>> {
        if self.state == SessionState::Finalized {
            return Ok(Vec::new());
        }
        self.state = self.state.transition(SessionState::Finalized)?;
        self.finalized_at = Some(now);
        self.updated_at = now;

        let mut effects = Vec::new();
        for r in &self.results {
            let Some(decision) = r.decision() else { continue };
            if !decision.is_approval() {
                continue;
            }
            let (MatchResult::Matched { requested_item, extracted, .. }
            | MatchResult::Partial { requested_item, extracted, .. }) = &r.result
            else {
                continue;
            };
            let overrides = match decision {
                ReviewDecision::Approved { overrides } => overrides.clone(),
                _ => ApprovalOverrides::default(),
            };
            let Some(unit_price) = overrides.unit_price.or_else(|| extracted.unit_price.clone()) else {
                tracing::warn!(
                    "Session {}: approved item {} has no unit price, quote line skipped",
                    self.id, requested_item.id
                );
                continue;
            };
            let quantity = overrides
                .quantity
                .or(extracted.quantity)
                .unwrap_or(requested_item.quantity);
            let total_price = (&unit_price * BigDecimal::from(quantity)).with_scale(2);
            effects.push(SideEffect::SyncQuoteLine(QuoteLineDraft {
                requested_item_id: requested_item.id,
                product_name: extracted.product_name.clone(),
                unit_price,
                quantity,
                total_price,
                lead_time: extracted.lead_time.clone(),
            }));
        }
        Ok(effects)
    }
}
