use crate::config::AppConfig;
use crate::db::{queries_catalog, queries_quote, queries_session};
use crate::error::{EngineError, Result};
use crate::models::status::parse_column;
use crate::models::{
    ExtractionOutput, ItemSpecStatus, LifecycleEvent, MatchResult, QuoteLineDraft,
    ReconciliationSession, RequestLifecycle, ReviewAction, ReviewedResult, SessionDiscrepancies,
    SessionState, SessionSummary, SideEffect,
};
use crate::service::discrepancy::DiscrepancyAnalyzer;
use crate::service::extraction::ExtractionClient;
use crate::service::matcher::{MatchStats, Matcher};
use crate::service::notify::{EngineEvent, Notifier};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 对账请求体: 已抽取的报价单
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub supplier_request_id: i64,
    pub extraction: ExtractionOutput,
}

/// 抽取并对账请求体
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub supplier_request_id: i64,
    pub document_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub session_id: i64,
    pub quote_id: i64,
    pub version: i32,
    pub results: Vec<MatchResult>,
    pub summary: SessionSummary,
    pub discrepancies: SessionDiscrepancies,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub reviewer: String,
    #[serde(flatten)]
    pub action: ReviewAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub session_id: i64,
    pub state: SessionState,
    pub summary: SessionSummary,
    pub side_effects: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: ReconciliationSession,
    pub summary: SessionSummary,
}

/// Reject structurally invalid input before anything touches the database.
pub fn validate_reconcile(req: &ReconcileRequest) -> Result<&[crate::models::ExtractedLineItem]> {
    if req.supplier_request_id <= 0 {
        return Err(EngineError::Validation("supplierRequestId is required".into()));
    }
    req.extraction
        .extracted_items
        .as_deref()
        .ok_or_else(|| EngineError::Validation("extraction.extractedItems is required".into()))
}

/// 按会话串行化审核; an entry lives only while someone holds or waits on it
#[derive(Debug, Default)]
struct SessionLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: i64) -> SessionLock<'_> {
        let lock = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SessionLock {
            locks: &self.locks,
            session_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct SessionLock<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    session_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        // 先释放锁, 再清理无人等待的条目
        drop(self.guard.take());
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// 报价对账服务
pub struct ReconciliationService {
    pool: PgPool,
    matcher: Matcher,
    analyzer: DiscrepancyAnalyzer,
    extraction: ExtractionClient,
    notifier: Notifier,
    review_locks: SessionLocks,
}

impl ReconciliationService {
    pub fn new(pool: PgPool, config: &AppConfig, notifier: Notifier) -> Result<Self> {
        Ok(Self {
            pool,
            matcher: Matcher::new(config.matching.clone()),
            analyzer: DiscrepancyAnalyzer::new(config.discrepancy.clone()),
            extraction: ExtractionClient::new(&config.extraction)?,
            notifier,
            review_locks: SessionLocks::default(),
        })
    }

    /// 对账入口: match, analyze and persist a new session round for one supplier submission
    pub async fn reconcile(&self, organization_id: i64, req: ReconcileRequest) -> Result<ReconcileOutcome> {
        let extracted = validate_reconcile(&req)?;
        let supplier_request_id = req.supplier_request_id;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        // 1. 锁定供应商询价并推进状态
        let request = queries_session::lock_supplier_request(&mut *tx, organization_id, supplier_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("supplier request", supplier_request_id))?;
        let current: RequestLifecycle = parse_column(&request.status)?;
        let transition = current.apply(LifecycleEvent::QuoteSubmitted)?;
        queries_session::update_supplier_request_state(&mut *tx, request.id, transition.state, now, None)
            .await?;

        // 2. 匹配 + 差异分析
        let catalog = queries_catalog::list_batch_items(&mut *tx, organization_id, request.quote_request_id).await?;
        let mut results = self.matcher.reconcile(extracted, &catalog);
        self.analyzer.annotate(&mut results);
        let discrepancies = self.analyzer.analyze_session(&req.extraction.supplier_info, extracted);
        let stats = MatchStats::from_results(extracted.len(), &results);

        // 3. 写入报价与新版本会话
        let quote_id = queries_session::insert_quote(
            &mut *tx,
            organization_id,
            request.id,
            request.supplier_id,
            &req.extraction.supplier_info,
            req.extraction.notes.as_deref(),
        )
        .await?;
        let superseded = queries_session::supersede_sessions(&mut *tx, request.id, now).await?;
        let version = queries_session::next_session_version(&mut *tx, request.id).await?;

        let mut session = ReconciliationSession {
            id: 0,
            organization_id,
            supplier_request_id: request.id,
            quote_id,
            version,
            state: SessionState::Open,
            supplier_info: req.extraction.supplier_info.clone(),
            results: results.iter().cloned().map(ReviewedResult::new).collect(),
            discrepancies: discrepancies.clone(),
            created_at: now,
            updated_at: now,
            finalized_at: None,
        };
        session.id = queries_session::insert_session(&mut *tx, &session).await?;

        tx.commit().await?;

        tracing::info!(
            "Supplier request {}: session {} v{} created (quote {}, {} earlier rounds superseded)",
            supplier_request_id, session.id, version, quote_id, superseded
        );

        self.notifier.emit(EngineEvent::QuoteReceived {
            organization_id,
            supplier_request_id,
            session_id: session.id,
            quote_id,
        });
        if stats.needs_review() {
            self.notifier.emit(EngineEvent::MatchNeedsReview {
                organization_id,
                session_id: session.id,
                partial: stats.partial,
                extra: stats.extra,
                missing: stats.missing,
            });
        }

        Ok(ReconcileOutcome {
            session_id: session.id,
            quote_id,
            version,
            summary: session.summary(),
            results,
            discrepancies,
        })
    }

    /// Call the extraction provider for a document, then reconcile its output.
    pub async fn extract_and_reconcile(&self, organization_id: i64, req: ExtractRequest) -> Result<ReconcileOutcome> {
        if req.supplier_request_id <= 0 {
            return Err(EngineError::Validation("supplierRequestId is required".into()));
        }
        if req.document_url.trim().is_empty() {
            return Err(EngineError::Validation("documentUrl is required".into()));
        }

        let request = queries_session::get_supplier_request(&self.pool, organization_id, req.supplier_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("supplier request", req.supplier_request_id))?;
        let catalog = queries_catalog::list_batch_items(&self.pool, organization_id, request.quote_request_id).await?;

        let extraction = self.extraction.extract(&req.document_url, &catalog).await?;
        self.reconcile(
            organization_id,
            ReconcileRequest {
                supplier_request_id: req.supplier_request_id,
                extraction,
            },
        )
        .await
    }

    pub async fn get_session(&self, organization_id: i64, session_id: i64) -> Result<SessionView> {
        if session_id <= 0 {
            return Err(EngineError::Validation("session id is required".into()));
        }
        let session = queries_session::get_session(&self.pool, organization_id, session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("session", session_id))?;
        let summary = session.summary();
        Ok(SessionView { session, summary })
    }

    /// 审核操作, serialized per session
    pub async fn apply_review(&self, organization_id: i64, session_id: i64, req: ReviewRequest) -> Result<ReviewOutcome> {
        if session_id <= 0 {
            return Err(EngineError::Validation("session id is required".into()));
        }
        let reviewer = req.reviewer.trim();
        if reviewer.is_empty() {
            return Err(EngineError::Validation("reviewer is required".into()));
        }

        let _guard = self.review_locks.acquire(session_id).await;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut session = queries_session::lock_session(&mut *tx, organization_id, session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("session", session_id))?;

        let effects = match req.action {
            ReviewAction::Approve { match_index, overrides } => {
                session.approve(match_index, overrides, reviewer, now)?
            }
            ReviewAction::Reassign { match_index, requested_item_id } => {
                let item = queries_catalog::get_item(&mut *tx, organization_id, requested_item_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("requested item", requested_item_id))?;
                session.reassign(match_index, item, reviewer, now)?;
                Vec::new()
            }
            ReviewAction::Reject { match_index } => {
                session.reject(match_index, reviewer, now)?;
                Vec::new()
            }
            ReviewAction::ResolveExtra { match_index, resolution } => {
                session.resolve_extra(match_index, resolution, reviewer, now)?;
                Vec::new()
            }
            ReviewAction::Finalize => session.finalize(now)?,
        };

        let applied = self.apply_side_effects(&mut tx, &session, &effects).await?;
        queries_session::update_session(&mut *tx, &session).await?;
        tx.commit().await?;

        tracing::info!(
            "Session {} reviewed by {}: state {}, {} side effects",
            session_id, reviewer, session.state, applied
        );

        Ok(ReviewOutcome {
            session_id,
            state: session.state,
            summary: session.summary(),
            side_effects: applied,
        })
    }

    /// 执行审核副作用 (quantity propagation, quote line sync)
    async fn apply_side_effects(
        &self,
        conn: &mut PgConnection,
        session: &ReconciliationSession,
        effects: &[SideEffect],
    ) -> Result<usize> {
        let mut drafts: Vec<QuoteLineDraft> = Vec::new();
        let mut applied = 0;

        for effect in effects {
            match effect {
                SideEffect::PropagateQuantity { requested_item_id, from, to } => {
                    let updated = queries_catalog::update_item_quantity(
                        &mut *conn,
                        session.organization_id,
                        *requested_item_id,
                        *to,
                    )
                    .await?;
                    if updated == 0 {
                        return Err(EngineError::not_found("requested item", *requested_item_id));
                    }
                    tracing::info!(
                        "Session {}: requested item {} quantity {} -> {}",
                        session.id, requested_item_id, from, to
                    );
                    applied += 1;
                }
                SideEffect::SyncQuoteLine(draft) => drafts.push(draft.clone()),
            }
        }

        if drafts.is_empty() {
            return Ok(applied);
        }

        let request = queries_session::get_supplier_request(
            &mut *conn,
            session.organization_id,
            session.supplier_request_id,
        )
        .await?
        .ok_or_else(|| EngineError::not_found("supplier request", session.supplier_request_id))?;
        let synced = queries_quote::upsert_quote_lines(&mut *conn, session.quote_id, request.supplier_id, &drafts).await?;
        applied += synced as usize;

        let item_ids: Vec<i64> = drafts.iter().map(|d| d.requested_item_id).collect();
        for row in queries_catalog::lock_items(&mut *conn, session.organization_id, &item_ids).await? {
            let status: ItemSpecStatus = parse_column(&row.status)?;
            if matches!(status, ItemSpecStatus::Draft | ItemSpecStatus::Quoting) {
                queries_catalog::update_item_status(&mut *conn, row.id, ItemSpecStatus::Quoted).await?;
                tracing::info!("Requested item {}: {} -> {}", row.id, status, ItemSpecStatus::Quoted);
            }
        }
        tracing::info!(
            "Session {}: synced {} quote lines into quote {}",
            session.id, synced, session.quote_id
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedLineItem, SupplierInfo};

    fn request(items: Option<Vec<ExtractedLineItem>>) -> ReconcileRequest {
        ReconcileRequest {
            supplier_request_id: 7,
            extraction: ExtractionOutput {
                supplier_info: SupplierInfo::default(),
                extracted_items: items,
                notes: None,
            },
        }
    }

    #[test]
    fn missing_item_list_is_a_validation_error() {
        let err = validate_reconcile(&request(None)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn empty_item_list_is_accepted() {
        let req = request(Some(Vec::new()));
        assert!(validate_reconcile(&req).unwrap().is_empty());
    }

    #[test]
    fn supplier_request_id_is_required() {
        let mut req = request(Some(Vec::new()));
        req.supplier_request_id = 0;
        assert!(matches!(validate_reconcile(&req), Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn session_lock_entry_is_removed_on_release() {
        let locks = SessionLocks::default();
        {
            let _held = locks.acquire(5).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn queued_reviews_leave_no_entries_behind() {
        let locks = Arc::new(SessionLocks::default());
        let first = locks.acquire(5).await;
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let locks = locks.clone();
                tokio::spawn(async move {
                    let _held = locks.acquire(5).await;
                })
            })
            .collect();
        tokio::task::yield_now().await;
        drop(first);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn review_request_reads_flat_action() {
        let req: ReviewRequest = serde_json::from_value(serde_json::json!({
            "reviewer": "kim",
            "action": "approve",
            "matchIndex": 2,
            "overrides": { "quantity": 4 }
        }))
        .unwrap();
        assert_eq!(req.reviewer, "kim");
        match req.action {
            ReviewAction::Approve { match_index, overrides } => {
                assert_eq!(match_index, 2);
                assert_eq!(overrides.quantity, Some(4));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
