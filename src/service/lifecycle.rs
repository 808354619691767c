use crate::db::queries_session;
use crate::error::{EngineError, Result};
use crate::models::status::parse_column;
use crate::models::{
    AggregateRequestState, AggregateStatus, LifecycleEvent, RequestLifecycle, SupplierRequestRow,
    SupplierRequestStatus,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

fn to_status(row: SupplierRequestRow) -> Result<SupplierRequestStatus> {
    Ok(SupplierRequestStatus {
        supplier_request_id: row.id,
        supplier_id: row.supplier_id,
        supplier_name: row.supplier_name,
        state: parse_column(&row.status)?,
        viewed_at: row.viewed_at,
        responded_at: row.responded_at,
        decline_reason: row.decline_reason,
    })
}

/// 询价响应状态机服务
pub struct LifecycleService {
    pool: PgPool,
}

impl LifecycleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// First portal access; repeated views keep the original timestamp.
    pub async fn mark_viewed(&self, organization_id: i64, supplier_request_id: i64) -> Result<SupplierRequestStatus> {
        self.apply_event(organization_id, supplier_request_id, LifecycleEvent::PortalViewed, None)
            .await
    }

    pub async fn decline(
        &self,
        organization_id: i64,
        supplier_request_id: i64,
        reason: Option<String>,
    ) -> Result<SupplierRequestStatus> {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        self.apply_event(organization_id, supplier_request_id, LifecycleEvent::Declined, reason)
            .await
    }

    async fn apply_event(
        &self,
        organization_id: i64,
        supplier_request_id: i64,
        event: LifecycleEvent,
        reason: Option<String>,
    ) -> Result<SupplierRequestStatus> {
        if supplier_request_id <= 0 {
            return Err(EngineError::Validation("supplier request id is required".into()));
        }

        let mut tx = self.pool.begin().await?;
        let row = queries_session::lock_supplier_request(&mut *tx, organization_id, supplier_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("supplier request", supplier_request_id))?;
        let current: RequestLifecycle = parse_column(&row.status)?;
        let transition = current.apply(event)?;

        if !transition.changed {
            tx.commit().await?;
            return to_status(row);
        }

        queries_session::update_supplier_request_state(
            &mut *tx,
            supplier_request_id,
            transition.state,
            Utc::now(),
            reason.as_deref(),
        )
        .await?;
        let updated = queries_session::get_supplier_request(&mut *tx, organization_id, supplier_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("supplier request", supplier_request_id))?;
        tx.commit().await?;

        tracing::info!(
            "Supplier request {}: {} -> {}",
            supplier_request_id, current, transition.state
        );
        to_status(updated)
    }

    /// 询价单整体状态, derived from the supplier rows on every read
    pub async fn aggregate_status(&self, organization_id: i64, quote_request_id: i64) -> Result<AggregateStatus> {
        if quote_request_id <= 0 {
            return Err(EngineError::Validation("quote request id is required".into()));
        }
        if !queries_session::quote_request_exists(&self.pool, organization_id, quote_request_id).await? {
            return Err(EngineError::not_found("quote request", quote_request_id));
        }

        let suppliers = queries_session::list_supplier_requests(&self.pool, organization_id, quote_request_id)
            .await?
            .into_iter()
            .map(to_status)
            .collect::<Result<Vec<_>>>()?;
        let states: Vec<RequestLifecycle> = suppliers.iter().map(|s| s.state).collect();

        Ok(AggregateStatus {
            quote_request_id,
            state: AggregateRequestState::derive(&states),
            suppliers,
        })
    }
}
