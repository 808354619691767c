use crate::error::{EngineError, Result};
use crate::models::{
    AcceptQuoteOutcome, AcceptQuoteRequest, AggregateStatus, CreateOrdersRequest, Order,
    OrderPreview, RecordPaymentRequest, SupplierRequestStatus, UpdateOrderStatusRequest,
};
use crate::service::lifecycle::DeclineRequest;
use crate::service::reconciliation::{
    ExtractRequest, ReconcileOutcome, ReconcileRequest, ReviewOutcome, ReviewRequest, SessionView,
};
use crate::service::{AcceptanceService, LifecycleService, OrderService, ReconciliationService};
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Json, Path, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// 租户范围, taken from the `x-organization-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgScope(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for OrgScope
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ORGANIZATION_HEADER)
            .ok_or_else(|| EngineError::Validation(format!("{} header is required", ORGANIZATION_HEADER)))?;
        raw.to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(OrgScope)
            .ok_or_else(|| EngineError::Validation(format!("{} must be a positive integer", ORGANIZATION_HEADER)))
    }
}

/// 可选请求体: an empty body means defaults, anything else must be valid JSON
fn optional_json<T: DeserializeOwned + Default>(headers: &HeaderMap, body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(EngineError::Validation(
            "request body must be sent as application/json".into(),
        ));
    }
    serde_json::from_slice(body).map_err(|e| EngineError::Validation(format!("invalid request body: {}", e)))
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 提交已抽取报价并对账
pub async fn reconcile_quote(
    State(service): State<Arc<ReconciliationService>>,
    OrgScope(org): OrgScope,
    Json(req): Json<ReconcileRequest>,
) -> Result<(StatusCode, Json<ReconcileOutcome>)> {
    let outcome = service.reconcile(org, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// 抽取文档后对账
pub async fn extract_quote(
    State(service): State<Arc<ReconciliationService>>,
    OrgScope(org): OrgScope,
    Json(req): Json<ExtractRequest>,
) -> Result<(StatusCode, Json<ReconcileOutcome>)> {
    let outcome = service.extract_and_reconcile(org, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_session(
    State(service): State<Arc<ReconciliationService>>,
    OrgScope(org): OrgScope,
    Path(session_id): Path<i64>,
) -> Result<Json<SessionView>> {
    Ok(Json(service.get_session(org, session_id).await?))
}

pub async fn review_session(
    State(service): State<Arc<ReconciliationService>>,
    OrgScope(org): OrgScope,
    Path(session_id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewOutcome>> {
    Ok(Json(service.apply_review(org, session_id, req).await?))
}

pub async fn view_supplier_request(
    State(service): State<Arc<LifecycleService>>,
    OrgScope(org): OrgScope,
    Path(supplier_request_id): Path<i64>,
) -> Result<Json<SupplierRequestStatus>> {
    Ok(Json(service.mark_viewed(org, supplier_request_id).await?))
}

pub async fn decline_supplier_request(
    State(service): State<Arc<LifecycleService>>,
    OrgScope(org): OrgScope,
    Path(supplier_request_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SupplierRequestStatus>> {
    let req: DeclineRequest = optional_json(&headers, &body)?;
    Ok(Json(service.decline(org, supplier_request_id, req.reason).await?))
}

pub async fn quote_request_status(
    State(service): State<Arc<LifecycleService>>,
    OrgScope(org): OrgScope,
    Path(quote_request_id): Path<i64>,
) -> Result<Json<AggregateStatus>> {
    Ok(Json(service.aggregate_status(org, quote_request_id).await?))
}

/// 接受报价行: `{success, error?}`
pub async fn accept_quote(
    State(service): State<Arc<AcceptanceService>>,
    OrgScope(org): OrgScope,
    Path(item_id): Path<i64>,
    Json(req): Json<AcceptQuoteRequest>,
) -> Result<(StatusCode, Json<AcceptQuoteOutcome>)> {
    let outcome = service
        .accept_quote_line(org, item_id, req.quote_line_id, req.markup_percent)
        .await?;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(outcome)))
}

pub async fn preview_orders(
    State(service): State<Arc<OrderService>>,
    OrgScope(org): OrgScope,
    Path(invoice_id): Path<i64>,
) -> Result<Json<OrderPreview>> {
    Ok(Json(service.preview_orders(org, invoice_id).await?))
}

/// 发票生成采购单
pub async fn create_orders(
    State(service): State<Arc<OrderService>>,
    OrgScope(org): OrgScope,
    Path(invoice_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<Order>>)> {
    let req: CreateOrdersRequest = optional_json(&headers, &body)?;
    let orders = service.create_orders_from_invoice(org, invoice_id, req).await?;
    let status = if orders.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(orders)))
}

pub async fn get_order(
    State(service): State<Arc<OrderService>>,
    OrgScope(org): OrgScope,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>> {
    Ok(Json(service.get_order(org, order_id).await?))
}

pub async fn update_order_status(
    State(service): State<Arc<OrderService>>,
    OrgScope(org): OrgScope,
    Path(order_id): Path<i64>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>> {
    Ok(Json(service.update_order_status(org, order_id, req.status).await?))
}

pub async fn record_order_payment(
    State(service): State<Arc<OrderService>>,
    OrgScope(org): OrgScope,
    Path(order_id): Path<i64>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<Json<Order>> {
    Ok(Json(service.record_order_payment(org, order_id, req.amount).await?))
}

pub async fn export_order_csv(
    State(service): State<Arc<OrderService>>,
    OrgScope(org): OrgScope,
    Path(order_id): Path<i64>,
) -> Result<Response> {
    let body = service.export_order_csv(org, order_id).await?;
    let disposition = format!("attachment; filename=\"order-{}.csv\"", order_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers
    }

    #[test]
    fn empty_body_falls_back_to_defaults() {
        let req: CreateOrdersRequest = optional_json(&HeaderMap::new(), b"").unwrap();
        assert_eq!(req, CreateOrdersRequest::default());
        let req: CreateOrdersRequest = optional_json(&json_headers(), b" \n").unwrap();
        assert_eq!(req, CreateOrdersRequest::default());
    }

    #[test]
    fn truncated_body_is_a_validation_error() {
        let body = br#"{"itemIds": [5], "deposit": {"percent": 150"#;
        let err = optional_json::<CreateOrdersRequest>(&json_headers(), body).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn body_without_json_content_type_is_rejected() {
        let err = optional_json::<DeclineRequest>(&HeaderMap::new(), br#"{"reason":"busy"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn well_formed_body_is_parsed() {
        let req: CreateOrdersRequest = optional_json(&json_headers(), br#"{"itemIds":[5]}"#).unwrap();
        assert_eq!(req.item_ids, Some(vec![5]));
    }
}
