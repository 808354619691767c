pub mod handlers;

use crate::config::AppConfig;
use crate::error::Result;
use crate::service::{AcceptanceService, LifecycleService, Notifier, OrderService, ReconciliationService};
use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;

pub use handlers::*;

/// 共享状态：各业务服务
#[derive(Clone)]
pub struct AppState {
    pub reconciliation: Arc<ReconciliationService>,
    pub lifecycle: Arc<LifecycleService>,
    pub acceptance: Arc<AcceptanceService>,
    pub orders: Arc<OrderService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &AppConfig) -> Result<Self> {
        let notifier = Notifier::new(&config.notifications)?;
        Ok(Self {
            reconciliation: Arc::new(ReconciliationService::new(pool.clone(), config, notifier.clone())?),
            lifecycle: Arc::new(LifecycleService::new(pool.clone())),
            acceptance: Arc::new(AcceptanceService::new(pool.clone())),
            orders: Arc::new(OrderService::new(pool, notifier)),
        })
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    // 报价对账 + 审核
    let reconciliation_routes = Router::new()
        .route("/api/quotes/reconcile", post(handlers::reconcile_quote))
        .route("/api/quotes/extract", post(handlers::extract_quote))
        .route("/api/sessions/:id", get(handlers::get_session))
        .route("/api/sessions/:id/review", post(handlers::review_session))
        .with_state(state.reconciliation);

    // 询价响应状态
    let lifecycle_routes = Router::new()
        .route("/api/supplier-requests/:id/view", post(handlers::view_supplier_request))
        .route("/api/supplier-requests/:id/decline", post(handlers::decline_supplier_request))
        .route("/api/quote-requests/:id/status", get(handlers::quote_request_status))
        .with_state(state.lifecycle);

    let acceptance_routes = Router::new()
        .route("/api/items/:id/accept-quote", post(handlers::accept_quote))
        .with_state(state.acceptance);

    // 采购单
    let order_routes = Router::new()
        .route("/api/invoices/:id/order-preview", get(handlers::preview_orders))
        .route("/api/invoices/:id/orders", post(handlers::create_orders))
        .route("/api/orders/:id", get(handlers::get_order))
        .route("/api/orders/:id/status", patch(handlers::update_order_status))
        .route("/api/orders/:id/payments", post(handlers::record_order_payment))
        .route("/api/orders/:id/export.csv", get(handlers::export_order_csv))
        .with_state(state.orders);

    // 合并路由
    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(reconciliation_routes)
        .merge(lifecycle_routes)
        .merge(acceptance_routes)
        .merge(order_routes)
        .layer(ServiceBuilder::new())
}
