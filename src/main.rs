use quote_reconcile::db::run_migrations;
use quote_reconcile::{build_router, create_pool, AppConfig, AppState};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!(
        "Starting quote-reconcile on {}:{} (matching {:?}, tolerance {})",
        config.server.host, config.server.port, config.matching, config.discrepancy.total_tolerance
    );

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created (max {} connections)", config.database.max_connections);

    if config.database.run_migrations {
        run_migrations(&pool).await?;
        info!("Migrations applied");
    }

    // 构建路由
    let state = AppState::new(pool, &config)?;
    let app = build_router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/quotes/reconcile              - reconcile an extracted quote");
    info!("  POST /api/quotes/extract                - extract a document, then reconcile");
    info!("  POST /api/sessions/:id/review           - approve / reassign / reject / finalize");
    info!("  POST /api/items/:id/accept-quote        - accept a quote line");
    info!("  GET  /api/invoices/:id/order-preview    - dry-run order generation");
    info!("  POST /api/invoices/:id/orders           - create purchase orders");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
