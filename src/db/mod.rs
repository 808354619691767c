pub mod pool;
pub mod queries_catalog;
pub mod queries_order;
pub mod queries_quote;
pub mod queries_session;

pub use pool::{create_pool, run_migrations};
