pub mod acceptance;
pub mod discrepancy;
pub mod extraction;
pub mod lifecycle;
pub mod matcher;
pub mod money;
pub mod notify;
pub mod order_generator;
pub mod reconciliation;

pub use acceptance::AcceptanceService;
pub use discrepancy::DiscrepancyAnalyzer;
pub use extraction::ExtractionClient;
pub use lifecycle::LifecycleService;
pub use matcher::{MatchStats, Matcher};
pub use notify::{EngineEvent, Notifier};
pub use order_generator::OrderService;
pub use reconciliation::ReconciliationService;
