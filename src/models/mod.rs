pub mod catalog;
pub mod extraction;
pub mod lifecycle;
pub mod match_result;
pub mod order;
pub mod quote;
pub mod session;
pub mod status;

pub use catalog::{ItemComponent, RequestedItem};
pub use extraction::{ExtractedLineItem, ExtractionOutput, SupplierInfo};
pub use lifecycle::{
    AggregateRequestState, AggregateStatus, LifecycleEvent, RequestLifecycle, SupplierRequestRow,
    SupplierRequestStatus, Transition,
};
pub use match_result::{clamp_confidence, MatchResult, Suggestion};
pub use order::{
    ClientInvoice, CreateOrdersRequest, DepositTerms, ItemRef, Order, OrderCandidate,
    OrderLineItem, OrderPlan, OrderPreview, OrderRow, PlannedLine, RecordPaymentRequest,
    SupplierGroup, SupplierQuoteRef, UpdateOrderStatusRequest,
};
pub use quote::{AcceptQuoteOutcome, AcceptQuoteRequest, QuoteLineRow};
pub use session::{
    ApprovalOverrides, ExtraResolution, QuoteLineDraft, ReconciliationSession, Review,
    ReviewAction, ReviewDecision, ReviewedResult, SessionDiscrepancies, SessionSummary, SideEffect,
};
pub use status::{
    ItemSpecStatus, OrderStatus, PaymentStatus, QuoteLineStatus, SessionState, TransitionError,
};
