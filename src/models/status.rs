use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 非法状态迁移
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot move from {} to {}", self.entity, self.from, self.to)
    }
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        EngineError::Conflict(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status value: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

fn check<S: fmt::Display + Copy>(
    entity: &'static str,
    from: S,
    to: S,
    allowed: bool,
) -> Result<S, TransitionError> {
    if allowed {
        Ok(to)
    } else {
        Err(TransitionError {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// 需求项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSpecStatus {
    Draft,
    Quoting,
    Quoted,
    Priced,
    Ordered,
    Delivered,
}

impl ItemSpecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSpecStatus::Draft => "draft",
            ItemSpecStatus::Quoting => "quoting",
            ItemSpecStatus::Quoted => "quoted",
            ItemSpecStatus::Priced => "priced",
            ItemSpecStatus::Ordered => "ordered",
            ItemSpecStatus::Delivered => "delivered",
        }
    }

    pub fn can_transition_to(&self, next: ItemSpecStatus) -> bool {
        use ItemSpecStatus::*;
        match (self, next) {
            (Draft, Quoting | Quoted | Priced | Ordered) => true,
            (Quoting, Quoted | Priced | Ordered) => true,
            (Quoted, Priced | Ordered) => true,
            // a newer accepted quote re-prices the item
            (Priced, Priced | Ordered) => true,
            (Ordered, Delivered) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: ItemSpecStatus) -> Result<ItemSpecStatus, TransitionError> {
        check("item", self, next, self.can_transition_to(next))
    }
}

impl fmt::Display for ItemSpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemSpecStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ItemSpecStatus::Draft),
            "quoting" => Ok(ItemSpecStatus::Quoting),
            "quoted" => Ok(ItemSpecStatus::Quoted),
            "priced" => Ok(ItemSpecStatus::Priced),
            "ordered" => Ok(ItemSpecStatus::Ordered),
            "delivered" => Ok(ItemSpecStatus::Delivered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// 付款状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    DepositPaid,
    FullyPaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::DepositPaid => "deposit_paid",
            PaymentStatus::FullyPaid => "fully_paid",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Unpaid, DepositPaid | FullyPaid) | (DepositPaid, FullyPaid) | (FullyPaid, FullyPaid)
        )
    }

    pub fn transition(self, next: PaymentStatus) -> Result<PaymentStatus, TransitionError> {
        check("payment", self, next, self.can_transition_to(next))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "deposit_paid" => Ok(PaymentStatus::DepositPaid),
            "fully_paid" => Ok(PaymentStatus::FullyPaid),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// 采购单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Sent,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Sent => "sent",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Sent | Confirmed | Cancelled)
                | (Sent, Confirmed | Cancelled)
                | (Confirmed, Shipped | Cancelled)
                | (Shipped, Delivered)
        )
    }

    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus, TransitionError> {
        check("order", self, next, self.can_transition_to(next))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "sent" => Ok(OrderStatus::Sent),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// 报价行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteLineStatus {
    Received,
    Accepted,
    Superseded,
}

impl QuoteLineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteLineStatus::Received => "received",
            QuoteLineStatus::Accepted => "accepted",
            QuoteLineStatus::Superseded => "superseded",
        }
    }

    pub fn can_transition_to(&self, next: QuoteLineStatus) -> bool {
        use QuoteLineStatus::*;
        matches!(
            (self, next),
            (Received, Accepted | Superseded)
                | (Accepted, Accepted | Superseded)
                | (Superseded, Accepted | Superseded)
        )
    }

    pub fn transition(self, next: QuoteLineStatus) -> Result<QuoteLineStatus, TransitionError> {
        check("quote line", self, next, self.can_transition_to(next))
    }
}

impl fmt::Display for QuoteLineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteLineStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(QuoteLineStatus::Received),
            "accepted" => Ok(QuoteLineStatus::Accepted),
            "superseded" => Ok(QuoteLineStatus::Superseded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// 对账会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    UnderReview,
    Finalized,
    Superseded,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::UnderReview => "under_review",
            SessionState::Finalized => "finalized",
            SessionState::Superseded => "superseded",
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Open, UnderReview | Finalized | Superseded)
                | (UnderReview, UnderReview | Finalized | Superseded)
                | (Finalized, Superseded)
        )
    }

    pub fn transition(self, next: SessionState) -> Result<SessionState, TransitionError> {
        check("session", self, next, self.can_transition_to(next))
    }

    pub fn accepts_review(&self) -> bool {
        matches!(self, SessionState::Open | SessionState::UnderReview)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionState::Open),
            "under_review" => Ok(SessionState::UnderReview),
            "finalized" => Ok(SessionState::Finalized),
            "superseded" => Ok(SessionState::Superseded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Parse a status column, surfacing bad rows as a decode error.
pub fn parse_column<T: FromStr<Err = UnknownStatus>>(value: &str) -> Result<T, sqlx::Error> {
    value.parse().map_err(|e: UnknownStatus| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_item_cannot_be_repriced() {
        assert!(ItemSpecStatus::Quoted.can_transition_to(ItemSpecStatus::Priced));
        assert!(ItemSpecStatus::Priced.can_transition_to(ItemSpecStatus::Priced));
        let err = ItemSpecStatus::Ordered.transition(ItemSpecStatus::Priced).unwrap_err();
        assert_eq!(err.to_string(), "item cannot move from ordered to priced");
    }

    #[test]
    fn cancelled_and_delivered_orders_are_terminal() {
        for next in [OrderStatus::Pending, OrderStatus::Sent, OrderStatus::Cancelled] {
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
            assert!(!OrderStatus::Delivered.can_transition_to(next));
        }
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn finalized_session_rejects_review() {
        assert!(!SessionState::Finalized.accepts_review());
        assert!(SessionState::Finalized.can_transition_to(SessionState::Superseded));
        assert!(!SessionState::Superseded.can_transition_to(SessionState::Open));
    }

    #[test]
    fn status_strings_parse_back() {
        for s in [
            OrderStatus::Pending,
            OrderStatus::Sent,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("shipping".parse::<OrderStatus>().is_err());
        assert_eq!("deposit_paid".parse::<PaymentStatus>().unwrap(), PaymentStatus::DepositPaid);
    }

    #[test]
    fn payment_never_moves_backwards() {
        assert_eq!(
            PaymentStatus::DepositPaid.transition(PaymentStatus::FullyPaid).unwrap(),
            PaymentStatus::FullyPaid
        );
        let err = PaymentStatus::FullyPaid.transition(PaymentStatus::Unpaid).unwrap_err();
        assert_eq!(err.to_string(), "payment cannot move from fully_paid to unpaid");
    }

    #[test]
    fn quote_lines_never_return_to_received() {
        assert!(QuoteLineStatus::Superseded.transition(QuoteLineStatus::Accepted).is_ok());
        assert!(QuoteLineStatus::Accepted.transition(QuoteLineStatus::Received).is_err());
    }

    #[test]
    fn transition_error_becomes_conflict() {
        let err: EngineError = OrderStatus::Delivered
            .transition(OrderStatus::Sent)
            .unwrap_err()
            .into();
        assert!(matches!(err, EngineError::Conflict(_)));
    }
}
