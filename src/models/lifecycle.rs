use crate::models::status::{TransitionError, UnknownStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// 供应商询价状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestLifecycle {
    Pending,
    Viewed,
    Submitted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    PortalViewed,
    QuoteSubmitted,
    Declined,
}

/// Outcome of applying an event: the new state and whether anything changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: RequestLifecycle,
    pub changed: bool,
}

impl RequestLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestLifecycle::Pending => "pending",
            RequestLifecycle::Viewed => "viewed",
            RequestLifecycle::Submitted => "submitted",
            RequestLifecycle::Declined => "declined",
        }
    }

    pub fn has_responded(&self) -> bool {
        matches!(self, RequestLifecycle::Submitted | RequestLifecycle::Declined)
    }

    /// Transition table. Viewing is idempotent in every state; a resubmission
    /// keeps the request Submitted and starts a fresh review cycle.
    pub fn apply(self, event: LifecycleEvent) -> Result<Transition, TransitionError> {
        use LifecycleEvent as E;
        use RequestLifecycle::*;
        let next = match (self, event) {
            (Pending, E::PortalViewed) => Some(Viewed),
            (_, E::PortalViewed) => None,
            (Pending | Viewed, E::QuoteSubmitted) => Some(Submitted),
            (Submitted, E::QuoteSubmitted) => Some(Submitted),
            (Pending | Viewed, E::Declined) => Some(Declined),
            (Declined, E::Declined) => None,
            (Declined, E::QuoteSubmitted) | (Submitted, E::Declined) => {
                return Err(TransitionError {
                    entity: "supplier request",
                    from: self.to_string(),
                    to: match event {
                        E::QuoteSubmitted => Submitted.to_string(),
                        _ => Declined.to_string(),
                    },
                });
            }
        };
        Ok(match next {
            Some(state) => Transition { state, changed: true },
            None => Transition { state: self, changed: false },
        })
    }
}

impl fmt::Display for RequestLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestLifecycle {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestLifecycle::Pending),
            "viewed" => Ok(RequestLifecycle::Viewed),
            "submitted" => Ok(RequestLifecycle::Submitted),
            "declined" => Ok(RequestLifecycle::Declined),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// 询价单整体状态 (derived, never stored)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateRequestState {
    Open,
    PartiallyQuoted,
    FullyQuoted,
}

impl AggregateRequestState {
    pub fn derive(states: &[RequestLifecycle]) -> Self {
        let responded = states.iter().filter(|s| s.has_responded()).count();
        if responded == 0 {
            AggregateRequestState::Open
        } else if responded == states.len() {
            AggregateRequestState::FullyQuoted
        } else {
            AggregateRequestState::PartiallyQuoted
        }
    }
}

/// 供应商询价记录 (supplier_requests)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SupplierRequestRow {
    pub id: i64,
    pub quote_request_id: i64,
    pub supplier_id: i64,
    pub supplier_name: String,
    pub status: String,
    pub viewed_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplierRequestStatus {
    pub supplier_request_id: i64,
    pub supplier_id: i64,
    pub supplier_name: String,
    pub state: RequestLifecycle,
    pub viewed_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateStatus {
    pub quote_request_id: i64,
    pub state: AggregateRequestState,
    pub suppliers: Vec<SupplierRequestStatus>,
}

#[cfg(test)]
mod tests {
    use super::LifecycleEvent as E;
    use super::RequestLifecycle::*;
    use super::*;

    #[test]
    fn viewing_is_stamped_once() {
        let first = Pending.apply(E::PortalViewed).unwrap();
        assert_eq!(first, Transition { state: Viewed, changed: true });
        let second = Viewed.apply(E::PortalViewed).unwrap();
        assert!(!second.changed);
        assert!(!Submitted.apply(E::PortalViewed).unwrap().changed);
    }

    #[test]
    fn resubmission_does_not_reopen_pending() {
        let t = Submitted.apply(E::QuoteSubmitted).unwrap();
        assert_eq!(t.state, Submitted);
        assert!(t.changed);
    }

    #[test]
    fn responded_requests_cannot_flip() {
        assert!(Declined.apply(E::QuoteSubmitted).is_err());
        assert!(Submitted.apply(E::Declined).is_err());
        assert!(!Declined.apply(E::Declined).unwrap().changed);
    }

    #[test]
    fn aggregate_counts_declines_as_responses() {
        assert_eq!(AggregateRequestState::derive(&[]), AggregateRequestState::Open);
        assert_eq!(
            AggregateRequestState::derive(&[Pending, Viewed]),
            AggregateRequestState::Open
        );
        assert_eq!(
            AggregateRequestState::derive(&[Declined, Viewed]),
            AggregateRequestState::PartiallyQuoted
        );
        assert_eq!(
            AggregateRequestState::derive(&[Declined, Submitted]),
            AggregateRequestState::FullyQuoted
        );
    }
}
