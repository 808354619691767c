use crate::models::{ExtractedLineItem, RequestedItem};
use serde::{Deserialize, Serialize};

/// Clamp a raw additive score into the reported 0..=100 range.
pub fn clamp_confidence(score: u32) -> u8 {
    score.min(100) as u8
}

/// 候选建议 (Extra 结果)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub requested_item_id: i64,
    pub name: String,
    pub confidence: u8,
}

/// 匹配结果 - one per extracted line or per unmatched requested item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        confidence: u8,
        requested_item: RequestedItem,
        extracted: ExtractedLineItem,
        discrepancies: Vec<String>,
    },
    Partial {
        confidence: u8,
        requested_item: RequestedItem,
        extracted: ExtractedLineItem,
        discrepancies: Vec<String>,
    },
    Missing {
        requested_item: RequestedItem,
    },
    Extra {
        confidence: u8,
        extracted: ExtractedLineItem,
        suggestions: Vec<Suggestion>,
    },
}

impl MatchResult {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchResult::Matched { .. } => "matched",
            MatchResult::Partial { .. } => "partial",
            MatchResult::Missing { .. } => "missing",
            MatchResult::Extra { .. } => "extra",
        }
    }

    pub fn confidence(&self) -> u8 {
        match self {
            MatchResult::Matched { confidence, .. }
            | MatchResult::Partial { confidence, .. }
            | MatchResult::Extra { confidence, .. } => *confidence,
            MatchResult::Missing { .. } => 0,
        }
    }

    pub fn requested_item(&self) -> Option<&RequestedItem> {
        match self {
            MatchResult::Matched { requested_item, .. }
            | MatchResult::Partial { requested_item, .. }
            | MatchResult::Missing { requested_item } => Some(requested_item),
            MatchResult::Extra { .. } => None,
        }
    }

    pub fn extracted(&self) -> Option<&ExtractedLineItem> {
        match self {
            MatchResult::Matched { extracted, .. }
            | MatchResult::Partial { extracted, .. }
            | MatchResult::Extra { extracted, .. } => Some(extracted),
            MatchResult::Missing { .. } => None,
        }
    }

    /// The requested item this result claims, only for Matched/Partial.
    pub fn claimed_item_id(&self) -> Option<i64> {
        match self {
            MatchResult::Matched { requested_item, .. }
            | MatchResult::Partial { requested_item, .. } => Some(requested_item.id),
            _ => None,
        }
    }

    pub fn discrepancies(&self) -> &[String] {
        match self {
            MatchResult::Matched { discrepancies, .. }
            | MatchResult::Partial { discrepancies, .. } => discrepancies,
            _ => &[],
        }
    }

    pub fn discrepancies_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            MatchResult::Matched { discrepancies, .. }
            | MatchResult::Partial { discrepancies, .. } => Some(discrepancies),
            _ => None,
        }
    }

    /// Drop the requested-item link, leaving an unmatched extracted line.
    pub fn unlinked(self) -> MatchResult {
        match self {
            MatchResult::Matched { confidence, extracted, .. }
            | MatchResult::Partial { confidence, extracted, .. } => MatchResult::Extra {
                confidence,
                extracted,
                suggestions: Vec::new(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_caps_at_hundred() {
        assert_eq!(clamp_confidence(85), 85);
        assert_eq!(clamp_confidence(145), 100);
    }

    #[test]
    fn serialized_with_kind_tag() {
        let r = MatchResult::Extra {
            confidence: 10,
            extracted: ExtractedLineItem {
                product_name: "Sconce".into(),
                ..Default::default()
            },
            suggestions: vec![],
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "extra");
        let back: MatchResult = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
