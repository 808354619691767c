use crate::config::MatchingConfig;
use crate::models::{clamp_confidence, ExtractedLineItem, MatchResult, RequestedItem, Suggestion};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// Lowercase and strip everything that is not alphanumeric.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn tokens_match(a: &str, b: &str) -> bool {
    a == b || a.contains(b) || b.contains(a)
}

/// 单个候选的得分拆解
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateScore {
    pub identifier: u32,
    pub brand: u32,
    pub name: u32,
}

impl CandidateScore {
    pub fn total(&self) -> u32 {
        self.identifier + self.brand + self.name
    }
}

/// 匹配统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchStats {
    pub extracted: usize,
    pub matched: usize,
    pub partial: usize,
    pub extra: usize,
    pub missing: usize,
}

impl MatchStats {
    pub fn from_results(extracted: usize, results: &[MatchResult]) -> Self {
        let mut stats = MatchStats {
            extracted,
            ..Default::default()
        };
        for r in results {
            match r {
                MatchResult::Matched { .. } => stats.matched += 1,
                MatchResult::Partial { .. } => stats.partial += 1,
                MatchResult::Extra { .. } => stats.extra += 1,
                MatchResult::Missing { .. } => stats.missing += 1,
            }
        }
        stats
    }

    pub fn needs_review(&self) -> bool {
        self.partial > 0 || self.extra > 0 || self.missing > 0
    }
}

/// 报价行匹配器 - additive point scoring, best candidate wins, first claim wins
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatchingConfig,
}

impl Matcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    fn tokens(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for raw in name.split(|c: char| !c.is_alphanumeric()) {
            let t = raw.to_lowercase();
            if t.chars().count() >= self.config.min_token_len && !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }

    fn extracted_tokens(&self, extracted: &ExtractedLineItem) -> Vec<String> {
        let mut out = self.tokens(&extracted.product_name);
        if let Some(original) = &extracted.product_name_original {
            for t in self.tokens(original) {
                if !out.contains(&t) {
                    out.push(t);
                }
            }
        }
        out
    }

    /// Exact normalized identifier equality scores high, containment lower.
    fn identifier_score(&self, a: Option<&str>, b: Option<&str>) -> u32 {
        let (Some(a), Some(b)) = (a, b) else { return 0 };
        let (a, b) = (normalize(a), normalize(b));
        if a.is_empty() || b.is_empty() {
            0
        } else if a == b {
            self.config.identifier_exact_score
        } else if a.contains(&b) || b.contains(&a) {
            self.config.identifier_partial_score
        } else {
            0
        }
    }

    fn brand_score(&self, requested: &RequestedItem, extracted: &ExtractedLineItem) -> u32 {
        let (Some(a), Some(b)) = (requested.brand.as_deref(), extracted.brand.as_deref()) else {
            return 0;
        };
        let (a, b) = (normalize(a), normalize(b));
        if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
            self.config.brand_bonus
        } else {
            0
        }
    }

    fn overlap_count(requested_tokens: &[String], extracted_tokens: &[String]) -> usize {
        requested_tokens
            .iter()
            .filter(|r| extracted_tokens.iter().any(|e| tokens_match(r, e)))
            .count()
    }

    fn name_score(&self, requested: &RequestedItem, extracted: &ExtractedLineItem) -> u32 {
        let req_tokens = self.tokens(&requested.name);
        let ext_tokens = self.extracted_tokens(extracted);
        match Self::overlap_count(&req_tokens, &ext_tokens) {
            0 => 0,
            1 => {
                let limit = self.config.short_name_token_limit;
                if req_tokens.len() <= limit || ext_tokens.len() <= limit {
                    self.config.single_word_short_score
                } else {
                    self.config.single_word_long_score
                }
            }
            _ => self.config.multi_word_score,
        }
    }

    /// Score one pair. Name overlap only counts when no identifier channel fired.
    pub fn score_pair(&self, requested: &RequestedItem, extracted: &ExtractedLineItem) -> CandidateScore {
        let ext_sku = extracted.sku.as_deref();
        let sku = self.identifier_score(requested.sku.as_deref(), ext_sku);
        let model = self.identifier_score(requested.model_number.as_deref(), ext_sku);
        let identifier = sku.max(model).min(self.config.identifier_exact_score);
        let brand = self.brand_score(requested, extracted);
        let name = if identifier == 0 {
            self.name_score(requested, extracted)
        } else {
            0
        };
        CandidateScore {
            identifier,
            brand,
            name,
        }
    }

    fn threshold_for(&self, score: &CandidateScore) -> u32 {
        if score.identifier >= self.config.identifier_partial_score {
            self.config.identifier_threshold
        } else {
            self.config.name_threshold
        }
    }

    /// Lighter word-overlap pass for an unmatched line, capped below a real match.
    fn suggestion_score(&self, requested: &RequestedItem, extracted: &ExtractedLineItem) -> u32 {
        let req_tokens = self.tokens(&requested.name);
        let ext_tokens = self.extracted_tokens(extracted);
        let overlap = Self::overlap_count(&req_tokens, &ext_tokens) as u32;
        if overlap == 0 {
            return 0;
        }
        let denom = req_tokens.len().max(ext_tokens.len()).max(1) as u32;
        let cap = self.config.suggestion_cap;
        (cap * overlap / denom + self.brand_score(requested, extracted)).min(cap)
    }

    pub fn suggestions(
        &self,
        extracted: &ExtractedLineItem,
        catalog: &[RequestedItem],
        claimed: &HashSet<i64>,
    ) -> Vec<Suggestion> {
        let mut ranked: Vec<Suggestion> = catalog
            .iter()
            .filter(|r| !claimed.contains(&r.id))
            .filter_map(|r| {
                let score = self.suggestion_score(r, extracted);
                (score > 0).then(|| Suggestion {
                    requested_item_id: r.id,
                    name: r.name.clone(),
                    confidence: clamp_confidence(score),
                })
            })
            .collect();
        // stable: equal scores keep catalog order
        ranked.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        ranked.truncate(self.config.max_suggestions);
        ranked
    }

    /// Best unclaimed candidate for one line; ties keep the first encountered.
    fn best_candidate<'a>(
        &self,
        extracted: &ExtractedLineItem,
        pool: &[&'a RequestedItem],
    ) -> Option<(&'a RequestedItem, CandidateScore)> {
        let scores: Vec<CandidateScore> = pool
            .par_iter()
            .map(|r| self.score_pair(r, extracted))
            .collect();

        let mut best: Option<(usize, CandidateScore)> = None;
        for (idx, score) in scores.into_iter().enumerate() {
            let is_better = match &best {
                None => score.total() > 0,
                Some((_, b)) => score.total() > b.total(),
            };
            if is_better {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, score)| (pool[idx], score))
    }

    /// One result per extracted line (in extraction order), then one Missing per unclaimed item.
    pub fn reconcile(&self, extracted: &[ExtractedLineItem], catalog: &[RequestedItem]) -> Vec<MatchResult> {
        let mut claimed: HashSet<i64> = HashSet::new();
        let mut results: Vec<MatchResult> = Vec::with_capacity(extracted.len() + catalog.len());
        let mut extra_indexes: Vec<usize> = Vec::new();

        for line in extracted {
            let pool: Vec<&RequestedItem> = catalog.iter().filter(|r| !claimed.contains(&r.id)).collect();
            let best = self.best_candidate(line, &pool);
            let confidence = best.map(|(_, s)| clamp_confidence(s.total())).unwrap_or(0);

            let claim = best.and_then(|(item, score)| {
                let total = score.total();
                if total >= self.config.matched_threshold {
                    Some((item, true))
                } else if total >= self.threshold_for(&score) {
                    Some((item, false))
                } else {
                    None
                }
            });

            match claim {
                Some((item, full)) => {
                    claimed.insert(item.id);
                    let requested_item = item.clone();
                    let discrepancies = Vec::new();
                    results.push(if full {
                        MatchResult::Matched { confidence, requested_item, extracted: line.clone(), discrepancies }
                    } else {
                        MatchResult::Partial { confidence, requested_item, extracted: line.clone(), discrepancies }
                    });
                }
                None => {
                    extra_indexes.push(results.len());
                    results.push(MatchResult::Extra {
                        confidence,
                        extracted: line.clone(),
                        suggestions: Vec::new(),
                    });
                }
            }
        }

        for idx in extra_indexes {
            if let MatchResult::Extra { extracted, suggestions, .. } = &mut results[idx] {
                *suggestions = self.suggestions(extracted, catalog, &claimed);
            }
        }

        for item in catalog.iter().filter(|r| !claimed.contains(&r.id)) {
            results.push(MatchResult::Missing {
                requested_item: item.clone(),
            });
        }

        let stats = MatchStats::from_results(extracted.len(), &results);
        tracing::info!(
            "Reconciled {} extracted lines against {} requested items: matched {}, partial {}, extra {}, missing {}",
            stats.extracted, catalog.len(), stats.matched, stats.partial, stats.extra, stats.missing
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::discrepancy::DiscrepancyAnalyzer;
    use bigdecimal::BigDecimal;

    fn item(id: i64, name: &str) -> RequestedItem {
        RequestedItem {
            id,
            project_id: 1,
            name: name.to_string(),
            sku: None,
            model_number: None,
            brand: None,
            quantity: 1,
            unit_type: "each".into(),
            trade_price: None,
        }
    }

    fn line(name: &str) -> ExtractedLineItem {
        ExtractedLineItem {
            product_name: name.to_string(),
            quantity: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize(" K-1234/B "), "k1234b");
    }

    #[test]
    fn exact_sku_matches_with_seventy() {
        let catalog = vec![RequestedItem { sku: Some("K-1234".into()), ..item(1, "Faucet") }];
        let extracted = vec![ExtractedLineItem {
            sku: Some("K-1234".into()),
            unit_price: Some(BigDecimal::from(150)),
            ..line("Kohler K-1234 Faucet")
        }];
        let results = Matcher::default().reconcile(&extracted, &catalog);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind(), "matched");
        assert!(results[0].confidence() >= 70);
    }

    #[test]
    fn normalized_identical_skus_score_at_least_seventy() {
        let m = Matcher::default();
        for (a, b) in [("AB-100", "ab100"), ("x.9.y", "X9Y"), ("123 45", "12345")] {
            let r = RequestedItem { sku: Some(a.into()), ..item(1, "anything") };
            let e = ExtractedLineItem { sku: Some(b.into()), ..line("other") };
            assert!(m.score_pair(&r, &e).identifier >= 70, "{} vs {}", a, b);
        }
    }

    #[test]
    fn model_number_channel_anchors_alone() {
        let r = RequestedItem { model_number: Some("PT-88".into()), ..item(1, "Table Lamp") };
        let e = ExtractedLineItem { sku: Some("pt88".into()), ..line("Lamp") };
        let score = Matcher::default().score_pair(&r, &e);
        assert_eq!(score.identifier, 70);
        assert_eq!(score.name, 0);
    }

    #[test]
    fn brand_bonus_never_anchors_alone() {
        let catalog = vec![RequestedItem { brand: Some("Visual Comfort".into()), ..item(1, "Chandelier") }];
        let extracted = vec![ExtractedLineItem { brand: Some("visual comfort".into()), ..line("Sofa") }];
        let results = Matcher::default().reconcile(&extracted, &catalog);
        assert_eq!(results[0].kind(), "extra");
        assert_eq!(results[1].kind(), "missing");
    }

    #[test]
    fn short_name_single_token_is_partial_with_quantity_gap() {
        let catalog = vec![item(1, "Porter Ottoman")];
        let extracted = vec![ExtractedLineItem { quantity: Some(2), ..line("Ottoman") }];
        let mut results = Matcher::default().reconcile(&extracted, &catalog);
        assert!(matches!(results[0], MatchResult::Partial { confidence: 40, .. }));
        assert_eq!(results.len(), 1);

        DiscrepancyAnalyzer::default().annotate(&mut results);
        assert_eq!(
            results[0].discrepancies(),
            &["Quantity: requested 1, quoted 2".to_string()]
        );
    }

    #[test]
    fn long_names_single_token_falls_below_threshold() {
        let catalog = vec![item(1, "Large Round Walnut Dining Table")];
        let extracted = vec![line("Outdoor Teak Coffee Table Set")];
        let m = Matcher::default();
        assert_eq!(m.score_pair(&catalog[0], &extracted[0]).name, 25);
        let results = m.reconcile(&extracted, &catalog);
        assert_eq!(results[0].kind(), "extra");
    }

    #[test]
    fn claimed_items_are_not_matched_twice() {
        let catalog = vec![RequestedItem { sku: Some("SKU-1".into()), ..item(1, "Sconce") }];
        let extracted = vec![
            ExtractedLineItem { sku: Some("SKU-1".into()), ..line("Sconce") },
            ExtractedLineItem { sku: Some("SKU-1".into()), ..line("Sconce") },
        ];
        let results = Matcher::default().reconcile(&extracted, &catalog);
        let claims: Vec<i64> = results.iter().filter_map(MatchResult::claimed_item_id).collect();
        assert_eq!(claims, vec![1]);
        assert_eq!(results[1].kind(), "extra");
    }

    #[test]
    fn ties_keep_first_catalog_item() {
        let catalog = vec![item(1, "Velvet Sofa"), item(2, "Velvet Sofa")];
        let results = Matcher::default().reconcile(&[line("Velvet Sofa")], &catalog);
        assert_eq!(results[0].claimed_item_id(), Some(1));
        assert!(matches!(&results[1], MatchResult::Missing { requested_item } if requested_item.id == 2));
    }

    #[test]
    fn extra_suggestions_ranked_and_capped() {
        let catalog: Vec<RequestedItem> = (1..=8)
            .map(|i| item(i, &format!("Brass Cabinet Pull Handle Finish {}", "x".repeat(i as usize + 2))))
            .collect();
        let extracted = vec![line("Brass knob assorted colors kit")];
        let results = Matcher::default().reconcile(&extracted, &catalog);
        let MatchResult::Extra { suggestions, .. } = &results[0] else {
            panic!("expected extra, got {}", results[0].kind());
        };
        assert!(suggestions.len() <= 5);
        assert!(!suggestions.is_empty());
        assert!(suggestions.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(suggestions.iter().all(|s| s.confidence <= 60));
    }

    #[test]
    fn confidence_always_within_bounds() {
        let catalog = vec![RequestedItem {
            sku: Some("A1".into()),
            model_number: Some("A1".into()),
            brand: Some("Acme".into()),
            ..item(1, "Acme Lamp")
        }];
        let extracted = vec![ExtractedLineItem {
            sku: Some("A1".into()),
            brand: Some("Acme".into()),
            ..line("Acme Lamp")
        }];
        let results = Matcher::default().reconcile(&extracted, &catalog);
        assert_eq!(results[0].confidence(), 85);
        assert!(results.iter().all(|r| r.confidence() <= 100));
    }

    #[test]
    fn malformed_input_degrades_to_extra() {
        let catalog = vec![item(1, "")];
        let extracted = vec![ExtractedLineItem { sku: Some("--".into()), ..line("") }];
        let results = Matcher::default().reconcile(&extracted, &catalog);
        assert_eq!(results[0].kind(), "extra");
        assert_eq!(results[0].confidence(), 0);
        assert_eq!(results[1].kind(), "missing");
    }
}
