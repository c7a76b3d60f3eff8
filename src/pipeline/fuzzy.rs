//! Fuzzy Matcher - resolves user-phrased filter values to stored column values

use crate::config::FuzzyConfig;
use crate::error::AssistantResult;
use crate::pipeline::state::{FilterSpec, MatchedFilter};
use async_trait::async_trait;
use std::sync::Arc;

/// Stored values of a filtered column
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// Stored value equal to `value` ignoring case
    async fn exact_value(&self, table: &str, column: &str, value: &str) -> AssistantResult<Option<String>>;

    /// Up to `limit` stored values, closest to `value` first
    async fn candidate_values(&self, table: &str, column: &str, value: &str, limit: usize)
        -> AssistantResult<Vec<String>>;
}

pub struct FuzzyMatcher {
    source: Arc<dyn ValueSource>,
    threshold: f64,
    max_candidates: usize,
}

impl FuzzyMatcher {
    pub fn new(source: Arc<dyn ValueSource>, config: &FuzzyConfig) -> Self {
        Self {
            source,
            threshold: config.threshold,
            max_candidates: config.max_candidates,
        }
    }

    /// Resolve every filter. Values that match nothing, and filters whose
    /// column cannot be read, keep the user's literal text.
    pub async fn resolve(&self, filters: &[FilterSpec]) -> Vec<MatchedFilter> {
        tracing::info!(filters = filters.len(), "Matching filters with fuzzy logic");
        let mut matched = Vec::with_capacity(filters.len());
        for filter in filters {
            let mut values: Vec<String> = Vec::new();
            for requested in split_values(&filter.value) {
                let value = self.resolve_value(filter, &requested).await;
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            matched.push(MatchedFilter {
                filter: filter.clone(),
                values,
            });
        }
        matched
    }

    async fn resolve_value(&self, filter: &FilterSpec, requested: &str) -> String {
        let (table, column) = (filter.table_name.as_str(), filter.column_name.as_str());

        let lookup = match self.source.exact_value(table, column, requested).await {
            Ok(Some(stored)) => return stored,
            Ok(None) => {
                self.source
                    .candidate_values(table, column, requested, self.max_candidates)
                    .await
            }
            Err(e) => Err(e),
        };

        match lookup {
            Ok(candidates) => match best_match(requested, &candidates, self.threshold) {
                Some(hit) => {
                    tracing::debug!(requested = %requested, matched = %hit, "Fuzzy matched filter value");
                    hit
                }
                None => {
                    tracing::debug!(requested = %requested, table, column, "No stored value matched, keeping literal");
                    requested.to_string()
                }
            },
            Err(e) => {
                tracing::warn!(table, column, error = %e, "Could not load column values, keeping literal filter");
                requested.to_string()
            }
        }
    }
}

/// Filters the detector gives as "KF_101, KF_102" are matched item by item
pub fn split_values(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Best candidate scoring at least `threshold`; the first candidate wins ties.
/// A near match whose digits differ from the request is a different code
/// (B003 is not B001, 2024-12 is not 2024-11) and never wins.
pub fn best_match(requested: &str, candidates: &[String], threshold: f64) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for candidate in candidates {
        let score = score(requested, candidate);
        if score < 1.0 && digits(requested) != digits(candidate) {
            continue;
        }
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c.clone())
}

/// 1.0 for equal normalized text, 0.9 when one contains the other,
/// otherwise the normalized edit-distance ratio
pub fn score(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let ratio = levenshtein_ratio(&a, &b);
    if a.contains(&b) || b.contains(&a) {
        return ratio.max(0.9);
    }
    ratio
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Lowercase, alphanumerics only, runs of anything else become one space
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with(' ') && !out.is_empty() {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}

fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;

    /// Stored values in storage order; candidate lookups honour `limit`
    /// without ranking, like an unordered `LIMIT`
    struct StoredValues(Vec<String>);

    impl StoredValues {
        fn new(values: &[&str]) -> Self {
            Self(values.iter().map(|v| v.to_string()).collect())
        }
    }

    #[async_trait]
    impl ValueSource for StoredValues {
        async fn exact_value(&self, _table: &str, _column: &str, value: &str) -> AssistantResult<Option<String>> {
            Ok(self.0.iter().find(|v| v.to_lowercase() == value.to_lowercase()).cloned())
        }

        async fn candidate_values(
            &self,
            _table: &str,
            _column: &str,
            _value: &str,
            limit: usize,
        ) -> AssistantResult<Vec<String>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl ValueSource for Unreachable {
        async fn exact_value(&self, _table: &str, _column: &str, _value: &str) -> AssistantResult<Option<String>> {
            Err(AssistantError::database("connection refused"))
        }

        async fn candidate_values(
            &self,
            _table: &str,
            _column: &str,
            _value: &str,
            _limit: usize,
        ) -> AssistantResult<Vec<String>> {
            Err(AssistantError::database("connection refused"))
        }
    }

    fn filter(value: &str) -> FilterSpec {
        FilterSpec {
            table_name: "brand_master".to_string(),
            column_name: "brand_code".to_string(),
            value: value.to_string(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_score() {
        assert_eq!(score("b001", "B001"), 1.0);
        assert_eq!(score("PC-101", "pc_101"), 1.0);
        assert!(score("Aurora", "Aurora Premium") >= 0.9);
        assert!(score("Zenith", "Zenth") > 0.8);
        assert!(score("Advertisement", "Payroll") < 0.5);
        assert_eq!(score("", "x"), 0.0);
    }

    #[test]
    fn test_best_match_prefers_highest_then_first() {
        let candidates = strings(&["B002", "B001", "b001"]);
        assert_eq!(best_match("b001", &candidates, 0.6).as_deref(), Some("B001"));
        assert_eq!(best_match("Q999", &candidates, 0.9), None);
    }

    #[test]
    fn test_best_match_never_swaps_codes() {
        assert_eq!(best_match("B003", &strings(&["B001", "B002"]), 0.6), None);
        assert_eq!(best_match("2024-12", &strings(&["2024-11", "2023-12"]), 0.6), None);
        assert_eq!(best_match("PC_109", &strings(&["PC_101", "PC_110"]), 0.6), None);

        // Same digits, different spelling
        assert_eq!(best_match("pc-101", &strings(&["PC_101"]), 0.6).as_deref(), Some("PC_101"));
        assert_eq!(best_match("Zenth", &strings(&["Zenith"]), 0.6).as_deref(), Some("Zenith"));
    }

    #[test]
    fn test_split_values() {
        assert_eq!(split_values("KF_101, 'KF_102',,"), strings(&["KF_101", "KF_102"]));
    }

    #[tokio::test]
    async fn test_resolve_matches_each_value() {
        let matcher = FuzzyMatcher::new(Arc::new(StoredValues::new(&["B001", "B002", "Aurora"])), &FuzzyConfig::default());
        let matched = matcher.resolve(&[filter("b001, b-002, Unknown brand, aurora")]).await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].values, strings(&["B001", "B002", "Unknown brand", "Aurora"]));
    }

    #[tokio::test]
    async fn test_resolve_finds_stored_value_beyond_candidate_limit() {
        let stored: Vec<String> = (0..2000).map(|n| format!("B{:04}", n)).collect();
        let matcher = FuzzyMatcher::new(Arc::new(StoredValues(stored)), &FuzzyConfig::default());

        let matched = matcher.resolve(&[filter("B1500")]).await;
        assert_eq!(matched[0].values, strings(&["B1500"]));

        let matched = matcher.resolve(&[filter("B2500")]).await;
        assert_eq!(matched[0].values, strings(&["B2500"]));
    }

    #[tokio::test]
    async fn test_resolve_keeps_literal_for_missing_code() {
        let matcher = FuzzyMatcher::new(Arc::new(StoredValues::new(&["B001", "B002"])), &FuzzyConfig::default());
        let matched = matcher.resolve(&[filter("B003")]).await;
        assert_eq!(matched[0].values, strings(&["B003"]));
    }

    #[tokio::test]
    async fn test_resolve_keeps_literal_when_source_fails() {
        let matcher = FuzzyMatcher::new(Arc::new(Unreachable), &FuzzyConfig::default());
        let matched = matcher.resolve(&[filter("B001")]).await;
        assert_eq!(matched[0].values, strings(&["B001"]));
    }
}
