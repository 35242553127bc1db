//! Pattern Indexer Module
//!
//! Generates the hierarchical search patterns an item is indexed under.

use std::collections::BTreeSet;

use crate::cache::SearchParameter;

/// Separator between parameter keys inside one pattern.
pub const PATTERN_SEPARATOR: &str = ">";

// == Sort ==
/// Returns the parameters in hierarchy order (level, then name, then value).
pub fn sorted(parameters: &[SearchParameter]) -> Vec<SearchParameter> {
    let mut sorted = parameters.to_vec();
    sorted.sort();
    sorted
}

// == Generate Patterns ==
/// Generates every contiguous, level-ordered pattern for `parameters`.
///
/// For `n` parameters the result holds at most `n(n+1)/2` patterns. Single-parameter
/// ranges are included, so each parameter's own key is always a member.
///
/// ```text
/// [region=us (L0), tier=gold (L1)]
///   => L0:region=us
///      L1:tier=gold
///      L0:region=us>L1:tier=gold
/// ```
pub fn generate_patterns(parameters: &[SearchParameter]) -> BTreeSet<String> {
    let keys: Vec<String> = sorted(parameters).iter().map(SearchParameter::key).collect();

    let mut patterns = BTreeSet::new();
    for start in 0..keys.len() {
        for end in start..keys.len() {
            patterns.insert(keys[start..=end].join(PATTERN_SEPARATOR));
        }
    }
    patterns
}

// == Exact Pattern ==
/// Returns the single pattern spanning every parameter, or None for an empty list.
pub fn exact_pattern(parameters: &[SearchParameter]) -> Option<String> {
    if parameters.is_empty() {
        return None;
    }
    let keys: Vec<String> = sorted(parameters).iter().map(SearchParameter::key).collect();
    Some(keys.join(PATTERN_SEPARATOR))
}

// == Degrade ==
/// Drops the most specific level (the highest level present) from a sorted list.
///
/// Every parameter at that level goes at once, because equal-level parameters have no
/// meaningful order among themselves.
pub fn drop_most_specific(sorted: &[SearchParameter]) -> Vec<SearchParameter> {
    match sorted.last() {
        Some(last) => sorted
            .iter()
            .filter(|p| p.level < last.level)
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str, value: &str, level: i32) -> SearchParameter {
        SearchParameter::new(name, value, level)
    }

    #[test]
    fn test_empty_parameters() {
        assert!(generate_patterns(&[]).is_empty());
        assert!(exact_pattern(&[]).is_none());
    }

    #[test]
    fn test_two_parameters() {
        let patterns = generate_patterns(&[p("tier", "gold", 1), p("region", "us", 0)]);
        let expected: BTreeSet<String> = [
            "L0:region=us",
            "L1:tier=gold",
            "L0:region=us>L1:tier=gold",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(patterns, expected);
    }

    #[test]
    fn test_three_parameters_are_contiguous_only() {
        let patterns = generate_patterns(&[p("a", "1", 0), p("b", "2", 1), p("c", "3", 2)]);
        assert_eq!(patterns.len(), 6);
        assert!(patterns.contains("L0:a=1>L1:b=2>L2:c=3"));
        // a and c are not adjacent once sorted
        assert!(!patterns.contains("L0:a=1>L2:c=3"));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let forward = generate_patterns(&[p("a", "1", 0), p("b", "2", 1), p("c", "3", 1)]);
        let backward = generate_patterns(&[p("c", "3", 1), p("b", "2", 1), p("a", "1", 0)]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_duplicates_collapse() {
        let patterns = generate_patterns(&[p("a", "1", 0), p("a", "1", 0)]);
        assert!(patterns.len() <= 3);
        assert!(patterns.contains("L0:a=1"));
    }

    #[test]
    fn test_exact_pattern() {
        assert_eq!(
            exact_pattern(&[p("tier", "gold", 1), p("region", "us", 0)]).unwrap(),
            "L0:region=us>L1:tier=gold"
        );
    }

    #[test]
    fn test_drop_most_specific() {
        let params = sorted(&[p("a", "1", 0), p("b", "2", 1), p("c", "3", 1)]);
        let degraded = drop_most_specific(&params);
        assert_eq!(degraded, vec![p("a", "1", 0)]);
        assert!(drop_most_specific(&degraded).is_empty());
    }
}
