//! Fuzzy Search: a weighted-ratio composite (partial-substring,
//! token-sort, token-set) built on `strsim::levenshtein`, since no
//! direct fuzzywuzzy-equivalent crate is available. Produces an integer
//! 0..100 where 100 is identity and 0 is no useful overlap.

use std::sync::Arc;

use shared_context_auth::{is_visible_with_filter, VisibilityFilter};
use shared_context_protocol::{CoreResult, Identity, Message};
use shared_context_storage::Storage;

use crate::cache::Cache;

pub struct SearchEngine {
    storage: Arc<dyn Storage>,
    cache: Arc<Cache>,
}

#[derive(Debug, Clone)]
pub struct ScoredMessage {
    pub message: Message,
    pub score: u8,
}

impl SearchEngine {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<Cache>) -> Self {
        Self { storage, cache }
    }

    /// Candidate messages for a session, read through the cache. Scoring
    /// and visibility filtering happen per call, on top of this, since they
    /// depend on the caller's identity and query.
    async fn candidates(&self, session_id: &str) -> CoreResult<Vec<Message>> {
        if let Some(cached) = self.cache.get_search(session_id).await {
            if let Ok(messages) = serde_json::from_value(cached) {
                return Ok(messages);
            }
        }
        let all = self.storage.list_messages(session_id).await?;
        self.cache
            .put_search(session_id, serde_json::to_value(&all).unwrap_or(serde_json::Value::Null))
            .await;
        Ok(all)
    }

    pub async fn search(
        &self,
        identity: &Identity,
        session_id: &str,
        query: &str,
        threshold: u8,
        limit: usize,
        search_metadata: bool,
        scope: Option<VisibilityFilter>,
    ) -> CoreResult<Vec<ScoredMessage>> {
        let all = self.candidates(session_id).await?;
        let query_lower = query.to_lowercase();

        let mut scored: Vec<ScoredMessage> = all
            .into_iter()
            .filter(|m| is_visible_with_filter(identity, m, scope))
            .map(|message| {
                let haystack = searchable_text(&message, search_metadata);
                let score = weighted_ratio(&query_lower, &haystack);
                ScoredMessage { message, score }
            })
            .filter(|scored| scored.score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.message.timestamp.cmp(&a.message.timestamp)));
        scored.truncate(limit);
        Ok(scored)
    }
}

fn searchable_text(message: &Message, search_metadata: bool) -> String {
    let mut text = format!("{} {}", message.sender, message.content).to_lowercase();
    if search_metadata {
        if let Some(values) = message.metadata.as_object() {
            for value in values.values() {
                if let Some(s) = value.as_str() {
                    text.push(' ');
                    text.push_str(&s.to_lowercase());
                }
            }
        }
    }
    text
}

/// Composite of simple-ratio, partial-substring ratio, token-sort ratio,
/// and token-set ratio, each normalized to 0..100 and combined by taking
/// the maximum — the standard behavior of the weighted-ratio family for
/// short, noisy strings.
#[must_use]
pub fn weighted_ratio(query: &str, candidate: &str) -> u8 {
    if query.is_empty() || candidate.is_empty() {
        return 0;
    }
    let simple = simple_ratio(query, candidate);
    let partial = partial_ratio(query, candidate);
    let token_sort = token_sort_ratio(query, candidate);
    let token_set = token_set_ratio(query, candidate);
    simple.max(partial).max(token_sort).max(token_set)
}

fn simple_ratio(a: &str, b: &str) -> u8 {
    ratio_from_distance(a, b)
}

fn ratio_from_distance(a: &str, b: &str) -> u8 {
    let distance = strsim::levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let similarity = 1.0 - (distance as f64 / max_len as f64);
    (similarity.max(0.0) * 100.0).round() as u8
}

/// Finds the best-aligned substring of `candidate` no longer than `query`
/// and scores the pair; this is what lets a short query match well inside
/// a long message.
fn partial_ratio(query: &str, candidate: &str) -> u8 {
    let query_chars: Vec<char> = query.chars().collect();
    let candidate_chars: Vec<char> = candidate.chars().collect();
    if query_chars.len() >= candidate_chars.len() {
        return ratio_from_distance(query, candidate);
    }
    let window = query_chars.len();
    let mut best = 0u8;
    for start in 0..=(candidate_chars.len() - window) {
        let slice: String = candidate_chars[start..start + window].iter().collect();
        best = best.max(ratio_from_distance(query, &slice));
    }
    best
}

fn tokenize(input: &str) -> Vec<&str> {
    input.split_whitespace().collect()
}

/// Sorts tokens in both strings before comparing, so word order differences
/// don't depress the score.
fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let sorted_a = sorted_tokens(a);
    let sorted_b = sorted_tokens(b);
    ratio_from_distance(&sorted_a, &sorted_b)
}

fn sorted_tokens(input: &str) -> String {
    let mut tokens = tokenize(input);
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Compares the intersection of tokens against each side's full token set,
/// taking the best of the three combinations; this tolerates one string
/// being a strict subset of the other's vocabulary.
fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a: std::collections::BTreeSet<&str> = tokenize(a).into_iter().collect();
    let tokens_b: std::collections::BTreeSet<&str> = tokenize(b).into_iter().collect();

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sorted_intersection = {
        let mut v = intersection.clone();
        v.sort_unstable();
        v.join(" ")
    };
    let combo_a = join_sorted(&sorted_intersection, &only_a);
    let combo_b = join_sorted(&sorted_intersection, &only_b);

    ratio_from_distance(&sorted_intersection, &combo_a)
        .max(ratio_from_distance(&sorted_intersection, &combo_b))
        .max(ratio_from_distance(&combo_a, &combo_b))
}

fn join_sorted(prefix: &str, rest: &[&str]) -> String {
    if rest.is_empty() {
        return prefix.to_string();
    }
    let mut sorted_rest = rest.to_vec();
    sorted_rest.sort_unstable();
    if prefix.is_empty() {
        sorted_rest.join(" ")
    } else {
        format!("{prefix} {}", sorted_rest.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(weighted_ratio("hello world", "hello world"), 100);
    }

    #[test]
    fn disjoint_strings_score_low() {
        assert!(weighted_ratio("hello", "zzzzzzzzzz") < 30);
    }

    #[test]
    fn reordered_tokens_score_high() {
        assert!(weighted_ratio("deploy service staging", "staging service deploy") >= 90);
    }

    #[test]
    fn substring_query_scores_high_via_partial_ratio() {
        assert!(weighted_ratio("deploy", "please deploy the service now") >= 90);
    }

    #[test]
    fn subset_vocabulary_scores_high_via_token_set() {
        assert!(weighted_ratio("deploy staging", "deploy staging now please") >= 85);
    }
}
