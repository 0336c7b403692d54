use std::collections::{BTreeMap, HashSet};

use forgeflow_core::{ConvergenceResult, DiscussionRound, Recommendation};

const POSITIVE_VERDICT_TOKENS: &[&str] = &["APPROVE", "PASS", "NO BLOCKERS"];
const NEGATIVE_VERDICT_TOKENS: &[&str] = &["CHALLENGE", "NEEDS_FIX", "MUST FIX"];

/// Scores a discussion's convergence. Fewer than two rounds always yields
/// `continue` at score 0 — there is nothing yet to compare.
pub fn score(rounds: &[DiscussionRound]) -> ConvergenceResult {
    if rounds.len() < 2 {
        return ConvergenceResult::not_enough_rounds();
    }

    let last = &rounds[rounds.len() - 1];
    let prev = &rounds[rounds.len() - 2];

    let overlap = jaccard(&token_set(&last.content), &token_set(&prev.content));
    let declining = declining_issue_score(&prev.content, &last.content);
    let verdict = verdict_score(&last.content);

    let overall = (0.4 * overlap + 0.4 * declining + 0.2 * verdict).clamp(0.0, 1.0);

    let recommendation = if overall >= 0.75 {
        Recommendation::Converged
    } else {
        Recommendation::Continue
    };

    let mut subscores = BTreeMap::new();
    subscores.insert("textual_overlap".to_string(), overlap);
    subscores.insert("declining_issues".to_string(), declining);
    subscores.insert("verdict".to_string(), verdict);

    ConvergenceResult {
        overall_score: overall,
        recommendation,
        subscores,
    }
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn count_issues(text: &str) -> usize {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("- ") {
                return true;
            }
            let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
            !digits.is_empty() && trimmed[digits.len()..].starts_with(". ")
        })
        .count()
}

fn declining_issue_score(prev: &str, last: &str) -> f64 {
    let prev_issues = count_issues(prev);
    let last_issues = count_issues(last);
    if prev_issues == 0 {
        return if last_issues == 0 { 1.0 } else { 0.0 };
    }
    ((prev_issues as f64 - last_issues as f64).max(0.0) / prev_issues as f64).clamp(0.0, 1.0)
}

fn verdict_score(text: &str) -> f64 {
    let upper = text.to_uppercase();
    let positive = POSITIVE_VERDICT_TOKENS.iter().any(|t| upper.contains(t));
    let negative = NEGATIVE_VERDICT_TOKENS.iter().any(|t| upper.contains(t));
    match (positive, negative) {
        (true, false) => 1.0,
        (false, true) => 0.0,
        _ => 0.5,
    }
}
