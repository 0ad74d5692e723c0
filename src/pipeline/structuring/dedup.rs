//! Candidate deduplication.
//!
//! Rules, applied only between candidates of the same event type:
//! identical source line and title always collapse; within one day a
//! loose title match or any shared keyword collapses; within seven days a
//! strict title match or a shared keyword collapses; farther apart never.

use strsim::normalized_levenshtein;

use super::types::EventCandidate;

const NEAR_DAYS: i64 = 1;
const FAR_DAYS: i64 = 7;
const NEAR_SIMILARITY: f64 = 0.5;
const FAR_SIMILARITY: f64 = 0.85;

/// Lowercased alphanumeric words joined by single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_duplicate(existing: &EventCandidate, incoming: &EventCandidate) -> bool {
    if existing.event_type != incoming.event_type {
        return false;
    }

    let a = normalize_title(&existing.title);
    let b = normalize_title(&incoming.title);
    if existing.source_text == incoming.source_text && a == b {
        return true;
    }

    let delta = (existing.start - incoming.start).num_seconds().abs();
    let shared_keyword = existing
        .keywords
        .intersection(&incoming.keywords)
        .next()
        .is_some();
    let similarity = normalized_levenshtein(&a, &b);

    if delta <= NEAR_DAYS * 86_400 {
        similarity >= NEAR_SIMILARITY || shared_keyword
    } else if delta <= FAR_DAYS * 86_400 {
        a == b || similarity >= FAR_SIMILARITY || shared_keyword
    } else {
        false
    }
}

/// One pass in generation order. A duplicate replaces the kept candidate in
/// place when it is more confident.
fn dedup_pass(candidates: Vec<EventCandidate>) -> Vec<EventCandidate> {
    let mut kept: Vec<EventCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match kept.iter().position(|k| is_duplicate(k, &candidate)) {
            Some(i) => {
                if candidate.confidence > kept[i].confidence {
                    kept[i] = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }
    kept
}

/// Repeat passes until nothing collapses, so the output is a fixed point.
/// Returns the survivors and how many were removed.
pub fn deduplicate(candidates: Vec<EventCandidate>) -> (Vec<EventCandidate>, usize) {
    let original = candidates.len();
    let mut current = candidates;
    loop {
        let before = current.len();
        current = dedup_pass(current);
        if current.len() == before {
            break;
        }
    }
    let removed = original - current.len();
    if removed > 0 {
        tracing::debug!(removed, kept = current.len(), "Duplicate candidates collapsed");
    }
    (current, removed)
}
