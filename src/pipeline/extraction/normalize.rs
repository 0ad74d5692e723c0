//! Text normalization for raw syllabus text.
//!
//! Runs before any pattern matching: Unicode composition, line-ending
//! unification, broken-word repair, sentence-continuation merging and
//! whitespace/blank-line collapsing. Output lines are what the classifier
//! and candidate builder index into, so this step must be deterministic.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::ExtractionError;

/// Longest leading fragment on a continuation line that is glued onto the
/// previous line without a space ("Assignm" + "ent").
const MAX_FRAGMENT_LEN: usize = 3;

/// Word broken by a trailing hyphen at end of line: "assign-\nment".
static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]{2,})-\n([a-z]+)").unwrap());

/// Short words that are real words on their own. Never glued to a neighbour.
const COMMON_SHORT_WORDS: &[&str] = &[
    "a", "an", "the", "to", "in", "on", "at", "of", "by", "for", "and", "or", "but", "nor",
    "is", "are", "was", "be", "as", "it", "its", "if", "so", "no", "not", "we", "you", "he",
    "she", "i", "me", "my", "our", "up", "do", "due", "per", "via", "vs", "all", "any", "new",
    "one", "two", "six", "ten", "see", "get", "set", "use", "may", "can", "has", "had", "who",
    "how", "out", "off", "day", "pm", "am", "ch", "pg", "pp", "lab", "hw",
];

/// Trailing words after which the sentence obviously continues.
const CONNECTORS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "for", "with", "by", "from", "and", "or",
    "into", "about", "during", "before", "after", "until",
];

/// Normalize raw syllabus text.
pub fn normalize_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    let unified = unify_line_endings(&composed);
    let visible = remove_invisible_chars(&unified);

    let collapsed = visible
        .split('\n')
        .map(collapse_inline_whitespace)
        .collect::<Vec<_>>()
        .join("\n");

    let dehyphenated = HYPHEN_BREAK.replace_all(&collapsed, "$1$2");

    let lines: Vec<String> = dehyphenated.split('\n').map(str::to_string).collect();
    let lines = repair_broken_words(lines);
    let lines = merge_continuations(lines);
    collapse_blank_lines(lines).join("\n")
}

/// Normalize text that arrived as raw bytes. Non-UTF-8 input is not text.
pub fn normalize_bytes(raw: &[u8]) -> Result<String, ExtractionError> {
    let text = std::str::from_utf8(raw).map_err(|e| ExtractionError::NotText(e.to_string()))?;
    Ok(normalize_text(text))
}

fn unify_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace(['\r', '\u{2028}', '\u{2029}', '\u{000B}', '\u{000C}'], "\n")
}

/// Drop zero-width/formatting characters and stray control characters.
/// Newlines and tabs survive.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if *c == '\n' || *c == '\t' {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}' | '\u{00AD}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn collapse_inline_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_common_short_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    COMMON_SHORT_WORDS.contains(&lower.as_str())
}

/// Glue a short lowercase fragment at the start of a line back onto the
/// word that ends the previous line.
fn repair_broken_words(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(prev) = out.last_mut() {
            if is_fragment_join(prev, &line) {
                prev.push_str(&line);
                continue;
            }
        }
        out.push(line);
    }
    out
}

fn is_fragment_join(prev: &str, next: &str) -> bool {
    let Some(tail) = prev.split(' ').last() else {
        return false;
    };
    let Some(head) = next.split(' ').next() else {
        return false;
    };
    let head_word = head.trim_end_matches(|c: char| c.is_ascii_punctuation());

    tail.chars().count() >= 2
        && tail.chars().all(char::is_alphabetic)
        && !head_word.is_empty()
        && head_word.chars().count() <= MAX_FRAGMENT_LEN
        && head_word.chars().all(char::is_lowercase)
        && !is_common_short_word(tail)
        && !is_common_short_word(head_word)
}

/// Join lines that continue a sentence.
fn merge_continuations(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(prev) = out.last_mut() {
            if is_continuation(prev, &line) {
                prev.push(' ');
                prev.push_str(&line);
                continue;
            }
        }
        out.push(line);
    }
    out
}

fn is_continuation(prev: &str, next: &str) -> bool {
    let Some(first) = next.chars().next() else {
        return false;
    };
    if prev.is_empty() || first.is_uppercase() {
        return false;
    }
    if prev.ends_with(['.', '!', '?']) {
        return false;
    }
    if first.is_lowercase() {
        return true;
    }
    prev.rsplit(' ')
        .next()
        .map(|w| CONNECTORS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// At most one blank line between paragraphs, none at the edges.
fn collapse_blank_lines(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() && out.last().map_or(true, |l: &String| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unifies_line_endings() {
        assert_eq!(normalize_text("Quiz 1\r\nQuiz 2\rQuiz 3"), "Quiz 1\nQuiz 2\nQuiz 3");
    }

    #[test]
    fn composes_unicode() {
        // "e" + combining acute accent
        let raw = "Caf\u{0065}\u{0301} Lecture";
        assert_eq!(normalize_text(raw), "Caf\u{00E9} Lecture");
    }

    #[test]
    fn repairs_hyphenated_line_break() {
        assert_eq!(normalize_text("Final assign-\nment due"), "Final assignment due");
    }

    #[test]
    fn repairs_short_fragment() {
        assert_eq!(normalize_text("Assignm\nent 2"), "Assignment 2");
    }

    #[test]
    fn does_not_glue_common_short_words() {
        // "of" is a real word: sentence-continuation joins it with a space.
        assert_eq!(normalize_text("Review\nof notes"), "Review of notes");
    }

    #[test]
    fn merges_lowercase_continuation() {
        assert_eq!(
            normalize_text("Midterm exam covers chapters\none through five"),
            "Midterm exam covers chapters one through five"
        );
    }

    #[test]
    fn merges_after_trailing_preposition() {
        assert_eq!(normalize_text("Project due on\n12/05/2025"), "Project due on 12/05/2025");
    }

    #[test]
    fn never_merges_capitalized_next_line() {
        assert_eq!(normalize_text("Due on\nSeptember 15"), "Due on\nSeptember 15");
    }

    #[test]
    fn never_merges_after_terminal_punctuation() {
        assert_eq!(normalize_text("Read chapter 1.\nthen chapter 2"), "Read chapter 1.\nthen chapter 2");
    }

    #[test]
    fn collapses_whitespace_and_blank_lines() {
        let raw = "  Week 1   Intro \t\n\n\n\nWeek 2  Sorting\n\n";
        assert_eq!(normalize_text(raw), "Week 1 Intro\n\nWeek 2 Sorting");
    }

    #[test]
    fn strips_invisible_characters() {
        assert_eq!(normalize_text("\u{FEFF}Quiz\u{200B} 1"), "Quiz 1");
    }

    #[test]
    fn empty_input_returns_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("\n\n  \n"), "");
    }

    #[test]
    fn non_utf8_bytes_are_rejected() {
        let result = normalize_bytes(&[0x51, 0xFF, 0xFE]);
        assert!(matches!(result, Err(ExtractionError::NotText(_))));
    }

    #[test]
    fn utf8_bytes_are_normalized() {
        assert_eq!(normalize_bytes(b"Lab 1\r\n").unwrap(), "Lab 1");
    }
}
