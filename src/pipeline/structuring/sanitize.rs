// Clean syllabus text before it is embedded in a completion prompt.
// Strips invisible Unicode and role-marker lines, then bounds the length.

/// Maximum syllabus length embedded in a prompt (characters).
pub const MAX_PROMPT_INPUT_CHARS: usize = 50_000;

const TRUNCATION_MARKER: &str = "…[TRUNCATED]";

/// Prepare text for a completion prompt. Logs the number of removed
/// lines, never their content.
pub fn sanitize_for_prompt(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (kept, removed) = remove_role_markers(&cleaned);
    if removed > 0 {
        tracing::warn!(
            removed_lines = removed,
            "Role-marker lines removed from syllabus before prompting"
        );
    }
    let normalized = normalize_whitespace(&kept);
    truncate_chars(&normalized, MAX_PROMPT_INPUT_CHARS)
}

fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn is_role_marker(lowered: &str) -> bool {
    const MARKERS: &[&str] = &[
        "system:",
        "assistant:",
        "user:",
        "[system]",
        "[assistant]",
        "[inst]",
        "[/inst]",
        "<<sys>>",
        "<system",
        "</system",
    ];
    MARKERS.iter().any(|m| lowered.starts_with(m))
        || lowered.contains("ignore previous instructions")
        || lowered.contains("ignore all instructions")
        || lowered.contains("disregard your instructions")
}

/// Returns (kept text, removed line count).
fn remove_role_markers(text: &str) -> (String, usize) {
    let mut removed = 0usize;
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let hit = is_role_marker(&line.trim().to_lowercase());
            if hit {
                removed += 1;
            }
            !hit
        })
        .collect();
    (kept.join("\n"), removed)
}

/// Trim each line and keep at most one blank line in a row.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

/// Truncate to `max_chars`, breaking at the last whitespace when possible.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(pos) => format!("{}{TRUNCATION_MARKER}", &head[..pos]),
        None => format!("{head}{TRUNCATION_MARKER}"),
    }
}
