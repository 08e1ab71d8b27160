// Input hygiene for prompt fields and cleanup of raw model output.
//
// Discussion name and description are scrubbed before they reach a prompt.
// Message bodies are sent verbatim (the redaction check compares output
// text with the source byte for byte), so they are only inspected and
// fenced inside delimiters by the prompt builders.

use serde_json::Value;

use super::LlmError;

/// Maximum length of a topic field placed in a prompt (characters).
const MAX_FIELD_LENGTH: usize = 4_000;

/// Clean a discussion name or description for prompt use: strip invisible
/// characters, drop injection lines, collapse whitespace, truncate.
pub fn sanitize_prompt_field(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (no_injection, _) = remove_injection_patterns_counted(&cleaned);
    let normalized = normalize_whitespace(&no_injection);
    truncate_to_max_chars(&normalized, MAX_FIELD_LENGTH)
}

/// Number of lines in `text` that look like prompt-injection attempts.
/// Used for audit logging only; the text itself is left untouched.
pub fn count_injection_lines(text: &str) -> usize {
    remove_injection_patterns_counted(text).1
}

/// Remove invisible Unicode characters that could manipulate LLM behavior.
/// Preserves standard whitespace (space, newline, tab).
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
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

fn is_role_marker(trimmed: &str) -> bool {
    const MARKERS: &[&str] = &[
        "system:",
        "assistant:",
        "user:",
        "[system]",
        "[assistant]",
        "[inst]",
        "[/inst]",
        "<<sys>>",
        "note to ai:",
        "instructions:",
        "system update:",
    ];
    MARKERS.iter().any(|m| trimmed.starts_with(m))
}

fn is_override_attempt(text: &str) -> bool {
    const PHRASES: &[&str] = &[
        "ignore previous instructions",
        "ignore all instructions",
        "ignore the above instructions",
        "disregard your instructions",
        "disregard all instructions",
        "forget your instructions",
        "new instructions:",
        "override:",
        "set risk_flag",
        "classify this as",
    ];
    PHRASES.iter().any(|p| text.contains(p))
}

fn is_delimiter_tag(trimmed: &str) -> bool {
    trimmed.starts_with("<instruction")
        || trimmed.starts_with("</instruction")
        || trimmed.starts_with("<system")
        || trimmed.starts_with("</system")
        || trimmed.starts_with("</message")
        || trimmed.starts_with("</topic")
}

fn is_suspicious(trimmed: &str) -> bool {
    is_role_marker(trimmed) || is_override_attempt(trimmed) || is_delimiter_tag(trimmed)
}

/// Remove patterns commonly used for prompt injection.
/// Returns (cleaned_text, removed_line_count).
fn remove_injection_patterns_counted(text: &str) -> (String, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let mut result = String::with_capacity(text.len());
    let mut skip_next = false;
    let mut removed = 0usize;

    for i in 0..lines.len() {
        if skip_next {
            skip_next = false;
            removed += 1;
            continue;
        }

        let trimmed = lines[i].trim().to_lowercase();
        if is_suspicious(&trimmed) {
            removed += 1;
            continue;
        }

        // An override phrase split across two lines, neither matching alone.
        if i + 1 < lines.len() {
            let next_trimmed = lines[i + 1].trim().to_lowercase();
            if !is_suspicious(&next_trimmed) {
                let joined = format!("{trimmed} {next_trimmed}");
                if is_override_attempt(&joined) {
                    skip_next = true;
                    removed += 1;
                    continue;
                }
            }
        }

        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(lines[i]);
    }

    (result, removed)
}

/// Collapse blank lines and trim each line.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                lines.push("");
                prev_blank = true;
            }
        } else {
            lines.push(trimmed);
            prev_blank = false;
        }
    }

    while lines.first() == Some(&"") {
        lines.remove(0);
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }

    lines.join("\n")
}

/// Truncate to `max_chars` characters, breaking at the last word boundary.
pub fn truncate_to_max_chars(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => format!("{}…", &text[..pos]),
        _ => format!("{truncated}…"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OUTPUT: recover the JSON object from a raw model reply
// ═══════════════════════════════════════════════════════════════════════

/// Strip reasoning blocks and Markdown fences, then parse the JSON object.
pub fn extract_json_payload(raw: &str) -> Result<Value, LlmError> {
    let without_thinking = strip_thinking(raw);
    let body = strip_code_fence(without_thinking.trim());

    let value: Value = serde_json::from_str(body).map_err(|e| {
        LlmError::MalformedResponse(format!("content is not JSON: {e}"))
    })?;

    if !value.is_object() {
        return Err(LlmError::MalformedResponse(
            "expected a JSON object".into(),
        ));
    }
    Ok(value)
}

/// Remove `<think>…</think>` blocks some local models emit before the answer.
fn strip_thinking(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn strip_code_fence(text: &str) -> &str {
    let Some(after_open) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag on the opening line.
    let body = match after_open.find('\n') {
        Some(pos) => &after_open[pos + 1..],
        None => after_open,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
