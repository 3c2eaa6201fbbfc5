//! Sender/Loop Policy (spec.md §4.7 C7): allow-list evaluation and
//! structural, name-independent loop-guard marker detection.

use std::sync::LazyLock;

use regex::Regex;

/// `isSenderAllowed(senderId, allowFrom[])` (spec.md §4.7).
pub fn is_sender_allowed(sender_id: &str, allow_from: &[String]) -> bool {
    let sender = normalize_for_compare(sender_id);
    for entry in allow_from {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "*" {
            return true;
        }
        if normalize_for_compare(trimmed) == sender {
            return true;
        }
    }
    false
}

fn normalize_for_compare(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    for prefix in ["ringcentral:", "rc:", "user:"] {
        if lower.starts_with(prefix) {
            return lower[prefix.len()..].to_string();
        }
    }
    lower
}

/// A detected loop-guard marker (spec.md §4.4 stage 4, §8 property).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopGuardMarker {
    Thinking,
    AnswerWrapper,
    QueuedBusy,
    QueuedNumber,
}

static THINKING_EN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^>\s*.+\s+is\s+thinking\.\.\.\s*$").unwrap());
static THINKING_ZH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^>\s*.+\s+正在思考[.\u{2026}]*\s*$").unwrap());
static ANSWER_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^>\s*-{3,}\s*answer\s*-{3,}\s*$").unwrap());
static ANSWER_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^>\s*-{3,}\s*end\s*-{3,}\s*$").unwrap());
static QUEUED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^queued\s+#\d+$").unwrap());

/// Structural, bot-name-independent detection (spec.md §3 invariant, §8 property).
pub fn detect_loop_guard_marker(text: &str) -> Option<LoopGuardMarker> {
    let trimmed = text.trim();
    if THINKING_EN.is_match(trimmed) || THINKING_ZH.is_match(trimmed) {
        return Some(LoopGuardMarker::Thinking);
    }
    if ANSWER_WRAPPER.is_match(trimmed) || ANSWER_END.is_match(trimmed) {
        return Some(LoopGuardMarker::AnswerWrapper);
    }
    if trimmed
        .to_ascii_lowercase()
        .contains("queued messages while agent was busy")
    {
        return Some(LoopGuardMarker::QueuedBusy);
    }
    if QUEUED_NUMBER.is_match(trimmed) {
        return Some(LoopGuardMarker::QueuedNumber);
    }
    None
}

static ATTACHMENT_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:>\s*)?<?media:attachment>?\s*$").unwrap());

/// Pure attachment placeholder detection (spec.md §4.4 stage 5).
pub fn is_pure_attachment_placeholder(text: &str) -> bool {
    ATTACHMENT_PLACEHOLDER.is_match(text.trim())
}
