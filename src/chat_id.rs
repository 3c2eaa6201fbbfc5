//! `ChatId` normalization (spec.md §3 ChatId, §4.7 `normalizeTarget`/`parseTarget`).

const STRIP_PREFIXES: &[&str] = &[
    "ringcentral:",
    "rc:",
    "chat:",
    "user:",
    "group:",
    "team:",
];

/// Trim whitespace and iteratively strip one of the recognized prefixes
/// until none remain. Returns `None` for an empty result.
pub fn normalize_target(raw: &str) -> Option<String> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }
    loop {
        let lower = s.to_ascii_lowercase();
        let matched = STRIP_PREFIXES.iter().find(|p| lower.starts_with(*p));
        match matched {
            Some(prefix) => {
                s = s[prefix.len()..].to_string();
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                s = trimmed.to_string();
            }
            None => break,
        }
    }
    if s.is_empty() { None } else { Some(s) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Chat,
    User,
    Unknown,
}

/// Classify a raw routing target (spec.md §4.7 `parseTarget`).
pub fn parse_target(raw: &str) -> (TargetKind, String) {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    for prefix in ["chat:", "group:", "team:"] {
        if lower.starts_with(prefix) {
            return (TargetKind::Chat, trimmed[prefix.len()..].to_string());
        }
    }
    if let Some(rest) = trimmed.strip_prefix("user:").or_else(|| {
        lower.starts_with("user:").then(|| &trimmed[5..])
    }) {
        return (TargetKind::User, rest.to_string());
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return (TargetKind::Chat, trimmed.to_string());
    }
    (TargetKind::Unknown, trimmed.to_string())
}
