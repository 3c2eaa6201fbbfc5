//! Path expansion for workspace / config paths.

use std::path::PathBuf;

/// Expand `~`, `~/...`, and relative paths to an absolute path. Absolute
/// paths pass through unchanged.
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let result = expand_path("~/.cfg");
        assert!(result.is_absolute());
        assert!(!result.to_string_lossy().contains('~'));
        assert!(result.ends_with(".cfg"));
    }

    #[test]
    fn bare_name_becomes_absolute() {
        let result = expand_path("workspace");
        assert!(result.is_absolute());
        assert!(result.ends_with("workspace"));
    }

    #[test]
    fn empty_returns_cwd() {
        let result = expand_path("   ");
        assert!(result.is_absolute());
    }
}
