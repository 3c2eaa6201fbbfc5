//! Account configuration: layered file load, env-var credential fallback,
//! and per-account policy defaults (spec.md §3, §6).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::Cli;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_MEDIA_MAX_MB, DEFAULT_REQUIRE_MENTION, DEFAULT_SELF_ONLY,
    DEFAULT_SERVER, DEFAULT_TEXT_CHUNK_LIMIT, DEFAULT_WORKSPACE, ENV_CLIENT_ID,
    ENV_CLIENT_SECRET, ENV_JWT, ENV_SERVER,
};
use crate::core::paths::expand_path;
use crate::policy::is_sender_allowed;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    Open,
    Allowlist,
    Disabled,
    #[default]
    Pairing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    Disabled,
    #[default]
    Allowlist,
    Open,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    #[default]
    Length,
    Newline,
}

/// Credentials for the JWT-bearer OAuth grant (spec.md §3 Account, §6 env vars).
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub jwt: String,
    #[serde(default)]
    pub server: Option<String>,
}

impl AccountCredentials {
    fn from_env_overlay(mut self) -> Self {
        if self.client_id.is_empty() {
            if let Ok(v) = std::env::var(ENV_CLIENT_ID) {
                self.client_id = v;
            }
        }
        if self.client_secret.is_empty() {
            if let Ok(v) = std::env::var(ENV_CLIENT_SECRET) {
                self.client_secret = v;
            }
        }
        if self.jwt.is_empty() {
            if let Ok(v) = std::env::var(ENV_JWT) {
                self.jwt = v;
            }
        }
        if self.server.is_none() {
            self.server = std::env::var(ENV_SERVER).ok();
        }
        self
    }

    pub fn server(&self) -> &str {
        self.server.as_deref().unwrap_or(DEFAULT_SERVER)
    }
}

/// Nested DM policy section (preferred form, spec.md §6).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DmSection {
    pub policy: Option<DmPolicy>,
    #[serde(default)]
    pub allow_from: Vec<String>,
}

/// Per-group override (spec.md §6 `groups{ id|name|"*" -> {...} }`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOverride {
    pub enabled: Option<bool>,
    pub allow: Option<bool>,
    pub require_mention: Option<bool>,
    #[serde(default)]
    pub users: Vec<String>,
    pub system_prompt: Option<String>,
}

impl GroupOverride {
    /// An entry is admissible unless explicitly disabled.
    pub fn is_allowed(&self) -> bool {
        self.enabled != Some(false) && self.allow != Some(false)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub account_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub credentials: AccountCredentials,

    #[serde(default)]
    pub dm_policy: Option<DmPolicy>,
    #[serde(default)]
    pub allow_from: Vec<String>,
    #[serde(default)]
    pub dm: Option<DmSection>,

    #[serde(default)]
    pub group_policy: Option<GroupPolicy>,
    #[serde(default)]
    pub group_allow_from: Vec<String>,
    #[serde(default)]
    pub groups: HashMap<String, GroupOverride>,

    #[serde(default)]
    pub require_mention: Option<bool>,
    #[serde(default)]
    pub media_max_mb: Option<u64>,
    #[serde(default)]
    pub text_chunk_limit: Option<usize>,
    #[serde(default)]
    pub chunk_mode: Option<ChunkMode>,
    #[serde(default)]
    pub self_only: Option<bool>,
    #[serde(default)]
    pub bot_extension_id: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AccountConfig {
    pub fn effective_dm_policy(&self) -> DmPolicy {
        self.dm
            .as_ref()
            .and_then(|d| d.policy)
            .or(self.dm_policy)
            .unwrap_or_default()
    }

    /// Union of the flat and nested allow-from lists (spec.md §6 "preferred nested form").
    pub fn configured_dm_allow_from(&self) -> Vec<String> {
        let mut out = self.allow_from.clone();
        if let Some(dm) = &self.dm {
            for entry in &dm.allow_from {
                if !out.iter().any(|e| e.eq_ignore_ascii_case(entry)) {
                    out.push(entry.clone());
                }
            }
        }
        out
    }

    pub fn effective_group_policy(&self) -> GroupPolicy {
        self.group_policy.unwrap_or_default()
    }

    pub fn effective_require_mention(&self) -> bool {
        self.require_mention.unwrap_or(DEFAULT_REQUIRE_MENTION)
    }

    pub fn media_max_mb(&self) -> u64 {
        self.media_max_mb.unwrap_or(DEFAULT_MEDIA_MAX_MB).max(1)
    }

    pub fn text_chunk_limit(&self) -> usize {
        self.text_chunk_limit.unwrap_or(DEFAULT_TEXT_CHUNK_LIMIT)
    }

    pub fn chunk_mode(&self) -> ChunkMode {
        self.chunk_mode.unwrap_or_default()
    }

    pub fn self_only(&self) -> bool {
        self.self_only.unwrap_or(DEFAULT_SELF_ONLY)
    }

    pub fn workspace_dir(&self) -> PathBuf {
        expand_path(self.workspace.as_deref().unwrap_or(DEFAULT_WORKSPACE))
    }

    /// Bot display name: `account.config.name` ?? literal fallback (spec.md §4.4).
    pub fn bot_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or(super::constants::DEFAULT_BOT_NAME)
    }

    /// Resolve a configured-groups entry by id, exact name, or lowercased name.
    pub fn find_group_override(&self, chat_id: &str, chat_name: Option<&str>) -> Option<&GroupOverride> {
        if let Some(o) = self.groups.get(chat_id) {
            return Some(o);
        }
        if let Some(name) = chat_name {
            if let Some(o) = self.groups.get(name) {
                return Some(o);
            }
            if let Some(o) = self.groups.get(&name.to_lowercase()) {
                return Some(o);
            }
        }
        None
    }

    pub fn has_group_wildcard(&self) -> bool {
        self.groups.contains_key("*")
    }

    /// Whether `chatId`/`chatName` is admitted by the flat `groupAllowFrom[]`
    /// list, evaluated with the same wildcard/prefix-insensitive matching as
    /// DM's `allowFrom[]` (spec.md §6, §4.7).
    pub fn group_allowed_by_list(&self, chat_id: &str, chat_name: Option<&str>) -> bool {
        is_sender_allowed(chat_id, &self.group_allow_from)
            || chat_name.is_some_and(|name| is_sender_allowed(name, &self.group_allow_from))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        warn_unknown_top_level_keys(&parsed);
        let config: FileConfig = serde_json::from_value(parsed)
            .with_context(|| format!("deserializing config file {}", path.display()))?;
        Ok(config)
    }

    /// Later layers override earlier ones by `account_id`.
    fn merge(&mut self, other: FileConfig) {
        for incoming in other.accounts {
            if let Some(existing) = self
                .accounts
                .iter_mut()
                .find(|a| a.account_id == incoming.account_id)
            {
                *existing = incoming;
            } else {
                self.accounts.push(incoming);
            }
        }
    }
}

fn warn_unknown_top_level_keys(value: &serde_json::Value) {
    const KNOWN: &[&str] = &["accounts"];
    if let Some(obj) = value.as_object() {
        for key in obj.keys() {
            if !KNOWN.contains(&key.as_str()) {
                tracing::warn!(key, "unknown top-level config key ignored");
            }
        }
    }
}

fn profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(super::constants::APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub accounts: Vec<AccountConfig>,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("client_id", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .field("jwt", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

impl BridgeConfig {
    /// Layered load: profile dir, then CLI-specified or local file; env vars
    /// fill in missing credential fields per account (spec.md §6).
    pub fn load(cli: &Cli) -> Result<Self> {
        tracing::debug!("loading bridge configuration");
        let mut file_config = FileConfig::default();
        let mut found: Vec<String> = Vec::new();

        if let Some(profile_path) = profile_config_path() {
            if profile_path.exists() {
                let profile = FileConfig::load_from_file(&profile_path)?;
                file_config.merge(profile);
                found.push(profile_path.display().to_string());
            }
        }

        let overlay_path = if let Some(path) = &cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            local.exists().then_some(local)
        };

        if let Some(path) = overlay_path {
            let overlay = FileConfig::load_from_file(&path)?;
            file_config.merge(overlay);
            found.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found, "config files loaded");

        let accounts = file_config
            .accounts
            .into_iter()
            .map(|mut a| {
                a.credentials = a.credentials.from_env_overlay();
                a
            })
            .collect();

        Ok(Self { accounts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_policy_defaults_to_pairing() {
        let cfg = AccountConfig {
            account_id: "a".into(),
            enabled: true,
            credentials: AccountCredentials {
                client_id: "c".into(),
                client_secret: "s".into(),
                jwt: "j".into(),
                server: None,
            },
            dm_policy: None,
            allow_from: vec![],
            dm: None,
            group_policy: None,
            group_allow_from: vec![],
            groups: HashMap::new(),
            require_mention: None,
            media_max_mb: None,
            text_chunk_limit: None,
            chunk_mode: None,
            self_only: None,
            bot_extension_id: None,
            workspace: None,
            name: None,
        };
        assert_eq!(cfg.effective_dm_policy(), DmPolicy::Pairing);
        assert_eq!(cfg.effective_group_policy(), GroupPolicy::Allowlist);
        assert!(cfg.self_only());
        assert_eq!(cfg.media_max_mb(), DEFAULT_MEDIA_MAX_MB);
        assert_eq!(cfg.bot_name(), "OpenClaw");
    }

    #[test]
    fn nested_dm_section_overrides_flat_policy() {
        let mut cfg_json = serde_json::json!({
            "accountId": "a1",
            "credentials": {"clientId": "c", "clientSecret": "s", "jwt": "j"},
            "dmPolicy": "open",
            "dm": {"policy": "allowlist", "allowFrom": ["user:1"]}
        });
        let cfg: AccountConfig = serde_json::from_value(cfg_json.take()).unwrap();
        assert_eq!(cfg.effective_dm_policy(), DmPolicy::Allowlist);
        assert_eq!(cfg.configured_dm_allow_from(), vec!["user:1".to_string()]);
    }

    #[test]
    fn group_override_allow_false_is_not_allowed() {
        let o = GroupOverride {
            enabled: Some(true),
            allow: Some(false),
            ..Default::default()
        };
        assert!(!o.is_allowed());
    }

    #[test]
    fn group_allowed_by_list_matches_id_or_name() {
        let mut cfg_json = serde_json::json!({
            "accountId": "a1",
            "credentials": {"clientId": "c", "clientSecret": "s", "jwt": "j"},
            "groupAllowFrom": ["Engineering"]
        });
        let cfg: AccountConfig = serde_json::from_value(cfg_json.take()).unwrap();
        assert!(cfg.group_allowed_by_list("chat:999", Some("engineering")));
        assert!(!cfg.group_allowed_by_list("chat:999", Some("Sales")));
        assert!(!cfg.group_allowed_by_list("chat:999", None));
    }
}
