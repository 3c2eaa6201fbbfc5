//! Crate-wide constants and environment variable names.

// =============================================================================
// Application identity
// =============================================================================

pub const APP_NAME: &str = "RingCentral Bridge";
pub const APP_NAME_LOWER: &str = "ringcentral-bridge";
pub const APP_DOT_FOLDER: &str = ".ringcentral-bridge";

// =============================================================================
// Configuration
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "ringcentral-bridge.json";
pub const ENV_CONFIG: &str = "RINGCENTRAL_BRIDGE_CONFIG";
pub const ENV_LOG: &str = "RINGCENTRAL_BRIDGE_LOG";

pub const ENV_CLIENT_ID: &str = "RINGCENTRAL_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "RINGCENTRAL_CLIENT_SECRET";
pub const ENV_JWT: &str = "RINGCENTRAL_JWT";
pub const ENV_SERVER: &str = "RINGCENTRAL_SERVER";

pub const DEFAULT_SERVER: &str = "https://platform.ringcentral.com";
pub const DEFAULT_WORKSPACE: &str = "./workspace";

// =============================================================================
// Policy defaults
// =============================================================================

pub const DEFAULT_MEDIA_MAX_MB: u64 = 20;
pub const DEFAULT_TEXT_CHUNK_LIMIT: usize = 4000;
pub const DEFAULT_SELF_ONLY: bool = true;
pub const DEFAULT_REQUIRE_MENTION: bool = true;
pub const DEFAULT_BOT_NAME: &str = "OpenClaw";

// =============================================================================
// Subscription / reconnect
// =============================================================================

pub const BACKOFF_MIN_SECS: u64 = 5;
pub const BACKOFF_MAX_SECS: u64 = 300;
pub const BACKOFF_JITTER_FRACTION: f64 = 0.25;
pub const RATE_LIMIT_MIN_RETRY_SECS: u64 = 60;

pub const WATCHDOG_PERIOD_SECS: u64 = 30;
pub const WATCHDOG_DRIFT_TOLERANCE_SECS: u64 = 10;
pub const WATCHDOG_STALE_INBOUND_SECS: u64 = 300;

pub const OWNER_ID_RETRY_BACKOFF_SECS: u64 = 60;

pub const WS_SUBSCRIPTION_FILTERS: &[&str] = &[
    "/restapi/v1.0/glip/posts",
    "/restapi/v1.0/glip/groups",
];

// =============================================================================
// Echo suppression
// =============================================================================

pub const SENT_LEDGER_TTL_SECS: u64 = 60;

// =============================================================================
// Chat cache
// =============================================================================

pub const CHAT_CACHE_FILE_NAME: &str = "ringcentral-chat-cache.json";
pub const PEER_RESOLVE_BATCH_SIZE: usize = 3;
pub const PEER_RESOLVE_BATCH_SLEEP_MS: u64 = 200;
pub const CHAT_LIST_PAGE_LIMIT: u32 = 250;

// =============================================================================
// Group chat log
// =============================================================================

pub const GROUP_LOG_TIMEZONE: chrono_tz::Tz = chrono_tz::Asia::Shanghai;

// =============================================================================
// Platform API paths
// =============================================================================

pub const TEAM_MESSAGING_BASE: &str = "/team-messaging/v1";
pub const REST_BASE: &str = "/restapi/v1.0";
