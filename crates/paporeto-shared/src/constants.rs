/// Application name
pub const APP_NAME: &str = "PapoReto";

/// Application version
pub const APP_VERSION: &str = "1.0.0";

/// Build tag shown in the settings screen
pub const APP_BUILD: &str = "2025.01";

/// Credentials advertised on the login screen for the demo account
pub const DEMO_EMAIL: &str = "demo@paporeto.com";
pub const DEMO_PASSWORD: &str = "123456";

/// Identity used for the local demo session
pub const DEMO_USER_ID: &str = "demo";
pub const DEMO_USER_NAME: &str = "Você";

/// Sender id used by the demo threads for messages written by the current user
pub const DEMO_SELF_PLACEHOLDER: &str = "__ME__";

/// Placeholder credentials shipped in the default configuration
pub const PLACEHOLDER_URL: &str = "https://SEU_PROJETO.supabase.co";
pub const PLACEHOLDER_ANON_KEY: &str = "SUA_ANON_KEY";
pub const PLACEHOLDER_MARKER: &str = "SEU_PROJETO";

/// Endpoints shorter than this are treated as unconfigured
pub const MIN_ENDPOINT_LEN: usize = 20;

/// Persisted local storage keys
pub const STORAGE_PREFIX: &str = "pr_";
pub const KEY_URL: &str = "pr_url";
pub const KEY_ANON_KEY: &str = "pr_key";
pub const KEY_SESSION: &str = "pr_session";
pub const KEY_PREFS: &str = "pr_prefs";
pub const KEY_GROUPS: &str = "pr_groups";
pub const KEY_STATUSES: &str = "pr_statuses";
pub const KEY_BLOCKED: &str = "pr_blocked";

/// Page the session guard redirects to
pub const LOGIN_PAGE: &str = "login.html";

/// Icon and badge used for desktop notifications
pub const NOTIFICATION_ICON: &str = "/favicon.ico";

/// Storage bucket holding uploaded media
pub const MEDIA_BUCKET: &str = "media";

/// Statuses older than this are hidden in connected mode
pub const STATUS_TTL_HOURS: i64 = 24;

/// Avatar colour palette used by [`crate::format::str_color`]
pub const COLOR_PALETTE: [&str; 8] = [
    "#00C16A", "#58A6FF", "#BC8CFF", "#FF8C42", "#FF4757", "#00D4AA", "#FFD700", "#E040FB",
];

/// Default accent colour
pub const DEFAULT_ACCENT: &str = "#00C16A";
