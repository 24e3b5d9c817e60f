//! Domain constants shared across crates.

/// Safety margin subtracted from the server-declared token lifetime when
/// computing the local expiry timestamp.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

/// Payload fragment the API returns when the vehicle accepted a command
/// before its internal bus was ready. Classified as transient.
pub const BUS_NOT_READY_SIGNAL: &str = "could not wake buses";

/// Window after a confirmed-awake result during which awake checks skip the
/// network entirely.
pub const AWAKE_CACHE_SECS: u64 = 50;

/// Window after an unexplained wake during which the vehicle is considered
/// "active" for polling purposes (user or system activity implied).
pub const UNPROMPTED_WAKE_WINDOW_SECS: i64 = 200;

/// Fallback poll interval when the vehicle is asleep with nothing pending.
pub const DEFAULT_FALLBACK_POLL_SECS: u64 = 900;

/// OAuth client id used by the vendor's owner API.
pub const SSO_CLIENT_ID: &str = "ownerapi";

/// Redirect URI registered for the owner-API OAuth client.
pub const SSO_REDIRECT_URI: &str = "https://auth.tesla.com/void/callback";

/// OAuth scopes requested during login and refresh.
pub const SSO_SCOPES: &str = "openid email offline_access";
