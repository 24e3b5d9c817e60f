//! Configuration structures.
//!
//! Poll intervals are named numeric fields; parsing and serialization happen
//! only at the storage boundary (loader / config file).

use serde::{Deserialize, Serialize};

use crate::constants::{AWAKE_CACHE_SECS, DEFAULT_FALLBACK_POLL_SECS};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub database: DatabaseConfig,
}

/// Account credentials and endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Account email for the credential login flow
    pub email: Option<String>,
    /// Account password for the credential login flow
    pub password: Option<String>,
    /// Pre-obtained refresh token; skips the credential flow entirely
    pub refresh_token: Option<String>,
    /// Base URL of the SSO service
    #[serde(default = "default_sso_base_url")]
    pub sso_base_url: String,
    /// Base URL of the owner API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_sso_base_url() -> String {
    "https://auth.tesla.com".to_string()
}

fn default_api_base_url() -> String {
    "https://owner-api.teslamotors.com".to_string()
}

impl AuthConfig {
    /// Whether any credential source is configured at all.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.refresh_token.is_some() || (self.email.is_some() && self.password.is_some())
    }
}

/// Per-vehicle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Target VIN; first listed vehicle when unset
    pub vin: Option<String>,
    /// Charge limit percent applied by the "standard" charge command
    #[serde(default = "default_charge_limit")]
    pub standard_charge_limit: u8,
    /// Install software updates automatically once downloaded
    #[serde(default)]
    pub auto_install_updates: bool,
}

fn default_charge_limit() -> u8 {
    90
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self { vin: None, standard_charge_limit: default_charge_limit(), auto_install_updates: false }
    }
}

/// Poll interval table keyed by vehicle activity category, plus scheduler
/// cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval while the vehicle is being driven
    pub moving_secs: u64,
    /// Interval while "active": recently woke unprompted, unlocked, climate
    /// on, sentry on, or a software update pending
    pub active_secs: u64,
    /// Interval while charging with more than an hour remaining
    pub charging_long_secs: u64,
    /// Interval while charging with an hour or less remaining
    pub charging_short_secs: u64,
    /// Interval while awake but otherwise idle (never wakes the vehicle)
    pub idle_awake_secs: u64,
    /// Interval while asleep with nothing pending (never wakes the vehicle)
    pub fallback_secs: u64,
    /// Scheduler evaluation tick
    pub tick_secs: u64,
    /// Enable the once-per-day forced refresh
    pub daily_enabled: bool,
    /// Wall-clock time ("HH:MM") of the daily refresh
    pub daily_at: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            moving_secs: 60,
            active_secs: 120,
            charging_long_secs: 1200,
            charging_short_secs: 300,
            idle_awake_secs: 600,
            fallback_secs: DEFAULT_FALLBACK_POLL_SECS,
            tick_secs: 60,
            daily_enabled: true,
            daily_at: "03:30".to_string(),
        }
    }
}

/// What happens to commands still queued when a wake sequence gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Discard every queued command (avoids stalling behind an unreachable
    /// vehicle)
    EntireQueue,
    /// Discard only the command that triggered the wake sequence
    HeadOnly,
}

/// Dispatcher, wake-up, and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-command transient retry budget
    pub max_retries: u32,
    /// Fixed delay between transient retries, seconds
    pub retry_delay_secs: u64,
    /// Spacing between consecutive commands, seconds
    pub spacing_secs: u64,
    /// Awake polls before a wake sequence gives up
    pub wake_max_attempts: u32,
    /// Interval between awake polls, seconds
    pub wake_poll_secs: u64,
    /// Resend the wake signal every this many polls
    pub wake_resend_every: u32,
    /// Confirmed-awake cache window, seconds
    pub awake_cache_secs: u64,
    /// Attempts in the vehicle re-resolve loop (deep sleep / no vehicles)
    pub resolve_max_attempts: u32,
    /// Delay between re-resolve attempts, seconds
    pub resolve_delay_secs: u64,
    /// Queue policy on wake-sequence exhaustion
    pub drain_policy: DrainPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay_secs: 5,
            spacing_secs: 1,
            wake_max_attempts: 25,
            wake_poll_secs: 10,
            wake_resend_every: 5,
            awake_cache_secs: AWAKE_CACHE_SECS,
            resolve_max_attempts: 3,
            resolve_delay_secs: 5,
            drain_policy: DrainPolicy::EntireQueue,
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    2
}
