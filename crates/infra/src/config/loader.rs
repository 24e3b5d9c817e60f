//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `VOLTBRIDGE_DB_PATH`: Session database file path (required)
//! - `VOLTBRIDGE_DB_POOL_SIZE`: Connection pool size (default 2)
//! - `VOLTBRIDGE_EMAIL`: Account email for credential login
//! - `VOLTBRIDGE_PASSWORD`: Account password for credential login
//! - `VOLTBRIDGE_REFRESH_TOKEN`: Pre-obtained refresh token
//! - `VOLTBRIDGE_SSO_URL`: SSO base URL override
//! - `VOLTBRIDGE_API_URL`: Owner API base URL override
//! - `VOLTBRIDGE_VIN`: Target vehicle VIN
//!
//! Polling and dispatch tuning comes from the config file when present;
//! the environment path uses the built-in defaults.

use std::path::{Path, PathBuf};

use voltbridge_domain::{
    AuthConfig, Config, DatabaseConfig, DispatchConfig, PollingConfig, Result, VehicleConfig,
    VoltBridgeError,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `VoltBridgeError::Config` if configuration cannot be loaded
/// from either source.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `VoltBridgeError::Config` if `VOLTBRIDGE_DB_PATH` is missing,
/// numeric variables fail to parse, or no credential source is configured.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("VOLTBRIDGE_DB_PATH")?;
    let pool_size = match std::env::var("VOLTBRIDGE_DB_POOL_SIZE") {
        Ok(s) => s
            .parse::<u32>()
            .map_err(|e| VoltBridgeError::Config(format!("Invalid pool size: {e}")))?,
        Err(_) => 2,
    };

    let auth = AuthConfig {
        email: std::env::var("VOLTBRIDGE_EMAIL").ok(),
        password: std::env::var("VOLTBRIDGE_PASSWORD").ok(),
        refresh_token: std::env::var("VOLTBRIDGE_REFRESH_TOKEN").ok(),
        sso_base_url: std::env::var("VOLTBRIDGE_SSO_URL")
            .unwrap_or_else(|_| "https://auth.tesla.com".to_string()),
        api_base_url: std::env::var("VOLTBRIDGE_API_URL")
            .unwrap_or_else(|_| "https://owner-api.teslamotors.com".to_string()),
    };

    if !auth.has_credentials() {
        return Err(VoltBridgeError::Config(
            "No credential source configured: set VOLTBRIDGE_REFRESH_TOKEN or both \
             VOLTBRIDGE_EMAIL and VOLTBRIDGE_PASSWORD"
                .to_string(),
        ));
    }

    Ok(Config {
        auth,
        vehicle: VehicleConfig {
            vin: std::env::var("VOLTBRIDGE_VIN").ok(),
            ..VehicleConfig::default()
        },
        polling: PollingConfig::default(),
        dispatch: DispatchConfig::default(),
        database: DatabaseConfig { path: db_path, pool_size },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `VoltBridgeError::Config` if the file is missing, unreadable,
/// or fails to parse.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(VoltBridgeError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            VoltBridgeError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| VoltBridgeError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content; format is detected by file
/// extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| VoltBridgeError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| VoltBridgeError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(VoltBridgeError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe standard locations for a configuration file.
///
/// Searches the working directory, a `config/` subdirectory, and up to two
/// parent directories for `voltbridge.{json,toml}`.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("voltbridge.json"),
            cwd.join("voltbridge.toml"),
            cwd.join("config/voltbridge.json"),
            cwd.join("config/voltbridge.toml"),
            cwd.join("../voltbridge.json"),
            cwd.join("../voltbridge.toml"),
            cwd.join("../../voltbridge.json"),
            cwd.join("../../voltbridge.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("voltbridge.json"),
                exe_dir.join("voltbridge.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        VoltBridgeError::Config(format!("Missing required environment variable: {key}"))
    })
}
