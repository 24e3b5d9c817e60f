//! Vehicle-facing domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::UNPROMPTED_WAKE_WINDOW_SECS;

/// A resolved vehicle, sufficient to address API calls.
///
/// Resolved from the "list vehicles" call by VIN (or first entry if no VIN is
/// configured). May become stale when the API transiently reports zero
/// vehicles and must then be re-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleHandle {
    /// API identifier used in path templates
    pub id: String,
    /// Vehicle identification number
    pub vin: String,
    /// Last reported connectivity state ("online", "asleep", "offline")
    pub state: String,
}

impl VehicleHandle {
    /// Whether the vehicle reported itself online at resolution time.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state == "online"
    }
}

/// Current vehicle activity flags consumed by the polling scheduler.
///
/// This is the small slice of the vehicle data model the coordination logic
/// needs; the full telemetry payload is handed to the state sink untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    /// Vehicle is reachable without a wake sequence
    pub awake: bool,
    /// Shift state indicates the vehicle is being driven
    pub moving: bool,
    /// All doors locked
    pub locked: bool,
    /// HVAC running
    pub climate_on: bool,
    /// Sentry mode active
    pub sentry_on: bool,
    /// A charge session is in progress
    pub charging: bool,
    /// Minutes until the charge session completes, when charging
    pub charge_minutes_remaining: Option<i64>,
    /// A software update is pending (any stage)
    pub update_pending: bool,
    /// A software update has finished downloading and can be installed
    pub update_downloaded: bool,
    /// Battery state of charge, percent
    pub battery_level: Option<u8>,
    /// Last time the vehicle came online without us waking it
    pub last_unprompted_wake: Option<DateTime<Utc>>,
    /// Timestamp of the last successful full status refresh
    pub last_status_at: Option<DateTime<Utc>>,
}

impl VehicleStatus {
    /// Whether the vehicle woke on its own recently enough to imply user or
    /// system activity.
    #[must_use]
    pub fn recently_woke_unprompted(&self, now: DateTime<Utc>) -> bool {
        self.last_unprompted_wake
            .map(|at| (now - at).num_seconds() <= UNPROMPTED_WAKE_WINDOW_SECS)
            .unwrap_or(false)
    }

    /// Seconds since the last full status refresh, or `None` if never
    /// refreshed.
    #[must_use]
    pub fn seconds_since_refresh(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_status_at.map(|at| (now - at).num_seconds())
    }
}
