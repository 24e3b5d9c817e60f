//! Command catalog and queue item types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Every operation the dispatcher can run against a vehicle.
///
/// Names map one-to-one onto vendor endpoints; the mapping itself lives in
/// the infra gateway so this enum stays transport-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Wake,
    VehicleData,
    ServiceData,
    ListVehicles,
    ChargeStart,
    ChargeStop,
    ClimateStart,
    ClimateStop,
    SetTemperature,
    SetChargeLimit,
    LockDoors,
    UnlockDoors,
    ActuateFrunk,
    ActuateTrunk,
    OpenChargePort,
    CloseChargePort,
    VentWindows,
    CloseWindows,
    VentSunroof,
    CloseSunroof,
    SentryStart,
    SentryStop,
    ScheduleSoftwareUpdate,
    HonkHorn,
    FlashLights,
}

impl CommandName {
    /// Stable wire name, used in logs and handler lookup.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::VehicleData => "vehicle_data",
            Self::ServiceData => "service_data",
            Self::ListVehicles => "list_vehicles",
            Self::ChargeStart => "charge_start",
            Self::ChargeStop => "charge_stop",
            Self::ClimateStart => "climate_start",
            Self::ClimateStop => "climate_stop",
            Self::SetTemperature => "set_temperature",
            Self::SetChargeLimit => "set_charge_limit",
            Self::LockDoors => "lock_doors",
            Self::UnlockDoors => "unlock_doors",
            Self::ActuateFrunk => "actuate_frunk",
            Self::ActuateTrunk => "actuate_trunk",
            Self::OpenChargePort => "open_charge_port",
            Self::CloseChargePort => "close_charge_port",
            Self::VentWindows => "vent_windows",
            Self::CloseWindows => "close_windows",
            Self::VentSunroof => "vent_sunroof",
            Self::CloseSunroof => "close_sunroof",
            Self::SentryStart => "sentry_start",
            Self::SentryStop => "sentry_stop",
            Self::ScheduleSoftwareUpdate => "schedule_software_update",
            Self::HonkHorn => "honk_horn",
            Self::FlashLights => "flash_lights",
        }
    }

    /// Whether the vehicle must be online before this command is sent.
    ///
    /// The wake signal itself and account-level calls work against a
    /// sleeping vehicle; everything else needs a wake sequence first.
    #[must_use]
    pub fn requires_awake(&self) -> bool {
        !matches!(self, Self::Wake | Self::ListVehicles)
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct Command {
    /// Correlation id for logs
    pub id: Uuid,
    /// Which operation to run
    pub name: CommandName,
    /// Command-specific parameters (temperatures, limits, which trunk)
    pub params: Option<Value>,
    /// Transient retries consumed so far
    pub retry_count: u32,
}

impl Command {
    #[must_use]
    pub fn new(name: CommandName, params: Option<Value>) -> Self {
        Self { id: Uuid::new_v4(), name, params, retry_count: 0 }
    }
}

/// Terminal failure reported back to a command's submitter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("vehicle did not wake up in time")]
    WakeTimeout,

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("rejected by API (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("vehicle unavailable: {0}")]
    VehicleUnavailable(String),

    #[error("command dropped before execution")]
    Dropped,
}

/// What a submitter eventually receives for each accepted command.
pub type CommandResult = std::result::Result<Value, CommandError>;
