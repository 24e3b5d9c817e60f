//! Command-to-endpoint mapping for the vendor owner API.
//!
//! Paths and payload shapes here are dictated by the vendor; every literal
//! matches the wire format the vehicles actually accept.

use serde_json::{json, Value};
use voltbridge_core::CommandName;

/// HTTP method for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Resolve the method and path for a command against a vehicle id.
#[must_use]
pub fn endpoint(name: CommandName, vehicle_id: &str) -> (HttpMethod, String) {
    use CommandName::*;

    match name {
        ListVehicles => (HttpMethod::Get, "/api/1/vehicles".to_string()),
        Wake => (HttpMethod::Post, format!("/api/1/vehicles/{vehicle_id}/wake_up")),
        VehicleData => (HttpMethod::Get, format!("/api/1/vehicles/{vehicle_id}/vehicle_data")),
        ServiceData => (HttpMethod::Get, format!("/api/1/vehicles/{vehicle_id}/service_data")),
        other => {
            (HttpMethod::Post, format!("/api/1/vehicles/{vehicle_id}/command/{}", command_slug(other)))
        }
    }
}

/// Vendor slug under `/command/` for actuation commands.
fn command_slug(name: CommandName) -> &'static str {
    use CommandName::*;

    match name {
        ChargeStart => "charge_start",
        ChargeStop => "charge_stop",
        ClimateStart => "auto_conditioning_start",
        ClimateStop => "auto_conditioning_stop",
        SetTemperature => "set_temps",
        SetChargeLimit => "set_charge_limit",
        LockDoors => "door_lock",
        UnlockDoors => "door_unlock",
        ActuateFrunk | ActuateTrunk => "actuate_trunk",
        OpenChargePort => "charge_port_door_open",
        CloseChargePort => "charge_port_door_close",
        VentWindows | CloseWindows => "window_control",
        VentSunroof | CloseSunroof => "sun_roof_control",
        SentryStart | SentryStop => "set_sentry_mode",
        ScheduleSoftwareUpdate => "schedule_software_update",
        HonkHorn => "honk_horn",
        FlashLights => "flash_lights",
        // Non-command endpoints never reach here
        Wake | VehicleData | ServiceData | ListVehicles => "",
    }
}

/// Build the request body for a command, merging caller parameters into the
/// vendor's expected shape.
#[must_use]
pub fn payload(name: CommandName, params: Option<&Value>) -> Option<Value> {
    use CommandName::*;

    match name {
        SetTemperature => {
            // A single "temperature" parameter applies to both seats.
            let both = params.and_then(|p| p.get("temperature")).and_then(Value::as_f64);
            let driver = params
                .and_then(|p| p.get("driver_temp"))
                .and_then(Value::as_f64)
                .or(both)
                .unwrap_or(21.0);
            let passenger = params
                .and_then(|p| p.get("passenger_temp"))
                .and_then(Value::as_f64)
                .or(both)
                .unwrap_or(driver);
            Some(json!({ "driver_temp": driver, "passenger_temp": passenger }))
        }
        SetChargeLimit => {
            let percent =
                params.and_then(|p| p.get("percent")).and_then(Value::as_u64).unwrap_or(90);
            Some(json!({ "percent": percent }))
        }
        ActuateFrunk => Some(json!({ "which_trunk": "front" })),
        ActuateTrunk => Some(json!({ "which_trunk": "rear" })),
        // The API requires coordinates for window control; zeros are
        // accepted for the vent/close pair.
        VentWindows => Some(json!({ "command": "vent", "lat": 0, "lon": 0 })),
        CloseWindows => Some(json!({ "command": "close", "lat": 0, "lon": 0 })),
        VentSunroof => Some(json!({ "state": "vent" })),
        CloseSunroof => Some(json!({ "state": "close" })),
        SentryStart => Some(json!({ "on": true })),
        SentryStop => Some(json!({ "on": false })),
        ScheduleSoftwareUpdate => {
            let offset =
                params.and_then(|p| p.get("offset_sec")).and_then(Value::as_u64).unwrap_or(120);
            Some(json!({ "offset_sec": offset }))
        }
        _ => None,
    }
}
