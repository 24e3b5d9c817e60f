//! Shared vehicle state derived from telemetry payloads.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ports::VehicleStateSink;
use voltbridge_domain::{Result as DomainResult, VehicleStatus};

/// In-memory vehicle status, updated by telemetry ingestion and awake
/// transitions, read by the polling scheduler.
#[derive(Default)]
pub struct SharedVehicleState {
    status: RwLock<VehicleStatus>,
}

impl SharedVehicleState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleStateSink for SharedVehicleState {
    async fn apply_vehicle_data(&self, payload: &Value) -> DomainResult<()> {
        // Accept the full envelope or the already-unwrapped response object.
        let data = match payload.get("response") {
            Some(inner) if inner.is_object() => inner,
            _ => payload,
        };

        let mut status = self.status.write().await;

        // Receiving data at all means the vehicle is reachable.
        status.awake = true;
        status.last_status_at = Some(Utc::now());

        if let Some(drive) = data.get("drive_state") {
            let shift = drive.get("shift_state").and_then(Value::as_str);
            status.moving = matches!(shift, Some("D" | "R" | "N"));
        }

        if let Some(charge) = data.get("charge_state") {
            status.charging =
                charge.get("charging_state").and_then(Value::as_str) == Some("Charging");
            status.charge_minutes_remaining = if status.charging {
                charge.get("minutes_to_full_charge").and_then(Value::as_i64)
            } else {
                None
            };
            status.battery_level =
                charge.get("battery_level").and_then(Value::as_u64).map(|v| v.min(100) as u8);
        }

        if let Some(vehicle) = data.get("vehicle_state") {
            if let Some(locked) = vehicle.get("locked").and_then(Value::as_bool) {
                status.locked = locked;
            }
            if let Some(sentry) = vehicle.get("sentry_mode").and_then(Value::as_bool) {
                status.sentry_on = sentry;
            }
            if let Some(update) = vehicle.get("software_update") {
                let update_status =
                    update.get("status").and_then(Value::as_str).unwrap_or_default();
                let download_perc =
                    update.get("download_perc").and_then(Value::as_i64).unwrap_or(0);
                status.update_pending = !update_status.is_empty();
                status.update_downloaded =
                    status.update_pending && update_status != "installing" && download_perc >= 100;
            }
        }

        if let Some(climate) = data.get("climate_state") {
            if let Some(on) = climate.get("is_climate_on").and_then(Value::as_bool) {
                status.climate_on = on;
            }
        }

        debug!(
            moving = status.moving,
            charging = status.charging,
            battery = ?status.battery_level,
            "vehicle status refreshed"
        );
        Ok(())
    }

    async fn current_status(&self) -> VehicleStatus {
        self.status.read().await.clone()
    }

    /// An unprompted wake implies user or system activity and bumps the
    /// poll rate for a while.
    async fn note_awake(&self, prompted: bool) {
        let mut status = self.status.write().await;
        if !status.awake && !prompted {
            debug!("vehicle woke up on its own");
            status.last_unprompted_wake = Some(Utc::now());
        }
        status.awake = true;
    }

    async fn note_asleep(&self) {
        self.status.write().await.awake = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Value {
        serde_json::json!({
            "response": {
                "id": 12345,
                "state": "online",
                "drive_state": { "shift_state": "D", "speed": 42 },
                "charge_state": {
                    "charging_state": "Charging",
                    "minutes_to_full_charge": 95,
                    "battery_level": 63
                },
                "vehicle_state": {
                    "locked": false,
                    "sentry_mode": true,
                    "software_update": { "status": "available", "download_perc": 100 }
                },
                "climate_state": { "is_climate_on": true }
            }
        })
    }

    #[tokio::test]
    async fn full_payload_populates_every_flag() {
        let state = SharedVehicleState::new();
        state.apply_vehicle_data(&sample_payload()).await.unwrap();

        let status = state.current_status().await;
        assert!(status.awake);
        assert!(status.moving);
        assert!(status.charging);
        assert_eq!(status.charge_minutes_remaining, Some(95));
        assert_eq!(status.battery_level, Some(63));
        assert!(!status.locked);
        assert!(status.sentry_on);
        assert!(status.climate_on);
        assert!(status.update_pending);
        assert!(status.update_downloaded);
        assert!(status.last_status_at.is_some());
    }

    #[tokio::test]
    async fn parked_idle_payload() {
        let payload = serde_json::json!({
            "response": {
                "drive_state": { "shift_state": null },
                "charge_state": { "charging_state": "Disconnected", "battery_level": 80 },
                "vehicle_state": {
                    "locked": true,
                    "sentry_mode": false,
                    "software_update": { "status": "", "download_perc": 0 }
                },
                "climate_state": { "is_climate_on": false }
            }
        });

        let state = SharedVehicleState::new();
        state.apply_vehicle_data(&payload).await.unwrap();

        let status = state.current_status().await;
        assert!(!status.moving);
        assert!(!status.charging);
        assert_eq!(status.charge_minutes_remaining, None);
        assert!(status.locked);
        assert!(!status.update_pending);
        assert!(!status.update_downloaded);
    }

    #[tokio::test]
    async fn unprompted_wake_is_recorded_once_awake_flips() {
        let state = SharedVehicleState::new();

        state.note_awake(true).await;
        assert!(state.current_status().await.last_unprompted_wake.is_none());

        state.note_asleep().await;
        state.note_awake(false).await;
        let status = state.current_status().await;
        assert!(status.awake);
        assert!(status.last_unprompted_wake.is_some());
    }
}
