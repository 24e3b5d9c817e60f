//! Wake-up orchestration.
//!
//! Sends the wake signal, then polls connectivity until the vehicle comes
//! online or the attempt budget runs out. The dispatcher runs exactly one
//! wake sequence at a time, for the command at the head of the queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::VehicleApi;
use voltbridge_domain::VehicleHandle;

/// Terminal state of a wake sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// Vehicle confirmed online
    WokeUp,
    /// Attempt budget exhausted or sequence cancelled
    GaveUp,
}

/// Configuration for a wake sequence.
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Connectivity polls before giving up
    pub max_attempts: u32,
    /// Interval between polls
    pub poll_interval: Duration,
    /// Resend the wake signal every this many polls
    pub resend_every: u32,
}

/// Drives a single vehicle through the wake sequence.
pub struct WakeController {
    api: Arc<dyn VehicleApi>,
    config: WakeConfig,
}

impl WakeController {
    #[must_use]
    pub fn new(api: Arc<dyn VehicleApi>, config: WakeConfig) -> Self {
        Self { api, config }
    }

    /// Run the wake sequence to completion or cancellation.
    ///
    /// Transport errors while polling count as "not awake yet" and consume
    /// an attempt; the vehicle often drops a few probes while booting its
    /// connectivity stack.
    pub async fn run(&self, vehicle: &VehicleHandle, cancel: &CancellationToken) -> WakeOutcome {
        info!(vin = %vehicle.vin, "starting wake sequence");

        if let Err(e) = self.api.wake(vehicle).await {
            warn!(vin = %vehicle.vin, error = %e, "wake signal failed to send");
        }

        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(vin = %vehicle.vin, "wake sequence cancelled");
                    return WakeOutcome::GaveUp;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            match self.api.is_awake(vehicle).await {
                Ok(true) => {
                    info!(vin = %vehicle.vin, attempt, "vehicle is awake");
                    return WakeOutcome::WokeUp;
                }
                Ok(false) => {
                    debug!(vin = %vehicle.vin, attempt, "vehicle still asleep");
                }
                Err(e) => {
                    debug!(vin = %vehicle.vin, attempt, error = %e, "awake probe failed");
                }
            }

            // The first wake signal occasionally gets lost; nudge again
            // periodically instead of on every poll.
            if self.config.resend_every > 0 && attempt % self.config.resend_every == 0 {
                debug!(vin = %vehicle.vin, attempt, "resending wake signal");
                if let Err(e) = self.api.wake(vehicle).await {
                    warn!(vin = %vehicle.vin, error = %e, "wake resend failed");
                }
            }
        }

        warn!(
            vin = %vehicle.vin,
            attempts = self.config.max_attempts,
            "vehicle did not wake up, giving up"
        );
        WakeOutcome::GaveUp
    }
}
