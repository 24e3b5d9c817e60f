//! Adaptive poll interval selection.
//!
//! Pure policy: given the latest vehicle activity flags and the configured
//! interval table, pick how often the status should be refreshed. The
//! scheduler applies the decision; nothing here touches the network.

use std::time::Duration;

use chrono::{DateTime, Utc};
use voltbridge_domain::{PollingConfig, VehicleStatus};

/// Activity category, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCategory {
    /// Being driven
    Moving,
    /// Awake with user or system activity implied
    Active,
    /// Charging with more than an hour remaining
    ChargingLong,
    /// Charging with an hour or less remaining
    ChargingShort,
    /// Awake but idle
    IdleAwake,
    /// Asleep with nothing pending
    Fallback,
}

/// A polling decision: category, interval, and whether a refresh may wake a
/// sleeping vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDecision {
    pub category: PollCategory,
    pub interval: Duration,
    /// Forced refreshes proceed even when the vehicle must be woken first;
    /// non-forced ones never wake the vehicle
    pub forced: bool,
}

/// Pick the poll category and interval for the current vehicle state.
///
/// First match wins, in priority order. Charging outranks idle states but
/// not driving. Driving, activity, and charging are forced categories:
/// something is happening with the vehicle, so the refresh goes through
/// even if the vehicle has to be woken for it. Only the two idle
/// categories defer while asleep.
#[must_use]
pub fn evaluate(status: &VehicleStatus, config: &PollingConfig, now: DateTime<Utc>) -> PollDecision {
    let (category, secs, forced) = if status.moving {
        (PollCategory::Moving, config.moving_secs, true)
    } else if is_active(status, now) {
        (PollCategory::Active, config.active_secs, true)
    } else if status.charging {
        match status.charge_minutes_remaining {
            Some(mins) if mins <= 60 => {
                (PollCategory::ChargingShort, config.charging_short_secs, true)
            }
            _ => (PollCategory::ChargingLong, config.charging_long_secs, true),
        }
    } else if status.awake {
        (PollCategory::IdleAwake, config.idle_awake_secs, false)
    } else {
        (PollCategory::Fallback, config.fallback_secs, false)
    };

    PollDecision { category, interval: Duration::from_secs(secs), forced }
}

fn is_active(status: &VehicleStatus, now: DateTime<Utc>) -> bool {
    status.recently_woke_unprompted(now)
        || !status.locked
        || status.climate_on
        || status.sentry_on
        || status.update_pending
}

/// Whether enough time has passed since the last refresh for this decision.
///
/// A vehicle that has never been refreshed is always due.
#[must_use]
pub fn refresh_due(decision: &PollDecision, status: &VehicleStatus, now: DateTime<Utc>) -> bool {
    match status.seconds_since_refresh(now) {
        Some(elapsed) => elapsed >= 0 && elapsed as u64 >= decision.interval.as_secs(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_status() -> VehicleStatus {
        VehicleStatus { awake: true, locked: true, ..VehicleStatus::default() }
    }

    fn config() -> PollingConfig {
        PollingConfig::default()
    }

    #[test]
    fn moving_outranks_everything() {
        let mut status = base_status();
        status.moving = true;
        status.charging = true;
        status.climate_on = true;

        let decision = evaluate(&status, &config(), Utc::now());
        assert_eq!(decision.category, PollCategory::Moving);
        assert_eq!(decision.interval, Duration::from_secs(config().moving_secs));
        assert!(decision.forced);
    }

    #[test]
    fn activity_signals_select_active() {
        let now = Utc::now();
        for mutate in [
            (|s: &mut VehicleStatus| s.locked = false) as fn(&mut VehicleStatus),
            |s| s.climate_on = true,
            |s| s.sentry_on = true,
            |s| s.update_pending = true,
            |s| s.last_unprompted_wake = Some(Utc::now() - chrono::Duration::seconds(60)),
        ] {
            let mut status = base_status();
            mutate(&mut status);
            let decision = evaluate(&status, &config(), now);
            assert_eq!(decision.category, PollCategory::Active);
            assert!(decision.forced);
        }
    }

    #[test]
    fn charging_splits_on_remaining_time() {
        let mut status = base_status();
        status.charging = true;
        status.charge_minutes_remaining = Some(45);
        assert_eq!(evaluate(&status, &config(), Utc::now()).category, PollCategory::ChargingShort);

        status.charge_minutes_remaining = Some(180);
        assert_eq!(evaluate(&status, &config(), Utc::now()).category, PollCategory::ChargingLong);

        // Unknown remaining time treated as a long session
        status.charge_minutes_remaining = None;
        assert_eq!(evaluate(&status, &config(), Utc::now()).category, PollCategory::ChargingLong);
    }

    #[test]
    fn charging_while_asleep_is_forced() {
        // A sleeping vehicle in a short charge session still gets its
        // refresh, even though that means waking it.
        let mut status = VehicleStatus { locked: true, ..VehicleStatus::default() };
        status.charging = true;
        status.charge_minutes_remaining = Some(45);

        let decision = evaluate(&status, &config(), Utc::now());
        assert_eq!(decision.category, PollCategory::ChargingShort);
        assert!(decision.forced);
    }

    #[test]
    fn awake_idle_and_asleep_fallback() {
        let status = base_status();
        let idle = evaluate(&status, &config(), Utc::now());
        assert_eq!(idle.category, PollCategory::IdleAwake);
        assert!(!idle.forced);

        let asleep = VehicleStatus { locked: true, ..VehicleStatus::default() };
        let decision = evaluate(&asleep, &config(), Utc::now());
        assert_eq!(decision.category, PollCategory::Fallback);
        assert_eq!(decision.interval, Duration::from_secs(900));
        assert!(!decision.forced);
    }

    #[test]
    fn pending_update_applies_while_asleep() {
        let mut status = VehicleStatus { locked: true, ..VehicleStatus::default() };
        status.update_pending = true;
        let decision = evaluate(&status, &config(), Utc::now());
        assert_eq!(decision.category, PollCategory::Active);
        assert!(decision.forced);
    }

    #[test]
    fn refresh_due_honours_elapsed_time() {
        let now = Utc::now();
        let mut status = base_status();
        let decision = evaluate(&status, &config(), now);

        // Never refreshed: due
        assert!(refresh_due(&decision, &status, now));

        status.last_status_at = Some(now - chrono::Duration::seconds(30));
        assert!(!refresh_due(&decision, &status, now));

        status.last_status_at =
            Some(now - chrono::Duration::seconds(config().idle_awake_secs as i64 + 1));
        assert!(refresh_due(&decision, &status, now));
    }
}
