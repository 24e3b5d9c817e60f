//! Adaptive polling scheduler.
//!
//! A tick loop re-evaluates the poll policy against the latest vehicle
//! status and submits refresh commands through the dispatcher's queue.
//! Forced poll categories (driving, activity, charging) refresh even when
//! the dispatcher has to wake the vehicle for it; in the idle categories a
//! sleeping vehicle is never woken and the scheduler probes connectivity
//! with an account-level call instead. An optional daily cron job forces
//! one full refresh regardless of sleep state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use voltbridge_core::polling::{evaluate, refresh_due};
use voltbridge_core::ports::{CommandSink, VehicleStateSink};
use voltbridge_core::CommandName;
use voltbridge_domain::PollingConfig;

use super::error::SchedulerError;

/// Configuration for the poll scheduler.
#[derive(Debug, Clone)]
pub struct PollSchedulerConfig {
    /// Interval table and cadence settings
    pub polling: PollingConfig,
    /// Target VIN for the connectivity probe; first listed vehicle when
    /// unset, matching how the dispatcher resolves its handle
    pub vin: Option<String>,
    /// Submit a software update install once a download completes
    pub auto_install_updates: bool,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl PollSchedulerConfig {
    #[must_use]
    pub fn new(polling: PollingConfig, vin: Option<String>, auto_install_updates: bool) -> Self {
        Self { polling, vin, auto_install_updates, join_timeout: Duration::from_secs(5) }
    }
}

/// Poll scheduler with explicit lifecycle management.
pub struct PollScheduler {
    sink: Arc<dyn VehicleStateSink>,
    commands: Arc<dyn CommandSink>,
    config: PollSchedulerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    cron: Option<JobScheduler>,
}

impl PollScheduler {
    #[must_use]
    pub fn new(
        sink: Arc<dyn VehicleStateSink>,
        commands: Arc<dyn CommandSink>,
        config: PollSchedulerConfig,
    ) -> Self {
        Self {
            sink,
            commands,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
            cron: None,
        }
    }

    /// Returns true when the tick loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Start the tick loop and, if enabled, the daily refresh job.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(tick_secs = self.config.polling.tick_secs, "Starting poll scheduler");
        self.cancellation = CancellationToken::new();

        if self.config.polling.daily_enabled {
            self.cron = Some(self.start_daily_job().await?);
        }

        let sink = Arc::clone(&self.sink);
        let commands = Arc::clone(&self.commands);
        let polling = self.config.polling.clone();
        let vin = self.config.vin.clone();
        let auto_install = self.config.auto_install_updates;
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            let tick = Duration::from_secs(polling.tick_secs);
            let mut update_requested = false;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("poll scheduler tick loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(tick) => {
                        Self::tick(
                            &sink,
                            &commands,
                            &polling,
                            vin.as_deref(),
                            auto_install,
                            &mut update_requested,
                        )
                        .await;
                    }
                }
            }
        }));

        info!("Poll scheduler started");
        Ok(())
    }

    /// Stop the tick loop and the daily job.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping poll scheduler");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Scheduler task panicked: {}", e);
                    return Err(SchedulerError::TaskPanicked);
                }
                Err(_) => {
                    warn!("Scheduler task did not stop in time");
                    return Err(SchedulerError::JoinTimeout);
                }
            }
        }

        if let Some(mut cron) = self.cron.take() {
            if let Err(e) = cron.shutdown().await {
                warn!(error = %e, "failed to shut down daily job scheduler");
            }
        }

        info!("Poll scheduler stopped");
        Ok(())
    }

    /// Register the once-per-day forced refresh.
    async fn start_daily_job(&self) -> Result<JobScheduler, SchedulerError> {
        let expr = daily_cron_expr(&self.config.polling.daily_at)?;
        let commands = Arc::clone(&self.commands);

        let scheduler = JobScheduler::new().await?;
        let job = Job::new_async(expr.as_str(), move |_id, _sched| {
            let commands = Arc::clone(&commands);
            Box::pin(async move {
                info!("daily forced refresh");
                // May wake the vehicle; that is the point of the daily job.
                let _ = commands.submit(CommandName::VehicleData, None);
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        info!(at = %self.config.polling.daily_at, "daily refresh job registered");
        Ok(scheduler)
    }

    /// One evaluation of the poll policy.
    async fn tick(
        sink: &Arc<dyn VehicleStateSink>,
        commands: &Arc<dyn CommandSink>,
        polling: &PollingConfig,
        vin: Option<&str>,
        auto_install: bool,
        update_requested: &mut bool,
    ) {
        let status = sink.current_status().await;
        let now = Utc::now();
        let decision = evaluate(&status, polling, now);

        if refresh_due(&decision, &status, now) {
            debug!(category = ?decision.category, forced = decision.forced, "status refresh due");
            if status.awake || decision.forced {
                // Fire and forget; the response handler feeds the sink. The
                // dispatcher runs the wake sequence if the vehicle is asleep.
                let _ = commands.submit(CommandName::VehicleData, None);
            } else {
                Self::probe_sleeping_vehicle(sink, commands, vin).await;
            }
        }

        if auto_install && status.update_downloaded && !*update_requested {
            info!("software update downloaded, scheduling install");
            *update_requested = true;
            let _ = commands.submit(CommandName::ScheduleSoftwareUpdate, None);
        }
        if !status.update_downloaded {
            *update_requested = false;
        }
    }

    /// Connectivity probe that cannot wake the vehicle: the vehicle list
    /// reports per-vehicle state without contacting the car. Follows up
    /// with a data refresh only when the vehicle turns out to be online.
    async fn probe_sleeping_vehicle(
        sink: &Arc<dyn VehicleStateSink>,
        commands: &Arc<dyn CommandSink>,
        vin: Option<&str>,
    ) {
        let rx = commands.submit(CommandName::ListVehicles, None);
        let Ok(Ok(payload)) = rx.await else {
            debug!("vehicle list probe failed");
            return;
        };

        // Select the same vehicle the dispatcher targets, not whichever
        // happens to be listed first on a multi-vehicle account.
        let vehicles = payload["response"].as_array();
        let entry = match vin {
            Some(vin) => {
                vehicles.and_then(|v| v.iter().find(|e| e["vin"].as_str() == Some(vin)))
            }
            None => vehicles.and_then(|v| v.first()),
        };
        let online = entry.and_then(|e| e["state"].as_str()) == Some("online");

        if online {
            debug!("sleeping vehicle turned out to be online");
            sink.note_awake(false).await;
            let _ = commands.submit(CommandName::VehicleData, None);
        } else {
            sink.note_asleep().await;
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("PollScheduler dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}

/// Six-field cron expression for a daily "HH:MM" wall-clock time.
fn daily_cron_expr(daily_at: &str) -> Result<String, SchedulerError> {
    let invalid = || SchedulerError::InvalidDailyTime(daily_at.to_string());

    let (hours, minutes) = daily_at.split_once(':').ok_or_else(invalid)?;
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    Ok(format!("0 {minutes} {hours} * * *"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::sync::oneshot;
    use tokio::sync::Mutex as TokioMutex;
    use voltbridge_core::CommandResult;
    use voltbridge_domain::{Result as DomainResult, VehicleStatus};

    use super::*;

    struct RecordingSink {
        status: TokioMutex<VehicleStatus>,
        awake_notes: TokioMutex<Vec<bool>>,
    }

    impl RecordingSink {
        fn with(status: VehicleStatus) -> Arc<Self> {
            Arc::new(Self {
                status: TokioMutex::new(status),
                awake_notes: TokioMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VehicleStateSink for RecordingSink {
        async fn apply_vehicle_data(&self, _payload: &Value) -> DomainResult<()> {
            Ok(())
        }

        async fn current_status(&self) -> VehicleStatus {
            self.status.lock().await.clone()
        }

        async fn note_awake(&self, prompted: bool) {
            self.awake_notes.lock().await.push(prompted);
            self.status.lock().await.awake = true;
        }

        async fn note_asleep(&self) {
            self.status.lock().await.awake = false;
        }
    }

    /// Records submissions and resolves each one immediately; the vehicle
    /// list result can be scripted.
    struct ScriptedSink {
        submitted: StdMutex<Vec<CommandName>>,
        list_result: StdMutex<Option<CommandResult>>,
    }

    impl ScriptedSink {
        fn new(list_result: Option<CommandResult>) -> Arc<Self> {
            Arc::new(Self {
                submitted: StdMutex::new(Vec::new()),
                list_result: StdMutex::new(list_result),
            })
        }

        fn submitted(&self) -> Vec<CommandName> {
            self.submitted.lock().unwrap().clone()
        }
    }

    impl CommandSink for ScriptedSink {
        fn submit(
            &self,
            name: CommandName,
            _params: Option<Value>,
        ) -> oneshot::Receiver<CommandResult> {
            let (tx, rx) = oneshot::channel();
            self.submitted.lock().unwrap().push(name);

            let result = if name == CommandName::ListVehicles {
                self.list_result.lock().unwrap().take().unwrap_or(Ok(Value::Null))
            } else {
                Ok(Value::Null)
            };
            let _ = tx.send(result);
            rx
        }
    }

    fn polling() -> PollingConfig {
        PollingConfig { tick_secs: 1, ..PollingConfig::default() }
    }

    #[tokio::test]
    async fn awake_and_due_submits_vehicle_data() {
        let sink = RecordingSink::with(VehicleStatus { awake: true, ..VehicleStatus::default() });
        let commands = ScriptedSink::new(None);
        let sink_dyn: Arc<dyn VehicleStateSink> = sink;
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();
        let mut requested = false;

        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, false, &mut requested)
            .await;

        assert_eq!(commands.submitted(), vec![CommandName::VehicleData]);
    }

    #[tokio::test]
    async fn recently_refreshed_vehicle_is_left_alone() {
        let status = VehicleStatus {
            awake: true,
            locked: true,
            last_status_at: Some(Utc::now()),
            ..VehicleStatus::default()
        };
        let sink = RecordingSink::with(status);
        let commands = ScriptedSink::new(None);
        let sink_dyn: Arc<dyn VehicleStateSink> = sink;
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();
        let mut requested = false;

        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, false, &mut requested)
            .await;

        assert!(commands.submitted().is_empty());
    }

    #[tokio::test]
    async fn sleeping_vehicle_is_probed_not_woken() {
        let list = serde_json::json!({
            "response": [{"id": 111, "vin": "VIN1", "state": "asleep"}],
            "count": 1
        });
        let sink = RecordingSink::with(VehicleStatus { locked: true, ..VehicleStatus::default() });
        let commands = ScriptedSink::new(Some(Ok(list)));
        let sink_dyn: Arc<dyn VehicleStateSink> = sink.clone();
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();
        let mut requested = false;

        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, false, &mut requested)
            .await;

        // Only the probe, never a data refresh that would wake the car.
        assert_eq!(commands.submitted(), vec![CommandName::ListVehicles]);
        assert!(sink.awake_notes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn charging_while_asleep_forces_a_refresh() {
        // A sleeping vehicle in a charge session bypasses the probe: the
        // refresh is submitted directly and may wake the car.
        let status = VehicleStatus {
            locked: true,
            charging: true,
            charge_minutes_remaining: Some(45),
            ..VehicleStatus::default()
        };
        let sink = RecordingSink::with(status);
        let commands = ScriptedSink::new(None);
        let sink_dyn: Arc<dyn VehicleStateSink> = sink;
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();
        let mut requested = false;

        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, false, &mut requested)
            .await;

        assert_eq!(commands.submitted(), vec![CommandName::VehicleData]);
    }

    #[tokio::test]
    async fn unprompted_wake_is_detected_and_followed_up() {
        let list = serde_json::json!({
            "response": [{"id": 111, "vin": "VIN1", "state": "online"}],
            "count": 1
        });
        let sink = RecordingSink::with(VehicleStatus { locked: true, ..VehicleStatus::default() });
        let commands = ScriptedSink::new(Some(Ok(list)));
        let sink_dyn: Arc<dyn VehicleStateSink> = sink.clone();
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();
        let mut requested = false;

        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, false, &mut requested)
            .await;

        assert_eq!(
            commands.submitted(),
            vec![CommandName::ListVehicles, CommandName::VehicleData]
        );
        // Recorded as an unprompted wake.
        assert_eq!(sink.awake_notes.lock().await.clone(), vec![false]);
    }

    #[tokio::test]
    async fn probe_selects_the_configured_vin() {
        // Another vehicle on the account is online; ours is still asleep.
        let list = serde_json::json!({
            "response": [
                {"id": 111, "vin": "OTHER", "state": "online"},
                {"id": 222, "vin": "VIN2", "state": "asleep"}
            ],
            "count": 2
        });
        let sink = RecordingSink::with(VehicleStatus { locked: true, ..VehicleStatus::default() });
        let commands = ScriptedSink::new(Some(Ok(list)));
        let sink_dyn: Arc<dyn VehicleStateSink> = sink.clone();
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();
        let mut requested = false;

        PollScheduler::tick(
            &sink_dyn,
            &commands_dyn,
            &polling(),
            Some("VIN2"),
            false,
            &mut requested,
        )
        .await;

        assert_eq!(commands.submitted(), vec![CommandName::ListVehicles]);
        assert!(sink.awake_notes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn downloaded_update_is_installed_once() {
        let status = VehicleStatus {
            awake: true,
            locked: true,
            update_pending: true,
            update_downloaded: true,
            last_status_at: Some(Utc::now()),
            ..VehicleStatus::default()
        };
        let sink = RecordingSink::with(status);
        let commands = ScriptedSink::new(None);
        let mut requested = false;

        let sink_dyn: Arc<dyn VehicleStateSink> = sink;
        let commands_dyn: Arc<dyn CommandSink> = commands.clone();

        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, true, &mut requested)
            .await;
        PollScheduler::tick(&sink_dyn, &commands_dyn, &polling(), None, true, &mut requested)
            .await;

        assert_eq!(commands.submitted(), vec![CommandName::ScheduleSoftwareUpdate]);
        assert!(requested);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_start_stop_guards() {
        let sink = RecordingSink::with(VehicleStatus::default());
        let commands = ScriptedSink::new(None);
        let config = PollSchedulerConfig {
            polling: PollingConfig { daily_enabled: false, ..polling() },
            vin: None,
            auto_install_updates: false,
            join_timeout: Duration::from_secs(2),
        };
        let mut scheduler = PollScheduler::new(sink, commands, config);

        assert!(!scheduler.is_running());
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
    }

    #[test]
    fn daily_cron_expression() {
        assert_eq!(daily_cron_expr("03:30").unwrap(), "0 30 3 * * *");
        assert_eq!(daily_cron_expr("0:05").unwrap(), "0 5 0 * * *");
        assert!(daily_cron_expr("25:00").is_err());
        assert!(daily_cron_expr("12:75").is_err());
        assert!(daily_cron_expr("noon").is_err());
    }
}
