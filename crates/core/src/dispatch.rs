//! Serialized command dispatch.
//!
//! One background task owns the FIFO queue and talks to the vehicle; at most
//! one command is in flight at any time. Submitters receive a oneshot that
//! resolves exactly once with the command's terminal result, including when
//! the command is discarded by a queue drain or shutdown.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::command::{Command, CommandError, CommandName, CommandResult};
use crate::handlers::HandlerRegistry;
use crate::ports::{CommandSink, SessionManager, VehicleApi, VehicleStateSink};
use crate::retry::{classify, Outcome};
use crate::wake::{WakeConfig, WakeController, WakeOutcome};
use voltbridge_domain::{DispatchConfig, DrainPolicy, VehicleHandle};

/// Runtime configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Target VIN; first listed vehicle when unset
    pub vin: Option<String>,
    /// Per-command transient retry budget
    pub max_retries: u32,
    /// Delay between transient retries
    pub retry_delay: Duration,
    /// Spacing between consecutive commands
    pub spacing: Duration,
    /// Confirmed-awake cache window
    pub awake_cache: Duration,
    /// Attempts in the vehicle re-resolve loop
    pub resolve_max_attempts: u32,
    /// Delay between re-resolve attempts
    pub resolve_delay: Duration,
    /// Queue policy on wake-sequence exhaustion
    pub drain_policy: DrainPolicy,
    /// Wake sequence tuning
    pub wake: WakeConfig,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl DispatcherConfig {
    /// Build from the persisted settings plus the configured VIN.
    #[must_use]
    pub fn from_settings(settings: &DispatchConfig, vin: Option<String>) -> Self {
        Self {
            vin,
            max_retries: settings.max_retries,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            spacing: Duration::from_secs(settings.spacing_secs),
            awake_cache: Duration::from_secs(settings.awake_cache_secs),
            resolve_max_attempts: settings.resolve_max_attempts,
            resolve_delay: Duration::from_secs(settings.resolve_delay_secs),
            drain_policy: settings.drain_policy,
            wake: WakeConfig {
                max_attempts: settings.wake_max_attempts,
                poll_interval: Duration::from_secs(settings.wake_poll_secs),
                resend_every: settings.wake_resend_every,
            },
            join_timeout: Duration::from_secs(5),
        }
    }
}

struct QueuedCommand {
    command: Command,
    done: oneshot::Sender<CommandResult>,
}

impl QueuedCommand {
    fn resolve(self, result: CommandResult) {
        // Receiver may have been dropped; nothing to do then.
        let _ = self.done.send(result);
    }
}

/// Cloneable submission handle backed by the dispatcher's queue.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<QueuedCommand>,
}

impl CommandSink for DispatchHandle {
    fn submit(&self, name: CommandName, params: Option<Value>) -> oneshot::Receiver<CommandResult> {
        let (done, rx) = oneshot::channel();
        let command = Command::new(name, params);
        debug!(command = %name, id = %command.id, "command submitted");
        if let Err(e) = self.tx.send(QueuedCommand { command, done }) {
            // Dispatcher is gone; resolve immediately.
            e.0.resolve(Err(CommandError::Dropped));
        }
        rx
    }
}

/// Command dispatcher with explicit lifecycle management.
pub struct CommandDispatcher {
    api: Arc<dyn VehicleApi>,
    sessions: Arc<dyn SessionManager>,
    handlers: Arc<HandlerRegistry>,
    sink: Arc<dyn VehicleStateSink>,
    config: DispatcherConfig,
    tx: mpsc::UnboundedSender<QueuedCommand>,
    rx: Option<mpsc::UnboundedReceiver<QueuedCommand>>,
    status_tx: watch::Sender<String>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl CommandDispatcher {
    /// Create a new dispatcher; call [`Self::start`] before submitting.
    pub fn new(
        api: Arc<dyn VehicleApi>,
        sessions: Arc<dyn SessionManager>,
        handlers: Arc<HandlerRegistry>,
        sink: Arc<dyn VehicleStateSink>,
        config: DispatcherConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel("stopped".to_string());
        Self {
            api,
            sessions,
            handlers,
            sink,
            config,
            tx,
            rx: Some(rx),
            status_tx,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Handle for submitting commands. Obtain after [`Self::start`]; handles
    /// from before a restart are stale.
    #[must_use]
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle { tx: self.tx.clone() }
    }

    /// Watch the one-line human-readable activity status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Returns true when the worker task is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Start the worker, spawning the background dispatch task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Dispatcher already running".to_string());
        }

        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => {
                // Restart after a stop: fresh queue, old handles are dead.
                let (tx, rx) = mpsc::unbounded_channel();
                self.tx = tx;
                rx
            }
        };

        info!("Starting command dispatcher");
        self.cancellation = CancellationToken::new();

        let worker = Worker {
            api: Arc::clone(&self.api),
            sessions: Arc::clone(&self.sessions),
            handlers: Arc::clone(&self.handlers),
            sink: Arc::clone(&self.sink),
            config: self.config.clone(),
            rx,
            queue: VecDeque::new(),
            vehicle: None,
            awake_confirmed_at: None,
            status_tx: self.status_tx.clone(),
        };
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            worker.run(cancel).await;
        }));

        info!("Command dispatcher started");
        Ok(())
    }

    /// Stop the worker and wait for the dispatch task to finish.
    ///
    /// Commands still queued resolve with [`CommandError::Dropped`].
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Dispatcher not running".to_string());
        }

        info!("Stopping command dispatcher");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Dispatcher task panicked: {}", e);
                    return Err("Dispatcher task panicked".to_string());
                }
                Err(_) => {
                    warn!("Dispatcher task did not complete within timeout");
                    return Err("Dispatcher task timeout".to_string());
                }
            }
        }

        let _ = self.status_tx.send("stopped".to_string());
        info!("Command dispatcher stopped");
        Ok(())
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("CommandDispatcher dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}

/// State owned by the background dispatch task.
struct Worker {
    api: Arc<dyn VehicleApi>,
    sessions: Arc<dyn SessionManager>,
    handlers: Arc<HandlerRegistry>,
    sink: Arc<dyn VehicleStateSink>,
    config: DispatcherConfig,
    rx: mpsc::UnboundedReceiver<QueuedCommand>,
    queue: VecDeque<QueuedCommand>,
    vehicle: Option<VehicleHandle>,
    awake_confirmed_at: Option<Instant>,
    status_tx: watch::Sender<String>,
}

impl Worker {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            // Pull everything already waiting in the channel.
            while let Ok(item) = self.rx.try_recv() {
                self.queue.push_back(item);
            }

            if self.queue.is_empty() {
                self.set_status("idle");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = self.rx.recv() => match item {
                        Some(item) => {
                            self.queue.push_back(item);
                            continue;
                        }
                        None => break,
                    },
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            self.dispatch_head(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.spacing) => {}
            }
        }

        debug!("dispatch loop exiting");
        self.drain_all(CommandError::Dropped);
    }

    /// Resolve every queued and channel-pending command with `error`.
    fn drain_all(&mut self, error: CommandError) {
        while let Ok(item) = self.rx.try_recv() {
            self.queue.push_back(item);
        }
        let count = self.queue.len();
        if count > 0 {
            info!(count, error = %error, "draining command queue");
        }
        for item in self.queue.drain(..) {
            item.resolve(Err(error.clone()));
        }
    }

    fn set_status(&self, status: impl Into<String>) {
        let _ = self.status_tx.send(status.into());
    }

    /// Run the command at the head of the queue to a terminal result.
    async fn dispatch_head(&mut self, cancel: &CancellationToken) {
        let Some(item) = self.queue.pop_front() else {
            return;
        };
        let name = item.command.name;
        debug!(command = %name, id = %item.command.id, "dispatching");

        // A usable session is a precondition for everything.
        if let Err(e) = self.sessions.ensure_valid_session(false).await {
            warn!(command = %name, error = %e, "session unavailable, dropping command");
            self.set_status(format!("auth failed: {e}"));
            item.resolve(Err(CommandError::Auth(e.to_string())));
            return;
        }

        // Resolve the target vehicle unless the command is account-level.
        if name != CommandName::ListVehicles && self.vehicle.is_none() {
            match self.resolve_vehicle().await {
                Ok(vehicle) => {
                    info!(vin = %vehicle.vin, id = %vehicle.id, "vehicle resolved");
                    self.vehicle = Some(vehicle);
                }
                Err(e) => {
                    self.set_status("vehicle unresolved");
                    item.resolve(Err(e));
                    return;
                }
            }
        }

        // Wake gate: the head command drives the wake sequence for the
        // whole queue.
        if name.requires_awake() && !self.check_awake(cancel).await {
            self.set_status(format!("waking vehicle for {name}"));
            if !self.wake_vehicle(cancel).await {
                warn!(command = %name, "wake sequence gave up");
                self.set_status("vehicle did not wake up");
                item.resolve(Err(CommandError::WakeTimeout));
                if self.config.drain_policy == DrainPolicy::EntireQueue {
                    self.drain_all(CommandError::WakeTimeout);
                }
                return;
            }
        }

        self.execute_to_completion(item, cancel).await;
    }

    /// Whether the vehicle is known awake, probing the API when the cached
    /// confirmation has expired.
    async fn check_awake(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if let Some(at) = self.awake_confirmed_at {
            if at.elapsed() < self.config.awake_cache {
                return true;
            }
        }

        let Some(vehicle) = self.vehicle.as_ref() else {
            return false;
        };
        match self.api.is_awake(vehicle).await {
            Ok(true) => {
                // Online without us waking it.
                self.sink.note_awake(false).await;
                self.awake_confirmed_at = Some(Instant::now());
                true
            }
            Ok(false) => {
                self.sink.note_asleep().await;
                false
            }
            Err(e) => {
                debug!(error = %e, "awake probe failed");
                false
            }
        }
    }

    /// Run the wake sequence. Returns true when the vehicle came online.
    async fn wake_vehicle(&mut self, cancel: &CancellationToken) -> bool {
        let Some(vehicle) = self.vehicle.as_ref() else {
            return false;
        };
        let controller = WakeController::new(Arc::clone(&self.api), self.config.wake.clone());
        match controller.run(vehicle, cancel).await {
            WakeOutcome::WokeUp => {
                self.sink.note_awake(true).await;
                self.awake_confirmed_at = Some(Instant::now());
                true
            }
            WakeOutcome::GaveUp => false,
        }
    }

    /// Retry loop for a single command, classifying each attempt.
    async fn execute_to_completion(&mut self, mut item: QueuedCommand, cancel: &CancellationToken) {
        let name = item.command.name;
        self.set_status(format!("executing {name}"));

        loop {
            if cancel.is_cancelled() {
                item.resolve(Err(CommandError::Dropped));
                return;
            }

            let response = match self.execute_call(&item.command).await {
                Ok(response) => response,
                Err(e) => {
                    // Transport failure: no HTTP response, retry as transient.
                    warn!(command = %name, error = %e, "request failed in transit");
                    if !self.bump_retry(&mut item.command) {
                        let attempts = item.command.retry_count;
                        item.resolve(Err(CommandError::RetriesExhausted { attempts }));
                        return;
                    }
                    if !self.pause(self.config.retry_delay, cancel).await {
                        item.resolve(Err(CommandError::Dropped));
                        return;
                    }
                    continue;
                }
            };

            match classify(response.status, &response.body) {
                Outcome::Success => {
                    let payload = response.json().unwrap_or(Value::Null);
                    self.handlers.dispatch(name, &payload).await;
                    self.set_status(format!("{name} ok"));
                    item.resolve(Ok(payload));
                    return;
                }
                Outcome::TransientBus | Outcome::TransientHttp => {
                    debug!(command = %name, status = response.status, "transient failure");
                    if !self.bump_retry(&mut item.command) {
                        let attempts = item.command.retry_count;
                        item.resolve(Err(CommandError::RetriesExhausted { attempts }));
                        return;
                    }
                    if !self.pause(self.config.retry_delay, cancel).await {
                        item.resolve(Err(CommandError::Dropped));
                        return;
                    }
                }
                Outcome::Reauth => {
                    info!(command = %name, "access token rejected, forcing refresh");
                    if !self.bump_retry(&mut item.command) {
                        let attempts = item.command.retry_count;
                        item.resolve(Err(CommandError::RetriesExhausted { attempts }));
                        return;
                    }
                    if let Err(e) = self.sessions.ensure_valid_session(true).await {
                        warn!(command = %name, error = %e, "forced re-auth failed");
                        item.resolve(Err(CommandError::Auth(e.to_string())));
                        return;
                    }
                }
                Outcome::VehicleGone | Outcome::DeepSleep => {
                    info!(command = %name, status = response.status, "vehicle needs re-resolution");
                    self.vehicle = None;
                    self.awake_confirmed_at = None;
                    match self.re_resolve(cancel).await {
                        Ok(vehicle) => {
                            self.vehicle = Some(vehicle);
                        }
                        Err(e) => {
                            item.resolve(Err(e));
                            return;
                        }
                    }
                    if !self.bump_retry(&mut item.command) {
                        let attempts = item.command.retry_count;
                        item.resolve(Err(CommandError::RetriesExhausted { attempts }));
                        return;
                    }
                }
                Outcome::Fatal => {
                    warn!(
                        command = %name,
                        status = response.status,
                        "command rejected, not retrying"
                    );
                    self.set_status(format!("{name} rejected"));
                    item.resolve(Err(CommandError::Rejected {
                        status: response.status,
                        message: truncate(&response.body, 256),
                    }));
                    return;
                }
            }
        }
    }

    /// One API call for the command, routed by kind.
    async fn execute_call(
        &self,
        command: &Command,
    ) -> Result<crate::ports::ApiResponse, crate::ports::GatewayError> {
        match command.name {
            CommandName::ListVehicles => self.api.list_vehicles().await,
            CommandName::Wake => match self.vehicle.as_ref() {
                Some(vehicle) => self.api.wake(vehicle).await,
                None => Err(crate::ports::GatewayError::Transport(
                    "no vehicle resolved".to_string(),
                )),
            },
            name => match self.vehicle.as_ref() {
                Some(vehicle) => {
                    self.api.execute(vehicle, name, command.params.as_ref()).await
                }
                None => Err(crate::ports::GatewayError::Transport(
                    "no vehicle resolved".to_string(),
                )),
            },
        }
    }

    /// Consume one retry. Returns false when the budget is spent.
    fn bump_retry(&self, command: &mut Command) -> bool {
        command.retry_count += 1;
        if command.retry_count > self.config.max_retries {
            warn!(
                command = %command.name,
                attempts = command.retry_count,
                "retry budget exhausted"
            );
            return false;
        }
        true
    }

    /// Cancellable sleep. Returns false when cancelled.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Bounded re-resolution loop for deep sleep and stale-id cases.
    async fn re_resolve(&mut self, cancel: &CancellationToken) -> Result<VehicleHandle, CommandError> {
        let mut last_error = "no attempts made".to_string();
        for attempt in 1..=self.config.resolve_max_attempts {
            if !self.pause(self.config.resolve_delay, cancel).await {
                return Err(CommandError::Dropped);
            }
            match self.resolve_vehicle().await {
                Ok(vehicle) => return Ok(vehicle),
                Err(e) => {
                    debug!(attempt, error = %e, "re-resolve attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(CommandError::VehicleUnavailable(last_error))
    }

    /// Resolve the target vehicle from the account's vehicle list.
    async fn resolve_vehicle(&self) -> Result<VehicleHandle, CommandError> {
        let response = self
            .api
            .list_vehicles()
            .await
            .map_err(|e| CommandError::VehicleUnavailable(e.to_string()))?;

        if classify(response.status, &response.body) != Outcome::Success {
            return Err(CommandError::VehicleUnavailable(format!(
                "vehicle list returned status {}",
                response.status
            )));
        }

        let payload = response
            .json()
            .ok_or_else(|| CommandError::VehicleUnavailable("unparseable vehicle list".into()))?;
        let vehicles = payload["response"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let chosen = match self.config.vin.as_deref() {
            Some(vin) => vehicles
                .iter()
                .find(|v| v["vin"].as_str() == Some(vin))
                .ok_or_else(|| {
                    CommandError::VehicleUnavailable(format!("vin {vin} not in vehicle list"))
                })?,
            None => vehicles
                .first()
                .ok_or_else(|| CommandError::VehicleUnavailable("no vehicles on account".into()))?,
        };

        let id = match &chosen["id"] {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => {
                return Err(CommandError::VehicleUnavailable(
                    "vehicle entry missing id".into(),
                ))
            }
        };

        Ok(VehicleHandle {
            id,
            vin: chosen["vin"].as_str().unwrap_or_default().to_string(),
            state: chosen["state"].as_str().unwrap_or("unknown").to_string(),
        })
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_settings_converts_durations() {
        let settings = DispatchConfig::default();
        let config = DispatcherConfig::from_settings(&settings, Some("VIN123".to_string()));

        assert_eq!(config.vin.as_deref(), Some("VIN123"));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.wake.max_attempts, 25);
        assert_eq!(config.wake.poll_interval, Duration::from_secs(10));
        assert_eq!(config.drain_policy, DrainPolicy::EntireQueue);
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let long = "x".repeat(500);
        let out = truncate(&long, 256);
        assert_eq!(out.len(), 256);
        assert!(out.ends_with("..."));

        assert_eq!(truncate("short", 256), "short");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        // Two-byte characters: the cap is in characters, never splitting one.
        let long = "é".repeat(300);
        let out = truncate(&long, 256);
        assert_eq!(out.chars().count(), 256);
        assert!(out.ends_with("..."));

        let exactly = "é".repeat(256);
        assert_eq!(truncate(&exactly, 256), exactly);
    }
}
