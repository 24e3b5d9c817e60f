//! Port traits implemented by infrastructure adapters.
//!
//! The coordination logic in this crate is written entirely against these
//! traits so tests can substitute scripted fakes for the network and the
//! session store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use voltbridge_domain::{Result as DomainResult, Session, VehicleHandle, VehicleStatus};

use crate::command::{CommandName, CommandResult};

/// Raw HTTP outcome from the vehicle gateway.
///
/// The gateway performs no triage: any response that made it over the wire
/// comes back as status plus body, and classification happens in
/// [`crate::retry::classify`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Parse the body as JSON, tolerating empty bodies.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Transport-level failure: the request never produced an HTTP response.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Authentication failures surfaced by the session manager.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("no credentials configured")]
    MissingCredentials,

    #[error("login step '{step}' failed with status {status}: {message}")]
    LoginStep { step: String, status: u16, message: String },

    #[error("token refresh rejected with status {status}: {message}")]
    RefreshRejected { status: u16, message: String },

    #[error("network error during authentication: {0}")]
    Network(String),

    #[error("session storage error: {0}")]
    Storage(String),
}

/// Outbound calls to the vendor vehicle API.
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// List vehicles on the account.
    async fn list_vehicles(&self) -> Result<ApiResponse, GatewayError>;

    /// Send the wake signal to a vehicle.
    async fn wake(&self, vehicle: &VehicleHandle) -> Result<ApiResponse, GatewayError>;

    /// Cheap connectivity probe: is the vehicle online right now?
    async fn is_awake(&self, vehicle: &VehicleHandle) -> Result<bool, GatewayError>;

    /// Execute a named command against a vehicle.
    async fn execute(
        &self,
        vehicle: &VehicleHandle,
        name: CommandName,
        params: Option<&Value>,
    ) -> Result<ApiResponse, GatewayError>;
}

/// Session lifecycle: guarantees a usable access token before API calls.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Ensure a valid session exists, refreshing or re-logging-in as needed.
    ///
    /// With `force` set the cached session is discarded and a full
    /// credential login runs, skipping the refresh exchange, even if the
    /// current token looks valid.
    async fn ensure_valid_session(&self, force: bool) -> Result<Session, AuthError>;
}

/// Read access to the current bearer token, used by the gateway per request.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Current access token, or `None` before the first login completes.
    async fn access_token(&self) -> Option<String>;
}

/// Durable persistence for the authenticated session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> DomainResult<Option<Session>>;
    async fn save(&self, session: &Session) -> DomainResult<()>;
    async fn clear(&self) -> DomainResult<()>;
}

/// Consumer of full vehicle telemetry payloads and awake transitions.
#[async_trait]
pub trait VehicleStateSink: Send + Sync {
    /// Ingest a full vehicle data payload.
    async fn apply_vehicle_data(&self, payload: &Value) -> DomainResult<()>;

    /// Snapshot of the activity flags derived from ingested payloads.
    async fn current_status(&self) -> VehicleStatus;

    /// The vehicle was observed online. `prompted` is true when we sent the
    /// wake signal ourselves.
    async fn note_awake(&self, prompted: bool) {
        let _ = prompted;
    }

    /// The vehicle was observed asleep or offline.
    async fn note_asleep(&self) {}
}

/// Submission side of the command queue.
///
/// Object safe so the polling scheduler can hold `Arc<dyn CommandSink>` and
/// tests can count submissions without a live dispatcher.
pub trait CommandSink: Send + Sync {
    /// Enqueue a command; the receiver resolves exactly once with its
    /// terminal result.
    fn submit(&self, name: CommandName, params: Option<Value>) -> oneshot::Receiver<CommandResult>;
}
