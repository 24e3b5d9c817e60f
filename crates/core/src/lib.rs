//! # VoltBridge Core
//!
//! Coordination logic for the vehicle gateway: command catalog and queue
//! semantics, wake-up orchestration, retry classification, response handling,
//! and the adaptive polling policy.
//!
//! ## Architecture
//! - Depends only on `voltbridge-domain` and external crates
//! - All I/O goes through the port traits in [`ports`]; adapters live in the
//!   infra crate
//! - The dispatcher owns the single-in-flight guarantee: one command talks to
//!   the vehicle at a time, in submission order

pub mod command;
pub mod dispatch;
pub mod handlers;
pub mod polling;
pub mod ports;
pub mod retry;
pub mod state;
pub mod wake;

pub use command::{Command, CommandError, CommandName, CommandResult};
pub use dispatch::{CommandDispatcher, DispatchHandle, DispatcherConfig};
pub use handlers::{HandlerRegistry, ResponseHandler};
pub use polling::{evaluate, refresh_due, PollCategory, PollDecision};
pub use ports::{
    AccessTokenProvider, ApiResponse, AuthError, CommandSink, GatewayError, SessionManager,
    SessionStore, VehicleApi, VehicleStateSink,
};
pub use retry::{classify, Outcome};
pub use state::SharedVehicleState;
pub use wake::{WakeController, WakeOutcome};
