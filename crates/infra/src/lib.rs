//! # VoltBridge Infrastructure
//!
//! Impure adapters behind the core port traits:
//! - [`api`]: HTTP gateway to the vendor owner API
//! - [`auth`]: SSO login, token refresh, and session management
//! - [`database`]: SQLite-backed session persistence
//! - [`scheduling`]: adaptive poll scheduler and daily refresh job
//! - [`config`]: configuration loading from environment and files

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod scheduling;

pub use api::{GatewayConfig, VehicleGateway};
pub use auth::{SsoClient, SsoSessionManager};
pub use database::SqliteSessionStore;
pub use scheduling::{PollScheduler, PollSchedulerConfig, SchedulerError};
