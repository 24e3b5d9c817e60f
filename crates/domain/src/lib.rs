//! # VoltBridge Domain
//!
//! Business domain types and models for VoltBridge.
//!
//! This crate contains:
//! - Domain data types (Session, VehicleHandle, VehicleStatus)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other VoltBridge crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod session;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use session::*;
pub use types::*;
