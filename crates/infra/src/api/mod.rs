//! Vendor API transport.

pub mod catalog;
pub mod gateway;

pub use gateway::{GatewayConfig, VehicleGateway};
