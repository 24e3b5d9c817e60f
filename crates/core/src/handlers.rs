//! Per-command response handling.
//!
//! After a command succeeds its response payload is routed to a handler.
//! Data commands feed the vehicle state sink; everything else just logs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::command::CommandName;
use crate::ports::VehicleStateSink;

/// Processes the successful response of one command kind.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn handle(&self, name: CommandName, payload: &Value);
}

/// Routes successful responses to registered handlers, falling back to a
/// default for commands without one.
pub struct HandlerRegistry {
    by_name: HashMap<CommandName, Arc<dyn ResponseHandler>>,
    default: Arc<dyn ResponseHandler>,
}

impl HandlerRegistry {
    /// Registry with the standard wiring: telemetry payloads feed the state
    /// sink, everything else logs.
    #[must_use]
    pub fn standard(sink: Arc<dyn VehicleStateSink>) -> Self {
        let mut registry = Self::with_default(Arc::new(LogHandler));
        let data_handler = Arc::new(VehicleDataHandler { sink });
        registry.register(CommandName::VehicleData, data_handler);
        registry
    }

    #[must_use]
    pub fn with_default(default: Arc<dyn ResponseHandler>) -> Self {
        Self { by_name: HashMap::new(), default }
    }

    pub fn register(&mut self, name: CommandName, handler: Arc<dyn ResponseHandler>) {
        self.by_name.insert(name, handler);
    }

    /// Dispatch a successful response payload.
    pub async fn dispatch(&self, name: CommandName, payload: &Value) {
        match self.by_name.get(&name) {
            Some(handler) => handler.handle(name, payload).await,
            None => self.default.handle(name, payload).await,
        }
    }
}

/// Feeds full vehicle data payloads into the state sink.
struct VehicleDataHandler {
    sink: Arc<dyn VehicleStateSink>,
}

#[async_trait]
impl ResponseHandler for VehicleDataHandler {
    async fn handle(&self, name: CommandName, payload: &Value) {
        if let Err(e) = self.sink.apply_vehicle_data(payload).await {
            warn!(command = %name, error = %e, "failed to apply vehicle data");
        }
    }
}

/// Default handler: record that the command completed.
struct LogHandler;

#[async_trait]
impl ResponseHandler for LogHandler {
    async fn handle(&self, name: CommandName, _payload: &Value) {
        debug!(command = %name, "command completed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use voltbridge_domain::{Result as DomainResult, VehicleStatus};

    use super::*;

    struct CountingSink {
        applied: AtomicU32,
    }

    #[async_trait]
    impl VehicleStateSink for CountingSink {
        async fn apply_vehicle_data(&self, _payload: &Value) -> DomainResult<()> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn current_status(&self) -> VehicleStatus {
            VehicleStatus::default()
        }
    }

    #[tokio::test]
    async fn vehicle_data_reaches_the_sink() {
        let sink = Arc::new(CountingSink { applied: AtomicU32::new(0) });
        let registry = HandlerRegistry::standard(sink.clone());

        let payload = serde_json::json!({"charge_state": {"battery_level": 72}});
        registry.dispatch(CommandName::VehicleData, &payload).await;
        registry.dispatch(CommandName::HonkHorn, &payload).await;

        assert_eq!(sink.applied.load(Ordering::SeqCst), 1);
    }
}
