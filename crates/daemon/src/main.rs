//! VoltBridge daemon.
//!
//! Wires the infrastructure adapters into the core dispatcher and scheduler,
//! then runs until interrupted. Shutdown order matters: the scheduler stops
//! first so no new polls are submitted while the dispatcher drains.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use voltbridge_core::ports::{
    AccessTokenProvider, CommandSink, SessionManager, VehicleApi, VehicleStateSink,
};
use voltbridge_core::{CommandDispatcher, DispatcherConfig, HandlerRegistry, SharedVehicleState};
use voltbridge_infra::auth::sso::SsoConfig;
use voltbridge_infra::{
    config, GatewayConfig, PollScheduler, PollSchedulerConfig, SqliteSessionStore, SsoClient,
    SsoSessionManager, VehicleGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load().context("failed to load configuration")?;
    info!(vin = ?cfg.vehicle.vin, db = %cfg.database.path, "configuration loaded");

    let store = SqliteSessionStore::new(&cfg.database.path, cfg.database.pool_size)
        .context("failed to open session store")?;

    let sso = SsoClient::new(SsoConfig {
        base_url: cfg.auth.sso_base_url.clone(),
        ..SsoConfig::default()
    })
    .context("failed to build SSO client")?;

    let sessions = Arc::new(SsoSessionManager::new(sso, Arc::new(store), cfg.auth.clone()));
    if let Err(e) = sessions.initialize().await {
        warn!(error = %e, "could not restore persisted session, starting cold");
    }

    let tokens: Arc<dyn AccessTokenProvider> = sessions.clone();
    let gateway = VehicleGateway::new(
        GatewayConfig { base_url: cfg.auth.api_base_url.clone(), ..GatewayConfig::default() },
        tokens,
    )
    .context("failed to build vehicle gateway")?;
    let api: Arc<dyn VehicleApi> = Arc::new(gateway);

    let state = Arc::new(SharedVehicleState::new());
    let sink: Arc<dyn VehicleStateSink> = state.clone();
    let handlers = Arc::new(HandlerRegistry::standard(sink.clone()));

    let sessions_dyn: Arc<dyn SessionManager> = sessions.clone();
    let mut dispatcher = CommandDispatcher::new(
        api,
        sessions_dyn,
        handlers,
        sink.clone(),
        DispatcherConfig::from_settings(&cfg.dispatch, cfg.vehicle.vin.clone()),
    );
    dispatcher.start().map_err(anyhow::Error::msg)?;

    let mut status_rx = dispatcher.status();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            info!(%status, "dispatcher");
        }
    });

    let commands: Arc<dyn CommandSink> = Arc::new(dispatcher.handle());
    let mut scheduler = PollScheduler::new(
        sink,
        commands,
        PollSchedulerConfig::new(
            cfg.polling.clone(),
            cfg.vehicle.vin.clone(),
            cfg.vehicle.auto_install_updates,
        ),
    );
    scheduler.start().await.context("failed to start poll scheduler")?;

    info!("voltbridge running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    if let Err(e) = scheduler.stop().await {
        warn!(error = %e, "poll scheduler did not stop cleanly");
    }
    if let Err(e) = dispatcher.stop().await {
        warn!(error = %e, "dispatcher did not stop cleanly");
    }

    info!("voltbridge stopped");
    Ok(())
}
