use std::sync::Arc;
use std::time::Duration;

use agentdesk::{
    config, init_config, init_telemetry, shutdown_telemetry, AgentRunner, Dispatcher,
    EchoModelGateway, Git2Vcs, Hub, HttpModelGateway, ModelGateway, ShutdownCoordinator,
    SqliteStore, Store,
};
use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = init_config() {
        eprintln!("warning: failed to initialize configuration: {e}");
    }

    let settings = config()?;
    if let Err(e) = init_telemetry(&settings.observability.log_level) {
        eprintln!("warning: failed to initialize telemetry: {e}");
    }

    info!("starting agentdesk server");

    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&settings.database.url).await?);
    let vcs = Arc::new(Git2Vcs::new());
    let gateway: Arc<dyn ModelGateway> = match &settings.gateway.endpoint {
        Some(endpoint) => Arc::new(HttpModelGateway::new(endpoint.clone())),
        None => Arc::new(EchoModelGateway),
    };

    let hub = Hub::new();
    let runner = Arc::new(AgentRunner::new(
        store.clone(),
        vcs.clone(),
        gateway,
        hub.clone(),
        Duration::from_secs(settings.gateway.deadline_seconds),
    ));
    let dispatcher = Dispatcher::new(
        store.clone(),
        hub.clone(),
        runner,
        Duration::from_secs(settings.dispatcher.tick_interval_seconds),
    );

    let (coordinator, shutdown_rx) = ShutdownCoordinator::new();

    let dispatcher_handle = {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(rx).await })
    };
    let snapshot_handle = {
        let store = store.clone();
        let hub = hub.clone();
        let interval = Duration::from_secs(settings.dispatcher.snapshot_interval_seconds);
        tokio::spawn(async move { agentdesk::run_snapshot_worker(store, hub, interval, shutdown_rx).await })
    };

    coordinator.wait_for_signal().await;
    coordinator.drain(vec![dispatcher_handle, snapshot_handle], Duration::from_secs(10)).await;

    shutdown_telemetry();
    info!("agentdesk server stopped");
    Ok(())
}
