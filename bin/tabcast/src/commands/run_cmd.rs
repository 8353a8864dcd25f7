use std::path::PathBuf;
use tabcast_bridge::BridgeController;
use tabcast_browser::DebugSession;
use tabcast_core::InstanceIdentity;
use tokio::sync::broadcast;
use tracing::info;

/// Run the bridge daemon until interrupted. A failed initial broker connect
/// surfaces as an error, so the process exits nonzero; restarting is the
/// operator's responsibility.
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let identity = InstanceIdentity::detect(config.instance);
    info!(
        hostname = %identity.hostname,
        instance = identity.instance,
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        debugger_port = config.debugger_port,
        "starting bridge"
    );

    let session = DebugSession::new(config.debugger_port);
    let controller = BridgeController::new(config, identity, session);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    controller.run(shutdown_rx).await?;
    Ok(())
}
