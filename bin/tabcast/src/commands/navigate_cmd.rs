use std::path::PathBuf;
use tabcast_browser::DebugSession;

/// One-shot navigation through the local debugger, bypassing the bus.
pub async fn run(
    url: &str,
    debugger_port: Option<u16>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let port = debugger_port.unwrap_or(config.debugger_port);

    let session = DebugSession::new(port);
    let result = session.navigate(url).await;

    if result.success {
        println!(
            "✅ now showing {}",
            result.observed_url.as_deref().unwrap_or(url)
        );
        Ok(())
    } else {
        anyhow::bail!(
            "navigation failed — make sure the browser is running with --remote-debugging-port={}",
            port
        );
    }
}
