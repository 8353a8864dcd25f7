//! Target discovery and the per-navigation debug session.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tabcast_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::cdp::ControlChannel;

const LOAD_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One page/tab context exposed by the debugging endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTarget {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Outcome of one navigation attempt; discarded after the state publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResult {
    pub requested_url: String,
    pub observed_url: Option<String>,
    pub success: bool,
}

impl NavigationResult {
    fn failed(requested_url: &str) -> Self {
        Self {
            requested_url: requested_url.to_string(),
            observed_url: None,
            success: false,
        }
    }
}

/// Talks to the browser's remote-debugging endpoint. Owns no persistent
/// connection; one control channel is opened per navigation and never held
/// across inbound commands.
pub struct DebugSession {
    endpoint: String,
    http: reqwest::Client,
    load_timeout: Duration,
}

impl DebugSession {
    pub fn new(debugger_port: u16) -> Self {
        Self::with_endpoint(format!("http://127.0.0.1:{}", debugger_port))
    }

    /// Point the session at an explicit endpoint base (no trailing slash).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            load_timeout: LOAD_EVENT_TIMEOUT,
        }
    }

    /// Query the target list. A network failure, a malformed body, and an
    /// empty list all collapse into `DebuggerUnreachable`: the remedy is the
    /// same, start the browser with remote debugging enabled on this port.
    pub async fn targets(&self) -> Result<Vec<DebugTarget>> {
        let url = format!("{}/json", self.endpoint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::DebuggerUnreachable(e.to_string()))?;
        let targets: Vec<DebugTarget> = response
            .json()
            .await
            .map_err(|e| Error::DebuggerUnreachable(e.to_string()))?;
        if targets.is_empty() {
            return Err(Error::DebuggerUnreachable(
                "no debug targets exposed".to_string(),
            ));
        }
        Ok(targets)
    }

    /// The control-channel address of the active page target.
    pub async fn active_target(&self) -> Result<DebugTarget> {
        let mut targets = self.targets().await?;
        let target = targets.remove(0);
        if target.web_socket_debugger_url.is_none() {
            return Err(Error::DebuggerUnreachable(
                "target exposes no webSocketDebuggerUrl".to_string(),
            ));
        }
        Ok(target)
    }

    /// Fresh re-query of the first target's page URL.
    pub async fn current_url(&self) -> Result<String> {
        let targets = self.targets().await?;
        Ok(targets[0].url.clone())
    }

    /// Drive one navigation: discover the target, issue the commands, read
    /// back the resulting URL. A single attempt per inbound command; failures
    /// are reported in the result, never retried here.
    pub async fn navigate(&self, url: &str) -> NavigationResult {
        let target = match self.active_target().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "debugger not reachable, skipping navigation");
                return NavigationResult::failed(url);
            }
        };

        if let Err(e) = self.drive(&target, url).await {
            warn!(error = %e, url = %url, "navigation command failed");
            return NavigationResult::failed(url);
        }

        match self.current_url().await {
            Ok(observed) => {
                info!(url = %observed, "navigation verified");
                NavigationResult {
                    requested_url: url.to_string(),
                    observed_url: Some(observed),
                    success: true,
                }
            }
            Err(e) => {
                warn!(error = %e, "could not read back the page url");
                NavigationResult::failed(url)
            }
        }
    }

    async fn drive(&self, target: &DebugTarget, url: &str) -> Result<()> {
        let ws_url = target.web_socket_debugger_url.as_deref().ok_or_else(|| {
            Error::DebuggerUnreachable("target exposes no webSocketDebuggerUrl".to_string())
        })?;

        let channel = ControlChannel::open(ws_url).await?;
        let mut load_events = channel.subscribe("Page.loadEventFired").await;

        channel.command("Page.enable", json!({})).await?;
        channel.command("Page.navigate", json!({ "url": url })).await?;

        // Wait for the load event so the read-back observes the new page, not
        // the previous one. On timeout fall through and read anyway.
        if tokio::time::timeout(self.load_timeout, load_events.recv())
            .await
            .is_err()
        {
            debug!(
                timeout_ms = self.load_timeout.as_millis() as u64,
                "load event not seen, reading url anyway"
            );
        }
        Ok(())
    }
}
