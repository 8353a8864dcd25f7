//! Connection/session state machine for the bridge.
//!
//! Lifecycle: arm the last-will, connect, publish the retained "online"
//! marker, subscribe the command set, dispatch inbound URL commands, and let
//! the broker deliver the pre-armed "offline" on an ungraceful drop.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS,
};
use std::time::Duration;
use tabcast_core::{topics, Config, Error, InstanceIdentity, Result, SubscriptionSet};
use tabcast_browser::{DebugSession, NavigationResult};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const ONLINE_PAYLOAD: &str = "online";
pub const OFFLINE_PAYLOAD: &str = "offline";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Seam between the controller and the browser, so the state machine is
/// testable without a live debugger.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, url: &str) -> NavigationResult;
}

#[async_trait]
impl Navigator for DebugSession {
    async fn navigate(&self, url: &str) -> NavigationResult {
        DebugSession::navigate(self, url).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Online,
    Offline,
}

/// Reconnect backoff: doubles up to the cap, reset on a successful CONNACK.
struct Backoff {
    current_ms: u64,
    max_ms: u64,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current_ms: 500,
            max_ms: 30_000,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = (self.current_ms * 2).min(self.max_ms);
        Duration::from_millis(delay)
    }

    fn reset(&mut self) {
        self.current_ms = 500;
    }
}

pub struct BridgeController<N: Navigator> {
    config: Config,
    identity: InstanceIdentity,
    navigator: N,
    subscriptions: SubscriptionSet,
    state: ConnectionState,
}

impl<N: Navigator> BridgeController<N> {
    pub fn new(config: Config, identity: InstanceIdentity, navigator: N) -> Self {
        let subscriptions =
            SubscriptionSet::build(&config.topic_prefix, &config.url_topics, &identity);
        Self {
            config,
            identity,
            navigator,
            subscriptions,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Topic carrying the retained online/offline marker.
    pub fn instance_state_topic(&self) -> String {
        topics::resolve(
            &format!(
                "{}{}",
                self.config.topic_prefix, self.config.instance_state_topic
            ),
            &self.identity,
        )
    }

    /// Topic carrying the retained last-observed URL.
    pub fn url_state_topic(&self) -> String {
        topics::resolve(
            &format!("{}{}", self.config.topic_prefix, self.config.url_state_topic),
            &self.identity,
        )
    }

    /// Broker options for this session. The last-will is armed here, before
    /// any connect is initiated: an ungraceful disconnect must never leave a
    /// stale retained "online" behind.
    pub fn mqtt_options(&self) -> MqttOptions {
        let client_id = format!(
            "tabcast-{}-{}",
            self.identity.hostname, self.identity.instance
        );
        let mut options = MqttOptions::new(
            client_id,
            self.config.broker.host.clone(),
            self.config.broker.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((username, password)) = self.config.credentials() {
            options.set_credentials(username, password);
        }
        options.set_last_will(LastWill::new(
            self.instance_state_topic(),
            OFFLINE_PAYLOAD,
            QoS::AtMostOnce,
            true,
        ));
        options
    }

    /// Drive the session until the shutdown signal fires.
    ///
    /// A failed *initial* connect is fatal and surfaces as `BrokerUnreachable`
    /// so the process exits nonzero; restarting is an operator concern. Once
    /// online, a lost connection is retried with capped exponential backoff,
    /// re-announcing and re-subscribing on every reconnect.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let options = self.mqtt_options();
        info!(
            broker = %format!("{}:{}", self.config.broker.host, self.config.broker.port),
            state_topic = %self.instance_state_topic(),
            "connecting to broker"
        );
        self.state = ConnectionState::Connecting;
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        self.await_connack(&mut eventloop).await?;
        self.announce_and_subscribe(&client).await?;

        let mut backoff = Backoff::new();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("disconnecting");
                    // A graceful exit publishes the marker itself; the armed
                    // last-will only covers ungraceful drops.
                    let _ = client
                        .publish(self.instance_state_topic(), QoS::AtMostOnce, true, OFFLINE_PAYLOAD)
                        .await;
                    let _ = client.disconnect().await;
                    self.state = ConnectionState::Disconnected;
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            info!("reconnected to broker");
                            backoff.reset();
                            self.announce_and_subscribe(&client).await?;
                        } else {
                            warn!(code = ?ack.code, "broker rejected reconnect");
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if let Some(observed) = self.dispatch(&publish.topic, &publish.payload).await {
                            let url_topic = self.url_state_topic();
                            match client
                                .publish(url_topic.clone(), QoS::AtMostOnce, true, observed.clone())
                                .await
                            {
                                Ok(()) => info!(topic = %url_topic, url = %observed, "published url state"),
                                Err(e) => error!(error = %e, "failed to publish url state"),
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.state = ConnectionState::Offline;
                        let delay = backoff.next_delay();
                        warn!(
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "broker connection lost, reconnecting"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {
                                self.state = ConnectionState::Connecting;
                            }
                            _ = shutdown.recv() => {
                                self.state = ConnectionState::Disconnected;
                                break;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Wait for the broker's CONNACK, bounded by the handshake timeout.
    async fn await_connack(&mut self, eventloop: &mut EventLoop) -> Result<()> {
        let handshake = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            return Ok(());
                        }
                        return Err(Error::BrokerUnreachable(format!(
                            "connection rejected: {:?}",
                            ack.code
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Error::BrokerUnreachable(e.to_string())),
                }
            }
        })
        .await;

        match handshake {
            Ok(result) => result,
            Err(_) => Err(Error::BrokerUnreachable(format!(
                "no CONNACK within {}s",
                CONNECT_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Publish the retained "online" marker, then subscribe the command set.
    /// The set is rebuilt here, replacing any prior connection's set.
    async fn announce_and_subscribe(&mut self, client: &AsyncClient) -> Result<()> {
        let state_topic = self.instance_state_topic();
        client
            .publish(state_topic.clone(), QoS::AtMostOnce, true, ONLINE_PAYLOAD)
            .await
            .map_err(|e| Error::BrokerUnreachable(e.to_string()))?;
        info!(topic = %state_topic, "announced online");

        self.subscriptions = SubscriptionSet::build(
            &self.config.topic_prefix,
            &self.config.url_topics,
            &self.identity,
        );
        for topic in self.subscriptions.entries() {
            client
                .subscribe(topic.clone(), QoS::AtMostOnce)
                .await
                .map_err(|e| Error::BrokerUnreachable(e.to_string()))?;
            info!(topic = %topic, "subscribed");
        }
        self.state = ConnectionState::Online;
        Ok(())
    }

    /// Decide and perform the action for one inbound message. Returns the
    /// observed URL to republish, or None when nothing must be published.
    ///
    /// Matching is a single membership test, not a per-entry loop, so a
    /// message landing on colliding subscription entries still navigates
    /// exactly once.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> Option<String> {
        if !self.subscriptions.matches(topic) {
            debug!(topic = %topic, "not a command topic, ignoring");
            return None;
        }

        // The UTF-8 payload is the target URL. No validation here; a bad URL
        // surfaces as a navigation failure.
        let url = String::from_utf8_lossy(payload).into_owned();
        info!(topic = %topic, url = %url, "url command received");

        let result = self.navigator.navigate(&url).await;
        if !result.success {
            warn!(url = %url, "navigation failed, url state left untouched");
            return None;
        }
        result.observed_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct FakeNavigator {
        calls: Arc<Mutex<Vec<String>>>,
        observed: Option<String>,
        success: bool,
    }

    #[async_trait]
    impl Navigator for FakeNavigator {
        async fn navigate(&self, url: &str) -> NavigationResult {
            self.calls.lock().await.push(url.to_string());
            NavigationResult {
                requested_url: url.to_string(),
                observed_url: self.observed.clone(),
                success: self.success,
            }
        }
    }

    fn make_controller(
        success: bool,
        observed: Option<&str>,
    ) -> (BridgeController<FakeNavigator>, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let navigator = FakeNavigator {
            calls: calls.clone(),
            observed: observed.map(String::from),
            success,
        };
        let config = Config::default();
        let identity = InstanceIdentity::new("kiosk-7", 2);
        (BridgeController::new(config, identity, navigator), calls)
    }

    #[test]
    fn state_topics_resolve_with_prefix_and_identity() {
        let (controller, _) = make_controller(true, None);
        assert_eq!(
            controller.instance_state_topic(),
            "tabcast/kiosk-7/2/state/instance"
        );
        assert_eq!(controller.url_state_topic(), "tabcast/kiosk-7/2/state/url");
    }

    #[test]
    fn last_will_is_armed_on_the_options_the_connect_consumes() {
        let (controller, _) = make_controller(true, None);
        let options = controller.mqtt_options();
        let will = options.last_will().expect("last-will must be armed");
        assert_eq!(will.topic, "tabcast/kiosk-7/2/state/instance");
        assert_eq!(will.message.as_ref(), b"offline");
        assert!(will.retain);
        assert_eq!(will.qos, QoS::AtMostOnce);
    }

    #[test]
    fn credentials_are_applied_only_when_both_present() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let navigator = FakeNavigator {
            calls,
            observed: None,
            success: true,
        };
        let mut config = Config::default();
        config.broker.username = Some("bridge".to_string());
        config.broker.password = Some("secret".to_string());
        let controller =
            BridgeController::new(config, InstanceIdentity::new("kiosk-7", 2), navigator);
        let options = controller.mqtt_options();
        assert_eq!(
            options.credentials(),
            Some(("bridge".to_string(), "secret".to_string()))
        );

        let (controller, _) = make_controller(true, None);
        assert!(controller.mqtt_options().credentials().is_none());
    }

    #[tokio::test]
    async fn command_topic_triggers_exactly_one_navigation() {
        let (controller, calls) = make_controller(true, Some("https://new.example/"));
        let observed = controller
            .dispatch("tabcast/kiosk-7/2/url", b"https://new.example/")
            .await;
        assert_eq!(observed.as_deref(), Some("https://new.example/"));
        assert_eq!(*calls.lock().await, vec!["https://new.example/"]);
    }

    #[tokio::test]
    async fn every_fan_out_form_dispatches() {
        let (controller, calls) = make_controller(true, Some("https://new.example/"));
        for topic in [
            "tabcast/kiosk-7/2/url",
            "tabcast/all/2/url",
            "tabcast/kiosk-7/all/url",
            "tabcast/all/all/url",
        ] {
            assert!(controller.dispatch(topic, b"https://x/").await.is_some());
        }
        assert_eq!(calls.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn state_topic_never_triggers_navigation() {
        let (controller, calls) = make_controller(true, Some("https://new.example/"));
        let observed = controller
            .dispatch("tabcast/kiosk-7/2/state/instance", b"online")
            .await;
        assert!(observed.is_none());
        assert!(calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn colliding_entries_navigate_once_per_message() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let navigator = FakeNavigator {
            calls: calls.clone(),
            observed: Some("https://x/".to_string()),
            success: true,
        };
        let mut config = Config::default();
        config.url_topics = vec!["/all/all/url".to_string(), "/all/all/url".to_string()];
        let controller =
            BridgeController::new(config, InstanceIdentity::new("kiosk-7", 2), navigator);

        controller.dispatch("tabcast/all/all/url", b"https://x/").await;
        assert_eq!(calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_navigation_publishes_nothing() {
        let (controller, calls) = make_controller(false, None);
        let observed = controller
            .dispatch("tabcast/kiosk-7/2/url", b"https://down.example/")
            .await;
        assert!(observed.is_none());
        assert_eq!(calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn startup_with_unreachable_broker_is_fatal() {
        // Reserve a port and close it again so the connect is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let navigator = FakeNavigator {
            calls,
            observed: None,
            success: true,
        };
        let mut config = Config::default();
        config.broker.host = "127.0.0.1".to_string();
        config.broker.port = port;
        let controller =
            BridgeController::new(config, InstanceIdentity::new("kiosk-7", 0), navigator);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let err = controller.run(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, Error::BrokerUnreachable(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(30_000));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }
}
