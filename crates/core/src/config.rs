use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::Paths;
use crate::topics;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    /// Opaque pass-through credentials; applied only when both are set.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Prepended to every topic template before resolution.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default)]
    pub instance: u32,
    #[serde(default = "default_debugger_port")]
    pub debugger_port: u16,
    /// Template of the retained online/offline marker topic.
    #[serde(default = "default_instance_state_topic")]
    pub instance_state_topic: String,
    /// Template of the retained last-observed-URL topic.
    #[serde(default = "default_url_state_topic")]
    pub url_state_topic: String,
    /// Command topic templates. When set, this replaces the four-way default
    /// set wholesale.
    #[serde(default = "default_url_topics")]
    pub url_topics: Vec<String>,
}

fn default_topic_prefix() -> String {
    "tabcast".to_string()
}

fn default_debugger_port() -> u16 {
    9222
}

fn default_instance_state_topic() -> String {
    topics::DEFAULT_INSTANCE_STATE_TOPIC.to_string()
}

fn default_url_state_topic() -> String {
    topics::DEFAULT_URL_STATE_TOPIC.to_string()
}

fn default_url_topics() -> Vec<String> {
    topics::DEFAULT_URL_TOPICS.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            topic_prefix: default_topic_prefix(),
            instance: 0,
            debugger_port: default_debugger_port(),
            instance_state_topic: default_instance_state_topic(),
            url_state_topic: default_url_state_topic(),
            url_topics: default_url_topics(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Username/password pair, only when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.broker.username, &self.broker.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}
