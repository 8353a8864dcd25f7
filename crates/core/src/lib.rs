pub mod config;
pub mod error;
pub mod paths;
pub mod topics;

pub use config::{BrokerConfig, Config};
pub use error::{Error, Result};
pub use paths::Paths;
pub use topics::{InstanceIdentity, SubscriptionSet};
