//! The bridge lifecycle: connect, announce liveness, subscribe, dispatch URL
//! commands to the browser, republish the observed result.

pub mod controller;

pub use controller::{
    BridgeController, ConnectionState, Navigator, OFFLINE_PAYLOAD, ONLINE_PAYLOAD,
};
