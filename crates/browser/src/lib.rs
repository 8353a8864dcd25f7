//! Remote-debugging adapter: target discovery over the DevTools HTTP endpoint
//! and navigation over a per-command WebSocket control channel.

pub mod cdp;
pub mod debugger;

pub use cdp::ControlChannel;
pub use debugger::{DebugSession, DebugTarget, NavigationResult};
