// Failover injection for clustered benchmark runs: an immutable
// configuration of control endpoints plus a client that broadcasts
// control commands to them over an administrative side-channel.
pub mod client;
pub mod config;

pub use client::{ClientError, FailoverControlClient};
pub use config::{ConfigError, FailoverConfig};
