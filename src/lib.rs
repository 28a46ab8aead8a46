//! Call Broker — call-control webhooks and client identity for in-app voice.

pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod ncco;
pub mod roster;
pub mod routing;
pub mod server;
pub mod session;
pub mod token;
