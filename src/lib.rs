//! Browser-facing relay for Coral multi-agent sessions.

pub mod browser;
pub mod config;
pub mod logging;
pub mod questions;
pub mod relay;
pub mod server;
