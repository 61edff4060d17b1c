//! HTTP adapter that lets external-dns drive a DNS backend through the
//! webhook plugin protocol.

pub mod app;
pub mod config;
pub mod dns;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod memory;
pub mod pdns;
pub mod provider;
pub mod server;
pub mod telemetry;

pub use app::{build_router, AppState};
pub use provider::{Provider, ProviderError};
