//! HTTP surface: health endpoint, Telegram webhook endpoint, and the host
//! entry point that wires config, ingestion, and graceful shutdown together.

mod server;

pub use server::{router, run_server, AppState};
