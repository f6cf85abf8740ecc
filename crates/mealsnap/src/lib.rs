//! Mealsnap core library — image normalization, resilient remote calls, and
//! Telegram ingestion (webhook or long-poll) used by the food-photo analysis host.

pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod image;
pub mod ingest;
pub mod processor;
pub mod retry;
pub mod tunnel;
pub mod workflow;

pub use error::Error;
