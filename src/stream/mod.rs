//! Stream module - launch and trade ingest
//!
//! A WebSocket client feeds pool and price events into the strategy task
//! and follows the engine's track/untrack requests so only admitted mints
//! stream trades.

pub mod portal;

pub use portal::{PortalClient, RawLaunchEvent, RawTradeEvent, SubscriptionMessage};
