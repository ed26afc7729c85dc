//! Cross-venue spot arbitrage detection core: quote ingestion, a
//! freshness-bounded quote cache, the scan engine that prices and ranks
//! directional opportunities, and the execution worker pool that dispatches
//! them to venue executors. See `SPEC_FULL.md` for the full requirements
//! this crate implements and `DESIGN.md` for the grounding ledger.

pub mod cache;
pub mod config;
pub mod engine;
pub mod execution;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod symbol;
pub mod venue;
