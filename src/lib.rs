//! Cross-DEX flash-loan arbitrage engine.
//!
//! Nine components, each owning one stage of a scan-evaluate-plan-submit
//! cycle: `chain` (RPC transport, nonces, rate limiting), `adapters`
//! (per-protocol swap math), `registry` (pool discovery/cache/cooldown),
//! `scanner` (concurrent quote fan-out), `pathfinder` (cycle search),
//! `evaluator` (profitability + amount sizing), `planner` (flash-loan
//! call-sequence construction + simulation), `submission` (MEV-protected
//! bundle relay), `orchestrator` (the main loop tying them together).

pub mod adapters;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod decimal;
pub mod error;
pub mod evaluator;
pub mod orchestrator;
pub mod pathfinder;
pub mod planner;
pub mod registry;
pub mod scanner;
pub mod submission;
pub mod telemetry;
pub mod types;

pub use config::BotConfig;
pub use error::{EngineError, EngineResult};
