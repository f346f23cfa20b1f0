//! Tooling around the spraypaint core.
//!
//! This crate provides:
//! - Structured logging: JSONL diagnostics, schema validation, artifact index
//! - Fault injection: deterministic damage to painted buffers
//! - Soak driver: rounds of workers inheriting, repainting and checking buffers
//! - The `harness` CLI wrapping all of the above

#![forbid(unsafe_code)]

pub mod error;
pub mod fault;
pub mod soak;
pub mod structured_log;

pub use error::HarnessError;
pub use fault::{Fault, FaultPlan, XorShift64};
pub use soak::{SoakConfig, SoakSummary, run_soak};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, StreamKind};
