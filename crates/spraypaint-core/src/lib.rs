//! Provenance painting and corruption forensics.
//!
//! Buffers are painted with owner-specific byte patterns. Later scans prove
//! from raw bytes alone whether a region still belongs to its owner, which
//! owner produced any corrupted bytes, and how the corruption is shaped.
//!
//! # Architecture
//!
//! - **Color format** (`color`): tagged color bytes and provenance cracking
//! - **Two-color codec** (`two_color`): paint, match, and CRT-based identify
//! - **Summarizer** (`summarizer`): range coalescing, histograms, attribution, squelch
//! - **Verifier** (`verifier`): full-buffer scan discipline feeding a tracker
//! - **Sink** (`sink`): where diagnostics go; the core performs no I/O
//! - **Configuration** (`config`): squelch and confidence thresholds
//! - **Metrics** (`metrics`): atomic counters for observability

pub mod color;
pub mod config;
pub mod error;
pub mod metrics;
pub mod sink;
pub mod summarizer;
pub mod two_color;
pub mod verifier;

pub use color::{Color, CrackedColor, Provenance, crack_color};
pub use config::TrackerConfig;
pub use error::CodecError;
pub use metrics::CodecMetrics;
pub use sink::{Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, NullSink};
pub use summarizer::{Attribution, CorruptionTracker, Indiscretion, RangeSummary, ScanReport};
pub use two_color::{IdentityRecord, Owner, PERIOD, color, color_match, identify, paint};
pub use verifier::{ScanLabel, Verifier};
