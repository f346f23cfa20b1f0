//! Tracker configuration.
//!
//! Both knobs can be overridden through the environment:
//! - `SPRAYPAINT_SPEW_LIMIT`: lifetime fail count at which per-mismatch
//!   detail text is squelched (default 600).
//! - `SPRAYPAINT_CONFIDENCE`: a range's resolved run must be longer than
//!   this to be called a cross-owner indiscretion (default 6).
//!
//! Unparseable values fall back to the defaults.

use std::sync::OnceLock;

/// Default squelch threshold.
pub const DEFAULT_SPEW_LIMIT: u64 = 600;

/// Default indiscretion confidence threshold, in bytes.
pub const DEFAULT_CONFIDENCE_THRESHOLD: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Per-mismatch text stops once a tracker's lifetime fail count reaches this.
    pub spew_limit: u64,
    /// Minimum exclusive run length for an indiscretion.
    pub confidence_threshold: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            spew_limit: DEFAULT_SPEW_LIMIT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl TrackerConfig {
    #[must_use]
    pub fn with_spew_limit(mut self, spew_limit: u64) -> Self {
        self.spew_limit = spew_limit;
        self
    }

    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: usize) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Build from explicit variable values, as read from the environment.
    #[must_use]
    pub fn from_vars(spew_limit: Option<&str>, confidence: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            spew_limit: spew_limit
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.spew_limit),
            confidence_threshold: confidence
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.confidence_threshold),
        }
    }

    /// Read `SPRAYPAINT_SPEW_LIMIT` and `SPRAYPAINT_CONFIDENCE`.
    #[must_use]
    pub fn from_env() -> Self {
        let spew_limit = std::env::var("SPRAYPAINT_SPEW_LIMIT").ok();
        let confidence = std::env::var("SPRAYPAINT_CONFIDENCE").ok();
        Self::from_vars(spew_limit.as_deref(), confidence.as_deref())
    }
}

static GLOBAL_CONFIG: OnceLock<TrackerConfig> = OnceLock::new();

/// Process-wide configuration (reads the environment on first call, caches thereafter).
#[must_use]
pub fn tracker_config() -> TrackerConfig {
    *GLOBAL_CONFIG.get_or_init(TrackerConfig::from_env)
}
