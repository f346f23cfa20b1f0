//! Error types for codec inputs supplied by callers.
//!
//! Corruption itself is never an error: it is reported through the
//! provenance taxonomy and the diagnostic sink. These errors only cover
//! arguments that cannot name a valid owner or phase.

use thiserror::Error;

use crate::two_color::{IDENTITY_SPACE, PERIOD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("identity {identity} is outside the owner space [0, {space})", space = IDENTITY_SPACE)]
    IdentityOutOfRange { identity: u32 },
    #[error("phase {phase} is not reduced modulo {period}", period = PERIOD)]
    InvalidPhase { phase: usize },
}
