use spraypaint_core::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("worker {worker} panicked in round {round}")]
    WorkerPanicked { round: u64, worker: u16 },
}
