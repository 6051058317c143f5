use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FurrowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open temp work file {path}: {source}")]
    TempFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open plot file {path}: {source}")]
    PlotFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("temp work files have differing block sizes (expected {expected}, actual {actual})")]
    BlockSizeMismatch { expected: usize, actual: usize },
    #[error("invalid temp file block size {0}")]
    InvalidBlockSize(usize),
    #[error("allocation of {requested} bytes exceeds work heap capacity of {capacity}")]
    AllocTooLarge { requested: usize, capacity: usize },
    #[error("cannot rebind the work heap while {live} allocations are live")]
    HeapNotIdle { live: usize },
    #[error("bit stream size {0} is not a multiple of 64")]
    UnalignedBitStream(usize),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FurrowError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FurrowError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
