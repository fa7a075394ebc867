use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl AccessError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AccessError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        AccessError::Parse {
            what,
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AccessError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("sampler did not stop within {0:?}")]
    JoinTimeout(Duration),

    #[error("sampler worker panicked")]
    WorkerPanicked,
}
