use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

/// Run-fatal errors.
///
/// Everything else in the pipeline (codec attempt failures, per-entry
/// exhaustion, ledger write problems) is captured as a record or a warning
/// and never aborts the run; these variants are the only way a run ends
/// without a summary.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to enumerate playlist: {0}")]
    Enumeration(#[source] EngineError),

    #[error("playlist contained no entries")]
    EmptyPlaylist,

    #[error("failed to create destination directory {path}: {source}")]
    Destination {
        path: PathBuf,
        source: std::io::Error,
    },
}
