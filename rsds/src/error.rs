use std::path::PathBuf;

use thiserror::Error;

/// Error kinds raised by the simulator
///
/// All kinds except `DegenerateFragment` abort the run.  A degenerate
/// fragment only causes the affected transcript to be skipped.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Reference index {} not found or unreadable", .0.display())]
    MissingIndex(PathBuf),

    #[error("Malformed index line {line} in {}: {reason}", .path.display())]
    MalformedIndexLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Fragment length {length} does not fit in transcript {id} of length {seq_len}")]
    DegenerateFragment {
        id: String,
        length: usize,
        seq_len: usize,
    },

    #[error("No usable abundance input: {0}")]
    EmptyAbundanceInput(String),

    #[error("Exactly one of single-end or paired-end mode must be selected")]
    ConfigurationConflict,

    #[error("Malformed model file {}: {reason}", .path.display())]
    MalformedModel { path: PathBuf, reason: String },
}
