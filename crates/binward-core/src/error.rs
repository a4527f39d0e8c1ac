use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the core.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Everything that can go wrong while auditing one target.
///
/// Policy *violations* are not errors, they are verdict outcomes. This enum
/// only covers failures of the machinery itself, and callers are expected to
/// contain every variant to the target that produced it: a batch never aborts
/// because one binary was unreadable.
#[derive(Debug, Error)]
pub enum AuditError {
    /// No format resolver matched the file's header magic.
    #[error("unsupported binary format: {0}")]
    UnsupportedFormat(PathBuf),

    /// The target carries no usable debug information (no PDB resolvable,
    /// no DWARF sections present). Non-fatal; analysis proceeds with reduced
    /// fidelity or a not-applicable verdict.
    #[error("debug information unavailable: {0}")]
    DebugInfoUnavailable(String),

    /// Debug data was present but could not be decoded. When raised for a
    /// single compilation unit this must be contained to that unit.
    #[error("debug information corrupt: {0}")]
    DebugInfoCorrupt(String),

    /// A split-DWARF skeleton referenced a companion object that could not
    /// be located. Expected in the wild; degrades the unit, never the scan.
    #[error("split debug file missing: {0}")]
    SplitDebugFileMissing(PathBuf),

    /// The policy configuration itself is malformed (unparsable version
    /// string, missing required key). Surfaced distinctly from violations so
    /// operators can tell "policy is broken" from "binary fails policy".
    #[error("policy configuration error: {0}")]
    PolicyConfiguration(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    /// Attach a path to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditError::Io {
            path: path.into(),
            source,
        }
    }
}
