//! Error types for the fignorm library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`NormalizeError`]: **Fatal**: the document cannot be processed at all
//!   (unreadable source, non-UTF-8 bytes, unwritable destination, invalid
//!   configuration). Returned as `Err(NormalizeError)` from the file-level
//!   entry points.
//!
//! * [`BlockIssue`]: **Non-fatal**: one candidate span could not be
//!   normalised (for example a figure without `\includegraphics`). The span is
//!   left verbatim in the output and the issue is recorded in the
//!   [`crate::output::AuditLog`] so the rest of the document still goes
//!   through.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fignorm library.
///
/// Per-block failures use [`BlockIssue`] and are stored in the audit log
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum NormalizeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other read failure.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its contents are not valid UTF-8.
    #[error("Source file '{path}' is not valid UTF-8 (first bad byte at offset {offset})")]
    NotUtf8 { path: PathBuf, offset: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the rewritten document or the audit log.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another document of the same batch writes to this path.
    #[error("Output path '{path}' is shared with another document in the batch\nUse distinct file names or separate output directories.")]
    OutputConflict { path: PathBuf },

    /// The audit log could not be serialised.
    #[error("Failed to serialise audit log: {0}")]
    LogSerialisation(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem with a single candidate span.
///
/// Stored in [`crate::output::SkippedSpan`] when a span is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockIssue {
    /// The span has no `\includegraphics` command, or only an empty path.
    #[error("span {ordinal} at byte {offset}: no image-inclusion command")]
    MissingImage { ordinal: usize, offset: usize },

    /// The span overlaps an earlier one or its text does not match the
    /// source at its offset, so it cannot be spliced.
    #[error("span {ordinal} at byte {offset}: overlaps an earlier span or does not match the source")]
    Unspliceable { ordinal: usize, offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_display() {
        let issue = BlockIssue::MissingImage {
            ordinal: 2,
            offset: 120,
        };
        let msg = issue.to_string();
        assert!(msg.contains("span 2"), "got: {msg}");
        assert!(msg.contains("byte 120"), "got: {msg}");
    }

    #[test]
    fn block_issue_serialises_with_kind_tag() {
        let issue = BlockIssue::MissingImage {
            ordinal: 1,
            offset: 0,
        };
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains(r#""kind":"missing_image""#), "got: {json}");
    }

    #[test]
    fn not_utf8_display() {
        let e = NormalizeError::NotUtf8 {
            path: PathBuf::from("paper/main.tex"),
            offset: 17,
        };
        assert!(e.to_string().contains("main.tex"));
        assert!(e.to_string().contains("offset 17"));
    }

    #[test]
    fn invalid_config_display() {
        let e = NormalizeError::InvalidConfig("target width must be in (0, 1]".into());
        assert!(e.to_string().starts_with("Invalid configuration"));
    }
}
