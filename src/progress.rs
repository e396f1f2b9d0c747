//! Progress-callback trait for batch normalisation events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::NormalizeConfigBuilder::progress_callback`] to receive
//! events as [`crate::rewrite::normalize_batch`] works through its documents.
//!
//! # Example
//!
//! ```rust
//! use fignorm::{BatchProgressCallback, NormalizeConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FigureCounter {
//!     figures: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for FigureCounter {
//!     fn on_document_complete(&self, _index: usize, _path: &Path, figures: usize) {
//!         self.figures.fetch_add(figures, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(FigureCounter { figures: AtomicUsize::new(0) });
//!
//! let config = NormalizeConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the batch driver as it processes each document.
///
/// Documents are processed concurrently, so `on_document_*` methods may be
/// called from different tasks at once and out of input order. All methods
/// have default no-op implementations.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is read.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document is read.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position of the document in the batch
    /// * `input`: source path
    fn on_document_start(&self, index: usize, input: &Path) {
        let _ = (index, input);
    }

    /// Called when a document and its audit log have been written.
    ///
    /// # Arguments
    /// * `figures`: number of figure blocks normalised in this document
    fn on_document_complete(&self, index: usize, input: &Path, figures: usize) {
        let _ = (index, input, figures);
    }

    /// Called when a document fails (I/O or encoding error).
    fn on_document_error(&self, index: usize, input: &Path, error: &str) {
        let _ = (index, input, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let _ = (total_documents, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::NormalizeConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
