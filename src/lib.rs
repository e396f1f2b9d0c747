//! # fignorm
//!
//! Normalise figure blocks in LaTeX sources.
//!
//! Converted or hand-edited papers tend to carry figures in every possible
//! state: commented out line by line, missing their `\end{figure}`, with
//! ad-hoc widths, multi-line captions, or no environment at all. This crate
//! rewrites each such block into one canonical, active form and leaves every
//! other byte of the document untouched:
//!
//! ```text
//! \begin{figure}
//! \centering
//! \includegraphics[width=0.8\textwidth]{figs/plot.png}
//! \caption{Results on the test set.}
//! \label{fig:plot}
//! \end{figure}
//! ```
//!
//! ## Pipeline Overview
//!
//! ```text
//! source
//!  │
//!  ├─ 1. Scan      candidate spans (explicit, inferred end, bare)
//!  ├─ 2. Extract   image path, declared width, caption, label
//!  ├─ 3. Sanitize  caption onto one trimmed line
//!  ├─ 4. Render    canonical block at the target width
//!  └─ 5. Splice    rewritten document + audit log
//! ```
//!
//! A span that cannot be normalised (no `\includegraphics`) stays verbatim
//! and is listed in the audit log; it never aborts the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fignorm::{normalize_file, NormalizeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NormalizeConfig::default();
//!     let stats = normalize_file(
//!         "paper/main.tex",
//!         "paper/main.normalized.tex",
//!         "paper/main.figures.log",
//!         &config,
//!     )
//!     .await?;
//!     eprintln!("{} figure(s) normalised", stats.processed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fignorm` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fignorm = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod rewrite;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LogFormat, NormalizeConfig, NormalizeConfigBuilder, DEFAULT_TARGET_WIDTH};
pub use error::{BlockIssue, NormalizeError};
pub use output::{AuditEntry, AuditLog, NormalizeOutput, NormalizeStats, SkippedSpan};
pub use pipeline::extract::FigureBlock;
pub use pipeline::scan::{Boundary, RawSpan, Scanner};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use rewrite::{
    normalize_batch, normalize_document, normalize_file, normalize_file_sync, rewrite_spans,
    BatchOutput, DocumentJob, DocumentResult,
};
