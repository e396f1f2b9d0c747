//! Output types: the rewritten document, its audit log and run statistics.

use crate::config::LogFormat;
use crate::error::{BlockIssue, NormalizeError};
use crate::pipeline::extract::FigureBlock;
use crate::pipeline::sanitize::sanitize_caption;
use crate::pipeline::scan::Boundary;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Result of normalising one document in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeOutput {
    /// The rewritten document.
    pub document: String,
    pub log: AuditLog,
    pub stats: NormalizeStats,
}

/// One processed figure, as recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 1-based, consecutive across the processed figures of the document.
    pub sequence_index: usize,
    pub image_path: String,
    /// Caption before sanitising, i.e. with the `$` truncation visible.
    pub caption_raw: Option<String>,
    /// Caption after sanitising: one line, trimmed.
    pub caption: Option<String>,
    pub label: Option<String>,
    pub declared_width: Option<f64>,
    /// The block was commented out in the source and is now active.
    pub reactivated: bool,
    pub boundary: Boundary,
    pub source_offset: usize,
    /// `\includegraphics` commands not carried into the canonical form.
    pub extra_images: usize,
}

impl From<&FigureBlock<'_>> for AuditEntry {
    fn from(block: &FigureBlock<'_>) -> Self {
        Self {
            sequence_index: block.sequence_index,
            image_path: block.image_path.clone(),
            caption_raw: block.caption_raw.clone(),
            caption: block
                .caption
                .clone()
                .or_else(|| block.caption_raw.as_deref().map(sanitize_caption)),
            label: block.label.clone(),
            declared_width: block.declared_width,
            reactivated: block.is_commented,
            boundary: block.boundary,
            source_offset: block.source_offset,
            extra_images: block.extra_images,
        }
    }
}

/// A candidate span that was left verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSpan {
    pub source_offset: usize,
    pub source_length: usize,
    pub reason: BlockIssue,
}

/// Ordered record of everything the driver did to one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub entries: Vec<AuditEntry>,
    pub skipped: Vec<SkippedSpan>,
    /// Figures normalised; always equals `entries.len()`.
    pub processed: usize,
}

impl AuditLog {
    pub(crate) fn record(&mut self, block: &FigureBlock<'_>) {
        self.entries.push(AuditEntry::from(block));
        self.processed = self.entries.len();
    }

    pub(crate) fn skip(&mut self, source_offset: usize, source_length: usize, reason: BlockIssue) {
        self.skipped.push(SkippedSpan {
            source_offset,
            source_length,
            reason,
        });
    }

    /// Render the log in the requested on-disk format.
    pub fn render(&self, format: LogFormat) -> Result<String, NormalizeError> {
        match format {
            LogFormat::Text => Ok(self.render_text()),
            LogFormat::Json => {
                let mut json = serde_json::to_string_pretty(self)?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    /// Plain-text form: one line per figure, skipped spans, summary line.
    ///
    /// ```text
    /// [1] image=figs/a.png label=fig:a caption="Foo"
    /// [2] image=figs/b.png label=- caption=- (reactivated)
    /// [skipped] span 3 at byte 812: no image-inclusion command
    /// Total figures processed: 2
    /// ```
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            let _ = write!(
                out,
                "[{}] image={} label={} caption={}",
                e.sequence_index,
                e.image_path,
                e.label.as_deref().unwrap_or("-"),
                e.caption
                    .as_deref()
                    .map(|c| format!("{c:?}"))
                    .unwrap_or_else(|| "-".to_string()),
            );
            if e.reactivated {
                out.push_str(" (reactivated)");
            }
            if e.boundary == Boundary::Inferred {
                out.push_str(" (inferred end, review)");
            }
            if e.extra_images > 0 {
                let _ = write!(out, " ({} extra image(s) dropped)", e.extra_images);
            }
            out.push('\n');
        }
        for s in &self.skipped {
            let _ = writeln!(out, "[skipped] {}", s.reason);
        }
        let _ = writeln!(out, "Total figures processed: {}", self.processed);
        out
    }
}

/// Counters for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    /// Spans yielded by the scanner.
    pub candidates: usize,
    pub processed: usize,
    pub skipped: usize,
    pub reactivated: usize,
    pub inferred_boundaries: usize,
    pub duration_ms: u64,
}
