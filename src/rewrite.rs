//! Rewrite driver: run the pipeline over whole documents.
//!
//! [`normalize_document`] is the in-memory core: one forward pass that
//! copies the bytes between spans unchanged and substitutes each valid span
//! with its canonical form. The file and batch entry points wrap it with
//! tokio file I/O; they read the source once and write the rewritten
//! document and the audit log once, at the end.
//!
//! All per-run state (the audit log, the counters) lives in the values this
//! module returns. Nothing is shared between documents.

use crate::config::NormalizeConfig;
use crate::error::{BlockIssue, NormalizeError};
use crate::output::{AuditLog, NormalizeOutput, NormalizeStats};
use crate::pipeline::scan::{Boundary, RawSpan, Scanner};
use crate::pipeline::{canonical, extract, sanitize};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Normalise every figure block of `source`.
///
/// Never fails: spans that cannot be normalised stay verbatim and are listed
/// in [`AuditLog::skipped`].
///
/// # Example
/// ```rust
/// use fignorm::{normalize_document, NormalizeConfig};
///
/// let src = "% \\begin{figure}[h]\n% \\includegraphics[width=0.3\\textwidth]{a.png}\n% \\caption{A}\n% \\end{figure}\n";
/// let out = normalize_document(src, &NormalizeConfig::default());
/// assert_eq!(
///     out.document,
///     "\\begin{figure}\n\\centering\n\\includegraphics[width=0.8\\textwidth]{a.png}\n\\caption{A}\n\\end{figure}\n"
/// );
/// assert_eq!(out.log.processed, 1);
/// ```
pub fn normalize_document(source: &str, config: &NormalizeConfig) -> NormalizeOutput {
    let spans = Scanner::new(source).include_commented(config.reactivate_commented);
    rewrite_spans(source, spans, config)
}

/// Rewrite `source` using spans from any scanner.
///
/// Spans must come in document order. A span that overlaps an earlier one,
/// or whose text is not found at its offset, is skipped and logged.
pub fn rewrite_spans<'a, I>(source: &'a str, spans: I, config: &NormalizeConfig) -> NormalizeOutput
where
    I: IntoIterator<Item = RawSpan<'a>>,
{
    let start = Instant::now();
    let mut document = String::with_capacity(source.len() + source.len() / 8);
    let mut log = AuditLog::default();
    let mut stats = NormalizeStats::default();
    let mut cursor = 0usize;

    for span in spans {
        stats.candidates += 1;

        if span.offset < cursor || source.get(span.offset..span.end()) != Some(span.text) {
            let issue = BlockIssue::Unspliceable {
                ordinal: span.ordinal,
                offset: span.offset,
            };
            warn!("Skipping {}", issue);
            log.skip(span.offset, span.len(), issue);
            continue;
        }

        document.push_str(&source[cursor..span.offset]);
        cursor = span.end();

        match extract::extract(&span, log.processed + 1, config.target_width) {
            Ok(mut block) => {
                sanitize::sanitize(&mut block);

                if block.boundary == Boundary::Inferred {
                    stats.inferred_boundaries += 1;
                    warn!(
                        "Figure {} at byte {} has no closing marker; end inferred, review the output",
                        block.sequence_index, block.source_offset
                    );
                }
                if block.extra_images > 0 {
                    warn!(
                        "Figure {} has {} extra \\includegraphics; only '{}' is kept",
                        block.sequence_index, block.extra_images, block.image_path
                    );
                }
                if block.is_commented {
                    stats.reactivated += 1;
                }
                debug!(
                    sequence = block.sequence_index,
                    image = %block.image_path,
                    label = ?block.label,
                    "normalised figure"
                );

                document.push_str(&canonical::render(&block));
                log.record(&block);
            }
            Err(issue) => {
                warn!("Skipping {}", issue);
                document.push_str(span.text);
                log.skip(span.offset, span.len(), issue);
            }
        }
    }
    document.push_str(&source[cursor..]);

    stats.processed = log.processed;
    stats.skipped = log.skipped.len();
    stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Normalised {} figure(s), skipped {} span(s) in {}ms",
        stats.processed, stats.skipped, stats.duration_ms
    );

    NormalizeOutput {
        document,
        log,
        stats,
    }
}

/// Normalise a file, writing the rewritten document and its audit log.
///
/// Both outputs are staged in temporary siblings and renamed into place
/// only after both writes succeeded. `output` may equal `input`.
///
/// # Errors
/// Fatal I/O and encoding errors only; per-figure problems end up in the log.
pub async fn normalize_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    log_path: impl AsRef<Path>,
    config: &NormalizeConfig,
) -> Result<NormalizeStats, NormalizeError> {
    let input = input.as_ref();
    info!("Normalising figures in {}", input.display());

    let source = read_source(input).await?;
    let result = normalize_document(&source, config);
    let log_text = result.log.render(config.log_format)?;

    write_outputs(&[
        (output.as_ref(), result.document.as_bytes()),
        (log_path.as_ref(), log_text.as_bytes()),
    ])
    .await?;

    Ok(result.stats)
}

/// Synchronous wrapper around [`normalize_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn normalize_file_sync(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    log_path: impl AsRef<Path>,
    config: &NormalizeConfig,
) -> Result<NormalizeStats, NormalizeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| NormalizeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(normalize_file(input, output, log_path, config))
}

// ── Batch mode ───────────────────────────────────────────────────────────

/// Source and destination paths for one document of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
}

impl DocumentJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            log: log.into(),
        }
    }

    /// Default destinations: `<stem>.normalized.tex` and `<stem>.figures.log`
    /// (or `.figures.json`) in `out_dir`, or next to the input.
    pub fn alongside(
        input: impl Into<PathBuf>,
        out_dir: Option<&Path>,
        format: crate::config::LogFormat,
    ) -> Self {
        let input = input.into();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let dir = match out_dir {
            Some(d) => d.to_path_buf(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Self {
            output: dir.join(format!("{stem}.normalized.tex")),
            log: dir.join(format!("{stem}.{}", format.extension())),
            input,
        }
    }
}

/// Outcome of one document in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    /// 1-indexed position in the batch.
    pub index: usize,
    pub job: DocumentJob,
    pub stats: Option<NormalizeStats>,
    pub error: Option<String>,
}

/// Per-document outcomes, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    pub documents: Vec<DocumentResult>,
}

impl BatchOutput {
    pub fn succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.documents.len() - self.succeeded()
    }

    /// Figures normalised across all successful documents.
    pub fn total_figures(&self) -> usize {
        self.documents
            .iter()
            .filter_map(|d| d.stats.as_ref())
            .map(|s| s.processed)
            .sum()
    }
}

/// Normalise several documents concurrently.
///
/// Documents are independent: one failing does not stop the others, and the
/// result lists every document in input order. Jobs that share a destination
/// path fail with [`NormalizeError::OutputConflict`] without being written.
pub async fn normalize_batch(jobs: &[DocumentJob], config: &NormalizeConfig) -> BatchOutput {
    let total = jobs.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }
    let conflicts = destination_conflicts(jobs);

    let tasks = jobs.iter().zip(conflicts).enumerate().map(|(i, (job, conflict))| {
        let index = i + 1;
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_start(index, &job.input);
            }
            let result = match conflict {
                Some(path) => Err(NormalizeError::OutputConflict { path }),
                None => normalize_file(&job.input, &job.output, &job.log, config).await,
            };
            match result {
                Ok(stats) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_document_complete(index, &job.input, stats.processed);
                    }
                    DocumentResult {
                        index,
                        job: job.clone(),
                        stats: Some(stats),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Document {} failed: {}", job.input.display(), e);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_document_error(index, &job.input, &e.to_string());
                    }
                    DocumentResult {
                        index,
                        job: job.clone(),
                        stats: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        }
    });

    let mut documents: Vec<DocumentResult> = stream::iter(tasks)
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    documents.sort_by_key(|d| d.index);
    let output = BatchOutput { documents };

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, output.succeeded());
    }
    output
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// For each job, the first of its destinations that another job (or its own
/// other output) also writes to.
fn destination_conflicts(jobs: &[DocumentJob]) -> Vec<Option<PathBuf>> {
    let mut writers: HashMap<&Path, usize> = HashMap::new();
    for job in jobs {
        *writers.entry(job.output.as_path()).or_default() += 1;
        *writers.entry(job.log.as_path()).or_default() += 1;
    }
    jobs.iter()
        .map(|job| {
            [&job.output, &job.log]
                .into_iter()
                .find(|p| writers.get(p.as_path()).copied().unwrap_or(0) > 1)
                .cloned()
        })
        .collect()
}

async fn read_source(path: &Path) -> Result<String, NormalizeError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => NormalizeError::InputNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => NormalizeError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => NormalizeError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    String::from_utf8(bytes).map_err(|e| NormalizeError::NotUtf8 {
        path: path.to_path_buf(),
        offset: e.utf8_error().valid_up_to(),
    })
}

/// `name.ext` → `name.ext<suffix>` in the same directory.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Sibling path used to stage a write: `name.ext` → `name.ext.tmp`.
fn staging_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

/// Write every file to its staging path, then rename all into place.
///
/// Existing destinations are set aside first; if any rename fails, every
/// destination already replaced is restored, so either all files are
/// updated or none is.
async fn write_outputs(files: &[(&Path, &[u8])]) -> Result<(), NormalizeError> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());

    for &(path, bytes) in files {
        let tmp = staging_path(path);
        let written = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&tmp, bytes).await
        }
        .await;

        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            for (tmp, _) in &staged {
                let _ = tokio::fs::remove_file(tmp).await;
            }
            return Err(NormalizeError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            });
        }
        staged.push((tmp, path));
    }

    // Destinations already replaced, with the backup of their old content.
    let mut placed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(staged.len());

    for (tmp, path) in &staged {
        let placed_one = async {
            let backup = match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_file() => {
                    let backup = sibling_path(path, ".orig");
                    tokio::fs::rename(path, &backup).await?;
                    Some(backup)
                }
                _ => None,
            };
            match tokio::fs::rename(tmp, path).await {
                Ok(()) => Ok(backup),
                Err(e) => {
                    if let Some(ref b) = backup {
                        let _ = tokio::fs::rename(b, path).await;
                    }
                    Err(e)
                }
            }
        }
        .await;

        match placed_one {
            Ok(backup) => placed.push((*path, backup)),
            Err(source) => {
                warn!("Rolling back outputs after failing to write {}", path.display());
                for (done, backup) in placed.iter().rev() {
                    let _ = match backup {
                        Some(b) => tokio::fs::rename(b, done).await,
                        None => tokio::fs::remove_file(done).await,
                    };
                }
                for (tmp, _) in &staged {
                    let _ = tokio::fs::remove_file(tmp).await;
                }
                return Err(NormalizeError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    for (_, backup) in &placed {
        if let Some(b) = backup {
            let _ = tokio::fs::remove_file(b).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    fn run(src: &str) -> NormalizeOutput {
        normalize_document(src, &NormalizeConfig::default())
    }

    #[test]
    fn passes_through_document_without_figures() {
        let src = "\\section{Intro}\nNo figures here, 50\\% of the time.\n";
        let out = run(src);
        assert_eq!(out.document, src);
        assert_eq!(out.log.processed, 0);
        assert_eq!(out.stats.candidates, 0);
    }

    #[test]
    fn width_is_overridden() {
        let src = "\\begin{figure}\n\\includegraphics[width=0.42\\textwidth]{p.png}\n\\end{figure}\n";
        let out = run(src);
        assert!(out.document.contains("\\includegraphics[width=0.8\\textwidth]{p.png}"));
        assert!(!out.document.contains("0.42"));
        assert_eq!(out.log.entries[0].declared_width, Some(0.42));
    }

    #[test]
    fn caption_truncated_in_output_and_log() {
        let src = "\\begin{figure}\n\\includegraphics{p.png}\n\\caption{Foo $x=1$ bar}\n\\label{fig:p}\n\\end{figure}\n";
        let out = run(src);
        assert!(out.document.contains("\\caption{Foo}\n"));
        assert!(!out.document.contains("bar"));
        let entry = &out.log.entries[0];
        assert_eq!(entry.caption_raw.as_deref(), Some("Foo "));
        assert_eq!(entry.caption_raw.as_deref().map(str::trim), Some("Foo"));
        assert_eq!(entry.caption.as_deref(), Some("Foo"));
    }

    #[test]
    fn skipped_span_left_verbatim() {
        let tikz = "\\begin{figure}\n\\caption{Diagram}\n\\label{fig:tikz}\n\\end{figure}";
        let src = format!(
            "\\begin{{figure}}\\includegraphics{{a.png}}\\end{{figure}}\n{tikz}\n\\begin{{figure}}\\includegraphics{{b.png}}\\end{{figure}}\n"
        );
        let out = run(&src);
        assert!(out.document.contains(tikz));
        assert_eq!(out.log.processed, 2);
        assert_eq!(out.stats.candidates, 3);
        assert_eq!(out.stats.skipped, 1);
        let indices: Vec<usize> = out.log.entries.iter().map(|e| e.sequence_index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(out.log.entries[1].image_path, "b.png");
        assert!(matches!(
            out.log.skipped[0].reason,
            BlockIssue::MissingImage { ordinal: 2, .. }
        ));
    }

    #[test]
    fn counts_reactivated_and_inferred() {
        let src = "% \\begin{figure}\n% \\includegraphics{a.png}\n% \\end{figure}\n\n\\begin{figure}\n\\includegraphics{b.png}\n\\caption{B}\n\nText.\n";
        let out = run(src);
        assert_eq!(out.stats.reactivated, 1);
        assert_eq!(out.stats.inferred_boundaries, 1);
        assert!(out.log.entries[0].reactivated);
        assert_eq!(out.log.entries[1].boundary, Boundary::Inferred);
        assert!(out.document.ends_with("\\caption{B}\n\\end{figure}\n\nText.\n"));
    }

    #[test]
    fn keep_commented_leaves_disabled_figures() {
        let src = "% \\begin{figure}\n% \\includegraphics{a.png}\n% \\end{figure}\n";
        let config = NormalizeConfig::builder()
            .reactivate_commented(false)
            .build()
            .unwrap();
        let out = normalize_document(src, &config);
        assert_eq!(out.document, src);
        assert_eq!(out.log.processed, 0);
    }

    #[test]
    fn custom_spans_that_overlap_are_skipped() {
        let src = "\\begin{figure}\\includegraphics{a.png}\\end{figure}";
        let first: Vec<RawSpan<'_>> = Scanner::new(src).collect();
        let spans = vec![first[0].clone(), first[0].clone()];
        let out = rewrite_spans(src, spans, &NormalizeConfig::default());
        assert_eq!(out.log.processed, 1);
        assert!(matches!(
            out.log.skipped[0].reason,
            BlockIssue::Unspliceable { .. }
        ));
    }

    #[test]
    fn alongside_paths() {
        let job = DocumentJob::alongside("paper/main.tex", None, LogFormat::Text);
        assert_eq!(job.output, PathBuf::from("paper/main.normalized.tex"));
        assert_eq!(job.log, PathBuf::from("paper/main.figures.log"));

        let job = DocumentJob::alongside("main.tex", Some(Path::new("result")), LogFormat::Json);
        assert_eq!(job.output, PathBuf::from("result/main.normalized.tex"));
        assert_eq!(job.log, PathBuf::from("result/main.figures.json"));
    }

    #[test]
    fn shared_destinations_are_conflicts() {
        let jobs = vec![
            DocumentJob::alongside("a/main.tex", Some(Path::new("out")), LogFormat::Text),
            DocumentJob::alongside("b/main.tex", Some(Path::new("out")), LogFormat::Text),
            DocumentJob::alongside("c/other.tex", Some(Path::new("out")), LogFormat::Text),
            DocumentJob::new("d.tex", "same.txt", "same.txt"),
        ];
        let conflicts = destination_conflicts(&jobs);
        assert_eq!(
            conflicts[0].as_deref(),
            Some(Path::new("out/main.normalized.tex"))
        );
        assert!(conflicts[1].is_some());
        assert_eq!(conflicts[2], None);
        assert_eq!(conflicts[3].as_deref(), Some(Path::new("same.txt")));
    }

    #[test]
    fn staging_path_appends_suffix() {
        assert_eq!(
            staging_path(Path::new("out/main.tex")),
            PathBuf::from("out/main.tex.tmp")
        );
        assert_eq!(
            sibling_path(Path::new("main.figures.log"), ".orig"),
            PathBuf::from("main.figures.log.orig")
        );
    }
}
