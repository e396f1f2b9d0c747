//! CLI binary for fignorm.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `NormalizeConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use fignorm::{
    normalize_batch, normalize_document, BatchProgressCallback, DocumentJob, LogFormat,
    NormalizeConfig, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// document. Documents may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Normalising");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
    }

    fn on_document_start(&self, index: usize, input: &Path) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(input.display().to_string());
    }

    fn on_document_complete(&self, index: usize, input: &Path, figures: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            input.display(),
            dim(&format!("{figures:>4} figure(s)")),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, input: &Path, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // First line only; the full message is printed in the summary.
        let msg = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            input.display(),
            red(msg),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} document(s) normalised",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents normalised  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Normalise one paper; writes main.normalized.tex and main.figures.log
  fignorm paper/main.tex

  # Rewrite in place
  fignorm paper/main.tex -o paper/main.tex

  # Print the rewritten document, audit log on stderr
  fignorm --stdout paper/main.tex > clean.tex

  # Several papers into one directory, JSON audit logs
  fignorm --out-dir normalized --json-log papers/*.tex

  # Keep commented-out figures disabled, narrower images
  fignorm --keep-commented --target-width 0.6 paper/main.tex

CANONICAL FORM:
  \begin{figure}
  \centering
  \includegraphics[width=0.8\textwidth]{<path>}
  \caption{<caption>}
  \label{<label>}
  \end{figure}

ENVIRONMENT VARIABLES:
  FIGNORM_OUT_DIR         Default output directory
  FIGNORM_TARGET_WIDTH    Default width fraction
  FIGNORM_CONCURRENCY     Documents processed at once
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Normalise figure blocks in LaTeX sources.
#[derive(Parser, Debug)]
#[command(
    name = "fignorm",
    version,
    about = "Normalise figure blocks in LaTeX sources",
    long_about = "Rewrite every figure block of a LaTeX document into one canonical form: \
active, centred, a single image at a fixed fraction of the text width, a one-line caption \
and the original label. Everything outside figure blocks is copied unchanged.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// LaTeX source file(s).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Destination of the rewritten document (single input only).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Destination of the audit log (single input only).
    #[arg(long)]
    log: Option<PathBuf>,

    /// Directory for outputs; defaults to each input's directory.
    #[arg(long, env = "FIGNORM_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Image width as a fraction of \textwidth, in (0, 1].
    #[arg(long, env = "FIGNORM_TARGET_WIDTH", default_value_t = fignorm::DEFAULT_TARGET_WIDTH)]
    target_width: f64,

    /// Leave commented-out figures disabled instead of reactivating them.
    #[arg(long, env = "FIGNORM_KEEP_COMMENTED")]
    keep_commented: bool,

    /// Write the audit log as JSON.
    #[arg(long, env = "FIGNORM_JSON_LOG")]
    json_log: bool,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "FIGNORM_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Write the rewritten document to stdout and the audit log to stderr.
    #[arg(long, conflicts_with_all = ["output", "log", "out_dir"])]
    stdout: bool,

    /// Disable progress bar.
    #[arg(long, env = "FIGNORM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FIGNORM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FIGNORM_QUIET")]
    quiet: bool,
}

impl Cli {
    fn log_format(&self) -> LogFormat {
        if self.json_log {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.stdout;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.inputs.len() > 1 && (cli.output.is_some() || cli.log.is_some() || cli.stdout) {
        anyhow::bail!("--output, --log and --stdout accept a single input only");
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Stdout mode ──────────────────────────────────────────────────────
    if cli.stdout {
        let input = &cli.inputs[0];
        let source = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?;
        let result = normalize_document(&source, &config);
        let log = result
            .log
            .render(config.log_format)
            .context("Failed to render audit log")?;

        io::stdout()
            .lock()
            .write_all(result.document.as_bytes())
            .context("Failed to write to stdout")?;
        if !cli.quiet {
            eprint!("{log}");
        }
        return Ok(());
    }

    // ── File / batch mode ────────────────────────────────────────────────
    let jobs = build_jobs(&cli);
    let batch = normalize_batch(&jobs, &config).await;

    if !cli.quiet {
        for doc in &batch.documents {
            match (&doc.stats, &doc.error) {
                (Some(stats), _) if !show_progress => eprintln!(
                    "{}  {}: {} figure(s), {} skipped, {} reactivated  {}ms  →  {}",
                    green("✔"),
                    doc.job.input.display(),
                    stats.processed,
                    stats.skipped,
                    stats.reactivated,
                    stats.duration_ms,
                    bold(&doc.job.output.display().to_string()),
                ),
                (Some(stats), _) if stats.inferred_boundaries > 0 => eprintln!(
                    "   {} {}: {} figure end(s) inferred, see {}",
                    cyan("⚠"),
                    doc.job.input.display(),
                    stats.inferred_boundaries,
                    doc.job.log.display(),
                ),
                (None, Some(err)) => eprintln!("{} {}", red("error:"), err),
                _ => {}
            }
        }
        if batch.documents.len() > 1 || !show_progress {
            eprintln!(
                "   {} figure(s) across {} document(s)",
                dim(&batch.total_figures().to_string()),
                batch.documents.len(),
            );
        }
    }

    if batch.failed() > 0 {
        anyhow::bail!("{} of {} document(s) failed", batch.failed(), jobs.len());
    }
    Ok(())
}

/// Map CLI args to `NormalizeConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<NormalizeConfig> {
    let mut builder = NormalizeConfig::builder()
        .target_width(cli.target_width)
        .reactivate_commented(!cli.keep_commented)
        .log_format(cli.log_format())
        .concurrency(cli.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One job per input; `--output` and `--log` override the single-input paths.
fn build_jobs(cli: &Cli) -> Vec<DocumentJob> {
    cli.inputs
        .iter()
        .map(|input| {
            let mut job = DocumentJob::alongside(input, cli.out_dir.as_deref(), cli.log_format());
            if let Some(ref output) = cli.output {
                job.output = output.clone();
            }
            if let Some(ref log) = cli.log {
                job.log = log.clone();
            }
            job
        })
        .collect()
}
