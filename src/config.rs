//! Configuration types for figure normalisation.
//!
//! All normalisation behaviour is controlled through [`NormalizeConfig`],
//! built via its [`NormalizeConfigBuilder`]. One config is shared by every
//! document in a run, which is what keeps the target width uniform across a
//! batch.

use crate::error::NormalizeError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default presentation width, as a fraction of `\textwidth`.
pub const DEFAULT_TARGET_WIDTH: f64 = 0.8;

/// Configuration for a normalisation run.
///
/// Built via [`NormalizeConfig::builder()`] or using
/// [`NormalizeConfig::default()`].
///
/// # Example
/// ```rust
/// use fignorm::{LogFormat, NormalizeConfig};
///
/// let config = NormalizeConfig::builder()
///     .target_width(0.75)
///     .log_format(LogFormat::Json)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_width, 0.75);
/// ```
#[derive(Clone)]
pub struct NormalizeConfig {
    /// Width applied to every normalised `\includegraphics`, as a fraction of
    /// `\textwidth`. Range: (0, 1]. Default: 0.8.
    ///
    /// The declared width of the source figure is never consulted; Word
    /// output looks best when every figure has the same width.
    pub target_width: f64,

    /// Treat commented-out figure blocks as candidates and emit them as
    /// active figures. Default: true.
    ///
    /// When false, commented blocks are skipped over and stay verbatim.
    pub reactivate_commented: bool,

    /// Audit log format written by the file entry points. Default: [`LogFormat::Text`].
    pub log_format: LogFormat,

    /// Number of documents processed at once in batch mode. Default: 4.
    pub concurrency: usize,

    /// Optional batch progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            reactivate_commented: true,
            log_format: LogFormat::default(),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for NormalizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizeConfig")
            .field("target_width", &self.target_width)
            .field("reactivate_commented", &self.reactivate_commented)
            .field("log_format", &self.log_format)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl NormalizeConfig {
    /// Create a new builder for `NormalizeConfig`.
    pub fn builder() -> NormalizeConfigBuilder {
        NormalizeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`NormalizeConfig`].
#[derive(Debug)]
pub struct NormalizeConfigBuilder {
    config: NormalizeConfig,
}

impl NormalizeConfigBuilder {
    pub fn target_width(mut self, width: f64) -> Self {
        self.config.target_width = width;
        self
    }

    pub fn reactivate_commented(mut self, v: bool) -> Self {
        self.config.reactivate_commented = v;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<NormalizeConfig, NormalizeError> {
        let c = &self.config;
        if !c.target_width.is_finite() || c.target_width <= 0.0 || c.target_width > 1.0 {
            return Err(NormalizeError::InvalidConfig(format!(
                "target width must be in (0, 1], got {}",
                c.target_width
            )));
        }
        if c.concurrency == 0 {
            return Err(NormalizeError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// On-disk format of the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One line per figure plus a trailing summary line. (default)
    #[default]
    Text,
    /// Pretty-printed JSON of the whole [`crate::output::AuditLog`].
    Json,
}

impl LogFormat {
    /// File extension used for default log paths.
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Text => "figures.log",
            LogFormat::Json => "figures.json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = NormalizeConfig::builder().build().unwrap();
        assert_eq!(config.target_width, DEFAULT_TARGET_WIDTH);
        assert!(config.reactivate_commented);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn rejects_out_of_range_width() {
        for w in [0.0, -0.5, 1.5, f64::NAN] {
            let err = NormalizeConfig::builder().target_width(w).build();
            assert!(err.is_err(), "width {w} should be rejected");
        }
    }

    #[test]
    fn full_width_is_allowed() {
        let config = NormalizeConfig::builder().target_width(1.0).build().unwrap();
        assert_eq!(config.target_width, 1.0);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = NormalizeConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidConfig(_)));
        let config = NormalizeConfig::builder().concurrency(1).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn debug_hides_callback() {
        let dbg = format!("{:?}", NormalizeConfig::default());
        assert!(dbg.contains("target_width"));
        assert!(dbg.contains("progress_callback: None"));
    }
}
