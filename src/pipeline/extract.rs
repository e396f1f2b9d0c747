//! Field extraction: pull image, width, caption and label out of one span.
//!
//! Extraction is marker-anchored rather than a grammar parse. It runs on the
//! span's *logical body*: comment prefixes are removed from commented blocks,
//! disabled lines inside active blocks are dropped, and trailing comments go
//! in both cases. Only the first `\includegraphics` is used.
//!
//! ## Caption truncation
//!
//! The caption is read from just after `\caption{` up to the first unescaped
//! `$`, or up to the matching `}` when the caption has no inline math. A
//! caption such as `Foo $x=1$ bar` therefore comes out as `Foo `. Existing
//! converted papers depend on this output, so it is kept as is. Braces left
//! open by the cut are closed again by [`super::canonical::render`].

use super::lines::{split_comment_prefix, strip_trailing_comment};
use super::scan::{Boundary, RawSpan};
use crate::error::BlockIssue;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\includegraphics\*?\s*(?:\[([^\]]*)\])?\s*\{([^}]*)\}").unwrap()
});
static RE_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"width\s*=\s*([0-9]*\.?[0-9]+)\s*\\textwidth\b").unwrap());
static RE_CAPTION_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\caption\s*(?:\[[^\]]*\])?\s*\{").unwrap());
static RE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\label\s*\{([^}]*)\}").unwrap());

/// One figure as it moves through the pipeline.
///
/// Created by [`extract`], completed by [`super::sanitize::sanitize`] and
/// consumed by [`super::canonical::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct FigureBlock<'a> {
    pub raw_text: &'a str,
    pub source_offset: usize,
    pub source_length: usize,
    pub is_commented: bool,
    pub boundary: Boundary,
    /// First `\includegraphics` argument, verbatim.
    pub image_path: String,
    /// Fraction of `\textwidth` declared in the source, if any.
    pub declared_width: Option<f64>,
    /// Width the canonical form will use.
    pub target_width: f64,
    /// Caption text up to the first `$` or the closing brace.
    pub caption_raw: Option<String>,
    /// Single-line caption; `None` until sanitised.
    pub caption: Option<String>,
    pub label: Option<String>,
    /// 1-based position among the figures of the document.
    pub sequence_index: usize,
    /// `\includegraphics` commands after the first one.
    pub extra_images: usize,
}

/// Extract the fields of `span`.
///
/// # Errors
/// [`BlockIssue::MissingImage`] when the span has no `\includegraphics` with
/// a non-empty path.
pub fn extract<'a>(
    span: &RawSpan<'a>,
    sequence_index: usize,
    target_width: f64,
) -> Result<FigureBlock<'a>, BlockIssue> {
    let body = logical_body(span.text, span.is_commented);

    let mut images = RE_INCLUDE.captures_iter(&body);
    let image = images
        .next()
        .filter(|caps| !caps[2].trim().is_empty())
        .ok_or(BlockIssue::MissingImage {
            ordinal: span.ordinal,
            offset: span.offset,
        })?;
    let extra_images = images.count();

    let image_path = image[2].to_string();
    let declared_width = image
        .get(1)
        .and_then(|opts| RE_WIDTH.captures(opts.as_str()))
        .and_then(|w| w[1].parse::<f64>().ok());

    Ok(FigureBlock {
        raw_text: span.text,
        source_offset: span.offset,
        source_length: span.len(),
        is_commented: span.is_commented,
        boundary: span.boundary,
        image_path,
        declared_width,
        target_width,
        caption_raw: extract_caption(&body),
        caption: None,
        label: RE_LABEL.captures(&body).map(|caps| caps[1].to_string()),
        sequence_index,
        extra_images,
    })
}

/// The span text as the extractor sees it.
fn logical_body(raw: &str, commented: bool) -> String {
    raw.lines()
        .filter_map(|line| {
            let (is_comment, content) = split_comment_prefix(line);
            match (is_comment, commented) {
                // A disabled line inside an active figure.
                (true, false) => None,
                (true, true) => Some(strip_trailing_comment(content)),
                (false, _) => Some(strip_trailing_comment(line)),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Caption text after `\caption{`, cut at the first `$` or the closing brace.
fn extract_caption(body: &str) -> Option<String> {
    let open = RE_CAPTION_OPEN.find(body)?;
    let rest = &body[open.end()..];

    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                continue;
            }
            '$' if !escaped => return Some(rest[..i].to_string()),
            '{' if !escaped => depth += 1,
            '}' if !escaped => {
                if depth == 0 {
                    return Some(rest[..i].to_string());
                }
                depth -= 1;
            }
            _ => {}
        }
        escaped = false;
    }
    // Unterminated caption.
    Some(rest.to_string())
}
