//! Block normaliser: render a [`FigureBlock`] in canonical form.
//!
//! Every valid figure comes out as
//!
//! ```text
//! \begin{figure}
//! \centering
//! \includegraphics[width=0.8\textwidth]{path}
//! \caption{caption}
//! \label{label}
//! \end{figure}
//! ```
//!
//! with the caption and label lines present only when the source had them.
//! The output is always active and always the unstarred environment.
//!
//! A caption cut at `$` inside a group (`\textbf{Foo $x$}`) is closed with
//! the missing braces so the block stays well formed and renders the same
//! on every later pass.

use super::extract::FigureBlock;
use super::lines::brace_delta;
use super::sanitize::sanitize_caption;
use std::fmt::Write;

/// Canonical replacement text for `block`.
pub fn render(block: &FigureBlock<'_>) -> String {
    let mut out = String::with_capacity(block.image_path.len() + 128);
    out.push_str("\\begin{figure}\n\\centering\n");
    let _ = writeln!(
        out,
        "\\includegraphics[width={}\\textwidth]{{{}}}",
        format_width(block.target_width),
        block.image_path
    );
    let caption = block
        .caption
        .clone()
        .or_else(|| block.caption_raw.as_deref().map(sanitize_caption));
    if let Some(caption) = caption {
        let unclosed = brace_delta(&caption).max(0) as usize;
        let _ = writeln!(out, "\\caption{{{}{}}}", caption, "}".repeat(unclosed));
    }
    if let Some(label) = &block.label {
        let _ = writeln!(out, "\\label{{{}}}", label);
    }
    out.push_str("\\end{figure}");
    out
}

/// Shortest decimal form of a width fraction: `0.8`, `0.42`, `1`.
pub fn format_width(width: f64) -> String {
    format!("{}", width)
}
