//! Caption sanitising: make an extracted caption a single trimmed line.
//!
//! Only whitespace is touched. Math, braces and macros pass through as they
//! came out of the extractor.

use super::extract::FigureBlock;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*\r?\n[ \t]*").unwrap());

/// Fill `block.caption` from `block.caption_raw`.
pub fn sanitize(block: &mut FigureBlock<'_>) {
    block.caption = block.caption_raw.as_deref().map(sanitize_caption);
}

/// Collapse each line break (and the blanks around it) to one space, then trim.
pub fn sanitize_caption(raw: &str) -> String {
    RE_LINE_BREAK.replace_all(raw, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_with_single_space() {
        assert_eq!(
            sanitize_caption("Accuracy over\n    training epochs"),
            "Accuracy over training epochs"
        );
    }

    #[test]
    fn trims_truncated_caption() {
        assert_eq!(sanitize_caption("Foo "), "Foo");
    }

    #[test]
    fn handles_crlf() {
        assert_eq!(sanitize_caption("a\r\nb"), "a b");
    }

    #[test]
    fn leaves_inner_spacing_and_macros_alone() {
        assert_eq!(
            sanitize_caption("  The \\emph{two}  spaces "),
            "The \\emph{two}  spaces"
        );
    }

    #[test]
    fn empty_caption_stays_empty() {
        assert_eq!(sanitize_caption("\n  \n"), "");
    }
}
