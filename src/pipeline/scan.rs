//! Block scanner: locate every figure-like span in the source text.
//!
//! The scanner is a lazy, single forward pass over the document. It knows
//! nothing about captions or widths beyond what it needs to find block
//! boundaries; the extractor does the rest. Three shapes are recognised:
//!
//! 1. `\begin{figure}` … `\end{figure}` (starred form included), possibly
//!    with a placement argument and possibly commented out line by line.
//! 2. The same without a closing marker. The end is inferred from the first
//!    blank line after the last caption/label line.
//! 3. Runs of `\includegraphics`, `\caption` and `\label` lines with no
//!    environment around them. Runs inside another environment (a table,
//!    a minipage) are not figures.
//!
//! A marker on a disabled line or after a trailing `%` never opens or closes
//! an active figure.
//!
//! Spans never overlap and are yielded in document order.

use super::lines::{
    brace_delta, comment_start, split_comment_prefix, strip_trailing_comment, Line,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static RE_BEGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\begin\s*\{figure\*?\}").unwrap());
static RE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\end\s*\{figure\*?\}").unwrap());
static RE_TAIL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:caption|label)\b").unwrap());
static RE_ANY_BEGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\begin\s*\{([^}]*)\}").unwrap());
static RE_ANY_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\end\s*\{([^}]*)\}").unwrap());
static RE_BARE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\(includegraphics|caption|label|centering)\b").unwrap());

/// How the end of a span was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Closed by `\end{figure}`.
    Explicit,
    /// No closing marker; end inferred from the blank-line heuristic.
    Inferred,
    /// No environment at all; contiguous image/caption/label lines.
    Bare,
}

/// One candidate block as found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan<'a> {
    /// Exact source text of the span, comment markers included.
    pub text: &'a str,
    /// Byte offset of the span in the source.
    pub offset: usize,
    /// The block was disabled with `%` markers.
    pub is_commented: bool,
    pub boundary: Boundary,
    /// 1-based position among all candidate spans.
    pub ordinal: usize,
}

impl RawSpan<'_> {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte offset just past the span.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

enum Detect<'a> {
    Found(RawSpan<'a>),
    /// A block was recognised but must not be yielded; resume here.
    Skip(usize),
    Miss,
}

#[derive(Default)]
struct BareSeen {
    image: bool,
    caption: bool,
    label: bool,
}

/// Iterator over the candidate figure spans of a document.
///
/// ```rust
/// use fignorm::pipeline::scan::Scanner;
///
/// let doc = "Intro.\n\\begin{figure}[t]\n\\includegraphics{a.png}\n\\end{figure}\n";
/// let spans: Vec<_> = Scanner::new(doc).collect();
/// assert_eq!(spans.len(), 1);
/// assert!(spans[0].text.starts_with("\\begin{figure}[t]"));
/// ```
pub struct Scanner<'a> {
    doc: &'a str,
    pos: usize,
    ordinal: usize,
    include_commented: bool,
    /// Open non-figure environments (`document` excluded) at `pos`.
    env_depth: i32,
}

impl<'a> Scanner<'a> {
    pub fn new(doc: &'a str) -> Self {
        Self {
            doc,
            pos: 0,
            ordinal: 0,
            include_commented: true,
            env_depth: 0,
        }
    }

    /// Whether commented-out blocks are yielded. Default: true.
    pub fn include_commented(mut self, v: bool) -> Self {
        self.include_commented = v;
        self
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.doc.as_bytes()[self.pos - 1] == b'\n'
    }

    /// Start of the physical line holding byte `pos`.
    fn physical_line_start(&self, pos: usize) -> usize {
        self.doc[..pos].rfind('\n').map_or(0, |i| i + 1)
    }

    /// Whether byte `pos` sits after an unescaped `%` on its line.
    fn in_comment(&self, pos: usize) -> bool {
        comment_start(&self.doc[self.physical_line_start(pos)..pos]).is_some()
    }

    /// Track environments opened and closed by active text on a passed line.
    fn track_environments(&mut self, text: &str) {
        let active = strip_trailing_comment(text);
        let opened = RE_ANY_BEGIN
            .captures_iter(active)
            .filter(|c| &c[1] != "document")
            .count() as i32;
        let closed = RE_ANY_END
            .captures_iter(active)
            .filter(|c| &c[1] != "document")
            .count() as i32;
        self.env_depth = (self.env_depth + opened - closed).max(0);
    }

    fn span(
        &mut self,
        start: usize,
        end: usize,
        is_commented: bool,
        boundary: Boundary,
    ) -> RawSpan<'a> {
        self.ordinal += 1;
        let span = RawSpan {
            text: &self.doc[start..end],
            offset: start,
            is_commented,
            boundary,
            ordinal: self.ordinal,
        };
        debug!(
            ordinal = span.ordinal,
            offset = span.offset,
            len = span.len(),
            commented = span.is_commented,
            ?boundary,
            "candidate span"
        );
        span
    }

    fn detect_environment(&mut self, line: &Line<'a>) -> Detect<'a> {
        let Some(m) = RE_BEGIN.find(line.text) else {
            return Detect::Miss;
        };
        // The prefix runs from the physical line start, which lies before
        // `line.start` when a previous span ended mid-line.
        let line_start = self.physical_line_start(line.start);
        let prefix = &self.doc[line_start..line.start + m.start()];
        let prefix_is_comment = prefix.chars().all(|c| c == '%' || c.is_whitespace());
        let commented = comment_start(prefix).is_some();
        let marker_end = line.start + m.end();
        let (end, boundary) = self.environment_end(line, marker_end, commented);

        if commented && !prefix_is_comment {
            debug!(offset = line.start + m.start(), "figure inside a trailing comment");
            return Detect::Skip(end);
        }
        if commented && !self.include_commented {
            debug!(offset = line.start, "commented figure left as is");
            return Detect::Skip(end);
        }

        let start = if prefix_is_comment {
            line_start
        } else {
            line.start + m.start()
        };
        Detect::Found(self.span(start, end, commented, boundary))
    }

    /// End of an environment opened on `opening`, whose marker ends at `marker_end`.
    ///
    /// Markers on disabled lines do not count for an active environment.
    fn environment_end(
        &self,
        opening: &Line<'a>,
        marker_end: usize,
        commented: bool,
    ) -> (usize, Boundary) {
        let rest = &self.doc[marker_end..];
        let live = |pos: usize| commented || !self.in_comment(marker_end + pos);
        let reopen = RE_BEGIN
            .find_iter(rest)
            .map(|r| r.start())
            .find(|&r| live(r));
        match RE_END.find_iter(rest).find(|c| live(c.start())) {
            Some(close) if reopen.map_or(true, |r| close.start() < r) => {
                (marker_end + close.end(), Boundary::Explicit)
            }
            _ => (self.infer_end(opening, marker_end), Boundary::Inferred),
        }
    }

    /// Blank-line heuristic for environments without a closing marker.
    fn infer_end(&self, opening: &Line<'a>, marker_end: usize) -> usize {
        let mut seen_tail = RE_TAIL_MARKER.is_match(&self.doc[marker_end..opening.end]);
        let mut last_content_end = opening.end;
        let mut first_blank_stop = None;
        let mut cur = *opening;

        while !cur.is_last(self.doc) {
            cur = Line::at(self.doc, cur.next);
            if RE_BEGIN.is_match(cur.text) {
                break;
            }
            let (_, content) = split_comment_prefix(cur.text);
            if content.trim().is_empty() {
                if seen_tail {
                    break;
                }
                first_blank_stop.get_or_insert(last_content_end);
                continue;
            }
            if RE_TAIL_MARKER.is_match(content) {
                seen_tail = true;
            }
            last_content_end = cur.end;
        }

        if seen_tail {
            last_content_end
        } else {
            first_blank_stop.unwrap_or(last_content_end)
        }
    }

    fn detect_bare(&mut self, line: &Line<'a>) -> Detect<'a> {
        let (commented, content) = split_comment_prefix(line.text);
        if !RE_BARE_COMMAND.is_match(content) {
            return Detect::Miss;
        }

        let mut seen = BareSeen::default();
        let mut depth = 0i32;
        let mut last = *line;
        let mut cur = *line;
        loop {
            if cur.is_blank() {
                break;
            }
            let (c, content) = split_comment_prefix(cur.text);
            if c != commented {
                break;
            }
            if depth > 0 {
                depth += brace_delta(content);
            } else if let Some(caps) = RE_BARE_COMMAND.captures(content) {
                match &caps[1] {
                    "includegraphics" => seen.image = true,
                    "caption" => seen.caption = true,
                    "label" => seen.label = true,
                    _ => {}
                }
                depth = brace_delta(content).max(0);
            } else {
                break;
            }
            last = cur;
            if cur.is_last(self.doc) {
                break;
            }
            cur = Line::at(self.doc, cur.next);
        }

        // A shorter run starting further down cannot qualify either.
        if !(seen.image && seen.caption && seen.label) {
            return Detect::Skip(last.next);
        }
        if commented && !self.include_commented {
            return Detect::Skip(last.next);
        }
        Detect::Found(self.span(line.start, last.end, commented, Boundary::Bare))
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = RawSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.doc.len() {
            let fresh = self.at_line_start();
            let line = Line::at(self.doc, self.pos);

            let detected = match self.detect_environment(&line) {
                Detect::Miss if fresh && self.env_depth == 0 => self.detect_bare(&line),
                other => other,
            };

            match detected {
                Detect::Found(span) => {
                    self.pos = span.end();
                    return Some(span);
                }
                Detect::Skip(resume) => {
                    self.pos = resume;
                }
                Detect::Miss => {
                    self.track_environments(line.text);
                    self.pos = line.next;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(doc: &str) -> Vec<RawSpan<'_>> {
        Scanner::new(doc).collect()
    }

    #[test]
    fn finds_explicit_environment() {
        let doc = "Text.\n\\begin{figure}[htbp]\n\\includegraphics{a.png}\n\\end{figure}\nMore.\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        let s = &found[0];
        assert_eq!(s.boundary, Boundary::Explicit);
        assert!(!s.is_commented);
        assert!(s.text.starts_with("\\begin{figure}[htbp]"));
        assert!(s.text.ends_with("\\end{figure}"));
        assert_eq!(&doc[s.offset..s.end()], s.text);
    }

    #[test]
    fn starred_environment_is_a_figure() {
        let doc = "\\begin{figure*}\n\\includegraphics{wide.pdf}\n\\end{figure*}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert!(found[0].text.ends_with("\\end{figure*}"));
    }

    #[test]
    fn commented_block_includes_markers() {
        let doc = "a\n% \\begin{figure}\n%   \\includegraphics{old.png}\n% \\end{figure}\nb\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert!(found[0].is_commented);
        assert!(found[0].text.starts_with("% \\begin{figure}"));
    }

    #[test]
    fn commented_block_skipped_when_disabled() {
        let doc = "% \\begin{figure}\n% \\includegraphics{a.png}\n% \\caption{c}\n% \\label{l}\n% \\end{figure}\n";
        assert!(Scanner::new(doc).include_commented(false).next().is_none());
    }

    #[test]
    fn marker_inside_trailing_comment_is_ignored() {
        let doc = "Prose % \\begin{figure}\n% \\includegraphics{a.png}\n% \\end{figure}\n";
        assert!(spans(doc).is_empty());
    }

    #[test]
    fn marker_after_prose_starts_span_at_marker() {
        let doc = "See below. \\begin{figure}\\includegraphics{a.png}\\end{figure} done";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, "See below. ".len());
        assert_eq!(&doc[found[0].end()..], " done");
    }

    #[test]
    fn missing_end_inferred_from_blank_line_after_label() {
        let doc = "\\begin{figure}\n\\includegraphics{a.png}\n\\caption{A}\n\\label{fig:a}\n\nNext paragraph.\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].boundary, Boundary::Inferred);
        assert!(found[0].text.ends_with("\\label{fig:a}"));
    }

    #[test]
    fn blank_line_before_caption_does_not_end_block() {
        let doc = "\\begin{figure}\n\\includegraphics{a.png}\n\n\\caption{A}\n\nAfter.\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert!(found[0].text.ends_with("\\caption{A}"));
    }

    #[test]
    fn unclosed_block_stops_before_next_figure() {
        let doc = "\\begin{figure}\n\\includegraphics{a.png}\n\\caption{A}\n\\begin{figure}\n\\includegraphics{b.png}\n\\end{figure}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].boundary, Boundary::Inferred);
        assert!(found[0].text.ends_with("\\caption{A}"));
        assert_eq!(found[1].boundary, Boundary::Explicit);
        assert!(found[0].end() <= found[1].offset);
    }

    #[test]
    fn bare_block_detected() {
        let doc = "Intro.\n\n\\centering\n\\includegraphics[width=0.5\\textwidth]{b.png}\n\\caption{Bare\n  figure}\n\\label{fig:b}\n\nOutro.\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].boundary, Boundary::Bare);
        assert!(found[0].text.starts_with("\\centering"));
        assert!(found[0].text.ends_with("\\label{fig:b}"));
    }

    #[test]
    fn bare_run_without_label_is_not_a_block() {
        let doc = "\n\\includegraphics{b.png}\n\\caption{No label}\n";
        assert!(spans(doc).is_empty());
    }

    #[test]
    fn graphics_inside_table_is_not_bare() {
        let doc = "\\begin{table}\n\\includegraphics{t.png}\n\\caption{T}\n\\label{tab:t}\n\\end{table}\n";
        assert!(spans(doc).is_empty());
    }

    #[test]
    fn spans_are_ordered_and_disjoint() {
        let doc = "\\begin{figure}\\includegraphics{1.png}\\end{figure}\n\
                   % \\begin{figure}\n% \\includegraphics{2.png}\n% \\end{figure}\n\
                   \\begin{figure}\n\\includegraphics{3.png}\n\\end{figure}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 3);
        for pair in found.windows(2) {
            assert!(pair[0].end() <= pair[1].offset);
            assert!(pair[0].ordinal < pair[1].ordinal);
        }
        assert_eq!(
            found.iter().map(|s| s.ordinal).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn commented_closer_inside_active_figure_is_ignored() {
        let doc = "\\begin{figure}\n\\includegraphics{a.png}\n%\\end{figure}\n\\caption{C}\n\\label{l}\n\\end{figure}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].boundary, Boundary::Explicit);
        assert_eq!(found[0].end(), doc.len() - 1);
    }

    #[test]
    fn commented_opener_inside_active_figure_does_not_reopen() {
        let doc = "\\begin{figure}\n\\includegraphics{a.png}\n% \\begin{figure} old draft\n\\end{figure}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].boundary, Boundary::Explicit);
    }

    #[test]
    fn trailing_comment_after_end_marker_is_not_reactivated() {
        let doc = "\\begin{figure}\\includegraphics{a.png}\\end{figure}% \\begin{figure}\\includegraphics{old.png}\\end{figure}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_commented);
        assert!(found[0].text.contains("a.png"));
    }

    #[test]
    fn escaped_percent_before_marker_is_prose() {
        let doc = "Up 5\\% \\begin{figure}\\includegraphics{a.png}\\end{figure}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_commented);
        assert!(found[0].text.starts_with("\\begin{figure}"));
    }

    #[test]
    fn bare_block_directly_after_prose() {
        let doc = "\\section{Results}\n\\includegraphics{r.png}\n\\caption{R}\n\\label{fig:r}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].boundary, Boundary::Bare);
        assert!(found[0].text.starts_with("\\includegraphics"));
    }

    #[test]
    fn graphics_inside_minipage_after_blank_line_is_not_bare() {
        let doc = "\\begin{document}\n\\begin{minipage}{0.5\\linewidth}\n\n\\includegraphics{m.png}\n\\caption{M}\n\\label{fig:m}\n\\end{minipage}\n\n\\includegraphics{n.png}\n\\caption{N}\n\\label{fig:n}\n\\end{document}\n";
        let found = spans(doc);
        assert_eq!(found.len(), 1);
        assert!(found[0].text.contains("n.png"));
    }

    #[test]
    fn rescanning_yields_same_spans() {
        let doc = "\\begin{figure}\n\\includegraphics{a.png}\n\\end{figure}\n";
        assert_eq!(spans(doc), spans(doc));
    }
}
