//! Line and comment helpers shared by the scanner and the extractor.

/// One physical line of the document, addressed by byte offsets.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    /// Offset of the first byte of the line.
    pub start: usize,
    /// Offset just past the last content byte (before `\r\n` / `\n`).
    pub end: usize,
    /// Offset of the next line, or the document length on the last line.
    pub next: usize,
    /// Line content without its terminator.
    pub text: &'a str,
}

impl<'a> Line<'a> {
    /// The line that starts at `start`. `start` must be a char boundary.
    pub fn at(doc: &'a str, start: usize) -> Self {
        let rest = &doc[start..];
        let (len, next) = match rest.find('\n') {
            Some(i) => (i, start + i + 1),
            None => (rest.len(), doc.len()),
        };
        let raw = &rest[..len];
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        Line {
            start,
            end: start + text.len(),
            next,
            text,
        }
    }

    /// True when this is the final line of the document.
    pub fn is_last(&self, doc: &str) -> bool {
        self.next >= doc.len()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Split a line into (commented, content).
///
/// A line is commented when its first non-blank character is `%`; the
/// content is what follows the run of `%` characters, left-trimmed.
pub(crate) fn split_comment_prefix(line: &str) -> (bool, &str) {
    let t = line.trim_start();
    match t.strip_prefix('%') {
        Some(rest) => (true, rest.trim_start_matches('%').trim_start()),
        None => (false, t),
    }
}

/// Byte offset of the first unescaped `%` in `line`, if any.
pub(crate) fn comment_start(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                continue;
            }
            '%' if !escaped => return Some(i),
            _ => {}
        }
        escaped = false;
    }
    None
}

/// Drop a trailing comment: everything from the first unescaped `%`.
pub(crate) fn strip_trailing_comment(line: &str) -> &str {
    match comment_start(line) {
        Some(i) => line[..i].trim_end(),
        None => line,
    }
}

/// Net `{`/`}` depth change over `s`, ignoring escaped braces.
pub(crate) fn brace_delta(s: &str) -> i32 {
    let mut depth = 0;
    let mut escaped = false;
    for c in s.chars() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                continue;
            }
            '{' if !escaped => depth += 1,
            '}' if !escaped => depth -= 1,
            _ => {}
        }
        escaped = false;
    }
    depth
}
