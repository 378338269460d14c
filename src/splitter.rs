//! Pure text-splitting primitives.
//!
//! Four splitting strategies used by the chunking engine, all deterministic
//! functions of their inputs:
//!
//! 1. [`split_chars`] — fixed character windows with overlap, preferring to
//!    break at sentence ends or blank lines near the window end.
//! 2. [`split_lines`] — line-oriented windows with overlap, never splitting
//!    a line unless the line alone exceeds the window.
//! 3. [`split_headings`] — markdown heading-boundary sections.
//! 4. [`split_code_structure`] — code split at function/class/module starts.
//!
//! All splitters return exact substrings of the input: with zero overlap,
//! concatenating the pieces in order reproduces the original text.

use crate::models::Heading;

/// Minimum accumulated size before a structural boundary opens a new chunk.
/// Keeps one-line items (consts, short impl blocks) from becoming chunks of
/// their own.
const MIN_STRUCTURAL_SIZE: usize = 200;

/// Fraction of the window in which a natural break point is searched.
const BREAK_SEARCH_TAIL: f64 = 0.2;

/// A heading-delimited section of a documentation page.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Heading text, `None` for preamble before the first heading.
    pub heading: Option<String>,
    /// ATX level of the heading, when present.
    pub level: Option<u8>,
    /// Raw section text, heading line included.
    pub body: String,
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The byte offset one char past `index`, for forcing progress on
/// degenerate windows.
fn next_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index + 1;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Find a natural break point within the last portion of a window.
///
/// Returns a byte offset relative to `window` at which to cut, preferring
/// the latest blank line or sentence-ending punctuation inside the final
/// [`BREAK_SEARCH_TAIL`] of the window. `None` means hard-cut at the end.
fn find_break(window: &str) -> Option<usize> {
    let tail_start = snap_to_char_boundary(
        window,
        (window.len() as f64 * (1.0 - BREAK_SEARCH_TAIL)) as usize,
    );
    let tail = &window[tail_start..];

    // Blank line: cut after the double newline.
    let blank = tail.rfind("\n\n").map(|p| tail_start + p + 2);

    // Sentence end: punctuation followed by whitespace; cut after the
    // punctuation so the whitespace leads the next window.
    let mut sentence = None;
    let mut prev: Option<(usize, char)> = None;
    for (i, c) in tail.char_indices() {
        if let Some((pi, pc)) = prev {
            if matches!(pc, '.' | '!' | '?') && c.is_whitespace() {
                sentence = Some(tail_start + pi + pc.len_utf8());
            }
        }
        prev = Some((i, c));
    }

    match (blank, sentence) {
        (Some(b), Some(s)) => Some(b.max(s)),
        (Some(b), None) => Some(b),
        (None, Some(s)) => Some(s),
        (None, None) => None,
    }
}

/// Split text into character windows of at most `max` bytes with `overlap`
/// bytes of back-dating at internal boundaries.
///
/// The first window never starts before the text and the last never extends
/// past it, so overlap only appears between adjacent internal pieces. Window
/// advancement is guarded: the next window always starts strictly after the
/// previous one, even when `overlap` swallows a shortened window.
///
/// Callers must ensure `overlap < max`; the chunking engine validates this.
pub fn split_chars(text: &str, max: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let raw_end = (start + max).min(text.len());
        let mut end = snap_to_char_boundary(text, raw_end);
        if end <= start {
            end = next_char_boundary(text, start);
        }

        if end < text.len() {
            if let Some(cut) = find_break(&text[start..end]) {
                let candidate = start + cut;
                if candidate > start {
                    end = snap_to_char_boundary(text, candidate);
                }
            }
        }

        pieces.push(text[start..end].to_string());

        if end >= text.len() {
            break;
        }

        let mut next = snap_to_char_boundary(text, end.saturating_sub(overlap));
        if next <= start {
            // Overlap would re-cover the whole window; advance without it.
            next = end;
        }
        start = next;
    }

    pieces
}

/// Split text into line-oriented windows of at most `max` bytes.
///
/// Lines are kept whole; the window closes at the line boundary before the
/// size would be exceeded, and the next window is back-dated by up to
/// `overlap` bytes of trailing lines from the previous one. A single line
/// larger than `max` falls through to [`split_chars`] for that line only.
pub fn split_lines(text: &str, max: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut buf = String::new();

    for line in text.split_inclusive('\n') {
        if line.len() > max {
            // Oversized single line: flush, then raw character windows.
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.extend(split_chars(line, max, overlap));
            continue;
        }

        if !buf.is_empty() && buf.len() + line.len() > max {
            let mut tail = overlap_tail_lines(&buf, overlap);
            if tail.len() + line.len() > max {
                // Overlap would immediately overflow the next window.
                tail.clear();
            }
            pieces.push(std::mem::take(&mut buf));
            buf.push_str(&tail);
        }
        buf.push_str(line);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}

/// The trailing lines of `chunk` that fit within `overlap` bytes, starting
/// at a line boundary. Empty when the whole chunk would be repeated.
fn overlap_tail_lines(chunk: &str, overlap: usize) -> String {
    if overlap == 0 || overlap >= chunk.len() {
        return String::new();
    }
    let from = chunk.len() - overlap;
    // Prefer the closest line boundary at or after the back-dated position.
    match chunk[from..].find('\n') {
        Some(p) if from + p + 1 < chunk.len() => chunk[from + p + 1..].to_string(),
        _ => String::new(),
    }
}

/// Parse ATX headings (`#` through `######`) from markdown text.
///
/// Lines inside fenced code blocks are ignored.
pub fn parse_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some((level, text)) = parse_atx(trimmed) {
            headings.push(Heading { level, text });
        }
    }

    headings
}

fn parse_atx(line: &str) -> Option<(u8, String)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((hashes as u8, rest.trim().trim_end_matches('#').trim_end().to_string()))
}

/// Split markdown into heading-delimited sections.
///
/// Each heading opens a section that runs until the next heading of
/// equal-or-higher level; deeper subheadings stay inside their parent's
/// section. Text before the first heading becomes an unlabeled preamble
/// section. Sections are exact text ranges: concatenating the bodies in
/// order reproduces the input.
pub fn split_headings(text: &str) -> Vec<Section> {
    // Byte offsets of every heading line, with level and text.
    let mut marks: Vec<(usize, u8, String)> = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some((level, htext)) = parse_atx(trimmed) {
                marks.push((offset, level, htext));
            }
        }
        offset += line.len();
    }

    if marks.is_empty() {
        return Vec::new();
    }

    let mut sections = Vec::new();

    if marks[0].0 > 0 {
        sections.push(Section {
            heading: None,
            level: None,
            body: text[..marks[0].0].to_string(),
        });
    }

    let mut i = 0;
    while i < marks.len() {
        let (start, level, ref htext) = marks[i];
        // Absorb deeper headings; stop at equal-or-higher level.
        let mut j = i + 1;
        while j < marks.len() && marks[j].1 > level {
            j += 1;
        }
        let end = if j < marks.len() { marks[j].0 } else { text.len() };
        sections.push(Section {
            heading: Some(htext.clone()),
            level: Some(level),
            body: text[start..end].to_string(),
        });
        i = j;
    }

    sections
}

/// Whether a line opens a structural unit (function, class, module) in the
/// given language. Lines are matched after stripping visibility modifiers.
pub fn is_structural_start(language: &str, line: &str) -> bool {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();

    match language {
        "rust" => {
            let t = trimmed
                .strip_prefix("pub(crate) ")
                .or_else(|| trimmed.strip_prefix("pub "))
                .unwrap_or(trimmed);
            ["fn ", "async fn ", "impl ", "impl<", "struct ", "enum ", "trait ", "mod "]
                .iter()
                .any(|p| t.starts_with(p))
                || t.starts_with("macro_rules!")
        }
        "python" => {
            indent == 0
                && ["def ", "async def ", "class "].iter().any(|p| trimmed.starts_with(p))
        }
        "javascript" | "typescript" => {
            let t = trimmed
                .strip_prefix("export default ")
                .or_else(|| trimmed.strip_prefix("export "))
                .unwrap_or(trimmed);
            ["function ", "async function ", "class ", "interface ", "enum "]
                .iter()
                .any(|p| t.starts_with(p))
        }
        "go" => trimmed.starts_with("func ") || trimmed.starts_with("type "),
        "java" => {
            indent <= 4
                && ["public ", "protected ", "private ", "class ", "interface ", "enum "]
                    .iter()
                    .any(|p| trimmed.starts_with(p))
                && (trimmed.contains('(') || trimmed.contains("class ") || trimmed.contains("interface "))
        }
        "ruby" => {
            ["def ", "class ", "module "].iter().any(|p| trimmed.starts_with(p))
        }
        "c" | "cpp" => {
            indent == 0
                && (["struct ", "typedef ", "class ", "namespace "]
                    .iter()
                    .any(|p| trimmed.starts_with(p))
                    || (trimmed.contains('(') && trimmed.ends_with('{')))
        }
        _ => false,
    }
}

/// Whether structural splitting is available for a language at all.
pub fn has_structural_markers(language: &str) -> bool {
    matches!(
        language,
        "rust" | "python" | "javascript" | "typescript" | "go" | "java" | "ruby" | "c" | "cpp"
    )
}

/// Split code at structural boundaries.
///
/// Scans line by line, opening a new piece when a structural-start pattern
/// appears and the accumulated piece already exceeds [`MIN_STRUCTURAL_SIZE`],
/// or when adding the next line would exceed `max`. Returns `None` when the
/// language has no recognized markers or the text never matches one, so the
/// caller can fall back to line windowing.
pub fn split_code_structure(text: &str, language: &str, max: usize) -> Option<Vec<String>> {
    if !has_structural_markers(language) || text.is_empty() {
        return None;
    }

    let any_marker = text.lines().any(|l| is_structural_start(language, l));
    if !any_marker {
        return None;
    }

    let mut pieces = Vec::new();
    let mut buf = String::new();

    for line in text.split_inclusive('\n') {
        let boundary = is_structural_start(language, line) && buf.len() >= MIN_STRUCTURAL_SIZE;
        let overflow = !buf.is_empty() && buf.len() + line.len() > max;

        if boundary || overflow {
            pieces.push(std::mem::take(&mut buf));
        }
        buf.push_str(line);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    Some(pieces)
}
