//! Text cleanup: deterministic normalisation of text extracted from PDFs.
//!
//! PDF text extraction emits artefacts that are faithful to the content
//! stream but awkward in a reflowed document: CRLF line endings from
//! producers on Windows, runs of spaces used for positioning, invisible
//! Unicode (zero-width spaces, soft hyphens) and words hyphenated across a
//! line break. Each rule below is a pure `&str → String` pass.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule can assume `\n`.
//! Invisible characters are removed before de-hyphenation so a soft hyphen
//! does not hide a real one.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 3. Re-join words hyphenated across a line break
/// 4. Collapse runs of spaces and tabs inside a line
/// 5. Trim trailing whitespace per line
/// 6. Collapse 3+ consecutive blank lines down to 1
/// 7. Trim leading/trailing blank lines
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = join_hyphenated_breaks(&s);
    let s = collapse_inline_spaces(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Join cleaned pages with a blank line, ending in exactly one newline.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let body = pages
        .iter()
        .map(|p| p.as_ref().trim_matches('\n'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    ensure_final_newline(&body)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Re-join hyphenated line breaks ───────────────────────────────────

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Ll})-\n(\p{Ll})").unwrap());

fn join_hyphenated_breaks(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").to_string()
}

// ── Rule 4: Collapse inline whitespace ───────────────────────────────────────

static RE_INLINE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn collapse_inline_spaces(input: &str) -> String {
    input
        .lines()
        .map(|line| {
            let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
            let (indent, rest) = line.split_at(indent_len);
            format!("{indent}{}", RE_INLINE_SPACES.replace_all(rest, " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Final newline ────────────────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}
