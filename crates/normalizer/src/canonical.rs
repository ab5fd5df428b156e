//! Canonical message form used for fingerprints and similarity scoring.
//!
//! Variable fragments (identifiers, numbers, addresses, paths, timestamps) are
//! replaced with fixed placeholders so that two occurrences of the same problem
//! canonicalize to the same text.

use once_cell::sync::Lazy;
use regex::Regex;

struct CanonicalPatterns {
    uuids: Regex,
    timestamps: Regex,
    addresses: Regex,
    long_hex: Regex,
    paths: Regex,
    numbers: Regex,
    whitespace: Regex,
}

fn build_patterns() -> Option<CanonicalPatterns> {
    Some(CanonicalPatterns {
        uuids: Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok()?,
        timestamps: Regex::new(
            r"\d{4}-\d{2}-\d{2}[t ]\d{2}:\d{2}:\d{2}(\.\d+)?(z|[+-]\d{2}:?\d{2})?",
        )
        .ok()?,
        addresses: Regex::new(r"0x[0-9a-f]+").ok()?,
        long_hex: Regex::new(
            r"\b(?:[0-9a-f]*[0-9][0-9a-f]*[a-f]|[0-9a-f]*[a-f][0-9a-f]*[0-9])[0-9a-f]*\b",
        )
        .ok()?,
        paths: Regex::new(r"(?:[a-z]:\\|~/|\.{1,2}/|/)?(?:[\w.@-]+[\\/])+[\w.@-]+").ok()?,
        numbers: Regex::new(r"\d+(?:\.\d+)?").ok()?,
        whitespace: Regex::new(r"\s+").ok()?,
    })
}

static PATTERNS: Lazy<Option<CanonicalPatterns>> = Lazy::new(build_patterns);

/// Lowercases and replaces variable fragments with placeholders.
///
/// The replacement order matters: structured tokens (UUIDs, timestamps) are
/// removed before the generic number pass would split them apart.
pub fn canonical_message(message: &str) -> String {
    let lowered = message.to_lowercase();
    let Some(p) = PATTERNS.as_ref() else {
        return collapse_whitespace(&lowered);
    };

    let mut out = p.uuids.replace_all(&lowered, "<uuid>").into_owned();
    out = p.timestamps.replace_all(&out, "<ts>").into_owned();
    out = p.addresses.replace_all(&out, "<addr>").into_owned();
    out = p
        .long_hex
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            if caps[0].len() >= 8 {
                "<hex>".to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();
    out = p.paths.replace_all(&out, "<path>").into_owned();
    out = p.numbers.replace_all(&out, "<n>").into_owned();
    p.whitespace.replace_all(out.trim(), " ").into_owned()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns up to `max_frames` frame lines from a stack trace.
///
/// Recognises JavaScript/Java (`at ...`), Python (`File "..."`) and numbered
/// (`#3 ...`) frames. When none of those are present, every non-empty line
/// after the header is treated as a frame.
pub fn top_frames(stack_trace: &str, max_frames: usize) -> Vec<String> {
    if max_frames == 0 {
        return Vec::new();
    }
    let lines: Vec<&str> = stack_trace
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let is_frame = |line: &&str| {
        line.starts_with("at ")
            || line.starts_with("File \"")
            || (line.starts_with('#') && line[1..].starts_with(|c: char| c.is_ascii_digit()))
    };

    let framed: Vec<&str> = lines.iter().copied().filter(is_frame).collect();
    let chosen = if framed.is_empty() {
        lines.into_iter().skip(1).collect()
    } else {
        framed
    };
    chosen
        .into_iter()
        .take(max_frames)
        .map(str::to_string)
        .collect()
}
