//! Prompt construction.
//!
//! A prompt carries deduplicated messages with occurrence counts, the top
//! stack frames of each distinct message and its context split into
//! location, command and other keys. The template depends on the mix of
//! records: one distinct error, one category, or a mixed batch.

use error_collector_normalizer::top_frames;
use error_collector_protocol::{Category, ErrorRecord, ErrorSource, ErrorSummary};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

pub const SYSTEM_PROMPT: &str = "You are a senior engineer helping a developer debug errors collected \
from their browser and terminal.

For the errors you are given, work out:
1. the root cause,
2. the impact on the application or workflow,
3. concrete fixes the developer can apply right away.

Reply with a single JSON object and nothing else:
{\"root_cause\": string, \"impact_assessment\": string, \
\"suggested_solutions\": [3 to 5 strings], \"confidence_score\": number between 0.0 and 1.0}";

pub const SOLUTION_SYSTEM_PROMPT: &str = "You are a senior engineer. Give practical, specific fixes \
for programming errors as a bulleted list, one fix per line starting with \"- \".";

const MAX_STACK_CHARS: usize = 1_000;
const MAX_CONTEXT_VALUE_CHARS: usize = 200;

const LOCATION_KEYS: &[&str] = &[
    "url",
    "page_title",
    "user_agent",
    "line",
    "line_number",
    "column",
    "column_number",
    "file",
    "filename",
    "error_type",
];
const COMMAND_KEYS: &[&str] = &[
    "command",
    "exit_code",
    "working_directory",
    "cwd",
    "shell",
    "stderr",
    "stdout",
];

/// Records sharing a fingerprint, folded into one prompt entry.
struct Distinct<'a> {
    first: &'a ErrorRecord,
    occurrences: u64,
}

fn distinct(records: &[ErrorRecord]) -> Vec<Distinct<'_>> {
    let mut order: Vec<Distinct<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for record in records {
        match index.get(record.fingerprint.as_str()) {
            Some(&i) => order[i].occurrences += record.occurrence_count.max(1),
            None => {
                index.insert(record.fingerprint.as_str(), order.len());
                order.push(Distinct {
                    first: record,
                    occurrences: record.occurrence_count.max(1),
                });
            }
        }
    }
    order
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("... [truncated]");
    out
}

fn write_context(out: &mut String, record: &ErrorRecord) {
    let mut location = Vec::new();
    let mut command = Vec::new();
    let mut other = Vec::new();
    for (key, value) in &record.context {
        let line = format!("{key}={}", clip(&value.to_string(), MAX_CONTEXT_VALUE_CHARS));
        let leaf = key.rsplit('.').next().unwrap_or(key);
        if LOCATION_KEYS.contains(&leaf) {
            location.push(line);
        } else if COMMAND_KEYS.contains(&leaf) {
            command.push(line);
        } else {
            other.push(line);
        }
    }
    for (label, lines) in [("Location", location), ("Command", command), ("Other", other)] {
        if !lines.is_empty() {
            let _ = writeln!(out, "- {label}: {}", lines.join(", "));
        }
    }
}

fn write_entry(out: &mut String, index: usize, entry: &Distinct<'_>, max_frames: usize) {
    let record = entry.first;
    let _ = writeln!(out, "**Error {index}** (seen {}x)", entry.occurrences);
    let _ = writeln!(out, "- Source: {}", record.source);
    let _ = writeln!(out, "- Category: {}", record.category);
    let _ = writeln!(out, "- Severity: {}", record.severity);
    let _ = writeln!(out, "- Message: {}", record.message.trim());
    write_context(out, record);
    if let Some(stack) = record.stack_trace.as_deref() {
        let frames = top_frames(&clip(stack, MAX_STACK_CHARS), max_frames);
        if !frames.is_empty() {
            let _ = writeln!(out, "- Top frames:");
            for frame in frames {
                let _ = writeln!(out, "    {frame}");
            }
        }
    }
    out.push('\n');
}

fn source_focus(source: ErrorSource) -> &'static [&'static str] {
    match source {
        ErrorSource::Browser => &[
            "Is this a well-known JavaScript failure pattern?",
            "Could browser compatibility or load order be involved?",
            "Which devtools checks would confirm the cause?",
        ],
        ErrorSource::Terminal => &[
            "What does this exit code usually mean for this command?",
            "Are permissions, missing dependencies or the environment involved?",
            "Which diagnostic commands would confirm the cause?",
        ],
        ErrorSource::Unknown => &["What is the most likely cause and the quickest way to verify it?"],
    }
}

fn category_focus(category: Category) -> &'static [&'static str] {
    match category {
        Category::Syntax => &[
            "Which construct is the parser rejecting?",
            "Is a tool or language version mismatch involved?",
        ],
        Category::Runtime => &[
            "Which value is unexpectedly missing or of the wrong type?",
            "Where should the guard or initialization go?",
        ],
        Category::Network => &[
            "Is the endpoint unreachable, slow, or refusing the request?",
            "Are CORS, DNS, TLS or proxy settings involved?",
        ],
        Category::Permission => &[
            "Which principal lacks which permission?",
            "What is the least-privilege fix?",
        ],
        Category::Resource => &[
            "Which resource is exhausted or missing?",
            "Is this a leak, a limit, or a wrong path?",
        ],
        Category::Logic => &[
            "Which assumption in the code is violated?",
            "What test would reproduce it?",
        ],
        Category::Unknown => &["What additional information would narrow this down?"],
    }
}

fn write_focus(out: &mut String, questions: &[&str]) {
    out.push_str("**Analysis focus:**\n");
    for q in questions {
        let _ = writeln!(out, "- {q}");
    }
    out.push('\n');
}

/// Builds the user prompt for `records` (already capped by the caller).
pub fn build_prompt(records: &[ErrorRecord], max_frames: usize) -> String {
    let entries = distinct(records);
    let mut out = String::new();

    let categories: BTreeSet<Category> = records.iter().map(|r| r.category).collect();
    let sources: BTreeSet<ErrorSource> = records.iter().map(|r| r.source).collect();

    match entries.as_slice() {
        [single] => {
            let _ = writeln!(
                out,
                "Analyze this {} error:\n",
                single.first.source.as_str()
            );
            write_entry(&mut out, 1, single, max_frames);
            write_focus(&mut out, source_focus(single.first.source));
        }
        _ => {
            let _ = writeln!(
                out,
                "Analyze these {} related errors ({} distinct):\n",
                records.len(),
                entries.len()
            );
            for (i, entry) in entries.iter().enumerate() {
                write_entry(&mut out, i + 1, entry, max_frames);
            }
            let first = records.iter().map(|r| r.timestamp).min();
            let last = records.iter().map(|r| r.timestamp).max();
            out.push_str("**Pattern:**\n");
            let _ = writeln!(
                out,
                "- Sources: {}",
                sources.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            );
            let _ = writeln!(
                out,
                "- Categories: {}",
                categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            );
            if let (Some(first), Some(last)) = (first, last) {
                let _ = writeln!(out, "- Time range: {} to {}", first.to_rfc3339(), last.to_rfc3339());
            }
            out.push('\n');

            if let [only] = categories.iter().collect::<Vec<_>>().as_slice() {
                write_focus(&mut out, category_focus(**only));
            } else {
                write_focus(
                    &mut out,
                    &[
                        "What root cause links these errors?",
                        "Is this a cascade, and which error should be fixed first?",
                        "Does the pattern point at a systemic issue?",
                    ],
                );
            }
        }
    }

    out.push_str("Respond with the JSON object only.");
    out
}

pub fn solution_prompt(summary: &ErrorSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Root cause: {}", summary.root_cause);
    let _ = writeln!(out, "Impact: {}", summary.impact_assessment);
    if !summary.suggested_solutions.is_empty() {
        out.push_str("Solutions already suggested:\n");
        for s in &summary.suggested_solutions {
            let _ = writeln!(out, "- {s}");
        }
    }
    out.push_str(
        "\nSuggest up to 5 additional fixes not listed above: preventive measures, \
debugging steps, or alternative approaches. One per line, starting with \"- \".",
    );
    out
}
