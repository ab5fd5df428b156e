use serde::Deserialize;

/// Analysis extracted from a completion, before ids and timing are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSummary {
    pub root_cause: String,
    pub impact_assessment: String,
    pub suggested_solutions: Vec<String>,
    pub confidence_score: f64,
}

const TEXT_CONFIDENCE: f64 = 0.7;
const UNSTRUCTURED_CONFIDENCE: f64 = 0.3;
const DEFAULT_CONFIDENCE: f64 = 0.5;
const MIN_SOLUTION_CHARS: usize = 10;
const MAX_EXTRA_SOLUTIONS: usize = 5;

#[derive(Deserialize)]
struct WireSummary {
    #[serde(default)]
    root_cause: Option<String>,
    #[serde(default)]
    impact_assessment: Option<String>,
    #[serde(default)]
    suggested_solutions: Option<Solutions>,
    #[serde(default)]
    confidence_score: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Solutions {
    List(Vec<String>),
    One(String),
}

fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn non_empty(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_CONFIDENCE
    }
}

fn bullet(line: &str) -> Option<&str> {
    let line = line.trim();
    let stripped = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix('•'))
        .or_else(|| {
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            line[digits..]
                .strip_prefix(". ")
                .or_else(|| line[digits..].strip_prefix(") "))
        })?;
    Some(stripped.trim())
}

fn parse_json(body: &str) -> Option<ParsedSummary> {
    let wire: WireSummary = serde_json::from_str(body).ok()?;
    let suggested_solutions = match wire.suggested_solutions {
        Some(Solutions::List(list)) => list,
        Some(Solutions::One(one)) => vec![one],
        None => Vec::new(),
    }
    .into_iter()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect();
    Some(ParsedSummary {
        root_cause: non_empty(wire.root_cause, "Unknown error cause"),
        impact_assessment: non_empty(wire.impact_assessment, "Impact unclear"),
        suggested_solutions,
        confidence_score: clamp_confidence(wire.confidence_score.unwrap_or(DEFAULT_CONFIDENCE)),
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    RootCause,
    Impact,
    Solutions,
}

fn parse_sections(body: &str) -> ParsedSummary {
    let mut root_cause = None;
    let mut impact = None;
    let mut solutions = Vec::new();
    let mut section = None;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let item = bullet(line);
        if let (Some(Section::Solutions), Some(item)) = (section, item) {
            if !item.is_empty() {
                solutions.push(item.to_string());
            }
            continue;
        }
        let lower = line.to_lowercase();
        let heading = if lower.contains("root cause") {
            Some(Section::RootCause)
        } else if lower.contains("impact") {
            Some(Section::Impact)
        } else if lower.contains("solution") || (lower.contains("fix") && lower.ends_with(':')) {
            Some(Section::Solutions)
        } else {
            None
        };
        if let Some(found) = heading {
            section = Some(found);
            // Inline content after "Root cause: ..." counts.
            if let Some((_, rest)) = line.split_once(':') {
                let rest = rest.trim();
                if !rest.is_empty() && found != Section::Solutions {
                    let slot = if found == Section::RootCause { &mut root_cause } else { &mut impact };
                    *slot = Some(rest.to_string());
                }
            }
            continue;
        }
        match (section, item) {
            (Some(Section::RootCause), None) => root_cause = Some(line.to_string()),
            (Some(Section::Impact), None) => impact = Some(line.to_string()),
            _ => {}
        }
    }

    if root_cause.is_none() && impact.is_none() && solutions.is_empty() {
        let clipped: String = body.chars().take(200).collect();
        return ParsedSummary {
            root_cause: clipped,
            impact_assessment: "Unable to assess impact from response".to_string(),
            suggested_solutions: vec!["Review the error details and consult documentation".to_string()],
            confidence_score: UNSTRUCTURED_CONFIDENCE,
        };
    }
    ParsedSummary {
        root_cause: root_cause.unwrap_or_else(|| "Error analysis provided".to_string()),
        impact_assessment: impact.unwrap_or_else(|| "Impact assessment provided".to_string()),
        suggested_solutions: solutions,
        confidence_score: TEXT_CONFIDENCE,
    }
}

/// Parses a completion into a summary.
///
/// `None` means the response is malformed (empty, or JSON that does not
/// parse) and the call should be retried.
pub fn parse_summary(content: &str) -> Option<ParsedSummary> {
    let body = strip_fence(content);
    if body.is_empty() {
        return None;
    }
    if body.starts_with('{') {
        return parse_json(body);
    }
    // Prose wrapped around a JSON object.
    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Some(parsed) = parse_json(&body[start..=end]) {
                return Some(parsed);
            }
        }
    }
    Some(parse_sections(body))
}

/// Bulleted solutions from a solution-enhancement reply.
pub fn parse_solutions(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(bullet)
        .filter(|s| s.chars().count() > MIN_SOLUTION_CHARS)
        .map(str::to_string)
        .take(MAX_EXTRA_SOLUTIONS)
        .collect()
}
