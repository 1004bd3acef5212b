//! Prompt assembly from classified template segments.
//!
//! Callers describe a generation request as a list of (already resolved)
//! text segments in three shapes: `(...)` background information,
//! `<...>` requested output content, `[...]` output format descriptions
//! such as `story=, choice1=, choice2=`. Assembly pairs each `<content>`
//! segment with the `[format]` segment immediately following it, derives
//! the set of output fields, and renders a strict-JSON answer skeleton
//! that the recovery layer can parse back out of the reply.

use once_cell::sync::Lazy;
use regex::Regex;

/// Field names inside a format segment: everything before each `=`.
static FIELD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^=,\s]+)=").unwrap());

/// Template segments sorted by shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSegments {
    /// `(...)` background information segments.
    pub info: Vec<String>,
    /// `<...>` requested output content segments.
    pub content: Vec<String>,
    /// `[...]` output format segments.
    pub format: Vec<String>,
    /// Adjacent `<content>`/`[format]` pairs, in order.
    pub pairs: Vec<(String, String)>,
}

/// Classify segments by their delimiters and pair adjacent
/// content/format segments.
pub fn parse_segments(segments: &[String]) -> ParsedSegments {
    let mut parsed = ParsedSegments::default();

    for segment in segments {
        let segment = segment.trim();
        if let Some(info) = strip_delimiters(segment, '(', ')') {
            parsed.info.push(info.to_string());
        } else if let Some(content) = strip_delimiters(segment, '<', '>') {
            parsed.content.push(content.to_string());
        } else if let Some(format) = strip_delimiters(segment, '[', ']') {
            parsed.format.push(format.to_string());
        }
    }

    let mut i = 0;
    while i + 1 < segments.len() {
        let current = segments[i].trim();
        let next = segments[i + 1].trim();
        match (
            strip_delimiters(current, '<', '>'),
            strip_delimiters(next, '[', ']'),
        ) {
            (Some(content), Some(format)) => {
                parsed.pairs.push((content.to_string(), format.to_string()));
                i += 2;
            }
            _ => i += 1,
        }
    }

    parsed
}

fn strip_delimiters(segment: &str, open: char, close: char) -> Option<&str> {
    segment
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
}

/// Extract the output field names named in a format segment
/// (`story=, choice1=` yields `story`, `choice1`).
fn field_names(format: &str) -> Vec<String> {
    FIELD_NAME
        .captures_iter(format)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// A prompt template with `{key}` substitution slots.
///
/// Known slots: `{background}`, `{content}`, `{format}`, `{input_info}`
/// and `{json_format}`. Substitution is plain text replacement of the
/// slots that appear; unknown braces survive untouched. This is
/// deliberately simpler than tree-backed placeholder resolution, which
/// happens on the segments before they reach assembly.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        PromptTemplate {
            template: "\
Respond strictly in the following JSON format, with no other content or explanation:

{json_format}

Make sure the output is valid JSON and contains every field listed.
Provided information: {input_info}"
                .to_string(),
        }
    }
}

impl PromptTemplate {
    /// A template with caller-supplied text.
    pub fn new(template: impl Into<String>) -> Self {
        PromptTemplate {
            template: template.into(),
        }
    }

    /// Assemble the final prompt from classified segments.
    pub fn build_prompt(&self, segments: &[String]) -> String {
        let parsed = parse_segments(segments);

        let input_info = parsed
            .info
            .iter()
            .map(|info| format!("({info})"))
            .collect::<Vec<_>>()
            .join(" ");

        // Output fields, each with the content description it came from.
        let mut fields: Vec<(String, String)> = Vec::new();
        if !parsed.pairs.is_empty() {
            for (content, format) in &parsed.pairs {
                for field in field_names(format) {
                    push_unique(&mut fields, field, content.clone());
                }
            }
        } else if let Some(format) = parsed.format.first() {
            for field in field_names(format) {
                let description = field.replace('_', " ");
                push_unique(&mut fields, field, description);
            }
        }
        let json_format = json_skeleton(&fields);

        let background = parsed
            .info
            .iter()
            .map(|info| format!("({info})"))
            .collect::<Vec<_>>()
            .join("\n");
        let content = parsed
            .content
            .iter()
            .map(|content| format!("<{content}>"))
            .collect::<Vec<_>>()
            .join("\n");

        apply_template(
            &self.template,
            &[
                ("background", background),
                ("content", content),
                ("format", json_format.clone()),
                ("input_info", input_info),
                ("json_format", json_format),
            ],
        )
    }
}

fn push_unique(fields: &mut Vec<(String, String)>, field: String, description: String) {
    if !fields.iter().any(|(existing, _)| *existing == field) {
        fields.push((field, description));
    }
}

/// Render the strict-JSON answer skeleton the service is asked to fill.
fn json_skeleton(fields: &[(String, String)]) -> String {
    let mut out = String::from("{\n");
    for (i, (field, description)) in fields.iter().enumerate() {
        out.push_str(&format!(
            "  \"{field}\": \"<write the {description} here>\""
        ));
        if i + 1 < fields.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push('}');
    out
}

/// Replace each `{key}` slot that appears in the template.
fn apply_template(template: &str, replacements: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in replacements {
        let slot = format!("{{{key}}}");
        if out.contains(&slot) {
            out = out.replace(&slot, value);
        }
    }
    out
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
