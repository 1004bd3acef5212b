//! Structured-value recovery from untrusted free text.
//!
//! Generation output is free text: sometimes clean JSON, sometimes JSON
//! wrapped in prose or markdown fences, sometimes near-JSON with bare
//! keys and trailing commas, sometimes nothing structured at all. No
//! single parse is reliable, so recovery layers strategies that trade
//! strictness for recall:
//!
//! 1. strip code fences, trim to the outermost bracket hull, strict parse
//! 2. extract the first balanced bracketed span and strict-parse it
//! 3. textually repair the extracted span, then reparse
//! 4. scan the whole text for `key=value` / `key:"value"` pairs
//! 5. return a failure value carrying the raw text and a reason
//!
//! The final layer guarantees the pipeline continues (degraded but
//! defined) instead of aborting: a [`RecoveryResult::Failure`] is a
//! returned value, never a panic or an error propagation.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

/// First balanced `{...}` span, tolerating one level of internal nesting.
static OBJECT_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").unwrap());

/// First balanced `[...]` span, tolerating one level of internal nesting.
static ARRAY_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*(?:\[[^\[\]]*\][^\[\]]*)*\]").unwrap());

/// Unquoted mapping key directly after `{` or `,`.
static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap());

/// Unquoted single-word value before `,`, `}` or `]`.
static BARE_WORD_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*([,}\]])").unwrap());

/// Separator left dangling before a closing bracket.
static TRAILING_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Default key/value pair pattern for the fallback layer: an optionally
/// quoted key, `=` or `:`, then a quoted or bare scalar value.
static KV_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?([A-Za-z_][A-Za-z0-9_.\-]*)["']?\s*[=:]\s*(?:"([^"]*)"|'([^']*)'|([A-Za-z0-9_.+\-]+))"#)
        .unwrap()
});

// ──────────────────────────────────────────────
// Result type
// ──────────────────────────────────────────────

/// Outcome of a recovery attempt. Always a value, never an exception:
/// downstream code branches on the variant instead of catching.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryResult {
    /// A well-formed value was recovered (normally a mapping of
    /// output-field to value).
    Success(Value),
    /// Nothing structured could be recovered. Carries the unmodified raw
    /// text for diagnostics or manual fallback.
    Failure { reason: String, raw_output: String },
}

impl RecoveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RecoveryResult::Success(_))
    }

    /// The recovered value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            RecoveryResult::Success(value) => Some(value),
            RecoveryResult::Failure { .. } => None,
        }
    }

    /// Collapse into a plain value: the recovered value itself, or the
    /// `{error, raw_output}` mapping for failures, so callers that store
    /// every outcome can do so uniformly.
    pub fn into_value(self) -> Value {
        match self {
            RecoveryResult::Success(value) => value,
            RecoveryResult::Failure { reason, raw_output } => serde_json::json!({
                "error": reason,
                "raw_output": raw_output,
            }),
        }
    }
}

// ──────────────────────────────────────────────
// Recovery
// ──────────────────────────────────────────────

/// The layered recovery strategy.
///
/// Caller-constructed; holds no global state. The key/value fallback
/// pattern is injectable for callers whose generation service emits a
/// house style of pair syntax.
pub struct Recovery {
    kv_pattern: Regex,
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Recovery {
    /// Recovery with the default key/value fallback pattern.
    pub fn new() -> Self {
        Recovery {
            kv_pattern: KV_PAIR.clone(),
        }
    }

    /// Recovery with a custom fallback pattern. Capture group 1 is the
    /// key; group 2 (and, if present, groups 3/4 per the default
    /// quoted/bare alternation) the value. With a plain two-group
    /// pattern every captured value is kept as text.
    pub fn with_kv_pattern(kv_pattern: Regex) -> Self {
        Recovery { kv_pattern }
    }

    /// Recover a structured value from raw output text.
    pub fn recover(&self, raw: &str) -> RecoveryResult {
        // Layer 1: clean up and parse the whole bracket hull.
        if let Some(value) = parse_hull(raw) {
            return RecoveryResult::Success(value);
        }

        // Layers 2 and 3: pull out the first balanced span, parse it
        // strictly, then parse it repaired.
        if let Some(span) = extract_span(raw) {
            if let Ok(value) = serde_json::from_str(span) {
                return RecoveryResult::Success(value);
            }
            if let Ok(value) = serde_json::from_str::<Value>(&repair(span)) {
                return RecoveryResult::Success(value);
            }
        }

        // Layer 4: key/value pair scan over the whole raw text.
        let pairs = self.scan_pairs(raw);
        if !pairs.is_empty() {
            return RecoveryResult::Success(Value::Object(pairs));
        }

        // Layer 5: explicit failure value.
        RecoveryResult::Failure {
            reason: "no structured content found in output".to_string(),
            raw_output: raw.to_string(),
        }
    }

    /// Scan for key/value pairs anywhere in the text. Quoted values stay
    /// text; bare values coerce by literal rules. Later pairs win on
    /// duplicate keys.
    fn scan_pairs(&self, raw: &str) -> Map<String, Value> {
        let mut pairs = Map::new();
        for caps in self.kv_pattern.captures_iter(raw) {
            let Some(key) = caps.get(1) else { continue };
            let value = if let Some(quoted) = caps.get(2).or_else(|| caps.get(3)) {
                Value::String(quoted.as_str().to_string())
            } else if let Some(bare) = caps.get(4) {
                coerce_scalar(bare.as_str())
            } else {
                continue;
            };
            pairs.insert(key.as_str().trim().to_string(), value);
        }
        pairs
    }
}

// ──────────────────────────────────────────────
// Layer helpers
// ──────────────────────────────────────────────

/// Layer 1: strip fences, trim to the outermost `{…}`/`[…]` hull, strict
/// parse. `None` when there is no hull or the hull does not parse.
fn parse_hull(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    let open = cleaned.find(['{', '['])?;
    let close_char = if cleaned.as_bytes()[open] == b'{' { '}' } else { ']' };
    let close = cleaned.rfind(close_char)?;
    if close < open {
        return None;
    }
    serde_json::from_str(&cleaned[open..=close]).ok()
}

/// Strip markdown code fences (```json ... ``` or ``` ... ```), skipping
/// a language tag on the opening fence line.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
        return rest.trim();
    }
    trimmed
}

/// Layer 2: the first balanced bracketed span anywhere in the text,
/// whichever of object/array starts earlier.
fn extract_span(raw: &str) -> Option<&str> {
    match (OBJECT_SPAN.find(raw), ARRAY_SPAN.find(raw)) {
        (Some(obj), Some(arr)) => Some(if obj.start() <= arr.start() {
            obj.as_str()
        } else {
            arr.as_str()
        }),
        (Some(obj), None) => Some(obj.as_str()),
        (None, Some(arr)) => Some(arr.as_str()),
        (None, None) => None,
    }
}

/// Layer 3: textual repairs for near-JSON -- quote bare keys, quote bare
/// word values (JSON literals excepted), drop trailing separators.
fn repair(span: &str) -> String {
    let quoted_keys = BARE_KEY.replace_all(span, "${1}\"${2}\":");
    let quoted_words = BARE_WORD_VALUE.replace_all(&quoted_keys, |caps: &Captures<'_>| {
        let word = &caps[1];
        if matches!(word, "true" | "false" | "null") {
            format!(": {}{}", word, &caps[2])
        } else {
            format!(": \"{}\"{}", word, &caps[2])
        }
    });
    TRAILING_SEPARATOR.replace_all(&quoted_words, "$1").into_owned()
}

/// Coerce a bare scalar token using simple literal rules.
fn coerce_scalar(token: &str) -> Value {
    match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(int) = token.parse::<i64>() {
                return Value::from(int);
            }
            if let Ok(float) = token.parse::<f64>() {
                if let Some(number) = serde_json::Number::from_f64(float) {
                    return Value::Number(number);
                }
            }
            Value::String(token.to_string())
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
