//! Path expressions, tokens, and read-side lookup.
//!
//! A path expression names a location in a value tree: dot-separated
//! segments, each optionally followed by one or more `[n]` index suffixes
//! (`era.history.events[0].description`). A segment may itself contain a
//! `{...}` reference expression; [`tokenize`] resolves those against the
//! tree first, so a token sequence is always literal. Evaluating the same
//! expression twice against the same tree state yields the same tokens.

use serde_json::Value;

use crate::resolve::Resolver;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors produced while turning a path expression into tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The expression contained no tokens at all.
    #[error("empty path expression")]
    Empty,

    /// A dot-segment had neither a key nor an index (`a..b`, trailing dot).
    #[error("empty segment in path expression '{expr}'")]
    EmptySegment { expr: String },

    /// A segment opened an index bracket that never closes.
    #[error("unterminated index bracket in segment '{segment}'")]
    UnterminatedIndex { segment: String },

    /// An index bracket held something other than an unsigned integer.
    #[error("invalid index '{index}' in segment '{segment}'")]
    InvalidIndex { segment: String, index: String },

    /// Characters followed a closing index bracket (`items[0]x`).
    #[error("unexpected characters after index in segment '{segment}'")]
    TrailingCharacters { segment: String },
}

// ──────────────────────────────────────────────
// Tokens
// ──────────────────────────────────────────────

/// A single resolved step of a path: a mapping key or a sequence index.
///
/// Produced once by the tokenizer and consumed uniformly by [`lookup`]
/// and by the write-back engine, so no later stage re-inspects the shape
/// of a path segment string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Key(String),
    Index(usize),
}

/// Render a token slice back into dotted/indexed form for diagnostics.
pub(crate) fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Token::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}

// ──────────────────────────────────────────────
// Tokenization
// ──────────────────────────────────────────────

/// Parse a literal path expression (placeholders already resolved) into
/// an ordered token sequence.
///
/// Splits on `.`; within each segment, trailing `[n]` groups are peeled
/// into `Token::Index` entries after the segment's `Token::Key`. A
/// segment consisting only of index groups (`[0].name`) emits indices
/// alone, addressing a sequence at that level.
pub fn parse_tokens(path: &str) -> Result<Vec<Token>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut tokens = Vec::new();
    for segment in path.split('.') {
        let (name, mut rest) = match segment.find('[') {
            Some(open) => (&segment[..open], &segment[open..]),
            None => (segment, ""),
        };

        if name.is_empty() && rest.is_empty() {
            return Err(PathError::EmptySegment {
                expr: path.to_string(),
            });
        }
        if !name.is_empty() {
            tokens.push(Token::Key(name.to_string()));
        }

        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped
                .find(']')
                .ok_or_else(|| PathError::UnterminatedIndex {
                    segment: segment.to_string(),
                })?;
            let index_text = &stripped[..close];
            let index =
                index_text
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| PathError::InvalidIndex {
                        segment: segment.to_string(),
                        index: index_text.to_string(),
                    })?;
            tokens.push(Token::Index(index));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return Err(PathError::TrailingCharacters {
                segment: segment.to_string(),
            });
        }
    }

    Ok(tokens)
}

/// Tokenize a path expression against a tree, resolving embedded `{...}`
/// references first.
///
/// `{type}.name` with `tree.type == "era"` tokenizes as `era` / `name`.
/// The token sequence reflects the tree state at call time; callers that
/// mutate the tree between tokenizing and writing re-tokenize.
pub fn tokenize(path_expr: &str, tree: &Value, resolver: &Resolver) -> Result<Vec<Token>, PathError> {
    let resolved = resolver.resolve(path_expr, tree);
    parse_tokens(&resolved)
}

// ──────────────────────────────────────────────
// Read-side lookup
// ──────────────────────────────────────────────

/// Look up a literal dotted/indexed path inside a value.
///
/// Returns `None` on any miss: absent key, index out of range, a key
/// applied to a non-mapping, an index applied to a non-sequence, or a
/// path that does not tokenize. Lookup never fails harder than `None`
/// and never mutates the value.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let tokens = parse_tokens(path).ok()?;
    let mut cursor = root;
    for token in &tokens {
        cursor = match token {
            Token::Key(key) => cursor.as_object()?.get(key)?,
            Token::Index(index) => cursor.as_array()?.get(*index)?,
        };
    }
    Some(cursor)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
