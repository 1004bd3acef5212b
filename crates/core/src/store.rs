//! Write-back into a value tree.
//!
//! Walks a token sequence from the root, creating missing containers on
//! the way (auto-vivification), and overwrites whatever sits at the final
//! token. Container kinds are dictated by the tokens themselves: a key
//! token needs a mapping, an index token needs a sequence. A wrong-kinded
//! container in an intermediate position is replaced outright
//! (last-writer-wins); a non-container scalar there is a structural
//! conflict and aborts the write, because silently turning a leaf into a
//! container would corrupt data the caller still believes in.

use serde_json::{Map, Value};

use crate::path::{self, PathError, Token};
use crate::resolve::Resolver;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// A path demanded a container kind where an existing non-container
/// value sits.
///
/// Unlike unresolved references and recovery failures, this is raised
/// rather than substituted: a path expression and a tree shape that are
/// fundamentally incompatible indicate a configuration error worth
/// surfacing, not a condition to paper over.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("structural conflict at '{path}': path needs a {required}, found {found}")]
pub struct StructuralConflict {
    /// Dotted/indexed rendering of the tokens up to the conflict.
    pub path: String,
    /// Container kind the path requires ("mapping" or "sequence").
    pub required: &'static str,
    /// Kind of the value actually present.
    pub found: &'static str,
}

/// Errors from the combined tokenize-and-write entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Conflict(#[from] StructuralConflict),
}

/// Kind name for conflict diagnostics.
fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

// ──────────────────────────────────────────────
// Write
// ──────────────────────────────────────────────

/// Store `value` into `tree` at the location named by `tokens`.
///
/// Missing keys and `Null` slots become containers of the required kind;
/// sequences are padded with empty mappings until the index is
/// addressable; the final token overwrites unconditionally (leaf
/// overwrite is always permitted). Writing the same value along the same
/// tokens twice leaves the tree identical to the first write.
///
/// An empty token slice is a no-op; the tokenizer never produces one.
pub fn write(tree: &mut Value, tokens: &[Token], value: Value) -> Result<(), StructuralConflict> {
    if tokens.is_empty() {
        return Ok(());
    }
    write_at(tree, tokens, 0, value)
}

/// Tokenize `path_expr` against the current tree state, then [`write`].
///
/// Variable segments in the expression are resolved against the tree
/// *before* the write, so `{type}.name` writes under whatever `type`
/// held at call time.
pub fn write_path(
    tree: &mut Value,
    path_expr: &str,
    value: Value,
    resolver: &Resolver,
) -> Result<(), WriteError> {
    let tokens = path::tokenize(path_expr, tree, resolver)?;
    write(tree, &tokens, value)?;
    Ok(())
}

fn write_at(
    cursor: &mut Value,
    tokens: &[Token],
    pos: usize,
    value: Value,
) -> Result<(), StructuralConflict> {
    let last = pos + 1 == tokens.len();
    match &tokens[pos] {
        Token::Key(key) => {
            let map = mapping_at(cursor, tokens, pos)?;
            if last {
                map.insert(key.clone(), value);
                Ok(())
            } else {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                write_at(child, tokens, pos + 1, value)
            }
        }
        Token::Index(index) => {
            let seq = sequence_at(cursor, tokens, pos)?;
            // Pad with empty mappings until the index is addressable.
            while seq.len() <= *index {
                seq.push(Value::Object(Map::new()));
            }
            if last {
                seq[*index] = value;
                Ok(())
            } else {
                write_at(&mut seq[*index], tokens, pos + 1, value)
            }
        }
    }
}

/// Coerce the cursor into a mapping per the write policy and return it.
fn mapping_at<'v>(
    cursor: &'v mut Value,
    tokens: &[Token],
    pos: usize,
) -> Result<&'v mut Map<String, Value>, StructuralConflict> {
    match cursor {
        Value::Object(_) => {}
        // Wrong-kinded container: last-writer-wins replacement.
        Value::Null | Value::Array(_) => *cursor = Value::Object(Map::new()),
        leaf => {
            return Err(StructuralConflict {
                path: path::render(&tokens[..pos]),
                required: "mapping",
                found: kind_name(leaf),
            })
        }
    }
    match cursor {
        Value::Object(map) => Ok(map),
        leaf => Err(StructuralConflict {
            path: path::render(&tokens[..pos]),
            required: "mapping",
            found: kind_name(leaf),
        }),
    }
}

/// Coerce the cursor into a sequence per the write policy and return it.
fn sequence_at<'v>(
    cursor: &'v mut Value,
    tokens: &[Token],
    pos: usize,
) -> Result<&'v mut Vec<Value>, StructuralConflict> {
    match cursor {
        Value::Array(_) => {}
        Value::Null | Value::Object(_) => *cursor = Value::Array(Vec::new()),
        leaf => {
            return Err(StructuralConflict {
                path: path::render(&tokens[..pos]),
                required: "sequence",
                found: kind_name(leaf),
            })
        }
    }
    match cursor {
        Value::Array(seq) => Ok(seq),
        leaf => Err(StructuralConflict {
            path: path::render(&tokens[..pos]),
            required: "sequence",
            found: kind_name(leaf),
        }),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
