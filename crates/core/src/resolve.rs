//! Placeholder resolution over template text.
//!
//! Template text may embed `{...}` reference expressions: dotted paths
//! into the tree (`{character.name}`), computed indices
//! (`{skills[{active_skill_index}]}`), nested references
//! (`{character.{identity_field}}`), and external document references
//! (`{text;eras;eras[0].name}`). Expansion is innermost-first and iterates
//! to a fixpoint under a pass cap, so any finite nesting depth resolves
//! without a full expression grammar and pathological self-references
//! still terminate.
//!
//! Resolution is total: a reference that cannot be resolved substitutes a
//! diagnostic marker (or a documented default for a few well-known keys)
//! and the surrounding text survives. The tree is never mutated here.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::path::lookup;

/// Innermost placeholder: brace-delimited content with no inner brace.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// Prefix selecting the external-document reference form
/// `text;<documentId>;<path>`.
const EXTERNAL_SENTINEL: &str = "text;";

/// Default number of expansion passes before giving up on a template.
pub const DEFAULT_MAX_PASSES: usize = 20;

/// Keys that substitute a documented default instead of a miss marker.
const KNOWN_DEFAULTS: &[(&str, &str)] = &[
    ("world_setting", "a fantasy world"),
    ("location", "an unknown place"),
];

// ──────────────────────────────────────────────
// External document loading
// ──────────────────────────────────────────────

/// Loads external documents referenced as `text;<documentId>;<path>`.
///
/// Implementations fetch documents from wherever they live (file system,
/// database, remote store). Returning `None` means the document does not
/// exist; loading never fails harder than that from the resolver's point
/// of view.
pub trait DocumentLoader {
    fn load(&self, document_id: &str) -> Option<Value>;
}

/// A loader over a fixed in-memory set of documents.
///
/// Useful for tests and for corpora the caller loads up front.
pub struct StaticDocumentLoader {
    documents: HashMap<String, Value>,
}

impl StaticDocumentLoader {
    /// Create a loader serving the given documents.
    pub fn new(documents: HashMap<String, Value>) -> Self {
        Self { documents }
    }

    /// Create a loader with no documents.
    pub fn empty() -> Self {
        Self {
            documents: HashMap::new(),
        }
    }
}

impl DocumentLoader for StaticDocumentLoader {
    fn load(&self, document_id: &str) -> Option<Value> {
        self.documents.get(document_id).cloned()
    }
}

// ──────────────────────────────────────────────
// Resolver
// ──────────────────────────────────────────────

/// Expands placeholder expressions in template text against a value tree.
pub struct Resolver<'a> {
    /// Upper bound on expansion passes. Guards self-referential or
    /// otherwise pathological placeholder text.
    pub max_passes: usize,
    loader: Option<&'a dyn DocumentLoader>,
}

impl Default for Resolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Resolver<'a> {
    /// Create a resolver without external document support.
    pub fn new() -> Self {
        Resolver {
            max_passes: DEFAULT_MAX_PASSES,
            loader: None,
        }
    }

    /// Create a resolver that serves `text;documentId;path` references
    /// through the given loader.
    pub fn with_loader(loader: &'a dyn DocumentLoader) -> Self {
        Resolver {
            max_passes: DEFAULT_MAX_PASSES,
            loader: Some(loader),
        }
    }

    /// Expand every placeholder expression in `text` against `tree`.
    ///
    /// Innermost expressions expand first, so nested forms like
    /// `{character.{identity_field}}` resolve from the inside out. Passes
    /// repeat until a pass finds no match, leaves the text unchanged, or
    /// the pass cap is reached. The result may still contain markers for
    /// unresolved references; it is never an error.
    pub fn resolve(&self, text: &str, tree: &Value) -> String {
        if !text.contains('{') {
            return text.to_string();
        }

        let mut current = text.to_string();
        for _ in 0..self.max_passes {
            if !PLACEHOLDER.is_match(&current) {
                break;
            }
            let next = PLACEHOLDER
                .replace_all(&current, |caps: &Captures<'_>| self.expand(&caps[1], tree))
                .into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Expand a single brace-free reference expression.
    fn expand(&self, content: &str, tree: &Value) -> String {
        if let Some(rest) = content.strip_prefix(EXTERNAL_SENTINEL) {
            return self.expand_external(content, rest);
        }
        match lookup(tree, content) {
            Some(value) => stringify(value),
            None => miss(content),
        }
    }

    /// Expand `text;<documentId>;<path>`: load the document, then walk
    /// the dotted/indexed path inside it.
    fn expand_external(&self, content: &str, rest: &str) -> String {
        let mut parts = rest.splitn(2, ';');
        let (document_id, doc_path) = match (parts.next(), parts.next()) {
            (Some(id), Some(path)) if !id.is_empty() && !path.is_empty() => (id, path),
            _ => return miss(content),
        };
        let Some(loader) = self.loader else {
            return miss(content);
        };
        let Some(document) = loader.load(document_id) else {
            return miss(content);
        };
        match lookup(&document, doc_path) {
            Some(value) => stringify(value),
            None => miss(content),
        }
    }
}

/// Substitution for an unresolved reference.
///
/// The well-known keys in [`KNOWN_DEFAULTS`] fall back to their documented
/// defaults; everything else becomes an explicit marker. The marker uses
/// square brackets so it can never re-trigger expansion, and a marker
/// that leaks into a path expression fails tokenization loudly.
fn miss(content: &str) -> String {
    for (key, default) in KNOWN_DEFAULTS {
        if content == *key {
            return (*default).to_string();
        }
    }
    format!("[not found: {content}]")
}

/// Canonical textual form of a value substituted into template text.
///
/// Text substitutes without quotes, scalars use their JSON rendering, and
/// mappings/sequences use their compact JSON form.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        container => serde_json::to_string(container).unwrap_or_default(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
