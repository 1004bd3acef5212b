//! Output mapping: recovered fields to tree locations.
//!
//! Callers describe where recovered values land with a table from output
//! field name to path expression. Path expressions may contain `{...}`
//! variable segments and `[n]` indices; missing containers are created
//! on the way down.

use std::collections::BTreeMap;

use serde_json::Value;
use weft_core::{write_path, Resolver, WriteError};

/// Caller-supplied table mapping recovered output fields to path
/// expressions in the tree.
pub type OutputMap = BTreeMap<String, String>;

/// Result of applying an output map.
#[derive(Debug, Clone, Default)]
pub struct AppliedOutputs {
    /// (field, path expression) pairs actually written.
    pub written: Vec<(String, String)>,
    /// Fields from the map that were absent in the recovered mapping.
    pub skipped: Vec<String>,
}

/// Write each recovered field through its path expression.
///
/// Each expression is resolved against the tree state as it stands at
/// that point in the application, so earlier writes are visible to later
/// variable segments. A structural conflict aborts the application; the
/// writes made so far remain.
pub fn apply_output_map(
    tree: &mut Value,
    recovered: &Value,
    outputs: &OutputMap,
    resolver: &Resolver<'_>,
) -> Result<AppliedOutputs, WriteError> {
    let mut applied = AppliedOutputs::default();
    for (field, path_expr) in outputs {
        let Some(value) = recovered.get(field) else {
            applied.skipped.push(field.clone());
            continue;
        };
        write_path(tree, path_expr, value.clone(), resolver)?;
        applied.written.push((field.clone(), path_expr.clone()));
    }
    Ok(applied)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::lookup;

    fn output_map(entries: &[(&str, &str)]) -> OutputMap {
        entries
            .iter()
            .map(|(field, path)| (field.to_string(), path.to_string()))
            .collect()
    }

    #[test]
    fn recovered_fields_land_at_their_paths() {
        let mut tree = json!({});
        let recovered = json!({ "name": "Dawn Era", "event": "collapse" });
        let outputs = output_map(&[
            ("name", "era.details.name"),
            ("event", "era.history.events[0].description"),
        ]);
        let applied =
            apply_output_map(&mut tree, &recovered, &outputs, &Resolver::new()).unwrap();

        assert_eq!(applied.written.len(), 2);
        assert!(applied.skipped.is_empty());
        assert_eq!(lookup(&tree, "era.details.name"), Some(&json!("Dawn Era")));
        assert_eq!(
            lookup(&tree, "era.history.events[0].description"),
            Some(&json!("collapse"))
        );
    }

    #[test]
    fn variable_segments_resolve_against_the_tree() {
        let mut tree = json!({ "temp_type": "era", "active_skill": "fireball" });
        let recovered = json!({ "name": "Dawn Era", "skill_power": 100 });
        let outputs = output_map(&[
            ("name", "{temp_type}.details.name"),
            ("skill_power", "character.skills.{active_skill}.power"),
        ]);
        apply_output_map(&mut tree, &recovered, &outputs, &Resolver::new()).unwrap();

        assert_eq!(lookup(&tree, "era.details.name"), Some(&json!("Dawn Era")));
        assert_eq!(
            lookup(&tree, "character.skills.fireball.power"),
            Some(&json!(100))
        );
    }

    #[test]
    fn absent_fields_are_skipped_not_errors() {
        let mut tree = json!({});
        let recovered = json!({ "present": 1 });
        let outputs = output_map(&[("present", "a"), ("absent", "b")]);
        let applied =
            apply_output_map(&mut tree, &recovered, &outputs, &Resolver::new()).unwrap();

        assert_eq!(applied.written, vec![("present".to_string(), "a".to_string())]);
        assert_eq!(applied.skipped, vec!["absent".to_string()]);
        assert_eq!(tree, json!({ "a": 1 }));
    }

    #[test]
    fn non_mapping_recovery_skips_everything() {
        let mut tree = json!({});
        let recovered = json!(["not", "a", "mapping"]);
        let outputs = output_map(&[("story", "current_story")]);
        let applied =
            apply_output_map(&mut tree, &recovered, &outputs, &Resolver::new()).unwrap();
        assert!(applied.written.is_empty());
        assert_eq!(applied.skipped, vec!["story".to_string()]);
    }

    #[test]
    fn structural_conflict_aborts_application() {
        let mut tree = json!({ "leaf": "scalar" });
        let recovered = json!({ "x": 1 });
        let outputs = output_map(&[("x", "leaf.inner")]);
        let err =
            apply_output_map(&mut tree, &recovered, &outputs, &Resolver::new()).unwrap_err();
        assert!(matches!(err, WriteError::Conflict(_)));
    }
}
