//! Full-cycle integration: resolve → generate → recover → write against
//! one state tree, with an external document corpus and a scripted
//! generation client.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use weft_core::{lookup, StaticDocumentLoader};
use weft_cycle::{Cycle, GenerationClient, GenerationError, OutputMap};

/// Scripted client: pops canned replies in order.
struct ScriptedClient {
    replies: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
        }
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        let mut queue = self.replies.lock().unwrap();
        if queue.is_empty() {
            return Err(GenerationError::Network("script exhausted".to_string()));
        }
        Ok(queue.remove(0))
    }
}

fn outputs(entries: &[(&str, &str)]) -> OutputMap {
    entries
        .iter()
        .map(|(field, path)| (field.to_string(), path.to_string()))
        .collect()
}

#[tokio::test]
async fn scene_generation_round_trip() {
    let mut documents = HashMap::new();
    documents.insert(
        "eras".to_string(),
        json!({ "eras": [{ "name": "Dawn" }, { "name": "Dusk" }] }),
    );
    let loader = StaticDocumentLoader::new(documents);

    let mut tree = json!({
        "identity_field": "profession",
        "character": {
            "name": "Aric",
            "profession": "scholar"
        },
        "current_era_index": 1,
        "skills": ["firebolt", "ward", "lantern light"],
        "active_skill_index": 2
    });

    let segments = vec![
        "(the {character.{identity_field}} {character.name} lives in the {text;eras;eras[{current_era_index}].name} era)".to_string(),
        "(their favored skill is {skills[{active_skill_index}]})".to_string(),
        "<a short opening scene>".to_string(),
        "[story=, mood=]".to_string(),
    ];
    let map = outputs(&[
        ("story", "scene.current.text"),
        ("mood", "scene.current.mood"),
    ]);

    let client = ScriptedClient::new(vec![
        r#"Sure! Here you go:
```json
{"story": "Lantern light flickers over old pages.", "mood": "hushed"}
```"#,
    ]);

    let mut cycle = Cycle::with_loader(&loader);
    cycle.retry_delay = Duration::from_millis(1);

    let report = cycle.run(&mut tree, &segments, &map, &client).await.unwrap();

    // Every reference form resolved before the prompt went out.
    assert!(report.prompt.contains("the scholar Aric lives in the Dusk era"));
    assert!(report.prompt.contains("their favored skill is lantern light"));
    assert!(report.prompt.contains("\"story\""));
    assert!(report.prompt.contains("\"mood\""));

    // The fenced reply was recovered and written back.
    assert_eq!(
        lookup(&tree, "scene.current.text"),
        Some(&json!("Lantern light flickers over old pages."))
    );
    assert_eq!(lookup(&tree, "scene.current.mood"), Some(&json!("hushed")));
    assert_eq!(report.skipped.len(), 0);
    assert!(!report.generated_at.is_empty());
}

#[tokio::test]
async fn consecutive_cycles_share_one_tree() {
    let mut tree = json!({ "temp_type": "era" });

    let first_map = outputs(&[
        ("name", "{temp_type}.details.name"),
        ("event", "{temp_type}.history.events[0].description"),
    ]);
    let second_map = outputs(&[("follow_up", "{temp_type}.history.events[1].description")]);

    let client = ScriptedClient::new(vec![
        r#"{"name": "Dawn Era", "event": "the long thaw"}"#,
        r#"{"follow_up": "the first cities"}"#,
    ]);

    let mut cycle = Cycle::new();
    cycle.retry_delay = Duration::from_millis(1);

    let segments = vec!["<era history>".to_string(), "[name=, event=]".to_string()];
    cycle.run(&mut tree, &segments, &first_map, &client).await.unwrap();

    let segments = vec!["<more era history>".to_string(), "[follow_up=]".to_string()];
    cycle.run(&mut tree, &segments, &second_map, &client).await.unwrap();

    assert_eq!(lookup(&tree, "era.details.name"), Some(&json!("Dawn Era")));
    assert_eq!(
        lookup(&tree, "era.history.events[0].description"),
        Some(&json!("the long thaw"))
    );
    assert_eq!(
        lookup(&tree, "era.history.events[1].description"),
        Some(&json!("the first cities"))
    );
}

#[tokio::test]
async fn degraded_reply_still_recovers_via_fallback() {
    let mut tree = json!({});
    let map = outputs(&[("story", "current_story"), ("choice1", "option1")]);

    // Neither valid JSON nor a clean span; the pair scanner salvages it.
    let client = ScriptedClient::new(vec![
        r#"story="The door refuses to open." choice1="force it""#,
    ]);

    let mut cycle = Cycle::new();
    cycle.retry_delay = Duration::from_millis(1);
    let segments = vec!["[story=, choice1=]".to_string()];
    let report = cycle.run(&mut tree, &segments, &map, &client).await.unwrap();

    assert!(report.recovered.is_success());
    assert_eq!(
        lookup(&tree, "current_story"),
        Some(&json!("The door refuses to open."))
    );
    assert_eq!(lookup(&tree, "option1"), Some(&json!("force it")));
}

#[tokio::test]
async fn failed_recovery_leaves_the_tree_untouched() {
    let mut tree = json!({ "before": true });
    let map = outputs(&[("story", "current_story")]);

    let client = ScriptedClient::new(vec!["I would rather chat about the weather."]);

    let mut cycle = Cycle::new();
    cycle.retry_delay = Duration::from_millis(1);
    let report = cycle
        .run(&mut tree, &["[story=]".to_string()], &map, &client)
        .await
        .unwrap();

    assert!(!report.recovered.is_success());
    assert_eq!(tree, json!({ "before": true }));

    // The failure collapses into a value the caller can store or log.
    let failure = report.recovered.into_value();
    assert_eq!(
        failure["raw_output"],
        json!("I would rather chat about the weather.")
    );
}
