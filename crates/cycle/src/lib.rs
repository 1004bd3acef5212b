//! weft-cycle: the resolve → generate → recover → write cycle driver.
//!
//! One cycle takes exclusive ownership of a caller-owned state tree for
//! its duration: template segments are resolved against the tree, the
//! assembled prompt goes to the generation service, the free-text reply
//! is recovered into a structured value, and recovered fields are written
//! back into the tree through the caller's output mapping table.
//!
//! Recovery failures are carried in the report, not raised -- the
//! pipeline always continues in a defined state. Only generation
//! exhaustion and structural write conflicts abort a cycle. Callers
//! running several sessions serialize cycles per tree; nothing here
//! locks.

pub mod client;
pub mod mapping;
pub mod prompt;

use std::time::Duration;

use serde_json::Value;
use weft_core::{Recovery, RecoveryResult, Resolver};

#[cfg(feature = "anthropic")]
pub use client::AnthropicClient;
pub use client::{GenerationClient, GenerationError, Message};
pub use mapping::{apply_output_map, AppliedOutputs, OutputMap};
pub use prompt::{parse_segments, ParsedSegments, PromptTemplate};

/// Errors that abort a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The generation service failed fatally or retries were exhausted.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    /// A recovered value could not be written back.
    #[error("write-back failed: {0}")]
    Write(#[from] weft_core::WriteError),
}

/// Everything a cycle produced, whether or not recovery succeeded.
#[derive(Debug)]
pub struct CycleReport {
    /// The fully resolved, assembled prompt that was sent.
    pub prompt: String,
    /// The service's raw reply.
    pub raw_output: String,
    /// Outcome of recovery; failures are carried here, not raised.
    pub recovered: RecoveryResult,
    /// (field, path expression) pairs written into the tree.
    pub written: Vec<(String, String)>,
    /// Output-map fields that had no recovered value.
    pub skipped: Vec<String>,
    /// When the reply was produced (ISO 8601 UTC).
    pub generated_at: String,
}

/// One resolve → generate → recover → write cycle over a caller-owned
/// tree.
///
/// All knobs are plain fields with documented defaults; construct,
/// adjust, run.
pub struct Cycle<'a> {
    /// Expands `{...}` references in segments and path expressions.
    pub resolver: Resolver<'a>,
    /// Layered reply recovery.
    pub recovery: Recovery,
    /// Prompt assembly template.
    pub template: PromptTemplate,
    /// Retries after the first attempt for retryable generation
    /// failures.
    pub max_retries: usize,
    /// Fixed delay between generation attempts.
    pub retry_delay: Duration,
}

impl Default for Cycle<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Cycle<'a> {
    /// A cycle with default settings and no external document loader.
    pub fn new() -> Self {
        Cycle {
            resolver: Resolver::new(),
            recovery: Recovery::new(),
            template: PromptTemplate::default(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// A cycle whose resolver serves `text;documentId;path` references
    /// through the given loader.
    pub fn with_loader(loader: &'a dyn weft_core::DocumentLoader) -> Self {
        Cycle {
            resolver: Resolver::with_loader(loader),
            ..Cycle::new()
        }
    }

    /// Run one full cycle against `tree`.
    ///
    /// `segments` are the caller's template segments (resolved here
    /// before assembly); `outputs` maps recovered fields to path
    /// expressions. Returns the report on success; a failed recovery is
    /// still a success at this level, with the failure carried in
    /// `recovered` and every output field listed in `skipped`.
    pub async fn run(
        &self,
        tree: &mut Value,
        segments: &[String],
        outputs: &OutputMap,
        client: &dyn GenerationClient,
    ) -> Result<CycleReport, CycleError> {
        let resolved: Vec<String> = segments
            .iter()
            .map(|segment| self.resolver.resolve(segment, tree))
            .collect();
        let prompt = self.template.build_prompt(&resolved);

        let raw_output = self.generate_with_retries(&prompt, client).await?;
        let generated_at = now_utc();

        let recovered = self.recovery.recover(&raw_output);
        let (written, skipped) = match recovered.value() {
            Some(value) => {
                let applied = apply_output_map(tree, value, outputs, &self.resolver)?;
                (applied.written, applied.skipped)
            }
            None => (Vec::new(), outputs.keys().cloned().collect()),
        };

        Ok(CycleReport {
            prompt,
            raw_output,
            recovered,
            written,
            skipped,
            generated_at,
        })
    }

    /// Call the client, retrying retryable failures a bounded number of
    /// times with a fixed delay. Fatal failures and exhaustion surface
    /// to the caller, which decides whether to re-run the cycle.
    async fn generate_with_retries(
        &self,
        prompt: &str,
        client: &dyn GenerationClient,
    ) -> Result<String, GenerationError> {
        let mut attempt = 0;
        loop {
            match client.generate(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    client::retry_log(&format!(
                        "generation attempt {} failed, retrying: {}",
                        attempt, err
                    ));
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Current instant as ISO 8601 UTC.
fn now_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use weft_core::lookup;

    /// Mock generation client that pops responses from a queue.
    struct MockClient {
        responses: Mutex<Vec<Result<String, GenerationError>>>,
        /// Captures the prompt sent on each call.
        captured_prompts: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                captured_prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for MockClient {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.captured_prompts.lock().unwrap().push(prompt.to_string());
            let mut queue = self.responses.lock().unwrap();
            if queue.is_empty() {
                return Err(GenerationError::Network("mock queue exhausted".to_string()));
            }
            queue.remove(0)
        }
    }

    fn quick_cycle() -> Cycle<'static> {
        let mut cycle = Cycle::new();
        cycle.retry_delay = Duration::from_millis(1);
        cycle
    }

    fn outputs(entries: &[(&str, &str)]) -> OutputMap {
        entries
            .iter()
            .map(|(field, path)| (field.to_string(), path.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn full_cycle_writes_recovered_fields() {
        let client = MockClient::new(vec![Ok(
            r#"{"story":"The gate creaks open.","mood":"tense"}"#.to_string()
        )]);
        let mut tree = json!({ "location": "the gate" });
        let segments = vec![
            "(the hero stands at {location})".to_string(),
            "<a short scene>".to_string(),
            "[story=, mood=]".to_string(),
        ];
        let map = outputs(&[("story", "current_story"), ("mood", "scene.mood")]);

        let report = quick_cycle()
            .run(&mut tree, &segments, &map, &client)
            .await
            .unwrap();

        assert!(report.prompt.contains("the hero stands at the gate"));
        assert!(report.recovered.is_success());
        assert_eq!(report.written.len(), 2);
        assert_eq!(
            lookup(&tree, "current_story"),
            Some(&json!("The gate creaks open."))
        );
        assert_eq!(lookup(&tree, "scene.mood"), Some(&json!("tense")));
    }

    #[tokio::test]
    async fn retryable_failure_retries_then_succeeds() {
        let client = MockClient::new(vec![
            Err(GenerationError::Api {
                status: 429,
                message: "slow down".to_string(),
            }),
            Ok(r#"{"story":"A"}"#.to_string()),
        ]);
        let mut tree = json!({});
        let map = outputs(&[("story", "current_story")]);

        let report = quick_cycle()
            .run(&mut tree, &["<scene>".to_string(), "[story=]".to_string()], &map, &client)
            .await
            .unwrap();

        assert!(report.recovered.is_success());
        assert_eq!(client.captured_prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fatal_failure_aborts_without_retry() {
        let client = MockClient::new(vec![
            Err(GenerationError::Api {
                status: 401,
                message: "bad key".to_string(),
            }),
            Ok(r#"{"story":"never reached"}"#.to_string()),
        ]);
        let mut tree = json!({});
        let map = outputs(&[("story", "current_story")]);

        let err = quick_cycle()
            .run(&mut tree, &["[story=]".to_string()], &map, &client)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Generation(_)));
        assert_eq!(client.captured_prompts.lock().unwrap().len(), 1);
        assert_eq!(tree, json!({}));
    }

    #[tokio::test]
    async fn retries_exhaust_then_abort() {
        let rate_limited = || GenerationError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let client = MockClient::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Err(rate_limited()),
            Err(rate_limited()),
        ]);
        let mut tree = json!({});
        let mut cycle = quick_cycle();
        cycle.max_retries = 3;

        let err = cycle
            .run(&mut tree, &["[story=]".to_string()], &outputs(&[]), &client)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Generation(_)));
        // Initial attempt plus three retries.
        assert_eq!(client.captured_prompts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unrecoverable_reply_is_reported_not_raised() {
        let client = MockClient::new(vec![Ok("no structure here".to_string())]);
        let mut tree = json!({});
        let map = outputs(&[("story", "current_story")]);

        let report = quick_cycle()
            .run(&mut tree, &["[story=]".to_string()], &map, &client)
            .await
            .unwrap();

        assert!(!report.recovered.is_success());
        assert_eq!(report.raw_output, "no structure here");
        assert_eq!(report.skipped, vec!["story".to_string()]);
        assert_eq!(tree, json!({}));
    }

    #[tokio::test]
    async fn structural_conflict_surfaces_as_write_error() {
        let client = MockClient::new(vec![Ok(r#"{"x":1}"#.to_string())]);
        let mut tree = json!({ "leaf": "scalar" });
        let map = outputs(&[("x", "leaf.inner")]);

        let err = quick_cycle()
            .run(&mut tree, &["[x=]".to_string()], &map, &client)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Write(_)));
    }
}
