//! Built-in demo tasks and workflows
//!
//! Deterministic stand-ins for the real task bodies (emotion analysis,
//! content recall, therapy tips, persona styling). They let the CLI and
//! the benchmarks run the `basic_chat_flow` and `enhanced_chat_flow`
//! workflows without any model behind them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ast::{DefinitionFile, FallbackSpec, WorkflowDefinition};
use crate::cache::normalize_text;
use crate::error::Result;
use crate::registry::{TaskHandler, TaskOutput, TaskRegistration, TaskRegistry, TaskRequest};

/// Definitions of the built-in workflows
pub const CHAT_WORKFLOWS: &str = include_str!("../workflows/chat.yaml");

const PROVIDER: &str = "builtin";

const LEXICON: &[(&str, &str, &[&str])] = &[
    (
        "joy",
        "positive",
        &["great", "happy", "glad", "awesome", "love", "wonderful", "excited", "fun"],
    ),
    (
        "sadness",
        "negative",
        &["sad", "down", "lonely", "cry", "miss", "tired", "lost", "empty"],
    ),
    (
        "anxiety",
        "negative",
        &["worried", "anxious", "nervous", "stress", "stressed", "afraid", "scared", "exam"],
    ),
    (
        "anger",
        "negative",
        &["angry", "mad", "annoyed", "hate", "unfair", "furious"],
    ),
];

/// Keyword-based emotion reading
pub struct EmotionAnalyzer;

#[async_trait]
impl TaskHandler for EmotionAnalyzer {
    async fn call(&self, request: TaskRequest) -> anyhow::Result<TaskOutput> {
        Ok(TaskOutput::new(analyze(request.text())))
    }
}

/// `{label, sentiment, intensity, keywords}` for a message
pub fn analyze(text: &str) -> Value {
    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let best = LEXICON
        .iter()
        .map(|(label, sentiment, keywords)| {
            let hits: Vec<&str> = keywords
                .iter()
                .copied()
                .filter(|k| words.contains(k))
                .collect();
            (*label, *sentiment, hits)
        })
        .filter(|(_, _, hits)| !hits.is_empty())
        .max_by_key(|(_, _, hits)| hits.len());

    match best {
        Some((label, sentiment, hits)) => {
            let intensity = (0.3 + 0.2 * hits.len() as f64).min(1.0);
            json!({
                "label": label,
                "sentiment": sentiment,
                "intensity": intensity,
                "keywords": hits,
            })
        }
        None => neutral_reading(),
    }
}

fn neutral_reading() -> Value {
    json!({"label": "neutral", "sentiment": "neutral", "intensity": 0.0, "keywords": []})
}

fn label_of(request: &TaskRequest) -> String {
    request
        .dep("emotion")
        .and_then(|e| e["label"].as_str())
        .unwrap_or("neutral")
        .to_string()
}

/// Comic and video picks for the detected emotion
pub struct ContentRecall;

#[async_trait]
impl TaskHandler for ContentRecall {
    async fn call(&self, request: TaskRequest) -> anyhow::Result<TaskOutput> {
        let picks = match label_of(&request).as_str() {
            "joy" => json!([
                {"kind": "comic", "title": "Duck Dances in the Rain"},
                {"kind": "video", "title": "Ten Ducklings Learn to Swim"},
            ]),
            "sadness" => json!([
                {"kind": "comic", "title": "The Duck Who Kept a Lantern"},
                {"kind": "video", "title": "Quiet Pond at Dusk"},
            ]),
            "anxiety" => json!([
                {"kind": "comic", "title": "One Step at a Time, Little Duck"},
                {"kind": "video", "title": "Four Minutes of Slow Breathing"},
            ]),
            "anger" => json!([
                {"kind": "comic", "title": "Duck Counts to Ten"},
            ]),
            _ => json!([
                {"kind": "comic", "title": "A Day at the Pond"},
            ]),
        };
        Ok(TaskOutput::new(picks))
    }
}

/// Short self-help suggestions for the detected emotion
pub struct TherapyTips;

#[async_trait]
impl TaskHandler for TherapyTips {
    async fn call(&self, request: TaskRequest) -> anyhow::Result<TaskOutput> {
        let tips = match label_of(&request).as_str() {
            "joy" => json!(["Write down what made today good so you can revisit it."]),
            "sadness" => json!([
                "Reach out to someone you trust, even with a short message.",
                "Be gentle with yourself; rest is allowed.",
            ]),
            "anxiety" => json!([
                "Try box breathing: in for four, hold for four, out for four.",
                "Break the next task into one small step.",
            ]),
            "anger" => json!(["Step away for a few minutes before responding."]),
            _ => json!([]),
        };
        Ok(TaskOutput::new(tips))
    }
}

/// Persona styling: turns upstream results into the final reply
pub struct DuckStyle;

#[async_trait]
impl TaskHandler for DuckStyle {
    async fn call(&self, request: TaskRequest) -> anyhow::Result<TaskOutput> {
        let sentiment = request
            .dep("emotion")
            .and_then(|e| e["sentiment"].as_str())
            .unwrap_or("neutral");

        let mut reply = match sentiment {
            "positive" => "Quack! That sounds wonderful.".to_string(),
            "negative" => "The duck hears you. That sounds really hard.".to_string(),
            _ => "The duck is listening.".to_string(),
        };

        if let Some(tip) = request
            .dep("tips")
            .and_then(|t| t.get(0))
            .and_then(Value::as_str)
        {
            reply.push(' ');
            reply.push_str(tip);
        }
        if let Some(title) = request
            .dep("recall")
            .and_then(|r| r.get(0))
            .and_then(|pick| pick["title"].as_str())
        {
            reply.push_str(&format!(" Maybe \"{}\" will keep you company.", title));
        }

        let ending = request.params["ending"]
            .as_str()
            .unwrap_or("The duck is always here for you.");
        reply.push(' ');
        reply.push_str(ending);

        Ok(TaskOutput::new(json!({
            "reply": reply,
            "emotion": request.dep("emotion").cloned().unwrap_or_else(neutral_reading),
            "recommendations": request.dep("recall").cloned().unwrap_or_else(|| json!([])),
        })))
    }
}

/// Registry with the four demo task bodies
pub fn registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register(
            TaskRegistration::new("emotion", Arc::new(EmotionAnalyzer))
                .with_timeout(Duration::from_secs(5))
                .with_fallback(FallbackSpec::authoritative(neutral_reading()))
                .with_provider(PROVIDER),
        )
        .register(
            TaskRegistration::new("recall", Arc::new(ContentRecall))
                .with_timeout(Duration::from_secs(3))
                .requires(["emotion"])
                .with_fallback(FallbackSpec::authoritative(json!([])))
                .with_provider(PROVIDER),
        )
        .register(
            TaskRegistration::new("tips", Arc::new(TherapyTips))
                .with_timeout(Duration::from_secs(3))
                .requires(["emotion"])
                .with_fallback(FallbackSpec::authoritative(json!([])))
                .with_provider(PROVIDER),
        )
        .register(
            TaskRegistration::new("style", Arc::new(DuckStyle))
                .with_timeout(Duration::from_secs(8))
                .requires(["emotion"])
                .with_fallback(FallbackSpec::non_authoritative(json!({
                    "reply": "The duck is here, but could not find the words right now."
                })))
                .with_provider(PROVIDER)
                .with_params(json!({
                    "persona": "duck",
                    "ending": "The duck is always here for you.",
                })),
        );
    registry
}

/// Parsed built-in workflow definitions
pub fn definitions() -> Result<Vec<WorkflowDefinition>> {
    DefinitionFile::parse(CHAT_WORKFLOWS)
}
