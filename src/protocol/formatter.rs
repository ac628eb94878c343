//! Renders a completed protocol run into the text spoken back to the
//! user (SPEC_FULL §4.6).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

// Layer 3: Internal module imports
use super::executor::ExecutionResult;
use super::model::{Protocol, ResponseMode};

/// Falls back to plain text delegation when no generative collaborator
/// is wired up, matching the original system's optional OpenAI/Anthropic
/// integration (SPEC_FULL §4.6 "Ai" mode, §1 Non-goals: this crate
/// ships no concrete LLM client).
#[async_trait]
pub trait AiCollaborator: Send + Sync {
    /// Produce a reply for `prompt`, or `None` if the collaborator is
    /// unavailable (rate limited, unreachable, not configured).
    async fn compose(&self, prompt: &str) -> Option<String>;
}

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{(\w+)\}").expect("static token regex is valid")
});

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn substitute(template: &str, arguments: &HashMap<String, Value>) -> String {
    TOKEN
        .replace_all(template, |captures: &regex::Captures| {
            let name = &captures[1];
            arguments.get(name).map(value_to_text).unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// The message spoken back when every step of a run failed (SPEC_FULL
/// §4.7's fixed product copy, reused here since a protocol's own step
/// failures surface through the same error-presentation path as an
/// orchestrator-level failure).
pub(crate) const ERROR_PREFIX: &str = "Sorry, I encountered an error: ";

/// Spoken back when a protocol defines no `response` block at all
/// (SPEC_FULL §4.6 "null" mode's fixed template).
fn default_completion(protocol_name: &str) -> String {
    format!("{protocol_name} completed successfully.")
}

/// Turns a protocol's [`ExecutionResult`] into spoken text (SPEC_FULL
/// §4.6): collect step errors first; absent any, dispatch on the
/// protocol's declared [`ResponseMode`]; absent a declared response,
/// fall back to a fixed completion phrase.
pub struct ResponseFormatter {
    ai: Option<Arc<dyn AiCollaborator>>,
}

impl ResponseFormatter {
    /// Build a formatter. `ai` is `None` when no generative collaborator
    /// is configured; `ResponseMode::Ai` protocols then fall back to
    /// their substituted `prompt` text.
    pub fn new(ai: Option<Arc<dyn AiCollaborator>>) -> Self {
        Self { ai }
    }

    /// Collect every step's `{"error": ...}` entry, in step order.
    fn collect_errors(results: &ExecutionResult) -> Vec<String> {
        let mut keys: Vec<&String> = results.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| {
                results
                    .get(key)
                    .and_then(|fields| fields.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect()
    }

    /// Render `results` for `protocol`, using `arguments` for `{token}`
    /// substitution in static phrases and AI prompts.
    pub async fn format(
        &self,
        protocol: &Protocol,
        arguments: &HashMap<String, Value>,
        results: &ExecutionResult,
    ) -> String {
        let errors = Self::collect_errors(results);
        if !errors.is_empty() {
            return format!("{ERROR_PREFIX}{}", errors.join("; "));
        }

        let Some(response) = &protocol.response else {
            return default_completion(&protocol.name);
        };

        match response.mode {
            ResponseMode::Static => {
                let phrase = self.pick_static_phrase(&response.phrases, &protocol.name);
                substitute(&phrase, arguments)
            }
            ResponseMode::Ai => {
                let prompt = substitute(&response.prompt, arguments);
                match &self.ai {
                    Some(collaborator) => match collaborator.compose(&prompt).await {
                        Some(reply) => reply,
                        None => {
                            warn!(protocol = %protocol.name, "ai collaborator unavailable, falling back to substituted prompt");
                            prompt
                        }
                    },
                    None => prompt,
                }
            }
        }
    }

    fn pick_static_phrase(&self, phrases: &[String], protocol_name: &str) -> String {
        if phrases.is_empty() {
            return default_completion(protocol_name);
        }
        if phrases.len() == 1 {
            return phrases[0].clone();
        }
        let mut rng = SmallRng::from_entropy();
        phrases[rng.gen_range(0..phrases.len())].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::model::ProtocolResponse;

    fn execution_result(entries: &[(&str, HashMap<String, Value>)]) -> ExecutionResult {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn errors_take_precedence_over_the_declared_response() {
        let mut protocol = Protocol::new("blue_lights_on", "");
        protocol.response = Some(ProtocolResponse {
            mode: ResponseMode::Static,
            phrases: vec!["Lights are blue now.".to_string()],
            prompt: String::new(),
        });
        let results = execution_result(&[(
            "step_0_set_color_name",
            HashMap::from([("error".to_string(), Value::String("no_provider".to_string()))]),
        )]);

        let formatter = ResponseFormatter::new(None);
        let text = formatter.format(&protocol, &HashMap::new(), &results).await;
        assert_eq!(text, "Sorry, I encountered an error: no_provider");
    }

    #[tokio::test]
    async fn static_response_substitutes_arguments() {
        let mut protocol = Protocol::new("set_lights_color", "");
        protocol.response = Some(ProtocolResponse {
            mode: ResponseMode::Static,
            phrases: vec!["Setting the lights to {color_name}.".to_string()],
            prompt: String::new(),
        });
        let arguments = HashMap::from([("color_name".to_string(), Value::String("blue".to_string()))]);

        let formatter = ResponseFormatter::new(None);
        let text = formatter.format(&protocol, &arguments, &ExecutionResult::new()).await;
        assert_eq!(text, "Setting the lights to blue.");
    }

    #[tokio::test]
    async fn ai_response_without_a_collaborator_falls_back_to_the_prompt() {
        let mut protocol = Protocol::new("ask_ai", "");
        protocol.response = Some(ProtocolResponse {
            mode: ResponseMode::Ai,
            phrases: Vec::new(),
            prompt: "say something about {topic}".to_string(),
        });
        let arguments = HashMap::from([("topic".to_string(), Value::String("the weather".to_string()))]);

        let formatter = ResponseFormatter::new(None);
        let text = formatter.format(&protocol, &arguments, &ExecutionResult::new()).await;
        assert_eq!(text, "say something about the weather");
    }

    #[tokio::test]
    async fn ai_response_with_a_collaborator_uses_its_reply() {
        struct EchoCollaborator;
        #[async_trait]
        impl AiCollaborator for EchoCollaborator {
            async fn compose(&self, prompt: &str) -> Option<String> {
                Some(format!("collaborator says: {prompt}"))
            }
        }

        let mut protocol = Protocol::new("ask_ai", "");
        protocol.response = Some(ProtocolResponse {
            mode: ResponseMode::Ai,
            phrases: Vec::new(),
            prompt: "hello".to_string(),
        });

        let formatter = ResponseFormatter::new(Some(Arc::new(EchoCollaborator)));
        let text = formatter.format(&protocol, &HashMap::new(), &ExecutionResult::new()).await;
        assert_eq!(text, "collaborator says: hello");
    }

    #[tokio::test]
    async fn no_declared_response_falls_back_to_default_completion() {
        let protocol = Protocol::new("no_response_protocol", "");
        let formatter = ResponseFormatter::new(None);
        let text = formatter.format(&protocol, &HashMap::new(), &ExecutionResult::new()).await;
        assert_eq!(text, "no_response_protocol completed successfully.");
    }

    #[tokio::test]
    async fn static_response_with_no_phrases_falls_back_to_default_completion() {
        let mut protocol = Protocol::new("empty_static", "");
        protocol.response = Some(ProtocolResponse {
            mode: ResponseMode::Static,
            phrases: Vec::new(),
            prompt: String::new(),
        });

        let formatter = ResponseFormatter::new(None);
        let text = formatter.format(&protocol, &HashMap::new(), &ExecutionResult::new()).await;
        assert_eq!(text, "empty_static completed successfully.");
    }
}
