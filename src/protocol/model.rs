//! The declarative protocol data model and its JSON wire format
//! (SPEC_FULL §3, §6).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use crate::util::ProtocolId;

/// The kind of value an [`ArgumentDefinition`] expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    /// Pick from `choices` (case-insensitive compare against canonical form).
    Choice,
    /// An integer within `[min_val, max_val]`.
    Range,
    /// Free text, passed through unchanged.
    Text,
    /// `"true"|"yes"|"on"` / `"false"|"no"|"off"`.
    Boolean,
}

/// What kind of value a placeholder captured by the [`super::matcher`]
/// must coerce to before a protocol is considered matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    /// The placeholder/argument name, e.g. `color_name`.
    pub name: String,
    /// Which coercion rule applies.
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    /// Valid values for `ArgumentType::Choice`.
    #[serde(default)]
    pub choices: Vec<String>,
    /// Inclusive lower bound for `ArgumentType::Range`.
    #[serde(default)]
    pub min_val: Option<i64>,
    /// Inclusive upper bound for `ArgumentType::Range`.
    #[serde(default)]
    pub max_val: Option<i64>,
    /// Whether a missing value fails the match.
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

/// How a protocol should produce its reply after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Pick one of `phrases` (uniform random when more than one).
    Static,
    /// Substitute `prompt`, then delegate to the AI collaborator.
    Ai,
}

/// Defines how to produce a reply after a protocol runs (SPEC_FULL §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolResponse {
    pub mode: ResponseMode,
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub prompt: String,
}

/// A single step inside a protocol: one function call against one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    /// Which provider handles this step.
    pub agent: String,
    /// The exact function name within the provider's function table, or
    /// the capability name when routed through the broker.
    pub function: String,
    /// Literal parameter defaults.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// `parameter name -> reference expression`, resolved against prior
    /// step outputs (`{step_<j>_<function>.<field>}`) and protocol-level
    /// arguments (`{<arg_name>}`) at execution time.
    #[serde(default)]
    pub parameter_mappings: HashMap<String, String>,
}

/// A named protocol: trigger phrases, ordered steps, and a response
/// rendering rule.
///
/// `response` is serialized under the key `responses` (matching the JSON
/// file format of SPEC_FULL §6) but accepts either `responses` or
/// `response` on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    #[serde(default)]
    pub id: ProtocolId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default)]
    pub steps: Vec<ProtocolStep>,
    #[serde(default)]
    pub argument_definitions: Vec<ArgumentDefinition>,
    #[serde(rename = "responses", alias = "response", default)]
    pub response: Option<ProtocolResponse>,
}

impl Protocol {
    /// Build an empty protocol with a fresh id and `trigger_phrases`
    /// defaulted to `[name]`, matching the loader's behavior when a
    /// definition omits trigger phrases entirely.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: ProtocolId::new(),
            trigger_phrases: vec![name.clone()],
            name,
            description: description.into(),
            arguments: HashMap::new(),
            steps: Vec::new(),
            argument_definitions: Vec::new(),
            response: None,
        }
    }

    /// Parse a protocol definition from its JSON file format, applying
    /// the loader-time default of `trigger_phrases = [name]` when the
    /// source omits the field (SPEC_FULL §6).
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut protocol: Protocol = serde_json::from_str(raw)?;
        if protocol.trigger_phrases.is_empty() {
            protocol.trigger_phrases.push(protocol.name.clone());
        }
        Ok(protocol)
    }

    /// Append a step (used by the recorder to build up an in-flight
    /// protocol).
    pub fn push_step(&mut self, step: ProtocolStep) {
        self.steps.push(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_fills_in_missing_trigger_phrases() {
        let raw = r#"{"name": "blue_lights_on", "steps": []}"#;
        let protocol = Protocol::from_json(raw).unwrap();
        assert_eq!(protocol.trigger_phrases, vec!["blue_lights_on".to_string()]);
    }

    #[test]
    fn from_json_accepts_response_or_responses_key() {
        let via_responses = r#"{"name": "a", "responses": {"mode": "static", "phrases": ["ok"]}}"#;
        let via_response = r#"{"name": "a", "response": {"mode": "static", "phrases": ["ok"]}}"#;

        let p1 = Protocol::from_json(via_responses).unwrap();
        let p2 = Protocol::from_json(via_response).unwrap();
        assert_eq!(p1.response, p2.response);
        assert_eq!(p1.response.unwrap().mode, ResponseMode::Static);
    }

    #[test]
    fn round_trip_preserves_fields_and_trigger_order() {
        let mut protocol = Protocol::new("blue_lights_on", "turn the lights blue");
        protocol.trigger_phrases = vec!["blue lights".to_string(), "blue lights on".to_string()];
        protocol.push_step(ProtocolStep {
            agent: "Lights".to_string(),
            function: "set_color_name".to_string(),
            parameters: HashMap::from([("color_name".to_string(), Value::String("blue".to_string()))]),
            parameter_mappings: HashMap::new(),
        });

        let json = serde_json::to_string(&protocol).unwrap();
        let reparsed: Protocol = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed.trigger_phrases, protocol.trigger_phrases);
        assert_eq!(reparsed.steps, protocol.steps);
        assert_eq!(reparsed.id, protocol.id);
    }

    #[test]
    fn argument_definition_required_defaults_true() {
        let raw = r#"{"name": "color", "type": "choice", "choices": ["red", "blue"]}"#;
        let def: ArgumentDefinition = serde_json::from_str(raw).unwrap();
        assert!(def.required);
    }
}
