//! Trigger-phrase matching with placeholder extraction and typed
//! argument coercion (SPEC_FULL §4.4).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::LazyLock;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
use super::model::{ArgumentDefinition, ArgumentType, Protocol};
use crate::util::normalize::normalize_whitespace;

/// Failure modes of building the matcher's index.
#[derive(Debug, Error)]
pub enum MatcherError {
    /// A trigger phrase's placeholder template could not be compiled into
    /// a regular expression.
    #[error("invalid trigger template '{phrase}': {reason}")]
    InvalidTemplate { phrase: String, reason: String },
}

/// A successful match: the protocol, its coerced arguments, and the
/// literal trigger phrase that matched (SPEC_FULL §4.4).
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub protocol: Protocol,
    pub arguments: HashMap<String, Value>,
    pub matched_phrase: String,
}

struct TemplatedEntry {
    regex: Regex,
    placeholder_names: Vec<String>,
    protocol: Protocol,
    phrase: String,
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{(\w+)\}").expect("static placeholder regex is valid")
});

/// Builds an index from normalized trigger phrase to protocol, and
/// matches utterances against it.
///
/// Literal (no-placeholder) phrases live in a `DashMap` keyed by their
/// normalized form for O(1) lookup (SPEC_FULL §2.1's hot-read-table
/// guidance); templated phrases live in an ordered `Vec` behind a
/// `parking_lot::RwLock` since precedence depends on insertion order
/// (SPEC_FULL §4.4 rule 5) and rebuilds are infrequent compared to reads.
#[derive(Default)]
pub struct TriggerMatcher {
    literal: DashMap<String, (Protocol, String)>,
    templated: RwLock<Vec<TemplatedEntry>>,
}

impl TriggerMatcher {
    /// An empty matcher with no indexed protocols.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `protocol`'s trigger phrases to the index. Literal phrases are
    /// inserted into the hash index; templated phrases (containing at
    /// least one `{placeholder}`) are appended to the ordered list.
    pub fn index_protocol(&self, protocol: &Protocol) -> Result<(), MatcherError> {
        for phrase in &protocol.trigger_phrases {
            if phrase.contains('{') {
                let (regex, placeholder_names) = compile_template(phrase)?;
                self.templated.write().push(TemplatedEntry {
                    regex,
                    placeholder_names,
                    protocol: protocol.clone(),
                    phrase: phrase.clone(),
                });
            } else {
                self.literal
                    .insert(normalize_whitespace(phrase), (protocol.clone(), phrase.clone()));
            }
        }
        Ok(())
    }

    /// Clear the index and rebuild it from `protocols`, in order — used
    /// after a batch registry load or a night-mode activation sweep.
    pub fn rebuild(&self, protocols: &[Protocol]) -> Result<(), MatcherError> {
        self.literal.clear();
        self.templated.write().clear();
        for protocol in protocols {
            self.index_protocol(protocol)?;
        }
        Ok(())
    }

    /// Match `utterance` against the index. Literal phrases are tried
    /// first; within each category, the first indexed entry wins
    /// (SPEC_FULL §4.4 rule 5). A templated match with a missing required
    /// argument or a coercion failure is treated as no match at all,
    /// falling through to the next candidate (and ultimately to NLU).
    pub fn match_utterance(&self, utterance: &str) -> Option<MatchResult> {
        let normalized = normalize_whitespace(utterance);

        if let Some(entry) = self.literal.get(&normalized) {
            let (protocol, phrase) = entry.value().clone();
            return Some(MatchResult {
                protocol,
                arguments: HashMap::new(),
                matched_phrase: phrase,
            });
        }

        for entry in self.templated.read().iter() {
            let Some(captures) = entry.regex.captures(&normalized) else {
                continue;
            };
            let mut raw = HashMap::new();
            for name in &entry.placeholder_names {
                if let Some(value) = captures.name(name) {
                    raw.insert(name.clone(), value.as_str().to_string());
                }
            }
            if let Some(arguments) = coerce_arguments(&entry.protocol, &raw) {
                return Some(MatchResult {
                    protocol: entry.protocol.clone(),
                    arguments,
                    matched_phrase: entry.phrase.clone(),
                });
            }
        }

        None
    }
}

fn compile_template(phrase: &str) -> Result<(Regex, Vec<String>), MatcherError> {
    let normalized = normalize_whitespace(phrase);
    let mut pattern = String::from("^");
    let mut names = Vec::new();
    let mut last_end = 0;

    for captures in PLACEHOLDER.captures_iter(&normalized) {
        #[allow(clippy::expect_used)]
        let whole = captures.get(0).expect("group 0 always matches");
        pattern.push_str(&regex::escape(&normalized[last_end..whole.start()]));
        #[allow(clippy::expect_used)]
        let name = captures
            .get(1)
            .expect("placeholder regex always has group 1")
            .as_str()
            .to_string();
        pattern.push_str(&format!("(?P<{name}>.+?)"));
        names.push(name);
        last_end = whole.end();
    }
    pattern.push_str(&regex::escape(&normalized[last_end..]));
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|e| MatcherError::InvalidTemplate {
        phrase: phrase.to_string(),
        reason: e.to_string(),
    })?;
    Ok((regex, names))
}

fn coerce_arguments(protocol: &Protocol, raw: &HashMap<String, String>) -> Option<HashMap<String, Value>> {
    let mut coerced = HashMap::new();

    for definition in &protocol.argument_definitions {
        match raw.get(&definition.name) {
            Some(value) => {
                coerced.insert(definition.name.clone(), coerce_value(definition, value)?);
            }
            None if definition.required => return None,
            None => {}
        }
    }

    for (name, value) in raw {
        coerced.entry(name.clone()).or_insert_with(|| Value::String(value.clone()));
    }

    Some(coerced)
}

fn coerce_value(definition: &ArgumentDefinition, raw: &str) -> Option<Value> {
    match definition.kind {
        ArgumentType::Choice => definition
            .choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(raw))
            .map(|canonical| Value::String(canonical.clone())),
        ArgumentType::Range => {
            let n: i64 = raw.trim().parse().ok()?;
            let min = definition.min_val.unwrap_or(i64::MIN);
            let max = definition.max_val.unwrap_or(i64::MAX);
            (n >= min && n <= max).then_some(Value::Number(n.into()))
        }
        ArgumentType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        ArgumentType::Text => Some(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::model::ProtocolResponse;

    fn protocol_with_triggers(name: &str, triggers: &[&str]) -> Protocol {
        let mut protocol = Protocol::new(name, "");
        protocol.trigger_phrases = triggers.iter().map(|t| t.to_string()).collect();
        protocol
    }

    #[test]
    fn literal_phrase_matches_exactly() {
        let matcher = TriggerMatcher::new();
        matcher.index_protocol(&protocol_with_triggers("blue_lights_on", &["blue lights"])).unwrap();

        let result = matcher.match_utterance("Blue   Lights").unwrap();
        assert_eq!(result.protocol.name, "blue_lights_on");
        assert!(result.arguments.is_empty());
    }

    #[test]
    fn templated_phrase_extracts_and_coerces_choice_argument() {
        let matcher = TriggerMatcher::new();
        let mut protocol = protocol_with_triggers("set_lights_color", &["set lights to {color_name}"]);
        protocol.argument_definitions = vec![ArgumentDefinition {
            name: "color_name".to_string(),
            kind: ArgumentType::Choice,
            choices: vec!["blue".to_string(), "red".to_string()],
            min_val: None,
            max_val: None,
            required: true,
            description: String::new(),
        }];
        matcher.index_protocol(&protocol).unwrap();

        let result = matcher.match_utterance("set lights to Blue").unwrap();
        assert_eq!(result.arguments.get("color_name"), Some(&Value::String("blue".to_string())));
    }

    #[test]
    fn templated_phrase_with_out_of_range_value_does_not_match() {
        let matcher = TriggerMatcher::new();
        let mut protocol = protocol_with_triggers("set_brightness", &["set brightness to {level}"]);
        protocol.argument_definitions = vec![ArgumentDefinition {
            name: "level".to_string(),
            kind: ArgumentType::Range,
            choices: Vec::new(),
            min_val: Some(0),
            max_val: Some(100),
            required: true,
            description: String::new(),
        }];
        matcher.index_protocol(&protocol).unwrap();

        assert!(matcher.match_utterance("set brightness to 150").is_none());
    }

    #[test]
    fn missing_required_argument_yields_no_match() {
        let matcher = TriggerMatcher::new();
        let mut protocol = protocol_with_triggers("set_lights_color", &["set lights to {color_name}"]);
        protocol.argument_definitions = vec![ArgumentDefinition {
            name: "color_name".to_string(),
            kind: ArgumentType::Choice,
            choices: vec!["blue".to_string()],
            min_val: None,
            max_val: None,
            required: true,
            description: String::new(),
        }];
        matcher.index_protocol(&protocol).unwrap();

        assert!(matcher.match_utterance("set lights to green").is_none());
    }

    #[test]
    fn literal_phrase_takes_precedence_over_templated() {
        let matcher = TriggerMatcher::new();
        matcher
            .index_protocol(&protocol_with_triggers("exact_phrase", &["turn on the lights"]))
            .unwrap();
        matcher
            .index_protocol(&protocol_with_triggers("templated_phrase", &["turn on the {thing}"]))
            .unwrap();

        let result = matcher.match_utterance("turn on the lights").unwrap();
        assert_eq!(result.protocol.name, "exact_phrase");
    }

    #[test]
    fn rebuild_replaces_the_entire_index() {
        let matcher = TriggerMatcher::new();
        matcher.index_protocol(&protocol_with_triggers("first", &["first phrase"])).unwrap();

        matcher.rebuild(&[protocol_with_triggers("second", &["second phrase"])]).unwrap();

        assert!(matcher.match_utterance("first phrase").is_none());
        assert!(matcher.match_utterance("second phrase").is_some());
    }

    #[test]
    fn ai_response_mode_is_preserved_through_indexing() {
        let mut protocol = protocol_with_triggers("ask_ai", &["tell me something"]);
        protocol.response = Some(ProtocolResponse {
            mode: crate::protocol::model::ResponseMode::Ai,
            phrases: Vec::new(),
            prompt: "say something nice".to_string(),
        });
        let matcher = TriggerMatcher::new();
        matcher.index_protocol(&protocol).unwrap();

        let result = matcher.match_utterance("tell me something").unwrap();
        assert!(result.protocol.response.is_some());
    }
}
