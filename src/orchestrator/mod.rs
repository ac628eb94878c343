//! Ties an incoming utterance to a spoken response: the night-mode gate,
//! fast-path protocol matching, NLU fallback, conversation history and
//! interaction logging (SPEC_FULL §4.7).

// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

// Layer 3: Internal module imports
use crate::broker::MessageBroker;
use crate::config::{AgentProfile, RuntimeConfig};
use crate::constants::{INTENT_MATCHING_CAPABILITY, WAKE_PROTOCOL_NAME};
use crate::logging::{InteractionEntry, InteractionLogger};
use crate::protocol::executor::ExecuteOptions;
use crate::protocol::runtime::ProtocolRuntime;
use crate::protocol::formatter::ERROR_PREFIX;

/// Spoken back whenever night mode blocks a request other than the wake
/// phrase (SPEC_FULL §4.7's fixed product copy).
const MAINTENANCE_MODE_RESPONSE: &str = "Jarvis is in maintenance mode";

/// Spoken back when a fast-path execution or NLU round-trip exceeds its
/// configured timeout (SPEC_FULL §4.7's fixed product copy).
const TIMEOUT_RESPONSE: &str = "The request took too long to complete. Please try again.";

/// One turn of conversation, oldest-first in [`ConversationHistory`].
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub utterance: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded per-user FIFO of recent turns (SPEC_FULL §3 "Conversation
/// History"). A `DashMap` keyed by `user_id` rather than one shared
/// `Mutex<HashMap<..>>`, matching the hot-per-key-read guidance used
/// elsewhere in this crate (SPEC_FULL §2.1) since concurrent users never
/// contend on each other's history.
pub struct ConversationHistory {
    turns: DashMap<String, VecDeque<HistoryTurn>>,
    max_length: usize,
}

impl ConversationHistory {
    pub fn new(max_length: usize) -> Self {
        Self { turns: DashMap::new(), max_length: max_length.max(1) }
    }

    /// Append a turn for `user_id`, evicting the oldest entry once the
    /// history exceeds `max_length`.
    pub fn record(&self, user_id: &str, utterance: String, response: String) {
        let mut entry = self.turns.entry(user_id.to_string()).or_default();
        entry.push_back(HistoryTurn { utterance, response, timestamp: Utc::now() });
        while entry.len() > self.max_length {
            entry.pop_front();
        }
    }

    /// A snapshot of `user_id`'s history, oldest first.
    pub fn recent(&self, user_id: &str) -> Vec<HistoryTurn> {
        self.turns.get(user_id).map(|turns| turns.iter().cloned().collect()).unwrap_or_default()
    }

    /// Discard `user_id`'s history entirely.
    pub fn clear(&self, user_id: &str) {
        self.turns.remove(user_id);
    }
}

/// Caller-supplied context for a single [`Orchestrator::process_request`]
/// call (SPEC_FULL §4.7 step 1).
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub user_id: Option<String>,
    pub device: Option<String>,
    pub location: Option<String>,
    pub timezone: Option<String>,
    pub source: Option<String>,
    /// When present, stored into the per-user profile table for this
    /// request (SPEC_FULL §4.7 step 1).
    pub profile: Option<AgentProfile>,
}

/// Internal routing outcomes; never propagated to a caller of
/// [`Orchestrator::process_request`], which always returns a plain
/// `String` (SPEC_FULL §7: "`OrchestratorError` must not be a publicly
/// propagating error type").
enum OrchestratorError {
    NightModeBlocked,
    Timeout,
    NoIntentProvider,
    Nlu(String),
}

impl OrchestratorError {
    fn into_response(self) -> String {
        match self {
            Self::NightModeBlocked => MAINTENANCE_MODE_RESPONSE.to_string(),
            Self::Timeout => TIMEOUT_RESPONSE.to_string(),
            Self::NoIntentProvider => format!("{ERROR_PREFIX}no_provider"),
            Self::Nlu(text) => format!("{ERROR_PREFIX}{text}"),
        }
    }
}

struct RouteOutcome {
    text: String,
    intent: Option<String>,
    capability: Option<String>,
    protocol_executed: Option<String>,
}

/// The end-to-end request pipeline (SPEC_FULL §4.7): night-mode gate,
/// fast-path protocol match and execution, NLU fallback through the
/// broker, conversation history, and interaction logging.
pub struct Orchestrator {
    broker: MessageBroker,
    runtime: Arc<ProtocolRuntime>,
    config: RuntimeConfig,
    history: ConversationHistory,
    interaction_logger: Arc<dyn InteractionLogger>,
    night_mode: AtomicBool,
    /// Per-user profile table, populated from `RequestMetadata::profile`
    /// at the top of each request (SPEC_FULL §3 "AgentProfile", §4.7
    /// step 1).
    profiles: DashMap<String, AgentProfile>,
}

impl Orchestrator {
    pub fn new(
        broker: MessageBroker,
        runtime: Arc<ProtocolRuntime>,
        config: RuntimeConfig,
        interaction_logger: Arc<dyn InteractionLogger>,
    ) -> Self {
        let history = ConversationHistory::new(config.max_history_length);
        Self {
            broker,
            runtime,
            config,
            history,
            interaction_logger,
            night_mode: AtomicBool::new(false),
            profiles: DashMap::new(),
        }
    }

    /// Whether night mode is currently active.
    pub fn is_night_mode(&self) -> bool {
        self.night_mode.load(Ordering::SeqCst)
    }

    /// Enter or leave night mode. While active, only the `wake` protocol
    /// is honored; every other utterance is answered with the fixed
    /// maintenance-mode response without reaching NLU (SPEC_FULL §4.7).
    pub fn set_night_mode(&self, active: bool) {
        self.night_mode.store(active, Ordering::SeqCst);
    }

    /// A snapshot of `user_id`'s recent conversation turns.
    pub fn history_for(&self, user_id: &str) -> Vec<HistoryTurn> {
        self.history.recent(user_id)
    }

    /// `user_id`'s stored profile, if one has ever been supplied via
    /// `RequestMetadata::profile`.
    pub fn profile_for(&self, user_id: &str) -> Option<AgentProfile> {
        self.profiles.get(user_id).map(|entry| entry.clone())
    }

    /// Index a newly-registered protocol into the fast-path trigger
    /// matcher, so [`Orchestrator::process_request`] can match it without
    /// a full index rebuild.
    pub fn index_protocol(&self, protocol: &crate::protocol::model::Protocol) -> Result<(), crate::protocol::matcher::MatcherError> {
        self.runtime.index_protocol(protocol)
    }

    /// Run the full pipeline for `utterance` and return the text to
    /// speak back. Never returns an error: every internal failure
    /// resolves to one of SPEC_FULL §4.7's fixed response strings.
    pub async fn process_request(&self, utterance: &str, metadata: RequestMetadata) -> String {
        let started = Instant::now();
        let user_id = metadata.user_id.clone().unwrap_or_else(|| self.config.default_user_id.clone());

        if let Some(profile) = metadata.profile.clone() {
            self.profiles.insert(user_id.clone(), profile);
        }

        let outcome = self.route(utterance, &metadata, &user_id).await;
        let (response, intent, capability, protocol_executed, success) = match outcome {
            Ok(route) => (route.text, route.intent, route.capability, route.protocol_executed, true),
            Err(error) => (error.into_response(), None, None, None, false),
        };

        self.history.record(&user_id, utterance.to_string(), response.clone());

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.interaction_logger
            .log_interaction(InteractionEntry {
                utterance: utterance.to_string(),
                response: response.clone(),
                intent,
                capability,
                protocol_executed,
                latency_ms,
                success,
                user_id: Some(user_id),
                device: metadata.device.clone(),
                location: metadata.location.clone(),
                source: metadata.source.clone(),
            })
            .await;

        response
    }

    async fn route(
        &self,
        utterance: &str,
        metadata: &RequestMetadata,
        user_id: &str,
    ) -> Result<RouteOutcome, OrchestratorError> {
        if self.is_night_mode() {
            return self.route_while_asleep(utterance, metadata, user_id).await;
        }
        self.route_awake(utterance, metadata, user_id).await
    }

    async fn route_while_asleep(
        &self,
        utterance: &str,
        metadata: &RequestMetadata,
        user_id: &str,
    ) -> Result<RouteOutcome, OrchestratorError> {
        let Some(matched) = self.runtime.try_match(utterance) else {
            return Err(OrchestratorError::NightModeBlocked);
        };
        if matched.protocol.name != WAKE_PROTOCOL_NAME {
            return Err(OrchestratorError::NightModeBlocked);
        }

        let outcome = self.run_fast_path(&matched, metadata, user_id).await?;
        self.set_night_mode(false);
        Ok(outcome)
    }

    async fn route_awake(
        &self,
        utterance: &str,
        metadata: &RequestMetadata,
        user_id: &str,
    ) -> Result<RouteOutcome, OrchestratorError> {
        if let Some(matched) = self.runtime.try_match(utterance) {
            return self.run_fast_path(&matched, metadata, user_id).await;
        }
        self.run_nlu_fallback(utterance, user_id).await
    }

    async fn run_fast_path(
        &self,
        matched: &crate::protocol::matcher::MatchResult,
        metadata: &RequestMetadata,
        user_id: &str,
    ) -> Result<RouteOutcome, OrchestratorError> {
        let options = ExecuteOptions {
            timeout: self.config.intent_timeout,
            trigger_phrase: matched.matched_phrase.clone(),
            matched_utterance: matched.matched_phrase.clone(),
            timezone: metadata.timezone.clone().unwrap_or_else(|| "UTC".to_string()),
            user_id: Some(user_id.to_string()),
            device: metadata.device.clone(),
            location: metadata.location.clone(),
            ..Default::default()
        };

        let protocol_name = matched.protocol.name.clone();
        match tokio::time::timeout(self.config.response_timeout, self.runtime.run_and_format(matched, options)).await {
            Ok(text) => Ok(RouteOutcome {
                text,
                intent: Some("protocol".to_string()),
                capability: None,
                protocol_executed: Some(protocol_name),
            }),
            Err(_elapsed) => {
                warn!(protocol = %protocol_name, "fast-path execution exceeded the response timeout");
                Err(OrchestratorError::Timeout)
            }
        }
    }

    async fn run_nlu_fallback(&self, utterance: &str, user_id: &str) -> Result<RouteOutcome, OrchestratorError> {
        let conversation_history: Vec<Value> = self
            .history
            .recent(user_id)
            .into_iter()
            .map(|turn| {
                Value::Object(serde_json::Map::from_iter([
                    ("user_utterance".to_string(), Value::String(turn.utterance)),
                    ("assistant_reply".to_string(), Value::String(turn.response)),
                ]))
            })
            .collect();
        let data = HashMap::from([
            ("input".to_string(), Value::String(utterance.to_string())),
            ("conversation_history".to_string(), Value::Array(conversation_history)),
        ]);
        let (request_id, providers) =
            self.broker.request_capability("orchestrator", INTENT_MATCHING_CAPABILITY, data, None, None);

        if providers.is_empty() {
            return Err(OrchestratorError::NoIntentProvider);
        }

        let value = match self.broker.wait_for_response(request_id, self.config.response_timeout).await {
            Ok(value) => value,
            Err(crate::broker::BrokerError::Timeout { .. }) => return Err(OrchestratorError::Timeout),
            Err(error) => return Err(OrchestratorError::Nlu(error.to_string())),
        };

        if let Some(error_text) = value.get("error").and_then(Value::as_str) {
            return Err(OrchestratorError::Nlu(error_text.to_string()));
        }

        let text = value
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "I'm not sure how to help with that.".to_string());
        let metadata = value.get("metadata");
        let intent = metadata.and_then(|m| m.get("intent")).and_then(Value::as_str).map(str::to_string);
        let capability = metadata.and_then(|m| m.get("capability")).and_then(Value::as_str).map(str::to_string);

        Ok(RouteOutcome { text, intent, capability, protocol_executed: None })
    }
}
