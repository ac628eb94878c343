//! The facade composing the trigger matcher, persistent registry, step
//! executor and response formatter into the single entry point an
//! orchestrator calls (SPEC_FULL §4.9).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::executor::{ExecuteOptions, ProtocolExecutor};
use super::formatter::ResponseFormatter;
use super::matcher::{MatchResult, MatcherError, TriggerMatcher};
use super::model::Protocol;
use super::registry::ProtocolRegistry;
use crate::util::ProtocolId;

/// Composes a [`ProtocolRegistry`], [`TriggerMatcher`], [`ProtocolExecutor`]
/// and [`ResponseFormatter`] into the orchestrator's single protocol
/// entry point, so callers outside this module never need to reach past
/// the facade into the individual components (SPEC_FULL §4.9).
pub struct ProtocolRuntime {
    registry: Arc<ProtocolRegistry>,
    matcher: Arc<TriggerMatcher>,
    executor: Arc<ProtocolExecutor>,
    formatter: Arc<ResponseFormatter>,
}

impl ProtocolRuntime {
    pub fn new(
        registry: Arc<ProtocolRegistry>,
        matcher: Arc<TriggerMatcher>,
        executor: Arc<ProtocolExecutor>,
        formatter: Arc<ResponseFormatter>,
    ) -> Self {
        Self { registry, matcher, executor, formatter }
    }

    /// Match `utterance` against the in-memory trigger index first; if
    /// nothing fires (e.g. before the index has been rebuilt since a
    /// registry write), fall back to the persistent registry's own exact
    /// trigger-phrase scan.
    pub fn try_match(&self, utterance: &str) -> Option<MatchResult> {
        if let Some(result) = self.matcher.match_utterance(utterance) {
            return Some(result);
        }
        self.registry.find_matching_protocol(utterance).map(|protocol| MatchResult {
            protocol,
            arguments: HashMap::new(),
            matched_phrase: utterance.to_string(),
        })
    }

    /// Run the matched protocol's steps and render the result to text.
    pub async fn run_and_format(&self, matched: &MatchResult, options: ExecuteOptions) -> String {
        let results = self.executor.execute(&matched.protocol, &matched.arguments, options).await;
        self.formatter.format(&matched.protocol, &matched.arguments, &results).await
    }

    /// Every protocol currently in the registry.
    pub fn list_protocols(&self) -> Vec<Protocol> {
        self.registry
            .list_ids()
            .into_iter()
            .filter_map(|id| self.registry.get(&id.to_string()))
            .collect()
    }

    /// Every trigger phrase of every registered protocol, flattened, for
    /// a "what can I say" help surface.
    pub fn get_available_commands(&self) -> Vec<String> {
        self.list_protocols().into_iter().flat_map(|p| p.trigger_phrases).collect()
    }

    /// Look up a single protocol by id or name.
    pub fn get_protocol(&self, id_or_name: &str) -> Option<Protocol> {
        self.registry.get(id_or_name)
    }

    /// The id of a single protocol by name, if registered.
    pub fn find_id(&self, name: &str) -> Option<ProtocolId> {
        self.registry.get(name).map(|p| p.id)
    }

    /// Index a newly-registered protocol into the trigger matcher without
    /// a full rebuild.
    pub fn index_protocol(&self, protocol: &Protocol) -> Result<(), MatcherError> {
        self.matcher.index_protocol(protocol)
    }

    /// Rebuild the trigger index from the registry's current contents
    /// (after a bulk load or a batch of registrations).
    pub fn rebuild_index(&self) -> Result<(), MatcherError> {
        let protocols = self.list_protocols();
        self.matcher.rebuild(&protocols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, MessageBroker};
    use crate::logging::NoopLogger;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn runtime() -> ProtocolRuntime {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let registry = Arc::new(ProtocolRegistry::from_pool(pool).await.unwrap());
        let matcher = Arc::new(TriggerMatcher::new());
        let broker = MessageBroker::new(BrokerConfig::default());
        let executor = Arc::new(ProtocolExecutor::new(broker, Arc::new(NoopLogger)));
        let formatter = Arc::new(ResponseFormatter::new(None));
        ProtocolRuntime::new(registry, matcher, executor, formatter)
    }

    #[tokio::test]
    async fn registering_and_indexing_makes_a_protocol_matchable() {
        let runtime = runtime().await;
        let mut protocol = Protocol::new("blue_lights_on", "");
        protocol.trigger_phrases = vec!["blue lights".to_string()];
        runtime.registry.register(protocol.clone()).await.unwrap();
        runtime.index_protocol(&protocol).unwrap();

        let matched = runtime.try_match("blue lights").unwrap();
        assert_eq!(matched.protocol.name, "blue_lights_on");
    }

    #[tokio::test]
    async fn try_match_falls_back_to_the_registry_when_the_index_misses() {
        let runtime = runtime().await;
        let mut protocol = Protocol::new("blue_lights_on", "");
        protocol.trigger_phrases = vec!["blue lights".to_string()];
        runtime.registry.register(protocol).await.unwrap();

        let matched = runtime.try_match("blue lights").unwrap();
        assert_eq!(matched.protocol.name, "blue_lights_on");
    }

    #[tokio::test]
    async fn run_and_format_renders_a_protocol_with_no_response_block() {
        let runtime = runtime().await;
        let protocol = Protocol::new("noop_protocol", "");
        let matched = MatchResult { protocol, arguments: HashMap::new(), matched_phrase: "noop_protocol".to_string() };

        let text = runtime.run_and_format(&matched, ExecuteOptions { timeout: std::time::Duration::from_secs(1), ..Default::default() }).await;
        assert_eq!(text, "noop_protocol completed successfully.");
    }

    #[tokio::test]
    async fn get_available_commands_lists_every_trigger_phrase() {
        let runtime = runtime().await;
        let mut protocol = Protocol::new("blue_lights_on", "");
        protocol.trigger_phrases = vec!["blue lights".to_string(), "make it blue".to_string()];
        runtime.registry.register(protocol).await.unwrap();

        let commands = runtime.get_available_commands();
        assert_eq!(commands.len(), 2);
    }
}
