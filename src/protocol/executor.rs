//! Protocol step execution: threads per-step results through parameter
//! bindings, dispatching each step either directly against a provider's
//! in-process function table or through a broker capability request
//! (SPEC_FULL §4.5).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{info, warn};

// Layer 3: Internal module imports
use super::model::{Protocol, ProtocolStep};
use crate::broker::{BroadcastRecorder, MessageBroker};
use crate::logging::{ProtocolUsageEntry, ProtocolUsageLogger};

/// Per-step result map, keyed `step_<i>_<function>` (SPEC_FULL §8
/// invariant 5). Each value is either a provider-shaped payload or
/// `{"error": <msg>}`.
pub type ExecutionResult = HashMap<String, HashMap<String, Value>>;

/// Caller-supplied context threaded into each run (SPEC_FULL §4.5, §4.7).
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Restricts which agents may be dispatched to; a step naming an
    /// agent outside this set fails with `agent_disallowed` without
    /// being dispatched.
    pub allowed_agents: Option<Vec<String>>,
    /// Per-step dispatch timeout when a step falls through to the
    /// broker (SPEC_FULL §4.5 step 3).
    pub timeout: Duration,
    /// The protocol's trigger phrase that was matched (the literal
    /// template from `protocol.trigger_phrases`, not the raw utterance).
    pub trigger_phrase: String,
    /// The raw utterance the user spoke, logged alongside
    /// `trigger_phrase` so the usage log can distinguish a parameterized
    /// template from what was actually said.
    pub matched_utterance: String,
    pub timezone: String,
    pub user_id: Option<String>,
    pub device: Option<String>,
    pub location: Option<String>,
}

static STEP_REF: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\{step_(\d+)_([A-Za-z][A-Za-z0-9_]*)\.([A-Za-z][A-Za-z0-9_]*)\}$")
        .expect("static step-reference regex is valid")
});

static ARG_REF: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\{([A-Za-z][A-Za-z0-9_]*)\}$").expect("static argument-reference regex is valid")
});

fn resolve_reference(
    expr: &str,
    results: &ExecutionResult,
    arguments: &HashMap<String, Value>,
) -> Option<Value> {
    if let Some(captures) = STEP_REF.captures(expr) {
        let index = &captures[1];
        let function = &captures[2];
        let field = &captures[3];
        let key = format!("step_{index}_{function}");
        return results.get(&key).and_then(|fields| fields.get(field)).cloned();
    }
    if let Some(captures) = ARG_REF.captures(expr) {
        return arguments.get(&captures[1]).cloned();
    }
    None
}

fn error_result(message: impl Into<String>) -> HashMap<String, Value> {
    HashMap::from([("error".to_string(), Value::String(message.into()))])
}

/// Runs a matched protocol's ordered steps (SPEC_FULL §4.5).
pub struct ProtocolExecutor {
    broker: MessageBroker,
    usage_logger: Arc<dyn ProtocolUsageLogger>,
    /// Records steps dispatched via the direct function-table path only.
    /// Steps dispatched through `MessageBroker::request_capability` are
    /// already recorded by whatever recorder the broker itself has
    /// attached (`MessageBroker::attach_recorder`); recording them again
    /// here would double the replayed step count, so this hook fires
    /// only for the branch the broker cannot see.
    direct_dispatch_recorder: Mutex<Option<Arc<dyn BroadcastRecorder>>>,
}

impl ProtocolExecutor {
    /// Build an executor bound to `broker`, logging completed runs to
    /// `usage_logger`.
    pub fn new(broker: MessageBroker, usage_logger: Arc<dyn ProtocolUsageLogger>) -> Self {
        Self {
            broker,
            usage_logger,
            direct_dispatch_recorder: Mutex::new(None),
        }
    }

    /// Attach a recorder for steps dispatched directly against a
    /// provider's function table (SPEC_FULL §4.5 "Recording").
    pub fn attach_recorder(&self, recorder: Arc<dyn BroadcastRecorder>) {
        *self.direct_dispatch_recorder.lock() = Some(recorder);
    }

    /// Detach the direct-dispatch recorder, if any.
    pub fn detach_recorder(&self) {
        *self.direct_dispatch_recorder.lock() = None;
    }

    /// Run every step of `protocol` in order, threading results via
    /// parameter bindings, and log a usage entry on completion.
    pub async fn execute(
        &self,
        protocol: &Protocol,
        arguments: &HashMap<String, Value>,
        options: ExecuteOptions,
    ) -> ExecutionResult {
        let started = Instant::now();
        let mut results: ExecutionResult = HashMap::new();
        let mut all_succeeded = true;

        for (index, step) in protocol.steps.iter().enumerate() {
            let key = format!("step_{index}_{}", step.function);
            let outcome = self.run_step(index, step, arguments, &results, &options).await;
            if outcome.contains_key("error") {
                all_succeeded = false;
            }
            results.insert(key, outcome);
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.usage_logger
            .log_usage(ProtocolUsageEntry {
                protocol_name: protocol.name.clone(),
                protocol_id: protocol.id.to_string(),
                extracted_args: arguments.clone(),
                trigger_phrase: options.trigger_phrase.clone(),
                matched_phrase: options.matched_utterance.clone(),
                timestamp: Utc::now(),
                timezone: options.timezone.clone(),
                success: all_succeeded,
                latency_ms,
                user_id: options.user_id.clone(),
                device: options.device.clone(),
                location: options.location.clone(),
            })
            .await;

        info!(
            protocol = %protocol.name,
            protocol_id = %protocol.id,
            success = all_succeeded,
            latency_ms,
            "protocol execution complete"
        );

        results
    }

    async fn run_step(
        &self,
        index: usize,
        step: &ProtocolStep,
        arguments: &HashMap<String, Value>,
        prior_results: &ExecutionResult,
        options: &ExecuteOptions,
    ) -> HashMap<String, Value> {
        if let Some(allowed) = &options.allowed_agents {
            if !allowed.contains(&step.agent) {
                warn!(agent = %step.agent, step = index, "step dispatch refused: agent not in allowed_agents");
                return error_result("agent_disallowed");
            }
        }

        let mut effective = step.parameters.clone();
        for (param_name, expr) in &step.parameter_mappings {
            match resolve_reference(expr, prior_results, arguments) {
                Some(value) => {
                    effective.insert(param_name.clone(), value);
                }
                None => warn!(
                    step = index,
                    param = %param_name,
                    expr = %expr,
                    "parameter mapping did not resolve against prior results or arguments"
                ),
            }
        }

        if let Some(provider) = self.broker.provider(&step.agent) {
            if let Some(outcome) = provider.call_function(&step.function, effective.clone()).await {
                if let Some(recorder) = self.direct_dispatch_recorder.lock().as_ref() {
                    recorder.record_broadcast(&step.function, &[step.agent.clone()], &effective);
                }
                return match outcome {
                    Ok(value) => value,
                    Err(message) => error_result(message),
                };
            }
        }

        let (request_id, providers) = self.broker.request_capability(
            format!("protocol:{}", step.function),
            &step.function,
            effective,
            None,
            options.allowed_agents.clone(),
        );

        if providers.is_empty() {
            return error_result("no_provider");
        }

        match self.broker.wait_for_response(request_id, options.timeout).await {
            Ok(value) => value,
            Err(error) => error_result(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, Provider};
    use crate::logging::NoopLogger;
    use crate::message::Message;
    use async_trait::async_trait;

    struct DirectProvider {
        name: String,
    }

    #[async_trait]
    impl Provider for DirectProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["lights".to_string()]
        }

        async fn receive_message(&self, _message: Message) {}

        async fn call_function(
            &self,
            function: &str,
            params: HashMap<String, Value>,
        ) -> Option<Result<HashMap<String, Value>, String>> {
            if function == "set_color_name" {
                Some(Ok(HashMap::from([(
                    "color".to_string(),
                    params.get("color_name").cloned().unwrap_or(Value::Null),
                )])))
            } else {
                None
            }
        }
    }

    fn broker() -> MessageBroker {
        let broker = MessageBroker::new(BrokerConfig::default());
        broker.start();
        broker
    }

    fn options() -> ExecuteOptions {
        ExecuteOptions {
            timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_dispatch_invokes_provider_function_table() {
        let broker = broker();
        broker.register_provider(Arc::new(DirectProvider { name: "Lights".to_string() }), true, false);

        let executor = ProtocolExecutor::new(broker.clone(), Arc::new(NoopLogger));
        let mut protocol = Protocol::new("blue_lights_on", "");
        protocol.push_step(ProtocolStep {
            agent: "Lights".to_string(),
            function: "set_color_name".to_string(),
            parameters: HashMap::from([("color_name".to_string(), Value::String("blue".to_string()))]),
            parameter_mappings: HashMap::new(),
        });

        let results = executor.execute(&protocol, &HashMap::new(), options()).await;
        let step = results.get("step_0_set_color_name").unwrap();
        assert_eq!(step.get("color"), Some(&Value::String("blue".to_string())));
        broker.stop();
    }

    #[tokio::test]
    async fn disallowed_agent_short_circuits_without_dispatch() {
        let broker = broker();
        broker.register_provider(Arc::new(DirectProvider { name: "Lights".to_string() }), true, false);

        let executor = ProtocolExecutor::new(broker.clone(), Arc::new(NoopLogger));
        let mut protocol = Protocol::new("blue_lights_on", "");
        protocol.push_step(ProtocolStep {
            agent: "Lights".to_string(),
            function: "set_color_name".to_string(),
            parameters: HashMap::new(),
            parameter_mappings: HashMap::new(),
        });

        let mut opts = options();
        opts.allowed_agents = Some(vec!["OtherAgent".to_string()]);
        let results = executor.execute(&protocol, &HashMap::new(), opts).await;
        let step = results.get("step_0_set_color_name").unwrap();
        assert_eq!(step.get("error"), Some(&Value::String("agent_disallowed".to_string())));
        broker.stop();
    }

    #[tokio::test]
    async fn missing_provider_records_no_provider_error() {
        let broker = broker();
        let executor = ProtocolExecutor::new(broker.clone(), Arc::new(NoopLogger));
        let mut protocol = Protocol::new("ghost", "");
        protocol.push_step(ProtocolStep {
            agent: "Nobody".to_string(),
            function: "do_thing".to_string(),
            parameters: HashMap::new(),
            parameter_mappings: HashMap::new(),
        });

        let results = executor.execute(&protocol, &HashMap::new(), options()).await;
        let step = results.get("step_0_do_thing").unwrap();
        assert_eq!(step.get("error"), Some(&Value::String("no_provider".to_string())));
        broker.stop();
    }

    #[tokio::test]
    async fn parameter_mapping_resolves_prior_step_result() {
        let broker = broker();
        broker.register_provider(Arc::new(DirectProvider { name: "Lights".to_string() }), true, false);
        let executor = ProtocolExecutor::new(broker.clone(), Arc::new(NoopLogger));

        let mut protocol = Protocol::new("two_step", "");
        protocol.push_step(ProtocolStep {
            agent: "Lights".to_string(),
            function: "set_color_name".to_string(),
            parameters: HashMap::from([("color_name".to_string(), Value::String("blue".to_string()))]),
            parameter_mappings: HashMap::new(),
        });
        protocol.push_step(ProtocolStep {
            agent: "Lights".to_string(),
            function: "set_color_name".to_string(),
            parameters: HashMap::new(),
            parameter_mappings: HashMap::from([(
                "color_name".to_string(),
                "{step_0_set_color_name.color}".to_string(),
            )]),
        });

        let results = executor.execute(&protocol, &HashMap::new(), options()).await;
        let second = results.get("step_1_set_color_name").unwrap();
        assert_eq!(second.get("color"), Some(&Value::String("blue".to_string())));
        broker.stop();
    }

    #[tokio::test]
    async fn parameter_mapping_resolves_protocol_argument() {
        let broker = broker();
        broker.register_provider(Arc::new(DirectProvider { name: "Lights".to_string() }), true, false);
        let executor = ProtocolExecutor::new(broker.clone(), Arc::new(NoopLogger));

        let mut protocol = Protocol::new("arg_driven", "");
        protocol.push_step(ProtocolStep {
            agent: "Lights".to_string(),
            function: "set_color_name".to_string(),
            parameters: HashMap::new(),
            parameter_mappings: HashMap::from([("color_name".to_string(), "{color}".to_string())]),
        });

        let arguments = HashMap::from([("color".to_string(), Value::String("red".to_string()))]);
        let results = executor.execute(&protocol, &arguments, options()).await;
        let step = results.get("step_0_set_color_name").unwrap();
        assert_eq!(step.get("color"), Some(&Value::String("red".to_string())));
        broker.stop();
    }
}
