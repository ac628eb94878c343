//! The concrete broker engine: provider directory, fast-path and queued
//! delivery, capability broadcast, and request/response correlation
//! (SPEC_FULL §4.1).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::capability_registry::CapabilityRegistry;
use super::correlation::{CorrelationTable, CorrelationValue};
use super::error::BrokerError;
use super::metrics::{BrokerMetrics, MetricsSnapshot};
use super::provider::Provider;
use super::queue::{EnqueueOutcome, PriorityQueues};
use crate::constants::INTENT_MATCHING_CAPABILITY;
use crate::message::{Message, MessagePriority, CAPABILITY_REQUEST, CAPABILITY_RESPONSE, ERROR};
use crate::util::RequestId;

/// Tunables governing a [`MessageBroker`]'s queues, correlation table and
/// worker pool. Mirrors the broker-relevant subset of
/// [`crate::config::RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Per-tier priority queue capacity (SPEC_FULL §4.1 default 1000).
    pub queue_capacity: usize,
    /// Number of concurrent dispatch workers draining the queues.
    pub worker_count: usize,
    /// How long a correlation entry may sit unfulfilled before GC reaps it.
    pub correlation_ttl: Duration,
    /// Interval between correlation-table GC sweeps.
    pub cleanup_interval: Duration,
    /// When a `capability_response` both resolves a correlation entry and
    /// names a `to_agent`, whether to *also* deliver it to that agent
    /// (open question resolved in SPEC_FULL §4.1/§9: default `true`).
    pub double_deliver_responses: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            worker_count: 1,
            correlation_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            double_deliver_responses: true,
        }
    }
}

/// Hook invoked for every `capability_request` broadcast that isn't the
/// intent matcher's own probing traffic, so the recorder can log protocol
/// steps without the broker depending on the `recorder` module directly.
pub trait BroadcastRecorder: Send + Sync {
    /// Record that `capability` was broadcast to `providers` carrying
    /// `data`.
    fn record_broadcast(&self, capability: &str, providers: &[String], data: &HashMap<String, Value>);
}

struct Inner {
    config: BrokerConfig,
    providers: DashMap<String, Arc<dyn Provider>>,
    capabilities: CapabilityRegistry,
    correlation: Arc<CorrelationTable>,
    queues: Arc<PriorityQueues>,
    metrics: Arc<BrokerMetrics>,
    recorder: Mutex<Option<Arc<dyn BroadcastRecorder>>>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The in-memory capability message broker.
///
/// Cheap to clone (an `Arc<Inner>` handle): providers receive a clone via
/// [`Provider::on_registered`] so they can call back without the broker
/// holding a reference to whatever owns the provider (SPEC_FULL §9).
#[derive(Clone)]
pub struct MessageBroker {
    inner: Arc<Inner>,
}

impl MessageBroker {
    /// Construct a new broker. Queues, the correlation table and the
    /// provider directory are empty; call [`MessageBroker::start`] to
    /// spawn the dispatch workers and the correlation GC.
    pub fn new(config: BrokerConfig) -> Self {
        let metrics = Arc::new(BrokerMetrics::new());
        let queues = Arc::new(PriorityQueues::new(config.queue_capacity, Arc::clone(&metrics)));
        let correlation = Arc::new(CorrelationTable::new(config.correlation_ttl, Arc::clone(&metrics)));
        Self {
            inner: Arc::new(Inner {
                config,
                providers: DashMap::new(),
                capabilities: CapabilityRegistry::new(),
                correlation,
                queues,
                metrics,
                recorder: Mutex::new(None),
                running: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the worker pool and the correlation GC task. Idempotent: a
    /// second call is a no-op while the broker is already running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.inner.tasks.lock();
        tasks.push(self.inner.correlation.spawn_gc(self.inner.config.cleanup_interval));
        for worker_id in 0..self.inner.config.worker_count.max(1) {
            let broker = self.clone();
            tasks.push(tokio::spawn(async move {
                broker.worker_loop(worker_id).await;
            }));
        }
    }

    /// Stop the worker pool and GC, and cancel every outstanding
    /// correlation entry (its waiters observe [`BrokerError::Cancelled`]).
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.correlation.cancel_all();
    }

    /// Attach a sink that records every non-intent-matching capability
    /// broadcast. Replaces any previously attached recorder.
    pub fn attach_recorder(&self, recorder: Arc<dyn BroadcastRecorder>) {
        *self.inner.recorder.lock() = Some(recorder);
    }

    /// Detach the currently attached recorder, if any.
    pub fn detach_recorder(&self) {
        *self.inner.recorder.lock() = None;
    }

    /// A point-in-time snapshot of broker-wide counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Register `provider` under the broker's directory. If
    /// `include_capabilities` is set, its advertised capabilities are
    /// registered into the active table, or the dormant table when
    /// `dormant` is true (night-mode agents). Calls
    /// [`Provider::on_registered`] with a cloned handle.
    pub fn register_provider(&self, provider: Arc<dyn Provider>, include_capabilities: bool, dormant: bool) {
        let name = provider.name().to_string();
        if include_capabilities {
            for capability in provider.capabilities() {
                if dormant {
                    self.inner.capabilities.register_dormant(&capability, &name);
                } else {
                    self.inner.capabilities.register_active(&capability, &name);
                }
            }
        }
        provider.on_registered(self.clone());
        self.inner.providers.insert(name, provider);
    }

    /// Remove `name` from the provider directory and from both capability
    /// tables for every capability it advertised.
    pub fn unregister_provider(&self, name: &str) {
        if let Some((_, provider)) = self.inner.providers.remove(name) {
            for capability in provider.capabilities() {
                self.inner.capabilities.unregister_active(&capability, name);
                self.inner.capabilities.unregister_dormant(&capability, name);
            }
        }
    }

    /// Move every capability `name` advertises from dormant to active.
    pub fn activate_capabilities(&self, name: &str) -> Result<(), BrokerError> {
        let provider = self
            .inner
            .providers
            .get(name)
            .ok_or_else(|| BrokerError::RegistryError(format!("unknown provider: {name}")))?;
        self.inner.capabilities.activate(name, &provider.capabilities());
        Ok(())
    }

    /// Move every capability `name` advertises from active to dormant.
    pub fn deactivate_capabilities(&self, name: &str) -> Result<(), BrokerError> {
        let provider = self
            .inner
            .providers
            .get(name)
            .ok_or_else(|| BrokerError::RegistryError(format!("unknown provider: {name}")))?;
        self.inner.capabilities.deactivate(name, &provider.capabilities());
        Ok(())
    }

    /// Ordered list of active providers for `capability`.
    pub fn providers_for(&self, capability: &str) -> Vec<String> {
        self.inner.capabilities.providers_for(capability)
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.inner.providers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a registered provider by name, for callers (the protocol
    /// executor) that need direct access to its in-process function
    /// table rather than routing through `send`/`request_capability`
    /// (SPEC_FULL §4.5 step 2).
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.lookup(name)
    }

    fn schedule_delivery(&self, provider: Arc<dyn Provider>, message: Message) {
        let recipient = provider.name().to_string();
        let message_id = message.id;
        tokio::spawn(async move {
            let handle = tokio::spawn(async move { provider.receive_message(message).await });
            if let Err(join_err) = handle.await {
                warn!(%recipient, %message_id, error = %join_err, "provider panicked while handling a delivered message");
            }
        });
    }

    /// Send `message`. If `to_agent` is set and the provider is currently
    /// registered, deliver it immediately without touching the priority
    /// queues (the "fast path", SPEC_FULL §4.1); otherwise classify (or
    /// honor the caller's `priority` override) and enqueue for the worker
    /// pool to fan out.
    pub fn send(&self, message: Message, priority: Option<MessagePriority>) {
        if let Some(to_agent) = message.to_agent.clone() {
            if let Some(provider) = self.lookup(&to_agent) {
                self.inner.metrics.record_direct();
                self.schedule_delivery(provider, message);
                return;
            }
        }
        let priority = priority.unwrap_or_else(|| message.default_priority());
        self.inner.metrics.record_queued();
        match self.inner.queues.enqueue(message, priority) {
            EnqueueOutcome::Enqueued => {}
            EnqueueOutcome::Dropped => {
                warn!("message dropped by backpressure policy before dispatch");
            }
        }
    }

    /// Broadcast a `capability_request` for `capability`, creating a
    /// correlation entry under a fresh (or caller-supplied) `request_id`.
    /// Returns the request id and the list of providers the request will
    /// reach (after intersecting with `allowed_agents`, if given).
    pub fn request_capability(
        &self,
        from_agent: impl Into<String>,
        capability: &str,
        data: HashMap<String, Value>,
        request_id: Option<RequestId>,
        allowed_agents: Option<Vec<String>>,
    ) -> (RequestId, Vec<String>) {
        let request_id = request_id.unwrap_or_default();
        let mut providers = self.providers_for(capability);
        if let Some(allowed) = &allowed_agents {
            providers.retain(|p| allowed.contains(p));
        }

        self.inner.correlation.create(request_id);

        let mut content = HashMap::new();
        content.insert("capability".to_string(), Value::String(capability.to_string()));
        content.insert("data".to_string(), Value::Object(data.into_iter().collect()));
        if let Some(allowed) = &allowed_agents {
            content.insert(
                "allowed_agents".to_string(),
                Value::Array(allowed.iter().cloned().map(Value::String).collect()),
            );
        }

        let message = Message::new(from_agent, None, CAPABILITY_REQUEST)
            .with_content(content.clone())
            .with_request_id(request_id);

        self.inner.metrics.record_broadcast();
        if let Some(recorder) = self.inner.recorder.lock().as_ref() {
            if capability != INTENT_MATCHING_CAPABILITY {
                let data = content
                    .get("data")
                    .and_then(Value::as_object)
                    .map(|obj| obj.clone().into_iter().collect())
                    .unwrap_or_default();
                recorder.record_broadcast(capability, &providers, &data);
            }
        }

        for provider_name in &providers {
            if let Some(provider) = self.lookup(provider_name) {
                let mut targeted = message.clone();
                targeted.to_agent = Some(provider_name.clone());
                self.schedule_delivery(provider, targeted);
            }
        }

        (request_id, providers)
    }

    /// Await the response to a prior [`MessageBroker::request_capability`]
    /// call, up to `timeout`. Distinguishes a TTL/caller timeout from a
    /// broker shutdown via [`CorrelationTable::is_stopped`].
    pub async fn wait_for_response(
        &self,
        request_id: RequestId,
        timeout: Duration,
    ) -> Result<CorrelationValue, BrokerError> {
        let receiver = self
            .inner
            .correlation
            .take_receiver(request_id)
            .ok_or(BrokerError::UnknownRequest(request_id))?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_recv_error)) => {
                self.inner.correlation.remove(request_id);
                if self.inner.correlation.is_stopped() {
                    Err(BrokerError::Cancelled(request_id))
                } else {
                    Err(BrokerError::Timeout { request_id, waited: timeout })
                }
            }
            Err(_elapsed) => {
                self.inner.correlation.remove(request_id);
                Err(BrokerError::Timeout { request_id, waited: timeout })
            }
        }
    }

    /// Convenience wrapper: send a `capability_response` message,
    /// resolving `request_id`'s correlation entry through the worker
    /// dispatch loop.
    pub fn send_capability_response(
        &self,
        to: impl Into<String>,
        content: HashMap<String, Value>,
        request_id: Option<RequestId>,
        reply_to: Option<crate::util::MessageId>,
    ) {
        let mut message = Message::new(to.into(), None, CAPABILITY_RESPONSE).with_content(content);
        message.request_id = request_id;
        message.reply_to = reply_to;
        self.send(message, None);
    }

    /// Convenience wrapper: send an `error` message.
    pub fn send_error(&self, from_agent: impl Into<String>, error_text: impl Into<String>, request_id: Option<RequestId>) {
        let message = Message::error(from_agent, None, request_id, error_text);
        self.send(message, None);
    }

    async fn worker_loop(&self, worker_id: usize) {
        debug!(worker_id, "broker dispatch worker started");
        loop {
            if !self.inner.running.load(Ordering::SeqCst) {
                return;
            }
            if let Some(message) = self.inner.queues.dequeue(Duration::from_millis(200)).await {
                self.dispatch(message);
            }
        }
    }

    fn dispatch(&self, message: Message) {
        match message.message_type.as_str() {
            CAPABILITY_RESPONSE => self.dispatch_response(message, false),
            ERROR => self.dispatch_response(message, true),
            _ if message.to_agent.is_some() => {
                let to_agent = message.to_agent.clone().expect("checked is_some above");
                if let Some(provider) = self.lookup(&to_agent) {
                    self.schedule_delivery(provider, message);
                } else {
                    warn!(%to_agent, "dropping queued message: provider not registered");
                }
            }
            CAPABILITY_REQUEST => self.dispatch_broadcast_request(message),
            other => warn!(message_type = %other, "dropping queued message of unrecognized type with no recipient"),
        }
    }

    fn dispatch_response(&self, message: Message, is_error: bool) {
        let Some(request_id) = message.request_id else {
            warn!("capability_response/error with no request_id cannot be correlated");
            return;
        };

        let value = if is_error {
            let mut value = CorrelationValue::new();
            if let Some(text) = message.error_text() {
                value.insert("error".to_string(), Value::String(text.to_string()));
            }
            value
        } else {
            message.content.clone()
        };

        let resolved = self.inner.correlation.fulfill(request_id, value);
        if !resolved {
            debug!(%request_id, "response arrived for an unknown or already-resolved request");
        }

        if let Some(to_agent) = message.to_agent.clone() {
            let should_forward = !resolved || self.inner.config.double_deliver_responses;
            if should_forward {
                if let Some(provider) = self.lookup(&to_agent) {
                    self.schedule_delivery(provider, message);
                }
            }
        }
    }

    fn dispatch_broadcast_request(&self, message: Message) {
        let Some(capability) = message.content.get("capability").and_then(Value::as_str) else {
            warn!("capability_request with no capability field dropped");
            return;
        };
        let mut providers = self.providers_for(capability);
        if let Some(allowed) = message.content.get("allowed_agents").and_then(Value::as_array) {
            let allowed: Vec<String> = allowed.iter().filter_map(Value::as_str).map(str::to_string).collect();
            providers.retain(|p| allowed.contains(p));
        }
        for provider_name in providers {
            if let Some(provider) = self.lookup(&provider_name) {
                let mut targeted = message.clone();
                targeted.to_agent = Some(provider_name);
                self.schedule_delivery(provider, targeted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    struct EchoProvider {
        name: String,
        caps: Vec<String>,
        received: Arc<AsyncMutex<Vec<Message>>>,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> Vec<String> {
            self.caps.clone()
        }

        async fn receive_message(&self, message: Message) {
            self.received.lock().await.push(message);
        }
    }

    fn broker() -> MessageBroker {
        let broker = MessageBroker::new(BrokerConfig {
            cleanup_interval: Duration::from_millis(50),
            ..BrokerConfig::default()
        });
        broker.start();
        broker
    }

    #[tokio::test]
    async fn fast_path_delivers_directly_to_named_recipient() {
        let broker = broker();
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let provider = Arc::new(EchoProvider {
            name: "Lights".to_string(),
            caps: vec!["lights".to_string()],
            received: Arc::clone(&received),
        });
        broker.register_provider(provider, true, false);

        let message = Message::new("orchestrator", Some("Lights".to_string()), "ping");
        broker.send(message, None);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(received.lock().await.len(), 1);
        assert_eq!(broker.metrics().direct_messages, 1);
        broker.stop();
    }

    #[tokio::test]
    async fn request_capability_round_trips_through_correlation_table() {
        let broker = broker();
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let provider = Arc::new(EchoProvider {
            name: "Weather".to_string(),
            caps: vec!["weather".to_string()],
            received: Arc::clone(&received),
        });
        broker.register_provider(provider, true, false);

        let (request_id, providers) =
            broker.request_capability("orchestrator", "weather", HashMap::new(), None, None);
        assert_eq!(providers, vec!["Weather".to_string()]);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut content = HashMap::new();
        content.insert("response".to_string(), Value::String("sunny".to_string()));
        broker.send_capability_response("Weather", content, Some(request_id), None);

        let result = broker.wait_for_response(request_id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(result.get("response").and_then(Value::as_str), Some("sunny"));
        broker.stop();
    }

    #[tokio::test]
    async fn wait_for_response_on_unknown_request_errors() {
        let broker = broker();
        let result = broker.wait_for_response(RequestId::new(), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(BrokerError::UnknownRequest(_))));
        broker.stop();
    }

    #[tokio::test]
    async fn wait_for_response_times_out_without_a_response() {
        let broker = broker();
        let (request_id, _) = broker.request_capability("orchestrator", "nonexistent", HashMap::new(), None, None);
        let result = broker.wait_for_response(request_id, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BrokerError::Timeout { .. })));
        broker.stop();
    }

    #[tokio::test]
    async fn stop_cancels_outstanding_requests() {
        let broker = broker();
        let (request_id, _) = broker.request_capability("orchestrator", "nonexistent", HashMap::new(), None, None);
        let wait = tokio::spawn({
            let broker = broker.clone();
            async move { broker.wait_for_response(request_id, Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.stop();

        let result = wait.await.unwrap();
        assert!(matches!(result, Err(BrokerError::Cancelled(_))));
    }

    #[tokio::test]
    async fn dormant_provider_does_not_receive_broadcast_until_activated() {
        let broker = broker();
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let provider = Arc::new(EchoProvider {
            name: "NightOwl".to_string(),
            caps: vec!["wake_up".to_string()],
            received: Arc::clone(&received),
        });
        broker.register_provider(provider, true, true);

        let (_request_id, providers) =
            broker.request_capability("orchestrator", "wake_up", HashMap::new(), None, None);
        assert!(providers.is_empty());

        broker.activate_capabilities("NightOwl").unwrap();
        let (_request_id, providers) =
            broker.request_capability("orchestrator", "wake_up", HashMap::new(), None, None);
        assert_eq!(providers, vec!["NightOwl".to_string()]);
        broker.stop();
    }
}
