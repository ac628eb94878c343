//! Ambient runtime configuration: tunables, feature flags and per-user
//! override storage (SPEC_FULL §2.1, §2.2).
//!
//! None of the concrete services these fields gate (weather, lighting,
//! Roku, calendar, ...) are implemented by this crate (SPEC_FULL §1
//! Non-goals); the fields exist so an embedding application has a single
//! typed place to park them alongside the values this crate's own
//! components read (queue capacity, TTLs, timeouts).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::env;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Boolean toggles gating which concrete capability providers an
/// embedding application wires up.
///
/// Generalized from the original system's fixed `enable_weather` /
/// `enable_lights` / ... fields into a `HashMap<String, bool>` backing
/// store plus well-known accessors, since this crate does not know the
/// concrete provider set ahead of time (SPEC_FULL §2.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    flags: HashMap<String, bool>,
}

/// Well-known flag names the original system hardcoded as dataclass
/// fields; kept here as string constants so callers get compile-time
/// checked names without this crate needing to know what each gates.
pub mod flag_names {
    pub const ENABLE_WEATHER: &str = "enable_weather";
    pub const ENABLE_LIGHTS: &str = "enable_lights";
    pub const ENABLE_CANVAS: &str = "enable_canvas";
    pub const ENABLE_NIGHT_MODE: &str = "enable_night_mode";
    pub const ENABLE_ROKU: &str = "enable_roku";
}

impl FeatureFlags {
    /// A flag set with all five well-known flags defaulted to `true`,
    /// matching the original `FeatureFlags` dataclass defaults.
    pub fn with_defaults() -> Self {
        let mut flags = HashMap::new();
        for name in [
            flag_names::ENABLE_WEATHER,
            flag_names::ENABLE_LIGHTS,
            flag_names::ENABLE_CANVAS,
            flag_names::ENABLE_NIGHT_MODE,
            flag_names::ENABLE_ROKU,
        ] {
            flags.insert(name.to_string(), true);
        }
        Self { flags }
    }

    /// Whether `name` is set, defaulting to `false` for an unknown flag.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Set `name` to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        self.flags.insert(name.into(), value);
    }
}

/// Per-user override values distinct from [`AgentProfile`] (which is
/// personality/conversation state, not credentials): API keys, calendar
/// URL, weather key, lighting/Roku credentials.
///
/// Represented as an opaque `HashMap<String, String>` keyed by
/// well-known constants rather than named fields, since the concrete
/// external services these values configure are out of this crate's
/// scope (SPEC_FULL §2.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    values: HashMap<String, String>,
}

/// Well-known `UserConfig` keys, mirroring the original `UserConfig`
/// dataclass's fields.
pub mod user_config_keys {
    pub const OPENAI_API_KEY: &str = "openai_api_key";
    pub const ANTHROPIC_API_KEY: &str = "anthropic_api_key";
    pub const CALENDAR_API_URL: &str = "calendar_api_url";
    pub const WEATHER_API_KEY: &str = "weather_api_key";
    pub const HUE_BRIDGE_IP: &str = "hue_bridge_ip";
    pub const HUE_USERNAME: &str = "hue_username";
    pub const ROKU_IP_ADDRESS: &str = "roku_ip_address";
    pub const ROKU_USERNAME: &str = "roku_username";
    pub const ROKU_PASSWORD: &str = "roku_password";
}

impl UserConfig {
    /// Read a value by its well-known key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a value by its well-known key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

/// Every tunable named throughout SPEC_FULL: queue capacity, worker
/// count, TTL, cleanup interval, conversation history length, per-request
/// timeout, backpressure thresholds (derived, not stored), feature flags,
/// and the retry/circuit-breaker tunables the original system exposed as
/// configuration surface for provider implementations (SPEC_FULL §2.2).
///
/// A plain struct with [`Default`], not a config-file loader: the
/// Non-goals exclude HTTP/CLI front ends, and environment wiring is read
/// once at startup (SPEC_FULL §6 "Environment inputs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Per-tier priority queue capacity (SPEC_FULL §4.1 default 1000).
    pub queue_capacity: usize,
    /// Number of concurrent broker dispatch workers (default 1).
    pub worker_count: usize,
    /// How long a correlation entry may sit unfulfilled before GC reaps
    /// it (default 300s).
    #[serde(with = "crate::util::serde_helpers::duration_serde")]
    pub correlation_ttl: Duration,
    /// Interval between correlation-table GC sweeps (default 60s).
    #[serde(with = "crate::util::serde_helpers::duration_serde")]
    pub cleanup_interval: Duration,
    /// Orchestrator's per-request NLU routing timeout (SPEC_FULL §5
    /// default 15s).
    #[serde(with = "crate::util::serde_helpers::duration_serde")]
    pub response_timeout: Duration,
    /// Protocol-level per-step dispatch timeout the executor waits on a
    /// `capability_request` response for.
    #[serde(with = "crate::util::serde_helpers::duration_serde")]
    pub intent_timeout: Duration,
    /// Maximum conversation-history turns retained per user (SPEC_FULL
    /// §3 "Conversation History", default 10).
    pub max_history_length: usize,
    /// Whether a `capability_response` that both resolves a correlation
    /// entry and names a `to_agent` is also forwarded to that agent
    /// (SPEC_FULL §9 Open Question, default `true`).
    pub double_deliver_responses: bool,
    /// Retry/circuit-breaker tunables carried forward for provider
    /// implementations even though the broker's own circuit breaker is a
    /// simple boolean gate (SPEC_FULL §2.2).
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_exponential_base: f64,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_recovery_timeout: Duration,
    /// Default `user_id` used when a request carries no metadata
    /// (SPEC_FULL §4.7 step 1).
    pub default_user_id: String,
    /// Whether verbose logging was requested at startup.
    pub verbose: bool,
    /// Feature toggles for optional subsystems.
    pub flags: FeatureFlags,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            worker_count: 1,
            correlation_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            response_timeout: Duration::from_secs(15),
            intent_timeout: Duration::from_secs(5),
            max_history_length: 10,
            double_deliver_responses: true,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(60),
            retry_exponential_base: 2.0,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_recovery_timeout: Duration::from_secs(60),
            default_user_id: "1".to_string(),
            verbose: false,
            flags: FeatureFlags::with_defaults(),
        }
    }
}

impl RuntimeConfig {
    /// Build a config from `Default`, overriding `default_user_id` and
    /// `verbose` from the environment if present (SPEC_FULL §6
    /// "Environment inputs (read once at startup)").
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(user_id) = env::var("DEFAULT_USER_ID") {
            config.default_user_id = user_id;
        }
        if let Ok(verbose) = env::var("JARVIS_VERBOSE") {
            config.verbose = verbose.eq_ignore_ascii_case("true") || verbose == "1";
        }
        config
    }
}

/// Per-user_id personality, conversation style and interaction state
/// (SPEC_FULL §3 "AgentProfile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub display_name: String,
    pub preferred_personality: Option<String>,
    pub interests: Vec<String>,
    pub conversation_style: Option<String>,
    pub humor_preference: Option<String>,
    pub topics_of_interest: Vec<String>,
    pub language_preference: Option<String>,
    pub interaction_count: u64,
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
    pub required_resources: std::collections::HashSet<String>,
}

impl AgentProfile {
    /// A fresh profile for a never-before-seen user.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            preferred_personality: None,
            interests: Vec::new(),
            conversation_style: None,
            humor_preference: None,
            topics_of_interest: Vec::new(),
            language_preference: None,
            interaction_count: 0,
            last_seen: None,
            required_resources: std::collections::HashSet::new(),
        }
    }

    /// Record an interaction: bump the count and stamp `last_seen`.
    pub fn record_interaction(&mut self) {
        self.interaction_count += 1;
        self.last_seen = Some(chrono::Utc::now());
    }
}
