//! SQLite-backed persistent protocol store with an in-memory read cache
//! (SPEC_FULL §4.3, §6).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// Layer 3: Internal module imports
use super::error::ProtocolError;
use super::model::{ArgumentDefinition, Protocol, ProtocolResponse, ProtocolStep};
use crate::util::normalize::{normalize_name, normalize_strict};
use crate::util::ProtocolId;

const CREATE_PROTOCOLS_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS protocols (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        arguments TEXT,
        steps TEXT,
        trigger_phrases TEXT,
        argument_definitions TEXT,
        response TEXT
    )
";

const SELECT_ALL_PROTOCOLS: &str = r"
    SELECT id, name, description, arguments, steps, trigger_phrases, argument_definitions, response
    FROM protocols
";

const INSERT_OR_REPLACE_PROTOCOL: &str = r"
    INSERT OR REPLACE INTO protocols
        (id, name, description, arguments, steps, trigger_phrases, argument_definitions, response)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
";

const DELETE_PROTOCOL: &str = "DELETE FROM protocols WHERE id = ?1";

/// Outcome of a [`ProtocolRegistry::register`] call, mirroring the
/// "duplicate" result shape of the original registry's `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The protocol was inserted (or, on a `replace_duplicates` call,
    /// overwritten).
    Registered(ProtocolId),
    /// The same id was already registered; second call is a no-op
    /// (SPEC_FULL §8 idempotence law).
    AlreadyRegistered(ProtocolId),
}

/// Persists [`Protocol`] definitions to SQLite and keeps an in-memory
/// cache (`DashMap<ProtocolId, Protocol>`) for lock-free, low-latency
/// reads — `find_matching_protocol` is on the orchestrator's hot path and
/// must not round-trip to disk per lookup.
pub struct ProtocolRegistry {
    pool: SqlitePool,
    cache: DashMap<ProtocolId, Protocol>,
}

impl ProtocolRegistry {
    /// Open (creating if absent) the SQLite database at `database_url`,
    /// ensure its schema, and hydrate the in-memory cache from it.
    #[instrument(skip_all, fields(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, ProtocolError> {
        let pool = SqlitePoolOptions::new().connect(database_url).await?;
        let registry = Self { pool, cache: DashMap::new() };
        registry.ensure_schema().await?;
        registry.hydrate_cache().await?;
        Ok(registry)
    }

    /// Build a registry directly from an already-open pool (tests, or an
    /// embedding application that manages its own connection pool).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, ProtocolError> {
        let registry = Self { pool, cache: DashMap::new() };
        registry.ensure_schema().await?;
        registry.hydrate_cache().await?;
        Ok(registry)
    }

    #[instrument(skip(self), err)]
    async fn ensure_schema(&self) -> Result<(), ProtocolError> {
        sqlx::query(CREATE_PROTOCOLS_TABLE).execute(&self.pool).await?;

        // Additive schema evolution only: backfill any column missing
        // from an older database file (SPEC_FULL §1 Non-goals / §4.3).
        let existing: Vec<String> = sqlx::query("PRAGMA table_info(protocols)")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for column in ["arguments", "steps", "trigger_phrases", "argument_definitions", "response"] {
            if !existing.iter().any(|c| c == column) {
                let alter = format!("ALTER TABLE protocols ADD COLUMN {column} TEXT");
                sqlx::query(&alter).execute(&self.pool).await?;
                info!(column, "backfilled missing protocols column");
            }
        }
        Ok(())
    }

    async fn hydrate_cache(&self) -> Result<(), ProtocolError> {
        let rows = sqlx::query(SELECT_ALL_PROTOCOLS).fetch_all(&self.pool).await?;
        for row in rows {
            let protocol = Self::row_to_protocol(&row)?;
            debug!(id = %protocol.id, name = %protocol.name, "protocol loaded from storage");
            self.cache.insert(protocol.id, protocol);
        }
        Ok(())
    }

    fn row_to_protocol(row: &sqlx::sqlite::SqliteRow) -> Result<Protocol, ProtocolError> {
        let id_text: String = row.get("id");
        let id = Uuid::parse_str(&id_text)
            .map(ProtocolId::from_uuid)
            .map_err(|e| ProtocolError::InvalidDefinition(format!("stored protocol id is not a uuid: {e}")))?;

        let arguments: HashMap<String, Value> =
            parse_json_column(row.get::<Option<String>, _>("arguments"), "{}")?;
        let steps: Vec<ProtocolStep> = parse_json_column(row.get::<Option<String>, _>("steps"), "[]")?;
        let trigger_phrases: Vec<String> =
            parse_json_column(row.get::<Option<String>, _>("trigger_phrases"), "[]")?;
        let argument_definitions: Vec<ArgumentDefinition> =
            parse_json_column(row.get::<Option<String>, _>("argument_definitions"), "[]")?;
        let response: Option<ProtocolResponse> =
            parse_json_column(row.get::<Option<String>, _>("response"), "null")?;

        Ok(Protocol {
            id,
            name: row.get("name"),
            description: row.get::<Option<String>, _>("description").unwrap_or_default(),
            arguments,
            trigger_phrases,
            steps,
            argument_definitions,
            response,
        })
    }

    fn normalized_trigger_set(phrases: &[String]) -> Vec<String> {
        let mut normalized: Vec<String> = phrases.iter().map(|p| normalize_strict(p)).collect();
        normalized.sort();
        normalized.dedup();
        normalized
    }

    /// Whether `protocol` collides by name or trigger-phrase set with any
    /// *other* cached protocol (SPEC_FULL §4.3 invariants 1-2).
    pub fn conflicting_entry(&self, protocol: &Protocol) -> Option<ConflictKind> {
        let name_key = normalize_name(&protocol.name);
        let trigger_key = Self::normalized_trigger_set(&protocol.trigger_phrases);

        for entry in self.cache.iter() {
            let existing = entry.value();
            if existing.id == protocol.id {
                continue;
            }
            if normalize_name(&existing.name) == name_key {
                return Some(ConflictKind::Name);
            }
            if Self::normalized_trigger_set(&existing.trigger_phrases) == trigger_key {
                return Some(ConflictKind::TriggerSet);
            }
        }
        None
    }

    /// Register `protocol`. Registering the same id a second time is a
    /// no-op (idempotence law, SPEC_FULL §8). Otherwise, rejects on a
    /// name or trigger-phrase-set collision with any other protocol.
    #[instrument(skip(self, protocol), fields(name = %protocol.name))]
    pub async fn register(&self, protocol: Protocol) -> Result<RegisterOutcome, ProtocolError> {
        if self.cache.contains_key(&protocol.id) {
            return Ok(RegisterOutcome::AlreadyRegistered(protocol.id));
        }

        match self.conflicting_entry(&protocol) {
            Some(ConflictKind::Name) => return Err(ProtocolError::DuplicateName(protocol.name)),
            Some(ConflictKind::TriggerSet) => {
                return Err(ProtocolError::DuplicateTriggerSet(protocol.name))
            }
            None => {}
        }

        self.persist(&protocol).await?;
        let id = protocol.id;
        self.cache.insert(id, protocol);
        Ok(RegisterOutcome::Registered(id))
    }

    /// Register `protocol`, overwriting whatever previously occupied its
    /// id or name slot instead of rejecting the collision (the bulk
    /// directory loader's `replace_duplicates = true` behavior,
    /// SPEC_FULL §2.2/§4.3). A trigger-set collision against a
    /// *different*-named protocol is still rejected: replacing a file by
    /// name is expected on reload, but two distinctly named protocols
    /// claiming the same trigger phrases is a definition error.
    #[instrument(skip(self, protocol), fields(name = %protocol.name))]
    pub async fn register_replacing(&self, protocol: Protocol) -> Result<RegisterOutcome, ProtocolError> {
        if self.cache.contains_key(&protocol.id) {
            self.persist(&protocol).await?;
            let id = protocol.id;
            self.cache.insert(id, protocol);
            return Ok(RegisterOutcome::Registered(id));
        }

        let name_key = normalize_name(&protocol.name);
        let superseded = self
            .cache
            .iter()
            .find(|entry| normalize_name(&entry.value().name) == name_key)
            .map(|entry| *entry.key());

        match superseded {
            Some(old_id) => self.delete(old_id).await?,
            None => {
                if let Some(ConflictKind::TriggerSet) = self.conflicting_entry(&protocol) {
                    return Err(ProtocolError::DuplicateTriggerSet(protocol.name));
                }
            }
        }

        self.persist(&protocol).await?;
        let id = protocol.id;
        self.cache.insert(id, protocol);
        Ok(RegisterOutcome::Registered(id))
    }

    async fn delete(&self, id: ProtocolId) -> Result<(), ProtocolError> {
        sqlx::query(DELETE_PROTOCOL).bind(id.to_string()).execute(&self.pool).await?;
        self.cache.remove(&id);
        Ok(())
    }

    async fn persist(&self, protocol: &Protocol) -> Result<(), ProtocolError> {
        let arguments = serde_json::to_string(&protocol.arguments)?;
        let steps = serde_json::to_string(&protocol.steps)?;
        let trigger_phrases = serde_json::to_string(&protocol.trigger_phrases)?;
        let argument_definitions = serde_json::to_string(&protocol.argument_definitions)?;
        let response = serde_json::to_string(&protocol.response)?;

        sqlx::query(INSERT_OR_REPLACE_PROTOCOL)
            .bind(protocol.id.to_string())
            .bind(&protocol.name)
            .bind(&protocol.description)
            .bind(arguments)
            .bind(steps)
            .bind(trigger_phrases)
            .bind(argument_definitions)
            .bind(response)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Look up by id (as a UUID string) or, failing that, by exact name.
    pub fn get(&self, id_or_name: &str) -> Option<Protocol> {
        if let Ok(uuid) = Uuid::parse_str(id_or_name) {
            if let Some(protocol) = self.cache.get(&ProtocolId::from_uuid(uuid)) {
                return Some(protocol.clone());
            }
        }
        self.cache.iter().find(|entry| entry.value().name == id_or_name).map(|entry| entry.value().clone())
    }

    /// Every registered protocol id.
    pub fn list_ids(&self) -> Vec<ProtocolId> {
        self.cache.iter().map(|entry| *entry.key()).collect()
    }

    /// The first cached protocol with a trigger phrase exactly equal to
    /// `utterance` under [`normalize_strict`] (SPEC_FULL §4.3).
    ///
    /// `DashMap`'s sharded iteration already spreads the scan across its
    /// internal shards without an explicit thread pool, satisfying the
    /// "implementations MAY parallelize" allowance without extra
    /// machinery.
    pub fn find_matching_protocol(&self, utterance: &str) -> Option<Protocol> {
        let normalized_input = normalize_strict(utterance);
        self.cache.iter().find_map(|entry| {
            let protocol = entry.value();
            protocol
                .trigger_phrases
                .iter()
                .any(|phrase| normalize_strict(phrase) == normalized_input)
                .then(|| protocol.clone())
        })
    }
}

/// Which field collided during [`ProtocolRegistry::conflicting_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Name,
    TriggerSet,
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    column: Option<String>,
    default_json: &str,
) -> Result<T, ProtocolError> {
    let raw = column.unwrap_or_else(|| default_json.to_string());
    Ok(serde_json::from_str(&raw)?)
}
