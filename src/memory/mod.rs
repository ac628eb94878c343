//! Long-term memory boundaries: discrete facts and semantic recall
//! (SPEC_FULL §4.11).
//!
//! Neither trait ships a concrete embedding model or fact store backend
//! (SPEC_FULL §1 Non-goals) — these are the seams an embedding
//! application wires a real implementation into, mirroring how
//! [`crate::logging`] defines sinks without shipping a database client.

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

// Layer 3: Internal module imports
// (none)

/// Stores discrete, named facts about a user (favorite color, home
/// city, preferred wake time, ...) keyed by a short string name rather
/// than free text, distinct from [`VectorMemoryService`]'s
/// similarity-searchable recall.
#[async_trait]
pub trait FactMemoryService: Send + Sync {
    /// Set `key` to `value` for `user_id`, overwriting any prior value.
    async fn remember(&self, user_id: &str, key: &str, value: Value);

    /// Look up a single fact.
    async fn recall(&self, user_id: &str, key: &str) -> Option<Value>;

    /// Every fact currently stored for `user_id`.
    async fn recall_all(&self, user_id: &str) -> HashMap<String, Value>;

    /// Remove a single fact; a no-op if it was never set.
    async fn forget(&self, user_id: &str, key: &str);
}

/// One semantic memory entry returned by [`VectorMemoryService::recall_similar`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    pub id: String,
    pub text: String,
    /// Cosine similarity against the query embedding, higher is closer.
    pub score: f32,
}

/// Stores free-text memories alongside a precomputed embedding and
/// retrieves the `top_k` most similar to a query embedding (SPEC_FULL
/// §4.11 "semantic recall"). Computing the embedding itself is the
/// caller's responsibility — this trait only stores and ranks vectors it
/// is handed.
#[async_trait]
pub trait VectorMemoryService: Send + Sync {
    /// Store (or overwrite, if `id` already exists) one memory entry.
    async fn upsert(&self, user_id: &str, id: &str, text: &str, embedding: Vec<f32>);

    /// The `top_k` entries for `user_id` whose embeddings are most
    /// similar to `query_embedding`, best match first.
    async fn recall_similar(&self, user_id: &str, query_embedding: &[f32], top_k: usize) -> Vec<MemoryMatch>;

    /// Remove a single memory entry; a no-op if it was never stored.
    async fn forget(&self, user_id: &str, id: &str);
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-process reference implementation of [`FactMemoryService`], used by
/// this crate's own tests and as a starting point for an embedding
/// application that has no external fact store yet.
#[derive(Default)]
pub struct InMemoryFactStore {
    facts: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactMemoryService for InMemoryFactStore {
    async fn remember(&self, user_id: &str, key: &str, value: Value) {
        self.facts.write().entry(user_id.to_string()).or_default().insert(key.to_string(), value);
    }

    async fn recall(&self, user_id: &str, key: &str) -> Option<Value> {
        self.facts.read().get(user_id).and_then(|facts| facts.get(key)).cloned()
    }

    async fn recall_all(&self, user_id: &str) -> HashMap<String, Value> {
        self.facts.read().get(user_id).cloned().unwrap_or_default()
    }

    async fn forget(&self, user_id: &str, key: &str) {
        if let Some(facts) = self.facts.write().get_mut(user_id) {
            facts.remove(key);
        }
    }
}

struct VectorEntry {
    text: String,
    embedding: Vec<f32>,
}

/// In-process reference implementation of [`VectorMemoryService`] doing
/// a brute-force cosine-similarity scan; fine for tests and small
/// per-user memory sets, not intended as the production backend for a
/// large embedding store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<String, HashMap<String, VectorEntry>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorMemoryService for InMemoryVectorStore {
    async fn upsert(&self, user_id: &str, id: &str, text: &str, embedding: Vec<f32>) {
        self.entries
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(id.to_string(), VectorEntry { text: text.to_string(), embedding });
    }

    async fn recall_similar(&self, user_id: &str, query_embedding: &[f32], top_k: usize) -> Vec<MemoryMatch> {
        let entries = self.entries.read();
        let Some(user_entries) = entries.get(user_id) else {
            return Vec::new();
        };

        let mut scored: Vec<MemoryMatch> = user_entries
            .iter()
            .map(|(id, entry)| MemoryMatch {
                id: id.clone(),
                text: entry.text.clone(),
                score: cosine_similarity(query_embedding, &entry.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    async fn forget(&self, user_id: &str, id: &str) {
        if let Some(user_entries) = self.entries.write().get_mut(user_id) {
            user_entries.remove(id);
        }
    }
}
