//! Remote content store consumed by the importer

pub mod client;
pub mod memory;

pub use client::{HttpRemoteStore, RetryPolicy};
pub use memory::MemoryStore;

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

/// Identifier assigned by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RemoteId(pub String);

impl RemoteId {
    /// Accept both string and numeric ids from a JSON payload
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) if !s.is_empty() => Some(Self(s.clone())),
            JsonValue::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field/value pairs identifying an entity independently of its remote id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    fields: Vec<(&'static str, String)>,
}

impl NaturalKey {
    /// Key field used for every entity carrying its own identifier
    pub const EXTERNAL_ID: &'static str = "external_id";

    pub fn external_id(id: &str) -> Self {
        Self {
            fields: vec![(Self::EXTERNAL_ID, id.to_string())],
        }
    }

    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn with(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((field, value.into()));
        self
    }

    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }
}

impl Default for NaturalKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

/// Failures talking to the remote store
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Connect(_) | RemoteError::Transport(_) | RemoteError::Timeout(_) => true,
            RemoteError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            RemoteError::Decode(_) => false,
        }
    }

    /// Whether the remote certainly did not act on the request
    ///
    /// Only these failures are retried for non-idempotent writes.
    pub fn is_unprocessed(&self) -> bool {
        match self {
            RemoteError::Connect(_) => true,
            RemoteError::Status { status, .. } => matches!(status, 429 | 503),
            _ => false,
        }
    }
}

/// Collection-oriented remote store: one filtered read and one create per collection
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Find an existing entity in `collection` matching every field of `key`
    async fn lookup(
        &self,
        collection: &str,
        key: &NaturalKey,
    ) -> Result<Option<RemoteId>, RemoteError>;

    /// Create an entity and return the id the store assigned
    async fn create(&self, collection: &str, payload: &JsonValue) -> Result<RemoteId, RemoteError>;
}
