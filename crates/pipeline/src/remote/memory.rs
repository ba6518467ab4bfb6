//! In-process remote store used for dry runs

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value as JsonValue;

use super::{NaturalKey, RemoteError, RemoteId, RemoteStore};

/// Holds created items per collection and assigns sequential ids
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<JsonValue>>>,
}

fn field_matches(item: &JsonValue, field: &str, expected: &str) -> bool {
    match item.get(field) {
        Some(JsonValue::String(s)) => s == expected,
        Some(JsonValue::Number(n)) => n.to_string() == expected,
        _ => false,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the items stored in `collection`
    pub fn items(&self, collection: &str) -> Vec<JsonValue> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }

    /// Total number of items across all collections
    pub fn total(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<JsonValue>>> {
        // A poisoned lock only means another test thread panicked mid-insert
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RemoteStore for MemoryStore {
    async fn lookup(
        &self,
        collection: &str,
        key: &NaturalKey,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let collections = self.lock();
        let found = collections.get(collection).and_then(|items| {
            items.iter().find(|item| {
                key.fields()
                    .iter()
                    .all(|(field, value)| field_matches(item, field, value))
            })
        });
        Ok(found.and_then(|item| item.get("id")).and_then(RemoteId::from_json))
    }

    async fn create(&self, collection: &str, payload: &JsonValue) -> Result<RemoteId, RemoteError> {
        let JsonValue::Object(fields) = payload else {
            return Err(RemoteError::Status {
                status: 400,
                body: "payload must be a JSON object".into(),
            });
        };

        let mut collections = self.lock();
        let items = collections.entry(collection.to_string()).or_default();
        let id = RemoteId(format!("{}-{}", collection, items.len() + 1));

        let mut item = fields.clone();
        item.insert("id".into(), JsonValue::String(id.0.clone()));
        items.push(JsonValue::Object(item));

        Ok(id)
    }
}
