//! Per-run identifier mapping used to rewrite foreign keys

use std::collections::HashMap;

use crate::records::EntityKind;

/// Maps `(entity kind, old id)` to the id that replaced it in this run.
///
/// The transformer uses it for source → minted ids; the importer uses a
/// second instance for local → remote ids. Lookups never synthesize a value:
/// an unmapped id means the dependent record must be dropped.
#[derive(Debug, Clone, Default)]
pub struct IdRemapper {
    maps: HashMap<EntityKind, HashMap<String, String>>,
}

impl IdRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `old → new` for `kind`
    ///
    /// Returns `false` and keeps the existing mapping if `old` was already mapped.
    pub fn insert(&mut self, kind: EntityKind, old: &str, new: &str) -> bool {
        let map = self.maps.entry(kind).or_default();
        if map.contains_key(old) {
            return false;
        }
        map.insert(old.to_string(), new.to_string());
        true
    }

    pub fn get(&self, kind: EntityKind, old: &str) -> Option<&str> {
        self.maps
            .get(&kind)
            .and_then(|map| map.get(old))
            .map(String::as_str)
    }

    /// Number of mappings held for `kind`
    pub fn len(&self, kind: EntityKind) -> usize {
        self.maps.get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.values().all(HashMap::is_empty)
    }
}
