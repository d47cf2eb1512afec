use std::sync::Arc;

/// Insertion-ordered tag map holding interned keys and values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    entries: Vec<(Arc<str>, Arc<str>)>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value in place if the key is already present.
    pub fn insert(&mut self, key: Arc<str>, value: Arc<str>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, v)| &**v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// True when `key` holds `value`, also matching one entry of a `;` list.
    pub fn has_kv_pair(&self, key: &str, value: &str) -> bool {
        self.get(key)
            .map(|tag_value| tag_value.split(';').any(|part| part.trim() == value))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (&**k, &**v))
    }

    /// Iterates the shared handles, for callers that compare identity.
    pub fn handles(&self) -> impl Iterator<Item = &(Arc<str>, Arc<str>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
