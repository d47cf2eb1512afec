use std::{collections::HashSet, sync::Arc};

/// Per-load string interner for tag keys, tag values and member roles.
///
/// Created with the load and dropped with it; placemarks keep their handles.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: HashSet<Arc<str>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(value) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(value);
        self.strings.insert(Arc::clone(&interned));
        interned
    }

    /// Interns raw bytes, replacing invalid UTF-8 sequences.
    pub fn intern_bytes(&mut self, value: &[u8]) -> Arc<str> {
        match std::str::from_utf8(value) {
            Ok(value) => self.intern(value),
            Err(_) => self.intern(&String::from_utf8_lossy(value)),
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.strings.contains(value)
    }

    /// The pooled handle equal to `value`, if one was interned.
    pub fn get(&self, value: &str) -> Option<&Arc<str>> {
        self.strings.get(value)
    }
}
