use std::sync::Arc;

use serde::Serialize;

use crate::classify::{AreaClassifier, DefaultAreaClassifier};
use crate::data::document::Document;
use crate::data::pool::StringPool;
use crate::data::OsmMapData;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::format::InputFormat;

/// Mutable state shared by the readers during one load.
///
/// Readers only upsert entities and intern strings through it, so all three
/// formats fill the tables the same way.
#[derive(Debug, Default)]
pub struct LoadContext {
    pub data: OsmMapData,
    pub pool: StringPool,
    pub diagnostics: Diagnostics,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> Arc<str> {
        self.pool.intern(value)
    }

    pub fn intern_bytes(&mut self, value: &[u8]) -> Arc<str> {
        self.pool.intern_bytes(value)
    }
}

pub struct LoadOptions {
    /// Skips suffix and content detection when set.
    pub format: Option<InputFormat>,
    pub classifier: Box<dyn AreaClassifier + Send + Sync>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            format: None,
            classifier: Box::new(DefaultAreaClassifier),
        }
    }
}

impl LoadOptions {
    pub fn with_format(format: InputFormat) -> Self {
        LoadOptions {
            format: Some(format),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub nodes: usize,
    pub ways: usize,
    pub relations: usize,
    pub interned_strings: usize,
    pub multipolygons: usize,
    pub placemarks: usize,
    pub relation_objects: usize,
}

/// Result of a successful load. The document owns everything it references.
#[derive(Debug)]
pub struct Load {
    pub format: InputFormat,
    pub document: Document,
    pub diagnostics: Diagnostics,
    pub stats: LoadStats,
}

impl Load {
    pub fn report(&self) -> LoadReport<'_> {
        LoadReport {
            format: self.format,
            stats: &self.stats,
            diagnostics: self.diagnostics.entries(),
        }
    }
}

/// Serialisable summary of a load, without the geometry.
#[derive(Debug, Serialize)]
pub struct LoadReport<'a> {
    pub format: InputFormat,
    pub stats: &'a LoadStats,
    pub diagnostics: &'a [Diagnostic],
}
