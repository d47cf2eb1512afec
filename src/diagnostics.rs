//! Recoverable problems found during a load.
//!
//! Nothing here aborts a load; each entry is logged when recorded and handed
//! back to the caller next to the document.

use std::collections::HashSet;

use log::warn;
use serde::Serialize;

use crate::data::osm::{ElementRef, OsmId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A PBF blob could not be inflated and was skipped.
    CompressionFailure { blob: usize, message: String },
    /// A PBF blob inflated but its block could not be decoded.
    MalformedBlock { blob: usize, message: String },
    /// The PBF header requires a feature this reader does not implement.
    UnsupportedFeature { feature: String },
    DanglingReference {
        referrer: ElementRef,
        missing: ElementRef,
    },
    UnclosedRing {
        relation: OsmId,
        role: String,
        ways: Vec<OsmId>,
    },
    DegenerateRing { relation: OsmId, vertices: usize },
    OrphanInnerRing { relation: OsmId },
    /// A standalone way resolved to fewer than two points.
    DegenerateWay { way: OsmId, points: usize },
    /// A zipped XML archive held more than one entry; only the first was read.
    ExtraArchiveEntries { entries: usize },
    /// An XML `tag` element lacked its key or its value and was skipped.
    MalformedTag { element: ElementRef },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::CompressionFailure { .. } => "compression_failure",
            Diagnostic::MalformedBlock { .. } => "malformed_block",
            Diagnostic::UnsupportedFeature { .. } => "unsupported_feature",
            Diagnostic::DanglingReference { .. } => "dangling_reference",
            Diagnostic::UnclosedRing { .. } => "unclosed_ring",
            Diagnostic::DegenerateRing { .. } => "degenerate_ring",
            Diagnostic::OrphanInnerRing { .. } => "orphan_inner_ring",
            Diagnostic::DegenerateWay { .. } => "degenerate_way",
            Diagnostic::ExtraArchiveEntries { .. } => "extra_archive_entries",
            Diagnostic::MalformedTag { .. } => "malformed_tag",
        }
    }

    fn log(&self) {
        let kind = self.kind();
        match self {
            Diagnostic::CompressionFailure { blob, message } => warn!(
                kind = kind,
                blob = *blob,
                error = message.as_str();
                "Skipping blob that failed to decompress"
            ),
            Diagnostic::MalformedBlock { blob, message } => warn!(
                kind = kind,
                blob = *blob,
                error = message.as_str();
                "Skipping undecodable block"
            ),
            Diagnostic::UnsupportedFeature { feature } => warn!(
                kind = kind,
                feature = feature.as_str();
                "Input requires an unsupported feature"
            ),
            Diagnostic::DanglingReference { referrer, missing } => warn!(
                kind = kind,
                referrer = referrer.to_string().as_str(),
                missing = missing.to_string().as_str();
                "Reference to undefined element"
            ),
            Diagnostic::UnclosedRing {
                relation,
                role,
                ways,
            } => warn!(
                kind = kind,
                relation = *relation,
                role = role.as_str(),
                ways = ways.len();
                "Dropping ring that does not close"
            ),
            Diagnostic::DegenerateRing { relation, vertices } => warn!(
                kind = kind,
                relation = *relation,
                vertices = *vertices;
                "Dropping ring with too few vertices"
            ),
            Diagnostic::OrphanInnerRing { relation } => warn!(
                kind = kind,
                relation = *relation;
                "Dropping inner ring outside every outer ring"
            ),
            Diagnostic::DegenerateWay { way, points } => warn!(
                kind = kind,
                way = *way,
                points = *points;
                "Dropping way with too few resolved points"
            ),
            Diagnostic::ExtraArchiveEntries { entries } => warn!(
                kind = kind,
                entries = *entries;
                "Archive has more than one entry, reading the first"
            ),
            Diagnostic::MalformedTag { element } => warn!(
                kind = kind,
                element = element.to_string().as_str();
                "Skipping tag without key or value"
            ),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    dangling_seen: HashSet<(ElementRef, ElementRef)>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        if let Diagnostic::DanglingReference { referrer, missing } = &diagnostic {
            if !self.dangling_seen.insert((*referrer, *missing)) {
                return;
            }
        }
        diagnostic.log();
        self.entries.push(diagnostic);
    }

    pub fn dangling(&mut self, referrer: ElementRef, missing: ElementRef) {
        self.record(Diagnostic::DanglingReference { referrer, missing });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.entries.iter().filter(|d| d.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
