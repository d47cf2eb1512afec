use std::{fmt, sync::Arc};

use geo::Coord;
use serde::{Deserialize, Serialize};

use super::tags::Tags;

pub type OsmId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// Parses the XML `type` attribute of a relation member.
    pub fn from_xml_type(value: &str) -> Option<Self> {
        match value {
            "node" => Some(ElementKind::Node),
            "way" => Some(ElementKind::Way),
            "relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: OsmId,
}

impl ElementRef {
    pub fn node(id: OsmId) -> Self {
        ElementRef { kind: ElementKind::Node, id }
    }

    pub fn way(id: OsmId) -> Self {
        ElementRef { kind: ElementKind::Way, id }
    }

    pub fn relation(id: OsmId) -> Self {
        ElementRef { kind: ElementKind::Relation, id }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmNode {
    pub id: OsmId,
    pub tags: Tags,
    /// `x` is longitude, `y` latitude, both in degrees. `None` until the node
    /// has been declared with a position.
    pub coord: Option<Coord<f64>>,
}

impl OsmNode {
    pub fn new(id: OsmId) -> Self {
        OsmNode {
            id,
            tags: Tags::new(),
            coord: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmWay {
    pub id: OsmId,
    pub tags: Tags,
    pub refs: Vec<OsmId>,
}

impl OsmWay {
    pub fn new(id: OsmId) -> Self {
        OsmWay {
            id,
            tags: Tags::new(),
            refs: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.refs.len() >= 2 && self.refs.first() == self.refs.last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: OsmId,
    pub kind: ElementKind,
    pub role: Arc<str>,
}

impl Member {
    pub fn element(&self) -> ElementRef {
        ElementRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmRelation {
    pub id: OsmId,
    pub tags: Tags,
    pub members: Vec<Member>,
}

impl OsmRelation {
    pub fn new(id: OsmId) -> Self {
        OsmRelation {
            id,
            tags: Tags::new(),
            members: Vec::new(),
        }
    }
}
