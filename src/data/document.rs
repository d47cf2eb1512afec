use std::sync::Arc;

use geo::{LineString, MultiPolygon, Point};

use super::osm::{ElementRef, OsmId};
use super::tags::Tags;

/// Everything a load produces for the renderer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Document {
    pub placemarks: Vec<Placemark>,
    pub relations: Vec<RelationObject>,
}

impl Document {
    pub fn placemark(&self, source: ElementRef) -> Option<&Placemark> {
        self.placemarks.iter().find(|placemark| placemark.source == source)
    }

    pub fn relation(&self, id: OsmId) -> Option<&RelationObject> {
        self.relations.iter().find(|relation| relation.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Line(LineString<f64>),
    /// One or more outer rings, each with its holes.
    Polygon(MultiPolygon<f64>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "point",
            Geometry::Line(_) => "line",
            Geometry::Polygon(_) => "polygon",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    /// The node, way or multipolygon relation this placemark was built from.
    pub source: ElementRef,
    pub tags: Tags,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationMemberRef {
    /// Index into [`Document::placemarks`].
    pub placemark: usize,
    pub role: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationObject {
    pub id: OsmId,
    pub tags: Tags,
    pub members: Vec<RelationMemberRef>,
}
