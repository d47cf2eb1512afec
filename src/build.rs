//! Turns the entity tables and assembled multipolygons into a [`Document`].

use std::collections::HashMap;

use geo::algorithm::orient::{Direction, Orient};
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use log::info;

use crate::assemble::Assembly;
use crate::classify::AreaClassifier;
use crate::data::document::{Document, Geometry, Placemark, RelationMemberRef, RelationObject};
use crate::data::osm::{ElementKind, ElementRef, Member, OsmId, OsmWay};
use crate::data::OsmMapData;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// Ways closed with fewer resolved points than this are drawn as lines.
const MIN_AREA_POINTS: usize = 4;

struct DocumentBuilder<'a> {
    data: &'a OsmMapData,
    assembly: &'a Assembly,
    classifier: &'a dyn AreaClassifier,
    diagnostics: &'a mut Diagnostics,
    document: Document,
    placemark_index: HashMap<ElementRef, usize>,
}

pub fn build_document(
    data: &OsmMapData,
    assembly: &Assembly,
    classifier: &dyn AreaClassifier,
    diagnostics: &mut Diagnostics,
) -> Document {
    let mut builder = DocumentBuilder {
        data,
        assembly,
        classifier,
        diagnostics,
        document: Document::default(),
        placemark_index: HashMap::new(),
    };
    builder.process_nodes();
    builder.process_ways();
    builder.process_multipolygons();
    builder.process_relations();

    info!(
        placemarks = builder.document.placemarks.len(),
        relations = builder.document.relations.len();
        "Built document"
    );
    builder.document
}

fn sorted_ids<V>(table: &HashMap<OsmId, V>) -> Vec<OsmId> {
    let mut ids: Vec<OsmId> = table.keys().copied().collect();
    ids.sort_unstable();
    ids
}

impl DocumentBuilder<'_> {
    fn push(&mut self, placemark: Placemark) {
        self.placemark_index
            .insert(placemark.source, self.document.placemarks.len());
        self.document.placemarks.push(placemark);
    }

    fn process_nodes(&mut self) {
        let data = self.data;
        for id in sorted_ids(&data.nodes) {
            let node = &data.nodes[&id];
            let Some(coord) = node.coord else {
                continue;
            };
            if node.tags.is_empty() {
                continue;
            }
            self.push(Placemark {
                source: ElementRef::node(id),
                tags: node.tags.clone(),
                geometry: Geometry::Point(Point::from(coord)),
            });
        }
    }

    fn process_ways(&mut self) {
        let data = self.data;
        for id in sorted_ids(&data.ways) {
            if self.assembly.used_ways.contains(&id) {
                continue;
            }
            let way = &data.ways[&id];
            let coords = self.resolve(way);
            let geometry = if way.is_closed()
                && coords.len() >= MIN_AREA_POINTS
                && self.classifier.is_area(&way.tags)
            {
                let polygon = Polygon::new(LineString::new(coords), vec![]);
                Geometry::Polygon(MultiPolygon::new(vec![polygon]).orient(Direction::Default))
            } else if coords.len() >= 2 {
                Geometry::Line(LineString::new(coords))
            } else {
                self.diagnostics.record(Diagnostic::DegenerateWay {
                    way: id,
                    points: coords.len(),
                });
                continue;
            };
            self.push(Placemark {
                source: ElementRef::way(id),
                tags: way.tags.clone(),
                geometry,
            });
        }
    }

    /// Coordinates of the way's nodes; undefined nodes are reported and skipped.
    fn resolve(&mut self, way: &OsmWay) -> Vec<Coord<f64>> {
        let mut coords = Vec::with_capacity(way.refs.len());
        for reference in &way.refs {
            match self.data.nodes.get(reference).and_then(|node| node.coord) {
                Some(coord) => coords.push(coord),
                None => self
                    .diagnostics
                    .dangling(ElementRef::way(way.id), ElementRef::node(*reference)),
            }
        }
        coords
    }

    fn process_multipolygons(&mut self) {
        let assembly = self.assembly;
        for multipolygon in &assembly.multipolygons {
            let tags = self
                .data
                .relations
                .get(&multipolygon.relation)
                .map(|relation| relation.tags.clone())
                .unwrap_or_default();
            self.push(Placemark {
                source: ElementRef::relation(multipolygon.relation),
                tags,
                geometry: Geometry::Polygon(multipolygon.geometry.clone()),
            });
        }
    }

    fn process_relations(&mut self) {
        let data = self.data;
        for id in sorted_ids(&data.relations) {
            if self.assembly.consumed(id) {
                continue;
            }
            let relation = &data.relations[&id];
            let mut members = Vec::new();
            for member in &relation.members {
                if !self.is_defined(member) {
                    self.diagnostics
                        .dangling(ElementRef::relation(id), member.element());
                    continue;
                }
                if let Some(placemark) = self.placemark_index.get(&member.element()) {
                    members.push(RelationMemberRef {
                        placemark: *placemark,
                        role: member.role.clone(),
                    });
                }
            }
            self.document.relations.push(RelationObject {
                id,
                tags: relation.tags.clone(),
                members,
            });
        }
    }

    fn is_defined(&self, member: &Member) -> bool {
        match member.kind {
            ElementKind::Node => self
                .data
                .nodes
                .get(&member.id)
                .is_some_and(|node| node.coord.is_some()),
            ElementKind::Way => self.data.ways.contains_key(&member.id),
            ElementKind::Relation => self.data.relations.contains_key(&member.id),
        }
    }
}
