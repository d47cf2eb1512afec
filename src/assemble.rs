//! Builds polygons from multipolygon and boundary relations.
//!
//! Member ways arrive unordered and in either direction. They are chained
//! into rings by matching endpoint node ids, then inner rings are attached to
//! the outer ring that holds them.

use std::collections::HashSet;

use geo::algorithm::orient::{Direction, Orient};
use geo::{Area, Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use log::debug;

use crate::data::osm::{ElementKind, ElementRef, OsmId, OsmRelation};
use crate::data::OsmMapData;
use crate::diagnostics::{Diagnostic, Diagnostics};

pub const OUTER: &str = "outer";
pub const INNER: &str = "inner";

pub fn is_multipolygon(relation: &OsmRelation) -> bool {
    relation.tags.has_kv_pair("type", "multipolygon")
        || relation.tags.has_kv_pair("type", "boundary")
}

/// A chain of ways, as node ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    pub ways: Vec<OsmId>,
    pub nodes: Vec<OsmId>,
}

impl Ring {
    fn seed(way: OsmId, refs: &[OsmId]) -> Self {
        Ring {
            ways: vec![way],
            nodes: refs.to_vec(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.nodes.len() >= 2 && self.nodes.first() == self.nodes.last()
    }

    fn can_join(&self, refs: &[OsmId]) -> bool {
        match (self.nodes.first(), self.nodes.last(), refs.first(), refs.last()) {
            (Some(start), Some(end), Some(first), Some(last)) => {
                first == end || last == end || last == start || first == start
            }
            _ => false,
        }
    }

    /// Appends or prepends `refs`, reversed if needed, at the matching end.
    fn join(&mut self, way: OsmId, refs: &[OsmId]) {
        let (Some(&start), Some(&end)) = (self.nodes.first(), self.nodes.last()) else {
            return;
        };
        let (Some(&first), Some(&last)) = (refs.first(), refs.last()) else {
            return;
        };
        if first == end {
            self.nodes.extend_from_slice(&refs[1..]);
        } else if last == end {
            self.nodes.extend(refs.iter().rev().skip(1));
        } else if last == start {
            let mut nodes = refs[..refs.len() - 1].to_vec();
            nodes.append(&mut self.nodes);
            self.nodes = nodes;
        } else if first == start {
            let mut nodes: Vec<OsmId> = refs[1..].iter().rev().copied().collect();
            nodes.append(&mut self.nodes);
            self.nodes = nodes;
        } else {
            return;
        }
        self.ways.push(way);
    }
}

/// Rings built from one role's ways: the closed ones and the leftovers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RingSet {
    pub closed: Vec<Ring>,
    pub open: Vec<Ring>,
}

/// Chains ways into rings. Ways are taken in the given order, so the result
/// only depends on the member order.
pub fn build_rings<'w>(ways: impl IntoIterator<Item = (OsmId, &'w [OsmId])>) -> RingSet {
    let mut unused: Vec<(OsmId, &[OsmId])> = ways.into_iter().collect();
    let mut rings = RingSet::default();

    while !unused.is_empty() {
        let (seed, refs) = unused.remove(0);
        let mut ring = Ring::seed(seed, refs);
        while !ring.is_closed() {
            let Some(index) = unused.iter().position(|(_, refs)| ring.can_join(refs)) else {
                break;
            };
            let (way, refs) = unused.remove(index);
            ring.join(way, refs);
        }
        if ring.is_closed() {
            rings.closed.push(ring);
        } else {
            rings.open.push(ring);
        }
    }
    rings
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledMultipolygon {
    pub relation: OsmId,
    pub geometry: MultiPolygon<f64>,
}

/// Output of assembly over a whole load.
#[derive(Debug, Default, Clone)]
pub struct Assembly {
    /// Sorted by relation id.
    pub multipolygons: Vec<AssembledMultipolygon>,
    pub used_ways: HashSet<OsmId>,
}

impl Assembly {
    /// True when the relation was turned into a polygon.
    pub fn consumed(&self, relation: OsmId) -> bool {
        self.multipolygons
            .binary_search_by_key(&relation, |multipolygon| multipolygon.relation)
            .is_ok()
    }
}

pub fn assemble(data: &OsmMapData, diagnostics: &mut Diagnostics) -> Assembly {
    let mut ids: Vec<OsmId> = data
        .relations
        .values()
        .filter(|relation| is_multipolygon(relation))
        .map(|relation| relation.id)
        .collect();
    ids.sort_unstable();

    let mut assembly = Assembly::default();
    for id in ids {
        let relation = &data.relations[&id];
        let mut assembler = RelationAssembler {
            relation,
            data,
            diagnostics: &mut *diagnostics,
        };
        let Some(geometry) = assembler.assemble() else {
            debug!(
                relation = id;
                "Multipolygon has no closed outer ring, keeping it as a relation"
            );
            continue;
        };
        assembly.used_ways.extend(assembler.member_ways());
        assembly.multipolygons.push(AssembledMultipolygon {
            relation: id,
            geometry,
        });
    }
    assembly
}

struct RelationAssembler<'a> {
    relation: &'a OsmRelation,
    data: &'a OsmMapData,
    diagnostics: &'a mut Diagnostics,
}

impl RelationAssembler<'_> {
    /// Outer and inner member ways that exist in the tables.
    fn role_ways(&self, role: &str) -> Vec<(OsmId, &[OsmId])> {
        self.relation
            .members
            .iter()
            .filter(|member| member.kind == ElementKind::Way && &*member.role == role)
            .filter_map(|member| self.data.ways.get(&member.id))
            .map(|way| (way.id, way.refs.as_slice()))
            .collect()
    }

    fn member_ways(&self) -> Vec<OsmId> {
        let mut ways: Vec<OsmId> = self.role_ways(OUTER).into_iter().map(|(id, _)| id).collect();
        ways.extend(self.role_ways(INNER).into_iter().map(|(id, _)| id));
        ways
    }

    fn report_missing_ways(&mut self) {
        for member in &self.relation.members {
            let is_ring_member = &*member.role == OUTER || &*member.role == INNER;
            let missing = !self.data.ways.contains_key(&member.id);
            if member.kind == ElementKind::Way && is_ring_member && missing {
                self.diagnostics
                    .dangling(ElementRef::relation(self.relation.id), member.element());
            }
        }
    }

    fn assemble(&mut self) -> Option<MultiPolygon<f64>> {
        self.report_missing_ways();
        let outers = self.resolved_rings(OUTER);
        if outers.is_empty() {
            return None;
        }
        let inners = self.resolved_rings(INNER);

        let areas: Vec<f64> = outers
            .iter()
            .map(|outer| Polygon::new(outer.clone(), vec![]).unsigned_area())
            .collect();
        let shells: Vec<Polygon<f64>> = outers
            .iter()
            .map(|outer| Polygon::new(outer.clone(), vec![]))
            .collect();
        let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outers.len()];

        for inner in inners {
            let host = shells
                .iter()
                .enumerate()
                .filter(|(_, shell)| {
                    inner
                        .coords()
                        .all(|coord| shell.intersects(&Point::from(*coord)))
                })
                .min_by(|(a, _), (b, _)| areas[*a].total_cmp(&areas[*b]))
                .map(|(index, _)| index);
            match host {
                Some(index) => holes[index].push(inner),
                None => self.diagnostics.record(Diagnostic::OrphanInnerRing {
                    relation: self.relation.id,
                }),
            }
        }

        let polygons: Vec<Polygon<f64>> = outers
            .into_iter()
            .zip(holes)
            .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
            .collect();
        Some(MultiPolygon::new(polygons).orient(Direction::Default))
    }

    /// Closed rings of one role with coordinates attached. Rings that do not
    /// close or end up with fewer than four vertices are reported and dropped.
    fn resolved_rings(&mut self, role: &str) -> Vec<LineString<f64>> {
        let rings = build_rings(self.role_ways(role));
        for open in rings.open {
            self.diagnostics.record(Diagnostic::UnclosedRing {
                relation: self.relation.id,
                role: role.to_owned(),
                ways: open.ways,
            });
        }

        let mut resolved = Vec::new();
        for ring in rings.closed {
            let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.nodes.len());
            for node in &ring.nodes {
                match self.data.nodes.get(node).and_then(|node| node.coord) {
                    Some(coord) => coords.push(coord),
                    None => self
                        .diagnostics
                        .dangling(ElementRef::relation(self.relation.id), ElementRef::node(*node)),
                }
            }
            if let (Some(first), Some(last)) = (coords.first().copied(), coords.last()) {
                if first != *last {
                    coords.push(first);
                }
            }
            if coords.len() < 4 {
                self.diagnostics.record(Diagnostic::DegenerateRing {
                    relation: self.relation.id,
                    vertices: coords.len(),
                });
                continue;
            }
            resolved.push(LineString::new(coords));
        }
        resolved
    }
}
