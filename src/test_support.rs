//! Fixture writers for the three input formats.
//!
//! A [`Fixture`] is a small format-neutral data set that can be rendered as
//! OSM XML, O5M or PBF, so the readers can be checked against each other.

use std::collections::VecDeque;

use crate::codec::{write_signed_varint, write_unsigned_varint, DeltaEncoder, DeltaField};
use crate::data::osm::{ElementKind, OsmId};

pub type FixtureTags = Vec<(&'static str, &'static str)>;

#[derive(Debug, Clone)]
pub struct FixtureNode {
    pub id: OsmId,
    pub lat: f64,
    pub lon: f64,
    pub tags: FixtureTags,
}

#[derive(Debug, Clone)]
pub struct FixtureWay {
    pub id: OsmId,
    pub refs: Vec<OsmId>,
    pub tags: FixtureTags,
}

#[derive(Debug, Clone)]
pub struct FixtureRelation {
    pub id: OsmId,
    pub members: Vec<(ElementKind, OsmId, &'static str)>,
    pub tags: FixtureTags,
}

#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub nodes: Vec<FixtureNode>,
    pub ways: Vec<FixtureWay>,
    pub relations: Vec<FixtureRelation>,
}

impl Fixture {
    pub fn node(mut self, id: OsmId, lat: f64, lon: f64, tags: FixtureTags) -> Self {
        self.nodes.push(FixtureNode { id, lat, lon, tags });
        self
    }

    pub fn way(mut self, id: OsmId, refs: &[OsmId], tags: FixtureTags) -> Self {
        self.ways.push(FixtureWay {
            id,
            refs: refs.to_vec(),
            tags,
        });
        self
    }

    pub fn relation(
        mut self,
        id: OsmId,
        members: &[(ElementKind, OsmId, &'static str)],
        tags: FixtureTags,
    ) -> Self {
        self.relations.push(FixtureRelation {
            id,
            members: members.to_vec(),
            tags,
        });
        self
    }

    /// A unit square outer ring split over two open ways, with a smaller
    /// square hole, a tagged point and a route relation.
    pub fn sample() -> Self {
        Fixture::default()
            .node(1, 0.0, 0.0, vec![])
            .node(2, 0.0, 1.0, vec![])
            .node(3, 1.0, 1.0, vec![])
            .node(4, 1.0, 0.0, vec![])
            .node(5, 0.25, 0.25, vec![])
            .node(6, 0.25, 0.75, vec![])
            .node(7, 0.75, 0.75, vec![])
            .node(8, 0.75, 0.25, vec![])
            .node(9, 51.5007292, -0.1246254, vec![("tourism", "attraction"), ("name", "Big Ben")])
            .way(10, &[1, 2, 3], vec![])
            .way(11, &[3, 4, 1], vec![])
            .way(12, &[5, 6, 7, 8, 5], vec![])
            .way(13, &[1, 9], vec![("highway", "footway")])
            .relation(
                20,
                &[
                    (ElementKind::Way, 10, "outer"),
                    (ElementKind::Way, 11, "outer"),
                    (ElementKind::Way, 12, "inner"),
                ],
                vec![("type", "multipolygon"), ("landuse", "forest")],
            )
            .relation(
                21,
                &[(ElementKind::Way, 13, "forward"), (ElementKind::Node, 9, "stop")],
                vec![("type", "route"), ("route", "foot")],
            )
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<osm version=\"0.6\" generator=\"fixture\">\n");
        out.push_str(" <bounds minlat=\"0\" minlon=\"0\" maxlat=\"60\" maxlon=\"1\"/>\n");
        for node in &self.nodes {
            let open = format!(
                " <node id=\"{}\" lat=\"{:.7}\" lon=\"{:.7}\" version=\"1\"",
                node.id, node.lat, node.lon
            );
            if node.tags.is_empty() {
                out.push_str(&open);
                out.push_str("/>\n");
            } else {
                out.push_str(&open);
                out.push_str(">\n");
                push_xml_tags(&mut out, &node.tags);
                out.push_str(" </node>\n");
            }
        }
        for way in &self.ways {
            out.push_str(&format!(" <way id=\"{}\">\n", way.id));
            for reference in &way.refs {
                out.push_str(&format!("  <nd ref=\"{reference}\"/>\n"));
            }
            push_xml_tags(&mut out, &way.tags);
            out.push_str(" </way>\n");
        }
        for relation in &self.relations {
            out.push_str(&format!(" <relation id=\"{}\">\n", relation.id));
            for (kind, id, role) in &relation.members {
                out.push_str(&format!(
                    "  <member type=\"{kind}\" ref=\"{id}\" role=\"{}\"/>\n",
                    escape(role)
                ));
            }
            push_xml_tags(&mut out, &relation.tags);
            out.push_str(" </relation>\n");
        }
        out.push_str("</osm>\n");
        out
    }

    pub fn to_o5m(&self) -> Vec<u8> {
        let mut writer = o5m::O5mWriter::new();
        for node in &self.nodes {
            writer.node(node.id, Some((node.lat, node.lon)), &node.tags);
        }
        for way in &self.ways {
            writer.way(way.id, &way.refs, &way.tags);
        }
        for relation in &self.relations {
            writer.relation(relation.id, &relation.members, &relation.tags);
        }
        writer.finish()
    }

    pub fn to_pbf(&self) -> Vec<u8> {
        let mut out = pbf::header_frame(&["OsmSchema-V0.6", "DenseNodes"]);
        out.extend(pbf::data_frame(&pbf::primitive_block(self)));
        out
    }
}

fn push_xml_tags(out: &mut String, tags: &FixtureTags) {
    for (key, value) in tags {
        out.push_str(&format!(
            "  <tag k=\"{}\" v=\"{}\"/>\n",
            escape(key),
            escape(value)
        ));
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn fixed_point(degrees: f64) -> i64 {
    (degrees * 1e7).round() as i64
}

pub mod o5m {
    use super::*;

    /// Writes O5M datasets, reusing string pairs through back references the
    /// same way a real encoder does.
    pub struct O5mWriter {
        out: Vec<u8>,
        deltas: DeltaEncoder,
        strings: VecDeque<Vec<u8>>,
    }

    impl O5mWriter {
        pub fn new() -> Self {
            let mut out = vec![0xff, 0xe0, 0x04];
            out.extend_from_slice(b"o5m2");
            O5mWriter {
                out,
                deltas: DeltaEncoder::new(),
                strings: VecDeque::new(),
            }
        }

        pub fn node(&mut self, id: OsmId, position: Option<(f64, f64)>, tags: &FixtureTags) {
            let mut body = Vec::new();
            write_signed_varint(&mut body, self.deltas.encode(DeltaField::NodeId, id));
            body.push(0x00);
            if let Some((lat, lon)) = position {
                let lon = self.deltas.encode(DeltaField::Longitude, fixed_point(lon));
                let lat = self.deltas.encode(DeltaField::Latitude, fixed_point(lat));
                write_signed_varint(&mut body, lon);
                write_signed_varint(&mut body, lat);
                self.tags(&mut body, tags);
            }
            self.dataset(0x10, &body);
        }

        pub fn way(&mut self, id: OsmId, refs: &[OsmId], tags: &FixtureTags) {
            let mut body = Vec::new();
            write_signed_varint(&mut body, self.deltas.encode(DeltaField::WayId, id));
            body.push(0x00);
            let mut section = Vec::new();
            for reference in refs {
                let delta = self.deltas.encode(DeltaField::NodeRef, *reference);
                write_signed_varint(&mut section, delta);
            }
            write_unsigned_varint(&mut body, section.len() as u64);
            body.extend(section);
            self.tags(&mut body, tags);
            self.dataset(0x11, &body);
        }

        pub fn relation(
            &mut self,
            id: OsmId,
            members: &[(ElementKind, OsmId, &'static str)],
            tags: &FixtureTags,
        ) {
            let mut body = Vec::new();
            write_signed_varint(&mut body, self.deltas.encode(DeltaField::RelationId, id));
            body.push(0x00);
            let mut section = Vec::new();
            for (kind, member, role) in members {
                let (field, type_char) = match kind {
                    ElementKind::Node => (DeltaField::MemberNode, b'0'),
                    ElementKind::Way => (DeltaField::MemberWay, b'1'),
                    ElementKind::Relation => (DeltaField::MemberRelation, b'2'),
                };
                write_signed_varint(&mut section, self.deltas.encode(field, *member));
                let mut descriptor = vec![type_char];
                descriptor.extend_from_slice(role.as_bytes());
                descriptor.push(0);
                self.string(&mut section, descriptor);
            }
            write_unsigned_varint(&mut body, section.len() as u64);
            body.extend(section);
            self.tags(&mut body, tags);
            self.dataset(0x12, &body);
        }

        pub fn reset(&mut self) {
            self.out.push(0xff);
            self.deltas.reset();
            self.strings.clear();
        }

        /// Appends raw bytes, for corrupting streams on purpose.
        pub fn raw(&mut self, bytes: &[u8]) {
            self.out.extend_from_slice(bytes);
        }

        pub fn finish(mut self) -> Vec<u8> {
            self.out.push(0xfe);
            self.out
        }

        fn tags(&mut self, body: &mut Vec<u8>, tags: &FixtureTags) {
            for (key, value) in tags {
                let mut pair = key.as_bytes().to_vec();
                pair.push(0);
                pair.extend_from_slice(value.as_bytes());
                pair.push(0);
                self.string(body, pair);
            }
        }

        /// Writes a back reference when the encoded string is still in the
        /// table, the inline form otherwise.
        fn string(&mut self, body: &mut Vec<u8>, encoded: Vec<u8>) {
            if let Some(index) = self.strings.iter().position(|entry| *entry == encoded) {
                write_unsigned_varint(body, index as u64 + 1);
                return;
            }
            body.push(0x00);
            body.extend_from_slice(&encoded);
            // Terminators do not count towards the stored length.
            let zeros = encoded.iter().filter(|byte| **byte == 0).count();
            if encoded.len() - zeros <= crate::o5m::MAX_STORED_PAIR_LEN {
                self.strings.push_front(encoded);
                self.strings.truncate(crate::o5m::STRING_TABLE_CAPACITY);
            }
        }

        fn dataset(&mut self, marker: u8, body: &[u8]) {
            self.out.push(marker);
            write_unsigned_varint(&mut self.out, body.len() as u64);
            self.out.extend_from_slice(body);
        }
    }
}

pub mod pbf {
    use std::io::Write;

    use flate2::{write::ZlibEncoder, Compression};
    use prost::Message;

    use super::*;
    use crate::pbf::proto::{
        Blob, BlobHeader, DenseNodes, HeaderBBox, HeaderBlock, PrimitiveBlock, PrimitiveGroup,
        Relation, StringTable, Way,
    };
    use crate::pbf::{OSM_DATA, OSM_HEADER};

    pub fn frame(kind: &str, blob: &[u8]) -> Vec<u8> {
        let header = BlobHeader {
            kind: Some(kind.to_owned()),
            datasize: Some(blob.len() as i32),
        }
        .encode_to_vec();

        let mut out = (header.len() as u32).to_be_bytes().to_vec();
        out.extend(header);
        out.extend_from_slice(blob);
        out
    }

    pub fn raw_blob(block: &[u8]) -> Vec<u8> {
        Blob {
            raw: Some(block.to_vec()),
            ..Blob::default()
        }
        .encode_to_vec()
    }

    pub fn zlib_blob(block: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(block).unwrap();
        Blob {
            raw_size: Some(block.len() as i32),
            zlib_data: Some(encoder.finish().unwrap()),
            ..Blob::default()
        }
        .encode_to_vec()
    }

    pub fn header_frame(required_features: &[&str]) -> Vec<u8> {
        let block = HeaderBlock {
            bbox: Some(HeaderBBox {
                left: -1_000_000_000,
                right: 1_000_000_000,
                top: 60_000_000_000,
                bottom: 0,
            }),
            required_features: required_features.iter().map(|f| f.to_string()).collect(),
            writing_program: Some("fixture".to_owned()),
        };
        frame(OSM_HEADER, &zlib_blob(&block.encode_to_vec()))
    }

    pub fn data_frame(block: &PrimitiveBlock) -> Vec<u8> {
        frame(OSM_DATA, &zlib_blob(&block.encode_to_vec()))
    }

    /// Block-local string table; index 0 is the conventional empty string.
    #[derive(Default)]
    pub struct StringTableBuilder {
        strings: Vec<&'static str>,
    }

    impl StringTableBuilder {
        pub fn index(&mut self, value: &'static str) -> u32 {
            if self.strings.is_empty() {
                self.strings.push("");
            }
            match self.strings.iter().position(|s| *s == value) {
                Some(index) => index as u32,
                None => {
                    self.strings.push(value);
                    self.strings.len() as u32 - 1
                }
            }
        }

        pub fn build(self) -> StringTable {
            StringTable {
                s: self.strings.iter().map(|s| s.as_bytes().to_vec()).collect(),
            }
        }
    }

    /// Dense nodes in one group, ways in a second, relations in a third.
    pub fn primitive_block(fixture: &Fixture) -> PrimitiveBlock {
        let mut strings = StringTableBuilder::default();

        let mut dense = DenseNodes::default();
        let mut deltas = DeltaEncoder::new();
        for node in &fixture.nodes {
            dense.id.push(deltas.encode(DeltaField::NodeId, node.id));
            dense.lat.push(deltas.encode(DeltaField::Latitude, fixed_point(node.lat)));
            dense.lon.push(deltas.encode(DeltaField::Longitude, fixed_point(node.lon)));
            for &(key, value) in &node.tags {
                dense.keys_vals.push(strings.index(key) as i32);
                dense.keys_vals.push(strings.index(value) as i32);
            }
            dense.keys_vals.push(0);
        }

        let mut ways = Vec::new();
        for way in &fixture.ways {
            let (keys, vals) = way
                .tags
                .iter()
                .map(|&(key, value)| (strings.index(key), strings.index(value)))
                .unzip();
            let mut refs = DeltaEncoder::new();
            ways.push(Way {
                id: way.id,
                keys,
                vals,
                refs: way
                    .refs
                    .iter()
                    .map(|r| refs.encode(DeltaField::NodeRef, *r))
                    .collect(),
            });
        }

        let mut relations = Vec::new();
        for relation in &fixture.relations {
            let (keys, vals) = relation
                .tags
                .iter()
                .map(|&(key, value)| (strings.index(key), strings.index(value)))
                .unzip();
            let mut previous = 0;
            relations.push(Relation {
                id: relation.id,
                keys,
                vals,
                roles_sid: relation
                    .members
                    .iter()
                    .map(|&(_, _, role)| strings.index(role) as i32)
                    .collect(),
                memids: relation
                    .members
                    .iter()
                    .map(|(_, id, _)| {
                        let delta = id - previous;
                        previous = *id;
                        delta
                    })
                    .collect(),
                types: relation
                    .members
                    .iter()
                    .map(|(kind, _, _)| match kind {
                        ElementKind::Node => 0,
                        ElementKind::Way => 1,
                        ElementKind::Relation => 2,
                    })
                    .collect(),
            });
        }

        PrimitiveBlock {
            string_table: Some(strings.build()),
            groups: vec![
                PrimitiveGroup {
                    dense: Some(dense),
                    ..PrimitiveGroup::default()
                },
                PrimitiveGroup {
                    ways,
                    ..PrimitiveGroup::default()
                },
                PrimitiveGroup {
                    relations,
                    ..PrimitiveGroup::default()
                },
            ],
            granularity: None,
            lat_offset: None,
            lon_offset: None,
        }
    }
}
