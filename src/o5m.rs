//! Pull reader for the O5M binary format.
//!
//! Datasets are pulled one at a time with [`O5mReader::next_dataset`]; the
//! tags, way node references and relation members of the current dataset are
//! then pulled with the matching `next_*` call. Ids, coordinates and references
//! are delta coded over the whole stream and only start from zero again after
//! a reset marker.

use std::collections::VecDeque;

use geo::{coord, Coord, Rect};
use log::{debug, info};

use crate::codec::{
    read_signed_varint, read_unsigned_varint, ByteCursor, DeltaDecoder, DeltaField,
};
use crate::data::osm::{ElementKind, Member, OsmId};
use crate::errors::{Error, Result};
use crate::load::LoadContext;

pub const STRING_TABLE_CAPACITY: usize = 15_000;
/// Inline pairs longer than this (keys plus values, in bytes) are not stored.
pub const MAX_STORED_PAIR_LEN: usize = 250;

const COORD_SCALE: f64 = 1e7;

mod marker {
    pub const NODE: u8 = 0x10;
    pub const WAY: u8 = 0x11;
    pub const RELATION: u8 = 0x12;
    pub const BOUNDING_BOX: u8 = 0xdb;
    pub const TIMESTAMP: u8 = 0xdc;
    pub const HEADER: u8 = 0xe0;
    pub const SYNC: u8 = 0xee;
    pub const JUMP: u8 = 0xef;
    pub const END: u8 = 0xfe;
    pub const RESET: u8 = 0xff;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Node { id: OsmId, coord: Option<Coord<f64>> },
    Way { id: OsmId },
    Relation { id: OsmId },
    BoundingBox(Rect<f64>),
    Timestamp(i64),
    Header { change_file: bool },
    Sync,
    Jump,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Between,
    NodeTags,
    WayRefs { end: usize },
    WayTags,
    RelationMembers { end: usize },
    RelationTags,
    Opaque,
    Finished,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::Between => "no dataset",
            Section::NodeTags => "node tags",
            Section::WayRefs { .. } => "way node references",
            Section::WayTags => "way tags",
            Section::RelationMembers { .. } => "relation members",
            Section::RelationTags => "relation tags",
            Section::Opaque => "a dataset without entity data",
            Section::Finished => "end of stream",
        }
    }
}

/// Back-reference window for string pairs, most recent first.
#[derive(Debug, Default)]
pub struct StringTable {
    entries: VecDeque<(Box<[u8]>, Box<[u8]>)>,
}

impl StringTable {
    pub fn push(&mut self, first: &[u8], second: &[u8]) {
        if first.len() + second.len() > MAX_STORED_PAIR_LEN {
            return;
        }
        self.entries.push_front((first.into(), second.into()));
        if self.entries.len() > STRING_TABLE_CAPACITY {
            self.entries.pop_back();
        }
    }

    /// `reference` counts from 1 for the most recent pair.
    pub fn get(&self, reference: u64) -> Result<(&[u8], &[u8])> {
        usize::try_from(reference)
            .ok()
            .and_then(|reference| reference.checked_sub(1))
            .and_then(|index| self.entries.get(index))
            .map(|(first, second)| (&**first, &**second))
            .ok_or_else(|| {
                Error::framing(format!("string reference {reference} is not in the table"))
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

enum PairRef<'a> {
    Inline(&'a [u8], &'a [u8]),
    Back(u64),
}

fn read_pair_ref<'a>(body: &mut ByteCursor<'a>) -> Result<PairRef<'a>> {
    match read_unsigned_varint(body)? {
        0 => {
            let first = body.read_cstr()?;
            let second = body.read_cstr()?;
            Ok(PairRef::Inline(first, second))
        }
        reference => Ok(PairRef::Back(reference)),
    }
}

/// A relation member as stored in the stream; the role borrows the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMember<'r> {
    pub id: OsmId,
    pub kind: ElementKind,
    pub role: &'r [u8],
}

pub struct O5mReader<'a> {
    cursor: ByteCursor<'a>,
    body: ByteCursor<'a>,
    section: Section,
    strings: StringTable,
    deltas: DeltaDecoder,
}

impl<'a> O5mReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        match data.first() {
            Some(&marker::RESET) => Ok(O5mReader {
                cursor: ByteCursor::new(data),
                body: ByteCursor::new(&[]),
                section: Section::Between,
                strings: StringTable::default(),
                deltas: DeltaDecoder::new(),
            }),
            Some(byte) => Err(Error::framing(format!(
                "o5m data must start with a reset marker, found 0x{byte:02x}"
            ))),
            None => Err(Error::framing("o5m input is empty")),
        }
    }

    /// Advances to the next dataset. Returns `None` at the end marker or at
    /// the end of the buffer.
    pub fn next_dataset(&mut self) -> Result<Option<Dataset>> {
        loop {
            if self.section == Section::Finished {
                return Ok(None);
            }
            let Some(byte) = self.cursor.peek_u8() else {
                self.section = Section::Finished;
                return Ok(None);
            };
            self.cursor.read_u8()?;
            match byte {
                marker::RESET => {
                    self.deltas.reset();
                    self.strings.clear();
                    continue;
                }
                marker::END => {
                    self.section = Section::Finished;
                    return Ok(None);
                }
                0xf0..=0xfd => {
                    return Err(Error::framing(format!(
                        "unknown o5m marker 0x{byte:02x} at byte {}",
                        self.cursor.position() - 1
                    )))
                }
                _ => {}
            }

            let length = read_unsigned_varint(&mut self.cursor)?;
            let length = usize::try_from(length).map_err(|_| {
                Error::framing(format!("dataset length {length} is not addressable"))
            })?;
            if length > self.cursor.remaining() {
                return Err(Error::truncated("o5m dataset", self.cursor.position()));
            }
            self.body = self.cursor.sub_cursor(length)?;

            let dataset = match byte {
                marker::NODE => self.start_node()?,
                marker::WAY => self.start_way()?,
                marker::RELATION => self.start_relation()?,
                marker::BOUNDING_BOX => {
                    self.section = Section::Opaque;
                    let x1 = read_signed_varint(&mut self.body)? as f64 / COORD_SCALE;
                    let y1 = read_signed_varint(&mut self.body)? as f64 / COORD_SCALE;
                    let x2 = read_signed_varint(&mut self.body)? as f64 / COORD_SCALE;
                    let y2 = read_signed_varint(&mut self.body)? as f64 / COORD_SCALE;
                    Dataset::BoundingBox(Rect::new(
                        coord! { x: x1, y: y1 },
                        coord! { x: x2, y: y2 },
                    ))
                }
                marker::TIMESTAMP => {
                    self.section = Section::Opaque;
                    Dataset::Timestamp(read_signed_varint(&mut self.body)?)
                }
                marker::HEADER => {
                    self.section = Section::Opaque;
                    let magic = self.body.read_bytes(self.body.remaining())?;
                    match magic {
                        b"o5m2" => Dataset::Header { change_file: false },
                        b"o5c2" => Dataset::Header { change_file: true },
                        _ => {
                            return Err(Error::framing(format!(
                                "unexpected o5m header {:?}",
                                String::from_utf8_lossy(magic)
                            )))
                        }
                    }
                }
                marker::SYNC => {
                    self.section = Section::Opaque;
                    Dataset::Sync
                }
                marker::JUMP => {
                    self.section = Section::Opaque;
                    Dataset::Jump
                }
                other => {
                    debug!(marker = other; "Skipping unknown o5m dataset");
                    self.section = Section::Between;
                    continue;
                }
            };
            return Ok(Some(dataset));
        }
    }

    fn start_node(&mut self) -> Result<Dataset> {
        let id = self.read_id(DeltaField::NodeId)?;
        if self.body.is_empty() {
            self.section = Section::NodeTags;
            return Ok(Dataset::Node { id, coord: None });
        }
        let lon = self
            .deltas
            .decode(DeltaField::Longitude, read_signed_varint(&mut self.body)?);
        let lat = self
            .deltas
            .decode(DeltaField::Latitude, read_signed_varint(&mut self.body)?);
        self.section = Section::NodeTags;
        Ok(Dataset::Node {
            id,
            coord: Some(coord! { x: lon as f64 / COORD_SCALE, y: lat as f64 / COORD_SCALE }),
        })
    }

    fn start_way(&mut self) -> Result<Dataset> {
        let id = self.read_id(DeltaField::WayId)?;
        self.section = match self.reference_section_end()? {
            Some(end) => Section::WayRefs { end },
            None => Section::WayTags,
        };
        Ok(Dataset::Way { id })
    }

    fn start_relation(&mut self) -> Result<Dataset> {
        let id = self.read_id(DeltaField::RelationId)?;
        self.section = match self.reference_section_end()? {
            Some(end) => Section::RelationMembers { end },
            None => Section::RelationTags,
        };
        Ok(Dataset::Relation { id })
    }

    fn read_id(&mut self, field: DeltaField) -> Result<OsmId> {
        let id = self.deltas.decode(field, read_signed_varint(&mut self.body)?);
        self.skip_info()?;
        Ok(id)
    }

    /// Version, timestamp, changeset and author are decoded for their delta
    /// state but not kept.
    fn skip_info(&mut self) -> Result<()> {
        if self.body.is_empty() {
            return Ok(());
        }
        let version = read_unsigned_varint(&mut self.body)?;
        if version == 0 {
            return Ok(());
        }
        let timestamp = self
            .deltas
            .decode(DeltaField::Timestamp, read_signed_varint(&mut self.body)?);
        if timestamp == 0 {
            return Ok(());
        }
        self.deltas
            .decode(DeltaField::Changeset, read_signed_varint(&mut self.body)?);
        match read_unsigned_varint(&mut self.body)? {
            0 => {
                let start = self.body.position();
                read_unsigned_varint(&mut self.body)?;
                let uid = self.body.slice_from(start);
                if self.body.read_u8()? != 0 {
                    return Err(Error::framing("author uid is not zero-terminated"));
                }
                let user = self.body.read_cstr()?;
                self.strings.push(uid, user);
            }
            reference => {
                self.strings.get(reference)?;
            }
        }
        Ok(())
    }

    fn reference_section_end(&mut self) -> Result<Option<usize>> {
        if self.body.is_empty() {
            return Ok(None);
        }
        let length = read_unsigned_varint(&mut self.body)?;
        let end = usize::try_from(length)
            .ok()
            .and_then(|length| self.body.position().checked_add(length))
            .filter(|end| *end <= self.body.len())
            .ok_or_else(|| Error::framing("reference section runs past its dataset"))?;
        Ok(Some(end))
    }

    /// Next node reference of the current way, `None` once the references end.
    pub fn next_node_ref(&mut self) -> Result<Option<OsmId>> {
        let Section::WayRefs { end } = self.section else {
            return Err(self.wrong_iterator("way node references"));
        };
        if self.body.position() >= end {
            self.section = Section::WayTags;
            return Ok(None);
        }
        let reference = self
            .deltas
            .decode(DeltaField::NodeRef, read_signed_varint(&mut self.body)?);
        if self.body.position() > end {
            return Err(Error::framing("node reference crosses the end of its section"));
        }
        Ok(Some(reference))
    }

    /// Next member of the current relation, `None` once the members end.
    pub fn next_member(&mut self) -> Result<Option<RawMember<'_>>> {
        let Section::RelationMembers { end } = self.section else {
            return Err(self.wrong_iterator("relation members"));
        };
        if self.body.position() >= end {
            self.section = Section::RelationTags;
            return Ok(None);
        }
        let delta = read_signed_varint(&mut self.body)?;
        let descriptor: &[u8] = match read_unsigned_varint(&mut self.body)? {
            0 => {
                let inline = self.body.read_cstr()?;
                self.strings.push(inline, &[]);
                inline
            }
            reference => self.strings.get(reference)?.0,
        };
        if self.body.position() > end {
            return Err(Error::framing("relation member crosses the end of its section"));
        }
        let (kind, field) = match descriptor.first() {
            Some(b'0') => (ElementKind::Node, DeltaField::MemberNode),
            Some(b'1') => (ElementKind::Way, DeltaField::MemberWay),
            Some(b'2') => (ElementKind::Relation, DeltaField::MemberRelation),
            other => {
                return Err(Error::framing(format!(
                    "unknown relation member type {:?}",
                    other.map(|b| *b as char)
                )))
            }
        };
        let id = self.deltas.decode(field, delta);
        Ok(Some(RawMember {
            id,
            kind,
            role: &descriptor[1..],
        }))
    }

    /// Next tag of the current node, way or relation. Unread references are
    /// skipped.
    pub fn next_tag(&mut self) -> Result<Option<(&[u8], &[u8])>> {
        match self.section {
            Section::NodeTags | Section::WayTags | Section::RelationTags => {}
            Section::WayRefs { end } => {
                self.body.skip_to(end)?;
                self.section = Section::WayTags;
            }
            Section::RelationMembers { end } => {
                self.body.skip_to(end)?;
                self.section = Section::RelationTags;
            }
            _ => return Err(self.wrong_iterator("tags")),
        }
        if self.body.is_empty() {
            return Ok(None);
        }
        match read_pair_ref(&mut self.body)? {
            PairRef::Inline(key, value) => {
                self.strings.push(key, value);
                Ok(Some((key, value)))
            }
            PairRef::Back(reference) => self.strings.get(reference).map(Some),
        }
    }

    fn wrong_iterator(&self, requested: &'static str) -> Error {
        Error::WrongIteratorForState {
            requested,
            state: self.section.name(),
        }
    }
}

/// Reads a whole O5M buffer into the load's tables.
pub fn load_o5m(data: &[u8], ctx: &mut LoadContext) -> Result<()> {
    let mut reader = O5mReader::new(data)?;
    let mut counts = [0usize; 3];

    while let Some(dataset) = reader.next_dataset()? {
        match dataset {
            Dataset::Node { id, coord } => {
                counts[0] += 1;
                let node = ctx.data.upsert_node(id);
                node.coord = coord;
                while let Some((key, value)) = reader.next_tag()? {
                    let key = ctx.pool.intern_bytes(key);
                    let value = ctx.pool.intern_bytes(value);
                    ctx.data.upsert_node(id).tags.insert(key, value);
                }
            }
            Dataset::Way { id } => {
                counts[1] += 1;
                let mut refs = Vec::new();
                if matches!(reader.section, Section::WayRefs { .. }) {
                    while let Some(reference) = reader.next_node_ref()? {
                        refs.push(reference);
                    }
                }
                ctx.data.upsert_way(id).refs = refs;
                while let Some((key, value)) = reader.next_tag()? {
                    let key = ctx.pool.intern_bytes(key);
                    let value = ctx.pool.intern_bytes(value);
                    ctx.data.upsert_way(id).tags.insert(key, value);
                }
            }
            Dataset::Relation { id } => {
                counts[2] += 1;
                let mut members = Vec::new();
                if matches!(reader.section, Section::RelationMembers { .. }) {
                    while let Some(member) = reader.next_member()? {
                        members.push(Member {
                            id: member.id,
                            kind: member.kind,
                            role: ctx.pool.intern_bytes(member.role),
                        });
                    }
                }
                ctx.data.upsert_relation(id).members = members;
                while let Some((key, value)) = reader.next_tag()? {
                    let key = ctx.pool.intern_bytes(key);
                    let value = ctx.pool.intern_bytes(value);
                    ctx.data.upsert_relation(id).tags.insert(key, value);
                }
            }
            Dataset::BoundingBox(rect) => {
                debug!(
                    min_lon = rect.min().x,
                    min_lat = rect.min().y,
                    max_lon = rect.max().x,
                    max_lat = rect.max().y;
                    "O5M bounding box"
                );
            }
            Dataset::Header { change_file } => {
                debug!(change_file = change_file; "O5M header");
            }
            Dataset::Timestamp(_) | Dataset::Sync | Dataset::Jump => {}
        }
    }

    info!(
        format = "o5m",
        nodes = counts[0],
        ways = counts[1],
        relations = counts[2];
        "Finished reading datasets"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_signed_varint, write_unsigned_varint};
    use crate::test_support::o5m::O5mWriter;
    use crate::test_support::Fixture;

    fn load(data: &[u8]) -> Result<LoadContext> {
        let mut ctx = LoadContext::new();
        load_o5m(data, &mut ctx)?;
        Ok(ctx)
    }

    #[test]
    fn pulls_datasets_and_their_sections() {
        let mut writer = O5mWriter::new();
        writer.node(100, Some((52.5, 13.4)), &vec![("amenity", "cafe")]);
        writer.way(200, &[100, 101, 99], &vec![("highway", "path")]);
        let data = writer.finish();

        let mut reader = O5mReader::new(&data).unwrap();
        assert_eq!(
            reader.next_dataset().unwrap(),
            Some(Dataset::Header { change_file: false })
        );
        let Some(Dataset::Node {
            id: 100,
            coord: Some(coord),
        }) = reader.next_dataset().unwrap()
        else {
            panic!("expected node 100");
        };
        assert!((coord.x - 13.4).abs() < 1e-7 && (coord.y - 52.5).abs() < 1e-7);
        assert_eq!(reader.next_tag().unwrap(), Some((&b"amenity"[..], &b"cafe"[..])));
        assert_eq!(reader.next_tag().unwrap(), None);

        assert_eq!(reader.next_dataset().unwrap(), Some(Dataset::Way { id: 200 }));
        let mut refs = Vec::new();
        while let Some(reference) = reader.next_node_ref().unwrap() {
            refs.push(reference);
        }
        assert_eq!(refs, vec![100, 101, 99]);
        assert_eq!(reader.next_tag().unwrap(), Some((&b"highway"[..], &b"path"[..])));
        assert_eq!(reader.next_dataset().unwrap(), None);
        assert_eq!(reader.next_dataset().unwrap(), None);
    }

    #[test]
    fn iterators_are_tied_to_the_dataset_kind() {
        let mut writer = O5mWriter::new();
        writer.node(1, Some((1.0, 1.0)), &vec![]);
        writer.way(2, &[1], &vec![]);
        let data = writer.finish();

        let mut reader = O5mReader::new(&data).unwrap();
        assert!(matches!(
            reader.next_node_ref(),
            Err(Error::WrongIteratorForState { state: "no dataset", .. })
        ));
        reader.next_dataset().unwrap();
        assert!(matches!(
            reader.next_tag(),
            Err(Error::WrongIteratorForState { .. })
        ));
        reader.next_dataset().unwrap();
        assert!(matches!(
            reader.next_member(),
            Err(Error::WrongIteratorForState { requested: "relation members", .. })
        ));
        reader.next_dataset().unwrap();
        // Tags skip the unread references; going back is not possible.
        assert_eq!(reader.next_tag().unwrap(), None);
        assert!(matches!(
            reader.next_node_ref(),
            Err(Error::WrongIteratorForState { state: "way tags", .. })
        ));
    }

    #[test]
    fn repeated_pairs_use_back_references() {
        let mut writer = O5mWriter::new();
        writer.node(1, Some((0.0, 0.0)), &vec![("highway", "bus_stop"), ("name", "A")]);
        writer.node(2, Some((0.0, 0.0)), &vec![("name", "B"), ("highway", "bus_stop")]);
        let data = writer.finish();
        let ctx = load(&data).unwrap();

        assert_eq!(ctx.data.nodes[&2].tags.get("highway"), Some("bus_stop"));
        assert_eq!(ctx.data.nodes[&2].tags.get("name"), Some("B"));
        // highway, bus_stop, name, A, B
        assert_eq!(ctx.pool.len(), 5);
    }

    #[test]
    fn string_table_evicts_oldest_first() {
        let mut table = StringTable::default();
        for index in 0..=STRING_TABLE_CAPACITY {
            table.push(index.to_string().as_bytes(), b"v");
        }
        assert_eq!(table.len(), STRING_TABLE_CAPACITY);
        assert_eq!(table.get(1).unwrap().0, STRING_TABLE_CAPACITY.to_string().as_bytes());
        assert_eq!(table.get(STRING_TABLE_CAPACITY as u64).unwrap().0, b"1");
        assert!(table.get(STRING_TABLE_CAPACITY as u64 + 1).is_err());
        assert!(table.get(0).is_err());
    }

    #[test]
    fn long_pairs_are_not_stored() {
        let mut table = StringTable::default();
        table.push(&[b'k'; 200], &[b'v'; 50]);
        table.push(&[b'k'; 200], &[b'v'; 51]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).unwrap().1.len(), 50);
    }

    #[test]
    fn reset_restarts_deltas_and_strings() {
        let mut writer = O5mWriter::new();
        writer.node(1_000, Some((10.0, 20.0)), &vec![("natural", "tree")]);
        writer.reset();
        writer.node(1_001, Some((10.5, 20.5)), &vec![("natural", "tree")]);
        let data = writer.finish();
        let ctx = load(&data).unwrap();

        let coord = ctx.data.nodes[&1_001].coord.unwrap();
        assert!((coord.y - 10.5).abs() < 1e-7 && (coord.x - 20.5).abs() < 1e-7);
        assert_eq!(ctx.data.nodes[&1_001].tags.get("natural"), Some("tree"));
    }

    #[test]
    fn members_carry_kind_and_role() {
        let fixture = Fixture::sample();
        let ctx = load(&fixture.to_o5m()).unwrap();

        let multipolygon = &ctx.data.relations[&20];
        let roles: Vec<(ElementKind, OsmId, &str)> = multipolygon
            .members
            .iter()
            .map(|member| (member.kind, member.id, &*member.role))
            .collect();
        assert_eq!(
            roles,
            vec![
                (ElementKind::Way, 10, "outer"),
                (ElementKind::Way, 11, "outer"),
                (ElementKind::Way, 12, "inner"),
            ]
        );
        let route = &ctx.data.relations[&21];
        assert_eq!(route.members[1].element(), crate::data::osm::ElementRef::node(9));
    }

    #[test]
    fn author_info_is_skipped() {
        let mut body = Vec::new();
        write_signed_varint(&mut body, 5);
        write_unsigned_varint(&mut body, 3);
        write_signed_varint(&mut body, 1_600_000_000);
        write_signed_varint(&mut body, 42);
        body.extend_from_slice(b"\x00\x00\x00anonymous\x00");
        write_signed_varint(&mut body, 10);
        write_signed_varint(&mut body, 20);

        let mut data = vec![0xff, 0x10];
        write_unsigned_varint(&mut data, body.len() as u64);
        data.extend(body);
        data.push(0xfe);
        let ctx = load(&data).unwrap();

        let coord = ctx.data.nodes[&5].coord.unwrap();
        assert!((coord.x - 1e-6).abs() < 1e-12 && (coord.y - 2e-6).abs() < 1e-12);
    }

    #[test]
    fn node_without_position_has_no_coordinates() {
        let mut writer = O5mWriter::new();
        writer.node(3, None, &vec![]);
        let ctx = load(&writer.finish()).unwrap();
        assert_eq!(ctx.data.nodes[&3].coord, None);
    }

    #[test]
    fn unknown_datasets_are_skipped() {
        let mut writer = O5mWriter::new();
        writer.raw(&[0x30, 0x02, 0xaa, 0xbb]);
        writer.node(8, Some((1.0, 1.0)), &vec![]);
        let ctx = load(&writer.finish()).unwrap();
        assert!(ctx.data.nodes.contains_key(&8));
    }

    #[test]
    fn reserved_markers_are_malformed() {
        let mut writer = O5mWriter::new();
        writer.raw(&[0xf5]);
        assert!(matches!(
            load(&writer.finish()),
            Err(Error::MalformedFraming { .. })
        ));
    }

    #[test]
    fn cut_dataset_is_truncated() {
        let mut writer = O5mWriter::new();
        writer.way(2, &[1, 2, 3, 4], &vec![("highway", "primary")]);
        let data = writer.finish();
        let cut = &data[..data.len() - 4];
        assert!(matches!(load(cut), Err(Error::TruncatedInput { .. })));
    }

    #[test]
    fn missing_reset_marker_is_malformed() {
        assert!(matches!(
            O5mReader::new(b"\x10\x00"),
            Err(Error::MalformedFraming { .. })
        ));
    }
}
