//! `HeaderBlock` and `PrimitiveBlock` decoding.

use std::sync::Arc;

use geo::{coord, Coord, Rect};
use prost::Message;

use super::proto::{DenseNodes, HeaderBlock, Node, PrimitiveBlock, PrimitiveGroup, Relation, Way};
use crate::codec::{DeltaDecoder, DeltaField};
use crate::data::osm::{ElementKind, Member, OsmId};
use crate::data::pool::StringPool;
use crate::data::tags::Tags;
use crate::errors::{Error, Result};
use crate::load::LoadContext;

/// Required features this reader understands.
pub const SUPPORTED_FEATURES: [&str; 2] = ["OsmSchema-V0.6", "DenseNodes"];

const NANO: f64 = 1e-9;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderInfo {
    pub bbox: Option<Rect<f64>>,
    pub required_features: Vec<String>,
    pub writing_program: Option<String>,
}

impl HeaderInfo {
    pub fn unsupported_features(&self) -> impl Iterator<Item = &str> {
        self.required_features
            .iter()
            .map(String::as_str)
            .filter(|feature| !SUPPORTED_FEATURES.contains(feature))
    }
}

pub fn decode_header_block(data: &[u8]) -> Result<HeaderInfo> {
    let block = HeaderBlock::decode(data)?;
    let bbox = block.bbox.map(|bbox| {
        let [left, right, top, bottom] =
            [bbox.left, bbox.right, bbox.top, bbox.bottom].map(|edge| edge as f64 * NANO);
        Rect::new(coord! { x: left, y: bottom }, coord! { x: right, y: top })
    });
    Ok(HeaderInfo {
        bbox,
        required_features: block.required_features,
        writing_program: block.writing_program,
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockCounts {
    pub nodes: usize,
    pub ways: usize,
    pub relations: usize,
}

/// Block-local string table. Entries are interned into the load pool the
/// first time they are used.
struct BlockStrings<'a> {
    raw: &'a [Vec<u8>],
    interned: Vec<Option<Arc<str>>>,
}

impl<'a> BlockStrings<'a> {
    fn new(raw: &'a [Vec<u8>]) -> Self {
        BlockStrings {
            raw,
            interned: vec![None; raw.len()],
        }
    }

    fn get(&mut self, index: u32, pool: &mut StringPool) -> Result<Arc<str>> {
        let slot = index as usize;
        let bytes = self.raw.get(slot).ok_or_else(|| {
            Error::framing(format!(
                "string index {index} is outside a table of {} entries",
                self.raw.len()
            ))
        })?;
        Ok(self.interned[slot]
            .get_or_insert_with(|| pool.intern_bytes(bytes))
            .clone())
    }
}

/// Position encoding shared by all groups of a block.
#[derive(Debug, Clone, Copy)]
struct Grid {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl Grid {
    fn of(block: &PrimitiveBlock) -> Self {
        Grid {
            granularity: i64::from(block.granularity.unwrap_or(100)),
            lat_offset: block.lat_offset.unwrap_or(0),
            lon_offset: block.lon_offset.unwrap_or(0),
        }
    }

    /// Fails when the scaled position does not fit in 64 bits.
    fn coord(&self, lat: i64, lon: i64) -> Result<Coord<f64>> {
        let scale = |offset: i64, value: i64| {
            self.granularity
                .checked_mul(value)
                .and_then(|scaled| scaled.checked_add(offset))
                .map(|nanos| nanos as f64 * NANO)
                .ok_or_else(|| {
                    Error::framing(format!(
                        "position {value} at granularity {} overflows",
                        self.granularity
                    ))
                })
        };
        Ok(coord! {
            x: scale(self.lon_offset, lon)?,
            y: scale(self.lat_offset, lat)?,
        })
    }
}

/// Decodes one `PrimitiveBlock` straight into the load tables.
pub fn load_primitive_block(data: &[u8], ctx: &mut LoadContext) -> Result<BlockCounts> {
    let block = PrimitiveBlock::decode(data)?;
    let raw_strings = block
        .string_table
        .as_ref()
        .map(|table| table.s.as_slice())
        .unwrap_or_default();

    let mut decoder = BlockDecoder {
        strings: BlockStrings::new(raw_strings),
        grid: Grid::of(&block),
        ctx,
        counts: BlockCounts::default(),
    };
    for group in &block.groups {
        decoder.load_group(group)?;
    }
    Ok(decoder.counts)
}

struct BlockDecoder<'a, 'c> {
    strings: BlockStrings<'a>,
    grid: Grid,
    ctx: &'c mut LoadContext,
    counts: BlockCounts,
}

impl BlockDecoder<'_, '_> {
    fn load_group(&mut self, group: &PrimitiveGroup) -> Result<()> {
        for node in &group.nodes {
            self.load_node(node)?;
        }
        if let Some(dense) = &group.dense {
            self.load_dense(dense)?;
        }
        for way in &group.ways {
            self.load_way(way)?;
        }
        for relation in &group.relations {
            self.load_relation(relation)?;
        }
        Ok(())
    }

    fn string(&mut self, index: u32) -> Result<Arc<str>> {
        self.strings.get(index, &mut self.ctx.pool)
    }

    /// Dense and relation string indexes are signed on the wire.
    fn signed_string(&mut self, index: i32) -> Result<Arc<str>> {
        let index = u32::try_from(index)
            .map_err(|_| Error::framing(format!("negative string index {index}")))?;
        self.string(index)
    }

    fn tag_pairs(&mut self, keys: &[u32], vals: &[u32]) -> Result<Vec<(Arc<str>, Arc<str>)>> {
        if keys.len() != vals.len() {
            return Err(Error::framing(format!(
                "{} keys but {} values",
                keys.len(),
                vals.len()
            )));
        }
        keys.iter()
            .zip(vals)
            .map(|(key, value)| Ok((self.string(*key)?, self.string(*value)?)))
            .collect()
    }

    fn load_node(&mut self, message: &Node) -> Result<()> {
        let tags = self.tag_pairs(&message.keys, &message.vals)?;
        let coord = self.grid.coord(message.lat, message.lon)?;
        let node = self.ctx.data.upsert_node(message.id);
        node.coord = Some(coord);
        insert_all(&mut node.tags, tags);
        self.counts.nodes += 1;
        Ok(())
    }

    fn load_dense(&mut self, dense: &DenseNodes) -> Result<()> {
        let count = dense.id.len();
        if dense.lat.len() != count || dense.lon.len() != count {
            return Err(Error::framing(format!(
                "dense nodes carry {count} ids, {} latitudes and {} longitudes",
                dense.lat.len(),
                dense.lon.len()
            )));
        }

        let mut deltas = DeltaDecoder::new();
        let mut kv = dense.keys_vals.iter().copied();
        for ((&id, &lat), &lon) in dense.id.iter().zip(&dense.lat).zip(&dense.lon) {
            let id = deltas.decode(DeltaField::NodeId, id);
            let lat = deltas.decode(DeltaField::Latitude, lat);
            let lon = deltas.decode(DeltaField::Longitude, lon);

            let mut tags = Vec::new();
            while let Some(key) = kv.next() {
                if key == 0 {
                    break;
                }
                let value = kv.next().ok_or_else(|| {
                    Error::framing(format!("dense node {id} has a key without a value"))
                })?;
                tags.push((self.signed_string(key)?, self.signed_string(value)?));
            }

            let coord = self.grid.coord(lat, lon)?;
            let node = self.ctx.data.upsert_node(id);
            node.coord = Some(coord);
            insert_all(&mut node.tags, tags);
            self.counts.nodes += 1;
        }
        Ok(())
    }

    fn load_way(&mut self, message: &Way) -> Result<()> {
        let tags = self.tag_pairs(&message.keys, &message.vals)?;
        let mut deltas = DeltaDecoder::new();
        let refs: Vec<OsmId> = message
            .refs
            .iter()
            .map(|delta| deltas.decode(DeltaField::NodeRef, *delta))
            .collect();

        let way = self.ctx.data.upsert_way(message.id);
        way.refs = refs;
        insert_all(&mut way.tags, tags);
        self.counts.ways += 1;
        Ok(())
    }

    fn load_relation(&mut self, message: &Relation) -> Result<()> {
        let id = message.id;
        let count = message.memids.len();
        if message.roles_sid.len() != count || message.types.len() != count {
            return Err(Error::framing(format!(
                "relation {id} has {count} member ids, {} roles and {} types",
                message.roles_sid.len(),
                message.types.len()
            )));
        }
        let tags = self.tag_pairs(&message.keys, &message.vals)?;

        // One running id over all members, whatever their kind.
        let mut member_id: OsmId = 0;
        let mut members = Vec::with_capacity(count);
        let fields = message.memids.iter().zip(&message.roles_sid).zip(&message.types);
        for ((&memid, &role), &kind) in fields {
            member_id = member_id.wrapping_add(memid);
            members.push(Member {
                id: member_id,
                kind: member_kind(kind)?,
                role: self.signed_string(role)?,
            });
        }

        let relation = self.ctx.data.upsert_relation(id);
        relation.members = members;
        insert_all(&mut relation.tags, tags);
        self.counts.relations += 1;
        Ok(())
    }
}

fn member_kind(value: i32) -> Result<ElementKind> {
    match value {
        0 => Ok(ElementKind::Node),
        1 => Ok(ElementKind::Way),
        2 => Ok(ElementKind::Relation),
        other => Err(Error::framing(format!("unknown member type {other}"))),
    }
}

fn insert_all(target: &mut Tags, pairs: Vec<(Arc<str>, Arc<str>)>) {
    for (key, value) in pairs {
        target.insert(key, value);
    }
}
