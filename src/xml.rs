//! Streaming reader for OSM XML and its compressed containers.

use std::io::{BufRead, BufReader, Read, Seek};
use std::str::{self, FromStr};

use flate2::read::MultiGzDecoder;
use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{ElementKind, ElementRef, Member, OsmId};
use crate::diagnostics::Diagnostic;
use crate::errors::{Error, Result};
use crate::format::InputFormat;
use crate::load::LoadContext;

/// Elements currently open in the document.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Open {
    Node(OsmId),
    Way(OsmId),
    Relation(OsmId),
    Other,
}

struct XmlLoader<'c> {
    ctx: &'c mut LoadContext,
    stack: Vec<Open>,
    counts: [usize; 3],
}

/// Unwraps the container `format` names and reads the XML inside.
pub fn load_xml_container<R: Read + Seek>(
    input: R,
    format: InputFormat,
    ctx: &mut LoadContext,
) -> Result<()> {
    match format {
        InputFormat::XmlZip => {
            let mut archive = zip::ZipArchive::new(input)?;
            if archive.len() == 0 {
                return Err(Error::framing("zip archive has no entries"));
            }
            if archive.len() > 1 {
                ctx.diagnostics.record(Diagnostic::ExtraArchiveEntries {
                    entries: archive.len(),
                });
            }
            let entry = archive.by_index(0)?;
            debug!(entry = entry.name(); "Reading archive entry");
            load_xml(BufReader::new(entry), ctx)
        }
        InputFormat::XmlGz => load_xml(BufReader::new(MultiGzDecoder::new(input)), ctx),
        InputFormat::XmlXz => {
            let xz_reader = XzDecoder::new(BufReader::new(input));
            load_xml(BufReader::new(xz_reader), ctx)
        }
        _ => load_xml(BufReader::new(input), ctx),
    }
}

/// Reads plain OSM XML in a single forward pass.
pub fn load_xml<R: BufRead>(input: R, ctx: &mut LoadContext) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut loader = XmlLoader {
        ctx,
        stack: Vec::new(),
        counts: [0; 3],
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(quick_xml::Error::UnexpectedEof(_)) => {
                return Err(Error::truncated("xml markup", reader.buffer_position() as usize))
            }
            Err(e) => return Err(e.into()),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let open = loader.open_element(&e)?;
                loader.stack.push(open);
            }
            Ok(Event::Empty(e)) => {
                loader.open_element(&e)?;
            }
            Ok(Event::End(_)) => {
                loader.stack.pop();
            }
            // Declarations, comments and whitespace carry nothing we keep.
            Ok(_) => (),
        }
        buf.clear();
    }

    if !loader.stack.is_empty() {
        return Err(Error::truncated(
            "an open xml element",
            reader.buffer_position() as usize,
        ));
    }

    let [nodes, ways, relations] = loader.counts;
    info!(
        format = "xml",
        nodes = nodes,
        ways = ways,
        relations = relations;
        "Finished reading elements"
    );
    Ok(())
}

impl XmlLoader<'_> {
    /// Innermost open node, way or relation.
    fn parent(&self) -> Option<Open> {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|open| *open != Open::Other)
    }

    fn open_element(&mut self, e: &BytesStart) -> Result<Open> {
        match e.name().as_ref() {
            b"node" => self.parse_node(e),
            b"way" => {
                let id = required_id(e, "way")?;
                self.counts[1] += 1;
                let way = self.ctx.data.upsert_way(id);
                way.refs.clear();
                Ok(Open::Way(id))
            }
            b"relation" => {
                let id = required_id(e, "relation")?;
                self.counts[2] += 1;
                let relation = self.ctx.data.upsert_relation(id);
                relation.members.clear();
                Ok(Open::Relation(id))
            }
            b"tag" => {
                self.parse_tag(e)?;
                Ok(Open::Other)
            }
            b"nd" => {
                if let Some(Open::Way(way)) = self.parent() {
                    let reference = required_number(e, "nd", b"ref")?;
                    self.ctx.data.upsert_way(way).refs.push(reference);
                }
                Ok(Open::Other)
            }
            b"member" => {
                if let Some(Open::Relation(relation)) = self.parent() {
                    let member = self.parse_member(e)?;
                    self.ctx.data.upsert_relation(relation).members.push(member);
                }
                Ok(Open::Other)
            }
            _ => Ok(Open::Other),
        }
    }

    fn parse_node(&mut self, e: &BytesStart) -> Result<Open> {
        let mut id = None;
        let mut lat = None;
        let mut lon = None;
        for attribute in e.attributes() {
            let attribute = attribute?;
            match attribute.key.as_ref() {
                b"id" => id = Some(parse_number("node", "id", &attribute.value)?),
                b"lat" => lat = Some(parse_number::<f64>("node", "lat", &attribute.value)?),
                b"lon" => lon = Some(parse_number::<f64>("node", "lon", &attribute.value)?),
                _ => (),
            }
        }
        let id = id.ok_or_else(|| Error::framing("node without id"))?;
        self.counts[0] += 1;
        self.ctx.data.upsert_node(id).coord = match (lat, lon) {
            (Some(lat), Some(lon)) => Some(geo::coord! { x: lon, y: lat }),
            _ => None,
        };
        Ok(Open::Node(id))
    }

    fn parse_tag(&mut self, e: &BytesStart) -> Result<()> {
        let Some(parent) = self.parent() else {
            return Ok(());
        };
        let mut key = None;
        let mut value = None;
        for attribute in e.attributes() {
            let attribute = attribute?;
            match attribute.key.as_ref() {
                b"k" => key = Some(self.ctx.intern(&attribute.unescape_value()?)),
                b"v" => value = Some(self.ctx.intern(&attribute.unescape_value()?)),
                _ => (),
            }
        }
        let element = match parent {
            Open::Node(id) => ElementRef::node(id),
            Open::Way(id) => ElementRef::way(id),
            Open::Relation(id) => ElementRef::relation(id),
            Open::Other => return Ok(()),
        };
        let (Some(key), Some(value)) = (key, value) else {
            self.ctx
                .diagnostics
                .record(Diagnostic::MalformedTag { element });
            return Ok(());
        };
        let tags = match element.kind {
            ElementKind::Node => &mut self.ctx.data.upsert_node(element.id).tags,
            ElementKind::Way => &mut self.ctx.data.upsert_way(element.id).tags,
            ElementKind::Relation => &mut self.ctx.data.upsert_relation(element.id).tags,
        };
        tags.insert(key, value);
        Ok(())
    }

    fn parse_member(&mut self, e: &BytesStart) -> Result<Member> {
        let mut kind = None;
        let mut id = None;
        let mut role = None;
        for attribute in e.attributes() {
            let attribute = attribute?;
            match attribute.key.as_ref() {
                b"type" => {
                    let value = attribute.unescape_value()?;
                    kind = Some(ElementKind::from_xml_type(&value).ok_or_else(|| {
                        Error::framing(format!("member has unknown type {value:?}"))
                    })?);
                }
                b"ref" => id = Some(parse_number("member", "ref", &attribute.value)?),
                b"role" => role = Some(self.ctx.intern(&attribute.unescape_value()?)),
                _ => (),
            }
        }
        Ok(Member {
            id: id.ok_or_else(|| Error::framing("member without ref"))?,
            kind: kind.ok_or_else(|| Error::framing("member without type"))?,
            role: role.unwrap_or_else(|| self.ctx.intern("")),
        })
    }
}

fn parse_number<T: FromStr>(element: &str, attribute: &str, raw: &[u8]) -> Result<T> {
    str::from_utf8(raw)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| {
            Error::framing(format!(
                "{element} has malformed {attribute} {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

fn required_number(e: &BytesStart, element: &str, name: &[u8]) -> Result<OsmId> {
    let name = String::from_utf8_lossy(name);
    let attribute = e
        .try_get_attribute(name.as_bytes())?
        .ok_or_else(|| Error::framing(format!("{element} without {name}")))?;
    parse_number(element, &name, &attribute.value)
}

fn required_id(e: &BytesStart, element: &str) -> Result<OsmId> {
    required_number(e, element, b"id")
}
