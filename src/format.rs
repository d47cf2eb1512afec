use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

/// The input encodings the loader can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    O5m,
    Pbf,
    Xml,
    XmlZip,
    XmlGz,
    XmlXz,
}

impl InputFormat {
    /// Picks the format from the file name suffix.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let format = if name.ends_with(".o5m") {
            InputFormat::O5m
        } else if name.ends_with(".pbf") {
            InputFormat::Pbf
        } else if name.ends_with(".osm.zip") {
            InputFormat::XmlZip
        } else if name.ends_with(".osm.gz") {
            InputFormat::XmlGz
        } else if name.ends_with(".osm.xz") {
            InputFormat::XmlXz
        } else if name.ends_with(".osm") {
            InputFormat::Xml
        } else {
            return None;
        };
        Some(format)
    }

    /// Guesses the format from the first bytes of the input.
    pub fn sniff(head: &[u8]) -> Option<Self> {
        let text = trim_text_prefix(head);
        if text.starts_with(b"<?xml") || text.starts_with(b"<osm") {
            return Some(InputFormat::Xml);
        }
        if head.starts_with(&[0xff, 0xe0]) {
            return Some(InputFormat::O5m);
        }
        if head.starts_with(b"PK\x03\x04") {
            return Some(InputFormat::XmlZip);
        }
        if head.starts_with(&[0x1f, 0x8b]) {
            return Some(InputFormat::XmlGz);
        }
        if head.starts_with(b"\xfd7zXZ\x00") {
            return Some(InputFormat::XmlXz);
        }
        // A BlobHeader starts with its `type` field: tag 0x0a, length 9, "OSMHeader".
        if head.get(4..8) == Some(&b"\x0a\x09OS"[..]) {
            return Some(InputFormat::Pbf);
        }
        None
    }

    pub fn is_binary(self) -> bool {
        matches!(self, InputFormat::O5m | InputFormat::Pbf)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputFormat::O5m => "o5m",
            InputFormat::Pbf => "pbf",
            InputFormat::Xml => "xml",
            InputFormat::XmlZip => "xml_zip",
            InputFormat::XmlGz => "xml_gz",
            InputFormat::XmlXz => "xml_xz",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skips a UTF-8 byte order mark and leading whitespace.
fn trim_text_prefix(head: &[u8]) -> &[u8] {
    let head = head.strip_prefix(b"\xef\xbb\xbf").unwrap_or(head);
    let start = head
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(head.len());
    &head[start..]
}
