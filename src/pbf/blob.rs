use std::io::Read;

use flate2::read::ZlibDecoder;
use prost::Message;

use super::proto::{Blob, BlobHeader};
use crate::codec::ByteCursor;
use crate::errors::{Error, Result};

/// Largest `BlobHeader` a reader has to accept.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;
/// Largest compressed or uncompressed blob a reader has to accept.
pub const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

pub const OSM_HEADER: &str = "OSMHeader";
pub const OSM_DATA: &str = "OSMData";

/// One `BlobHeader` plus the still encoded `Blob` it announces.
#[derive(Debug, Clone)]
pub struct BlobFrame<'a> {
    pub index: usize,
    pub kind: String,
    pub blob: &'a [u8],
}

/// Splits a PBF buffer into blob frames.
pub struct BlobReader<'a> {
    cursor: ByteCursor<'a>,
    index: usize,
}

impl<'a> BlobReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BlobReader {
            cursor: ByteCursor::new(data),
            index: 0,
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<BlobFrame<'a>>> {
        if self.cursor.is_empty() {
            return Ok(None);
        }
        let offset = self.cursor.position();
        let prefix = self
            .cursor
            .read_bytes(4)
            .map_err(|_| Error::truncated("blob header length", offset))?;
        let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if header_len > MAX_HEADER_SIZE {
            return Err(Error::framing(format!(
                "blob header {} at byte {offset} is {header_len} bytes long",
                self.index
            )));
        }
        let header = self
            .cursor
            .read_bytes(header_len)
            .map_err(|_| Error::truncated("blob header", offset + 4))?;

        let (kind, datasize) = parse_blob_header(header)?;
        if datasize > MAX_BLOB_SIZE {
            return Err(Error::framing(format!(
                "blob {} declares {datasize} bytes",
                self.index
            )));
        }
        if self.index == 0 && kind != OSM_HEADER {
            return Err(Error::framing(format!(
                "first blob is {kind:?}, expected {OSM_HEADER}"
            )));
        }
        let blob_offset = self.cursor.position();
        let blob = self
            .cursor
            .read_bytes(datasize)
            .map_err(|_| Error::truncated("blob", blob_offset))?;

        let frame = BlobFrame {
            index: self.index,
            kind,
            blob,
        };
        self.index += 1;
        Ok(Some(frame))
    }
}

fn parse_blob_header(header: &[u8]) -> Result<(String, usize)> {
    let header = BlobHeader::decode(header)
        .map_err(|err| Error::framing(format!("undecodable blob header: {err}")))?;
    let kind = header
        .kind
        .ok_or_else(|| Error::framing("blob header has no type"))?;
    let datasize = header
        .datasize
        .ok_or_else(|| Error::framing("blob header has no data size"))?;
    let datasize = usize::try_from(datasize)
        .map_err(|_| Error::framing(format!("blob data size {datasize} is negative")))?;
    Ok((kind, datasize))
}

/// Reasons a blob could not be turned into block bytes.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),
    #[error("inflated to {actual} bytes, header declared {declared}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("{0} compression is not supported")]
    Unsupported(&'static str),
    #[error("blob has no payload")]
    Empty,
    #[error("undecodable blob: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Returns the block bytes held in a `Blob` message, inflating them if needed.
pub fn decode_blob(blob: &[u8]) -> std::result::Result<Vec<u8>, BlobError> {
    let blob = Blob::decode(blob)?;
    if let Some(raw) = blob.raw {
        return Ok(raw);
    }
    if let Some(compressed) = blob.zlib_data {
        let declared = blob
            .raw_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(MAX_BLOB_SIZE);
        let limit = declared.min(MAX_BLOB_SIZE) as u64 + 1;
        let mut inflated = Vec::with_capacity(declared.min(MAX_BLOB_SIZE));
        ZlibDecoder::new(compressed.as_slice())
            .take(limit)
            .read_to_end(&mut inflated)?;
        if blob.raw_size.is_some() && inflated.len() != declared {
            return Err(BlobError::SizeMismatch {
                declared,
                actual: inflated.len(),
            });
        }
        return Ok(inflated);
    }
    let unsupported = [
        ("lzma", blob.lzma_data.is_some()),
        ("bzip2", blob.bzip2_data.is_some()),
        ("lz4", blob.lz4_data.is_some()),
        ("zstd", blob.zstd_data.is_some()),
    ];
    match unsupported.into_iter().find(|(_, present)| *present) {
        Some((name, _)) => Err(BlobError::Unsupported(name)),
        None => Err(BlobError::Empty),
    }
}
