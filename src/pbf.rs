//! Reader for the block-structured PBF format.
//!
//! Framing errors abort the load. Problems confined to one blob are recorded
//! as diagnostics and the reader moves on to the next blob.

use log::{debug, info};

use crate::diagnostics::Diagnostic;
use crate::errors::{Error, Result};
use crate::load::LoadContext;

pub mod blob;
pub mod block;
pub mod proto;

pub use blob::{BlobFrame, BlobReader, OSM_DATA, OSM_HEADER};
pub use block::{BlockCounts, HeaderInfo};

pub fn load_pbf(data: &[u8], ctx: &mut LoadContext) -> Result<()> {
    if data.is_empty() {
        return Err(Error::framing("pbf input is empty"));
    }
    let mut reader = BlobReader::new(data);
    let mut totals = BlockCounts::default();
    let mut blobs = 0;

    while let Some(frame) = reader.next_frame()? {
        blobs += 1;
        let block = match blob::decode_blob(frame.blob) {
            Ok(block) => block,
            Err(err) => {
                ctx.diagnostics.record(Diagnostic::CompressionFailure {
                    blob: frame.index,
                    message: err.to_string(),
                });
                continue;
            }
        };

        match frame.kind.as_str() {
            OSM_HEADER => match block::decode_header_block(&block) {
                Ok(header) => check_header(&header, ctx),
                Err(err) => ctx.diagnostics.record(Diagnostic::MalformedBlock {
                    blob: frame.index,
                    message: err.to_string(),
                }),
            },
            OSM_DATA => match block::load_primitive_block(&block, ctx) {
                Ok(counts) => {
                    debug!(
                        blob = frame.index,
                        nodes = counts.nodes,
                        ways = counts.ways,
                        relations = counts.relations;
                        "Decoded block"
                    );
                    totals.nodes += counts.nodes;
                    totals.ways += counts.ways;
                    totals.relations += counts.relations;
                }
                Err(err) => ctx.diagnostics.record(Diagnostic::MalformedBlock {
                    blob: frame.index,
                    message: err.to_string(),
                }),
            },
            other => {
                debug!(blob = frame.index, kind = other; "Skipping blob of unknown type")
            }
        }
    }

    info!(
        format = "pbf",
        blobs = blobs,
        nodes = totals.nodes,
        ways = totals.ways,
        relations = totals.relations;
        "Finished reading blobs"
    );
    Ok(())
}

fn check_header(header: &HeaderInfo, ctx: &mut LoadContext) {
    if let Some(bbox) = header.bbox {
        debug!(
            min_lon = bbox.min().x,
            min_lat = bbox.min().y,
            max_lon = bbox.max().x,
            max_lat = bbox.max().y;
            "PBF bounding box"
        );
    }
    if let Some(program) = &header.writing_program {
        debug!(writing_program = program.as_str(); "PBF header");
    }
    for feature in header.unsupported_features() {
        ctx.diagnostics.record(Diagnostic::UnsupportedFeature {
            feature: feature.to_owned(),
        });
    }
}
