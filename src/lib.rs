//! Loads OpenStreetMap extracts in O5M, PBF or XML form into entity tables
//! and turns them into a document of placemarks and relation objects.

pub mod assemble;
pub mod build;
pub mod classify;
pub mod codec;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod errors;
pub mod format;
pub mod load;
pub mod o5m;
pub mod pbf;
pub mod xml;

#[cfg(test)]
mod test_support;

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use log::{error, info};
use memmap2::Mmap;

pub use crate::classify::{AreaClassifier, DefaultAreaClassifier};
pub use crate::config::UserConfig;
pub use crate::data::document::{Document, Geometry, Placemark, RelationObject};
pub use crate::diagnostics::{Diagnostic, Diagnostics};
pub use crate::errors::{Error, Result};
pub use crate::format::InputFormat;
pub use crate::load::{Load, LoadContext, LoadOptions, LoadReport, LoadStats};

/// Bytes read from the start of a file when guessing its format.
const SNIFF_LEN: u64 = 64;

/// Loads `path` with the default options.
pub fn parse(path: impl AsRef<Path>) -> Result<Load> {
    parse_with(path, &LoadOptions::default())
}

pub fn parse_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Load> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    info!(path = path_str.as_str(); "Starting load");

    let result = load_path(path, options).map_err(|err| err.with_path(path));
    match &result {
        Ok(load) => info!(
            path = path_str.as_str(),
            format = load.format.as_str(),
            diagnostics = load.diagnostics.len();
            "Finished load"
        ),
        Err(err) => error!(
            path = path_str.as_str(),
            error = err.to_string().as_str();
            "Load failed"
        ),
    }
    result
}

/// Loads an in-memory input whose format is already known.
pub fn parse_bytes(format: InputFormat, data: &[u8], options: &LoadOptions) -> Result<Load> {
    let mut ctx = LoadContext::new();
    match format {
        InputFormat::O5m | InputFormat::Pbf => read_binary(format, data, &mut ctx)?,
        _ => xml::load_xml_container(Cursor::new(data), format, &mut ctx)?,
    }
    Ok(finish(format, ctx, options))
}

fn load_path(path: &Path, options: &LoadOptions) -> Result<Load> {
    let mut file = File::open(path)?;
    let format = match options.format.or_else(|| InputFormat::from_path(path)) {
        Some(format) => format,
        None => sniff_file(&mut file, path)?,
    };

    let mut ctx = LoadContext::new();
    if format.is_binary() {
        if file.metadata()?.len() == 0 {
            read_binary(format, &[], &mut ctx)?;
        } else {
            // SAFETY: the map is read-only and dropped before this function returns.
            let map = unsafe { Mmap::map(&file) }?;
            read_binary(format, &map, &mut ctx)?;
        }
    } else {
        xml::load_xml_container(file, format, &mut ctx)?;
    }
    Ok(finish(format, ctx, options))
}

fn sniff_file(file: &mut File, path: &Path) -> Result<InputFormat> {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.by_ref().take(SNIFF_LEN).read_to_end(&mut head)?;
    file.seek(SeekFrom::Start(0))?;
    InputFormat::sniff(&head).ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

fn read_binary(format: InputFormat, data: &[u8], ctx: &mut LoadContext) -> Result<()> {
    match format {
        InputFormat::O5m => o5m::load_o5m(data, ctx),
        _ => pbf::load_pbf(data, ctx),
    }
}

/// Runs the assembler and the builder over the loaded tables.
fn finish(format: InputFormat, ctx: LoadContext, options: &LoadOptions) -> Load {
    let LoadContext {
        data,
        pool,
        mut diagnostics,
    } = ctx;

    let assembly = assemble::assemble(&data, &mut diagnostics);
    let document = build::build_document(&data, &assembly, &*options.classifier, &mut diagnostics);
    let stats = LoadStats {
        nodes: data.nodes.len(),
        ways: data.ways.len(),
        relations: data.relations.len(),
        interned_strings: pool.len(),
        multipolygons: assembly.multipolygons.len(),
        placemarks: document.placemarks.len(),
        relation_objects: document.relations.len(),
    };
    Load {
        format,
        document,
        diagnostics,
        stats,
    }
}
