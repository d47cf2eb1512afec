use std::{io, path::{Path, PathBuf}};

use quick_xml::events::attributes::AttrError;

/// Conditions that abort a load. Everything recoverable goes to
/// [`crate::diagnostics::Diagnostics`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input ended in the middle of {context} at byte {offset}")]
    TruncatedInput {
        context: &'static str,
        offset: usize,
    },

    #[error("malformed framing{}: {reason}", display_path(.path))]
    MalformedFraming {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("varint at byte {offset} does not fit in 64 bits")]
    Overflow { offset: usize },

    #[error("cannot read {requested} while positioned at {state}")]
    WrongIteratorForState {
        requested: &'static str,
        state: &'static str,
    },

    #[error("cannot determine the OSM format of {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute: {0}")]
    XmlAttribute(#[from] AttrError),

    #[error("protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn truncated(context: &'static str, offset: usize) -> Self {
        Error::TruncatedInput { context, offset }
    }

    pub(crate) fn framing(reason: impl Into<String>) -> Self {
        Error::MalformedFraming {
            path: None,
            reason: reason.into(),
        }
    }

    /// Attaches the input path to framing errors raised before the path was known.
    pub fn with_path(self, path: &Path) -> Self {
        match self {
            Error::MalformedFraming { path: None, reason } => Error::MalformedFraming {
                path: Some(path.to_path_buf()),
                reason,
            },
            other => other,
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
