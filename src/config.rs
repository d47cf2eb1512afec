use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::Result;
use crate::format::InputFormat;
use crate::load::LoadOptions;

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserConfig {
    pub data_path: PathBuf,
    /// Forces a format instead of detecting it.
    #[serde(default)]
    pub format: Option<InputFormat>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where the JSON load report goes; stdout when unset.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl UserConfig {
    pub fn for_input(data_path: PathBuf) -> Self {
        UserConfig {
            data_path,
            format: None,
            log_level: default_log_level(),
            report_path: None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            format: self.format,
            ..LoadOptions::default()
        }
    }
}
