//! OpenStreetMap data wrangling: stream an OSM XML export into five flat CSV
//! relations with cleaned address values, then load them into SQLite.

pub mod clean;
pub mod data;
pub mod errors;
pub mod etl;
pub mod reader;

use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::errors::Result;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_data_path() -> String {
    "idaho_sw.xml".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for UserConfig {
    fn default() -> UserConfig {
        UserConfig {
            data_path: default_data_path(),
            output_dir: default_output_dir(),
        }
    }
}

/// Reads the JSON config next to the binary's working directory. A missing
/// file is not an error; every field has a default.
pub fn load_user_config(path: &str) -> Result<UserConfig> {
    if !Path::new(path).try_exists()? {
        return Ok(UserConfig::default());
    }
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

pub fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let output_dir = PathBuf::from(&config.output_dir);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

pub fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}
