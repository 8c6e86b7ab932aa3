use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Tunables shared by the processors. Missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Fill value for rasters that declare no nodata of their own.
    pub default_nodata: f64,
    /// Nodata written by reclassification, never a valid class.
    pub reclassify_nodata: i32,
    /// Points sampled along each edge when reprojecting bounds.
    pub densify_points: usize,
    /// Whether existing outputs may be replaced.
    pub overwrite: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_nodata: 0.,
            reclassify_nodata: -9999,
            densify_points: 21,
            overwrite: true,
        }
    }
}

impl ProcessingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
