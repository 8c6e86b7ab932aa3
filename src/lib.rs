//! Loading, validating and transforming geospatial raster and vector files.
//!
//! Files are opened through a [FormatRegistry] that maps extensions to
//! [FormatHandler]s. [RasterProcessor] and [VectorProcessor] read validated
//! inputs, compute in memory and write exactly one new output file per call.

pub mod components;
pub mod config;
mod crs_geo;
mod errors;
pub mod processing;
#[cfg(test)]
mod test_utils;
pub mod validators;

pub use components::{
    detect_type, validate_file_access, AttributeValue, DataKind, DataType, DatasetInfo, Feature,
    FeatureCollection, FieldDef, FieldType, FormatHandler, FormatRegistry, GeoBounds, GeoDataset,
    GeoTransform, GeometryType, PixelWindow, PlannedOutput, RasterDataset, RasterGrid,
    VectorDataset,
};
pub use config::ProcessingConfig;
pub use crs_geo::{AuthorityCode, CrsGeometry, Projection};
pub use errors::{ErrorKind, GeoError, Result};
pub use processing::{
    ClassificationRule, ClassificationRules, RasterProcessor, Resampling, VectorProcessor,
};
pub use validators::Validator;
