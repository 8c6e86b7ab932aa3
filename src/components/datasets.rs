use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use geo::Area;
use serde::Serialize;

use crate::{
    components::{
        bounds::GeoBounds, features::GeometryType, formats::FormatRegistry, raster::RasterDataset,
        vector::VectorDataset,
    },
    crs_geo::Projection,
    errors::{GeoError, Result},
};

const RASTER_EXTENSIONS: [&str; 10] = [
    "tif", "tiff", "img", "jpg", "jpeg", "png", "bmp", "nc", "cdf", "netcdf",
];
const VECTOR_EXTENSIONS: [&str; 7] = ["shp", "kml", "geojson", "gpkg", "gml", "json", "kmz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Raster,
    Vector,
}

impl Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raster => f.write_str("raster"),
            Self::Vector => f.write_str("vector"),
        }
    }
}

/// Lowercase extension of `path` without the dot.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
}

/// Raster or vector, judged by extension alone.
pub fn detect_type(path: impl AsRef<Path>) -> Result<DataKind> {
    let extension = extension_of(path.as_ref()).unwrap_or_default();
    if RASTER_EXTENSIONS.contains(&extension.as_str()) {
        Ok(DataKind::Raster)
    } else if VECTOR_EXTENSIONS.contains(&extension.as_str()) {
        Ok(DataKind::Vector)
    } else {
        Err(GeoError::UnsupportedFormat(format!(".{extension}")))
    }
}

/// Existing regular file that can be opened for reading.
pub fn validate_file_access(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(GeoError::file_access(path, "file not found"));
    }
    if !path.is_file() {
        return Err(GeoError::file_access(path, "not a file"));
    }
    std::fs::File::open(path).map_err(|error| GeoError::file_access(path, error))?;
    Ok(())
}

#[derive(Debug)]
pub enum GeoDataset {
    Raster(RasterDataset),
    Vector(VectorDataset),
}

impl GeoDataset {
    /// Opens `path` with the handler `registry` has for its extension.
    ///
    /// Access problems are reported as is, anything going wrong while reading
    /// metadata is wrapped in [GeoError::DataFormat].
    pub fn load(path: impl AsRef<Path>, registry: &FormatRegistry) -> Result<Self> {
        let path = path.as_ref();
        validate_file_access(path)?;
        let kind = detect_type(path)?;
        let handler = registry.get_handler(path)?;
        if handler.kind() != kind {
            return Err(GeoError::data_format(
                path,
                GeoError::UnsupportedFormat(format!(
                    "{} handler cannot read {kind} data",
                    handler.name()
                )),
            ));
        }
        let dataset = match kind {
            DataKind::Raster => RasterDataset::open(path, handler).map(Self::Raster),
            DataKind::Vector => VectorDataset::open(path, handler).map(Self::Vector),
        };
        dataset.map_err(|error| GeoError::data_format(path, error))
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Self::Raster(_) => DataKind::Raster,
            Self::Vector(_) => DataKind::Vector,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Raster(raster) => raster.path(),
            Self::Vector(vector) => vector.path(),
        }
    }

    pub fn projection(&self) -> &Projection {
        match self {
            Self::Raster(raster) => raster.projection(),
            Self::Vector(vector) => vector.projection(),
        }
    }

    /// `None` for vector data without geometries.
    pub fn bounds(&self) -> Option<&GeoBounds> {
        match self {
            Self::Raster(raster) => Some(raster.bounds()),
            Self::Vector(vector) => vector.bounds(),
        }
    }

    pub fn into_raster(self) -> Result<RasterDataset> {
        match self {
            Self::Raster(raster) => Ok(raster),
            Self::Vector(vector) => Err(GeoError::Validation(format!(
                "{:?} is vector data, a raster is required",
                vector.path()
            ))),
        }
    }

    pub fn into_vector(self) -> Result<VectorDataset> {
        match self {
            Self::Vector(vector) => Ok(vector),
            Self::Raster(raster) => Err(GeoError::Validation(format!(
                "{:?} is raster data, a vector is required",
                raster.path()
            ))),
        }
    }

    /// Summary of the dataset for display.
    pub fn info(&self) -> Result<DatasetInfo> {
        let bounds = self
            .bounds()
            .map(|bounds| [bounds.min_x(), bounds.min_y(), bounds.max_x(), bounds.max_y()]);
        let crs = self.projection().canonical();
        Ok(match self {
            Self::Raster(raster) => DatasetInfo::Raster {
                path: raster.path().to_path_buf(),
                format: raster.format(),
                width: raster.width(),
                height: raster.height(),
                bands: raster.band_count(),
                data_type: raster
                    .band_types()
                    .first()
                    .map(|data_type| data_type.name())
                    .unwrap_or_default(),
                crs,
                transform: raster.transform().to_gdal(),
                bounds,
                nodata: raster.nodata(),
            },
            Self::Vector(vector) => {
                let features = vector.read()?;
                DatasetInfo::Vector {
                    path: vector.path().to_path_buf(),
                    format: vector.format(),
                    feature_count: vector.feature_count(),
                    geometry_type: vector.geometry_type(),
                    crs,
                    bounds,
                    columns: features
                        .schema()
                        .iter()
                        .map(|field| field.name.clone())
                        .collect(),
                    area: features
                        .geometries()
                        .map(|geometry| geometry.unsigned_area())
                        .sum(),
                }
            }
        })
    }
}

/// Serializable summary of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatasetInfo {
    Raster {
        path: PathBuf,
        format: &'static str,
        width: usize,
        height: usize,
        bands: usize,
        data_type: String,
        crs: String,
        /// GDAL ordering.
        transform: [f64; 6],
        bounds: Option<[f64; 4]>,
        nodata: Option<f64>,
    },
    Vector {
        path: PathBuf,
        format: &'static str,
        feature_count: usize,
        geometry_type: Option<GeometryType>,
        crs: String,
        bounds: Option<[f64; 4]>,
        columns: Vec<String>,
        /// Planar area in CRS units.
        area: f64,
    },
}
