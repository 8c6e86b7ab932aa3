use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use gdal::raster::ResampleAlg;
use log::info;
use ndarray::Array3;

use crate::{
    components::{
        backends::gdal_backend::DataType,
        bounds::{GeoBounds, PixelWindow},
        formats::FormatHandler,
        transforms::GeoTransform,
    },
    crs_geo::Projection,
    errors::{GeoError, Result},
};

/// Raster file on disk with the metadata read when it was opened.
///
/// Pixel data is read on demand, the file is not kept open.
pub struct RasterDataset {
    path: PathBuf,
    handler: Arc<dyn FormatHandler>,
    projection: Projection,
    bounds: GeoBounds,
    transform: GeoTransform,
    size: (usize, usize),
    band_types: Vec<DataType>,
    nodata: Option<f64>,
}

impl RasterDataset {
    pub fn open(path: impl AsRef<Path>, handler: Arc<dyn FormatHandler>) -> Result<Self> {
        let path = path.as_ref();
        let source = handler.open_raster(path)?;
        let (width, height) = source.size();
        if width == 0 || height == 0 || source.band_count() == 0 {
            return Err(GeoError::Validation(format!(
                "raster has no pixels ({width}x{height}, {} bands)",
                source.band_count()
            )));
        }
        let projection = source.projection();
        let transform = source.transform();
        let extent = transform.extent(width, height);
        let bounds = GeoBounds::new(
            extent.min().x,
            extent.min().y,
            extent.max().x,
            extent.max().y,
            projection.clone(),
        );
        let raster = Self {
            path: path.to_path_buf(),
            handler,
            projection,
            bounds,
            transform,
            size: (width, height),
            band_types: source.band_types()?,
            nodata: source.nodata()?,
        };
        info!("new {raster:?}");
        Ok(raster)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn bounds(&self) -> &GeoBounds {
        &self.bounds
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn width(&self) -> usize {
        self.size.0
    }

    pub fn height(&self) -> usize {
        self.size.1
    }

    pub fn band_count(&self) -> usize {
        self.band_types.len()
    }

    pub fn band_types(&self) -> &[DataType] {
        &self.band_types
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn format(&self) -> &'static str {
        self.handler.name()
    }

    /// Reads `bands` (1-based, all when `None`) inside `window` (whole raster
    /// when `None`) as a (bands, rows, cols) array.
    pub fn read(
        &self,
        bands: Option<&[usize]>,
        window: Option<PixelWindow>,
    ) -> Result<Array3<f64>> {
        let all: Vec<usize> = (1..=self.band_count()).collect();
        let bands = bands.unwrap_or(&all);
        let window = window.unwrap_or(PixelWindow::full(self.width(), self.height()));
        self.handler.open_raster(&self.path)?.read(bands, window)
    }

    /// Every band read into `size` (width, height) pixels, resampled by GDAL.
    pub fn read_resampled(&self, size: (usize, usize), alg: ResampleAlg) -> Result<Array3<f64>> {
        self.handler.open_raster(&self.path)?.read_resampled(size, alg)
    }

    /// Whole raster with its metadata.
    pub fn read_grid(&self) -> Result<RasterGrid> {
        RasterGrid::new(
            self.read(None, None)?,
            self.transform,
            self.projection.clone(),
            self.nodata,
            self.band_types.first().copied().unwrap_or(DataType::Float64),
        )
    }
}

impl Debug for RasterDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterDataset")
            .field("path", &self.path)
            .field("format", &self.handler.name())
            .field("crs", &self.projection.canonical())
            .field("size", &self.size)
            .field("bands", &self.band_types.len())
            .field("nodata", &self.nodata)
            .finish()
    }
}

/// In memory raster: pixel values plus what is needed to write them out.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    /// (bands, rows, cols)
    pub data: Array3<f64>,
    pub transform: GeoTransform,
    pub projection: Projection,
    pub nodata: Option<f64>,
    /// Storage type of every band once written.
    pub data_type: DataType,
}

impl RasterGrid {
    pub fn new(
        data: Array3<f64>,
        transform: GeoTransform,
        projection: Projection,
        nodata: Option<f64>,
        data_type: DataType,
    ) -> Result<Self> {
        let (bands, rows, cols) = data.dim();
        if bands == 0 || rows == 0 || cols == 0 {
            return Err(GeoError::Validation(format!(
                "raster grid needs at least one pixel, got {bands}x{rows}x{cols}"
            )));
        }
        Ok(Self {
            data,
            transform,
            projection,
            nodata,
            data_type,
        })
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }
}

/// Whether `value` is the nodata `marker`, NaN markers matching NaN values.
pub fn is_nodata(value: f64, marker: Option<f64>) -> bool {
    match marker {
        Some(marker) if marker.is_nan() => value.is_nan(),
        Some(marker) => value == marker,
        None => false,
    }
}
