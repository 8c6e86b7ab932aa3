use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{info, warn};

use crate::{
    components::{
        backends::gdal_backend::{self, DataType, RasterSource},
        datasets::{extension_of, DataKind},
        features::FeatureCollection,
        output::{OutputGuard, WriteTarget},
        raster::RasterGrid,
    },
    crs_geo::Projection,
    errors::{GeoError, Result},
};

/// Reader / writer pair for one family of file extensions.
pub trait FormatHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> DataKind;

    /// Lowercase extensions without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    fn open_raster(&self, _path: &Path) -> Result<RasterSource> {
        Err(GeoError::UnsupportedFormat(format!(
            "{} holds no raster data",
            self.name()
        )))
    }

    fn read_vector(&self, _path: &Path) -> Result<FeatureCollection> {
        Err(GeoError::UnsupportedFormat(format!(
            "{} holds no vector data",
            self.name()
        )))
    }

    /// File and driver an output requested at `path` ends up in.
    fn write_target(&self, path: &Path) -> Result<WriteTarget>;

    fn write_raster(&self, target: &WriteTarget, grid: &RasterGrid) -> Result<()> {
        gdal_backend::write_raster(&target.path, target.driver, grid, grid.data_type)
    }

    fn write_vector(&self, target: &WriteTarget, collection: &FeatureCollection) -> Result<()> {
        gdal_backend::write_features(&target.path, target.driver, collection)
    }
}

impl Debug for dyn FormatHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.name(), self.extensions())
    }
}

/// Raster format read and written by a single GDAL driver.
#[derive(Debug, Clone)]
pub struct GdalRasterFormat {
    name: &'static str,
    extensions: &'static [&'static str],
    driver: &'static str,
}

impl GdalRasterFormat {
    pub const GEOTIFF: Self = Self {
        name: "GeoTIFF",
        extensions: &["tif", "tiff"],
        driver: "GTiff",
    };

    pub const ERDAS: Self = Self {
        name: "Erdas Imagine",
        extensions: &["img"],
        driver: "HFA",
    };
}

impl FormatHandler for GdalRasterFormat {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> DataKind {
        DataKind::Raster
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn open_raster(&self, path: &Path) -> Result<RasterSource> {
        RasterSource::open(path)
    }

    fn write_target(&self, path: &Path) -> Result<WriteTarget> {
        Ok(WriteTarget::new(path, self.driver))
    }
}

/// Plain images. Only BMP can be written, always as 8 bit.
#[derive(Debug, Clone, Default)]
pub struct ImageFormat;

impl FormatHandler for ImageFormat {
    fn name(&self) -> &'static str {
        "Image"
    }

    fn kind(&self) -> DataKind {
        DataKind::Raster
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["jpg", "jpeg", "png", "bmp"]
    }

    fn open_raster(&self, path: &Path) -> Result<RasterSource> {
        RasterSource::open(path)
    }

    fn write_target(&self, path: &Path) -> Result<WriteTarget> {
        match extension_of(path).as_deref() {
            Some("bmp") => Ok(WriteTarget::new(path, "BMP")),
            other => Err(GeoError::UnsupportedFormat(format!(
                "writing .{} images is not supported",
                other.unwrap_or_default()
            ))),
        }
    }

    fn write_raster(&self, target: &WriteTarget, grid: &RasterGrid) -> Result<()> {
        gdal_backend::write_raster(&target.path, target.driver, grid, DataType::UInt8)
    }
}

/// NetCDF, reduced to its first variable and first time step.
#[derive(Debug, Clone, Default)]
pub struct NetCdfFormat;

impl NetCdfFormat {
    fn first_time_step(source: RasterSource) -> RasterSource {
        let has_time = source
            .metadata_item("NETCDF_DIM_EXTRA", "")
            .is_some_and(|extra| extra.contains("time"));
        let source = if has_time && source.band_count() > 1 {
            source.with_bands(vec![1])
        } else {
            source
        };
        source.with_fallback_crs(Projection::from_epsg(4326))
    }
}

impl FormatHandler for NetCdfFormat {
    fn name(&self) -> &'static str {
        "NetCDF"
    }

    fn kind(&self) -> DataKind {
        DataKind::Raster
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["nc", "cdf", "netcdf"]
    }

    fn open_raster(&self, path: &Path) -> Result<RasterSource> {
        let source = RasterSource::open(path)?;
        match source.metadata_item("SUBDATASET_1_NAME", "SUBDATASETS") {
            Some(variable) => {
                info!("using first variable {variable}");
                Ok(Self::first_time_step(RasterSource::open(variable)?))
            }
            None => Ok(Self::first_time_step(source)),
        }
    }

    fn write_target(&self, path: &Path) -> Result<WriteTarget> {
        Ok(WriteTarget::new(path, "netCDF"))
    }
}

/// Vector format read and written by a single GDAL driver.
#[derive(Debug, Clone)]
pub struct GdalVectorFormat {
    name: &'static str,
    extensions: &'static [&'static str],
    driver: &'static str,
    sidecars: &'static [&'static str],
}

impl GdalVectorFormat {
    pub const SHAPEFILE: Self = Self {
        name: "Shapefile",
        extensions: &["shp"],
        driver: "ESRI Shapefile",
        sidecars: &["shx", "dbf", "prj", "cpg"],
    };

    pub const GEOJSON: Self = Self {
        name: "GeoJSON",
        extensions: &["geojson", "json"],
        driver: "GeoJSON",
        sidecars: &[],
    };

    pub const KML: Self = Self {
        name: "KML",
        extensions: &["kml"],
        driver: "KML",
        sidecars: &[],
    };

    pub const GEOPACKAGE: Self = Self {
        name: "GeoPackage",
        extensions: &["gpkg"],
        driver: "GPKG",
        sidecars: &[],
    };

    pub const GML: Self = Self {
        name: "GML",
        extensions: &["gml"],
        driver: "GML",
        sidecars: &["xsd"],
    };
}

impl FormatHandler for GdalVectorFormat {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> DataKind {
        DataKind::Vector
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn read_vector(&self, path: &Path) -> Result<FeatureCollection> {
        gdal_backend::read_features(&gdal::Dataset::open(path)?)
    }

    fn write_target(&self, path: &Path) -> Result<WriteTarget> {
        Ok(WriteTarget::new(path, self.driver).with_sidecars(self.sidecars))
    }
}

/// Zipped KML. Written as plain KML next to the requested path.
#[derive(Debug, Clone, Default)]
pub struct KmzFormat;

impl KmzFormat {
    const DOCUMENT: &'static str = "doc.kml";
}

impl FormatHandler for KmzFormat {
    fn name(&self) -> &'static str {
        "KMZ"
    }

    fn kind(&self) -> DataKind {
        DataKind::Vector
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["kmz"]
    }

    fn read_vector(&self, path: &Path) -> Result<FeatureCollection> {
        let inner = format!("/vsizip/{}/{}", path.display(), Self::DOCUMENT);
        gdal_backend::read_features(&gdal::Dataset::open(inner)?)
    }

    fn write_target(&self, path: &Path) -> Result<WriteTarget> {
        let kml = path.with_extension("kml");
        warn!("writing KMZ is not supported, saving {path:?} as {kml:?}");
        Ok(WriteTarget::new(kml, "KML"))
    }
}

/// Output file resolved through the registry, ready to be written once.
#[derive(Debug)]
pub struct PlannedOutput {
    handler: Arc<dyn FormatHandler>,
    target: WriteTarget,
}

impl PlannedOutput {
    pub fn path(&self) -> &Path {
        &self.target.path
    }

    pub fn format(&self) -> &'static str {
        self.handler.name()
    }

    /// Every file the write replaces.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.target.files()
    }

    /// Replaces whatever exists at the target. Nothing is left behind on error.
    pub fn write_raster(self, grid: &RasterGrid) -> Result<PathBuf> {
        let guard = OutputGuard::prepare(&self.target)?;
        self.handler.write_raster(&self.target, grid)?;
        guard.commit();
        info!("wrote {} raster {:?}", self.handler.name(), self.target.path);
        Ok(self.target.path)
    }

    pub fn write_vector(self, collection: &FeatureCollection) -> Result<PathBuf> {
        let guard = OutputGuard::prepare(&self.target)?;
        self.handler.write_vector(&self.target, collection)?;
        guard.commit();
        info!(
            "wrote {} features to {} {:?}",
            collection.len(),
            self.handler.name(),
            self.target.path
        );
        Ok(self.target.path)
    }
}

/// Handlers keyed by file extension.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    handlers: Vec<Arc<dyn FormatHandler>>,
    by_extension: HashMap<String, usize>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(GdalRasterFormat::GEOTIFF)?;
        registry.register(GdalRasterFormat::ERDAS)?;
        registry.register(ImageFormat)?;
        registry.register(NetCdfFormat)?;
        registry.register(GdalVectorFormat::SHAPEFILE)?;
        registry.register(GdalVectorFormat::GEOJSON)?;
        registry.register(GdalVectorFormat::KML)?;
        registry.register(KmzFormat)?;
        registry.register(GdalVectorFormat::GEOPACKAGE)?;
        registry.register(GdalVectorFormat::GML)?;
        Ok(registry)
    }

    /// Fails without registering anything when an extension is already claimed.
    pub fn register(&mut self, handler: impl FormatHandler + 'static) -> Result<()> {
        let extensions: Vec<String> = handler
            .extensions()
            .iter()
            .map(|extension| extension.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        for extension in &extensions {
            if let Some(index) = self.by_extension.get(extension) {
                return Err(GeoError::Configuration(format!(
                    ".{extension} is claimed by both {} and {}",
                    self.handlers[*index].name(),
                    handler.name()
                )));
            }
        }
        let index = self.handlers.len();
        self.handlers.push(Arc::new(handler));
        self.by_extension
            .extend(extensions.into_iter().map(|extension| (extension, index)));
        Ok(())
    }

    pub fn get_handler(&self, path: &Path) -> Result<Arc<dyn FormatHandler>> {
        extension_of(path)
            .and_then(|extension| self.by_extension.get(&extension))
            .map(|index| self.handlers[*index].clone())
            .ok_or_else(|| GeoError::NoHandler(path.display().to_string()))
    }

    /// Registered extensions of `kind`, in registration order.
    pub fn supported_extensions(&self, kind: DataKind) -> Vec<&'static str> {
        self.handlers
            .iter()
            .filter(|handler| handler.kind() == kind)
            .flat_map(|handler| handler.extensions().iter().copied())
            .collect()
    }

    /// Resolves the handler and target file for an output of `kind` at `path`.
    pub fn plan_output(&self, path: &Path, kind: DataKind) -> Result<PlannedOutput> {
        let handler = self.get_handler(path)?;
        if handler.kind() != kind {
            return Err(GeoError::UnsupportedFormat(format!(
                "{} cannot hold {kind} output",
                handler.name()
            )));
        }
        let target = handler.write_target(path)?;
        Ok(PlannedOutput { handler, target })
    }

    pub fn write_raster(&self, path: &Path, grid: &RasterGrid) -> Result<PathBuf> {
        self.plan_output(path, DataKind::Raster)?.write_raster(grid)
    }

    pub fn write_vector(&self, path: &Path, collection: &FeatureCollection) -> Result<PathBuf> {
        self.plan_output(path, DataKind::Vector)?
            .write_vector(collection)
    }
}
