use std::{
    collections::HashMap,
    ffi::CStr,
    path::Path,
    ptr::{null, null_mut},
};

use geo::MultiPolygon;
use log::{debug, warn};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::{
    components::{
        bounds::PixelWindow,
        features::{AttributeValue, Feature, FeatureCollection, FieldDef, FieldType},
        raster::RasterGrid,
        transforms::GeoTransform,
    },
    crs_geo::Projection,
    errors::{GeoError, Result},
};

/// Implementations for gdal
pub mod gdal_backend {
    use super::*;
    use gdal::{
        raster::{rasterize, Buffer, GdalDataType, GdalType, ResampleAlg},
        vector::{FieldValue, LayerAccess, LayerOptions, OGRFieldType, ToGdal},
        Dataset as GdalDataset, Driver, DriverManager, Metadata as GdalMetadata,
    };
    use gdal_sys::{CPLErr, GDALResampleAlg};
    use num_traits::AsPrimitive;

    pub use gdal::raster::GdalDataType as DataType;

    /// Open GDAL raster together with the band selection and CRS fallback
    /// a format handler decided on.
    ///
    /// Lives for a single read; dropping it releases the file.
    #[derive(Debug)]
    pub struct RasterSource {
        dataset: GdalDataset,
        /// 1-based GDAL band indexes exposed as bands 1..=n.
        bands: Vec<usize>,
        fallback_crs: Option<Projection>,
    }

    impl RasterSource {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let dataset = GdalDataset::open(path.as_ref())?;
            let bands = (1..=dataset.raster_count()).collect();
            Ok(Self {
                dataset,
                bands,
                fallback_crs: None,
            })
        }

        /// Restrict the exposed bands to the given 1-based GDAL indexes.
        pub fn with_bands(mut self, bands: Vec<usize>) -> Self {
            self.bands = bands;
            self
        }

        /// CRS to report when the file declares none.
        pub fn with_fallback_crs(mut self, crs: Projection) -> Self {
            self.fallback_crs = Some(crs);
            self
        }

        pub fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
            self.dataset.metadata_item(key, domain)
        }

        /// (width, height)
        pub fn size(&self) -> (usize, usize) {
            self.dataset.raster_size()
        }

        pub fn band_count(&self) -> usize {
            self.bands.len()
        }

        pub fn projection(&self) -> Projection {
            match self.dataset.spatial_ref() {
                Ok(spatial_ref) => Projection::from_spatial_ref(&spatial_ref),
                Err(_) => self.fallback_crs.clone().unwrap_or_default(),
            }
        }

        /// Files without a geotransform get the identity transform.
        pub fn transform(&self) -> GeoTransform {
            self.dataset
                .geo_transform()
                .map(GeoTransform::from_gdal)
                .unwrap_or_default()
        }

        pub fn band_types(&self) -> Result<Vec<DataType>> {
            self.bands
                .iter()
                .map(|index| Ok(self.dataset.rasterband(*index)?.band_type()))
                .collect()
        }

        /// Nodata of the first exposed band.
        pub fn nodata(&self) -> Result<Option<f64>> {
            match self.bands.first() {
                Some(index) => Ok(self.dataset.rasterband(*index)?.no_data_value()),
                None => Ok(None),
            }
        }

        /// Reads `bands` (1-based, relative to the exposed bands) inside
        /// `window` as a (bands, rows, cols) array.
        pub fn read(&self, bands: &[usize], window: PixelWindow) -> Result<Array3<f64>> {
            let (width, height) = self.size();
            if !window.fits(width, height) {
                return Err(GeoError::Validation(format!(
                    "window {window:?} exceeds raster of {width}x{height}"
                )));
            }
            let indexes = self.gdal_indexes(bands)?;
            let array = read_bands(
                &self.dataset,
                &indexes,
                window,
                (window.width, window.height),
                None,
            )?;
            debug!("read {} band(s) in {window:?}", bands.len());
            Ok(array)
        }

        /// Reads every exposed band into a buffer of `size` (width, height),
        /// letting GDAL resample with `alg`.
        pub fn read_resampled(
            &self,
            size: (usize, usize),
            alg: ResampleAlg,
        ) -> Result<Array3<f64>> {
            let (width, height) = self.size();
            let array = read_bands(
                &self.dataset,
                &self.bands,
                PixelWindow::full(width, height),
                size,
                Some(alg),
            )?;
            debug!("read {} band(s) resampled to {size:?}", self.bands.len());
            Ok(array)
        }

        fn gdal_indexes(&self, bands: &[usize]) -> Result<Vec<usize>> {
            bands
                .iter()
                .map(|band| {
                    band.checked_sub(1)
                        .and_then(|index| self.bands.get(index))
                        .copied()
                        .ok_or_else(|| {
                            GeoError::Validation(format!(
                                "band {band} out of range 1..={}",
                                self.bands.len()
                            ))
                        })
                })
                .collect()
        }
    }

    /// Reads the GDAL `bands` of `dataset` inside `window` into a
    /// (bands, rows, cols) array of `size` (width, height).
    fn read_bands(
        dataset: &GdalDataset,
        bands: &[usize],
        window: PixelWindow,
        size: (usize, usize),
        alg: Option<ResampleAlg>,
    ) -> Result<Array3<f64>> {
        let (width, height) = size;
        let mut array = Array3::zeros((bands.len(), height, width));
        for (slot, band) in bands.iter().enumerate() {
            let buffer = dataset.rasterband(*band)?.read_as::<f64>(
                (window.col_off as isize, window.row_off as isize),
                (window.width, window.height),
                size,
                alg,
            )?;
            let plane = ArrayView2::from_shape((height, width), buffer.data())?;
            array.slice_mut(s![slot, .., ..]).assign(&plane);
        }
        Ok(array)
    }

    /// Warps `grid` onto `size` (width, height) pixels laid out by `transform`
    /// in `projection`. Pixels the source does not cover get `fill`.
    pub fn warp(
        grid: &RasterGrid,
        transform: GeoTransform,
        projection: &Projection,
        size: (usize, usize),
        fill: f64,
        alg: GDALResampleAlg::Type,
    ) -> Result<Array3<f64>> {
        let source = in_memory(grid)?;
        let target_grid = RasterGrid::new(
            Array3::from_elem((grid.band_count(), size.1, size.0), fill),
            transform,
            projection.clone(),
            Some(fill),
            DataType::Float64,
        )?;
        let target = in_memory(&target_grid)?;
        let rv = unsafe {
            gdal_sys::GDALReprojectImage(
                source.c_dataset(),
                null(),
                target.c_dataset(),
                null(),
                alg,
                0.0,
                0.0,
                None,
                null_mut(),
                null_mut(),
            )
        };
        if rv != CPLErr::CE_None {
            return Err(GeoError::Backend(format!(
                "GDALReprojectImage: {}",
                last_cpl_message()
            )));
        }
        let bands: Vec<usize> = (1..=grid.band_count()).collect();
        read_bands(&target, &bands, PixelWindow::full(size.0, size.1), size, None)
    }

    /// Pixels of a `size` (width, height) grid laid out by `transform` whose
    /// centre lies inside `mask`.
    pub fn rasterize_mask(
        mask: &MultiPolygon,
        transform: GeoTransform,
        size: (usize, usize),
    ) -> Result<Array2<bool>> {
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset = driver.create_with_band_type::<u8, _>("", size.0, size.1, 1)?;
        dataset.set_geo_transform(&transform.to_gdal())?;
        rasterize(&mut dataset, &[1], &[mask.to_gdal()?], &[1.], None)?;
        let burned = read_bands(&dataset, &[1], PixelWindow::full(size.0, size.1), size, None)?;
        Ok(burned.index_axis(Axis(0), 0).mapv(|value| value != 0.))
    }

    fn last_cpl_message() -> String {
        let message = unsafe { CStr::from_ptr(gdal_sys::CPLGetLastErrorMsg()) };
        message.to_string_lossy().into_owned()
    }

    /// Writes `grid` with every band stored as `data_type`.
    pub fn write_raster(
        path: &Path,
        driver: &str,
        grid: &RasterGrid,
        data_type: DataType,
    ) -> Result<()> {
        let driver = DriverManager::get_driver_by_name(driver)?;
        let mut dataset = match data_type {
            GdalDataType::UInt8 => create_filled::<u8>(&driver, path, grid),
            GdalDataType::UInt16 => create_filled::<u16>(&driver, path, grid),
            GdalDataType::Int16 => create_filled::<i16>(&driver, path, grid),
            GdalDataType::UInt32 => create_filled::<u32>(&driver, path, grid),
            GdalDataType::Int32 => create_filled::<i32>(&driver, path, grid),
            GdalDataType::Float32 => create_filled::<f32>(&driver, path, grid),
            _ => create_filled::<f64>(&driver, path, grid),
        }?;
        dataset.flush_cache()?;
        Ok(())
    }

    /// Float64 copy of `grid` held by the MEM driver.
    fn in_memory(grid: &RasterGrid) -> Result<GdalDataset> {
        let driver = DriverManager::get_driver_by_name("MEM")?;
        create_filled::<f64>(&driver, Path::new(""), grid)
    }

    fn create_filled<T>(driver: &Driver, path: &Path, grid: &RasterGrid) -> Result<GdalDataset>
    where
        T: GdalType + Copy + 'static,
        f64: AsPrimitive<T>,
    {
        let (band_count, height, width) = grid.data.dim();
        let mut dataset = driver.create_with_band_type::<T, _>(path, width, height, band_count)?;
        dataset.set_geo_transform(&grid.transform.to_gdal())?;
        if !grid.projection.is_unknown() {
            dataset.set_spatial_ref(&grid.projection.to_spatial_ref()?)?;
        }
        // integer bands round to nearest instead of truncating
        let integer = T::datatype().is_integer();
        for (index, plane) in grid.data.outer_iter().enumerate() {
            let mut band = dataset.rasterband(index + 1)?;
            if let Some(nodata) = grid.nodata {
                band.set_no_data_value(Some(nodata))?;
            }
            let data: Vec<T> = plane
                .iter()
                .map(|value| if integer { value.round().as_() } else { value.as_() })
                .collect();
            let mut buffer = Buffer::new((width, height), data);
            band.write((0, 0), (width, height), &mut buffer)?;
        }
        Ok(dataset)
    }

    /// First layer of a vector file.
    pub fn read_features(dataset: &GdalDataset) -> Result<FeatureCollection> {
        if dataset.layer_count() == 0 {
            return Err(GeoError::Validation("dataset has no vector layer".into()));
        }
        let mut layer = dataset.layer(0)?;
        let projection = layer
            .spatial_ref()
            .map(|spatial_ref| Projection::from_spatial_ref(&spatial_ref))
            .unwrap_or_default();
        let schema: Vec<FieldDef> = layer
            .defn()
            .fields()
            .map(|field| FieldDef::new(field.name(), field_type_from_ogr(field.field_type())))
            .collect();
        let mut features = Vec::new();
        for feature in layer.features() {
            let geometry = feature
                .geometry()
                .map(|geometry| geometry.to_geo())
                .transpose()?;
            let attributes: HashMap<String, AttributeValue> = feature
                .fields()
                .filter_map(|(name, value)| value.map(|value| (name, attribute_from_gdal(value))))
                .collect();
            features.push(Feature::new(geometry, attributes));
        }
        Ok(FeatureCollection::new(projection, schema, features))
    }

    pub fn write_features(path: &Path, driver: &str, collection: &FeatureCollection) -> Result<()> {
        let driver = DriverManager::get_driver_by_name(driver)?;
        let mut dataset = driver.create_vector_only(path)?;
        let spatial_ref = if collection.projection().is_unknown() {
            None
        } else {
            Some(collection.projection().to_spatial_ref()?)
        };
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "layer".to_string());
        let mut layer = dataset.create_layer(LayerOptions {
            name: &name,
            srs: spatial_ref.as_ref(),
            ..Default::default()
        })?;
        let fields: Vec<(&str, u32)> = collection
            .schema()
            .iter()
            .map(|field| (field.name.as_str(), field_type_to_ogr(field.field_type)))
            .collect();
        layer.create_defn_fields(&fields)?;
        // drivers may shorten or dedupe names, fields keep schema order
        let stored: Vec<String> = layer.defn().fields().map(|field| field.name()).collect();
        if stored.len() != fields.len() {
            return Err(GeoError::Backend(format!(
                "{} stored {} of {} fields",
                driver.short_name(),
                stored.len(),
                fields.len()
            )));
        }

        let mut skipped = 0;
        for feature in collection.features() {
            let Some(geometry) = &feature.geometry else {
                skipped += 1;
                continue;
            };
            let (names, values): (Vec<&str>, Vec<FieldValue>) = collection
                .schema()
                .iter()
                .zip(&stored)
                .filter_map(|(field, stored)| {
                    feature
                        .attributes
                        .get(&field.name)
                        .map(|value| (stored.as_str(), attribute_to_gdal(value)))
                })
                .unzip();
            layer.create_feature_fields(geometry.to_gdal()?, &names, &values)?;
        }
        if skipped > 0 {
            warn!("{skipped} feature(s) without geometry were not written to {path:?}");
        }
        Ok(())
    }

    fn field_type_from_ogr(field_type: u32) -> FieldType {
        match field_type {
            OGRFieldType::OFTInteger | OGRFieldType::OFTInteger64 => FieldType::Integer,
            OGRFieldType::OFTReal => FieldType::Real,
            _ => FieldType::Text,
        }
    }

    fn field_type_to_ogr(field_type: FieldType) -> u32 {
        match field_type {
            FieldType::Integer => OGRFieldType::OFTInteger64,
            FieldType::Real => OGRFieldType::OFTReal,
            FieldType::Boolean => OGRFieldType::OFTInteger,
            FieldType::Text => OGRFieldType::OFTString,
        }
    }

    fn attribute_from_gdal(value: FieldValue) -> AttributeValue {
        match value {
            FieldValue::IntegerValue(value) => AttributeValue::Integer(value.into()),
            FieldValue::Integer64Value(value) => AttributeValue::Integer(value),
            FieldValue::RealValue(value) => AttributeValue::Real(value),
            FieldValue::StringValue(value) => AttributeValue::Text(value),
            FieldValue::DateValue(value) => AttributeValue::Text(value.to_string()),
            FieldValue::DateTimeValue(value) => AttributeValue::Text(value.to_rfc3339()),
            other => AttributeValue::Text(format!("{other:?}")),
        }
    }

    fn attribute_to_gdal(value: &AttributeValue) -> FieldValue {
        match value {
            AttributeValue::Integer(value) => FieldValue::Integer64Value(*value),
            AttributeValue::Real(value) => FieldValue::RealValue(*value),
            AttributeValue::Boolean(value) => FieldValue::IntegerValue((*value).into()),
            AttributeValue::Text(value) => FieldValue::StringValue(value.clone()),
        }
    }

}
