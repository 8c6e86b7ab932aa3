use std::{path::Path, sync::Arc};

use geo::{BoundingRect, Coord, MultiPolygon};
use itertools::Itertools;
use log::{debug, info};
use ndarray::{s, Axis};

use crate::{
    components::{
        backends::gdal_backend, bounds::PixelWindow, raster::is_nodata, DataKind, DataType,
        FormatRegistry, GeoTransform, RasterDataset, RasterGrid,
    },
    config::ProcessingConfig,
    crs_geo::{CrsGeometry, Projection},
    errors::{GeoError, Result},
    processing::{
        classification::ClassificationRules,
        overlay::dissolve,
        warp::Resampling,
        wrap_processing,
    },
    validators::Validator,
};

/// Raster operations. Each call reads its inputs in full and writes one new file.
#[derive(Debug, Clone)]
pub struct RasterProcessor {
    registry: Arc<FormatRegistry>,
    config: ProcessingConfig,
}

impl RasterProcessor {
    pub fn new(registry: Arc<FormatRegistry>, config: ProcessingConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    fn validator(&self) -> Validator<'_> {
        Validator::new(&self.registry)
    }

    fn write(
        &self,
        output: &Path,
        inputs: &[&Path],
        grid: impl FnOnce() -> Result<RasterGrid>,
    ) -> Result<()> {
        let planned = self.registry.plan_output(output, DataKind::Raster)?;
        self.validator().validate_distinct_output(&planned, inputs)?;
        Validator::validate_output_path(planned.path(), self.config.overwrite)?;
        let grid = grid()?;
        planned.write_raster(&grid)?;
        Ok(())
    }

    /// Crops `raster` to the polygons of `boundary`, blanking pixels whose
    /// centre falls outside them.
    pub fn clip_with_vector(
        &self,
        raster: impl AsRef<Path>,
        boundary: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        let result = self.try_clip_with_vector(raster.as_ref(), boundary.as_ref(), output.as_ref());
        wrap_processing("raster clip", result, |error| {
            matches!(error, GeoError::Projection(_))
        })
    }

    fn try_clip_with_vector(&self, raster: &Path, boundary: &Path, output: &Path) -> Result<()> {
        let inputs = [raster, boundary];
        let raster = self.validator().validate_raster_file(raster)?;
        let boundary = self.validator().validate_vector_file(boundary)?;
        self.write(output, &inputs, || {
            let mask = CrsGeometry::new(boundary.projection().clone(), dissolve(boundary.read()?)?);
            let mask = mask.with_crs(raster.projection())?.into_inner();
            self.clip_to_mask(&raster, &mask)
        })
    }

    fn clip_to_mask(&self, raster: &RasterDataset, mask: &MultiPolygon) -> Result<RasterGrid> {
        let inverse = raster.transform().inverse()?;
        let extent = mask
            .bounding_rect()
            .ok_or_else(|| GeoError::Geometry("boundary has no extent".into()))?;
        let (min, max) = (extent.min(), extent.max());
        let pixels = [min, max, Coord { x: min.x, y: max.y }, Coord { x: max.x, y: min.y }]
            .map(|corner| inverse.world_to_pixel(corner));
        let (Some((min_x, max_x)), Some((min_y, max_y))) = (
            pixels.iter().map(|pixel| pixel.x).minmax().into_option(),
            pixels.iter().map(|pixel| pixel.y).minmax().into_option(),
        ) else {
            return Err(GeoError::Geometry("boundary has no extent".into()));
        };
        let window = PixelWindow::covering(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
            raster.width(),
            raster.height(),
        )
        .ok_or_else(|| GeoError::Geometry("boundary does not overlap the raster".into()))?;
        debug!("clipping to {window:?}");

        let transform = raster.transform().shifted(&window);
        let nodata = raster.nodata().unwrap_or(self.config.default_nodata);
        let mut data = raster.read(None, Some(window))?;
        let burned = gdal_backend::rasterize_mask(mask, transform, (window.width, window.height))?;
        let mut outside = 0;
        for ((row, col), inside) in burned.indexed_iter() {
            if !inside {
                data.slice_mut(s![.., row, col]).fill(nodata);
                outside += 1;
            }
        }
        info!("{outside} of {} pixels outside the boundary", window.size());
        RasterGrid::new(
            data,
            transform,
            raster.projection().clone(),
            Some(nodata),
            first_band_type(raster),
        )
    }

    /// Blanks pixels of `source` where `mask` holds nodata. Both rasters must
    /// share CRS and pixel grid.
    pub fn clip_with_raster(
        &self,
        source: impl AsRef<Path>,
        mask: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        let result = self.try_clip_with_raster(source.as_ref(), mask.as_ref(), output.as_ref());
        wrap_processing("raster mask", result, |error| {
            matches!(error, GeoError::Projection(_))
        })
    }

    fn try_clip_with_raster(&self, source: &Path, mask: &Path, output: &Path) -> Result<()> {
        let inputs = [source, mask];
        let source = self.validator().validate_raster_file(source)?;
        let mask = self.validator().validate_raster_file(mask)?;
        Validator::validate_crs_compatibility(source.projection(), mask.projection())?;
        let same_grid = (source.width(), source.height()) == (mask.width(), mask.height())
            && source.transform().approx_eq(&mask.transform(), 1e-9);
        if !same_grid {
            return Err(GeoError::Validation(format!(
                "mask grid {}x{} {:?} differs from source grid {}x{} {:?}",
                mask.width(),
                mask.height(),
                mask.transform().to_gdal(),
                source.width(),
                source.height(),
                source.transform().to_gdal()
            )));
        }
        self.write(output, &inputs, || {
            let mask_nodata = mask.nodata();
            let nodata = source.nodata().unwrap_or(self.config.default_nodata);
            let mask_band = mask.read(Some(&[1]), None)?;
            let mut data = source.read(None, None)?;
            let mut masked = 0;
            for ((row, col), value) in mask_band.index_axis(Axis(0), 0).indexed_iter() {
                if is_nodata(*value, mask_nodata) {
                    data.slice_mut(s![.., row, col]).fill(nodata);
                    masked += 1;
                }
            }
            info!("masked {masked} pixels");
            RasterGrid::new(
                data,
                source.transform(),
                source.projection().clone(),
                Some(nodata),
                first_band_type(&source),
            )
        })
    }

    /// Warps `input` onto a grid in `target_crs` covering its reprojected bounds.
    pub fn reproject(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        target_crs: &str,
        resampling: Resampling,
    ) -> Result<()> {
        let result = self.try_reproject(input.as_ref(), output.as_ref(), target_crs, resampling);
        wrap_processing("raster reprojection", result, |_| false)
    }

    fn try_reproject(
        &self,
        input: &Path,
        output: &Path,
        target_crs: &str,
        resampling: Resampling,
    ) -> Result<()> {
        let source = self.validator().validate_raster_file(input)?;
        let target = Projection::parse(target_crs);
        source.projection().require_known("input raster")?;
        target.to_spatial_ref()?;
        self.write(output, &[input], || {
            self.reproject_grid(&source, &target, resampling)
        })
    }

    fn reproject_grid(
        &self,
        source: &RasterDataset,
        target: &Projection,
        resampling: Resampling,
    ) -> Result<RasterGrid> {
        let bounds = source
            .bounds()
            .reprojected(target, self.config.densify_points)?;
        let source_diagonal = (source.width() as f64).hypot(source.height() as f64);
        let resolution = bounds.width().hypot(bounds.height()) / source_diagonal;
        let size = |extent: f64| ((extent / resolution).round() as usize).max(1);
        let (width, height) = (size(bounds.width()), size(bounds.height()));
        let transform = GeoTransform::north_up(
            bounds.min_x(),
            bounds.max_y(),
            bounds.width() / width as f64,
            bounds.height() / height as f64,
        );
        info!(
            "reprojecting {}x{} {} to {width}x{height} {target}",
            source.width(),
            source.height(),
            source.projection()
        );

        let nodata = source.nodata().unwrap_or(self.config.default_nodata);
        let data = gdal_backend::warp(
            &source.read_grid()?,
            transform,
            target,
            (width, height),
            nodata,
            resampling.warp_alg(),
        )?;
        RasterGrid::new(
            data,
            transform,
            target.clone(),
            Some(nodata),
            first_band_type(source),
        )
    }

    /// Changes the pixel count by `scale_factor` per axis, keeping the extent.
    pub fn resample(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        scale_factor: f64,
        resampling: Resampling,
    ) -> Result<()> {
        if !scale_factor.is_finite() || scale_factor <= 0. {
            return Err(GeoError::Validation(format!(
                "scale factor must be positive, got {scale_factor}"
            )));
        }
        let result = self.try_resample(input.as_ref(), output.as_ref(), scale_factor, resampling);
        wrap_processing("raster resampling", result, |error| {
            matches!(error, GeoError::Validation(_))
        })
    }

    fn try_resample(
        &self,
        input: &Path,
        output: &Path,
        scale_factor: f64,
        resampling: Resampling,
    ) -> Result<()> {
        let source = self.validator().validate_raster_file(input)?;
        let src_size = (source.width(), source.height());
        let scaled = |length: usize| (length as f64 * scale_factor).round() as usize;
        let dst_size = (scaled(src_size.0), scaled(src_size.1));
        if dst_size.0 == 0 || dst_size.1 == 0 {
            return Err(GeoError::Validation(format!(
                "scaling {src_size:?} by {scale_factor} leaves no pixels"
            )));
        }
        self.write(output, &[input], || {
            let nodata = source.nodata().unwrap_or(self.config.default_nodata);
            let data = source.read_resampled(dst_size, resampling.read_alg())?;
            info!("resampled {src_size:?} to {dst_size:?} with {resampling}");
            RasterGrid::new(
                data,
                source.transform().rescaled(src_size, dst_size),
                source.projection().clone(),
                Some(nodata),
                first_band_type(&source),
            )
        })
    }

    /// Maps band 1 through `rules` into an Int32 raster. Source nodata and
    /// values no rule covers become the configured sentinel.
    pub fn reclassify(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        rules: &ClassificationRules,
    ) -> Result<()> {
        rules.validate(self.config.reclassify_nodata)?;
        let result = self.try_reclassify(input.as_ref(), output.as_ref(), rules);
        wrap_processing("reclassification", result, |error| {
            matches!(error, GeoError::Validation(_))
        })
    }

    fn try_reclassify(
        &self,
        input: &Path,
        output: &Path,
        rules: &ClassificationRules,
    ) -> Result<()> {
        let sentinel = self.config.reclassify_nodata;
        let source = self.validator().validate_raster_file(input)?;
        self.write(output, &[input], || {
            let band = source.read(Some(&[1]), None)?;
            let source_nodata = source.nodata();
            let mut classified = 0usize;
            let values = band.index_axis(Axis(0), 0).mapv(|value| {
                if value.is_nan() || is_nodata(value, source_nodata) {
                    return sentinel;
                }
                match rules.classify(value) {
                    Some(class) => {
                        classified += 1;
                        class
                    }
                    None => sentinel,
                }
            });
            if classified == 0 {
                return Err(GeoError::Validation(
                    "no pixel matched any classification rule".into(),
                ));
            }
            info!("classified {classified} of {} pixels", values.len());
            RasterGrid::new(
                values.mapv(f64::from).insert_axis(Axis(0)),
                source.transform(),
                source.projection().clone(),
                Some(sentinel.into()),
                DataType::Int32,
            )
        })
    }
}

fn first_band_type(raster: &RasterDataset) -> DataType {
    raster
        .band_types()
        .first()
        .copied()
        .unwrap_or(DataType::Float64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{Feature, FeatureCollection, FieldDef},
        errors::ErrorKind,
        test_utils::{polygons, write_raster, write_vector, TestDir},
    };
    use approx::assert_abs_diff_eq;
    use geo::{Geometry, Point};
    use ndarray::{Array2, Array3};
    use rstest::{fixture, rstest};

    const ORIGIN: (f64, f64) = (500_000., 4_000_100.);

    #[fixture]
    fn processor() -> RasterProcessor {
        RasterProcessor::new(
            Arc::new(FormatRegistry::builtin().unwrap()),
            ProcessingConfig::default(),
        )
    }

    fn utm_grid() -> GeoTransform {
        GeoTransform::north_up(ORIGIN.0, ORIGIN.1, 10., 10.)
    }

    /// 10x10 raster holding `row * 10 + col`.
    fn ramp(dir: &TestDir, name: &str) -> std::path::PathBuf {
        write_raster(
            dir,
            name,
            Array2::from_shape_fn((10, 10), |(row, col)| (row * 10 + col) as f64),
            utm_grid(),
            Some(-1.),
        )
    }

    fn open(processor: &RasterProcessor, path: &Path) -> RasterDataset {
        processor.validator().validate_raster_file(path).unwrap()
    }

    fn utm_boundary(dir: &TestDir, squares: &[(f64, f64, f64)]) -> std::path::PathBuf {
        let lonlat = polygons(squares);
        let schema: Vec<FieldDef> = lonlat.schema().to_vec();
        let features = lonlat.into_features();
        let utm = FeatureCollection::new(Projection::from_epsg(32633), schema, features);
        write_vector(dir, "boundary.gpkg", utm)
    }

    #[test_log::test]
    fn reclassify_ranges() {
        let processor = processor();
        let dir = TestDir::new();
        let band = Array2::from_shape_fn((100, 100), |(row, col)| match row {
            0 => -1.,
            _ => (row + col) as f64 / 2.,
        });
        let input = write_raster(&dir, "values.tif", band, utm_grid(), Some(-1.));
        let output = dir.path("classes.tif");
        let rules = ClassificationRules::from(vec![(0., 50., 1), (51., 100., 2)]);
        processor.reclassify(&input, &output, &rules).unwrap();

        let classes = open(&processor, &output);
        assert_eq!(classes.band_types(), &[DataType::Int32]);
        assert_eq!(classes.nodata(), Some(-9999.));
        assert_eq!(classes.transform(), utm_grid());
        let data = classes.read_grid().unwrap().data;
        assert_eq!(data[[0, 0, 7]], -9999.);
        assert_eq!(data[[0, 10, 10]], 1.);
        assert_eq!(data[[0, 50, 50]], 1.);
        assert_eq!(data[[0, 50, 51]], -9999.);
        assert_eq!(data[[0, 60, 60]], 2.);
        assert_eq!(data[[0, 99, 99]], 2.);
    }

    fn int16_values(processor: &RasterProcessor, dir: &TestDir) -> std::path::PathBuf {
        let grid = RasterGrid::new(
            Array3::from_shape_fn((1, 20, 20), |(_, row, col)| {
                ((row * 20 + col) % 150) as f64 - 20.
            }),
            utm_grid(),
            Projection::from_epsg(32633),
            Some(-1.),
            DataType::Int16,
        )
        .unwrap();
        processor
            .registry
            .write_raster(&dir.path("int16.tif"), &grid)
            .unwrap()
    }

    #[rstest]
    fn reclassify_counts_pixels_in_range(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = int16_values(&processor, &dir);
        let output = dir.path("classes.tif");
        let rules = ClassificationRules::from(vec![(0., 50., 1), (51., 100., 2)]);
        processor.reclassify(&input, &output, &rules).unwrap();

        let source = open(&processor, &input);
        assert_eq!(source.band_types(), &[DataType::Int16]);
        let values = source.read_grid().unwrap().data;
        let in_range = values
            .iter()
            .filter(|value| (0. ..=100.).contains(*value))
            .count();
        let classes = open(&processor, &output).read_grid().unwrap().data;
        let classified = classes.iter().filter(|class| **class != -9999.).count();
        assert!(in_range > 0);
        assert_eq!(classified, in_range);
        assert!(classes.iter().all(|class| [1., 2., -9999.].contains(class)));
    }

    #[rstest]
    fn disjoint_rules_ignore_order(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = int16_values(&processor, &dir);
        let rules = vec![(0., 30., 1), (31., 60., 2), (61., 90., 3), (91., 120., 4)];
        let reversed: Vec<_> = rules.iter().rev().copied().collect();
        let (forward_path, reversed_path) = (dir.path("forward.tif"), dir.path("reversed.tif"));
        processor
            .reclassify(&input, &forward_path, &ClassificationRules::from(rules))
            .unwrap();
        processor
            .reclassify(&input, &reversed_path, &ClassificationRules::from(reversed))
            .unwrap();
        assert_eq!(
            open(&processor, &forward_path).read_grid().unwrap().data,
            open(&processor, &reversed_path).read_grid().unwrap().data
        );
    }

    #[rstest]
    fn input_as_output_is_rejected(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let before = open(&processor, &input).read_grid().unwrap();
        let error = processor
            .resample(&input, &input, 2., Resampling::Nearest)
            .unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::FileAccess);
        assert_eq!(open(&processor, &input).read_grid().unwrap(), before);
    }

    #[rstest]
    fn reclassify_overlap_takes_last_rule(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let output = dir.path("classes.tif");
        let rules = ClassificationRules::from(vec![(0., 60., 1), (40., 100., 2)]);
        processor.reclassify(&input, &output, &rules).unwrap();
        let data = open(&processor, &output).read_grid().unwrap().data;
        assert_eq!(data[[0, 3, 9]], 1.);
        assert_eq!(data[[0, 5, 0]], 2.);
    }

    #[rstest]
    fn reclassify_without_matches(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let output = dir.path("classes.tif");
        let rules = ClassificationRules::from(vec![(1000., 2000., 1)]);
        let error = processor.reclassify(&input, &output, &rules).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(!output.exists());
    }

    #[rstest]
    fn reclassify_rejects_bad_rules(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let rules = ClassificationRules::from(vec![(5., 1., 1)]);
        let error = processor
            .reclassify(&input, dir.path("classes.tif"), &rules)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[rstest]
    fn raster_mask_keeps_valid_pixels(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let mask = write_raster(
            &dir,
            "mask.tif",
            Array2::from_shape_fn((10, 10), |(_, col)| if col < 3 { 0. } else { 1. }),
            utm_grid(),
            Some(0.),
        );
        let output = dir.path("masked.tif");
        processor.clip_with_raster(&source, &mask, &output).unwrap();

        let masked = open(&processor, &output);
        assert_eq!(masked.nodata(), Some(-1.));
        let data = masked.read_grid().unwrap().data;
        assert_eq!(data[[0, 4, 2]], -1.);
        assert_eq!(data[[0, 4, 3]], 43.);
        assert_eq!(data.iter().filter(|value| **value == -1.).count(), 30);
    }

    #[rstest]
    fn full_raster_mask_is_identity(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let mask = write_raster(&dir, "mask.tif", Array2::ones((10, 10)), utm_grid(), Some(0.));
        let output = dir.path("masked.tif");
        processor.clip_with_raster(&source, &mask, &output).unwrap();
        assert_eq!(
            open(&processor, &output).read_grid().unwrap(),
            open(&processor, &source).read_grid().unwrap()
        );
    }

    #[rstest]
    fn raster_mask_on_other_grid(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let mask = write_raster(
            &dir,
            "mask.tif",
            Array2::ones((10, 10)),
            GeoTransform::north_up(ORIGIN.0 + 5., ORIGIN.1, 10., 10.),
            None,
        );
        let output = dir.path("masked.tif");
        let error = processor.clip_with_raster(&source, &mask, &output).unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::Validation);
        assert!(!output.exists());
    }

    #[rstest]
    fn raster_mask_in_other_crs(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let grid = RasterGrid::new(
            Array3::ones((1, 10, 10)),
            utm_grid(),
            Projection::from_epsg(32634),
            None,
            DataType::UInt8,
        )
        .unwrap();
        let mask = processor
            .registry
            .write_raster(&dir.path("mask.tif"), &grid)
            .unwrap();
        let error = processor
            .clip_with_raster(&source, &mask, dir.path("masked.tif"))
            .unwrap_err();
        assert!(matches!(error, GeoError::Projection(_)));
    }

    #[rstest]
    fn vector_clip_crops_to_boundary(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let boundary = utm_boundary(&dir, &[(ORIGIN.0, ORIGIN.1 - 100., 50.)]);
        let output = dir.path("clipped.tif");
        processor.clip_with_vector(&source, &boundary, &output).unwrap();

        let clipped = open(&processor, &output);
        assert_eq!((clipped.width(), clipped.height()), (5, 5));
        assert_eq!(clipped.bounds().min_x(), ORIGIN.0);
        assert_eq!(clipped.bounds().max_y(), ORIGIN.1 - 50.);
        let data = clipped.read_grid().unwrap().data;
        assert_eq!(data[[0, 0, 0]], 50.);
        assert_eq!(data[[0, 4, 4]], 94.);
    }

    #[rstest]
    fn vector_clip_blanks_outside_pixels(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let boundary = utm_boundary(
            &dir,
            &[
                (ORIGIN.0, ORIGIN.1 - 50., 50.),
                (ORIGIN.0 + 50., ORIGIN.1 - 100., 50.),
            ],
        );
        let output = dir.path("clipped.tif");
        processor.clip_with_vector(&source, &boundary, &output).unwrap();

        let data = open(&processor, &output).read_grid().unwrap().data;
        assert_eq!(data.dim(), (1, 10, 10));
        assert_eq!(data[[0, 0, 0]], 0.);
        assert_eq!(data[[0, 0, 9]], -1.);
        assert_eq!(data[[0, 9, 0]], -1.);
        assert_eq!(data[[0, 9, 9]], 99.);
        assert_eq!(data.iter().filter(|value| **value == -1.).count(), 50);
    }

    #[rstest]
    fn vector_clip_without_overlap(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let boundary = utm_boundary(&dir, &[(ORIGIN.0 + 1_000., ORIGIN.1, 50.)]);
        let output = dir.path("clipped.tif");
        let error = processor
            .clip_with_vector(&source, &boundary, &output)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Processing);
        assert_eq!(error.root().kind(), ErrorKind::Geometry);
        assert!(!output.exists());
    }

    #[rstest]
    fn vector_clip_rejects_points(processor: RasterProcessor) {
        let dir = TestDir::new();
        let source = ramp(&dir, "ramp.tif");
        let points = FeatureCollection::new(
            Projection::from_epsg(32633),
            vec![],
            vec![Feature::new(
                Some(Geometry::Point(Point::new(ORIGIN.0 + 25., ORIGIN.1 - 25.))),
                Default::default(),
            )],
        );
        let boundary = write_vector(&dir, "points.gpkg", points);
        let error = processor
            .clip_with_vector(&source, &boundary, dir.path("clipped.tif"))
            .unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::Geometry);
    }

    #[rstest]
    fn reprojection_round_trip(processor: RasterProcessor) {
        let dir = TestDir::new();
        let grid = RasterGrid::new(
            Array3::from_shape_fn((1, 10, 20), |(_, row, col)| (row + col) as f64),
            GeoTransform::north_up(10., 46., 0.1, 0.1),
            Projection::from_epsg(4326),
            Some(-1.),
            DataType::Float32,
        )
        .unwrap();
        let input = processor
            .registry
            .write_raster(&dir.path("lonlat.tif"), &grid)
            .unwrap();
        let mercator = dir.path("mercator.tif");
        let back = dir.path("back.tif");
        processor
            .reproject(&input, &mercator, "EPSG:3857", Resampling::Bilinear)
            .unwrap();
        let projected = open(&processor, &mercator);
        assert_eq!(projected.projection().canonical(), "EPSG:3857");
        assert_eq!(projected.band_types(), &[DataType::Float32]);
        assert_eq!(projected.nodata(), Some(-1.));
        assert!(projected.bounds().min_x() > 1_100_000.);

        processor
            .reproject(&mercator, &back, "EPSG:4326", Resampling::Nearest)
            .unwrap();
        let bounds = open(&processor, &back).bounds().clone();
        assert_abs_diff_eq!(bounds.min_x(), 10., epsilon = 0.1);
        assert_abs_diff_eq!(bounds.max_x(), 12., epsilon = 0.1);
        assert_abs_diff_eq!(bounds.min_y(), 45., epsilon = 0.1);
        assert_abs_diff_eq!(bounds.max_y(), 46., epsilon = 0.1);
    }

    #[rstest]
    fn reprojection_to_unknown_crs(processor: RasterProcessor) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let output = dir.path("out.tif");
        let error = processor
            .reproject(&input, &output, "EPSG:999999", Resampling::Nearest)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Processing);
        assert_eq!(error.root().kind(), ErrorKind::Projection);
        assert!(!output.exists());
    }

    #[rstest]
    #[case(0.5, (5, 5), 20.)]
    #[case(2., (20, 20), 5.)]
    #[case(0.25, (3, 3), 100. / 3.)]
    fn resample_scales_pixel_count(
        processor: RasterProcessor,
        #[case] scale: f64,
        #[case] size: (usize, usize),
        #[case] resolution: f64,
    ) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let output = dir.path("resampled.tif");
        processor
            .resample(&input, &output, scale, Resampling::Average)
            .unwrap();
        let resampled = open(&processor, &output);
        assert_eq!((resampled.width(), resampled.height()), size);
        assert_abs_diff_eq!(resampled.transform().resolution().0, resolution, epsilon = 1e-9);
        assert_abs_diff_eq!(resampled.bounds().max_x(), ORIGIN.0 + 100., epsilon = 1e-6);
        assert_abs_diff_eq!(resampled.bounds().min_y(), ORIGIN.1 - 100., epsilon = 1e-6);
    }

    #[rstest]
    #[case(0.)]
    #[case(-2.)]
    #[case(f64::NAN)]
    #[case(0.01)]
    fn resample_rejects_scale(processor: RasterProcessor, #[case] scale: f64) {
        let dir = TestDir::new();
        let input = ramp(&dir, "ramp.tif");
        let error = processor
            .resample(&input, dir.path("out.tif"), scale, Resampling::Nearest)
            .unwrap_err();
        assert!(matches!(error, GeoError::Validation(_)));
    }

    #[rstest]
    fn missing_input_leaves_no_output(processor: RasterProcessor) {
        let dir = TestDir::new();
        let output = dir.path("out.tif");
        let error = processor
            .resample(dir.path("missing.tif"), &output, 2., Resampling::Nearest)
            .unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::FileAccess);
        assert!(!output.exists());
    }
}
