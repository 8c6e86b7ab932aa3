use std::{path::Path, sync::Arc};

use log::info;

use crate::{
    components::{DataKind, FeatureCollection, FormatRegistry},
    config::ProcessingConfig,
    crs_geo::Projection,
    errors::Result,
    processing::{overlay, wrap_processing},
    validators::Validator,
};

/// Vector operations. Inputs are read in full, one new file is written per call.
#[derive(Debug, Clone)]
pub struct VectorProcessor {
    registry: Arc<FormatRegistry>,
    config: ProcessingConfig,
}

impl VectorProcessor {
    pub fn new(registry: Arc<FormatRegistry>, config: ProcessingConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    fn load(&self, path: &Path) -> Result<FeatureCollection> {
        let vector = Validator::new(&self.registry).validate_vector_file(path)?;
        Ok(vector.read()?.clone())
    }

    fn write(
        &self,
        output: &Path,
        inputs: &[&Path],
        features: impl FnOnce() -> Result<FeatureCollection>,
    ) -> Result<()> {
        let planned = self.registry.plan_output(output, DataKind::Vector)?;
        Validator::new(&self.registry).validate_distinct_output(&planned, inputs)?;
        Validator::validate_output_path(planned.path(), self.config.overwrite)?;
        let features = features()?;
        planned.write_vector(&features)?;
        Ok(())
    }

    fn binary(
        &self,
        operation: &'static str,
        first: &Path,
        second: &Path,
        output: &Path,
        overlay: impl FnOnce(&FeatureCollection, &FeatureCollection) -> Result<FeatureCollection>,
    ) -> Result<()> {
        let result = self.try_binary(operation, first, second, output, overlay);
        wrap_processing(operation, result, |_| false)
    }

    fn try_binary(
        &self,
        operation: &'static str,
        first: &Path,
        second: &Path,
        output: &Path,
        overlay: impl FnOnce(&FeatureCollection, &FeatureCollection) -> Result<FeatureCollection>,
    ) -> Result<()> {
        let inputs = [first, second];
        let first = self.load(first)?;
        let second = self.load(second)?;
        self.write(output, &inputs, || {
            let result = overlay(&first, &second)?;
            info!(
                "{operation}: {} x {} features gave {}",
                first.len(),
                second.len(),
                result.len()
            );
            Ok(result)
        })
    }

    /// Keeps the parts of `input` inside `boundary`.
    pub fn clip(
        &self,
        input: impl AsRef<Path>,
        boundary: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        self.binary(
            "vector clip",
            input.as_ref(),
            boundary.as_ref(),
            output.as_ref(),
            overlay::clip,
        )
    }

    pub fn reproject(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        target_crs: &str,
    ) -> Result<()> {
        let result = self.try_reproject(input.as_ref(), output.as_ref(), target_crs);
        wrap_processing("vector reprojection", result, |_| false)
    }

    fn try_reproject(&self, input: &Path, output: &Path, target_crs: &str) -> Result<()> {
        let features = self.load(input)?;
        let target = Projection::parse(target_crs);
        target.to_spatial_ref()?;
        self.write(output, &[input], || features.reprojected(&target))
    }

    /// Removes the area covered by `eraser` from `input`.
    pub fn erase(
        &self,
        input: impl AsRef<Path>,
        eraser: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        self.binary(
            "erase",
            input.as_ref(),
            eraser.as_ref(),
            output.as_ref(),
            overlay::difference,
        )
    }

    /// Concatenates all `inputs` into one table.
    pub fn union<P: AsRef<Path>>(&self, inputs: &[P], output: impl AsRef<Path>) -> Result<()> {
        let inputs: Vec<&Path> = inputs.iter().map(AsRef::as_ref).collect();
        let result = self.try_union(&inputs, output.as_ref());
        wrap_processing("union", result, |_| false)
    }

    fn try_union(&self, inputs: &[&Path], output: &Path) -> Result<()> {
        let collections = inputs
            .iter()
            .map(|input| self.load(input))
            .collect::<Result<Vec<_>>>()?;
        self.write(output, inputs, || overlay::union(&collections))
    }

    pub fn intersection(
        &self,
        first: impl AsRef<Path>,
        second: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        self.binary(
            "intersection",
            first.as_ref(),
            second.as_ref(),
            output.as_ref(),
            overlay::intersection,
        )
    }

    pub fn symmetric_difference(
        &self,
        first: impl AsRef<Path>,
        second: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        self.binary(
            "symmetric difference",
            first.as_ref(),
            second.as_ref(),
            output.as_ref(),
            overlay::symmetric_difference,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{AttributeValue, Feature, FieldDef, FieldType},
        errors::{ErrorKind, GeoError},
        test_utils::{polygons, write_vector, TestDir},
    };
    use approx::assert_abs_diff_eq;
    use geo::{Area, Geometry, Point, Rect};
    use rstest::{fixture, rstest};

    #[fixture]
    fn processor() -> VectorProcessor {
        VectorProcessor::new(
            Arc::new(FormatRegistry::builtin().unwrap()),
            ProcessingConfig::default(),
        )
    }

    fn area(collection: &FeatureCollection) -> f64 {
        collection.geometries().map(|geometry| geometry.unsigned_area()).sum()
    }

    /// Two overlapping 10x10 squares, the second shifted by (5, 5).
    fn overlapping(dir: &TestDir) -> (std::path::PathBuf, std::path::PathBuf) {
        (
            write_vector(dir, "a.geojson", polygons(&[(0., 0., 10.)])),
            write_vector(dir, "b.geojson", polygons(&[(5., 5., 10.)])),
        )
    }

    #[test_log::test]
    fn overlay_areas() {
        let processor = processor();
        let dir = TestDir::new();
        let (a, b) = overlapping(&dir);

        processor
            .intersection(&a, &b, dir.path("and.gpkg"))
            .unwrap();
        let intersection = processor.load(&dir.path("and.gpkg")).unwrap();
        assert_eq!(intersection.len(), 1);
        assert_abs_diff_eq!(area(&intersection), 25., epsilon = 1e-9);
        assert_eq!(
            intersection.bounds().unwrap().rect(),
            Rect::new((5., 5.), (10., 10.))
        );

        processor.erase(&a, &b, dir.path("minus.gpkg")).unwrap();
        let erased = processor.load(&dir.path("minus.gpkg")).unwrap();
        assert_abs_diff_eq!(area(&erased), 75., epsilon = 1e-9);

        processor
            .symmetric_difference(&a, &b, dir.path("xor.gpkg"))
            .unwrap();
        let xor = processor.load(&dir.path("xor.gpkg")).unwrap();
        assert_abs_diff_eq!(area(&xor), 150., epsilon = 1e-9);
        assert_abs_diff_eq!(area(&xor) + area(&intersection), 175., epsilon = 1e-9);

        processor.clip(&a, &b, dir.path("clip.gpkg")).unwrap();
        let clipped = processor.load(&dir.path("clip.gpkg")).unwrap();
        assert_abs_diff_eq!(area(&clipped), 25., epsilon = 1e-9);
    }

    #[rstest]
    fn union_keeps_every_feature(processor: VectorProcessor) {
        let dir = TestDir::new();
        let a = write_vector(&dir, "a.geojson", polygons(&[(0., 0., 1.), (2., 0., 1.)]));
        let b = write_vector(&dir, "b.gpkg", polygons(&[(0., 0., 1.)]));
        let c = write_vector(&dir, "c.shp", polygons(&[(4., 4., 1.)]));
        let output = dir.path("all.geojson");
        processor.union(&[a, b, c], &output).unwrap();
        assert_eq!(processor.load(&output).unwrap().len(), 4);
    }

    #[rstest]
    fn reprojection(processor: VectorProcessor) {
        let dir = TestDir::new();
        let input = write_vector(&dir, "lonlat.geojson", polygons(&[(10., 45., 1.)]));
        let output = dir.path("mercator.gpkg");
        processor.reproject(&input, &output, "EPSG:3857").unwrap();
        let projected = processor.load(&output).unwrap();
        assert_eq!(projected.projection().canonical(), "EPSG:3857");
        let bounds = projected.bounds().unwrap();
        assert_abs_diff_eq!(bounds.min_x(), 1_113_194.9, epsilon = 1.);
        assert!(bounds.min_y() > 5_000_000.);

        let error = processor
            .reproject(&input, dir.path("nowhere.gpkg"), "EPSG:999999")
            .unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::Projection);
    }

    #[rstest]
    fn kmz_output_written_as_kml(processor: VectorProcessor) {
        let dir = TestDir::new();
        let (a, b) = overlapping(&dir);
        processor
            .intersection(&a, &b, dir.path("and.kmz"))
            .unwrap();
        assert!(!dir.path("and.kmz").exists());
        assert_eq!(processor.load(&dir.path("and.kml")).unwrap().len(), 1);
    }

    #[rstest]
    fn empty_input_rejected(processor: VectorProcessor) {
        let dir = TestDir::new();
        let (a, _) = overlapping(&dir);
        let empty = write_vector(
            &dir,
            "empty.geojson",
            FeatureCollection::new(Projection::from_epsg(4326), vec![], vec![]),
        );
        let output = dir.path("out.geojson");
        let error = processor.clip(&a, &empty, &output).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Processing);
        assert!(matches!(error.root(), GeoError::EmptyDataset { .. }));
        assert!(!output.exists());
    }

    #[rstest]
    fn existing_output_kept_without_overwrite() {
        let processor = VectorProcessor::new(
            Arc::new(FormatRegistry::builtin().unwrap()),
            ProcessingConfig {
                overwrite: false,
                ..Default::default()
            },
        );
        let dir = TestDir::new();
        let (a, b) = overlapping(&dir);
        let output = dir.path("out.geojson");
        std::fs::write(&output, b"previous").unwrap();
        let error = processor.erase(&a, &b, &output).unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::FileAccess);
        assert_eq!(std::fs::read(&output).unwrap(), b"previous");
    }

    #[rstest]
    fn failed_overlay_leaves_no_output(processor: VectorProcessor) {
        let dir = TestDir::new();
        let (a, _) = overlapping(&dir);
        let points = FeatureCollection::new(
            Projection::from_epsg(4326),
            vec![],
            vec![Feature::new(
                Some(Geometry::Point(Point::new(1., 1.))),
                Default::default(),
            )],
        );
        let points = write_vector(&dir, "points.geojson", points);
        let output = dir.path("out.shp");
        let error = processor.intersection(&a, &points, &output).unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::Geometry);
        assert!(!output.exists());
        assert!(!dir.path("out.dbf").exists());
    }

    #[rstest]
    fn input_as_output_is_rejected(processor: VectorProcessor) {
        let dir = TestDir::new();
        let a = write_vector(&dir, "a.shp", polygons(&[(0., 0., 10.)]));
        let b = write_vector(&dir, "b.shp", polygons(&[(5., 5., 10.)]));
        let error = processor.erase(&a, &b, &a).unwrap_err();
        assert_eq!(error.root().kind(), ErrorKind::FileAccess);
        for sidecar in ["a.shp", "a.shx", "a.dbf"] {
            assert!(dir.path(sidecar).exists(), "{sidecar} was removed");
        }
        assert_eq!(processor.load(&a).unwrap().len(), 1);
        assert_abs_diff_eq!(area(&processor.load(&a).unwrap()), 100., epsilon = 1e-9);
    }

    fn with_population(squares: &[(f64, f64, f64)], population: i64) -> FeatureCollection {
        let base = polygons(squares);
        let mut schema = base.schema().to_vec();
        schema.push(FieldDef::new("population", FieldType::Integer));
        let features = base
            .into_features()
            .into_iter()
            .map(|mut feature| {
                let value = AttributeValue::Integer(population);
                feature.attributes.insert("population".into(), value);
                feature
            })
            .collect();
        FeatureCollection::new(Projection::from_epsg(4326), schema, features)
    }

    #[rstest]
    fn shared_long_columns_in_shapefile(processor: VectorProcessor) {
        let dir = TestDir::new();
        let a = write_vector(&dir, "a.geojson", with_population(&[(0., 0., 10.)], 100));
        let b = write_vector(&dir, "b.geojson", with_population(&[(5., 5., 10.)], 200));
        let output = dir.path("and.shp");
        processor.intersection(&a, &b, &output).unwrap();

        let result = processor.load(&output).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.schema().len(), 4);
        let values: Vec<&AttributeValue> = result.features()[0].attributes.values().collect();
        assert!(values.contains(&&AttributeValue::Integer(100)));
        assert!(values.contains(&&AttributeValue::Integer(200)));
    }
}
