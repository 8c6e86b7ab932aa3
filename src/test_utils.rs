use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use geo::{Geometry, Polygon, Rect};
use ndarray::{Array2, Axis};
use tempfile::TempDir;

use crate::{
    components::{
        AttributeValue, DataType, Feature, FeatureCollection, FieldDef, FieldType, FormatRegistry,
        GeoTransform, RasterGrid,
    },
    crs_geo::Projection,
};

/// Scratch directory removed when dropped.
pub struct TestDir(TempDir);

impl TestDir {
    pub fn new() -> Self {
        Self(TempDir::new().unwrap())
    }

    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.0.path().join(name)
    }
}

pub fn square(min_x: f64, min_y: f64, size: f64) -> Polygon {
    Rect::new((min_x, min_y), (min_x + size, min_y + size)).to_polygon()
}

/// EPSG:4326 squares with an `id` column numbering them from 0.
pub fn polygons(squares: &[(f64, f64, f64)]) -> FeatureCollection {
    let features = squares
        .iter()
        .enumerate()
        .map(|(id, &(x, y, size))| {
            Feature::new(
                Some(Geometry::Polygon(square(x, y, size))),
                HashMap::from([("id".to_string(), AttributeValue::Integer(id as i64))]),
            )
        })
        .collect();
    FeatureCollection::new(
        Projection::from_epsg(4326),
        vec![FieldDef::new("id", FieldType::Integer)],
        features,
    )
}

/// Single band Float32 raster in EPSG:32633.
pub fn write_raster(
    dir: &TestDir,
    name: &str,
    band: Array2<f64>,
    transform: GeoTransform,
    nodata: Option<f64>,
) -> PathBuf {
    let grid = RasterGrid::new(
        band.insert_axis(Axis(0)),
        transform,
        Projection::from_epsg(32633),
        nodata,
        DataType::Float32,
    )
    .unwrap();
    FormatRegistry::builtin()
        .unwrap()
        .write_raster(&dir.path(name), &grid)
        .unwrap()
}

pub fn write_vector(dir: &TestDir, name: &str, collection: FeatureCollection) -> PathBuf {
    FormatRegistry::builtin()
        .unwrap()
        .write_vector(&dir.path(name), &collection)
        .unwrap()
}
