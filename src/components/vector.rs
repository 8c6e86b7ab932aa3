use std::{
    cell::OnceCell,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};

use crate::{
    components::{
        bounds::GeoBounds,
        features::{FeatureCollection, GeometryType},
        formats::FormatHandler,
    },
    crs_geo::Projection,
    errors::Result,
};

/// Vector file on disk.
///
/// Metadata comes from one scan of the features at open time, the feature
/// table itself is loaded on first [VectorDataset::read] and kept.
pub struct VectorDataset {
    path: PathBuf,
    handler: Arc<dyn FormatHandler>,
    projection: Projection,
    bounds: Option<GeoBounds>,
    geometry_type: Option<GeometryType>,
    feature_count: usize,
    features: OnceCell<FeatureCollection>,
}

impl VectorDataset {
    pub fn open(path: impl AsRef<Path>, handler: Arc<dyn FormatHandler>) -> Result<Self> {
        let path = path.as_ref();
        let collection = handler.read_vector(path)?;
        let vector = Self {
            path: path.to_path_buf(),
            handler,
            projection: collection.projection().clone(),
            bounds: collection.bounds(),
            geometry_type: collection.dominant_geometry_type(),
            feature_count: collection.len(),
            features: OnceCell::new(),
        };
        info!("new {vector:?}");
        Ok(vector)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// `None` when no feature has a geometry.
    pub fn bounds(&self) -> Option<&GeoBounds> {
        self.bounds.as_ref()
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry_type
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn is_empty(&self) -> bool {
        self.feature_count == 0
    }

    pub fn format(&self) -> &'static str {
        self.handler.name()
    }

    pub fn read(&self) -> Result<&FeatureCollection> {
        if let Some(features) = self.features.get() {
            return Ok(features);
        }
        let features = self.handler.read_vector(&self.path)?;
        debug!("cached {} features of {:?}", features.len(), self.path);
        Ok(self.features.get_or_init(|| features))
    }
}

impl Debug for VectorDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDataset")
            .field("path", &self.path)
            .field("format", &self.handler.name())
            .field("crs", &self.projection.canonical())
            .field("geometry_type", &self.geometry_type)
            .field("features", &self.feature_count)
            .finish()
    }
}
