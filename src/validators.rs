use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    components::{GeoDataset, FormatRegistry, PlannedOutput, RasterDataset, VectorDataset},
    crs_geo::Projection,
    errors::{GeoError, Result},
};

/// Up front checks run before any expensive processing.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    registry: &'a FormatRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a FormatRegistry) -> Self {
        Self { registry }
    }

    /// Loads `path`, which must be a raster.
    pub fn validate_raster_file(&self, path: impl AsRef<Path>) -> Result<RasterDataset> {
        GeoDataset::load(path, self.registry)?.into_raster()
    }

    /// Loads `path`, which must be a vector with at least one geometry.
    pub fn validate_vector_file(&self, path: impl AsRef<Path>) -> Result<VectorDataset> {
        let path = path.as_ref();
        let vector = GeoDataset::load(path, self.registry)?.into_vector()?;
        if vector.is_empty() {
            return Err(GeoError::EmptyDataset {
                path: path.to_path_buf(),
            });
        }
        if vector.bounds().is_none() {
            return Err(GeoError::data_format(
                path,
                GeoError::Validation("no feature has a geometry".into()),
            ));
        }
        Ok(vector)
    }

    /// Both projections known and equal.
    pub fn validate_crs_compatibility(first: &Projection, second: &Projection) -> Result<()> {
        first.require_known("first dataset")?;
        second.require_known("second dataset")?;
        if first != second {
            return Err(GeoError::Projection(format!(
                "CRS mismatch: {first} and {second}"
            )));
        }
        Ok(())
    }

    /// Rejects an output that would replace one of `inputs` or a sidecar of one.
    pub fn validate_distinct_output(&self, output: &PlannedOutput, inputs: &[&Path]) -> Result<()> {
        let written: Vec<PathBuf> = output
            .files()
            .filter_map(|file| file.canonicalize().ok())
            .collect();
        if written.is_empty() {
            return Ok(());
        }
        for input in inputs {
            let sidecars = self
                .registry
                .get_handler(input)
                .and_then(|handler| handler.write_target(input))
                .map(|target| target.sidecars)
                .unwrap_or_default();
            let family = std::iter::once(input.to_path_buf()).chain(sidecars);
            for file in family.filter_map(|file| file.canonicalize().ok()) {
                if written.contains(&file) {
                    return Err(GeoError::file_access(
                        output.path(),
                        format!("would replace input file {}", file.display()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Creates the parent directory and checks that `path` can be written.
    pub fn validate_output_path(path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|error| GeoError::file_access(parent, error))?;
        if path.is_dir() {
            return Err(GeoError::file_access(path, "is a directory"));
        }
        if path.exists() && !overwrite {
            return Err(GeoError::file_access(path, "already exists"));
        }
        tempfile::Builder::new()
            .prefix(".geoproc-")
            .tempfile_in(parent)
            .map_err(|error| GeoError::file_access(parent, format!("not writable: {error}")))?;
        debug!("output {path:?} is writable");
        Ok(())
    }
}
