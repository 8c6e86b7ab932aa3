pub mod classification;
pub mod overlay;
pub mod raster;
pub mod vector;
pub mod warp;

pub use classification::{ClassificationRule, ClassificationRules};
pub use raster::RasterProcessor;
pub use vector::VectorProcessor;
pub use warp::Resampling;

use crate::errors::{GeoError, Result};

/// Wraps a failed operation's error in [`GeoError::Processing`] unless `keep` lets it through.
pub(crate) fn wrap_processing<T>(
    operation: &'static str,
    result: Result<T>,
    keep: impl Fn(&GeoError) -> bool,
) -> Result<T> {
    result.map_err(|error| {
        if keep(&error) {
            error
        } else {
            error.processing(operation)
        }
    })
}
