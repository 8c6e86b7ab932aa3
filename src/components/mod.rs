pub mod backends;
pub mod bounds;
pub mod datasets;
pub mod features;
pub mod formats;
pub mod output;
pub mod raster;
pub mod transforms;
pub mod vector;

pub use backends::gdal_backend::DataType;
pub use bounds::{GeoBounds, PixelWindow};
pub use datasets::{detect_type, validate_file_access, DataKind, DatasetInfo, GeoDataset};
pub use features::{AttributeValue, Feature, FeatureCollection, FieldDef, FieldType, GeometryType};
pub use formats::{FormatHandler, FormatRegistry, PlannedOutput};
pub use raster::{RasterDataset, RasterGrid};
pub use transforms::GeoTransform;
pub use vector::VectorDataset;
