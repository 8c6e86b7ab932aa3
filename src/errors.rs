use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, GeoError>;

/// Broad category of a [GeoError], stable enough to show to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileAccess,
    DataFormat,
    Projection,
    Geometry,
    Processing,
    Validation,
    Configuration,
}

#[derive(thiserror::Error, Debug)]
pub enum GeoError {
    #[error("Cannot access {path}: {reason}")]
    FileAccess { path: PathBuf, reason: String },
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("No handler available for {0}")]
    NoHandler(String),
    #[error("Failed to load {path}: {source}")]
    DataFormat {
        path: PathBuf,
        #[source]
        source: Box<GeoError>,
    },
    #[error("{path} contains no features")]
    EmptyDataset { path: PathBuf },
    #[error("Projection error: {0}")]
    Projection(String),
    #[error("Geometry error: {0}")]
    Geometry(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Format registry misconfigured: {0}")]
    Configuration(String),
    #[error("GDAL error: {0}")]
    Backend(String),
    #[error("{operation} failed: {source}")]
    Processing {
        operation: &'static str,
        #[source]
        source: Box<GeoError>,
    },
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    ProjError(#[from] proj::ProjError),
    #[error(transparent)]
    ProjCreateError(#[from] proj::ProjCreateError),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ConfigError(#[from] serde_json::Error),
}

impl GeoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileAccess { .. } | Self::IoError(_) => ErrorKind::FileAccess,
            Self::UnsupportedFormat(_)
            | Self::NoHandler(_)
            | Self::DataFormat { .. }
            | Self::EmptyDataset { .. } => ErrorKind::DataFormat,
            Self::Projection(_) | Self::ProjCreateError(_) => ErrorKind::Projection,
            Self::Geometry(_) => ErrorKind::Geometry,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) | Self::ConfigError(_) => ErrorKind::Configuration,
            Self::Processing { .. }
            | Self::Backend(_)
            | Self::GdalError(_)
            | Self::ProjError(_)
            | Self::NdarrayError(_) => ErrorKind::Processing,
        }
    }

    pub fn file_access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn data_format(path: impl Into<PathBuf>, source: GeoError) -> Self {
        Self::DataFormat {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Wraps `self` as the cause of a failed processing `operation`.
    pub fn processing(self, operation: &'static str) -> Self {
        Self::Processing {
            operation,
            source: Box::new(self),
        }
    }

    /// Innermost error of a chain of [GeoError::Processing] and
    /// [GeoError::DataFormat] wrappers.
    pub fn root(&self) -> &GeoError {
        match self {
            Self::Processing { source, .. } | Self::DataFormat { source, .. } => source.root(),
            other => other,
        }
    }
}
