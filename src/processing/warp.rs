use std::{fmt::Display, str::FromStr};

use gdal::raster::ResampleAlg;
use gdal_sys::GDALResampleAlg;
use serde::{Deserialize, Serialize};

use crate::errors::GeoError;

/// How destination pixel values are derived from source pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    Average,
    Mode,
}

impl Resampling {
    pub const ALL: [Self; 5] = [
        Self::Nearest,
        Self::Bilinear,
        Self::Cubic,
        Self::Average,
        Self::Mode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Cubic => "cubic",
            Self::Average => "average",
            Self::Mode => "mode",
        }
    }

    /// Kernel used by GDAL when a band is read into a buffer of another size.
    pub fn read_alg(&self) -> ResampleAlg {
        match self {
            Self::Nearest => ResampleAlg::NearestNeighbour,
            Self::Bilinear => ResampleAlg::Bilinear,
            Self::Cubic => ResampleAlg::Cubic,
            Self::Average => ResampleAlg::Average,
            Self::Mode => ResampleAlg::Mode,
        }
    }

    /// Kernel used by the GDAL warper.
    pub fn warp_alg(&self) -> GDALResampleAlg::Type {
        match self {
            Self::Nearest => GDALResampleAlg::GRA_NearestNeighbour,
            Self::Bilinear => GDALResampleAlg::GRA_Bilinear,
            Self::Cubic => GDALResampleAlg::GRA_Cubic,
            Self::Average => GDALResampleAlg::GRA_Average,
            Self::Mode => GDALResampleAlg::GRA_Mode,
        }
    }
}

impl Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resampling {
    type Err = GeoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kernel| kernel.name() == name)
            .ok_or_else(|| GeoError::Validation(format!("unknown resampling method {s:?}")))
    }
}
