use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
    str::FromStr,
};

use gdal::spatial_ref::SpatialRef;
use geo::{BoundingRect, Coord, MapCoords, Rect};
use proj::Proj;
use shrinkwraprs::Shrinkwrap;

use crate::errors::{GeoError, Result};

const UNKNOWN: &str = "unknown";

/// Authority qualified CRS code, e.g. `EPSG:4326`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AuthorityCode {
    pub authority: String,
    pub code: u32,
}

impl Display for AuthorityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

/// Coordinate reference system as any of an authority code,
/// a proj-string or well-known-text.
///
/// Two projections are equal when their [Projection::canonical] forms are.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Projection {
    code: Option<AuthorityCode>,
    proj_string: Option<String>,
    wkt: Option<String>,
}

impl Projection {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_epsg(code: u32) -> Self {
        Self::from_code("EPSG", code)
    }

    pub fn from_code(authority: &str, code: u32) -> Self {
        Self {
            code: Some(AuthorityCode {
                authority: authority.to_ascii_uppercase(),
                code,
            }),
            ..Self::default()
        }
    }

    pub fn from_proj_string(proj_string: impl Into<String>) -> Self {
        Self {
            proj_string: Some(proj_string.into()),
            ..Self::default()
        }
    }

    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            ..Self::default()
        }
    }

    /// Reads user input in any of the three forms.
    ///
    /// `AUTHORITY:CODE` is recognised as a code, text starting with `+` as a
    /// proj-string and bracketed text as WKT. Anything else is kept verbatim as
    /// a proj-string so that PROJ can make sense of it later.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case(UNKNOWN) {
            return Self::unknown();
        }
        if text.contains('[') {
            return Self::from_wkt(text);
        }
        if !text.starts_with('+') {
            if let Some((authority, code)) = text.split_once(':') {
                let is_authority =
                    !authority.is_empty() && authority.chars().all(|c| c.is_ascii_alphabetic());
                if let (true, Ok(code)) = (is_authority, code.parse::<u32>()) {
                    return Self::from_code(authority, code);
                }
            }
        }
        Self::from_proj_string(text)
    }

    /// Reads a GDAL spatial reference, preferring an EPSG code when one can
    /// be identified.
    pub fn from_spatial_ref(spatial_ref: &SpatialRef) -> Self {
        let mut spatial_ref = spatial_ref.clone();
        // Unidentifiable references keep their WKT.
        let _ = spatial_ref.auto_identify_epsg();
        let code = match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
            (Ok(authority), Ok(code)) if code >= 0 => Some(AuthorityCode {
                authority: authority.to_ascii_uppercase(),
                code: code as u32,
            }),
            _ => None,
        };
        Self {
            code,
            proj_string: spatial_ref.to_proj4().ok().filter(|s| !s.is_empty()),
            wkt: spatial_ref.to_wkt().ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn code(&self) -> Option<&AuthorityCode> {
        self.code.as_ref()
    }

    pub fn proj_string(&self) -> Option<&str> {
        self.proj_string.as_deref()
    }

    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    pub fn is_unknown(&self) -> bool {
        self.code.is_none() && self.proj_string.is_none() && self.wkt.is_none()
    }

    /// Single identifier accepted by every downstream transformation.
    pub fn canonical(&self) -> String {
        if let Some(code) = &self.code {
            code.to_string()
        } else if let Some(proj_string) = &self.proj_string {
            proj_string.clone()
        } else if let Some(wkt) = &self.wkt {
            wkt.clone()
        } else {
            UNKNOWN.to_string()
        }
    }

    /// Fails for the unknown marker.
    pub fn require_known(&self, what: &str) -> Result<&Self> {
        if self.is_unknown() {
            Err(GeoError::Projection(format!("{what} has no defined CRS")))
        } else {
            Ok(self)
        }
    }

    pub fn to_spatial_ref(&self) -> Result<SpatialRef> {
        self.require_known("output")?;
        SpatialRef::from_definition(&self.canonical()).map_err(|error| {
            GeoError::Projection(format!("unrecognised CRS {}: {error}", self.canonical()))
        })
    }

    /// PROJ transformation from `self` to `target`, in lon/lat (x/y) axis order.
    pub fn proj_to(&self, target: &Projection) -> Result<Proj> {
        self.require_known("source")?;
        target.require_known("target")?;
        Proj::new_known_crs(&self.canonical(), &target.canonical(), None).map_err(|error| {
            GeoError::Projection(format!(
                "cannot transform {} to {}: {error}",
                self.canonical(),
                target.canonical()
            ))
        })
    }
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Projection {}

impl Hash for Projection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state)
    }
}

impl Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Projection {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Geometry tagged with the [Projection] its coordinates are expressed in.
#[derive(Shrinkwrap, Debug, Clone)]
pub struct CrsGeometry<G> {
    crs: Projection,
    #[shrinkwrap(main_field)]
    geometry: G,
}

impl<G> CrsGeometry<G> {
    pub fn new(crs: Projection, geometry: G) -> Self {
        Self { crs, geometry }
    }

    pub fn crs(&self) -> &Projection {
        &self.crs
    }

    pub fn into_inner(self) -> G {
        self.geometry
    }
}

impl<G: MapCoords<f64, f64, Output = G> + Clone> CrsGeometry<G> {
    pub fn with_crs(self, crs: &Projection) -> Result<Self> {
        if self.crs.ne(crs) {
            let geometry = self.projected_geometry(crs)?;
            Ok(Self {
                crs: crs.clone(),
                geometry,
            })
        } else {
            Ok(self)
        }
    }

    /// Clones if crs is same.
    pub fn projected_geometry(&self, crs: &Projection) -> Result<G> {
        if self.crs.ne(crs) {
            let proj = self.crs.proj_to(crs)?;
            self.geometry
                .try_map_coords(|coord| proj.convert(coord))
                .map_err(|error| {
                    GeoError::Projection(format!("cannot transform geometry to {crs}: {error}"))
                })
        } else {
            Ok(self.geometry.clone())
        }
    }
}

impl<G: BoundingRect<f64>> CrsGeometry<G>
where
    G::Output: Into<Option<Rect>>,
{
    pub fn bounding_rect(&self) -> Option<CrsGeometry<Rect>> {
        let geometry: Option<Rect> = self.geometry.bounding_rect().into();
        let geometry = geometry?;
        Some(CrsGeometry {
            crs: self.crs.clone(),
            geometry,
        })
    }
}

pub(crate) fn is_finite(coord: Coord) -> bool {
    coord.x.is_finite() && coord.y.is_finite()
}
