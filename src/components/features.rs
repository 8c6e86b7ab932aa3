use std::{collections::HashMap, fmt::Display};

use geo::{Geometry, GeometryCollection, MapCoords};
use serde::{Deserialize, Serialize};

use crate::{
    components::bounds::GeoBounds,
    crs_geo::{CrsGeometry, Projection},
    errors::{GeoError, Result},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Real,
    Boolean,
    Text,
}

/// Attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub attributes: HashMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, attributes: HashMap<String, AttributeValue>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }
}

/// Geometry type tag of a feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    pub fn of(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// In memory feature table: features sharing one CRS and one attribute schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    projection: Projection,
    schema: Vec<FieldDef>,
    features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(projection: Projection, schema: Vec<FieldDef>, features: Vec<Feature>) -> Self {
        Self {
            projection,
            schema,
            features,
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn schema(&self) -> &[FieldDef] {
        &self.schema
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry> {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref())
    }

    /// Union of every geometry's bounding box.
    pub fn bounds(&self) -> Option<GeoBounds> {
        let collection: GeometryCollection = self.geometries().cloned().collect();
        CrsGeometry::new(self.projection.clone(), collection)
            .bounding_rect()
            .map(GeoBounds::from)
    }

    /// Most frequent geometry type, ties going to the one seen first.
    pub fn dominant_geometry_type(&self) -> Option<GeometryType> {
        let mut counts: Vec<(GeometryType, usize)> = Vec::new();
        for geometry_type in self.geometries().map(GeometryType::of) {
            match counts.iter_mut().find(|(seen, _)| *seen == geometry_type) {
                Some((_, count)) => *count += 1,
                None => counts.push((geometry_type, 1)),
            }
        }
        counts
            .iter()
            .fold(None, |best: Option<(GeometryType, usize)>, &(geometry_type, count)| {
                match best {
                    Some((_, best_count)) if best_count >= count => best,
                    _ => Some((geometry_type, count)),
                }
            })
            .map(|(geometry_type, _)| geometry_type)
    }

    /// Same features with geometries expressed in `crs`.
    pub fn reprojected(&self, crs: &Projection) -> Result<Self> {
        if &self.projection == crs {
            return Ok(self.clone());
        }
        let proj = self.projection.proj_to(crs)?;
        let features = self
            .features
            .iter()
            .map(|feature| {
                let geometry = feature
                    .geometry
                    .as_ref()
                    .map(|geometry| geometry.try_map_coords(|coord| proj.convert(coord)))
                    .transpose()
                    .map_err(|error| {
                        GeoError::Projection(format!(
                            "cannot transform geometry to {crs}: {error}"
                        ))
                    })?;
                Ok(Feature::new(geometry, feature.attributes.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(crs.clone(), self.schema.clone(), features))
    }
}
