//! Feature table overlay algebra.
//!
//! The second operand is brought into the CRS of the first. Overlay operators
//! accept polygonal geometries only; features without geometry are dropped.

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
};

use geo::{
    Area, BooleanOps, BoundingRect, Geometry, GeometryCollection, Intersects, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point,
};
use log::debug;

use crate::{
    components::features::{AttributeValue, Feature, FeatureCollection, FieldDef, GeometryType},
    errors::{GeoError, Result},
};

/// Polygonal geometry as a multi polygon, `None` for anything else.
pub(crate) fn as_multi_polygon(geometry: &Geometry) -> Option<MultiPolygon> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(multi) => Some(multi.clone()),
        Geometry::Rect(rect) => Some(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => Some(MultiPolygon::new(vec![triangle.to_polygon()])),
        Geometry::GeometryCollection(collection) => collection
            .iter()
            .map(as_multi_polygon)
            .collect::<Option<Vec<_>>>()
            .map(|parts| MultiPolygon::new(parts.into_iter().flat_map(|part| part.0).collect())),
        _ => None,
    }
}

/// Polygonal geometry of every feature, `None` where a feature has none.
fn polygons(collection: &FeatureCollection) -> Result<Vec<Option<MultiPolygon>>> {
    collection
        .features()
        .iter()
        .map(|feature| match &feature.geometry {
            None => Ok(None),
            Some(geometry) => as_multi_polygon(geometry).map(Some).ok_or_else(|| {
                GeoError::Geometry(format!(
                    "overlay needs polygons, found {}",
                    GeometryType::of(geometry)
                ))
            }),
        })
        .collect()
}

/// Union of all polygons of `collection`.
pub fn dissolve(collection: &FeatureCollection) -> Result<MultiPolygon> {
    let parts: Vec<MultiPolygon> = polygons(collection)?.into_iter().flatten().collect();
    if parts.is_empty() {
        return Err(GeoError::Geometry("no polygonal geometry to dissolve".into()));
    }
    Ok(union_all(&parts))
}

fn union_all(parts: &[MultiPolygon]) -> MultiPolygon {
    parts
        .iter()
        .fold(MultiPolygon::new(vec![]), |acc, part| acc.union(part))
}

/// `None` when nothing with area is left.
fn polygonal_result(multi: MultiPolygon) -> Option<Geometry> {
    let mut parts: Vec<_> = multi
        .0
        .into_iter()
        .filter(|polygon| polygon.unsigned_area() > 0.)
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(parts))),
    }
}

fn align<'a>(
    first: &FeatureCollection,
    second: &'a FeatureCollection,
) -> Result<Cow<'a, FeatureCollection>> {
    if first.projection() == second.projection() {
        Ok(Cow::Borrowed(second))
    } else {
        debug!("reprojecting {} to {}", second.projection(), first.projection());
        Ok(Cow::Owned(second.reprojected(first.projection())?))
    }
}

/// Schema holding the columns of two tables, names present in both get
/// `_1` / `_2` suffixes.
#[derive(Debug)]
struct MergedSchema {
    fields: Vec<FieldDef>,
    first: Vec<(String, String)>,
    second: Vec<(String, String)>,
}

impl MergedSchema {
    fn new(first: &[FieldDef], second: &[FieldDef]) -> Self {
        let names = |fields: &[FieldDef]| -> HashSet<String> {
            fields.iter().map(|field| field.name.clone()).collect()
        };
        let (first_names, second_names) = (names(first), names(second));
        let mut fields = Vec::new();
        let mut renamed = |fields_in: &[FieldDef], other: &HashSet<String>, suffix: &str| {
            fields_in
                .iter()
                .map(|field| {
                    let name = if other.contains(&field.name) {
                        format!("{}{suffix}", field.name)
                    } else {
                        field.name.clone()
                    };
                    fields.push(FieldDef::new(name.clone(), field.field_type));
                    (field.name.clone(), name)
                })
                .collect::<Vec<_>>()
        };
        let first = renamed(first, &second_names, "_1");
        let second = renamed(second, &first_names, "_2");
        Self {
            fields,
            first,
            second,
        }
    }

    fn attributes(
        &self,
        first: Option<&HashMap<String, AttributeValue>>,
        second: Option<&HashMap<String, AttributeValue>>,
    ) -> HashMap<String, AttributeValue> {
        let mut merged = HashMap::new();
        for (names, attributes) in [(&self.first, first), (&self.second, second)] {
            let Some(attributes) = attributes else {
                continue;
            };
            for (source, target) in names {
                if let Some(value) = attributes.get(source) {
                    merged.insert(target.clone(), value.clone());
                }
            }
        }
        merged
    }
}

/// Parts of each `input` feature covered by the union of `boundary`.
///
/// Polygons are intersected, lines cut and points kept when covered.
pub fn clip(input: &FeatureCollection, boundary: &FeatureCollection) -> Result<FeatureCollection> {
    let boundary = align(input, boundary)?;
    let mask = dissolve(&boundary)?;
    let features = input
        .features()
        .iter()
        .filter_map(|feature| {
            let geometry = clip_geometry(feature.geometry.as_ref()?, &mask)?;
            Some(Feature::new(Some(geometry), feature.attributes.clone()))
        })
        .collect();
    Ok(FeatureCollection::new(
        input.projection().clone(),
        input.schema().to_vec(),
        features,
    ))
}

fn clip_geometry(geometry: &Geometry, mask: &MultiPolygon) -> Option<Geometry> {
    match geometry {
        Geometry::Point(point) => mask.intersects(point).then(|| geometry.clone()),
        Geometry::MultiPoint(points) => {
            let mut kept: Vec<Point> = points
                .iter()
                .filter(|point| mask.intersects(*point))
                .copied()
                .collect();
            match kept.len() {
                0 => None,
                1 => kept.pop().map(Geometry::Point),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(kept))),
            }
        }
        Geometry::Line(line) => clip_lines(
            mask,
            MultiLineString::new(vec![LineString::new(vec![line.start, line.end])]),
        ),
        Geometry::LineString(line) => clip_lines(mask, MultiLineString::new(vec![line.clone()])),
        Geometry::MultiLineString(lines) => clip_lines(mask, lines.clone()),
        Geometry::GeometryCollection(collection) => {
            let parts: Vec<Geometry> = collection
                .iter()
                .filter_map(|part| clip_geometry(part, mask))
                .collect();
            (!parts.is_empty())
                .then(|| Geometry::GeometryCollection(GeometryCollection::new_from(parts)))
        }
        polygonal => polygonal_result(mask.intersection(&as_multi_polygon(polygonal)?)),
    }
}

fn clip_lines(mask: &MultiPolygon, lines: MultiLineString) -> Option<Geometry> {
    let mut kept: Vec<LineString> = mask
        .clip(&lines, false)
        .0
        .into_iter()
        .filter(|line| line.0.len() > 1)
        .collect();
    match kept.len() {
        0 => None,
        1 => kept.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(kept))),
    }
}

/// `input` features minus the union of `eraser`.
pub fn difference(
    input: &FeatureCollection,
    eraser: &FeatureCollection,
) -> Result<FeatureCollection> {
    let eraser = align(input, eraser)?;
    let eraser = union_all(&polygons(&eraser)?.into_iter().flatten().collect::<Vec<_>>());
    let features = polygons(input)?
        .into_iter()
        .zip(input.features())
        .filter_map(|(polygon, feature)| {
            let geometry = polygonal_result(polygon?.difference(&eraser))?;
            Some(Feature::new(Some(geometry), feature.attributes.clone()))
        })
        .collect();
    Ok(FeatureCollection::new(
        input.projection().clone(),
        input.schema().to_vec(),
        features,
    ))
}

/// Pairwise intersections carrying the attributes of both features.
pub fn intersection(
    first: &FeatureCollection,
    second: &FeatureCollection,
) -> Result<FeatureCollection> {
    let second = align(first, second)?;
    let schema = MergedSchema::new(first.schema(), second.schema());
    let first_polygons = polygons(first)?;
    let second_polygons: Vec<_> = polygons(&second)?
        .into_iter()
        .zip(second.features())
        .filter_map(|(polygon, feature)| {
            let polygon = polygon?;
            let extent = polygon.bounding_rect()?;
            Some((polygon, extent, feature))
        })
        .collect();

    let mut features = Vec::new();
    for (polygon, feature) in first_polygons.into_iter().zip(first.features()) {
        let Some(polygon) = polygon else {
            continue;
        };
        let Some(extent) = polygon.bounding_rect() else {
            continue;
        };
        for (other, other_extent, other_feature) in &second_polygons {
            if !extent.intersects(other_extent) {
                continue;
            }
            if let Some(geometry) = polygonal_result(polygon.intersection(other)) {
                features.push(Feature::new(
                    Some(geometry),
                    schema.attributes(Some(&feature.attributes), Some(&other_feature.attributes)),
                ));
            }
        }
    }
    Ok(FeatureCollection::new(
        first.projection().clone(),
        schema.fields,
        features,
    ))
}

/// Parts of `first` not covered by `second` followed by parts of `second`
/// not covered by `first`.
pub fn symmetric_difference(
    first: &FeatureCollection,
    second: &FeatureCollection,
) -> Result<FeatureCollection> {
    let second = align(first, second)?;
    let schema = MergedSchema::new(first.schema(), second.schema());
    let first_polygons = polygons(first)?;
    let second_polygons = polygons(&second)?;
    let first_union = union_all(&first_polygons.iter().flatten().cloned().collect::<Vec<_>>());
    let second_union = union_all(&second_polygons.iter().flatten().cloned().collect::<Vec<_>>());

    let first_parts = first_polygons
        .into_iter()
        .zip(first.features())
        .filter_map(|(polygon, feature)| {
            let geometry = polygonal_result(polygon?.difference(&second_union))?;
            Some(Feature::new(
                Some(geometry),
                schema.attributes(Some(&feature.attributes), None),
            ))
        });
    let second_parts = second_polygons
        .into_iter()
        .zip(second.features())
        .filter_map(|(polygon, feature)| {
            let geometry = polygonal_result(polygon?.difference(&first_union))?;
            Some(Feature::new(
                Some(geometry),
                schema.attributes(None, Some(&feature.attributes)),
            ))
        });
    let features = first_parts.chain(second_parts).collect();
    Ok(FeatureCollection::new(
        first.projection().clone(),
        schema.fields,
        features,
    ))
}

/// All features of all `collections` in one table, in the CRS of the first
/// collection that has one. Collections without a CRS are taken as they are.
/// Columns are the union of all schemas.
pub fn union(collections: &[FeatureCollection]) -> Result<FeatureCollection> {
    if collections.is_empty() {
        return Err(GeoError::Validation("union needs at least one input".into()));
    }
    let projection = collections
        .iter()
        .map(FeatureCollection::projection)
        .find(|projection| !projection.is_unknown())
        .cloned()
        .unwrap_or_default();
    let mut schema: Vec<FieldDef> = Vec::new();
    let mut features = Vec::new();
    for collection in collections {
        for field in collection.schema() {
            if !schema.iter().any(|known| known.name == field.name) {
                schema.push(field.clone());
            }
        }
        if collection.projection() == &projection || collection.projection().is_unknown() {
            features.extend(collection.features().iter().cloned());
        } else {
            features.extend(collection.reprojected(&projection)?.into_features());
        }
    }
    Ok(FeatureCollection::new(projection, schema, features))
}
