use geo::{Coord, Rect};
use itertools::Itertools;
use shrinkwraprs::Shrinkwrap;

use crate::{
    crs_geo::{is_finite, CrsGeometry, Projection},
    errors::{GeoError, Result},
};

/// Axis aligned bounds in 'geospace' tagged with their [Projection].
#[derive(Shrinkwrap, Clone, Debug)]
pub struct GeoBounds(CrsGeometry<Rect>);

impl From<CrsGeometry<Rect>> for GeoBounds {
    fn from(value: CrsGeometry<Rect>) -> Self {
        Self(value)
    }
}

impl PartialEq for GeoBounds {
    fn eq(&self, other: &Self) -> bool {
        self.crs() == other.crs() && self.rect() == other.rect()
    }
}

impl GeoBounds {
    /// Corners are reordered so that min <= max holds.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Projection) -> Self {
        let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        Self(CrsGeometry::new(crs, rect))
    }

    pub fn rect(&self) -> Rect {
        *self.0
    }

    pub fn min_x(&self) -> f64 {
        self.0.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.0.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.0.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.0.max().y
    }

    pub fn width(&self) -> f64 {
        self.0.width()
    }

    pub fn height(&self) -> f64 {
        self.0.height()
    }

    fn same_crs(&self, other: &Self) -> Result<()> {
        if self.crs() != other.crs() {
            return Err(GeoError::Projection(format!(
                "bounds are in {} and {}",
                self.crs(),
                other.crs()
            )));
        }
        Ok(())
    }

    pub fn union(&self, other: &Self) -> Result<Self> {
        self.same_crs(other)?;
        Ok(Self::new(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
            self.crs().clone(),
        ))
    }

    pub fn intersects(&self, other: &Self) -> Result<bool> {
        self.same_crs(other)?;
        Ok(self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y())
    }

    /// Bounds of `self` in `crs`, sampling `densify` points along every edge.
    pub fn reprojected(&self, crs: &Projection, densify: usize) -> Result<Self> {
        if self.crs() == crs {
            return Ok(self.clone());
        }
        let proj = self.crs().proj_to(crs)?;
        let steps = densify.max(1) + 1;
        let (min, max) = (self.0.min(), self.0.max());
        let edge_points = (0..=steps).flat_map(|step| {
            let t = step as f64 / steps as f64;
            let x = min.x + t * (max.x - min.x);
            let y = min.y + t * (max.y - min.y);
            [(x, min.y), (x, max.y), (min.x, y), (max.x, y)]
        });
        let projected: Vec<Coord> = edge_points
            .filter_map(|point| proj.convert(point).ok())
            .map(Coord::from)
            .filter(|coord| is_finite(*coord))
            .collect();
        let xs = projected.iter().map(|c| c.x).minmax().into_option();
        let ys = projected.iter().map(|c| c.y).minmax().into_option();
        let (Some((min_x, max_x)), Some((min_y, max_y))) = (xs, ys) else {
            return Err(GeoError::Projection(format!(
                "bounds cannot be expressed in {crs}"
            )));
        };
        Ok(Self::new(min_x, min_y, max_x, max_y, crs.clone()))
    }
}

/// Rectangular pixel window of a raster.
///
/// `col_off`, `row_off` locate the top left pixel, with origin at the top left
/// pixel of the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn size(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Smallest window holding the fractional pixel rectangle `min`..`max`,
    /// clipped to a `width` x `height` raster.
    pub fn covering(min: Coord, max: Coord, width: usize, height: usize) -> Option<Self> {
        let clamp = |value: f64, limit: usize| value.max(0.).min(limit as f64) as usize;
        let col_start = clamp(min.x.floor(), width);
        let row_start = clamp(min.y.floor(), height);
        let col_end = clamp(max.x.ceil(), width);
        let row_end = clamp(max.y.ceil(), height);
        let window = Self::new(
            col_start,
            row_start,
            col_end.saturating_sub(col_start),
            row_end.saturating_sub(row_start),
        );
        (!window.is_empty()).then_some(window)
    }

    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.col_off + self.width <= width && self.row_off + self.height <= height
    }
}
