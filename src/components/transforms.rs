use geo::{AffineTransform, Coord, Rect};
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::bounds::PixelWindow,
    errors::{GeoError, Result},
};

/// Pixel (col, row) to world (x, y) affine transform.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(AffineTransform);

impl Default for GeoTransform {
    fn default() -> Self {
        Self(AffineTransform::identity())
    }
}

impl GeoTransform {
    pub fn new(a: f64, b: f64, xoff: f64, d: f64, e: f64, yoff: f64) -> Self {
        Self(AffineTransform::new(a, b, xoff, d, e, yoff))
    }

    /// North-up transform with square-or-not pixels of `res_x` by `res_y`.
    pub fn north_up(min_x: f64, max_y: f64, res_x: f64, res_y: f64) -> Self {
        Self::new(res_x, 0., min_x, 0., -res_y, max_y)
    }

    /// From GDAL's `[xoff, a, b, yoff, d, e]` ordering.
    pub fn from_gdal(gdal_transform: [f64; 6]) -> Self {
        Self::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        )
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.xoff(),
            self.a(),
            self.b(),
            self.yoff(),
            self.d(),
            self.e(),
        ]
    }

    pub fn inverse(&self) -> Result<WorldToPixel> {
        self.0
            .inverse()
            .map(WorldToPixel)
            .ok_or_else(|| GeoError::Validation("pixel transform is not invertible".into()))
    }

    /// Transform of a grid whose top left pixel is `window`'s offset.
    pub fn shifted(&self, window: &PixelWindow) -> Self {
        let origin = self.apply(Coord {
            x: window.col_off as f64,
            y: window.row_off as f64,
        });
        Self::new(self.a(), self.b(), origin.x, self.d(), self.e(), origin.y)
    }

    /// Transform covering the same world extent with `width` x `height` pixels
    /// instead of `src_width` x `src_height`.
    pub fn rescaled(&self, src: (usize, usize), dst: (usize, usize)) -> Self {
        let scale_x = src.0 as f64 / dst.0 as f64;
        let scale_y = src.1 as f64 / dst.1 as f64;
        Self::new(
            self.a() * scale_x,
            self.b() * scale_y,
            self.xoff(),
            self.d() * scale_x,
            self.e() * scale_y,
            self.yoff(),
        )
    }

    /// World extent of a `width` x `height` grid, including rotated grids.
    pub fn extent(&self, width: usize, height: usize) -> Rect {
        let (w, h) = (width as f64, height as f64);
        let corners = [(0., 0.), (w, 0.), (0., h), (w, h)].map(|(x, y)| self.apply(Coord { x, y }));
        let (mut min, mut max) = (corners[0], corners[0]);
        for corner in &corners[1..] {
            min.x = min.x.min(corner.x);
            min.y = min.y.min(corner.y);
            max.x = max.x.max(corner.x);
            max.y = max.y.max(corner.y);
        }
        Rect::new(min, max)
    }

    pub fn resolution(&self) -> (f64, f64) {
        (self.a().hypot(self.d()), self.b().hypot(self.e()))
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal())
            .all(|(lhs, rhs)| (lhs - rhs).abs() <= tolerance)
    }
}

/// World (x, y) to fractional pixel (col, row).
#[derive(Shrinkwrap, Debug, Clone, Copy)]
pub struct WorldToPixel(AffineTransform);

impl WorldToPixel {
    pub fn world_to_pixel(&self, world: Coord) -> Coord {
        self.apply(world)
    }
}
