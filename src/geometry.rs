/// Integer pixel coordinate. Signed so that pointer positions dragged past the
/// canvas edge stay representable; engines clip before writing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Inclusive pixel rectangle (`min..=max` on both axes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub min: Point,
    pub max: Point,
}

impl PixelRect {
    /// Rectangle spanned by two arbitrary corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_point(p: Point) -> Self {
        Self { min: p, max: p }
    }

    /// Full canvas rectangle. `None` for a zero-sized canvas.
    pub fn canvas(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            min: Point::new(0, 0),
            max: Point::new(width as i32 - 1, height as i32 - 1),
        })
    }

    /// Saturates at `u32::MAX` for a rect spanning the whole `i32` range.
    pub fn width(&self) -> u32 {
        span(self.min.x, self.max.x)
    }

    pub fn height(&self) -> u32 {
        span(self.min.y, self.max.y)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        PixelRect {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Grow by `pad` pixels on every side.
    pub fn expand(&self, pad: i32) -> PixelRect {
        PixelRect {
            min: Point::new(self.min.x.saturating_sub(pad), self.min.y.saturating_sub(pad)),
            max: Point::new(self.max.x.saturating_add(pad), self.max.y.saturating_add(pad)),
        }
    }

    /// Intersection with the canvas; `None` when nothing overlaps.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let canvas = PixelRect::canvas(width, height)?;
        let min = Point::new(self.min.x.max(canvas.min.x), self.min.y.max(canvas.min.y));
        let max = Point::new(self.max.x.min(canvas.max.x), self.max.y.min(canvas.max.y));
        if min.x > max.x || min.y > max.y {
            return None;
        }
        Some(PixelRect { min, max })
    }
}

/// Accumulate `rect` into an optional running bound.
pub fn union_opt(acc: Option<PixelRect>, rect: PixelRect) -> Option<PixelRect> {
    Some(match acc {
        Some(existing) => existing.union(&rect),
        None => rect,
    })
}

fn span(min: i32, max: i32) -> u32 {
    (i64::from(max) - i64::from(min) + 1).clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_normalise_regardless_of_order() {
        let r = PixelRect::from_corners(Point::new(5, 1), Point::new(2, 7));
        assert_eq!(r.min, Point::new(2, 1));
        assert_eq!(r.max, Point::new(5, 7));
        assert_eq!((r.width(), r.height()), (4, 7));
    }

    #[test]
    fn clamp_drops_rect_fully_outside_canvas() {
        let r = PixelRect::from_corners(Point::new(-10, -10), Point::new(-1, -1));
        assert!(r.clamp_to(10, 10).is_none());

        let partial = PixelRect::from_corners(Point::new(-3, 8), Point::new(2, 14));
        let clamped = partial.clamp_to(10, 10).unwrap();
        assert_eq!(clamped.min, Point::new(0, 8));
        assert_eq!(clamped.max, Point::new(2, 9));
    }

    #[test]
    fn extreme_rects_saturate_instead_of_wrapping() {
        let r = PixelRect::from_corners(Point::new(i32::MIN, 0), Point::new(i32::MAX, 0));
        assert_eq!((r.width(), r.height()), (u32::MAX, 1));
        let grown = r.expand(3);
        assert_eq!(grown.min, Point::new(i32::MIN, -3));
        assert_eq!(grown.max, Point::new(i32::MAX, 3));
        assert_eq!(grown.clamp_to(4, 4).unwrap().width(), 4);
    }
}
