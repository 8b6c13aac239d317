// ============================================================================
// Stroke rasterisation shared by the brush and the eraser
// ============================================================================

use image::Rgba;

use crate::canvas::{blend_over, ERASE_COLOR};
use crate::components::tools::LineStyle;
use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::{union_opt, PixelRect, Point};
use crate::ops::EngineContext;

/// Integer Bresenham walk from `start` to `end`, both endpoints included.
/// Runs in `i64` so the full `i32` coordinate range cannot overflow.
pub struct LinePoints {
    x: i64,
    y: i64,
    end: (i64, i64),
    dx: i64,
    dy: i64,
    sx: i64,
    sy: i64,
    err: i64,
    done: bool,
}

pub fn line_points(start: Point, end: Point) -> LinePoints {
    let (x0, y0) = (i64::from(start.x), i64::from(start.y));
    let (x1, y1) = (i64::from(end.x), i64::from(end.y));
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    LinePoints {
        x: x0,
        y: y0,
        end: (x1, y1),
        dx,
        dy,
        sx: if x0 < x1 { 1 } else { -1 },
        sy: if y0 < y1 { 1 } else { -1 },
        err: dx - dy,
        done: false,
    }
}

impl Iterator for LinePoints {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.done {
            return None;
        }
        // x and y stay between the two i32 endpoints.
        let current = Point::new(self.x as i32, self.y as i32);
        if (self.x, self.y) == self.end {
            self.done = true;
            return Some(current);
        }
        let e2 = 2 * self.err;
        if e2 > -self.dy {
            self.err -= self.dy;
            self.x += self.sx;
        }
        if e2 < self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }
        Some(current)
    }
}

/// Shape stamped at every visited path pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Footprint {
    /// Disk of radius `size / 2`; `anti_aliased` adds a one-pixel coverage ramp.
    Disk { size: u32, anti_aliased: bool },
    /// Solid `size × size` block.
    Square { size: u32 },
}

impl Footprint {
    /// Inclusive offset range `(lo, hi)` that can receive coverage on each axis.
    fn reach(&self) -> (i32, i32) {
        match *self {
            Footprint::Disk { size, anti_aliased } => {
                let r = size.max(1) as f32 / 2.0;
                let r = if anti_aliased { r + 0.5 } else { r };
                let reach = r.ceil() as i32;
                (-reach, reach)
            }
            Footprint::Square { size } => {
                let lo = -((size.max(1) / 2) as i32);
                (lo, lo + size.max(1) as i32 - 1)
            }
        }
    }

    /// Coverage in `0.0..=1.0` of the pixel at offset `(dx, dy)`.
    pub fn coverage(&self, dx: i32, dy: i32) -> f32 {
        match *self {
            Footprint::Disk { size, anti_aliased } => {
                let r = f64::from(size.max(1)) / 2.0;
                let (dx, dy) = (i64::from(dx), i64::from(dy));
                let dist_sq = (dx * dx + dy * dy) as f64;
                if !anti_aliased {
                    return if dist_sq <= r * r { 1.0 } else { 0.0 };
                }
                (r + 0.5 - dist_sq.sqrt()).clamp(0.0, 1.0) as f32
            }
            Footprint::Square { .. } => {
                let (lo, hi) = self.reach();
                if dx >= lo && dx <= hi && dy >= lo && dy <= hi {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Every offset with non-zero coverage, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32, f32)> + '_ {
        let (lo, hi) = self.reach();
        (lo..=hi).flat_map(move |dy| {
            (lo..=hi).filter_map(move |dx| {
                let c = self.coverage(dx, dy);
                (c > 0.0).then_some((dx, dy, c))
            })
        })
    }
}

impl LineStyle {
    /// Whether the `step`-th visited path pixel of a stroke is drawn.
    /// Step 0 is always on, so a dab is never suppressed.
    pub fn is_on(&self, step: u64, size: u32) -> bool {
        let s = size.max(1) as u64;
        match self {
            LineStyle::Solid => true,
            LineStyle::Dashed => step % (5 * s) < 3 * s,
            LineStyle::Dotted => step % (2 * s + 1) == 0,
        }
    }
}

/// Max-coverage accumulator over a canvas-clipped rectangle. Overlapping
/// stamps within one segment never blend twice.
pub struct CoverageMask {
    rect: Option<PixelRect>,
    values: Vec<f32>,
}

impl CoverageMask {
    /// Mask able to hold stamps of `footprint` anywhere on the path `a..b`.
    pub fn for_segment(a: Point, b: Point, footprint: &Footprint, width: u32, height: u32) -> Self {
        let (lo, hi) = footprint.reach();
        let path = PixelRect::from_corners(a, b);
        let grown = PixelRect {
            min: Point::new(path.min.x.saturating_add(lo), path.min.y.saturating_add(lo)),
            max: Point::new(path.max.x.saturating_add(hi), path.max.y.saturating_add(hi)),
        };
        let rect = grown.clamp_to(width, height);
        let len = rect.map(|r| r.width() as usize * r.height() as usize).unwrap_or(0);
        Self {
            rect,
            values: vec![0.0; len],
        }
    }

    /// Only the offsets that land inside the mask are visited, so the cost
    /// is bounded by the mask area rather than the footprint area.
    pub fn stamp(&mut self, center: Point, footprint: &Footprint) {
        let Some(rect) = self.rect else { return };
        let (lo, hi) = footprint.reach();
        let span = |c: i32, min: i32, max: i32| {
            let (c, lo, hi) = (i64::from(c), i64::from(lo), i64::from(hi));
            (lo.max(i64::from(min) - c), hi.min(i64::from(max) - c))
        };
        let (x_lo, x_hi) = span(center.x, rect.min.x, rect.max.x);
        let (y_lo, y_hi) = span(center.y, rect.min.y, rect.max.y);
        if x_lo > x_hi || y_lo > y_hi {
            return;
        }
        let stride = rect.width() as usize;
        // Offsets are now within the mask, so they and the sums fit in i32.
        for dy in y_lo..=y_hi {
            let row = (i64::from(center.y) + dy - i64::from(rect.min.y)) as usize * stride;
            for dx in x_lo..=x_hi {
                let c = footprint.coverage(dx as i32, dy as i32);
                if c <= 0.0 {
                    continue;
                }
                let idx = row + (i64::from(center.x) + dx - i64::from(rect.min.x)) as usize;
                if c > self.values[idx] {
                    self.values[idx] = c;
                }
            }
        }
    }

    /// Covered pixels with their coverage.
    pub fn covered(&self) -> impl Iterator<Item = (Point, f32)> + '_ {
        let rect = self.rect;
        self.values.iter().enumerate().filter_map(move |(i, &c)| {
            let rect = rect?;
            if c <= 0.0 {
                return None;
            }
            let stride = rect.width() as usize;
            Some((
                Point::new(rect.min.x + (i % stride) as i32, rect.min.y + (i / stride) as i32),
                c,
            ))
        })
    }
}

/// What a stroke deposits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Ink {
    Color(Rgba<u8>),
    Erase,
}

/// Per-stroke bookkeeping: dash phase and the last stamped path pixel.
#[derive(Clone, Debug, Default)]
pub struct StrokeState {
    step: u64,
    last: Option<Point>,
}

impl StrokeState {
    pub fn reset(&mut self) {
        self.step = 0;
        self.last = None;
    }
}

/// Stamp `footprint` along `from..to` onto the current layer, masked by the
/// selection and clipped to the canvas.
///
/// The first path pixel is skipped when it repeats the previous segment's
/// last one, so a stationary drag after a dab writes nothing new.
#[allow(clippy::too_many_arguments)]
pub fn paint_segment(
    ctx: &mut EngineContext<'_>,
    state: &mut StrokeState,
    from: Point,
    to: Point,
    footprint: Footprint,
    style: LineStyle,
    size: u32,
    ink: Ink,
) -> Result<Option<Damage>> {
    let layer = ctx.layers.current_layer()?;
    let mut mask = CoverageMask::for_segment(
        from,
        to,
        &footprint,
        ctx.layers.width(),
        ctx.layers.height(),
    );

    for p in line_points(from, to) {
        if state.last == Some(p) {
            continue;
        }
        if style.is_on(state.step, size) {
            mask.stamp(p, &footprint);
        }
        state.step += 1;
        state.last = Some(p);
    }

    let mut dirty: Option<PixelRect> = None;
    for (p, coverage) in mask.covered() {
        if !ctx.selection.contains(p) {
            continue;
        }
        let value = match ink {
            Ink::Erase => ERASE_COLOR,
            Ink::Color(color) if coverage >= 1.0 => color,
            Ink::Color(color) => blend_over(ctx.layers.pixel_at(layer, p)?, color, coverage),
        };
        ctx.layers.set_pixel(layer, p, value)?;
        dirty = union_opt(dirty, PixelRect::from_point(p));
    }

    Ok(dirty.map(|rect| Damage::Layer { index: layer, rect }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bresenham_visits_both_endpoints_once() {
        let pts: Vec<Point> = line_points(Point::new(0, 0), Point::new(5, 2)).collect();
        assert_eq!(pts.first(), Some(&Point::new(0, 0)));
        assert_eq!(pts.last(), Some(&Point::new(5, 2)));
        assert_eq!(pts.len(), 6);

        let single: Vec<Point> = line_points(Point::new(3, 3), Point::new(3, 3)).collect();
        assert_eq!(single, vec![Point::new(3, 3)]);
    }

    #[test]
    fn bresenham_walks_backwards_and_steep() {
        let pts: Vec<Point> = line_points(Point::new(2, 6), Point::new(1, 0)).collect();
        assert_eq!(pts.len(), 7);
        assert!(pts.windows(2).all(|w| w[1].y == w[0].y - 1));
    }

    #[test]
    fn unit_disk_covers_one_pixel_in_both_modes() {
        for anti_aliased in [false, true] {
            let cells: Vec<_> = Footprint::Disk { size: 1, anti_aliased }.cells().collect();
            assert_eq!(cells, vec![(0, 0, 1.0)]);
        }
    }

    #[test]
    fn hard_disk_matches_radius_test() {
        let fp = Footprint::Disk { size: 4, anti_aliased: false };
        let count = fp.cells().count();
        let expected = (-2..=2)
            .flat_map(|dy| (-2..=2).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= 4)
            .count();
        assert_eq!(count, expected);
        assert_eq!(count, 13);
    }

    #[test]
    fn anti_aliased_disk_has_partial_rim() {
        let fp = Footprint::Disk { size: 4, anti_aliased: true };
        assert_eq!(fp.coverage(0, 0), 1.0);
        let rim = fp.coverage(2, 1);
        assert!(rim > 0.0 && rim < 1.0);
        assert_eq!(fp.coverage(3, 3), 0.0);
    }

    #[test]
    fn square_footprint_is_exactly_size_squared() {
        for size in 1..6u32 {
            let fp = Footprint::Square { size };
            assert_eq!(fp.cells().count(), (size * size) as usize);
        }
        let (lo, hi) = Footprint::Square { size: 2 }.reach();
        assert_eq!((lo, hi), (-1, 0));
    }

    #[test]
    fn dash_patterns_start_on() {
        for style in [LineStyle::Solid, LineStyle::Dashed, LineStyle::Dotted] {
            assert!(style.is_on(0, 3));
        }
        let dashed: Vec<bool> = (0..5).map(|s| LineStyle::Dashed.is_on(s, 1)).collect();
        assert_eq!(dashed, vec![true, true, true, false, false]);
        let dotted: Vec<bool> = (0..6).map(|s| LineStyle::Dotted.is_on(s, 1)).collect();
        assert_eq!(dotted, vec![true, false, false, true, false, false]);
    }

    #[test]
    fn coverage_mask_keeps_maximum_and_clips() {
        let fp = Footprint::Disk { size: 3, anti_aliased: true };
        let mut mask = CoverageMask::for_segment(Point::new(0, 0), Point::new(1, 0), &fp, 4, 4);
        mask.stamp(Point::new(0, 0), &fp);
        mask.stamp(Point::new(1, 0), &fp);
        let covered: Vec<_> = mask.covered().collect();
        assert!(covered.iter().all(|(p, _)| p.x >= 0 && p.y >= 0));
        assert!(covered.iter().any(|(p, c)| *p == Point::new(1, 0) && *c == 1.0));
    }

    #[test]
    fn widest_disk_fills_small_mask_without_overflow() {
        let fp = Footprint::Disk {
            size: crate::components::tools::MAX_TOOL_SIZE,
            anti_aliased: true,
        };
        assert_eq!(fp.coverage(40_000, 40_000), 0.0);
        let mut mask = CoverageMask::for_segment(Point::new(2, 2), Point::new(2, 2), &fp, 10, 10);
        mask.stamp(Point::new(2, 2), &fp);
        let covered: Vec<_> = mask.covered().collect();
        assert_eq!(covered.len(), 100);
        assert!(covered.iter().all(|(_, c)| *c == 1.0));
    }

    #[test]
    fn bresenham_spans_the_coordinate_extremes() {
        let pts: Vec<Point> =
            line_points(Point::new(i32::MAX - 2, i32::MIN), Point::new(i32::MAX, i32::MIN + 2)).collect();
        assert_eq!(
            pts,
            vec![
                Point::new(i32::MAX - 2, i32::MIN),
                Point::new(i32::MAX - 1, i32::MIN + 1),
                Point::new(i32::MAX, i32::MIN + 2),
            ]
        );
        let mut far = line_points(Point::new(i32::MIN, 0), Point::new(i32::MAX, 0));
        assert_eq!(far.next(), Some(Point::new(i32::MIN, 0)));
        assert_eq!(far.next(), Some(Point::new(i32::MIN + 1, 0)));
    }
}
