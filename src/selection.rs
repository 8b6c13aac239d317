// ============================================================================
// SELECTION SYSTEM
// ============================================================================

use crate::geometry::{PixelRect, Point};

/// Region of interest that gates tool writes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SelectionRegion {
    /// Nothing selected: every pixel is writable.
    #[default]
    None,
    /// Axis-aligned box spanned by two corners, boundary inclusive.
    Rectangle { a: Point, b: Point },
    /// Ellipse inscribed in the two-corner box, boundary inclusive.
    Ellipse { a: Point, b: Point },
    /// Freeform outline, implicitly closed from the last point to the first.
    Polygon(Vec<Point>),
}

impl SelectionRegion {
    pub fn contains(&self, p: Point) -> bool {
        match self {
            SelectionRegion::None => true,
            SelectionRegion::Rectangle { a, b } => PixelRect::from_corners(*a, *b).contains(p),
            SelectionRegion::Ellipse { a, b } => ellipse_contains(*a, *b, p),
            SelectionRegion::Polygon(points) => polygon_contains(points, p),
        }
    }

    /// Bounding box of the region; `None` when nothing is selected.
    pub fn bounds(&self) -> Option<PixelRect> {
        match self {
            SelectionRegion::None => None,
            SelectionRegion::Rectangle { a, b } | SelectionRegion::Ellipse { a, b } => {
                Some(PixelRect::from_corners(*a, *b))
            }
            SelectionRegion::Polygon(points) => {
                let first = points.first()?;
                Some(
                    points
                        .iter()
                        .fold(PixelRect::from_point(*first), |acc, p| {
                            acc.union(&PixelRect::from_point(*p))
                        }),
                )
            }
        }
    }
}

/// Ellipse membership in exact integer arithmetic.
///
/// Working on doubled coordinates keeps half-pixel centres integral:
/// `(dx/rx)² + (dy/ry)² <= 1` becomes `dx²·ry² + dy²·rx² <= rx²·ry²`.
/// A zero radius collapses that axis to the centre line.
fn ellipse_contains(a: Point, b: Point, p: Point) -> bool {
    let rx = (i64::from(b.x) - i64::from(a.x)).abs();
    let ry = (i64::from(b.y) - i64::from(a.y)).abs();
    let dx = 2 * i64::from(p.x) - (i64::from(a.x) + i64::from(b.x));
    let dy = 2 * i64::from(p.y) - (i64::from(a.y) + i64::from(b.y));
    if dx.abs() > rx || dy.abs() > ry {
        return false;
    }

    match (rx, ry) {
        (0, 0) => dx == 0 && dy == 0,
        (0, _) => dx == 0,
        (_, 0) => dy == 0,
        _ => {
            // Each term is at most rx²·ry² < 2^128, so compare by subtraction.
            let sq = |v: i64| u128::from(v.unsigned_abs()) * u128::from(v.unsigned_abs());
            let (rx2, ry2) = (sq(rx), sq(ry));
            let limit = rx2 * ry2;
            let y_term = sq(dy) * rx2;
            sq(dx) * ry2 <= limit - y_term
        }
    }
}

/// Point-in-polygon over the implicitly closed outline.
///
/// Points on an edge count as inside (matching the inclusive rectangle and
/// ellipse tests); everything else uses even-odd ray casting. One vertex
/// selects that pixel alone, two vertices select the segment between them.
fn polygon_contains(points: &[Point], p: Point) -> bool {
    let n = points.len();
    if n == 0 {
        return false;
    }
    if (0..n).any(|i| on_segment(points[i], points[(i + 1) % n], p)) {
        return true;
    }
    if n < 3 {
        return false;
    }

    let (px, py) = (i128::from(p.x), i128::from(p.y));
    let mut inside = false;
    for i in 0..n {
        let j = (i + n - 1) % n;
        let (xi, yi) = (i128::from(points[i].x), i128::from(points[i].y));
        let (xj, yj) = (i128::from(points[j].x), i128::from(points[j].y));
        if (yi > py) != (yj > py) {
            // Crossing x compared without division: px < xi + (py-yi)(xj-xi)/(yj-yi)
            let lhs = (px - xi) * (yj - yi);
            let rhs = (py - yi) * (xj - xi);
            let crosses = if yj > yi { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let w = i128::from;
    let (ax, ay, bx, by) = (w(a.x), w(a.y), w(b.x), w(b.y));
    let (px, py) = (w(p.x), w(p.y));
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    cross == 0 && px >= ax.min(bx) && px <= ax.max(bx) && py >= ay.min(by) && py <= ay.max(by)
}

/// Current selection plus whether a marquee gesture is still shaping it.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    region: SelectionRegion,
    building: bool,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(&self) -> &SelectionRegion {
        &self.region
    }

    /// True iff the region is not `None`.
    pub fn is_some(&self) -> bool {
        !matches!(self.region, SelectionRegion::None)
    }

    /// True between a marquee's start and its finalize/clear.
    pub fn is_building(&self) -> bool {
        self.building
    }

    pub fn contains(&self, p: Point) -> bool {
        self.region.contains(p)
    }

    pub fn bounds(&self) -> Option<PixelRect> {
        self.region.bounds()
    }

    pub fn begin_rectangle(&mut self, p: Point) {
        self.region = SelectionRegion::Rectangle { a: p, b: p };
        self.building = true;
    }

    pub fn begin_ellipse(&mut self, p: Point) {
        self.region = SelectionRegion::Ellipse { a: p, b: p };
        self.building = true;
    }

    /// Start a freeform outline with `p` as its first vertex.
    pub fn begin_polygon(&mut self, p: Point) {
        self.region = SelectionRegion::Polygon(vec![p]);
        self.building = true;
    }

    /// Move the second corner of a rectangle/ellipse. Ignored otherwise.
    pub fn update_drag(&mut self, p: Point) {
        if let SelectionRegion::Rectangle { b, .. } | SelectionRegion::Ellipse { b, .. } =
            &mut self.region
        {
            *b = p;
        }
    }

    /// Append a vertex to the freeform outline. Ignored for other regions.
    pub fn add_polygon_point(&mut self, p: Point) {
        if let SelectionRegion::Polygon(points) = &mut self.region {
            points.push(p);
        }
    }

    /// Stop shaping; the region is kept exactly as it is.
    pub fn finalize(&mut self) {
        self.building = false;
    }

    pub fn clear(&mut self) {
        self.region = SelectionRegion::None;
        self.building = false;
    }
}
