use crate::components::tools::MarqueeMode;
use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::Point;
use crate::ops::{EngineContext, ToolEngine};

/// Builds the selection from a drag gesture.
///
/// The selection mode is read once at pointer-down and held for the rest of
/// the gesture, so switching modes mid-drag never mixes shapes.
#[derive(Default)]
pub struct MarqueeEngine {
    active_mode: Option<MarqueeMode>,
}

impl MarqueeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode of the gesture in progress, if any.
    pub fn active_mode(&self) -> Option<MarqueeMode> {
        self.active_mode
    }
}

impl ToolEngine for MarqueeEngine {
    fn name(&self) -> &'static str {
        "Marquee"
    }

    fn on_start(&mut self, ctx: &mut EngineContext<'_>, point: Point) -> Result<Option<Damage>> {
        let mode = ctx.params.selection_mode;
        ctx.selection.clear();
        match mode {
            MarqueeMode::Rectangle => ctx.selection.begin_rectangle(point),
            MarqueeMode::Ellipse => ctx.selection.begin_ellipse(point),
            MarqueeMode::Freeform => ctx.selection.begin_polygon(point),
        }
        self.active_mode = Some(mode);
        Ok(Some(Damage::Selection))
    }

    fn on_drag(
        &mut self,
        ctx: &mut EngineContext<'_>,
        _previous: Point,
        current: Point,
    ) -> Result<Option<Damage>> {
        let Some(mode) = self.active_mode else {
            return Ok(None);
        };
        if !ctx.selection.is_building() {
            // Selection was cleared or replaced under us; the gesture is gone.
            self.active_mode = None;
            return Ok(None);
        }
        match mode {
            MarqueeMode::Rectangle | MarqueeMode::Ellipse => ctx.selection.update_drag(current),
            MarqueeMode::Freeform => ctx.selection.add_polygon_point(current),
        }
        Ok(Some(Damage::Selection))
    }

    fn on_end(&mut self, ctx: &mut EngineContext<'_>, _point: Point) -> Result<Option<Damage>> {
        if self.active_mode.take().is_none() || !ctx.selection.is_building() {
            return Ok(None);
        }
        ctx.selection.finalize();
        Ok(Some(Damage::Selection))
    }

    fn cancel(&mut self, ctx: &mut EngineContext<'_>) -> Option<Damage> {
        self.active_mode.take()?;
        if !ctx.selection.is_building() {
            return None;
        }
        ctx.selection.clear();
        Some(Damage::Selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::LayerStack;
    use crate::components::tools::ToolParameters;
    use crate::selection::{Selection, SelectionRegion};
    use image::Rgba;

    fn run(mode: MarqueeMode, pts: &[Point]) -> Selection {
        let mut stack = LayerStack::new(16, 16, Rgba([255, 255, 255, 255])).unwrap();
        let mut sel = Selection::new();
        let mut ctx = EngineContext {
            layers: &mut stack,
            selection: &mut sel,
            params: ToolParameters {
                selection_mode: mode,
                ..ToolParameters::default()
            },
        };
        let mut m = MarqueeEngine::new();
        m.on_start(&mut ctx, pts[0]).unwrap();
        for w in pts.windows(2) {
            m.on_drag(&mut ctx, w[0], w[1]).unwrap();
        }
        m.on_end(&mut ctx, pts[pts.len() - 1]).unwrap();
        sel
    }

    #[test]
    fn rectangle_gesture_spans_start_and_last_drag() {
        let sel = run(
            MarqueeMode::Rectangle,
            &[Point::new(0, 0), Point::new(2, 7), Point::new(4, 4)],
        );
        assert!(!sel.is_building());
        assert_eq!(
            sel.region(),
            &SelectionRegion::Rectangle {
                a: Point::new(0, 0),
                b: Point::new(4, 4)
            }
        );
    }

    #[test]
    fn freeform_appends_one_vertex_per_move() {
        let pts = [
            Point::new(1, 1),
            Point::new(8, 1),
            Point::new(8, 8),
            Point::new(1, 8),
        ];
        let sel = run(MarqueeMode::Freeform, &pts);
        assert_eq!(sel.region(), &SelectionRegion::Polygon(pts.to_vec()));
        assert!(sel.contains(Point::new(4, 4)));
        assert!(!sel.contains(Point::new(9, 4)));
    }

    #[test]
    fn new_gesture_replaces_previous_selection() {
        let mut stack = LayerStack::new(8, 8, Rgba([0, 0, 0, 255])).unwrap();
        let mut sel = Selection::new();
        sel.begin_ellipse(Point::new(0, 0));
        sel.update_drag(Point::new(7, 7));
        sel.finalize();
        let mut ctx = EngineContext {
            layers: &mut stack,
            selection: &mut sel,
            params: ToolParameters::default(),
        };
        MarqueeEngine::new()
            .on_start(&mut ctx, Point::new(3, 3))
            .unwrap();
        assert_eq!(
            sel.region(),
            &SelectionRegion::Rectangle {
                a: Point::new(3, 3),
                b: Point::new(3, 3)
            }
        );
        assert!(sel.is_building());
    }

    #[test]
    fn cancel_drops_an_open_gesture_only() {
        let mut stack = LayerStack::new(8, 8, Rgba([0, 0, 0, 255])).unwrap();
        let mut sel = Selection::new();
        let mut ctx = EngineContext {
            layers: &mut stack,
            selection: &mut sel,
            params: ToolParameters::default(),
        };
        let mut m = MarqueeEngine::new();
        assert_eq!(m.cancel(&mut ctx), None);
        m.on_start(&mut ctx, Point::new(1, 1)).unwrap();
        m.on_drag(&mut ctx, Point::new(1, 1), Point::new(5, 5))
            .unwrap();
        assert_eq!(m.cancel(&mut ctx), Some(Damage::Selection));
        assert!(!sel.is_some());
    }

    #[test]
    fn mode_is_locked_for_the_whole_gesture() {
        let mut stack = LayerStack::new(8, 8, Rgba([0, 0, 0, 255])).unwrap();
        let mut sel = Selection::new();
        let mut ctx = EngineContext {
            layers: &mut stack,
            selection: &mut sel,
            params: ToolParameters::default(),
        };
        let mut m = MarqueeEngine::new();
        m.on_start(&mut ctx, Point::new(1, 1)).unwrap();
        ctx.params.selection_mode = MarqueeMode::Freeform;
        m.on_drag(&mut ctx, Point::new(1, 1), Point::new(6, 2))
            .unwrap();
        assert_eq!(m.active_mode(), Some(MarqueeMode::Rectangle));
        assert_eq!(
            sel.region(),
            &SelectionRegion::Rectangle {
                a: Point::new(1, 1),
                b: Point::new(6, 2)
            }
        );
    }
}
