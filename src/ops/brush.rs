use crate::components::tools::clamp_size;
use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::Point;
use crate::ops::raster::{paint_segment, Footprint, Ink, StrokeState};
use crate::ops::{EngineContext, ToolEngine};

/// Round brush: stamps a disk along the pointer path in the brush colour.
#[derive(Default)]
pub struct BrushEngine {
    stroke: StrokeState,
}

impl BrushEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn segment(&mut self, ctx: &mut EngineContext<'_>, from: Point, to: Point) -> Result<Option<Damage>> {
        let p = &ctx.params;
        let size = clamp_size(p.brush_size);
        let footprint = Footprint::Disk {
            size,
            anti_aliased: p.anti_aliasing,
        };
        let (style, ink) = (p.line_style, Ink::Color(p.brush_color));
        paint_segment(ctx, &mut self.stroke, from, to, footprint, style, size, ink)
    }
}

impl ToolEngine for BrushEngine {
    fn name(&self) -> &'static str {
        "Brush"
    }

    fn on_start(&mut self, ctx: &mut EngineContext<'_>, point: Point) -> Result<Option<Damage>> {
        self.stroke.reset();
        self.segment(ctx, point, point)
    }

    fn on_drag(
        &mut self,
        ctx: &mut EngineContext<'_>,
        previous: Point,
        current: Point,
    ) -> Result<Option<Damage>> {
        self.segment(ctx, previous, current)
    }

    fn on_end(&mut self, _ctx: &mut EngineContext<'_>, _point: Point) -> Result<Option<Damage>> {
        self.stroke.reset();
        Ok(None)
    }

    fn cancel(&mut self, _ctx: &mut EngineContext<'_>) -> Option<Damage> {
        self.stroke.reset();
        None
    }
}
