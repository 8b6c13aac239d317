use crate::components::tools::{clamp_size, EraserShape, LineStyle};
use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::Point;
use crate::ops::raster::{paint_segment, Footprint, Ink, StrokeState};
use crate::ops::{EngineContext, ToolEngine};

/// Hard-edged eraser: resets pixels under a square or round footprint to
/// transparent.
#[derive(Default)]
pub struct EraserEngine {
    stroke: StrokeState,
}

impl EraserEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn segment(&mut self, ctx: &mut EngineContext<'_>, from: Point, to: Point) -> Result<Option<Damage>> {
        let size = clamp_size(ctx.params.eraser_size);
        let footprint = match ctx.params.eraser_shape {
            EraserShape::Square => Footprint::Square { size },
            EraserShape::Round => Footprint::Disk {
                size,
                anti_aliased: false,
            },
        };
        paint_segment(ctx, &mut self.stroke, from, to, footprint, LineStyle::Solid, size, Ink::Erase)
    }
}

impl ToolEngine for EraserEngine {
    fn name(&self) -> &'static str {
        "Eraser"
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
