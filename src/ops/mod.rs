pub mod brush;
pub mod eraser;
pub mod marquee;
pub mod pen;
pub mod raster;

use crate::canvas::LayerStack;
use crate::components::tools::ToolParameters;
use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::Point;
use crate::selection::Selection;

/// What an engine may touch during one pointer phase. `params` is a snapshot
/// taken for this call only.
pub struct EngineContext<'a> {
    pub layers: &'a mut LayerStack,
    pub selection: &'a mut Selection,
    pub params: ToolParameters,
}

/// One implementation per tool kind. Phases an engine does not care about
/// default to no-ops.
pub trait ToolEngine {
    fn name(&self) -> &'static str;

    fn on_start(&mut self, _ctx: &mut EngineContext<'_>, _point: Point) -> Result<Option<Damage>> {
        Ok(None)
    }

    fn on_drag(
        &mut self,
        _ctx: &mut EngineContext<'_>,
        _previous: Point,
        _current: Point,
    ) -> Result<Option<Damage>> {
        Ok(None)
    }

    fn on_end(&mut self, _ctx: &mut EngineContext<'_>, _point: Point) -> Result<Option<Damage>> {
        Ok(None)
    }

    /// Abandon whatever gesture is open. Pixels already written stay.
    fn cancel(&mut self, _ctx: &mut EngineContext<'_>) -> Option<Damage> {
        None
    }
}
