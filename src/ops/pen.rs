use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::Point;
use crate::ops::{EngineContext, ToolEngine};

/// Placeholder for the pen tool. Accepts gestures and changes nothing.
#[derive(Default)]
pub struct PenEngine;

impl ToolEngine for PenEngine {
    fn name(&self) -> &'static str {
        "Pen"
    }

    fn on_start(&mut self, _ctx: &mut EngineContext<'_>, point: Point) -> Result<Option<Damage>> {
        log_info!(
            "Pen gesture at ({}, {}) ignored: pen tool has no drawing behaviour",
            point.x,
            point.y
        );
        Ok(None)
    }
}
