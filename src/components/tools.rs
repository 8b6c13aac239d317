use std::sync::{Arc, RwLock};

use image::Rgba;

use crate::canvas::LayerStack;
use crate::damage::Damage;
use crate::error::Result;
use crate::geometry::{union_opt, PixelRect, Point};
use crate::ops::brush::BrushEngine;
use crate::ops::eraser::EraserEngine;
use crate::ops::marquee::MarqueeEngine;
use crate::ops::pen::PenEngine;
use crate::ops::{EngineContext, ToolEngine};
use crate::selection::Selection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Marquee,
    Pen,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::Marquee => "Marquee",
            Tool::Pen => "Pen",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Tool::Brush, Tool::Eraser, Tool::Marquee, Tool::Pen]
    }

    /// Numeric tool id as sent by toolbar buttons (0..=3).
    pub fn from_index(index: u8) -> Option<Tool> {
        Tool::all().get(index as usize).copied()
    }

    pub fn parse(name: &str) -> Option<Tool> {
        match name.trim().to_ascii_lowercase().as_str() {
            "brush" => Some(Tool::Brush),
            "erase" | "eraser" => Some(Tool::Eraser),
            "marquee" | "select" | "selection" => Some(Tool::Marquee),
            "pen" => Some(Tool::Pen),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    pub fn label(&self) -> &'static str {
        match self {
            LineStyle::Solid => "Solid",
            LineStyle::Dashed => "Dashed",
            LineStyle::Dotted => "Dotted",
        }
    }

    pub fn all() -> &'static [LineStyle] {
        &[LineStyle::Solid, LineStyle::Dashed, LineStyle::Dotted]
    }

    pub fn parse(name: &str) -> Option<LineStyle> {
        LineStyle::all()
            .iter()
            .copied()
            .find(|s| s.label().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EraserShape {
    #[default]
    Square,
    Round,
}

impl EraserShape {
    pub fn label(&self) -> &'static str {
        match self {
            EraserShape::Square => "Square",
            EraserShape::Round => "Round",
        }
    }

    pub fn parse(name: &str) -> Option<EraserShape> {
        [EraserShape::Square, EraserShape::Round]
            .into_iter()
            .find(|s| s.label().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MarqueeMode {
    #[default]
    Rectangle,
    Ellipse,
    Freeform,
}

impl MarqueeMode {
    pub fn label(&self) -> &'static str {
        match self {
            MarqueeMode::Rectangle => "Rectangle",
            MarqueeMode::Ellipse => "Ellipse",
            MarqueeMode::Freeform => "Freeform",
        }
    }

    pub fn parse(name: &str) -> Option<MarqueeMode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rectangle" | "rect" => Some(MarqueeMode::Rectangle),
            "ellipse" => Some(MarqueeMode::Ellipse),
            "freeform" | "lasso" | "polygon" => Some(MarqueeMode::Freeform),
            _ => None,
        }
    }
}

/// Settings every engine reads. Sizes are kept ≥ 1 by the setters.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolParameters {
    pub brush_size: u32,
    pub brush_color: Rgba<u8>,
    pub line_style: LineStyle,
    pub anti_aliasing: bool,
    pub eraser_size: u32,
    pub eraser_shape: EraserShape,
    pub selection_mode: MarqueeMode,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            brush_size: 1,
            brush_color: Rgba([0, 0, 0, 255]),
            line_style: LineStyle::Solid,
            anti_aliasing: false,
            eraser_size: 10,
            eraser_shape: EraserShape::Square,
            selection_mode: MarqueeMode::Rectangle,
        }
    }
}

impl ToolParameters {
    /// Apply one `key value` pair (script `set` lines, settings file).
    pub fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        let value = value.trim();
        match key.trim() {
            "brush_size" => self.brush_size = parse_size(value)?,
            "brush_color" => self.brush_color = parse_color(value)?,
            "line_style" => {
                self.line_style =
                    LineStyle::parse(value).ok_or_else(|| format!("unknown line style '{value}'"))?
            }
            "anti_aliasing" => self.anti_aliasing = parse_bool(value)?,
            "eraser_size" => self.eraser_size = parse_size(value)?,
            "eraser_shape" => {
                self.eraser_shape = EraserShape::parse(value)
                    .ok_or_else(|| format!("unknown eraser shape '{value}'"))?
            }
            "selection_mode" => {
                self.selection_mode = MarqueeMode::parse(value)
                    .ok_or_else(|| format!("unknown selection mode '{value}'"))?
            }
            other => return Err(format!("unknown tool parameter '{other}'")),
        }
        Ok(())
    }
}

/// Largest brush or eraser diameter. Twice the widest canvas, so a dab from
/// any corner still reaches the opposite one.
pub const MAX_TOOL_SIZE: u32 = 2 * crate::canvas::MAX_CANVAS_DIM;

pub fn clamp_size(size: u32) -> u32 {
    size.clamp(1, MAX_TOOL_SIZE)
}

fn parse_size(value: &str) -> std::result::Result<u32, String> {
    value
        .parse::<u32>()
        .map(clamp_size)
        .map_err(|_| format!("invalid size '{value}'"))
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(format!("invalid boolean '{value}'")),
    }
}

/// `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
pub fn parse_color(value: &str) -> std::result::Result<Rgba<u8>, String> {
    let hex = value.trim().trim_start_matches('#');
    let byte = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| format!("invalid colour '{value}'"))
    };
    match hex.len() {
        6 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => Err(format!("invalid colour '{value}'")),
    }
}

pub fn format_color(c: Rgba<u8>) -> String {
    format!("#{:02X}{:02X}{:02X}{:02X}", c[0], c[1], c[2], c[3])
}

/// Shared handle to the live tool parameters.
///
/// Cloned into whatever edits parameters (toolbar, script, settings) and into
/// the dispatcher, which snapshots it once per pointer event.
#[derive(Clone, Default)]
pub struct ToolParameterStore {
    inner: Arc<RwLock<ToolParameters>>,
}

impl ToolParameterStore {
    pub fn new(params: ToolParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    pub fn snapshot(&self) -> ToolParameters {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ToolParameters) -> R) -> R {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn set_brush_size(&self, size: u32) {
        self.update(|p| p.brush_size = clamp_size(size));
    }

    pub fn set_brush_color(&self, color: Rgba<u8>) {
        self.update(|p| p.brush_color = color);
    }

    pub fn set_line_style(&self, style: LineStyle) {
        self.update(|p| p.line_style = style);
    }

    pub fn set_anti_aliasing(&self, on: bool) {
        self.update(|p| p.anti_aliasing = on);
    }

    pub fn set_eraser_size(&self, size: u32) {
        self.update(|p| p.eraser_size = clamp_size(size));
    }

    pub fn set_eraser_shape(&self, shape: EraserShape) {
        self.update(|p| p.eraser_shape = shape);
    }

    pub fn set_selection_mode(&self, mode: MarqueeMode) {
        self.update(|p| p.selection_mode = mode);
    }
}

/// Accumulates the dirty area of the gesture in progress.
#[derive(Default)]
struct GestureTracker {
    active: bool,
    tool: Tool,
    bounds: Option<PixelRect>,
    events: u32,
}

impl GestureTracker {
    fn start(&mut self, tool: Tool) {
        self.active = true;
        self.tool = tool;
        self.bounds = None;
        self.events = 0;
    }

    fn record(&mut self, damage: &Option<Damage>) {
        self.events += 1;
        if let Some(Damage::Layer { rect, .. }) = damage {
            self.bounds = union_opt(self.bounds, *rect);
        }
    }

    fn finish(&mut self) -> Option<(Tool, Option<PixelRect>, u32)> {
        if !self.active {
            return None;
        }
        self.active = false;
        Some((self.tool, self.bounds.take(), self.events))
    }
}

/// Routes pointer events to the engine of the current tool.
///
/// Tool switches take effect immediately, even mid-gesture: the following
/// events simply go to the new tool's engine.
pub struct ToolDispatcher {
    current: Tool,
    params: ToolParameterStore,
    brush: BrushEngine,
    eraser: EraserEngine,
    marquee: MarqueeEngine,
    pen: PenEngine,
    last_point: Option<Point>,
    gesture: GestureTracker,
}

impl ToolDispatcher {
    pub fn new(params: ToolParameterStore) -> Self {
        Self {
            current: Tool::default(),
            params,
            brush: BrushEngine::new(),
            eraser: EraserEngine::new(),
            marquee: MarqueeEngine::new(),
            pen: PenEngine,
            last_point: None,
            gesture: GestureTracker::default(),
        }
    }

    pub fn current_tool(&self) -> Tool {
        self.current
    }

    pub fn params(&self) -> &ToolParameterStore {
        &self.params
    }

    pub fn select_tool(&mut self, tool: Tool) {
        if tool != self.current {
            log_info!("Tool switched: {} -> {}", self.current.label(), tool.label());
        }
        self.current = tool;
    }

    fn engine_mut(&mut self) -> &mut dyn ToolEngine {
        match self.current {
            Tool::Brush => &mut self.brush,
            Tool::Eraser => &mut self.eraser,
            Tool::Marquee => &mut self.marquee,
            Tool::Pen => &mut self.pen,
        }
    }

    pub fn pointer_down(
        &mut self,
        layers: &mut LayerStack,
        selection: &mut Selection,
        point: Point,
    ) -> Result<Option<Damage>> {
        let mut ctx = EngineContext {
            layers,
            selection,
            params: self.params.snapshot(),
        };
        self.last_point = Some(point);
        self.gesture.start(self.current);
        let damage = self.engine_mut().on_start(&mut ctx, point)?;
        self.gesture.record(&damage);
        Ok(damage)
    }

    /// `previous` is the last position seen by the dispatcher, or `point`
    /// itself when there is none. Outside a gesture (hover) only the last
    /// position is updated and no engine runs.
    pub fn pointer_move(
        &mut self,
        layers: &mut LayerStack,
        selection: &mut Selection,
        point: Point,
    ) -> Result<Option<Damage>> {
        if !self.gesture.active {
            self.last_point = Some(point);
            return Ok(None);
        }
        let previous = self.last_point.unwrap_or(point);
        let mut ctx = EngineContext {
            layers,
            selection,
            params: self.params.snapshot(),
        };
        self.last_point = Some(point);
        let damage = self.engine_mut().on_drag(&mut ctx, previous, point)?;
        self.gesture.record(&damage);
        Ok(damage)
    }

    pub fn pointer_up(
        &mut self,
        layers: &mut LayerStack,
        selection: &mut Selection,
        point: Point,
    ) -> Result<Option<Damage>> {
        let mut ctx = EngineContext {
            layers,
            selection,
            params: self.params.snapshot(),
        };
        self.last_point = Some(point);
        let damage = self.engine_mut().on_end(&mut ctx, point)?;
        self.gesture.record(&damage);
        if let Some((tool, bounds, events)) = self.gesture.finish() {
            match bounds {
                Some(b) => {
                    log_info!(
                        "{} gesture finished: {} events, dirty ({}, {})-({}, {})",
                        tool.label(),
                        events,
                        b.min.x,
                        b.min.y,
                        b.max.x,
                        b.max.y
                    );
                }
                None => {
                    log_info!("{} gesture finished: {} events", tool.label(), events);
                }
            }
        }
        Ok(damage)
    }

    /// Abandon any open gesture on every engine. An in-progress marquee is
    /// dropped; painted pixels are left as they are.
    pub fn cancel_gesture(&mut self, layers: &mut LayerStack, selection: &mut Selection) -> Option<Damage> {
        let mut ctx = EngineContext {
            layers,
            selection,
            params: self.params.snapshot(),
        };
        self.last_point = None;
        if let Some((tool, _, _)) = self.gesture.finish() {
            log_warn!("{} gesture cancelled", tool.label());
        }
        self.brush.cancel(&mut ctx);
        self.eraser.cancel(&mut ctx);
        self.pen.cancel(&mut ctx);
        self.marquee.cancel(&mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionRegion;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn setup() -> (ToolDispatcher, LayerStack, Selection) {
        (
            ToolDispatcher::new(ToolParameterStore::default()),
            LayerStack::new(10, 10, WHITE).unwrap(),
            Selection::new(),
        )
    }

    #[test]
    fn tool_ids_follow_toolbar_order() {
        assert_eq!(Tool::from_index(0), Some(Tool::Brush));
        assert_eq!(Tool::from_index(1), Some(Tool::Eraser));
        assert_eq!(Tool::from_index(2), Some(Tool::Marquee));
        assert_eq!(Tool::from_index(3), Some(Tool::Pen));
        assert_eq!(Tool::from_index(4), None);
        assert_eq!(Tool::parse("Erase"), Some(Tool::Eraser));
    }

    #[test]
    fn parameters_parse_from_text() {
        let mut p = ToolParameters::default();
        p.set("brush_size", "0").unwrap();
        assert_eq!(p.brush_size, 1);
        p.set("brush_size", "999999").unwrap();
        assert_eq!(p.brush_size, MAX_TOOL_SIZE);
        p.set("brush_color", "#ff000080").unwrap();
        assert_eq!(p.brush_color, Rgba([255, 0, 0, 128]));
        p.set("line_style", "dotted").unwrap();
        p.set("anti_aliasing", "on").unwrap();
        p.set("eraser_shape", "ROUND").unwrap();
        p.set("selection_mode", "lasso").unwrap();
        assert_eq!(p.line_style, LineStyle::Dotted);
        assert!(p.anti_aliasing);
        assert_eq!(p.eraser_shape, EraserShape::Round);
        assert_eq!(p.selection_mode, MarqueeMode::Freeform);
        assert!(p.set("brush_size", "big").is_err());
        assert!(p.set("opacity", "1").is_err());
        assert_eq!(format_color(p.brush_color), "#FF000080");
    }

    #[test]
    fn store_edits_are_seen_by_later_snapshots_only() {
        let store = ToolParameterStore::default();
        let before = store.snapshot();
        let ui = store.clone();
        ui.set_brush_size(7);
        ui.set_eraser_size(0);
        assert_eq!(before.brush_size, 1);
        assert_eq!(store.snapshot().brush_size, 7);
        assert_eq!(store.snapshot().eraser_size, 1);
    }

    #[test]
    fn hover_outside_a_gesture_writes_nothing() {
        let (mut d, mut stack, mut sel) = setup();
        assert!(d.pointer_move(&mut stack, &mut sel, Point::new(3, 3)).unwrap().is_none());
        assert_eq!(stack.pixel_at(0, Point::new(3, 3)).unwrap(), WHITE);

        d.pointer_down(&mut stack, &mut sel, Point::new(1, 1)).unwrap();
        d.pointer_up(&mut stack, &mut sel, Point::new(1, 1)).unwrap();
        assert!(d.pointer_move(&mut stack, &mut sel, Point::new(8, 8)).unwrap().is_none());
        assert_eq!(stack.pixel_at(0, Point::new(1, 1)).unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(stack.pixel_at(0, Point::new(5, 5)).unwrap(), WHITE);
        assert_eq!(stack.pixel_at(0, Point::new(8, 8)).unwrap(), WHITE);
    }

    #[test]
    fn size_change_applies_from_next_segment() {
        let (mut d, mut stack, mut sel) = setup();
        let store = d.params().clone();
        d.pointer_down(&mut stack, &mut sel, Point::new(1, 1)).unwrap();
        store.set_brush_size(3);
        d.pointer_move(&mut stack, &mut sel, Point::new(6, 6)).unwrap();
        d.pointer_up(&mut stack, &mut sel, Point::new(6, 6)).unwrap();
        // First dab stayed one pixel wide.
        assert_eq!(stack.pixel_at(0, Point::new(0, 1)).unwrap(), WHITE);
        // The drag segment used the new width.
        assert_ne!(stack.pixel_at(0, Point::new(7, 6)).unwrap(), WHITE);
    }

    #[test]
    fn tool_switch_mid_gesture_routes_up_to_new_engine() {
        let (mut d, mut stack, mut sel) = setup();
        d.pointer_down(&mut stack, &mut sel, Point::new(5, 5)).unwrap();
        d.select_tool(Tool::Marquee);
        let dmg = d.pointer_up(&mut stack, &mut sel, Point::new(5, 5)).unwrap();
        assert_eq!(dmg, None);
        assert_eq!(stack.pixel_at(0, Point::new(5, 5)).unwrap(), Rgba([0, 0, 0, 255]));
        assert!(!sel.is_some());
    }

    #[test]
    fn cancel_drops_marquee_and_keeps_paint() {
        let (mut d, mut stack, mut sel) = setup();
        d.pointer_down(&mut stack, &mut sel, Point::new(2, 2)).unwrap();
        d.select_tool(Tool::Marquee);
        d.pointer_down(&mut stack, &mut sel, Point::new(0, 0)).unwrap();
        d.pointer_move(&mut stack, &mut sel, Point::new(4, 4)).unwrap();
        assert!(sel.is_building());
        assert_eq!(d.cancel_gesture(&mut stack, &mut sel), Some(Damage::Selection));
        assert_eq!(sel.region(), &SelectionRegion::None);
        assert_eq!(stack.pixel_at(0, Point::new(2, 2)).unwrap(), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn pen_never_touches_pixels() {
        let (mut d, mut stack, mut sel) = setup();
        d.select_tool(Tool::Pen);
        assert_eq!(d.pointer_down(&mut stack, &mut sel, Point::new(1, 1)).unwrap(), None);
        assert_eq!(d.pointer_move(&mut stack, &mut sel, Point::new(8, 8)).unwrap(), None);
        assert_eq!(d.pointer_up(&mut stack, &mut sel, Point::new(8, 8)).unwrap(), None);
        assert_eq!(stack.composite(), LayerStack::new(10, 10, WHITE).unwrap().composite());
    }
}
