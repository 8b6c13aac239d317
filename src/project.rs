use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};

use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{Layer, LayerStack};
use crate::components::tools::{Tool, ToolDispatcher, ToolParameterStore};
use crate::damage::{Damage, DamageNotifier};
use crate::error::{EditorError, Result};
use crate::geometry::Point;
use crate::io::{self, ExportFormat, ExportOptions, IoResult};
use crate::selection::Selection;
use crate::settings::EngineSettings;

/// Single open document: the layer stack, its selection, and the tool
/// routing that edits them. All mutation happens through `&mut self` on the
/// event thread.
pub struct Project {
    pub id: Uuid,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,
    /// `None` for unsaved/untitled documents.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    pub export_options: ExportOptions,
    stack: LayerStack,
    selection: Selection,
    dispatcher: ToolDispatcher,
    notifier: DamageNotifier,
}

impl Project {
    pub fn new_untitled(
        untitled_counter: usize,
        width: u32,
        height: u32,
        background: Rgba<u8>,
        params: ToolParameterStore,
    ) -> Result<Self> {
        Ok(Self::with_stack(
            format!("Untitled-{}", untitled_counter),
            None,
            LayerStack::new(width, height, background)?,
            params,
        ))
    }

    /// Blank canvas and tool defaults taken from `settings`.
    pub fn from_settings(untitled_counter: usize, settings: &EngineSettings) -> Result<Self> {
        let mut project = Self::new_untitled(
            untitled_counter,
            settings.canvas_width,
            settings.canvas_height,
            settings.background,
            ToolParameterStore::new(settings.tools.clone()),
        )?;
        project.export_options = settings.export_options();
        Ok(project)
    }

    /// Open an image or `.pmig` project as a new document.
    pub fn from_file(path: &Path, params: ToolParameterStore) -> Result<Self> {
        let stack = load_any(path)?;
        Ok(Self::with_stack(
            name_from_path(path),
            Some(path.to_path_buf()),
            stack,
            params,
        ))
    }

    fn with_stack(
        name: String,
        path: Option<PathBuf>,
        stack: LayerStack,
        params: ToolParameterStore,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            path,
            is_dirty: false,
            export_options: ExportOptions::default(),
            stack,
            selection: Selection::new(),
            dispatcher: ToolDispatcher::new(params),
            notifier: DamageNotifier::new(),
        }
    }

    pub fn layers(&self) -> &LayerStack {
        &self.stack
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn params(&self) -> &ToolParameterStore {
        self.dispatcher.params()
    }

    /// Receive damage events for this document.
    pub fn subscribe(&mut self) -> Receiver<Damage> {
        self.notifier.subscribe()
    }

    pub fn current_tool(&self) -> Tool {
        self.dispatcher.current_tool()
    }

    pub fn select_tool(&mut self, tool: Tool) {
        self.dispatcher.select_tool(tool);
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    fn emit(&mut self, damage: Damage) {
        if matches!(damage, Damage::Layer { .. } | Damage::Document) {
            self.is_dirty = true;
        }
        self.notifier.notify(damage);
    }

    fn settle(&mut self, outcome: Result<Option<Damage>>) -> Result<()> {
        match outcome {
            Ok(Some(damage)) => {
                self.emit(damage);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    fn report(&self, e: &EditorError) {
        if e.is_recoverable() {
            log_warn!("{}: {}", self.name, e);
        } else {
            log_err!("{}: integration fault: {}", self.name, e);
        }
    }

    // ========================================================================
    // POINTER EVENTS
    // ========================================================================

    pub fn pointer_down(&mut self, point: Point) -> Result<()> {
        let outcome = self
            .dispatcher
            .pointer_down(&mut self.stack, &mut self.selection, point);
        self.settle(outcome)
    }

    pub fn pointer_move(&mut self, point: Point) -> Result<()> {
        let outcome = self
            .dispatcher
            .pointer_move(&mut self.stack, &mut self.selection, point);
        self.settle(outcome)
    }

    pub fn pointer_up(&mut self, point: Point) -> Result<()> {
        let outcome = self
            .dispatcher
            .pointer_up(&mut self.stack, &mut self.selection, point);
        self.settle(outcome)
    }

    /// Abandon the open gesture (focus loss, Escape).
    pub fn cancel_gesture(&mut self) {
        if let Some(damage) = self
            .dispatcher
            .cancel_gesture(&mut self.stack, &mut self.selection)
        {
            self.emit(damage);
        }
    }

    pub fn clear_selection(&mut self) {
        let had = self.selection.is_some();
        self.selection.clear();
        if had {
            self.emit(Damage::Selection);
        }
    }

    // ========================================================================
    // LAYERS
    // ========================================================================

    /// Push a transparent layer on top and make it current.
    pub fn new_layer(&mut self, name: impl Into<String>) -> usize {
        let index = self.stack.push_layer(name);
        // Index was just created, so this cannot fail.
        let _ = self.stack.set_current_layer(index);
        self.emit(Damage::Document);
        index
    }

    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<()> {
        let outcome = self.stack.insert_layer(index, layer).map(|_| Some(Damage::Document));
        self.settle(outcome)
    }

    pub fn remove_layer(&mut self, index: usize) -> Result<Layer> {
        match self.stack.remove_layer(index) {
            Ok(layer) => {
                self.emit(Damage::Document);
                Ok(layer)
            }
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    pub fn set_current_layer(&mut self, index: usize) -> Result<()> {
        let outcome = self.stack.set_current_layer(index).map(|_| None);
        self.settle(outcome)
    }

    pub fn composite(&self) -> RgbaImage {
        self.stack.composite()
    }

    // ========================================================================
    // FILES
    // ========================================================================

    /// Replace the document with the contents of `path`. On failure nothing
    /// changes: stack, selection and path stay as they were.
    pub fn open_image(&mut self, path: &Path) -> Result<()> {
        let stack = match load_any(path) {
            Ok(stack) => stack,
            Err(e) => {
                log_warn!("Open FAILED for {}: {}", path.display(), e);
                return Err(e);
            }
        };
        self.dispatcher
            .cancel_gesture(&mut self.stack, &mut self.selection);
        self.stack = stack;
        self.selection.clear();
        self.path = Some(path.to_path_buf());
        self.name = name_from_path(path);
        self.notifier.notify(Damage::Document);
        self.is_dirty = false;
        log_info!(
            "Opened {} ({}x{}, {} layer(s))",
            path.display(),
            self.stack.width(),
            self.stack.height(),
            self.stack.len()
        );
        Ok(())
    }

    /// Export the composited image. The document is marked clean only for
    /// lossless formats, which reproduce it exactly.
    pub fn save_image(&mut self, path: &Path, format_token: &str) -> Result<()> {
        match io::save_image(&self.stack, path, format_token, self.export_options) {
            Ok(()) => {
                log_info!("Saved {} as {}", path.display(), format_token);
                if ExportFormat::from_token(format_token).is_some_and(|f| f.is_lossless())
                    && self.stack.len() == 1
                {
                    self.is_dirty = false;
                }
                Ok(())
            }
            Err(e) => {
                log_warn!("Save FAILED for {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    /// Export from a snapshot on a worker thread; editing may continue.
    pub fn export_in_background(&self, path: PathBuf, format: ExportFormat, sender: Sender<IoResult>) {
        io::spawn_export(&self.stack, path, format, self.export_options, sender);
    }

    pub fn save_project(&mut self, path: &Path) -> Result<()> {
        io::save_project(&self.stack, path)?;
        self.path = Some(path.to_path_buf());
        self.name = name_from_path(path);
        self.is_dirty = false;
        log_info!("Project saved to {}", path.display());
        Ok(())
    }
}

fn name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// `.pmig` goes through the project loader, everything else through the
/// image decoders.
fn load_any(path: &Path) -> Result<LayerStack> {
    let is_project = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pmig"));
    if is_project {
        io::load_project(path)
    } else {
        io::open_image(path)
    }
}
