//! Raster editing engine: a layer stack, a selection that masks writes, and
//! brush / eraser / marquee tools driven by pointer events.

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod damage;
pub mod error;
pub mod geometry;
pub mod io;
pub mod layout;
pub mod ops;
pub mod project;
pub mod selection;
pub mod settings;

pub use canvas::{Layer, LayerStack};
pub use components::tools::{Tool, ToolDispatcher, ToolParameterStore, ToolParameters};
pub use damage::Damage;
pub use error::{EditorError, Result};
pub use geometry::{PixelRect, Point};
pub use project::Project;
pub use selection::{Selection, SelectionRegion};
