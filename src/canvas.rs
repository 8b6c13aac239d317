use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{EditorError, Result};
use crate::geometry::Point;

// ============================================================================
// TILED IMAGE – sparse 64×64 chunk storage (Vec-indexed for speed)
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// Upper bound on canvas area. `LayerStack::new` rejects larger requests;
/// `TiledImage::new` clamps them to 1×1.
pub const MAX_PIXELS: u64 = 256_000_000;

/// Maximum supported canvas dimension in pixels (per axis).
/// Guards against crafted images and project files.
pub const MAX_CANVAS_DIM: u32 = 32_768;

/// Accepts `1..=MAX_CANVAS_DIM` per axis with an area of at most `MAX_PIXELS`.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 || width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
        return Err(EditorError::OutOfRange(format!(
            "canvas size {}x{} outside 1..={} per axis",
            width, height, MAX_CANVAS_DIM
        )));
    }
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(EditorError::OutOfRange(format!(
            "canvas size {}x{} exceeds {} pixels",
            width, height, MAX_PIXELS
        )));
    }
    Ok(())
}

/// Value written by the eraser and returned for unpopulated chunks.
pub const ERASE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 0]);

static TRANSPARENT_PIXEL: Rgba<u8> = ERASE_COLOR;

/// Sparse tiled bitmap backed by a flat `Vec<Option<Arc<RgbaImage>>>`.
/// Chunk coordinates map to a flat index via `cy * chunks_per_row + cx`.
///
/// Chunks are wrapped in `Arc` for copy-on-write: `clone()` only bumps
/// reference counts and `put_pixel` uses `Arc::make_mut` to copy just the
/// touched chunk. A cloned image is therefore a cheap, stable snapshot.
#[derive(Clone)]
pub struct TiledImage {
    width: u32,
    height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<RgbaImage>>>,
}

impl TiledImage {
    /// Fully transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = {
            let total = (width as u64) * (height as u64);
            if total > MAX_PIXELS || width == 0 || height == 0 {
                log_warn!(
                    "TiledImage::new: dimensions {}x{} unusable, clamped to 1x1",
                    width,
                    height
                );
                (1, 1)
            } else {
                (width, height)
            }
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * chunks_per_col) as usize],
        }
    }

    /// Image filled with `color`; a transparent fill allocates nothing.
    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut img = Self::new(width, height);
        if color[3] > 0 {
            img.fill(color);
        }
        img
    }

    /// Import a flat `RgbaImage`. Only chunks holding a non-transparent pixel
    /// are stored. Chunk conversion runs in parallel.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let width = src.width();
        let height = src.height();
        let mut img = Self::new(width, height);
        if img.width != width || img.height != height {
            return img;
        }

        let chunks_x = img.chunks_per_row as usize;
        let total_chunks = img.chunks.len();
        let src_raw = src.as_raw();

        let chunk_results: Vec<(usize, Option<Arc<RgbaImage>>)> = (0..total_chunks)
            .into_par_iter()
            .map(|flat| {
                let base_x = (flat % chunks_x) as u32 * CHUNK_SIZE;
                let base_y = (flat / chunks_x) as u32 * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(width - base_x);
                let ch = CHUNK_SIZE.min(height - base_y);
                let chunk_stride = CHUNK_SIZE as usize * 4;
                let mut chunk_data = vec![0u8; chunk_stride * CHUNK_SIZE as usize];
                let mut has_content = false;

                for ly in 0..ch {
                    let src_start = ((base_y + ly) * width + base_x) as usize * 4;
                    let dst_start = ly as usize * chunk_stride;
                    let byte_len = cw as usize * 4;
                    let row = &src_raw[src_start..src_start + byte_len];
                    chunk_data[dst_start..dst_start + byte_len].copy_from_slice(row);
                    has_content |= row.chunks_exact(4).any(|px| px[3] != 0);
                }

                let chunk = if has_content {
                    RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, chunk_data).map(Arc::new)
                } else {
                    None
                };
                (flat, chunk)
            })
            .collect();

        for (idx, chunk) in chunk_results {
            img.chunks[idx] = chunk;
        }
        img
    }

    /// Flatten back to a contiguous `RgbaImage`.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let out_stride = self.width as usize * 4;
        let out_raw: &mut [u8] = &mut out;
        for (cx, cy) in self.chunk_keys() {
            if let Some(chunk) = self.get_chunk(cx, cy) {
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(self.width - base_x) as usize;
                let ch = CHUNK_SIZE.min(self.height - base_y) as usize;
                let chunk_raw = chunk.as_raw();
                let chunk_stride = CHUNK_SIZE as usize * 4;
                for ly in 0..ch {
                    let src_start = ly * chunk_stride;
                    let dst_start = (base_y as usize + ly) * out_stride + base_x as usize * 4;
                    out_raw[dst_start..dst_start + cw * 4]
                        .copy_from_slice(&chunk_raw[src_start..src_start + cw * 4]);
                }
            }
        }
        out
    }

    #[inline(always)]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    /// Read a pixel; out-of-bounds and unpopulated reads yield transparent.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &Rgba<u8> {
        if x >= self.width || y >= self.height {
            return &TRANSPARENT_PIXEL;
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        self.chunks[idx]
            .as_ref()
            .map(|c| c.get_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE))
            .unwrap_or(&TRANSPARENT_PIXEL)
    }

    /// Write a pixel (creates the chunk on demand, COW-clones if shared).
    /// Out-of-bounds writes are ignored; callers validate first.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        if pixel[3] == 0 && self.chunks[idx].is_none() {
            return;
        }
        let arc = self.chunks[idx]
            .get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(arc).put_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE, pixel);
    }

    pub fn get_chunk(&self, cx: u32, cy: u32) -> Option<&RgbaImage> {
        if cx >= self.chunks_per_row {
            return None;
        }
        self.chunks.get(self.flat_index(cx, cy)).and_then(|c| c.as_deref())
    }

    /// Place a fully-built chunk at the given chunk coordinate.
    pub fn set_chunk(&mut self, cx: u32, cy: u32, chunk: RgbaImage) {
        if cx >= self.chunks_per_row {
            return;
        }
        let idx = self.flat_index(cx, cy);
        if idx < self.chunks.len() {
            self.chunks[idx] = Some(Arc::new(chunk));
        }
    }

    /// Populated chunk coordinates.
    pub fn chunk_keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cpr = self.chunks_per_row;
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(move |(i, _)| ((i as u32) % cpr, (i as u32) / cpr))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for slot in &mut self.chunks {
            let arc = slot.get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
            for pixel in Arc::make_mut(arc).pixels_mut() {
                *pixel = color;
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Clone)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub pixels: TiledImage,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, fill_color: Rgba<u8>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: 1.0,
            pixels: TiledImage::new_filled(width, height, fill_color),
        }
    }

    pub fn from_pixels(name: impl Into<String>, pixels: TiledImage) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: 1.0,
            pixels,
        }
    }
}

/// Ordered layer stack sharing one canvas size.
///
/// Never empty once built, and exactly one layer is current. All pixel
/// accessors validate strictly; clipping is the caller's job.
#[derive(Clone)]
pub struct LayerStack {
    layers: Vec<Layer>,
    current: usize,
    width: u32,
    height: u32,
}

impl LayerStack {
    /// New canvas with a single "Background" layer filled with `background`.
    /// Fails with `OutOfRange` unless [`check_dimensions`] accepts the size.
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Result<Self> {
        check_dimensions(width, height)?;
        let layer = Layer::new("Background", width, height, background);
        Ok(Self {
            layers: vec![layer],
            current: 0,
            width,
            height,
        })
    }

    /// Single-layer stack sized to `image`.
    pub fn from_image(name: impl Into<String>, image: &RgbaImage) -> Self {
        let pixels = TiledImage::from_rgba_image(image);
        let (width, height) = (pixels.width(), pixels.height());
        Self {
            layers: vec![Layer::from_pixels(name, pixels)],
            current: 0,
            width,
            height,
        }
    }

    /// Rebuild a stack from decoded layers. Every layer must match the canvas.
    pub fn from_layers(layers: Vec<Layer>, current: usize, width: u32, height: u32) -> Result<Self> {
        if layers.is_empty() {
            return Err(EditorError::OutOfRange("layer stack cannot be empty".into()));
        }
        if let Some(bad) = layers
            .iter()
            .find(|l| l.pixels.width() != width || l.pixels.height() != height)
        {
            return Err(EditorError::OutOfRange(format!(
                "layer '{}' is {}x{}, canvas is {}x{}",
                bad.name,
                bad.pixels.width(),
                bad.pixels.height(),
                width,
                height
            )));
        }
        let current = current.min(layers.len() - 1);
        Ok(Self {
            layers,
            current,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        let len = self.layers.len();
        self.layers
            .get(index)
            .ok_or_else(|| EditorError::OutOfRange(format!("layer {} of {}", index, len)))
    }

    pub fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or_else(|| EditorError::OutOfRange(format!("layer {} of {}", index, len)))
    }

    pub fn current_layer(&self) -> Result<usize> {
        if self.layers.is_empty() {
            return Err(EditorError::OutOfRange("layer stack is empty".into()));
        }
        Ok(self.current)
    }

    pub fn set_current_layer(&mut self, index: usize) -> Result<()> {
        self.layer(index)?;
        self.current = index;
        Ok(())
    }

    /// Whether `p` lies inside the canvas rectangle.
    pub fn in_bounds(&self, p: Point) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as u32) < self.width && (p.y as u32) < self.height
    }

    fn check_point(&self, p: Point) -> Result<(u32, u32)> {
        if !self.in_bounds(p) {
            return Err(EditorError::OutOfRange(format!(
                "pixel ({}, {}) outside {}x{} canvas",
                p.x, p.y, self.width, self.height
            )));
        }
        Ok((p.x as u32, p.y as u32))
    }

    pub fn pixel_at(&self, layer: usize, p: Point) -> Result<Rgba<u8>> {
        let (x, y) = self.check_point(p)?;
        Ok(*self.layer(layer)?.pixels.get_pixel(x, y))
    }

    pub fn set_pixel(&mut self, layer: usize, p: Point, color: Rgba<u8>) -> Result<()> {
        let (x, y) = self.check_point(p)?;
        self.layer_mut(layer)?.pixels.put_pixel(x, y, color);
        Ok(())
    }

    /// Append a transparent layer on top and return its index. The current
    /// layer is unchanged.
    pub fn push_layer(&mut self, name: impl Into<String>) -> usize {
        self.layers
            .push(Layer::new(name, self.width, self.height, ERASE_COLOR));
        self.layers.len() - 1
    }

    /// Insert `layer` at `index` (`index == len` appends). The current index
    /// keeps pointing at the same layer.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<()> {
        if index > self.layers.len() {
            return Err(EditorError::OutOfRange(format!(
                "insert at {} of {}",
                index,
                self.layers.len()
            )));
        }
        if layer.pixels.width() != self.width || layer.pixels.height() != self.height {
            return Err(EditorError::OutOfRange(format!(
                "layer is {}x{}, canvas is {}x{}",
                layer.pixels.width(),
                layer.pixels.height(),
                self.width,
                self.height
            )));
        }
        self.layers.insert(index, layer);
        if index <= self.current {
            self.current += 1;
        }
        Ok(())
    }

    /// Remove a layer. The last remaining layer cannot be removed.
    pub fn remove_layer(&mut self, index: usize) -> Result<Layer> {
        self.layer(index)?;
        if self.layers.len() == 1 {
            return Err(EditorError::LastLayer);
        }
        let removed = self.layers.remove(index);
        if self.current >= self.layers.len() {
            self.current = self.layers.len() - 1;
        } else if self.current > index {
            self.current -= 1;
        }
        Ok(removed)
    }

    /// Flatten all visible layers bottom-to-top with normal "over" blending.
    /// A lone visible layer at full opacity comes back bit-exact.
    pub fn composite(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let visible: Vec<&Layer> = self.layers.iter().filter(|l| l.visible).collect();
        if visible.is_empty() {
            return out;
        }
        let row_len = self.width as usize * 4;
        let out_raw: &mut [u8] = &mut out;

        out_raw
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let x = x as u32;
                    let mut acc = ERASE_COLOR;
                    for (i, layer) in visible.iter().enumerate() {
                        let top = *layer.pixels.get_pixel(x, y);
                        acc = if i == 0 && layer.opacity >= 1.0 {
                            top
                        } else {
                            blend_over(acc, top, layer.opacity)
                        };
                    }
                    px.copy_from_slice(&acc.0);
                }
            });
        out
    }
}

/// Normal "over" compositing of unpremultiplied RGBA, with `top`'s alpha
/// scaled by `opacity`.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let top_a = (top[3] as f32 / 255.0) * opacity.min(1.0);
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return ERASE_COLOR;
    }

    let channel = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(top[0], base[0]),
        channel(top[1], base[1]),
        channel(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
