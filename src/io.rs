use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageError, RgbaImage};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use crate::canvas::{Layer, LayerStack, TiledImage, CHUNK_SIZE};
use crate::error::{EditorError, Result};

pub use crate::canvas::MAX_CANVAS_DIM;
/// Maximum number of layers in a project file.
const MAX_LAYERS: usize = 256;

// ============================================================================
// EXPORT FORMATS
// ============================================================================

/// Format tokens accepted by [`save_image`], matched case-insensitively.
pub const SUPPORTED_EXPORT_FORMATS: &[&str] =
    &["png", "jpg", "jpeg", "bmp", "tga", "tif", "tiff", "ico"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
    Ico,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Tga => "tga",
            ExportFormat::Tiff => "tiff",
            ExportFormat::Ico => "ico",
        }
    }

    pub fn from_token(token: &str) -> Option<ExportFormat> {
        let token = token.trim().trim_start_matches('.').to_ascii_lowercase();
        if !SUPPORTED_EXPORT_FORMATS.contains(&token.as_str()) {
            return None;
        }
        Some(match token.as_str() {
            "png" => ExportFormat::Png,
            "jpg" | "jpeg" => ExportFormat::Jpeg,
            "bmp" => ExportFormat::Bmp,
            "tga" => ExportFormat::Tga,
            "tif" | "tiff" => ExportFormat::Tiff,
            _ => ExportFormat::Ico,
        })
    }

    /// Format implied by a path's extension.
    pub fn from_path(path: &Path) -> Option<ExportFormat> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(ExportFormat::from_token)
    }

    pub fn is_lossless(&self) -> bool {
        !matches!(self, ExportFormat::Jpeg | ExportFormat::Ico)
    }
}

/// Compression options for TIFF export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TiffCompression {
    #[default]
    None,
    Lzw,
    Deflate,
}

impl TiffCompression {
    pub fn label(&self) -> &'static str {
        match self {
            TiffCompression::None => "none",
            TiffCompression::Lzw => "lzw",
            TiffCompression::Deflate => "deflate",
        }
    }

    pub fn parse(name: &str) -> Option<TiffCompression> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(TiffCompression::None),
            "lzw" => Some(TiffCompression::Lzw),
            "deflate" | "zip" => Some(TiffCompression::Deflate),
            _ => None,
        }
    }
}

/// Encoder knobs that are not part of the format token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub jpeg_quality: u8,
    pub tiff_compression: TiffCompression,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            tiff_compression: TiffCompression::None,
        }
    }
}

// ============================================================================
// IMPORT
// ============================================================================

fn map_image_error(path: &Path, err: ImageError) -> EditorError {
    match err {
        ImageError::IoError(e) => EditorError::io(path, e),
        other => EditorError::Format(format!("{}: {}", path.display(), other)),
    }
}

/// Decode any raster format the `image` crate understands into RGBA8.
pub fn decode_image(path: &Path) -> Result<RgbaImage> {
    let file = File::open(path).map_err(|e| EditorError::io(path, e))?;
    let reader = image::io::Reader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| EditorError::io(path, e))?;
    if reader.format().is_none() {
        return Err(EditorError::Format(format!(
            "{}: unrecognised image data",
            path.display()
        )));
    }
    let img = reader.decode().map_err(|e| map_image_error(path, e))?;

    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 || w > MAX_CANVAS_DIM || h > MAX_CANVAS_DIM {
        return Err(EditorError::Format(format!(
            "{}: image size {}x{} outside 1..={} per axis",
            path.display(),
            w,
            h,
            MAX_CANVAS_DIM
        )));
    }
    Ok(img.into_rgba8())
}

/// Decode `path` into a fresh single-layer stack sized to the image.
/// Nothing outside the returned value is touched, so a failure leaves the
/// caller's document as it was.
pub fn open_image(path: &Path) -> Result<LayerStack> {
    let rgba = decode_image(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Background".to_string());
    log_info!(
        "Decoded {} ({}x{})",
        path.display(),
        rgba.width(),
        rgba.height()
    );
    Ok(LayerStack::from_image(name, &rgba))
}

// ============================================================================
// EXPORT
// ============================================================================

/// Composite the stack and write it as `format_token`. The token is checked
/// before the filesystem is touched.
pub fn save_image(
    stack: &LayerStack,
    path: &Path,
    format_token: &str,
    options: ExportOptions,
) -> Result<()> {
    let format = ExportFormat::from_token(format_token).ok_or_else(|| {
        EditorError::Format(format!(
            "unsupported export format '{}' (supported: {})",
            format_token,
            SUPPORTED_EXPORT_FORMATS.join(", ")
        ))
    })?;
    let flat = stack.composite();
    encode_and_write(&flat, path, format, options)
}

/// Encode and write an image to a file.
/// Takes no session state so it can run on a background thread.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: ExportFormat,
    options: ExportOptions,
) -> Result<()> {
    let file = File::create(path).map_err(|e| EditorError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let map_err = |e: ImageError| map_image_error(path, e);

    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder
                .encode(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(map_err)?;
        }
        ExportFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, options.jpeg_quality);
            encoder
                .encode(
                    rgb_image.as_raw(),
                    rgb_image.width(),
                    rgb_image.height(),
                    image::ColorType::Rgb8,
                )
                .map_err(map_err)?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder
                .encode(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(map_err)?;
        }
        ExportFormat::Tga => {
            let encoder = TgaEncoder::new(&mut writer);
            encoder
                .encode(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(map_err)?;
        }
        ExportFormat::Ico => {
            // ICO entries limited to 256×256
            let dyn_img = if image.width() > 256 || image.height() > 256 {
                let scale = 256.0 / image.width().max(image.height()) as f32;
                let new_w = ((image.width() as f32 * scale) as u32).clamp(1, 256);
                let new_h = ((image.height() as f32 * scale) as u32).clamp(1, 256);
                let resized = image::imageops::resize(
                    image,
                    new_w,
                    new_h,
                    image::imageops::FilterType::Lanczos3,
                );
                DynamicImage::ImageRgba8(resized)
            } else {
                DynamicImage::ImageRgba8(image.clone())
            };
            dyn_img
                .write_to(&mut writer, image::ImageOutputFormat::Ico)
                .map_err(map_err)?;
        }
        ExportFormat::Tiff => {
            let err_map =
                |e: tiff::TiffError| EditorError::Format(format!("TIFF encode error: {}", e));
            let mut tiff_enc = tiff::encoder::TiffEncoder::new(&mut writer).map_err(err_map)?;
            match options.tiff_compression {
                TiffCompression::None => {
                    tiff_enc
                        .write_image::<tiff::encoder::colortype::RGBA8>(
                            image.width(),
                            image.height(),
                            image.as_raw(),
                        )
                        .map_err(err_map)?;
                }
                TiffCompression::Lzw => {
                    tiff_enc
                        .write_image_with_compression::<tiff::encoder::colortype::RGBA8, _>(
                            image.width(),
                            image.height(),
                            tiff::encoder::compression::Lzw,
                            image.as_raw(),
                        )
                        .map_err(err_map)?;
                }
                TiffCompression::Deflate => {
                    tiff_enc
                        .write_image_with_compression::<tiff::encoder::colortype::RGBA8, _>(
                            image.width(),
                            image.height(),
                            tiff::encoder::compression::Deflate::default(),
                            image.as_raw(),
                        )
                        .map_err(err_map)?;
                }
            }
        }
    }

    writer.flush().map_err(|e| EditorError::io(path, e))
}

/// Completion message of a background export.
#[derive(Debug)]
pub enum IoResult {
    SaveComplete {
        path: PathBuf,
        format: ExportFormat,
    },
    SaveFailed {
        path: PathBuf,
        error: String,
    },
}

/// Export on a rayon worker.
///
/// The stack is cloned up front (chunks are shared copy-on-write), so the
/// caller may keep painting while the snapshot is encoded. The outcome is
/// sent over `sender`.
pub fn spawn_export(
    stack: &LayerStack,
    path: PathBuf,
    format: ExportFormat,
    options: ExportOptions,
    sender: Sender<IoResult>,
) {
    let snapshot = stack.clone();
    rayon::spawn(move || {
        let flat = snapshot.composite();
        let msg = match encode_and_write(&flat, &path, format, options) {
            Ok(()) => {
                log_info!("Export OK  →  {}", path.display());
                IoResult::SaveComplete { path, format }
            }
            Err(e) => {
                log_err!("Export FAILED for {}: {}", path.display(), e);
                IoResult::SaveFailed {
                    path,
                    error: e.to_string(),
                }
            }
        };
        let _ = sender.send(msg);
    });
}

// ============================================================================
// PMIG PROJECT FILE FORMAT
// ============================================================================

/// Magic header of the tiled sparse project format
const PMIG_MAGIC: &str = "PMG1";

/// Serializable project file. The selection is deliberately absent.
#[derive(Serialize, Deserialize)]
pub struct ProjectFile {
    magic: String,
    width: u32,
    height: u32,
    current_layer: usize,
    layers: Vec<LayerData>,
}

/// Serializable layer data, sparse chunks only
#[derive(Serialize, Deserialize)]
struct LayerData {
    name: String,
    visible: bool,
    opacity: f32,
    chunks: Vec<ChunkData>,
}

/// A single serialisable chunk (64×64 × 4 bytes = 16 384 bytes of pixel data)
#[derive(Serialize, Deserialize)]
struct ChunkData {
    cx: u32,
    cy: u32,
    pixels: Vec<u8>,
}

fn project_err(e: Box<bincode::ErrorKind>) -> EditorError {
    EditorError::Project(format!("serialization error: {}", e))
}

/// Copy the stack into its serializable form. Cheap enough for the
/// event thread; the result can then be written from a worker.
pub fn build_project(stack: &LayerStack) -> ProjectFile {
    let layers = stack
        .layers()
        .iter()
        .map(|layer| {
            let chunks = layer
                .pixels
                .chunk_keys()
                .filter_map(|(cx, cy)| {
                    layer.pixels.get_chunk(cx, cy).map(|chunk| ChunkData {
                        cx,
                        cy,
                        pixels: chunk.as_raw().clone(),
                    })
                })
                .collect();
            LayerData {
                name: layer.name.clone(),
                visible: layer.visible,
                opacity: layer.opacity,
                chunks,
            }
        })
        .collect();

    ProjectFile {
        magic: PMIG_MAGIC.to_string(),
        width: stack.width(),
        height: stack.height(),
        current_layer: stack.current_layer().unwrap_or(0),
        layers,
    }
}

pub fn write_project(project: &ProjectFile, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| EditorError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, project).map_err(project_err)?;
    writer.flush().map_err(|e| EditorError::io(path, e))
}

/// Save the stack as a `.pmig` project.
pub fn save_project(stack: &LayerStack, path: &Path) -> Result<()> {
    write_project(&build_project(stack), path)
}

/// Load a `.pmig` project file.
pub fn load_project(path: &Path) -> Result<LayerStack> {
    let raw = std::fs::read(path).map_err(|e| EditorError::io(path, e))?;
    if raw.len() < 12 {
        return Err(EditorError::Project("file too small".into()));
    }

    // bincode encodes a String as an 8-byte length prefix + UTF-8 data, so
    // bytes 8..12 hold the magic.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != PMIG_MAGIC {
        return Err(EditorError::Project(format!("unknown magic '{}'", magic)));
    }

    let project: ProjectFile = bincode::deserialize(&raw).map_err(project_err)?;
    stack_from_project(project)
}

fn stack_from_project(project: ProjectFile) -> Result<LayerStack> {
    if project.width == 0 || project.height == 0 {
        return Err(EditorError::Project(
            "canvas dimensions cannot be zero".into(),
        ));
    }
    if project.width > MAX_CANVAS_DIM || project.height > MAX_CANVAS_DIM {
        return Err(EditorError::Project(format!(
            "canvas size {}x{} exceeds maximum allowed {}x{}",
            project.width, project.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
        )));
    }
    if project.layers.is_empty() {
        return Err(EditorError::Project("project contains no layers".into()));
    }
    if project.layers.len() > MAX_LAYERS {
        return Err(EditorError::Project(format!(
            "project contains {} layers, which exceeds the maximum of {}",
            project.layers.len(),
            MAX_LAYERS
        )));
    }

    let expected_chunk_bytes = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
    let chunks_x = project.width.div_ceil(CHUNK_SIZE);
    let chunks_y = project.height.div_ceil(CHUNK_SIZE);

    let mut layers = Vec::with_capacity(project.layers.len());
    for ld in project.layers {
        let mut tiled = TiledImage::new(project.width, project.height);
        for cd in ld.chunks {
            if cd.cx >= chunks_x || cd.cy >= chunks_y {
                return Err(EditorError::Project(format!(
                    "chunk ({},{}) in layer '{}' lies outside the canvas",
                    cd.cx, cd.cy, ld.name
                )));
            }
            if cd.pixels.len() != expected_chunk_bytes {
                return Err(EditorError::Project(format!(
                    "chunk ({},{}) in layer '{}' has {} bytes, expected {}",
                    cd.cx,
                    cd.cy,
                    ld.name,
                    cd.pixels.len(),
                    expected_chunk_bytes,
                )));
            }
            let chunk_img =
                RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, cd.pixels).ok_or_else(|| {
                    EditorError::Project(format!(
                        "failed to reconstruct chunk ({},{}) for layer '{}'",
                        cd.cx, cd.cy, ld.name
                    ))
                })?;
            tiled.set_chunk(cd.cx, cd.cy, chunk_img);
        }

        let mut layer = Layer::from_pixels(ld.name, tiled);
        layer.visible = ld.visible;
        layer.opacity = ld.opacity.clamp(0.0, 1.0);
        layers.push(layer);
    }

    LayerStack::from_layers(layers, project.current_layer, project.width, project.height)
}
