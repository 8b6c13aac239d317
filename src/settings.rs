use std::path::{Path, PathBuf};

use image::Rgba;

use crate::components::tools::{format_color, parse_color, ToolParameters};
use crate::io::{ExportOptions, TiffCompression, MAX_CANVAS_DIM};

/// Persistent engine defaults stored as `key=value` lines.
///
/// Unknown keys are ignored and malformed values keep their defaults, so an
/// old or hand-edited file never prevents startup.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub tools: ToolParameters,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub background: Rgba<u8>,
    pub jpeg_quality: u8,
    pub tiff_compression: TiffCompression,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tools: ToolParameters::default(),
            canvas_width: 800,
            canvas_height: 600,
            background: Rgba([255, 255, 255, 255]),
            jpeg_quality: 90,
            tiff_compression: TiffCompression::None,
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/pmig/pmig_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PMIG\pmig_settings.cfg
    /// On macOS:   ~/Library/Application Support/PMIG/pmig_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("PMIG").join("pmig_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("PMIG")
                    .join("pmig_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("pmig").join("pmig_settings.cfg"))
        }
    }

    /// Load from the default location (defaults if missing or unreadable).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                log_info!("Settings loaded from {}", path.display());
                Self::parse(&content)
            }
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "canvas_width" => {
                    s.canvas_width = val.parse().unwrap_or(s.canvas_width).clamp(1, MAX_CANVAS_DIM);
                }
                "canvas_height" => {
                    s.canvas_height = val.parse().unwrap_or(s.canvas_height).clamp(1, MAX_CANVAS_DIM);
                }
                "background" => {
                    if let Ok(c) = parse_color(val) {
                        s.background = c;
                    }
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val.parse::<u8>().unwrap_or(90).clamp(1, 100);
                }
                "tiff_compression" => {
                    s.tiff_compression = TiffCompression::parse(val).unwrap_or_default();
                }
                _ => {
                    if let Err(e) = s.tools.set(key, val) {
                        log_warn!("Settings: ignoring '{}': {}", line, e);
                    }
                }
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let t = &self.tools;
        format!(
            "brush_size={}\n\
             brush_color={}\n\
             line_style={}\n\
             anti_aliasing={}\n\
             eraser_size={}\n\
             eraser_shape={}\n\
             selection_mode={}\n\
             canvas_width={}\n\
             canvas_height={}\n\
             background={}\n\
             jpeg_quality={}\n\
             tiff_compression={}\n",
            t.brush_size,
            format_color(t.brush_color),
            t.line_style.label(),
            t.anti_aliasing,
            t.eraser_size,
            t.eraser_shape.label(),
            t.selection_mode.label(),
            self.canvas_width,
            self.canvas_height,
            format_color(self.background),
            self.jpeg_quality,
            self.tiff_compression.label(),
        )
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Save to the default location. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("Settings: could not write {}: {}", path.display(), e);
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            jpeg_quality: self.jpeg_quality,
            tiff_compression: self.tiff_compression,
        }
    }
}
