// ============================================================================
// PMIG CLI: headless replay of pointer-event scripts
// ============================================================================
//
// Usage examples:
//   pmig --new 64x64 --events strokes.txt --output out.png
//   pmig -i photo.png -e mask_and_paint.txt -o result.png
//   pmig -i "shots/*.jpg" -e watermark.txt --output-dir out/ --format png
//   pmig -i drawing.pmig -o flat.tiff --tiff-compression lzw
//
// Event script, one command per line (`#` lines and trailing ` # ` are comments):
//   tool brush|eraser|marquee|pen
//   set <parameter> <value>       e.g. `set brush_size 4`, `set brush_color #FF0000`
//   down <x> <y> / move <x> <y> / up <x> <y>
//   layer <index>                 make an existing layer current
//   new-layer [name]
//   clear-selection
//   cancel                        abandon the open gesture

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::components::tools::{Tool, ToolParameterStore};
use crate::geometry::Point;
use crate::io::{ExportFormat, TiffCompression};
use crate::project::Project;
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PMIG headless editor.
///
/// Replays brush / eraser / marquee gestures from a script onto images and
/// writes the result, no display required.
#[derive(Parser, Debug)]
#[command(
    name = "pmig",
    about = "PMIG headless raster editor",
    long_about = "Replay pointer-event scripts onto image files and export the result.\n\
                  Reads PNG, JPEG, WEBP, BMP, TGA, ICO, TIFF, GIF and .pmig projects;\n\
                  writes PNG, JPEG, BMP, TGA, TIFF, ICO and .pmig.\n\n\
                  Example:\n  \
                  pmig --new 64x64 --events strokes.txt --output out.png\n  \
                  pmig -i \"*.jpg\" -e stamp.txt --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, num_args = 1.., required_unless_present = "new")]
    pub input: Vec<String>,

    /// Start from a blank canvas instead of an input file, e.g. `640x480`.
    #[arg(long, value_name = "WxH", conflicts_with = "input")]
    pub new: Option<String>,

    /// Event script replayed on every document.
    #[arg(short, long, value_name = "SCRIPT")]
    pub events: Option<PathBuf>,

    /// Output file path. Only valid for a single document.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the input stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpg, jpeg, bmp, tga, tif, tiff, ico, pmig.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100). Overrides the settings file.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// TIFF compression mode: none, lzw, deflate. Overrides the settings file.
    #[arg(long, value_name = "MODE")]
    pub tiff_compression: Option<String>,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Event scripts
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum ScriptCommand {
    Tool(Tool),
    Set { key: String, value: String },
    Down(Point),
    Move(Point),
    Up(Point),
    Layer(usize),
    NewLayer(Option<String>),
    ClearSelection,
    Cancel,
}

/// Parse a whole script up front so a typo on line 40 fails before line 1
/// touches any pixels.
pub fn parse_script(source: &str) -> Result<Vec<ScriptCommand>, String> {
    let mut commands = Vec::new();
    for (no, raw) in source.lines().enumerate() {
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        let err = |msg: String| format!("line {}: {}", no + 1, msg);
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        let point = |args: &[&str]| -> Result<Point, String> {
            match args {
                [x, y] => {
                    let x = x.parse::<i32>().map_err(|_| format!("bad x '{}'", x))?;
                    let y = y.parse::<i32>().map_err(|_| format!("bad y '{}'", y))?;
                    Ok(Point::new(x, y))
                }
                _ => Err("expected two coordinates".to_string()),
            }
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "tool" => {
                let name = args.first().copied().unwrap_or("");
                ScriptCommand::Tool(
                    Tool::parse(name).ok_or_else(|| err(format!("unknown tool '{}'", name)))?,
                )
            }
            "set" => match args.as_slice() {
                [key, value @ ..] if !value.is_empty() => ScriptCommand::Set {
                    key: key.to_string(),
                    value: value.join(" "),
                },
                _ => return Err(err("expected `set <parameter> <value>`".into())),
            },
            "down" => ScriptCommand::Down(point(&args).map_err(err)?),
            "move" => ScriptCommand::Move(point(&args).map_err(err)?),
            "up" => ScriptCommand::Up(point(&args).map_err(err)?),
            "layer" => {
                let idx = args
                    .first()
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| err("expected a layer index".into()))?;
                ScriptCommand::Layer(idx)
            }
            "new-layer" => {
                ScriptCommand::NewLayer((!args.is_empty()).then(|| args.join(" ")))
            }
            "clear-selection" => ScriptCommand::ClearSelection,
            "cancel" => ScriptCommand::Cancel,
            other => return Err(err(format!("unknown command '{}'", other))),
        };
        commands.push(cmd);
    }
    Ok(commands)
}

/// Whole-line `#` comments and trailing ` # ` comments. A `#` glued to a
/// value (`#FF0000`) is kept.
fn strip_comment(line: &str) -> &str {
    let t = line.trim();
    if t.starts_with('#') {
        return "";
    }
    match t.find(" # ") {
        Some(i) => t[..i].trim(),
        None => t,
    }
}

/// Feed parsed commands into a document in order.
pub fn replay(project: &mut Project, commands: &[ScriptCommand]) -> Result<(), String> {
    for (i, cmd) in commands.iter().enumerate() {
        let step = i + 1;
        let res = match cmd {
            ScriptCommand::Tool(tool) => {
                project.select_tool(*tool);
                Ok(())
            }
            ScriptCommand::Set { key, value } => project.params().update(|p| p.set(key, value)),
            ScriptCommand::Down(p) => project.pointer_down(*p).map_err(|e| e.to_string()),
            ScriptCommand::Move(p) => project.pointer_move(*p).map_err(|e| e.to_string()),
            ScriptCommand::Up(p) => project.pointer_up(*p).map_err(|e| e.to_string()),
            ScriptCommand::Layer(idx) => project.set_current_layer(*idx).map_err(|e| e.to_string()),
            ScriptCommand::NewLayer(name) => {
                let name = name
                    .clone()
                    .unwrap_or_else(|| format!("Layer {}", project.layers().len() + 1));
                project.new_layer(name);
                Ok(())
            }
            ScriptCommand::ClearSelection => {
                project.clear_selection();
                Ok(())
            }
            ScriptCommand::Cancel => {
                project.cancel_gesture();
                Ok(())
            }
        };
        res.map_err(|e| format!("command {}: {}", step, e))?;
    }
    Ok(())
}

// ============================================================================
// Public entry point
// ============================================================================

/// What the output will be written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputKind {
    Image(ExportFormat),
    Project,
}

impl OutputKind {
    fn extension(&self) -> &'static str {
        match self {
            OutputKind::Image(f) => f.extension(),
            OutputKind::Project => "pmig",
        }
    }
}

/// Run all CLI processing and return an OS exit code.
/// `0` = all documents succeeded, `1` = one or more failed.
pub fn run(args: CliArgs) -> ExitCode {
    let mut settings = match &args.settings {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };
    if let Some(q) = args.quality {
        settings.jpeg_quality = q.clamp(1, 100);
    }
    if let Some(mode) = &args.tiff_compression {
        match TiffCompression::parse(mode) {
            Some(c) => settings.tiff_compression = c,
            None => {
                eprintln!("error: unknown TIFF compression '{}'.", mode);
                return ExitCode::FAILURE;
            }
        }
    }

    let output_kind = match parse_output_kind(args.format.as_deref(), args.output.as_deref()) {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let commands = match &args.events {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(src) => match parse_script(&src) {
                Ok(cmds) => cmds,
                Err(e) => {
                    eprintln!("error: {}: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            },
            Err(e) => {
                eprintln!("error: could not read events '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    // Blank-canvas mode: exactly one document.
    if let Some(dims) = &args.new {
        let Some((w, h)) = parse_dimensions(dims) else {
            eprintln!("error: --new expects WIDTHxHEIGHT, got '{}'.", dims);
            return ExitCode::FAILURE;
        };
        settings.canvas_width = w;
        settings.canvas_height = h;
        let Some(output) = build_output_path(
            Path::new("untitled"),
            args.output.as_deref(),
            args.output_dir.as_deref(),
            output_kind,
        ) else {
            eprintln!("error: --new needs --output or --output-dir.");
            return ExitCode::FAILURE;
        };
        let mut project = match Project::from_settings(1, &settings) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        return match process(&mut project, &commands, &output, output_kind) {
            Ok(()) => {
                if args.verbose {
                    println!("  → {}", output.display());
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            output_kind,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        let params = ToolParameterStore::new(settings.tools.clone());
        let result = Project::from_file(input_path, params)
            .map_err(|e| format!("load failed: {}", e))
            .and_then(|mut project| {
                project.export_options = settings.export_options();
                process(&mut project, &commands, &output_path, output_kind)
            });

        match result {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                log_err!("CLI: {}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-document pipeline
// ============================================================================

fn process(
    project: &mut Project,
    commands: &[ScriptCommand],
    output: &Path,
    kind: OutputKind,
) -> Result<(), String> {
    replay(project, commands)?;
    match kind {
        OutputKind::Project => project
            .save_project(output)
            .map_err(|e| format!("project save failed: {}", e)),
        OutputKind::Image(format) => project
            .save_image(output, format.extension())
            .map_err(|e| format!("save failed: {}", e)),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins; otherwise the output extension; otherwise PNG.
/// An explicit but unsupported `--format` is an error.
fn parse_output_kind(format_arg: Option<&str>, output: Option<&Path>) -> Result<OutputKind, String> {
    if let Some(f) = format_arg {
        if f.eq_ignore_ascii_case("pmig") {
            return Ok(OutputKind::Project);
        }
        return ExportFormat::from_token(f)
            .map(OutputKind::Image)
            .ok_or_else(|| format!("unsupported output format '{}'", f));
    }

    if let Some(ext) = output.and_then(|o| o.extension()).and_then(|e| e.to_str()) {
        if ext.eq_ignore_ascii_case("pmig") {
            return Ok(OutputKind::Project);
        }
        if let Some(format) = ExportFormat::from_token(ext) {
            return Ok(OutputKind::Image(format));
        }
    }

    Ok(OutputKind::Image(ExportFormat::Png))
}

fn parse_dimensions(dims: &str) -> Option<(u32, u32)> {
    let (w, h) = dims.trim().split_once(['x', 'X'])?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    if w == 0 || h == 0 || w > crate::io::MAX_CANVAS_DIM || h > crate::io::MAX_CANVAS_DIM {
        return None;
    }
    Some((w, h))
}

/// Compute the output path for a single document.
///
/// Priority:
/// 1. `--output` (explicit path)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    kind: OutputKind,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = kind.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    // Blank canvases have no directory to fall back to.
    if !input.exists() {
        return None;
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tools::{LineStyle, ToolParameterStore};
    use image::Rgba;

    #[test]
    fn script_parses_every_command() {
        let src = "\
            # warm-up\n\
            tool marquee\n\
            set selection_mode ellipse\n\
            down 0 0\n\
            move 4 4   # drag\n\
            up 4 4\n\
            layer 0\n\
            new-layer Ink Layer\n\
            clear-selection\n\
            cancel\n";
        let cmds = parse_script(src).unwrap();
        assert_eq!(cmds.len(), 9);
        assert_eq!(cmds[0], ScriptCommand::Tool(Tool::Marquee));
        assert_eq!(
            cmds[1],
            ScriptCommand::Set {
                key: "selection_mode".into(),
                value: "ellipse".into()
            }
        );
        assert_eq!(cmds[3], ScriptCommand::Move(Point::new(4, 4)));
        assert_eq!(cmds[6], ScriptCommand::NewLayer(Some("Ink Layer".into())));
    }

    #[test]
    fn script_errors_name_the_line() {
        let err = parse_script("tool brush\ndown 1\n").unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
        assert!(parse_script("paint 1 2").is_err());
        assert!(parse_script("tool crayon").is_err());
    }

    #[test]
    fn replay_drives_the_document() {
        let mut project = Project::new_untitled(
            1,
            8,
            8,
            Rgba([255, 255, 255, 255]),
            ToolParameterStore::default(),
        )
        .unwrap();
        let cmds = parse_script(
            "set brush_color #00FF00\nset line_style solid\ndown 1 1\nmove 3 1\nup 3 1\n",
        )
        .unwrap();
        replay(&mut project, &cmds).unwrap();
        assert_eq!(project.params().snapshot().line_style, LineStyle::Solid);
        for x in 1..=3 {
            assert_eq!(
                project.layers().pixel_at(0, Point::new(x, 1)).unwrap(),
                Rgba([0, 255, 0, 255])
            );
        }
        let bad = parse_script("set brush_size nope").unwrap();
        assert!(replay(&mut project, &bad).is_err());
    }

    #[test]
    fn output_kind_and_dimensions() {
        assert_eq!(
            parse_output_kind(None, Some(Path::new("a/b.TIF"))),
            Ok(OutputKind::Image(ExportFormat::Tiff))
        );
        assert_eq!(
            parse_output_kind(Some("pmig"), None),
            Ok(OutputKind::Project)
        );
        assert!(parse_output_kind(Some("webp"), None).is_err());
        assert_eq!(parse_dimensions("64x32"), Some((64, 32)));
        assert_eq!(parse_dimensions("0x32"), None);
        assert_eq!(parse_dimensions("64"), None);
    }

    #[test]
    fn output_dir_uses_input_stem() {
        let out = build_output_path(
            Path::new("shots/cat.jpg"),
            None,
            Some(Path::new("out")),
            OutputKind::Image(ExportFormat::Png),
        );
        assert_eq!(out, Some(PathBuf::from("out").join("cat.png")));
    }
}
