use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use image::Rgba;
use pmig::components::tools::{Tool, ToolParameterStore};
use pmig::io::{self, ExportFormat, ExportOptions, IoResult};
use pmig::layout::{load_layout, save_layout, WindowLayout};
use pmig::settings::EngineSettings;
use pmig::{EditorError, Point, Project};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Fresh scratch directory, removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("pmig-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn file(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// A canvas with opaque, blended and erased pixels.
fn painted() -> Project {
    let params = ToolParameterStore::default();
    params.set_brush_color(RED);
    params.set_brush_size(3);
    params.set_anti_aliasing(true);
    let mut p = Project::new_untitled(1, 12, 8, WHITE, params).unwrap();
    p.pointer_down(Point::new(2, 2)).unwrap();
    p.pointer_move(Point::new(9, 5)).unwrap();
    p.pointer_up(Point::new(9, 5)).unwrap();

    p.select_tool(Tool::Eraser);
    p.params().set_eraser_size(2);
    p.pointer_down(Point::new(10, 1)).unwrap();
    p.pointer_up(Point::new(10, 1)).unwrap();
    p.select_tool(Tool::Brush);
    p
}

#[test]
fn png_export_reopens_pixel_identical() {
    let dir = Scratch::new();
    let path = dir.file("out.png");
    let mut p = painted();
    assert!(p.is_dirty);
    let expected = p.composite();

    p.save_image(&path, "png").unwrap();
    assert!(!p.is_dirty);

    let reopened = Project::from_file(&path, ToolParameterStore::default()).unwrap();
    assert_eq!(reopened.layers().len(), 1);
    assert_eq!(reopened.composite(), expected);
    assert_eq!(reopened.name, "out.png");
    assert!(!reopened.selection().is_some());
}

#[test]
fn tiff_export_reopens_pixel_identical() {
    let dir = Scratch::new();
    let path = dir.file("out.tiff");
    let p = painted();
    io::save_image(p.layers(), &path, "TIFF", ExportOptions::default()).unwrap();

    let stack = io::open_image(&path).unwrap();
    assert_eq!(stack.composite(), p.composite());
}

#[test]
fn lossy_export_keeps_document_dirty() {
    let dir = Scratch::new();
    let path = dir.file("out.jpg");
    let mut p = painted();
    p.save_image(&path, "jpg").unwrap();
    assert!(p.is_dirty);
    assert!(path.exists());
}

#[test]
fn unknown_format_token_writes_nothing() {
    let dir = Scratch::new();
    let path = dir.file("out.xyz");
    let mut p = painted();
    let err = p.save_image(&path, "xyz").unwrap_err();
    assert!(matches!(err, EditorError::Format(_)));
    assert!(!path.exists());
    assert!(p.is_dirty);
}

#[test]
fn failed_open_keeps_current_document() {
    let dir = Scratch::new();
    let garbage = dir.file("garbage.png");
    std::fs::write(&garbage, b"definitely not an image").unwrap();

    let mut p = painted();
    p.select_tool(Tool::Marquee);
    p.pointer_down(Point::new(1, 1)).unwrap();
    p.pointer_up(Point::new(4, 4)).unwrap();
    let before = p.composite();
    let title = p.display_title();

    let err = p.open_image(&garbage).unwrap_err();
    assert!(matches!(err, EditorError::Format(_)));
    let err = p.open_image(&dir.file("missing.png")).unwrap_err();
    assert!(matches!(err, EditorError::Io { .. }));

    assert_eq!(p.composite(), before);
    assert!(p.selection().is_some());
    assert_eq!(p.display_title(), title);
    assert!(p.path.is_none());
}

#[test]
fn successful_open_replaces_stack_and_clears_selection() {
    let dir = Scratch::new();
    let path = dir.file("small.png");
    image::RgbaImage::from_pixel(3, 2, RED).save(&path).unwrap();

    let mut p = painted();
    let rx = p.subscribe();
    p.select_tool(Tool::Marquee);
    p.pointer_down(Point::new(0, 0)).unwrap();
    p.pointer_up(Point::new(2, 2)).unwrap();

    p.open_image(&path).unwrap();
    assert_eq!((p.layers().width(), p.layers().height()), (3, 2));
    assert!(!p.selection().is_some());
    assert!(!p.is_dirty);
    assert_eq!(p.path.as_deref(), Some(path.as_path()));
    assert_eq!(rx.try_iter().last(), Some(pmig::Damage::Document));
}

#[test]
fn project_file_round_trips_layers() {
    let dir = Scratch::new();
    let path = dir.file("doc.pmig");
    let mut p = painted();
    let ink = p.new_layer("Ink");
    p.pointer_down(Point::new(6, 6)).unwrap();
    p.pointer_up(Point::new(6, 6)).unwrap();
    p.select_tool(Tool::Marquee);
    p.pointer_down(Point::new(0, 0)).unwrap();
    p.pointer_up(Point::new(3, 3)).unwrap();

    p.save_project(&path).unwrap();
    assert!(!p.is_dirty);
    assert_eq!(p.name, "doc.pmig");

    let loaded = Project::from_file(&path, ToolParameterStore::default()).unwrap();
    let (a, b) = (p.layers(), loaded.layers());
    assert_eq!(b.len(), 2);
    assert_eq!(b.current_layer().unwrap(), ink);
    for (la, lb) in a.layers().iter().zip(b.layers()) {
        assert_eq!(la.name, lb.name);
        assert_eq!(la.visible, lb.visible);
        assert_eq!(la.pixels.to_rgba_image(), lb.pixels.to_rgba_image());
    }
    // The selection is not part of the document file.
    assert!(!loaded.selection().is_some());
}

#[test]
fn project_loader_rejects_foreign_files() {
    let dir = Scratch::new();
    let path = dir.file("fake.pmig");
    std::fs::write(&path, [0u8; 64]).unwrap();
    assert!(matches!(io::load_project(&path), Err(EditorError::Project(_))));
}

#[test]
fn background_export_reports_completion() {
    let dir = Scratch::new();
    let path = dir.file("bg.png");
    let mut p = painted();
    let expected = p.composite();
    let (tx, rx) = mpsc::channel();

    p.export_in_background(path.clone(), ExportFormat::Png, tx);
    // Keep editing while the snapshot is encoded.
    p.pointer_down(Point::new(0, 7)).unwrap();

    match rx.recv_timeout(Duration::from_secs(30)).unwrap() {
        IoResult::SaveComplete { path: done, format } => {
            assert_eq!(done, path);
            assert_eq!(format, ExportFormat::Png);
        }
        IoResult::SaveFailed { error, .. } => panic!("export failed: {error}"),
    }
    assert_eq!(io::decode_image(&path).unwrap(), expected);
}

#[test]
fn settings_file_seeds_new_documents() {
    let dir = Scratch::new();
    let path = dir.file("cfg/pmig_settings.cfg");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        "# defaults\n\
         canvas_width=32\n\
         canvas_height=16\n\
         background=#00000000\n\
         brush_size=4\n\
         line_style=dotted\n\
         eraser_shape=round\n\
         bogus_key=1\n",
    )
    .unwrap();

    let settings = EngineSettings::load_from(&path);
    let p = Project::from_settings(2, &settings).unwrap();
    assert_eq!((p.layers().width(), p.layers().height()), (32, 16));
    assert_eq!(
        p.layers().pixel_at(0, Point::new(0, 0)).unwrap(),
        Rgba([0, 0, 0, 0])
    );
    let params = p.params().snapshot();
    assert_eq!(params.brush_size, 4);
    assert_eq!(params.eraser_size, 10);

    settings.save_to(&path).unwrap();
    assert_eq!(EngineSettings::load_from(&path), settings);
}

#[test]
fn window_layout_survives_restart() {
    let dir = Scratch::new();
    let path = dir.file("layout.bin");
    let layout = WindowLayout {
        geometry: vec![1, 2, 3, 4],
        state: vec![9; 40],
    };
    save_layout(&path, &layout).unwrap();
    assert_eq!(load_layout(&path).unwrap(), layout);

    std::fs::write(&path, [10u8, 1, 2]).unwrap();
    assert!(load_layout(&path).is_err());
}
