//! Tests for the presenter facade, run against the software device.

#![cfg(test)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::rendering::device::{ClientArea, DeviceStatus, HealthProbe, SoftwareDevice, SoftwareOptions, SoftwareWindow};
use crate::rendering::shader::DEFAULT_SHADER;
use crate::rendering::types::{ChromaOrder, Plane};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct TestWindow {
    size: Mutex<Size>,
    presented: AtomicU32,
}

impl TestWindow {
    fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            size: Mutex::new(Size::new(width, height)),
            presented: AtomicU32::new(0),
        })
    }

    fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = Size::new(width, height);
    }
}

impl ClientArea for TestWindow {
    fn client_size(&self) -> Size {
        *self.size.lock()
    }
}

impl SoftwareWindow for TestWindow {
    fn present(&self, _frame: &Frame) {
        self.presented.fetch_add(1, Ordering::SeqCst);
    }
}

fn headless() -> Presenter<SoftwareDevice> {
    init_logging();
    Presenter::initialize(None, 0, PresenterConfig::default(), SoftwareOptions::default()).unwrap()
}

fn headless_with(health: &HealthProbe) -> Presenter<SoftwareDevice> {
    init_logging();
    let options = SoftwareOptions {
        health: health.clone(),
        ..Default::default()
    };
    Presenter::initialize(None, 0, PresenterConfig::default(), options).unwrap()
}

fn windowed(window: &Arc<TestWindow>) -> Presenter<SoftwareDevice> {
    init_logging();
    let window: Arc<dyn SoftwareWindow> = window.clone();
    Presenter::initialize(Some(window), 0, PresenterConfig::default(), SoftwareOptions::default()).unwrap()
}

/// YV12 planes for a uniform picture.
struct Yuv420 {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    width: usize,
}

impl Yuv420 {
    fn uniform(width: usize, height: usize, y: u8, u: u8, v: u8) -> Self {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        Self {
            y: vec![y; width * height],
            u: vec![u; cw * ch],
            v: vec![v; cw * ch],
            width,
        }
    }

    fn planes(&self) -> Planes<'_> {
        Planes::Planar {
            y: Plane::new(&self.y, self.width),
            u: Plane::new(&self.u, self.width.div_ceil(2)),
            v: Plane::new(&self.v, self.width.div_ceil(2)),
        }
    }
}

fn capture(presenter: &Presenter<SoftwareDevice>, kind: CaptureKind) -> (CaptureInfo, Vec<u8>) {
    let info = presenter.capture_frame(None, kind).unwrap();
    let mut buffer = vec![0u8; info.buffer_len()];
    presenter.capture_frame(Some(&mut buffer), kind).unwrap();
    (info, buffer)
}

#[test]
fn test_display_before_surface_is_not_ready() {
    let presenter = headless();
    let picture = Yuv420::uniform(16, 16, 200, 128, 128);
    let err = presenter.display(&picture.planes()).unwrap_err();
    assert!(matches!(err, PresentError::NotReady(_)));
    let err = presenter.capture_frame(None, CaptureKind::Video).unwrap_err();
    assert!(matches!(err, PresentError::NotReady(_)));
}

#[test]
fn test_surface_then_display_succeeds_for_many_sizes() {
    let presenter = headless();
    for (w, h) in [(1, 1), (2, 2), (15, 9), (16, 16), (33, 17), (320, 240)] {
        presenter.create_video_surface(w, h, PixelFormat::Yv12, 1.0).unwrap();
        let picture = Yuv420::uniform(w as usize, h as usize, 100, 128, 128);
        presenter.display(&picture.planes()).unwrap();
        assert_eq!(presenter.video_size(), Some(Size::new(w, h)));
    }
}

#[test]
fn test_yv12_round_trip_through_video_capture() {
    let presenter = headless();
    presenter.create_video_surface(16, 16, PixelFormat::Yv12, 1.0).unwrap();
    let picture = Yuv420::uniform(16, 16, 200, 128, 128);
    presenter.display(&picture.planes()).unwrap();

    let (info, buffer) = capture(&presenter, CaptureKind::Video);
    assert_eq!((info.width, info.height, info.stride), (16, 16, 64));
    for px in buffer.chunks_exact(4) {
        let (y, u, v) = crate::rendering::convert::bgra_to_yuv([px[0], px[1], px[2], px[3]]);
        assert!((y as i32 - 200).abs() <= 2, "luma {}", y);
        assert!((u as i32 - 128).abs() <= 2, "u {}", u);
        assert!((v as i32 - 128).abs() <= 2, "v {}", v);
    }
}

#[test]
fn test_capture_two_call_protocol() {
    let presenter = headless();
    presenter.create_video_surface(40, 30, PixelFormat::Rgb32, 1.0).unwrap();

    let info = presenter.capture_frame(None, CaptureKind::Display).unwrap();
    assert_eq!((info.width, info.height, info.stride), (40, 30, 160));

    let len = info.buffer_len();
    let mut buffer = vec![0xAAu8; len + 16];
    presenter.capture_frame(Some(&mut buffer), CaptureKind::Display).unwrap();
    assert!(buffer[len..].iter().all(|&b| b == 0xAA));

    let mut short = vec![0u8; len - 1];
    let err = presenter
        .capture_frame(Some(&mut short), CaptureKind::Display)
        .unwrap_err();
    assert!(matches!(err, PresentError::InvalidArgument(_)));
}

#[test]
fn test_display_pitch_uses_planar_slot_order() {
    let presenter = headless();
    presenter.create_video_surface(8, 8, PixelFormat::Yv12, 1.0).unwrap();

    // slot 1 holds V under the default order; a red-ish picture needs V high
    let y = vec![81u8; 64];
    let v = vec![240u8; 16];
    let u = vec![90u8; 16];
    presenter
        .display_pitch(&[&y, &v, &u], &[8, 4, 4])
        .unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Video);
    let (b, r) = (buffer[0], buffer[2]);
    assert!(r > 200 && b < 60, "expected red, got b={} r={}", b, r);

    let err = presenter.display_pitch(&[&y, &v], &[8, 4]).unwrap_err();
    assert!(matches!(err, PresentError::InvalidArgument(_)));
}

#[test]
fn test_interleaved_chroma_order_from_config() {
    init_logging();
    let config = PresenterConfig {
        interleaved_chroma_order: ChromaOrder::Vu,
        ..Default::default()
    };
    let presenter: Presenter<SoftwareDevice> =
        Presenter::initialize(None, 0, config, SoftwareOptions::default()).unwrap();
    presenter.create_video_surface(4, 4, PixelFormat::Nv12, 1.0).unwrap();

    let y = vec![81u8; 16];
    // V first in the caller buffer
    let vu: Vec<u8> = [240u8, 90].repeat(4);
    presenter
        .display(&Planes::SemiPlanar {
            luma: Plane::new(&y, 4),
            chroma: Plane::new(&vu, 4),
        })
        .unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Video);
    assert!(buffer[2] > 200 && buffer[0] < 60);
}

#[test]
fn test_unsupported_format_fails_allocation() {
    init_logging();
    let options = SoftwareOptions {
        unsupported_formats: vec![PixelFormat::Uyvy],
        ..Default::default()
    };
    let presenter: Presenter<SoftwareDevice> =
        Presenter::initialize(None, 0, PresenterConfig::default(), options).unwrap();
    assert!(!presenter.check_format_conversion(PixelFormat::Uyvy));
    assert!(presenter.check_format_conversion(PixelFormat::Yuy2));
    let err = presenter
        .create_video_surface(16, 16, PixelFormat::Uyvy, 1.0)
        .unwrap_err();
    assert!(matches!(err, PresentError::AllocationError(_)));
}

#[test]
fn test_invalid_surface_arguments() {
    let presenter = headless();
    assert!(matches!(
        presenter.create_video_surface(0, 16, PixelFormat::Yv12, 1.0),
        Err(PresentError::InvalidArgument(_))
    ));
    assert!(matches!(
        presenter.create_video_surface(16, 16, PixelFormat::Yv12, -1.0),
        Err(PresentError::InvalidArgument(_))
    ));
    assert!(Presenter::<SoftwareDevice>::initialize(
        None,
        3,
        PresenterConfig::default(),
        SoftwareOptions::default()
    )
    .is_err());
}

#[test]
fn test_headless_display_area_applies_pixel_aspect() {
    let presenter = headless();
    presenter.create_video_surface(100, 50, PixelFormat::Yv12, 1.5).unwrap();
    assert_eq!(presenter.display_size(), Some(Size::new(150, 50)));
    assert_eq!(presenter.target_rect(), Rect::new(0, 0, 150, 50));
}

#[test]
fn test_windowed_letterbox_and_fill_mode() {
    let window = TestWindow::new(640, 360);
    let presenter = windowed(&window);
    assert!(presenter.is_windowed());
    assert_eq!(presenter.display_size(), Some(Size::new(640, 360)));

    presenter.create_video_surface(320, 240, PixelFormat::Rgb32, 1.0).unwrap();
    assert_eq!(presenter.target_rect(), Rect::new(80, 0, 560, 360));

    presenter.set_fill_mode(FillMode::Fill);
    assert_eq!(presenter.fill_mode(), FillMode::Fill);
    assert_eq!(presenter.target_rect(), Rect::new(0, 0, 640, 360));
}

#[test]
fn test_display_presents_to_window_with_letterbox_bars() {
    let window = TestWindow::new(64, 32);
    let presenter = windowed(&window);
    presenter.create_video_surface(32, 32, PixelFormat::Rgb32, 1.0).unwrap();

    let white = vec![0xFFu8; 32 * 32 * 4];
    presenter
        .display(&Planes::Packed(Plane::new(&white, 32 * 4)))
        .unwrap();
    assert_eq!(window.presented.load(Ordering::SeqCst), 1);
    assert_eq!(presenter.with_device(|d| d.frames_presented()), 1);

    let (info, buffer) = capture(&presenter, CaptureKind::Display);
    let at = |x: usize, y: usize| &buffer[y * info.stride + x * 4..y * info.stride + x * 4 + 3];
    assert_eq!(at(2, 16), &[0, 0, 0]);
    assert_eq!(at(32, 16), &[255, 255, 255]);
    assert_eq!(at(62, 16), &[0, 0, 0]);
}

#[test]
fn test_window_resize_rebuilds_display() {
    let window = TestWindow::new(200, 100);
    let presenter = windowed(&window);
    presenter.create_video_surface(100, 100, PixelFormat::Yv12, 1.0).unwrap();
    assert_eq!(presenter.target_rect(), Rect::new(50, 0, 150, 100));

    window.resize(100, 200);
    presenter.on_window_size_changed().unwrap();
    assert_eq!(presenter.display_size(), Some(Size::new(100, 200)));
    assert_eq!(presenter.target_rect(), Rect::new(0, 50, 100, 150));

    window.resize(0, 0);
    presenter.on_window_size_changed().unwrap();
    assert_eq!(presenter.display_size(), Some(Size::new(1, 1)));
}

#[test]
fn test_headless_size_change_keeps_video_sized_target() {
    let presenter = headless();
    presenter.create_video_surface(30, 20, PixelFormat::Rgb32, 1.0).unwrap();
    presenter.on_window_size_changed().unwrap();
    assert_eq!(presenter.display_size(), Some(Size::new(30, 20)));
    assert_eq!(presenter.target_rect(), Rect::new(0, 0, 30, 20));
    presenter.repaint().unwrap();
}

#[test]
fn test_rejected_surface_keeps_previous_one() {
    init_logging();
    let options = SoftwareOptions {
        max_texture_size: 128,
        ..Default::default()
    };
    let presenter =
        Presenter::<SoftwareDevice>::initialize(None, 0, PresenterConfig::default(), options).unwrap();
    presenter.create_video_surface(64, 64, PixelFormat::Gray8, 1.0).unwrap();

    let err = presenter
        .create_video_surface(200, 2, PixelFormat::Gray8, 1.0)
        .unwrap_err();
    assert!(matches!(err, PresentError::AllocationError(_)));
    assert_eq!(presenter.video_size(), Some(Size::new(64, 64)));
    assert_eq!(presenter.display_size(), Some(Size::new(64, 64)));
    assert_eq!(presenter.target_rect(), Rect::new(0, 0, 64, 64));

    let gray = vec![90u8; 64 * 64];
    presenter
        .display(&Planes::Packed(Plane::new(&gray, 64)))
        .unwrap();
    let (info, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!((info.width, info.height), (64, 64));
    assert_eq!(&buffer[..3], &[90, 90, 90]);
}

#[test]
fn test_clear_and_repaint() {
    let presenter = headless();
    presenter.create_video_surface(8, 8, PixelFormat::Gray8, 1.0).unwrap();
    let gray = vec![128u8; 64];
    presenter
        .display(&Planes::Packed(Plane::new(&gray, 8)))
        .unwrap();

    presenter.clear(Color::rgb(0, 0, 255)).unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!(&buffer[..4], &[255, 0, 0, 255]);

    presenter.repaint().unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!(&buffer[..3], &[128, 128, 128]);
}

#[test]
fn test_display_surface_replaces_video_source() {
    let presenter = headless();
    presenter.create_video_surface(10, 10, PixelFormat::Rgb32, 1.0).unwrap();
    let external = Frame::filled(10, 10, Color::rgb(0, 255, 0));
    presenter.display_surface(&external).unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!(&buffer[..3], &[0, 255, 0]);

    let broken = Frame {
        width: 10,
        height: 10,
        stride: 40,
        data: vec![0; 100],
    };
    assert!(matches!(
        presenter.display_surface(&broken),
        Err(PresentError::InvalidArgument(_))
    ));
}

#[test]
fn test_external_frame_uses_video_target_rect() {
    let window = TestWindow::new(160, 160);
    let presenter = windowed(&window);
    presenter.create_video_surface(160, 90, PixelFormat::Rgb32, 1.0).unwrap();
    let video_rect = presenter.target_rect();
    assert_eq!(video_rect, Rect::new(0, 35, 160, 125));

    let square = Frame::filled(40, 40, Color::rgb(0, 255, 0));
    presenter.display_surface(&square).unwrap();
    assert_eq!(presenter.target_rect(), video_rect);

    let (info, buffer) = capture(&presenter, CaptureKind::Display);
    let at = |x: usize, y: usize| &buffer[y * info.stride + x * 4..y * info.stride + x * 4 + 3];
    assert_eq!(at(80, 10), &[0, 0, 0]);
    assert_eq!(at(80, 80), &[0, 255, 0]);
    assert_eq!(at(80, 150), &[0, 0, 0]);
}

#[test]
fn test_external_frame_sizes_headless_display_without_video() {
    let presenter = headless();
    let wide = Frame::filled(40, 20, Color::rgb(0, 0, 255));
    presenter.display_surface(&wide).unwrap();
    assert_eq!(presenter.display_size(), Some(Size::new(40, 20)));
    assert_eq!(presenter.target_rect(), Rect::new(0, 0, 40, 20));
}

#[test]
fn test_palette_surface() {
    let presenter = headless();
    assert!(matches!(
        presenter.set_palette(&[Color::WHITE]),
        Err(PresentError::NotReady(_))
    ));
    presenter.create_video_surface(4, 4, PixelFormat::Pal8, 1.0).unwrap();
    presenter
        .set_palette(&[Color::BLACK, Color::rgb(255, 0, 0)])
        .unwrap();
    let indices = vec![1u8; 16];
    presenter
        .display(&Planes::Packed(Plane::new(&indices, 4)))
        .unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Video);
    assert_eq!(&buffer[..4], &[0, 0, 255, 255]);
}

// ------------------------------------------------------------------
// Overlays
// ------------------------------------------------------------------

#[test]
fn test_overlay_replace_keeps_one_entry() {
    let presenter = headless();
    presenter
        .draw_line(1, Point::new(0.0, 0.0), Point::new(5.0, 5.0), 1.0, Color::WHITE, 255)
        .unwrap();
    presenter
        .draw_rectangle(2, Rect::new(1, 1, 4, 4), 1.0, Color::WHITE, 255)
        .unwrap();
    presenter
        .draw_rectangle(1, Rect::new(0, 0, 3, 3), 2.0, Color::WHITE, 128)
        .unwrap();
    assert_eq!(presenter.overlay_keys(), vec![2, 1]);
    assert_eq!(presenter.engine.lock().overlays.get(1).map(Overlay::kind), Some("rectangle"));
}

#[test]
fn test_remove_overlay_is_idempotent() {
    let presenter = headless();
    presenter
        .draw_polygon(
            4,
            &[Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(2.0, 3.0)],
            1.0,
            Color::WHITE,
            255,
        )
        .unwrap();
    presenter.remove_overlay(9);
    assert_eq!(presenter.overlay_keys(), vec![4]);
    presenter.remove_overlay(4);
    presenter.remove_overlay(4);
    assert!(presenter.overlay_keys().is_empty());

    presenter
        .draw_line(1, Point::new(0.0, 0.0), Point::new(1.0, 1.0), 1.0, Color::WHITE, 255)
        .unwrap();
    presenter.remove_all_overlays();
    assert!(presenter.overlay_keys().is_empty());
}

#[test]
fn test_invalid_overlay_arguments() {
    let presenter = headless();
    assert!(presenter
        .draw_polygon(1, &[Point::new(0.0, 0.0)], 1.0, Color::WHITE, 255)
        .is_err());
    assert!(presenter
        .draw_bitmap_file(1, "/nonexistent/overlay.png", Rect::new(0, 0, 4, 4), None, 255)
        .is_err());
    assert!(matches!(
        presenter.update_overlay_opacity(7, 10),
        Err(PresentError::InvalidArgument(_))
    ));
    assert!(presenter.overlay_keys().is_empty());
}

#[test]
fn test_overlays_drawn_over_video_and_hidden_on_request() {
    let presenter = headless();
    presenter.create_video_surface(20, 20, PixelFormat::Rgb32, 1.0).unwrap();
    let black = vec![0u8; 20 * 20 * 4];
    let pixels = vec![0xFFu8; 4 * 4 * 4];
    presenter
        .draw_bitmap(3, &pixels, 16, 4, 4, Rect::new(2, 2, 6, 6), None, 255)
        .unwrap();
    presenter
        .display(&Planes::Packed(Plane::new(&black, 80)))
        .unwrap();
    let (info, buffer) = capture(&presenter, CaptureKind::Display);
    let at = |x: usize, y: usize| buffer[y * info.stride + x * 4];
    assert_eq!(at(3, 3), 255);
    assert_eq!(at(10, 10), 0);

    presenter.update_overlay_opacity(3, 0).unwrap();
    presenter.repaint().unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!(buffer[3 * info.stride + 12], 0);

    presenter.update_overlay_opacity(3, 255).unwrap();
    presenter.set_show_overlays(false);
    assert!(!presenter.show_overlays());
    presenter.repaint().unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!(buffer[3 * info.stride + 12], 0);

    // video capture never contains overlays
    presenter.set_show_overlays(true);
    let (_, buffer) = capture(&presenter, CaptureKind::Video);
    assert_eq!(buffer[3 * info.stride + 12], 0);
}

#[test]
fn test_overlay_stream_updates() {
    let presenter = headless();
    presenter.create_video_surface(16, 16, PixelFormat::Rgb32, 1.0).unwrap();
    presenter
        .add_overlay_stream(5, 8, 8, PixelFormat::Yv12, Rect::new(0, 0, 8, 8), 255)
        .unwrap();
    assert!(matches!(
        presenter.add_overlay_stream(6, 8, 8, PixelFormat::Pal8, Rect::new(0, 0, 8, 8), 255),
        Err(PresentError::UnsupportedFormat(_))
    ));

    // no frame yet: the stream is skipped, the rest still renders
    let black = vec![0u8; 16 * 16 * 4];
    presenter
        .display(&Planes::Packed(Plane::new(&black, 64)))
        .unwrap();

    let picture = Yuv420::uniform(8, 8, 235, 128, 128);
    presenter.update_overlay_frame(5, &picture.planes()).unwrap();
    presenter.repaint().unwrap();
    let (info, buffer) = capture(&presenter, CaptureKind::Display);
    assert!(buffer[4 * info.stride + 16] > 240);
    assert_eq!(buffer[12 * info.stride + 48], 0);

    presenter
        .draw_line(7, Point::new(0.0, 0.0), Point::new(1.0, 1.0), 1.0, Color::WHITE, 255)
        .unwrap();
    assert!(matches!(
        presenter.update_overlay_frame(7, &picture.planes()),
        Err(PresentError::InvalidArgument(_))
    ));
    assert!(matches!(
        presenter.update_overlay_frame(8, &picture.planes()),
        Err(PresentError::InvalidArgument(_))
    ));
}

// ------------------------------------------------------------------
// Shaders
// ------------------------------------------------------------------

const WVP_SHADER: &str = r#"
struct VertexConstants {
    world_view_proj: mat4x4<f32>,
};

@group(1) @binding(0) var<uniform> vc: VertexConstants;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.position = vc.world_view_proj * vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

#[test]
fn test_shader_setup_and_constants() {
    let presenter = headless();
    presenter.create_video_surface(32, 16, PixelFormat::Rgb32, 1.0).unwrap();

    assert!(matches!(
        presenter.set_vertex_shader_constant("world_view_proj", &ShaderConstant::Float(1.0)),
        Err(PresentError::NotReady(_))
    ));

    let source = ShaderSource::Wgsl(WVP_SHADER.to_string());
    presenter.set_vertex_shader(&source, "vs_main", "vs_5_0").unwrap();
    presenter.apply_world_view_proj("world_view_proj").unwrap();
    assert!(presenter.apply_world_view_proj("missing").is_err());

    let default = ShaderSource::Wgsl(DEFAULT_SHADER.to_string());
    presenter.set_pixel_shader(&default, "ps_main", "ps_5_0").unwrap();
    assert!(matches!(
        presenter.set_pixel_shader(&default, "ps_main", "vs_5_0"),
        Err(PresentError::ShaderCompilationError(_))
    ));
    assert!(matches!(
        presenter.set_pixel_shader(&ShaderSource::Wgsl("fn broken(".into()), "ps_main", "ps_5_0"),
        Err(PresentError::ShaderCompilationError(_))
    ));
    assert!(presenter.set_pixel_shader_bytecode(&[1, 2, 3]).is_err());

    // custom shaders do not change what the software device samples
    let frame = vec![0x40u8; 32 * 16 * 4];
    presenter
        .display(&Planes::Packed(Plane::new(&frame, 128)))
        .unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert_eq!(buffer[0], 0x40);

    presenter.clear_vertex_shader();
    presenter.clear_pixel_shader();
    assert!(presenter.engine.lock().shaders.vertex().is_none());
}

// ------------------------------------------------------------------
// Device lifecycle
// ------------------------------------------------------------------

fn counting_callbacks(presenter: &Presenter<SoftwareDevice>) -> (Arc<AtomicU32>, Arc<AtomicU32>) {
    let lost = Arc::new(AtomicU32::new(0));
    let reset = Arc::new(AtomicU32::new(0));
    let (l, r) = (lost.clone(), reset.clone());
    presenter.register_device_callbacks(
        move || {
            l.fetch_add(1, Ordering::SeqCst);
        },
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
    );
    (lost, reset)
}

#[test]
fn test_lost_fires_once() {
    let health = HealthProbe::new();
    let presenter = headless_with(&health);
    let (lost, reset) = counting_callbacks(&presenter);

    assert_eq!(presenter.check_device().unwrap(), DeviceState::Ready);
    health.set(DeviceStatus::Lost);
    for _ in 0..3 {
        assert_eq!(presenter.check_device().unwrap(), DeviceState::Lost);
    }
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(reset.load(Ordering::SeqCst), 0);
}

#[test]
fn test_operations_unavailable_while_lost() {
    let health = HealthProbe::new();
    let presenter = headless_with(&health);
    presenter.create_video_surface(16, 16, PixelFormat::Yv12, 1.0).unwrap();
    let picture = Yuv420::uniform(16, 16, 200, 128, 128);
    presenter.display(&picture.planes()).unwrap();

    health.set(DeviceStatus::Lost);
    presenter.check_device().unwrap();
    assert!(matches!(
        presenter.display(&picture.planes()),
        Err(PresentError::DeviceUnavailable(DeviceState::Lost))
    ));
    assert!(matches!(presenter.repaint(), Err(PresentError::DeviceUnavailable(_))));
    assert!(matches!(
        presenter.capture_frame(None, CaptureKind::Display),
        Err(PresentError::DeviceUnavailable(_))
    ));
    // video capture and overlay edits do not need the device
    presenter.capture_frame(None, CaptureKind::Video).unwrap();
    presenter
        .draw_line(1, Point::new(0.0, 0.0), Point::new(2.0, 2.0), 1.0, Color::WHITE, 255)
        .unwrap();
}

#[test]
fn test_reset_after_loss_restores_presentation() {
    let health = HealthProbe::new();
    let presenter = headless_with(&health);
    let (lost, reset) = counting_callbacks(&presenter);
    presenter.create_video_surface(16, 16, PixelFormat::Yv12, 1.0).unwrap();

    health.set(DeviceStatus::Lost);
    presenter.check_device().unwrap();
    health.set(DeviceStatus::NotReset);
    assert_eq!(presenter.check_device().unwrap(), DeviceState::Ready);
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(reset.load(Ordering::SeqCst), 1);
    assert_eq!(presenter.display_size(), Some(Size::new(16, 16)));

    let picture = Yuv420::uniform(16, 16, 200, 128, 128);
    presenter.display(&picture.planes()).unwrap();
    let (_, buffer) = capture(&presenter, CaptureKind::Display);
    assert!((buffer[0] as i32 - 214).abs() <= 1);
}

#[test]
fn test_failed_reset_stays_not_reset_and_retries() {
    let health = HealthProbe::new();
    let presenter = headless_with(&health);
    let (_, reset) = counting_callbacks(&presenter);

    health.set(DeviceStatus::Lost);
    presenter.check_device().unwrap();
    health.set(DeviceStatus::NotReset);
    health.fail_resets(1);
    assert!(matches!(
        presenter.check_device(),
        Err(PresentError::AllocationError(_))
    ));
    assert_eq!(presenter.device_state(), DeviceState::NotReset);

    // retried without a second notification
    assert_eq!(presenter.check_device().unwrap(), DeviceState::Ready);
    assert_eq!(reset.load(Ordering::SeqCst), 1);
}

#[test]
fn test_not_reset_from_ready_resets_without_callback() {
    let health = HealthProbe::new();
    let presenter = headless_with(&health);
    let (lost, reset) = counting_callbacks(&presenter);

    health.set(DeviceStatus::NotReset);
    assert_eq!(presenter.check_device().unwrap(), DeviceState::Ready);
    assert_eq!(lost.load(Ordering::SeqCst), 0);
    assert_eq!(reset.load(Ordering::SeqCst), 0);
}

#[test]
fn test_spontaneous_recovery() {
    let health = HealthProbe::new();
    let window = TestWindow::new(32, 32);
    let options = SoftwareOptions {
        health: health.clone(),
        ..Default::default()
    };
    let window_dyn: Arc<dyn SoftwareWindow> = window.clone();
    let presenter: Presenter<SoftwareDevice> =
        Presenter::initialize(Some(window_dyn), 0, PresenterConfig::default(), options).unwrap();

    health.set(DeviceStatus::Lost);
    presenter.check_device().unwrap();
    health.set(DeviceStatus::Ok);
    assert_eq!(presenter.check_device().unwrap(), DeviceState::Ready);
    presenter.repaint().unwrap();
    assert_eq!(window.presented.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callbacks_may_call_back_into_presenter() {
    let health = HealthProbe::new();
    let presenter = Arc::new(headless_with(&health));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (p1, s1) = (Arc::downgrade(&presenter), seen.clone());
    let (p2, s2) = (Arc::downgrade(&presenter), seen.clone());
    presenter.register_device_callbacks(
        move || {
            if let Some(p) = p1.upgrade() {
                s1.lock().push(p.device_state());
            }
        },
        move || {
            if let Some(p) = p2.upgrade() {
                s2.lock().push(p.device_state());
            }
        },
    );

    health.set(DeviceStatus::Lost);
    presenter.check_device().unwrap();
    health.set(DeviceStatus::NotReset);
    presenter.check_device().unwrap();
    assert_eq!(*seen.lock(), vec![DeviceState::Lost, DeviceState::NotReset]);
}

#[test]
fn test_concurrent_callers() {
    let presenter = Arc::new(headless());
    presenter.create_video_surface(32, 32, PixelFormat::Yv12, 1.0).unwrap();

    let handles: Vec<_> = (0..4u16)
        .map(|i| {
            let presenter = presenter.clone();
            std::thread::spawn(move || {
                let picture = Yuv420::uniform(32, 32, 16 + i as u8 * 40, 128, 128);
                for n in 0..20u16 {
                    presenter.display(&picture.planes()).unwrap();
                    presenter
                        .draw_line(i, Point::new(0.0, 0.0), Point::new(n as f32, 4.0), 1.0, Color::WHITE, 200)
                        .unwrap();
                    presenter.capture_frame(None, CaptureKind::Display).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut keys = presenter.overlay_keys();
    keys.sort_unstable();
    assert_eq!(keys, vec![0, 1, 2, 3]);
}
