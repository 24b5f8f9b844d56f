//! The presentation engine facade.
//!
//! One [`Presenter`] owns one graphics device, one offscreen video surface, the
//! overlay store and the active shader pair. Every operation that touches any of
//! them runs under a single engine lock; device callbacks are stored separately and
//! always invoked with the engine lock released.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::PresenterConfig;
use crate::error::{OptionExt, PresentError, PresentResult};

use super::blit::{fill_surface, planes_from_slots};
use super::compositor::{Compositor, Scene};
use super::convert::convert_into;
use super::coord::{letterbox, Point, Rect, Size};
use super::device::GraphicsDevice;
use super::format::PixelFormat;
use super::lifecycle::{DeviceCallback, DeviceCallbacks, DeviceState, Lifecycle, Transition};
use super::overlay::{
    BitmapOverlay, LineOverlay, Overlay, OverlayKey, OverlayStore, PolygonOverlay,
    RectangleOverlay, TextOverlay, VideoOverlay,
};
use super::shader::{
    compile_bytecode, compile_source, ShaderConstant, ShaderSource, ShaderStage, ShaderState,
};
use super::surface::{ortho_projection, PresentationSurface};
use super::types::{CaptureInfo, CaptureKind, Color, FillMode, Frame, Planes};

mod tests;

/// Everything guarded by the engine lock.
struct Engine<D: GraphicsDevice> {
    device: D,
    lifecycle: Lifecycle,
    config: PresenterConfig,
    video: Option<PresentationSurface>,
    /// BGRA picture of `video`, refreshed on every `display`.
    video_frame: Option<Frame>,
    /// Externally rendered frame replacing the video as stretch source.
    external: Option<Frame>,
    target_rect: Rect,
    overlays: OverlayStore,
    shaders: ShaderState,
    compositor: Compositor,
}

impl<D: GraphicsDevice> Engine<D> {
    /// Size the display target should have right now.
    fn display_area(&self) -> Option<Size> {
        if self.device.is_windowed() {
            Some(self.device.back_buffer_size())
        } else if let Some(video) = &self.video {
            Some(video.display_size())
        } else {
            self.external.as_ref().map(Frame::size)
        }
    }

    fn update_target_rect(&mut self) {
        let area = self
            .device
            .display_size()
            .or_else(|| self.display_area())
            .unwrap_or(Size::new(1, 1));
        // an external frame is stretched through the video's rectangle when one exists
        let (source, par) = match (&self.video, &self.external) {
            (Some(video), _) => (video.size(), video.pixel_aspect_ratio()),
            (None, Some(frame)) => (frame.size(), 0.0),
            (None, None) => (area, 0.0),
        };
        self.target_rect = letterbox(area, source, par, self.config.fill_mode);
    }

    /// Recreate display-size dependent resources.
    fn rebuild_display(&mut self) -> PresentResult<()> {
        self.device.discard_display_target();
        if let Some(size) = self.display_area() {
            self.device.create_display_target(size)?;
            log::debug!("[PRESENTER] Display target {}x{}", size.width, size.height);
        }
        self.update_target_rect();
        Ok(())
    }

    /// Stretch the current source and compose a frame.
    fn render(&mut self) -> PresentResult<()> {
        let Engine {
            device,
            config,
            video_frame,
            external,
            target_rect,
            overlays,
            shaders,
            compositor,
            ..
        } = self;
        let scene = Scene {
            source: external.as_ref().or(video_frame.as_ref()),
            target_rect: *target_rect,
            background: config.letterbox_color,
            shaders,
            overlays: config.show_overlays.then_some(&*overlays),
        };
        compositor.present(device, &scene)
    }

    fn render_cleared(&mut self, color: Color) -> PresentResult<()> {
        let Engine {
            device,
            config,
            target_rect,
            overlays,
            shaders,
            compositor,
            ..
        } = self;
        let scene = Scene {
            source: None,
            target_rect: *target_rect,
            background: color,
            shaders,
            overlays: config.show_overlays.then_some(&*overlays),
        };
        compositor.present_cleared(device, color, &scene)
    }

    fn display_planes(&mut self, planes: &Planes<'_>) -> PresentResult<()> {
        self.lifecycle.ensure_ready()?;
        let order = self.config.interleaved_chroma_order;
        let video = self.video.as_mut().not_ready("no video surface created")?;
        fill_surface(video, planes, order)?;
        let frame = self
            .video_frame
            .get_or_insert_with(|| Frame::black(video.width(), video.height()));
        convert_into(video, frame);
        if self.external.take().is_some() {
            self.update_target_rect();
        }
        self.render()
    }

    /// Reset the device and rebuild what the reset destroyed.
    fn reset_device(&mut self) -> PresentResult<()> {
        if let Err(e) = self.device.reset() {
            log::warn!("[PRESENTER] Device reset failed: {}", e);
            return Err(into_allocation(e));
        }
        self.rebuild_display().map_err(into_allocation)?;
        self.lifecycle.mark_ready();
        log::info!("[PRESENTER] Device reset, display resources recreated");
        Ok(())
    }
}

fn into_allocation(err: PresentError) -> PresentError {
    match err {
        PresentError::AllocationError(_) => err,
        other => PresentError::AllocationError(other.to_string()),
    }
}

/// Video presentation engine over a graphics device `D`.
pub struct Presenter<D: GraphicsDevice> {
    engine: Mutex<Engine<D>>,
    callbacks: RwLock<DeviceCallbacks>,
}

impl<D: GraphicsDevice> Presenter<D> {
    /// Open the device. With a window the display target is sized to its client
    /// area; headless presenters size it to the video once a surface exists.
    pub fn initialize(
        window: Option<Arc<D::Window>>,
        adapter_index: usize,
        config: PresenterConfig,
        options: D::Options,
    ) -> PresentResult<Self> {
        let device = D::open(window, adapter_index, options)?;
        log::info!(
            "[PRESENTER] Initialized on '{}' ({})",
            device.adapter_name(),
            if device.is_windowed() { "windowed" } else { "headless" }
        );

        let mut engine = Engine {
            device,
            lifecycle: Lifecycle::new(),
            config,
            video: None,
            video_frame: None,
            external: None,
            target_rect: Rect::new(0, 0, 1, 1),
            overlays: OverlayStore::new(),
            shaders: ShaderState::default(),
            compositor: Compositor::new(),
        };
        engine.rebuild_display()?;

        Ok(Self {
            engine: Mutex::new(engine),
            callbacks: RwLock::new(DeviceCallbacks::default()),
        })
    }

    /// Whether the device can convert `format` for display.
    pub fn check_format_conversion(&self, format: PixelFormat) -> bool {
        self.engine.lock().device.supports_format(format)
    }

    /// Allocate the offscreen video surface, replacing any previous one.
    pub fn create_video_surface(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel_aspect_ratio: f64,
    ) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        if !engine.device.supports_format(format) {
            return Err(PresentError::AllocationError(format!(
                "device cannot convert {} surfaces",
                format
            )));
        }
        let surface = PresentationSurface::allocate(
            width,
            height,
            format,
            pixel_aspect_ratio,
            engine.device.pitch_alignment(),
        )?;
        log::info!(
            "[PRESENTER] Video surface {}x{} {} (pitch {}, PAR {})",
            width,
            height,
            format,
            surface.pitch(),
            pixel_aspect_ratio
        );

        // headless target is allocated before the new surface is committed
        if !engine.device.is_windowed() && engine.lifecycle.state() == DeviceState::Ready {
            let size = surface.display_size();
            engine.device.discard_display_target();
            if let Err(e) = engine.device.create_display_target(size) {
                log::warn!(
                    "[PRESENTER] Display target {}x{} rejected, keeping previous surface: {}",
                    size.width,
                    size.height,
                    e
                );
                if let Err(restore) = engine.rebuild_display() {
                    log::warn!("[PRESENTER] Failed to restore display target: {}", restore);
                }
                return Err(e);
            }
            log::debug!("[PRESENTER] Display target {}x{}", size.width, size.height);
        }

        let mut frame = Frame::black(width, height);
        convert_into(&surface, &mut frame);
        engine.video = Some(surface);
        engine.video_frame = Some(frame);
        engine.external = None;
        engine.update_target_rect();
        Ok(())
    }

    /// Show a decoded frame.
    pub fn display(&self, planes: &Planes<'_>) -> PresentResult<()> {
        self.engine.lock().display_planes(planes)
    }

    /// Show a decoded frame given as positional plane and pitch arrays.
    ///
    /// Slot order of three-plane input follows `planar_chroma_order`.
    pub fn display_pitch(&self, planes: &[&[u8]], pitches: &[usize]) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        engine.lifecycle.ensure_ready()?;
        let format = engine
            .video
            .as_ref()
            .not_ready("no video surface created")?
            .format();
        let mapped = planes_from_slots(
            format.plane_count(),
            planes,
            pitches,
            engine.config.planar_chroma_order,
        )?;
        engine.display_planes(&mapped)
    }

    /// Show an externally rendered BGRA frame instead of the video surface.
    pub fn display_surface(&self, frame: &Frame) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        engine.lifecycle.ensure_ready()?;
        let frame = Frame::from_bgra(frame.width, frame.height, frame.stride, frame.data.clone())?;
        let resized = engine.external.as_ref().map(Frame::size) != Some(frame.size());
        engine.external = Some(frame);
        if resized && engine.video.is_none() {
            if engine.device.is_windowed() {
                engine.update_target_rect();
            } else {
                engine.rebuild_display()?;
            }
        }
        engine.render()
    }

    /// Recompose from the current source.
    pub fn repaint(&self) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        engine.lifecycle.ensure_ready()?;
        engine.render()
    }

    /// Fill the display with one color (overlays still draw on top).
    pub fn clear(&self, color: Color) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        engine.lifecycle.ensure_ready()?;
        engine.render_cleared(color)
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        let mut engine = self.engine.lock();
        engine.config.fill_mode = mode;
        engine.update_target_rect();
    }

    pub fn fill_mode(&self) -> FillMode {
        self.engine.lock().config.fill_mode
    }

    pub fn set_show_overlays(&self, show: bool) {
        self.engine.lock().config.show_overlays = show;
    }

    pub fn show_overlays(&self) -> bool {
        self.engine.lock().config.show_overlays
    }

    /// Palette of a `Pal8` video surface.
    pub fn set_palette(&self, colors: &[Color]) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        engine
            .video
            .as_mut()
            .not_ready("no video surface created")?
            .set_palette(colors)
    }

    // ------------------------------------------------------------------
    // Overlays
    // ------------------------------------------------------------------

    /// Insert or replace the overlay under `key`.
    pub fn add_overlay(&self, key: OverlayKey, overlay: Overlay) {
        let replaced = self.engine.lock().overlays.insert(key, overlay);
        // the replaced overlay is dropped outside the engine lock
        drop(replaced);
    }

    pub fn draw_line(
        &self,
        key: OverlayKey,
        from: Point,
        to: Point,
        width: f32,
        color: Color,
        opacity: u8,
    ) -> PresentResult<()> {
        let line = LineOverlay::new(from, to, width, color, opacity)?;
        self.add_overlay(key, Overlay::Line(line));
        Ok(())
    }

    pub fn draw_rectangle(
        &self,
        key: OverlayKey,
        rect: Rect,
        width: f32,
        color: Color,
        opacity: u8,
    ) -> PresentResult<()> {
        let rectangle = RectangleOverlay::new(rect, width, color, opacity)?;
        self.add_overlay(key, Overlay::Rectangle(rectangle));
        Ok(())
    }

    pub fn draw_polygon(
        &self,
        key: OverlayKey,
        points: &[Point],
        width: f32,
        color: Color,
        opacity: u8,
    ) -> PresentResult<()> {
        let polygon = PolygonOverlay::new(points.to_vec(), width, color, opacity)?;
        self.add_overlay(key, Overlay::Polygon(polygon));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_text(
        &self,
        key: OverlayKey,
        text: &str,
        font_family: &str,
        font_size: f32,
        origin: Point,
        color: Color,
        opacity: u8,
    ) -> PresentResult<()> {
        let overlay = TextOverlay::new(text, font_family, font_size, origin, color, opacity)?;
        self.add_overlay(key, Overlay::Text(overlay));
        Ok(())
    }

    /// Bitmap decoded from an image file.
    pub fn draw_bitmap_file(
        &self,
        key: OverlayKey,
        path: impl AsRef<Path>,
        dest: Rect,
        color_key: Option<Color>,
        opacity: u8,
    ) -> PresentResult<()> {
        let bitmap = BitmapOverlay::from_file(path, dest, color_key, opacity)?;
        self.add_overlay(key, Overlay::Bitmap(bitmap));
        Ok(())
    }

    /// Bitmap copied from caller BGRA memory.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_bitmap(
        &self,
        key: OverlayKey,
        pixels: &[u8],
        stride: usize,
        width: u32,
        height: u32,
        dest: Rect,
        color_key: Option<Color>,
        opacity: u8,
    ) -> PresentResult<()> {
        let bitmap =
            BitmapOverlay::from_pixels(pixels, stride, width, height, dest, color_key, opacity)?;
        self.add_overlay(key, Overlay::Bitmap(bitmap));
        Ok(())
    }

    /// Secondary video stream drawn into `dest`; feed it with
    /// [`update_overlay_frame`](Self::update_overlay_frame).
    pub fn add_overlay_stream(
        &self,
        key: OverlayKey,
        width: u32,
        height: u32,
        format: PixelFormat,
        dest: Rect,
        opacity: u8,
    ) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        let alignment = engine.device.pitch_alignment();
        let stream = VideoOverlay::new(width, height, format, dest, opacity, alignment)?;
        engine.overlays.insert(key, Overlay::Video(stream));
        Ok(())
    }

    pub fn update_overlay_frame(&self, key: OverlayKey, planes: &Planes<'_>) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        let order = engine.config.interleaved_chroma_order;
        let overlay = engine.overlays.require_mut(key)?;
        let kind = overlay.kind();
        overlay
            .as_video_mut()
            .or_invalid(|| format!("overlay {} is a {} overlay, not a video stream", key, kind))?
            .update_frame(planes, order)
    }

    pub fn update_overlay_opacity(&self, key: OverlayKey, opacity: u8) -> PresentResult<()> {
        self.engine
            .lock()
            .overlays
            .require_mut(key)?
            .set_opacity(opacity);
        Ok(())
    }

    /// Remove the overlay under `key`; absent keys are ignored.
    pub fn remove_overlay(&self, key: OverlayKey) {
        let removed = self.engine.lock().overlays.remove(key);
        if removed.is_some() {
            log::debug!("[OVERLAY] Removed overlay {}", key);
        }
    }

    pub fn remove_all_overlays(&self) {
        let count = self.engine.lock().overlays.clear();
        log::debug!("[OVERLAY] Removed {} overlays", count);
    }

    /// Keys in draw order.
    pub fn overlay_keys(&self) -> Vec<OverlayKey> {
        self.engine.lock().overlays.keys()
    }

    // ------------------------------------------------------------------
    // Shaders
    // ------------------------------------------------------------------

    pub fn set_vertex_shader(
        &self,
        source: &ShaderSource,
        entry_point: &str,
        model: &str,
    ) -> PresentResult<()> {
        let shader = compile_source(source, entry_point, model, ShaderStage::Vertex)?;
        self.engine.lock().shaders.set(ShaderStage::Vertex, Some(shader));
        Ok(())
    }

    pub fn set_pixel_shader(
        &self,
        source: &ShaderSource,
        entry_point: &str,
        model: &str,
    ) -> PresentResult<()> {
        let shader = compile_source(source, entry_point, model, ShaderStage::Pixel)?;
        self.engine.lock().shaders.set(ShaderStage::Pixel, Some(shader));
        Ok(())
    }

    /// Precompiled SPIR-V vertex shader.
    pub fn set_vertex_shader_bytecode(&self, bytes: &[u8]) -> PresentResult<()> {
        let shader = compile_bytecode(bytes, ShaderStage::Vertex)?;
        self.engine.lock().shaders.set(ShaderStage::Vertex, Some(shader));
        Ok(())
    }

    /// Precompiled SPIR-V pixel shader.
    pub fn set_pixel_shader_bytecode(&self, bytes: &[u8]) -> PresentResult<()> {
        let shader = compile_bytecode(bytes, ShaderStage::Pixel)?;
        self.engine.lock().shaders.set(ShaderStage::Pixel, Some(shader));
        Ok(())
    }

    fn set_constant(&self, stage: ShaderStage, name: &str, value: &ShaderConstant) -> PresentResult<()> {
        self.engine
            .lock()
            .shaders
            .program_mut(stage)
            .not_ready(match stage {
                ShaderStage::Vertex => "no vertex shader set",
                ShaderStage::Pixel => "no pixel shader set",
            })?
            .set_constant(name, value)
    }

    pub fn set_vertex_shader_constant(&self, name: &str, value: &ShaderConstant) -> PresentResult<()> {
        self.set_constant(ShaderStage::Vertex, name, value)
    }

    pub fn set_pixel_shader_constant(&self, name: &str, value: &ShaderConstant) -> PresentResult<()> {
        self.set_constant(ShaderStage::Pixel, name, value)
    }

    /// Bind the pixel-space orthographic projection of the display to a vertex constant.
    pub fn apply_world_view_proj(&self, name: &str) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        let size = engine
            .device
            .display_size()
            .not_ready("display target not created")?;
        engine
            .shaders
            .program_mut(ShaderStage::Vertex)
            .not_ready("no vertex shader set")?
            .set_constant(name, &ShaderConstant::Matrix(ortho_projection(size)))
    }

    pub fn clear_vertex_shader(&self) {
        self.engine.lock().shaders.set(ShaderStage::Vertex, None);
    }

    pub fn clear_pixel_shader(&self) {
        self.engine.lock().shaders.set(ShaderStage::Pixel, None);
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Two-call capture protocol.
    ///
    /// With `None` only the dimensions are returned. With a buffer of at least
    /// `height * stride` bytes, exactly that many bytes of BGRA pixels are written.
    pub fn capture_frame(&self, buffer: Option<&mut [u8]>, kind: CaptureKind) -> PresentResult<CaptureInfo> {
        let mut engine = self.engine.lock();
        let info = match kind {
            CaptureKind::Video => {
                let video = engine.video.as_ref().not_ready("no video surface created")?;
                CaptureInfo::for_size(video.width(), video.height())
            }
            CaptureKind::Display => {
                engine.lifecycle.ensure_ready()?;
                let size = engine
                    .device
                    .display_size()
                    .not_ready("display target not created")?;
                CaptureInfo::for_size(size.width, size.height)
            }
        };

        let Some(buffer) = buffer else {
            return Ok(info);
        };
        let len = info.buffer_len();
        if buffer.len() < len {
            return Err(PresentError::InvalidArgument(format!(
                "capture buffer holds {} bytes, {} needed",
                buffer.len(),
                len
            )));
        }

        match kind {
            CaptureKind::Video => {
                let frame = engine
                    .video_frame
                    .as_ref()
                    .not_ready("no video frame converted")?;
                frame.copy_tight(&mut buffer[..len]);
            }
            CaptureKind::Display => {
                let frame = engine.device.read_render_target()?;
                frame.copy_tight(&mut buffer[..len]);
            }
        }
        Ok(info)
    }

    // ------------------------------------------------------------------
    // Device lifecycle
    // ------------------------------------------------------------------

    /// Store the handlers invoked on device loss and before a device reset.
    pub fn register_device_callbacks(
        &self,
        lost: impl Fn() + Send + Sync + 'static,
        reset: impl Fn() + Send + Sync + 'static,
    ) {
        let mut callbacks = self.callbacks.write();
        callbacks.lost = Some(Arc::new(lost));
        callbacks.reset = Some(Arc::new(reset));
    }

    fn fire(&self, pick: impl Fn(&DeviceCallbacks) -> Option<DeviceCallback>) {
        let callback = pick(&self.callbacks.read());
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Probe device health and drive the lifecycle.
    ///
    /// Callbacks run on the calling thread with the engine lock released. A
    /// pending reset happens after the reset callback returns; a failed reset
    /// leaves the state `NotReset` and returns `AllocationError`.
    pub fn check_device(&self) -> PresentResult<DeviceState> {
        let transition = {
            let mut engine = self.engine.lock();
            let status = engine.device.check_state();
            engine.lifecycle.observe(status)
        };

        match transition {
            Transition::Stay => {}
            Transition::BecameLost => {
                log::warn!("[PRESENTER] Device lost");
                self.fire(|c| c.lost.clone());
            }
            Transition::ResetPending { notify } => {
                if notify {
                    log::info!("[PRESENTER] Device can be reset");
                    self.fire(|c| c.reset.clone());
                }
                let mut engine = self.engine.lock();
                if engine.lifecycle.state() == DeviceState::NotReset {
                    engine.reset_device()?;
                }
            }
            Transition::Recovered => {
                let mut engine = self.engine.lock();
                if engine.lifecycle.state() != DeviceState::Ready {
                    engine.rebuild_display()?;
                    engine.lifecycle.mark_ready();
                    log::info!("[PRESENTER] Device recovered without reset");
                }
            }
        }
        Ok(self.engine.lock().lifecycle.state())
    }

    /// Recreate display resources after the window's client area changed.
    pub fn on_window_size_changed(&self) -> PresentResult<()> {
        let mut engine = self.engine.lock();
        engine.lifecycle.ensure_ready()?;
        let back_buffer = engine.device.resize_back_buffer()?;
        engine.rebuild_display()?;
        let size = engine.device.display_size().unwrap_or(back_buffer);
        log::debug!(
            "[PRESENTER] Window size changed, display target {}x{}",
            size.width,
            size.height
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn device_state(&self) -> DeviceState {
        self.engine.lock().lifecycle.state()
    }

    /// Letterboxed destination of the video inside the display.
    pub fn target_rect(&self) -> Rect {
        self.engine.lock().target_rect
    }

    pub fn display_size(&self) -> Option<Size> {
        self.engine.lock().device.display_size()
    }

    pub fn video_size(&self) -> Option<Size> {
        self.engine.lock().video.as_ref().map(PresentationSurface::size)
    }

    pub fn is_windowed(&self) -> bool {
        self.engine.lock().device.is_windowed()
    }

    /// Run `f` against the device under the engine lock.
    pub fn with_device<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.engine.lock().device)
    }
}
