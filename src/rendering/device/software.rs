//! CPU reference device.
//!
//! Display texture and render target are plain BGRA frames. Health is driven by a
//! shareable [`HealthProbe`], which lets embedders mirror an external device's
//! state and lets tests inject loss and reset failures.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{OptionExt, PresentError, PresentResult};
use crate::rendering::coord::{Rect, Size};
use crate::rendering::format::PixelFormat;
use crate::rendering::raster::Canvas;
use crate::rendering::shader::ShaderState;
use crate::rendering::surface::{QuadVertex, UNIT_QUAD};
use crate::rendering::types::{Color, Frame};

use super::{ClientArea, DeviceStatus, GraphicsDevice, OverlayPainter};

/// Window that receives presented frames.
pub trait SoftwareWindow: ClientArea + Send + Sync {
    fn present(&self, frame: &Frame);
}

/// Shared, externally settable device health.
#[derive(Debug, Clone, Default)]
pub struct HealthProbe {
    status: Arc<AtomicU8>,
    failing_resets: Arc<AtomicU32>,
}

impl HealthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, status: DeviceStatus) {
        let raw = match status {
            DeviceStatus::Ok => 0,
            DeviceStatus::Lost => 1,
            DeviceStatus::NotReset => 2,
        };
        self.status.store(raw, Ordering::SeqCst);
    }

    pub fn status(&self) -> DeviceStatus {
        match self.status.load(Ordering::SeqCst) {
            1 => DeviceStatus::Lost,
            2 => DeviceStatus::NotReset,
            _ => DeviceStatus::Ok,
        }
    }

    /// Make the next `count` resets fail.
    pub fn fail_resets(&self, count: u32) {
        self.failing_resets.store(count, Ordering::SeqCst);
    }

    fn take_reset_failure(&self) -> bool {
        self.failing_resets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct SoftwareOptions {
    /// Row alignment of offscreen surfaces in bytes.
    pub pitch_alignment: usize,
    /// Formats the device refuses, to mirror limited hardware.
    pub unsupported_formats: Vec<PixelFormat>,
    /// Largest texture edge the device accepts.
    pub max_texture_size: u32,
    pub health: HealthProbe,
}

impl Default for SoftwareOptions {
    fn default() -> Self {
        Self {
            pitch_alignment: 64,
            unsupported_formats: Vec::new(),
            max_texture_size: 16384,
            health: HealthProbe::new(),
        }
    }
}

struct DisplayTarget {
    texture: Frame,
    render_target: Frame,
    quad: [QuadVertex; 4],
}

pub struct SoftwareDevice {
    window: Option<Arc<dyn SoftwareWindow>>,
    options: SoftwareOptions,
    target: Option<DisplayTarget>,
    shader_generation: u64,
    frames_presented: u64,
}

impl SoftwareDevice {
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn target_mut(&mut self) -> PresentResult<&mut DisplayTarget> {
        self.target.as_mut().not_ready("display target not created")
    }
}

/// Sample the display texture over the quad's UV range into the render target.
fn draw_quad(target: &mut DisplayTarget) {
    let (uv0, uv1) = (target.quad[0].uv, target.quad[3].uv);
    let (tw, th) = (target.texture.width, target.texture.height);
    let (rw, rh) = (target.render_target.width, target.render_target.height);
    let stride = target.render_target.stride;

    for y in 0..rh {
        let v = uv0[1] + (y as f32 + 0.5) / rh as f32 * (uv1[1] - uv0[1]);
        let ty = ((v * th as f32) as u32).min(th - 1);
        for x in 0..rw {
            let u = uv0[0] + (x as f32 + 0.5) / rw as f32 * (uv1[0] - uv0[0]);
            let tx = ((u * tw as f32) as u32).min(tw - 1);
            let i = y as usize * stride + x as usize * 4;
            target.render_target.data[i..i + 4].copy_from_slice(&target.texture.pixel(tx, ty));
        }
    }
}

impl GraphicsDevice for SoftwareDevice {
    type Window = dyn SoftwareWindow;
    type Options = SoftwareOptions;

    fn open(
        window: Option<Arc<Self::Window>>,
        adapter_index: usize,
        options: Self::Options,
    ) -> PresentResult<Self> {
        if adapter_index != 0 {
            return Err(PresentError::AllocationError(format!(
                "adapter {} not available (software device has one adapter)",
                adapter_index
            )));
        }
        Ok(Self {
            window,
            options,
            target: None,
            shader_generation: 0,
            frames_presented: 0,
        })
    }

    fn adapter_name(&self) -> String {
        "Software rasterizer".to_string()
    }

    fn is_windowed(&self) -> bool {
        self.window.is_some()
    }

    fn back_buffer_size(&self) -> Size {
        match (&self.window, &self.target) {
            (Some(window), _) => window.client_size().at_least_one(),
            (None, Some(target)) => target.render_target.size(),
            (None, None) => Size::new(1, 1),
        }
    }

    fn supports_format(&self, format: PixelFormat) -> bool {
        !self.options.unsupported_formats.contains(&format)
    }

    fn pitch_alignment(&self) -> usize {
        self.options.pitch_alignment
    }

    fn check_state(&mut self) -> DeviceStatus {
        self.options.health.status()
    }

    fn reset(&mut self) -> PresentResult<()> {
        self.target = None;
        if self.options.health.take_reset_failure() {
            return Err(PresentError::AllocationError("device reset failed".to_string()));
        }
        if self.options.health.status() == DeviceStatus::Lost {
            return Err(PresentError::AllocationError(
                "device lost again during reset".to_string(),
            ));
        }
        self.options.health.set(DeviceStatus::Ok);
        Ok(())
    }

    fn resize_back_buffer(&mut self) -> PresentResult<Size> {
        Ok(self.back_buffer_size())
    }

    fn create_display_target(&mut self, size: Size) -> PresentResult<()> {
        if size.is_empty() {
            return Err(PresentError::InvalidArgument(format!(
                "display target {}x{} is empty",
                size.width, size.height
            )));
        }
        let max = self.options.max_texture_size;
        if size.width > max || size.height > max {
            return Err(PresentError::AllocationError(format!(
                "display target {}x{} exceeds the {} texel limit",
                size.width, size.height, max
            )));
        }
        self.target = Some(DisplayTarget {
            texture: Frame::black(size.width, size.height),
            render_target: Frame::black(size.width, size.height),
            quad: UNIT_QUAD,
        });
        Ok(())
    }

    fn discard_display_target(&mut self) {
        self.target = None;
    }

    fn display_size(&self) -> Option<Size> {
        self.target.as_ref().map(|t| t.texture.size())
    }

    fn stretch(&mut self, source: Option<&Frame>, dest: Rect, background: Color) -> PresentResult<()> {
        let target = self.target_mut()?;
        let mut canvas = Canvas::new(&mut target.texture);
        canvas.clear(background);
        if let Some(source) = source {
            canvas.stretch_from(source, dest);
        }
        Ok(())
    }

    fn fill_display(&mut self, color: Color) -> PresentResult<()> {
        self.target_mut()?.texture.fill(color);
        Ok(())
    }

    fn render_scene(
        &mut self,
        shaders: &ShaderState,
        overlays: Option<OverlayPainter<'_>>,
    ) -> PresentResult<()> {
        if shaders.generation() != self.shader_generation {
            self.shader_generation = shaders.generation();
            if shaders.vertex().is_some() || shaders.pixel().is_some() {
                log::debug!("[DEVICE] Software device samples custom shaders as pass-through");
            }
        }
        let target = self.target_mut()?;
        target.render_target.fill(Color::BLACK);
        draw_quad(target);
        if let Some(paint) = overlays {
            paint(&mut Canvas::new(&mut target.render_target));
        }
        Ok(())
    }

    fn present(&mut self) -> PresentResult<()> {
        let Some(window) = &self.window else {
            return Ok(());
        };
        let target = self.target.as_ref().not_ready("display target not created")?;
        window.present(&target.render_target);
        self.frames_presented += 1;
        Ok(())
    }

    fn read_render_target(&mut self) -> PresentResult<Frame> {
        Ok(self.target_mut()?.render_target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct TestWindow {
        size: Size,
        presented: Mutex<u32>,
    }

    impl ClientArea for TestWindow {
        fn client_size(&self) -> Size {
            self.size
        }
    }

    impl SoftwareWindow for TestWindow {
        fn present(&self, _frame: &Frame) {
            *self.presented.lock() += 1;
        }
    }

    #[test]
    fn test_only_adapter_zero() {
        assert!(SoftwareDevice::open(None, 1, SoftwareOptions::default()).is_err());
        let device = SoftwareDevice::open(None, 0, SoftwareOptions::default()).unwrap();
        assert!(!device.is_windowed());
        assert_eq!(device.back_buffer_size(), Size::new(1, 1));
    }

    #[test]
    fn test_window_size_clamped() {
        let window = Arc::new(TestWindow {
            size: Size::new(0, 300),
            presented: Mutex::new(0),
        });
        let device = SoftwareDevice::open(Some(window), 0, SoftwareOptions::default()).unwrap();
        assert_eq!(device.back_buffer_size(), Size::new(1, 300));
    }

    #[test]
    fn test_health_probe_and_reset() {
        let options = SoftwareOptions::default();
        let probe = options.health.clone();
        let mut device = SoftwareDevice::open(None, 0, options).unwrap();
        device.create_display_target(Size::new(4, 4)).unwrap();

        probe.set(DeviceStatus::NotReset);
        assert_eq!(device.check_state(), DeviceStatus::NotReset);
        probe.fail_resets(1);
        assert!(device.reset().is_err());
        assert!(device.display_size().is_none());
        device.reset().unwrap();
        assert_eq!(device.check_state(), DeviceStatus::Ok);
    }

    #[test]
    fn test_texture_limit() {
        let options = SoftwareOptions {
            max_texture_size: 64,
            ..Default::default()
        };
        let mut device = SoftwareDevice::open(None, 0, options).unwrap();
        assert!(matches!(
            device.create_display_target(Size::new(65, 10)),
            Err(PresentError::AllocationError(_))
        ));
        assert!(device.create_display_target(Size::new(0, 10)).is_err());
    }

    #[test]
    fn test_scene_and_present() {
        let window = Arc::new(TestWindow {
            size: Size::new(4, 2),
            presented: Mutex::new(0),
        });
        let mut device =
            SoftwareDevice::open(Some(window.clone()), 0, SoftwareOptions::default()).unwrap();
        assert!(device.stretch(None, Rect::new(0, 0, 4, 2), Color::BLACK).is_err());

        device.create_display_target(Size::new(4, 2)).unwrap();
        let source = Frame::filled(2, 2, Color::rgb(0, 0, 255));
        device
            .stretch(Some(&source), Rect::new(2, 0, 4, 2), Color::BLACK)
            .unwrap();

        let mut painted = false;
        let mut paint = |canvas: &mut Canvas<'_>| {
            canvas.fill_rect(Rect::new(0, 0, 1, 1), Color::WHITE);
            painted = true;
        };
        device
            .render_scene(&ShaderState::default(), Some(&mut paint))
            .unwrap();
        assert!(painted);

        let rt = device.read_render_target().unwrap();
        assert_eq!(rt.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(rt.pixel(1, 1), [0, 0, 0, 255]);
        assert_eq!(rt.pixel(3, 1), [255, 0, 0, 255]);

        device.present().unwrap();
        assert_eq!(*window.presented.lock(), 1);
        assert_eq!(device.frames_presented(), 1);
    }
}
