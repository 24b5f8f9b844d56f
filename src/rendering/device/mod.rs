//! Graphics device seam.
//!
//! The engine core never touches GPU objects directly; everything that owns
//! device memory (display texture, render target, quad geometry, swap chain) sits
//! behind [`GraphicsDevice`]. [`SoftwareDevice`] is the CPU reference device;
//! `GpuDevice` (feature `gpu`) drives wgpu.

use std::sync::Arc;

use crate::error::PresentResult;

use super::coord::{Rect, Size};
use super::format::PixelFormat;
use super::raster::Canvas;
use super::shader::ShaderState;
use super::types::{Color, Frame};

#[cfg(feature = "gpu")]
mod gpu;
mod software;

#[cfg(feature = "gpu")]
pub use gpu::{GpuDevice, GpuOptions, GpuWindow};
pub use software::{HealthProbe, SoftwareDevice, SoftwareOptions, SoftwareWindow};

/// Raw result of a device health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Device usable.
    Ok,
    /// Device lost and cannot be reset yet.
    Lost,
    /// Device lost but ready to be reset.
    NotReset,
}

/// Anything that can report the size of its drawable client area.
pub trait ClientArea {
    fn client_size(&self) -> Size;
}

/// Callback drawing overlays onto the composed frame.
pub type OverlayPainter<'a> = &'a mut dyn FnMut(&mut Canvas<'_>);

/// Operations the engine needs from a graphics backend.
pub trait GraphicsDevice: Send + Sized + 'static {
    /// Window type presented into; `None` at open time means headless.
    type Window: ClientArea + Send + Sync + ?Sized + 'static;
    type Options: Clone + Default + Send + 'static;

    fn open(
        window: Option<Arc<Self::Window>>,
        adapter_index: usize,
        options: Self::Options,
    ) -> PresentResult<Self>;

    fn adapter_name(&self) -> String;

    fn is_windowed(&self) -> bool;

    /// Window client size, each dimension at least 1. Headless devices report
    /// their display target size.
    fn back_buffer_size(&self) -> Size;

    fn supports_format(&self, format: PixelFormat) -> bool;

    /// Row alignment for offscreen video surfaces.
    fn pitch_alignment(&self) -> usize;

    fn check_state(&mut self) -> DeviceStatus;

    /// Reset after [`DeviceStatus::NotReset`]. Display targets do not survive.
    fn reset(&mut self) -> PresentResult<()>;

    /// Reconfigure the swap chain to the window's current size.
    fn resize_back_buffer(&mut self) -> PresentResult<Size>;

    fn create_display_target(&mut self, size: Size) -> PresentResult<()>;

    fn discard_display_target(&mut self);

    fn display_size(&self) -> Option<Size>;

    /// Fill the display texture with `background`, then stretch `source` into `dest`
    /// with linear filtering.
    fn stretch(&mut self, source: Option<&Frame>, dest: Rect, background: Color) -> PresentResult<()>;

    fn fill_display(&mut self, color: Color) -> PresentResult<()>;

    /// Clear the render target, draw the unit quad through the shader pair and then
    /// let `overlays` paint on top.
    fn render_scene(
        &mut self,
        shaders: &ShaderState,
        overlays: Option<OverlayPainter<'_>>,
    ) -> PresentResult<()>;

    fn present(&mut self) -> PresentResult<()>;

    fn read_render_target(&mut self) -> PresentResult<Frame>;
}
