//! Video presentation: offscreen video surfaces, letterboxed display and overlays.
//!
//! ## Components
//! - `types`: Core data structures (Frame, Planes, Color, etc.)
//! - `format`: Pixel formats and their memory layout
//! - `surface`: Offscreen video surface allocation
//! - `blit`: Copying decoded planes into a surface
//! - `convert`: Surface to BGRA conversion
//! - `coord`: Sizes, rectangles and the letterbox calculation
//! - `raster`: CPU drawing primitives used by overlays
//! - `overlay`: Keyed overlay store
//! - `shader`: Shader compilation and constant reflection with naga
//! - `device`: Graphics device seam (software, and wgpu behind `gpu`)
//! - `lifecycle`: Device-lost state machine
//! - `compositor`: Per-frame scene composition
//! - `presenter`: Thread-safe engine facade

pub mod blit;
pub mod compositor;
pub mod convert;
pub mod coord;
pub mod device;
pub mod format;
pub mod lifecycle;
pub mod overlay;
pub mod presenter;
pub mod raster;
pub mod shader;
pub mod surface;
pub mod types;

pub use compositor::{Compositor, Scene};
pub use coord::{letterbox, Point, Rect, Size};
pub use device::{
    ClientArea, DeviceStatus, GraphicsDevice, HealthProbe, SoftwareDevice, SoftwareOptions,
    SoftwareWindow,
};
#[cfg(feature = "gpu")]
pub use device::{GpuDevice, GpuOptions, GpuWindow};
pub use format::PixelFormat;
pub use lifecycle::DeviceState;
pub use overlay::{Overlay, OverlayKey};
pub use presenter::Presenter;
pub use shader::{ShaderConstant, ShaderSource};
pub use surface::PresentationSurface;
pub use types::*;
