//! Video presentation engine.
//!
//! Decoded frames in planar, semi-planar or packed pixel formats are copied into an
//! offscreen surface, stretched into a letterboxed display target, optionally run
//! through a custom shader pair and composited with keyed overlays. The device
//! lifecycle (loss, reset, recovery) is driven explicitly through
//! [`Presenter::check_device`].

pub mod config;
pub mod error;
pub mod rendering;

pub use config::PresenterConfig;
pub use error::{PresentError, PresentResult};
pub use rendering::Presenter;
