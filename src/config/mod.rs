//! Presenter configuration.
//!
//! `PresenterConfig` holds the display-affecting defaults an engine starts with.
//! It is plain data (serde, camelCase JSON); the running engine keeps its own copy
//! under the engine lock and mutates it through presenter calls.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PresentError, PresentResult};
use crate::rendering::types::{ChromaOrder, Color, FillMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PresenterConfig {
    pub fill_mode: FillMode,
    /// Draw overlays on top of the video.
    pub show_overlays: bool,
    /// Which chroma plane occupies slot 1 of three-plane arrays.
    pub planar_chroma_order: ChromaOrder,
    /// Pair order of interleaved chroma planes supplied by the caller.
    pub interleaved_chroma_order: ChromaOrder,
    /// Color of the letterbox bars.
    pub letterbox_color: Color,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::KeepAspectRatio,
            show_overlays: true,
            planar_chroma_order: ChromaOrder::Vu,
            interleaved_chroma_order: ChromaOrder::Uv,
            letterbox_color: Color::BLACK,
        }
    }
}

impl PresenterConfig {
    pub fn from_json(text: &str) -> PresentResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        log::debug!("[CONFIG] Presenter config parsed: {:?}", config);
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> PresentResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PresentError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> PresentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
