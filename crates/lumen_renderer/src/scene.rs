//! A minimal scene: a canvas, a render mode and a sky.
//!
//! Enough state to drive the render manager from the command line and
//! from tests. Setters return the `ResetReason` the edit implies, so an
//! editor can forward it to `SceneEdit::mark`.

use std::sync::Arc;

use lumen_core::{Color, RenderMode, RenderScene, ResetReason, SampleKernel};

use crate::kernel::{ConstantKernel, SkyGradientKernel};

/// Background seen by rays that leave the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sky {
    /// Uniform color
    Solid(Color),
    /// Vertical gradient
    Gradient { horizon: Color, zenith: Color },
}

impl Default for Sky {
    fn default() -> Self {
        Sky::Gradient {
            horizon: Color::new(1.0, 1.0, 1.0),
            zenith: Color::new(0.5, 0.7, 1.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicScene {
    pub name: String,
    width: u32,
    height: u32,
    mode: RenderMode,
    sky: Sky,
}

impl BasicScene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            name: String::from("untitled"),
            width,
            height,
            mode: RenderMode::Rendering,
            sky: Sky::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sky(mut self, sky: Sky) -> Self {
        self.sky = sky;
        self
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sky(&self) -> Sky {
        self.sky
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) -> ResetReason {
        if (width, height) == (self.width, self.height) {
            return ResetReason::None;
        }
        self.width = width;
        self.height = height;
        ResetReason::CanvasResized
    }

    pub fn set_sky(&mut self, sky: Sky) -> ResetReason {
        if sky == self.sky {
            return ResetReason::None;
        }
        self.sky = sky;
        ResetReason::SettingsChanged
    }

    pub fn set_mode(&mut self, mode: RenderMode) -> ResetReason {
        if mode == self.mode {
            return ResetReason::None;
        }
        self.mode = mode;
        ResetReason::ModeChanged
    }
}

impl RenderScene for BasicScene {
    fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render_mode(&self) -> RenderMode {
        self.mode
    }

    fn kernel(&self) -> Arc<dyn SampleKernel> {
        match self.sky {
            Sky::Solid(color) => Arc::new(ConstantKernel::new(color)),
            Sky::Gradient { horizon, zenith } => Arc::new(SkyGradientKernel::new(
                self.width,
                self.height,
                horizon,
                zenith,
            )),
        }
    }
}
