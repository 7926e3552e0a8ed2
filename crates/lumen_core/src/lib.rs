//! Lumen Core - the data and synchronization layer of the progressive renderer.
//!
//! This crate provides:
//!
//! - **Sample accumulation**: `SampleBuffer` and its `Snapshot`
//! - **Render dumps**: saving and loading snapshots to resume a render
//! - **Configuration**: `RenderConfig` with validation and JSON loading
//! - **Scene boundary**: `RenderScene`, `SampleKernel`, `Tile`, `RenderMode`
//! - **Scene synchronization**: the `SceneProvider` contract and its
//!   default `SynchronousSceneProvider`
//!
//! # Example
//!
//! ```ignore
//! use lumen_core::{ResetReason, SceneProvider, SynchronousSceneProvider};
//!
//! let provider = SynchronousSceneProvider::new(my_scene);
//! provider.with_edit_scene(|edit| {
//!     edit.resize(640, 480);
//!     edit.mark(ResetReason::CanvasResized);
//! });
//! assert!(provider.poll_state_change());
//! ```

pub mod config;
pub mod dump;
pub mod provider;
pub mod sample_buffer;
pub mod scene;

pub use config::{ConfigError, ConfigResult, RenderConfig};
pub use dump::{load_dump, read_dump, save_dump, write_dump, DumpError, DumpResult};
pub use provider::{
    Interrupted, ResetReason, SceneEdit, SceneProvider, SynchronousSceneProvider,
};
pub use sample_buffer::{SampleBuffer, Snapshot};
pub use scene::{RenderMode, RenderScene, SampleKernel, Tile};

/// Linear RGB color, one `f64` per channel.
pub type Color = glam::DVec3;

// Re-export glam for kernels implemented downstream
pub use glam::DVec3;
