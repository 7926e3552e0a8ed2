//! Lumen Renderer - progressive tile rendering on a persistent worker pool.
//!
//! A `RenderManager` owns a `SampleBuffer` and a `RenderWorkerPool`. It
//! listens to a `SceneProvider` for changes, resets when needed, and splits
//! the canvas into tiles that the pool samples one pass at a time.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lumen_core::{RenderConfig, SynchronousSceneProvider};
//! use lumen_renderer::{BasicScene, RenderManager};
//!
//! let provider = Arc::new(SynchronousSceneProvider::new(BasicScene::new(320, 240)));
//! let config = RenderConfig::default().with_target_spp(64).with_headless(true);
//! let mut manager = RenderManager::new(config, provider)?;
//! manager.start()?;
//! manager.join();
//! let snapshot = manager.snapshot();
//! ```

mod error;
mod kernel;
mod manager;
mod pool;
mod scene;
mod snapshot;
mod task;

pub use error::{RenderError, RenderResult};
pub use kernel::{ConstantKernel, SkyGradientKernel};
pub use manager::{ManagerState, RenderListener, RenderManager, RenderStatus, SnapshotListener};
pub use pool::{RenderWorkerPool, WorkerContext};
pub use scene::{BasicScene, Sky};
pub use snapshot::{IntervalSnapshots, SnapshotControl, SnapshotRequest};
pub use task::{generate_tiles, mix_seed, pixel_seed, RenderTask, TileResult};

/// Re-export the core types the renderer API is expressed in
pub use lumen_core::{
    Color, RenderConfig, RenderMode, RenderScene, ResetReason, SampleKernel, SceneProvider,
    Snapshot, SynchronousSceneProvider, Tile,
};
