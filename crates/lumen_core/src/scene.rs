//! The boundary between the render core and the scene it draws.
//!
//! The core never looks at geometry. A scene only has to report its canvas,
//! its render mode, and hand out an immutable sample kernel that the worker
//! threads can call while the editor keeps mutating the live scene.

use std::sync::Arc;

use crate::Color;

/// A rectangular region of the canvas rendered as one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// X coordinate of the tile's top-left corner
    pub x: u32,
    /// Y coordinate of the tile's top-left corner
    pub y: u32,
    /// Width of the tile in pixels
    pub width: u32,
    /// Height of the tile in pixels
    pub height: u32,
    /// Index of this tile in submission order
    pub index: usize,
}

impl Tile {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self { x, y, width, height, index }
    }

    /// Get the total number of pixels in this tile.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if the canvas pixel (x, y) lies inside the tile.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Whether the render manager should be sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Rendering,
    /// Keep accumulated samples but do not add new ones
    Paused,
}

/// Per-pixel sampling function, the integrator seen from the core.
///
/// Called concurrently from every worker thread; must be deterministic for
/// a given `(tile, x, y, seed)` if reproducible renders are wanted.
pub trait SampleKernel: Send + Sync {
    /// Produce one linear RGB sample for canvas pixel (x, y).
    fn sample(&self, tile: &Tile, x: u32, y: u32, seed: u64) -> Color;
}

impl<F> SampleKernel for F
where
    F: Fn(&Tile, u32, u32, u64) -> Color + Send + Sync,
{
    fn sample(&self, tile: &Tile, x: u32, y: u32, seed: u64) -> Color {
        self(tile, x, y, seed)
    }
}

/// What the render manager needs to know about a scene.
pub trait RenderScene: Send + 'static {
    /// Canvas size in pixels.
    fn canvas_size(&self) -> (u32, u32);

    fn render_mode(&self) -> RenderMode {
        RenderMode::Rendering
    }

    /// Capture the render-affecting state into a kernel.
    ///
    /// The kernel must not borrow from the scene: workers keep using it
    /// after the scene lock is released.
    fn kernel(&self) -> Arc<dyn SampleKernel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_contains() {
        let tile = Tile::new(8, 16, 8, 4, 0);
        assert!(tile.contains(8, 16));
        assert!(tile.contains(15, 19));
        assert!(!tile.contains(16, 16));
        assert!(!tile.contains(8, 20));
        assert_eq!(tile.pixel_count(), 32);
    }

    #[test]
    fn test_pixel_count_does_not_overflow() {
        let tile = Tile::new(0, 0, 70_000, 70_000, 0);
        assert_eq!(tile.pixel_count(), 4_900_000_000);
    }

    #[test]
    fn test_closure_kernel() {
        let kernel: Arc<dyn SampleKernel> =
            Arc::new(|_: &Tile, x: u32, _: u32, _: u64| Color::splat(x as f64));
        let tile = Tile::new(0, 0, 4, 4, 0);
        assert_eq!(kernel.sample(&tile, 3, 1, 7), Color::splat(3.0));
    }
}
