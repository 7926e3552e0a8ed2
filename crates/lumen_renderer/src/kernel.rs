//! Built-in sample kernels.
//!
//! Stand-ins for a real integrator: a constant background and a sky
//! gradient seen through a pinhole camera with jittered pixel samples.

use glam::DVec3;
use lumen_core::{Color, SampleKernel, Tile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::task::pixel_seed;

/// Returns the same color for every sample.
#[derive(Debug, Clone, Copy)]
pub struct ConstantKernel {
    pub color: Color,
}

impl ConstantKernel {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl SampleKernel for ConstantKernel {
    fn sample(&self, _tile: &Tile, _x: u32, _y: u32, _seed: u64) -> Color {
        self.color
    }
}

/// Vertical sky gradient from `horizon` (looking down) to `zenith` (looking up).
#[derive(Debug, Clone, Copy)]
pub struct SkyGradientKernel {
    width: u32,
    height: u32,
    pub horizon: Color,
    pub zenith: Color,
}

impl SkyGradientKernel {
    pub fn new(width: u32, height: u32, horizon: Color, zenith: Color) -> Self {
        Self {
            width,
            height,
            horizon,
            zenith,
        }
    }

    /// Color seen along a view direction.
    pub fn shade(&self, direction: DVec3) -> Color {
        let unit_direction = direction.normalize();
        let a = 0.5 * (unit_direction.y + 1.0);
        self.horizon * (1.0 - a) + self.zenith * a
    }

    /// Pinhole camera ray through the canvas position (u, v) in [0, 1].
    fn view_direction(&self, u: f64, v: f64) -> DVec3 {
        let aspect = self.width.max(1) as f64 / self.height.max(1) as f64;
        DVec3::new((u - 0.5) * aspect, 0.5 - v, -1.0)
    }
}

impl SampleKernel for SkyGradientKernel {
    fn sample(&self, _tile: &Tile, x: u32, y: u32, seed: u64) -> Color {
        let mut rng = StdRng::seed_from_u64(pixel_seed(seed, x, y));
        let ox: f64 = rng.gen();
        let oy: f64 = rng.gen();

        let u = (x as f64 + ox) / self.width.max(1) as f64;
        let v = (y as f64 + oy) / self.height.max(1) as f64;
        self.shade(self.view_direction(u, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_kernel() {
        let kernel = ConstantKernel::new(Color::new(0.5, 1.0, 0.25));
        let tile = Tile::new(0, 0, 8, 8, 0);
        assert_eq!(kernel.sample(&tile, 3, 4, 17), Color::new(0.5, 1.0, 0.25));
    }

    #[test]
    fn test_sky_gradient_shade() {
        let kernel = SkyGradientKernel::new(
            10,
            10,
            Color::new(1.0, 1.0, 1.0),
            Color::new(0.5, 0.7, 1.0),
        );

        // Looking up should be more blue (less red than white)
        let up = kernel.shade(DVec3::new(0.0, 1.0, 0.0));
        let down = kernel.shade(DVec3::new(0.0, -1.0, 0.0));
        assert!(up.x < down.x, "up.x={} should be < down.x={}", up.x, down.x);
        assert!((up - Color::new(0.5, 0.7, 1.0)).length() < 1e-12);
    }

    #[test]
    fn test_sky_gradient_top_rows_are_closer_to_zenith() {
        let kernel = SkyGradientKernel::new(16, 16, Color::ZERO, Color::ONE);
        let tile = Tile::new(0, 0, 16, 16, 0);

        let top = kernel.sample(&tile, 8, 0, 1);
        let bottom = kernel.sample(&tile, 8, 15, 1);
        assert!(top.x > bottom.x);
        assert!(top.min_element() >= 0.0 && top.max_element() <= 1.0);
    }

    #[test]
    fn test_sky_gradient_is_deterministic_per_seed() {
        let kernel = SkyGradientKernel::new(16, 16, Color::ZERO, Color::ONE);
        let tile = Tile::new(0, 0, 16, 16, 0);

        assert_eq!(kernel.sample(&tile, 5, 5, 9), kernel.sample(&tile, 5, 5, 9));
    }
}
