//! Tile partitioning and per-tile render tasks.
//!
//! Divides the canvas into tiles that are rendered independently by the
//! worker pool. Each task returns its samples instead of writing into the
//! shared buffer, so tiles of one pass never contend.

use lumen_core::{Color, SampleKernel, Tile};

/// Partition a canvas into tiles, sorted in spiral order from the center.
///
/// Tiles are `tile_width` pixels square except along the right and bottom
/// edges, where they are clipped to the canvas. Center tiles come first so
/// the interesting part of the image converges early.
pub fn generate_tiles(width: u32, height: u32, tile_width: u32) -> Vec<Tile> {
    let mut tiles = Vec::new();
    if tile_width == 0 {
        return tiles;
    }

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let tw = tile_width.min(width - x);
            let th = tile_width.min(height - y);
            tiles.push(Tile::new(x, y, tw, th, tiles.len()));
            x += tile_width;
        }
        y += tile_width;
    }

    sort_spiral(&mut tiles, width, height);

    for (i, tile) in tiles.iter_mut().enumerate() {
        tile.index = i;
    }

    tiles
}

/// Sort tiles by distance from the canvas center.
fn sort_spiral(tiles: &mut [Tile], width: u32, height: u32) {
    let center_x = width as f64 / 2.0;
    let center_y = height as f64 / 2.0;

    let distance = |t: &Tile| {
        let x = t.x as f64 + t.width as f64 / 2.0;
        let y = t.y as f64 + t.height as f64 / 2.0;
        (x - center_x).powi(2) + (y - center_y).powi(2)
    };

    tiles.sort_by(|a, b| {
        distance(a)
            .partial_cmp(&distance(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// SplitMix64 finalizer, used to derive independent seeds.
#[inline]
pub fn mix_seed(a: u64, b: u64) -> u64 {
    let mut z = a ^ b.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for one pixel, derived from its tile's pass seed.
#[inline]
pub fn pixel_seed(pass_seed: u64, x: u32, y: u32) -> u64 {
    mix_seed(pass_seed, ((y as u64) << 32) | x as u64)
}

/// One tile of one sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTask {
    pub tile: Tile,
    pub pass: u64,
    seed: u64,
}

impl RenderTask {
    /// The seed depends only on the base seed, the tile origin and the pass,
    /// so re-rendering a tile reproduces its samples.
    pub fn new(tile: Tile, pass: u64, base_seed: u64) -> Self {
        let origin = ((tile.y as u64) << 32) | tile.x as u64;
        let seed = mix_seed(mix_seed(base_seed, origin), pass);
        Self { tile, pass, seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Take one sample for every pixel of the tile.
    pub fn render(&self, kernel: &dyn SampleKernel) -> TileResult {
        let tile = &self.tile;
        let mut pixels = Vec::with_capacity(tile.pixel_count());

        for local_y in 0..tile.height {
            for local_x in 0..tile.width {
                pixels.push(kernel.sample(tile, tile.x + local_x, tile.y + local_y, self.seed));
            }
        }

        TileResult {
            tile: self.tile,
            pixels,
        }
    }
}

/// Samples produced by one task.
#[derive(Debug, Clone)]
pub struct TileResult {
    pub tile: Tile,
    /// Pixel colors in row-major order within the tile
    pub pixels: Vec<Color>,
}
