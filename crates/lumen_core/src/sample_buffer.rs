//! Progressive sample accumulation.
//!
//! The buffer stores a running per-channel *mean* rather than a sum, so the
//! sample count can grow without bound and no renormalization is needed
//! before display or export.

use std::time::Duration;

use crate::{Color, Tile};

/// Accumulated linear-color raster plus its global sample count.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    width: u32,
    height: u32,
    /// Running mean, 3 channels per pixel, row-major
    data: Vec<f64>,
    /// Samples per pixel accumulated so far
    spp: u64,
    /// Time spent sampling since the last reset
    render_time: Duration,
}

impl SampleBuffer {
    /// Create a black buffer with zero samples.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; channel_count(width, height)],
            spp: 0,
            render_time: Duration::ZERO,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn spp(&self) -> u64 {
        self.spp
    }

    pub fn render_time(&self) -> Duration {
        self.render_time
    }

    /// Raw channel means, `3 * width * height` values.
    pub fn samples(&self) -> &[f64] {
        &self.data
    }

    /// Discard all samples and resize to the given canvas.
    ///
    /// Reallocates only when the canvas size changed.
    pub fn reset(&mut self, width: u32, height: u32) {
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.data = vec![0.0; channel_count(width, height)];
        } else {
            self.data.fill(0.0);
        }
        self.spp = 0;
        self.render_time = Duration::ZERO;
    }

    /// Get the mean color at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Color {
        let offset = self.offset(x, y);
        Color::new(self.data[offset], self.data[offset + 1], self.data[offset + 2])
    }

    /// Fold one new sample per pixel of `tile` into the running mean.
    ///
    /// `pixels` is row-major within the tile. Uses the current `spp`, so all
    /// tiles of a pass must be merged before `finish_pass` is called.
    /// Returns false (and leaves the buffer untouched) if the tile does not
    /// fit the canvas or the pixel count is wrong.
    pub fn merge_tile(&mut self, tile: &Tile, pixels: &[Color]) -> bool {
        if u64::from(tile.x) + u64::from(tile.width) > u64::from(self.width)
            || u64::from(tile.y) + u64::from(tile.height) > u64::from(self.height)
            || pixels.len() != tile.pixel_count()
        {
            log::warn!(
                "Discarding tile {} ({}x{} at {},{}) that does not fit a {}x{} buffer",
                tile.index,
                tile.width,
                tile.height,
                tile.x,
                tile.y,
                self.width,
                self.height
            );
            return false;
        }
        if tile.pixel_count() == 0 {
            return true;
        }

        let weight = 1.0 / (self.spp + 1) as f64;
        let rows = pixels.chunks_exact(tile.width as usize);
        for (local_y, row) in (0..tile.height).zip(rows) {
            let mut offset = self.offset(tile.x, tile.y + local_y);
            for sample in row {
                for (channel, value) in [sample.x, sample.y, sample.z].into_iter().enumerate() {
                    let mean = &mut self.data[offset + channel];
                    *mean += (value - *mean) * weight;
                }
                offset += 3;
            }
        }
        true
    }

    /// Close a pass: every pixel has one more sample (or dropped it).
    pub fn finish_pass(&mut self, elapsed: Duration) {
        self.spp += 1;
        self.render_time += elapsed;
    }

    /// Rendering speed in samples per second since the last reset.
    pub fn samples_per_second(&self) -> f64 {
        let seconds = self.render_time.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        (self.spp as f64 * self.width as f64 * self.height as f64) / seconds
    }

    /// Owned copy for export and display.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            samples: self.data.clone(),
            spp: self.spp,
            render_time: self.render_time,
        }
    }

    /// Continue from a saved snapshot instead of starting at zero samples.
    ///
    /// Returns false (and leaves the buffer untouched) if the snapshot does
    /// not match the buffer's canvas.
    pub fn restore(&mut self, snapshot: &Snapshot) -> bool {
        if snapshot.width != self.width
            || snapshot.height != self.height
            || snapshot.samples.len() != self.data.len()
        {
            log::warn!(
                "Ignoring {}x{} snapshot for a {}x{} buffer",
                snapshot.width,
                snapshot.height,
                self.width,
                self.height
            );
            return false;
        }
        self.data.copy_from_slice(&snapshot.samples);
        self.spp = snapshot.spp;
        self.render_time = snapshot.render_time;
        true
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }
}

fn channel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// A self-consistent copy of a sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    /// Channel means, `3 * width * height` values
    pub samples: Vec<f64>,
    pub spp: u64,
    /// Sampling time behind `spp`
    pub render_time: Duration,
}

impl Snapshot {
    /// Mean color at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Color::new(
            self.samples[offset],
            self.samples[offset + 1],
            self.samples[offset + 2],
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
