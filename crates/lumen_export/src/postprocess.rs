//! Post-processing filters.
//!
//! A filter maps linear mean radiance to display values. Filters are looked
//! up by id in a `FilterRegistry`; the ids are stable and end up in configs
//! and on the command line.

use std::collections::HashMap;

use lumen_core::Color;
use rayon::prelude::*;

use crate::error::{ExportError, ExportResult};

/// Display gamma used by the gamma-correcting filters.
pub const DEFAULT_GAMMA: f64 = 2.2;

/// A transform from linear radiance to display values.
pub trait PostProcessingFilter: Send + Sync {
    /// Stable identifier, e.g. `"TONEMAP3"`
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Map `width * height * 3` linear means to display values.
    ///
    /// The output has the same layout as the input. Values are not
    /// guaranteed to lie in [0, 1]; quantization clamps them.
    fn apply(&self, width: u32, height: u32, mean: &[f64], exposure: f64) -> Vec<f64>;
}

/// Apply `f` to every pixel, one row per rayon task.
fn map_pixels<F>(width: u32, mean: &[f64], f: F) -> Vec<f64>
where
    F: Fn(u32, u32, Color) -> Color + Sync,
{
    let mut out = mean.to_vec();
    let row_len = width as usize * 3;
    if row_len == 0 {
        return out;
    }

    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.chunks_exact_mut(3).enumerate() {
                let color = f(x as u32, y as u32, Color::new(pixel[0], pixel[1], pixel[2]));
                pixel.copy_from_slice(&color.to_array());
            }
        });
    out
}

fn gamma_correct(color: Color, gamma: f64) -> Color {
    color.max(Color::ZERO).powf(1.0 / gamma)
}

/// Exposure only; values are clamped when quantized.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl PostProcessingFilter for NoFilter {
    fn id(&self) -> &'static str {
        "NONE"
    }

    fn name(&self) -> &'static str {
        "None"
    }

    fn apply(&self, width: u32, _height: u32, mean: &[f64], exposure: f64) -> Vec<f64> {
        map_pixels(width, mean, |_, _, color| color * exposure)
    }
}

/// Exposure followed by gamma correction.
#[derive(Debug, Clone, Copy)]
pub struct GammaFilter {
    pub gamma: f64,
}

impl Default for GammaFilter {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl PostProcessingFilter for GammaFilter {
    fn id(&self) -> &'static str {
        "GAMMA"
    }

    fn name(&self) -> &'static str {
        "Gamma correction"
    }

    fn apply(&self, width: u32, _height: u32, mean: &[f64], exposure: f64) -> Vec<f64> {
        map_pixels(width, mean, |_, _, color| {
            gamma_correct(color * exposure, self.gamma)
        })
    }
}

/// Reinhard `c / (1 + c)` per channel, then gamma.
#[derive(Debug, Clone, Copy)]
pub struct ReinhardFilter {
    pub gamma: f64,
}

impl Default for ReinhardFilter {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl PostProcessingFilter for ReinhardFilter {
    fn id(&self) -> &'static str {
        "TONEMAP1"
    }

    fn name(&self) -> &'static str {
        "Tonemap operator 1"
    }

    fn apply(&self, width: u32, _height: u32, mean: &[f64], exposure: f64) -> Vec<f64> {
        map_pixels(width, mean, |_, _, color| {
            let color = (color * exposure).max(Color::ZERO);
            gamma_correct(color / (Color::ONE + color), self.gamma)
        })
    }
}

/// John Hable's filmic curve (Uncharted 2).
///
/// Defaults are the parameters from the filmicworlds.com blog post.
#[derive(Debug, Clone, Copy)]
pub struct HableFilmicFilter {
    pub shoulder_strength: f64,
    pub linear_strength: f64,
    pub linear_angle: f64,
    pub toe_strength: f64,
    pub toe_numerator: f64,
    pub toe_denominator: f64,
    pub white_point: f64,
    pub gamma: f64,
}

impl Default for HableFilmicFilter {
    fn default() -> Self {
        Self {
            shoulder_strength: 0.15,
            linear_strength: 0.50,
            linear_angle: 0.10,
            toe_strength: 0.20,
            toe_numerator: 0.02,
            toe_denominator: 0.30,
            white_point: 11.2,
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl HableFilmicFilter {
    fn curve(&self, x: f64) -> f64 {
        let (a, b, c) = (self.shoulder_strength, self.linear_strength, self.linear_angle);
        let (d, e, f) = (self.toe_strength, self.toe_numerator, self.toe_denominator);
        ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f
    }

    /// Scale that maps the white point to 1.0.
    pub fn white_scale(&self) -> f64 {
        1.0 / self.curve(self.white_point)
    }
}

impl PostProcessingFilter for HableFilmicFilter {
    fn id(&self) -> &'static str {
        "TONEMAP3"
    }

    fn name(&self) -> &'static str {
        "Hable Filmic"
    }

    fn apply(&self, width: u32, _height: u32, mean: &[f64], exposure: f64) -> Vec<f64> {
        let white_scale = self.white_scale();
        map_pixels(width, mean, |_, _, color| {
            // Exposure bias of 2 from the reference curve.
            let biased = (color * exposure * 2.0).max(Color::ZERO);
            let mapped = Color::new(
                self.curve(biased.x),
                self.curve(biased.y),
                self.curve(biased.z),
            ) * white_scale;
            gamma_correct(mapped, self.gamma)
        })
    }
}

/// Gamma correction with a radial darkening towards the image borders.
#[derive(Debug, Clone, Copy)]
pub struct VignetteFilter {
    pub falloff: f64,
    pub strength: f64,
    /// Blend towards gray at the borders, in [0, 1]
    pub desaturation: f64,
    pub center: (f64, f64),
    pub aspect_ratio: f64,
    pub gamma: f64,
}

impl Default for VignetteFilter {
    fn default() -> Self {
        Self {
            falloff: 1.0,
            strength: 1.0,
            desaturation: 0.0,
            center: (0.5, 0.5),
            aspect_ratio: 1.0,
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl VignetteFilter {
    /// Darkening amount at normalized image coordinates `(u, v)`.
    pub fn vignette(&self, u: f64, v: f64) -> f64 {
        let dx = (self.center.0 - u) * self.aspect_ratio;
        let dy = self.center.1 - v;
        (dx * dx + dy * dy).sqrt().powf(self.falloff) * self.strength
    }
}

impl PostProcessingFilter for VignetteFilter {
    fn id(&self) -> &'static str {
        "VIGNETTE"
    }

    fn name(&self) -> &'static str {
        "Vignette"
    }

    fn apply(&self, width: u32, height: u32, mean: &[f64], exposure: f64) -> Vec<f64> {
        map_pixels(width, mean, |x, y, color| {
            let color = gamma_correct(color * exposure, self.gamma);
            let vignette = self.vignette(x as f64 / width as f64, y as f64 / height as f64);
            let darkened = color * (1.0 - vignette).clamp(0.0, 1.0);
            let length = darkened.length();
            darkened + (Color::splat(length) - darkened) * (vignette * self.desaturation)
        })
    }
}

/// Filters by id, built once at startup.
pub struct FilterRegistry {
    filters: HashMap<&'static str, Box<dyn PostProcessingFilter>>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// A registry holding every built-in filter with default parameters.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(NoFilter);
        registry.register(GammaFilter::default());
        registry.register(ReinhardFilter::default());
        registry.register(HableFilmicFilter::default());
        registry.register(VignetteFilter::default());
        registry
    }

    /// Add a filter, replacing any filter with the same id.
    pub fn register<F: PostProcessingFilter + 'static>(&mut self, filter: F) {
        if self.filters.insert(filter.id(), Box::new(filter)).is_some() {
            log::debug!("Replaced post-processing filter");
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn PostProcessingFilter> {
        self.filters.get(id).map(|filter| filter.as_ref())
    }

    /// Like `get`, but an unknown id is an error.
    pub fn require(&self, id: &str) -> ExportResult<&dyn PostProcessingFilter> {
        self.get(id)
            .ok_or_else(|| ExportError::UnknownFilter(id.to_string()))
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.filters.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
