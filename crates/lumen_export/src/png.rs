//! Quantization and PNG output.

use std::path::Path;

use image::RgbaImage;
use lumen_core::Snapshot;

use crate::error::{ExportError, ExportResult};
use crate::postprocess::PostProcessingFilter;

/// Quantize one display value to 8 bits.
#[inline]
pub fn channel_to_u8(value: f64) -> u8 {
    // NaN saturates to 0 in the cast.
    (255.0 * value.clamp(0.0, 1.0) + 0.5) as u8
}

/// Convert RGB display values in [0, 1] to opaque 8-bit RGBA.
pub fn to_rgba8(display: &[f64]) -> Vec<u8> {
    display
        .chunks_exact(3)
        .flat_map(|rgb| {
            [
                channel_to_u8(rgb[0]),
                channel_to_u8(rgb[1]),
                channel_to_u8(rgb[2]),
                255,
            ]
        })
        .collect()
}

/// Post-process a snapshot into an in-memory image.
pub fn render_rgba(
    snapshot: &Snapshot,
    filter: &dyn PostProcessingFilter,
    exposure: f64,
) -> ExportResult<RgbaImage> {
    let (width, height) = (snapshot.width, snapshot.height);
    if width == 0 || height == 0 {
        return Err(ExportError::EmptyImage { width, height });
    }

    let expected = snapshot.pixel_count() * 3;
    if snapshot.samples.len() != expected {
        return Err(ExportError::SizeMismatch {
            expected,
            actual: snapshot.samples.len(),
        });
    }

    let display = filter.apply(width, height, &snapshot.samples, exposure);
    let rgba = to_rgba8(&display);
    let actual = rgba.len();
    RgbaImage::from_raw(width, height, rgba).ok_or(ExportError::SizeMismatch {
        expected: expected / 3 * 4,
        actual,
    })
}

/// Post-process a snapshot and save it as PNG.
pub fn write_png<P: AsRef<Path>>(
    path: P,
    snapshot: &Snapshot,
    filter: &dyn PostProcessingFilter,
    exposure: f64,
) -> ExportResult<()> {
    let path = path.as_ref();
    let image = render_rgba(snapshot, filter, exposure)?;
    image.save_with_format(path, image::ImageFormat::Png)?;

    log::info!(
        "Wrote {}x{} PNG ({} spp, filter {}) to {}",
        snapshot.width,
        snapshot.height,
        snapshot.spp,
        filter.id(),
        path.display()
    );
    Ok(())
}
