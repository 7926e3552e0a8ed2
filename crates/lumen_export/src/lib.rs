//! Lumen Export - turn sample buffer snapshots into images.
//!
//! Snapshots hold linear mean radiance. A `PostProcessingFilter` maps them to
//! display values in [0, 1], which `to_rgba8` quantizes and `write_png` saves.

mod error;
pub mod png;
pub mod postprocess;

pub use error::{ExportError, ExportResult};
pub use png::{render_rgba, to_rgba8, write_png};
pub use postprocess::{
    FilterRegistry, GammaFilter, HableFilmicFilter, NoFilter, PostProcessingFilter,
    ReinhardFilter, VignetteFilter, DEFAULT_GAMMA,
};
