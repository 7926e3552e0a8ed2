// Headless renderer: render a built-in scene to the target sample count and
// write a PNG.
// Run with: cargo run --release -- [config.json] --out render.png --filter TONEMAP3
// Resume with: cargo run --release -- --resume render.dump --dump render.dump

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lumen_core::{load_dump, save_dump, Color, RenderConfig, Snapshot, SynchronousSceneProvider};
use lumen_export::{write_png, FilterRegistry};
use lumen_renderer::{BasicScene, RenderManager, Sky, SnapshotRequest};

const USAGE: &str = "Usage: lumen [config.json] [--out file.png] [--filter ID] \
                     [--kernel constant|sky] [--width W] [--height H] [--exposure E] \
                     [--dump file.dump] [--resume file.dump] [--snapshot-every N] \
                     [--dump-every N]";

/// Which built-in scene to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KernelKind {
    Constant,
    Sky,
}

#[derive(Debug, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    out: PathBuf,
    filter: String,
    kernel: KernelKind,
    width: u32,
    height: u32,
    exposure: f64,
    /// Render dump written when the render finishes
    dump: Option<PathBuf>,
    /// Render dump to continue from
    resume: Option<PathBuf>,
    snapshot_every: Option<u64>,
    dump_every: Option<u64>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            out: PathBuf::from("lumen.png"),
            filter: String::from("TONEMAP3"),
            kernel: KernelKind::Sky,
            width: 400,
            height: 225,
            exposure: 1.0,
            dump: None,
            resume: None,
            snapshot_every: None,
            dump_every: None,
        }
    }
}

impl Args {
    /// Parse arguments, excluding the program name. `Ok(None)` means help was requested.
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Option<Self>> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .with_context(|| format!("missing value for {}", name))
            };

            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "-o" | "--out" => parsed.out = PathBuf::from(value("--out")?),
                "--filter" => parsed.filter = value("--filter")?,
                "--kernel" => {
                    parsed.kernel = match value("--kernel")?.as_str() {
                        "constant" => KernelKind::Constant,
                        "sky" => KernelKind::Sky,
                        other => bail!("unknown kernel '{}', expected constant or sky", other),
                    }
                }
                "--width" => parsed.width = parse_number(&value("--width")?, "--width")?,
                "--height" => parsed.height = parse_number(&value("--height")?, "--height")?,
                "--exposure" => {
                    parsed.exposure = parse_number(&value("--exposure")?, "--exposure")?
                }
                "--dump" => parsed.dump = Some(PathBuf::from(value("--dump")?)),
                "--resume" => parsed.resume = Some(PathBuf::from(value("--resume")?)),
                "--snapshot-every" => {
                    parsed.snapshot_every =
                        Some(parse_number(&value("--snapshot-every")?, "--snapshot-every")?)
                }
                "--dump-every" => {
                    parsed.dump_every = Some(parse_number(&value("--dump-every")?, "--dump-every")?)
                }
                flag if flag.starts_with('-') => bail!("unknown option '{}'", flag),
                path => {
                    if parsed.config.is_some() {
                        bail!("more than one config file given");
                    }
                    parsed.config = Some(PathBuf::from(path));
                }
            }
        }

        if parsed.width == 0 || parsed.height == 0 {
            bail!("canvas size must be non-zero");
        }
        Ok(Some(parsed))
    }

    fn scene(&self) -> BasicScene {
        let scene = BasicScene::new(self.width, self.height).with_name("lumen");
        match self.kernel {
            KernelKind::Constant => scene.with_sky(Sky::Solid(Color::splat(0.5))),
            KernelKind::Sky => scene,
        }
    }
}

/// `dir/render.png` at 16 spp becomes `dir/render-16.png`.
fn numbered(path: &Path, spp: u64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("lumen"));
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, spp, ext.to_string_lossy()),
        None => format!("{}-{}", stem, spp),
    };
    path.with_file_name(name)
}

/// Writes the intermediate images and dumps requested during a render.
struct SnapshotSaver {
    registry: Arc<FilterRegistry>,
    filter: String,
    exposure: f64,
    image: PathBuf,
    dump: PathBuf,
}

impl SnapshotSaver {
    fn save(&self, snapshot: &Snapshot, request: SnapshotRequest) {
        if request.image {
            let path = numbered(&self.image, snapshot.spp);
            if let Some(filter) = self.registry.get(&self.filter) {
                match write_png(&path, snapshot, filter, self.exposure) {
                    Ok(()) => log::info!("Saved snapshot {}", path.display()),
                    Err(err) => log::error!("Failed to write {}: {}", path.display(), err),
                }
            }
        }
        if request.dump {
            let path = numbered(&self.dump, snapshot.spp);
            if let Err(err) = save_dump(&path, snapshot) {
                log::error!("Failed to write {}: {}", path.display(), err);
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, name: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse()
        .with_context(|| format!("invalid value '{}' for {}", text, name))
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = match Args::parse(std::env::args().skip(1))? {
        Some(args) => args,
        None => {
            println!("{}", USAGE);
            return Ok(());
        }
    };

    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RenderConfig::default(),
    }
    .with_headless(true);
    if let Some(interval) = args.snapshot_every {
        config = config.with_snapshot_interval(interval);
    }
    if let Some(interval) = args.dump_every {
        config = config.with_dump_interval(interval);
    }

    let resume = match &args.resume {
        Some(path) => Some(
            load_dump(path).with_context(|| format!("failed to load dump {}", path.display()))?,
        ),
        None => None,
    };

    let registry = Arc::new(FilterRegistry::new());
    let filter = registry.require(&args.filter).with_context(|| {
        format!("available filters: {}", registry.ids().join(", "))
    })?;

    log::info!(
        "Rendering {}x{} to {} spp on {} threads",
        args.width,
        args.height,
        config.target_spp,
        config.threads
    );

    let saver = SnapshotSaver {
        registry: Arc::clone(&registry),
        filter: args.filter.clone(),
        exposure: args.exposure,
        image: args.out.clone(),
        dump: args
            .dump
            .clone()
            .unwrap_or_else(|| args.out.with_extension("dump")),
    };

    let provider = Arc::new(SynchronousSceneProvider::new(args.scene()));
    let mut manager = RenderManager::new(config, provider)?
        .on_frame_completed(|status| {
            log::debug!(
                "{} spp, {:.0} samples/s",
                status.spp,
                status.samples_per_second
            );
        })
        .on_snapshot(move |snapshot, request| saver.save(snapshot, request));
    if let Some(saved) = resume {
        manager = manager.resume_from(saved);
    }
    manager.start()?;
    manager.join();

    let snapshot = manager.snapshot();
    write_png(&args.out, &snapshot, filter, args.exposure)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    if let Some(path) = &args.dump {
        save_dump(path, &snapshot)
            .with_context(|| format!("failed to write dump {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>> {
        Args::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(parse(&[]).unwrap(), Some(Args::default()));
    }

    #[test]
    fn test_parse_all_options() {
        let args = parse(&[
            "scene.json",
            "--out",
            "out.png",
            "--filter",
            "GAMMA",
            "--kernel",
            "constant",
            "--width",
            "64",
            "--height",
            "32",
            "--exposure",
            "1.5",
        ])
        .unwrap()
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("scene.json")));
        assert_eq!(args.out, PathBuf::from("out.png"));
        assert_eq!(args.filter, "GAMMA");
        assert_eq!(args.kernel, KernelKind::Constant);
        assert_eq!((args.width, args.height), (64, 32));
        assert_eq!(args.exposure, 1.5);
        assert_eq!(args.scene().sky(), Sky::Solid(Color::splat(0.5)));
    }

    #[test]
    fn test_parse_dump_options() {
        let args = parse(&[
            "--dump",
            "final.dump",
            "--resume",
            "earlier.dump",
            "--snapshot-every",
            "16",
            "--dump-every",
            "64",
        ])
        .unwrap()
        .unwrap();

        assert_eq!(args.dump, Some(PathBuf::from("final.dump")));
        assert_eq!(args.resume, Some(PathBuf::from("earlier.dump")));
        assert_eq!((args.snapshot_every, args.dump_every), (Some(16), Some(64)));
        assert!(parse(&["--dump-every", "-1"]).is_err());
    }

    #[test]
    fn test_numbered_paths() {
        assert_eq!(
            numbered(Path::new("out/render.png"), 16),
            PathBuf::from("out/render-16.png")
        );
        assert_eq!(numbered(Path::new("render"), 4), PathBuf::from("render-4"));
    }

    #[test]
    fn test_parse_help() {
        assert!(parse(&["--kernel", "sky", "--help"]).unwrap().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--kernel", "mandelbrot"]).is_err());
        assert!(parse(&["--out"]).is_err());
        assert!(parse(&["--width", "wide"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
    }
}
