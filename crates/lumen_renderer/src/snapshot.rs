//! Deciding when to save intermediate results during a render.

use lumen_core::RenderConfig;

/// What to save after a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Post-process and write an image
    pub image: bool,
    /// Write a render dump that can be resumed from
    pub dump: bool,
}

impl SnapshotRequest {
    pub fn any(&self) -> bool {
        self.image || self.dump
    }
}

/// Consulted by the render manager after every pass with the new spp.
pub trait SnapshotControl: Send {
    fn request(&self, spp: u64) -> SnapshotRequest;
}

impl<F> SnapshotControl for F
where
    F: Fn(u64) -> SnapshotRequest + Send,
{
    fn request(&self, spp: u64) -> SnapshotRequest {
        self(spp)
    }
}

/// Saves every `n` spp; an interval of 0 never saves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalSnapshots {
    pub snapshot_interval: u64,
    pub dump_interval: u64,
}

impl IntervalSnapshots {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            snapshot_interval: config.snapshot_interval,
            dump_interval: config.dump_interval,
        }
    }
}

fn is_multiple(spp: u64, interval: u64) -> bool {
    interval > 0 && spp > 0 && spp % interval == 0
}

impl SnapshotControl for IntervalSnapshots {
    fn request(&self, spp: u64) -> SnapshotRequest {
        SnapshotRequest {
            image: is_multiple(spp, self.snapshot_interval),
            dump: is_multiple(spp, self.dump_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_snapshots() {
        let control = IntervalSnapshots {
            snapshot_interval: 4,
            dump_interval: 6,
        };

        assert!(!control.request(0).any());
        assert_eq!(control.request(4), SnapshotRequest { image: true, dump: false });
        assert_eq!(control.request(6), SnapshotRequest { image: false, dump: true });
        assert_eq!(control.request(12), SnapshotRequest { image: true, dump: true });
        assert!(!control.request(13).any());
    }

    #[test]
    fn test_disabled_by_default() {
        let control = IntervalSnapshots::from_config(&RenderConfig::default());
        assert!((1..100).all(|spp| !control.request(spp).any()));
    }
}
