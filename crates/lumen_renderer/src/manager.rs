//! The render manager: a scheduling thread that keeps the sample buffer in
//! step with a scene owned by somebody else.
//!
//! The loop waits on a `SceneProvider` for a state change, applies the reset
//! policy, then drives the worker pool through sampling passes until the
//! target sample count is reached, a new change is pending, or it is stopped.
//!
//! ```text
//! Idle --start--> AwaitingChange --change--> Resetting --> Sampling
//!                      ^   ^                                 |  |
//!                      |   +-------- change pending ---------+  |
//!                      +------- Idle (target reached) <---------+
//! any state --stop / pool interrupted--> Stopped
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lumen_core::{
    Interrupted, RenderConfig, RenderMode, RenderScene, ResetReason, SampleBuffer, SampleKernel,
    SceneProvider, Snapshot, Tile,
};

use crate::error::{RenderError, RenderResult};
use crate::pool::RenderWorkerPool;
use crate::snapshot::{IntervalSnapshots, SnapshotControl, SnapshotRequest};
use crate::task::{generate_tiles, RenderTask, TileResult};

/// Scheduling state of a render manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Not started, paused, or target reached (still listening for changes)
    Idle,
    AwaitingChange,
    Resetting,
    Sampling,
    /// Terminal; a stopped manager is never restarted
    Stopped,
}

/// Progress of the current render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStatus {
    pub spp: u64,
    pub render_time: Duration,
    pub samples_per_second: f64,
}

impl RenderStatus {
    fn of(buffer: &SampleBuffer) -> Self {
        Self {
            spp: buffer.spp(),
            render_time: buffer.render_time(),
            samples_per_second: buffer.samples_per_second(),
        }
    }
}

/// Callback invoked from the scheduling thread.
pub type RenderListener = Box<dyn Fn(&RenderStatus) + Send>;

/// Receives a copy of the buffer whenever the snapshot control asks for one.
pub type SnapshotListener = Box<dyn Fn(&Snapshot, SnapshotRequest) + Send>;

/// Everything handed to the scheduling thread on `start`.
#[derive(Default)]
struct Hooks {
    frame_completed: Option<RenderListener>,
    render_completed: Option<RenderListener>,
    snapshot: Option<SnapshotListener>,
    snapshot_control: Option<Box<dyn SnapshotControl>>,
    /// Samples restored into the buffer on the first reset
    resume: Option<Snapshot>,
}

/// State shared between the manager handle and its scheduling thread.
struct Shared<P> {
    config: RenderConfig,
    provider: Arc<P>,
    pool: RenderWorkerPool,
    buffer: RwLock<SampleBuffer>,
    state: Mutex<ManagerState>,
    /// Sticky stop request
    stop: AtomicBool,
}

impl<P> Shared<P> {
    fn read_buffer(&self) -> RwLockReadGuard<'_, SampleBuffer> {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_buffer(&self) -> RwLockWriteGuard<'_, SampleBuffer> {
        self.buffer.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ManagerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.pool.is_interrupted()
    }
}

/// Owns the sample buffer and the worker pool for one render session.
///
/// Single use: after `stop` or `join` the manager cannot be started again;
/// create a fresh one instead.
pub struct RenderManager<P: SceneProvider> {
    shared: Arc<Shared<P>>,
    hooks: Option<Hooks>,
    handle: Option<JoinHandle<()>>,
}

impl<P: SceneProvider> RenderManager<P> {
    /// Validate the configuration and spawn the worker pool.
    ///
    /// The scheduling thread is not started until `start`.
    pub fn new(config: RenderConfig, provider: Arc<P>) -> RenderResult<Self> {
        config.validate()?;

        let pool = RenderWorkerPool::new(config.threads, config.seed)?;
        pool.set_cpu_load(config.cpu_load);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                provider,
                pool,
                buffer: RwLock::new(SampleBuffer::new(0, 0)),
                state: Mutex::new(ManagerState::Idle),
                stop: AtomicBool::new(false),
            }),
            hooks: Some(Hooks::default()),
            handle: None,
        })
    }

    /// Called after every batch of passes.
    pub fn on_frame_completed<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RenderStatus) + Send + 'static,
    {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.frame_completed = Some(Box::new(listener));
        }
        self
    }

    /// Called once each time the target sample count is reached.
    pub fn on_render_completed<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RenderStatus) + Send + 'static,
    {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.render_completed = Some(Box::new(listener));
        }
        self
    }

    /// Called after a pass whenever the snapshot control requests a save.
    pub fn on_snapshot<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Snapshot, SnapshotRequest) + Send + 'static,
    {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.snapshot = Some(Box::new(listener));
        }
        self
    }

    /// Decide when snapshots are taken. Defaults to the intervals in the
    /// configuration.
    pub fn with_snapshot_control<C>(mut self, control: C) -> Self
    where
        C: SnapshotControl + 'static,
    {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.snapshot_control = Some(Box::new(control));
        }
        self
    }

    /// Continue accumulating on top of a saved render.
    ///
    /// The samples are restored on the first reset if the canvas size
    /// matches; otherwise the render starts from scratch.
    pub fn resume_from(mut self, snapshot: Snapshot) -> Self {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.resume = Some(snapshot);
        }
        self
    }

    /// Spawn the scheduling thread.
    pub fn start(&mut self) -> RenderResult<()> {
        let mut hooks = self.hooks.take().ok_or(RenderError::AlreadyStarted)?;
        self.shared.set_state(ManagerState::AwaitingChange);

        let control = hooks
            .snapshot_control
            .take()
            .unwrap_or_else(|| Box::new(IntervalSnapshots::from_config(&self.shared.config)));
        let scheduler = Scheduler {
            shared: Arc::clone(&self.shared),
            hooks,
            control,
        };
        let spawned = thread::Builder::new()
            .name(String::from("Render Manager"))
            .spawn(move || scheduler.run());

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(ManagerState::Stopped);
                Err(err.into())
            }
        }
    }

    /// Block until the scheduling thread exits on its own: after the target
    /// or on pause in headless mode, or once the pool has been interrupted.
    pub fn join(&mut self) {
        self.hooks = None;
        if self.shared.pool.is_interrupted() {
            // The scheduler may be parked waiting for a scene change.
            self.shared.stop.store(true, Ordering::SeqCst);
            self.shared.provider.wake_waiters();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Render manager thread panicked");
            }
        }
        self.shared.set_state(ManagerState::Stopped);
    }

    /// Stop rendering from any state and wait for the scheduling thread.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.pool.interrupt();
        self.shared.provider.wake_waiters();
        self.join();
    }

    pub fn state(&self) -> ManagerState {
        self.shared.state()
    }

    /// The worker pool owned by this manager.
    pub fn pool(&self) -> &RenderWorkerPool {
        &self.shared.pool
    }

    pub fn config(&self) -> &RenderConfig {
        &self.shared.config
    }

    /// Change the CPU utilization target while rendering.
    pub fn set_cpu_load(&self, percent: u32) {
        self.shared.pool.set_cpu_load(percent);
    }

    /// Consistent copy of the sample buffer, safe to take while sampling.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.read_buffer().snapshot()
    }

    pub fn render_status(&self) -> RenderStatus {
        RenderStatus::of(&self.shared.read_buffer())
    }
}

impl<P: SceneProvider> Drop for RenderManager<P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// How a sampling run ended.
enum Outcome {
    /// The target sample count was reached
    Completed,
    /// A scene change is pending
    Changed,
    Stopped,
}

/// The scheduling thread.
struct Scheduler<P> {
    shared: Arc<Shared<P>>,
    hooks: Hooks,
    control: Box<dyn SnapshotControl>,
}

/// What the scheduler captured from the scene at the last reset.
struct RenderSetup {
    kernel: Arc<dyn SampleKernel>,
    tiles: Vec<Tile>,
    mode: RenderMode,
    /// Completion has been reported since the last reset
    completed: bool,
}

impl<P: SceneProvider> Scheduler<P> {
    fn run(mut self) {
        log::debug!("Render manager started");
        let mut setup: Option<RenderSetup> = None;

        while !self.shared.should_stop() {
            if self.shared.state() != ManagerState::Idle {
                self.shared.set_state(ManagerState::AwaitingChange);
            }

            let reason = match self.shared.provider.await_state_change(&self.shared.stop) {
                Ok(reason) => reason,
                Err(Interrupted) => break,
            };
            if self.shared.should_stop() {
                break;
            }

            let current = match setup.take() {
                Some(mut current) if !reason.requires_reset() => {
                    current.mode = self.shared.provider.with_scene(|scene| scene.render_mode());
                    current
                }
                // Without a captured kernel every wake is treated as a reset.
                _ => self.reset(reason),
            };
            let setup = setup.insert(current);

            if setup.mode == RenderMode::Paused {
                log::debug!("Render paused at {} spp", self.shared.read_buffer().spp());
                self.shared.set_state(ManagerState::Idle);
                if self.shared.config.headless {
                    break;
                }
                continue;
            }

            match self.sample(setup) {
                Outcome::Completed => {
                    self.shared.set_state(ManagerState::Idle);
                    if self.shared.config.headless {
                        break;
                    }
                }
                Outcome::Changed => {}
                Outcome::Stopped => break,
            }
        }

        self.shared.set_state(ManagerState::Stopped);
        log::debug!("Render manager stopped");
    }

    /// Discard accumulated samples and capture the scene's current state.
    fn reset(&mut self, reason: ResetReason) -> RenderSetup {
        self.shared.set_state(ManagerState::Resetting);

        let resume = self.hooks.resume.take();
        let (kernel, mode, width, height) = self.shared.provider.with_scene(|scene| {
            let (width, height) = scene.canvas_size();
            let kernel = scene.kernel();
            let mut buffer = self.shared.write_buffer();
            buffer.reset(width, height);
            if let Some(saved) = &resume {
                if buffer.restore(saved) {
                    log::info!("Resuming render at {} spp", saved.spp);
                }
            }
            (kernel, scene.render_mode(), width, height)
        });

        let tiles = generate_tiles(width, height, self.shared.config.tile_width);
        log::info!(
            "Render reset ({:?}): {}x{} canvas, {} tiles",
            reason,
            width,
            height,
            tiles.len()
        );

        RenderSetup {
            kernel,
            tiles,
            mode,
            completed: false,
        }
    }

    /// Run batches of passes until the target is reached, a change is
    /// pending or the manager stops.
    fn sample(&self, setup: &mut RenderSetup) -> Outcome {
        let config = &self.shared.config;
        self.shared.set_state(ManagerState::Sampling);

        loop {
            if self.shared.read_buffer().spp() >= config.target_spp {
                if !setup.completed {
                    setup.completed = true;
                    let status = RenderStatus::of(&self.shared.read_buffer());
                    log::info!(
                        "Render completed: {} spp in {:.2?} ({:.0} samples/s)",
                        status.spp,
                        status.render_time,
                        status.samples_per_second
                    );
                    notify(&self.hooks.render_completed, &status);
                }
                return Outcome::Completed;
            }

            for _ in 0..config.samples_per_pass {
                if !self.run_pass(setup) {
                    return Outcome::Stopped;
                }
                self.save_snapshot();
                if self.shared.provider.poll_state_change() {
                    return Outcome::Changed;
                }
                if self.shared.read_buffer().spp() >= config.target_spp {
                    break;
                }
            }

            let status = RenderStatus::of(&self.shared.read_buffer());
            log::debug!(
                "Frame done: {} spp ({:.0} samples/s)",
                status.spp,
                status.samples_per_second
            );
            notify(&self.hooks.frame_completed, &status);
        }
    }

    /// Render one sample for every tile and merge the results.
    ///
    /// Returns false if the manager was stopped or the pool interrupted.
    fn run_pass(&self, setup: &RenderSetup) -> bool {
        if self.shared.should_stop() {
            return false;
        }

        let pool = &self.shared.pool;
        let pass = self.shared.read_buffer().spp();
        let (sender, receiver) = mpsc::channel::<TileResult>();
        let start = Instant::now();

        for tile in &setup.tiles {
            let task = RenderTask::new(*tile, pass, self.shared.config.seed);
            let kernel = Arc::clone(&setup.kernel);
            let sender = sender.clone();
            pool.submit(move |_worker| {
                let _ = sender.send(task.render(kernel.as_ref()));
            });
        }
        drop(sender);

        pool.await_empty();
        if self.shared.should_stop() {
            return false;
        }

        // Every task has finished, so every surviving result is queued.
        let mut buffer = self.shared.write_buffer();
        let mut merged = 0;
        for result in receiver.try_iter() {
            if buffer.merge_tile(&result.tile, &result.pixels) {
                merged += 1;
            }
        }
        if merged < setup.tiles.len() {
            log::warn!(
                "Pass {}: dropped {} of {} tiles",
                pass,
                setup.tiles.len() - merged,
                setup.tiles.len()
            );
        }
        buffer.finish_pass(start.elapsed());
        true
    }

    /// Hand a copy of the buffer to the snapshot listener if the control
    /// asks for one at the current spp.
    fn save_snapshot(&self) {
        let Some(listener) = &self.hooks.snapshot else {
            return;
        };
        let request = self.control.request(self.shared.read_buffer().spp());
        if !request.any() {
            return;
        }

        let snapshot = self.shared.read_buffer().snapshot();
        log::debug!("Snapshot requested at {} spp: {:?}", snapshot.spp, request);
        if catch_unwind(AssertUnwindSafe(|| listener(&snapshot, request))).is_err() {
            log::error!("Snapshot listener panicked");
        }
    }
}

fn notify(listener: &Option<RenderListener>, status: &RenderStatus) {
    if let Some(listener) = listener {
        if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
            log::error!("Render listener panicked");
        }
    }
}
