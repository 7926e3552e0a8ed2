//! Scene synchronization between an editor and the render manager.
//!
//! Two lock domains are involved:
//!
//! - the **scene lock**, taken by `with_scene` (render side) and
//!   `with_edit_scene` (editor side), which are mutually exclusive;
//! - the **change lock**, a small mutex + condvar holding the pending
//!   reset reason. `await_state_change` and `poll_state_change` only ever
//!   take this one, so a waiting render manager never holds the scene.
//!
//! Lock order is always scene -> change.

use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::RenderScene;

/// Why the render manager was woken.
///
/// Variants are ordered by strength: when several changes pile up before the
/// manager observes them, the strongest one is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResetReason {
    /// No-op wake, nothing to reset
    None,
    /// Render mode changed (rendering/paused); samples are kept
    ModeChanged,
    /// Camera, sky or other render settings changed
    SettingsChanged,
    /// Material definitions changed
    MaterialsChanged,
    /// Canvas size changed; the buffer is reallocated
    CanvasResized,
    /// A new scene was bound
    SceneLoaded,
}

impl ResetReason {
    /// Returns true if accumulated samples must be discarded.
    pub fn requires_reset(self) -> bool {
        matches!(
            self,
            ResetReason::SettingsChanged
                | ResetReason::MaterialsChanged
                | ResetReason::CanvasResized
                | ResetReason::SceneLoaded
        )
    }

    /// Combine two pending reasons, keeping the stronger one.
    pub fn merge(self, other: ResetReason) -> ResetReason {
        self.max(other)
    }
}

/// Returned by `await_state_change` when the waiter was cancelled.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait for a scene state change was interrupted")]
pub struct Interrupted;

/// The synchronization boundary implemented by whoever owns the scene.
pub trait SceneProvider: Send + Sync + 'static {
    type Scene: RenderScene;

    /// Block until a change is pending, clear it and return its reason.
    ///
    /// A change signalled before the call is not lost. Returns
    /// `Err(Interrupted)` once `cancel` is set and `wake_waiters` has run.
    fn await_state_change(&self, cancel: &AtomicBool) -> Result<ResetReason, Interrupted>;

    /// Returns true if a change is pending, without clearing it.
    fn poll_state_change(&self) -> bool;

    /// Run `f` with exclusive read access for rendering.
    fn with_scene<R>(&self, f: impl FnOnce(&Self::Scene) -> R) -> R;

    /// Run `f` with exclusive write access for editing.
    ///
    /// Reasons recorded on the `SceneEdit` are signalled before the scene
    /// lock is released.
    fn with_edit_scene<R>(&self, f: impl FnOnce(&mut SceneEdit<'_, Self::Scene>) -> R) -> R;

    /// Wake every thread parked in `await_state_change`.
    fn wake_waiters(&self);
}

/// Mutable access to a scene that records how the edit affects rendering.
pub struct SceneEdit<'a, S> {
    scene: &'a mut S,
    reason: Option<ResetReason>,
}

impl<'a, S> SceneEdit<'a, S> {
    pub fn new(scene: &'a mut S) -> Self {
        Self { scene, reason: None }
    }

    /// Record that this edit requires the given reset.
    pub fn mark(&mut self, reason: ResetReason) {
        self.reason = Some(match self.reason {
            Some(previous) => previous.merge(reason),
            None => reason,
        });
    }

    /// The strongest reason recorded so far, if any.
    pub fn reason(&self) -> Option<ResetReason> {
        self.reason
    }
}

impl<S> Deref for SceneEdit<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.scene
    }
}

impl<S> DerefMut for SceneEdit<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.scene
    }
}

/// Pending change, guarded by the change lock.
#[derive(Debug, Default)]
struct ChangeState {
    pending: Option<ResetReason>,
}

/// Default `SceneProvider`: runs every operation on the calling thread.
///
/// The scene starts out with `SceneLoaded` pending, so a scene that is never
/// edited is still rendered exactly once.
pub struct SynchronousSceneProvider<S> {
    scene: Mutex<S>,
    change: Mutex<ChangeState>,
    changed: Condvar,
}

impl<S: RenderScene> SynchronousSceneProvider<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene: Mutex::new(scene),
            change: Mutex::new(ChangeState {
                pending: Some(ResetReason::SceneLoaded),
            }),
            changed: Condvar::new(),
        }
    }

    /// Signal a change without editing the scene.
    pub fn request_reset(&self, reason: ResetReason) {
        let mut state = self.lock_change();
        state.pending = Some(match state.pending {
            Some(previous) => previous.merge(reason),
            None => reason,
        });
        self.changed.notify_all();
    }

    /// Consume the provider and return the scene.
    pub fn into_scene(self) -> S {
        self.scene.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    // A panicking closure poisons the scene lock; the scene itself is still
    // usable, so later callers recover the guard.
    fn lock_scene(&self) -> MutexGuard<'_, S> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_change(&self) -> MutexGuard<'_, ChangeState> {
        self.change.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: RenderScene> SceneProvider for SynchronousSceneProvider<S> {
    type Scene = S;

    fn await_state_change(&self, cancel: &AtomicBool) -> Result<ResetReason, Interrupted> {
        let mut state = self.lock_change();
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(Interrupted);
            }
            if let Some(reason) = state.pending.take() {
                return Ok(reason);
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn poll_state_change(&self) -> bool {
        self.lock_change().pending.is_some()
    }

    fn with_scene<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let scene = self.lock_scene();
        f(&scene)
    }

    fn with_edit_scene<R>(&self, f: impl FnOnce(&mut SceneEdit<'_, S>) -> R) -> R {
        let mut scene = self.lock_scene();
        let mut edit = SceneEdit::new(&mut *scene);
        // A half-applied edit still has to reach the renderer.
        let result = catch_unwind(AssertUnwindSafe(|| f(&mut edit)));
        if let Some(reason) = edit.reason() {
            log::debug!("Scene edit requested {:?}", reason);
            self.request_reset(reason);
        }
        match result {
            Ok(value) => value,
            // Unwinding with the scene guard held keeps the lock poisoned.
            Err(payload) => resume_unwind(payload),
        }
    }

    fn wake_waiters(&self) {
        // Taking the change lock orders this notify after any waiter's
        // cancellation check.
        let _state = self.lock_change();
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, SampleKernel, Tile};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct TestScene {
        width: u32,
        height: u32,
    }

    impl RenderScene for TestScene {
        fn canvas_size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn kernel(&self) -> Arc<dyn SampleKernel> {
            Arc::new(|_: &Tile, _: u32, _: u32, _: u64| Color::ONE)
        }
    }

    fn provider() -> Arc<SynchronousSceneProvider<TestScene>> {
        Arc::new(SynchronousSceneProvider::new(TestScene { width: 4, height: 4 }))
    }

    /// Spawn a waiter that reports its result on a channel.
    fn spawn_waiter(
        provider: &Arc<SynchronousSceneProvider<TestScene>>,
        cancel: &Arc<AtomicBool>,
    ) -> (mpsc::Receiver<Result<ResetReason, Interrupted>>, thread::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let provider = Arc::clone(provider);
        let cancel = Arc::clone(cancel);
        let handle = thread::spawn(move || {
            let _ = tx.send(provider.await_state_change(&cancel));
        });
        (rx, handle)
    }

    #[test]
    fn test_initial_scene_loaded_delivered_once() {
        let provider = provider();
        let cancel = AtomicBool::new(false);

        assert!(provider.poll_state_change());
        assert_eq!(provider.await_state_change(&cancel), Ok(ResetReason::SceneLoaded));
        assert!(!provider.poll_state_change());
    }

    #[test]
    fn test_await_blocks_until_signalled() {
        let provider = provider();
        let cancel = Arc::new(AtomicBool::new(false));
        provider.await_state_change(&cancel).unwrap();

        let (rx, handle) = spawn_waiter(&provider, &cancel);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        provider.with_edit_scene(|edit| {
            edit.width = 8;
            edit.mark(ResetReason::CanvasResized);
        });

        let reason = rx.recv_timeout(Duration::from_secs(5)).expect("waiter not woken");
        assert_eq!(reason, Ok(ResetReason::CanvasResized));
        handle.join().unwrap();

        // No duplicate delivery: a second wait blocks again.
        let (rx, handle) = spawn_waiter(&provider, &cancel);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        cancel.store(true, Ordering::SeqCst);
        provider.wake_waiters();
        let result = rx.recv_timeout(Duration::from_secs(5)).expect("waiter not cancelled");
        assert_eq!(result, Err(Interrupted));
        handle.join().unwrap();
    }

    #[test]
    fn test_change_before_wait_is_not_lost() {
        let provider = provider();
        let cancel = AtomicBool::new(false);
        provider.await_state_change(&cancel).unwrap();

        provider.request_reset(ResetReason::SettingsChanged);
        assert!(provider.poll_state_change());
        assert_eq!(provider.await_state_change(&cancel), Ok(ResetReason::SettingsChanged));
    }

    #[test]
    fn test_strongest_reason_wins() {
        let provider = provider();
        let cancel = AtomicBool::new(false);

        // SceneLoaded is already pending and dominates everything.
        provider.request_reset(ResetReason::SettingsChanged);
        assert_eq!(provider.await_state_change(&cancel), Ok(ResetReason::SceneLoaded));

        provider.with_edit_scene(|edit| {
            edit.mark(ResetReason::ModeChanged);
            edit.mark(ResetReason::SettingsChanged);
        });
        provider.request_reset(ResetReason::ModeChanged);
        assert_eq!(provider.await_state_change(&cancel), Ok(ResetReason::SettingsChanged));
    }

    #[test]
    fn test_unmarked_edit_does_not_signal() {
        let provider = provider();
        let cancel = AtomicBool::new(false);
        provider.await_state_change(&cancel).unwrap();

        let width = provider.with_edit_scene(|edit| edit.width);
        assert_eq!(width, 4);
        assert!(!provider.poll_state_change());
    }

    #[test]
    fn test_cancelled_waiter_returns_immediately() {
        let provider = provider();
        let cancel = AtomicBool::new(true);
        assert_eq!(provider.await_state_change(&cancel), Err(Interrupted));
        // The pending change is still there for the next waiter.
        assert!(provider.poll_state_change());
    }

    #[test]
    fn test_panicking_edit_keeps_lock_usable() {
        let provider = provider();

        let result = catch_unwind(AssertUnwindSafe(|| {
            provider.with_edit_scene(|edit| {
                edit.width = 16;
                if edit.width == 16 {
                    panic!("editor failure");
                }
            })
        }));
        assert!(result.is_err());

        let size = provider.with_scene(|scene| scene.canvas_size());
        assert_eq!(size, (16, 4));
    }

    #[test]
    fn test_panicking_edit_still_signals() {
        let provider = provider();
        let cancel = AtomicBool::new(false);
        assert_eq!(provider.await_state_change(&cancel), Ok(ResetReason::SceneLoaded));

        let result = catch_unwind(AssertUnwindSafe(|| {
            provider.with_edit_scene(|edit| {
                edit.width = 32;
                edit.mark(ResetReason::CanvasResized);
                if edit.width == 32 {
                    panic!("editor failure");
                }
            })
        }));
        assert!(result.is_err());

        assert!(provider.poll_state_change());
        assert_eq!(provider.await_state_change(&cancel), Ok(ResetReason::CanvasResized));
        assert_eq!(provider.with_scene(|scene| scene.canvas_size()), (32, 4));
    }

    #[test]
    fn test_reason_strength() {
        assert!(ResetReason::SceneLoaded.requires_reset());
        assert!(ResetReason::CanvasResized.requires_reset());
        assert!(!ResetReason::ModeChanged.requires_reset());
        assert!(!ResetReason::None.requires_reset());
        assert_eq!(
            ResetReason::None.merge(ResetReason::MaterialsChanged),
            ResetReason::MaterialsChanged
        );
    }
}
