use std::mem;
use std::sync::Arc;

use super::SessionBackend;
use crate::animation::{AnimationDescriptor, AnimationId, AnimationRegistry, AnimationState};
use crate::device::SurfaceSize;
use crate::error::{BridgeError, Result};
use crate::handle::Handle;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionPhase {
    /// Configured, nothing presented yet with the active animation.
    Bound,
    /// At least one frame presented with the active animation.
    Rendering,
    /// Released. Every further call fails with `InvalidHandle`.
    Destroyed,
}

/// Point-in-time view of a session, for hosts and tests.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub animation: AnimationId,
    pub animation_name: &'static str,
    pub state: AnimationState,
    pub size: SurfaceSize,
    pub phase: SessionPhase,
}

pub(super) struct Live<B: SessionBackend> {
    // Field order is drop order: programs go before the device that made them.
    pub(super) program: B::Program,
    /// Programs replaced by an animation change, kept until the next submit.
    pub(super) retired: Vec<B::Program>,
    pub(super) animation: AnimationDescriptor<B>,
    pub(super) state: AnimationState,
    pub(super) phase: SessionPhase,
    pub(super) backend: B,
}

/// One render session.
///
/// Not internally synchronized: the bridge serializes calls per session.
pub struct Session<B: SessionBackend> {
    handle: Handle,
    registry: Arc<AnimationRegistry<B>>,
    live: Option<Live<B>>,
}

impl<B: SessionBackend> Session<B> {
    /// Builds the program for `animation` on `backend` and enters `Bound`.
    ///
    /// On error nothing is retained: the backend is dropped with the error.
    pub fn create(
        backend: B,
        registry: Arc<AnimationRegistry<B>>,
        animation: AnimationId,
    ) -> Result<Self> {
        let descriptor = *registry.get(animation)?;
        backend.check_device()?;
        let program = backend.guarded(|b| (descriptor.build)(b))?;

        log::info!(
            "session bound: animation {} ({}) at {:?}",
            descriptor.id,
            descriptor.name,
            backend.size()
        );

        Ok(Self {
            handle: Handle::NULL,
            registry,
            live: Some(Live {
                program,
                retired: Vec::new(),
                animation: descriptor,
                state: AnimationState::new(descriptor.step),
                phase: SessionPhase::Bound,
                backend,
            }),
        })
    }

    /// Tags the session with the handle it is registered under, for errors and logs.
    pub(crate) fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = handle;
        self
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn phase(&self) -> SessionPhase {
        self.live
            .as_ref()
            .map_or(SessionPhase::Destroyed, |live| live.phase)
    }

    pub fn is_destroyed(&self) -> bool {
        self.live.is_none()
    }

    /// Applies a new surface size. Unchanged sizes are a no-op; a zero size is
    /// remembered and frames are skipped until a real size arrives.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<()> {
        let handle = self.handle;
        let live = self.live_mut()?;
        live.backend.check_device()?;
        if live.backend.resize(size)? {
            log::debug!("session {handle}: resized to {}x{}", size.width, size.height);
        }
        Ok(())
    }

    /// Switches the active animation.
    ///
    /// Either the new program is fully built and swapped in (state reset,
    /// phase back to `Bound`), or the call fails and the session keeps rendering
    /// the previous animation untouched.
    pub fn change_animation(&mut self, animation: AnimationId) -> Result<()> {
        let handle = self.handle;
        let descriptor = *self.registry.get(animation)?;
        let live = self.live_mut()?;
        live.backend.check_device()?;

        let program = live.backend.guarded(|b| (descriptor.build)(b))?;
        let previous = mem::replace(&mut live.program, program);
        live.retired.push(previous);

        log::info!(
            "session {handle}: animation {} -> {} ({})",
            live.animation.id,
            descriptor.id,
            descriptor.name
        );

        live.animation = descriptor;
        live.state = AnimationState::new(descriptor.step);
        live.phase = SessionPhase::Bound;
        Ok(())
    }

    /// Releases the program, surface and device. Idempotent failure: a second
    /// call reports `InvalidHandle`.
    pub fn destroy(&mut self) -> Result<()> {
        let live = self.live.take().ok_or(self.invalid())?;
        log::info!(
            "session {}: destroyed after {} frames of animation {}",
            self.handle,
            live.state.frame_index(),
            live.animation.id
        );
        drop(live);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let live = self.live.as_ref().ok_or(self.invalid())?;
        Ok(SessionSnapshot {
            animation: live.animation.id,
            animation_name: live.animation.name,
            state: live.state,
            size: live.backend.size(),
            phase: live.phase,
        })
    }

    pub(super) fn live_mut(&mut self) -> Result<&mut Live<B>> {
        let invalid = self.invalid();
        self.live.as_mut().ok_or(invalid)
    }

    fn invalid(&self) -> BridgeError {
        BridgeError::InvalidHandle(self.handle.as_raw())
    }
}

impl<B: SessionBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if self.live.is_some() {
            log::debug!("session {} released without destroy", self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FrameStatus;
    use crate::testing::{mock_registry, MockBackend, BROKEN, SPIN, SWEEP};

    fn session(backend: MockBackend) -> Session<MockBackend> {
        Session::create(backend, Arc::new(mock_registry()), SPIN).unwrap()
    }

    // ── create ─────────────────────────────────────────────────────────────

    #[test]
    fn create_builds_program_and_is_bound() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let s = session(backend);
        assert_eq!(s.phase(), SessionPhase::Bound);
        assert_eq!(log.lock().built, vec![SPIN]);
        let snap = s.snapshot().unwrap();
        assert_eq!(snap.animation, SPIN);
        assert_eq!(snap.state.frame_index(), 0);
    }

    #[test]
    fn create_rejects_unknown_animation_before_building() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let err = Session::create(backend, Arc::new(mock_registry()), AnimationId(77))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::UnknownAnimation(AnimationId(77))));
        assert!(log.lock().built.is_empty());
    }

    #[test]
    fn create_on_lost_device_fails() {
        let backend = MockBackend::new(64, 64);
        backend.log().lock().device_lost = true;
        let err = Session::create(backend, Arc::new(mock_registry()), SPIN)
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::DeviceLost(_)));
    }

    // ── resize ─────────────────────────────────────────────────────────────

    #[test]
    fn resize_same_size_is_noop() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let mut s = session(backend);
        s.resize(SurfaceSize::new(64, 64)).unwrap();
        assert!(log.lock().resizes.is_empty());
        s.resize(SurfaceSize::new(128, 32)).unwrap();
        assert_eq!(log.lock().resizes, vec![SurfaceSize::new(128, 32)]);
        assert_eq!(s.snapshot().unwrap().size, SurfaceSize::new(128, 32));
    }

    #[test]
    fn zero_size_skips_frames_until_restored() {
        let mut s = session(MockBackend::new(64, 64));
        s.resize(SurfaceSize::new(0, 0)).unwrap();
        assert_eq!(s.frame().unwrap(), FrameStatus::Skipped);
        assert_eq!(s.snapshot().unwrap().state.frame_index(), 0);
        s.resize(SurfaceSize::new(10, 10)).unwrap();
        assert_eq!(s.frame().unwrap(), FrameStatus::Presented);
    }

    // ── change_animation ───────────────────────────────────────────────────

    #[test]
    fn change_resets_state_and_phase() {
        let mut s = session(MockBackend::new(64, 64));
        s.frame().unwrap();
        s.frame().unwrap();
        assert_eq!(s.phase(), SessionPhase::Rendering);

        s.change_animation(SWEEP).unwrap();
        let snap = s.snapshot().unwrap();
        assert_eq!(snap.animation, SWEEP);
        assert_eq!(snap.state.frame_index(), 0);
        assert_eq!(snap.phase, SessionPhase::Bound);
    }

    #[test]
    fn change_to_unknown_keeps_previous_animation() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let mut s = session(backend);
        s.frame().unwrap();

        let err = s.change_animation(AnimationId(9)).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownAnimation(AnimationId(9))));

        let snap = s.snapshot().unwrap();
        assert_eq!(snap.animation, SPIN);
        assert_eq!(snap.state.frame_index(), 1);
        assert_eq!(snap.phase, SessionPhase::Rendering);
        assert_eq!(log.lock().built, vec![SPIN]);
    }

    #[test]
    fn failed_build_keeps_previous_program() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let mut s = session(backend);
        log.lock().fail_next_build = true;

        assert!(matches!(
            s.change_animation(SWEEP),
            Err(BridgeError::Encode(_))
        ));
        s.frame().unwrap();
        let log = log.lock();
        assert_eq!(log.encoded.last().unwrap().animation, SPIN);
        assert!(log.dropped.is_empty());
    }

    #[test]
    fn old_program_released_after_next_submit() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let mut s = session(backend);
        s.frame().unwrap();
        s.change_animation(SWEEP).unwrap();
        assert!(log.lock().dropped.is_empty());

        s.frame().unwrap();
        let log = log.lock();
        assert_eq!(log.dropped, vec![1]);
        assert_eq!(log.submitted, 2);
    }

    // ── destroy ────────────────────────────────────────────────────────────

    #[test]
    fn destroy_releases_and_invalidates() {
        let backend = MockBackend::new(64, 64);
        let log = backend.log();
        let mut s = session(backend);
        s.destroy().unwrap();

        assert_eq!(s.phase(), SessionPhase::Destroyed);
        assert!(log.lock().backend_dropped);
        assert!(matches!(s.destroy(), Err(BridgeError::InvalidHandle(_))));
        assert!(matches!(s.frame(), Err(BridgeError::InvalidHandle(_))));
        assert!(matches!(
            s.resize(SurfaceSize::new(1, 1)),
            Err(BridgeError::InvalidHandle(_))
        ));
        assert!(matches!(
            s.change_animation(SWEEP),
            Err(BridgeError::InvalidHandle(_))
        ));
    }

    #[test]
    fn encode_error_is_reported_and_state_kept() {
        let mut s = session(MockBackend::new(64, 64));
        s.frame().unwrap();
        s.change_animation(BROKEN).unwrap();
        assert!(matches!(s.frame(), Err(BridgeError::Encode(_))));
        let snap = s.snapshot().unwrap();
        assert_eq!(snap.state.frame_index(), 0);
        assert_eq!(snap.phase, SessionPhase::Bound);
    }
}
