use super::{Session, SessionBackend, SessionPhase};
use crate::error::Result;

/// Outcome of a successful `frame` call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameStatus {
    /// A frame was encoded, submitted and presented.
    Presented,
    /// Nothing was drawn (zero-sized or transiently unavailable surface).
    Skipped,
}

impl<B: SessionBackend> Session<B> {
    /// Renders exactly one frame of the active animation.
    ///
    /// Animation state advances only when the frame is actually submitted, so a
    /// skipped or failed frame leaves it untouched.
    pub fn frame(&mut self) -> Result<FrameStatus> {
        let handle = self.handle();
        let live = self.live_mut()?;
        live.backend.check_device()?;

        let Some(mut frame) = live.backend.begin_frame()? else {
            log::trace!("session {handle}: frame skipped");
            return Ok(FrameStatus::Skipped);
        };

        let next = live.state.advanced();
        let encode = live.animation.encode;
        let program = &mut live.program;
        live.backend
            .guarded(|backend| encode(backend, program, &next, &mut frame))?;
        live.backend.submit(frame)?;

        live.state = next;
        live.phase = SessionPhase::Rendering;
        if !live.retired.is_empty() {
            log::debug!(
                "session {handle}: releasing {} retired program(s)",
                live.retired.len()
            );
            live.retired.clear();
        }

        Ok(FrameStatus::Presented)
    }
}
