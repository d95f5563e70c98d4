use crate::device::SurfaceSize;
use crate::error::Result;

/// The GPU side of a session.
///
/// Owns the device and the configured surface. The frame driver only talks to
/// the GPU through this trait, so the session state machine can be exercised
/// without a GPU.
pub trait SessionBackend: Send + 'static {
    /// Per-animation GPU objects (pipelines, buffers, bind groups).
    type Program: Send;

    /// One acquired frame being encoded.
    type Frame;

    /// Current surface size in physical pixels.
    fn size(&self) -> SurfaceSize;

    /// Reconfigures the surface. Returns `false` when the size did not change.
    fn resize(&mut self, size: SurfaceSize) -> Result<bool>;

    /// Fails with `DeviceLost` once the device is gone.
    fn check_device(&self) -> Result<()>;

    /// Acquires the next frame, or `None` when this frame should be skipped.
    fn begin_frame(&mut self) -> Result<Option<Self::Frame>>;

    /// Finishes, submits and presents the encoded frame.
    ///
    /// Pass and encoder validation errors that wgpu defers until the command
    /// buffer is finished come back as `Encode`; nothing is presented then.
    fn submit(&mut self, frame: Self::Frame) -> Result<()>;

    /// Runs `f` so that GPU validation errors it raises come back as `Err`
    /// instead of reaching the device's uncaptured-error handler.
    fn guarded<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        f(self)
    }
}
