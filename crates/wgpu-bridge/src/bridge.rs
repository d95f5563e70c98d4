//! Handle-based facade a host drives the bridge through.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::animation::{AnimationId, AnimationRegistry};
use crate::device::{GpuInit, SurfaceSize, SurfaceSource};
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleTable};
use crate::job::{BackendFactory, Job, JobConfig, JobPhase, JobSpec, LineSink, WgpuMiner};
use crate::session::{FrameStatus, Session, SessionBackend, SessionSnapshot, WgpuBackend};

/// Bridge-wide settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Used for every session device and every compute device.
    pub gpu: GpuInit,
    /// Times a stalled batch readback is retried before the job fails.
    pub max_batch_retries: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            gpu: GpuInit::default(),
            max_batch_retries: 3,
        }
    }
}

enum Resource<B: SessionBackend> {
    Session(Arc<Mutex<Session<B>>>),
    Job(Arc<Job>),
}

impl<B: SessionBackend> Clone for Resource<B> {
    fn clone(&self) -> Self {
        match self {
            Self::Session(s) => Self::Session(Arc::clone(s)),
            Self::Job(j) => Self::Job(Arc::clone(j)),
        }
    }
}

/// Owns every live session and job, addressed by [`Handle`].
///
/// All methods take `&self` and may be called from any thread. Calls on one
/// session are serialized; calls on different sessions and jobs run in parallel.
pub struct Bridge<B: SessionBackend = WgpuBackend> {
    config: BridgeConfig,
    registry: Arc<AnimationRegistry<B>>,
    handles: HandleTable<Resource<B>>,
}

impl Bridge<WgpuBackend> {
    /// Bridge with the built-in animations.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_registry(config, AnimationRegistry::builtin())
    }

    /// createSession: binds a device to `source` and starts `animation` in `Bound`.
    pub fn create_session(&self, source: SurfaceSource, animation: AnimationId) -> Result<Handle> {
        // Reject unknown ids before touching the GPU.
        self.registry.get(animation)?;
        let backend = WgpuBackend::new(source, &self.config.gpu)?;
        self.adopt_session(backend, animation)
    }

    /// startComputeJob with the GPU miner and the default predicate.
    pub fn start_compute_job(&self, config: JobConfig, sink: Arc<dyn LineSink>) -> Result<Handle> {
        let factory = WgpuMiner::factory(self.config.gpu.clone());
        self.start_compute_job_with(JobSpec::new(config), sink, factory)
    }
}

impl Default for Bridge<WgpuBackend> {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl<B: SessionBackend> Bridge<B> {
    pub fn with_registry(config: BridgeConfig, registry: AnimationRegistry<B>) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            handles: HandleTable::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &AnimationRegistry<B> {
        &self.registry
    }

    /// Registers a session over an already-initialized backend.
    pub fn adopt_session(&self, backend: B, animation: AnimationId) -> Result<Handle> {
        let session = Session::create(backend, Arc::clone(&self.registry), animation)?;
        let handle = self.handles.insert_with(|handle| {
            Resource::Session(Arc::new(Mutex::new(session.with_handle(handle))))
        });
        log::info!("session {handle} created");
        Ok(handle)
    }

    /// resizeSession
    pub fn resize_session(&self, handle: Handle, width: u32, height: u32) -> Result<()> {
        self.with_session(handle, |s| s.resize(SurfaceSize::new(width, height)))
    }

    /// frame: renders exactly one frame of the active animation.
    pub fn frame(&self, handle: Handle) -> Result<FrameStatus> {
        self.with_session(handle, Session::frame)
    }

    /// changeAnimation: the handle stays valid and unchanged.
    pub fn change_animation(&self, handle: Handle, animation: AnimationId) -> Result<Handle> {
        self.with_session(handle, |s| s.change_animation(animation))?;
        Ok(handle)
    }

    pub fn session_snapshot(&self, handle: Handle) -> Result<SessionSnapshot> {
        self.with_session(handle, |s| s.snapshot())
    }

    /// destroySession: the only release path. Waits for an in-flight frame on
    /// the same session to finish.
    pub fn destroy_session(&self, handle: Handle) -> Result<()> {
        let Some(Resource::Session(session)) = self
            .handles
            .remove_if(handle, |r| matches!(r, Resource::Session(_)))
        else {
            return Err(BridgeError::InvalidHandle(handle.as_raw()));
        };
        session.lock().destroy()
    }

    /// Starts a job with an explicit predicate and compute backend.
    pub fn start_compute_job_with(
        &self,
        spec: JobSpec,
        sink: Arc<dyn LineSink>,
        factory: BackendFactory,
    ) -> Result<Handle> {
        let job = Job::spawn(spec, sink, factory, self.config.max_batch_retries)?;
        let id = job.id();
        let handle = self.handles.insert(Resource::Job(Arc::new(job)));
        log::info!("job {id} registered as {handle}");
        Ok(handle)
    }

    /// cancelComputeJob: requests cancellation and reclaims the handle. Valid
    /// after the job ended on its own, including after an error.
    pub fn cancel_compute_job(&self, handle: Handle) -> Result<()> {
        self.take_job(handle)?.cancel();
        Ok(())
    }

    /// Like [`cancel_compute_job`](Self::cancel_compute_job), then waits up to
    /// `timeout` for the worker to exit. Returns whether it did.
    pub fn cancel_compute_job_and_wait(&self, handle: Handle, timeout: Duration) -> Result<bool> {
        let job = self.take_job(handle)?;
        job.cancel();
        Ok(job.wait(timeout))
    }

    pub fn job_phase(&self, handle: Handle) -> Result<JobPhase> {
        match self.handles.get(handle) {
            Some(Resource::Job(job)) => Ok(job.phase()),
            _ => Err(BridgeError::InvalidHandle(handle.as_raw())),
        }
    }

    /// Number of live sessions and jobs.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Destroys every session and cancels every job.
    pub fn shutdown(&self) {
        let drained = self.handles.drain();
        if drained.is_empty() {
            return;
        }
        log::info!("bridge shutdown: releasing {} handle(s)", drained.len());
        for (handle, resource) in drained {
            match resource {
                Resource::Session(session) => {
                    if let Err(err) = session.lock().destroy() {
                        log::warn!("session {handle}: {err}");
                    }
                }
                Resource::Job(job) => job.cancel(),
            }
        }
    }

    fn with_session<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut Session<B>) -> Result<R>,
    ) -> Result<R> {
        let Some(Resource::Session(session)) = self.handles.get(handle) else {
            return Err(BridgeError::InvalidHandle(handle.as_raw()));
        };
        let mut session = session.lock();
        // Lost a race with destroy_session.
        if session.is_destroyed() {
            return Err(BridgeError::InvalidHandle(handle.as_raw()));
        }
        f(&mut *session)
    }

    fn take_job(&self, handle: Handle) -> Result<Arc<Job>> {
        match self
            .handles
            .remove_if(handle, |r| matches!(r, Resource::Job(_)))
        {
            Some(Resource::Job(job)) => Ok(job),
            _ => Err(BridgeError::InvalidHandle(handle.as_raw())),
        }
    }
}

impl<B: SessionBackend> Drop for Bridge<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
