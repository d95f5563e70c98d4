//! In-memory backends for exercising sessions, jobs and the bridge without a GPU.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::animation::{AnimationDescriptor, AnimationId, AnimationRegistry, AnimationState};
use crate::device::SurfaceSize;
use crate::error::{BridgeError, Result};
use crate::job::{
    BackendFactory, BatchOutput, BatchRequest, Candidate, ComputeBackend, ComputeError, Digest,
    JobConfig, SEED_LEN,
};
use crate::session::SessionBackend;

pub(crate) const SPIN: AnimationId = AnimationId(0);
pub(crate) const SWEEP: AnimationId = AnimationId(1);
/// Builds fine, fails every encode.
pub(crate) const BROKEN: AnimationId = AnimationId(2);

/// One frame as seen by the mock GPU.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct EncodedFrame {
    pub animation: AnimationId,
    /// Serial of the program that encoded the frame.
    pub program: u32,
    pub frame_index: u64,
    pub elapsed: f32,
}

/// Everything the mock backend observed, shared with the test.
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub built: Vec<AnimationId>,
    pub encoded: Vec<EncodedFrame>,
    pub submitted: u64,
    pub resizes: Vec<SurfaceSize>,
    /// Serials of dropped programs.
    pub dropped: Vec<u32>,
    pub backend_dropped: bool,
    next_serial: u32,

    // Fault injection.
    pub device_lost: bool,
    pub surface_lost: bool,
    pub fail_next_build: bool,
    /// Validation error surfacing when the next frame's commands are finished.
    pub fail_next_submit: bool,
}

pub(crate) type SharedLog = Arc<Mutex<MockLog>>;

pub(crate) struct MockBackend {
    size: SurfaceSize,
    log: SharedLog,
}

impl MockBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            log: SharedLog::default(),
        }
    }

    pub fn log(&self) -> SharedLog {
        Arc::clone(&self.log)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.log.lock().backend_dropped = true;
    }
}

pub(crate) struct MockProgram {
    animation: AnimationId,
    serial: u32,
    log: SharedLog,
}

impl Drop for MockProgram {
    fn drop(&mut self) {
        self.log.lock().dropped.push(self.serial);
    }
}

#[derive(Default)]
pub(crate) struct MockFrame {
    encoded: Option<EncodedFrame>,
}

impl SessionBackend for MockBackend {
    type Program = MockProgram;
    type Frame = MockFrame;

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) -> Result<bool> {
        if size == self.size {
            return Ok(false);
        }
        self.size = size;
        self.log.lock().resizes.push(size);
        Ok(true)
    }

    fn check_device(&self) -> Result<()> {
        if self.log.lock().device_lost {
            return Err(BridgeError::DeviceLost("mock device lost".into()));
        }
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<Option<MockFrame>> {
        if self.log.lock().surface_lost {
            return Err(BridgeError::SurfaceLost);
        }
        if self.size.is_empty() {
            return Ok(None);
        }
        Ok(Some(MockFrame::default()))
    }

    fn submit(&mut self, frame: MockFrame) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_next_submit {
            log.fail_next_submit = false;
            return Err(BridgeError::Encode("mock bind group mismatch".into()));
        }
        log.submitted += 1;
        if let Some(encoded) = frame.encoded {
            log.encoded.push(encoded);
        }
        Ok(())
    }
}

fn build_mock<const ID: u32>(backend: &MockBackend) -> Result<MockProgram> {
    let mut log = backend.log.lock();
    if log.fail_next_build {
        log.fail_next_build = false;
        return Err(BridgeError::Encode("mock build failure".into()));
    }
    log.next_serial += 1;
    log.built.push(AnimationId(ID));
    Ok(MockProgram {
        animation: AnimationId(ID),
        serial: log.next_serial,
        log: backend.log(),
    })
}

fn encode_mock(
    _backend: &MockBackend,
    program: &mut MockProgram,
    state: &AnimationState,
    frame: &mut MockFrame,
) -> Result<()> {
    frame.encoded = Some(EncodedFrame {
        animation: program.animation,
        program: program.serial,
        frame_index: state.frame_index(),
        elapsed: state.elapsed(),
    });
    Ok(())
}

fn encode_broken(
    _backend: &MockBackend,
    _program: &mut MockProgram,
    _state: &AnimationState,
    _frame: &mut MockFrame,
) -> Result<()> {
    Err(BridgeError::Encode("mock pipeline mismatch".into()))
}

/// Three animations with steps that are exact in binary floating point.
pub(crate) fn mock_registry() -> AnimationRegistry<MockBackend> {
    AnimationRegistry::new()
        .with(AnimationDescriptor {
            id: SPIN,
            name: "mock-spin",
            step: 0.25,
            build: build_mock::<0>,
            encode: encode_mock,
        })
        .with(AnimationDescriptor {
            id: SWEEP,
            name: "mock-sweep",
            step: 0.5,
            build: build_mock::<1>,
            encode: encode_mock,
        })
        .with(AnimationDescriptor {
            id: BROKEN,
            name: "mock-broken",
            step: 1.0,
            build: build_mock::<2>,
            encode: encode_broken,
        })
}

// ── compute ────────────────────────────────────────────────────────────────

/// How the mock compute backend answers batches.
#[derive(Debug, Clone)]
pub(crate) enum MockHashes {
    /// Every nonce hashes to the all-zero digest.
    Zero,
    /// Every nonce hashes to the all-`0xff` digest.
    Never,
    /// Nonces divisible by `n` hash to zero, others to `0xff`.
    EveryNth(u64),
    /// Real SHA-256 of each nonce's message under the job seed.
    Sha256,
}

/// Deterministic stand-in for the GPU miner.
///
/// Reports at most `capacity` candidates per batch, like the real readback
/// buffer, and sleeps `delay` per batch so cancellation timing can be tested.
pub(crate) struct MockCompute {
    span: u64,
    seed: [u8; SEED_LEN],
    hashes: MockHashes,
    capacity: usize,
    delay: std::time::Duration,
    /// Scripted failures returned before any real batch.
    script: Vec<ComputeError>,
    /// Base nonces of every batch run, shared with the test.
    pub bases: Arc<Mutex<Vec<u64>>>,
}

impl MockCompute {
    pub fn new(config: &JobConfig, hashes: MockHashes) -> Self {
        Self {
            span: config.batch_span(),
            seed: config.seed,
            hashes,
            capacity: 32,
            delay: std::time::Duration::ZERO,
            script: Vec::new(),
            bases: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failures(mut self, mut failures: Vec<ComputeError>) -> Self {
        failures.reverse();
        self.script = failures;
        self
    }

    fn digest_for(&self, nonce: u64) -> Digest {
        let zero = match self.hashes {
            MockHashes::Zero => true,
            MockHashes::Never => false,
            MockHashes::EveryNth(n) => nonce % n == 0,
            MockHashes::Sha256 => return Digest::of_nonce(nonce, &self.seed),
        };
        Digest(if zero { [0; 32] } else { [0xff; 32] })
    }
}

impl ComputeBackend for MockCompute {
    fn run_batch(&mut self, request: &BatchRequest) -> Result<BatchOutput, ComputeError> {
        if let Some(failure) = self.script.pop() {
            return Err(failure);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.bases.lock().push(request.base_nonce);

        let mut output = BatchOutput::default();
        for offset in 0..self.span {
            let Some(nonce) = request.base_nonce.checked_add(offset) else {
                break;
            };
            let digest = self.digest_for(nonce);
            if digest.leading_zero_bits() < request.prefilter_bits {
                continue;
            }
            if output.candidates.len() < self.capacity {
                output.candidates.push(Candidate { nonce, digest });
            } else {
                output.dropped += 1;
            }
        }
        Ok(output)
    }
}

/// Factory handing a pre-built mock to the job worker.
pub(crate) fn mock_factory(backend: MockCompute) -> BackendFactory {
    Box::new(move |_config: &JobConfig| Ok(Box::new(backend) as Box<dyn ComputeBackend>))
}

/// Factory that fails like a machine without a GPU.
pub(crate) fn unavailable_factory() -> BackendFactory {
    Box::new(|_config: &JobConfig| Err(ComputeError::Unavailable("no adapter".into())))
}

/// Line sink collecting into a shared vector.
pub(crate) fn collecting_sink() -> (Arc<dyn crate::job::LineSink>, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let sink: Arc<dyn crate::job::LineSink> =
        Arc::new(move |line: &str| sink_lines.lock().push(line.to_owned()));
    (sink, lines)
}
