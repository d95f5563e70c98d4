use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{
    AcceptancePredicate, BackendFactory, BatchOutput, BatchRequest, Candidate, Completion,
    ComputeBackend, ComputeError, JobConfig, JobEvent, JobTotals, LeadingZeroBits, LineSink,
};
use crate::error::Result;
use crate::time::BatchClock;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Where a job is in its life.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum JobPhase {
    Running = 0,
    Cancelled = 1,
    /// The nonce range was fully searched.
    Exhausted = 2,
    /// A terminal error line was emitted.
    Failed = 3,
}

impl JobPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Cancelled,
            2 => Self::Exhausted,
            _ => Self::Failed,
        }
    }

    pub fn is_finished(self) -> bool {
        self != Self::Running
    }
}

/// What a job searches for.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub config: JobConfig,
    pub predicate: Arc<dyn AcceptancePredicate>,
}

impl JobSpec {
    /// Accepts digests with at least `config.difficulty` leading zero bits.
    pub fn new(config: JobConfig) -> Self {
        let predicate = Arc::new(LeadingZeroBits(config.difficulty));
        Self { config, predicate }
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn AcceptancePredicate>) -> Self {
        self.predicate = predicate;
        self
    }
}

#[derive(Default)]
struct Shared {
    cancel: AtomicBool,
    phase: AtomicU8,
}

/// A compute search running on its own worker thread.
///
/// Dropping the job requests cancellation; the worker finishes its in-flight
/// batch, emits its completion line and exits on its own.
pub struct Job {
    id: u64,
    shared: Arc<Shared>,
    /// Disconnected once the worker has exited.
    exited: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Job {
    /// Validates `spec` and starts the worker. Returns immediately.
    pub fn spawn(
        spec: JobSpec,
        sink: Arc<dyn LineSink>,
        factory: BackendFactory,
        max_batch_retries: u32,
    ) -> Result<Self> {
        spec.config.validate()?;

        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared::default());
        let (exit_tx, exited) = crossbeam_channel::bounded(0);

        let worker = Worker {
            id,
            spec,
            sink,
            shared: Arc::clone(&shared),
            max_batch_retries,
            terminal_sent: Cell::new(false),
            _exit: exit_tx,
        };

        let handle = thread::Builder::new()
            .name(format!("wgpu-bridge-job-{id}"))
            .spawn(move || worker.run(factory))?;

        log::info!("job {id}: worker started");
        Ok(Self {
            id,
            shared,
            exited,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.shared.phase.load(Ordering::Acquire))
    }

    /// Requests cancellation. The worker checks between batches.
    pub fn cancel(&self) {
        if !self.shared.cancel.swap(true, Ordering::AcqRel) {
            log::info!("job {}: cancel requested", self.id);
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for the worker to exit. Returns whether it did.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.worker.lock().take() {
                    // Panics were already caught and reported inside the worker.
                    let _ = handle.join();
                }
                true
            }
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Worker {
    id: u64,
    spec: JobSpec,
    sink: Arc<dyn LineSink>,
    shared: Arc<Shared>,
    max_batch_retries: u32,
    /// Set once a `completed:` or `error:` line has gone to the sink.
    terminal_sent: Cell<bool>,
    /// Dropped with the worker, which disconnects `Job::exited`.
    _exit: Sender<()>,
}

impl Worker {
    fn run(self, factory: BackendFactory) {
        let phase = match panic::catch_unwind(AssertUnwindSafe(|| self.search(factory))) {
            Ok(phase) => phase,
            Err(_) => {
                log::error!("job {}: worker panicked", self.id);
                if !self.terminal_sent.get() {
                    let failed = JobEvent::Failed {
                        message: "worker panicked".into(),
                    };
                    // The sink may be what panicked in the first place.
                    if panic::catch_unwind(AssertUnwindSafe(|| self.emit(failed))).is_err() {
                        log::error!("job {}: sink panicked reporting the failure", self.id);
                    }
                }
                JobPhase::Failed
            }
        };
        self.shared.phase.store(phase as u8, Ordering::Release);
        log::info!("job {}: worker exited ({phase:?})", self.id);
    }

    fn search(&self, factory: BackendFactory) -> JobPhase {
        let config = &self.spec.config;
        let predicate = &self.spec.predicate;

        self.emit(JobEvent::Started {
            config: config.clone(),
            predicate: predicate.describe(),
        });

        let mut backend = match factory(config) {
            Ok(backend) => backend,
            Err(err) => return self.fail(err),
        };

        let span = config.batch_span();
        let range = config.nonce_range;
        let mut clock = BatchClock::new();
        let mut totals = JobTotals::default();
        let mut base = range.start;

        loop {
            if self.cancelled() {
                return self.complete(Completion::Cancelled, totals);
            }
            let searched = range.clamp_span(base, span);
            if searched == 0 {
                return self.complete(Completion::RangeExhausted, totals);
            }

            let request = BatchRequest {
                base_nonce: base,
                prefilter_bits: predicate.prefilter_bits(),
            };
            let output = match self.run_batch(backend.as_mut(), &request) {
                Ok(Some(output)) => output,
                Ok(None) => return self.complete(Completion::Cancelled, totals),
                Err(err) => return self.fail(err),
            };

            let time = clock.tick();
            totals.batches += 1;
            totals.hashes += searched;

            let accepted = self.accepted(output.candidates, base, base + searched);
            self.emit(JobEvent::Batch {
                index: time.batch_index,
                base,
                elapsed: time.elapsed,
                hashes: totals.hashes,
                rate: time.rate(totals.hashes),
            });
            for candidate in accepted {
                totals.found += 1;
                self.emit(JobEvent::Found {
                    nonce: candidate.nonce,
                    digest: candidate.digest,
                });
            }
            if output.dropped > 0 {
                self.emit(JobEvent::Dropped {
                    index: time.batch_index,
                    count: output.dropped,
                });
            }

            base = match base.checked_add(span) {
                Some(next) => next,
                None => return self.complete(Completion::RangeExhausted, totals),
            };
        }
    }

    /// Runs one batch, retrying stalled readbacks. `Ok(None)` means the job was
    /// cancelled while retrying.
    fn run_batch(
        &self,
        backend: &mut dyn ComputeBackend,
        request: &BatchRequest,
    ) -> Result<Option<BatchOutput>, ComputeError> {
        let mut attempt = 0;
        loop {
            match backend.run_batch(request) {
                Ok(output) => return Ok(Some(output)),
                Err(err) if err.is_retryable() && attempt < self.max_batch_retries => {
                    attempt += 1;
                    log::warn!("job {}: batch at {:#x}: {err}", self.id, request.base_nonce);
                    self.emit(JobEvent::Retrying {
                        attempt,
                        reason: err.to_string(),
                    });
                    if self.cancelled() {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Candidates inside `[start, end)` that pass the predicate, by nonce.
    fn accepted(&self, candidates: Vec<Candidate>, start: u64, end: u64) -> Vec<Candidate> {
        let mut accepted: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.nonce >= start && c.nonce < end)
            .filter(|c| self.spec.predicate.accepts(&c.digest))
            .collect();
        accepted.sort_by_key(|c| c.nonce);
        accepted.dedup_by_key(|c| c.nonce);
        accepted
    }

    fn cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    fn complete(&self, reason: Completion, totals: JobTotals) -> JobPhase {
        self.emit(JobEvent::Completed { reason, totals });
        match reason {
            Completion::Cancelled => JobPhase::Cancelled,
            Completion::RangeExhausted => JobPhase::Exhausted,
        }
    }

    fn fail(&self, err: ComputeError) -> JobPhase {
        log::error!("job {}: {err}", self.id);
        self.emit(JobEvent::Failed {
            message: err.to_string(),
        });
        JobPhase::Failed
    }

    fn emit(&self, event: JobEvent) {
        if event.is_terminal() {
            self.terminal_sent.set(true);
        }
        let line = event.to_string();
        log::debug!("job {}: {line}", self.id);
        self.sink.on_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Instant;

    use super::*;
    use crate::job::{AtMostTarget, Digest, NonceRange};
    use crate::testing::{
        collecting_sink, mock_factory, unavailable_factory, MockCompute, MockHashes,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn(config: JobConfig, backend: MockCompute, retries: u32) -> (Job, Arc<Mutex<Vec<String>>>) {
        let (sink, lines) = collecting_sink();
        let job = Job::spawn(JobSpec::new(config), sink, mock_factory(backend), retries).unwrap();
        (job, lines)
    }

    fn found_nonces(lines: &[String]) -> Vec<u64> {
        lines
            .iter()
            .filter_map(|l| l.strip_prefix("found: nonce "))
            .filter_map(|rest| rest.split(' ').next()?.parse().ok())
            .collect()
    }

    #[test]
    fn reports_a_find_before_early_cancel() {
        let config = JobConfig::new(64, 4, 100, 8);
        let backend = MockCompute::new(&config, MockHashes::Zero).with_delay(Duration::from_millis(5));
        let (job, lines) = spawn(config, backend, 3);

        thread::sleep(Duration::from_millis(100));
        let found_before_cancel = found_nonces(&lines.lock()).len();
        job.cancel();
        assert!(job.wait(WAIT));

        assert!(found_before_cancel >= 1);
        assert_eq!(job.phase(), JobPhase::Cancelled);
        let lines = lines.lock();
        assert!(lines[0].starts_with("started:"));
        assert!(lines.last().unwrap().starts_with("completed: cancelled"));
    }

    #[test]
    fn no_lines_after_cancel_completes() {
        let config = JobConfig::new(8, 1, 1, 1);
        let backend = MockCompute::new(&config, MockHashes::Never).with_delay(Duration::from_millis(1));
        let (job, lines) = spawn(config, backend, 0);

        thread::sleep(Duration::from_millis(20));
        job.cancel();
        assert!(job.wait(WAIT));
        let count = lines.lock().len();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(lines.lock().len(), count);
        assert_eq!(
            lines.lock().iter().filter(|l| l.starts_with("completed:")).count(),
            1
        );
    }

    #[test]
    fn disjoint_ranges_never_share_a_nonce() {
        let config = JobConfig::new(10, 10, 1, 1);
        let a = config.clone().with_nonce_range(NonceRange::new(0, 1_000));
        let b = config.clone().with_nonce_range(NonceRange::new(1_000, 2_000));

        let (job_a, lines_a) = spawn(a.clone(), MockCompute::new(&a, MockHashes::EveryNth(7)), 0);
        let (job_b, lines_b) = spawn(b.clone(), MockCompute::new(&b, MockHashes::EveryNth(7)), 0);
        assert!(job_a.wait(WAIT));
        assert!(job_b.wait(WAIT));
        assert_eq!(job_a.phase(), JobPhase::Exhausted);
        assert_eq!(job_b.phase(), JobPhase::Exhausted);

        let found_a: HashSet<u64> = found_nonces(&lines_a.lock()).into_iter().collect();
        let found_b: HashSet<u64> = found_nonces(&lines_b.lock()).into_iter().collect();
        assert!(!found_a.is_empty() && !found_b.is_empty());
        assert!(found_a.is_disjoint(&found_b));
        assert!(found_a.iter().all(|n| *n < 1_000 && n % 7 == 0));
        assert!(found_b.iter().all(|n| (1_000..2_000).contains(n)));
    }

    #[test]
    fn found_lines_carry_real_sha256_digests() {
        let seed = [7u8; crate::job::SEED_LEN];
        let config = JobConfig::new(64, 4, 4, 8)
            .with_seed(seed)
            .with_nonce_range(NonceRange::new(0, 4_096));
        let (job, lines) = spawn(config.clone(), MockCompute::new(&config, MockHashes::Sha256), 0);
        assert!(job.wait(WAIT));
        assert_eq!(job.phase(), JobPhase::Exhausted);

        let expected: Vec<u64> = (0..4_096)
            .filter(|n| Digest::of_nonce(*n, &seed).leading_zero_bits() >= 8)
            .collect();
        assert_eq!(expected.len(), 17);
        assert_eq!(&expected[..3], &[252u64, 348, 519]);

        let lines = lines.lock();
        assert_eq!(found_nonces(&lines), expected);
        for line in lines.iter().filter(|l| l.starts_with("found:")) {
            let nonce = found_nonces(std::slice::from_ref(line))[0];
            let reported = line.rsplit(' ').next().unwrap();
            let digest = Digest::of_nonce(nonce, &seed);
            assert_eq!(reported, digest.to_hex());
            assert!(digest.leading_zero_bits() >= 8);
        }
        assert_eq!(
            lines.last().unwrap(),
            "completed: nonce range exhausted after 4 batches, 4,096 hashes, 17 found"
        );
    }

    #[test]
    fn range_end_clips_the_last_batch() {
        let config = JobConfig::new(10, 10, 1, 1).with_nonce_range(NonceRange::new(0, 250));
        let backend = MockCompute::new(&config, MockHashes::EveryNth(60));
        let bases = Arc::clone(&backend.bases);
        let (job, lines) = spawn(config, backend, 0);
        assert!(job.wait(WAIT));

        assert_eq!(*bases.lock(), vec![0, 100, 200]);
        let lines = lines.lock();
        // 270 is computed by the last batch but lies past the range end.
        assert_eq!(found_nonces(&lines), vec![0, 60, 120, 180, 240]);
        assert_eq!(
            lines.last().unwrap(),
            "completed: nonce range exhausted after 3 batches, 250 hashes, 5 found"
        );
    }

    #[test]
    fn overflowing_candidates_are_reported() {
        let config = JobConfig::new(8, 8, 1, 1).with_nonce_range(NonceRange::new(0, 64));
        let (job, lines) = spawn(config.clone(), MockCompute::new(&config, MockHashes::Zero), 0);
        assert!(job.wait(WAIT));

        let lines = lines.lock();
        assert_eq!(found_nonces(&lines).len(), 32);
        assert!(
            lines
                .iter()
                .any(|l| l == "batch: 0, 32 candidate(s) beyond readback capacity dropped")
        );
    }

    #[test]
    fn stalled_batches_are_retried() {
        let config = JobConfig::new(4, 1, 1, 1).with_nonce_range(NonceRange::new(0, 4));
        let backend = MockCompute::new(&config, MockHashes::Never)
            .with_failures(vec![ComputeError::Stalled, ComputeError::Stalled]);
        let (job, lines) = spawn(config, backend, 3);
        assert!(job.wait(WAIT));

        assert_eq!(job.phase(), JobPhase::Exhausted);
        let retries = lines.lock().iter().filter(|l| l.starts_with("retrying")).count();
        assert_eq!(retries, 2);
    }

    #[test]
    fn retry_budget_exhaustion_fails_the_job() {
        let config = JobConfig::new(4, 1, 1, 1);
        let backend = MockCompute::new(&config, MockHashes::Never)
            .with_failures(vec![ComputeError::Stalled, ComputeError::Stalled]);
        let (job, lines) = spawn(config, backend, 1);
        assert!(job.wait(WAIT));

        assert_eq!(job.phase(), JobPhase::Failed);
        assert_eq!(lines.lock().last().unwrap(), "error: readback stalled");
    }

    #[test]
    fn device_loss_is_a_terminal_error_line() {
        let config = JobConfig::new(4, 1, 1, 1);
        let backend = MockCompute::new(&config, MockHashes::Never)
            .with_failures(vec![ComputeError::DeviceLost("gone".into())]);
        let (job, lines) = spawn(config, backend, 5);
        assert!(job.wait(WAIT));

        assert_eq!(job.phase(), JobPhase::Failed);
        let lines = lines.lock();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "error: GPU device lost: gone");
    }

    #[test]
    fn missing_device_fails_after_start_line() {
        let (sink, lines) = collecting_sink();
        let job = Job::spawn(
            JobSpec::new(JobConfig::new(64, 4, 100, 8)),
            sink,
            unavailable_factory(),
            0,
        )
        .unwrap();
        assert!(job.wait(WAIT));
        assert_eq!(job.phase(), JobPhase::Failed);
        let lines = lines.lock();
        assert!(lines[0].starts_with("started:"));
        assert_eq!(lines[1], "error: compute device unavailable: no adapter");
    }

    #[test]
    fn invalid_config_is_rejected_synchronously() {
        let (sink, lines) = collecting_sink();
        let err = Job::spawn(
            JobSpec::new(JobConfig::new(64, 0, 100, 8)),
            sink,
            unavailable_factory(),
            0,
        )
        .err()
        .unwrap();
        assert!(matches!(err, crate::BridgeError::InvalidJobConfig(_)));
        assert!(lines.lock().is_empty());
    }

    #[test]
    fn custom_predicate_is_applied_on_the_cpu() {
        let config = JobConfig::new(10, 1, 1, 1).with_nonce_range(NonceRange::new(0, 10));
        let mut target = [0xffu8; 32];
        target[0] = 0x7f;
        let spec = JobSpec::new(config.clone()).with_predicate(Arc::new(AtMostTarget(Digest(target))));

        let (sink, lines) = collecting_sink();
        let backend = MockCompute::new(&config, MockHashes::EveryNth(2));
        let job = Job::spawn(spec, sink, mock_factory(backend), 0).unwrap();
        assert!(job.wait(WAIT));

        // 0xff.. digests exceed the target, zero digests do not.
        assert_eq!(found_nonces(&lines.lock()), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn panicking_sink_marks_the_job_failed() {
        let sink: Arc<dyn LineSink> = Arc::new(|line: &str| {
            if line.starts_with("started:") {
                panic!("host callback failed");
            }
        });
        let config = JobConfig::new(4, 1, 1, 1);
        let backend = MockCompute::new(&config, MockHashes::Never);
        let job = Job::spawn(JobSpec::new(config), sink, mock_factory(backend), 0).unwrap();
        assert!(job.wait(WAIT));
        assert_eq!(job.phase(), JobPhase::Failed);
    }

    struct CrashingCompute;

    impl ComputeBackend for CrashingCompute {
        fn run_batch(&mut self, _request: &BatchRequest) -> Result<BatchOutput, ComputeError> {
            panic!("driver crashed mid-batch");
        }
    }

    #[test]
    fn panicking_backend_still_ends_with_an_error_line() {
        let config = JobConfig::new(4, 1, 1, 1);
        let factory: BackendFactory =
            Box::new(|_config: &JobConfig| Ok(Box::new(CrashingCompute) as Box<dyn ComputeBackend>));
        let (sink, lines) = collecting_sink();
        let job = Job::spawn(JobSpec::new(config), sink, factory, 0).unwrap();
        assert!(job.wait(WAIT));
        assert_eq!(job.phase(), JobPhase::Failed);

        let lines = lines.lock();
        assert!(lines[0].starts_with("started:"));
        assert_eq!(lines.last().unwrap(), "error: worker panicked");
        let terminal = lines
            .iter()
            .filter(|l| l.starts_with("completed:") || l.starts_with("error:"))
            .count();
        assert_eq!(terminal, 1);
    }

    #[test]
    fn sink_panicking_on_the_last_line_gets_no_second_one() {
        let (collect, lines) = collecting_sink();
        let sink: Arc<dyn LineSink> = Arc::new(move |line: &str| {
            collect.on_line(line);
            if line.starts_with("completed:") {
                panic!("host callback failed");
            }
        });
        let config = JobConfig::new(4, 1, 1, 1).with_nonce_range(NonceRange::new(0, 4));
        let backend = MockCompute::new(&config, MockHashes::Never);
        let job = Job::spawn(JobSpec::new(config), sink, mock_factory(backend), 0).unwrap();
        assert!(job.wait(WAIT));

        assert_eq!(job.phase(), JobPhase::Failed);
        let lines = lines.lock();
        assert!(lines.last().unwrap().starts_with("completed: nonce range exhausted"));
        assert!(!lines.iter().any(|l| l.starts_with("error:")));
    }

    #[test]
    fn dropping_the_job_stops_the_worker() {
        let config = JobConfig::new(4, 1, 1, 1);
        let backend = MockCompute::new(&config, MockHashes::Never).with_delay(Duration::from_millis(1));
        let (job, lines) = spawn(config, backend, 0);
        let exited = job.exited.clone();
        drop(job);

        let start = Instant::now();
        assert!(matches!(
            exited.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));
        assert!(start.elapsed() < WAIT);
        assert!(lines.lock().last().unwrap().starts_with("completed: cancelled"));
    }
}
