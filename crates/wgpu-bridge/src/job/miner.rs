use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use crossbeam_channel::TryRecvError;

use super::digest::seed_words;
use super::{
    BackendFactory, BatchOutput, BatchRequest, Candidate, ComputeBackend, ComputeError, Digest,
    JobConfig, SEED_LEN,
};
use crate::device::{GpuContext, GpuInit};

/// Candidate slots in the results buffer.
pub const MAX_CANDIDATES: usize = 32;

const HEADER_WORDS: usize = 4;
const SLOT_WORDS: usize = 10;
const RESULTS_SIZE: u64 = ((HEADER_WORDS + MAX_CANDIDATES * SLOT_WORDS) * 4) as u64;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MinerParams {
    base_lo: u32,
    base_hi: u32,
    prefilter_bits: u32,
    _pad: u32,
    /// Six seed words, padded to two `vec4<u32>`.
    seed: [u32; 8],
}

impl MinerParams {
    fn new(request: &BatchRequest, seed: &[u32; 6]) -> Self {
        let mut padded = [0u32; 8];
        padded[..6].copy_from_slice(seed);
        Self {
            base_lo: request.base_nonce as u32,
            base_hi: (request.base_nonce >> 32) as u32,
            prefilter_bits: request.prefilter_bits,
            _pad: 0,
            seed: padded,
        }
    }
}

/// SHA-256 nonce search on a headless wgpu device.
///
/// One `run_batch` is one dispatch of `workgroup_size * dispatch_count`
/// invocations, each hashing `iterations` consecutive nonces.
pub struct WgpuMiner {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    params: wgpu::Buffer,
    results: wgpu::Buffer,
    readback: wgpu::Buffer,
    dispatch_count: u32,
    seed: [u32; 6],
    seed_bytes: [u8; SEED_LEN],
    poll_timeout: Duration,
    gpu: GpuContext,
}

impl WgpuMiner {
    pub fn new(config: &JobConfig, init: &GpuInit) -> Result<Self, ComputeError> {
        let gpu = GpuContext::headless(init, "wgpu-bridge miner device")
            .map_err(|e| ComputeError::Unavailable(e.to_string()))?;
        let device = gpu.device();

        let (pipeline, error) = gpu.validation_scope(|| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("sha256 miner shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sha256_miner.wgsl").into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("sha256 miner pipeline"),
                layout: None,
                module: &shader,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &[
                        ("WORKGROUP_SIZE", config.workgroup_size as f64),
                        ("ITERATIONS", config.iterations as f64),
                    ],
                    zero_initialize_workgroup_memory: false,
                },
                cache: None,
            })
        });
        if let Some(err) = error {
            return Err(ComputeError::Unavailable(format!(
                "miner pipeline rejected: {err}"
            )));
        }

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("miner params ubo"),
            size: std::mem::size_of::<MinerParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let results = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("miner results"),
            size: RESULTS_SIZE,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("miner readback"),
            size: RESULTS_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("miner bind group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: results.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            pipeline,
            bind_group,
            params,
            results,
            readback,
            dispatch_count: config.dispatch_count,
            seed: seed_words(&config.seed),
            seed_bytes: config.seed,
            poll_timeout: init.poll_timeout,
            gpu,
        })
    }

    /// Factory building the miner on the job's worker thread.
    pub fn factory(init: GpuInit) -> BackendFactory {
        Box::new(move |config: &JobConfig| {
            let miner = WgpuMiner::new(config, &init)?;
            Ok(Box::new(miner) as Box<dyn ComputeBackend>)
        })
    }

    fn submit(&self, request: &BatchRequest) {
        let params = MinerParams::new(request, &self.seed);
        self.gpu
            .queue()
            .write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("miner batch encoder"),
            });
        encoder.clear_buffer(&self.results, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("miner pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(self.dispatch_count, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&self.results, 0, &self.readback, 0, RESULTS_SIZE);
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
    }

    fn read(&self) -> Result<BatchOutput, ComputeError> {
        let slice = self.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        if let Err(err) = self.gpu.device().poll(wgpu::wgt::PollType::Wait {
            submission_index: None,
            timeout: Some(self.poll_timeout),
        }) {
            log::debug!("miner poll: {err}");
        }
        if let Some(reason) = self.gpu.lost_reason() {
            return Err(ComputeError::DeviceLost(reason));
        }

        match rx.try_recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(ComputeError::Readback(err.to_string())),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                // Abort the pending map so the buffer can be mapped again.
                self.readback.unmap();
                return Err(ComputeError::Stalled);
            }
        }

        let words: Vec<u32> = {
            let data = slice.get_mapped_range();
            bytemuck::pod_collect_to_vec::<u8, u32>(&data[..])
        };
        self.readback.unmap();
        Ok(parse_results(&words))
    }
}

impl ComputeBackend for WgpuMiner {
    fn run_batch(&mut self, request: &BatchRequest) -> Result<BatchOutput, ComputeError> {
        self.submit(request);
        let output = self.read()?;
        verify_candidates(&output.candidates, &self.seed_bytes)?;
        Ok(output)
    }
}

/// Rehashes every candidate on the CPU; a mismatch means the shader or the
/// readback is broken and no result of this batch can be trusted.
fn verify_candidates(candidates: &[Candidate], seed: &[u8; SEED_LEN]) -> Result<(), ComputeError> {
    for candidate in candidates {
        let expected = Digest::of_nonce(candidate.nonce, seed);
        if candidate.digest != expected {
            return Err(ComputeError::Readback(format!(
                "digest mismatch for nonce {}: gpu {}, cpu {}",
                candidate.nonce, candidate.digest, expected
            )));
        }
    }
    Ok(())
}

/// Decodes the results buffer: `count`, three padding words, then slots of
/// `nonce_lo, nonce_hi, digest[8]`.
fn parse_results(words: &[u32]) -> BatchOutput {
    let Some(&count) = words.first() else {
        return BatchOutput::default();
    };
    let stored = (count as usize).min(MAX_CANDIDATES);

    let candidates: Vec<Candidate> = words[HEADER_WORDS.min(words.len())..]
        .chunks_exact(SLOT_WORDS)
        .take(stored)
        .map(|slot| Candidate {
            nonce: ((slot[1] as u64) << 32) | slot[0] as u64,
            digest: Digest::from_words(std::array::from_fn(|k| slot[2 + k])),
        })
        .collect();

    BatchOutput {
        dropped: count.saturating_sub(candidates.len() as u32),
        candidates,
    }
}
