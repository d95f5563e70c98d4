use anyhow::{Context, Result};
use clap::Parser;
use winit::dpi::LogicalSize;

use wgpu_bridge::animation::{AnimationId, ROTATING_TRIANGLE};
use wgpu_bridge::job::JobConfig;

/// Window and workload settings for the desktop host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub animation: AnimationId,
    /// Started and stopped with `J`.
    pub job: JobConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            title: "wgpu bridge".to_string(),
            initial_size: LogicalSize::new(960.0, 640.0),
            animation: ROTATING_TRIANGLE,
            job: JobConfig::new(64, 64, 256, 24),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "wgpu-bridge-host",
    version,
    about = "Drives wgpu bridge sessions and compute jobs from a desktop window"
)]
pub struct HostArgs {
    /// Animation shown when the window opens (Space cycles).
    #[arg(long, value_name = "ID", default_value_t = ROTATING_TRIANGLE.0)]
    pub animation: u32,

    /// Leading zero bits a digest needs to be reported.
    #[arg(long, value_name = "BITS", default_value_t = 24)]
    pub difficulty: u32,

    #[arg(long, value_name = "N", default_value_t = 64)]
    pub workgroup_size: u32,

    /// Workgroups per dispatch.
    #[arg(long = "dispatch", value_name = "N", default_value_t = 64)]
    pub dispatch_count: u32,

    /// Consecutive nonces hashed by each invocation.
    #[arg(long, value_name = "N", default_value_t = 256)]
    pub iterations: u32,
}

impl HostArgs {
    pub fn into_config(self) -> Result<HostConfig> {
        let job = JobConfig::new(
            self.workgroup_size,
            self.dispatch_count,
            self.iterations,
            self.difficulty,
        );
        job.validate().context("invalid compute job settings")?;
        Ok(HostConfig {
            animation: AnimationId(self.animation),
            job,
            ..HostConfig::default()
        })
    }
}
