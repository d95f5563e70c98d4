use std::sync::Arc;

use parking_lot::Mutex;

use super::GpuInit;
use crate::error::{BridgeError, Result};

/// Owns the wgpu core objects shared by one session or one compute job.
///
/// - creates and stores Instance/Adapter/Device/Queue
/// - tracks device loss so later calls fail with `DeviceLost` instead of
///   submitting into a dead device
/// - routes uncaptured validation errors to the log instead of panicking
pub struct GpuContext {
    /// wgpu instance used to create the adapter (and the surface, if any).
    instance: wgpu::Instance,

    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Set by the device-lost callback, read on every bridge call.
    lost: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    /// Creates the instance a surface and its device must share.
    pub fn create_instance(init: &GpuInit) -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.resolved_backends(),
            ..Default::default()
        })
    }

    /// Acquires an adapter and device, optionally compatible with `surface`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn request(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        init: &GpuInit,
        label: &str,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BridgeError::DeviceUnavailable(format!("no suitable adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| BridgeError::DeviceUnavailable(format!("device request failed: {e}")))?;

        let info = adapter.get_info();
        log::info!(
            "{label}: using adapter \"{}\" ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let lost = Arc::new(Mutex::new(None));
        {
            let lost = Arc::clone(&lost);
            let label = label.to_owned();
            device.set_device_lost_callback(move |reason, message| {
                // `Destroyed` is the normal drop path.
                if matches!(reason, wgpu::DeviceLostReason::Destroyed) {
                    log::debug!("{label}: device destroyed");
                } else {
                    log::error!("{label}: device lost ({reason:?}): {message}");
                }
                lost.lock().get_or_insert(message);
            });
        }
        device.on_uncaptured_error(Arc::new(|error| {
            log::error!("uncaptured wgpu error: {error}");
        }));

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            lost,
        })
    }

    /// Blocking headless acquisition for worker threads.
    pub fn headless(init: &GpuInit, label: &str) -> Result<Self> {
        let instance = Self::create_instance(init);
        pollster::block_on(Self::request(instance, None, init, label))
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Message of the device-lost callback, once it has fired.
    pub fn lost_reason(&self) -> Option<String> {
        self.lost.lock().clone()
    }

    /// Fails with `DeviceLost` once the device-lost callback has fired.
    pub fn check_alive(&self) -> Result<()> {
        match self.lost_reason() {
            Some(message) => Err(BridgeError::DeviceLost(message)),
            None => Ok(()),
        }
    }

    /// Runs `f` inside a validation error scope and returns the captured error.
    pub fn validation_scope<R>(&self, f: impl FnOnce() -> R) -> (R, Option<wgpu::Error>) {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = pollster::block_on(scope.pop());
        (value, error)
    }
}
