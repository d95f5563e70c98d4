use super::SessionBackend;
use crate::animation::{OrbitProgram, TriangleProgram};
use crate::device::{GpuContext, GpuFrame, GpuInit, SurfaceBinding, SurfaceSize, SurfaceSource};
use crate::error::{BridgeError, Result};

/// Session backend rendering into a real surface through wgpu.
pub struct WgpuBackend {
    // Surface before device: the surface must not outlive its instance.
    surface: SurfaceBinding,
    gpu: GpuContext,
}

/// Programs of the built-in animations.
pub enum WgpuProgram {
    Triangle(TriangleProgram),
    Orbit(OrbitProgram),
}

impl WgpuProgram {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Triangle(_) => "triangle",
            Self::Orbit(_) => "orbit",
        }
    }
}

impl WgpuBackend {
    /// Creates the surface, picks a compatible adapter and configures the
    /// surface for presentation.
    pub fn new(source: SurfaceSource, init: &GpuInit) -> Result<Self> {
        let instance = GpuContext::create_instance(init);
        let (surface, size) = source.create_surface(&instance)?;
        let gpu = pollster::block_on(GpuContext::request(
            instance,
            Some(&surface),
            init,
            "wgpu-bridge session device",
        ))?;
        let surface = SurfaceBinding::configure(surface, &gpu, size, init)?;

        let info = gpu.adapter().get_info();
        log::info!(
            "session backend ready: {} ({:?}), format {:?}",
            info.name,
            info.backend,
            surface.format()
        );

        Ok(Self { surface, gpu })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface.format()
    }
}

impl SessionBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Frame = GpuFrame;

    fn size(&self) -> SurfaceSize {
        self.surface.size()
    }

    fn resize(&mut self, size: SurfaceSize) -> Result<bool> {
        self.surface.resize(&self.gpu, size)
    }

    fn check_device(&self) -> Result<()> {
        self.gpu.check_alive()
    }

    fn begin_frame(&mut self) -> Result<Option<GpuFrame>> {
        let Some(surface_texture) = self.surface.acquire(&self.gpu)? else {
            return Ok(None);
        };

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("wgpu-bridge frame encoder"),
            });

        Ok(Some(GpuFrame {
            surface_texture,
            view,
            encoder,
        }))
    }

    fn submit(&mut self, frame: GpuFrame) -> Result<()> {
        let GpuFrame {
            surface_texture,
            encoder,
            ..
        } = frame;
        let (commands, error) = self.gpu.validation_scope(|| encoder.finish());
        if let Some(e) = error {
            // Dropping the texture unpresented discards the frame.
            drop(surface_texture);
            return Err(BridgeError::Encode(e.to_string()));
        }
        self.gpu.queue().submit(std::iter::once(commands));
        surface_texture.present();
        // A device lost during submission surfaces here rather than next frame.
        self.gpu.check_alive()
    }

    fn guarded<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        let (result, error) = self.gpu.validation_scope(|| f(self));
        match error {
            Some(e) => Err(BridgeError::Encode(e.to_string())),
            None => result,
        }
    }
}
