use super::{GpuContext, GpuInit, SurfaceErrorAction, SurfaceSize};
use crate::error::{BridgeError, Result};

/// A wgpu surface configured for presentation.
///
/// Owns the surface and its configuration; the device it is configured against
/// is passed in by the owner (the session backend holds both).
pub struct SurfaceBinding {
    /// Surface created from the host's drawable.
    surface: wgpu::Surface<'static>,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,

    /// Current drawable size in physical pixels. May be empty while the host
    /// window is minimized; configuration is deferred until it is not.
    size: SurfaceSize,
}

impl SurfaceBinding {
    /// Chooses a format and configures `surface` against `gpu`'s device.
    pub fn configure(
        surface: wgpu::Surface<'static>,
        gpu: &GpuContext,
        size: SurfaceSize,
        init: &GpuInit,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(gpu.adapter());
        let format = choose_surface_format(&caps, init.prefer_srgb).ok_or_else(|| {
            BridgeError::SurfaceConfig("surface is not supported by the adapter".into())
        })?;

        let present_mode = if caps.present_modes.contains(&init.present_mode) {
            init.present_mode
        } else {
            log::warn!(
                "present mode {:?} unsupported, falling back to Fifo",
                init.present_mode
            );
            wgpu::PresentMode::Fifo
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        let binding = Self {
            surface,
            config,
            size,
        };
        if !size.is_empty() {
            binding.apply(gpu)?;
        }

        log::debug!("surface configured: {format:?} {}x{}", size.width, size.height);
        Ok(binding)
    }

    /// Returns the active surface format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Returns the current drawable size (physical pixels).
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Reconfigures the surface for a new size.
    ///
    /// Returns `false` when the size is unchanged. wgpu does not support a 0x0
    /// configuration; in that case only the recorded size changes.
    pub fn resize(&mut self, gpu: &GpuContext, new_size: SurfaceSize) -> Result<bool> {
        if new_size == self.size {
            return Ok(false);
        }

        self.size = new_size;
        if new_size.is_empty() {
            return Ok(true);
        }

        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.apply(gpu)?;
        Ok(true)
    }

    /// Acquires the next surface texture.
    ///
    /// `Ok(None)` means "skip this frame" (empty surface or a transient timeout).
    /// A lost or outdated surface is reconfigured and retried once before giving
    /// up with `SurfaceLost`.
    pub fn acquire(&mut self, gpu: &GpuContext) -> Result<Option<wgpu::SurfaceTexture>> {
        if self.size.is_empty() {
            return Ok(None);
        }

        let err = match self.surface.get_current_texture() {
            Ok(texture) => return Ok(Some(texture)),
            Err(err) => err,
        };

        match SurfaceErrorAction::classify(&err) {
            SurfaceErrorAction::Reconfigure => {
                log::warn!("surface {err}; reconfiguring");
                self.apply(gpu).map_err(|_| BridgeError::SurfaceLost)?;
                self.surface.get_current_texture().map(Some).map_err(|err| {
                    log::warn!("surface still unusable after reconfigure: {err}");
                    BridgeError::SurfaceLost
                })
            }
            SurfaceErrorAction::SkipFrame => {
                log::debug!("surface {err}; skipping frame");
                Ok(None)
            }
            SurfaceErrorAction::Fatal => Err(BridgeError::DeviceLost(format!(
                "surface acquisition failed: {err}"
            ))),
        }
    }

    fn apply(&self, gpu: &GpuContext) -> Result<()> {
        let ((), error) = gpu.validation_scope(|| self.surface.configure(gpu.device(), &self.config));
        match error {
            Some(e) => Err(BridgeError::SurfaceConfig(e.to_string())),
            None => Ok(()),
        }
    }
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        formats: Vec<wgpu::TextureFormat>,
        alpha_modes: Vec<wgpu::CompositeAlphaMode>,
    ) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes,
            ..Default::default()
        }
    }

    #[test]
    fn no_formats_means_unsupported() {
        assert_eq!(choose_surface_format(&caps(vec![], vec![]), true), None);
    }

    #[test]
    fn srgb_is_preferred_when_available() {
        let c = caps(
            vec![
                wgpu::TextureFormat::Bgra8Unorm,
                wgpu::TextureFormat::Rgba8UnormSrgb,
            ],
            vec![],
        );
        assert_eq!(
            choose_surface_format(&c, true),
            Some(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&c, false),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
    }

    #[test]
    fn unsupported_alpha_request_falls_back_to_first() {
        let c = caps(
            vec![],
            vec![
                wgpu::CompositeAlphaMode::Opaque,
                wgpu::CompositeAlphaMode::PreMultiplied,
            ],
        );
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PostMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::PreMultiplied
        );
        assert_eq!(
            choose_alpha_mode(&caps(vec![], vec![]), None),
            wgpu::CompositeAlphaMode::Auto
        );
    }
}
