use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroIsize;
use std::ptr::NonNull;

use raw_window_handle::{
    AndroidDisplayHandle, AndroidNdkWindowHandle, AppKitDisplayHandle, AppKitWindowHandle,
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, Win32WindowHandle, WindowHandle,
    WindowsDisplayHandle, XlibDisplayHandle, XlibWindowHandle,
};

use crate::error::{BridgeError, Result};

/// Drawable size in physical pixels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// wgpu cannot configure a surface with a zero dimension.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; 1.0 for an empty size.
    pub fn aspect(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Native windowing system a raw surface reference belongs to.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfacePlatform {
    /// `window` is an `ANativeWindow*`; `display` is unused.
    AndroidNdk = 1,
    /// `window` is a `wl_surface*`; `display` is a `wl_display*`.
    Wayland = 2,
    /// `window` is an X11 window id; `display` is a `Display*` (may be null).
    Xlib = 3,
    /// `window` is an `HWND`; `display` is unused.
    Win32 = 4,
    /// `window` is an `NSView*`; `display` is unused.
    AppKit = 5,
}

impl SurfacePlatform {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::AndroidNdk,
            2 => Self::Wayland,
            3 => Self::Xlib,
            4 => Self::Win32,
            5 => Self::AppKit,
            _ => return None,
        })
    }
}

/// Raw window + display handles received from a foreign host.
///
/// The host keeps ownership of the native objects; they must stay valid until
/// the session created from them is destroyed.
#[derive(Debug, Copy, Clone)]
pub struct RawSurfaceHandles {
    window: RawWindowHandle,
    display: RawDisplayHandle,
}

impl RawSurfaceHandles {
    pub fn new(window: RawWindowHandle, display: RawDisplayHandle) -> Self {
        Self { window, display }
    }

    /// Builds handles from the untyped pointers a C caller passes.
    pub fn from_platform(
        platform: SurfacePlatform,
        window: *mut c_void,
        display: *mut c_void,
    ) -> Result<Self> {
        let missing = || BridgeError::SurfaceConfig(format!("null {platform:?} window handle"));

        let (window, display) = match platform {
            SurfacePlatform::AndroidNdk => {
                let window = NonNull::new(window).ok_or_else(missing)?;
                (
                    RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(window)),
                    RawDisplayHandle::Android(AndroidDisplayHandle::new()),
                )
            }
            SurfacePlatform::Wayland => {
                let surface = NonNull::new(window).ok_or_else(missing)?;
                let display = NonNull::new(display).ok_or_else(|| {
                    BridgeError::SurfaceConfig("null Wayland display handle".into())
                })?;
                (
                    RawWindowHandle::Wayland(WaylandWindowHandle::new(surface)),
                    RawDisplayHandle::Wayland(WaylandDisplayHandle::new(display)),
                )
            }
            SurfacePlatform::Xlib => {
                if window.is_null() {
                    return Err(missing());
                }
                (
                    RawWindowHandle::Xlib(XlibWindowHandle::new(window as usize as _)),
                    RawDisplayHandle::Xlib(XlibDisplayHandle::new(NonNull::new(display), 0)),
                )
            }
            SurfacePlatform::Win32 => {
                let hwnd = NonZeroIsize::new(window as isize).ok_or_else(missing)?;
                (
                    RawWindowHandle::Win32(Win32WindowHandle::new(hwnd)),
                    RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
                )
            }
            SurfacePlatform::AppKit => {
                let view = NonNull::new(window).ok_or_else(missing)?;
                (
                    RawWindowHandle::AppKit(AppKitWindowHandle::new(view)),
                    RawDisplayHandle::AppKit(AppKitDisplayHandle::new()),
                )
            }
        };

        Ok(Self { window, display })
    }
}

impl HasWindowHandle for RawSurfaceHandles {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        // Validity is the host's contract (see `SurfaceSource::from_raw`).
        Ok(unsafe { WindowHandle::borrow_raw(self.window) })
    }
}

impl HasDisplayHandle for RawSurfaceHandles {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Ok(unsafe { DisplayHandle::borrow_raw(self.display) })
    }
}

/// Host-provided display surface reference, plus its current size.
pub enum SurfaceSource {
    /// Anything wgpu can safely build a `'static` surface from, e.g. `Arc<winit::window::Window>`.
    Target {
        target: wgpu::SurfaceTarget<'static>,
        size: SurfaceSize,
    },
    /// Raw handles from a foreign caller.
    Raw {
        handles: RawSurfaceHandles,
        size: SurfaceSize,
    },
}

impl SurfaceSource {
    pub fn from_target(target: impl Into<wgpu::SurfaceTarget<'static>>, size: SurfaceSize) -> Self {
        Self::Target {
            target: target.into(),
            size,
        }
    }

    /// # Safety
    ///
    /// The native window and display behind `handles` must stay valid until the
    /// session created from this source has been destroyed.
    pub unsafe fn from_raw(handles: RawSurfaceHandles, size: SurfaceSize) -> Self {
        Self::Raw { handles, size }
    }

    pub fn size(&self) -> SurfaceSize {
        match self {
            Self::Target { size, .. } | Self::Raw { size, .. } => *size,
        }
    }

    /// Translates the reference into a wgpu surface owned by `instance`.
    pub(crate) fn create_surface(
        self,
        instance: &wgpu::Instance,
    ) -> Result<(wgpu::Surface<'static>, SurfaceSize)> {
        let size = self.size();
        let surface = match self {
            Self::Target { target, .. } => instance.create_surface(target),
            Self::Raw { handles, .. } => {
                let target = unsafe { wgpu::SurfaceTargetUnsafe::from_window(&handles) }
                    .map_err(|e| BridgeError::SurfaceConfig(format!("bad raw handles: {e}")))?;
                // Lifetime of the native objects is guaranteed by `from_raw`'s contract.
                unsafe { instance.create_surface_unsafe(target) }
            }
        }
        .map_err(|e| BridgeError::SurfaceConfig(format!("failed to create surface: {e}")))?;

        Ok((surface, size))
    }
}

impl fmt::Debug for SurfaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target { size, .. } => f
                .debug_struct("SurfaceSource::Target")
                .field("size", size)
                .finish_non_exhaustive(),
            Self::Raw { handles, size } => f
                .debug_struct("SurfaceSource::Raw")
                .field("handles", handles)
                .field("size", size)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sizes() {
        assert!(SurfaceSize::new(0, 10).is_empty());
        assert!(SurfaceSize::new(10, 0).is_empty());
        assert!(!SurfaceSize::new(1, 1).is_empty());
    }

    #[test]
    fn aspect_handles_zero() {
        assert_eq!(SurfaceSize::new(0, 0).aspect(), 1.0);
        assert_eq!(SurfaceSize::new(200, 100).aspect(), 2.0);
    }

    #[test]
    fn platform_round_trips_known_values() {
        for p in [
            SurfacePlatform::AndroidNdk,
            SurfacePlatform::Wayland,
            SurfacePlatform::Xlib,
            SurfacePlatform::Win32,
            SurfacePlatform::AppKit,
        ] {
            assert_eq!(SurfacePlatform::from_raw(p as u32), Some(p));
        }
        assert_eq!(SurfacePlatform::from_raw(0), None);
        assert_eq!(SurfacePlatform::from_raw(99), None);
    }

    #[test]
    fn null_window_is_a_surface_config_error() {
        let err = RawSurfaceHandles::from_platform(
            SurfacePlatform::AndroidNdk,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::SurfaceConfig(_)));
    }

    #[test]
    fn wayland_requires_a_display() {
        let mut fake_surface = 0u8;
        let err = RawSurfaceHandles::from_platform(
            SurfacePlatform::Wayland,
            (&mut fake_surface as *mut u8).cast(),
            std::ptr::null_mut(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::SurfaceConfig(_)));
    }

    #[test]
    fn android_handles_carry_the_window_pointer() {
        let mut fake_window = 0u8;
        let ptr: *mut c_void = (&mut fake_window as *mut u8).cast();
        let handles =
            RawSurfaceHandles::from_platform(SurfacePlatform::AndroidNdk, ptr, std::ptr::null_mut())
                .unwrap();
        match handles.window_handle().unwrap().as_raw() {
            RawWindowHandle::AndroidNdk(h) => assert_eq!(h.a_native_window.as_ptr(), ptr),
            other => panic!("unexpected handle {other:?}"),
        }
    }
}
