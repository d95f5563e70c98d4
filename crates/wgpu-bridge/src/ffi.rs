//! C ABI over a process-wide [`Bridge`].
//!
//! Every call returns a status: [`WGB_OK`], a positive
//! [`BridgeError::status_code`], or one of the negative `WGB_*` codes. Handles
//! are `u64` and `0` is never a live handle. Panics never cross the boundary.

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::animation::AnimationId;
use crate::bridge::Bridge;
use crate::device::{RawSurfaceHandles, SurfacePlatform, SurfaceSize, SurfaceSource};
use crate::error::BridgeError;
use crate::handle::Handle;
use crate::job::{JobConfig, LineSink, NonceRange, SEED_LEN};
use crate::logging::{init_logging, LoggingConfig};
use crate::session::FrameStatus;

pub const WGB_OK: i32 = 0;
pub const WGB_NULL_POINTER: i32 = -1;
pub const WGB_BAD_ARGUMENT: i32 = -2;
pub const WGB_PANIC: i32 = -3;

/// Native surface passed to [`wgb_session_create`].
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct WgbSurfaceDesc {
    /// A `SurfacePlatform` value.
    pub platform: u32,
    pub window: *mut c_void,
    pub display: *mut c_void,
    pub width: u32,
    pub height: u32,
}

/// Compute job parameters passed to [`wgb_job_start`].
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct WgbJobDesc {
    pub workgroup_size: u32,
    pub dispatch_count: u32,
    pub iterations: u32,
    pub difficulty: u32,
    pub nonce_start: u64,
    /// Exclusive end of the nonce range; `0` means unbounded.
    pub nonce_end: u64,
    pub seed: [u8; SEED_LEN],
}

impl WgbJobDesc {
    fn to_config(self) -> JobConfig {
        let range = match self.nonce_end {
            0 => NonceRange::starting_at(self.nonce_start),
            end => NonceRange::new(self.nonce_start, end),
        };
        JobConfig::new(
            self.workgroup_size,
            self.dispatch_count,
            self.iterations,
            self.difficulty,
        )
        .with_nonce_range(range)
        .with_seed(self.seed)
    }
}

/// Receives job lines on the job's worker thread as NUL-terminated UTF-8. The
/// pointer is only valid for the duration of the call.
pub type WgbLineCallback = unsafe extern "C" fn(user_data: *mut c_void, line: *const c_char);

struct CallbackSink {
    callback: WgbLineCallback,
    user_data: *mut c_void,
}

// The host guarantees `user_data` may be used from the job's worker thread
// until the worker has exited (see `wgb_job_start`).
unsafe impl Send for CallbackSink {}
unsafe impl Sync for CallbackSink {}

impl LineSink for CallbackSink {
    fn on_line(&self, line: &str) {
        let Ok(line) = CString::new(line) else {
            log::warn!("dropping job line with interior NUL");
            return;
        };
        unsafe { (self.callback)(self.user_data, line.as_ptr()) }
    }
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(Bridge::default)
}

/// Runs `f`, converting a panic into [`WGB_PANIC`].
fn guard(name: &str, f: impl FnOnce() -> Result<(), BridgeError>) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => WGB_OK,
        Ok(Err(err)) => {
            if err.is_recoverable() {
                log::warn!("{name}: {err}");
            } else {
                log::error!("{name}: {err}");
            }
            set_last_error(&err.to_string());
            err.status_code()
        }
        Err(_) => {
            log::error!("{name}: panic caught at the C boundary");
            set_last_error("internal panic");
            WGB_PANIC
        }
    }
}

fn set_last_error(message: &str) {
    let message = CString::new(message).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn reject(name: &str, code: i32, message: &str) -> i32 {
    log::error!("{name}: {message}");
    set_last_error(message);
    code
}

/// Installs the logger. `filter` may be null for the default filter.
///
/// # Safety
///
/// `filter` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgb_init_logging(filter: *const c_char) -> i32 {
    let env_filter = if filter.is_null() {
        None
    } else {
        match unsafe { CStr::from_ptr(filter) }.to_str() {
            Ok(filter) => Some(filter.to_owned()),
            Err(_) => {
                return reject("wgb_init_logging", WGB_BAD_ARGUMENT, "filter is not UTF-8");
            }
        }
    };
    guard("wgb_init_logging", || {
        init_logging(LoggingConfig {
            env_filter,
            write_style: env_logger::WriteStyle::Never,
        });
        Ok(())
    })
}

/// createSession. Writes the new handle to `out_handle`.
///
/// # Safety
///
/// `desc` and `out_handle` must be valid pointers. The native window and
/// display in `desc` must stay valid until the session is destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgb_session_create(
    desc: *const WgbSurfaceDesc,
    animation: u32,
    out_handle: *mut u64,
) -> i32 {
    const NAME: &str = "wgb_session_create";
    if desc.is_null() || out_handle.is_null() {
        return reject(NAME, WGB_NULL_POINTER, "null argument");
    }
    let desc = unsafe { *desc };
    let Some(platform) = SurfacePlatform::from_raw(desc.platform) else {
        return reject(NAME, WGB_BAD_ARGUMENT, "unknown surface platform");
    };

    guard(NAME, || {
        let handles = RawSurfaceHandles::from_platform(platform, desc.window, desc.display)?;
        let size = SurfaceSize::new(desc.width, desc.height);
        let source = unsafe { SurfaceSource::from_raw(handles, size) };
        let handle = bridge().create_session(source, AnimationId(animation))?;
        unsafe { *out_handle = handle.as_raw() };
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wgb_session_resize(handle: u64, width: u32, height: u32) -> i32 {
    guard("wgb_session_resize", || {
        bridge().resize_session(Handle::from_raw(handle), width, height)
    })
}

/// frame. `out_presented` may be null; otherwise it receives whether a frame
/// was actually presented.
///
/// # Safety
///
/// `out_presented` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgb_session_frame(handle: u64, out_presented: *mut bool) -> i32 {
    guard("wgb_session_frame", || {
        let status = bridge().frame(Handle::from_raw(handle))?;
        if !out_presented.is_null() {
            unsafe { *out_presented = status == FrameStatus::Presented };
        }
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wgb_session_change_animation(handle: u64, animation: u32) -> i32 {
    guard("wgb_session_change_animation", || {
        bridge()
            .change_animation(Handle::from_raw(handle), AnimationId(animation))
            .map(drop)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wgb_session_destroy(handle: u64) -> i32 {
    guard("wgb_session_destroy", || {
        bridge().destroy_session(Handle::from_raw(handle))
    })
}

/// startComputeJob. `callback` receives every line on the job's worker thread.
///
/// # Safety
///
/// `desc` and `out_handle` must be valid pointers. `user_data` must be usable
/// from another thread until the job's final `completed:` or `error:` line has
/// been delivered, or until [`wgb_job_cancel_and_wait`] reported the worker as
/// exited. [`wgb_job_cancel`] alone does not end the callbacks: the in-flight
/// batch still reports.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgb_job_start(
    desc: *const WgbJobDesc,
    callback: Option<WgbLineCallback>,
    user_data: *mut c_void,
    out_handle: *mut u64,
) -> i32 {
    const NAME: &str = "wgb_job_start";
    let Some(callback) = callback else {
        return reject(NAME, WGB_NULL_POINTER, "null callback");
    };
    if desc.is_null() || out_handle.is_null() {
        return reject(NAME, WGB_NULL_POINTER, "null argument");
    }
    let config = unsafe { *desc }.to_config();

    guard(NAME, || {
        let sink = Arc::new(CallbackSink {
            callback,
            user_data,
        });
        let handle = bridge().start_compute_job(config, sink)?;
        unsafe { *out_handle = handle.as_raw() };
        Ok(())
    })
}

/// cancelComputeJob. Also the reclaim path for jobs that ended on their own.
#[unsafe(no_mangle)]
pub extern "C" fn wgb_job_cancel(handle: u64) -> i32 {
    guard("wgb_job_cancel", || {
        bridge().cancel_compute_job(Handle::from_raw(handle))
    })
}

/// cancelComputeJob, then blocks up to `timeout_ms` for the worker to exit.
/// Once `*out_exited` is `true` the callback will not be called again and
/// `user_data` may be released.
///
/// # Safety
///
/// `out_exited` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgb_job_cancel_and_wait(
    handle: u64,
    timeout_ms: u32,
    out_exited: *mut bool,
) -> i32 {
    const NAME: &str = "wgb_job_cancel_and_wait";
    if out_exited.is_null() {
        return reject(NAME, WGB_NULL_POINTER, "null argument");
    }
    guard(NAME, || {
        let timeout = Duration::from_millis(u64::from(timeout_ms));
        let exited = bridge().cancel_compute_job_and_wait(Handle::from_raw(handle), timeout)?;
        if !exited {
            log::warn!("{NAME}: job {handle:#x} still running after {timeout_ms} ms");
        }
        unsafe { *out_exited = exited };
        Ok(())
    })
}

/// Writes the job's `JobPhase` as `u32` to `out_phase`.
///
/// # Safety
///
/// `out_phase` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgb_job_status(handle: u64, out_phase: *mut u32) -> i32 {
    if out_phase.is_null() {
        return reject("wgb_job_status", WGB_NULL_POINTER, "null argument");
    }
    guard("wgb_job_status", || {
        let phase = bridge().job_phase(Handle::from_raw(handle))?;
        unsafe { *out_phase = phase as u32 };
        Ok(())
    })
}

/// Destroys every session and cancels every job.
#[unsafe(no_mangle)]
pub extern "C" fn wgb_shutdown() -> i32 {
    guard("wgb_shutdown", || {
        bridge().shutdown();
        Ok(())
    })
}

/// Static description of a status code. Never null.
#[unsafe(no_mangle)]
pub extern "C" fn wgb_status_message(code: i32) -> *const c_char {
    let message: &'static CStr = match code {
        WGB_OK => c"ok",
        WGB_NULL_POINTER => c"null pointer argument",
        WGB_BAD_ARGUMENT => c"invalid argument",
        WGB_PANIC => c"internal panic",
        1 => c"invalid or destroyed handle",
        2 => c"no compatible GPU device",
        3 => c"surface configuration failed",
        4 => c"presentation surface lost",
        5 => c"frame encode failed",
        6 => c"unknown animation id",
        7 => c"GPU device lost",
        8 => c"invalid job configuration",
        9 => c"failed to spawn job worker",
        _ => c"unknown status",
    };
    message.as_ptr()
}

/// Detailed message of the last failed call on this thread, or null. Valid
/// until the next failing call on the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn wgb_last_error_message() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |message| message.as_ptr())
    })
}
