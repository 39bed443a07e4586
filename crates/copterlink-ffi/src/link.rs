use std::os::raw::c_char;
use std::time::Duration;

use copterlink_control::{LatestTelemetry, LinkConfig, Multicopter};

use crate::args;
use crate::error;
use crate::types::{CopterLinkHandle, CopterLinkState, CopterResult, LinkHandle};

// Shared access only: every link call may run concurrently with the others.
fn with_link<T>(handle: CopterLinkHandle, on_error: T, f: impl FnOnce(&LinkHandle) -> T) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("link handle cannot be null");
        return on_error;
    }

    let link_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller. Only shared
        // references are ever created until copter_link_free.
        unsafe { &*(handle as *const LinkHandle) }
    };

    f(link_handle)
}

/// Create a stopped link to the simulator at `host`.
///
/// Returns null on failure; see `copter_last_error`.
///
/// # Safety
/// `host` must be a non-null pointer to a valid UTF-8, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn copter_link_create(
    host: *const c_char,
    motor_port: u16,
    telemetry_port: u16,
    motor_count: usize,
    receive_timeout_ms: u64,
) -> CopterLinkHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let host = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(host, "host") } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };

        let config = LinkConfig::default()
            .with_host(host)
            .with_ports(motor_port, telemetry_port)
            .with_motor_count(motor_count)
            .with_receive_timeout(Duration::from_millis(receive_timeout_ms));

        let telemetry = LatestTelemetry::new();
        let created = Multicopter::new(config)
            .and_then(|copter| copter.with_telemetry_sink(telemetry.clone()));

        match created {
            Ok(copter) => {
                let handle = LinkHandle { copter, telemetry };
                Box::into_raw(Box::new(handle)) as CopterLinkHandle
            }
            Err(err) => {
                let _ = error::map_link_error(&err);
                std::ptr::null_mut()
            }
        }
    })
}

/// Bind the sockets and launch the control loop.
///
/// # Safety
/// `link` must be a valid handle returned by `copter_link_create`. Like every
/// `copter_link_*` call except `copter_link_free`, this may run concurrently
/// with other calls on the same handle.
#[no_mangle]
pub unsafe extern "C" fn copter_link_start(link: CopterLinkHandle) -> CopterResult {
    crate::ffi_boundary(CopterResult::Internal, || {
        error::clear_error_state();

        with_link(link, CopterResult::InvalidArgument, |handle| {
            match handle.copter.start() {
                Ok(()) => CopterResult::Ok,
                Err(err) => error::map_link_error(&err),
            }
        })
    })
}

/// Replace the motor command with `len` values.
///
/// # Safety
/// `link` must be a valid handle. If `len > 0`, `values` must be non-null and readable for
/// `len` doubles. Safe to call from any thread while another thread polls telemetry or
/// waits in `copter_link_join`.
#[no_mangle]
pub unsafe extern "C" fn copter_link_set_motors(
    link: CopterLinkHandle,
    values: *const f64,
    len: usize,
) -> CopterResult {
    crate::ffi_boundary(CopterResult::Internal, || {
        error::clear_error_state();

        let values = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::f64_slice_arg(values, len, "values") } {
                Some(v) => v,
                None => return CopterResult::InvalidArgument,
            }
        };

        with_link(link, CopterResult::InvalidArgument, |handle| {
            match handle.copter.set_motors(values) {
                Ok(()) => CopterResult::Ok,
                Err(err) => error::map_link_error(&err),
            }
        })
    })
}

/// Copy the newest telemetry frame into `out`.
///
/// Returns `NoData` if no frame arrived yet. If `capacity` is too small,
/// returns `BufferTooSmall` and stores the needed length in `out_len`.
///
/// # Safety
/// `link` must be a valid handle. `out_len` and `out_sequence` must be non-null writable
/// pointers. If `capacity > 0`, `out` must be non-null and writable for `capacity` doubles.
/// May be called from a monitor thread concurrently with the control thread.
#[no_mangle]
pub unsafe extern "C" fn copter_link_latest_telemetry(
    link: CopterLinkHandle,
    out: *mut f64,
    capacity: usize,
    out_len: *mut usize,
    out_sequence: *mut u64,
) -> CopterResult {
    crate::ffi_boundary(CopterResult::Internal, || {
        error::clear_error_state();

        if out_len.is_null() || out_sequence.is_null() {
            return error::set_invalid_argument("out_len and out_sequence cannot be null");
        }
        if capacity > 0 && out.is_null() {
            return error::set_invalid_argument("out cannot be null when capacity > 0");
        }

        with_link(link, CopterResult::InvalidArgument, |handle| {
            let frame = match handle.telemetry.latest() {
                Some(frame) => frame,
                None => return CopterResult::NoData,
            };

            // SAFETY: Pointers were checked for null above.
            unsafe {
                *out_len = frame.values.len();
                *out_sequence = frame.sequence;
            }

            if frame.values.len() > capacity {
                error::set_error_message(format!(
                    "telemetry frame has {} values, buffer holds {capacity}",
                    frame.values.len()
                ));
                return CopterResult::BufferTooSmall;
            }

            if !frame.values.is_empty() {
                // SAFETY: `out` is non-null and writable for `capacity >= len` elements.
                unsafe {
                    std::ptr::copy_nonoverlapping(frame.values.as_ptr(), out, frame.values.len());
                }
            }
            CopterResult::Ok
        })
    })
}

/// Current link state, or `Invalid` for a null handle.
///
/// # Safety
/// `link` must be null or a valid handle returned by `copter_link_create`.
#[no_mangle]
pub unsafe extern "C" fn copter_link_state(link: CopterLinkHandle) -> CopterLinkState {
    crate::ffi_boundary(CopterLinkState::Invalid, || {
        with_link(link, CopterLinkState::Invalid, |handle| {
            handle.copter.state().into()
        })
    })
}

/// Ask the control loop to stop. Safe to call repeatedly or before start.
///
/// With `immediate` non-zero the sockets are closed right away instead of
/// waiting for the current receive to time out.
///
/// # Safety
/// `link` must be a valid handle returned by `copter_link_create`. May be called
/// while another thread is blocked in `copter_link_join`.
#[no_mangle]
pub unsafe extern "C" fn copter_link_halt(link: CopterLinkHandle, immediate: i32) -> CopterResult {
    crate::ffi_boundary(CopterResult::Internal, || {
        error::clear_error_state();

        with_link(link, CopterResult::InvalidArgument, |handle| {
            if immediate != 0 {
                handle.copter.halt_now();
            } else {
                handle.copter.halt();
            }
            CopterResult::Ok
        })
    })
}

/// Wait for the control loop to exit and report the fault that ended it.
///
/// # Safety
/// `link` must be a valid handle returned by `copter_link_create`. Other threads
/// may keep using the handle while this blocks.
#[no_mangle]
pub unsafe extern "C" fn copter_link_join(link: CopterLinkHandle) -> CopterResult {
    crate::ffi_boundary(CopterResult::Internal, || {
        error::clear_error_state();

        with_link(link, CopterResult::InvalidArgument, |handle| {
            match handle.copter.join() {
                Ok(()) => CopterResult::Ok,
                Err(err) => error::map_link_error(&err),
            }
        })
    })
}

/// Halt, join and free a link handle.
///
/// # Safety
/// `link` must be null or a handle previously returned by `copter_link_create`. No other
/// call on this handle may be in progress or follow.
#[no_mangle]
pub unsafe extern "C" fn copter_link_free(link: CopterLinkHandle) {
    crate::ffi_boundary((), || {
        if link.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by copter_link_create.
        unsafe {
            drop(Box::from_raw(link as *mut LinkHandle));
        }
    });
}
