//! copterlink-ffi: C-ABI exports for hosting a multicopter link from C/C++.
//!
//! Handles are opaque pointers. Every function runs inside a panic boundary
//! and reports failures through [`CopterResult`] plus a thread-local message
//! readable with [`copter_last_error`].

mod args;
mod error;
mod link;
mod types;

use std::panic::AssertUnwindSafe;

pub use link::{
    copter_link_create, copter_link_free, copter_link_halt, copter_link_join,
    copter_link_latest_telemetry, copter_link_set_motors, copter_link_start, copter_link_state,
};
pub use types::{CopterLinkHandle, CopterLinkState, CopterResult};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

#[no_mangle]
pub extern "C" fn copter_init() -> CopterResult {
    ffi_boundary(CopterResult::Internal, || {
        error::clear_error_state();
        CopterResult::Ok
    })
}

#[no_mangle]
pub extern "C" fn copter_cleanup() {
    ffi_boundary((), || {
        error::clear_error_state();
    });
}

#[no_mangle]
pub extern "C" fn copter_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}
