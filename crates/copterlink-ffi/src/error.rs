use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use copterlink_control::LinkError;

use crate::types::CopterResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::new("").expect("empty CString should be valid"));
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new("").expect("empty CString should be valid");
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized)
            .unwrap_or_else(|_| CString::new("internal error").expect("literal is valid"));
    });
}

pub(crate) fn set_invalid_argument(message: impl Into<String>) -> CopterResult {
    set_error_message(message);
    CopterResult::InvalidArgument
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn map_link_error(err: &LinkError) -> CopterResult {
    set_error_message(err.to_string());
    match err {
        LinkError::Transport(_) => CopterResult::TransportError,
        LinkError::InvalidConfig(_) | LinkError::ConfigRead { .. } | LinkError::Json(_) => {
            CopterResult::InvalidConfig
        }
        LinkError::MotorCountMismatch { .. } => CopterResult::MotorCountMismatch,
        LinkError::AlreadyRunning => CopterResult::AlreadyRunning,
        LinkError::NotStopped(_) => CopterResult::NotStopped,
        LinkError::Spawn(_) | LinkError::LoopPanicked => CopterResult::Internal,
    }
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
