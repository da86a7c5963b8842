//! `extern "C"` declarations for `libtdjson` and the safe wrapper around them.
#![allow(unsafe_code)]

use std::ffi::{CStr, CString, c_char, c_double, c_int};
use std::time::Duration;

use tdbridge_core::{ClientId, Engine};

#[link(name = "tdjson")]
unsafe extern "C" {
    fn td_create_client_id() -> c_int;
    fn td_send(client_id: c_int, request: *const c_char);
    fn td_receive(timeout: c_double) -> *const c_char;
    fn td_execute(request: *const c_char) -> *const c_char;
}

/// Handle to the process-wide native engine.
///
/// The library owns one engine per process; creating several `TdJson` values
/// shares it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TdJson;

impl TdJson {
    /// Create a handle.
    pub fn new() -> Self {
        Self
    }
}

/// Copy a library-owned C string before the next call invalidates it.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// until this function returns.
unsafe fn take_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy();
    (!text.is_empty()).then(|| text.into_owned())
}

fn to_c_string(request: &str) -> Option<CString> {
    match CString::new(request) {
        Ok(c) => Some(c),
        Err(_) => {
            tracing::warn!("request contains an interior NUL byte, dropping");
            None
        }
    }
}

impl Engine for TdJson {
    fn create_client_id(&self) -> ClientId {
        unsafe { td_create_client_id() }
    }

    fn send(&self, client_id: ClientId, request: &str) {
        let Some(request) = to_c_string(request) else {
            return;
        };
        unsafe { td_send(client_id, request.as_ptr()) };
    }

    fn receive(&self, timeout: Duration) -> Option<String> {
        // The returned buffer is valid until the next td_receive call, and
        // only the poll loop calls this.
        unsafe { take_c_str(td_receive(timeout.as_secs_f64())) }
    }

    fn execute(&self, request: &str) -> Option<String> {
        let request = to_c_string(request)?;
        unsafe { take_c_str(td_execute(request.as_ptr())) }
    }
}
