//! # tdbridge-engine
//!
//! [`TdJson`] wraps the four `libtdjson` entry points behind the
//! [`Engine`](tdbridge_core::Engine) trait. The binding only exists with the
//! `tdjson` feature so the rest of the workspace builds and tests without the
//! native library installed.

#[cfg(feature = "tdjson")]
mod ffi;

#[cfg(feature = "tdjson")]
pub use ffi::TdJson;

/// Whether this build links the native engine.
pub const fn native_engine_available() -> bool {
    cfg!(feature = "tdjson")
}
