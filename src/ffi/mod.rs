//! C-compatible surface.
//!
//! Flat `extern "C"` functions over one process-wide controller, for
//! callers linking against `include/nanodriver.h`.

pub mod api;
mod global;
pub mod types;

pub use api::*;
pub use types::*;
