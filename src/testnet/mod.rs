//! In-process network harness
//!
//! Recording and queued transports that let protocol tests run without sockets.

pub mod test_utils;

pub use test_utils::*;
