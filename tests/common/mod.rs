//! Common test utilities for bulk-dispatch integration tests

#[allow(dead_code)]
pub mod device;

#[allow(unused_imports)]
pub use device::*;
