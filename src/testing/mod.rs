//! Testing utilities and mock implementations
//!
//! Lets the processing pipeline be exercised without a live webhook endpoint.

pub mod mocks;

pub use mocks::*;
