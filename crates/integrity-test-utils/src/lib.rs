//! Shared test utilities for integrity-check
//!
//! ## Modules
//!
//! - [`aws`]: Region detection for live AWS tests
//! - [`stub`]: In-memory `Ec2Provider` with failure injection and call recording

pub mod aws;
pub mod stub;

// Re-export commonly used items
pub use aws::get_test_region;
pub use stub::{StubCall, StubEc2, StubEc2Builder, instance, status, summary};
