//! integrity-common - Shared types for the fleet integrity checker
//!
//! This crate holds the result vocabulary and the provider abstraction used by
//! both the checker and its test doubles, without any AWS SDK dependencies.
//!
//! ## Modules
//!
//! - [`aggregate`]: Error container for concurrent phases
//! - [`defaults`]: Default policy values
//! - [`error`]: Provider error taxonomy
//! - [`notice`]: Severity-levelled findings
//! - [`provider`]: The `Ec2Provider` trait and the resource records it returns

pub mod aggregate;
pub mod defaults;
pub mod error;
pub mod notice;
pub mod provider;

// Re-export commonly used types
pub use aggregate::AggregateError;
pub use error::ProviderError;
pub use notice::{Notice, NoticeLevel};
pub use provider::{
    Ec2Provider, Image, Instance, InstanceFilter, InstanceStatus, Page, Region, Reservation,
    ReservationPage, StatusDetail, StatusSummary,
};
