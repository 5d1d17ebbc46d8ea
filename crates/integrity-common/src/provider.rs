//! Provider abstraction for the compute API
//!
//! Checks only need a handful of read-only calls from the cloud provider.
//! This trait captures exactly those, so the checks can run against the
//! AWS SDK client in production and against an in-memory stub in tests.

use crate::defaults::{REGION_NOT_OPTED_IN, STATUS_OK};
use crate::error::ProviderError;
use std::future::Future;

/// Name/values filter applied to an instance listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFilter {
    pub name: String,
    pub values: Vec<String>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` once the listing is exhausted
    pub next_token: Option<String>,
}

pub type ReservationPage = Page<Reservation>;

/// A compute instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub image_id: Option<String>,
    /// Lifecycle state name (e.g. "running", "stopped")
    pub state: Option<String>,
    pub availability_zone: Option<String>,
}

impl Instance {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }
}

/// A group of instances launched together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    pub instances: Vec<Instance>,
}

/// A machine image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub image_id: String,
    pub name: Option<String>,
}

/// One named status check and its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDetail {
    pub name: String,
    pub status: String,
}

impl StatusDetail {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }
}

/// Overall status of one status-check category plus its details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub status: String,
    pub details: Vec<StatusDetail>,
}

impl StatusSummary {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
            details: vec![StatusDetail::new("reachability", "passed")],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Instance-level and system-level status checks for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub instance_status: StatusSummary,
    pub system_status: StatusSummary,
}

/// A provider region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    /// "opt-in-not-required", "opted-in" or "not-opted-in"
    pub opt_in_status: Option<String>,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opt_in_status: None,
        }
    }

    /// Whether calls scoped to this region can succeed for the account
    pub fn is_enabled(&self) -> bool {
        self.opt_in_status.as_deref() != Some(REGION_NOT_OPTED_IN)
    }
}

/// Read-only compute API used by the checks
///
/// Implementations are cheap to clone into concurrent tasks behind an `Arc`
/// and must be usable from many tasks at once.
pub trait Ec2Provider: Send + Sync + 'static {
    /// Region this provider's calls are scoped to
    fn region(&self) -> &str;

    /// Fetch one page of reservations
    ///
    /// `next_token` is `None` for the first page. The returned page carries
    /// the token for the following page, or `None` when exhausted.
    fn describe_instances_page(
        &self,
        filters: &[InstanceFilter],
        max_results: i32,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<ReservationPage, ProviderError>> + Send;

    /// Describe a single image by ID
    fn describe_image(
        &self,
        image_id: &str,
    ) -> impl Future<Output = Result<Vec<Image>, ProviderError>> + Send;

    /// Describe status checks for a single instance
    fn describe_instance_status(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Vec<InstanceStatus>, ProviderError>> + Send;

    /// List every region known to the provider, including disabled ones
    fn describe_regions(&self) -> impl Future<Output = Result<Vec<Region>, ProviderError>> + Send;

    /// Construct a provider whose calls are scoped to `region`
    fn for_region(&self, region: &str) -> Self
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_enabled_unless_not_opted_in() {
        assert!(Region::new("us-east-1").is_enabled());

        let opted_in = Region {
            name: "af-south-1".to_string(),
            opt_in_status: Some("opted-in".to_string()),
        };
        assert!(opted_in.is_enabled());

        let disabled = Region {
            name: "me-south-1".to_string(),
            opt_in_status: Some("not-opted-in".to_string()),
        };
        assert!(!disabled.is_enabled());
    }

    #[test]
    fn status_summary_ok() {
        assert!(StatusSummary::ok().is_ok());
        let impaired = StatusSummary {
            status: "impaired".to_string(),
            details: vec![],
        };
        assert!(!impaired.is_ok());
    }
}
