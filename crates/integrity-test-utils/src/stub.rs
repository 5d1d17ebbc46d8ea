//! In-memory EC2 provider
//!
//! `StubEc2` serves canned instances, images, statuses and regions, can be
//! told to fail specific calls, and records every call it receives so tests
//! can assert on call counts. Providers returned by `for_region` share the
//! same canned data and call log.

use integrity_common::{
    Ec2Provider, Image, Instance, InstanceFilter, InstanceStatus, ProviderError, Region,
    Reservation, ReservationPage, StatusDetail, StatusSummary,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A call received by the stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    DescribeInstancesPage {
        region: String,
        max_results: i32,
        next_token: Option<String>,
    },
    DescribeImage(String),
    DescribeInstanceStatus(String),
    DescribeRegions,
}

#[derive(Debug, Default)]
struct StubData {
    /// Pages of reservations per region
    pages: HashMap<String, Vec<Vec<Reservation>>>,
    images: HashMap<String, Image>,
    statuses: HashMap<String, InstanceStatus>,
    regions: Vec<Region>,
    failing_pages: HashSet<(String, usize)>,
    stuck_pagination: HashSet<String>,
    failing_images: HashSet<String>,
    failing_statuses: HashSet<String>,
    fail_regions: bool,
    latency: Option<Duration>,
}

#[derive(Debug)]
struct StubState {
    data: StubData,
    calls: Mutex<Vec<StubCall>>,
}

/// In-memory `Ec2Provider`
#[derive(Debug, Clone)]
pub struct StubEc2 {
    region: String,
    state: Arc<StubState>,
}

/// Builder for [`StubEc2`]
#[derive(Debug)]
pub struct StubEc2Builder {
    region: String,
    data: StubData,
}

impl StubEc2Builder {
    /// Serve `instances` as a single page in `region`, one reservation each
    pub fn instances(self, region: &str, instances: Vec<Instance>) -> Self {
        self.instance_pages(region, vec![instances])
    }

    /// Serve `pages` in order in `region`, chained by continuation tokens
    pub fn instance_pages(mut self, region: &str, pages: Vec<Vec<Instance>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|instance| Reservation {
                        instances: vec![instance],
                    })
                    .collect()
            })
            .collect();
        self.data.pages.insert(region.to_string(), pages);
        self
    }

    pub fn image(mut self, image_id: &str, name: Option<&str>) -> Self {
        self.data.images.insert(
            image_id.to_string(),
            Image {
                image_id: image_id.to_string(),
                name: name.map(str::to_string),
            },
        );
        self
    }

    pub fn status(mut self, status: InstanceStatus) -> Self {
        self.data
            .statuses
            .insert(status.instance_id.clone(), status);
        self
    }

    pub fn regions(mut self, regions: Vec<Region>) -> Self {
        self.data.regions = regions;
        self
    }

    /// Fail the listing page at `page` (0-based) in `region`
    pub fn fail_listing_page(mut self, region: &str, page: usize) -> Self {
        self.data.failing_pages.insert((region.to_string(), page));
        self
    }

    /// Fail every listing in `region`
    pub fn fail_listing(self, region: &str) -> Self {
        self.fail_listing_page(region, 0)
    }

    /// Keep handing back the first page's token in `region`
    pub fn stuck_pagination(mut self, region: &str) -> Self {
        self.data.stuck_pagination.insert(region.to_string());
        self
    }

    pub fn fail_image(mut self, image_id: &str) -> Self {
        self.data.failing_images.insert(image_id.to_string());
        self
    }

    pub fn fail_status(mut self, instance_id: &str) -> Self {
        self.data.failing_statuses.insert(instance_id.to_string());
        self
    }

    pub fn fail_regions(mut self) -> Self {
        self.data.fail_regions = true;
        self
    }

    /// Delay every call, so concurrent callers overlap
    pub fn latency(mut self, latency: Duration) -> Self {
        self.data.latency = Some(latency);
        self
    }

    pub fn build(self) -> StubEc2 {
        StubEc2 {
            region: self.region,
            state: Arc::new(StubState {
                data: self.data,
                calls: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl StubEc2 {
    /// Start building a stub whose default region is `region`
    pub fn builder(region: &str) -> StubEc2Builder {
        StubEc2Builder {
            region: region.to_string(),
            data: StubData::default(),
        }
    }

    /// Every call received so far, across all region-scoped views
    pub fn calls(&self) -> Vec<StubCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Number of listing pages requested in `region`
    pub fn page_requests(&self, region: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(c, StubCall::DescribeInstancesPage { region: r, .. } if r == region)
            })
            .count()
    }

    fn record(&self, call: StubCall) {
        self.state.calls.lock().unwrap().push(call);
    }

    async fn delay(&self) {
        if let Some(latency) = self.state.data.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn injected(message: String) -> ProviderError {
        ProviderError::Sdk {
            code: Some("InternalError".to_string()),
            message,
        }
    }
}

impl Ec2Provider for StubEc2 {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances_page(
        &self,
        _filters: &[InstanceFilter],
        max_results: i32,
        next_token: Option<String>,
    ) -> Result<ReservationPage, ProviderError> {
        self.record(StubCall::DescribeInstancesPage {
            region: self.region.clone(),
            max_results,
            next_token: next_token.clone(),
        });
        self.delay().await;

        let data = &self.state.data;
        let index = match next_token.as_deref() {
            None => 0,
            Some(token) => token
                .rsplit_once("/page-")
                .and_then(|(_, n)| n.parse::<usize>().ok())
                .ok_or_else(|| ProviderError::Sdk {
                    code: Some("InvalidParameterValue".to_string()),
                    message: format!("bad next token {token}"),
                })?,
        };

        if data.failing_pages.contains(&(self.region.clone(), index)) {
            return Err(Self::injected(format!(
                "injected failure listing page {index} in {}",
                self.region
            )));
        }

        let pages = data.pages.get(&self.region);
        let items = pages
            .and_then(|p| p.get(index))
            .cloned()
            .unwrap_or_default();
        let page_count = pages.map(Vec::len).unwrap_or(0);

        let next_token = if data.stuck_pagination.contains(&self.region) {
            Some(format!("{}/page-{}", self.region, index.max(1)))
        } else if index + 1 < page_count {
            Some(format!("{}/page-{}", self.region, index + 1))
        } else {
            None
        };

        Ok(ReservationPage {
            items,
            next_token,
        })
    }

    async fn describe_image(&self, image_id: &str) -> Result<Vec<Image>, ProviderError> {
        self.record(StubCall::DescribeImage(image_id.to_string()));
        self.delay().await;

        if self.state.data.failing_images.contains(image_id) {
            return Err(Self::injected(format!("injected failure describing {image_id}")));
        }
        Ok(self
            .state
            .data
            .images
            .get(image_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn describe_instance_status(
        &self,
        instance_id: &str,
    ) -> Result<Vec<InstanceStatus>, ProviderError> {
        self.record(StubCall::DescribeInstanceStatus(instance_id.to_string()));
        self.delay().await;

        if self.state.data.failing_statuses.contains(instance_id) {
            return Err(Self::injected(format!(
                "injected failure describing status of {instance_id}"
            )));
        }
        Ok(self
            .state
            .data
            .statuses
            .get(instance_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn describe_regions(&self) -> Result<Vec<Region>, ProviderError> {
        self.record(StubCall::DescribeRegions);
        self.delay().await;

        if self.state.data.fail_regions {
            return Err(ProviderError::AccessDenied {
                code: "UnauthorizedOperation".to_string(),
                message: "injected failure describing regions".to_string(),
            });
        }
        Ok(self.state.data.regions.clone())
    }

    fn for_region(&self, region: &str) -> Self {
        Self {
            region: region.to_string(),
            state: Arc::clone(&self.state),
        }
    }
}

/// An instance booted from `image_id`
pub fn instance(instance_id: &str, image_id: &str) -> Instance {
    Instance {
        state: Some("running".to_string()),
        ..Instance::new(instance_id).with_image(image_id)
    }
}

/// A status summary with one detail entry per `(name, status)` pair
pub fn summary(status: &str, details: &[(&str, &str)]) -> StatusSummary {
    StatusSummary {
        status: status.to_string(),
        details: details
            .iter()
            .map(|(name, status)| StatusDetail::new(*name, *status))
            .collect(),
    }
}

/// Status record for one instance
pub fn status(
    instance_id: &str,
    instance_status: StatusSummary,
    system_status: StatusSummary,
) -> InstanceStatus {
    InstanceStatus {
        instance_id: instance_id.to_string(),
        instance_status,
        system_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_chain_by_token() {
        let stub = StubEc2::builder("ap-southeast-2")
            .instance_pages(
                "ap-southeast-2",
                vec![vec![instance("i-1", "ami-1")], vec![instance("i-2", "ami-1")]],
            )
            .build();

        let first = stub.describe_instances_page(&[], 1000, None).await.unwrap();
        assert_eq!(first.items.len(), 1);
        let token = first.next_token.expect("second page exists");

        let second = stub
            .describe_instances_page(&[], 1000, Some(token))
            .await
            .unwrap();
        assert_eq!(second.items[0].instances[0].instance_id, "i-2");
        assert!(second.next_token.is_none());
        assert_eq!(stub.page_requests("ap-southeast-2"), 2);
    }

    #[tokio::test]
    async fn region_views_share_calls() {
        let stub = StubEc2::builder("ap-southeast-2")
            .instances("us-east-1", vec![instance("i-9", "ami-1")])
            .build();
        let east = stub.for_region("us-east-1");

        let page = east.describe_instances_page(&[], 1000, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(east.region(), "us-east-1");
        assert_eq!(stub.page_requests("us-east-1"), 1);
    }

    #[tokio::test]
    async fn unknown_image_describes_to_nothing() {
        let stub = StubEc2::builder("ap-southeast-2").build();
        assert!(stub.describe_image("ami-gone").await.unwrap().is_empty());
    }
}
