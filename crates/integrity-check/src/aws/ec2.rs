//! EC2 provider backed by the AWS SDK

use super::context::AwsContext;
use super::error::classify_sdk_error;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{self as ec2, Filter, InstanceStatusSummary};
use integrity_common::{
    Ec2Provider, Image, Instance, InstanceFilter, InstanceStatus, ProviderError, Region,
    Reservation, ReservationPage, StatusDetail, StatusSummary,
};
use tracing::debug;

/// Status recorded when EC2 omits a summary or a field of one
const UNKNOWN: &str = "unknown";

/// EC2 client scoped to one region
#[derive(Clone)]
pub struct Ec2Client {
    ctx: AwsContext,
    client: Client,
    region: String,
}

impl Ec2Client {
    /// Create an EC2 client for the context's region
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            ctx: ctx.clone(),
            client: ctx.ec2_client(),
            region: ctx.region().to_string(),
        }
    }
}

impl std::fmt::Debug for Ec2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ec2Client")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl Ec2Provider for Ec2Client {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances_page(
        &self,
        filters: &[InstanceFilter],
        max_results: i32,
        next_token: Option<String>,
    ) -> Result<ReservationPage, ProviderError> {
        let filters: Vec<Filter> = filters
            .iter()
            .map(|f| {
                Filter::builder()
                    .name(&f.name)
                    .set_values(Some(f.values.clone()))
                    .build()
            })
            .collect();

        let response = self
            .client
            .describe_instances()
            .set_filters((!filters.is_empty()).then_some(filters))
            .max_results(max_results)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let items: Vec<Reservation> = response
            .reservations()
            .iter()
            .map(convert_reservation)
            .collect();
        debug!(
            region = %self.region,
            reservations = items.len(),
            more = response.next_token().is_some(),
            "Fetched instance page"
        );

        Ok(ReservationPage {
            items,
            next_token: response
                .next_token()
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }

    async fn describe_image(&self, image_id: &str) -> Result<Vec<Image>, ProviderError> {
        let response = self
            .client
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(response.images().iter().filter_map(convert_image).collect())
    }

    async fn describe_instance_status(
        &self,
        instance_id: &str,
    ) -> Result<Vec<InstanceStatus>, ProviderError> {
        let response = self
            .client
            .describe_instance_status()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(response
            .instance_statuses()
            .iter()
            .filter_map(convert_instance_status)
            .collect())
    }

    async fn describe_regions(&self) -> Result<Vec<Region>, ProviderError> {
        let response = self
            .client
            .describe_regions()
            .all_regions(true)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(response
            .regions()
            .iter()
            .filter_map(|r| {
                Some(Region {
                    name: r.region_name()?.to_string(),
                    opt_in_status: r.opt_in_status().map(str::to_string),
                })
            })
            .collect())
    }

    fn for_region(&self, region: &str) -> Self {
        Self {
            ctx: self.ctx.clone(),
            client: self.ctx.ec2_client_for_region(region),
            region: region.to_string(),
        }
    }
}

fn convert_reservation(reservation: &ec2::Reservation) -> Reservation {
    Reservation {
        instances: reservation
            .instances()
            .iter()
            .filter_map(convert_instance)
            .collect(),
    }
}

fn convert_instance(instance: &ec2::Instance) -> Option<Instance> {
    Some(Instance {
        instance_id: instance.instance_id()?.to_string(),
        image_id: instance.image_id().map(str::to_string),
        state: instance
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str().to_string()),
        availability_zone: instance
            .placement()
            .and_then(|p| p.availability_zone())
            .map(str::to_string),
    })
}

fn convert_image(image: &ec2::Image) -> Option<Image> {
    Some(Image {
        image_id: image.image_id()?.to_string(),
        name: image.name().map(str::to_string),
    })
}

fn convert_instance_status(status: &ec2::InstanceStatus) -> Option<InstanceStatus> {
    Some(InstanceStatus {
        instance_id: status.instance_id()?.to_string(),
        instance_status: convert_summary(status.instance_status()),
        system_status: convert_summary(status.system_status()),
    })
}

fn convert_summary(summary: Option<&InstanceStatusSummary>) -> StatusSummary {
    let Some(summary) = summary else {
        return StatusSummary {
            status: UNKNOWN.to_string(),
            details: Vec::new(),
        };
    };

    StatusSummary {
        status: summary
            .status()
            .map(|s| s.as_str())
            .unwrap_or(UNKNOWN)
            .to_string(),
        details: summary
            .details()
            .iter()
            .map(|d| {
                StatusDetail::new(
                    d.name().map(|n| n.as_str()).unwrap_or(UNKNOWN),
                    d.status().map(|s| s.as_str()).unwrap_or(UNKNOWN),
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{
        InstanceState, InstanceStateName, InstanceStatusDetails, Placement, StatusName,
        StatusType, SummaryStatus,
    };

    #[test]
    fn converts_instance_fields() {
        let sdk = ec2::Instance::builder()
            .instance_id("i-0abc")
            .image_id("ami-123")
            .state(InstanceState::builder().name(InstanceStateName::Running).build())
            .placement(Placement::builder().availability_zone("ap-southeast-2a").build())
            .build();

        let instance = convert_instance(&sdk).expect("instance has an ID");
        assert_eq!(instance.instance_id, "i-0abc");
        assert_eq!(instance.image_id.as_deref(), Some("ami-123"));
        assert_eq!(instance.state.as_deref(), Some("running"));
        assert_eq!(instance.availability_zone.as_deref(), Some("ap-southeast-2a"));
    }

    #[test]
    fn instance_without_id_is_dropped() {
        let sdk = ec2::Instance::builder().image_id("ami-123").build();
        assert!(convert_instance(&sdk).is_none());
    }

    #[test]
    fn converts_status_summary() {
        let sdk = InstanceStatusSummary::builder()
            .status(SummaryStatus::Impaired)
            .details(
                InstanceStatusDetails::builder()
                    .name(StatusName::Reachability)
                    .status(StatusType::Failed)
                    .build(),
            )
            .build();

        let summary = convert_summary(Some(&sdk));
        assert_eq!(summary.status, "impaired");
        assert_eq!(summary.details, vec![StatusDetail::new("reachability", "failed")]);
        assert!(!summary.is_ok());
    }

    #[test]
    fn missing_summary_is_not_ok() {
        let summary = convert_summary(None);
        assert_eq!(summary.status, UNKNOWN);
        assert!(!summary.is_ok());
    }
}
