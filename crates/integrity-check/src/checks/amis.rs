//! Instances must boot from an approved image family

use super::{Check, CheckOutcome, CheckSettings, fan_out};
use crate::lister::list_all_instances;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use integrity_common::{Ec2Provider, Instance, Notice, NoticeLevel};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "instances-use-valid-amis";
pub const DESCRIPTION: &str = "Every instance runs an image from an allowed AMI family";

/// Recorded in place of the image name when the image has none
const UNNAMED_IMAGE: &str = "<unnamed>";

/// Whether `image_name` belongs to one of `allowed_families`
///
/// Families are matched as case-insensitive substrings of the image name.
pub fn is_valid_ami(image_name: &str, allowed_families: &[String]) -> bool {
    let image_name = image_name.to_lowercase();
    allowed_families
        .iter()
        .any(|family| image_name.contains(&family.to_lowercase()))
}

/// Flags instances whose image name falls outside the allowed families
pub struct AmiValidityCheck<P> {
    provider: Arc<P>,
    allowed_families: Arc<[String]>,
    settings: CheckSettings,
}

impl<P: Ec2Provider> AmiValidityCheck<P> {
    pub fn new(provider: Arc<P>, allowed_families: Vec<String>, settings: CheckSettings) -> Self {
        Self {
            provider,
            allowed_families: allowed_families.into(),
            settings,
        }
    }

    async fn evaluate(&self) -> CheckOutcome {
        let instances = match list_all_instances(self.provider.as_ref(), &[])
            .await
            .context("listing all EC2 instances")
        {
            Ok(instances) => instances,
            Err(e) => return CheckOutcome::failed(e),
        };
        debug!(count = instances.len(), "Checking instance images");

        let (entries, errors) = fan_out(instances, &self.settings.limit, |instance| {
            let provider = Arc::clone(&self.provider);
            let families = Arc::clone(&self.allowed_families);
            async move { invalid_image(provider.as_ref(), &families, instance).await }
        })
        .await;

        CheckOutcome::from_findings(
            entries,
            errors,
            self.settings.partial_findings,
            invalid_ami_notice,
        )
    }
}

fn invalid_ami_notice(invalid: &BTreeMap<String, String>) -> Notice {
    let mut description = String::new();
    for (instance_id, image_name) in invalid {
        let _ = writeln!(description, "Instance {instance_id} was using AMI: {image_name}");
    }

    Notice::new(
        NoticeLevel::Warning,
        format!("Found {} instances with invalid AMIs", invalid.len()),
        description,
    )
    .with_offending_resources(invalid.keys().cloned())
}

/// Describe the instance's image and return `(instance ID, image name)` if invalid
async fn invalid_image<P: Ec2Provider>(
    provider: &P,
    allowed_families: &[String],
    instance: Instance,
) -> Result<Option<(String, String)>> {
    let Some(image_id) = instance.image_id.as_deref() else {
        debug!(
            instance_id = %instance.instance_id,
            state = ?instance.state,
            "Instance has no image ID"
        );
        return Ok(None);
    };

    let images = provider.describe_image(image_id).await.with_context(|| {
        format!(
            "describing image {image_id} for instance {}",
            instance.instance_id
        )
    })?;

    let Some(name) = images
        .into_iter()
        .map(|image| image.name.unwrap_or_else(|| UNNAMED_IMAGE.to_string()))
        .find(|name| !is_valid_ami(name, allowed_families))
    else {
        return Ok(None);
    };

    debug!(
        instance_id = %instance.instance_id,
        image_id,
        image_name = %name,
        availability_zone = ?instance.availability_zone,
        "Instance uses an image outside the allowed families"
    );
    Ok(Some((instance.instance_id, name)))
}

impl<P: Ec2Provider> Check for AmiValidityCheck<P> {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn run(&self) -> BoxFuture<'_, CheckOutcome> {
        Box::pin(self.evaluate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::PartialFindings;
    use integrity_common::defaults::default_allowed_ami_families;
    use integrity_test_utils::{StubEc2, StubEc2Builder, instance};

    const REGION: &str = "ap-southeast-2";

    fn check(stub: StubEc2, settings: CheckSettings) -> AmiValidityCheck<StubEc2> {
        AmiValidityCheck::new(Arc::new(stub), default_allowed_ami_families(), settings)
    }

    fn fleet() -> StubEc2Builder {
        StubEc2::builder(REGION)
            .instances(
                REGION,
                vec![
                    instance("i-good", "ami-bionic"),
                    instance("i-bad", "ami-centos"),
                    instance("i-also-good", "ami-ecs"),
                ],
            )
            .image("ami-bionic", Some("ubuntu-bionic-18.04-amd64-server-20200112"))
            .image("ami-ecs", Some("AMZN2-AMI-ECS-HVM-2.0.20200115-x86_64-ebs"))
            .image("ami-centos", Some("centos-7-custom"))
    }

    #[test]
    fn predicate_matches_families_case_insensitively() {
        let families = default_allowed_ami_families();
        assert!(is_valid_ami("ubuntu-bionic-18.04-amd64-server", &families));
        assert!(is_valid_ami("Ubuntu-Focal-20.04-arm64", &families));
        assert!(!is_valid_ami("centos-7-custom", &families));
        assert!(!is_valid_ami("", &families));
    }

    #[tokio::test]
    async fn reports_only_invalid_images() {
        let outcome = check(fleet().build(), CheckSettings::default()).run().await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.notices.len(), 1);
        let notice = &outcome.notices[0];
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.title, "Found 1 instances with invalid AMIs");
        assert!(notice.description.contains("Instance i-bad was using AMI: centos-7-custom"));
        assert!(!notice.description.contains("i-good"));
        assert_eq!(notice.offending_resource_ids, vec!["i-bad"]);
    }

    #[tokio::test]
    async fn clean_fleet_passes() {
        let stub = StubEc2::builder(REGION)
            .instances(REGION, vec![instance("i-1", "ami-bionic")])
            .image("ami-bionic", Some("ubuntu-bionic-18.04-amd64-server"))
            .build();

        let outcome = check(stub, CheckSettings::default()).run().await;
        assert!(outcome.notices.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn unnamed_image_is_invalid_and_missing_image_is_not() {
        let stub = StubEc2::builder(REGION)
            .instances(
                REGION,
                vec![instance("i-unnamed", "ami-x"), instance("i-gone", "ami-deregistered")],
            )
            .image("ami-x", None)
            .build();

        let outcome = check(stub, CheckSettings::default()).run().await;
        assert_eq!(outcome.notices[0].offending_resource_ids, vec!["i-unnamed"]);
        assert!(outcome.notices[0].description.contains(UNNAMED_IMAGE));
    }

    #[tokio::test]
    async fn listing_failure_fails_the_check() {
        let stub = fleet().fail_listing(REGION).build();

        let outcome = check(stub.clone(), CheckSettings::default()).run().await;

        assert!(outcome.notices.is_empty());
        let error = outcome.error.expect("listing failure is reported");
        assert!(format!("{error:#}").contains("listing all EC2 instances"));
        // No per-instance calls once the listing has failed
        assert!(
            !stub
                .calls()
                .iter()
                .any(|c| matches!(c, integrity_test_utils::StubCall::DescribeImage(_)))
        );
    }

    #[tokio::test]
    async fn sub_task_failure_suppresses_findings_by_default() {
        let stub = fleet().fail_image("ami-bionic").build();

        let outcome = check(stub, CheckSettings::default()).run().await;

        assert!(outcome.notices.is_empty());
        let message = format!("{:#}", outcome.error.expect("error is reported"));
        assert!(message.contains("describing image ami-bionic for instance i-good"));
    }

    #[tokio::test]
    async fn sub_task_failure_with_report_policy_keeps_findings() {
        let stub = fleet().fail_image("ami-bionic").build();
        let settings = CheckSettings {
            partial_findings: PartialFindings::Report,
            ..Default::default()
        };

        let outcome = check(stub, settings).run().await;

        assert!(outcome.error.is_some());
        assert_eq!(outcome.notices.len(), 1);
        assert_eq!(outcome.notices[0].offending_resource_ids, vec!["i-bad"]);
    }

    #[tokio::test]
    async fn every_failure_is_kept() {
        let stub = fleet()
            .fail_image("ami-bionic")
            .fail_image("ami-centos")
            .fail_image("ami-ecs")
            .build();

        let outcome = check(stub, CheckSettings::default()).run().await;
        let message = format!("{:#}", outcome.error.expect("error is reported"));
        assert!(message.contains("3 errors occurred"));
        for id in ["i-good", "i-bad", "i-also-good"] {
            assert!(message.contains(&format!("for instance {id}")), "missing {id}");
        }
    }

    #[tokio::test]
    async fn check_is_rerunnable() {
        let c = check(fleet().build(), CheckSettings::default());
        let first = c.run().await;
        let second = c.run().await;
        assert_eq!(first.notices, second.notices);
    }
}
