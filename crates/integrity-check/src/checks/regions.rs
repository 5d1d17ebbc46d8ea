//! Instances must only run in the home region

use super::{Check, CheckOutcome, CheckSettings, fan_out};
use crate::lister::list_all_instances;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use integrity_common::{Ec2Provider, Notice, NoticeLevel, Region};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

pub const DESCRIPTION: &str = "No instances run outside the home region";

/// Name of the region check for `home_region`
pub fn check_name(home_region: &str) -> String {
    format!("instances-run-in-{home_region}")
}

/// Flags every region other than the home region that has instances
pub struct RegionComplianceCheck<P> {
    provider: Arc<P>,
    home_region: String,
    name: String,
    settings: CheckSettings,
}

impl<P: Ec2Provider> RegionComplianceCheck<P> {
    pub fn new(provider: Arc<P>, home_region: &str, settings: CheckSettings) -> Self {
        Self {
            provider,
            home_region: home_region.to_string(),
            name: check_name(home_region),
            settings,
        }
    }

    /// Regions that can be queried, minus the home region
    fn foreign_regions(&self, regions: Vec<Region>) -> Vec<String> {
        regions
            .into_iter()
            .filter(|region| {
                if region.name == self.home_region {
                    return false;
                }
                if !region.is_enabled() {
                    debug!(region = %region.name, "Skipping region not enabled for this account");
                    return false;
                }
                true
            })
            .map(|region| region.name)
            .collect()
    }

    async fn evaluate(&self) -> CheckOutcome {
        let regions = match self
            .provider
            .describe_regions()
            .await
            .context("describing AWS regions")
        {
            Ok(regions) => self.foreign_regions(regions),
            Err(e) => return CheckOutcome::failed(e),
        };
        debug!(count = regions.len(), home_region = %self.home_region, "Checking regions");

        let (entries, errors) = fan_out(regions, &self.settings.limit, |region| {
            let provider = self.provider.for_region(&region);
            async move { instances_in_region(&provider, region).await }
        })
        .await;

        CheckOutcome::from_findings(entries, errors, self.settings.partial_findings, |entries| {
            self.notice(entries)
        })
    }

    fn notice(&self, counts: &BTreeMap<String, usize>) -> Notice {
        let total: usize = counts.values().sum();
        let mut description = String::new();
        for (region, count) in counts {
            let _ = writeln!(description, "{count} instances in the {region} region");
        }

        Notice::new(
            NoticeLevel::Error,
            format!(
                "Found {total} instances in regions outside {}",
                self.home_region
            ),
            description,
        )
        .with_offending_resources(counts.keys().cloned())
    }
}

async fn instances_in_region<P: Ec2Provider>(
    provider: &P,
    region: String,
) -> Result<Option<(String, usize)>> {
    let count = list_all_instances(provider, &[])
        .await
        .with_context(|| format!("describing instances for region {region}"))?
        .len();

    debug!(region = %region, count, "Listed instances");
    Ok((count > 0).then_some((region, count)))
}

impl<P: Ec2Provider> Check for RegionComplianceCheck<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn run(&self) -> BoxFuture<'_, CheckOutcome> {
        Box::pin(self.evaluate())
    }
}
