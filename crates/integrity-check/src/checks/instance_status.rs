//! Instances must pass their instance and system status checks

use super::{Check, CheckOutcome, CheckSettings, fan_out};
use crate::lister::list_all_instances;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use integrity_common::{
    Ec2Provider, Instance, InstanceStatus, Notice, NoticeLevel, StatusDetail, StatusSummary,
};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "instances-are-passing-status-checks";
pub const DESCRIPTION: &str = "Every instance reports ok instance-level and system-level status";

/// Detail entries to report for a status record, empty if it is passing
///
/// Only the failing summaries contribute. A failing summary without any
/// detail entries is reported as a single entry named after the summary.
pub fn failing_details(status: &InstanceStatus) -> Vec<StatusDetail> {
    [
        ("instance-status", &status.instance_status),
        ("system-status", &status.system_status),
    ]
    .into_iter()
    .filter(|(_, summary)| !summary.is_ok())
    .flat_map(|(label, summary)| summary_details(label, summary))
    .collect()
}

fn summary_details(label: &str, summary: &StatusSummary) -> Vec<StatusDetail> {
    if summary.details.is_empty() {
        vec![StatusDetail::new(label, summary.status.clone())]
    } else {
        summary.details.clone()
    }
}

/// Flags instances with impaired status checks
pub struct InstanceHealthCheck<P> {
    provider: Arc<P>,
    settings: CheckSettings,
}

impl<P: Ec2Provider> InstanceHealthCheck<P> {
    pub fn new(provider: Arc<P>, settings: CheckSettings) -> Self {
        Self { provider, settings }
    }

    async fn evaluate(&self) -> CheckOutcome {
        let instances = match list_all_instances(self.provider.as_ref(), &[])
            .await
            .context("listing all EC2 instances")
        {
            Ok(instances) => instances,
            Err(e) => return CheckOutcome::failed(e),
        };
        debug!(count = instances.len(), "Checking instance status");

        let (entries, errors) = fan_out(instances, &self.settings.limit, |instance| {
            let provider = Arc::clone(&self.provider);
            async move { impaired_status(provider.as_ref(), instance).await }
        })
        .await;

        CheckOutcome::from_findings(
            entries,
            errors,
            self.settings.partial_findings,
            failing_notice,
        )
    }
}

async fn impaired_status<P: Ec2Provider>(
    provider: &P,
    instance: Instance,
) -> Result<Option<(String, Vec<StatusDetail>)>> {
    let statuses = provider
        .describe_instance_status(&instance.instance_id)
        .await
        .with_context(|| format!("describing status of instance {}", instance.instance_id))?;

    // Stopped instances have no status record
    let failing: Vec<StatusDetail> = statuses.iter().flat_map(failing_details).collect();
    if failing.is_empty() {
        return Ok(None);
    }

    debug!(
        instance_id = %instance.instance_id,
        state = ?instance.state,
        availability_zone = ?instance.availability_zone,
        failing = failing.len(),
        "Instance is failing status checks"
    );
    Ok(Some((instance.instance_id, failing)))
}

fn failing_notice(failing: &BTreeMap<String, Vec<StatusDetail>>) -> Notice {
    let mut description = String::new();
    for (instance_id, details) in failing {
        let _ = writeln!(
            description,
            "Instance `{instance_id}` is failing {} status checks:",
            details.len()
        );
        for detail in details {
            let _ = writeln!(description, " - {} is in state: {}", detail.name, detail.status);
        }
    }

    Notice::new(
        NoticeLevel::Warning,
        format!("Found {} instances with failing status checks", failing.len()),
        description,
    )
    .with_offending_resources(failing.keys().cloned())
}

impl<P: Ec2Provider> Check for InstanceHealthCheck<P> {
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
