//! Compliance checks
//!
//! Every check lists the resources it cares about, fans out one provider
//! call per resource (see [`fanout`]), and folds the per-resource verdicts
//! into at most one [`Notice`] plus an aggregated error.
//!
//! Checks are independent: they share no mutable state and each gets its
//! provider handle injected at construction.

pub mod amis;
pub mod fanout;
pub mod instance_status;
pub mod regions;

pub use amis::AmiValidityCheck;
pub use fanout::{ConcurrencyLimit, fan_out};
pub use instance_status::InstanceHealthCheck;
pub use regions::RegionComplianceCheck;

use crate::config::PolicyConfig;
use anyhow::bail;
use futures::future::BoxFuture;
use integrity_common::{AggregateError, Ec2Provider, Notice};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named unit of policy evaluation
pub trait Check: Send + Sync {
    /// Stable identifier, used in logs and error context
    fn name(&self) -> &str;

    /// One-line summary of the policy the check enforces
    fn description(&self) -> &str;

    /// Evaluate the policy against the provider
    fn run(&self) -> BoxFuture<'_, CheckOutcome>;
}

/// Result of one check run
///
/// Findings and failures are independent channels: a run may report
/// neither, either, or (with [`PartialFindings::Report`]) both.
#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub notices: Vec<Notice>,
    pub error: Option<anyhow::Error>,
}

impl CheckOutcome {
    /// No findings, no failures
    pub fn clean() -> Self {
        Self::default()
    }

    /// The check could not reach a verdict
    pub fn failed(error: anyhow::Error) -> Self {
        Self {
            notices: Vec::new(),
            error: Some(error),
        }
    }

    /// Fold fan-out results into an outcome
    ///
    /// With [`PartialFindings::Suppress`] any sub-task failure hides the
    /// findings, since resources that could not be evaluated would otherwise
    /// read as compliant. An empty `entries` map produces no notice.
    pub fn from_findings<V>(
        entries: BTreeMap<String, V>,
        errors: AggregateError,
        policy: PartialFindings,
        notice: impl FnOnce(&BTreeMap<String, V>) -> Notice,
    ) -> Self {
        let error = errors.into_option().map(anyhow::Error::new);

        if error.is_some() && policy == PartialFindings::Suppress {
            return Self {
                notices: Vec::new(),
                error,
            };
        }

        let notices = if entries.is_empty() {
            Vec::new()
        } else {
            vec![notice(&entries)]
        };
        Self { notices, error }
    }
}

/// What a check reports when some of its sub-tasks failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartialFindings {
    /// Report only the error
    #[default]
    Suppress,
    /// Report the findings that were reached alongside the error
    Report,
}

/// Settings shared by every check's fan-out
#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    pub limit: ConcurrencyLimit,
    pub partial_findings: PartialFindings,
}

/// Construct every compiled-in check against `provider`
pub fn all<P: Ec2Provider>(
    provider: Arc<P>,
    policy: &PolicyConfig,
    settings: &CheckSettings,
) -> Vec<Arc<dyn Check>> {
    vec![
        Arc::new(RegionComplianceCheck::new(
            Arc::clone(&provider),
            &policy.home_region,
            settings.clone(),
        )),
        Arc::new(AmiValidityCheck::new(
            Arc::clone(&provider),
            policy.allowed_ami_families.clone(),
            settings.clone(),
        )),
        Arc::new(InstanceHealthCheck::new(provider, settings.clone())),
    ]
}

/// Names and descriptions of the compiled-in checks, without constructing them
pub fn catalog(policy: &PolicyConfig) -> Vec<(String, &'static str)> {
    vec![
        (regions::check_name(&policy.home_region), regions::DESCRIPTION),
        (amis::NAME.to_string(), amis::DESCRIPTION),
        (instance_status::NAME.to_string(), instance_status::DESCRIPTION),
    ]
}

/// Narrow `checks` down by name
///
/// An empty `only` keeps everything. Unknown names in either list are an
/// error, so a typo cannot silently disable a check.
pub fn select(
    checks: Vec<Arc<dyn Check>>,
    only: &[String],
    skip: &[String],
) -> anyhow::Result<Vec<Arc<dyn Check>>> {
    let known: Vec<&str> = checks.iter().map(|c| c.name()).collect();
    for name in only.iter().chain(skip) {
        if !known.contains(&name.as_str()) {
            bail!(
                "unknown check {name:?} (available: {})",
                known.join(", ")
            );
        }
    }

    Ok(checks
        .into_iter()
        .filter(|c| only.is_empty() || only.iter().any(|n| n == c.name()))
        .filter(|c| !skip.iter().any(|n| n == c.name()))
        .collect())
}
