//! Configuration types for an audit run

use crate::checks::{CheckSettings, ConcurrencyLimit, PartialFindings};
use integrity_common::defaults::{
    DEFAULT_HOME_REGION, DEFAULT_REGION, default_allowed_ami_families,
};

/// How the report is rendered on stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// AWS connection configuration
#[derive(Debug, Clone)]
pub struct AwsConfig {
    /// Region the SDK client is created in (and the default scope of listings)
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub aws_profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            aws_profile: None,
        }
    }
}

/// What counts as compliant
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// The only region instances may run in
    pub home_region: String,
    /// Image name substrings that mark an AMI as approved
    pub allowed_ami_families: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            home_region: DEFAULT_HOME_REGION.to_string(),
            allowed_ami_families: default_allowed_ami_families(),
        }
    }
}

/// How checks are run
#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    /// Cap on concurrent provider calls per check; `None` is unbounded
    pub max_concurrency: Option<usize>,
    pub partial_findings: PartialFindings,
    /// Run only these checks (all when empty)
    pub only: Vec<String>,
    /// Never run these checks
    pub skip: Vec<String>,
}

impl ExecutionConfig {
    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            limit: ConcurrencyLimit::new(self.max_concurrency),
            partial_findings: self.partial_findings,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Configuration for an audit run
///
/// Composed of focused sub-configs, each consumed by one part of the run.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub aws: AwsConfig,
    pub policy: PolicyConfig,
    pub execution: ExecutionConfig,
    pub output: OutputConfig,
}
