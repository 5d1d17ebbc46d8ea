//! Default policy values
//!
//! These are the compiled-in policy defaults. Every one of them can be
//! overridden from the command line.

/// Region the SDK client connects to when none is configured
pub const DEFAULT_REGION: &str = "ap-southeast-2";

/// Region every instance is expected to run in
pub const DEFAULT_HOME_REGION: &str = "ap-southeast-2";

/// Image name families instances are allowed to boot from
///
/// Matched as case-insensitive substrings of the image name.
pub const DEFAULT_ALLOWED_AMI_FAMILIES: &[&str] = &[
    "amzn2-ami-ecs-hvm-2.0",
    "ubuntu-bionic-18.04",
    "ubuntu-focal-20.04",
];

/// Page size requested from paginated listing calls (the EC2 maximum)
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Status value reported by EC2 for a passing status check
pub const STATUS_OK: &str = "ok";

/// Region opt-in status for regions that cannot be queried
pub const REGION_NOT_OPTED_IN: &str = "not-opted-in";

/// Returns the default allowed AMI families as owned strings
pub fn default_allowed_ami_families() -> Vec<String> {
    DEFAULT_ALLOWED_AMI_FAMILIES
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}
