//! AWS client modules
//!
//! This module provides wrappers around AWS SDK clients for:
//! - EC2: the read-only calls the checks need, behind `Ec2Provider`
//! - STS: account ID lookup

pub mod account;
pub mod context;
pub mod ec2;
pub mod error;

pub use account::{AccountId, get_current_account_id};
pub use context::AwsContext;
pub use ec2::Ec2Client;
pub use error::{classify_aws_error, classify_sdk_error};
