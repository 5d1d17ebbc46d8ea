//! AWS account identity

use anyhow::{Context, Result};
use tracing::info;

/// Strongly-typed AWS account ID (12-digit string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct AccountId(String);

/// Fetch the account ID of the current credentials via STS GetCallerIdentity
///
/// Requires no permissions, so it doubles as an early credentials check
/// before the checks fan out.
pub async fn get_current_account_id(sts: &aws_sdk_sts::Client) -> Result<AccountId> {
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .context("Failed to get AWS caller identity - check credentials")?;

    let account = identity
        .account()
        .context("No account ID returned from STS GetCallerIdentity")?;

    info!(account_id = %account, "Auditing AWS account");

    Ok(AccountId(account.to_string()))
}
