//! Paginated resource listing
//!
//! Follows continuation tokens until the provider reports the listing is
//! exhausted. A failure on any page fails the whole listing: a partial
//! inventory would let violations on unlisted resources pass silently.

use integrity_common::defaults::DEFAULT_PAGE_SIZE;
use integrity_common::{Ec2Provider, Instance, InstanceFilter, Page, ProviderError, Reservation};
use std::future::Future;
use tracing::debug;

/// Collect every item of a paginated listing.
///
/// `fetch` is called with `None` for the first page and with each returned
/// continuation token after that. No retries: the first error is returned
/// and everything collected so far is discarded.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ProviderError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ProviderError>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = fetch(token.clone()).await?;
        items.extend(page.items);

        match page.next_token {
            None => break,
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                return Err(ProviderError::Pagination { token: next });
            }
            Some(next) => token = Some(next),
        }
    }

    Ok(items)
}

/// Every reservation in the provider's region matching `filters`
pub async fn list_all_reservations<P: Ec2Provider>(
    provider: &P,
    filters: &[InstanceFilter],
) -> Result<Vec<Reservation>, ProviderError> {
    let reservations = collect_pages(|token| {
        provider.describe_instances_page(filters, DEFAULT_PAGE_SIZE, token)
    })
    .await?;

    debug!(
        region = %provider.region(),
        count = reservations.len(),
        "Listed reservations"
    );
    Ok(reservations)
}

/// Every instance in the provider's region matching `filters`
pub async fn list_all_instances<P: Ec2Provider>(
    provider: &P,
    filters: &[InstanceFilter],
) -> Result<Vec<Instance>, ProviderError> {
    let reservations = list_all_reservations(provider, filters).await?;
    Ok(instances_for_reservations(reservations))
}

/// Flatten reservations into their instances
pub fn instances_for_reservations(reservations: Vec<Reservation>) -> Vec<Instance> {
    reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .collect()
}
