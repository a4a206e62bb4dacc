use std::net::IpAddr;

use tracing::debug;

use crate::{
    config::IpVersion,
    error::{PingError, Result},
};

/// Look `host` up and pick one address of the requested family.
///
/// IP literals resolve to themselves. A lookup failure is
/// [`PingError::Resolve`]; a host without an address of `version` is
/// [`PingError::FamilyUnsupported`].
pub async fn resolve(host: &str, version: IpVersion) -> Result<IpAddr> {
    let candidates = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| PingError::Resolve {
            host: host.to_string(),
            source,
        })?
        .map(|addr| addr.ip())
        .collect::<Vec<_>>();
    debug!(host, ?candidates, "resolved");
    select_address(host, candidates, version)
}

/// The first candidate whose family is `version`.
///
/// The resolver makes no promise about ordering or family mix, so each
/// candidate is inspected rather than picked by position.
pub fn select_address<I>(host: &str, candidates: I, version: IpVersion) -> Result<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    candidates
        .into_iter()
        .find(|addr| version.matches(addr))
        .ok_or_else(|| PingError::FamilyUnsupported {
            host: host.to_string(),
            version,
        })
}
