//! DNS-based peer discovery.
//!
//! Every replica shares one service name; its A records enumerate the
//! cluster. Discovery runs once at startup: resolve the service name,
//! drop our own address, reverse-resolve the rest to hostnames. The
//! result is fixed for the lifetime of the process.

use crate::config::Config;
use crate::error::StartupError;
use crate::types::NodeId;
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, info};

/// Resolve the A records of `name`.
pub async fn lookup_cluster(
    resolver: &TokioAsyncResolver,
    name: &str,
) -> Result<Vec<IpAddr>, StartupError> {
    let lookup = resolver.lookup_ip(name).await?;
    Ok(lookup.iter().collect())
}

/// Reverse-resolve `address` to its canonical hostname.
pub async fn hostname_for(
    resolver: &TokioAsyncResolver,
    address: IpAddr,
) -> Result<NodeId, StartupError> {
    let lookup = resolver.reverse_lookup(address).await?;
    let name = lookup
        .iter()
        .next()
        .ok_or_else(|| StartupError::UnresolvedHost(address.to_string()))?;
    Ok(canonical_name(&name.to_string()))
}

/// Enumerate the other replicas of this service.
pub async fn discover_peers(config: &Config) -> Result<HashMap<NodeId, IpAddr>, StartupError> {
    let resolver = TokioAsyncResolver::tokio_from_system_conf()?;

    let addresses = lookup_cluster(&resolver, &config.app_name).await?;
    if let Some(expected) = config.num_replicas {
        if addresses.len() != expected {
            return Err(StartupError::ReplicaCountMismatch {
                expected,
                found: addresses.len(),
            });
        }
    }

    let own_address = lookup_cluster(&resolver, &config.hostname)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StartupError::UnresolvedHost(config.hostname.clone()))?;
    debug!("own address: {} :: {}", config.hostname, own_address);

    let mut peers = HashMap::new();
    for address in addresses {
        if address == own_address {
            continue;
        }
        let hostname = hostname_for(&resolver, address).await?;
        info!("discovered replica {} at {}", hostname, address);
        peers.insert(hostname, address);
    }

    validate_cluster_size(peers.len())?;
    Ok(peers)
}

/// A majority is only unambiguous when the cluster size (peers + self)
/// is odd.
pub fn validate_cluster_size(peer_count: usize) -> Result<(), StartupError> {
    if peer_count % 2 != 0 {
        return Err(StartupError::EvenClusterSize {
            size: peer_count + 1,
        });
    }
    Ok(())
}

/// Strip the trailing dot of a fully qualified DNS name.
fn canonical_name(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_cluster_sizes_accepted() {
        assert!(validate_cluster_size(0).is_ok());
        assert!(validate_cluster_size(2).is_ok());
        assert!(validate_cluster_size(4).is_ok());
    }

    #[test]
    fn test_even_cluster_sizes_rejected() {
        assert!(matches!(
            validate_cluster_size(1),
            Err(StartupError::EvenClusterSize { size: 2 })
        ));
        assert!(matches!(
            validate_cluster_size(3),
            Err(StartupError::EvenClusterSize { size: 4 })
        ));
    }

    #[test]
    fn test_canonical_name_strips_trailing_dot() {
        assert_eq!(canonical_name("replica-2.ccs.local."), "replica-2.ccs.local");
        assert_eq!(canonical_name("replica-2.ccs.local"), "replica-2.ccs.local");
    }
}
