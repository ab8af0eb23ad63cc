//! DNS seeding (§4.4): resolving hardcoded mainnet seed hostnames into
//! wave-0 addresses.

use std::collections::HashMap;
use std::net::ToSocketAddrs;

use crawler_chain::Address;

use crate::constants::{DEFAULT_MAINNET_PORT, DNS_SEEDS};

/// Resolve every hardcoded seed hostname to a list of addresses.
///
/// A seed's lookup failure is logged and that seed's list becomes empty; it
/// never aborts the others (§4.4). Duplicates within one seed's reply are
/// kept as a list, not deduplicated, so a misbehaving seed is visible to
/// whoever inspects `nodes_by_seed` later.
///
/// `std::net::ToSocketAddrs` performs a blocking resolution, so this is run
/// on a blocking thread by the caller (`Engine::start`); kept a plain
/// synchronous function here so it can also be unit-tested without an async
/// runtime.
pub fn resolve_seeds() -> HashMap<String, Vec<Address>> {
    resolve_seed_list(&DNS_SEEDS)
}

fn resolve_seed_list(seeds: &[&str]) -> HashMap<String, Vec<Address>> {
    let mut addrs_by_seed = HashMap::with_capacity(seeds.len());
    let mut total = 0usize;
    for &host in seeds {
        let addrs = match (host, DEFAULT_MAINNET_PORT).to_socket_addrs() {
            Ok(resolved) => resolved.map(|sock| Address::now(sock.ip().to_string(), sock.port())).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(seed = host, error = %e, "DNS seed lookup failed");
                Vec::new()
            }
        };
        tracing::debug!(seed = host, count = addrs.len(), "resolved DNS seed");
        total += addrs.len();
        addrs_by_seed.insert(host.to_owned(), addrs);
    }
    tracing::info!(total, seeds = seeds.len(), "finished DNS seeding");
    addrs_by_seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_seed_yields_empty_list_not_an_error() {
        let result = resolve_seed_list(&["this-host-does-not-resolve.invalid"]);
        assert_eq!(result.len(), 1);
        assert!(result["this-host-does-not-resolve.invalid"].is_empty());
    }

    #[test]
    fn full_seed_list_has_nine_hosts() {
        assert_eq!(DNS_SEEDS.len(), 9);
    }
}
