//! Blocking hostname resolution.
//!
//! One synchronous getaddrinfo call per request, made before any socket is
//! opened. Everything past this point in the pipeline is non-blocking.

use std::io;
use std::net::{IpAddr, ToSocketAddrs};

use thiserror::Error;

/// Errors from [`resolve`]. Zero candidates is deliberately distinct from a
/// lookup failure.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The OS resolver reported an error.
    #[error("lookup failed for '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },
    /// The lookup succeeded but returned no addresses.
    #[error("no addresses found for '{0}'")]
    NoAddresses(String),
}

/// Resolve `hostname` to its candidate addresses, in resolver order.
///
/// Blocking. Callers try the candidates in the order returned until one
/// accepts a connection.
pub fn resolve(hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
    log::debug!("resolving '{hostname}'");

    // Port 0 here: ToSocketAddrs needs one, but only the addresses are kept.
    let addrs = (hostname, 0u16)
        .to_socket_addrs()
        .map_err(|source| ResolveError::Lookup {
            host: hostname.to_string(),
            source,
        })?;

    let candidates: Vec<IpAddr> = addrs.map(|sa| sa.ip()).collect();
    if candidates.is_empty() {
        return Err(ResolveError::NoAddresses(hostname.to_string()));
    }

    log::debug!("'{hostname}' has {} candidate(s): {candidates:?}", candidates.len());
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_numeric_address_without_dns() {
        let addrs = resolve("127.0.0.1").unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn resolves_localhost() {
        let addrs = resolve("localhost").unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.is_loopback()));
    }

    #[test]
    fn unresolvable_host_is_an_error() {
        // .invalid is reserved and never resolves (RFC 2606).
        assert!(resolve("does-not-exist.invalid").is_err());
    }
}
