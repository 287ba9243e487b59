//! Step 1 of the hostname priority order: reverse DNS (PTR), always tried
//! first regardless of which ports are open.

use std::net::Ipv4Addr;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

pub async fn ptr_lookup(ip: Ipv4Addr) -> Option<String> {
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    let response = match resolver.reverse_lookup(ip.into()).await {
        Ok(r) => r,
        Err(e) => {
            debug!(%ip, error = %e, "PTR lookup failed");
            return None;
        }
    };
    response
        .iter()
        .next()
        .map(|name| name.to_string().trim_end_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ptr_lookup_on_unroutable_address_yields_none() {
        let ip: Ipv4Addr = "203.0.113.250".parse().unwrap();
        assert!(ptr_lookup(ip).await.is_none());
    }
}
