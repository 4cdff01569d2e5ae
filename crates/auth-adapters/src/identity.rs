//! Identity by network address.

use std::net::IpAddr;

use domains::{IdentityKey, IdentityResolver, RequestOrigin};

/// Resolves the caller to the textual form of their IP address, without the
/// port. A trusted forwarding header wins over the socket peer when present.
#[derive(Debug, Clone, Default)]
pub struct AddressIdentityResolver {
    loopback_alias: Option<IdentityKey>,
}

impl AddressIdentityResolver {
    pub fn new(loopback_alias: Option<IdentityKey>) -> Self {
        Self { loopback_alias }
    }

    fn forwarded_address(value: &str) -> Option<IpAddr> {
        // Proxies append; the left-most entry is the original client.
        value.split(',').next()?.trim().parse().ok()
    }
}

impl IdentityResolver for AddressIdentityResolver {
    fn resolve(&self, origin: &RequestOrigin) -> Option<IdentityKey> {
        let address = origin
            .forwarded
            .as_deref()
            .and_then(Self::forwarded_address)
            .or(origin.peer)?;

        match &self.loopback_alias {
            Some(alias) if address.is_loopback() => Some(alias.clone()),
            _ => Some(IdentityKey::new(address.to_string())),
        }
    }
}
