//! Remote peer identity

use anyhow::{anyhow, Result};
use bluer::Address;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Stable identity of a remote device
///
/// Two identities are equal when their Bluetooth addresses are equal; the
/// display name is carried along for lookups by name and for logging.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    address: Address,
    name: String,
}

impl PeerIdentity {
    pub fn new(address: Address, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }

    /// Bluetooth MAC address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Parses `AA:BB:CC:DD:EE:FF` or `AA:BB:CC:DD:EE:FF=Name`
impl FromStr for PeerIdentity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, name) = match s.split_once('=') {
            Some((addr, name)) => (addr, name.to_string()),
            None => (s, s.to_string()),
        };
        let address = Address::from_str(addr.trim())
            .map_err(|e| anyhow!("Invalid Bluetooth address '{}': {}", addr, e))?;
        Ok(Self::new(address, name))
    }
}
