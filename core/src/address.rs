//! Address planning for provisioned networks.
//!
//! Derives the netmask, gateway and usable address range handed to the
//! provisioner from a network's CIDR block. The three addresses reuse the first
//! three octets of the address *as written* and append a fixed host octet:
//!
//! | Field | Host octet |
//! |---|---|
//! | gateway | `.1` |
//! | start address | `.5` |
//! | end address | `.250` |
//!
//! # Example
//!
//! ```
//! use netsaga_core::address::AddressPlan;
//!
//! let plan = AddressPlan::from_cidr("10.64.0.0/24").unwrap();
//! assert_eq!(plan.netmask, "255.255.255.0");
//! assert_eq!(plan.gateway, "10.64.0.1");
//! assert_eq!(plan.start_address, "10.64.0.5");
//! assert_eq!(plan.end_address, "10.64.0.250");
//! ```

use std::net::Ipv4Addr;
use thiserror::Error;

/// Host octet of the gateway address.
pub const GATEWAY_OCTET: u8 = 1;

/// Host octet of the first usable address.
pub const START_OCTET: u8 = 5;

/// Host octet of the last usable address.
pub const END_OCTET: u8 = 250;

/// Errors produced while parsing a CIDR block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The block has no `/prefix` part.
    #[error("CIDR block '{0}' has no prefix length")]
    MissingPrefix(String),

    /// The address part is not a dotted-quad IPv4 address.
    #[error("Invalid IPv4 address in CIDR block '{0}'")]
    InvalidAddress(String),

    /// The prefix is not a number in `0..=32`.
    #[error("Invalid prefix length in CIDR block '{cidr}': {prefix}")]
    InvalidPrefix {
        /// The offending block
        cidr: String,
        /// The prefix as written
        prefix: String,
    },
}

/// Addressing facts derived from a CIDR block.
///
/// The [`Default`] value (every field empty) is the degraded plan used when
/// the block cannot be parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressPlan {
    /// Dotted-quad netmask for the prefix length
    pub netmask: String,
    /// Gateway address (`x.y.z.1`)
    pub gateway: String,
    /// First usable address (`x.y.z.5`)
    pub start_address: String,
    /// Last usable address (`x.y.z.250`)
    pub end_address: String,
}

impl AddressPlan {
    /// Plan the addresses for a CIDR block such as `10.64.0.0/24`.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] when the block is not `a.b.c.d/prefix` with a
    /// valid IPv4 address and a prefix length of at most 32.
    pub fn from_cidr(cidr: &str) -> Result<Self, AddressError> {
        let trimmed = cidr.trim();
        let (address, prefix) = trimmed
            .split_once('/')
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;

        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| AddressError::InvalidAddress(trimmed.to_string()))?;

        let prefix_len = prefix
            .parse::<u8>()
            .ok()
            .filter(|bits| *bits <= 32 && !prefix.starts_with('+'))
            .ok_or_else(|| AddressError::InvalidPrefix {
                cidr: trimmed.to_string(),
                prefix: prefix.to_string(),
            })?;

        let [a, b, c, _] = address.octets();
        let host = |octet: u8| Ipv4Addr::new(a, b, c, octet).to_string();

        Ok(Self {
            netmask: netmask(prefix_len).to_string(),
            gateway: host(GATEWAY_OCTET),
            start_address: host(START_OCTET),
            end_address: host(END_OCTET),
        })
    }

    /// Plan the addresses for a range, degrading to an empty plan on error.
    ///
    /// A malformed range is logged, never fatal: the provisioner receives
    /// empty addressing fields instead.
    #[must_use]
    pub fn for_range(cidr: &str) -> Self {
        Self::from_cidr(cidr).unwrap_or_else(|error| {
            tracing::warn!(range = %cidr, error = %error, "Could not plan network addresses");
            Self::degraded()
        })
    }

    /// The empty plan handed out for unparseable ranges.
    #[must_use]
    pub fn degraded() -> Self {
        Self::default()
    }

    /// Whether this is the degraded (empty) plan.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.netmask.is_empty()
    }
}

/// Netmask for a prefix length (`24` → `255.255.255.0`).
///
/// Prefix lengths above 32 saturate to `255.255.255.255`.
#[must_use]
pub fn netmask(prefix_len: u8) -> Ipv4Addr {
    let bits = match prefix_len {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len.min(32))),
    };
    Ipv4Addr::from(bits)
}
