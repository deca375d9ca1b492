//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Ethernet hardware address, as carried in EVPN MAC/IP routes and in the
// kernel's NDA_LLADDR attribute.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MacAddr([u8; 6]);

/// Error type for MAC address parsing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MacParseError;

// ===== impl MacAddr =====

impl MacAddr {
    pub fn as_bytes(&self) -> [u8; 6] {
        self.0
    }

    // The all-zeroes address, used by the kernel for unknown-unicast flood
    // entries. Never a learnable host address.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0u8; 6]
    }

    // Group addresses (broadcast included) carry the I/G bit.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

// Netlink link-layer address attributes arrive as raw byte slices; only
// six-octet Ethernet addresses are accepted.
impl TryFrom<&[u8]> for MacAddr {
    type Error = MacParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let octets: [u8; 6] =
            bytes.try_into().map_err(|_| MacParseError)?;
        Ok(MacAddr(octets))
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (position, octet) in self.0.iter().enumerate() {
            if position != 0 {
                f.write_char(':')?;
            }
            write!(f, "{:02x}", octet)?;
        }
        Ok(())
    }
}

// Parses the colon-separated form used in configuration files ("aa:bb:cc:
// dd:ee:ff"). Exactly six two-digit hexadecimal octets are required.
impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(MacParseError)?;
            if part.len() != 2 {
                return Err(MacParseError);
            }
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError)?;
        }
        if parts.next().is_some() {
            return Err(MacParseError);
        }
        Ok(MacAddr(octets))
    }
}

// ===== impl MacParseError =====

impl std::fmt::Display for MacParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not a valid Ethernet address")
    }
}

impl std::error::Error for MacParseError {}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:0f".parse().unwrap();
        assert_eq!(mac.as_bytes(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x0f]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:0f");
        assert!("aa:bb:cc:dd:ee".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:gg".parse::<MacAddr>().is_err());
        assert!("aabb:cc:dd:ee:f".parse::<MacAddr>().is_err());
    }

    #[test]
    fn from_netlink_bytes() {
        let bytes = [0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01];
        let mac = MacAddr::try_from(bytes.as_slice()).unwrap();
        assert_eq!(mac.as_bytes(), bytes);
        assert!(MacAddr::try_from([0u8; 4].as_slice()).is_err());
    }

    #[test]
    fn address_classes() {
        assert!(MacAddr::default().is_unspecified());
        let mac: MacAddr = "ff:ff:ff:ff:ff:ff".parse().unwrap();
        assert!(mac.is_multicast());
        let mac: MacAddr = "01:00:5e:00:00:01".parse().unwrap();
        assert!(mac.is_multicast());
        let mac: MacAddr = "aa:aa:aa:aa:aa:01".parse().unwrap();
        assert!(!mac.is_multicast() && !mac.is_unspecified());
    }
}
