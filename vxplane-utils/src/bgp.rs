//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! BGP definitions shared between the speaker client and the dataplane
//! actors. Only the attributes the agent consumes are modeled; everything
//! else stays inside the external speaker.

use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Configurable (AFI,SAFI) tuples.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AfiSafi {
    Ipv4Unicast,
    Ipv6Unicast,
    L2vpnEvpn,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

// Route Distinguisher (RFC 4364, section 4.2).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RouteDistinguisher {
    TwoOctetAs { asn: u16, value: u32 },
    Ipv4 { addr: Ipv4Addr, value: u16 },
    FourOctetAs { asn: u32, value: u16 },
}

// Route Targets share the Route Distinguisher encoding.
pub type RouteTarget = RouteDistinguisher;

// BGP Tunnel Encapsulation types (RFC 9012).
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#tunnel-types
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum TunnelType {
    Gre = 2,
    Vxlan = 8,
    Nvgre = 9,
    Mpls = 10,
}

// Extended community attributes the agent cares about. Unrecognized
// communities are carried opaquely.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum ExtCommunity {
    TunnelEncap(TunnelType),
    RouteTarget(RouteTarget),
    Raw([u8; 8]),
}

/// Error type for Route Distinguisher parsing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseRdError;

// ===== impl RouteDistinguisher =====

impl std::fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDistinguisher::TwoOctetAs { asn, value } => {
                write!(f, "{}:{}", asn, value)
            }
            RouteDistinguisher::Ipv4 { addr, value } => {
                write!(f, "{}:{}", addr, value)
            }
            RouteDistinguisher::FourOctetAs { asn, value } => {
                write!(f, "{}:{}", asn, value)
            }
        }
    }
}

impl FromStr for RouteDistinguisher {
    type Err = ParseRdError;

    // Accepts the three textual forms: "65000:100", "10.0.0.1:100" and
    // "4200000000:100".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (admin, value) = s.rsplit_once(':').ok_or(ParseRdError)?;

        if let Ok(addr) = admin.parse::<Ipv4Addr>() {
            let value = value.parse::<u16>().map_err(|_| ParseRdError)?;
            return Ok(RouteDistinguisher::Ipv4 { addr, value });
        }

        let asn = admin.parse::<u32>().map_err(|_| ParseRdError)?;
        if let Ok(asn) = u16::try_from(asn) {
            let value = value.parse::<u32>().map_err(|_| ParseRdError)?;
            Ok(RouteDistinguisher::TwoOctetAs { asn, value })
        } else {
            let value = value.parse::<u16>().map_err(|_| ParseRdError)?;
            Ok(RouteDistinguisher::FourOctetAs { asn, value })
        }
    }
}

impl Serialize for RouteDistinguisher {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RouteDistinguisher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            D::Error::custom(format!("invalid route distinguisher: {}", s))
        })
    }
}

// ===== impl ParseRdError =====

impl std::fmt::Display for ParseRdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid route distinguisher format")
    }
}

impl std::error::Error for ParseRdError {}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rd_two_octet_as() {
        let rd: RouteDistinguisher = "65000:10".parse().unwrap();
        assert_eq!(
            rd,
            RouteDistinguisher::TwoOctetAs { asn: 65000, value: 10 }
        );
        assert_eq!(rd.to_string(), "65000:10");
    }

    #[test]
    fn rd_ipv4() {
        let rd: RouteDistinguisher = "10.0.0.1:200".parse().unwrap();
        assert_eq!(
            rd,
            RouteDistinguisher::Ipv4 {
                addr: Ipv4Addr::new(10, 0, 0, 1),
                value: 200,
            }
        );
        assert_eq!(rd.to_string(), "10.0.0.1:200");
    }

    #[test]
    fn rd_four_octet_as() {
        let rd: RouteDistinguisher = "4200000000:1".parse().unwrap();
        assert_eq!(
            rd,
            RouteDistinguisher::FourOctetAs { asn: 4200000000, value: 1 }
        );
    }

    #[test]
    fn rd_invalid() {
        assert!("65000".parse::<RouteDistinguisher>().is_err());
        assert!("65000:bad".parse::<RouteDistinguisher>().is_err());
        assert!(":10".parse::<RouteDistinguisher>().is_err());
    }
}
