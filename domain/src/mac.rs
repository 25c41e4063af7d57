// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Guest NIC hardware addresses.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

/// The locally-administered OUI stamped on generated addresses.
pub const MAC_PREFIX: [u8; 3] = [0x52, 0x54, 0x00];

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid MAC address '{0}'")]
pub struct MacParseError(String);

/// A six-octet Ethernet address.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress {
    addr: [u8; 6],
}

impl MacAddress {
    pub fn new(addr: [u8; 6]) -> MacAddress {
        MacAddress { addr }
    }

    /// Generates a fresh unicast address under [`MAC_PREFIX`].
    pub fn generate<R: Rng>(rng: &mut R) -> MacAddress {
        let mut addr = [0u8; 6];
        addr[..3].copy_from_slice(&MAC_PREFIX);
        rng.fill(&mut addr[3..]);
        MacAddress { addr }
    }

    pub fn octets(&self) -> [u8; 6] {
        self.addr
    }

    pub fn is_multicast(&self) -> bool {
        self.addr[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let a = &self.addr;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<MacAddress, MacParseError> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 {
            return Err(MacParseError(s.to_owned()));
        }
        let mut addr = [0u8; 6];
        for (out, octet) in addr.iter_mut().zip(octets.iter()) {
            if octet.len() != 2 {
                return Err(MacParseError(s.to_owned()));
            }
            *out = u8::from_str_radix(octet, 16).map_err(|_| MacParseError(s.to_owned()))?;
        }
        Ok(MacAddress { addr })
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<MacAddress, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let mac: MacAddress = "52:54:00:12:34:56".parse().unwrap();
        assert_eq!(mac.octets(), [0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
        assert_eq!(mac.to_string(), "52:54:00:12:34:56");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("52:54:00:12:34".parse::<MacAddress>().is_err());
        assert!("52:54:00:12:34:5g".parse::<MacAddress>().is_err());
        assert!("5254:00:12:34:56:78".parse::<MacAddress>().is_err());
    }

    #[test]
    fn generated_addresses_are_unicast_and_prefixed() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let mac = MacAddress::generate(&mut rng);
            assert_eq!(&mac.octets()[..3], &MAC_PREFIX);
            assert!(!mac.is_multicast());
        }
    }

    #[test]
    fn serde_round_trip() {
        let mac: MacAddress = "52:54:00:aa:bb:cc".parse().unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"52:54:00:aa:bb:cc\"");
        assert_eq!(serde_json::from_str::<MacAddress>(&json).unwrap(), mac);
    }
}
