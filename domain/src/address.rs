// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bus addresses a device can sit at.
//!
//! Addresses start out as [`DeviceAddress::None`] and are written exactly
//! once, either by the user in the description or by the allocator. All the
//! `Display` impls here produce the spellings used in error messages and on
//! the emulator command line, so they must stay stable.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("cannot parse {kind} address '{text}'")]
pub struct AddressParseError {
    kind: &'static str,
    text: String,
}

impl AddressParseError {
    fn new(kind: &'static str, text: &str) -> AddressParseError {
        AddressParseError {
            kind,
            text: text.to_owned(),
        }
    }
}

/// A PCI slot location. `multifunction` is tri-state: the user may demand
/// `on` or `off`, or leave it for the allocator to decide.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PciAddress {
    #[serde(default)]
    pub domain: u16,
    #[serde(default)]
    pub bus: u8,
    pub slot: u8,
    #[serde(default)]
    pub function: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multifunction: Option<bool>,
}

impl PciAddress {
    pub fn new(domain: u16, bus: u8, slot: u8, function: u8) -> PciAddress {
        PciAddress {
            domain,
            bus,
            slot,
            function,
            multifunction: None,
        }
    }

    /// Same slot, ignoring the function and multifunction request.
    pub fn same_slot(&self, other: &PciAddress) -> bool {
        self.domain == other.domain && self.bus == other.bus && self.slot == other.slot
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = AddressParseError;

    /// Accepts `dddd:bb:ss.f` as well as the host-side short form `bb:ss.f`.
    fn from_str(s: &str) -> Result<PciAddress, AddressParseError> {
        let err = || AddressParseError::new("PCI", s);
        let (rest, function) = s.rsplit_once('.').ok_or_else(err)?;
        let mut parts: Vec<&str> = rest.split(':').collect();
        if parts.len() == 2 {
            parts.insert(0, "0");
        }
        if parts.len() != 3 {
            return Err(err());
        }
        Ok(PciAddress {
            domain: u16::from_str_radix(parts[0], 16).map_err(|_| err())?,
            bus: u8::from_str_radix(parts[1], 16).map_err(|_| err())?,
            slot: u8::from_str_radix(parts[2], 16).map_err(|_| err())?,
            function: u8::from_str_radix(function, 16).map_err(|_| err())?,
            multifunction: None,
        })
    }
}

/// Position on a disk controller: IDE/SCSI/SATA/FDC disks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriveAddress {
    #[serde(default)]
    pub controller: u32,
    #[serde(default)]
    pub bus: u32,
    #[serde(default)]
    pub target: u32,
    #[serde(default)]
    pub unit: u32,
}

impl fmt::Display for DriveAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.controller, self.bus, self.target, self.unit
        )
    }
}

/// A USB port path, e.g. bus 0 port `2.1` under a hub.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbAddress {
    #[serde(default)]
    pub bus: u32,
    pub port: String,
}

/// s390 channel subsystem address. For virtio-ccw devices the channel
/// subsystem id is fixed at 0xfe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CcwAddress {
    pub cssid: u8,
    pub ssid: u8,
    pub devno: u16,
}

/// Channel subsystem id all virtio-ccw devices live in.
pub const CCW_VIRTIO_CSSID: u8 = 0xfe;
/// Highest assignable devno.
pub const CCW_MAX_DEVNO: u16 = 0xffff;

impl CcwAddress {
    pub fn new(cssid: u8, ssid: u8, devno: u16) -> CcwAddress {
        CcwAddress { cssid, ssid, devno }
    }

    pub fn virtio(devno: u16) -> CcwAddress {
        CcwAddress::new(CCW_VIRTIO_CSSID, 0, devno)
    }
}

impl fmt::Display for CcwAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}.{:x}.{:04x}", self.cssid, self.ssid, self.devno)
    }
}

impl FromStr for CcwAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<CcwAddress, AddressParseError> {
        let err = || AddressParseError::new("CCW", s);
        let mut it = s.split('.');
        let cssid = it.next().ok_or_else(err)?;
        let ssid = it.next().ok_or_else(err)?;
        let devno = it.next().ok_or_else(err)?;
        if it.next().is_some() {
            return Err(err());
        }
        Ok(CcwAddress {
            cssid: u8::from_str_radix(cssid, 16).map_err(|_| err())?,
            ssid: u8::from_str_radix(ssid, 16).map_err(|_| err())?,
            devno: u16::from_str_radix(devno, 16).map_err(|_| err())?,
        })
    }
}

/// pseries paravirtual bus address. `reg` is `None` until the user or the
/// allocator picks one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaprVioAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg: Option<u64>,
}

impl fmt::Display for SpaprVioAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.reg {
            Some(reg) => write!(f, "{:#x}", reg),
            None => f.write_str("unassigned"),
        }
    }
}

/// Port on a virtio-serial controller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtioSerialAddress {
    #[serde(default)]
    pub controller: u32,
    #[serde(default)]
    pub bus: u32,
    #[serde(default)]
    pub port: u32,
}

/// Where a device sits. `None` is the initial state the allocator replaces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeviceAddress {
    #[default]
    None,
    Pci(PciAddress),
    Drive(DriveAddress),
    Usb(UsbAddress),
    Ccw(CcwAddress),
    SpaprVio(SpaprVioAddress),
    VirtioSerial(VirtioSerialAddress),
    /// Legacy s390 virtio bus: present devices carry no address payload.
    VioS390,
}

impl DeviceAddress {
    pub fn is_none(&self) -> bool {
        matches!(self, DeviceAddress::None)
    }

    pub fn pci(&self) -> Option<&PciAddress> {
        match self {
            DeviceAddress::Pci(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn drive(&self) -> Option<&DriveAddress> {
        match self {
            DeviceAddress::Drive(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn ccw(&self) -> Option<&CcwAddress> {
        match self {
            DeviceAddress::Ccw(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn spapr_vio(&self) -> Option<&SpaprVioAddress> {
        match self {
            DeviceAddress::SpaprVio(addr) => Some(addr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pci_display_is_canonical() {
        let addr = PciAddress::new(0, 0, 1, 1);
        assert_eq!(addr.to_string(), "0000:00:01.1");
        let addr = PciAddress::new(0, 2, 0x1f, 7);
        assert_eq!(addr.to_string(), "0000:02:1f.7");
    }

    #[test]
    fn pci_parse_long_and_short() {
        let long: PciAddress = "0000:00:05.0".parse().unwrap();
        assert_eq!(long, PciAddress::new(0, 0, 5, 0));
        let short: PciAddress = "06:12.3".parse().unwrap();
        assert_eq!(short, PciAddress::new(0, 6, 0x12, 3));
        assert!("junk".parse::<PciAddress>().is_err());
        assert!("0000:00:05".parse::<PciAddress>().is_err());
    }

    #[test]
    fn ccw_display_and_parse() {
        let addr = CcwAddress::virtio(0);
        assert_eq!(addr.to_string(), "fe.0.0000");
        let parsed: CcwAddress = "fe.0.0042".parse().unwrap();
        assert_eq!(parsed, CcwAddress::virtio(0x42));
        assert!("fe.0".parse::<CcwAddress>().is_err());
        assert!("fe.0.0.1".parse::<CcwAddress>().is_err());
    }

    #[test]
    fn default_address_is_none() {
        assert!(DeviceAddress::default().is_none());
    }

    #[test]
    fn address_serde_tags() {
        let addr = DeviceAddress::Pci(PciAddress::new(0, 0, 3, 0));
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json["type"], "pci");
        assert_eq!(json["slot"], 3);
        let back: DeviceAddress = serde_json::from_value(json).unwrap();
        assert_eq!(back, addr);
    }
}
