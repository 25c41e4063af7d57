// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stable identifiers and bus addresses for virtual devices.
//!
//! Two allocators live here. The alias allocator hands every device a
//! stable string identifier; the address allocator hands every device a
//! conflict-free bus address (PCI, s390 CCW or SPAPR-VIO) while honoring
//! the platform wiring invariants. Both mutate the description in place
//! and are run once per lifecycle transition; hot-plug paths reuse the
//! returned address sets.

pub mod alias;
pub mod assign;
pub mod ccw;
pub mod pci;
pub mod spapr;

use remain::sorted;
use thiserror::Error;

pub use crate::alias::assign_aliases;
pub use crate::assign::assign_addresses;
pub use crate::assign::DomainAddresses;
pub use crate::ccw::CcwAddressSet;
pub use crate::pci::PciAddressSet;

/// Allocation failures. Address strings are pre-formatted in the canonical
/// spelling (`dddd:bb:ss.f` for PCI, `c.s.dddd` for CCW) so the operator
/// can find the offending device.
#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("alias '{0}' is used by another device")]
    AliasConflict(String),
    #[error("PCI bridges are not supported by this emulator binary")]
    BridgeUnsupported,
    #[error("CCW address {0} is already in use")]
    CcwAddressInUse(String),
    #[error("there are no more free CCW device numbers")]
    CcwExhausted,
    #[error("PCI address {0} is already in use")]
    FunctionInUse(String),
    #[error("invalid PCI address {addr}: {reason}")]
    InvalidPciAddress { addr: String, reason: String },
    #[error(
        "PCI address {0}: slot already has other functions in use \
         (function 0 may need multifunction='on')"
    )]
    MultifunctionRequired(String),
    #[error("no free PCI address is available on any bus")]
    NoPciAddressAvailable,
    #[error("primary IDE controller must have PCI address {0}")]
    PrimaryIdeAddress(String),
    #[error("PCI address {0} is needed for the primary video device")]
    PrimaryVideoAddress(String),
    #[error("PCI address {0}: the whole slot is reserved")]
    SlotReserved(String),
    #[error("no free SPAPR-VIO register address is available")]
    SpaprExhausted,
    #[error("SPAPR-VIO register address {0:#x} is already in use")]
    SpaprRegInUse(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
