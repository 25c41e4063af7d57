// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! PCI bus occupancy tracking and slot allocation.

use domain::ControllerModel;
use domain::PciAddress;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub const PCI_SLOT_COUNT: usize = 32;
pub const PCI_FUNCTION_COUNT: u8 = 8;
/// Function mask meaning "whole slot reserved, multifunction forbidden".
pub const SLOT_RESERVED: u8 = 0xff;

/// Connection properties a bus offers and a device may require.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFlags {
    pub hotplug: bool,
    /// Accepts conventional PCI devices.
    pub pci: bool,
}

impl BusFlags {
    pub fn satisfies(&self, wanted: &BusFlags) -> bool {
        (!wanted.hotplug || self.hotplug) && (!wanted.pci || self.pci)
    }
}

/// One bus of the set: a controller model, the capability flags that model
/// implies, the usable slot range and the occupancy map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PciBus {
    model: ControllerModel,
    flags: BusFlags,
    min_slot: u8,
    max_slot: u8,
    /// Bit `k` of entry `s` set means slot `s` function `k` is in use;
    /// [`SLOT_RESERVED`] means the whole slot is taken.
    slots: [u8; PCI_SLOT_COUNT],
}

impl PciBus {
    fn new(model: ControllerModel) -> PciBus {
        // Both supported models offer hot-pluggable conventional PCI
        // slots 1..31; slot 0 belongs to the bridge or host bridge.
        let (flags, min_slot, max_slot) = match model {
            ControllerModel::PciRoot | ControllerModel::PciBridge => (
                BusFlags {
                    hotplug: true,
                    pci: true,
                },
                1,
                31,
            ),
            other => {
                unreachable!("{:?} is not a PCI bus model", other)
            }
        };
        PciBus {
            model,
            flags,
            min_slot,
            max_slot,
            slots: [0; PCI_SLOT_COUNT],
        }
    }

    pub fn model(&self) -> ControllerModel {
        self.model
    }

    pub fn flags(&self) -> BusFlags {
        self.flags
    }

    pub fn min_slot(&self) -> u8 {
        self.min_slot
    }

    pub fn max_slot(&self) -> u8 {
        self.max_slot
    }

    fn slot_is_empty(&self, slot: u8) -> bool {
        self.slots[slot as usize] == 0
    }
}

/// The occupancy state of every PCI bus of a domain.
///
/// `last_addr` is the round-robin cursor: auto-allocation resumes just past
/// the most recently assigned slot so released slots behind the cursor are
/// only revisited after a full sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PciAddressSet {
    buses: Vec<PciBus>,
    last_addr: PciAddress,
    dry_run: bool,
}

impl PciAddressSet {
    pub fn new(nbuses: usize) -> PciAddressSet {
        PciAddressSet::with_mode(nbuses, false)
    }

    /// A growable set used to size the bus count before the real pass.
    pub fn new_dry_run(nbuses: usize) -> PciAddressSet {
        PciAddressSet::with_mode(nbuses, true)
    }

    fn with_mode(nbuses: usize, dry_run: bool) -> PciAddressSet {
        let mut buses = Vec::with_capacity(nbuses.max(1));
        buses.push(PciBus::new(ControllerModel::PciRoot));
        for _ in 1..nbuses.max(1) {
            buses.push(PciBus::new(ControllerModel::PciBridge));
        }
        PciAddressSet {
            buses,
            last_addr: PciAddress::new(0, 0, 0, 0),
            dry_run,
        }
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn bus(&self, n: u8) -> Option<&PciBus> {
        self.buses.get(n as usize)
    }

    fn grow(&mut self, bus: u8, wanted: &BusFlags) -> Result<()> {
        if !self.dry_run || !wanted.pci {
            return Err(Error::NoPciAddressAvailable);
        }
        while self.buses.len() <= bus as usize {
            self.buses.push(PciBus::new(ControllerModel::PciBridge));
        }
        Ok(())
    }

    /// Range validation of stage "validate and record".
    pub fn validate(&self, addr: &PciAddress) -> Result<()> {
        let fail = |reason: String| Error::InvalidPciAddress {
            addr: addr.to_string(),
            reason,
        };
        if addr.domain != 0 {
            return Err(fail("only PCI domain 0 is supported".to_owned()));
        }
        let bus = self
            .buses
            .get(addr.bus as usize)
            .ok_or_else(|| fail(format!("only {} PCI buses are present", self.buses.len())))?;
        if addr.slot < bus.min_slot || addr.slot > bus.max_slot {
            return Err(fail(format!(
                "slot must lie between {} and {}",
                bus.min_slot, bus.max_slot
            )));
        }
        if addr.function >= PCI_FUNCTION_COUNT {
            return Err(fail("function must be below 8".to_owned()));
        }
        Ok(())
    }

    pub fn function_in_use(&self, addr: &PciAddress) -> bool {
        match self.buses.get(addr.bus as usize) {
            Some(bus) => bus.slots[addr.slot as usize] & (1 << addr.function) != 0,
            None => false,
        }
    }

    pub fn slot_is_free(&self, bus: u8, slot: u8) -> bool {
        match self.buses.get(bus as usize) {
            Some(b) => b.slot_is_empty(slot),
            None => false,
        }
    }

    /// Records an explicitly requested address.
    ///
    /// A request for function 0 without `multifunction='on'` claims the
    /// whole slot; it is refused when any other function of the slot is
    /// occupied, with a diagnostic pointing at the missing attribute.
    pub fn reserve_address(&mut self, addr: &PciAddress) -> Result<()> {
        self.validate(addr)?;
        let mask = self.buses[addr.bus as usize].slots[addr.slot as usize];
        if mask == SLOT_RESERVED {
            return Err(Error::SlotReserved(addr.to_string()));
        }
        if mask & (1 << addr.function) != 0 {
            return Err(Error::FunctionInUse(addr.to_string()));
        }
        let multifunction = addr.multifunction == Some(true);
        if addr.function == 0 && !multifunction && mask != 0 {
            return Err(Error::MultifunctionRequired(addr.to_string()));
        }
        let slot = &mut self.buses[addr.bus as usize].slots[addr.slot as usize];
        if addr.function == 0 && !multifunction {
            // No other function may join this slot later.
            *slot = SLOT_RESERVED;
        } else {
            *slot |= 1 << addr.function;
        }
        // Explicit placements drag the cursor along so auto-allocation
        // continues past the highest address seen.
        if (addr.bus, addr.slot) > (self.last_addr.bus, self.last_addr.slot) {
            self.last_addr = PciAddress::new(0, addr.bus, addr.slot, 0);
        }
        log::debug!("reserved PCI address {}", addr);
        Ok(())
    }

    /// Claims a whole slot, multifunction forbidden.
    pub fn reserve_entire_slot(&mut self, addr: &PciAddress) -> Result<()> {
        self.validate(addr)?;
        let slot = &mut self.buses[addr.bus as usize].slots[addr.slot as usize];
        if *slot != 0 {
            return Err(Error::SlotReserved(addr.to_string()));
        }
        *slot = SLOT_RESERVED;
        log::debug!("reserved PCI slot {:04x}:{:02x}:{:02x}", addr.domain, addr.bus, addr.slot);
        Ok(())
    }

    /// Finds the next free whole slot after the cursor. The sweep covers
    /// every bus after the cursor position, then wraps to bus 0 at its
    /// first usable slot and runs back up to the cursor. In dry-run mode a
    /// miss grows a fresh bus instead of failing.
    pub fn next_slot(&mut self, wanted: &BusFlags) -> Result<PciAddress> {
        if let Some(found) = self.find_free_slot(wanted) {
            return Ok(found);
        }
        let new_bus = self.buses.len() as u8;
        self.grow(new_bus, wanted)?;
        self.find_free_slot(wanted)
            .ok_or(Error::NoPciAddressAvailable)
    }

    fn find_free_slot(&self, wanted: &BusFlags) -> Option<PciAddress> {
        let start_bus = self.last_addr.bus as usize;
        let start_slot = self.last_addr.slot + 1;
        // Forward from the cursor to the end of the last bus.
        for (n, bus) in self.buses.iter().enumerate().skip(start_bus) {
            let first = if n == start_bus {
                start_slot.max(bus.min_slot)
            } else {
                bus.min_slot
            };
            for slot in first..=bus.max_slot {
                if bus.flags.satisfies(wanted) && bus.slot_is_empty(slot) {
                    return Some(PciAddress::new(0, n as u8, slot, 0));
                }
            }
        }
        // Wrap: bus 0 first slot up to and including the cursor.
        for (n, bus) in self.buses.iter().enumerate().take(start_bus + 1) {
            let last = if n == start_bus {
                self.last_addr.slot.min(bus.max_slot)
            } else {
                bus.max_slot
            };
            for slot in bus.min_slot..=last {
                if bus.flags.satisfies(wanted) && bus.slot_is_empty(slot) {
                    return Some(PciAddress::new(0, n as u8, slot, 0));
                }
            }
        }
        None
    }

    /// Allocates the next free slot: finds it, claims it whole and moves
    /// the cursor.
    pub fn reserve_next_slot(&mut self, wanted: &BusFlags) -> Result<PciAddress> {
        let addr = self.next_slot(wanted)?;
        self.reserve_entire_slot(&addr)?;
        self.last_addr = addr;
        Ok(addr)
    }

    /// Claims a companion quartet on one free slot: functions 7, 0, 1 and
    /// 2, with function 0 flagged multifunction. Returns the slot address
    /// (function 0, multifunction on).
    pub fn reserve_companion_quartet(&mut self, wanted: &BusFlags) -> Result<PciAddress> {
        let base = self.next_slot(wanted)?;
        if !self.slot_is_free(base.bus, base.slot) {
            return Err(Error::SlotReserved(base.to_string()));
        }
        for function in [7, 0, 1, 2] {
            let mut addr = base;
            addr.function = function;
            addr.multifunction = Some(function == 0);
            let slot = &mut self.buses[addr.bus as usize].slots[addr.slot as usize];
            *slot |= 1 << function;
        }
        self.last_addr = base;
        let mut result = base;
        result.multifunction = Some(true);
        Ok(result)
    }

    /// Clears one function. The slot becomes allocatable again once every
    /// function of it is clear.
    pub fn release_function(&mut self, addr: &PciAddress) {
        if let Some(bus) = self.buses.get_mut(addr.bus as usize) {
            let slot = &mut bus.slots[addr.slot as usize];
            if *slot != SLOT_RESERVED {
                *slot &= !(1 << addr.function);
            }
            if *slot == 0 {
                self.rewind_cursor(addr);
            }
        }
    }

    /// Clears a whole slot, reserved or multifunction alike.
    pub fn release_slot(&mut self, addr: &PciAddress) {
        if let Some(bus) = self.buses.get_mut(addr.bus as usize) {
            bus.slots[addr.slot as usize] = 0;
            self.rewind_cursor(addr);
        }
    }

    /// A freed slot at or behind the cursor becomes the next candidate:
    /// the cursor rewinds to just before it.
    fn rewind_cursor(&mut self, addr: &PciAddress) {
        if (addr.bus, addr.slot) <= (self.last_addr.bus, self.last_addr.slot) {
            self.last_addr = PciAddress::new(0, addr.bus, addr.slot.saturating_sub(1), 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pci(bus: u8, slot: u8, function: u8) -> PciAddress {
        PciAddress::new(0, bus, slot, function)
    }

    #[test]
    fn validate_ranges() {
        let set = PciAddressSet::new(1);
        assert!(set.validate(&pci(0, 1, 0)).is_ok());
        assert!(set.validate(&pci(0, 31, 7)).is_ok());
        // Slot 0 belongs to the host bridge.
        assert!(set.validate(&pci(0, 0, 0)).is_err());
        assert!(set.validate(&pci(1, 1, 0)).is_err());
        assert!(set.validate(&pci(0, 1, 8)).is_err());
        let mut bad_domain = pci(0, 1, 0);
        bad_domain.domain = 1;
        assert!(set.validate(&bad_domain).is_err());
    }

    #[test]
    fn explicit_function_zero_claims_the_slot() {
        let mut set = PciAddressSet::new(1);
        set.reserve_address(&pci(0, 5, 0)).unwrap();
        // Whole slot is now reserved: another function must not fit.
        assert_eq!(
            set.reserve_address(&pci(0, 5, 1)),
            Err(Error::SlotReserved("0000:00:05.1".to_owned()))
        );
    }

    #[test]
    fn multifunction_slot_accepts_more_functions() {
        let mut set = PciAddressSet::new(1);
        let mut f0 = pci(0, 5, 0);
        f0.multifunction = Some(true);
        set.reserve_address(&f0).unwrap();
        set.reserve_address(&pci(0, 5, 1)).unwrap();
        assert_eq!(
            set.reserve_address(&pci(0, 5, 1)),
            Err(Error::FunctionInUse("0000:00:05.1".to_owned()))
        );
    }

    #[test]
    fn function_zero_after_others_requires_multifunction() {
        let mut set = PciAddressSet::new(1);
        set.reserve_address(&pci(0, 5, 1)).unwrap();
        let err = set.reserve_address(&pci(0, 5, 0)).unwrap_err();
        assert!(matches!(err, Error::MultifunctionRequired(_)));
        assert!(err.to_string().contains("multifunction='on'"));
        // With the attribute the same request is fine.
        let mut f0 = pci(0, 5, 0);
        f0.multifunction = Some(true);
        set.reserve_address(&f0).unwrap();
    }

    #[test]
    fn auto_allocation_walks_slots() {
        let mut set = PciAddressSet::new(1);
        let wanted = BusFlags {
            hotplug: false,
            pci: true,
        };
        let a = set.reserve_next_slot(&wanted).unwrap();
        let b = set.reserve_next_slot(&wanted).unwrap();
        assert_eq!(a, pci(0, 1, 0));
        assert_eq!(b, pci(0, 2, 0));
    }

    #[test]
    fn released_slot_is_preferred() {
        let mut set = PciAddressSet::new(1);
        let wanted = BusFlags {
            hotplug: false,
            pci: true,
        };
        let _a = set.reserve_next_slot(&wanted).unwrap();
        let b = set.reserve_next_slot(&wanted).unwrap();
        let c = set.reserve_next_slot(&wanted).unwrap();
        set.release_slot(&b);
        // The release rewinds the cursor, so b's slot goes out next.
        let next = set.reserve_next_slot(&wanted).unwrap();
        assert_eq!(next, b);
        assert!(next.slot <= c.slot);
    }

    #[test]
    fn explicit_reservation_moves_the_cursor() {
        let mut set = PciAddressSet::new(1);
        let wanted = BusFlags {
            hotplug: false,
            pci: true,
        };
        let mut f0 = pci(0, 5, 0);
        f0.multifunction = Some(true);
        set.reserve_address(&f0).unwrap();
        set.reserve_address(&pci(0, 5, 1)).unwrap();
        let next = set.reserve_next_slot(&wanted).unwrap();
        assert_eq!(next, pci(0, 6, 0));
    }

    #[test]
    fn exhaustion_fails_outside_dry_run() {
        let mut set = PciAddressSet::new(1);
        let wanted = BusFlags {
            hotplug: false,
            pci: true,
        };
        for _ in 0..31 {
            set.reserve_next_slot(&wanted).unwrap();
        }
        assert_eq!(
            set.reserve_next_slot(&wanted),
            Err(Error::NoPciAddressAvailable)
        );
    }

    #[test]
    fn dry_run_grows_a_bus_on_exhaustion() {
        let mut set = PciAddressSet::new_dry_run(1);
        let wanted = BusFlags {
            hotplug: false,
            pci: true,
        };
        for _ in 0..31 {
            set.reserve_next_slot(&wanted).unwrap();
        }
        let next = set.reserve_next_slot(&wanted).unwrap();
        assert_eq!(next.bus, 1);
        assert_eq!(set.bus_count(), 2);
    }

    #[test]
    fn companion_quartet_occupies_four_functions() {
        let mut set = PciAddressSet::new(1);
        let wanted = BusFlags {
            hotplug: false,
            pci: true,
        };
        let base = set.reserve_companion_quartet(&wanted).unwrap();
        assert_eq!(base.function, 0);
        assert_eq!(base.multifunction, Some(true));
        for function in [0, 1, 2, 7] {
            assert!(set.function_in_use(&pci(0, base.slot, function)));
        }
        for function in [3, 4, 5, 6] {
            assert!(!set.function_in_use(&pci(0, base.slot, function)));
        }
        // Remaining functions stay claimable by explicit addresses.
        set.reserve_address(&pci(0, base.slot, 3)).unwrap();
    }

    #[test]
    fn serde_preserves_occupancy() {
        let mut set = PciAddressSet::new(2);
        set.reserve_address(&pci(0, 4, 2)).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let back: PciAddressSet = serde_json::from_str(&json).unwrap();
        assert!(back.function_in_use(&pci(0, 4, 2)));
        assert_eq!(back.bus_count(), 2);
    }
}
