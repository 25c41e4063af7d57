// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! SPAPR-VIO register assignment for pseries guests.

use domain::ControllerModel;
use domain::DeviceAddress;
use domain::Domain;
use domain::SpaprVioAddress;

use crate::Error;
use crate::Result;

/// Probe stride between candidate registers.
const REG_STRIDE: u64 = 0x1000;

/// Seed register per device class.
pub const REG_NET: u64 = 0x1000;
pub const REG_SCSI: u64 = 0x2000;
pub const REG_NVRAM: u64 = 0x3000;
pub const REG_SERIAL: u64 = 0x3000_0000;

fn collect_regs(dom: &Domain) -> Vec<u64> {
    let mut regs = Vec::new();
    dom.for_each_info(|_, _, info| {
        if let DeviceAddress::SpaprVio(SpaprVioAddress { reg: Some(reg) }) = info.addr {
            regs.push(reg);
        }
    });
    regs
}

/// Picks a register for one device: a user-supplied register is collision
/// checked, an absent one starts at the class seed and probes upward one
/// stride at a time until it is unique.
fn pick_reg(used: &[u64], wanted: Option<u64>, seed: u64) -> Result<u64> {
    if let Some(reg) = wanted {
        if used.contains(&reg) {
            return Err(Error::SpaprRegInUse(reg));
        }
        return Ok(reg);
    }
    let mut reg = seed;
    while used.contains(&reg) {
        reg = reg.checked_add(REG_STRIDE).ok_or(Error::SpaprExhausted)?;
    }
    Ok(reg)
}

fn assign_one(
    dom: &mut Domain,
    get: impl Fn(&mut Domain) -> &mut DeviceAddress,
    seed: u64,
) -> Result<()> {
    let addr = get(dom);
    let wanted = match addr {
        DeviceAddress::SpaprVio(SpaprVioAddress { reg }) => *reg,
        // Not ours to place.
        _ => return Ok(()),
    };
    // Blank the device's own entry so the collision scan only sees its
    // neighbors.
    *addr = DeviceAddress::None;
    let used = collect_regs(dom);
    let addr = get(dom);
    match pick_reg(&used, wanted, seed) {
        Ok(reg) => {
            *addr = DeviceAddress::SpaprVio(SpaprVioAddress { reg: Some(reg) });
            Ok(())
        }
        Err(e) => {
            *addr = DeviceAddress::SpaprVio(SpaprVioAddress { reg: wanted });
            Err(e)
        }
    }
}

/// The SPAPR-VIO pass: moves every candidate device onto the VIO bus and
/// gives it a register before the PCI pass counts anything.
pub fn assign_spapr_vio(dom: &mut Domain) -> Result<()> {
    if !(dom.is_ppc64() && dom.machine_is_pseries()) {
        return Ok(());
    }

    // Candidates first get coerced onto the VIO bus so the collision scan
    // sees every explicit register, then each one is placed in turn.
    for i in 0..dom.nets.len() {
        if dom.nets[i].is_spapr_vlan() && dom.nets[i].info.addr.is_none() {
            dom.nets[i].info.addr = DeviceAddress::SpaprVio(SpaprVioAddress::default());
        }
    }
    for i in 0..dom.controllers.len() {
        let c = &dom.controllers[i];
        if c.model == Some(ControllerModel::IbmVscsi) && c.info.addr.is_none() {
            dom.controllers[i].info.addr = DeviceAddress::SpaprVio(SpaprVioAddress::default());
        }
    }
    for i in 0..dom.serials.len() {
        if dom.serials[i].info.addr.is_none() {
            dom.serials[i].info.addr = DeviceAddress::SpaprVio(SpaprVioAddress::default());
        }
    }
    if let Some(nvram) = &mut dom.nvram {
        if nvram.info.addr.is_none() {
            nvram.info.addr = DeviceAddress::SpaprVio(SpaprVioAddress::default());
        }
    }

    for i in 0..dom.nets.len() {
        if dom.nets[i].is_spapr_vlan() {
            assign_one(dom, move |d| &mut d.nets[i].info.addr, REG_NET)?;
        }
    }
    for i in 0..dom.controllers.len() {
        if dom.controllers[i].model == Some(ControllerModel::IbmVscsi) {
            assign_one(dom, move |d| &mut d.controllers[i].info.addr, REG_SCSI)?;
        }
    }
    for i in 0..dom.serials.len() {
        assign_one(dom, move |d| &mut d.serials[i].info.addr, REG_SERIAL)?;
    }
    if dom.nvram.is_some() {
        assign_one(dom, |d| &mut d.nvram.as_mut().unwrap().info.addr, REG_NVRAM)?;
    }
    Ok(())
}
