// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The standard option suffixes every `-device` line shares: boot index,
//! ROM attributes and the bus address.

use caps::Cap;
use caps::QemuCaps;
use domain::ControllerKind;
use domain::DeviceAddress;
use domain::DeviceInfo;
use domain::Domain;

use crate::builder::OptLine;
use crate::Error;
use crate::Result;

/// Spelling of the PCI root bus: `pci.0` once the emulator can address
/// more than one bus, plain `pci` before that.
pub fn pci_bus_name(bus: u8, qemu_caps: &QemuCaps) -> String {
    if bus == 0 && !qemu_caps.has(Cap::PciMultibus) {
        "pci".to_owned()
    } else {
        format!("pci.{}", bus)
    }
}

/// Appends `,bootindex=N` when the device has one and the emulator
/// understands it. `gate` names the capability that governs boot indexes
/// for this device kind.
pub fn add_bootindex(
    opt: &mut OptLine,
    info: &DeviceInfo,
    qemu_caps: &QemuCaps,
    gate: Cap,
) -> Result<()> {
    if let Some(bootindex) = info.bootindex {
        if !qemu_caps.has(gate) {
            return Err(Error::ConfigUnsupported(format!(
                "boot index on device '{}'",
                info.alias_or_empty()
            )));
        }
        opt.add_keyword("bootindex", bootindex);
    }
    Ok(())
}

/// Appends the ROM attributes (`rombar=`, `romfile=`).
pub fn add_rom_opts(opt: &mut OptLine, info: &DeviceInfo, qemu_caps: &QemuCaps) -> Result<()> {
    if let Some(bar) = info.rom_bar {
        if !qemu_caps.has(Cap::PciRombar) {
            return Err(Error::ConfigUnsupported(format!(
                "rombar on device '{}'",
                info.alias_or_empty()
            )));
        }
        opt.add_keyword("rombar", if bar { 1 } else { 0 });
    }
    if let Some(file) = &info.rom_file {
        if !qemu_caps.has(Cap::PciRomfile) {
            return Err(Error::ConfigUnsupported(format!(
                "romfile on device '{}'",
                info.alias_or_empty()
            )));
        }
        opt.add_keyword("romfile", file);
    }
    Ok(())
}

/// Appends the bus-address suffix for whatever address type the device
/// carries. Unassigned addresses append nothing.
pub fn add_device_address(
    opt: &mut OptLine,
    dom: &Domain,
    info: &DeviceInfo,
    qemu_caps: &QemuCaps,
) -> Result<()> {
    match &info.addr {
        DeviceAddress::Pci(addr) => {
            opt.add_keyword("bus", pci_bus_name(addr.bus, qemu_caps));
            if let Some(multifunction) = addr.multifunction {
                if !qemu_caps.has(Cap::PciMultifunction) {
                    return Err(Error::ConfigUnsupported(format!(
                        "multifunction PCI address {}",
                        addr
                    )));
                }
                opt.add_keyword_onoff("multifunction", multifunction);
            }
            if addr.function == 0 {
                opt.add_keyword("addr", format!("{:#x}", addr.slot));
            } else {
                opt.add_keyword("addr", format!("{:#x}.{:#x}", addr.slot, addr.function));
            }
        }
        DeviceAddress::Usb(addr) => {
            let bus_alias = dom
                .find_controller(ControllerKind::Usb, addr.bus)
                .and_then(|c| c.info.alias.clone())
                .unwrap_or_else(|| "usb".to_owned());
            opt.add_keyword("bus", format!("{}.0", bus_alias));
            opt.add_keyword("port", &addr.port);
        }
        DeviceAddress::Ccw(addr) => {
            opt.add_keyword("devno", addr);
        }
        DeviceAddress::SpaprVio(addr) => {
            if let Some(reg) = addr.reg {
                opt.add_keyword("reg", format!("{:#x}", reg));
            }
        }
        DeviceAddress::VirtioSerial(addr) => {
            let bus_alias = dom
                .find_controller(ControllerKind::VirtioSerial, addr.controller)
                .and_then(|c| c.info.alias.clone())
                .unwrap_or_else(|| format!("virtio-serial{}", addr.controller));
            opt.add_keyword("bus", format!("{}.{}", bus_alias, addr.bus));
            opt.add_keyword("nr", addr.port);
        }
        DeviceAddress::None | DeviceAddress::Drive(_) | DeviceAddress::VioS390 => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::PciAddress;

    fn caps_multibus() -> QemuCaps {
        QemuCaps::from_caps([Cap::Device, Cap::PciMultibus, Cap::PciMultifunction])
    }

    #[test]
    fn pci_suffix_formats() {
        let dom = Domain::empty("t");
        let mut info = DeviceInfo::default();
        info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 3, 0));
        let mut opt = OptLine::with("dev");
        add_device_address(&mut opt, &dom, &info, &caps_multibus()).unwrap();
        assert_eq!(opt.finish(), "dev,bus=pci.0,addr=0x3");
    }

    #[test]
    fn pci_suffix_with_function_and_multifunction() {
        let dom = Domain::empty("t");
        let mut addr = PciAddress::new(0, 0, 4, 7);
        addr.multifunction = Some(true);
        let mut info = DeviceInfo::default();
        info.addr = DeviceAddress::Pci(addr);
        let mut opt = OptLine::with("dev");
        add_device_address(&mut opt, &dom, &info, &caps_multibus()).unwrap();
        assert_eq!(opt.finish(), "dev,bus=pci.0,multifunction=on,addr=0x4.0x7");
    }

    #[test]
    fn single_bus_emulators_use_bare_pci() {
        let dom = Domain::empty("t");
        let mut info = DeviceInfo::default();
        info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 5, 0));
        let mut opt = OptLine::with("dev");
        let qemu_caps = QemuCaps::from_caps([Cap::Device]);
        add_device_address(&mut opt, &dom, &info, &qemu_caps).unwrap();
        assert_eq!(opt.finish(), "dev,bus=pci,addr=0x5");
    }

    #[test]
    fn ccw_suffix() {
        use domain::CcwAddress;
        let dom = Domain::empty("t");
        let mut info = DeviceInfo::default();
        info.addr = DeviceAddress::Ccw(CcwAddress::virtio(1));
        let mut opt = OptLine::with("virtio-net-ccw");
        add_device_address(&mut opt, &dom, &info, &caps_multibus()).unwrap();
        assert_eq!(opt.finish(), "virtio-net-ccw,devno=fe.0.0001");
    }

    #[test]
    fn spapr_suffix() {
        use domain::SpaprVioAddress;
        let dom = Domain::empty("t");
        let mut info = DeviceInfo::default();
        info.addr = DeviceAddress::SpaprVio(SpaprVioAddress { reg: Some(0x30000000) });
        let mut opt = OptLine::with("spapr-vty");
        add_device_address(&mut opt, &dom, &info, &caps_multibus()).unwrap();
        assert_eq!(opt.finish(), "spapr-vty,reg=0x30000000");
    }
}
