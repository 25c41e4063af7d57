// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Controller rendering.

use caps::Cap;
use caps::QemuCaps;
use domain::Controller;
use domain::ControllerKind;
use domain::ControllerModel;
use domain::DeviceAddress;
use domain::Domain;

use crate::builder::OptLine;
use crate::suffix;
use crate::Error;
use crate::Result;

fn scsi_model_name(
    controller: &Controller,
    qemu_caps: &QemuCaps,
) -> Result<&'static str> {
    let model = controller.model.unwrap_or(ControllerModel::LsiLogic);
    match model {
        ControllerModel::VirtioScsi => {
            if !qemu_caps.has(Cap::VirtioScsi) {
                return Err(Error::ConfigUnsupported(format!(
                    "virtio-scsi controller {}",
                    controller.idx
                )));
            }
            Ok(match &controller.info.addr {
                DeviceAddress::Ccw(_) => "virtio-scsi-ccw",
                DeviceAddress::VioS390 => "virtio-scsi-s390",
                _ => "virtio-scsi-pci",
            })
        }
        ControllerModel::LsiLogic => {
            if !qemu_caps.has(Cap::ScsiLsi) {
                return Err(Error::ConfigUnsupported(format!(
                    "lsi SCSI controller {}",
                    controller.idx
                )));
            }
            Ok("lsi")
        }
        ControllerModel::IbmVscsi => Ok("spapr-vscsi"),
        ControllerModel::LsiSas1078 => {
            if !qemu_caps.has(Cap::ScsiMegasas) {
                return Err(Error::ConfigUnsupported(format!(
                    "megasas SCSI controller {}",
                    controller.idx
                )));
            }
            Ok("megasas")
        }
        other => Err(Error::InvalidConfig(format!(
            "{:?} is not a SCSI controller model",
            other
        ))),
    }
}

fn usb_model_name(controller: &Controller, qemu_caps: &QemuCaps) -> Result<&'static str> {
    let model = controller.model.unwrap_or(ControllerModel::Piix3Uhci);
    let name = match model {
        ControllerModel::Piix3Uhci => "piix3-usb-uhci",
        ControllerModel::Piix4Uhci => "piix4-usb-uhci",
        ControllerModel::Ehci => "usb-ehci",
        ControllerModel::Ich9Ehci1 => "ich9-usb-ehci1",
        ControllerModel::Ich9Uhci1 => "ich9-usb-uhci1",
        ControllerModel::Ich9Uhci2 => "ich9-usb-uhci2",
        ControllerModel::Ich9Uhci3 => "ich9-usb-uhci3",
        ControllerModel::Vt82c686bUhci => "vt82c686b-usb-uhci",
        ControllerModel::PciOhci => "pci-ohci",
        ControllerModel::NecXhci => "nec-usb-xhci",
        other => {
            return Err(Error::InvalidConfig(format!(
                "{:?} is not a USB controller model",
                other
            )));
        }
    };
    if matches!(
        model,
        ControllerModel::Ich9Ehci1
            | ControllerModel::Ich9Uhci1
            | ControllerModel::Ich9Uhci2
            | ControllerModel::Ich9Uhci3
    ) && !qemu_caps.has(Cap::Ich9UsbEhci1)
    {
        return Err(Error::ConfigUnsupported(format!(
            "ICH9 USB controller {}",
            controller.idx
        )));
    }
    Ok(name)
}

/// The `-device` line for one controller.
pub fn build_controller_dev_str(
    controller: &Controller,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<String> {
    let alias = controller.info.alias_or_empty();
    let mut opt = OptLine::new();
    match controller.kind {
        ControllerKind::Scsi => {
            opt.add_literal(scsi_model_name(controller, qemu_caps)?);
            opt.add_keyword("id", alias);
        }
        ControllerKind::VirtioSerial => {
            let model = match &controller.info.addr {
                DeviceAddress::Ccw(_) => "virtio-serial-ccw",
                DeviceAddress::VioS390 => "virtio-serial-s390",
                _ => "virtio-serial-pci",
            };
            opt.add_literal(model);
            opt.add_keyword("id", alias);
            if let Some(ports) = controller.ports {
                opt.add_keyword("max_ports", ports);
            }
            if let Some(vectors) = controller.vectors {
                opt.add_keyword("vectors", vectors);
            }
        }
        ControllerKind::Ccid => {
            opt.add_literal("usb-ccid");
            opt.add_keyword("id", alias);
        }
        ControllerKind::Sata => {
            opt.add_literal("ahci");
            opt.add_keyword("id", alias);
        }
        ControllerKind::Usb => {
            opt.add_literal(usb_model_name(controller, qemu_caps)?);
            opt.add_keyword("id", alias);
            if let Some(master) = &controller.master {
                let master_alias = dom
                    .find_controller(ControllerKind::Usb, master.idx)
                    .and_then(|c| c.info.alias.clone())
                    .unwrap_or_else(|| "usb".to_owned());
                opt.add_keyword("masterbus", format!("{}.0", master_alias));
                opt.add_keyword("firstport", master.startport);
            }
        }
        ControllerKind::Pci => match controller.model {
            Some(ControllerModel::PciBridge) => {
                opt.add_literal("pci-bridge");
                opt.add_keyword("chassis_nr", controller.idx);
                opt.add_keyword("id", format!("pci.{}", controller.idx));
            }
            _ => {
                // The root bus is the machine itself; asking for a device
                // line for it is a bug in the caller.
                return Err(Error::Internal(
                    "the pci-root controller cannot be rendered".to_owned(),
                ));
            }
        },
        ControllerKind::Ide => {
            return Err(Error::InvalidConfig(format!(
                "only the primary IDE controller is supported (index {})",
                controller.idx
            )));
        }
        ControllerKind::Fdc => {
            return Err(Error::Internal(
                "the floppy controller is implicit and never rendered".to_owned(),
            ));
        }
    }
    suffix::add_device_address(&mut opt, dom, &controller.info, qemu_caps)?;
    Ok(opt.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::CcwAddress;
    use domain::PciAddress;
    use domain::UsbMaster;

    fn full_caps() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::Device,
            Cap::VirtioScsi,
            Cap::ScsiLsi,
            Cap::ScsiMegasas,
            Cap::Ich9UsbEhci1,
            Cap::PciMultibus,
            Cap::PciMultifunction,
            Cap::PciBridge,
        ])
    }

    fn ctrl(kind: ControllerKind, idx: u32, alias: &str) -> Controller {
        let mut c = Controller::new(kind, idx);
        c.info.alias = Some(alias.to_owned());
        c
    }

    #[test]
    fn virtio_scsi_variants() {
        let dom = Domain::empty("t");
        let mut c = ctrl(ControllerKind::Scsi, 0, "scsi0");
        c.model = Some(ControllerModel::VirtioScsi);
        c.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 3, 0));
        assert_eq!(
            build_controller_dev_str(&c, &dom, &full_caps()).unwrap(),
            "virtio-scsi-pci,id=scsi0,bus=pci.0,addr=0x3"
        );
        c.info.addr = DeviceAddress::Ccw(CcwAddress::virtio(2));
        assert_eq!(
            build_controller_dev_str(&c, &dom, &full_caps()).unwrap(),
            "virtio-scsi-ccw,id=scsi0,devno=fe.0.0002"
        );
    }

    #[test]
    fn lsi_and_spapr_vscsi() {
        let dom = Domain::empty("t");
        let mut c = ctrl(ControllerKind::Scsi, 0, "scsi0");
        c.model = Some(ControllerModel::LsiLogic);
        assert_eq!(
            build_controller_dev_str(&c, &dom, &full_caps()).unwrap(),
            "lsi,id=scsi0"
        );
        c.model = Some(ControllerModel::IbmVscsi);
        c.info.addr = DeviceAddress::SpaprVio(domain::SpaprVioAddress { reg: Some(0x2000) });
        assert_eq!(
            build_controller_dev_str(&c, &dom, &full_caps()).unwrap(),
            "spapr-vscsi,id=scsi0,reg=0x2000"
        );
    }

    #[test]
    fn virtio_serial_with_ports() {
        let dom = Domain::empty("t");
        let mut c = ctrl(ControllerKind::VirtioSerial, 0, "virtio-serial0");
        c.ports = Some(16);
        c.vectors = Some(4);
        c.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 4, 0));
        assert_eq!(
            build_controller_dev_str(&c, &dom, &full_caps()).unwrap(),
            "virtio-serial-pci,id=virtio-serial0,max_ports=16,vectors=4,bus=pci.0,addr=0x4"
        );
    }

    #[test]
    fn usb_companion_wiring() {
        let mut dom = Domain::empty("t");
        let mut ehci = ctrl(ControllerKind::Usb, 0, "usb");
        ehci.model = Some(ControllerModel::Ich9Ehci1);
        dom.controllers.push(ehci);
        let mut uhci = ctrl(ControllerKind::Usb, 1, "usb1");
        uhci.model = Some(ControllerModel::Ich9Uhci1);
        uhci.master = Some(UsbMaster {
            idx: 0,
            startport: 0,
        });
        let mut addr = PciAddress::new(0, 0, 4, 0);
        addr.multifunction = Some(true);
        uhci.info.addr = DeviceAddress::Pci(addr);
        assert_eq!(
            build_controller_dev_str(&uhci, &dom, &full_caps()).unwrap(),
            "ich9-usb-uhci1,id=usb1,masterbus=usb.0,firstport=0,bus=pci.0,multifunction=on,addr=0x4"
        );
    }

    #[test]
    fn pci_bridge_line() {
        let dom = Domain::empty("t");
        let mut c = ctrl(ControllerKind::Pci, 1, "pci.1");
        c.model = Some(ControllerModel::PciBridge);
        c.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 3, 0));
        assert_eq!(
            build_controller_dev_str(&c, &dom, &full_caps()).unwrap(),
            "pci-bridge,chassis_nr=1,id=pci.1,bus=pci.0,addr=0x3"
        );
    }

    #[test]
    fn pci_root_is_a_programming_error() {
        let dom = Domain::empty("t");
        let mut c = ctrl(ControllerKind::Pci, 0, "pci.0");
        c.model = Some(ControllerModel::PciRoot);
        assert!(matches!(
            build_controller_dev_str(&c, &dom, &full_caps()),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn secondary_ide_is_rejected() {
        let dom = Domain::empty("t");
        let c = ctrl(ControllerKind::Ide, 1, "ide1");
        assert!(matches!(
            build_controller_dev_str(&c, &dom, &full_caps()),
            Err(Error::InvalidConfig(_))
        ));
    }
}
