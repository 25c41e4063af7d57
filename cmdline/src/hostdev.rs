// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host device passthrough rendering.

use caps::Cap;
use caps::QemuCaps;
use domain::Domain;
use domain::Hostdev;
use domain::HostdevSource;
use domain::PciPassthroughBackend;

use crate::builder::OptLine;
use crate::suffix;
use crate::Error;
use crate::Result;

/// Drive id of the generic-SCSI backend belonging to one SCSI hostdev.
pub fn scsi_hostdev_drive_id(alias: &str) -> String {
    format!("scsi-{}", alias)
}

/// The `-drive` backend for a SCSI hostdev.
pub fn build_scsi_hostdev_drive_str(hostdev: &Hostdev) -> Result<String> {
    let (path, readonly) = match &hostdev.source {
        HostdevSource::Scsi { path, readonly } => (path, *readonly),
        _ => {
            return Err(Error::Internal(
                "non-SCSI hostdev reached the SCSI drive serializer".to_owned(),
            ));
        }
    };
    let mut opt = OptLine::new();
    opt.add_literal("file=");
    opt.add_escaped(&path.to_string_lossy());
    opt.add_keyword("if", "none");
    opt.add_keyword(
        "id",
        scsi_hostdev_drive_id(hostdev.info.alias_or_empty()),
    );
    if readonly {
        opt.add_keyword("readonly", "on");
    }
    Ok(opt.finish())
}

/// The `-device` line for one hostdev.
pub fn build_hostdev_dev_str(
    hostdev: &Hostdev,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<String> {
    let alias = hostdev.info.alias_or_empty();
    let mut opt = OptLine::new();
    match &hostdev.source {
        HostdevSource::Pci { addr } => {
            let vfio = match hostdev.backend {
                PciPassthroughBackend::Vfio => true,
                PciPassthroughBackend::Kvm => false,
                PciPassthroughBackend::Default => qemu_caps.has(Cap::VfioPci),
            };
            if vfio {
                if !qemu_caps.has(Cap::VfioPci) {
                    return Err(Error::ConfigUnsupported(format!(
                        "VFIO PCI passthrough of {}",
                        addr
                    )));
                }
                opt.add_literal("vfio-pci");
                opt.add_keyword("host", addr);
            } else {
                if !qemu_caps.has(Cap::PciAssign) {
                    return Err(Error::ConfigUnsupported(format!(
                        "PCI passthrough of {}",
                        addr
                    )));
                }
                opt.add_literal("pci-assign");
                opt.add_keyword("host", addr);
                if let Some(configfd) = hostdev.configfd {
                    if !qemu_caps.has(Cap::PciConfigfd) {
                        return Err(Error::ConfigUnsupported(format!(
                            "config descriptor passing for {}",
                            addr
                        )));
                    }
                    opt.add_keyword("configfd", configfd);
                }
            }
            opt.add_keyword("id", alias);
            suffix::add_bootindex(&mut opt, &hostdev.info, qemu_caps, Cap::PciBootindex)?;
            suffix::add_rom_opts(&mut opt, &hostdev.info, qemu_caps)?;
            suffix::add_device_address(&mut opt, dom, &hostdev.info, qemu_caps)?;
        }
        HostdevSource::Usb { bus, device } => {
            opt.add_literal("usb-host");
            if let Some(bus) = bus {
                opt.add_keyword("hostbus", bus);
            }
            if let Some(device) = device {
                opt.add_keyword("hostaddr", device);
            }
            opt.add_keyword("id", alias);
            suffix::add_bootindex(&mut opt, &hostdev.info, qemu_caps, Cap::UsbHostBootindex)?;
        }
        HostdevSource::Scsi { .. } => {
            opt.add_literal("scsi-generic");
            let addr = hostdev.info.addr.drive().copied().unwrap_or_default();
            opt.add_keyword("bus", format!("scsi{}.{}", addr.controller, addr.bus));
            opt.add_keyword("scsi-id", addr.unit);
            opt.add_keyword("drive", scsi_hostdev_drive_id(alias));
            opt.add_keyword("id", alias);
            suffix::add_bootindex(&mut opt, &hostdev.info, qemu_caps, Cap::Bootindex)?;
        }
    }
    Ok(opt.finish())
}
