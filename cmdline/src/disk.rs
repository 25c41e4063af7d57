// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Disk rendering: the `-drive` backend line and its `-device` frontend.

use caps::Cap;
use caps::QemuCaps;
use domain::CacheMode;
use domain::ControllerKind;
use domain::ControllerModel;
use domain::DeviceAddress;
use domain::Disk;
use domain::DiskBus;
use domain::DiskDevice;
use domain::DiskSource;
use domain::DiskSourceHost;
use domain::Domain;
use domain::ErrorPolicy;
use domain::GeometryTranslation;
use domain::IoMode;
use domain::NetProtocol;

use crate::builder::OptLine;
use crate::suffix;
use crate::Error;
use crate::Result;

pub fn drive_id(alias: &str) -> String {
    format!("drive-{}", alias)
}

fn unsupported(what: &str, disk: &Disk) -> Error {
    Error::ConfigUnsupported(format!("{} on disk '{}'", what, disk.dst))
}

/// Characters allowed in a `serial=` value.
fn serial_is_clean(serial: &str) -> bool {
    !serial.is_empty()
        && serial
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Formats a network disk source. Gluster, iSCSI and sheepdog speak the
/// URI form; bare `nbd:` and `rbd:` keep their legacy spellings.
fn network_source(
    protocol: NetProtocol,
    name: Option<&str>,
    hosts: &[DiskSourceHost],
    user: Option<&str>,
    disk: &Disk,
) -> Result<String> {
    match protocol {
        NetProtocol::Nbd => {
            let host = hosts
                .first()
                .ok_or_else(|| Error::InvalidConfig(format!("nbd disk '{}' has no host", disk.dst)))?;
            let mut out = if let Some(socket) = &host.socket {
                format!("nbd:unix:{}", socket)
            } else {
                format!("nbd:{}:{}", host.name, host.port.unwrap_or(10809))
            };
            if let Some(name) = name {
                out.push_str(":exportname=");
                out.push_str(name);
            }
            Ok(out)
        }
        NetProtocol::Rbd => {
            let name = name
                .ok_or_else(|| Error::InvalidConfig(format!("rbd disk '{}' has no image name", disk.dst)))?;
            let mut out = format!("rbd:{}", name);
            if let Some(user) = user {
                out.push_str(":id=");
                out.push_str(user);
            }
            if !hosts.is_empty() {
                out.push_str(":mon_host=");
                for (i, host) in hosts.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    out.push_str(&host.name);
                    if let Some(port) = host.port {
                        out.push(':');
                        out.push_str(&port.to_string());
                    }
                }
            }
            Ok(out)
        }
        NetProtocol::Gluster | NetProtocol::Iscsi | NetProtocol::Sheepdog => {
            let host = hosts
                .first()
                .ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "{} disk '{}' has no host",
                        protocol.scheme(),
                        disk.dst
                    ))
                })?;
            let mut out = protocol.scheme().to_owned();
            if let Some(transport) = &host.transport {
                if transport != "tcp" {
                    out.push('+');
                    out.push_str(transport);
                }
            }
            out.push_str("://");
            if let Some(user) = user {
                out.push_str(user);
                out.push('@');
            }
            out.push_str(&host.name);
            if let Some(port) = host.port {
                out.push(':');
                out.push_str(&port.to_string());
            }
            out.push('/');
            if let Some(name) = name {
                out.push_str(name);
            }
            Ok(out)
        }
    }
}

/// Emits the cache sub-option. Old emulators only know on/off; anything
/// that would write back without a flush barrier is downgraded to off.
fn add_cache(opt: &mut OptLine, mode: CacheMode, qemu_caps: &QemuCaps, disk: &Disk) -> Result<()> {
    if qemu_caps.has(Cap::DriveCacheV2) {
        let name = match mode {
            CacheMode::None => "none",
            CacheMode::Writethrough => "writethrough",
            CacheMode::Writeback => "writeback",
            CacheMode::Directsync => {
                if !qemu_caps.has(Cap::DriveCacheDirectsync) {
                    return Err(unsupported("cache mode directsync", disk));
                }
                "directsync"
            }
            CacheMode::Unsafe => {
                if !qemu_caps.has(Cap::DriveCacheUnsafe) {
                    return Err(unsupported("cache mode unsafe", disk));
                }
                "unsafe"
            }
        };
        opt.add_keyword("cache", name);
    } else {
        let v1 = match mode {
            CacheMode::Writeback => "on",
            CacheMode::Writethrough => {
                log::warn!(
                    "disk '{}': cache=writethrough downgraded to off on this emulator",
                    disk.dst
                );
                "off"
            }
            CacheMode::None | CacheMode::Directsync | CacheMode::Unsafe => "off",
        };
        opt.add_keyword("cache", v1);
    }
    Ok(())
}

fn error_policy_name(policy: ErrorPolicy) -> &'static str {
    match policy {
        ErrorPolicy::Stop => "stop",
        ErrorPolicy::Report => "report",
        ErrorPolicy::Ignore => "ignore",
        ErrorPolicy::Enospace => "enospc",
    }
}

/// The `-drive` line for one disk.
pub fn build_drive_str(disk: &Disk, qemu_caps: &QemuCaps) -> Result<String> {
    let use_device = qemu_caps.has(Cap::Device);
    let mut opt = OptLine::new();

    match &disk.src {
        DiskSource::None => {
            // Empty removable media: the drive exists with no backing.
            if !matches!(disk.device, DiskDevice::Cdrom | DiskDevice::Floppy) {
                return Err(Error::InvalidConfig(format!(
                    "disk '{}' has no source",
                    disk.dst
                )));
            }
        }
        DiskSource::File { path } | DiskSource::Block { path } => {
            opt.add_literal("file=");
            opt.add_escaped(&path.to_string_lossy());
        }
        DiskSource::Dir { path } => {
            if !disk.readonly {
                return Err(Error::InvalidConfig(format!(
                    "cannot create virtual FAT disk '{}' in read-write mode",
                    disk.dst
                )));
            }
            opt.add_literal("file=fat:");
            if disk.device == DiskDevice::Floppy {
                opt.add_literal("floppy:");
            }
            opt.add_escaped(&path.to_string_lossy());
        }
        DiskSource::Network {
            protocol,
            name,
            hosts,
            user,
        } => {
            let src = network_source(*protocol, name.as_deref(), hosts, user.as_deref(), disk)?;
            opt.add_literal("file=");
            opt.add_escaped(&src);
        }
    }

    let comma_needed = !opt.is_empty();
    let iface = if use_device { "none" } else { disk.bus.name() };
    if comma_needed {
        opt.add_keyword("if", iface);
    } else {
        opt.add_literal("if=");
        opt.add_literal(iface);
    }

    if use_device {
        opt.add_keyword("id", drive_id(disk.info.alias_or_empty()));
    } else {
        // Legacy identity: position on the bus, or a raw index.
        match disk.info.addr.drive() {
            Some(addr) => {
                opt.add_keyword("bus", addr.bus);
                opt.add_keyword("unit", addr.unit);
            }
            None => {
                if let Some(index) = disk.index() {
                    opt.add_keyword("index", index);
                }
            }
        }
        if disk.info.bootindex.is_some() {
            opt.add_keyword("boot", "on");
        }
    }

    if disk.readonly {
        if !qemu_caps.has(Cap::DriveReadonly) {
            return Err(unsupported("readonly", disk));
        }
        opt.add_keyword("readonly", "on");
    }
    if disk.device == DiskDevice::Cdrom {
        opt.add_keyword("media", "cdrom");
    }
    if let Some(format) = &disk.format {
        if !qemu_caps.has(Cap::DriveFormat) {
            return Err(unsupported("explicit format", disk));
        }
        opt.add_keyword("format", format);
    }

    if let Some(blockio) = &disk.blockio {
        if !blockio.is_zero() {
            if !qemu_caps.has(Cap::BlockioSize) {
                return Err(unsupported("block size tuning", disk));
            }
            opt.add_keyword_nonzero("logical_block_size", blockio.logical_block_size as u64);
            opt.add_keyword_nonzero("physical_block_size", blockio.physical_block_size as u64);
        }
    }

    if let Some(wwn) = &disk.wwn {
        let gate = match disk.bus {
            DiskBus::Scsi => Cap::ScsiDiskWwn,
            _ => Cap::IdeDriveWwn,
        };
        if !qemu_caps.has(gate) {
            return Err(unsupported("wwn", disk));
        }
        if wwn.starts_with("0x") {
            opt.add_keyword("wwn", wwn);
        } else {
            opt.add_keyword("wwn", format!("0x{}", wwn));
        }
    }
    if let Some(vendor) = &disk.vendor {
        opt.add_keyword("vendor", vendor);
    }
    if let Some(product) = &disk.product {
        opt.add_keyword("product", product);
    }

    if let Some(geometry) = &disk.geometry {
        opt.add_keyword("cyls", geometry.cylinders);
        opt.add_keyword("heads", geometry.heads);
        opt.add_keyword("secs", geometry.sectors);
        if let Some(translation) = geometry.translation {
            let name = match translation {
                GeometryTranslation::Auto => "auto",
                GeometryTranslation::None => "none",
                GeometryTranslation::Lba => "lba",
            };
            opt.add_keyword("trans", name);
        }
    }

    if let Some(serial) = &disk.serial {
        if !serial_is_clean(serial) {
            return Err(Error::InvalidConfig(format!(
                "serial of disk '{}' contains characters outside [A-Za-z0-9_-]",
                disk.dst
            )));
        }
        if !qemu_caps.has(Cap::DriveSerial) {
            return Err(unsupported("serial", disk));
        }
        opt.add_keyword("serial", serial);
    }

    if let Some(cache) = disk.cache {
        add_cache(&mut opt, cache, qemu_caps, disk)?;
    }
    if disk.copy_on_read {
        if !qemu_caps.has(Cap::DriveCopyOnRead) {
            return Err(unsupported("copy-on-read", disk));
        }
        opt.add_keyword("copy-on-read", "on");
    }
    if let Some(discard) = disk.discard {
        if !qemu_caps.has(Cap::DriveDiscard) {
            return Err(unsupported("discard", disk));
        }
        let name = match discard {
            domain::DiscardMode::Unmap => "unmap",
            domain::DiscardMode::Ignore => "ignore",
        };
        opt.add_keyword("discard", name);
    }

    if let Some(policy) = disk.error_policy {
        opt.add_keyword("werror", error_policy_name(policy));
    }
    if let Some(policy) = disk.rerror_policy {
        // Write-side full-disk handling has no read equivalent.
        if policy == ErrorPolicy::Enospace {
            return Err(Error::InvalidConfig(format!(
                "disk '{}': enospc is not a valid read error policy",
                disk.dst
            )));
        }
        opt.add_keyword("rerror", error_policy_name(policy));
    }

    if let Some(io) = disk.io {
        if !qemu_caps.has(Cap::DriveAio) {
            return Err(unsupported("io mode", disk));
        }
        let name = match io {
            IoMode::Threads => "threads",
            IoMode::Native => "native",
        };
        opt.add_keyword("aio", name);
    }

    if !disk.iotune.is_zero() {
        if !qemu_caps.has(Cap::DriveIotune) {
            return Err(unsupported("I/O throttling", disk));
        }
        opt.add_keyword_nonzero("bps", disk.iotune.total_bytes_sec);
        opt.add_keyword_nonzero("bps_rd", disk.iotune.read_bytes_sec);
        opt.add_keyword_nonzero("bps_wr", disk.iotune.write_bytes_sec);
        opt.add_keyword_nonzero("iops", disk.iotune.total_iops_sec);
        opt.add_keyword_nonzero("iops_rd", disk.iotune.read_iops_sec);
        opt.add_keyword_nonzero("iops_wr", disk.iotune.write_iops_sec);
    }

    Ok(opt.finish())
}

fn scsi_controller_model(dom: &Domain, controller_idx: u32) -> Option<ControllerModel> {
    dom.find_controller(ControllerKind::Scsi, controller_idx)
        .and_then(|c| c.model)
}

/// The `-device` frontend for one disk. Unlike most devices, the bus
/// position comes right after the model so it reads like hardware wiring.
pub fn build_disk_device_str(disk: &Disk, dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    let mut opt = OptLine::new();
    match disk.bus {
        DiskBus::Ide => {
            let model = if qemu_caps.has(Cap::IdeCd) {
                if disk.device == DiskDevice::Cdrom {
                    "ide-cd"
                } else {
                    "ide-hd"
                }
            } else {
                "ide-drive"
            };
            opt.add_literal(model);
            let addr = disk.info.addr.drive().copied().unwrap_or_default();
            opt.add_keyword("bus", format!("ide.{}", addr.bus));
            opt.add_keyword("unit", addr.unit);
        }
        DiskBus::Sata => {
            let model = if disk.device == DiskDevice::Cdrom {
                "ide-cd"
            } else {
                "ide-hd"
            };
            opt.add_literal(model);
            let addr = disk.info.addr.drive().copied().unwrap_or_default();
            opt.add_keyword("bus", format!("ahci{}.{}", addr.controller, addr.unit));
        }
        DiskBus::Scsi => {
            let addr = disk.info.addr.drive().copied().unwrap_or_default();
            let controller_model = scsi_controller_model(dom, addr.controller);
            if disk.device == DiskDevice::Lun {
                if !qemu_caps.has(Cap::ScsiBlock) {
                    return Err(unsupported("SCSI passthrough", disk));
                }
                let usable = matches!(disk.src, DiskSource::Block { .. })
                    || matches!(
                        &disk.src,
                        DiskSource::Network {
                            protocol: NetProtocol::Iscsi,
                            ..
                        }
                    );
                if !usable {
                    return Err(Error::InvalidConfig(format!(
                        "disk '{}': lun passthrough needs a block device or iSCSI source",
                        disk.dst
                    )));
                }
                opt.add_literal("scsi-block");
            } else if qemu_caps.has(Cap::ScsiCd) {
                opt.add_literal(if disk.device == DiskDevice::Cdrom {
                    "scsi-cd"
                } else {
                    "scsi-hd"
                });
            } else {
                opt.add_literal("scsi-disk");
            }
            match controller_model {
                Some(ControllerModel::VirtioScsi) => {
                    if !qemu_caps.has(Cap::ScsiDiskChannel) && addr.bus != 0 {
                        return Err(unsupported("SCSI channel addressing", disk));
                    }
                    opt.add_keyword("bus", format!("scsi{}.0", addr.controller));
                    opt.add_keyword("channel", addr.bus);
                    opt.add_keyword("scsi-id", addr.target);
                    opt.add_keyword("lun", addr.unit);
                }
                _ => {
                    opt.add_keyword("bus", format!("scsi{}.{}", addr.controller, addr.bus));
                    opt.add_keyword("scsi-id", addr.unit);
                }
            }
        }
        DiskBus::Virtio => {
            let pci = match &disk.info.addr {
                DeviceAddress::Ccw(_) => {
                    opt.add_literal("virtio-blk-ccw");
                    false
                }
                DeviceAddress::VioS390 => {
                    opt.add_literal("virtio-blk-s390");
                    false
                }
                _ => {
                    opt.add_literal("virtio-blk-pci");
                    true
                }
            };
            if pci && qemu_caps.has(Cap::VirtioBlkScsi) {
                // Guest-initiated SG_IO stays off unless asked for.
                let sgio = disk.device == DiskDevice::Lun;
                if sgio && !qemu_caps.has(Cap::VirtioBlkSgIo) {
                    return Err(unsupported("SCSI passthrough", disk));
                }
                opt.add_keyword_onoff("scsi", sgio);
            }
            suffix::add_device_address(&mut opt, dom, &disk.info, qemu_caps)?;
        }
        DiskBus::Usb => {
            if !qemu_caps.has(Cap::UsbStorage) {
                return Err(unsupported("USB disks", disk));
            }
            opt.add_literal("usb-storage");
            suffix::add_device_address(&mut opt, dom, &disk.info, qemu_caps)?;
        }
        DiskBus::Fdc => {
            return Err(Error::Internal(format!(
                "floppy '{}' reached the -device serializer",
                disk.dst
            )));
        }
    }

    let alias = disk.info.alias_or_empty();
    opt.add_keyword("drive", drive_id(alias));
    opt.add_keyword("id", alias);
    suffix::add_bootindex(&mut opt, &disk.info, qemu_caps, Cap::Bootindex)?;
    suffix::add_rom_opts(&mut opt, &disk.info, qemu_caps)?;
    Ok(opt.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceInfo;
    use domain::DriveAddress;
    use domain::IoTune;

    fn base_disk(dst: &str, bus: DiskBus) -> Disk {
        Disk {
            info: DeviceInfo {
                alias: Some(match bus {
                    DiskBus::Virtio => format!("virtio-disk0"),
                    _ => format!("{}0-0-0", bus.name()),
                }),
                ..DeviceInfo::default()
            },
            dst: dst.to_owned(),
            bus,
            device: DiskDevice::Disk,
            src: DiskSource::File {
                path: "/var/img.qcow2".into(),
            },
            format: Some("qcow2".to_owned()),
            readonly: false,
            shareable: false,
            cache: None,
            error_policy: None,
            rerror_policy: None,
            io: None,
            copy_on_read: false,
            discard: None,
            serial: None,
            wwn: None,
            vendor: None,
            product: None,
            geometry: None,
            blockio: None,
            iotune: IoTune::default(),
        }
    }

    fn full_caps() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::Device,
            Cap::Drive,
            Cap::DriveFormat,
            Cap::DriveReadonly,
            Cap::DriveSerial,
            Cap::DriveAio,
            Cap::DriveCacheV2,
            Cap::DriveCacheDirectsync,
            Cap::DriveCacheUnsafe,
            Cap::DriveCopyOnRead,
            Cap::DriveDiscard,
            Cap::DriveIotune,
            Cap::BlockioSize,
            Cap::ScsiDiskWwn,
            Cap::IdeDriveWwn,
            Cap::IdeCd,
            Cap::ScsiCd,
            Cap::ScsiBlock,
            Cap::ScsiDiskChannel,
            Cap::VirtioBlkScsi,
            Cap::PciMultibus,
            Cap::Bootindex,
        ])
    }

    #[test]
    fn minimal_virtio_drive() {
        let disk = base_disk("vda", DiskBus::Virtio);
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert_eq!(
            s,
            "file=/var/img.qcow2,if=none,id=drive-virtio-disk0,format=qcow2"
        );
    }

    #[test]
    fn cdrom_drive_order() {
        let mut disk = base_disk("hdc", DiskBus::Ide);
        disk.info.alias = Some("ide0-1-0".to_owned());
        disk.device = DiskDevice::Cdrom;
        disk.src = DiskSource::File {
            path: "/iso.img".into(),
        };
        disk.format = Some("raw".to_owned());
        disk.readonly = true;
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert_eq!(
            s,
            "file=/iso.img,if=none,id=drive-ide0-1-0,readonly=on,media=cdrom,format=raw"
        );
    }

    #[test]
    fn legacy_drive_uses_bus_and_unit() {
        let mut disk = base_disk("hda", DiskBus::Ide);
        disk.info.addr = DeviceAddress::Drive(DriveAddress::default());
        disk.format = None;
        let mut qemu_caps = QemuCaps::from_caps([Cap::Drive]);
        let s = build_drive_str(&disk, &qemu_caps).unwrap();
        assert_eq!(s, "file=/var/img.qcow2,if=ide,bus=0,unit=0");
        qemu_caps.set(Cap::DriveFormat);
        disk.format = Some("qcow2".to_owned());
        let s = build_drive_str(&disk, &qemu_caps).unwrap();
        assert_eq!(s, "file=/var/img.qcow2,if=ide,bus=0,unit=0,format=qcow2");
    }

    #[test]
    fn serial_charset_is_enforced() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.serial = Some("WD-1234_ok".to_owned());
        assert!(build_drive_str(&disk, &full_caps()).is_ok());
        disk.serial = Some("bad serial!".to_owned());
        let err = build_drive_str(&disk, &full_caps()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn cache_v1_downgrades_writethrough() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.cache = Some(CacheMode::Writethrough);
        disk.format = None;
        let qemu_caps = QemuCaps::from_caps([Cap::Device, Cap::Drive]);
        let s = build_drive_str(&disk, &qemu_caps).unwrap();
        assert!(s.ends_with("cache=off"), "{}", s);
        disk.cache = Some(CacheMode::Writeback);
        let s = build_drive_str(&disk, &qemu_caps).unwrap();
        assert!(s.ends_with("cache=on"), "{}", s);
    }

    #[test]
    fn cache_v2_names_and_gates() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.cache = Some(CacheMode::Directsync);
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert!(s.ends_with("cache=directsync"), "{}", s);
        let mut limited = full_caps();
        limited.clear(Cap::DriveCacheDirectsync);
        assert!(matches!(
            build_drive_str(&disk, &limited),
            Err(Error::ConfigUnsupported(_))
        ));
    }

    #[test]
    fn enospc_collapses_to_werror_only() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.error_policy = Some(ErrorPolicy::Enospace);
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert!(s.contains("werror=enospc"), "{}", s);
        assert!(!s.contains("rerror"), "{}", s);
        disk.rerror_policy = Some(ErrorPolicy::Enospace);
        assert!(build_drive_str(&disk, &full_caps()).is_err());
    }

    #[test]
    fn iotune_keywords() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.iotune.total_bytes_sec = 1000000;
        disk.iotune.read_iops_sec = 2000;
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert!(s.ends_with("bps=1000000,iops_rd=2000"), "{}", s);
    }

    #[test]
    fn fat_dir_requires_readonly() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.src = DiskSource::Dir {
            path: "/export".into(),
        };
        disk.format = None;
        assert!(build_drive_str(&disk, &full_caps()).is_err());
        disk.readonly = true;
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert!(s.starts_with("file=fat:/export"), "{}", s);
    }

    #[test]
    fn nbd_legacy_spelling() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.format = None;
        disk.src = DiskSource::Network {
            protocol: NetProtocol::Nbd,
            name: None,
            hosts: vec![DiskSourceHost {
                name: "example.org".to_owned(),
                port: Some(6000),
                transport: None,
                socket: None,
            }],
            user: None,
        };
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert!(s.starts_with("file=nbd:example.org:6000,"), "{}", s);
    }

    #[test]
    fn sourceless_nbd_is_rejected() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.src = DiskSource::Network {
            protocol: NetProtocol::Nbd,
            name: None,
            hosts: Vec::new(),
            user: None,
        };
        assert!(matches!(
            build_drive_str(&disk, &full_caps()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn gluster_uri_spelling() {
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.format = None;
        disk.src = DiskSource::Network {
            protocol: NetProtocol::Gluster,
            name: Some("volume/image.qcow2".to_owned()),
            hosts: vec![DiskSourceHost {
                name: "gl.example.org".to_owned(),
                port: Some(24007),
                transport: None,
                socket: None,
            }],
            user: None,
        };
        let s = build_drive_str(&disk, &full_caps()).unwrap();
        assert!(
            s.starts_with("file=gluster://gl.example.org:24007/volume/image.qcow2,"),
            "{}",
            s
        );
    }

    #[test]
    fn virtio_device_line() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.info.addr = DeviceAddress::Pci(domain::PciAddress::new(0, 0, 3, 0));
        let s = build_disk_device_str(&disk, &dom, &full_caps()).unwrap();
        assert_eq!(
            s,
            "virtio-blk-pci,scsi=off,bus=pci.0,addr=0x3,drive=drive-virtio-disk0,id=virtio-disk0"
        );
    }

    #[test]
    fn ide_cd_device_line_with_bootindex() {
        let dom = Domain::empty("t");
        let mut disk = base_disk("hdc", DiskBus::Ide);
        disk.info.alias = Some("ide0-1-0".to_owned());
        disk.device = DiskDevice::Cdrom;
        disk.info.addr = DeviceAddress::Drive(DriveAddress {
            controller: 0,
            bus: 1,
            target: 0,
            unit: 0,
        });
        disk.info.bootindex = Some(1);
        let s = build_disk_device_str(&disk, &dom, &full_caps()).unwrap();
        assert_eq!(
            s,
            "ide-cd,bus=ide.1,unit=0,drive=drive-ide0-1-0,id=ide0-1-0,bootindex=1"
        );
    }

    #[test]
    fn scsi_on_lsi_uses_scsi_id() {
        use domain::Controller;
        let mut dom = Domain::empty("t");
        let mut lsi = Controller::new(ControllerKind::Scsi, 0);
        lsi.model = Some(ControllerModel::LsiLogic);
        dom.controllers.push(lsi);
        let mut disk = base_disk("sda", DiskBus::Scsi);
        disk.info.alias = Some("scsi0-0-0".to_owned());
        disk.info.addr = DeviceAddress::Drive(DriveAddress::default());
        let s = build_disk_device_str(&disk, &dom, &full_caps()).unwrap();
        assert!(s.starts_with("scsi-hd,bus=scsi0.0,scsi-id=0,"), "{}", s);
    }

    #[test]
    fn scsi_on_virtio_scsi_uses_lun_addressing() {
        use domain::Controller;
        let mut dom = Domain::empty("t");
        let mut ctrl = Controller::new(ControllerKind::Scsi, 0);
        ctrl.model = Some(ControllerModel::VirtioScsi);
        dom.controllers.push(ctrl);
        let mut disk = base_disk("sda", DiskBus::Scsi);
        disk.info.alias = Some("scsi0-0-0".to_owned());
        disk.info.addr = DeviceAddress::Drive(DriveAddress {
            controller: 0,
            bus: 0,
            target: 2,
            unit: 5,
        });
        let s = build_disk_device_str(&disk, &dom, &full_caps()).unwrap();
        assert!(
            s.starts_with("scsi-hd,bus=scsi0.0,channel=0,scsi-id=2,lun=5,"),
            "{}",
            s
        );
    }

    #[test]
    fn ccw_disk_device() {
        use domain::CcwAddress;
        let dom = Domain::empty("t");
        let mut disk = base_disk("vda", DiskBus::Virtio);
        disk.info.addr = DeviceAddress::Ccw(CcwAddress::virtio(0));
        let mut qemu_caps = full_caps();
        qemu_caps.clear(Cap::VirtioBlkScsi);
        let s = build_disk_device_str(&disk, &dom, &qemu_caps).unwrap();
        assert_eq!(
            s,
            "virtio-blk-ccw,devno=fe.0.0000,drive=drive-virtio-disk0,id=virtio-disk0"
        );
    }
}
