// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The per-transition address allocation driver.
//!
//! Runs the SPAPR-VIO, S390 and PCI passes in that order: pseries devices
//! have to leave the PCI pool before the PCI pass counts anything. Each
//! pass is a no-op on machines that do not demand it.

use std::collections::BTreeMap;

use caps::Cap;
use caps::QemuCaps;
use domain::Controller;
use domain::ControllerKind;
use domain::ControllerModel;
use domain::DeviceAddress;
use domain::DiskBus;
use domain::Domain;
use domain::HostdevSource;
use domain::MemballoonModel;
use domain::PciAddress;
use domain::SoundModel;
use domain::VideoModel;
use domain::WatchdogModel;

use crate::ccw::CcwAddressSet;
use crate::pci::BusFlags;
use crate::pci::PciAddressSet;
use crate::spapr::assign_spapr_vio;
use crate::Error;
use crate::Result;

/// Populated address sets handed back for the live-domain private state;
/// hot-plug reserves and releases against these.
#[derive(Debug, Default)]
pub struct DomainAddresses {
    pub pci: Option<PciAddressSet>,
    pub ccw: Option<CcwAddressSet>,
}

const PCI_WANTED: BusFlags = BusFlags {
    hotplug: false,
    pci: true,
};

const PIIX_COMPOSITE: PciAddress = PciAddress {
    domain: 0,
    bus: 0,
    slot: 1,
    function: 0,
    multifunction: None,
};
const PIIX_IDE: PciAddress = PciAddress {
    domain: 0,
    bus: 0,
    slot: 1,
    function: 1,
    multifunction: None,
};
const PIIX_USB: PciAddress = PciAddress {
    domain: 0,
    bus: 0,
    slot: 1,
    function: 2,
    multifunction: None,
};
const PRIMARY_VIDEO: PciAddress = PciAddress {
    domain: 0,
    bus: 0,
    slot: 2,
    function: 0,
    multifunction: None,
};

/// Entry point of the allocator phase. Mutates device infos in place and
/// returns the populated sets.
pub fn assign_addresses(dom: &mut Domain, qemu_caps: &QemuCaps) -> Result<DomainAddresses> {
    materialize_drive_addresses(dom);
    assign_spapr_vio(dom)?;
    let ccw = assign_s390(dom, qemu_caps)?;
    let pci = if qemu_caps.has(Cap::Device) && machine_has_pci(dom) {
        Some(assign_pci(dom, qemu_caps)?)
    } else {
        None
    };
    Ok(DomainAddresses { pci, ccw })
}

fn machine_has_pci(dom: &Domain) -> bool {
    !dom.is_s390() && !dom.machine_is_s390_ccw()
}

/// Writes the controller/bus/unit position the destination name implies
/// into every addressless disk that lives on a drive bus.
fn materialize_drive_addresses(dom: &mut Domain) {
    for disk in &mut dom.disks {
        let on_drive_bus = matches!(
            disk.bus,
            DiskBus::Ide | DiskBus::Fdc | DiskBus::Scsi | DiskBus::Sata
        );
        if on_drive_bus && disk.info.addr.is_none() {
            if let Some(addr) = disk.default_drive_address() {
                disk.info.addr = DeviceAddress::Drive(addr);
            }
        }
    }
}

// ------------------------------------------------------------------ s390

/// The S390 pass. On s390-ccw machines with the CCW capability, every
/// virtio device is moved to the channel subsystem: explicit addresses are
/// validated first, the rest take the cursor. Legacy virtio-s390 machines
/// only get their address types rewritten.
fn assign_s390(dom: &mut Domain, qemu_caps: &QemuCaps) -> Result<Option<CcwAddressSet>> {
    if !dom.is_s390() {
        return Ok(None);
    }
    let ccw_machine = dom.machine_is_s390_ccw() && qemu_caps.has(Cap::VirtioCcw);
    if !ccw_machine {
        if qemu_caps.has(Cap::VirtioS390) {
            rewrite_s390_types(dom, DeviceAddress::VioS390);
        }
        return Ok(None);
    }

    // Coerce the addressless candidates onto the CCW bus first so both
    // phases below see a consistent address-type picture.
    coerce_ccw_candidates(dom);

    let mut set = CcwAddressSet::new();

    // Phase a: validate and record every explicit address.
    let mut explicit = Vec::new();
    dom.for_each_info(|_, _, info| {
        if let DeviceAddress::Ccw(addr) = &info.addr {
            explicit.push(*addr);
        }
    });
    for addr in explicit {
        set.reserve(&addr)?;
    }

    // Phase b: hand a devno to everything still waiting.
    let mut pending = 0usize;
    dom.for_each_info(|_, _, info| {
        if matches!(info.addr, DeviceAddress::VioS390) {
            pending += 1;
        }
    });
    let mut assigned = Vec::with_capacity(pending);
    for _ in 0..pending {
        assigned.push(set.assign_next()?);
    }
    let mut next = assigned.into_iter();
    dom.for_each_info_mut(|_, _, info| {
        if matches!(info.addr, DeviceAddress::VioS390) {
            if let Some(addr) = next.next() {
                info.addr = DeviceAddress::Ccw(addr);
            }
        }
    });

    Ok(Some(set))
}

/// Marks the devices that belong on the s390 virtio bus. The placeholder
/// type is `VioS390`; the CCW phase replaces it, the legacy path keeps it.
fn coerce_ccw_candidates(dom: &mut Domain) {
    rewrite_s390_types(dom, DeviceAddress::VioS390);
}

fn rewrite_s390_types(dom: &mut Domain, target: DeviceAddress) {
    for disk in &mut dom.disks {
        if disk.bus == DiskBus::Virtio && disk.info.addr.is_none() {
            disk.info.addr = target.clone();
        }
    }
    for net in &mut dom.nets {
        if net.is_virtio() && net.info.addr.is_none() {
            net.info.addr = target.clone();
        }
    }
    for c in &mut dom.controllers {
        let wants = matches!(
            c.kind,
            ControllerKind::VirtioSerial | ControllerKind::Scsi
        );
        if wants && c.info.addr.is_none() {
            c.info.addr = target.clone();
        }
    }
    if let Some(balloon) = &mut dom.memballoon {
        if balloon.model == MemballoonModel::Virtio && balloon.info.addr.is_none() {
            balloon.info.addr = target.clone();
        }
    }
    if let Some(rng) = &mut dom.rng {
        if rng.info.addr.is_none() {
            rng.info.addr = target.clone();
        }
    }
}

// ------------------------------------------------------------------- pci

/// The PCI pass: bus discovery (with a dry run sizing the set when
/// bridges are available), validation of explicit addresses, then ordered
/// auto-assignment.
fn assign_pci(dom: &mut Domain, qemu_caps: &QemuCaps) -> Result<PciAddressSet> {
    let declared_bridge = dom
        .controllers
        .iter()
        .any(|c| c.kind == ControllerKind::Pci && c.model == Some(ControllerModel::PciBridge));
    if declared_bridge && !qemu_caps.has(Cap::PciBridge) {
        return Err(Error::BridgeUnsupported);
    }

    let mut nbuses = dom
        .controllers
        .iter()
        .filter(|c| c.kind == ControllerKind::Pci)
        .map(|c| c.idx + 1)
        .max()
        .unwrap_or(1) as usize;

    if qemu_caps.has(Cap::PciBridge) {
        // Dry run: size the bus count without writing device infos. One
        // slot is set aside for a bridge a later hot-plug may need.
        let mut dry = PciAddressSet::new_dry_run(nbuses);
        record_explicit(dom, &mut dry)?;
        dry.reserve_next_slot(&PCI_WANTED)?;
        auto_assign(dom, qemu_caps, &mut dry, false)?;
        nbuses = dry.bus_count();
        for idx in 1..nbuses as u32 {
            if dom.find_controller(ControllerKind::Pci, idx).is_none() {
                log::debug!("adding implicit pci-bridge controller {}", idx);
                let mut bridge = Controller::new(ControllerKind::Pci, idx);
                bridge.model = Some(ControllerModel::PciBridge);
                dom.controllers.push(bridge);
            }
        }
    }

    let mut addrs = PciAddressSet::new(nbuses);
    record_explicit(dom, &mut addrs)?;
    auto_assign(dom, qemu_caps, &mut addrs, true)?;
    Ok(addrs)
}

/// Stage "validate and record": every explicit PCI address lands in the
/// set. The implicit PIIX3 IDE and USB functions are skipped here; the
/// whole composite slot is reserved at the start of auto-assignment.
fn record_explicit(dom: &Domain, set: &mut PciAddressSet) -> Result<()> {
    let piix = dom.machine_is_i440fx();
    let mut addresses = Vec::new();
    for c in &dom.controllers {
        if let Some(addr) = c.info.addr.pci() {
            let implicit_ide =
                piix && c.kind == ControllerKind::Ide && c.idx == 0 && addr.same_slot(&PIIX_IDE);
            let implicit_usb =
                piix && c.kind == ControllerKind::Usb && c.idx == 0 && addr.same_slot(&PIIX_USB);
            if implicit_ide || implicit_usb {
                continue;
            }
            addresses.push(*addr);
        }
    }
    dom.for_each_info(|class, _, info| {
        if class == domain::DeviceClass::Controller {
            return;
        }
        if let Some(addr) = info.addr.pci() {
            addresses.push(*addr);
        }
    });
    for addr in addresses {
        set.reserve_address(&addr)?;
    }
    Ok(())
}

fn companion_function(model: ControllerModel) -> Option<(u8, bool)> {
    match model {
        ControllerModel::Ich9Ehci1 => Some((7, false)),
        ControllerModel::Ich9Uhci1 => Some((0, true)),
        ControllerModel::Ich9Uhci2 => Some((1, false)),
        ControllerModel::Ich9Uhci3 => Some((2, false)),
        _ => None,
    }
}

/// Stage "auto-assign": pins the PIIX3 composite and primary video, then
/// walks the device categories in the fixed order, handing each
/// addressless device the next free slot.
fn auto_assign(
    dom: &mut Domain,
    qemu_caps: &QemuCaps,
    set: &mut PciAddressSet,
    write: bool,
) -> Result<()> {
    if dom.machine_is_i440fx() {
        // Slot 1 carries the PIIX3 composite (ISA/IDE/USB/ACPI functions).
        if set.slot_is_free(0, 1) {
            set.reserve_entire_slot(&PIIX_COMPOSITE)?;
        }
        if write {
            pin_piix_functions(dom)?;
        }
        pin_primary_video(dom, qemu_caps, set, write)?;
    }

    // ICH9 companion quartets share one slot; remember it per group so
    // every member lands on the right function even in the dry run.
    let mut quartet_slots: BTreeMap<u32, PciAddress> = BTreeMap::new();

    macro_rules! place {
        ($info:expr) => {{
            if $info.addr.is_none() {
                let addr = set.reserve_next_slot(&PCI_WANTED)?;
                if write {
                    $info.addr = DeviceAddress::Pci(addr);
                }
            }
        }};
    }

    // PCI controllers (bridges); pci-root takes no address.
    for i in 0..dom.controllers.len() {
        let c = &dom.controllers[i];
        if c.kind == ControllerKind::Pci && c.model != Some(ControllerModel::PciRoot) && c.idx != 0
        {
            place!(dom.controllers[i].info);
        }
    }

    // Filesystem exports.
    for i in 0..dom.filesystems.len() {
        place!(dom.filesystems[i].info);
    }

    // Virtio disks.
    for i in 0..dom.disks.len() {
        if dom.disks[i].bus == DiskBus::Virtio {
            place!(dom.disks[i].info);
        }
    }

    // Network interfaces.
    for i in 0..dom.nets.len() {
        place!(dom.nets[i].info);
    }

    // Sound cards; SB16 and the PC speaker are ISA devices.
    for i in 0..dom.sounds.len() {
        if !matches!(dom.sounds[i].model, SoundModel::Sb16 | SoundModel::Pcspk) {
            place!(dom.sounds[i].info);
        }
    }

    // Remaining controllers: everything except IDE, FDC and CCID, which
    // never sit on PCI themselves.
    for i in 0..dom.controllers.len() {
        let c = &dom.controllers[i];
        if matches!(
            c.kind,
            ControllerKind::Ide | ControllerKind::Fdc | ControllerKind::Ccid | ControllerKind::Pci
        ) {
            continue;
        }
        // The PIIX3 UHCI lives on the composite at 0:0:1.2; in the dry run
        // it has no written address yet but must not consume a slot.
        if dom.machine_is_i440fx()
            && c.kind == ControllerKind::Usb
            && c.idx == 0
            && matches!(c.model, None | Some(ControllerModel::Piix3Uhci))
        {
            continue;
        }
        if !c.info.addr.is_none() {
            continue;
        }
        if let Some(model) = c.model {
            if let Some((function, multifunction)) = companion_function(model) {
                let group = c.master.map(|m| m.idx).unwrap_or(c.idx);
                let base = match quartet_slots.get(&group) {
                    Some(base) => *base,
                    None => {
                        let base = set.reserve_companion_quartet(&PCI_WANTED)?;
                        quartet_slots.insert(group, base);
                        base
                    }
                };
                if write {
                    let mut addr = base;
                    addr.function = function;
                    addr.multifunction = if multifunction { Some(true) } else { None };
                    dom.controllers[i].info.addr = DeviceAddress::Pci(addr);
                }
                continue;
            }
        }
        place!(dom.controllers[i].info);
    }

    // Host PCI passthrough devices.
    for i in 0..dom.hostdevs.len() {
        if matches!(dom.hostdevs[i].source, HostdevSource::Pci { .. }) {
            place!(dom.hostdevs[i].info);
        }
    }

    // The balloon.
    if let Some(balloon) = &mut dom.memballoon {
        if balloon.model == MemballoonModel::Virtio {
            place!(balloon.info);
        }
    }

    // The RNG.
    if let Some(rng) = &mut dom.rng {
        place!(rng.info);
    }

    // Watchdogs; the IB700 is an ISA device.
    if let Some(watchdog) = &mut dom.watchdog {
        if watchdog.model != WatchdogModel::Ib700 {
            place!(watchdog.info);
        }
    }

    // Remaining video cards: secondary QXL heads, plus a relocated
    // primary when the emulator supports placing it anywhere.
    for i in 0..dom.videos.len() {
        if i == 0 || dom.videos[i].model == VideoModel::Qxl {
            place!(dom.videos[i].info);
        }
    }

    Ok(())
}

fn pin_piix_functions(dom: &mut Domain) -> Result<()> {
    for c in &mut dom.controllers {
        if c.kind == ControllerKind::Ide && c.idx == 0 {
            match &c.info.addr {
                DeviceAddress::Pci(addr) if *addr != PIIX_IDE => {
                    return Err(Error::PrimaryIdeAddress(PIIX_IDE.to_string()));
                }
                DeviceAddress::None => {
                    c.info.addr = DeviceAddress::Pci(PIIX_IDE);
                }
                _ => {}
            }
        }
        let piix_uhci = matches!(c.model, None | Some(ControllerModel::Piix3Uhci));
        if c.kind == ControllerKind::Usb && c.idx == 0 && piix_uhci && c.info.addr.is_none() {
            c.info.addr = DeviceAddress::Pci(PIIX_USB);
        }
    }
    Ok(())
}

fn pin_primary_video(
    dom: &mut Domain,
    qemu_caps: &QemuCaps,
    set: &mut PciAddressSet,
    write: bool,
) -> Result<()> {
    // The slot stays reserved for the video device even when the
    // description has none.
    let relocatable = qemu_caps.has(Cap::DeviceVideoPrimary);
    match dom.videos.first_mut() {
        Some(video) if video.info.addr.is_none() => {
            if set.slot_is_free(0, 2) {
                set.reserve_entire_slot(&PRIMARY_VIDEO)?;
                if write {
                    video.info.addr = DeviceAddress::Pci(PRIMARY_VIDEO);
                }
            } else if !relocatable {
                return Err(Error::PrimaryVideoAddress(PRIMARY_VIDEO.to_string()));
            }
            // Relocatable: the ordered pass below places it.
        }
        Some(video) => {
            if let Some(addr) = video.info.addr.pci() {
                if *addr != PRIMARY_VIDEO && !relocatable {
                    return Err(Error::PrimaryVideoAddress(PRIMARY_VIDEO.to_string()));
                }
            }
        }
        None => {
            if set.slot_is_free(0, 2) {
                set.reserve_entire_slot(&PRIMARY_VIDEO)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::CcwAddress;
    use domain::DeviceInfo;
    use domain::Disk;
    use domain::DiskDevice;
    use domain::DiskSource;
    use domain::IoTune;
    use domain::Net;
    use domain::NetBackend;
    use domain::UsbMaster;
    use domain::Video;

    fn caps_pc() -> QemuCaps {
        QemuCaps::from_caps([Cap::Device, Cap::Drive, Cap::Netdev, Cap::PciMultibus])
    }

    fn virtio_disk(dst: &str) -> Disk {
        Disk {
            info: DeviceInfo::default(),
            dst: dst.to_owned(),
            bus: DiskBus::Virtio,
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

    fn user_net() -> Net {
        Net {
            info: DeviceInfo::default(),
            mac: None,
            model: Some("virtio".to_owned()),
            backend: NetBackend::User,
        }
    }

    fn pc_domain() -> Domain {
        let mut dom = Domain::empty("pc");
        dom.os.arch = "x86_64".to_owned();
        dom.os.machine = "pc".to_owned();
        dom
    }

    #[test]
    fn minimal_pc_layout() {
        // One virtio disk and one user net: slots 1 and 2 are pinned, the
        // disk gets 3 and the net gets 4.
        let mut dom = pc_domain();
        dom.disks.push(virtio_disk("vda"));
        dom.nets.push(user_net());
        let sets = assign_addresses(&mut dom, &caps_pc()).unwrap();
        assert!(sets.pci.is_some());
        let disk_addr = dom.disks[0].info.addr.pci().unwrap();
        let net_addr = dom.nets[0].info.addr.pci().unwrap();
        assert_eq!((disk_addr.bus, disk_addr.slot), (0, 3));
        assert_eq!((net_addr.bus, net_addr.slot), (0, 4));
    }

    #[test]
    fn explicit_multifunction_pair_and_auto_follow() {
        use domain::Hostdev;
        use domain::HostPciAddress;
        use domain::PciPassthroughBackend;
        let mut dom = pc_domain();
        let mut a = Hostdev {
            info: DeviceInfo::default(),
            source: HostdevSource::Pci {
                addr: HostPciAddress {
                    domain: 0,
                    bus: 2,
                    slot: 0,
                    function: 0,
                },
            },
            backend: PciPassthroughBackend::Vfio,
            configfd: None,
        };
        let mut f0 = PciAddress::new(0, 0, 5, 0);
        f0.multifunction = Some(true);
        a.info.addr = DeviceAddress::Pci(f0);
        let mut b = a.clone();
        b.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 5, 1));
        dom.hostdevs.push(a);
        dom.hostdevs.push(b);
        dom.nets.push(user_net());
        assign_addresses(&mut dom, &caps_pc()).unwrap();
        let net_addr = dom.nets[0].info.addr.pci().unwrap();
        assert!(net_addr.slot >= 6, "landed at {}", net_addr);
    }

    #[test]
    fn s390_ccw_assignment() {
        let mut dom = Domain::empty("s390");
        dom.os.arch = "s390x".to_owned();
        dom.os.machine = "s390-ccw-virtio".to_owned();
        dom.disks.push(virtio_disk("vda"));
        dom.nets.push(user_net());
        let caps = QemuCaps::from_caps([Cap::Device, Cap::Drive, Cap::Netdev, Cap::VirtioCcw]);
        let sets = assign_addresses(&mut dom, &caps).unwrap();
        assert!(sets.pci.is_none());
        assert!(sets.ccw.is_some());
        assert_eq!(
            dom.disks[0].info.addr.ccw().unwrap().to_string(),
            "fe.0.0000"
        );
        assert_eq!(dom.nets[0].info.addr.ccw().unwrap().to_string(), "fe.0.0001");
    }

    #[test]
    fn s390_explicit_ccw_is_respected() {
        let mut dom = Domain::empty("s390");
        dom.os.arch = "s390x".to_owned();
        dom.os.machine = "s390-ccw-virtio".to_owned();
        let mut disk = virtio_disk("vda");
        disk.info.addr = DeviceAddress::Ccw(CcwAddress::virtio(0));
        dom.disks.push(disk);
        dom.nets.push(user_net());
        let caps = QemuCaps::from_caps([Cap::Device, Cap::VirtioCcw]);
        assign_addresses(&mut dom, &caps).unwrap();
        // The net skips the taken devno.
        assert_eq!(dom.nets[0].info.addr.ccw().unwrap().devno, 1);
    }

    #[test]
    fn s390_duplicate_ccw_is_fatal() {
        let mut dom = Domain::empty("s390");
        dom.os.arch = "s390x".to_owned();
        dom.os.machine = "s390-ccw-virtio".to_owned();
        for dst in ["vda", "vdb"] {
            let mut disk = virtio_disk(dst);
            disk.info.addr = DeviceAddress::Ccw(CcwAddress::virtio(7));
            dom.disks.push(disk);
        }
        let caps = QemuCaps::from_caps([Cap::Device, Cap::VirtioCcw]);
        assert_eq!(
            assign_addresses(&mut dom, &caps).unwrap_err(),
            Error::CcwAddressInUse("fe.0.0007".to_owned())
        );
    }

    #[test]
    fn companion_quartet_placement() {
        let mut dom = pc_domain();
        let mut ehci = Controller::new(ControllerKind::Usb, 0);
        ehci.model = Some(ControllerModel::Ich9Ehci1);
        let mut u1 = Controller::new(ControllerKind::Usb, 1);
        u1.model = Some(ControllerModel::Ich9Uhci1);
        u1.master = Some(UsbMaster {
            idx: 0,
            startport: 0,
        });
        let mut u2 = Controller::new(ControllerKind::Usb, 2);
        u2.model = Some(ControllerModel::Ich9Uhci2);
        u2.master = Some(UsbMaster {
            idx: 0,
            startport: 2,
        });
        let mut u3 = Controller::new(ControllerKind::Usb, 3);
        u3.model = Some(ControllerModel::Ich9Uhci3);
        u3.master = Some(UsbMaster {
            idx: 0,
            startport: 4,
        });
        dom.controllers.extend([ehci, u1, u2, u3]);
        assign_addresses(&mut dom, &caps_pc()).unwrap();
        let addrs: Vec<&PciAddress> = dom
            .controllers
            .iter()
            .map(|c| c.info.addr.pci().unwrap())
            .collect();
        let slot = addrs[0].slot;
        assert!(addrs.iter().all(|a| a.slot == slot));
        assert_eq!(addrs[0].function, 7);
        assert_eq!(addrs[1].function, 0);
        assert_eq!(addrs[1].multifunction, Some(true));
        assert_eq!(addrs[2].function, 1);
        assert_eq!(addrs[3].function, 2);
    }

    #[test]
    fn piix_functions_are_pinned() {
        let mut dom = pc_domain();
        dom.controllers.push(Controller::new(ControllerKind::Ide, 0));
        dom.controllers.push(Controller::new(ControllerKind::Usb, 0));
        assign_addresses(&mut dom, &caps_pc()).unwrap();
        let ide = dom.controllers[0].info.addr.pci().unwrap();
        assert_eq!(ide.to_string(), "0000:00:01.1");
        let usb = dom.controllers[1].info.addr.pci().unwrap();
        assert_eq!(usb.to_string(), "0000:00:01.2");
    }

    #[test]
    fn relocated_ide_controller_is_fatal() {
        let mut dom = pc_domain();
        let mut ide = Controller::new(ControllerKind::Ide, 0);
        ide.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 7, 0));
        dom.controllers.push(ide);
        assert_eq!(
            assign_addresses(&mut dom, &caps_pc()).unwrap_err(),
            Error::PrimaryIdeAddress("0000:00:01.1".to_owned())
        );
    }

    #[test]
    fn primary_video_is_pinned_on_piix() {
        let mut dom = pc_domain();
        dom.videos.push(Video {
            info: DeviceInfo::default(),
            model: VideoModel::Cirrus,
            vram: None,
            heads: None,
        });
        assign_addresses(&mut dom, &caps_pc()).unwrap();
        let addr = dom.videos[0].info.addr.pci().unwrap();
        assert_eq!((addr.bus, addr.slot, addr.function), (0, 2, 0));
    }

    #[test]
    fn occupied_video_slot_without_relocation_fails() {
        let mut dom = pc_domain();
        let mut net = user_net();
        net.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 2, 0));
        dom.nets.push(net);
        dom.videos.push(Video {
            info: DeviceInfo::default(),
            model: VideoModel::Cirrus,
            vram: None,
            heads: None,
        });
        let err = assign_addresses(&mut dom, &caps_pc()).unwrap_err();
        assert_eq!(
            err,
            Error::PrimaryVideoAddress("0000:00:02.0".to_owned())
        );
    }

    #[test]
    fn declared_bridge_without_support_fails() {
        let mut dom = pc_domain();
        let mut bridge = Controller::new(ControllerKind::Pci, 1);
        bridge.model = Some(ControllerModel::PciBridge);
        dom.controllers.push(bridge);
        assert_eq!(
            assign_addresses(&mut dom, &caps_pc()).unwrap_err(),
            Error::BridgeUnsupported
        );
    }

    #[test]
    fn bus_overflow_grows_bridges_with_support() {
        let mut caps = caps_pc();
        caps.set(Cap::PciBridge);
        let mut dom = pc_domain();
        // More nets than one bus can seat (slots 3..31 remain on bus 0).
        for _ in 0..40 {
            dom.nets.push(user_net());
        }
        let sets = assign_addresses(&mut dom, &caps).unwrap();
        let pci = sets.pci.unwrap();
        assert!(pci.bus_count() >= 2);
        assert!(dom
            .controllers
            .iter()
            .any(|c| c.kind == ControllerKind::Pci
                && c.model == Some(ControllerModel::PciBridge)));
        // Every net got an address on an existing bus.
        for net in &dom.nets {
            let addr = net.info.addr.pci().unwrap();
            assert!((addr.bus as usize) < pci.bus_count());
        }
    }

    #[test]
    fn ide_disks_get_drive_addresses() {
        let mut dom = pc_domain();
        let mut cdrom = virtio_disk("hdc");
        cdrom.bus = DiskBus::Ide;
        cdrom.device = DiskDevice::Cdrom;
        dom.disks.push(cdrom);
        assign_addresses(&mut dom, &caps_pc()).unwrap();
        let addr = dom.disks[0].info.addr.drive().unwrap();
        assert_eq!((addr.controller, addr.bus, addr.unit), (0, 1, 0));
    }
}
