// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The inverse path: reconstructing a description from an argv/env pair.
//!
//! Backends arrive before their consumers on a well-formed command line,
//! so the parser stashes `-drive`/`-netdev`/`-chardev`/`-object` entries
//! by id and resolves them when the `-device` shows up. Bus addresses are
//! deliberately left unassigned; the caller re-runs the allocator to get
//! a canonical layout. Flags we do not recognize land verbatim in the
//! description's opaque extra-args bucket.

use std::collections::HashMap;

use domain::BootDev;
use domain::CacheMode;
use domain::Channel;
use domain::ChannelTarget;
use domain::CharSource;
use domain::ClockOffset;
use domain::Console;
use domain::ConsoleTarget;
use domain::Controller;
use domain::ControllerKind;
use domain::ControllerModel;
use domain::CpuDef;
use domain::CpuFeature;
use domain::CpuFeaturePolicy;
use domain::CpuMode;
use domain::CpuTopology;
use domain::DeviceInfo;
use domain::Disk;
use domain::DiskBus;
use domain::DiskDevice;
use domain::DiskSource;
use domain::DiskSourceHost;
use domain::Domain;
use domain::ErrorPolicy;
use domain::Fs;
use domain::FsAccessMode;
use domain::Graphics;
use domain::HostPciAddress;
use domain::Hostdev;
use domain::HostdevSource;
use domain::Hub;
use domain::Input;
use domain::InputBus;
use domain::InputKind;
use domain::IoMode;
use domain::IoTune;
use domain::LifecycleAction;
use domain::Memballoon;
use domain::MemballoonModel;
use domain::Net;
use domain::NetBackend;
use domain::NetProtocol;
use domain::Parallel;
use domain::PciPassthroughBackend;
use domain::Rng;
use domain::RngBackend;
use domain::Serial;
use domain::SocketNetMode;
use domain::Sound;
use domain::SoundCodec;
use domain::SoundModel;
use domain::TickPolicy;
use domain::Timer;
use domain::TimerKind;
use domain::TimerTrack;
use domain::Tpm;
use domain::UsbMaster;
use domain::Video;
use domain::VideoModel;
use domain::VirtType;
use domain::Watchdog;
use domain::WatchdogAction;
use domain::WatchdogModel;

use crate::keyvalue::KeyValues;
use crate::Error;
use crate::Result;

/// Splits a raw invocation string into tokens, honoring single and
/// double quoted substrings.
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    in_token = true;
                } else if c.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                } else {
                    current.push(c);
                    in_token = true;
                }
            }
        }
    }
    if quote.is_some() {
        return Err(Error::Parse("unterminated quote".to_owned()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// The letters of a disk destination: 0 -> `a`, 25 -> `z`, 26 -> `aa`.
fn disk_index_letters(index: u32) -> String {
    let mut n = index as u64 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[derive(Debug, Default)]
struct PendingDrive {
    id: Option<String>,
    iface: Option<String>,
    source: DiskSource,
    format: Option<String>,
    readonly: bool,
    cdrom: bool,
    index: Option<u32>,
    bus: Option<u32>,
    unit: Option<u32>,
    cache: Option<CacheMode>,
    error_policy: Option<ErrorPolicy>,
    rerror_policy: Option<ErrorPolicy>,
    io: Option<IoMode>,
    serial: Option<String>,
    geometry: Option<domain::DiskGeometry>,
    iotune: IoTune,
    // Filled by the pairing -device.
    device_bus: Option<DiskBus>,
    device_cdrom: bool,
    bootindex: Option<u32>,
    floppy_unit: Option<u32>,
    consumed_by_hostdev: bool,
}

#[derive(Debug)]
struct PendingNetdev {
    id: String,
    backend: NetBackend,
    consumed: bool,
}

#[derive(Debug, Default)]
struct PendingLegacyNet {
    nic: Option<Net>,
    backend: Option<NetBackend>,
}

#[derive(Debug)]
struct PendingObject {
    kind: String,
    keyvalues: KeyValues,
}

struct Parser {
    dom: Domain,
    drives: Vec<PendingDrive>,
    netdevs: Vec<PendingNetdev>,
    legacy_nets: HashMap<u32, PendingLegacyNet>,
    chardevs: HashMap<String, CharSource>,
    objects: HashMap<String, PendingObject>,
    tpmdevs: HashMap<String, (String, Option<String>)>,
    fsdevs: HashMap<String, (String, FsAccessMode, bool)>,
    nographic: bool,
    fullscreen: bool,
    saw_display: bool,
    saw_acpi_disable: bool,
    ceph_monitors: Vec<DiskSourceHost>,
    disk_counters: HashMap<&'static str, u32>,
}

impl Parser {
    fn new() -> Parser {
        let mut dom = Domain::empty("");
        dom.memory.current_kib = 64 * 1024;
        dom.memory.max_kib = 64 * 1024;
        Parser {
            dom,
            drives: Vec::new(),
            netdevs: Vec::new(),
            legacy_nets: HashMap::new(),
            chardevs: HashMap::new(),
            objects: HashMap::new(),
            tpmdevs: HashMap::new(),
            fsdevs: HashMap::new(),
            nographic: false,
            fullscreen: false,
            saw_display: false,
            saw_acpi_disable: false,
            ceph_monitors: Vec::new(),
            disk_counters: HashMap::new(),
        }
    }

    fn chardev_source(&self, id: &str) -> CharSource {
        self.chardevs.get(id).cloned().unwrap_or(CharSource::Pty)
    }

    fn parse_emulator(&mut self, binary: &str) {
        self.dom.emulator = Some(binary.into());
        let name = binary.rsplit('/').next().unwrap_or(binary);
        if let Some(arch) = name.strip_prefix("qemu-system-") {
            self.dom.os.arch = arch.to_owned();
        } else if name == "qemu-kvm" || name == "kvm" {
            self.dom.os.arch = "x86_64".to_owned();
            self.dom.virt_type = VirtType::Kvm;
        } else {
            self.dom.os.arch = "i686".to_owned();
        }
        if self.dom.os.arch.starts_with("s390") {
            self.dom.os.machine = "s390-ccw-virtio".to_owned();
        } else if self.dom.os.arch == "ppc64" {
            self.dom.os.machine = "pseries".to_owned();
        } else {
            self.dom.os.machine = "pc".to_owned();
        }
    }

    // ------------------------------------------------------------ disks

    fn parse_drive(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        let mut drive = PendingDrive::default();
        for entry in kv.iter() {
            let v = entry.value_or_empty();
            match entry.key.as_str() {
                "file" => {
                    drive.source = parse_disk_source(v);
                }
                "if" => drive.iface = Some(v.to_owned()),
                "id" => {
                    drive.id = Some(v.to_owned());
                }
                "format" => drive.format = Some(v.to_owned()),
                "readonly" => drive.readonly = v != "off",
                "media" => drive.cdrom = v == "cdrom",
                "index" => drive.index = kv.get_u32("index")?,
                "bus" => drive.bus = kv.get_u32("bus")?,
                "unit" => drive.unit = kv.get_u32("unit")?,
                "cache" => {
                    drive.cache = Some(match v {
                        "off" | "none" => CacheMode::None,
                        "on" | "writeback" => CacheMode::Writeback,
                        "writethrough" => CacheMode::Writethrough,
                        "directsync" => CacheMode::Directsync,
                        "unsafe" => CacheMode::Unsafe,
                        other => {
                            return Err(Error::Parse(format!(
                                "unknown cache mode '{}'",
                                other
                            )));
                        }
                    });
                }
                "werror" => drive.error_policy = Some(parse_error_policy(v)?),
                "rerror" => drive.rerror_policy = Some(parse_error_policy(v)?),
                "aio" => {
                    drive.io = Some(match v {
                        "native" => IoMode::Native,
                        _ => IoMode::Threads,
                    });
                }
                "serial" => drive.serial = Some(v.to_owned()),
                "cyls" | "heads" | "secs" | "trans" => {
                    let geometry = drive.geometry.get_or_insert_with(Default::default);
                    match entry.key.as_str() {
                        "cyls" => geometry.cylinders = kv.get_u32("cyls")?.unwrap_or(0),
                        "heads" => geometry.heads = kv.get_u32("heads")?.unwrap_or(0),
                        "secs" => geometry.sectors = kv.get_u32("secs")?.unwrap_or(0),
                        _ => {
                            geometry.translation = Some(match v {
                                "none" => domain::GeometryTranslation::None,
                                "lba" => domain::GeometryTranslation::Lba,
                                _ => domain::GeometryTranslation::Auto,
                            });
                        }
                    }
                }
                "bps" => drive.iotune.total_bytes_sec = kv.get_u64("bps")?.unwrap_or(0),
                "bps_rd" => drive.iotune.read_bytes_sec = kv.get_u64("bps_rd")?.unwrap_or(0),
                "bps_wr" => drive.iotune.write_bytes_sec = kv.get_u64("bps_wr")?.unwrap_or(0),
                "iops" => drive.iotune.total_iops_sec = kv.get_u64("iops")?.unwrap_or(0),
                "iops_rd" => drive.iotune.read_iops_sec = kv.get_u64("iops_rd")?.unwrap_or(0),
                "iops_wr" => drive.iotune.write_iops_sec = kv.get_u64("iops_wr")?.unwrap_or(0),
                "boot" | "cache.direct" | "cache.writeback" => {}
                _ => {}
            }
        }
        let has_identity = !drive.source.is_none()
            || drive.cdrom
            || drive.index.is_some()
            || drive.bus.is_some()
            || drive.unit.is_some();
        if !has_identity {
            return Err(Error::Parse(
                "drive definition is missing both file and index/bus/unit".to_owned(),
            ));
        }
        self.drives.push(drive);
        Ok(())
    }

    fn pending_drive_mut(&mut self, id: &str) -> Option<&mut PendingDrive> {
        self.drives
            .iter_mut()
            .find(|d| d.id.as_deref() == Some(id))
    }

    fn next_disk_name(&mut self, bus: DiskBus, explicit_index: Option<u32>) -> String {
        let prefix = match bus {
            DiskBus::Ide => "hd",
            DiskBus::Scsi | DiskBus::Usb => "sd",
            DiskBus::Fdc => "fd",
            DiskBus::Sata => "sd",
            DiskBus::Virtio => "vd",
        };
        let counter = self.disk_counters.entry(prefix).or_insert(0);
        let index = match explicit_index {
            Some(index) => {
                *counter = (*counter).max(index + 1);
                index
            }
            None => {
                let index = *counter;
                *counter += 1;
                index
            }
        };
        format!("{}{}", prefix, disk_index_letters(index))
    }

    /// Turns the pending drives that no `-device` claimed (or that were
    /// claimed by a disk frontend) into disks.
    fn finish_drives(&mut self) {
        let drives = std::mem::take(&mut self.drives);
        for drive in drives {
            if drive.consumed_by_hostdev {
                continue;
            }
            let bus = drive.device_bus.or_else(|| {
                drive.iface.as_deref().and_then(|iface| match iface {
                    "ide" => Some(DiskBus::Ide),
                    "scsi" => Some(DiskBus::Scsi),
                    "virtio" => Some(DiskBus::Virtio),
                    "floppy" => Some(DiskBus::Fdc),
                    "sata" => Some(DiskBus::Sata),
                    "usb" => Some(DiskBus::Usb),
                    _ => None,
                })
            });
            let bus = match bus {
                Some(bus) => bus,
                // An unclaimed if=none backend has no frontend to name a
                // bus; the conventional default is IDE.
                None => DiskBus::Ide,
            };
            let cdrom = drive.cdrom || drive.device_cdrom;
            let device = if drive.floppy_unit.is_some() || bus == DiskBus::Fdc {
                DiskDevice::Floppy
            } else if cdrom {
                DiskDevice::Cdrom
            } else {
                DiskDevice::Disk
            };
            let index = drive.index.or_else(|| {
                match (bus, drive.bus, drive.unit) {
                    (DiskBus::Ide, Some(b), Some(u)) => Some(b * 2 + u),
                    (DiskBus::Fdc, _, _) => drive.floppy_unit,
                    _ => None,
                }
            });
            let dst = self.next_disk_name(bus, index);
            let mut src = drive.source;
            // Monitor lists travel out of band in the environment.
            if let DiskSource::Network {
                protocol: NetProtocol::Rbd,
                hosts,
                ..
            } = &mut src
            {
                if hosts.is_empty() {
                    *hosts = self.ceph_monitors.clone();
                }
            }
            self.dom.disks.push(Disk {
                info: DeviceInfo {
                    bootindex: drive.bootindex,
                    ..DeviceInfo::default()
                },
                dst,
                bus,
                device,
                src,
                format: drive.format,
                readonly: drive.readonly,
                shareable: false,
                cache: drive.cache,
                error_policy: drive.error_policy,
                rerror_policy: drive.rerror_policy,
                io: drive.io,
                copy_on_read: false,
                discard: None,
                serial: drive.serial,
                wwn: None,
                vendor: None,
                product: None,
                geometry: drive.geometry,
                blockio: None,
                iotune: drive.iotune,
            });
        }
    }

    fn add_simple_disk(&mut self, path: &str, dst: &str, bus: DiskBus, device: DiskDevice) {
        self.dom.disks.push(Disk {
            info: DeviceInfo::default(),
            dst: dst.to_owned(),
            bus,
            device,
            src: parse_disk_source(path),
            format: None,
            readonly: device == DiskDevice::Cdrom,
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
        });
    }

    // ------------------------------------------------------------- nets

    fn parse_netdev(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        let kind = kv
            .iter()
            .next()
            .map(|e| e.key.clone())
            .unwrap_or_default();
        if kind == "user" {
            if let Some(fwd) = kv.get("guestfwd") {
                // A guestfwd rule is a channel, not a NIC.
                let endpoint = fwd.strip_prefix("tcp:").unwrap_or(fwd);
                let (address, port) = endpoint.rsplit_once(':').ok_or_else(|| {
                    Error::Parse(format!("malformed guestfwd '{}'", fwd))
                })?;
                let port: u16 = port
                    .parse()
                    .map_err(|_| Error::Parse(format!("malformed guestfwd '{}'", fwd)))?;
                let source = kv
                    .get("chardev")
                    .map(|id| self.chardev_source(id))
                    .unwrap_or(CharSource::Pty);
                self.dom.channels.push(Channel {
                    info: DeviceInfo::default(),
                    source,
                    target: ChannelTarget::GuestFwd {
                        address: address.to_owned(),
                        port,
                    },
                });
                return Ok(());
            }
        }
        let id = kv.get("id").unwrap_or_default().to_owned();
        let backend = parse_net_backend(&kind, &kv)?;
        self.netdevs.push(PendingNetdev {
            id,
            backend,
            consumed: false,
        });
        Ok(())
    }

    fn parse_legacy_net(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        let kind = kv
            .iter()
            .next()
            .map(|e| e.key.clone())
            .unwrap_or_default();
        let vlan = kv.get_u32("vlan")?.unwrap_or(0);
        let entry = self.legacy_nets.entry(vlan).or_default();
        if kind == "nic" {
            let mut net = Net {
                info: DeviceInfo::default(),
                mac: None,
                model: kv.get("model").map(|m| m.to_owned()),
                backend: NetBackend::User,
            };
            if let Some(mac) = kv.get("macaddr") {
                net.mac = mac.parse().ok();
            }
            if let Some(name) = kv.get("name") {
                net.info.alias = Some(name.to_owned());
            }
            entry.nic = Some(net);
        } else {
            entry.backend = Some(parse_net_backend(&kind, &kv)?);
        }
        Ok(())
    }

    fn finish_nets(&mut self) {
        let mut vlans: Vec<u32> = self.legacy_nets.keys().copied().collect();
        vlans.sort_unstable();
        for vlan in vlans {
            if let Some(pending) = self.legacy_nets.remove(&vlan) {
                if let Some(mut nic) = pending.nic {
                    nic.backend = pending.backend.unwrap_or(NetBackend::User);
                    nic.info.alias = None;
                    self.dom.nets.push(nic);
                }
            }
        }
        // Unconsumed netdevs had no NIC; drop them.
        self.netdevs.clear();
    }

    // ----------------------------------------------------------- device

    fn parse_device(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        let model = match kv.iter().next() {
            Some(entry) if entry.value.is_none() => entry.key.clone(),
            _ => {
                return Err(Error::Parse(format!(
                    "device definition '{}' has no model",
                    value
                )));
            }
        };
        let bootindex = kv.get_u32("bootindex")?;
        match model.as_str() {
            "virtio-blk-pci" | "virtio-blk-ccw" | "virtio-blk-s390" => {
                self.claim_disk(&kv, DiskBus::Virtio, false, bootindex);
            }
            "ide-cd" | "ide-hd" | "ide-drive" => {
                self.claim_disk(&kv, DiskBus::Ide, model == "ide-cd", bootindex);
            }
            "scsi-cd" | "scsi-hd" | "scsi-disk" | "scsi-block" => {
                self.claim_disk(&kv, DiskBus::Scsi, model == "scsi-cd", bootindex);
            }
            "usb-storage" => {
                self.claim_disk(&kv, DiskBus::Usb, false, bootindex);
            }
            "virtio-net-pci" | "virtio-net-ccw" | "virtio-net-s390" | "spapr-vlan" | "e1000"
            | "rtl8139" | "ne2k_pci" | "pcnet" | "i82551" | "i82557b" | "i82559er" => {
                let short = match model.as_str() {
                    "virtio-net-pci" | "virtio-net-ccw" | "virtio-net-s390" => {
                        "virtio".to_owned()
                    }
                    other => other.to_owned(),
                };
                let backend = kv
                    .get("netdev")
                    .and_then(|id| {
                        self.netdevs.iter_mut().find(|n| n.id == id && !n.consumed)
                    })
                    .map(|pending| {
                        pending.consumed = true;
                        pending.backend.clone()
                    })
                    .unwrap_or(NetBackend::User);
                self.dom.nets.push(Net {
                    info: DeviceInfo {
                        bootindex,
                        ..DeviceInfo::default()
                    },
                    mac: kv.get("mac").and_then(|m| m.parse().ok()),
                    model: Some(short),
                    backend,
                });
            }
            "virtio-balloon-pci" | "virtio-balloon-ccw" | "virtio-balloon-s390" => {
                self.dom.memballoon = Some(Memballoon {
                    info: DeviceInfo::default(),
                    model: MemballoonModel::Virtio,
                });
            }
            "virtio-rng-pci" | "virtio-rng-ccw" | "virtio-rng-s390" => {
                let backend = kv
                    .get("rng")
                    .and_then(|id| self.objects.get(id))
                    .map(|object| match object.kind.as_str() {
                        "rng-egd" => {
                            let source = object
                                .keyvalues
                                .get("chardev")
                                .map(|id| self.chardev_source(id))
                                .unwrap_or(CharSource::Pty);
                            RngBackend::Egd { source }
                        }
                        _ => RngBackend::Random {
                            path: object
                                .keyvalues
                                .get("filename")
                                .unwrap_or("/dev/random")
                                .into(),
                        },
                    })
                    .unwrap_or(RngBackend::Random {
                        path: "/dev/random".into(),
                    });
                self.dom.rng = Some(Rng {
                    info: DeviceInfo::default(),
                    backend,
                    rate_bytes: kv.get_u32("max-bytes")?,
                    rate_period: kv.get_u32("period")?,
                });
            }
            "virtio-serial-pci" | "virtio-serial-ccw" | "virtio-serial-s390" => {
                let idx = kv
                    .get("id")
                    .and_then(|id| id.strip_prefix("virtio-serial"))
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                let mut controller = Controller::new(ControllerKind::VirtioSerial, idx);
                controller.ports = kv.get_u32("max_ports")?;
                controller.vectors = kv.get_u32("vectors")?;
                self.dom.controllers.push(controller);
            }
            "virtio-scsi-pci" | "virtio-scsi-ccw" | "virtio-scsi-s390" | "lsi"
            | "spapr-vscsi" | "megasas" => {
                let idx = kv
                    .get("id")
                    .and_then(|id| id.strip_prefix("scsi"))
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                let mut controller = Controller::new(ControllerKind::Scsi, idx);
                controller.model = Some(match model.as_str() {
                    "lsi" => ControllerModel::LsiLogic,
                    "spapr-vscsi" => ControllerModel::IbmVscsi,
                    "megasas" => ControllerModel::LsiSas1078,
                    _ => ControllerModel::VirtioScsi,
                });
                self.dom.controllers.push(controller);
            }
            "ahci" => {
                let idx = kv
                    .get("id")
                    .and_then(|id| id.strip_prefix("sata"))
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                self.dom
                    .controllers
                    .push(Controller::new(ControllerKind::Sata, idx));
            }
            "usb-ccid" => {
                self.dom
                    .controllers
                    .push(Controller::new(ControllerKind::Ccid, 0));
            }
            "pci-bridge" => {
                let idx = kv.get_u32("chassis_nr")?.unwrap_or(1);
                let mut controller = Controller::new(ControllerKind::Pci, idx);
                controller.model = Some(ControllerModel::PciBridge);
                self.dom.controllers.push(controller);
            }
            "piix3-usb-uhci" | "piix4-usb-uhci" | "usb-ehci" | "ich9-usb-ehci1"
            | "ich9-usb-uhci1" | "ich9-usb-uhci2" | "ich9-usb-uhci3" | "vt82c686b-usb-uhci"
            | "pci-ohci" | "nec-usb-xhci" => {
                let idx = self
                    .dom
                    .controllers
                    .iter()
                    .filter(|c| c.kind == ControllerKind::Usb)
                    .count() as u32;
                let mut controller = Controller::new(ControllerKind::Usb, idx);
                controller.model = Some(match model.as_str() {
                    "piix3-usb-uhci" => ControllerModel::Piix3Uhci,
                    "piix4-usb-uhci" => ControllerModel::Piix4Uhci,
                    "usb-ehci" => ControllerModel::Ehci,
                    "ich9-usb-ehci1" => ControllerModel::Ich9Ehci1,
                    "ich9-usb-uhci1" => ControllerModel::Ich9Uhci1,
                    "ich9-usb-uhci2" => ControllerModel::Ich9Uhci2,
                    "ich9-usb-uhci3" => ControllerModel::Ich9Uhci3,
                    "vt82c686b-usb-uhci" => ControllerModel::Vt82c686bUhci,
                    "pci-ohci" => ControllerModel::PciOhci,
                    _ => ControllerModel::NecXhci,
                });
                if let Some(firstport) = kv.get_u32("firstport")? {
                    controller.master = Some(UsbMaster {
                        idx: 0,
                        startport: firstport,
                    });
                }
                self.dom.controllers.push(controller);
            }
            "usb-hub" => {
                self.dom.hubs.push(Hub {
                    info: DeviceInfo::default(),
                });
            }
            "usb-mouse" | "usb-tablet" | "usb-kbd" => {
                self.dom.inputs.push(Input {
                    info: DeviceInfo::default(),
                    kind: match model.as_str() {
                        "usb-mouse" => InputKind::Mouse,
                        "usb-kbd" => InputKind::Keyboard,
                        _ => InputKind::Tablet,
                    },
                    bus: InputBus::Usb,
                });
            }
            "usb-host" => {
                self.dom.hostdevs.push(Hostdev {
                    info: DeviceInfo {
                        bootindex,
                        ..DeviceInfo::default()
                    },
                    source: HostdevSource::Usb {
                        bus: kv.get_u32("hostbus")?,
                        device: kv.get_u32("hostaddr")?,
                    },
                    backend: PciPassthroughBackend::Default,
                    configfd: None,
                });
            }
            "vfio-pci" | "pci-assign" => {
                let host = kv.get("host").unwrap_or_default();
                let addr: domain::PciAddress = host
                    .parse()
                    .map_err(|_| Error::Parse(format!("malformed host address '{}'", host)))?;
                self.dom.hostdevs.push(Hostdev {
                    info: DeviceInfo {
                        bootindex,
                        ..DeviceInfo::default()
                    },
                    source: HostdevSource::Pci {
                        addr: HostPciAddress {
                            domain: addr.domain,
                            bus: addr.bus,
                            slot: addr.slot,
                            function: addr.function,
                        },
                    },
                    backend: if model == "vfio-pci" {
                        PciPassthroughBackend::Vfio
                    } else {
                        PciPassthroughBackend::Kvm
                    },
                    configfd: kv.get("configfd").and_then(|v| v.parse().ok()),
                });
            }
            "scsi-generic" => {
                let (path, readonly) = kv
                    .get("drive")
                    .and_then(|id| self.pending_drive_mut(id))
                    .map(|drive| {
                        drive.consumed_by_hostdev = true;
                        let path = match &drive.source {
                            DiskSource::File { path } | DiskSource::Block { path } => {
                                path.clone()
                            }
                            _ => "/dev/sg0".into(),
                        };
                        (path, drive.readonly)
                    })
                    .unwrap_or_else(|| ("/dev/sg0".into(), false));
                self.dom.hostdevs.push(Hostdev {
                    info: DeviceInfo {
                        bootindex,
                        ..DeviceInfo::default()
                    },
                    source: HostdevSource::Scsi { path, readonly },
                    backend: PciPassthroughBackend::Default,
                    configfd: None,
                });
            }
            "isa-serial" | "spapr-vty" => {
                let source = kv
                    .get("chardev")
                    .map(|id| self.chardev_source(id))
                    .unwrap_or(CharSource::Pty);
                self.dom.serials.push(Serial {
                    info: DeviceInfo::default(),
                    source,
                    target_port: self.dom.serials.len() as u32,
                });
            }
            "isa-parallel" => {
                let source = kv
                    .get("chardev")
                    .map(|id| self.chardev_source(id))
                    .unwrap_or(CharSource::Pty);
                self.dom.parallels.push(Parallel {
                    info: DeviceInfo::default(),
                    source,
                    target_port: self.dom.parallels.len() as u32,
                });
            }
            "virtconsole" | "sclpconsole" | "sclplmconsole" => {
                let source = kv
                    .get("chardev")
                    .map(|id| self.chardev_source(id))
                    .unwrap_or(CharSource::Pty);
                self.dom.consoles.push(Console {
                    info: DeviceInfo::default(),
                    source,
                    target: match model.as_str() {
                        "sclpconsole" => ConsoleTarget::Sclp,
                        "sclplmconsole" => ConsoleTarget::SclpLm,
                        _ => ConsoleTarget::Virtio,
                    },
                    target_port: self.dom.consoles.len() as u32,
                });
            }
            "virtserialport" => {
                let source = kv
                    .get("chardev")
                    .map(|id| self.chardev_source(id))
                    .unwrap_or(CharSource::Pty);
                self.dom.channels.push(Channel {
                    info: DeviceInfo::default(),
                    source,
                    target: ChannelTarget::VirtioSerial {
                        name: kv.get("name").map(|n| n.to_owned()),
                    },
                });
            }
            "usb-redir" => {
                let source = kv
                    .get("chardev")
                    .map(|id| self.chardev_source(id))
                    .unwrap_or(CharSource::SpiceVmc);
                self.dom.redirdevs.push(domain::Redirdev {
                    info: DeviceInfo::default(),
                    source,
                });
            }
            "ccid-card-emulated" | "ccid-card-passthru" => {
                let mode = if model == "ccid-card-passthru" {
                    domain::SmartcardMode::Passthrough {
                        source: kv
                            .get("chardev")
                            .map(|id| self.chardev_source(id))
                            .unwrap_or(CharSource::SpiceVmc),
                    }
                } else if kv.get("backend") == Some("certificates") {
                    domain::SmartcardMode::HostCertificates {
                        certificates: [
                            kv.get("cert1").unwrap_or_default().to_owned(),
                            kv.get("cert2").unwrap_or_default().to_owned(),
                            kv.get("cert3").unwrap_or_default().to_owned(),
                        ],
                        database: kv.get("db").map(|d| d.to_owned()),
                    }
                } else {
                    domain::SmartcardMode::Host
                };
                self.dom.smartcards.push(domain::Smartcard {
                    info: DeviceInfo::default(),
                    mode,
                });
            }
            "i6300esb" | "ib700" => {
                self.dom.watchdog = Some(Watchdog {
                    info: DeviceInfo::default(),
                    model: if model == "ib700" {
                        WatchdogModel::Ib700
                    } else {
                        WatchdogModel::I6300esb
                    },
                    action: self
                        .dom
                        .watchdog
                        .as_ref()
                        .map(|w| w.action)
                        .unwrap_or_default(),
                });
            }
            "qxl" => {
                self.dom.videos.push(Video {
                    info: DeviceInfo::default(),
                    model: VideoModel::Qxl,
                    vram: kv.get_u64("vram_size")?.map(|b| (b / 1024) as u32),
                    heads: None,
                });
            }
            "intel-hda" | "ES1370" | "AC97" | "sb16" => {
                self.dom.sounds.push(Sound {
                    info: DeviceInfo::default(),
                    model: match model.as_str() {
                        "intel-hda" => SoundModel::Ich6,
                        "ES1370" => SoundModel::Es1370,
                        "AC97" => SoundModel::Ac97,
                        _ => SoundModel::Sb16,
                    },
                    codecs: Vec::new(),
                });
            }
            "hda-duplex" | "hda-micro" => {
                if let Some(sound) = self
                    .dom
                    .sounds
                    .iter_mut()
                    .rev()
                    .find(|s| s.model == SoundModel::Ich6)
                {
                    sound.codecs.push(if model == "hda-micro" {
                        SoundCodec::Micro
                    } else {
                        SoundCodec::Duplex
                    });
                }
            }
            "virtio-9p-pci" | "virtio-9p-ccw" => {
                let (path, accessmode, readonly) = kv
                    .get("fsdev")
                    .and_then(|id| self.fsdevs.get(id))
                    .cloned()
                    .unwrap_or_else(|| (String::new(), FsAccessMode::Passthrough, false));
                self.dom.filesystems.push(Fs {
                    info: DeviceInfo::default(),
                    src: path.into(),
                    dst: kv.get("mount_tag").unwrap_or_default().to_owned(),
                    accessmode,
                    readonly,
                });
            }
            "tpm-tis" => {
                let (path, cancel) = kv
                    .get("tpmdev")
                    .and_then(|id| self.tpmdevs.get(id))
                    .cloned()
                    .unwrap_or_else(|| ("/dev/tpm0".to_owned(), None));
                self.dom.tpm = Some(Tpm {
                    info: DeviceInfo::default(),
                    path: path.into(),
                    cancel_path: cancel.map(|c| c.into()),
                });
            }
            "sga" => {
                self.dom.os.serial_bios = true;
            }
            _ => {
                self.dom.extra.args.push("-device".to_owned());
                self.dom.extra.args.push(value.to_owned());
            }
        }
        Ok(())
    }

    fn claim_disk(&mut self, kv: &KeyValues, bus: DiskBus, cdrom: bool, bootindex: Option<u32>) {
        // The frontend names the bus position (`bus=ide.1,unit=0`); the
        // backend line does not, so pick it up here for target naming.
        let bus_nr = kv
            .get("bus")
            .and_then(|b| b.rsplit_once('.'))
            .and_then(|(_, nr)| nr.parse().ok());
        let unit = kv.get("unit").and_then(|u| u.parse().ok());
        if let Some(drive) = kv.get("drive").and_then(|id| self.pending_drive_mut(id)) {
            drive.device_bus = Some(bus);
            drive.device_cdrom = drive.device_cdrom || cdrom;
            drive.bootindex = bootindex;
            if drive.bus.is_none() {
                drive.bus = bus_nr;
            }
            if drive.unit.is_none() {
                drive.unit = unit;
            }
        }
    }

    // ------------------------------------------------------------ flags

    fn parse_machine(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        if let Some(first) = kv.iter().next() {
            if first.value.is_none() {
                self.dom.os.machine = first.key.clone();
            }
        }
        match kv.get("accel") {
            Some("kvm") => self.dom.virt_type = VirtType::Kvm,
            Some("kqemu") => self.dom.virt_type = VirtType::Kqemu,
            Some("tcg") => self.dom.virt_type = VirtType::Tcg,
            _ => {}
        }
        if let Some(dump) = kv.get_onoff("dump-guest-core")? {
            self.dom.memory.dump_core = Some(dump);
        }
        if kv.get("mem-merge") == Some("off") {
            self.dom.memory.nosharepages = true;
        }
        Ok(())
    }

    fn parse_cpu(&mut self, value: &str) -> Result<()> {
        let mut fields = value.split(',');
        let model = fields.next().unwrap_or_default();
        if model == "host" {
            self.dom.cpu = Some(CpuDef {
                mode: CpuMode::HostPassthrough,
                model: None,
                features: Vec::new(),
            });
        } else if !model.is_empty() {
            self.dom.cpu = Some(CpuDef {
                mode: CpuMode::Custom,
                model: Some(model.to_owned()),
                features: Vec::new(),
            });
        }
        for field in fields {
            if let Some(name) = field.strip_prefix("hv_spinlocks=") {
                let retries = if let Some(hex) = name.strip_prefix("0x") {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    name.parse().ok()
                };
                self.dom.features.hyperv.spinlocks = retries;
            } else if field == "hv_relaxed" {
                self.dom.features.hyperv.relaxed = true;
            } else if field == "hv_vapic" {
                self.dom.features.hyperv.vapic = true;
            } else if field == "+kvmclock" || field == "-kvmclock" {
                self.set_timer(TimerKind::Kvmclock, |t| {
                    t.present = Some(field.starts_with('+'));
                });
            } else if field == "+kvm_pv_eoi" || field == "-kvm_pv_eoi" {
                self.dom.features.kvm_pv_eoi = Some(field.starts_with('+'));
            } else if let Some(name) = field.strip_prefix('+') {
                self.push_cpu_feature(name, CpuFeaturePolicy::Require);
            } else if let Some(name) = field.strip_prefix('-') {
                self.push_cpu_feature(name, CpuFeaturePolicy::Disable);
            }
        }
        Ok(())
    }

    fn push_cpu_feature(&mut self, name: &str, policy: CpuFeaturePolicy) {
        let cpu = self.dom.cpu.get_or_insert_with(CpuDef::default);
        cpu.features.push(CpuFeature {
            name: name.to_owned(),
            policy,
        });
    }

    fn set_timer(&mut self, kind: TimerKind, f: impl FnOnce(&mut Timer)) {
        if let Some(timer) = self.dom.clock.timers.iter_mut().find(|t| t.kind == kind) {
            f(timer);
            return;
        }
        let mut timer = Timer {
            kind,
            present: None,
            tickpolicy: None,
            track: None,
        };
        f(&mut timer);
        self.dom.clock.timers.push(timer);
    }

    fn parse_smp(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        if let Some(first) = kv.iter().next() {
            if first.value.is_none() {
                self.dom.vcpus = first
                    .key
                    .parse()
                    .map_err(|_| Error::Parse(format!("malformed -smp '{}'", value)))?;
                self.dom.max_vcpus = self.dom.vcpus;
            }
        }
        if let Some(maxcpus) = kv.get_u32("maxcpus")? {
            self.dom.max_vcpus = maxcpus;
        }
        let sockets = kv.get_u32("sockets")?;
        let cores = kv.get_u32("cores")?;
        let threads = kv.get_u32("threads")?;
        if sockets.is_some() || cores.is_some() || threads.is_some() {
            self.dom.topology = Some(CpuTopology {
                sockets: sockets.unwrap_or(1),
                cores: cores.unwrap_or(1),
                threads: threads.unwrap_or(1),
            });
        }
        Ok(())
    }

    fn parse_boot(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        let mut order: Option<&str> = kv.get("order");
        if order.is_none() {
            if let Some(first) = kv.iter().next() {
                if first.value.is_none() && first.key.chars().all(|c| "acdn".contains(c)) {
                    order = Some(&first.key);
                }
            }
        }
        if let Some(order) = order {
            self.dom.os.boot_devs = order
                .chars()
                .filter_map(|c| match c {
                    'a' => Some(BootDev::Fd),
                    'c' => Some(BootDev::Hd),
                    'd' => Some(BootDev::Cdrom),
                    'n' => Some(BootDev::Network),
                    _ => None,
                })
                .collect();
        }
        if let Some(menu) = kv.get_onoff("menu")? {
            self.dom.os.boot_menu = Some(menu);
        }
        if let Some(timeout) = kv.get("reboot-timeout") {
            self.dom.os.reboot_timeout = timeout.parse().ok();
        }
        Ok(())
    }

    fn parse_rtc(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        match kv.get("base") {
            Some("utc") | None => self.dom.clock.offset = ClockOffset::Utc,
            Some("localtime") => self.dom.clock.offset = ClockOffset::Localtime,
            Some(date) => {
                self.dom.clock.offset = ClockOffset::Absolute;
                self.dom.clock.start = Some(date.to_owned());
            }
        }
        if let Some(clock) = kv.get("clock") {
            let track = match clock {
                "vm" => Some(TimerTrack::Guest),
                "host" => Some(TimerTrack::Wall),
                _ => None,
            };
            if let Some(track) = track {
                self.set_timer(TimerKind::Rtc, |t| t.track = Some(track));
            }
        }
        if kv.get("driftfix") == Some("slew") {
            self.set_timer(TimerKind::Rtc, |t| t.tickpolicy = Some(TickPolicy::Catchup));
        }
        Ok(())
    }

    fn parse_global(&mut self, value: &str) -> Result<()> {
        let (key, v) = match value.split_once('=') {
            Some(pair) => pair,
            None => {
                self.dom.extra.args.push("-global".to_owned());
                self.dom.extra.args.push(value.to_owned());
                return Ok(());
            }
        };
        match key {
            "PIIX4_PM.disable_s3" => {
                self.dom.pm.disable_s3 = Some(v == "1");
            }
            "PIIX4_PM.disable_s4" => {
                self.dom.pm.disable_s4 = Some(v == "1");
            }
            "spapr-nvram.reg" => {
                let reg = v
                    .strip_prefix("0x")
                    .and_then(|hex| u64::from_str_radix(hex, 16).ok())
                    .or_else(|| v.parse().ok());
                self.dom.nvram = Some(domain::Nvram {
                    info: DeviceInfo {
                        addr: domain::DeviceAddress::SpaprVio(domain::SpaprVioAddress {
                            reg,
                        }),
                        ..DeviceInfo::default()
                    },
                });
            }
            "isa-fdc.driveA" | "isa-fdc.driveB" => {
                let unit = if key.ends_with('A') { 0 } else { 1 };
                if let Some(drive) = self.pending_drive_mut(v) {
                    drive.floppy_unit = Some(unit);
                    drive.device_bus = Some(DiskBus::Fdc);
                }
            }
            "qxl-vga.vram_size" => {
                if let Some(video) = self.dom.videos.first_mut() {
                    video.vram = v.parse::<u64>().ok().map(|b| (b / 1024) as u32);
                }
            }
            _ => {
                self.dom.extra.args.push("-global".to_owned());
                self.dom.extra.args.push(value.to_owned());
            }
        }
        Ok(())
    }

    fn parse_vnc(&mut self, value: &str) -> Result<()> {
        self.saw_display = true;
        let graphics = if let Some(path) = value.strip_prefix("unix:") {
            Graphics::Vnc {
                port: 0,
                autoport: false,
                listen: None,
                socket: Some(path.into()),
                keymap: None,
            }
        } else {
            let (listen, display) = match value.rsplit_once(':') {
                Some((listen, display)) => (Some(listen.to_owned()), display),
                None => (None, value),
            };
            let display: i32 = display
                .parse()
                .map_err(|_| Error::Parse(format!("malformed -vnc '{}'", value)))?;
            Graphics::Vnc {
                port: 5900 + display,
                autoport: false,
                listen: listen.filter(|l| !l.is_empty()),
                socket: None,
                keymap: None,
            }
        };
        self.dom.graphics.push(graphics);
        Ok(())
    }

    fn parse_chardev(&mut self, value: &str) -> Result<()> {
        let kv = KeyValues::parse(value, true)?;
        let backend = kv
            .iter()
            .next()
            .map(|e| e.key.clone())
            .unwrap_or_default();
        let id = kv.get("id").unwrap_or_default().to_owned();
        let source = match backend.as_str() {
            "null" => CharSource::Null,
            "vc" => CharSource::Vc,
            "pty" => CharSource::Pty,
            "stdio" => CharSource::Stdio,
            "tty" => CharSource::Dev {
                path: kv.get("path").unwrap_or_default().into(),
            },
            "parport" => CharSource::Parport {
                path: kv.get("path").unwrap_or_default().into(),
            },
            "file" => CharSource::File {
                path: kv.get("path").unwrap_or_default().into(),
            },
            "pipe" => CharSource::Pipe {
                path: kv.get("path").unwrap_or_default().into(),
            },
            "udp" => CharSource::Udp {
                host: kv.get("host").unwrap_or_default().to_owned(),
                service: kv.get("port").unwrap_or_default().to_owned(),
                bind_host: kv.get("localaddr").unwrap_or_default().to_owned(),
                bind_service: kv.get("localport").unwrap_or_default().to_owned(),
            },
            "socket" => {
                if let Some(path) = kv.get("path") {
                    CharSource::Unix {
                        path: path.into(),
                        listen: kv.has_flag("server"),
                    }
                } else {
                    CharSource::Tcp {
                        host: kv.get("host").unwrap_or_default().to_owned(),
                        service: kv.get("port").unwrap_or_default().to_owned(),
                        listen: kv.has_flag("server"),
                        telnet: kv.has_flag("telnet"),
                    }
                }
            }
            "spicevmc" => CharSource::SpiceVmc,
            other => {
                return Err(Error::Parse(format!(
                    "unknown chardev backend '{}'",
                    other
                )));
            }
        };
        self.chardevs.insert(id, source);
        Ok(())
    }

    /// Legacy single-argument character device spellings.
    fn parse_chr_arg(&self, value: &str) -> CharSource {
        match value {
            "null" => CharSource::Null,
            "vc" => CharSource::Vc,
            "pty" => CharSource::Pty,
            "stdio" => CharSource::Stdio,
            _ => {
                if let Some(path) = value.strip_prefix("file:") {
                    CharSource::File { path: path.into() }
                } else if let Some(path) = value.strip_prefix("pipe:") {
                    CharSource::Pipe { path: path.into() }
                } else if let Some(rest) = value.strip_prefix("unix:") {
                    let (path, flags) = rest.split_once(',').unwrap_or((rest, ""));
                    CharSource::Unix {
                        path: path.into(),
                        listen: flags.contains("server"),
                    }
                } else if let Some(rest) = value
                    .strip_prefix("tcp:")
                    .or_else(|| value.strip_prefix("telnet:"))
                {
                    let telnet = value.starts_with("telnet:");
                    let (endpoint, flags) = rest.split_once(',').unwrap_or((rest, ""));
                    let (host, service) = endpoint.rsplit_once(':').unwrap_or((endpoint, ""));
                    CharSource::Tcp {
                        host: host.to_owned(),
                        service: service.to_owned(),
                        listen: flags.contains("server"),
                        telnet,
                    }
                } else if let Some(rest) = value.strip_prefix("udp:") {
                    let (remote, local) = rest.split_once('@').unwrap_or((rest, ":"));
                    let (host, service) = remote.rsplit_once(':').unwrap_or((remote, ""));
                    let (bind_host, bind_service) = local.rsplit_once(':').unwrap_or((local, ""));
                    CharSource::Udp {
                        host: host.to_owned(),
                        service: service.to_owned(),
                        bind_host: bind_host.to_owned(),
                        bind_service: bind_service.to_owned(),
                    }
                } else {
                    CharSource::Dev { path: value.into() }
                }
            }
        }
    }

    fn finish(mut self, env: Vec<(String, String)>) -> Result<Domain> {
        self.finish_drives();
        self.finish_nets();
        let mut display = None;
        let mut xauth = None;
        for (name, value) in env {
            match name.as_str() {
                "DISPLAY" => display = Some(value),
                "XAUTHORITY" => xauth = Some(value),
                // Derived at build time, not configuration.
                "QEMU_AUDIO_DRV" => {}
                "CEPH_ARGS" => {}
                _ => self.dom.extra.env.push((name, value)),
            }
        }
        if !self.nographic && !self.saw_display {
            self.dom.graphics.push(Graphics::Sdl {
                fullscreen: self.fullscreen,
                display,
                xauth,
            });
        }
        if !self.saw_acpi_disable {
            self.dom.features.acpi = true;
        }
        if self.dom.name.is_empty() {
            self.dom.name = "unnamed".to_owned();
        }
        Ok(self.dom)
    }
}

fn parse_error_policy(v: &str) -> Result<ErrorPolicy> {
    Ok(match v {
        "stop" => ErrorPolicy::Stop,
        "report" => ErrorPolicy::Report,
        "ignore" => ErrorPolicy::Ignore,
        "enospc" => ErrorPolicy::Enospace,
        other => {
            return Err(Error::Parse(format!("unknown error policy '{}'", other)));
        }
    })
}

/// Classifies a `file=` value into a disk source.
fn parse_disk_source(value: &str) -> DiskSource {
    if value.is_empty() {
        return DiskSource::None;
    }
    if let Some(rest) = value.strip_prefix("nbd:") {
        let (endpoint, name) = match rest.split_once(":exportname=") {
            Some((endpoint, name)) => (endpoint, Some(name.to_owned())),
            None => (rest, None),
        };
        let host = if let Some(socket) = endpoint.strip_prefix("unix:") {
            DiskSourceHost {
                name: String::new(),
                port: None,
                transport: Some("unix".to_owned()),
                socket: Some(socket.to_owned()),
            }
        } else {
            let (host, port) = endpoint.rsplit_once(':').unwrap_or((endpoint, ""));
            DiskSourceHost {
                name: host.to_owned(),
                port: port.parse().ok(),
                transport: None,
                socket: None,
            }
        };
        return DiskSource::Network {
            protocol: NetProtocol::Nbd,
            name,
            hosts: vec![host],
            user: None,
        };
    }
    if let Some(rest) = value.strip_prefix("rbd:") {
        let mut name = rest;
        let mut hosts = Vec::new();
        let mut user = None;
        if let Some((image, opts)) = rest.split_once(':') {
            name = image;
            for opt in opts.split(':') {
                if let Some(id) = opt.strip_prefix("id=") {
                    user = Some(id.to_owned());
                } else if let Some(mons) = opt.strip_prefix("mon_host=") {
                    for mon in mons.split(';') {
                        let (host, port) = mon.rsplit_once(':').unwrap_or((mon, ""));
                        hosts.push(DiskSourceHost {
                            name: host.to_owned(),
                            port: port.parse().ok(),
                            transport: None,
                            socket: None,
                        });
                    }
                }
            }
        }
        return DiskSource::Network {
            protocol: NetProtocol::Rbd,
            name: Some(name.to_owned()),
            hosts,
            user,
        };
    }
    for (scheme, protocol) in [
        ("gluster", NetProtocol::Gluster),
        ("iscsi", NetProtocol::Iscsi),
        ("sheepdog", NetProtocol::Sheepdog),
    ] {
        let prefix = format!("{}://", scheme);
        let transport_prefix = format!("{}+", scheme);
        if let Some(rest) = value.strip_prefix(&prefix).or_else(|| {
            value
                .strip_prefix(&transport_prefix)
                .and_then(|r| r.split_once("://").map(|(_, rest)| rest))
        }) {
            let transport = value
                .strip_prefix(&transport_prefix)
                .and_then(|r| r.split_once("://").map(|(t, _)| t.to_owned()));
            let (authority, name) = rest.split_once('/').unwrap_or((rest, ""));
            let (user, hostport) = match authority.split_once('@') {
                Some((user, hostport)) => (Some(user.to_owned()), hostport),
                None => (None, authority),
            };
            let (host, port) = hostport.rsplit_once(':').unwrap_or((hostport, ""));
            return DiskSource::Network {
                protocol,
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_owned())
                },
                hosts: vec![DiskSourceHost {
                    name: host.to_owned(),
                    port: port.parse().ok(),
                    transport,
                    socket: None,
                }],
                user,
            };
        }
    }
    if let Some(rest) = value.strip_prefix("fat:") {
        let path = rest.strip_prefix("floppy:").unwrap_or(rest);
        return DiskSource::Dir { path: path.into() };
    }
    DiskSource::File { path: value.into() }
}

fn parse_net_backend(kind: &str, kv: &KeyValues) -> Result<NetBackend> {
    Ok(match kind {
        "user" => NetBackend::User,
        "tap" => {
            let fds = if let Some(fd) = kv.get("fd") {
                vec![fd
                    .parse()
                    .map_err(|_| Error::Parse(format!("malformed tap fd '{}'", fd)))?]
            } else if let Some(fds) = kv.get("fds") {
                fds.split(':').filter_map(|f| f.parse().ok()).collect()
            } else {
                Vec::new()
            };
            let vhost_fds = if let Some(fd) = kv.get("vhostfd") {
                vec![fd.parse().unwrap_or(-1)]
            } else if let Some(fds) = kv.get("vhostfds") {
                fds.split(':').filter_map(|f| f.parse().ok()).collect()
            } else {
                Vec::new()
            };
            NetBackend::Tap {
                ifname: kv.get("ifname").map(|i| i.to_owned()),
                fds,
                vhost: kv.get_onoff("vhost")?,
                vhost_fds,
            }
        }
        "socket" => {
            let (mode, address) = if let Some(address) = kv.get("connect") {
                (SocketNetMode::Connect, address)
            } else if let Some(address) = kv.get("listen") {
                (SocketNetMode::Listen, address)
            } else if let Some(address) = kv.get("mcast") {
                (SocketNetMode::Mcast, address)
            } else {
                return Err(Error::Parse("socket net without an endpoint".to_owned()));
            };
            NetBackend::Socket {
                mode,
                address: address.to_owned(),
            }
        }
        other => {
            return Err(Error::Parse(format!("unknown net backend '{}'", other)));
        }
    })
}

/// Reconstructs a description from an invocation rendered as one string.
pub fn parse_command(input: &str) -> Result<Domain> {
    let tokens = tokenize(input)?;
    let mut env: Vec<(String, String)> = Vec::new();
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.peek() {
        if !is_env_assignment(token) {
            break;
        }
        let token = iter.next().unwrap();
        let (name, value) = token.split_once('=').unwrap();
        let mut value = value.to_owned();
        // `CEPH_ARGS=-m a,b,c` carries one space; rejoin the list.
        if name == "CEPH_ARGS" && value == "-m" {
            if let Some(list) = iter.next() {
                value.push(' ');
                value.push_str(&list);
            }
        }
        env.push((name.to_owned(), value));
    }
    let argv: Vec<String> = iter.collect();
    parse_argv(&argv, &env)
}

/// Reconstructs a description from a pre-split argv and environment.
pub fn parse_argv(argv: &[String], env: &[(String, String)]) -> Result<Domain> {
    if argv.is_empty() {
        return Err(Error::Parse("empty command line".to_owned()));
    }
    let mut parser = Parser::new();
    parser.parse_emulator(&argv[0]);
    for (name, value) in env {
        if name == "CEPH_ARGS" {
            if let Some(list) = value.strip_prefix("-m ") {
                for mon in list.split(',') {
                    let (host, port) = mon.rsplit_once(':').unwrap_or((mon, ""));
                    parser.ceph_monitors.push(DiskSourceHost {
                        name: host.to_owned(),
                        port: port.parse().ok(),
                        transport: None,
                        socket: None,
                    });
                }
            }
        }
    }

    let mut i = 1;
    let mut next_arg = |i: &mut usize, flag: &str| -> Result<String> {
        *i += 1;
        argv.get(*i - 1)
            .cloned()
            .ok_or_else(|| Error::Parse(format!("flag '{}' wants an argument", flag)))
    };

    while i < argv.len() {
        let flag = argv[i].clone();
        i += 1;
        match flag.as_str() {
            "-name" => {
                let v = next_arg(&mut i, &flag)?;
                parser.dom.name = v.split(',').next().unwrap_or(&v).to_owned();
            }
            "-machine" | "-M" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_machine(&v)?;
            }
            "-cpu" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_cpu(&v)?;
            }
            "-smp" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_smp(&v)?;
            }
            "-m" => {
                let v = next_arg(&mut i, &flag)?;
                let mib: u64 = v
                    .parse()
                    .map_err(|_| Error::Parse(format!("malformed memory size '{}'", v)))?;
                parser.dom.memory.current_kib = mib * 1024;
                parser.dom.memory.max_kib = mib * 1024;
            }
            "-mem-path" => {
                let v = next_arg(&mut i, &flag)?;
                parser.dom.memory.hugepages = true;
                parser.dom.memory.hugepage_path = Some(v.into());
            }
            "-mem-prealloc" => {
                parser.dom.memory.hugepages = true;
            }
            "-realtime" => {
                let v = next_arg(&mut i, &flag)?;
                if v == "mlock=on" {
                    parser.dom.memory.locked = true;
                }
            }
            "-uuid" => {
                let v = next_arg(&mut i, &flag)?;
                parser.dom.uuid = v
                    .parse()
                    .map_err(|_| Error::Parse(format!("malformed uuid '{}'", v)))?;
            }
            "-bios" => {
                parser.dom.os.loader = Some(next_arg(&mut i, &flag)?.into());
            }
            "-kernel" => {
                parser.dom.os.kernel = Some(next_arg(&mut i, &flag)?.into());
            }
            "-initrd" => {
                parser.dom.os.initrd = Some(next_arg(&mut i, &flag)?.into());
            }
            "-append" => {
                parser.dom.os.cmdline = Some(next_arg(&mut i, &flag)?);
            }
            "-dtb" => {
                parser.dom.os.dtb = Some(next_arg(&mut i, &flag)?.into());
            }
            "-boot" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_boot(&v)?;
            }
            "-rtc" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_rtc(&v)?;
            }
            "-localtime" => {
                parser.dom.clock.offset = ClockOffset::Localtime;
            }
            "-no-hpet" => {
                parser.set_timer(TimerKind::Hpet, |t| t.present = Some(false));
            }
            "-no-kvm-pit-reinjection" => {
                parser.set_timer(TimerKind::Pit, |t| t.tickpolicy = Some(TickPolicy::Delay));
            }
            "-tdf" => {
                parser.set_timer(TimerKind::Pit, |t| t.tickpolicy = Some(TickPolicy::Discard));
            }
            "-no-acpi" => {
                parser.saw_acpi_disable = true;
                parser.dom.features.acpi = false;
            }
            "-no-reboot" => {
                parser.dom.lifecycle.on_reboot = LifecycleAction::Destroy;
                parser.dom.lifecycle.on_poweroff = LifecycleAction::Destroy;
                parser.dom.lifecycle.on_crash = LifecycleAction::Destroy;
            }
            "-no-shutdown" => {}
            "-enable-kvm" => {
                parser.dom.virt_type = VirtType::Kvm;
            }
            "-no-kvm" => {
                parser.dom.virt_type = VirtType::Tcg;
            }
            "-nographic" => {
                parser.nographic = true;
            }
            "-full-screen" => {
                parser.fullscreen = true;
            }
            "-sdl" => {
                parser.saw_display = true;
                parser.dom.graphics.push(Graphics::Sdl {
                    fullscreen: parser.fullscreen,
                    display: None,
                    xauth: None,
                });
            }
            "-vnc" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_vnc(&v)?;
            }
            "-k" => {
                let v = next_arg(&mut i, &flag)?;
                if let Some(Graphics::Vnc { keymap, .. }) = parser.dom.graphics.last_mut() {
                    *keymap = Some(v);
                }
            }
            "-spice" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                parser.saw_display = true;
                parser.dom.graphics.push(Graphics::Spice {
                    port: kv.get("port").and_then(|p| p.parse().ok()).unwrap_or(0),
                    tls_port: kv
                        .get("tls-port")
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(0),
                    listen: kv.get("addr").map(|a| a.to_owned()),
                });
            }
            "-vga" => {
                let v = next_arg(&mut i, &flag)?;
                let model = match v.as_str() {
                    "std" => Some(VideoModel::Vga),
                    "cirrus" => Some(VideoModel::Cirrus),
                    "vmware" => Some(VideoModel::Vmvga),
                    "qxl" => Some(VideoModel::Qxl),
                    "xenfb" => Some(VideoModel::Xen),
                    _ => None,
                };
                if let Some(model) = model {
                    parser.dom.videos.insert(
                        0,
                        Video {
                            info: DeviceInfo::default(),
                            model,
                            vram: None,
                            heads: None,
                        },
                    );
                }
            }
            "-std-vga" => {
                parser.dom.videos.insert(
                    0,
                    Video {
                        info: DeviceInfo::default(),
                        model: VideoModel::Vga,
                        vram: None,
                        heads: None,
                    },
                );
            }
            "-vmwarevga" => {
                parser.dom.videos.insert(
                    0,
                    Video {
                        info: DeviceInfo::default(),
                        model: VideoModel::Vmvga,
                        vram: None,
                        heads: None,
                    },
                );
            }
            "-soundhw" => {
                let v = next_arg(&mut i, &flag)?;
                for name in v.split(',') {
                    let model = match name {
                        "sb16" => Some(SoundModel::Sb16),
                        "pcspk" => Some(SoundModel::Pcspk),
                        "es1370" => Some(SoundModel::Es1370),
                        "ac97" => Some(SoundModel::Ac97),
                        "hda" | "ich6" => Some(SoundModel::Ich6),
                        _ => None,
                    };
                    if let Some(model) = model {
                        parser.dom.sounds.push(Sound {
                            info: DeviceInfo::default(),
                            model,
                            codecs: Vec::new(),
                        });
                    }
                }
            }
            "-watchdog" => {
                let v = next_arg(&mut i, &flag)?;
                let model = match v.as_str() {
                    "ib700" => WatchdogModel::Ib700,
                    _ => WatchdogModel::I6300esb,
                };
                let action = parser
                    .dom
                    .watchdog
                    .as_ref()
                    .map(|w| w.action)
                    .unwrap_or_default();
                parser.dom.watchdog = Some(Watchdog {
                    info: DeviceInfo::default(),
                    model,
                    action,
                });
            }
            "-watchdog-action" => {
                let v = next_arg(&mut i, &flag)?;
                let action = match v.as_str() {
                    "shutdown" => WatchdogAction::Shutdown,
                    "poweroff" => WatchdogAction::Poweroff,
                    "pause" => WatchdogAction::Pause,
                    "debug" => WatchdogAction::Debug,
                    "none" => WatchdogAction::None,
                    _ => WatchdogAction::Reset,
                };
                match &mut parser.dom.watchdog {
                    Some(watchdog) => watchdog.action = action,
                    None => {
                        parser.dom.watchdog = Some(Watchdog {
                            info: DeviceInfo::default(),
                            model: WatchdogModel::I6300esb,
                            action,
                        });
                    }
                }
            }
            "-usb" => {}
            "-usbdevice" => {
                let v = next_arg(&mut i, &flag)?;
                match v.as_str() {
                    "mouse" | "tablet" | "keyboard" => {
                        parser.dom.inputs.push(Input {
                            info: DeviceInfo::default(),
                            kind: match v.as_str() {
                                "mouse" => InputKind::Mouse,
                                "keyboard" => InputKind::Keyboard,
                                _ => InputKind::Tablet,
                            },
                            bus: InputBus::Usb,
                        });
                    }
                    other => {
                        if let Some(path) = other.strip_prefix("disk:") {
                            let dst = parser.next_disk_name(DiskBus::Usb, None);
                            parser.add_simple_disk(path, &dst, DiskBus::Usb, DiskDevice::Disk);
                        } else {
                            parser.dom.extra.args.push("-usbdevice".to_owned());
                            parser.dom.extra.args.push(v.clone());
                        }
                    }
                }
            }
            "-pcidevice" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                if let Some(host) = kv.get("host") {
                    let addr: domain::PciAddress = host.parse().map_err(|_| {
                        Error::Parse(format!("malformed host address '{}'", host))
                    })?;
                    parser.dom.hostdevs.push(Hostdev {
                        info: DeviceInfo::default(),
                        source: HostdevSource::Pci {
                            addr: HostPciAddress {
                                domain: addr.domain,
                                bus: addr.bus,
                                slot: addr.slot,
                                function: addr.function,
                            },
                        },
                        backend: PciPassthroughBackend::Kvm,
                        configfd: None,
                    });
                }
            }
            "-drive" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_drive(&v)?;
            }
            "-hda" | "-hdb" | "-hdc" | "-hdd" => {
                let v = next_arg(&mut i, &flag)?;
                let dst = format!("hd{}", &flag[3..]);
                parser.add_simple_disk(&v, &dst, DiskBus::Ide, DiskDevice::Disk);
            }
            "-cdrom" => {
                let v = next_arg(&mut i, &flag)?;
                parser.add_simple_disk(&v, "hdc", DiskBus::Ide, DiskDevice::Cdrom);
            }
            "-fda" | "-fdb" => {
                let v = next_arg(&mut i, &flag)?;
                let dst = format!("fd{}", &flag[3..]);
                parser.add_simple_disk(&v, &dst, DiskBus::Fdc, DiskDevice::Floppy);
            }
            "-net" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_legacy_net(&v)?;
            }
            "-netdev" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_netdev(&v)?;
            }
            "-chardev" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_chardev(&v)?;
            }
            "-serial" => {
                let v = next_arg(&mut i, &flag)?;
                let source = parser.parse_chr_arg(&v);
                parser.dom.serials.push(Serial {
                    info: DeviceInfo::default(),
                    source,
                    target_port: parser.dom.serials.len() as u32,
                });
            }
            "-parallel" => {
                let v = next_arg(&mut i, &flag)?;
                let source = parser.parse_chr_arg(&v);
                parser.dom.parallels.push(Parallel {
                    info: DeviceInfo::default(),
                    source,
                    target_port: parser.dom.parallels.len() as u32,
                });
            }
            "-device" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_device(&v)?;
            }
            "-global" => {
                let v = next_arg(&mut i, &flag)?;
                parser.parse_global(&v)?;
            }
            "-balloon" => {
                let v = next_arg(&mut i, &flag)?;
                if v.starts_with("virtio") {
                    parser.dom.memballoon = Some(Memballoon {
                        info: DeviceInfo::default(),
                        model: MemballoonModel::Virtio,
                    });
                }
            }
            "-object" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                let kind = kv
                    .iter()
                    .next()
                    .map(|e| e.key.clone())
                    .unwrap_or_default();
                if let Some(id) = kv.get("id") {
                    parser.objects.insert(
                        id.to_owned(),
                        PendingObject {
                            kind,
                            keyvalues: kv.clone(),
                        },
                    );
                }
            }
            "-tpmdev" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                if let Some(id) = kv.get("id") {
                    parser.tpmdevs.insert(
                        id.to_owned(),
                        (
                            kv.get("path").unwrap_or("/dev/tpm0").to_owned(),
                            kv.get("cancel-path").map(|c| c.to_owned()),
                        ),
                    );
                }
            }
            "-fsdev" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                if let Some(id) = kv.get("id") {
                    let accessmode = match kv.get("security_model") {
                        Some("mapped") => FsAccessMode::Mapped,
                        Some("none") => FsAccessMode::Squash,
                        _ => FsAccessMode::Passthrough,
                    };
                    parser.fsdevs.insert(
                        id.to_owned(),
                        (
                            kv.get("path").unwrap_or_default().to_owned(),
                            accessmode,
                            kv.get_onoff("readonly")?.unwrap_or(false),
                        ),
                    );
                }
            }
            "-smbios" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                if kv.has_flag("type=1") || kv.get("type") == Some("1") {
                    parser.dom.smbios = Some(domain::SmbiosSystem {
                        manufacturer: kv.get("manufacturer").map(|s| s.to_owned()),
                        product: kv.get("product").map(|s| s.to_owned()),
                        version: kv.get("version").map(|s| s.to_owned()),
                        serial: kv.get("serial").map(|s| s.to_owned()),
                        family: kv.get("family").map(|s| s.to_owned()),
                    });
                }
            }
            "-numa" => {
                let v = next_arg(&mut i, &flag)?;
                let kv = KeyValues::parse(&v, true)?;
                parser.dom.numa.push(domain::NumaCell {
                    cpus: kv.get("cpus").unwrap_or_default().to_owned(),
                    mem_kib: kv.get_u64("mem")?.unwrap_or(0) * 1024,
                });
            }
            "-xen-domid" => {
                let v = next_arg(&mut i, &flag)?;
                parser.dom.virt_type = VirtType::Xen;
                parser.dom.domid = v.parse().ok();
            }
            "-S" | "-nodefaults" | "-nodefconfig" | "-no-user-config" => {}
            "-mon" | "-monitor" | "-pidfile" | "-incoming" | "-loadvm" | "-sandbox" => {
                // Transient per-run state, not configuration.
                let _ = next_arg(&mut i, &flag)?;
            }
            _ => {
                // Unknown flag: keep it (and its apparent argument) in the
                // opaque bucket.
                parser.dom.extra.args.push(flag.clone());
                if let Some(next) = argv.get(i) {
                    if !next.starts_with('-') {
                        parser.dom.extra.args.push(next.clone());
                        i += 1;
                    }
                }
            }
        }
    }

    parser.finish(env.to_vec())
}
