// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The polymorphic device set of a VM description.
//!
//! Every device struct embeds a [`DeviceInfo`]; the [`HasDeviceInfo`] trait
//! is the seam the allocators and serializers dispatch through.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::address::DeviceAddress;
use crate::address::DriveAddress;
use crate::mac::MacAddress;

/// Identity every device carries: the stable alias, the bus address, an
/// optional boot ordering and ROM attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "DeviceAddress::is_none")]
    pub addr: DeviceAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootindex: Option<u32>,
    /// `rombar=` toggle on the PCI expansion ROM BAR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rom_bar: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rom_file: Option<String>,
}

impl DeviceInfo {
    /// The alias, which the caller must have assigned already.
    pub fn alias_or_empty(&self) -> &str {
        self.alias.as_deref().unwrap_or("")
    }
}

/// Class tag used for alias prefixes and allocator bookkeeping.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceClass {
    Disk,
    Net,
    Controller,
    Fs,
    Sound,
    Input,
    Video,
    Hostdev,
    Redirdev,
    Channel,
    Serial,
    Parallel,
    Console,
    Hub,
    Smartcard,
    Watchdog,
    Memballoon,
    Rng,
    Tpm,
    Nvram,
}

/// Dispatch seam over the device variants.
pub trait HasDeviceInfo {
    fn info(&self) -> &DeviceInfo;
    fn info_mut(&mut self) -> &mut DeviceInfo;
    fn class(&self) -> DeviceClass;
}

macro_rules! impl_has_device_info {
    ($ty:ty, $class:ident) => {
        impl HasDeviceInfo for $ty {
            fn info(&self) -> &DeviceInfo {
                &self.info
            }
            fn info_mut(&mut self) -> &mut DeviceInfo {
                &mut self.info
            }
            fn class(&self) -> DeviceClass {
                DeviceClass::$class
            }
        }
    };
}

// ---------------------------------------------------------------- disks

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    Ide,
    Fdc,
    Scsi,
    Sata,
    Usb,
    Virtio,
}

impl DiskBus {
    /// Bus name as it appears in `-drive if=` and in drive aliases.
    pub fn name(&self) -> &'static str {
        match self {
            DiskBus::Ide => "ide",
            DiskBus::Fdc => "fdc",
            DiskBus::Scsi => "scsi",
            DiskBus::Sata => "sata",
            DiskBus::Usb => "usb",
            DiskBus::Virtio => "virtio",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskDevice {
    Disk,
    Cdrom,
    Floppy,
    /// SCSI passthrough of a whole logical unit.
    Lun,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetProtocol {
    Nbd,
    Rbd,
    Gluster,
    Iscsi,
    Sheepdog,
}

impl NetProtocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            NetProtocol::Nbd => "nbd",
            NetProtocol::Rbd => "rbd",
            NetProtocol::Gluster => "gluster",
            NetProtocol::Iscsi => "iscsi",
            NetProtocol::Sheepdog => "sheepdog",
        }
    }
}

/// One endpoint of a network disk source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSourceHost {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// `tcp`, `unix`, `rdma`; gluster and nbd honor it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Socket path for unix transports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiskSource {
    /// No media inserted (allowed for removable drives).
    #[default]
    None,
    File {
        path: PathBuf,
    },
    Block {
        path: PathBuf,
    },
    /// Directory exported through a virtual FAT filesystem; read-only.
    Dir {
        path: PathBuf,
    },
    Network {
        protocol: NetProtocol,
        /// Volume/image name, e.g. `pool/image` for rbd.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        hosts: Vec<DiskSourceHost>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

impl DiskSource {
    pub fn is_none(&self) -> bool {
        matches!(self, DiskSource::None)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    None,
    Writethrough,
    Writeback,
    Directsync,
    Unsafe,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    Stop,
    Report,
    Ignore,
    Enospace,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    Threads,
    Native,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscardMode {
    Unmap,
    Ignore,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryTranslation {
    Auto,
    None,
    Lba,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    pub cylinders: u32,
    pub heads: u32,
    pub sectors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<GeometryTranslation>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIo {
    #[serde(default)]
    pub logical_block_size: u32,
    #[serde(default)]
    pub physical_block_size: u32,
}

impl BlockIo {
    pub fn is_zero(&self) -> bool {
        self.logical_block_size == 0 && self.physical_block_size == 0
    }
}

/// Throttling knobs; zero means unlimited and is elided from output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoTune {
    #[serde(default)]
    pub total_bytes_sec: u64,
    #[serde(default)]
    pub read_bytes_sec: u64,
    #[serde(default)]
    pub write_bytes_sec: u64,
    #[serde(default)]
    pub total_iops_sec: u64,
    #[serde(default)]
    pub read_iops_sec: u64,
    #[serde(default)]
    pub write_iops_sec: u64,
}

impl IoTune {
    pub fn is_zero(&self) -> bool {
        *self == IoTune::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    #[serde(default)]
    pub info: DeviceInfo,
    /// Destination name inside the guest: `vda`, `hdc`, `sda`, `fda`...
    pub dst: String,
    pub bus: DiskBus,
    #[serde(default = "default_disk_device")]
    pub device: DiskDevice,
    #[serde(default)]
    pub src: DiskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_policy: Option<ErrorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerror_policy: Option<ErrorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io: Option<IoMode>,
    #[serde(default)]
    pub copy_on_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard: Option<DiscardMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wwn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<DiskGeometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockio: Option<BlockIo>,
    #[serde(default, skip_serializing_if = "IoTune::is_zero")]
    pub iotune: IoTune,
}

fn default_disk_device() -> DiskDevice {
    DiskDevice::Disk
}

impl_has_device_info!(Disk, Disk);

impl Disk {
    /// Index derived from the destination name: `vda` is 0, `sdb` is 1,
    /// `hdaa` is 26. Returns `None` for a malformed name.
    pub fn index(&self) -> Option<u32> {
        disk_name_to_index(&self.dst)
    }

    /// The controller/bus/unit position the destination name implies.
    pub fn default_drive_address(&self) -> Option<DriveAddress> {
        let idx = self.index()?;
        let addr = match self.bus {
            DiskBus::Ide => DriveAddress {
                controller: idx / 4,
                bus: (idx % 4) / 2,
                target: 0,
                unit: idx % 2,
            },
            DiskBus::Scsi => DriveAddress {
                controller: idx / 7,
                bus: 0,
                target: 0,
                unit: idx % 7,
            },
            DiskBus::Fdc | DiskBus::Sata | DiskBus::Usb | DiskBus::Virtio => DriveAddress {
                controller: 0,
                bus: 0,
                target: 0,
                unit: idx,
            },
        };
        Some(addr)
    }

    pub fn is_cdrom(&self) -> bool {
        self.device == DiskDevice::Cdrom
    }
}

/// `vda` -> 0, `vdb` -> 1, ..., `vdaa` -> 26. The prefix is the two or
/// three leading non-suffix letters (`vd`, `sd`, `hd`, `fd`, `xvd`).
pub fn disk_name_to_index(dst: &str) -> Option<u32> {
    let prefix_len = ["xvd"]
        .iter()
        .find(|p| dst.starts_with(**p))
        .map(|p| p.len())
        .or_else(|| {
            ["vd", "sd", "hd", "fd", "ubd"]
                .iter()
                .find(|p| dst.starts_with(**p))
                .map(|p| p.len())
        })?;
    let suffix = &dst[prefix_len..];
    if suffix.is_empty() {
        return None;
    }
    let mut idx: u64 = 0;
    for c in suffix.chars() {
        if !c.is_ascii_lowercase() {
            return None;
        }
        idx = idx * 26 + (c as u64 - 'a' as u64 + 1);
        if idx > u32::MAX as u64 {
            return None;
        }
    }
    Some((idx - 1) as u32)
}

// ------------------------------------------------------------- networks

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketNetMode {
    Connect,
    Listen,
    Mcast,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NetBackend {
    /// SLIRP user-mode networking.
    #[default]
    User,
    /// A tap interface. The descriptors are opened by a collaborator and
    /// injected; more than one means a multiqueue device.
    Tap {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ifname: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fds: Vec<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vhost: Option<bool>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        vhost_fds: Vec<i32>,
    },
    Socket {
        mode: SocketNetMode,
        /// `host:port` endpoint.
        address: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Net {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddress>,
    /// NIC model: `virtio`, `e1000`, `rtl8139`, `spapr-vlan`...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub backend: NetBackend,
}

impl_has_device_info!(Net, Net);

impl Net {
    pub fn is_virtio(&self) -> bool {
        matches!(&self.model, Some(m) if m == "virtio")
    }

    pub fn is_spapr_vlan(&self) -> bool {
        matches!(&self.model, Some(m) if m == "spapr-vlan")
    }
}

// ----------------------------------------------------------- controllers

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerKind {
    Ide,
    Fdc,
    Scsi,
    Sata,
    Usb,
    VirtioSerial,
    Ccid,
    Pci,
}

impl ControllerKind {
    /// Name used for alias prefixes and drive bus ids.
    pub fn name(&self) -> &'static str {
        match self {
            ControllerKind::Ide => "ide",
            ControllerKind::Fdc => "fdc",
            ControllerKind::Scsi => "scsi",
            ControllerKind::Sata => "sata",
            ControllerKind::Usb => "usb",
            ControllerKind::VirtioSerial => "virtio-serial",
            ControllerKind::Ccid => "ccid",
            ControllerKind::Pci => "pci",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerModel {
    // SCSI HBAs
    VirtioScsi,
    LsiLogic,
    IbmVscsi,
    LsiSas1078,
    // USB controllers
    Piix3Uhci,
    Piix4Uhci,
    Ehci,
    Ich9Ehci1,
    Ich9Uhci1,
    Ich9Uhci2,
    Ich9Uhci3,
    Vt82c686bUhci,
    PciOhci,
    NecXhci,
    // PCI controllers
    PciRoot,
    PciBridge,
}

/// Companion USB controllers name their EHCI master and first port here.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbMaster {
    pub idx: u32,
    pub startport: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    #[serde(default)]
    pub info: DeviceInfo,
    pub kind: ControllerKind,
    #[serde(default)]
    pub idx: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ControllerModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<UsbMaster>,
    /// virtio-serial port count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<u32>,
    /// virtio-serial vector count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<u32>,
}

impl_has_device_info!(Controller, Controller);

impl Controller {
    pub fn new(kind: ControllerKind, idx: u32) -> Controller {
        Controller {
            info: DeviceInfo::default(),
            kind,
            idx,
            model: None,
            master: None,
            ports: None,
            vectors: None,
        }
    }

    /// ICH9 UHCI companions share their master's slot.
    pub fn is_usb_companion(&self) -> bool {
        matches!(
            self.model,
            Some(ControllerModel::Ich9Uhci1)
                | Some(ControllerModel::Ich9Uhci2)
                | Some(ControllerModel::Ich9Uhci3)
        )
    }
}

// ------------------------------------------------------------ fs exports

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsAccessMode {
    #[default]
    Passthrough,
    Mapped,
    Squash,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fs {
    #[serde(default)]
    pub info: DeviceInfo,
    pub src: PathBuf,
    /// Mount tag exposed to the guest.
    pub dst: String,
    #[serde(default)]
    pub accessmode: FsAccessMode,
    #[serde(default)]
    pub readonly: bool,
}

impl_has_device_info!(Fs, Fs);

// ------------------------------------------------------------- the rest

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundModel {
    Sb16,
    Pcspk,
    Es1370,
    Ac97,
    Ich6,
}

impl SoundModel {
    pub fn name(&self) -> &'static str {
        match self {
            SoundModel::Sb16 => "sb16",
            SoundModel::Pcspk => "pcspk",
            SoundModel::Es1370 => "es1370",
            SoundModel::Ac97 => "ac97",
            SoundModel::Ich6 => "ich6",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCodec {
    Duplex,
    Micro,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    #[serde(default)]
    pub info: DeviceInfo,
    pub model: SoundModel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codecs: Vec<SoundCodec>,
}

impl_has_device_info!(Sound, Sound);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Mouse,
    Tablet,
    Keyboard,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputBus {
    Ps2,
    Usb,
    Xen,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub info: DeviceInfo,
    pub kind: InputKind,
    pub bus: InputBus,
}

impl_has_device_info!(Input, Input);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoModel {
    Vga,
    Cirrus,
    Vmvga,
    Qxl,
    Xen,
}

impl VideoModel {
    pub fn name(&self) -> &'static str {
        match self {
            VideoModel::Vga => "vga",
            VideoModel::Cirrus => "cirrus",
            VideoModel::Vmvga => "vmvga",
            VideoModel::Qxl => "qxl",
            VideoModel::Xen => "xen",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(default)]
    pub info: DeviceInfo,
    pub model: VideoModel,
    /// Video RAM in KiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vram: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heads: Option<u32>,
}

impl_has_device_info!(Video, Video);

/// Host PCI device location (host side, so a domain is meaningful).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPciAddress {
    #[serde(default)]
    pub domain: u16,
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

impl std::fmt::Display for HostPciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:02x}:{:02x}.{:x}", self.bus, self.slot, self.function)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HostdevSource {
    Pci {
        addr: HostPciAddress,
    },
    Usb {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bus: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device: Option<u32>,
    },
    Scsi {
        /// The host generic SCSI node, e.g. `/dev/sg4`.
        path: PathBuf,
        #[serde(default)]
        readonly: bool,
    },
}

/// How a host PCI device is handed to the guest.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PciPassthroughBackend {
    #[default]
    Default,
    Kvm,
    Vfio,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hostdev {
    #[serde(default)]
    pub info: DeviceInfo,
    pub source: HostdevSource,
    #[serde(default)]
    pub backend: PciPassthroughBackend,
    /// Config-space descriptor injected by the collaborator for pci-assign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configfd: Option<i32>,
}

impl_has_device_info!(Hostdev, Hostdev);

// --------------------------------------------------------- char backends

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CharSource {
    Null,
    /// Virtual console of the graphical display.
    Vc,
    #[default]
    Pty,
    Stdio,
    /// A host tty device node.
    Dev {
        path: PathBuf,
    },
    Parport {
        path: PathBuf,
    },
    File {
        path: PathBuf,
    },
    Pipe {
        path: PathBuf,
    },
    Udp {
        #[serde(default)]
        host: String,
        service: String,
        #[serde(default)]
        bind_host: String,
        #[serde(default)]
        bind_service: String,
    },
    Tcp {
        host: String,
        service: String,
        #[serde(default)]
        listen: bool,
        #[serde(default)]
        telnet: bool,
    },
    Unix {
        path: PathBuf,
        #[serde(default)]
        listen: bool,
    },
    /// Spice agent channel.
    SpiceVmc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Serial {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default)]
    pub source: CharSource,
    #[serde(default)]
    pub target_port: u32,
}

impl_has_device_info!(Serial, Serial);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parallel {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default)]
    pub source: CharSource,
    #[serde(default)]
    pub target_port: u32,
}

impl_has_device_info!(Parallel, Parallel);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleTarget {
    /// Alias of the first serial port.
    #[default]
    Serial,
    Virtio,
    /// s390 SCLP console.
    Sclp,
    /// s390 SCLP line-mode console.
    SclpLm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Console {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default)]
    pub source: CharSource,
    #[serde(default)]
    pub target: ConsoleTarget,
    #[serde(default)]
    pub target_port: u32,
}

impl_has_device_info!(Console, Console);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChannelTarget {
    /// A named virtio-serial port.
    VirtioSerial {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// User-net forward of a guest TCP endpoint.
    GuestFwd { address: String, port: u16 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default)]
    pub source: CharSource,
    pub target: ChannelTarget,
}

impl_has_device_info!(Channel, Channel);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Redirdev {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default)]
    pub source: CharSource,
}

impl_has_device_info!(Redirdev, Redirdev);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hub {
    #[serde(default)]
    pub info: DeviceInfo,
}

impl_has_device_info!(Hub, Hub);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SmartcardMode {
    /// Emulated card with host certificates.
    Host,
    HostCertificates {
        certificates: [String; 3],
        #[serde(default, skip_serializing_if = "Option::is_none")]
        database: Option<String>,
    },
    Passthrough {
        source: CharSource,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Smartcard {
    #[serde(default)]
    pub info: DeviceInfo,
    pub mode: SmartcardMode,
}

impl_has_device_info!(Smartcard, Smartcard);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogModel {
    I6300esb,
    Ib700,
}

impl WatchdogModel {
    pub fn name(&self) -> &'static str {
        match self {
            WatchdogModel::I6300esb => "i6300esb",
            WatchdogModel::Ib700 => "ib700",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogAction {
    #[default]
    Reset,
    Shutdown,
    Poweroff,
    Pause,
    Debug,
    None,
}

impl WatchdogAction {
    pub fn name(&self) -> &'static str {
        match self {
            WatchdogAction::Reset => "reset",
            WatchdogAction::Shutdown => "shutdown",
            WatchdogAction::Poweroff => "poweroff",
            WatchdogAction::Pause => "pause",
            WatchdogAction::Debug => "debug",
            WatchdogAction::None => "none",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Watchdog {
    #[serde(default)]
    pub info: DeviceInfo,
    pub model: WatchdogModel,
    #[serde(default)]
    pub action: WatchdogAction,
}

impl_has_device_info!(Watchdog, Watchdog);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemballoonModel {
    #[default]
    Virtio,
    Xen,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Memballoon {
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default)]
    pub model: MemballoonModel,
}

impl_has_device_info!(Memballoon, Memballoon);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RngBackend {
    Random {
        path: PathBuf,
    },
    Egd {
        source: CharSource,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rng {
    #[serde(default)]
    pub info: DeviceInfo,
    pub backend: RngBackend,
    /// Bytes per period, with the period in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_bytes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_period: Option<u32>,
}

impl_has_device_info!(Rng, Rng);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tpm {
    #[serde(default)]
    pub info: DeviceInfo,
    /// Host passthrough device path.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_path: Option<PathBuf>,
}

impl_has_device_info!(Tpm, Tpm);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Nvram {
    #[serde(default)]
    pub info: DeviceInfo,
}

impl_has_device_info!(Nvram, Nvram);
