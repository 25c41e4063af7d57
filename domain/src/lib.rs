// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Declarative virtual machine descriptions.
//!
//! A [`Domain`] is pure data plus derivation helpers. The only code that
//! mutates a validated description is the allocator phase (writing aliases
//! and bus addresses into `DeviceInfo`) and the definition-time fixups in
//! [`Domain::post_parse`].

pub mod address;
pub mod device;
pub mod mac;

use std::path::PathBuf;

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use crate::address::*;
pub use crate::device::*;
pub use crate::mac::MacAddress;

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("balloon target {current} KiB exceeds maximum memory {maximum} KiB")]
    BalloonExceedsMaximum { current: u64, maximum: u64 },
    #[error("duplicate disk destination '{0}'")]
    DuplicateDiskTarget(String),
    #[error("description has no machine type")]
    EmptyMachine,
    #[error("description has no name")]
    EmptyName,
    #[error("malformed disk destination '{0}'")]
    MalformedDiskTarget(String),
    #[error("multicast MAC address {0} on network device")]
    MulticastMac(MacAddress),
    #[error("current vcpu count {current} exceeds maximum {maximum}")]
    VcpusExceedMaximum { current: u32, maximum: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Virtualization mode the emulator runs under.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtType {
    #[default]
    Tcg,
    Kvm,
    Kqemu,
    Xen,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTopology {
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CpuMode {
    #[default]
    Custom,
    HostPassthrough,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuFeaturePolicy {
    Require,
    Disable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuFeature {
    pub name: String,
    pub policy: CpuFeaturePolicy,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuDef {
    #[serde(default)]
    pub mode: CpuMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<CpuFeature>,
}

/// Boot device selector for `-boot order=`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootDev {
    Fd,
    Hd,
    Cdrom,
    Network,
}

impl BootDev {
    pub fn code(&self) -> char {
        match self {
            BootDev::Fd => 'a',
            BootDev::Hd => 'c',
            BootDev::Cdrom => 'd',
            BootDev::Network => 'n',
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OsConfig {
    /// Guest architecture: `x86_64`, `i686`, `ppc64`, `s390x`, ...
    pub arch: String,
    /// Emulated platform, e.g. `pc`, `pseries`, `s390-ccw-virtio`.
    pub machine: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boot_devs: Vec<BootDev>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_menu: Option<bool>,
    /// Milliseconds before a failed boot retries; -1 disables the retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot_timeout: Option<i32>,
    /// BIOS output mirrored onto the serial console.
    #[serde(default)]
    pub serial_bios: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initrd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtb: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Balloon target in KiB.
    pub current_kib: u64,
    /// Hard maximum in KiB.
    pub max_kib: u64,
    #[serde(default)]
    pub hugepages: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hugepage_path: Option<PathBuf>,
    /// Lock guest pages into host RAM.
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_core: Option<bool>,
    /// Disable same-page merging.
    #[serde(default)]
    pub nosharepages: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockOffset {
    #[default]
    Utc,
    Localtime,
    /// A fixed `YYYY-MM-DDTHH:MM:SS` start time.
    Absolute,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    Rtc,
    Pit,
    Hpet,
    Kvmclock,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickPolicy {
    Delay,
    Catchup,
    Discard,
    Merge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerTrack {
    Guest,
    Wall,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub kind: TimerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tickpolicy: Option<TickPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<TimerTrack>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    #[serde(default)]
    pub offset: ClockOffset,
    /// Start time for [`ClockOffset::Absolute`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timers: Vec<Timer>,
}

impl Clock {
    pub fn timer(&self, kind: TimerKind) -> Option<&Timer> {
        self.timers.iter().find(|t| t.kind == kind)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypervFeatures {
    #[serde(default)]
    pub relaxed: bool,
    #[serde(default)]
    pub vapic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spinlocks: Option<u32>,
}

impl HypervFeatures {
    pub fn any(&self) -> bool {
        self.relaxed || self.vapic || self.spinlocks.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub acpi: bool,
    #[serde(default)]
    pub apic: bool,
    #[serde(default)]
    pub pae: bool,
    #[serde(default)]
    pub hyperv: HypervFeatures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kvm_pv_eoi: Option<bool>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleAction {
    Destroy,
    #[default]
    Restart,
    Preserve,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub on_poweroff: LifecycleAction,
    #[serde(default)]
    pub on_reboot: LifecycleAction,
    #[serde(default)]
    pub on_crash: LifecycleAction,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_s3: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_s4: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Graphics {
    Vnc {
        /// TCP port; ignored when `autoport` or `socket` is set.
        #[serde(default)]
        port: i32,
        #[serde(default)]
        autoport: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listen: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keymap: Option<String>,
    },
    Spice {
        #[serde(default)]
        port: i32,
        #[serde(default)]
        tls_port: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listen: Option<String>,
    },
    Sdl {
        #[serde(default)]
        fullscreen: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        xauth: Option<String>,
    },
}

/// One guest NUMA cell for `-numa node`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NumaCell {
    /// vCPU list in `-numa` syntax, e.g. `0-3`.
    pub cpus: String,
    pub mem_kib: u64,
}

/// SMBIOS type 1 (system) strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SmbiosSystem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// Extra raw arguments and environment the user wants passed through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraCmdline {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl ExtraCmdline {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.env.is_empty()
    }
}

/// The root aggregate of a VM description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    #[serde(default)]
    pub virt_type: VirtType,
    pub os: OsConfig,
    pub vcpus: u32,
    pub max_vcpus: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<CpuTopology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuDef>,
    pub memory: MemoryConfig,
    #[serde(default)]
    pub clock: Clock,
    #[serde(default)]
    pub features: FeatureSet,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub pm: PmConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smbios: Option<SmbiosSystem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numa: Vec<NumaCell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graphics: Vec<Graphics>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nets: Vec<Net>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controllers: Vec<Controller>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filesystems: Vec<Fs>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sounds: Vec<Sound>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Input>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<Video>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostdevs: Vec<Hostdev>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirdevs: Vec<Redirdev>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub serials: Vec<Serial>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallels: Vec<Parallel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consoles: Vec<Console>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hubs: Vec<Hub>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smartcards: Vec<Smartcard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog: Option<Watchdog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memballoon: Option<Memballoon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng: Option<Rng>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<Tpm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvram: Option<Nvram>,

    /// Unrecognized flags the inverse parser preserved.
    #[serde(default, skip_serializing_if = "ExtraCmdline::is_empty")]
    pub extra: ExtraCmdline,
}

impl Domain {
    /// A minimal valid description, mainly for tests and the inverse parser
    /// to fill in.
    pub fn empty(name: &str) -> Domain {
        Domain {
            name: name.to_owned(),
            uuid: Uuid::nil(),
            virt_type: VirtType::Tcg,
            os: OsConfig::default(),
            vcpus: 1,
            max_vcpus: 1,
            topology: None,
            cpu: None,
            memory: MemoryConfig {
                current_kib: 65536,
                max_kib: 65536,
                ..MemoryConfig::default()
            },
            clock: Clock::default(),
            features: FeatureSet::default(),
            lifecycle: Lifecycle::default(),
            pm: PmConfig::default(),
            emulator: None,
            domid: None,
            smbios: None,
            numa: Vec::new(),
            graphics: Vec::new(),
            disks: Vec::new(),
            nets: Vec::new(),
            controllers: Vec::new(),
            filesystems: Vec::new(),
            sounds: Vec::new(),
            inputs: Vec::new(),
            videos: Vec::new(),
            hostdevs: Vec::new(),
            redirdevs: Vec::new(),
            channels: Vec::new(),
            serials: Vec::new(),
            parallels: Vec::new(),
            consoles: Vec::new(),
            hubs: Vec::new(),
            smartcards: Vec::new(),
            watchdog: None,
            memballoon: None,
            rng: None,
            tpm: None,
            nvram: None,
            extra: ExtraCmdline::default(),
        }
    }

    // ---- architecture / machine predicates

    pub fn is_x86(&self) -> bool {
        matches!(self.os.arch.as_str(), "i686" | "x86_64")
    }

    pub fn is_ppc64(&self) -> bool {
        self.os.arch == "ppc64"
    }

    pub fn is_s390(&self) -> bool {
        matches!(self.os.arch.as_str(), "s390" | "s390x")
    }

    pub fn machine_is_pseries(&self) -> bool {
        self.os.machine == "pseries" || self.os.machine.starts_with("pseries-")
    }

    pub fn machine_is_s390_ccw(&self) -> bool {
        self.os.machine.starts_with("s390-ccw")
    }

    /// x86 `pc` family machines carry an implicit PIIX3 southbridge.
    pub fn machine_is_i440fx(&self) -> bool {
        self.is_x86() && (self.os.machine == "pc" || self.os.machine.starts_with("pc-"))
    }

    // ---- derivation helpers

    pub fn find_controller(&self, kind: ControllerKind, idx: u32) -> Option<&Controller> {
        self.controllers
            .iter()
            .find(|c| c.kind == kind && c.idx == idx)
    }

    pub fn disk_by_dst(&self, dst: &str) -> Option<&Disk> {
        self.disks.iter().find(|d| d.dst == dst)
    }

    pub fn has_device_alias(&self, alias: &str) -> bool {
        let mut found = false;
        self.for_each_info(|_, _, info| {
            if info.alias.as_deref() == Some(alias) {
                found = true;
            }
        });
        found
    }

    /// Visits every device's info, in the declaration order of the class
    /// collections.
    pub fn for_each_info<F: FnMut(DeviceClass, usize, &DeviceInfo)>(&self, mut f: F) {
        macro_rules! walk {
            ($field:expr) => {
                for (i, dev) in $field.iter().enumerate() {
                    f(dev.class(), i, dev.info());
                }
            };
            (opt $field:expr) => {
                if let Some(dev) = $field.as_ref() {
                    f(dev.class(), 0, dev.info());
                }
            };
        }
        walk!(self.disks);
        walk!(self.nets);
        walk!(self.controllers);
        walk!(self.filesystems);
        walk!(self.sounds);
        walk!(self.inputs);
        walk!(self.videos);
        walk!(self.hostdevs);
        walk!(self.redirdevs);
        walk!(self.channels);
        walk!(self.serials);
        walk!(self.parallels);
        walk!(self.consoles);
        walk!(self.hubs);
        walk!(self.smartcards);
        walk!(opt self.watchdog);
        walk!(opt self.memballoon);
        walk!(opt self.rng);
        walk!(opt self.tpm);
        walk!(opt self.nvram);
    }

    /// Mutable variant of [`Domain::for_each_info`].
    pub fn for_each_info_mut<F: FnMut(DeviceClass, usize, &mut DeviceInfo)>(&mut self, mut f: F) {
        macro_rules! walk {
            ($field:expr) => {
                for (i, dev) in $field.iter_mut().enumerate() {
                    let class = dev.class();
                    f(class, i, dev.info_mut());
                }
            };
            (opt $field:expr) => {
                if let Some(dev) = $field.as_mut() {
                    let class = dev.class();
                    f(class, 0, dev.info_mut());
                }
            };
        }
        walk!(self.disks);
        walk!(self.nets);
        walk!(self.controllers);
        walk!(self.filesystems);
        walk!(self.sounds);
        walk!(self.inputs);
        walk!(self.videos);
        walk!(self.hostdevs);
        walk!(self.redirdevs);
        walk!(self.channels);
        walk!(self.serials);
        walk!(self.parallels);
        walk!(self.consoles);
        walk!(self.hubs);
        walk!(self.smartcards);
        walk!(opt self.watchdog);
        walk!(opt self.memballoon);
        walk!(opt self.rng);
        walk!(opt self.tpm);
        walk!(opt self.nvram);
    }

    // ---- definition-time fixups

    /// Adds the controllers the declared devices imply: a disk on `sdb`
    /// wants `scsi` controller 0, a channel wants a virtio-serial
    /// controller, and so on. Explicitly declared controllers win.
    pub fn add_implicit_controllers(&mut self) {
        let mut wanted: Vec<(ControllerKind, u32)> = Vec::new();
        for disk in &self.disks {
            let kind = match disk.bus {
                DiskBus::Ide => ControllerKind::Ide,
                DiskBus::Fdc => ControllerKind::Fdc,
                DiskBus::Scsi => ControllerKind::Scsi,
                DiskBus::Sata => ControllerKind::Sata,
                DiskBus::Usb | DiskBus::Virtio => continue,
            };
            let controller = match disk.info.addr.drive() {
                Some(addr) => addr.controller,
                None => disk
                    .default_drive_address()
                    .map(|a| a.controller)
                    .unwrap_or(0),
            };
            wanted.push((kind, controller));
        }
        for channel in &self.channels {
            if let ChannelTarget::VirtioSerial { .. } = channel.target {
                let controller = match &channel.info.addr {
                    DeviceAddress::VirtioSerial(addr) => addr.controller,
                    _ => 0,
                };
                wanted.push((ControllerKind::VirtioSerial, controller));
            }
        }
        for console in &self.consoles {
            if console.target == ConsoleTarget::Virtio {
                wanted.push((ControllerKind::VirtioSerial, 0));
            }
        }
        for hostdev in &self.hostdevs {
            if let HostdevSource::Scsi { .. } = hostdev.source {
                let controller = hostdev
                    .info
                    .addr
                    .drive()
                    .map(|a| a.controller)
                    .unwrap_or(0);
                wanted.push((ControllerKind::Scsi, controller));
            }
        }
        for smartcard in &self.smartcards {
            let _ = smartcard;
            wanted.push((ControllerKind::Ccid, 0));
        }
        wanted.sort();
        wanted.dedup();
        for (kind, idx) in wanted {
            if self.find_controller(kind, idx).is_none() {
                log::debug!("adding implicit {} controller {}", kind.name(), idx);
                self.controllers.push(Controller::new(kind, idx));
            }
        }
    }

    /// Stamps generated MACs on NICs that have none. Runs when the
    /// description is loaded so that later builds are deterministic.
    pub fn assign_missing_macs<R: rand::Rng>(&mut self, rng: &mut R) {
        for net in &mut self.nets {
            if net.mac.is_none() {
                net.mac = Some(MacAddress::generate(rng));
            }
        }
    }

    /// The loaded-description fixups, in order.
    pub fn post_parse<R: rand::Rng>(&mut self, rng: &mut R) -> Result<()> {
        self.validate()?;
        self.add_implicit_controllers();
        self.assign_missing_macs(rng);
        Ok(())
    }

    /// Checks the structural invariants the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::EmptyName);
        }
        if self.os.machine.is_empty() {
            return Err(Error::EmptyMachine);
        }
        if self.vcpus > self.max_vcpus {
            return Err(Error::VcpusExceedMaximum {
                current: self.vcpus,
                maximum: self.max_vcpus,
            });
        }
        if self.memory.current_kib > self.memory.max_kib {
            return Err(Error::BalloonExceedsMaximum {
                current: self.memory.current_kib,
                maximum: self.memory.max_kib,
            });
        }
        let mut targets: Vec<&str> = Vec::new();
        for disk in &self.disks {
            if disk.index().is_none() {
                return Err(Error::MalformedDiskTarget(disk.dst.clone()));
            }
            if targets.contains(&disk.dst.as_str()) {
                return Err(Error::DuplicateDiskTarget(disk.dst.clone()));
            }
            targets.push(&disk.dst);
        }
        for net in &self.nets {
            if let Some(mac) = &net.mac {
                if mac.is_multicast() {
                    return Err(Error::MulticastMac(*mac));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_disk(dst: &str, bus: DiskBus) -> Disk {
        Disk {
            info: DeviceInfo::default(),
            dst: dst.to_owned(),
            bus,
            device: DiskDevice::Disk,
            src: DiskSource::File {
                path: PathBuf::from("/img"),
            },
            format: None,
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

    #[test]
    fn validate_rejects_vcpu_overflow() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        dom.vcpus = 4;
        dom.max_vcpus = 2;
        assert_eq!(
            dom.validate(),
            Err(Error::VcpusExceedMaximum {
                current: 4,
                maximum: 2
            })
        );
    }

    #[test]
    fn validate_rejects_balloon_overflow() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        dom.memory.current_kib = 1024 * 1024;
        dom.memory.max_kib = 512 * 1024;
        assert!(matches!(
            dom.validate(),
            Err(Error::BalloonExceedsMaximum { .. })
        ));
    }

    #[test]
    fn validate_requires_machine() {
        let dom = Domain::empty("t");
        assert_eq!(dom.validate(), Err(Error::EmptyMachine));
    }

    #[test]
    fn validate_rejects_duplicate_targets() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        dom.disks.push(plain_disk("vda", DiskBus::Virtio));
        dom.disks.push(plain_disk("vda", DiskBus::Virtio));
        assert_eq!(
            dom.validate(),
            Err(Error::DuplicateDiskTarget("vda".to_owned()))
        );
    }

    #[test]
    fn implicit_controllers_for_disks() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        dom.disks.push(plain_disk("sdb", DiskBus::Scsi));
        dom.disks.push(plain_disk("hda", DiskBus::Ide));
        // The ninth SCSI disk lands on controller 1.
        dom.disks.push(plain_disk("sdi", DiskBus::Scsi));
        dom.add_implicit_controllers();
        assert!(dom.find_controller(ControllerKind::Scsi, 0).is_some());
        assert!(dom.find_controller(ControllerKind::Scsi, 1).is_some());
        assert!(dom.find_controller(ControllerKind::Ide, 0).is_some());
        assert!(dom.find_controller(ControllerKind::Fdc, 0).is_none());
        // Idempotent: running it again adds nothing.
        let count = dom.controllers.len();
        dom.add_implicit_controllers();
        assert_eq!(dom.controllers.len(), count);
    }

    #[test]
    fn missing_macs_are_generated() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        dom.nets.push(Net {
            info: DeviceInfo::default(),
            mac: None,
            model: Some("virtio".to_owned()),
            backend: NetBackend::User,
        });
        dom.assign_missing_macs(&mut rand::thread_rng());
        let mac = dom.nets[0].mac.unwrap();
        assert_eq!(&mac.octets()[..3], &crate::mac::MAC_PREFIX);
    }

    #[test]
    fn info_walk_covers_all_collections() {
        let mut dom = Domain::empty("t");
        dom.os.machine = "pc".to_owned();
        dom.disks.push(plain_disk("vda", DiskBus::Virtio));
        dom.watchdog = Some(Watchdog {
            info: DeviceInfo::default(),
            model: WatchdogModel::I6300esb,
            action: WatchdogAction::Reset,
        });
        let mut classes = Vec::new();
        dom.for_each_info(|class, _, _| classes.push(class));
        assert_eq!(classes, vec![DeviceClass::Disk, DeviceClass::Watchdog]);
    }

    #[test]
    fn json_round_trip() {
        let mut dom = Domain::empty("roundtrip");
        dom.os.arch = "x86_64".to_owned();
        dom.os.machine = "pc".to_owned();
        dom.disks.push(plain_disk("vda", DiskBus::Virtio));
        let json = serde_json::to_string_pretty(&dom).unwrap();
        let back: Domain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dom);
    }
}
