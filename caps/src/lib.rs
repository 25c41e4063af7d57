// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Emulator capability flags.
//!
//! The flag set is produced by probing the emulator binary; that probing
//! lives outside this workspace. Everything in here is the read side: a
//! closed enumeration of the flags the command compiler cares about and a
//! set type answering `has()`. Flag names the probe reports that we do not
//! recognize are simply absent from the set.

use std::fmt;
use std::str::FromStr;

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unknown capability flag '{0}'")]
    UnknownFlag(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A named emulator feature flag.
///
/// The numbering is internal; persisted capability sets store flag names,
/// not discriminants.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cap {
    /// `-boot menu=on`
    BootMenu,
    /// `-boot reboot-timeout=`
    BootRebootTimeout,
    /// `bootindex=` property on -device
    Bootindex,
    /// `-chardev`
    Chardev,
    /// `-chardev spicevmc`
    ChardevSpicevmc,
    /// emulated CCID smartcard
    CcidEmulated,
    /// passthrough CCID smartcard
    CcidPassthru,
    /// `-cpu host`
    CpuHost,
    /// `-device`
    Device,
    /// QXL as a `-device`
    DeviceQxl,
    /// primary video card relocatable via `-device`
    DeviceVideoPrimary,
    /// `-global PIIX4_PM.disable_s3`
    DisableS3,
    /// `-global PIIX4_PM.disable_s4`
    DisableS4,
    /// `-drive`
    Drive,
    /// `aio=` on -drive
    DriveAio,
    /// `-drive cache=` accepts the v2 mode names
    DriveCacheV2,
    /// `cache=directsync`
    DriveCacheDirectsync,
    /// `cache=unsafe`
    DriveCacheUnsafe,
    /// `copy-on-read=` on -drive
    DriveCopyOnRead,
    /// `discard=` on -drive
    DriveDiscard,
    /// `format=` on -drive
    DriveFormat,
    /// `bps=`/`iops=` throttling on -drive
    DriveIotune,
    /// `readonly=on` on -drive
    DriveReadonly,
    /// `serial=` on -drive
    DriveSerial,
    /// `-machine ...,dump-guest-core=`
    DumpGuestCore,
    /// `-mem-path`
    MemPath,
    /// `-fsdev`
    Fsdev,
    /// `hda-duplex` audio codec
    HdaDuplex,
    /// `hda-micro` audio codec
    HdaMicro,
    /// ICH9 EHCI with UHCI companion controllers
    Ich9UsbEhci1,
    /// `ide-cd` / `ide-hd` device models
    IdeCd,
    /// `wwn=` on ide-hd
    IdeDriveWwn,
    /// KVM acceleration is available
    Kvm,
    /// `lsi` SCSI HBA model
    ScsiLsi,
    /// `-machine <name>,<opts>` spelling (vs bare `-M`)
    MachineOpt,
    /// `usb=` machine option
    MachineUsbOpt,
    /// `megasas` SCSI HBA model
    ScsiMegasas,
    /// `-machine ...,mem-merge=`
    MemMerge,
    /// `-realtime mlock=`
    Mlock,
    /// `-mon` with a chardev backend
    MonitorJson,
    /// `-netdev`
    Netdev,
    /// `-no-hpet`
    NoHpet,
    /// `-no-kvm-pit-reinjection`
    NoKvmPitReinjection,
    /// `-no-shutdown`
    NoShutdown,
    /// `-no-user-config`
    NoUserConfig,
    /// `-nodefconfig`
    Nodefconfig,
    /// `-numa`
    Numa,
    /// `pci-assign` style host PCI passthrough
    PciAssign,
    /// `bootindex=` on assigned PCI devices
    PciBootindex,
    /// `configfd=` on pci-assign
    PciConfigfd,
    /// `pci-bridge` controller model
    PciBridge,
    /// `multifunction=` on -device
    PciMultifunction,
    /// more than one PCI bus (`bus=pci.N` spelling)
    PciMultibus,
    /// `rombar=` on -device
    PciRombar,
    /// `romfile=` on -device
    PciRomfile,
    /// `-rtc`
    Rtc,
    /// virtio-rng device family
    VirtioRng,
    /// `-sandbox`
    SeccompSandbox,
    /// serial graphics adapter (`-device sga`)
    Sga,
    /// `sclpconsole` s390 console device
    SclpS390,
    /// `scsi-block` device model
    ScsiBlock,
    /// `scsi-cd` / `scsi-hd` device models
    ScsiCd,
    /// `channel=` addressing on scsi-disk
    ScsiDiskChannel,
    /// `wwn=` on scsi-disk
    ScsiDiskWwn,
    /// `-smbios`
    Smbios,
    /// SMP topology (`sockets=,cores=,threads=`)
    SmpTopology,
    /// `-spice`
    Spice,
    /// `-soundhw` replaced by -device audio models
    SoundDevice,
    /// `-device usb-storage`
    UsbStorage,
    /// `-tdf`
    Tdf,
    /// TPM passthrough backend
    TpmPassthrough,
    /// `usb-hub` device model
    UsbHub,
    /// `usb-redir` device model
    UsbRedir,
    /// `bootindex=` on usb-host
    UsbHostBootindex,
    /// `logical_block_size=`/`physical_block_size=` on blockdevs
    BlockioSize,
    /// `vfio-pci` host device passthrough
    VfioPci,
    /// `-vga`
    Vga,
    /// `-vga none`
    VgaNone,
    /// QXL via `-vga qxl`
    VgaQxl,
    /// vhost-net acceleration
    VhostNet,
    /// virtio devices on the s390 CCW bus
    VirtioCcw,
    /// `scsi=` modifier on virtio-blk
    VirtioBlkScsi,
    /// SG_IO passthrough on virtio-blk
    VirtioBlkSgIo,
    /// virtio devices on the legacy s390 bus
    VirtioS390,
    /// `virtio-scsi-pci` HBA family
    VirtioScsi,
    /// `-vnc host:display` colon syntax
    VncColon,
    /// tap offload of partial csum (vnet header)
    VnetHdr,
    /// `-device nvram` (spapr-nvram)
    DeviceNvram,
    /// `-numa node,memdev=` style pinning
    ObjectMemory,
}

impl Cap {
    /// The probe-visible name of the flag.
    pub fn name(&self) -> &'static str {
        match self {
            Cap::BootMenu => "boot-menu",
            Cap::BootRebootTimeout => "reboot-timeout",
            Cap::Bootindex => "bootindex",
            Cap::Chardev => "chardev",
            Cap::ChardevSpicevmc => "chardev-spicevmc",
            Cap::CcidEmulated => "ccid-emulated",
            Cap::CcidPassthru => "ccid-passthru",
            Cap::CpuHost => "cpu-host",
            Cap::Device => "device",
            Cap::DeviceQxl => "device-qxl",
            Cap::DeviceVideoPrimary => "device-video-primary",
            Cap::DisableS3 => "disable-s3",
            Cap::DisableS4 => "disable-s4",
            Cap::Drive => "drive",
            Cap::DriveAio => "drive-aio",
            Cap::DriveCacheV2 => "drive-cache-v2",
            Cap::DriveCacheDirectsync => "drive-cache-directsync",
            Cap::DriveCacheUnsafe => "drive-cache-unsafe",
            Cap::DriveCopyOnRead => "drive-copy-on-read",
            Cap::DriveDiscard => "drive-discard",
            Cap::DriveFormat => "drive-format",
            Cap::DriveIotune => "drive-iotune",
            Cap::DriveReadonly => "drive-readonly",
            Cap::DriveSerial => "drive-serial",
            Cap::DumpGuestCore => "dump-guest-core",
            Cap::MemPath => "mem-path",
            Cap::Fsdev => "fsdev",
            Cap::HdaDuplex => "hda-duplex",
            Cap::HdaMicro => "hda-micro",
            Cap::Ich9UsbEhci1 => "ich9-usb-ehci1",
            Cap::IdeCd => "ide-cd",
            Cap::IdeDriveWwn => "ide-drive-wwn",
            Cap::Kvm => "kvm",
            Cap::ScsiLsi => "scsi-lsi",
            Cap::MachineOpt => "machine-opt",
            Cap::MachineUsbOpt => "machine-usb-opt",
            Cap::ScsiMegasas => "scsi-megasas",
            Cap::MemMerge => "mem-merge",
            Cap::Mlock => "mlock",
            Cap::MonitorJson => "monitor-json",
            Cap::Netdev => "netdev",
            Cap::NoHpet => "no-hpet",
            Cap::NoKvmPitReinjection => "no-kvm-pit-reinjection",
            Cap::NoShutdown => "no-shutdown",
            Cap::NoUserConfig => "no-user-config",
            Cap::Nodefconfig => "nodefconfig",
            Cap::Numa => "numa",
            Cap::PciAssign => "pci-assign",
            Cap::PciBootindex => "pci-bootindex",
            Cap::PciConfigfd => "pci-configfd",
            Cap::PciBridge => "pci-bridge",
            Cap::PciMultifunction => "pci-multifunction",
            Cap::PciMultibus => "pci-multibus",
            Cap::PciRombar => "pci-rombar",
            Cap::PciRomfile => "pci-romfile",
            Cap::Rtc => "rtc",
            Cap::VirtioRng => "virtio-rng",
            Cap::SeccompSandbox => "seccomp-sandbox",
            Cap::Sga => "sga",
            Cap::SclpS390 => "sclp",
            Cap::ScsiBlock => "scsi-block",
            Cap::ScsiCd => "scsi-cd",
            Cap::ScsiDiskChannel => "scsi-disk-channel",
            Cap::ScsiDiskWwn => "scsi-disk-wwn",
            Cap::Smbios => "smbios",
            Cap::SmpTopology => "smp-topology",
            Cap::Spice => "spice",
            Cap::SoundDevice => "sound-device",
            Cap::UsbStorage => "usb-storage",
            Cap::Tdf => "tdf",
            Cap::TpmPassthrough => "tpm-passthrough",
            Cap::UsbHub => "usb-hub",
            Cap::UsbRedir => "usb-redir",
            Cap::UsbHostBootindex => "usb-host-bootindex",
            Cap::BlockioSize => "blockio-size",
            Cap::VfioPci => "vfio-pci",
            Cap::Vga => "vga",
            Cap::VgaNone => "vga-none",
            Cap::VgaQxl => "vga-qxl",
            Cap::VhostNet => "vhost-net",
            Cap::VirtioCcw => "virtio-ccw",
            Cap::VirtioBlkScsi => "virtio-blk-scsi",
            Cap::VirtioBlkSgIo => "virtio-blk-sg-io",
            Cap::VirtioS390 => "virtio-s390",
            Cap::VirtioScsi => "virtio-scsi",
            Cap::VncColon => "vnc-colon",
            Cap::VnetHdr => "vnet-hdr",
            Cap::DeviceNvram => "device-nvram",
            Cap::ObjectMemory => "object-memory",
        }
    }

    /// All recognized flags, for exhaustive iteration.
    pub fn all() -> impl Iterator<Item = Cap> {
        ALL_CAPS.iter().copied()
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Cap> {
        ALL_CAPS
            .iter()
            .find(|c| c.name() == s)
            .copied()
            .ok_or_else(|| Error::UnknownFlag(s.to_owned()))
    }
}

macro_rules! cap_list {
    ($($v:ident),* $(,)?) => {
        const ALL_CAPS: &[Cap] = &[$(Cap::$v),*];
    };
}

cap_list![
    BootMenu,
    BootRebootTimeout,
    Bootindex,
    Chardev,
    ChardevSpicevmc,
    CcidEmulated,
    CcidPassthru,
    CpuHost,
    Device,
    DeviceQxl,
    DeviceVideoPrimary,
    DisableS3,
    DisableS4,
    Drive,
    DriveAio,
    DriveCacheV2,
    DriveCacheDirectsync,
    DriveCacheUnsafe,
    DriveCopyOnRead,
    DriveDiscard,
    DriveFormat,
    DriveIotune,
    DriveReadonly,
    DriveSerial,
    DumpGuestCore,
    MemPath,
    Fsdev,
    HdaDuplex,
    HdaMicro,
    Ich9UsbEhci1,
    IdeCd,
    IdeDriveWwn,
    Kvm,
    ScsiLsi,
    MachineOpt,
    MachineUsbOpt,
    ScsiMegasas,
    MemMerge,
    Mlock,
    MonitorJson,
    Netdev,
    NoHpet,
    NoKvmPitReinjection,
    NoShutdown,
    NoUserConfig,
    Nodefconfig,
    Numa,
    PciAssign,
    PciBootindex,
    PciConfigfd,
    PciBridge,
    PciMultifunction,
    PciMultibus,
    PciRombar,
    PciRomfile,
    Rtc,
    VirtioRng,
    SeccompSandbox,
    Sga,
    SclpS390,
    ScsiBlock,
    ScsiCd,
    ScsiDiskChannel,
    ScsiDiskWwn,
    Smbios,
    SmpTopology,
    Spice,
    SoundDevice,
    UsbStorage,
    Tdf,
    TpmPassthrough,
    UsbHub,
    UsbRedir,
    UsbHostBootindex,
    BlockioSize,
    VfioPci,
    Vga,
    VgaNone,
    VgaQxl,
    VhostNet,
    VirtioCcw,
    VirtioBlkScsi,
    VirtioBlkSgIo,
    VirtioS390,
    VirtioScsi,
    VncColon,
    VnetHdr,
    DeviceNvram,
    ObjectMemory,
];

/// The set of flags one probed emulator binary advertises.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QemuCaps {
    flags: Vec<Cap>,
}

impl QemuCaps {
    pub fn new() -> QemuCaps {
        QemuCaps::default()
    }

    /// Builds a set from probe output, ignoring names we do not recognize.
    /// Unknown flags defaulting to absent is what keeps the flag universe
    /// open for the probe while staying closed for the compiler.
    pub fn from_names<'a, I: IntoIterator<Item = &'a str>>(names: I) -> QemuCaps {
        let mut caps = QemuCaps::new();
        for name in names {
            if let Ok(cap) = name.parse() {
                caps.set(cap);
            }
        }
        caps
    }

    pub fn from_caps<I: IntoIterator<Item = Cap>>(iter: I) -> QemuCaps {
        let mut caps = QemuCaps::new();
        for cap in iter {
            caps.set(cap);
        }
        caps
    }

    pub fn set(&mut self, cap: Cap) {
        if let Err(pos) = self.flags.binary_search(&cap) {
            self.flags.insert(pos, cap);
        }
    }

    pub fn clear(&mut self, cap: Cap) {
        if let Ok(pos) = self.flags.binary_search(&cap) {
            self.flags.remove(pos);
        }
    }

    pub fn has(&self, cap: Cap) -> bool {
        self.flags.binary_search(&cap).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Cap> + '_ {
        self.flags.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_query() {
        let mut caps = QemuCaps::new();
        assert!(!caps.has(Cap::Device));
        caps.set(Cap::Device);
        caps.set(Cap::Drive);
        caps.set(Cap::Device);
        assert!(caps.has(Cap::Device));
        assert!(caps.has(Cap::Drive));
        assert!(!caps.has(Cap::Netdev));
        caps.clear(Cap::Device);
        assert!(!caps.has(Cap::Device));
    }

    #[test]
    fn unknown_probe_names_are_absent() {
        let caps = QemuCaps::from_names(["device", "frobnicator", "netdev"]);
        assert!(caps.has(Cap::Device));
        assert!(caps.has(Cap::Netdev));
        assert_eq!(caps.iter().count(), 2);
    }

    #[test]
    fn names_round_trip() {
        for cap in Cap::all() {
            assert_eq!(cap.name().parse::<Cap>().unwrap(), cap);
        }
    }

    #[test]
    fn unknown_flag_error_names_the_flag() {
        let err = "no-such-flag".parse::<Cap>().unwrap_err();
        assert_eq!(err.to_string(), "unknown capability flag 'no-such-flag'");
    }
}
