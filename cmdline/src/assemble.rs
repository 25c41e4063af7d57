// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Ordering of the final argv.
//!
//! The sequence of flags is part of the output contract: two builds of
//! the same description with the same capability set must produce
//! byte-identical argv, and the inverse parser relies on backends
//! (`-chardev`, `-netdev`, `-drive`) preceding the devices that consume
//! them.

use caps::Cap;
use caps::QemuCaps;
use domain::BootDev;
use domain::CharSource;
use domain::ConsoleTarget;
use domain::ControllerKind;
use domain::ControllerModel;
use domain::DiskBus;
use domain::DiskDevice;
use domain::Domain;
use domain::Graphics;
use domain::HostdevSource;
use domain::LifecycleAction;
use domain::NetBackend;
use domain::SoundModel;
use domain::TickPolicy;
use domain::TimerKind;
use domain::VideoModel;
use domain::VirtType;
use resources::assign_addresses;
use resources::assign_aliases;
use resources::DomainAddresses;

use crate::builder::OptLine;
use crate::chr;
use crate::chr::ChannelFrontend;
use crate::controller;
use crate::disk;
use crate::hostdev;
use crate::machine;
use crate::machine::ClockArg;
use crate::misc;
use crate::net;
use crate::Error;
use crate::InheritedFd;
use crate::QemuCommand;
use crate::Result;

/// Per-invocation knobs that are not part of the persistent description.
#[derive(Clone, Debug, Default)]
pub struct BuildConfig {
    /// Start the guest stopped (`-S`).
    pub start_paused: bool,
    /// Incoming migration URI; `stdio` redirects stdin.
    pub migrate_from: Option<String>,
    /// Saved state to resume with `-loadvm`.
    pub snapshot: Option<String>,
    /// Monitor backend; the caller owns the socket path.
    pub monitor: Option<CharSource>,
    /// `-sandbox on|off`.
    pub sandbox: Option<bool>,
}

fn default_emulator(dom: &Domain) -> String {
    match dom.os.arch.as_str() {
        "i686" => "qemu".to_owned(),
        arch => format!("qemu-system-{}", arch),
    }
}

/// Converts the boot device order into per-device boot indexes when the
/// emulator prefers them. Explicit user indexes win.
fn apply_boot_order(dom: &mut Domain) {
    let mut any_explicit = false;
    dom.for_each_info(|_, _, info| {
        if info.bootindex.is_some() {
            any_explicit = true;
        }
    });
    if any_explicit {
        return;
    }
    let boot_devs = dom.os.boot_devs.clone();
    for (i, dev) in boot_devs.iter().enumerate() {
        let index = (i + 1) as u32;
        match dev {
            BootDev::Hd => {
                if let Some(disk) = dom
                    .disks
                    .iter_mut()
                    .find(|d| d.device == DiskDevice::Disk && d.info.bootindex.is_none())
                {
                    disk.info.bootindex = Some(index);
                }
            }
            BootDev::Cdrom => {
                if let Some(disk) = dom
                    .disks
                    .iter_mut()
                    .find(|d| d.device == DiskDevice::Cdrom && d.info.bootindex.is_none())
                {
                    disk.info.bootindex = Some(index);
                }
            }
            BootDev::Fd => {
                if let Some(disk) = dom
                    .disks
                    .iter_mut()
                    .find(|d| d.device == DiskDevice::Floppy && d.info.bootindex.is_none())
                {
                    disk.info.bootindex = Some(index);
                }
            }
            BootDev::Network => {
                if let Some(net) = dom.nets.iter_mut().find(|n| n.info.bootindex.is_none()) {
                    net.info.bootindex = Some(index);
                }
            }
        }
    }
}

/// Compiles one description into an emulator invocation.
///
/// The description is mutated: addresses and aliases land in the device
/// infos, implicit bridge controllers may appear. The populated address
/// sets come back alongside the command for the live-domain state.
pub fn build_command(
    dom: &mut Domain,
    qemu_caps: &QemuCaps,
    config: &BuildConfig,
) -> Result<(QemuCommand, DomainAddresses)> {
    dom.validate().map_err(Error::Domain)?;

    let sets = assign_addresses(dom, qemu_caps)?;
    assign_aliases(dom, qemu_caps.has(Cap::Device))?;
    if qemu_caps.has(Cap::Bootindex) && qemu_caps.has(Cap::Device) {
        apply_boot_order(dom);
    }

    let use_device = qemu_caps.has(Cap::Device);
    let mut cmd = QemuCommand::default();
    let mut argv: Vec<String> = Vec::new();
    let mut push = |argv: &mut Vec<String>, flag: &str| argv.push(flag.to_owned());

    argv.push(
        dom.emulator
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| default_emulator(dom)),
    );

    push(&mut argv, "-name");
    argv.push(dom.name.clone());
    if config.start_paused {
        push(&mut argv, "-S");
    }

    let (machine_flag, machine_arg) = machine::build_machine_arg(dom, qemu_caps)?;
    argv.push(machine_flag);
    argv.push(machine_arg);

    if let Some(cpu) = machine::build_cpu_arg(dom, qemu_caps)? {
        push(&mut argv, "-cpu");
        argv.push(cpu);
    }

    if let Some(loader) = &dom.os.loader {
        push(&mut argv, "-bios");
        argv.push(loader.to_string_lossy().into_owned());
    }

    push(&mut argv, "-m");
    argv.push((dom.memory.current_kib / 1024).to_string());
    if dom.memory.hugepages {
        if !qemu_caps.has(Cap::MemPath) {
            return Err(Error::ConfigUnsupported("hugepage backing".to_owned()));
        }
        let path = dom.memory.hugepage_path.as_ref().ok_or_else(|| {
            Error::InvalidConfig("hugepage backing without a hugetlbfs mount".to_owned())
        })?;
        push(&mut argv, "-mem-prealloc");
        push(&mut argv, "-mem-path");
        argv.push(path.to_string_lossy().into_owned());
    }
    if dom.memory.locked {
        if !qemu_caps.has(Cap::Mlock) {
            return Err(Error::ConfigUnsupported("memory locking".to_owned()));
        }
        push(&mut argv, "-realtime");
        push(&mut argv, "mlock=on");
    }

    push(&mut argv, "-smp");
    argv.push(machine::build_smp_arg(dom, qemu_caps)?);

    if !dom.numa.is_empty() {
        if !qemu_caps.has(Cap::Numa) {
            return Err(Error::ConfigUnsupported("NUMA topology".to_owned()));
        }
        for (i, cell) in dom.numa.iter().enumerate() {
            push(&mut argv, "-numa");
            let mut opt = OptLine::with("node");
            opt.add_keyword("nodeid", i);
            opt.add_keyword("cpus", &cell.cpus);
            opt.add_keyword("mem", cell.mem_kib / 1024);
            argv.push(opt.finish());
        }
    }

    push(&mut argv, "-uuid");
    argv.push(dom.uuid.to_string());

    if dom.virt_type == VirtType::Xen {
        if let Some(domid) = dom.domid {
            push(&mut argv, "-xen-domid");
            argv.push(domid.to_string());
        }
    }

    if let Some(smbios) = &dom.smbios {
        if !qemu_caps.has(Cap::Smbios) {
            return Err(Error::ConfigUnsupported("SMBIOS strings".to_owned()));
        }
        push(&mut argv, "-smbios");
        let mut opt = OptLine::with("type=1");
        if let Some(v) = &smbios.manufacturer {
            opt.add_keyword("manufacturer", v);
        }
        if let Some(v) = &smbios.product {
            opt.add_keyword("product", v);
        }
        if let Some(v) = &smbios.version {
            opt.add_keyword("version", v);
        }
        if let Some(v) = &smbios.serial {
            opt.add_keyword("serial", v);
        }
        opt.add_keyword("uuid", dom.uuid);
        if let Some(v) = &smbios.family {
            opt.add_keyword("family", v);
        }
        argv.push(opt.finish());
    }

    if dom.graphics.is_empty() {
        push(&mut argv, "-nographic");
    }

    if qemu_caps.has(Cap::NoUserConfig) {
        push(&mut argv, "-no-user-config");
    } else if qemu_caps.has(Cap::Nodefconfig) {
        push(&mut argv, "-nodefconfig");
    }
    if use_device {
        push(&mut argv, "-nodefaults");
    }

    if dom.os.serial_bios {
        if !qemu_caps.has(Cap::Sga) {
            return Err(Error::ConfigUnsupported("serial BIOS output".to_owned()));
        }
        push(&mut argv, "-device");
        push(&mut argv, "sga");
    }

    if let Some(monitor) = &config.monitor {
        if qemu_caps.has(Cap::Chardev) {
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(monitor, "monitor", qemu_caps)?);
            push(&mut argv, "-mon");
            let mode = if qemu_caps.has(Cap::MonitorJson) {
                "control"
            } else {
                "readline"
            };
            argv.push(format!("chardev=charmonitor,id=monitor,mode={}", mode));
        } else {
            push(&mut argv, "-monitor");
            argv.push(chr::build_chr_arg_str(monitor)?);
        }
    }

    match machine::build_clock_arg(dom, qemu_caps)? {
        ClockArg::Rtc(arg) => {
            push(&mut argv, "-rtc");
            argv.push(arg);
        }
        ClockArg::Localtime => push(&mut argv, "-localtime"),
        ClockArg::None => {}
    }

    if let Some(pit) = dom.clock.timer(TimerKind::Pit) {
        match pit.tickpolicy {
            Some(TickPolicy::Delay) if qemu_caps.has(Cap::NoKvmPitReinjection) => {
                push(&mut argv, "-no-kvm-pit-reinjection");
            }
            Some(TickPolicy::Discard) if qemu_caps.has(Cap::Tdf) => {
                push(&mut argv, "-tdf");
            }
            _ => {}
        }
    }
    if let Some(hpet) = dom.clock.timer(TimerKind::Hpet) {
        if hpet.present == Some(false) && qemu_caps.has(Cap::NoHpet) {
            push(&mut argv, "-no-hpet");
        }
    }

    let all_destroy = dom.lifecycle.on_reboot == LifecycleAction::Destroy
        && dom.lifecycle.on_poweroff == LifecycleAction::Destroy
        && dom.lifecycle.on_crash == LifecycleAction::Destroy;
    if all_destroy {
        push(&mut argv, "-no-reboot");
    } else if qemu_caps.has(Cap::NoShutdown) {
        push(&mut argv, "-no-shutdown");
    }

    if dom.is_x86() && !dom.features.acpi {
        push(&mut argv, "-no-acpi");
    }

    if let Some(disable) = dom.pm.disable_s3 {
        if !qemu_caps.has(Cap::DisableS3) {
            return Err(Error::ConfigUnsupported("S3 state control".to_owned()));
        }
        push(&mut argv, "-global");
        argv.push(format!("PIIX4_PM.disable_s3={}", disable as u8));
    }
    if let Some(disable) = dom.pm.disable_s4 {
        if !qemu_caps.has(Cap::DisableS4) {
            return Err(Error::ConfigUnsupported("S4 state control".to_owned()));
        }
        push(&mut argv, "-global");
        argv.push(format!("PIIX4_PM.disable_s4={}", disable as u8));
    }

    if let Some(boot) = machine::build_boot_arg(dom, qemu_caps)? {
        push(&mut argv, "-boot");
        argv.push(boot);
    }

    if let Some(kernel) = &dom.os.kernel {
        push(&mut argv, "-kernel");
        argv.push(kernel.to_string_lossy().into_owned());
    }
    if let Some(initrd) = &dom.os.initrd {
        push(&mut argv, "-initrd");
        argv.push(initrd.to_string_lossy().into_owned());
    }
    if let Some(cmdline) = &dom.os.cmdline {
        push(&mut argv, "-append");
        argv.push(cmdline.clone());
    }
    if let Some(dtb) = &dom.os.dtb {
        push(&mut argv, "-dtb");
        argv.push(dtb.to_string_lossy().into_owned());
    }

    // Controllers, in the fixed bus order. Buses must exist before the
    // devices that plug into them.
    for kind in [
        ControllerKind::Pci,
        ControllerKind::Usb,
        ControllerKind::Scsi,
        ControllerKind::Sata,
        ControllerKind::VirtioSerial,
        ControllerKind::Ccid,
    ] {
        for ctrl in dom.controllers.iter().filter(|c| c.kind == kind) {
            match kind {
                ControllerKind::Pci => {
                    // The root bus is the machine itself.
                    if ctrl.idx == 0 || ctrl.model == Some(ControllerModel::PciRoot) {
                        continue;
                    }
                    push(&mut argv, "-device");
                    argv.push(controller::build_controller_dev_str(ctrl, dom, qemu_caps)?);
                }
                ControllerKind::Usb => {
                    if ctrl.model.is_none() {
                        // The default controller keeps the historical flag.
                        push(&mut argv, "-usb");
                    } else if use_device {
                        push(&mut argv, "-device");
                        argv.push(controller::build_controller_dev_str(ctrl, dom, qemu_caps)?);
                    } else {
                        push(&mut argv, "-usb");
                    }
                }
                _ => {
                    if use_device {
                        push(&mut argv, "-device");
                        argv.push(controller::build_controller_dev_str(ctrl, dom, qemu_caps)?);
                    }
                }
            }
        }
    }

    for hub in &dom.hubs {
        if use_device {
            push(&mut argv, "-device");
            argv.push(misc::build_hub_dev_str(hub, dom, qemu_caps)?);
        }
    }

    for d in &dom.disks {
        if !qemu_caps.has(Cap::Drive) {
            return Err(Error::ConfigUnsupported("disk devices".to_owned()));
        }
        push(&mut argv, "-drive");
        argv.push(disk::build_drive_str(d, qemu_caps)?);
        if use_device {
            if d.bus == DiskBus::Fdc {
                let addr = d.info.addr.drive().copied().unwrap_or_default();
                let slot = match addr.unit {
                    0 => "driveA",
                    1 => "driveB",
                    _ => {
                        return Err(Error::InvalidConfig(format!(
                            "floppy '{}' has unit {} but the controller seats two",
                            d.dst, addr.unit
                        )));
                    }
                };
                push(&mut argv, "-global");
                argv.push(format!(
                    "isa-fdc.{}={}",
                    slot,
                    disk::drive_id(d.info.alias_or_empty())
                ));
            } else {
                push(&mut argv, "-device");
                argv.push(disk::build_disk_device_str(d, dom, qemu_caps)?);
            }
        }
    }

    for fs in &dom.filesystems {
        let (backend, device) = misc::build_fs_strs(fs, dom, qemu_caps)?;
        push(&mut argv, "-fsdev");
        argv.push(backend);
        push(&mut argv, "-device");
        argv.push(device);
    }

    let use_netdev = qemu_caps.has(Cap::Netdev) && use_device;
    for (i, n) in dom.nets.iter().enumerate() {
        if let NetBackend::Tap { fds, vhost_fds, .. } = &n.backend {
            for fd in fds.iter().chain(vhost_fds.iter()) {
                cmd.fds.push(InheritedFd {
                    fd: *fd,
                    close_in_parent: true,
                });
            }
        }
        if use_netdev {
            push(&mut argv, "-netdev");
            argv.push(net::build_host_net_str(n, qemu_caps, None)?);
            push(&mut argv, "-device");
            argv.push(net::build_nic_dev_str(n, dom, qemu_caps)?);
        } else {
            let vlan = i as u32;
            push(&mut argv, "-net");
            argv.push(net::build_nic_str(n, vlan)?);
            push(&mut argv, "-net");
            argv.push(net::build_host_net_str(n, qemu_caps, Some(vlan))?);
        }
    }

    for card in &dom.smartcards {
        if let domain::SmartcardMode::Passthrough { source } = &card.mode {
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(
                source,
                card.info.alias_or_empty(),
                qemu_caps,
            )?);
        }
        push(&mut argv, "-device");
        argv.push(misc::build_smartcard_dev_str(card, qemu_caps)?);
    }

    for serial in &dom.serials {
        if qemu_caps.has(Cap::Chardev) && use_device {
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(
                &serial.source,
                serial.info.alias_or_empty(),
                qemu_caps,
            )?);
            push(&mut argv, "-device");
            argv.push(chr::build_serial_dev_str(serial, dom, qemu_caps)?);
        } else {
            push(&mut argv, "-serial");
            argv.push(chr::build_chr_arg_str(&serial.source)?);
        }
    }

    for parallel in &dom.parallels {
        if qemu_caps.has(Cap::Chardev) && use_device {
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(
                &parallel.source,
                parallel.info.alias_or_empty(),
                qemu_caps,
            )?);
            push(&mut argv, "-device");
            argv.push(chr::build_parallel_dev_str(parallel.info.alias_or_empty()));
        } else {
            push(&mut argv, "-parallel");
            argv.push(chr::build_chr_arg_str(&parallel.source)?);
        }
    }

    for channel in &dom.channels {
        push(&mut argv, "-chardev");
        argv.push(chr::build_chardev_str(
            &channel.source,
            channel.info.alias_or_empty(),
            qemu_caps,
        )?);
        match chr::build_channel_frontend(channel, dom, qemu_caps)? {
            ChannelFrontend::Device(device) => {
                push(&mut argv, "-device");
                argv.push(device);
            }
            ChannelFrontend::GuestFwdNetdev(netdev) => {
                push(&mut argv, "-netdev");
                argv.push(netdev);
            }
        }
    }

    for console in &dom.consoles {
        if console.target == ConsoleTarget::Serial {
            // The primary console of a PC guest is its first serial port.
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(
                &console.source,
                console.info.alias_or_empty(),
                qemu_caps,
            )?);
            push(&mut argv, "-device");
            let serial = domain::Serial {
                info: console.info.clone(),
                source: console.source.clone(),
                target_port: console.target_port,
            };
            argv.push(chr::build_serial_dev_str(&serial, dom, qemu_caps)?);
        } else {
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(
                &console.source,
                console.info.alias_or_empty(),
                qemu_caps,
            )?);
            push(&mut argv, "-device");
            argv.push(chr::build_console_dev_str(console, dom, qemu_caps)?);
        }
    }

    if let Some(tpm) = &dom.tpm {
        let (backend, device) = misc::build_tpm_strs(tpm, qemu_caps)?;
        push(&mut argv, "-tpmdev");
        argv.push(backend);
        push(&mut argv, "-device");
        argv.push(device);
    }

    for input in &dom.inputs {
        if input.bus == domain::InputBus::Usb {
            if use_device {
                push(&mut argv, "-device");
                argv.push(misc::build_input_dev_str(input, dom, qemu_caps)?);
            } else {
                push(&mut argv, "-usbdevice");
                argv.push(
                    match input.kind {
                        domain::InputKind::Mouse => "mouse",
                        domain::InputKind::Tablet => "tablet",
                        domain::InputKind::Keyboard => "keyboard",
                    }
                    .to_owned(),
                );
            }
        }
    }

    for graphics in &dom.graphics {
        match graphics {
            Graphics::Vnc {
                port,
                autoport,
                listen,
                socket,
                keymap,
            } => {
                push(&mut argv, "-vnc");
                let arg = if let Some(socket) = socket {
                    format!("unix:{}", socket.to_string_lossy())
                } else {
                    let display = if *autoport || *port < 5900 {
                        0
                    } else {
                        port - 5900
                    };
                    let listen = listen.as_deref().unwrap_or("127.0.0.1");
                    if !qemu_caps.has(Cap::VncColon) {
                        display.to_string()
                    } else {
                        format!("{}:{}", listen, display)
                    }
                };
                argv.push(arg);
                if let Some(keymap) = keymap {
                    push(&mut argv, "-k");
                    argv.push(keymap.clone());
                }
            }
            Graphics::Spice {
                port,
                tls_port,
                listen,
            } => {
                if !qemu_caps.has(Cap::Spice) {
                    return Err(Error::ConfigUnsupported("spice graphics".to_owned()));
                }
                push(&mut argv, "-spice");
                let mut opt = OptLine::new();
                opt.add_literal(&format!("port={}", port));
                if *tls_port > 0 {
                    opt.add_keyword("tls-port", *tls_port);
                }
                if let Some(listen) = listen {
                    opt.add_keyword("addr", listen);
                }
                argv.push(opt.finish());
            }
            Graphics::Sdl {
                fullscreen,
                display,
                xauth,
            } => {
                if let Some(display) = display {
                    cmd.env.push(("DISPLAY".to_owned(), display.clone()));
                }
                if let Some(xauth) = xauth {
                    cmd.env.push(("XAUTHORITY".to_owned(), xauth.clone()));
                }
                if *fullscreen {
                    push(&mut argv, "-full-screen");
                }
                push(&mut argv, "-sdl");
            }
        }
    }

    if let Some(primary) = dom.videos.first() {
        if !qemu_caps.has(Cap::Vga) {
            return Err(Error::ConfigUnsupported("video devices".to_owned()));
        }
        push(&mut argv, "-vga");
        argv.push(misc::vga_arg(primary, qemu_caps)?.to_owned());
        if primary.model == VideoModel::Qxl {
            if let Some(vram) = primary.vram {
                push(&mut argv, "-global");
                argv.push(format!("qxl-vga.vram_size={}", (vram as u64) * 1024));
            }
        }
    } else if !dom.graphics.is_empty() && qemu_caps.has(Cap::VgaNone) {
        push(&mut argv, "-vga");
        push(&mut argv, "none");
    }
    for video in dom.videos.iter().skip(1) {
        push(&mut argv, "-device");
        argv.push(misc::build_video_dev_str(video, dom, qemu_caps)?);
    }

    if !dom.sounds.is_empty() {
        if use_device && qemu_caps.has(Cap::SoundDevice) {
            let mut has_pcspk = false;
            for sound in &dom.sounds {
                if sound.model == SoundModel::Pcspk {
                    // The PC speaker never grew a device model.
                    has_pcspk = true;
                    continue;
                }
                for line in misc::build_sound_dev_strs(sound, dom, qemu_caps)? {
                    push(&mut argv, "-device");
                    argv.push(line);
                }
            }
            if has_pcspk {
                push(&mut argv, "-soundhw");
                push(&mut argv, "pcspk");
            }
        } else {
            push(&mut argv, "-soundhw");
            argv.push(misc::soundhw_arg(&dom.sounds));
        }
    }

    if let Some(watchdog) = &dom.watchdog {
        if use_device {
            push(&mut argv, "-device");
            argv.push(misc::build_watchdog_dev_str(watchdog, dom, qemu_caps)?);
        } else {
            push(&mut argv, "-watchdog");
            argv.push(watchdog.model.name().to_owned());
        }
        push(&mut argv, "-watchdog-action");
        argv.push(watchdog.action.name().to_owned());
    }

    for redirdev in &dom.redirdevs {
        push(&mut argv, "-chardev");
        argv.push(chr::build_chardev_str(
            &redirdev.source,
            redirdev.info.alias_or_empty(),
            qemu_caps,
        )?);
        push(&mut argv, "-device");
        argv.push(misc::build_redirdev_dev_str(redirdev, qemu_caps)?);
    }

    let mut has_vfio = false;
    for dev in &dom.hostdevs {
        if let HostdevSource::Scsi { .. } = dev.source {
            push(&mut argv, "-drive");
            argv.push(hostdev::build_scsi_hostdev_drive_str(dev)?);
        }
        if let Some(configfd) = dev.configfd {
            cmd.fds.push(InheritedFd {
                fd: configfd,
                close_in_parent: true,
            });
        }
        if matches!(dev.source, HostdevSource::Pci { .. }) {
            let vfio = match dev.backend {
                domain::PciPassthroughBackend::Vfio => true,
                domain::PciPassthroughBackend::Kvm => false,
                domain::PciPassthroughBackend::Default => qemu_caps.has(Cap::VfioPci),
            };
            has_vfio = has_vfio || vfio;
        }
        push(&mut argv, "-device");
        argv.push(hostdev::build_hostdev_dev_str(dev, dom, qemu_caps)?);
    }

    if let Some(uri) = &config.migrate_from {
        push(&mut argv, "-incoming");
        argv.push(uri.clone());
        cmd.stdin_migration = uri == "stdio";
    }

    if let Some(balloon) = &dom.memballoon {
        if use_device {
            if let Some(device) = misc::build_balloon_dev_str(balloon, dom, qemu_caps)? {
                push(&mut argv, "-device");
                argv.push(device);
            }
        } else if balloon.model == domain::MemballoonModel::Virtio {
            push(&mut argv, "-balloon");
            push(&mut argv, "virtio");
        }
    }

    if let Some(rng) = &dom.rng {
        if let domain::RngBackend::Egd { source } = &rng.backend {
            push(&mut argv, "-chardev");
            argv.push(chr::build_chardev_str(
                source,
                rng.info.alias_or_empty(),
                qemu_caps,
            )?);
        }
        let (object, device) = misc::build_rng_strs(rng, dom, qemu_caps)?;
        push(&mut argv, "-object");
        argv.push(object);
        push(&mut argv, "-device");
        argv.push(device);
    }

    if let Some(global) = misc::nvram_global_arg(dom, qemu_caps)? {
        push(&mut argv, "-global");
        argv.push(global);
    }

    if let Some(snapshot) = &config.snapshot {
        push(&mut argv, "-loadvm");
        argv.push(snapshot.clone());
    }

    for arg in &dom.extra.args {
        argv.push(arg.clone());
    }
    for (name, value) in &dom.extra.env {
        cmd.env.push((name.clone(), value.clone()));
    }

    if let Some(sandbox) = config.sandbox {
        if !qemu_caps.has(Cap::SeccompSandbox) {
            return Err(Error::ConfigUnsupported("seccomp sandbox".to_owned()));
        }
        push(&mut argv, "-sandbox");
        push(&mut argv, if sandbox { "on" } else { "off" });
    }

    if dom.sounds.is_empty() {
        cmd.env
            .push(("QEMU_AUDIO_DRV".to_owned(), "none".to_owned()));
    }

    if dom.memory.locked {
        cmd.max_memlock = Some(u64::MAX);
    } else if has_vfio {
        // All guest memory may be pinned for the IOMMU, plus room for the
        // device's own mappings.
        cmd.max_memlock = Some((dom.memory.max_kib + 1048576) * 1024);
    }

    cmd.argv = argv;
    Ok((cmd, sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use caps::QemuCaps;
    use domain::DeviceInfo;
    use domain::Disk;
    use domain::DiskSource;
    use domain::IoTune;
    use domain::MacAddress;
    use domain::Net;

    pub(crate) fn scenario_caps() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::Device,
            Cap::Drive,
            Cap::DriveFormat,
            Cap::DriveReadonly,
            Cap::Netdev,
            Cap::MachineOpt,
            Cap::VirtioBlkScsi,
            Cap::PciMultibus,
            Cap::Bootindex,
            Cap::IdeCd,
            Cap::VirtioCcw,
            Cap::NoUserConfig,
        ])
    }

    fn disk(dst: &str, bus: DiskBus, path: &str, format: &str) -> Disk {
        Disk {
            info: DeviceInfo::default(),
            dst: dst.to_owned(),
            bus,
            device: DiskDevice::Disk,
            src: DiskSource::File { path: path.into() },
            format: Some(format.to_owned()),
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

    pub(crate) fn minimal_pc() -> Domain {
        let mut dom = Domain::empty("guest");
        dom.os.arch = "x86_64".to_owned();
        dom.os.machine = "pc".to_owned();
        dom.virt_type = VirtType::Kvm;
        dom.vcpus = 1;
        dom.max_vcpus = 1;
        dom.memory.current_kib = 512 * 1024;
        dom.memory.max_kib = 512 * 1024;
        dom.disks
            .push(disk("vda", DiskBus::Virtio, "/var/img.qcow2", "qcow2"));
        dom.nets.push(Net {
            info: DeviceInfo::default(),
            mac: "52:54:00:e5:48:58".parse::<MacAddress>().ok(),
            model: Some("virtio".to_owned()),
            backend: NetBackend::User,
        });
        dom
    }

    fn args_of(cmd: &QemuCommand) -> Vec<&str> {
        cmd.argv.iter().map(|s| s.as_str()).collect()
    }

    fn has_pair(cmd: &QemuCommand, flag: &str, value: &str) -> bool {
        cmd.argv
            .windows(2)
            .any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn minimal_pc_invocation() {
        let mut dom = minimal_pc();
        let (cmd, sets) =
            build_command(&mut dom, &scenario_caps(), &BuildConfig::default()).unwrap();
        assert!(sets.pci.is_some());
        assert!(has_pair(&cmd, "-machine", "pc,accel=kvm"), "{:?}", cmd.argv);
        assert!(has_pair(&cmd, "-m", "512"));
        assert!(has_pair(&cmd, "-smp", "1"));
        assert!(has_pair(
            &cmd,
            "-drive",
            "file=/var/img.qcow2,if=none,id=drive-virtio-disk0,format=qcow2"
        ));
        assert!(has_pair(
            &cmd,
            "-device",
            "virtio-blk-pci,scsi=off,bus=pci.0,addr=0x3,drive=drive-virtio-disk0,id=virtio-disk0"
        ));
        assert!(has_pair(&cmd, "-netdev", "user,id=hostnet0"));
        assert!(has_pair(
            &cmd,
            "-device",
            "virtio-net-pci,netdev=hostnet0,id=net0,mac=52:54:00:e5:48:58,bus=pci.0,addr=0x4"
        ));
    }

    #[test]
    fn build_is_deterministic() {
        let caps = scenario_caps();
        let mut a = minimal_pc();
        let mut b = minimal_pc();
        let (cmd_a, _) = build_command(&mut a, &caps, &BuildConfig::default()).unwrap();
        let (cmd_b, _) = build_command(&mut b, &caps, &BuildConfig::default()).unwrap();
        assert_eq!(cmd_a.argv, cmd_b.argv);
        assert_eq!(cmd_a.env, cmd_b.env);
    }

    #[test]
    fn ide_cdrom_boot_scenario() {
        let mut dom = Domain::empty("guest");
        dom.os.arch = "x86_64".to_owned();
        dom.os.machine = "pc".to_owned();
        dom.virt_type = VirtType::Kvm;
        dom.memory.current_kib = 512 * 1024;
        dom.memory.max_kib = 512 * 1024;
        let mut cdrom = disk("hdc", DiskBus::Ide, "/iso.img", "raw");
        cdrom.device = DiskDevice::Cdrom;
        cdrom.readonly = true;
        dom.disks.push(cdrom);
        dom.os.boot_devs = vec![BootDev::Cdrom];
        let (cmd, _) = build_command(&mut dom, &scenario_caps(), &BuildConfig::default()).unwrap();
        assert!(has_pair(
            &cmd,
            "-drive",
            "file=/iso.img,if=none,id=drive-ide0-1-0,readonly=on,media=cdrom,format=raw"
        ));
        assert!(has_pair(
            &cmd,
            "-device",
            "ide-cd,bus=ide.1,unit=0,drive=drive-ide0-1-0,id=ide0-1-0,bootindex=1"
        ));
        // Boot order moved onto the device, so no -boot argument remains.
        assert!(!args_of(&cmd).contains(&"-boot"));
    }

    #[test]
    fn s390_ccw_scenario() {
        let mut dom = Domain::empty("guest");
        dom.os.arch = "s390x".to_owned();
        dom.os.machine = "s390-ccw-virtio".to_owned();
        dom.virt_type = VirtType::Kvm;
        dom.memory.current_kib = 512 * 1024;
        dom.memory.max_kib = 512 * 1024;
        dom.disks
            .push(disk("vda", DiskBus::Virtio, "/var/img.qcow2", "qcow2"));
        dom.nets.push(Net {
            info: DeviceInfo::default(),
            mac: "52:54:00:aa:bb:cc".parse::<MacAddress>().ok(),
            model: Some("virtio".to_owned()),
            backend: NetBackend::User,
        });
        let (cmd, sets) =
            build_command(&mut dom, &scenario_caps(), &BuildConfig::default()).unwrap();
        assert!(sets.ccw.is_some());
        assert!(sets.pci.is_none());
        let devices: Vec<&String> = cmd
            .argv
            .windows(2)
            .filter(|w| w[0] == "-device")
            .map(|w| &w[1])
            .collect();
        assert!(
            devices
                .iter()
                .any(|d| d.starts_with("virtio-blk-ccw,devno=fe.0.0000,")),
            "{:?}",
            devices
        );
        assert!(
            devices
                .iter()
                .any(|d| d.contains("virtio-net-ccw") && d.contains("devno=fe.0.0001")),
            "{:?}",
            devices
        );
    }

    #[test]
    fn controllers_precede_their_disks() {
        let mut dom = minimal_pc();
        dom.disks
            .push(disk("sda", DiskBus::Scsi, "/scsi.img", "raw"));
        dom.add_implicit_controllers();
        dom.controllers
            .iter_mut()
            .find(|c| c.kind == ControllerKind::Scsi)
            .unwrap()
            .model = Some(ControllerModel::LsiLogic);
        let mut caps = scenario_caps();
        caps.set(Cap::ScsiLsi);
        caps.set(Cap::ScsiCd);
        let (cmd, _) = build_command(&mut dom, &caps, &BuildConfig::default()).unwrap();
        let controller_pos = cmd
            .argv
            .iter()
            .position(|a| a.starts_with("lsi,"))
            .expect("controller rendered");
        let disk_pos = cmd
            .argv
            .iter()
            .position(|a| a.starts_with("scsi-hd,"))
            .expect("disk rendered");
        assert!(controller_pos < disk_pos);
    }

    #[test]
    fn vfio_hostdev_raises_memlock() {
        use domain::Hostdev;
        use domain::HostPciAddress;
        use domain::PciPassthroughBackend;
        let mut dom = minimal_pc();
        dom.hostdevs.push(Hostdev {
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
        });
        let mut caps = scenario_caps();
        caps.set(Cap::VfioPci);
        let (cmd, _) = build_command(&mut dom, &caps, &BuildConfig::default()).unwrap();
        assert_eq!(
            cmd.max_memlock,
            Some((512 * 1024 + 1048576) * 1024),
        );
    }

    #[test]
    fn migration_from_stdio_flags_stdin() {
        let mut dom = minimal_pc();
        let config = BuildConfig {
            migrate_from: Some("stdio".to_owned()),
            ..BuildConfig::default()
        };
        let (cmd, _) = build_command(&mut dom, &scenario_caps(), &config).unwrap();
        assert!(cmd.stdin_migration);
        assert!(has_pair(&cmd, "-incoming", "stdio"));
    }

    #[test]
    fn tap_fds_are_inherited() {
        let mut dom = minimal_pc();
        dom.nets[0].backend = NetBackend::Tap {
            ifname: None,
            fds: vec![23, 24],
            vhost: None,
            vhost_fds: Vec::new(),
        };
        let (cmd, _) = build_command(&mut dom, &scenario_caps(), &BuildConfig::default()).unwrap();
        let fds: Vec<i32> = cmd.fds.iter().map(|f| f.fd).collect();
        assert_eq!(fds, vec![23, 24]);
        assert!(cmd.fds.iter().all(|f| f.close_in_parent));
    }

    #[test]
    fn chardev_precedes_consuming_device() {
        use domain::Channel;
        use domain::ChannelTarget;
        let mut dom = minimal_pc();
        dom.channels.push(Channel {
            info: DeviceInfo::default(),
            source: CharSource::Unix {
                path: "/run/agent.sock".into(),
                listen: true,
            },
            target: ChannelTarget::VirtioSerial {
                name: Some("org.qemu.guest_agent.0".to_owned()),
            },
        });
        dom.add_implicit_controllers();
        let mut caps = scenario_caps();
        caps.set(Cap::Chardev);
        let (cmd, _) = build_command(&mut dom, &caps, &BuildConfig::default()).unwrap();
        let chardev_pos = cmd
            .argv
            .iter()
            .position(|a| a.starts_with("socket,id=charchannel0"))
            .expect("chardev rendered");
        let device_pos = cmd
            .argv
            .iter()
            .position(|a| a.starts_with("virtserialport,"))
            .expect("frontend rendered");
        assert!(chardev_pos < device_pos);
    }
}
