// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The smaller device serializers: video, sound, input, hubs, watchdog,
//! balloon, RNG, TPM, NVRAM, USB redirection, smartcards and filesystem
//! exports.

use caps::Cap;
use caps::QemuCaps;
use domain::DeviceAddress;
use domain::Domain;
use domain::Fs;
use domain::FsAccessMode;
use domain::Hub;
use domain::Input;
use domain::InputBus;
use domain::InputKind;
use domain::Memballoon;
use domain::MemballoonModel;
use domain::Rng;
use domain::RngBackend;
use domain::Smartcard;
use domain::SmartcardMode;
use domain::Sound;
use domain::SoundCodec;
use domain::SoundModel;
use domain::Tpm;
use domain::Video;
use domain::VideoModel;
use domain::Watchdog;

use crate::builder::OptLine;
use crate::chr::chardev_id;
use crate::suffix;
use crate::Error;
use crate::Result;

/// `-vga` argument for the primary video card.
pub fn vga_arg(video: &Video, qemu_caps: &QemuCaps) -> Result<&'static str> {
    match video.model {
        VideoModel::Vga => Ok("std"),
        VideoModel::Cirrus => Ok("cirrus"),
        VideoModel::Vmvga => Ok("vmware"),
        VideoModel::Xen => Ok("xenfb"),
        VideoModel::Qxl => {
            if !qemu_caps.has(Cap::VgaQxl) {
                return Err(Error::ConfigUnsupported("qxl video".to_owned()));
            }
            Ok("qxl")
        }
    }
}

/// `-device` line for a non-primary video head (QXL only).
pub fn build_video_dev_str(video: &Video, dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    if video.model != VideoModel::Qxl {
        return Err(Error::InvalidConfig(
            "only qxl video cards can be secondary heads".to_owned(),
        ));
    }
    if !qemu_caps.has(Cap::DeviceQxl) {
        return Err(Error::ConfigUnsupported("qxl video device".to_owned()));
    }
    let mut opt = OptLine::with("qxl");
    opt.add_keyword("id", video.info.alias_or_empty());
    if let Some(vram) = video.vram {
        // The property takes bytes; the description stores KiB.
        opt.add_keyword("vram_size", (vram as u64) * 1024);
    }
    suffix::add_device_address(&mut opt, dom, &video.info, qemu_caps)?;
    Ok(opt.finish())
}

/// Sound card device lines; ICH6 brings its codec children along.
pub fn build_sound_dev_strs(
    sound: &Sound,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<Vec<String>> {
    let alias = sound.info.alias_or_empty();
    let model = match sound.model {
        SoundModel::Sb16 => "sb16",
        SoundModel::Es1370 => "ES1370",
        SoundModel::Ac97 => "AC97",
        SoundModel::Ich6 => "intel-hda",
        SoundModel::Pcspk => {
            return Err(Error::Internal(
                "the PC speaker is -soundhw only and never a device".to_owned(),
            ));
        }
    };
    let mut opt = OptLine::with(model);
    opt.add_keyword("id", alias);
    suffix::add_device_address(&mut opt, dom, &sound.info, qemu_caps)?;
    let mut lines = vec![opt.finish()];

    if sound.model == SoundModel::Ich6 {
        let codecs: &[SoundCodec] = if sound.codecs.is_empty() {
            &[SoundCodec::Duplex]
        } else {
            &sound.codecs
        };
        for (i, codec) in codecs.iter().enumerate() {
            let (name, gate) = match codec {
                SoundCodec::Duplex => ("hda-duplex", Cap::HdaDuplex),
                SoundCodec::Micro => ("hda-micro", Cap::HdaMicro),
            };
            if !qemu_caps.has(gate) {
                return Err(Error::ConfigUnsupported(format!("{} audio codec", name)));
            }
            let mut codec_opt = OptLine::with(name);
            codec_opt.add_keyword("id", format!("{}-codec{}", alias, i));
            codec_opt.add_keyword("bus", format!("{}.0", alias));
            codec_opt.add_keyword("cad", i);
            lines.push(codec_opt.finish());
        }
    }
    Ok(lines)
}

/// `-soundhw` list for emulators without sound devices, and always for
/// the PC speaker.
pub fn soundhw_arg(sounds: &[Sound]) -> String {
    sounds
        .iter()
        .map(|s| s.model.name())
        .collect::<Vec<_>>()
        .join(",")
}

/// USB input device line. PS/2 inputs are implicit on x86 and render
/// nothing.
pub fn build_input_dev_str(input: &Input, dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    if input.bus != InputBus::Usb {
        return Err(Error::Internal(
            "only USB inputs are rendered as devices".to_owned(),
        ));
    }
    let model = match input.kind {
        InputKind::Mouse => "usb-mouse",
        InputKind::Tablet => "usb-tablet",
        InputKind::Keyboard => "usb-kbd",
    };
    let mut opt = OptLine::with(model);
    opt.add_keyword("id", input.info.alias_or_empty());
    suffix::add_device_address(&mut opt, dom, &input.info, qemu_caps)?;
    Ok(opt.finish())
}

pub fn build_hub_dev_str(hub: &Hub, dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    if !qemu_caps.has(Cap::UsbHub) {
        return Err(Error::ConfigUnsupported("USB hub".to_owned()));
    }
    let mut opt = OptLine::with("usb-hub");
    opt.add_keyword("id", hub.info.alias_or_empty());
    suffix::add_device_address(&mut opt, dom, &hub.info, qemu_caps)?;
    Ok(opt.finish())
}

/// Watchdog device line; the action travels separately as
/// `-watchdog-action`.
pub fn build_watchdog_dev_str(
    watchdog: &Watchdog,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<String> {
    let mut opt = OptLine::with(watchdog.model.name());
    opt.add_keyword("id", watchdog.info.alias_or_empty());
    suffix::add_device_address(&mut opt, dom, &watchdog.info, qemu_caps)?;
    Ok(opt.finish())
}

pub fn build_balloon_dev_str(
    balloon: &Memballoon,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<Option<String>> {
    match balloon.model {
        MemballoonModel::None | MemballoonModel::Xen => Ok(None),
        MemballoonModel::Virtio => {
            let model = match &balloon.info.addr {
                DeviceAddress::Ccw(_) => "virtio-balloon-ccw",
                DeviceAddress::VioS390 => "virtio-balloon-s390",
                _ => "virtio-balloon-pci",
            };
            let mut opt = OptLine::with(model);
            opt.add_keyword("id", balloon.info.alias_or_empty());
            suffix::add_device_address(&mut opt, dom, &balloon.info, qemu_caps)?;
            Ok(Some(opt.finish()))
        }
    }
}

pub fn rng_object_id(alias: &str) -> String {
    format!("obj{}", alias)
}

/// The `-object` backend and `-device` frontend of the RNG.
pub fn build_rng_strs(rng: &Rng, dom: &Domain, qemu_caps: &QemuCaps) -> Result<(String, String)> {
    if !qemu_caps.has(Cap::VirtioRng) {
        return Err(Error::ConfigUnsupported("virtio RNG".to_owned()));
    }
    let alias = rng.info.alias_or_empty();
    let object = match &rng.backend {
        RngBackend::Random { path } => {
            let mut opt = OptLine::with("rng-random");
            opt.add_keyword("id", rng_object_id(alias));
            opt.add_keyword("filename", path.to_string_lossy());
            opt.finish()
        }
        RngBackend::Egd { .. } => {
            let mut opt = OptLine::with("rng-egd");
            opt.add_keyword("chardev", chardev_id(alias));
            opt.add_keyword("id", rng_object_id(alias));
            opt.finish()
        }
    };
    let model = match &rng.info.addr {
        DeviceAddress::Ccw(_) => "virtio-rng-ccw",
        DeviceAddress::VioS390 => "virtio-rng-s390",
        _ => "virtio-rng-pci",
    };
    let mut opt = OptLine::with(model);
    opt.add_keyword("rng", rng_object_id(alias));
    opt.add_keyword("id", alias);
    if let Some(bytes) = rng.rate_bytes {
        opt.add_keyword("max-bytes", bytes);
        opt.add_keyword("period", rng.rate_period.unwrap_or(1000));
    }
    suffix::add_device_address(&mut opt, dom, &rng.info, qemu_caps)?;
    Ok((object, opt.finish()))
}

pub fn tpm_backend_id(alias: &str) -> String {
    format!("tpm-{}", alias)
}

/// The `-tpmdev` backend and `-device tpm-tis` frontend.
pub fn build_tpm_strs(tpm: &Tpm, qemu_caps: &QemuCaps) -> Result<(String, String)> {
    if !qemu_caps.has(Cap::TpmPassthrough) {
        return Err(Error::ConfigUnsupported("TPM passthrough".to_owned()));
    }
    let alias = tpm.info.alias_or_empty();
    let mut backend = OptLine::with("passthrough");
    backend.add_keyword("id", tpm_backend_id(alias));
    backend.add_keyword("path", tpm.path.to_string_lossy());
    if let Some(cancel) = &tpm.cancel_path {
        backend.add_keyword("cancel-path", cancel.to_string_lossy());
    }
    let mut device = OptLine::with("tpm-tis");
    device.add_keyword("tpmdev", tpm_backend_id(alias));
    device.add_keyword("id", alias);
    Ok((backend.finish(), device.finish()))
}

/// The NVRAM of a pseries guest: a `-global` register assignment rather
/// than a device of its own.
pub fn nvram_global_arg(dom: &Domain, qemu_caps: &QemuCaps) -> Result<Option<String>> {
    let nvram = match &dom.nvram {
        Some(nvram) => nvram,
        None => return Ok(None),
    };
    if !qemu_caps.has(Cap::DeviceNvram) {
        return Err(Error::ConfigUnsupported("spapr NVRAM".to_owned()));
    }
    match &nvram.info.addr {
        DeviceAddress::SpaprVio(addr) => {
            let reg = addr.reg.ok_or_else(|| {
                Error::Internal("NVRAM reached rendering without a register".to_owned())
            })?;
            Ok(Some(format!("spapr-nvram.reg={:#x}", reg)))
        }
        _ => Err(Error::InvalidConfig(
            "NVRAM is only supported on the SPAPR-VIO bus".to_owned(),
        )),
    }
}

/// USB redirection: `-device usb-redir` fed by an earlier `-chardev`.
pub fn build_redirdev_dev_str(
    redirdev: &domain::Redirdev,
    qemu_caps: &QemuCaps,
) -> Result<String> {
    if !qemu_caps.has(Cap::UsbRedir) {
        return Err(Error::ConfigUnsupported("USB redirection".to_owned()));
    }
    let alias = redirdev.info.alias_or_empty();
    let mut opt = OptLine::with("usb-redir");
    opt.add_keyword("chardev", chardev_id(alias));
    opt.add_keyword("id", alias);
    Ok(opt.finish())
}

/// Smartcard device line; the passthrough flavor references an earlier
/// `-chardev`.
pub fn build_smartcard_dev_str(smartcard: &Smartcard, qemu_caps: &QemuCaps) -> Result<String> {
    let alias = smartcard.info.alias_or_empty();
    match &smartcard.mode {
        SmartcardMode::Host => {
            if !qemu_caps.has(Cap::CcidEmulated) {
                return Err(Error::ConfigUnsupported("emulated smartcard".to_owned()));
            }
            let mut opt = OptLine::with("ccid-card-emulated");
            opt.add_keyword("backend", "nss-emulated");
            opt.add_keyword("id", alias);
            Ok(opt.finish())
        }
        SmartcardMode::HostCertificates {
            certificates,
            database,
        } => {
            if !qemu_caps.has(Cap::CcidEmulated) {
                return Err(Error::ConfigUnsupported("emulated smartcard".to_owned()));
            }
            let mut opt = OptLine::with("ccid-card-emulated");
            opt.add_keyword("backend", "certificates");
            for (i, cert) in certificates.iter().enumerate() {
                opt.add_keyword(&format!("cert{}", i + 1), cert);
            }
            if let Some(database) = database {
                opt.add_keyword("db", database);
            }
            opt.add_keyword("id", alias);
            Ok(opt.finish())
        }
        SmartcardMode::Passthrough { .. } => {
            if !qemu_caps.has(Cap::CcidPassthru) {
                return Err(Error::ConfigUnsupported(
                    "smartcard passthrough".to_owned(),
                ));
            }
            let mut opt = OptLine::with("ccid-card-passthru");
            opt.add_keyword("chardev", chardev_id(alias));
            opt.add_keyword("id", alias);
            Ok(opt.finish())
        }
    }
}

pub fn fsdev_id(alias: &str) -> String {
    format!("fsdev-{}", alias)
}

/// The `-fsdev` backend and `virtio-9p` frontend of one export.
pub fn build_fs_strs(fs: &Fs, dom: &Domain, qemu_caps: &QemuCaps) -> Result<(String, String)> {
    if !qemu_caps.has(Cap::Fsdev) {
        return Err(Error::ConfigUnsupported(format!(
            "filesystem export '{}'",
            fs.dst
        )));
    }
    let alias = fs.info.alias_or_empty();
    let mut backend = OptLine::with("local");
    let security_model = match fs.accessmode {
        FsAccessMode::Passthrough => "passthrough",
        FsAccessMode::Mapped => "mapped",
        FsAccessMode::Squash => "none",
    };
    backend.add_keyword("security_model", security_model);
    backend.add_keyword("id", fsdev_id(alias));
    backend.add_keyword("path", fs.src.to_string_lossy());
    if fs.readonly {
        backend.add_keyword("readonly", "on");
    }

    let model = match &fs.info.addr {
        DeviceAddress::Ccw(_) => "virtio-9p-ccw",
        _ => "virtio-9p-pci",
    };
    let mut device = OptLine::with(model);
    device.add_keyword("id", alias);
    device.add_keyword("fsdev", fsdev_id(alias));
    device.add_keyword("mount_tag", &fs.dst);
    suffix::add_device_address(&mut device, dom, &fs.info, qemu_caps)?;
    Ok((backend.finish(), device.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceInfo;
    use domain::PciAddress;

    fn full_caps() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::Device,
            Cap::DeviceQxl,
            Cap::VgaQxl,
            Cap::HdaDuplex,
            Cap::HdaMicro,
            Cap::UsbHub,
            Cap::VirtioRng,
            Cap::TpmPassthrough,
            Cap::DeviceNvram,
            Cap::UsbRedir,
            Cap::CcidEmulated,
            Cap::CcidPassthru,
            Cap::Fsdev,
            Cap::PciMultibus,
        ])
    }

    fn info(alias: &str) -> DeviceInfo {
        DeviceInfo {
            alias: Some(alias.to_owned()),
            ..DeviceInfo::default()
        }
    }

    #[test]
    fn vga_mapping() {
        let video = Video {
            info: info("video0"),
            model: VideoModel::Cirrus,
            vram: None,
            heads: None,
        };
        assert_eq!(vga_arg(&video, &full_caps()).unwrap(), "cirrus");
    }

    #[test]
    fn secondary_qxl_device() {
        let dom = Domain::empty("t");
        let mut video = Video {
            info: info("video1"),
            model: VideoModel::Qxl,
            vram: Some(65536),
            heads: None,
        };
        video.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 7, 0));
        assert_eq!(
            build_video_dev_str(&video, &dom, &full_caps()).unwrap(),
            "qxl,id=video1,vram_size=67108864,bus=pci.0,addr=0x7"
        );
    }

    #[test]
    fn ich6_brings_codecs() {
        let dom = Domain::empty("t");
        let sound = Sound {
            info: info("sound0"),
            model: SoundModel::Ich6,
            codecs: vec![SoundCodec::Duplex, SoundCodec::Micro],
        };
        let lines = build_sound_dev_strs(&sound, &dom, &full_caps()).unwrap();
        assert_eq!(
            lines,
            vec![
                "intel-hda,id=sound0".to_owned(),
                "hda-duplex,id=sound0-codec0,bus=sound0.0,cad=0".to_owned(),
                "hda-micro,id=sound0-codec1,bus=sound0.0,cad=1".to_owned(),
            ]
        );
    }

    #[test]
    fn rng_random_backend() {
        let dom = Domain::empty("t");
        let rng = Rng {
            info: info("rng0"),
            backend: RngBackend::Random {
                path: "/dev/random".into(),
            },
            rate_bytes: Some(1024),
            rate_period: None,
        };
        let (object, device) = build_rng_strs(&rng, &dom, &full_caps()).unwrap();
        assert_eq!(object, "rng-random,id=objrng0,filename=/dev/random");
        assert_eq!(
            device,
            "virtio-rng-pci,rng=objrng0,id=rng0,max-bytes=1024,period=1000"
        );
    }

    #[test]
    fn tpm_passthrough_pair() {
        let tpm = Tpm {
            info: info("tpm0"),
            path: "/dev/tpm0".into(),
            cancel_path: None,
        };
        let (backend, device) = build_tpm_strs(&tpm, &full_caps()).unwrap();
        assert_eq!(backend, "passthrough,id=tpm-tpm0,path=/dev/tpm0");
        assert_eq!(device, "tpm-tis,tpmdev=tpm-tpm0,id=tpm0");
    }

    #[test]
    fn nvram_renders_as_global() {
        use domain::Nvram;
        use domain::SpaprVioAddress;
        let mut dom = Domain::empty("p");
        dom.nvram = Some(Nvram {
            info: DeviceInfo {
                alias: Some("nvram0".to_owned()),
                addr: DeviceAddress::SpaprVio(SpaprVioAddress { reg: Some(0x3000) }),
                ..DeviceInfo::default()
            },
        });
        assert_eq!(
            nvram_global_arg(&dom, &full_caps()).unwrap(),
            Some("spapr-nvram.reg=0x3000".to_owned())
        );
    }

    #[test]
    fn fs_export_pair() {
        let dom = Domain::empty("t");
        let fs = Fs {
            info: info("fs0"),
            src: "/export/data".into(),
            dst: "data".to_owned(),
            accessmode: FsAccessMode::Mapped,
            readonly: false,
        };
        let (backend, device) = build_fs_strs(&fs, &dom, &full_caps()).unwrap();
        assert_eq!(
            backend,
            "local,security_model=mapped,id=fsdev-fs0,path=/export/data"
        );
        assert_eq!(device, "virtio-9p-pci,id=fs0,fsdev=fsdev-fs0,mount_tag=data");
    }

    #[test]
    fn smartcard_modes() {
        let card = Smartcard {
            info: info("smartcard0"),
            mode: SmartcardMode::Passthrough {
                source: domain::CharSource::SpiceVmc,
            },
        };
        assert_eq!(
            build_smartcard_dev_str(&card, &full_caps()).unwrap(),
            "ccid-card-passthru,chardev=charsmartcard0,id=smartcard0"
        );
    }
}
