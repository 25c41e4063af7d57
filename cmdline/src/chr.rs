// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Character device rendering: `-chardev` backends, their frontend
//! `-device` lines, and the legacy single-argument spellings.

use caps::Cap;
use caps::QemuCaps;
use domain::Channel;
use domain::ChannelTarget;
use domain::CharSource;
use domain::Console;
use domain::ConsoleTarget;
use domain::DeviceAddress;
use domain::Domain;
use domain::Serial;

use crate::builder::OptLine;
use crate::suffix;
use crate::Error;
use crate::Result;

pub fn chardev_id(alias: &str) -> String {
    format!("char{}", alias)
}

/// The `-chardev` backend option string.
pub fn build_chardev_str(
    source: &CharSource,
    alias: &str,
    qemu_caps: &QemuCaps,
) -> Result<String> {
    let id = chardev_id(alias);
    let mut opt = OptLine::new();
    match source {
        CharSource::Null => {
            opt.add_literal("null");
            opt.add_keyword("id", &id);
        }
        CharSource::Vc => {
            opt.add_literal("vc");
            opt.add_keyword("id", &id);
        }
        CharSource::Pty => {
            opt.add_literal("pty");
            opt.add_keyword("id", &id);
        }
        CharSource::Stdio => {
            opt.add_literal("stdio");
            opt.add_keyword("id", &id);
        }
        CharSource::Dev { path } => {
            opt.add_literal("tty");
            opt.add_keyword("id", &id);
            opt.add_keyword("path", path.to_string_lossy());
        }
        CharSource::Parport { path } => {
            opt.add_literal("parport");
            opt.add_keyword("id", &id);
            opt.add_keyword("path", path.to_string_lossy());
        }
        CharSource::File { path } => {
            opt.add_literal("file");
            opt.add_keyword("id", &id);
            opt.add_keyword("path", path.to_string_lossy());
        }
        CharSource::Pipe { path } => {
            opt.add_literal("pipe");
            opt.add_keyword("id", &id);
            opt.add_keyword("path", path.to_string_lossy());
        }
        CharSource::Udp {
            host,
            service,
            bind_host,
            bind_service,
        } => {
            opt.add_literal("udp");
            opt.add_keyword("id", &id);
            opt.add_keyword("host", host);
            opt.add_keyword("port", service);
            opt.add_keyword("localaddr", bind_host);
            opt.add_keyword("localport", bind_service);
        }
        CharSource::Tcp {
            host,
            service,
            listen,
            telnet,
        } => {
            opt.add_literal("socket");
            opt.add_keyword("id", &id);
            opt.add_keyword("host", host);
            opt.add_keyword("port", service);
            if *telnet {
                opt.add_flag("telnet");
            }
            if *listen {
                opt.add_flag("server").add_flag("nowait");
            }
        }
        CharSource::Unix { path, listen } => {
            opt.add_literal("socket");
            opt.add_keyword("id", &id);
            opt.add_keyword("path", path.to_string_lossy());
            if *listen {
                opt.add_flag("server").add_flag("nowait");
            }
        }
        CharSource::SpiceVmc => {
            if !qemu_caps.has(Cap::ChardevSpicevmc) {
                return Err(Error::ConfigUnsupported(format!(
                    "spice agent channel '{}'",
                    alias
                )));
            }
            opt.add_literal("spicevmc");
            opt.add_keyword("id", &id);
            opt.add_keyword("name", "vdagent");
        }
    }
    Ok(opt.finish())
}

/// The legacy one-argument spelling used by `-serial`, `-parallel` and
/// `-monitor` on emulators without `-chardev`.
pub fn build_chr_arg_str(source: &CharSource) -> Result<String> {
    Ok(match source {
        CharSource::Null => "null".to_owned(),
        CharSource::Vc => "vc".to_owned(),
        CharSource::Pty => "pty".to_owned(),
        CharSource::Stdio => "stdio".to_owned(),
        CharSource::Dev { path } | CharSource::Parport { path } => {
            path.to_string_lossy().into_owned()
        }
        CharSource::File { path } => format!("file:{}", path.to_string_lossy()),
        CharSource::Pipe { path } => format!("pipe:{}", path.to_string_lossy()),
        CharSource::Udp {
            host,
            service,
            bind_host,
            bind_service,
        } => format!("udp:{}:{}@{}:{}", host, service, bind_host, bind_service),
        CharSource::Tcp {
            host,
            service,
            listen,
            telnet,
        } => {
            let scheme = if *telnet { "telnet" } else { "tcp" };
            let server = if *listen { ",server,nowait" } else { "" };
            format!("{}:{}:{}{}", scheme, host, service, server)
        }
        CharSource::Unix { path, listen } => {
            let server = if *listen { ",server,nowait" } else { "" };
            format!("unix:{}{}", path.to_string_lossy(), server)
        }
        CharSource::SpiceVmc => {
            return Err(Error::ConfigUnsupported(
                "spice agent channel without -chardev".to_owned(),
            ));
        }
    })
}

/// The serial frontend: ISA UART on PCs, `spapr-vty` on pseries.
pub fn build_serial_dev_str(serial: &Serial, dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    let alias = serial.info.alias_or_empty();
    let mut opt = if dom.is_ppc64() && dom.machine_is_pseries() {
        let mut opt = OptLine::with("spapr-vty");
        opt.add_keyword("chardev", chardev_id(alias));
        if let DeviceAddress::SpaprVio(addr) = &serial.info.addr {
            if let Some(reg) = addr.reg {
                opt.add_keyword("reg", format!("{:#x}", reg));
            }
        }
        return Ok(opt.finish());
    } else {
        let mut opt = OptLine::with("isa-serial");
        opt.add_keyword("chardev", chardev_id(alias));
        opt.add_keyword("id", alias);
        opt
    };
    suffix::add_device_address(&mut opt, dom, &serial.info, qemu_caps)?;
    Ok(opt.finish())
}

/// The parallel port frontend.
pub fn build_parallel_dev_str(alias: &str) -> String {
    let mut opt = OptLine::with("isa-parallel");
    opt.add_keyword("chardev", chardev_id(alias));
    opt.add_keyword("id", alias);
    opt.finish()
}

/// The console frontend for non-serial targets.
pub fn build_console_dev_str(
    console: &Console,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<String> {
    let alias = console.info.alias_or_empty();
    let model = match console.target {
        ConsoleTarget::Virtio => "virtconsole",
        ConsoleTarget::Sclp => {
            if !qemu_caps.has(Cap::SclpS390) {
                return Err(Error::ConfigUnsupported(format!("SCLP console '{}'", alias)));
            }
            "sclpconsole"
        }
        ConsoleTarget::SclpLm => {
            if !qemu_caps.has(Cap::SclpS390) {
                return Err(Error::ConfigUnsupported(format!("SCLP console '{}'", alias)));
            }
            "sclplmconsole"
        }
        ConsoleTarget::Serial => {
            return Err(Error::Internal(format!(
                "serial-target console '{}' reached the console serializer",
                alias
            )));
        }
    };
    let mut opt = OptLine::with(model);
    if console.target == ConsoleTarget::Virtio {
        suffix::add_device_address(&mut opt, dom, &console.info, qemu_caps)?;
    }
    opt.add_keyword("chardev", chardev_id(alias));
    opt.add_keyword("id", alias);
    Ok(opt.finish())
}

/// The channel frontend. A guestfwd channel is not a device at all but a
/// user-net forward rule.
pub enum ChannelFrontend {
    Device(String),
    GuestFwdNetdev(String),
}

pub fn build_channel_frontend(
    channel: &Channel,
    dom: &Domain,
    qemu_caps: &QemuCaps,
) -> Result<ChannelFrontend> {
    let alias = channel.info.alias_or_empty();
    match &channel.target {
        ChannelTarget::VirtioSerial { name } => {
            let mut opt = OptLine::with("virtserialport");
            suffix::add_device_address(&mut opt, dom, &channel.info, qemu_caps)?;
            opt.add_keyword("chardev", chardev_id(alias));
            opt.add_keyword("id", alias);
            if let Some(name) = name {
                opt.add_keyword("name", name);
            }
            Ok(ChannelFrontend::Device(opt.finish()))
        }
        ChannelTarget::GuestFwd { address, port } => {
            let mut opt = OptLine::with("user");
            opt.add_keyword("guestfwd", format!("tcp:{}:{}", address, port));
            opt.add_keyword("chardev", chardev_id(alias));
            opt.add_keyword("id", format!("user-{}", alias));
            Ok(ChannelFrontend::GuestFwdNetdev(opt.finish()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceInfo;
    use domain::VirtioSerialAddress;

    fn full_caps() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::Device,
            Cap::Chardev,
            Cap::ChardevSpicevmc,
            Cap::SclpS390,
            Cap::PciMultibus,
        ])
    }

    #[test]
    fn chardev_backends() {
        let qemu_caps = full_caps();
        assert_eq!(
            build_chardev_str(&CharSource::Pty, "serial0", &qemu_caps).unwrap(),
            "pty,id=charserial0"
        );
        assert_eq!(
            build_chardev_str(
                &CharSource::File {
                    path: "/tmp/console.log".into()
                },
                "serial0",
                &qemu_caps
            )
            .unwrap(),
            "file,id=charserial0,path=/tmp/console.log"
        );
        assert_eq!(
            build_chardev_str(
                &CharSource::Unix {
                    path: "/run/chan.sock".into(),
                    listen: true
                },
                "channel0",
                &qemu_caps
            )
            .unwrap(),
            "socket,id=charchannel0,path=/run/chan.sock,server,nowait"
        );
        assert_eq!(
            build_chardev_str(
                &CharSource::Tcp {
                    host: "127.0.0.1".to_owned(),
                    service: "4444".to_owned(),
                    listen: false,
                    telnet: true
                },
                "serial1",
                &qemu_caps
            )
            .unwrap(),
            "socket,id=charserial1,host=127.0.0.1,port=4444,telnet"
        );
    }

    #[test]
    fn spicevmc_requires_capability() {
        let bare = QemuCaps::from_caps([Cap::Device, Cap::Chardev]);
        assert!(matches!(
            build_chardev_str(&CharSource::SpiceVmc, "channel0", &bare),
            Err(Error::ConfigUnsupported(_))
        ));
    }

    #[test]
    fn legacy_chr_spellings() {
        assert_eq!(build_chr_arg_str(&CharSource::Pty).unwrap(), "pty");
        assert_eq!(
            build_chr_arg_str(&CharSource::Dev {
                path: "/dev/ttyS0".into()
            })
            .unwrap(),
            "/dev/ttyS0"
        );
        assert_eq!(
            build_chr_arg_str(&CharSource::Tcp {
                host: "localhost".to_owned(),
                service: "9999".to_owned(),
                listen: true,
                telnet: false
            })
            .unwrap(),
            "tcp:localhost:9999,server,nowait"
        );
        assert_eq!(
            build_chr_arg_str(&CharSource::Udp {
                host: "h".to_owned(),
                service: "10".to_owned(),
                bind_host: "b".to_owned(),
                bind_service: "20".to_owned()
            })
            .unwrap(),
            "udp:h:10@b:20"
        );
    }

    #[test]
    fn serial_frontend_on_pc_and_pseries() {
        let mut dom = Domain::empty("t");
        dom.os.arch = "x86_64".to_owned();
        dom.os.machine = "pc".to_owned();
        let serial = Serial {
            info: DeviceInfo {
                alias: Some("serial0".to_owned()),
                ..DeviceInfo::default()
            },
            source: CharSource::Pty,
            target_port: 0,
        };
        assert_eq!(
            build_serial_dev_str(&serial, &dom, &full_caps()).unwrap(),
            "isa-serial,chardev=charserial0,id=serial0"
        );

        let mut pseries = Domain::empty("p");
        pseries.os.arch = "ppc64".to_owned();
        pseries.os.machine = "pseries".to_owned();
        let mut vty = serial.clone();
        vty.info.addr = DeviceAddress::SpaprVio(domain::SpaprVioAddress {
            reg: Some(0x30000000),
        });
        assert_eq!(
            build_serial_dev_str(&vty, &pseries, &full_caps()).unwrap(),
            "spapr-vty,chardev=charserial0,reg=0x30000000"
        );
    }

    #[test]
    fn virtio_channel_frontend() {
        let dom = Domain::empty("t");
        let channel = Channel {
            info: DeviceInfo {
                alias: Some("channel0".to_owned()),
                addr: DeviceAddress::VirtioSerial(VirtioSerialAddress {
                    controller: 0,
                    bus: 0,
                    port: 1,
                }),
                ..DeviceInfo::default()
            },
            source: CharSource::Pty,
            target: ChannelTarget::VirtioSerial {
                name: Some("org.qemu.guest_agent.0".to_owned()),
            },
        };
        match build_channel_frontend(&channel, &dom, &full_caps()).unwrap() {
            ChannelFrontend::Device(s) => assert_eq!(
                s,
                "virtserialport,bus=virtio-serial0.0,nr=1,chardev=charchannel0,\
                 id=channel0,name=org.qemu.guest_agent.0"
            ),
            ChannelFrontend::GuestFwdNetdev(_) => panic!("wrong frontend kind"),
        }
    }

    #[test]
    fn guestfwd_channel_is_a_netdev() {
        let dom = Domain::empty("t");
        let channel = Channel {
            info: DeviceInfo {
                alias: Some("channel0".to_owned()),
                ..DeviceInfo::default()
            },
            source: CharSource::Pty,
            target: ChannelTarget::GuestFwd {
                address: "10.0.2.1".to_owned(),
                port: 4600,
            },
        };
        match build_channel_frontend(&channel, &dom, &full_caps()).unwrap() {
            ChannelFrontend::GuestFwdNetdev(s) => assert_eq!(
                s,
                "user,guestfwd=tcp:10.0.2.1:4600,chardev=charchannel0,id=user-channel0"
            ),
            ChannelFrontend::Device(_) => panic!("wrong frontend kind"),
        }
    }

    #[test]
    fn sclp_console_device() {
        let mut dom = Domain::empty("s");
        dom.os.arch = "s390x".to_owned();
        dom.os.machine = "s390-ccw-virtio".to_owned();
        let console = Console {
            info: DeviceInfo {
                alias: Some("console0".to_owned()),
                ..DeviceInfo::default()
            },
            source: CharSource::Pty,
            target: ConsoleTarget::Sclp,
            target_port: 0,
        };
        assert_eq!(
            build_console_dev_str(&console, &dom, &full_caps()).unwrap(),
            "sclpconsole,chardev=charconsole0,id=console0"
        );
    }
}
