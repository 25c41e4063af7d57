// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Network rendering: the host backend (`-netdev` or legacy `-net`) and
//! the guest NIC `-device`.

use caps::Cap;
use caps::QemuCaps;
use domain::DeviceAddress;
use domain::Domain;
use domain::Net;
use domain::NetBackend;
use domain::SocketNetMode;

use crate::builder::OptLine;
use crate::suffix;
use crate::Error;
use crate::Result;

pub fn host_net_id(alias: &str) -> String {
    format!("host{}", alias)
}

fn join_fds(fds: &[i32]) -> String {
    fds.iter()
        .map(|fd| fd.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

/// The backend half: `-netdev` option string, or the legacy `-net` form
/// carrying a `vlan=` matching key.
pub fn build_host_net_str(net: &Net, qemu_caps: &QemuCaps, vlan: Option<u32>) -> Result<String> {
    let mut opt = OptLine::new();
    match &net.backend {
        NetBackend::User => {
            opt.add_literal("user");
        }
        NetBackend::Tap {
            ifname,
            fds,
            vhost,
            vhost_fds,
        } => {
            opt.add_literal("tap");
            match fds.len() {
                0 => {
                    if let Some(ifname) = ifname {
                        opt.add_keyword("ifname", ifname);
                    }
                }
                1 => {
                    opt.add_keyword("fd", fds[0]);
                }
                _ => {
                    opt.add_keyword("fds", join_fds(fds));
                }
            }
            if vlan.is_none() {
                // id= sits between the tap options and the vhost ones.
                opt.add_keyword("id", host_net_id(net.info.alias_or_empty()));
            }
            if vhost == &Some(true) {
                if !qemu_caps.has(Cap::VhostNet) {
                    return Err(Error::ConfigUnsupported(format!(
                        "vhost acceleration on interface '{}'",
                        net.info.alias_or_empty()
                    )));
                }
                opt.add_keyword("vhost", "on");
                match vhost_fds.len() {
                    0 => {}
                    1 => {
                        opt.add_keyword("vhostfd", vhost_fds[0]);
                    }
                    _ => {
                        opt.add_keyword("vhostfds", join_fds(vhost_fds));
                    }
                }
            }
            if let Some(vlan) = vlan {
                opt.add_keyword("vlan", vlan);
                opt.add_keyword("name", host_net_id(net.info.alias_or_empty()));
            }
            return Ok(opt.finish());
        }
        NetBackend::Socket { mode, address } => {
            opt.add_literal("socket");
            let key = match mode {
                SocketNetMode::Connect => "connect",
                SocketNetMode::Listen => "listen",
                SocketNetMode::Mcast => "mcast",
            };
            opt.add_keyword(key, address);
        }
    }
    match vlan {
        None => {
            opt.add_keyword("id", host_net_id(net.info.alias_or_empty()));
        }
        Some(vlan) => {
            opt.add_keyword("vlan", vlan);
            opt.add_keyword("name", host_net_id(net.info.alias_or_empty()));
        }
    }
    Ok(opt.finish())
}

fn nic_model(net: &Net) -> String {
    let model = net.model.as_deref().unwrap_or("rtl8139");
    if model == "virtio" {
        match &net.info.addr {
            DeviceAddress::Ccw(_) => "virtio-net-ccw".to_owned(),
            DeviceAddress::VioS390 => "virtio-net-s390".to_owned(),
            DeviceAddress::SpaprVio(_) => "spapr-vlan".to_owned(),
            _ => "virtio-net-pci".to_owned(),
        }
    } else {
        model.to_owned()
    }
}

/// The guest NIC `-device` line.
pub fn build_nic_dev_str(net: &Net, dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    let alias = net.info.alias_or_empty();
    let mut opt = OptLine::with(&nic_model(net));
    if let NetBackend::Tap { fds, .. } = &net.backend {
        if fds.len() > 1 {
            // Multiqueue needs as many vectors as queue pairs plus config.
            opt.add_keyword("mq", "on");
            opt.add_keyword("vectors", 2 * fds.len() as u64 + 2);
        }
    }
    opt.add_keyword("netdev", host_net_id(alias));
    opt.add_keyword("id", alias);
    if let Some(mac) = &net.mac {
        opt.add_keyword("mac", mac);
    }
    suffix::add_bootindex(&mut opt, &net.info, qemu_caps, Cap::Bootindex)?;
    suffix::add_rom_opts(&mut opt, &net.info, qemu_caps)?;
    suffix::add_device_address(&mut opt, dom, &net.info, qemu_caps)?;
    Ok(opt.finish())
}

/// Legacy guest half: `-net nic,...` matched to its backend by `vlan=`.
pub fn build_nic_str(net: &Net, vlan: u32) -> Result<String> {
    let mut opt = OptLine::with("nic");
    if let Some(mac) = &net.mac {
        opt.add_keyword("macaddr", mac);
    }
    opt.add_keyword("vlan", vlan);
    if let Some(model) = &net.model {
        opt.add_keyword("model", model);
    }
    opt.add_keyword("name", net.info.alias_or_empty());
    Ok(opt.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceInfo;
    use domain::MacAddress;
    use domain::PciAddress;

    fn caps_modern() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::Device,
            Cap::Netdev,
            Cap::VhostNet,
            Cap::PciMultibus,
            Cap::Bootindex,
        ])
    }

    fn user_net(alias: &str) -> Net {
        Net {
            info: DeviceInfo {
                alias: Some(alias.to_owned()),
                ..DeviceInfo::default()
            },
            mac: "52:54:00:11:22:33".parse::<MacAddress>().ok(),
            model: Some("virtio".to_owned()),
            backend: NetBackend::User,
        }
    }

    #[test]
    fn user_netdev() {
        let net = user_net("net0");
        let s = build_host_net_str(&net, &caps_modern(), None).unwrap();
        assert_eq!(s, "user,id=hostnet0");
    }

    #[test]
    fn virtio_nic_device() {
        let mut net = user_net("net0");
        net.info.addr = DeviceAddress::Pci(PciAddress::new(0, 0, 4, 0));
        let dom = Domain::empty("t");
        let s = build_nic_dev_str(&net, &dom, &caps_modern()).unwrap();
        assert_eq!(
            s,
            "virtio-net-pci,netdev=hostnet0,id=net0,mac=52:54:00:11:22:33,bus=pci.0,addr=0x4"
        );
    }

    #[test]
    fn tap_with_single_fd_and_vhost() {
        let mut net = user_net("net1");
        net.backend = NetBackend::Tap {
            ifname: None,
            fds: vec![23],
            vhost: Some(true),
            vhost_fds: vec![24],
        };
        let s = build_host_net_str(&net, &caps_modern(), None).unwrap();
        assert_eq!(s, "tap,fd=23,id=hostnet1,vhost=on,vhostfd=24");
    }

    #[test]
    fn tap_multiqueue_uses_fds() {
        let mut net = user_net("net0");
        net.backend = NetBackend::Tap {
            ifname: None,
            fds: vec![30, 31, 32],
            vhost: None,
            vhost_fds: Vec::new(),
        };
        let s = build_host_net_str(&net, &caps_modern(), None).unwrap();
        assert_eq!(s, "tap,fds=30:31:32,id=hostnet0");
        let dom = Domain::empty("t");
        let dev = build_nic_dev_str(&net, &dom, &caps_modern()).unwrap();
        assert!(dev.contains("mq=on,vectors=8"), "{}", dev);
    }

    #[test]
    fn vhost_without_capability_fails() {
        let mut net = user_net("net0");
        net.backend = NetBackend::Tap {
            ifname: None,
            fds: vec![23],
            vhost: Some(true),
            vhost_fds: Vec::new(),
        };
        let qemu_caps = QemuCaps::from_caps([Cap::Device, Cap::Netdev]);
        assert!(matches!(
            build_host_net_str(&net, &qemu_caps, None),
            Err(Error::ConfigUnsupported(_))
        ));
    }

    #[test]
    fn socket_modes() {
        let mut net = user_net("net0");
        net.backend = NetBackend::Socket {
            mode: SocketNetMode::Mcast,
            address: "230.0.0.1:1234".to_owned(),
        };
        let s = build_host_net_str(&net, &caps_modern(), None).unwrap();
        assert_eq!(s, "socket,mcast=230.0.0.1:1234,id=hostnet0");
    }

    #[test]
    fn legacy_vlan_pairing() {
        let net = user_net("net0");
        let host = build_host_net_str(&net, &QemuCaps::new(), Some(0)).unwrap();
        assert_eq!(host, "user,vlan=0,name=hostnet0");
        let nic = build_nic_str(&net, 0).unwrap();
        assert_eq!(
            nic,
            "nic,macaddr=52:54:00:11:22:33,vlan=0,model=virtio,name=net0"
        );
    }

    #[test]
    fn spapr_vlan_model() {
        use domain::SpaprVioAddress;
        let mut net = user_net("net0");
        net.model = Some("virtio".to_owned());
        net.info.addr = DeviceAddress::SpaprVio(SpaprVioAddress { reg: Some(0x1000) });
        let dom = Domain::empty("t");
        let s = build_nic_dev_str(&net, &dom, &caps_modern()).unwrap();
        assert!(s.starts_with("spapr-vlan,"), "{}", s);
        assert!(s.ends_with("reg=0x1000"), "{}", s);
    }
}
