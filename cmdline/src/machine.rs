// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The global machine arguments: `-machine`/`-M`, `-cpu`, `-smp`, `-rtc`
//! and `-boot`.

use caps::Cap;
use caps::QemuCaps;
use domain::BootDev;
use domain::ClockOffset;
use domain::CpuMode;
use domain::Domain;
use domain::TickPolicy;
use domain::TimerKind;
use domain::TimerTrack;
use domain::VirtType;

use crate::builder::OptLine;
use crate::Error;
use crate::Result;

/// `-machine` (or legacy `-M`) plus its options. Returns the flag and its
/// argument.
pub fn build_machine_arg(dom: &Domain, qemu_caps: &QemuCaps) -> Result<(String, String)> {
    if !qemu_caps.has(Cap::MachineOpt) {
        return Ok(("-M".to_owned(), dom.os.machine.clone()));
    }
    let mut opt = OptLine::with(&dom.os.machine);
    let accel = match dom.virt_type {
        VirtType::Kvm => "kvm",
        VirtType::Kqemu => "kqemu",
        VirtType::Tcg | VirtType::Xen => "tcg",
    };
    opt.add_keyword("accel", accel);
    if qemu_caps.has(Cap::MachineUsbOpt) {
        let has_usb = dom
            .controllers
            .iter()
            .any(|c| c.kind == domain::ControllerKind::Usb);
        if !has_usb {
            opt.add_keyword("usb", "off");
        }
    }
    if let Some(dump) = dom.memory.dump_core {
        if !qemu_caps.has(Cap::DumpGuestCore) {
            return Err(Error::ConfigUnsupported("dump-guest-core".to_owned()));
        }
        opt.add_keyword_onoff("dump-guest-core", dump);
    }
    if dom.memory.nosharepages {
        if !qemu_caps.has(Cap::MemMerge) {
            return Err(Error::ConfigUnsupported(
                "disabling same-page merging".to_owned(),
            ));
        }
        opt.add_keyword("mem-merge", "off");
    }
    Ok(("-machine".to_owned(), opt.finish()))
}

/// The `-cpu` argument, or `None` when the description says nothing about
/// the processor.
pub fn build_cpu_arg(dom: &Domain, qemu_caps: &QemuCaps) -> Result<Option<String>> {
    let mut base: Option<String> = None;
    let mut features: Vec<String> = Vec::new();

    if let Some(cpu) = &dom.cpu {
        match cpu.mode {
            CpuMode::HostPassthrough => {
                if !qemu_caps.has(Cap::CpuHost) {
                    return Err(Error::ConfigUnsupported(
                        "host CPU passthrough".to_owned(),
                    ));
                }
                base = Some("host".to_owned());
            }
            CpuMode::Custom => {
                base = cpu.model.clone();
                for feature in &cpu.features {
                    let sign = match feature.policy {
                        domain::CpuFeaturePolicy::Require => '+',
                        domain::CpuFeaturePolicy::Disable => '-',
                    };
                    features.push(format!("{}{}", sign, feature.name));
                }
            }
        }
    }

    let hyperv = &dom.features.hyperv;
    if hyperv.relaxed {
        features.push("hv_relaxed".to_owned());
    }
    if hyperv.vapic {
        features.push("hv_vapic".to_owned());
    }
    if let Some(retries) = hyperv.spinlocks {
        features.push(format!("hv_spinlocks={:#x}", retries));
    }

    if let Some(timer) = dom.clock.timer(TimerKind::Kvmclock) {
        match timer.present {
            Some(true) => features.push("+kvmclock".to_owned()),
            Some(false) => features.push("-kvmclock".to_owned()),
            None => {}
        }
    }
    if let Some(eoi) = dom.features.kvm_pv_eoi {
        features.push(if eoi {
            "+kvm_pv_eoi".to_owned()
        } else {
            "-kvm_pv_eoi".to_owned()
        });
    }

    if base.is_none() && features.is_empty() {
        return Ok(None);
    }
    let base = base.unwrap_or_else(|| default_cpu_model(dom).to_owned());
    let mut out = base;
    for feature in features {
        out.push(',');
        out.push_str(&feature);
    }
    Ok(Some(out))
}

fn default_cpu_model(dom: &Domain) -> &'static str {
    match dom.os.arch.as_str() {
        "x86_64" => "qemu64",
        "i686" => "qemu32",
        _ => "qemu64",
    }
}

/// The `-smp` argument.
pub fn build_smp_arg(dom: &Domain, qemu_caps: &QemuCaps) -> Result<String> {
    let mut out = dom.vcpus.to_string();
    if dom.vcpus < dom.max_vcpus {
        if !qemu_caps.has(Cap::SmpTopology) {
            return Err(Error::ConfigUnsupported(
                "setting current vcpus below maximum".to_owned(),
            ));
        }
        out.push_str(&format!(",maxcpus={}", dom.max_vcpus));
    }
    if let Some(topology) = &dom.topology {
        if !qemu_caps.has(Cap::SmpTopology) {
            return Err(Error::ConfigUnsupported("CPU topology".to_owned()));
        }
        out.push_str(&format!(
            ",sockets={},cores={},threads={}",
            topology.sockets, topology.cores, topology.threads
        ));
    }
    Ok(out)
}

/// The `-rtc` argument, or the bare legacy `-localtime` flag.
pub enum ClockArg {
    Rtc(String),
    Localtime,
    None,
}

pub fn build_clock_arg(dom: &Domain, qemu_caps: &QemuCaps) -> Result<ClockArg> {
    if !qemu_caps.has(Cap::Rtc) {
        return Ok(match dom.clock.offset {
            ClockOffset::Localtime => ClockArg::Localtime,
            ClockOffset::Utc => ClockArg::None,
            ClockOffset::Absolute => {
                return Err(Error::ConfigUnsupported(
                    "absolute clock start time".to_owned(),
                ));
            }
        });
    }
    let mut opt = OptLine::new();
    opt.add_literal("base=");
    match dom.clock.offset {
        ClockOffset::Utc => {
            opt.add_literal("utc");
        }
        ClockOffset::Localtime => {
            opt.add_literal("localtime");
        }
        ClockOffset::Absolute => {
            let start = dom.clock.start.as_deref().ok_or_else(|| {
                Error::InvalidConfig("absolute clock offset without a start time".to_owned())
            })?;
            opt.add_literal(start);
        }
    }
    if let Some(timer) = dom.clock.timer(TimerKind::Rtc) {
        if let Some(track) = timer.track {
            let clock = match track {
                TimerTrack::Guest => "vm",
                TimerTrack::Wall => "host",
            };
            opt.add_keyword("clock", clock);
        }
        if timer.tickpolicy == Some(TickPolicy::Catchup) {
            opt.add_keyword("driftfix", "slew");
        }
    }
    Ok(ClockArg::Rtc(opt.finish()))
}

/// The `-boot` argument from the order/menu/timeout knobs. `None` when
/// per-device boot indexes carry the order instead.
pub fn build_boot_arg(dom: &Domain, qemu_caps: &QemuCaps) -> Result<Option<String>> {
    let use_bootindex = qemu_caps.has(Cap::Bootindex);
    let mut parts: Vec<String> = Vec::new();
    if !dom.os.boot_devs.is_empty() && !use_bootindex {
        let order: String = dom.os.boot_devs.iter().map(BootDev::code).collect();
        parts.push(format!("order={}", order));
    }
    if let Some(menu) = dom.os.boot_menu {
        if !qemu_caps.has(Cap::BootMenu) {
            return Err(Error::ConfigUnsupported("boot menu".to_owned()));
        }
        parts.push(format!("menu={}", if menu { "on" } else { "off" }));
    }
    if let Some(timeout) = dom.os.reboot_timeout {
        if !qemu_caps.has(Cap::BootRebootTimeout) {
            return Err(Error::ConfigUnsupported("boot retry timeout".to_owned()));
        }
        parts.push(format!("reboot-timeout={}", timeout));
    }
    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::CpuDef;
    use domain::CpuFeature;
    use domain::CpuFeaturePolicy;
    use domain::CpuTopology;
    use domain::HypervFeatures;
    use domain::Timer;

    fn dom_pc() -> Domain {
        let mut dom = Domain::empty("t");
        dom.os.arch = "x86_64".to_owned();
        dom.os.machine = "pc".to_owned();
        dom.virt_type = VirtType::Kvm;
        dom
    }

    fn full_caps() -> QemuCaps {
        QemuCaps::from_caps([
            Cap::MachineOpt,
            Cap::MachineUsbOpt,
            Cap::DumpGuestCore,
            Cap::MemMerge,
            Cap::CpuHost,
            Cap::SmpTopology,
            Cap::Rtc,
            Cap::BootMenu,
            Cap::BootRebootTimeout,
            Cap::Bootindex,
        ])
    }

    #[test]
    fn machine_with_accel() {
        let dom = dom_pc();
        let qemu_caps = QemuCaps::from_caps([Cap::MachineOpt]);
        let (flag, arg) = build_machine_arg(&dom, &qemu_caps).unwrap();
        assert_eq!(flag, "-machine");
        assert_eq!(arg, "pc,accel=kvm");
    }

    #[test]
    fn machine_legacy_spelling() {
        let dom = dom_pc();
        let (flag, arg) = build_machine_arg(&dom, &QemuCaps::new()).unwrap();
        assert_eq!(flag, "-M");
        assert_eq!(arg, "pc");
    }

    #[test]
    fn machine_usb_off_when_no_usb_controller() {
        let dom = dom_pc();
        let (_, arg) = build_machine_arg(&dom, &full_caps()).unwrap();
        assert_eq!(arg, "pc,accel=kvm,usb=off");
    }

    #[test]
    fn cpu_host_passthrough() {
        let mut dom = dom_pc();
        dom.cpu = Some(CpuDef {
            mode: CpuMode::HostPassthrough,
            model: None,
            features: Vec::new(),
        });
        assert_eq!(
            build_cpu_arg(&dom, &full_caps()).unwrap(),
            Some("host".to_owned())
        );
        assert!(build_cpu_arg(&dom, &QemuCaps::new()).is_err());
    }

    #[test]
    fn cpu_features_and_hyperv() {
        let mut dom = dom_pc();
        dom.cpu = Some(CpuDef {
            mode: CpuMode::Custom,
            model: Some("core2duo".to_owned()),
            features: vec![
                CpuFeature {
                    name: "lahf_lm".to_owned(),
                    policy: CpuFeaturePolicy::Require,
                },
                CpuFeature {
                    name: "svm".to_owned(),
                    policy: CpuFeaturePolicy::Disable,
                },
            ],
        });
        dom.features.hyperv = HypervFeatures {
            relaxed: true,
            vapic: false,
            spinlocks: Some(4096),
        };
        assert_eq!(
            build_cpu_arg(&dom, &full_caps()).unwrap(),
            Some("core2duo,+lahf_lm,-svm,hv_relaxed,hv_spinlocks=0x1000".to_owned())
        );
    }

    #[test]
    fn kvmclock_polarity_picks_default_model() {
        let mut dom = dom_pc();
        dom.clock.timers.push(Timer {
            kind: TimerKind::Kvmclock,
            present: Some(false),
            tickpolicy: None,
            track: None,
        });
        assert_eq!(
            build_cpu_arg(&dom, &full_caps()).unwrap(),
            Some("qemu64,-kvmclock".to_owned())
        );
    }

    #[test]
    fn smp_topology_gating() {
        let mut dom = dom_pc();
        dom.vcpus = 2;
        dom.max_vcpus = 4;
        dom.topology = Some(CpuTopology {
            sockets: 2,
            cores: 2,
            threads: 1,
        });
        assert_eq!(
            build_smp_arg(&dom, &full_caps()).unwrap(),
            "2,maxcpus=4,sockets=2,cores=2,threads=1"
        );
        assert!(build_smp_arg(&dom, &QemuCaps::new()).is_err());
    }

    #[test]
    fn rtc_with_drift_fix() {
        let mut dom = dom_pc();
        dom.clock.offset = ClockOffset::Localtime;
        dom.clock.timers.push(Timer {
            kind: TimerKind::Rtc,
            present: None,
            tickpolicy: Some(TickPolicy::Catchup),
            track: Some(TimerTrack::Guest),
        });
        match build_clock_arg(&dom, &full_caps()).unwrap() {
            ClockArg::Rtc(arg) => assert_eq!(arg, "base=localtime,clock=vm,driftfix=slew"),
            _ => panic!("expected -rtc"),
        }
    }

    #[test]
    fn legacy_localtime() {
        let mut dom = dom_pc();
        dom.clock.offset = ClockOffset::Localtime;
        assert!(matches!(
            build_clock_arg(&dom, &QemuCaps::new()).unwrap(),
            ClockArg::Localtime
        ));
    }

    #[test]
    fn boot_order_suppressed_by_bootindex() {
        let mut dom = dom_pc();
        dom.os.boot_devs = vec![BootDev::Cdrom, BootDev::Hd];
        assert_eq!(build_boot_arg(&dom, &full_caps()).unwrap(), None);
        let mut legacy = full_caps();
        legacy.clear(Cap::Bootindex);
        assert_eq!(
            build_boot_arg(&dom, &legacy).unwrap(),
            Some("order=dc".to_owned())
        );
        dom.os.boot_menu = Some(true);
        assert_eq!(
            build_boot_arg(&dom, &legacy).unwrap(),
            Some("order=dc,menu=on".to_owned())
        );
    }
}
