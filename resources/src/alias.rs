// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stable device identifiers.
//!
//! Aliases become the `id=` key of every emitted device and must never
//! change for the lifetime of a running domain. User-provided aliases are
//! kept; everything else gets `<prefix><index>` per the class rules.

use domain::ConsoleTarget;
use domain::ControllerKind;
use domain::DeviceInfo;
use domain::Disk;
use domain::DiskBus;
use domain::DiskDevice;
use domain::Domain;

use crate::Error;
use crate::Result;

/// Picks `max(existing) + 1` among aliases of the form `<prefix><digits>`.
fn next_free_index(aliases: &[&str], prefix: &str) -> u32 {
    let mut next = 0;
    for alias in aliases {
        if let Some(digits) = alias.strip_prefix(prefix) {
            if let Ok(n) = digits.parse::<u32>() {
                next = next.max(n + 1);
            }
        }
    }
    next
}

/// Alias for one disk once `-device` is available: bus name plus the
/// position the drive address implies.
fn disk_alias(disk: &Disk) -> Result<String> {
    if disk.bus == DiskBus::Virtio {
        let idx = disk.index().unwrap_or(0);
        return Ok(format!("virtio-disk{}", idx));
    }
    if disk.bus == DiskBus::Usb {
        let idx = disk.index().unwrap_or(0);
        return Ok(format!("usb-disk{}", idx));
    }
    let addr = match disk.info.addr.drive() {
        Some(addr) => *addr,
        None => disk.default_drive_address().unwrap_or_default(),
    };
    Ok(format!(
        "{}{}-{}-{}",
        disk.bus.name(),
        addr.controller,
        addr.bus,
        addr.unit
    ))
}

/// Alias for one disk on emulators without `-device`: the destination
/// name, except that CDROMs keep the historical `cdrom` identifier.
fn disk_alias_legacy(disk: &Disk) -> String {
    if disk.device == DiskDevice::Cdrom {
        "cdrom".to_owned()
    } else {
        disk.dst.clone()
    }
}

/// Assigns an alias to every device lacking one. `modern` selects the
/// `-device` style disk aliases; legacy emulators get destination-name
/// aliases instead.
pub fn assign_aliases(dom: &mut Domain, modern: bool) -> Result<()> {
    // Generated aliases must not collide with aliases the user supplied
    // anywhere in the description, so collect those up front. Entries move
    // from `user_aliases` to `taken` as their devices are visited.
    let mut user_aliases: Vec<String> = Vec::new();
    dom.for_each_info(|_, _, info| {
        if let Some(alias) = &info.alias {
            user_aliases.push(alias.clone());
        }
    });
    let mut taken: Vec<String> = Vec::new();

    macro_rules! claim {
        ($info:expr, $alias:expr) => {{
            let info: &mut DeviceInfo = $info;
            if info.alias.is_none() {
                let alias: String = $alias;
                if user_aliases.contains(&alias) || taken.contains(&alias) {
                    return Err(Error::AliasConflict(alias));
                }
                taken.push(alias.clone());
                info.alias = Some(alias);
            } else {
                let alias = info.alias.clone().unwrap();
                // A duplicate among user aliases is fatal.
                let dupes = user_aliases.iter().filter(|a| **a == alias).count()
                    + taken.iter().filter(|a| **a == alias).count();
                if dupes > 1 || taken.contains(&alias) {
                    return Err(Error::AliasConflict(alias));
                }
                user_aliases.retain(|a| *a != alias);
                taken.push(alias);
            }
        }};
    }

    for i in 0..dom.disks.len() {
        let alias = if modern {
            disk_alias(&dom.disks[i])?
        } else {
            disk_alias_legacy(&dom.disks[i])
        };
        claim!(&mut dom.disks[i].info, alias);
    }

    for i in 0..dom.nets.len() {
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let idx = next_free_index(&existing, "net").max(i as u32);
        claim!(&mut dom.nets[i].info, format!("net{}", idx));
    }

    for i in 0..dom.controllers.len() {
        let c = &dom.controllers[i];
        let alias = match c.kind {
            // PCI buses are referenced as `pci.<idx>` by everything that
            // plugs into them.
            ControllerKind::Pci => format!("pci.{}", c.idx),
            // The first USB controller keeps the historical bare name.
            ControllerKind::Usb if c.idx == 0 => "usb".to_owned(),
            kind => format!("{}{}", kind.name(), c.idx),
        };
        claim!(&mut dom.controllers[i].info, alias);
    }

    for i in 0..dom.hostdevs.len() {
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let idx = next_free_index(&existing, "hostdev").max(i as u32);
        claim!(&mut dom.hostdevs[i].info, format!("hostdev{}", idx));
    }

    for i in 0..dom.redirdevs.len() {
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let idx = next_free_index(&existing, "redir").max(i as u32);
        claim!(&mut dom.redirdevs[i].info, format!("redir{}", idx));
    }

    for i in 0..dom.serials.len() {
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let idx = next_free_index(&existing, "serial").max(i as u32);
        claim!(&mut dom.serials[i].info, format!("serial{}", idx));
    }

    for i in 0..dom.parallels.len() {
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let idx = next_free_index(&existing, "parallel").max(i as u32);
        claim!(&mut dom.parallels[i].info, format!("parallel{}", idx));
    }

    for i in 0..dom.channels.len() {
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let idx = next_free_index(&existing, "channel").max(i as u32);
        claim!(&mut dom.channels[i].info, format!("channel{}", idx));
    }

    for i in 0..dom.consoles.len() {
        // The primary console of a PC guest is the first serial port.
        let existing: Vec<&str> = taken
            .iter()
            .chain(user_aliases.iter())
            .map(|s| s.as_str())
            .collect();
        let alias = if dom.consoles[i].target == ConsoleTarget::Serial {
            format!("serial{}", next_free_index(&existing, "serial"))
        } else {
            format!(
                "console{}",
                next_free_index(&existing, "console").max(i as u32)
            )
        };
        claim!(&mut dom.consoles[i].info, alias);
    }

    for i in 0..dom.filesystems.len() {
        claim!(&mut dom.filesystems[i].info, format!("fs{}", i));
    }
    for i in 0..dom.sounds.len() {
        claim!(&mut dom.sounds[i].info, format!("sound{}", i));
    }
    for i in 0..dom.inputs.len() {
        claim!(&mut dom.inputs[i].info, format!("input{}", i));
    }
    for i in 0..dom.videos.len() {
        claim!(&mut dom.videos[i].info, format!("video{}", i));
    }
    for i in 0..dom.hubs.len() {
        claim!(&mut dom.hubs[i].info, format!("hub{}", i));
    }
    for i in 0..dom.smartcards.len() {
        claim!(&mut dom.smartcards[i].info, format!("smartcard{}", i));
    }

    if let Some(dev) = &mut dom.watchdog {
        claim!(&mut dev.info, "watchdog0".to_owned());
    }
    if let Some(dev) = &mut dom.memballoon {
        claim!(&mut dev.info, "balloon0".to_owned());
    }
    if let Some(dev) = &mut dom.rng {
        claim!(&mut dev.info, "rng0".to_owned());
    }
    if let Some(dev) = &mut dom.tpm {
        claim!(&mut dev.info, "tpm0".to_owned());
    }
    if let Some(dev) = &mut dom.nvram {
        claim!(&mut dev.info, "nvram0".to_owned());
    }

    Ok(())
}
