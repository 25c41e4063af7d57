// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The static command table and its handlers.

use std::fs;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;

use caps::QemuCaps;
use cmdline::BuildConfig;
use domain::Domain;

use super::Cmd;
use super::CmdDef;
use super::Control;
use super::OptDef;
use super::OptKind;

pub static COMMANDS: &[CmdDef] = &[
    CmdDef {
        name: "help",
        info: "print help",
        opts: &[OptDef {
            name: "command",
            kind: OptKind::Data,
            required: false,
            help: "name of command",
        }],
        handler: cmd_help,
    },
    CmdDef {
        name: "connect",
        info: "(re)connect to hypervisor",
        opts: &[
            OptDef {
                name: "name",
                kind: OptKind::Data,
                required: false,
                help: "hypervisor connection URI",
            },
            OptDef {
                name: "readonly",
                kind: OptKind::Bool,
                required: false,
                help: "read-only connection",
            },
        ],
        handler: cmd_connect,
    },
    CmdDef {
        name: "echo",
        info: "echo arguments",
        opts: &[
            OptDef {
                name: "shell",
                kind: OptKind::Bool,
                required: false,
                help: "escape for shell use",
            },
            OptDef {
                name: "xml",
                kind: OptKind::Bool,
                required: false,
                help: "escape for XML use",
            },
            OptDef {
                name: "string",
                kind: OptKind::Data,
                required: false,
                help: "arguments to echo",
            },
        ],
        handler: cmd_echo,
    },
    CmdDef {
        name: "domcompile",
        info: "compile a domain description into an emulator command line",
        opts: &[
            OptDef {
                name: "file",
                kind: OptKind::Data,
                required: true,
                help: "file containing a JSON domain description",
            },
            OptDef {
                name: "caps",
                kind: OptKind::String,
                required: false,
                help: "file listing probed capability flags, one per line",
            },
            OptDef {
                name: "snapshot",
                kind: OptKind::String,
                required: false,
                help: "saved state to resume with -loadvm",
            },
        ],
        handler: cmd_domcompile,
    },
    CmdDef {
        name: "domdecompile",
        info: "reconstruct a domain description from an emulator command line",
        opts: &[OptDef {
            name: "file",
            kind: OptKind::Data,
            required: true,
            help: "file containing the native emulator command line",
        }],
        handler: cmd_domdecompile,
    },
    CmdDef {
        name: "dominfo",
        info: "summarize a domain description",
        opts: &[OptDef {
            name: "file",
            kind: OptKind::Data,
            required: true,
            help: "file containing a JSON domain description",
        }],
        handler: cmd_dominfo,
    },
    CmdDef {
        name: "quit",
        info: "quit this interactive terminal",
        opts: &[],
        handler: cmd_quit,
    },
    CmdDef {
        name: "exit",
        info: "quit this interactive terminal",
        opts: &[],
        handler: cmd_quit,
    },
];

fn cmd_help(_ctl: &mut Control, cmd: &Cmd) -> Result<()> {
    match cmd.opt_string("command") {
        None => {
            println!("Commands:\n");
            for def in COMMANDS {
                println!("    {:<16} {}", def.name, def.info);
            }
        }
        Some(name) => {
            let def = COMMANDS
                .iter()
                .find(|def| def.name == name)
                .ok_or_else(|| anyhow!("command '{}' doesn't exist", name))?;
            println!("  NAME\n    {} - {}\n", def.name, def.info);
            if !def.opts.is_empty() {
                println!("  OPTIONS");
                for opt in def.opts {
                    let spelled = match opt.kind {
                        OptKind::Bool => format!("--{}", opt.name),
                        OptKind::Data => format!("<{}>", opt.name),
                        OptKind::Int => format!("--{} <number>", opt.name),
                        OptKind::String => format!("--{} <string>", opt.name),
                    };
                    println!("    {:<20} {}", spelled, opt.help);
                }
            }
        }
    }
    Ok(())
}

fn cmd_connect(ctl: &mut Control, cmd: &Cmd) -> Result<()> {
    ctl.readonly = cmd.opt_bool("readonly");
    ctl.name = cmd.opt_string("name").map(|n| n.to_owned());
    if !ctl.quiet {
        let access = if ctl.readonly { " (read-only)" } else { "" };
        match &ctl.name {
            Some(name) => println!("Connected to {}{}", name, access),
            None => println!("Connected to the default hypervisor{}", access),
        }
    }
    Ok(())
}

fn cmd_echo(_ctl: &mut Control, cmd: &Cmd) -> Result<()> {
    let text = cmd.opt_string("string").unwrap_or_default();
    let text = if cmd.opt_bool("xml") {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    } else {
        text.to_owned()
    };
    if cmd.opt_bool("shell")
        && !text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c))
    {
        println!("'{}'", text.replace('\'', "'\\''"));
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn load_domain(path: &str) -> Result<Domain> {
    let json = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    let mut dom: Domain =
        serde_json::from_str(&json).with_context(|| format!("invalid description in {}", path))?;
    dom.post_parse(&mut rand::thread_rng())?;
    Ok(dom)
}

fn load_caps(ctl: &Control, cmd: &Cmd) -> Result<QemuCaps> {
    match cmd.opt_string("caps") {
        None => Ok(ctl.caps.clone()),
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
            Ok(QemuCaps::from_names(
                text.lines().map(|l| l.trim()).filter(|l| !l.is_empty()),
            ))
        }
    }
}

fn cmd_domcompile(ctl: &mut Control, cmd: &Cmd) -> Result<()> {
    let path = cmd.opt_string("file").expect("required option");
    let mut dom = load_domain(path)?;
    let qemu_caps = load_caps(ctl, cmd)?;
    let config = BuildConfig {
        snapshot: cmd.opt_string("snapshot").map(|s| s.to_owned()),
        ..BuildConfig::default()
    };
    let (command, _sets) = cmdline::build_command(&mut dom, &qemu_caps, &config)?;
    log::debug!(
        "compiled '{}' into {} argv words",
        dom.name,
        command.argv.len()
    );
    println!("{}", command.to_shell_string());
    Ok(())
}

fn cmd_domdecompile(_ctl: &mut Control, cmd: &Cmd) -> Result<()> {
    let path = cmd.opt_string("file").expect("required option");
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    let dom = cmdline::parse_command(text.trim())?;
    println!("{}", serde_json::to_string_pretty(&dom)?);
    Ok(())
}

fn cmd_dominfo(_ctl: &mut Control, cmd: &Cmd) -> Result<()> {
    let path = cmd.opt_string("file").expect("required option");
    let dom = load_domain(path)?;
    let mut devices = 0usize;
    dom.for_each_info(|_, _, _| devices += 1);
    println!("{:<16}{}", "Name:", dom.name);
    println!("{:<16}{}", "UUID:", dom.uuid);
    println!("{:<16}{}", "Arch:", dom.os.arch);
    println!("{:<16}{}", "Machine:", dom.os.machine);
    println!("{:<16}{:?}", "Virt type:", dom.virt_type);
    println!("{:<16}{}", "CPU(s):", dom.vcpus);
    println!("{:<16}{} KiB", "Max memory:", dom.memory.max_kib);
    println!("{:<16}{} KiB", "Used memory:", dom.memory.current_kib);
    println!("{:<16}{}", "Devices:", devices);
    Ok(())
}

fn cmd_quit(ctl: &mut Control, _cmd: &Cmd) -> Result<()> {
    ctl.request_quit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn command_names_are_unique() {
        let mut names: Vec<&str> = COMMANDS.iter().map(|def| def.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn compile_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let dom_path = dir.path().join("dom.json");
        let dom = r#"{
            "name": "guest",
            "uuid": "8f99e332-06e6-4428-b325-1f6dc38d9564",
            "virt_type": "kvm",
            "os": { "arch": "x86_64", "machine": "pc" },
            "vcpus": 1,
            "max_vcpus": 1,
            "memory": { "current_kib": 524288, "max_kib": 524288 },
            "disks": [{
                "dst": "vda",
                "bus": "virtio",
                "src": { "kind": "file", "path": "/var/img.qcow2" },
                "format": "qcow2"
            }]
        }"#;
        fs::File::create(&dom_path)
            .unwrap()
            .write_all(dom.as_bytes())
            .unwrap();
        let mut ctl = Control::new(None, false, true);
        assert!(ctl.run_line(&format!("domcompile {}", dom_path.display())));
        assert!(ctl.run_line(&format!(
            "dominfo {} ; echo done",
            dom_path.display()
        )));
        // A missing file must fail the whole line.
        assert!(!ctl.run_line("domcompile /nonexistent/dom.json"));
    }

    #[test]
    fn quit_stops_the_interpreter() {
        let mut ctl = Control::new(None, false, true);
        assert!(ctl.run_line("quit"));
    }
}
