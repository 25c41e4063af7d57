// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The interactive command interpreter.
//!
//! Grammar: a line holds one or more `;`-separated commands; a command is
//! a name followed by `--option [value]` pairs and positional data, with
//! `"`-quoting. Every command is described by a static [`CmdDef`] whose
//! option table drives parsing, validation and `help` output.

mod commands;

use std::io::BufRead;
use std::io::Write;

use anyhow::anyhow;
use anyhow::Result;

use caps::Cap;
use caps::QemuCaps;

const PROMPT: &str = "virtcmd # ";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OptKind {
    /// Presence-only flag.
    Bool,
    Int,
    /// Named string option.
    String,
    /// Positional string data.
    Data,
}

pub struct OptDef {
    pub name: &'static str,
    pub kind: OptKind,
    pub required: bool,
    pub help: &'static str,
}

pub struct CmdDef {
    pub name: &'static str,
    pub info: &'static str,
    pub opts: &'static [OptDef],
    pub handler: fn(&mut Control, &Cmd) -> Result<()>,
}

/// One parsed command: the definition plus its collected option values.
pub struct Cmd {
    pub def: &'static CmdDef,
    opts: Vec<(&'static str, Option<String>)>,
}

impl Cmd {
    pub fn opt_bool(&self, name: &str) -> bool {
        self.opts.iter().any(|(n, _)| *n == name)
    }

    pub fn opt_string(&self, name: &str) -> Option<&str> {
        self.opts
            .iter()
            .find(|(n, v)| *n == name && v.is_some())
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Interpreter state threaded through every command.
pub struct Control {
    /// Hypervisor endpoint recorded by `connect`.
    pub name: Option<String>,
    pub readonly: bool,
    pub quiet: bool,
    pub caps: QemuCaps,
    quit: bool,
}

/// The emulator feature set assumed when no probe result is given: a
/// reasonably modern binary with the full device model.
pub fn default_caps() -> QemuCaps {
    QemuCaps::from_caps([
        Cap::Device,
        Cap::Drive,
        Cap::DriveFormat,
        Cap::DriveReadonly,
        Cap::DriveSerial,
        Cap::DriveAio,
        Cap::DriveCacheV2,
        Cap::DriveCopyOnRead,
        Cap::DriveDiscard,
        Cap::DriveIotune,
        Cap::Netdev,
        Cap::VhostNet,
        Cap::Chardev,
        Cap::MachineOpt,
        Cap::MachineUsbOpt,
        Cap::SmpTopology,
        Cap::Rtc,
        Cap::BootMenu,
        Cap::BootRebootTimeout,
        Cap::Bootindex,
        Cap::PciMultibus,
        Cap::PciMultifunction,
        Cap::PciBridge,
        Cap::PciRombar,
        Cap::VirtioBlkScsi,
        Cap::VirtioScsi,
        Cap::VirtioCcw,
        Cap::VirtioRng,
        Cap::ScsiLsi,
        Cap::ScsiCd,
        Cap::ScsiDiskChannel,
        Cap::ScsiDiskWwn,
        Cap::IdeCd,
        Cap::IdeDriveWwn,
        Cap::Ich9UsbEhci1,
        Cap::UsbHub,
        Cap::UsbRedir,
        Cap::UsbStorage,
        Cap::VfioPci,
        Cap::PciBootindex,
        Cap::UsbHostBootindex,
        Cap::Vga,
        Cap::VgaQxl,
        Cap::VgaNone,
        Cap::VncColon,
        Cap::DeviceQxl,
        Cap::DeviceVideoPrimary,
        Cap::SoundDevice,
        Cap::HdaDuplex,
        Cap::HdaMicro,
        Cap::Fsdev,
        Cap::NoShutdown,
        Cap::NoUserConfig,
        Cap::NoHpet,
        Cap::DisableS3,
        Cap::DisableS4,
        Cap::Smbios,
        Cap::Numa,
        Cap::MemPath,
        Cap::Mlock,
        Cap::DumpGuestCore,
        Cap::MemMerge,
        Cap::CpuHost,
        Cap::MonitorJson,
        Cap::SeccompSandbox,
        Cap::Sga,
        Cap::DeviceNvram,
        Cap::TpmPassthrough,
        Cap::CcidEmulated,
        Cap::CcidPassthru,
        Cap::BlockioSize,
        Cap::Kvm,
    ])
}

impl Control {
    pub fn new(name: Option<String>, readonly: bool, quiet: bool) -> Control {
        Control {
            name,
            readonly,
            quiet,
            caps: default_caps(),
            quit: false,
        }
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    /// Reads and runs commands until EOF or `quit`. Returns true when
    /// every command succeeded.
    pub fn run_interactive(&mut self, interactive: bool) -> bool {
        if interactive && !self.quiet {
            println!(
                "Welcome to virtcmd, the VM command compiler shell.\n\
                 Type 'help' for a list of commands, 'quit' to leave.\n"
            );
        }
        let stdin = std::io::stdin();
        let mut all_ok = true;
        loop {
            if self.quit {
                break;
            }
            if interactive {
                print!("{}", PROMPT);
                let _ = std::io::stdout().flush();
            }
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if !self.run_line(line.trim()) {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Parses and runs one line of `;`-separated commands. Returns true
    /// when all of them succeeded.
    pub fn run_line(&mut self, line: &str) -> bool {
        let commands = match parse_line(line) {
            Ok(commands) => commands,
            Err(e) => {
                eprintln!("error: {}", e);
                return false;
            }
        };
        let mut all_ok = true;
        for cmd in commands {
            if let Err(e) = (cmd.def.handler)(self, &cmd) {
                eprintln!("error: {}", e);
                all_ok = false;
            }
            if self.quit {
                break;
            }
        }
        all_ok
    }
}

fn find_command(name: &str) -> Option<&'static CmdDef> {
    commands::COMMANDS.iter().find(|def| def.name == name)
}

/// Splits one line into whitespace tokens, honoring `"` quoting and
/// stopping token accumulation at an unquoted `;` (its own token).
fn tokenize_line(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    for c in line.chars() {
        if quoted {
            if c == '"' {
                quoted = false;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                quoted = true;
                in_token = true;
            }
            ';' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
                tokens.push(";".to_owned());
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quoted {
        return Err(anyhow!("unterminated quoted string"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parses a full line into commands against the static definitions.
fn parse_line(line: &str) -> Result<Vec<Cmd>> {
    let tokens = tokenize_line(line)?;
    let mut commands = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while iter.peek().is_some() {
        // Skip empty commands (stray separators).
        while iter.peek().map(|t| t == ";").unwrap_or(false) {
            iter.next();
        }
        let name = match iter.next() {
            Some(name) => name,
            None => break,
        };
        let def =
            find_command(&name).ok_or_else(|| anyhow!("unknown command: '{}'", name))?;
        let mut opts: Vec<(&'static str, Option<String>)> = Vec::new();
        let mut data_count = 0;

        while let Some(token) = iter.peek() {
            if token == ";" {
                iter.next();
                break;
            }
            let token = iter.next().unwrap();
            if let Some(opt_name) = token.strip_prefix("--") {
                let opt = def
                    .opts
                    .iter()
                    .find(|o| o.name == opt_name && o.kind != OptKind::Data)
                    .ok_or_else(|| {
                        anyhow!("command '{}' doesn't support option --{}", def.name, opt_name)
                    })?;
                match opt.kind {
                    OptKind::Bool => opts.push((opt.name, None)),
                    OptKind::Int | OptKind::String => {
                        let value = iter
                            .next()
                            .filter(|v| v != ";")
                            .ok_or_else(|| anyhow!("expected syntax: --{} <value>", opt.name))?;
                        opts.push((opt.name, Some(value)));
                    }
                    OptKind::Data => unreachable!(),
                }
            } else {
                let opt = def
                    .opts
                    .iter()
                    .filter(|o| o.kind == OptKind::Data)
                    .nth(data_count)
                    .ok_or_else(|| anyhow!("unexpected data '{}'", token))?;
                data_count += 1;
                opts.push((opt.name, Some(token)));
            }
        }

        for opt in def.opts.iter().filter(|o| o.required) {
            if !opts.iter().any(|(n, _)| *n == opt.name) {
                return Err(anyhow!(
                    "command '{}' requires <{}> option",
                    def.name,
                    opt.name
                ));
            }
        }

        commands.push(Cmd { def, opts });
    }
    Ok(commands)
}
