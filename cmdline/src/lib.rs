// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The device-model compiler: translates a VM description into an
//! emulator invocation and back.
//!
//! The forward path ([`build_command`]) runs the allocators, renders every
//! device and assembles the argv in the canonical order. The reverse path
//! ([`parse_command`]) tokenizes an existing invocation and reconstructs
//! the description, leaving bus addresses unassigned. Building is pure:
//! no files are opened, no sockets touched; everything the command needs
//! arrives as a value.

mod assemble;
mod builder;
mod chr;
mod controller;
mod disk;
mod hostdev;
mod keyvalue;
mod machine;
mod misc;
mod net;
mod parse;
mod suffix;

use remain::sorted;
use thiserror::Error;

pub use crate::assemble::build_command;
pub use crate::assemble::BuildConfig;
pub use crate::parse::parse_argv;
pub use crate::parse::parse_command;

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Address(#[from] resources::Error),
    #[error("{0} is not supported with this emulator binary")]
    ConfigUnsupported(String),
    #[error(transparent)]
    Domain(#[from] domain::Error),
    #[error("internal inconsistency: {0}")]
    Internal(String),
    #[error("unsupported configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot parse command line: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A file descriptor the spawned emulator inherits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InheritedFd {
    pub fd: i32,
    /// Close this end in the parent once the child is running.
    pub close_in_parent: bool,
}

/// The compiled invocation: everything the process spawner needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QemuCommand {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub fds: Vec<InheritedFd>,
    /// Max-locked-memory rlimit in bytes, when VFIO passthrough or
    /// explicit memory locking demands one.
    pub max_memlock: Option<u64>,
    /// The emulator reads the incoming migration stream from stdin.
    pub stdin_migration: bool,
}

impl QemuCommand {
    /// Renders the invocation the way the inverse parser consumes it:
    /// environment assignments first, then the argv, shell quoted where
    /// needed.
    pub fn to_shell_string(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.env {
            out.push_str(name);
            out.push('=');
            push_shell_quoted(&mut out, value);
            out.push(' ');
        }
        for (i, arg) in self.argv.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            push_shell_quoted(&mut out, arg);
        }
        out
    }
}

fn push_shell_quoted(out: &mut String, s: &str) {
    let clean = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=,.:/+@%".contains(c));
    if clean {
        out.push_str(s);
    } else {
        out.push('\'');
        for c in s.chars() {
            if c == '\'' {
                out.push_str("'\\''");
            } else {
                out.push(c);
            }
        }
        out.push('\'');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_string_quotes_only_when_needed() {
        let cmd = QemuCommand {
            argv: vec![
                "qemu-system-x86_64".to_owned(),
                "-name".to_owned(),
                "my guest".to_owned(),
            ],
            env: vec![("QEMU_AUDIO_DRV".to_owned(), "none".to_owned())],
            fds: Vec::new(),
            max_memlock: None,
            stdin_migration: false,
        };
        assert_eq!(
            cmd.to_shell_string(),
            "QEMU_AUDIO_DRV=none qemu-system-x86_64 -name 'my guest'"
        );
    }
}
