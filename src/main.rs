// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The operator shell binary.

mod shell;

use argh::FromArgs;

/// A shell around the device-model compiler: compiles declarative VM
/// descriptions into emulator invocations and back.
#[derive(FromArgs)]
struct Args {
    /// hypervisor connection URI
    #[argh(option, short = 'c')]
    connect: Option<String>,
    /// connect read-only
    #[argh(switch, short = 'r')]
    readonly: bool,
    /// quiet mode, suppress informational output
    #[argh(switch, short = 'q')]
    quiet: bool,
    /// command (with arguments) to run instead of reading stdin
    #[argh(positional, greedy)]
    command: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("VIRTCMD_LOG", "warn"),
    )
    .init();

    let args: Args = argh::from_env();
    let connect = args
        .connect
        .or_else(|| std::env::var("VIRSH_DEFAULT_CONNECT_URI").ok())
        .filter(|uri| !uri.is_empty());

    let mut ctl = shell::Control::new(connect, args.readonly, args.quiet);

    let status = if args.command.is_empty() {
        // Only print the prompt when a human is typing.
        let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) } == 1;
        ctl.run_interactive(interactive)
    } else {
        ctl.run_line(&args.command.join(" "))
    };

    std::process::exit(if status { 0 } else { 1 });
}
