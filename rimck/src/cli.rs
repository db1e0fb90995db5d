// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use rimck_core::{CoreError, CoreResult, RunOptions, TypeFilter};

/// Front-end options that stand alone.
const FLAGS: &str = "AsRPMNTlV";

#[derive(Parser, Debug)]
#[command(
    name = "rimck",
    version,
    about = "Check and repair Linux filesystems, in parallel where the disks allow it",
    long_about = None,
    disable_version_flag = true
)]
pub struct Cli {
    /// Check all filesystems listed in the filesystem table
    #[arg(short = 'A')]
    pub all: bool,

    /// Run one checker at a time
    #[arg(short = 's')]
    pub serialize: bool,

    /// Skip the root filesystem with -A
    #[arg(short = 'R')]
    pub skip_root: bool,

    /// Check the root filesystem in parallel with the others
    #[arg(short = 'P')]
    pub parallel_root: bool,

    /// Do not check mounted filesystems
    #[arg(short = 'M')]
    pub skip_mounted: bool,

    /// Only print what would be done
    #[arg(short = 'N')]
    pub noexecute: bool,

    /// Do not print the title
    #[arg(short = 'T')]
    pub no_title: bool,

    /// Filesystem types to check, comma separated
    #[arg(short = 't', value_name = "TYPES", action = ArgAction::Append)]
    pub types: Vec<String>,

    /// Lock the whole disk while checking it
    #[arg(short = 'l')]
    pub lock: bool,

    /// Let the ext checkers report progress on FD
    #[arg(
        short = 'C',
        value_name = "FD",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "0"
    )]
    pub progress: Option<i32>,

    /// Print per-checker statistics, to FD or stdout
    #[arg(short = 'r', value_name = "FD", num_args = 0..=1, require_equals = true)]
    pub stats: Option<Option<i32>>,

    /// Explain what is being done; twice for debug output
    #[arg(short = 'V', action = ArgAction::Count)]
    pub verbose: u8,

    /// Print version
    #[arg(long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Read defaults from a TOML file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Devices, mount points or LABEL=/UUID= specs
    #[arg(value_name = "FILESYSTEM")]
    pub targets: Vec<String>,

    /// Options passed on to every checker
    #[arg(last = true, value_name = "CHECKER-OPTIONS")]
    pub checker_args: Vec<String>,
}

fn is_target(arg: &str) -> bool {
    arg.starts_with('/') || arg.contains('=')
}

/// Rewrites fsck style arguments into something clap parses.
///
/// Option letters may be bundled, `-C` and `-r` take their descriptor either
/// attached or as the next argument, and every letter the front-end does not
/// know is forwarded to the checkers, as is everything after `--`.
pub fn normalize<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let mut iter = args.into_iter().peekable();
    let mut out: Vec<String> = iter.next().into_iter().collect();
    let mut forwarded = Vec::new();
    let mut for_checker = false;

    while let Some(arg) = iter.next() {
        if for_checker {
            forwarded.push(arg);
            continue;
        }
        match arg.as_str() {
            "--" => {
                for_checker = true;
                continue;
            }
            "--help" | "--version" => {
                out.push(arg);
                continue;
            }
            "--config" => {
                out.push(arg);
                out.extend(iter.next());
                continue;
            }
            a if a.starts_with("--config=") => {
                out.push(arg);
                continue;
            }
            _ => {}
        }
        if is_target(&arg) {
            out.push(arg);
            continue;
        }
        if !arg.starts_with('-') || arg == "-" {
            forwarded.push(arg);
            continue;
        }

        let letters: Vec<char> = arg.chars().skip(1).collect();
        let mut unknown = String::new();
        for (j, &c) in letters.iter().enumerate() {
            let rest: String = letters[j + 1..].iter().collect();
            match c {
                c if FLAGS.contains(c) => out.push(format!("-{c}")),
                'C' | 'r' => {
                    let value = if !rest.is_empty() {
                        Some(rest)
                    } else if iter.peek().is_some_and(|n| n.parse::<u32>().is_ok()) {
                        iter.next()
                    } else {
                        None
                    };
                    out.push(match value {
                        Some(v) => format!("-{c}={v}"),
                        None => format!("-{c}"),
                    });
                    break;
                }
                't' => {
                    out.push("-t".to_string());
                    if !rest.is_empty() {
                        out.push(rest);
                    } else {
                        out.extend(iter.next());
                    }
                    break;
                }
                '-' => {
                    for_checker = true;
                    break;
                }
                other => unknown.push(other),
            }
        }
        if !unknown.is_empty() {
            forwarded.push(format!("-{unknown}"));
        }
    }

    if !forwarded.is_empty() {
        out.push("--".to_string());
        out.extend(forwarded);
    }
    out
}

impl Cli {
    pub fn parse_fsck_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self, clap::Error> {
        Self::try_parse_from(normalize(args))
    }

    /// Compiles `-t`, which may appear only once.
    pub fn type_filter(&self) -> CoreResult<TypeFilter> {
        match self.types.as_slice() {
            [] => Ok(TypeFilter::default()),
            [spec] => TypeFilter::parse(spec),
            _ => Err(CoreError::RepeatedOption("-t")),
        }
    }

    /// Layers the command line over options read from a file.
    pub fn apply(&self, opts: &mut RunOptions) {
        opts.serialize |= self.serialize;
        opts.parallel_root |= self.parallel_root;
        opts.skip_root |= self.skip_root;
        opts.skip_mounted |= self.skip_mounted;
        opts.noexecute |= self.noexecute;
        opts.lock |= self.lock;
        if let Some(fd) = self.progress {
            opts.progress_fd = Some(fd.max(0));
        }
        opts.checker_args.extend(self.checker_args.iter().cloned());
    }
}
