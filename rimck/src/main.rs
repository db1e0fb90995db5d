// SPDX-License-Identifier: MIT

mod cli;
mod fstab;
mod probe;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::error::ErrorKind;
use rimck_core::catalog::SpecResolver;
use rimck_core::config::CONFIG_ENV;
use rimck_core::utils::{LogLevel, set_log_level};
use rimck_core::*;
use rimck_core::{log_debug, log_info, log_warn};

use crate::cli::Cli;
use crate::fstab::{DEFAULT_FSTAB, Mounts, PROC_MOUNTS, TagResolver};
use crate::probe::Blkid;

/// Upper bound on explicit targets.
const MAX_DEVICES: usize = 32;

fn main() {
    let cli = match Cli::parse_fsck_args(std::env::args()) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::OK,
                _ => ExitStatus::USAGE,
            };
            std::process::exit(code.code());
        }
    };

    let status = match run(cli) {
        Ok(status) => status,
        Err(e) => {
            log_warn!("{e:#}");
            e.downcast_ref::<CoreError>()
                .map(CoreError::exit_status)
                .unwrap_or(ExitStatus::ERROR)
        }
    };
    log_debug!("exit status {status}");
    std::process::exit(status.code());
}

fn load_options(cli: &Cli) -> anyhow::Result<RunOptions> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut opts = match path {
        Some(path) => RunOptions::from_file(&path)?,
        None => RunOptions::default(),
    };
    cli.apply(&mut opts);
    opts.apply_env(|key| std::env::var(key).ok())?;
    Ok(opts)
}

/// Turns tag targets into device paths; other targets are kept as given.
fn resolve_targets(targets: &[String], resolver: &TagResolver) -> CoreResult<Vec<String>> {
    if targets.len() > MAX_DEVICES {
        return Err(CoreError::TooManyDevices);
    }
    targets
        .iter()
        .map(|arg| {
            if !TagResolver::is_tag(arg) {
                return Ok(resolver.resolve(arg).unwrap_or_else(|| arg.clone()));
            }
            resolver.resolve(arg).ok_or_else(|| {
                CoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("couldn't find matching filesystem: {arg}"),
                ))
            })
        })
        .collect()
}

/// Whole-disk locking only makes sense when at most one device is checked.
fn lock_allowed(all: bool, targets: usize) -> bool {
    !all && targets <= 1
}

fn stats_reporter(cli: &Cli) -> CoreResult<StatsReporter> {
    match cli.stats {
        None => Ok(StatsReporter::disabled()),
        Some(None) => Ok(StatsReporter::stdout()),
        Some(Some(fd)) => StatsReporter::to_fd(fd),
    }
}

fn load_catalog(opts: &RunOptions, filter: TypeFilter) -> FilesystemCatalog {
    let path = opts
        .fstab
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FSTAB));
    let table = match fstab::load(&path) {
        Ok(table) => table,
        Err(e) => {
            log_warn!("{}: failed to parse fstab: {e}", path.display());
            fstab::Table::default()
        }
    };
    for line in &table.bad_lines {
        log_warn!("{}: parse error at line {line} -- ignored", path.display());
    }
    log_debug!("Loaded {} filesystem(s) from {}", table.rows.len(), path.display());

    let mounts = Mounts::load(Path::new(PROC_MOUNTS)).unwrap_or_default();
    let probe = Blkid::locate();
    if !probe.is_available() {
        log_debug!("blkid not found, auto types stay unresolved");
    }
    let mut catalog = FilesystemCatalog::new(table.rows)
        .with_filter(filter)
        .with_resolver(TagResolver::default())
        .with_probe(probe)
        .with_mounts(mounts);
    if let Some(fstype) = &opts.default_fstype {
        catalog = catalog.with_default_type(fstype.clone());
    }
    catalog
}

fn run(cli: Cli) -> anyhow::Result<ExitStatus> {
    set_log_level(LogLevel::from_count(cli.verbose));
    let cancel = CancelToken::install().context("cannot install signal handlers")?;

    let mut opts = load_options(&cli)?;
    let filter = cli.type_filter()?;
    let targets = resolve_targets(&cli.targets, &TagResolver::default())?;

    if !cli.no_title {
        log_info!("rimck from rimck {}", env!("CARGO_PKG_VERSION"));
    }

    if opts.lock && !lock_allowed(cli.all, targets.len()) {
        log_warn!("the -l option can be used with one device only -- ignore");
        opts.lock = false;
    }

    let catalog = load_catalog(&opts, filter);
    let supervisor = CheckerSupervisor::new(opts.supervisor_options(), opts.locator(), cancel)
        .with_stats(stats_reporter(&cli)?);
    let mut scheduler = Scheduler::new(
        opts.scheduler_options(),
        catalog,
        supervisor,
        SysfsTopology::default(),
    );

    let mode = if cli.all {
        RunMode::All
    } else {
        RunMode::Devices(targets)
    };
    Ok(scheduler.run(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_targets() {
        let targets: Vec<String> = (0..=MAX_DEVICES).map(|i| format!("/dev/x{i}")).collect();
        let err = resolve_targets(&targets, &TagResolver::default()).unwrap_err();
        assert!(matches!(err, CoreError::TooManyDevices));
        assert_eq!(err.exit_status(), ExitStatus::ERROR);
    }

    #[test]
    fn test_lock_needs_a_single_device() {
        assert!(lock_allowed(false, 0));
        assert!(lock_allowed(false, 1));
        assert!(!lock_allowed(false, 2));
        assert!(!lock_allowed(true, 0));
        assert!(!lock_allowed(true, 1));
    }

    #[test]
    fn test_unresolved_tag_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = TagResolver::with_root(dir.path());
        let err = resolve_targets(&["LABEL=nowhere".into()], &resolver).unwrap_err();
        assert!(err.to_string().contains("couldn't find matching filesystem: LABEL=nowhere"));
    }

    #[test]
    fn test_plain_targets_pass_through() {
        let resolver = TagResolver::with_root("/nonexistent");
        let targets = resolve_targets(&["/dev/does-not-exist".into()], &resolver).unwrap();
        assert_eq!(targets, ["/dev/does-not-exist"]);
    }
}
