// SPDX-License-Identifier: MIT

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::checker::{CheckerLocator, SupervisorOptions};
use crate::disk::DEFAULT_LOCK_DIR;
use crate::error::{CoreError, CoreResult};
use crate::sched::SchedulerOptions;

pub const CONFIG_ENV: &str = "RIMCK_CONFIG";

/// Everything a run can be tuned with.
///
/// Read from a TOML file, then overridden by command line flags and finally
/// by the `FSCK_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    pub serialize: bool,
    pub parallel_root: bool,
    pub skip_root: bool,
    pub skip_mounted: bool,
    pub force_all_parallel: bool,
    /// 0 means unlimited.
    pub max_running: usize,
    pub noexecute: bool,
    /// Lock whole disks while checking them.
    pub lock: bool,
    pub lock_dir: Option<PathBuf>,
    /// Colon separated checker search path.
    pub search_path: Option<String>,
    pub default_fstype: Option<String>,
    pub progress_fd: Option<i32>,
    pub checker_args: Vec<String>,
    /// Alternate filesystem table.
    pub fstab: Option<PathBuf>,
}

impl RunOptions {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            CoreError::Config { source, .. } => CoreError::Config {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::Config {
            path: PathBuf::new(),
            source: Box::new(e),
        })
    }

    /// Applies `FSCK_FORCE_ALL_PARALLEL`, `FSCK_MAX_INST`, `FSTAB_FILE` and
    /// `PATH` as seen through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if lookup("FSCK_FORCE_ALL_PARALLEL").is_some() {
            self.force_all_parallel = true;
        }
        if let Some(value) = lookup("FSCK_MAX_INST") {
            self.max_running = value
                .trim()
                .parse()
                .map_err(|_| CoreError::InvalidArgument {
                    option: "FSCK_MAX_INST",
                    value,
                })?;
        }
        if let Some(path) = lookup("FSTAB_FILE").filter(|p| !p.is_empty()) {
            self.fstab = Some(PathBuf::from(path));
        }
        if self.search_path.is_none() {
            self.search_path = lookup("PATH").filter(|p| !p.is_empty());
        }
        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            serialize: self.serialize,
            parallel_root: self.parallel_root,
            skip_root: self.skip_root,
            skip_mounted: self.skip_mounted,
            force_all_parallel: self.force_all_parallel,
            max_running: (self.max_running > 0).then_some(self.max_running),
        }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        let lock_dir = self.lock.then(|| {
            self.lock_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_DIR))
        });
        SupervisorOptions {
            noexecute: self.noexecute,
            progress_fd: self.progress_fd,
            lock_dir,
            checker_args: self.checker_args.clone(),
        }
    }

    pub fn locator(&self) -> CheckerLocator {
        match &self.search_path {
            Some(path) => CheckerLocator::new(path),
            None => CheckerLocator::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_toml() {
        let opts = RunOptions::from_toml_str(
            r#"
            serialize = true
            max_running = 4
            lock = true
            checker_args = ["-p"]
            "#,
        )
        .unwrap();
        assert!(opts.serialize);
        assert_eq!(opts.scheduler_options().max_running, Some(4));
        assert_eq!(
            opts.supervisor_options().lock_dir,
            Some(PathBuf::from(DEFAULT_LOCK_DIR))
        );
        assert_eq!(opts.supervisor_options().checker_args, vec!["-p"]);
    }

    #[test]
    fn test_unknown_key_is_a_config_error() {
        let err = RunOptions::from_toml_str("paralel_root = true").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rimck.toml");
        fs::write(&path, "max_running = \"many\"").unwrap();
        let err = RunOptions::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("rimck.toml"));

        fs::write(&path, "skip_root = true\nlock_dir = \"/tmp/locks\"").unwrap();
        let opts = RunOptions::from_file(&path).unwrap();
        assert!(opts.skip_root);
        assert!(opts.supervisor_options().lock_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut opts = RunOptions::default();
        opts.apply_env(env(&[
            ("FSCK_FORCE_ALL_PARALLEL", ""),
            ("FSCK_MAX_INST", "2"),
            ("FSTAB_FILE", "/etc/fstab.test"),
            ("PATH", "/usr/sbin:/sbin"),
        ]))
        .unwrap();
        assert!(opts.force_all_parallel);
        assert_eq!(opts.max_running, 2);
        assert_eq!(opts.fstab, Some(PathBuf::from("/etc/fstab.test")));
        assert_eq!(opts.search_path.as_deref(), Some("/usr/sbin:/sbin"));
    }

    #[test]
    fn test_zero_max_inst_means_unlimited() {
        let mut opts = RunOptions::default();
        opts.apply_env(env(&[("FSCK_MAX_INST", "0")])).unwrap();
        assert_eq!(opts.scheduler_options().max_running, None);
    }

    #[test]
    fn test_bad_max_inst() {
        let mut opts = RunOptions::default();
        let err = opts.apply_env(env(&[("FSCK_MAX_INST", "lots")])).unwrap_err();
        assert!(err.is_config_error());
    }
}
