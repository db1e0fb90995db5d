// SPDX-License-Identifier: MIT

use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_SEARCH_PATH: &str = "/sbin";

/// Finds `fsck.<type>` programs along a colon-separated search path.
#[derive(Debug, Clone)]
pub struct CheckerLocator {
    search_path: OsString,
}

impl CheckerLocator {
    pub fn new(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: search_path.into(),
        }
    }

    /// `$PATH` when set and non-empty, else `/sbin`.
    pub fn from_env() -> Self {
        match std::env::var_os("PATH") {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::new(DEFAULT_SEARCH_PATH),
        }
    }

    pub fn search_path(&self) -> &OsString {
        &self.search_path
    }

    /// `ext4` becomes `fsck.ext4`; names already carrying the prefix are kept.
    pub fn program_name(fstype: &str) -> String {
        if fstype.starts_with("fsck.") {
            fstype.to_string()
        } else {
            format!("fsck.{fstype}")
        }
    }

    pub fn find(&self, fstype: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(Self::program_name(fstype), Some(&self.search_path), cwd).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_program_name() {
        assert_eq!(CheckerLocator::program_name("ext4"), "fsck.ext4");
        assert_eq!(CheckerLocator::program_name("fsck.xfs"), "fsck.xfs");
    }

    #[test]
    fn test_search_order_and_executable_bit() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        // not executable, must be skipped
        std::fs::write(first.path().join("fsck.ext4"), "").unwrap();
        let exe = second.path().join("fsck.ext4");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::join_paths([first.path(), second.path()]).unwrap();
        let locator = CheckerLocator::new(path);
        assert_eq!(locator.find("ext4"), Some(exe));
        assert_eq!(locator.find("xfs"), None);
    }
}
