// SPDX-License-Identifier: MIT

/// Checker families, as far as the front-end cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerKind {
    /// e2fsck: understands `-C <fd>` and hands progress over on `SIGUSR1`.
    Ext,
    Generic,
}

/// Progress argument for one spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressArg {
    None,
    /// This instance owns the progress token.
    Owner(i32),
    /// Somebody else owns it; the checker stays quiet until signalled.
    Standby(i32),
}

impl CheckerKind {
    pub fn of(fstype: &str) -> Self {
        match fstype {
            "ext2" | "ext3" | "ext4" | "ext4dev" => CheckerKind::Ext,
            _ => CheckerKind::Generic,
        }
    }

    pub fn supports_progress(self) -> bool {
        matches!(self, CheckerKind::Ext)
    }

    /// Full argv, program name first and device last.
    pub fn build_argv(
        self,
        program: &str,
        extra: &[String],
        progress: ProgressArg,
        device: &str,
    ) -> Vec<String> {
        let progress = match progress {
            _ if !self.supports_progress() => None,
            ProgressArg::Owner(fd) => Some(format!("-C{fd}")),
            ProgressArg::Standby(fd) if fd != 0 => Some(format!("-C{}", -fd)),
            _ => None,
        };
        std::iter::once(program.to_string())
            .chain(extra.iter().cloned())
            .chain(progress)
            .chain(std::iter::once(device.to_string()))
            .collect()
    }
}

impl core::fmt::Display for CheckerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            CheckerKind::Ext => "ext",
            CheckerKind::Generic => "generic",
        };
        write!(f, "{s}")
    }
}
