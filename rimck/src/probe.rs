// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::process::{Command, Stdio};

use rimck_core::catalog::TypeProbe;

/// Detects filesystem types with the host `blkid`.
#[derive(Debug, Clone, Default)]
pub struct Blkid {
    program: Option<PathBuf>,
}

impl Blkid {
    /// Uses `blkid` from `$PATH`; without one every probe comes back empty.
    pub fn locate() -> Self {
        Self {
            program: which::which("blkid").ok(),
        }
    }

    #[cfg(test)]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

fn parse_type(stdout: &[u8]) -> Option<String> {
    let out = String::from_utf8_lossy(stdout);
    let mut lines = out.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    // more than one signature found
    if lines.next().is_some() {
        return None;
    }
    Some(first.to_string())
}

impl TypeProbe for Blkid {
    fn probe(&self, device: &str) -> Option<String> {
        let program = self.program.as_ref()?;
        let output = Command::new(program)
            .args(["-o", "value", "-s", "TYPE", device])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_type(&output.stdout)
    }
}
