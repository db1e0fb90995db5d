// SPDX-License-Identifier: MIT

//! Checker exit status bits.
//!
//! Every `fsck.<type>` program reports its result as a small bitmask. The
//! front-end ORs all of them together, so the final status carries the worst
//! outcome of every check that ran.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExitStatus: i32 {
        /// Filesystem errors corrected.
        const NONDESTRUCT = 0x01;
        /// System should be rebooted.
        const DESTRUCT = 0x02;
        /// Filesystem errors left uncorrected.
        const UNCORRECTED = 0x04;
        /// Operational error.
        const ERROR = 0x08;
        /// Usage or syntax error.
        const USAGE = 0x10;
        /// Check canceled by user request.
        const CANCELED = 0x20;
        /// Shared library error.
        const LIBRARY = 0x80;
    }
}

impl ExitStatus {
    pub const OK: ExitStatus = ExitStatus::empty();

    /// Wraps a raw child exit code, keeping bits we have no name for.
    #[inline]
    pub fn from_code(code: i32) -> Self {
        ExitStatus::from_bits_retain(code)
    }

    #[inline]
    pub fn code(self) -> i32 {
        self.bits()
    }

    /// Anything worse than "errors corrected" stops a run after the root check.
    #[inline]
    pub fn is_beyond_nondestruct(self) -> bool {
        self.bits() > ExitStatus::NONDESTRUCT.bits()
    }
}

impl core::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.bits())
    }
}
