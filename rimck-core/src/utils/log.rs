// SPDX-License-Identifier: MIT

use core::sync::atomic::{AtomicU8, Ordering};

#[doc(hidden)]
pub use colored;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Normal = 0,
    Verbose = 1,
    Debug = 2,
}

impl LogLevel {
    /// Maps the number of `-V` flags to a level.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => LogLevel::Normal,
            1 => LogLevel::Verbose,
            _ => LogLevel::Debug,
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Normal as u8);

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Normal,
        1 => LogLevel::Verbose,
        _ => LogLevel::Debug,
    }
}

#[inline]
pub fn verbose() -> bool {
    log_level() >= LogLevel::Verbose
}

#[inline]
pub fn debug() -> bool {
    log_level() >= LogLevel::Debug
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        println!("{}", format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_verbose {
    ($($arg:tt)*) => {
        if $crate::utils::verbose() {
            println!("{}", format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::utils::debug() {
            println!("{}", format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        use $crate::utils::log::colored::Colorize as _;
        eprintln!("{} {}", "rimck:".yellow().bold(), format_args!($($arg)*));
    }};
}
