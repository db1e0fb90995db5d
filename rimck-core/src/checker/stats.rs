// SPDX-License-Identifier: MIT

//! Per-instance statistics (`-r`).

use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::FromRawFd;

use crate::checker::instance::CheckInstance;
use crate::error::{CoreError, CoreResult};

fn secs(d: time::Duration) -> String {
    format!("{}.{:06}", d.whole_seconds(), d.subsec_microseconds())
}

enum Format {
    /// Human readable, on stdout.
    Human,
    /// Space separated, for a caller supplied descriptor.
    Machine,
}

pub struct StatsReporter {
    sink: Option<(Format, Box<dyn Write>)>,
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl StatsReporter {
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn stdout() -> Self {
        Self {
            sink: Some((Format::Human, Box::new(io::stdout()))),
        }
    }

    /// Takes ownership of an inherited descriptor.
    pub fn to_fd(fd: i32) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidArgument {
            option: "-r",
            value: fd.to_string(),
        };
        if fd < 0 {
            return Err(invalid());
        }
        // SAFETY: F_GETFD only inspects the descriptor table.
        if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
            return Err(invalid());
        }
        // SAFETY: the descriptor is open and handed to us by the caller.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self::to_writer(file))
    }

    pub fn to_writer(writer: impl Write + 'static) -> Self {
        Self {
            sink: Some((Format::Machine, Box::new(writer))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn report(&mut self, inst: &CheckInstance) -> io::Result<()> {
        let Some((format, out)) = self.sink.as_mut() else {
            return Ok(());
        };
        let ru = inst.rusage();
        match format {
            Format::Machine => writeln!(
                out,
                "{} {} {} {} {} {}",
                inst.device(),
                inst.exit_status(),
                ru.max_rss,
                secs(inst.elapsed()),
                secs(ru.user),
                secs(ru.system),
            )?,
            Format::Human => writeln!(
                out,
                "{}: status {}, rss {}, real {}, user {}, sys {}",
                inst.device(),
                inst.exit_status(),
                ru.max_rss,
                secs(inst.elapsed()),
                secs(ru.user),
                secs(ru.system),
            )?,
        }
        out.flush()
    }
}
