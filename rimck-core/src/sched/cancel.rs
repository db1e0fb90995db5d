// SPDX-License-Identifier: MIT

//! Cooperative cancellation.
//!
//! `SIGINT`/`SIGTERM` only flip a static flag from the handler. Everything
//! else reads that flag through a [`CancelToken`] at the two places the
//! control thread can block: the pass loop and the `wait4` call. Handlers
//! are installed without `SA_RESTART`, so a blocked `wait4` returns `EINTR`
//! and the broadcast to the children happens promptly.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static SIGNALED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SIGNALED.store(true, Ordering::SeqCst);
}

fn install_handler(sig: libc::c_int) -> io::Result<()> {
    // SAFETY: a zeroed sigaction is a valid "no flags, empty mask" value and
    // the handler only touches an atomic.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        sa.sa_flags = 0;
        libc::sigemptyset(&mut sa.sa_mask);
        if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    signals: bool,
}

impl CancelToken {
    /// A token only [`cancel`](Self::cancel) can trip.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token also tripped by `SIGINT` and `SIGTERM`.
    pub fn install() -> io::Result<Self> {
        install_handler(libc::SIGINT)?;
        install_handler(libc::SIGTERM)?;
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            signals: true,
        })
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.signals && SIGNALED.load(Ordering::SeqCst))
    }
}
