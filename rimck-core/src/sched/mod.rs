// SPDX-License-Identifier: MIT

pub mod cancel;
pub mod scheduler;

pub use cancel::*;
pub use scheduler::*;
