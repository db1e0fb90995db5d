// SPDX-License-Identifier: MIT

pub mod lock;
pub mod topology;

pub use lock::*;
pub use topology::*;
