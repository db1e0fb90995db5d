// SPDX-License-Identifier: MIT

pub mod instance;
pub mod kind;
pub mod locator;
pub mod stats;
pub mod supervisor;

pub use instance::*;
pub use kind::*;
pub use locator::*;
pub use stats::*;
pub use supervisor::*;
