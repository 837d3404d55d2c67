// SPDX-License-Identifier: GPL-3.0-only

//! Depth keying: the per-pixel foreground/background decision

mod history;
mod remover;

pub use history::DepthHistory;
pub use remover::{BackgroundRemover, KeyingSettings};
