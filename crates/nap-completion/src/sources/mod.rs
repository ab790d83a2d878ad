//! Intrinsic completion sources bundled with the crate
//!
//! - [`around`]: words from buffer lines near the cursor
//! - [`buffers`]: words from every open buffer, pushed by the host
//! - [`lsp`]: candidates pushed by an out-of-process language server client
//!   through notifications
//! - [`paths`]: filesystem entries for the path before the cursor

pub mod around;
pub mod buffers;
pub mod lsp;
pub mod paths;
