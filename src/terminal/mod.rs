//! Terminal geometry
//!
//! Client resize events arrive as `{cols, rows}` pairs and are applied to the
//! remote pseudo-terminal through a [`SizeQueue`].

mod size_queue;

pub use size_queue::SizeQueue;

use serde::{Deserialize, Serialize};

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Width in columns
    pub cols: u16,
    /// Height in rows
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl From<TerminalSize> for kube::api::TerminalSize {
    fn from(size: TerminalSize) -> Self {
        kube::api::TerminalSize {
            width: size.cols,
            height: size.rows,
        }
    }
}
