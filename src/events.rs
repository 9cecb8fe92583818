//! Event definitions for the application event loop.
//!
//! Log lines do not travel through here; they arrive on the sink's own
//! `ViewUpdate` queue.

use crossterm::event::{KeyEvent, MouseEvent};

use crate::process::ScriptKind;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// A mouse event received from the user.
    Mouse(MouseEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// A script's completion callback fired.
    ScriptFinished { kind: ScriptKind, code: i32 },
}
