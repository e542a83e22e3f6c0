//! Terminal front ends for the Retroputer debug link.

/// Monitor error types.
pub mod error;
pub use error::{ImageError, MonitorError};

/// Terminal loop settings.
pub mod config;
pub use config::{
    TerminalConfig, DEFAULT_BREAK_WINDOW, DEFAULT_LINK_BAUD, DEFAULT_PORT_PATH, DEFAULT_RAW_BAUD,
    DEFAULT_TICK,
};

/// Memory image loading and upload.
pub mod image;
pub use image::{load_image, upload, words_from_binary, words_from_text, ImageFormat};

/// Keyboard input.
pub mod keys;
pub use keys::{key_byte, key_stream, ETX};

/// Mailbox console loop.
pub mod console;
pub use console::{render_console, ConsoleSession};

/// Raw byte-pipe terminal.
pub mod raw;
pub use raw::{map_outgoing, run_raw, BreakDetector, EscapeCollector};

/// Register and I/O watch view.
pub mod watch;
pub use watch::{io_rows, register_rows, run_watch, WatchView};

/// Port and terminal setup.
pub mod session;
pub use session::{open_link, open_port, RawModeGuard};

use env_logger as _;

#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
