//! Serial port and terminal setup.

use std::io;

use crossterm::terminal;
use link_core::{Link, LinkConfig};
use log::{debug, info};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::MonitorError;

/// Keeps the terminal in raw mode until dropped.
#[derive(Debug)]
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Switches the terminal to raw mode.
    ///
    /// # Errors
    ///
    /// When the terminal refuses the mode change.
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            debug!("could not restore terminal mode: {err}");
        }
    }
}

fn connect(path: &str, baud: u32) -> io::Result<SerialStream> {
    tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(io::Error::from)
}

/// Opens the serial device as a plain byte stream.
///
/// # Errors
///
/// [`MonitorError::Port`] when the device cannot be opened.
pub fn open_port(path: &str, baud: u32) -> Result<SerialStream, MonitorError> {
    info!("opening {path} at {baud} baud");
    connect(path, baud).map_err(|err| MonitorError::Port {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Opens a debug link on the serial device.
///
/// # Errors
///
/// Errors from [`Link::open`].
pub async fn open_link(path: &str, baud: u32, config: LinkConfig) -> Result<Link, MonitorError> {
    info!("opening debug link on {path} at {baud} baud");
    let path = path.to_string();
    let link = Link::open(async move { connect(&path, baud) }, config).await?;
    Ok(link)
}
