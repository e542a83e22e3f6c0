//! Periodic register / I/O port dump.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::{RestorePosition, SavePosition};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{queue, QueueableCommand};
use futures::{Stream, StreamExt};
use link_core::{CpuSnapshot, Link, Register};
use log::warn;
use tokio::time::{self, MissedTickBehavior};

use crate::error::MonitorError;
use crate::keys::ETX;

/// Ports shown by the I/O view.
pub const IO_VIEW_PORTS: usize = 16;

/// Column labels for the register view, in bank order.
pub const REGISTER_LABELS: [&str; 12] = [
    "A al", "B bl", "C cl", "D dl", "X", "Y", "BP", "SP", "IRFL", "PC", "MPtr", "MMap",
];

/// Column labels for the I/O view, one per port.
pub const IO_LABELS: [&str; IO_VIEW_PORTS] = [
    "hh", "mm", "ss", "cc", "t0", "t0", "t1", "t1", "t2", "t2", "t3", "t3", "md", "rh", "rl", "rs",
];

/// What the watch loop samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchView {
    /// CPU register bank.
    Registers,
    /// First sixteen I/O ports.
    Io,
}

impl WatchView {
    const fn label(self) -> &'static str {
        match self {
            Self::Registers => "Reg",
            Self::Io => "I/O",
        }
    }
}

/// Label and value rows for a register snapshot.
#[must_use]
pub fn register_rows(snapshot: &CpuSnapshot) -> (String, String) {
    let mut labels = String::new();
    let mut values = String::new();
    for (label, reg) in REGISTER_LABELS.iter().zip(Register::ALL) {
        let _ = write!(labels, "{label:<4} ");
        let _ = write!(values, "{:04x} ", snapshot.register(reg));
    }
    (labels.trim_end().to_string(), values.trim_end().to_string())
}

/// Label and value rows for I/O ports; ports are shown as bytes.
#[must_use]
pub fn io_rows(ports: &[u16]) -> (String, String) {
    let mut labels = String::new();
    let mut values = String::new();
    for (label, word) in IO_LABELS.iter().zip(ports) {
        let _ = write!(labels, "{label:<2} ");
        let _ = write!(values, "{:02x} ", word.to_le_bytes()[0]);
    }
    (labels.trim_end().to_string(), values.trim_end().to_string())
}

async fn sample(link: &Link, view: WatchView) -> Result<(String, String), MonitorError> {
    Ok(match view {
        WatchView::Registers => register_rows(&link.cpu_snapshot().await?),
        WatchView::Io => io_rows(&link.read_io(0, IO_VIEW_PORTS).await?),
    })
}

fn draw<W: Write>(
    out: &mut W,
    status: &str,
    view: WatchView,
    rows: &(String, String),
    reads: u64,
) -> io::Result<()> {
    queue!(out, RestorePosition, Clear(ClearType::FromCursorDown))?;
    let frame = format!(
        "Status: {status}  View: {}\r\n{}\r\n{}\r\nReads: {reads}\r\n",
        view.label(),
        rows.0,
        rows.1
    );
    out.write_all(frame.as_bytes())?;
    out.flush()
}

/// Samples `view` every `interval` until `q`, ETX or the end of `keys`.
///
/// `r` and `i` switch between the register and I/O views.
///
/// # Errors
///
/// Fatal link errors, and terminal write failures.
pub async fn run_watch<S, W>(
    link: &Link,
    mut view: WatchView,
    interval: Duration,
    mut keys: S,
    out: &mut W,
) -> Result<(), MonitorError>
where
    S: Stream<Item = io::Result<u8>> + Unpin,
    W: Write,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reads = 0_u64;
    let mut rows = (String::new(), String::new());
    out.queue(SavePosition)?;

    loop {
        tokio::select! {
            key = keys.next() => {
                if apply_key(key, &mut view)? {
                    return Ok(());
                }
            }
            _ = ticker.tick() => {
                let sampled_view = view;
                let result = {
                    let sampling = sample(link, sampled_view);
                    tokio::pin!(sampling);
                    loop {
                        tokio::select! {
                            result = &mut sampling => break result,
                            key = keys.next() => {
                                if apply_key(key, &mut view)? {
                                    return Ok(());
                                }
                            }
                        }
                    }
                };
                let status = match result {
                    Ok(_) if view != sampled_view => continue,
                    Ok(sampled) => {
                        reads += 1;
                        rows = sampled;
                        "Connected".to_string()
                    }
                    Err(MonitorError::Link(err)) if !err.is_fatal() => {
                        warn!("watch sample failed: {err}");
                        format!("Error ({err})")
                    }
                    Err(err) => {
                        draw(out, "Disconnected", view, &rows, reads)?;
                        return Err(err);
                    }
                };
                draw(out, &status, view, &rows, reads)?;
            }
        }
    }
}

/// Applies one watch keystroke; `true` when it ends the watch.
fn apply_key(key: Option<io::Result<u8>>, view: &mut WatchView) -> Result<bool, MonitorError> {
    match key {
        None | Some(Ok(b'q' | ETX)) => return Ok(true),
        Some(Ok(b'r')) => *view = WatchView::Registers,
        Some(Ok(b'i')) => *view = WatchView::Io,
        Some(Ok(_)) => {}
        Some(Err(err)) => return Err(err.into()),
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use futures::stream::{self, StreamExt};
    use link_core::{CpuSnapshot, Link, LinkConfig, ReadBehavior, SimulatedTarget, IO_BASE};
    use tokio::time::Instant;

    use super::{io_rows, register_rows, run_watch, WatchView};
    use crate::keys::ETX;

    #[test]
    fn register_rows_line_up_with_labels() {
        let mut bank = [0_u16; 16];
        bank[0] = 0x00AB;
        bank[9] = 0x2000;
        let snapshot = CpuSnapshot::from_words(&bank).expect("full bank");

        let (labels, values) = register_rows(&snapshot);

        assert!(labels.starts_with("A al B bl C cl"));
        assert!(labels.ends_with("MPtr MMap"));
        assert!(values.starts_with("00ab 0000"));
        assert_eq!(values.split(' ').nth(9), Some("2000"));
        assert_eq!(values.split(' ').count(), 12);
    }

    #[test]
    fn io_rows_show_low_bytes() {
        let (labels, values) = io_rows(&[0x1234, 0x0005, 0x00FF]);
        assert_eq!(labels, "hh mm ss");
        assert_eq!(values, "34 05 ff");
    }

    #[tokio::test(start_paused = true)]
    async fn watch_samples_until_quit() {
        let target = SimulatedTarget::new();
        target.set_word(IO_BASE, 0x0042);
        let link = Link::attach(target.connect(4096), LinkConfig::default()).expect("link");
        let keys = stream::once(async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok::<u8, io::Error>(b'q')
        })
        .boxed_local();
        let mut screen = Vec::new();

        run_watch(&link, WatchView::Io, Duration::from_millis(50), keys, &mut screen)
            .await
            .expect("quit");

        let screen = String::from_utf8_lossy(&screen);
        assert!(screen.contains("View: I/O"));
        assert!(screen.contains("42 00 00"));
        assert!(target.records().len() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quit_interrupts_a_stalled_sample() {
        let target = SimulatedTarget::new();
        for _ in 0..4 {
            target.push_read_behavior(ReadBehavior::Ignore);
        }
        let link = Link::attach(target.connect(4096), LinkConfig::default()).expect("link");
        let keys = stream::once(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<u8, io::Error>(ETX)
        })
        .chain(stream::pending())
        .boxed_local();
        let mut screen = Vec::new();
        let started = Instant::now();

        run_watch(&link, WatchView::Registers, Duration::from_millis(50), keys, &mut screen)
            .await
            .expect("quit");

        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
