//! Raw terminal: the serial port as a plain byte pipe.

use std::io::Write;
use std::time::Duration;

use futures::{Stream, StreamExt};
use log::info;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::MonitorError;
use crate::keys::ETX;

const ESC: u8 = 0x1B;

/// Filters escape sequences out of the incoming byte stream.
///
/// ESC starts collecting a decimal argument; the next control byte ends the
/// collection and is itself rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscapeCollector {
    collecting: bool,
    value: u32,
}

impl EscapeCollector {
    /// Creates a collector outside any escape sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            collecting: false,
            value: 0,
        }
    }

    /// Argument of the most recent escape sequence.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Feeds one byte, appending whatever it renders to `out`.
    pub fn feed(&mut self, byte: u8, out: &mut String) {
        if self.collecting {
            if byte < 0x20 {
                self.collecting = false;
            } else {
                self.value = self
                    .value
                    .wrapping_mul(10)
                    .wrapping_add(u32::from(byte).wrapping_sub(u32::from(b'0')));
            }
        }
        if byte == ESC {
            self.collecting = true;
            self.value = 0;
        }
        if !self.collecting {
            render_raw(byte, out);
        }
    }
}

fn render_raw(byte: u8, out: &mut String) {
    match byte {
        b'\t' => out.push('\t'),
        b'\r' => out.push_str("\r\n"),
        0x20..=u8::MAX => out.push(char::from(byte)),
        _ => out.push('.'),
    }
}

/// Spots two ETX keystrokes within the break window.
#[derive(Debug, Clone, Copy)]
pub struct BreakDetector {
    window: Duration,
    last_etx: Option<Instant>,
}

impl BreakDetector {
    /// Creates a detector with the given window.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_etx: None,
        }
    }

    /// Records a keystroke; `true` when it completes a double ETX.
    pub fn observe(&mut self, byte: u8, now: Instant) -> bool {
        if byte != ETX {
            return false;
        }
        match self.last_etx {
            Some(previous) if now.duration_since(previous) <= self.window => true,
            _ => {
                self.last_etx = Some(now);
                false
            }
        }
    }
}

/// Local keystroke as sent to the target: LF goes out as CR.
#[must_use]
pub const fn map_outgoing(byte: u8) -> u8 {
    if byte == b'\n' {
        b'\r'
    } else {
        byte
    }
}

/// Pipes `keys` to `port` and renders what comes back into `out`.
///
/// Ends when the port closes, `keys` ends, or ETX is typed twice within
/// `break_window`. Every ETX is still forwarded.
///
/// # Errors
///
/// Port read/write failures and terminal write failures.
pub async fn run_raw<P, S, W>(
    port: P,
    mut keys: S,
    out: &mut W,
    break_window: Duration,
) -> Result<(), MonitorError>
where
    P: AsyncRead + AsyncWrite + Unpin,
    S: Stream<Item = std::io::Result<u8>> + Unpin,
    W: Write,
{
    let (mut rx, mut tx) = tokio::io::split(port);
    let mut collector = EscapeCollector::new();
    let mut breaker = BreakDetector::new(break_window);
    let mut buf = [0_u8; 256];

    out.write_all(b"(Connected.)\r\n")?;
    out.flush()?;

    loop {
        tokio::select! {
            read = rx.read(&mut buf) => {
                let n = match read {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(err) => {
                        out.write_all(format!("\r\n(Error: {err})\r\n").as_bytes())?;
                        return Err(err.into());
                    }
                };
                let mut text = String::new();
                for &byte in &buf[..n] {
                    collector.feed(byte, &mut text);
                }
                out.write_all(text.as_bytes())?;
                out.flush()?;
            }
            key = keys.next() => {
                let Some(key) = key else { break };
                let byte = key?;
                let sent = async {
                    tx.write_all(&[map_outgoing(byte)]).await?;
                    tx.flush().await
                };
                if let Err(err) = sent.await {
                    out.write_all(format!("\r\n(Error: {err})\r\n").as_bytes())?;
                    return Err(err.into());
                }
                if breaker.observe(byte, Instant::now()) {
                    info!("double break, closing port");
                    break;
                }
            }
        }
    }

    out.write_all(b"\r\n(Closed)\r\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use futures::stream::{self, StreamExt};
    use rstest::rstest;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
    use tokio::time::Instant;

    use super::{map_outgoing, run_raw, BreakDetector, EscapeCollector};
    use crate::keys::ETX;

    fn render(bytes: &[u8]) -> (String, EscapeCollector) {
        let mut collector = EscapeCollector::new();
        let mut text = String::new();
        for &byte in bytes {
            collector.feed(byte, &mut text);
        }
        (text, collector)
    }

    #[rstest]
    #[case(b"hi\r", "hi\r\n")]
    #[case(b"a\tb", "a\tb")]
    #[case(b"\x01\x7F", ".\x7F")]
    #[case(b"x\x1B12\ry", "x\r\ny")]
    #[case(b"\x1B7", "")]
    fn incoming_bytes_render(#[case] bytes: &[u8], #[case] expected: &str) {
        assert_eq!(render(bytes).0, expected);
    }

    #[test]
    fn escape_arguments_accumulate_in_decimal() {
        let (_, collector) = render(b"\x1B42\x0D");
        assert_eq!(collector.value(), 42);
    }

    #[test]
    fn esc_inside_a_sequence_restarts_it() {
        let (text, collector) = render(b"\x1B9\x1B3\n");
        assert_eq!(text, ".");
        assert_eq!(collector.value(), 3);
    }

    #[test]
    fn lf_goes_out_as_cr() {
        assert_eq!(map_outgoing(b'\n'), b'\r');
        assert_eq!(map_outgoing(b'a'), b'a');
        assert_eq!(map_outgoing(ETX), ETX);
    }

    #[tokio::test(start_paused = true)]
    async fn double_etx_needs_both_inside_the_window() {
        let mut breaker = BreakDetector::new(Duration::from_secs(1));
        let start = Instant::now();

        assert!(!breaker.observe(ETX, start));
        assert!(!breaker.observe(b'a', start + Duration::from_millis(100)));
        assert!(!breaker.observe(ETX, start + Duration::from_millis(1500)));
        assert!(breaker.observe(ETX, start + Duration::from_millis(1900)));
    }

    #[tokio::test]
    async fn raw_session_pipes_both_ways_until_double_break() {
        let (host, mut device) = tokio::io::duplex(256);
        device.write_all(b"OK\r").await.expect("device output");
        let keys = stream::iter([Ok::<u8, io::Error>(b'\n'), Ok(ETX), Ok(ETX)]);
        let mut screen = Vec::new();

        run_raw(host, keys, &mut screen, Duration::from_secs(1))
            .await
            .expect("clean close");

        let mut sent = [0_u8; 3];
        device.read_exact(&mut sent).await.expect("forwarded keys");
        assert_eq!(sent, [b'\r', ETX, ETX]);
        let screen = String::from_utf8(screen).expect("utf-8");
        assert!(screen.starts_with("(Connected.)\r\n"));
        assert!(screen.ends_with("(Closed)\r\n"));
    }

    #[tokio::test]
    async fn raw_session_ends_when_the_port_closes() {
        let (host, device) = tokio::io::duplex(256);
        drop(device);
        let keys = stream::pending::<io::Result<u8>>();
        let mut screen = Vec::new();

        run_raw(host, keys, &mut screen, Duration::from_secs(1))
            .await
            .expect("clean close");

        assert!(String::from_utf8_lossy(&screen).contains("(Closed)"));
    }

    /// Port that never delivers data and refuses every write.
    struct UnpluggedPort;

    impl AsyncRead for UnpluggedPort {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for UnpluggedPort {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failures_are_reported_on_screen() {
        let keys = stream::iter([Ok::<u8, io::Error>(b'a')]).chain(stream::pending());
        let mut screen = Vec::new();

        let result = run_raw(UnpluggedPort, keys, &mut screen, Duration::from_secs(1)).await;

        assert!(result.is_err());
        let screen = String::from_utf8_lossy(&screen);
        assert!(screen.contains("(Error: unplugged)"), "screen: {screen}");
    }
}
