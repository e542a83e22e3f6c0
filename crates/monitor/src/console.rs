//! Console terminal: the mailbox protocol driven at a fixed tick.

use std::collections::VecDeque;
use std::io::{self, Write};

use futures::{Stream, StreamExt};
use link_core::Link;
use log::{debug, warn};
use tokio::time::{self, MissedTickBehavior};

use crate::config::TerminalConfig;
use crate::error::MonitorError;
use crate::keys::ETX;

/// Appends the printable form of console output to `out`.
///
/// CR becomes a line break, control bytes are dropped.
pub fn render_console(bytes: &[u8], out: &mut String) {
    for &byte in bytes {
        match byte {
            b'\r' => out.push_str("\r\n"),
            0x20..=u8::MAX => out.push(char::from(byte)),
            _ => {}
        }
    }
}

/// Interactive console bound to one link.
///
/// Keystrokes queue up locally; every tick drains the target's output and
/// forwards at most one queued keystroke.
#[derive(Debug)]
pub struct ConsoleSession<W> {
    link: Link,
    out: W,
    pending: VecDeque<u8>,
    config: TerminalConfig,
    finished: bool,
}

impl<W: Write> ConsoleSession<W> {
    /// Creates a session rendering into `out`.
    pub const fn new(link: Link, out: W, config: TerminalConfig) -> Self {
        Self {
            link,
            out,
            pending: VecDeque::new(),
            config,
            finished: false,
        }
    }

    /// Queues a keystroke; ETX ends the session instead.
    pub fn push_key(&mut self, byte: u8) {
        if byte == ETX {
            debug!("console quit requested");
            self.finished = true;
        } else {
            self.pending.push_back(byte);
        }
    }

    /// `true` once the user asked to leave.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Keystrokes not yet forwarded.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Rendered output sink.
    #[must_use]
    pub const fn output(&self) -> &W {
        &self.out
    }

    /// One poll: drain and render output, then forward one keystroke.
    ///
    /// # Errors
    ///
    /// Link errors from the drain or the forward, and terminal write failures.
    pub async fn tick(&mut self) -> Result<(), MonitorError> {
        let output = self.link.drain_output().await?;
        if !output.is_empty() {
            let mut text = String::new();
            render_console(&output, &mut text);
            self.write_text(&text)?;
        }

        if let Some(byte) = self.pending.front().copied() {
            self.link.send_input_char(byte).await?;
            self.pending.pop_front();
            if self.config.local_echo {
                let mut text = String::new();
                render_console(&[byte], &mut text);
                self.write_text(&text)?;
            }
        }
        Ok(())
    }

    /// Runs until ETX, the end of `keys`, or a fatal link error.
    ///
    /// Keys are read while a poll is in flight, so ETX ends the session even
    /// against a target that has stopped answering. Fatal errors are reported
    /// on the terminal before being returned; recoverable ones are reported
    /// and the loop carries on.
    ///
    /// # Errors
    ///
    /// The fatal [`MonitorError`] that ended the session.
    pub async fn run<S>(&mut self, mut keys: S) -> Result<(), MonitorError>
    where
        S: Stream<Item = io::Result<u8>> + Unpin,
    {
        let mut ticker = time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.finished {
            tokio::select! {
                key = keys.next() => match key {
                    Some(Ok(byte)) => self.push_key(byte),
                    Some(Err(err)) => return Err(err.into()),
                    None => self.finished = true,
                },
                _ = ticker.tick() => {
                    if let Err(err) = self.tick_listening(&mut keys).await {
                        let fatal = matches!(&err, MonitorError::Link(link) if link.is_fatal())
                            || matches!(err, MonitorError::Io(_));
                        if fatal {
                            let _ = self.write_text(&format!("\r\n(Disconnected: {err})\r\n"));
                            return Err(err);
                        }
                        warn!("console poll failed: {err}");
                        let _ = self.write_text(&format!("\r\n(Error: {err})\r\n"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs one tick while still reading `keys`.
    ///
    /// Keys typed meanwhile are queued once the tick settles. ETX abandons the
    /// tick; the engine drops the reply of an abandoned transaction.
    async fn tick_listening<S>(&mut self, keys: &mut S) -> Result<(), MonitorError>
    where
        S: Stream<Item = io::Result<u8>> + Unpin,
    {
        let mut typed = Vec::new();
        let mut quit = false;
        let mut closed = false;
        let result = {
            let tick = self.tick();
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    result = &mut tick => break result,
                    key = keys.next(), if !closed => match key {
                        Some(Ok(ETX)) => {
                            quit = true;
                            break Ok(());
                        }
                        Some(Ok(byte)) => typed.push(byte),
                        Some(Err(err)) => return Err(err.into()),
                        None => closed = true,
                    },
                }
            }
        };
        self.pending.extend(typed);
        if quit {
            self.push_key(ETX);
        }
        if closed {
            self.finished = true;
        }
        result
    }

    fn write_text(&mut self, text: &str) -> Result<(), MonitorError> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use futures::stream::{self, StreamExt};
    use link_core::{Link, LinkConfig, ReadBehavior, SimulatedTarget};
    use tokio::time::Instant;

    use super::{render_console, ConsoleSession};
    use crate::config::TerminalConfig;
    use crate::keys::ETX;

    fn session(target: &SimulatedTarget, config: TerminalConfig) -> ConsoleSession<Vec<u8>> {
        let link = Link::attach(target.connect(4096), LinkConfig::default()).expect("link");
        ConsoleSession::new(link, Vec::new(), config)
    }

    #[test]
    fn rendering_breaks_lines_on_cr_and_drops_controls() {
        let mut text = String::new();
        render_console(b"ok\r\n\x07done", &mut text);
        assert_eq!(text, "ok\r\ndone");
    }

    #[tokio::test]
    async fn each_tick_forwards_at_most_one_key() {
        let target = SimulatedTarget::new();
        target.queue_console_output(b"READY\r");
        let mut console = session(&target, TerminalConfig::default());
        console.push_key(b'h');
        console.push_key(b'i');

        console.tick().await.expect("first tick");
        assert_eq!(console.pending(), 1);
        console.tick().await.expect("second tick");

        assert_eq!(console.pending(), 0);
        assert_eq!(console.output().as_slice(), b"READY\r\n");
        assert_eq!(target.console_input(), b"hi");
    }

    #[tokio::test]
    async fn local_echo_renders_forwarded_keys() {
        let target = SimulatedTarget::new();
        let mut console = session(
            &target,
            TerminalConfig {
                local_echo: true,
                ..TerminalConfig::default()
            },
        );
        console.push_key(b'x');

        console.tick().await.expect("tick");

        assert_eq!(console.output().as_slice(), b"x");
    }

    #[tokio::test]
    async fn etx_finishes_instead_of_queueing() {
        let target = SimulatedTarget::new();
        let mut console = session(&target, TerminalConfig::default());

        console.push_key(ETX);

        assert!(console.is_finished());
        assert_eq!(console.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_until_etx() {
        let target = SimulatedTarget::new();
        target.queue_console_output(b"hello");
        let mut console = session(&target, TerminalConfig::default());
        let keys = stream::iter([Ok::<u8, io::Error>(b'a'), Ok(b'b')])
            .chain(stream::once(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(ETX)
            }))
            .boxed_local();

        console.run(keys).await.expect("clean exit");

        assert_eq!(console.output().as_slice(), b"hello");
        assert_eq!(target.console_input(), b"ab");
    }

    #[tokio::test]
    async fn run_ends_when_input_closes() {
        let target = SimulatedTarget::new();
        let mut console = session(&target, TerminalConfig::default());

        console.run(stream::empty::<io::Result<u8>>().boxed_local()).await.expect("clean exit");

        assert!(console.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn etx_interrupts_a_stalled_poll() {
        let target = SimulatedTarget::new();
        for _ in 0..4 {
            target.push_read_behavior(ReadBehavior::Ignore);
        }
        let mut console = session(&target, TerminalConfig::default());
        let keys = stream::once(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<u8, io::Error>(ETX)
        })
        .chain(stream::pending())
        .boxed_local();
        let started = Instant::now();

        console.run(keys).await.expect("clean exit");

        assert!(console.is_finished());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_typed_during_a_poll_are_queued() {
        let target = SimulatedTarget::new();
        target.push_read_behavior(ReadBehavior::Delay(Duration::from_millis(40)));
        let mut console = session(&target, TerminalConfig::default());
        let keys = stream::once(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<u8, io::Error>(b'z')
        })
        .chain(stream::once(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(ETX)
        }))
        .boxed_local();

        console.run(keys).await.expect("clean exit");

        assert_eq!(target.console_input(), b"z");
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_errors_are_reported_without_disconnecting() {
        let target = SimulatedTarget::new();
        target.push_read_behavior(ReadBehavior::Ignore);
        let link = Link::attach(
            target.connect(4096),
            LinkConfig {
                ready_timeout: Duration::from_millis(100),
                ..LinkConfig::default()
            },
        )
        .expect("link");
        let mut console = ConsoleSession::new(link, Vec::new(), TerminalConfig::default());
        let keys = stream::once(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<u8, io::Error>(ETX)
        })
        .boxed_local();

        console.run(keys).await.expect("recoverable error keeps the session");

        let screen = String::from_utf8_lossy(console.output());
        assert!(screen.contains("(Error: "), "screen: {screen}");
        assert!(!screen.contains("Disconnected"));
    }
}
