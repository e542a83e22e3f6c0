//! Transaction engine: one command on the wire at a time.
//!
//! [`Link`] handles submit requests into a bounded FIFO channel. A single driver
//! task owns the write half of the transport, the readiness gate and the receive
//! buffer; it serves requests strictly in arrival order and never dispatches a
//! command before the previous one has drained (writes) or been answered
//! (reads). A reader pump feeds it [`TransportEvent`]s.

use std::future::Future;
use std::io;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::codec::{decode, encode, Command, WORD_SLOT_BYTES};
use crate::gate::{LinkState, ReadinessGate};
use crate::transport::{is_fatal_kind, spawn_reader, Transport, TransportEvent};
use crate::{LinkConfig, LinkError};

const TRANSPORT_EVENT_DEPTH: usize = 64;

type Reply = oneshot::Sender<Result<Vec<u16>, LinkError>>;

#[derive(Debug)]
struct Request {
    bytes: Vec<u8>,
    response_words: usize,
    deadline: Instant,
    timeout: Duration,
    reply: Reply,
}

#[derive(Debug)]
enum Message {
    Transact(Request),
    Close(oneshot::Sender<()>),
}

/// Handle to an open debug link.
///
/// Cloning is cheap; every clone submits into the same FIFO queue. The link
/// closes when [`Link::close`] is called or the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Link {
    requests: mpsc::Sender<Message>,
    state: watch::Receiver<LinkState>,
    config: LinkConfig,
    timeout: Duration,
}

impl Link {
    /// Opens a link over the transport produced by `connect`.
    ///
    /// # Errors
    ///
    /// [`LinkError::OpenTimeout`] when `connect` does not resolve within
    /// `config.open_timeout`, [`LinkError::TransportError`] when it fails, and
    /// configuration errors from [`LinkConfig::validate`].
    pub async fn open<T, F>(connect: F, config: LinkConfig) -> Result<Self, LinkError>
    where
        T: Transport,
        F: Future<Output = io::Result<T>>,
    {
        config.validate()?;
        let (gate, state) = ReadinessGate::new();
        gate.opening();

        let stream = match time::timeout(config.open_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                gate.close();
                return Err(err.into());
            }
            Err(_) => {
                gate.close();
                return Err(LinkError::OpenTimeout(config.open_timeout));
            }
        };

        Ok(Self::start(stream, gate, state, config))
    }

    /// Wraps a transport that is already open.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Configuration errors from [`LinkConfig::validate`].
    pub fn attach<T: Transport>(stream: T, config: LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let (gate, state) = ReadinessGate::new();
        gate.opening();
        Ok(Self::start(stream, gate, state, config))
    }

    fn start<T: Transport>(
        stream: T,
        gate: ReadinessGate,
        state: watch::Receiver<LinkState>,
        config: LinkConfig,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (event_tx, events) = mpsc::channel(TRANSPORT_EVENT_DEPTH);
        let (requests, request_rx) = mpsc::channel(config.request_queue_depth);

        let driver = Driver {
            writer,
            requests: request_rx,
            events,
            reader: spawn_reader(reader, event_tx),
            gate,
            rx: Vec::new(),
            stale_settle: config.stale_settle,
        };
        tokio::spawn(driver.run());

        let timeout = config.ready_timeout;
        Self {
            requests,
            state,
            config,
            timeout,
        }
    }

    /// Returns a handle whose transactions use `timeout` instead of the configured bound.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    /// Configuration the link was opened with.
    #[must_use]
    pub const fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Per-transaction bound used by this handle.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// `true` when no command is outstanding and the link is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Runs one command and returns the decoded response (empty for writes).
    ///
    /// # Errors
    ///
    /// Codec errors for malformed commands, [`LinkError::ReadyTimeout`] when the
    /// transaction does not complete within this handle's timeout,
    /// [`LinkError::TransportError`] for transport faults and
    /// [`LinkError::Closed`] once the link is gone.
    pub async fn transact(&self, command: &Command) -> Result<Vec<u16>, LinkError> {
        let bytes = encode(command)?;
        debug!(
            "{:?} {} word(s) at {:#010X}{}",
            command.direction,
            command.length,
            command.address,
            if command.auto_increment { " (incr)" } else { "" }
        );
        self.submit(bytes, command.response_words()).await
    }

    /// Writes a pre-encoded byte sequence through the gate, bypassing the encoder.
    ///
    /// # Errors
    ///
    /// As [`Link::transact`] for a write.
    pub async fn send_raw(&self, bytes: Vec<u8>) -> Result<(), LinkError> {
        debug!("raw {} byte(s)", bytes.len());
        self.submit(bytes, 0).await.map(drop)
    }

    async fn submit(&self, bytes: Vec<u8>, response_words: usize) -> Result<Vec<u16>, LinkError> {
        let deadline = Instant::now() + self.timeout;
        let (reply, response) = oneshot::channel();
        let request = Request {
            bytes,
            response_words,
            deadline,
            timeout: self.timeout,
            reply,
        };

        let exchange = async {
            self.requests
                .send(Message::Transact(request))
                .await
                .map_err(|_| LinkError::Closed)?;
            response.await.map_err(|_| LinkError::Closed)?
        };

        time::timeout_at(deadline, exchange)
            .await
            .unwrap_or(Err(LinkError::ReadyTimeout(self.timeout)))
    }

    /// Closes the link and waits for the transport to shut down.
    ///
    /// Other handles observe [`LinkError::Closed`] afterwards.
    pub async fn close(self) {
        let (done, closed) = oneshot::channel();
        if self.requests.send(Message::Close(done)).await.is_ok() {
            let _ = closed.await;
        }
    }
}

struct Driver<T> {
    writer: WriteHalf<T>,
    requests: mpsc::Receiver<Message>,
    events: mpsc::Receiver<TransportEvent>,
    reader: JoinHandle<()>,
    gate: ReadinessGate,
    rx: Vec<u8>,
    stale_settle: Duration,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        self.gate.signal_idle();
        info!("debug link open");

        let mut closer = None;
        while !self.gate.is_closed() {
            tokio::select! {
                biased;
                event = self.events.recv() => self.on_idle_event(event),
                message = self.requests.recv() => match message {
                    Some(Message::Transact(request)) => self.serve(request).await,
                    Some(Message::Close(done)) => {
                        closer = Some(done);
                        break;
                    }
                    None => break,
                },
            }
        }

        self.shutdown().await;
        if let Some(done) = closer {
            let _ = done.send(());
        }
    }

    /// Handles transport events that arrive while no command is outstanding.
    fn on_idle_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Data(bytes)) => {
                warn!("discarding {} unsolicited byte(s)", bytes.len());
            }
            Some(TransportEvent::Error { kind, message }) => {
                warn!("transport error while idle ({kind}): {message}");
                if is_fatal_kind(kind) {
                    self.gate.close();
                }
            }
            Some(TransportEvent::Closed) | None => {
                info!("transport closed");
                self.gate.close();
            }
        }
    }

    async fn serve(&mut self, request: Request) {
        if request.reply.is_closed() {
            debug!("dropping request abandoned by its caller");
            return;
        }
        if Instant::now() >= request.deadline {
            let _ = request.reply.send(Err(LinkError::ReadyTimeout(request.timeout)));
            return;
        }
        if !self.gate.try_acquire() {
            let _ = request.reply.send(Err(LinkError::Closed));
            return;
        }

        let result = self.execute(&request).await;
        let timed_out = matches!(result, Err(LinkError::ReadyTimeout(_)));
        let fatal = result.as_ref().is_err_and(LinkError::is_fatal);
        let _ = request.reply.send(result);

        if fatal {
            self.gate.close();
            return;
        }
        if timed_out && request.response_words > 0 {
            self.settle().await;
        }
        self.rx.clear();
        self.gate.signal_idle();
    }

    async fn execute(&mut self, request: &Request) -> Result<Vec<u16>, LinkError> {
        self.flush_stale()?;

        trace!("tx {:02X?}", request.bytes);
        match time::timeout_at(request.deadline, self.send(&request.bytes)).await {
            Ok(sent) => sent?,
            Err(_) => return Err(LinkError::ReadyTimeout(request.timeout)),
        }

        if request.response_words == 0 {
            return Ok(Vec::new());
        }

        let expected = request.response_words * WORD_SLOT_BYTES;
        while self.rx.len() < expected {
            match time::timeout_at(request.deadline, self.events.recv()).await {
                Err(_) => return Err(LinkError::ReadyTimeout(request.timeout)),
                Ok(Some(TransportEvent::Data(bytes))) => self.rx.extend_from_slice(&bytes),
                Ok(Some(TransportEvent::Error { kind, message })) => {
                    return Err(LinkError::TransportError { kind, message });
                }
                Ok(Some(TransportEvent::Closed) | None) => {
                    return Err(LinkError::TransportError {
                        kind: io::ErrorKind::UnexpectedEof,
                        message: "transport closed mid-transaction".to_string(),
                    });
                }
            }
        }

        if self.rx.len() > expected {
            warn!(
                "discarding {} byte(s) beyond the expected response",
                self.rx.len() - expected
            );
        }
        decode(&self.rx, request.response_words)
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Drops anything received since the last transaction completed.
    fn flush_stale(&mut self) -> Result<(), LinkError> {
        while let Ok(event) = self.events.try_recv() {
            self.on_idle_event(Some(event));
        }
        self.rx.clear();
        if self.gate.is_closed() {
            return Err(LinkError::Closed);
        }
        Ok(())
    }

    /// Holds the gate after a timed-out read so a late response is not taken
    /// for the answer to the next command.
    async fn settle(&mut self) {
        let until = Instant::now() + self.stale_settle;
        let mut discarded = 0;
        loop {
            match time::timeout_at(until, self.events.recv()).await {
                Err(_) => break,
                Ok(Some(TransportEvent::Data(bytes))) => discarded += bytes.len(),
                Ok(event) => {
                    self.on_idle_event(event);
                    if self.gate.is_closed() {
                        return;
                    }
                }
            }
        }
        if discarded > 0 {
            warn!("discarded {discarded} late byte(s) after a timed-out read");
        }
    }

    async fn shutdown(&mut self) {
        self.gate.close();
        self.requests.close();
        while let Ok(message) = self.requests.try_recv() {
            match message {
                Message::Transact(request) => {
                    let _ = request.reply.send(Err(LinkError::Closed));
                }
                Message::Close(done) => {
                    let _ = done.send(());
                }
            }
        }
        if let Err(err) = self.writer.shutdown().await {
            debug!("transport shutdown failed: {err}");
        }
        self.reader.abort();
        info!("debug link closed");
    }
}
