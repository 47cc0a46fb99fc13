//! Websocket connection pump.
//!
//! Each connect request gets its own thread that owns the socket: it opens
//! the connection, forwards inbound frames as [`LinkEvent`]s, and writes
//! frames queued through the returned [`WsHandle`]. The session never blocks
//! on the network.

use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::channel::{ConnectRequest, ConnectionHandle, LinkEvent, ABNORMAL_CLOSE, NORMAL_CLOSE};
use super::protocol::Payload;
use crate::error::ConnectionError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Bound on the TCP connect and again on the websocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Opens connections for the channel.
pub trait Connector: Send {
    fn open(&self, request: ConnectRequest);
}

enum PumpCommand {
    Send(String),
    Close(u16),
}

/// Write side handed to the channel once a socket is open.
pub struct WsHandle {
    tx: Sender<PumpCommand>,
}

impl ConnectionHandle for WsHandle {
    fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.tx
            .send(PumpCommand::Send(text))
            .map_err(|_| ConnectionError::Closed)
    }

    fn close(&mut self, code: u16) {
        let _ = self.tx.send(PumpCommand::Close(code));
    }
}

/// Spawns one pump thread per connect request, reporting into `events`.
pub struct WsConnector<E> {
    events: Sender<E>,
    poll_interval: Duration,
    connect_timeout: Duration,
}

impl<E> WsConnector<E>
where
    E: From<LinkEvent> + Send + 'static,
{
    pub fn new(events: Sender<E>) -> Self {
        Self {
            events,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl<E> Connector for WsConnector<E>
where
    E: From<LinkEvent> + Send + 'static,
{
    fn open(&self, request: ConnectRequest) {
        let events = self.events.clone();
        let poll_interval = self.poll_interval;
        let connect_timeout = self.connect_timeout;
        let spawned = thread::Builder::new()
            .name(format!("ws-pump-{}", request.attempt))
            .spawn(move || run_pump(request, events, poll_interval, connect_timeout));
        if let Err(e) = spawned {
            log::error!("failed to spawn websocket pump: {}", e);
        }
    }
}

fn run_pump<E: From<LinkEvent>>(
    request: ConnectRequest,
    events: Sender<E>,
    poll: Duration,
    connect_timeout: Duration,
) {
    let attempt = request.attempt;
    let emit = |event: LinkEvent| events.send(E::from(event)).is_ok();

    let mut socket = match open_socket(&request.url, connect_timeout) {
        Ok(socket) => socket,
        Err(error) => {
            emit(LinkEvent::Failed { attempt, error });
            return;
        }
    };
    if let Err(e) = set_read_timeout(&mut socket, poll) {
        log::warn!("could not set socket read timeout: {}", e);
    }

    let (tx, rx) = mpsc::channel();
    if !emit(LinkEvent::Opened {
        attempt,
        handle: Box::new(WsHandle { tx }),
    }) {
        let _ = socket.close(None);
        return;
    }

    let code = pump(&mut socket, &rx, &emit, attempt);
    emit(LinkEvent::Closed { attempt, code });
}

/// Connect and handshake, each bounded by `timeout`. Only plain `ws://` is
/// supported; this build carries no TLS backend.
fn open_socket(url: &Url, timeout: Duration) -> Result<Socket, ConnectionError> {
    if url.scheme() != "ws" {
        return Err(ConnectionError::Connect(format!(
            "{}:// is not supported without TLS",
            url.scheme()
        )));
    }
    let addrs = url
        .socket_addrs(|| Some(80))
        .map_err(|e| ConnectionError::Connect(format!("resolve {}: {}", url, e)))?;
    let stream = connect_any(&addrs, timeout)
        .map_err(|e| ConnectionError::Connect(format!("{}: {}", url, e)))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    let (socket, _response) = tungstenite::client(url.as_str(), MaybeTlsStream::Plain(stream))
        .map_err(|e| ConnectionError::Connect(format!("handshake with {}: {}", url, e)))?;
    Ok(socket)
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last = std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses");
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// Runs until the connection ends; returns the close code to report.
fn pump(
    socket: &mut Socket,
    commands: &Receiver<PumpCommand>,
    emit: &dyn Fn(LinkEvent) -> bool,
    attempt: u64,
) -> u16 {
    loop {
        loop {
            match commands.try_recv() {
                Ok(PumpCommand::Send(text)) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        log::warn!("websocket send failed: {}", e);
                        return ABNORMAL_CLOSE;
                    }
                }
                Ok(PumpCommand::Close(code)) => {
                    close_socket(socket, code);
                    return code;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    close_socket(socket, NORMAL_CLOSE);
                    return NORMAL_CLOSE;
                }
            }
        }

        let payload = match socket.read() {
            Ok(Message::Text(text)) => Payload::Text(text),
            Ok(Message::Binary(bytes)) => Payload::Binary(bytes),
            Ok(Message::Close(frame)) => {
                let _ = socket.flush();
                return frame
                    .map(|f| u16::from(f.code))
                    .unwrap_or(u16::from(CloseCode::Status));
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(tungstenite::Error::ConnectionClosed) => return NORMAL_CLOSE,
            Err(e) => {
                log::warn!("websocket read failed: {}", e);
                return ABNORMAL_CLOSE;
            }
        };

        if !emit(LinkEvent::Message { attempt, payload }) {
            close_socket(socket, NORMAL_CLOSE);
            return NORMAL_CLOSE;
        }
    }
}

fn close_socket(socket: &mut Socket, code: u16) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    };
    if let Err(e) = socket.close(Some(frame)) {
        log::debug!("websocket close: {}", e);
    }
    let _ = socket.flush();
}

#[allow(unreachable_patterns)]
fn set_read_timeout(
    socket: &mut Socket,
    timeout: Duration,
) -> std::io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}
