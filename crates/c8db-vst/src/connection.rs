//! One multiplexed stream connection
//!
//! A [`VstConnection`] owns a single TCP (optionally TLS) stream. Requests
//! from any number of tasks share it concurrently: each exchange registers
//! its message id in a dispatch table, writes its chunks back to back under
//! the writer lock, and waits on a oneshot for the reader task to deliver
//! the matching response. The reader is the only part that touches the
//! receive side; when it dies, every registered waiter gets a transport
//! error and the connection flips to closed so the pool layer can reopen
//! it. With credentials configured, the connection stays closed to callers
//! until the server has accepted them.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use c8db_net::{
    ClientConfig, Codec, Connection, ConnectionFactory, Credentials, Error, HostDescription,
    Request, Response, Result,
};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::{debug, trace, warn};

use crate::chunk::{CHUNK_HEADER_LEN, Chunk, ChunkHeader};
use crate::message::{Message, MessageAssembler, next_message_id, split_message};

/// Protocol hello written once per stream before any chunk
pub const PROTOCOL_PREAMBLE: &[u8] = b"VST/1.1\r\n\r\n";

trait VstStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> VstStream for T {}

type PendingTable = Mutex<HashMap<u64, oneshot::Sender<Bytes>>>;

fn not_connected() -> Error {
    Error::transport(io::Error::new(
        io::ErrorKind::NotConnected,
        "connection not open",
    ))
}

/// Multiplexing stream connection
pub struct VstConnection {
    host: HostDescription,
    codec: Arc<dyn Codec>,
    credentials: Option<Credentials>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    chunk_size: usize,
    tls: Option<Arc<rustls::ClientConfig>>,
    open: AtomicBool,
    alive: Arc<AtomicBool>,
    init: tokio::sync::Mutex<()>,
    writer: tokio::sync::Mutex<Option<WriteHalf<Box<dyn VstStream>>>>,
    pending: Arc<PendingTable>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl VstConnection {
    /// Connection for `host`, configured but not yet connected
    pub fn new(host: HostDescription, config: &ClientConfig, codec: Arc<dyn Codec>) -> Self {
        Self {
            host,
            codec,
            credentials: config.credentials.clone(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            chunk_size: config.chunk_size,
            tls: config.tls.clone(),
            open: AtomicBool::new(false),
            alive: Arc::new(AtomicBool::new(false)),
            init: tokio::sync::Mutex::new(()),
            writer: tokio::sync::Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            reader: Mutex::new(None),
        }
    }

    async fn connect_stream(&self) -> Result<Box<dyn VstStream>> {
        let address = (self.host.host(), self.host.port());
        let tcp = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(address))
                .await
                .map_err(|_| {
                    Error::transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connecting to {} timed out", self.host),
                    ))
                })??,
            None => TcpStream::connect(address).await?,
        };
        tcp.set_nodelay(true)?;

        let mut stream: Box<dyn VstStream> = match &self.tls {
            Some(tls) => {
                let connector = TlsConnector::from(Arc::clone(tls));
                let domain = ServerName::try_from(self.host.host().to_owned())
                    .map_err(|_| Error::invalid_endpoint(self.host.to_string()))?;
                Box::new(connector.connect(domain, tcp).await?)
            }
            None => Box::new(tcp),
        };
        stream.write_all(PROTOCOL_PREAMBLE).await?;
        stream.flush().await?;
        Ok(stream)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        let head = self.codec.encode_auth(
            credentials.scheme(),
            credentials.user(),
            credentials.secret(),
        )?;
        let message = Message::new(next_message_id(), head, None);
        let content = self.roundtrip(&message).await?;
        let response = self.decode_response(content)?;
        response
            .check_error(self.codec.as_ref())
            .map_err(|err| Error::authentication(err.to_string()))?;
        debug!(host = %self.host, "authenticated");
        Ok(())
    }

    /// Register interest in a message id, write the message, await its
    /// response.
    async fn roundtrip(&self, message: &Message) -> Result<Bytes> {
        let receiver = {
            let (sender, receiver) = oneshot::channel();
            self.pending.lock().insert(message.id(), sender);
            receiver
        };

        if let Err(err) = self.send_chunks(message).await {
            self.pending.lock().remove(&message.id());
            return Err(err);
        }
        // The reader drains the table when it dies; this re-check closes the
        // window where it died before the registration above.
        if !self.alive.load(Ordering::Acquire) {
            self.pending.lock().remove(&message.id());
            return Err(not_connected());
        }

        let received = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.lock().remove(&message.id());
                    return Err(Error::transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("request to {} timed out", self.host),
                    )));
                }
            },
            None => receiver.await,
        };
        received.map_err(|_| {
            Error::transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("connection to {} closed mid-request", self.host),
            ))
        })
    }

    async fn send_chunks(&self, message: &Message) -> Result<()> {
        let mut frames = Vec::new();
        for chunk in split_message(message, self.chunk_size)? {
            frames.push(chunk.encode()?);
        }

        // One lock span per message keeps its chunks contiguous on the wire
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(not_connected)?;
        for frame in &frames {
            writer.write_all(frame).await?;
        }
        writer.flush().await?;
        trace!(
            host = %self.host,
            message_id = message.id(),
            chunks = frames.len(),
            "message sent"
        );
        Ok(())
    }

    fn decode_response(&self, content: Bytes) -> Result<Response> {
        let head_len = self.codec.head_len(&content)?;
        let mut response = self.codec.decode_response_head(&content[..head_len])?;
        if head_len < content.len() {
            response.attach_body(content.slice(head_len..));
        }
        Ok(response)
    }
}

#[async_trait]
impl Connection for VstConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.alive.load(Ordering::Acquire)
    }

    async fn open(&self) -> Result<()> {
        let _init = self.init.lock().await;
        if self.is_open() {
            return Ok(());
        }

        // A reopen starts closed to callers until its handshake settles
        self.open.store(false, Ordering::Release);
        let stream = self.connect_stream().await?;
        let (read_half, write_half) = tokio::io::split(stream);
        *self.writer.lock().await = Some(write_half);

        self.alive.store(true, Ordering::Release);
        let handle = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&self.pending),
            Arc::clone(&self.alive),
            self.host.clone(),
        ));
        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
        debug!(host = %self.host, tls = self.tls.is_some(), "stream connected");

        if let Some(credentials) = self.credentials.clone() {
            if let Err(err) = self.authenticate(&credentials).await {
                self.close().await;
                return Err(err);
            }
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn execute(&self, request: &Request) -> Result<Response> {
        if !self.is_open() {
            return Err(not_connected());
        }
        let head = self.codec.encode_request_head(request)?;
        let message = Message::new(next_message_id(), head, request.body().cloned());
        let content = self.roundtrip(&message).await?;
        self.decode_response(content)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.alive.store(false, Ordering::Release);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        drain_pending(&self.pending);
    }
}

impl fmt::Debug for VstConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VstConnection")
            .field("host", &self.host)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Receive side: reads chunks, assembles messages, dispatches by id.
///
/// Runs until the stream errors, the peer closes, or a framing violation
/// shows the stream can no longer be trusted. All exits mark the connection
/// closed and fail every in-flight request.
async fn read_loop(
    mut reader: ReadHalf<Box<dyn VstStream>>,
    pending: Arc<PendingTable>,
    alive: Arc<AtomicBool>,
    host: HostDescription,
) {
    let mut assembler = MessageAssembler::default();
    loop {
        match read_chunk(&mut reader).await {
            Ok(chunk) => match assembler.push(chunk) {
                Ok(Some((id, content))) => {
                    let sender = pending.lock().remove(&id);
                    match sender {
                        Some(sender) => {
                            let _ = sender.send(content);
                        }
                        None => {
                            trace!(host = %host, message_id = id, "response without a waiter");
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(host = %host, error = %err, "framing violation, dropping connection");
                    break;
                }
            },
            Err(err) => {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    debug!(host = %host, "stream closed by peer");
                } else {
                    warn!(host = %host, error = %err, "stream read failed");
                }
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
    drain_pending(&pending);
}

async fn read_chunk(reader: &mut ReadHalf<Box<dyn VstStream>>) -> io::Result<Chunk> {
    let mut header_buf = [0u8; CHUNK_HEADER_LEN];
    reader.read_exact(&mut header_buf).await?;
    let header = ChunkHeader::decode(&header_buf)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    let mut payload = vec![0u8; header.content_length as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Chunk {
        header,
        payload: Bytes::from(payload),
    })
}

fn drain_pending(pending: &PendingTable) {
    // Collect first so the senders drop outside the lock; each drop fails
    // its waiter with a closed-channel error.
    let waiters: Vec<oneshot::Sender<Bytes>> =
        pending.lock().drain().map(|(_, sender)| sender).collect();
    drop(waiters);
}

/// Builds [`VstConnection`]s for the pool layer
pub struct VstConnectionFactory {
    config: ClientConfig,
    codec: Arc<dyn Codec>,
}

impl VstConnectionFactory {
    /// Factory applying `config` to every connection it creates
    pub fn new(config: ClientConfig, codec: Arc<dyn Codec>) -> Self {
        Self { config, codec }
    }
}

impl ConnectionFactory for VstConnectionFactory {
    fn create(&self, host: &HostDescription) -> Arc<dyn Connection> {
        Arc::new(VstConnection::new(
            host.clone(),
            &self.config,
            Arc::clone(&self.codec),
        ))
    }
}
