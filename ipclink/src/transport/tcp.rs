//! Real TCP transport backed by tokio.
//!
//! Endpoints are addressed as `host:channel`, where the channel string is a
//! TCP port. Links carry frames in the codec from [`super::frame`]; a
//! corrupt frame is reported as an error so the connection engine tears the
//! link down.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::frame::{encode_frame, try_decode_frame, MAX_FRAME_SIZE};
use super::{Transport, TransportLink, TransportListener};

/// TCP transport.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    /// Create a new TCP transport.
    pub fn new() -> Self {
        Self
    }
}

fn endpoint_addr(host: &str, channel: &str) -> String {
    format!("{host}:{channel}")
}

#[async_trait]
impl Transport for TcpTransport {
    type Link = TcpLink;
    type Listener = TcpTransportListener;

    async fn bind(&self, host: &str, channel: &str) -> io::Result<Self::Listener> {
        let listener = TcpListener::bind(endpoint_addr(host, channel)).await?;
        Ok(TcpTransportListener { inner: listener })
    }

    async fn connect(&self, host: &str, channel: &str) -> io::Result<Self::Link> {
        let stream = TcpStream::connect(endpoint_addr(host, channel)).await?;
        Ok(TcpLink::new(stream))
    }
}

/// Listener wrapper producing framed links.
pub struct TcpTransportListener {
    inner: TcpListener,
}

#[async_trait]
impl TransportListener for TcpTransportListener {
    type Link = TcpLink;

    async fn accept(&mut self) -> io::Result<(Self::Link, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((TcpLink::new(stream), addr.to_string()))
    }

    fn local_addr(&self) -> io::Result<String> {
        Ok(self.inner.local_addr()?.to_string())
    }
}

/// One framed TCP connection.
pub struct TcpLink {
    stream: TcpStream,
    /// Buffer accumulating partial frame reads.
    read_buffer: Vec<u8>,
}

impl TcpLink {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }
}

#[async_trait]
impl TransportLink for TcpLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let encoded =
            encode_frame(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.stream.write_all(&encoded).await
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        loop {
            match try_decode_frame(&self.read_buffer) {
                Ok(Some((payload, consumed))) => {
                    self.read_buffer.drain(..consumed);
                    return Ok(payload);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(io::ErrorKind::ConnectionAborted.into());
            }
            self.read_buffer.extend_from_slice(&chunk[..n]);
        }
    }
}
