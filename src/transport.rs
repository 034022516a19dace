//! Diameter stream transport
//!
//! Framing rides on the Diameter header itself: byte 0 is the version and
//! bytes 1-3 carry the message length, so a complete message can be cut out
//! of the stream without extra delimiters (RFC 6733 Section 2.1).
//!
//! TCP is implemented here. `Protocol::Sctp` is accepted in configuration
//! for symmetry but the socket layer for it lives outside this crate;
//! dialing or listening over SCTP reports `UnsupportedProtocol`. The accept
//! path runs behind an explicit deadline regardless of protocol, since not
//! every transport honors a native accept deadline.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::config::Protocol;
use crate::error::{DiameterError, DiameterResult};
use crate::message::{DiameterMessage, DIAMETER_HEADER_SIZE};

/// Maximum accepted message size (the RFC allows up to 16MB; anything past
/// this is treated as a framing error)
const MAX_MESSAGE_SIZE: usize = 65536;

/// A framed Diameter connection over a stream transport
pub struct DiameterTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    peer_addr: SocketAddr,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl DiameterTransport {
    /// Wrap an established TCP stream
    pub fn new(stream: TcpStream) -> DiameterResult<Self> {
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            peer_addr,
            read_timeout: None,
            write_timeout: None,
        })
    }

    /// Dial a remote peer, bounded by `connect_timeout`
    pub async fn connect(
        addr: &str,
        protocol: Protocol,
        connect_timeout: Duration,
    ) -> DiameterResult<Self> {
        match protocol {
            Protocol::Tcp => {
                let stream = timeout(connect_timeout, TcpStream::connect(addr))
                    .await
                    .map_err(|_| {
                        DiameterError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "connect timeout",
                        ))
                    })??;
                log::debug!("Connected to {addr} via tcp");
                Self::new(stream)
            }
            Protocol::Sctp => Err(DiameterError::UnsupportedProtocol),
        }
    }

    /// Remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Local socket address
    pub fn local_addr(&self) -> DiameterResult<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// Set per-operation read/write deadlines
    pub fn set_deadlines(&mut self, read: Option<Duration>, write: Option<Duration>) {
        self.read_timeout = read;
        self.write_timeout = write;
    }

    /// Encode and send one message
    pub async fn send(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        let encoded = msg.encode()?;
        let limit = self.write_timeout;
        let write = async {
            self.stream.write_all(&encoded).await?;
            self.stream.flush().await
        };
        match limit {
            Some(limit) => timeout(limit, write).await.map_err(|_| {
                DiameterError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "write timeout",
                ))
            })??,
            None => write.await?,
        }
        Ok(())
    }

    /// Receive one complete message, reading more bytes as needed
    pub async fn recv(&mut self) -> DiameterResult<DiameterMessage> {
        loop {
            if let Some(msg) = self.try_parse_message()? {
                return Ok(msg);
            }

            let limit = self.read_timeout;
            let read = self.stream.read_buf(&mut self.read_buf);
            let n = match limit {
                Some(limit) => timeout(limit, read).await.map_err(|_| {
                    DiameterError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "read timeout",
                    ))
                })??,
                None => read.await?,
            };
            if n == 0 {
                return Err(DiameterError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
        }
    }

    /// Try to cut one complete message out of the read buffer
    fn try_parse_message(&mut self) -> DiameterResult<Option<DiameterMessage>> {
        if self.read_buf.len() < DIAMETER_HEADER_SIZE {
            return Ok(None);
        }

        let msg_len = ((self.read_buf[1] as usize) << 16)
            | ((self.read_buf[2] as usize) << 8)
            | (self.read_buf[3] as usize);

        if msg_len < DIAMETER_HEADER_SIZE || msg_len > MAX_MESSAGE_SIZE {
            return Err(DiameterError::InvalidMessageLength(msg_len as u32));
        }

        if self.read_buf.len() < msg_len {
            return Ok(None);
        }

        let msg_bytes = self.read_buf.split_to(msg_len);
        let mut bytes = msg_bytes.freeze();
        let msg = DiameterMessage::decode(&mut bytes)?;
        Ok(Some(msg))
    }

    /// Shut down the connection
    pub async fn shutdown(&mut self) -> DiameterResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Listener for incoming Diameter connections
pub struct DiameterListener {
    listener: TcpListener,
}

impl DiameterListener {
    /// Bind to the given address
    pub async fn bind(addr: &str, protocol: Protocol) -> DiameterResult<Self> {
        match protocol {
            Protocol::Tcp => {
                let listener = TcpListener::bind(addr).await?;
                Ok(Self { listener })
            }
            Protocol::Sctp => Err(DiameterError::UnsupportedProtocol),
        }
    }

    /// Accept the next connection
    pub async fn accept(&self) -> DiameterResult<DiameterTransport> {
        let (stream, _addr) = self.listener.accept().await?;
        DiameterTransport::new(stream)
    }

    /// Accept the next connection, racing it against a deadline
    ///
    /// Returns `AcceptTimeout` when nothing arrives within `limit`.
    pub async fn accept_timeout(&self, limit: Duration) -> DiameterResult<DiameterTransport> {
        match timeout(limit, self.accept()).await {
            Ok(result) => result,
            Err(_) => Err(DiameterError::AcceptTimeout),
        }
    }

    /// Local address the listener is bound to
    pub fn local_addr(&self) -> DiameterResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the listener, handing accepted transports to a channel
    pub async fn run(self, tx: tokio::sync::mpsc::Sender<DiameterTransport>) -> DiameterResult<()> {
        loop {
            match self.accept().await {
                Ok(transport) => {
                    if tx.send(transport).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Failed to accept Diameter connection: {e}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::{Avp, AvpData};
    use crate::dictionary::avp_code;

    async fn bind_local() -> (DiameterListener, String) {
        let listener = DiameterListener::bind("127.0.0.1:0", Protocol::Tcp)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_send_recv() {
        let (listener, addr) = bind_local().await;

        let handle = tokio::spawn(async move {
            let mut server = listener.accept().await.unwrap();
            let msg = server.recv().await.unwrap();
            let answer = DiameterMessage::new_answer(&msg, vec![]);
            server.send(&answer).await.unwrap();
            server.shutdown().await.unwrap();
        });

        let mut client =
            DiameterTransport::connect(&addr, Protocol::Tcp, Duration::from_secs(5))
                .await
                .unwrap();
        let mut req = DiameterMessage::new_cer(vec![Avp::mandatory(
            avp_code::ORIGIN_HOST,
            AvpData::DiameterIdentity("client.example.com".into()),
        )]);
        req.header.hop_by_hop_id = 7;
        client.send(&req).await.unwrap();

        let answer = client.recv().await.unwrap();
        assert!(answer.header.is_answer());
        assert_eq!(answer.header.command_code, 257);
        assert_eq!(answer.header.hop_by_hop_id, 7);

        client.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_multiple_messages_one_stream() {
        let (listener, addr) = bind_local().await;

        let handle = tokio::spawn(async move {
            let mut server = listener.accept().await.unwrap();
            for _ in 0..3 {
                let msg = server.recv().await.unwrap();
                let answer = DiameterMessage::new_answer(&msg, vec![]);
                server.send(&answer).await.unwrap();
            }
            server.shutdown().await.unwrap();
        });

        let mut client =
            DiameterTransport::connect(&addr, Protocol::Tcp, Duration::from_secs(5))
                .await
                .unwrap();
        for i in 0..3u32 {
            let mut req = DiameterMessage::new_dwr(vec![]);
            req.header.hop_by_hop_id = i;
            client.send(&req).await.unwrap();

            let answer = client.recv().await.unwrap();
            assert!(answer.header.is_answer());
            assert_eq!(answer.header.hop_by_hop_id, i);
        }

        client.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_timeout() {
        let (listener, _addr) = bind_local().await;
        let result = listener.accept_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(DiameterError::AcceptTimeout)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let result =
            DiameterTransport::connect("127.0.0.1:19999", Protocol::Tcp, Duration::from_secs(1))
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sctp_reports_unsupported() {
        let dial =
            DiameterTransport::connect("127.0.0.1:3868", Protocol::Sctp, Duration::from_secs(1))
                .await;
        assert!(matches!(dial, Err(DiameterError::UnsupportedProtocol)));

        let listen = DiameterListener::bind("127.0.0.1:0", Protocol::Sctp).await;
        assert!(matches!(listen, Err(DiameterError::UnsupportedProtocol)));
    }
}
