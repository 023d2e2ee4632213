//! One authenticated NNTP session.
//!
//! Plain TCP or implicit TLS, AUTHINFO USER/PASS, and the two article
//! primitives triage needs: STAT (existence) and BODY (fetch).

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};

use super::NntpError;
use crate::nzb::{decode_yenc, YencError};

/// Watchdog for one STAT round trip.
const STAT_TIMEOUT: Duration = Duration::from_secs(5);
/// Watchdog for one BODY fetch.
const BODY_TIMEOUT: Duration = Duration::from_secs(30);
/// Watchdog for connect + greeting + auth.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// A segment body larger than this is a protocol violation.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

enum StreamType {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Unifies the plain and TLS transports behind one AsyncRead/AsyncWrite.
struct NntpStream {
    inner: StreamType,
}

impl tokio::io::AsyncRead for NntpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.inner {
            StreamType::Plain(s) => Pin::new(s).poll_read(cx, buf),
            StreamType::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for NntpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut self.inner {
            StreamType::Plain(s) => Pin::new(s).poll_write(cx, buf),
            StreamType::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.inner {
            StreamType::Plain(s) => Pin::new(s).poll_flush(cx),
            StreamType::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.inner {
            StreamType::Plain(s) => Pin::new(s).poll_shutdown(cx),
            StreamType::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Result of a STAT probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOutcome {
    /// Article exists (223).
    Present,
    /// Article not found (430).
    Missing,
}

/// An authenticated NNTP session.
pub struct NntpClient {
    stream: BufReader<NntpStream>,
}

impl NntpClient {
    /// Connect, read the greeting, and authenticate when credentials
    /// are provided.
    pub async fn connect(
        host: &str,
        port: u16,
        tls: bool,
        user: &str,
        pass: &str,
    ) -> Result<Self, NntpError> {
        tokio::time::timeout(CONNECT_TIMEOUT, Self::connect_inner(host, port, tls, user, pass))
            .await
            .map_err(|_| NntpError::Timeout)?
    }

    async fn connect_inner(
        host: &str,
        port: u16,
        tls: bool,
        user: &str,
        pass: &str,
    ) -> Result<Self, NntpError> {
        let addr = format!("{host}:{port}");
        tracing::debug!(addr = %addr, tls = tls, "Connecting to NNTP server");

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| NntpError::ConnectionFailed(e.to_string()))?;

        let stream = if tls {
            let connector = native_tls::TlsConnector::builder()
                .build()
                .map_err(|e| NntpError::Tls(e.to_string()))?;
            let connector = TlsConnector::from(connector);
            let tls_stream = connector
                .connect(host, tcp)
                .await
                .map_err(|e| NntpError::Tls(e.to_string()))?;
            NntpStream {
                inner: StreamType::Tls(Box::new(tls_stream)),
            }
        } else {
            NntpStream {
                inner: StreamType::Plain(tcp),
            }
        };

        let mut client = NntpClient {
            stream: BufReader::new(stream),
        };

        // 200 posting allowed, 201 posting prohibited.
        let greeting = client.read_response().await?;
        if !greeting.starts_with("200") && !greeting.starts_with("201") {
            return Err(NntpError::Protocol(format!(
                "Unexpected greeting: {greeting}"
            )));
        }

        if !user.is_empty() {
            client.authenticate(user, pass).await?;
        }

        Ok(client)
    }

    async fn authenticate(&mut self, user: &str, pass: &str) -> Result<(), NntpError> {
        self.send_command(&format!("AUTHINFO USER {user}")).await?;
        let response = self.read_response().await?;

        if response.starts_with("381") {
            self.send_command(&format!("AUTHINFO PASS {pass}")).await?;
            let response = self.read_response().await?;
            if !response.starts_with("281") {
                return Err(NntpError::Auth(response));
            }
        } else if !response.starts_with("281") {
            return Err(NntpError::Auth(response));
        }

        Ok(())
    }

    /// STAT an article by message-id, with the 5 second watchdog.
    pub async fn stat(&mut self, message_id: &str) -> Result<StatOutcome, NntpError> {
        tokio::time::timeout(STAT_TIMEOUT, self.stat_inner(message_id))
            .await
            .map_err(|_| NntpError::Timeout)?
    }

    async fn stat_inner(&mut self, message_id: &str) -> Result<StatOutcome, NntpError> {
        let msg_id = bracketed(message_id);
        self.send_command(&format!("STAT {msg_id}")).await?;
        let response = self.read_response().await?;

        if response.starts_with("223") {
            Ok(StatOutcome::Present)
        } else if response.starts_with("430") {
            Ok(StatOutcome::Missing)
        } else {
            Err(NntpError::Protocol(response))
        }
    }

    /// Fetch a raw article body (dot-unstuffed, line endings kept).
    pub async fn body(&mut self, message_id: &str) -> Result<Option<Vec<u8>>, NntpError> {
        tokio::time::timeout(BODY_TIMEOUT, self.body_inner(message_id))
            .await
            .map_err(|_| NntpError::Timeout)?
    }

    async fn body_inner(&mut self, message_id: &str) -> Result<Option<Vec<u8>>, NntpError> {
        let msg_id = bracketed(message_id);
        self.send_command(&format!("BODY {msg_id}")).await?;
        let response = self.read_response().await?;

        if response.starts_with("430") {
            return Ok(None);
        }
        if !response.starts_with("222") {
            return Err(NntpError::Protocol(response));
        }

        let mut body = Vec::new();
        loop {
            let mut line = Vec::new();
            let n = self.stream.read_until(b'\n', &mut line).await?;
            if n == 0 {
                return Err(NntpError::Protocol("EOF inside BODY".to_string()));
            }
            if line == b".\r\n" || line == b".\n" {
                break;
            }
            // Dot-unstuffing per RFC 3977.
            if line.starts_with(b"..") {
                body.extend_from_slice(&line[1..]);
            } else {
                body.extend_from_slice(&line);
            }
            if body.len() > MAX_BODY_BYTES {
                return Err(NntpError::Protocol("BODY exceeds size sanity cap".to_string()));
            }
        }

        Ok(Some(body))
    }

    /// BODY followed by a bounded yEnc decode.
    pub async fn body_decoded(
        &mut self,
        message_id: &str,
        max_decoded_bytes: usize,
    ) -> Result<Option<Vec<u8>>, NntpError> {
        let Some(raw) = self.body(message_id).await? else {
            return Ok(None);
        };
        match decode_yenc(&raw, max_decoded_bytes) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(YencError::MissingHeader) => {
                // Not yEnc; the raw bytes are the payload.
                Ok(Some(raw))
            }
            Err(e) => Err(NntpError::Decode(e.to_string())),
        }
    }

    /// Best-effort QUIT; errors are ignored, the connection is going
    /// away either way.
    pub async fn quit(mut self) {
        let _ = self.send_command("QUIT").await;
        let _ = self.stream.get_mut().shutdown().await;
    }

    async fn send_command(&mut self, cmd: &str) -> Result<(), NntpError> {
        self.stream.get_mut().write_all(cmd.as_bytes()).await?;
        self.stream.get_mut().write_all(b"\r\n").await?;
        self.stream.get_mut().flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<String, NntpError> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(NntpError::ConnectionFailed("EOF from server".to_string()));
        }
        Ok(line.trim_end().to_string())
    }
}

/// Wrap a message-id in angle brackets when missing.
fn bracketed(message_id: &str) -> String {
    if message_id.starts_with('<') {
        message_id.to_string()
    } else {
        format!("<{message_id}>")
    }
}
