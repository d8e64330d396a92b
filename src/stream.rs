//! Connection stream that can change clothes mid-session.
//!
//! STARTTLS (inbound SMTP, IMAP) and the outbound delivery client all start
//! on a bare TCP connection and may wrap it in TLS later. `MailStream` holds
//! whichever layer is currently active; while a handshake is in flight the
//! socket is lent out to the TLS library and the stream sits in `Detached`,
//! where any I/O resolves to a `NotConnected` error rather than touching a
//! connection that no longer exists.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client, server};

pub enum MailStream {
    Plain(TcpStream),
    ServerTls(Box<server::TlsStream<TcpStream>>),
    ClientTls(Box<client::TlsStream<TcpStream>>),
    /// Socket currently lent out for a TLS handshake.
    Detached,
}

fn detached() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "stream handed off for TLS handshake",
    )
}

impl MailStream {
    /// Pull the raw TCP stream out ahead of a TLS handshake, leaving the
    /// stream `Detached`. Yields `None` (and changes nothing) when the
    /// connection is already encrypted.
    pub fn take_plain(&mut self) -> Option<TcpStream> {
        match std::mem::replace(self, MailStream::Detached) {
            MailStream::Plain(tcp) => Some(tcp),
            already_tls => {
                *self = already_tls;
                None
            }
        }
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match Pin::into_inner(self) {
            Self::Plain(tcp) => Pin::new(tcp).poll_read(cx, buf),
            Self::ServerTls(tls) => Pin::new(tls).poll_read(cx, buf),
            Self::ClientTls(tls) => Pin::new(tls).poll_read(cx, buf),
            Self::Detached => Poll::Ready(Err(detached())),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match Pin::into_inner(self) {
            Self::Plain(tcp) => Pin::new(tcp).poll_write(cx, buf),
            Self::ServerTls(tls) => Pin::new(tls).poll_write(cx, buf),
            Self::ClientTls(tls) => Pin::new(tls).poll_write(cx, buf),
            Self::Detached => Poll::Ready(Err(detached())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::into_inner(self) {
            Self::Plain(tcp) => Pin::new(tcp).poll_flush(cx),
            Self::ServerTls(tls) => Pin::new(tls).poll_flush(cx),
            Self::ClientTls(tls) => Pin::new(tls).poll_flush(cx),
            Self::Detached => Poll::Ready(Err(detached())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::into_inner(self) {
            Self::Plain(tcp) => Pin::new(tcp).poll_shutdown(cx),
            Self::ServerTls(tls) => Pin::new(tls).poll_shutdown(cx),
            Self::ClientTls(tls) => Pin::new(tls).poll_shutdown(cx),
            Self::Detached => Poll::Ready(Err(detached())),
        }
    }
}
