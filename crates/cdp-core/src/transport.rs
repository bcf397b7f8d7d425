use crate::error::{CdpError, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream a peer connection runs over.
/// TCP in production; in-memory duplex pipes in tests.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Get remote peer address
    fn peer_addr(&self) -> Result<SocketAddr>;

    /// Get local address
    fn local_addr(&self) -> Result<SocketAddr>;
}

impl Transport for tokio::net::TcpStream {
    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(tokio::net::TcpStream::peer_addr(self)?)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(tokio::net::TcpStream::local_addr(self)?)
    }
}

impl Transport for tokio::io::DuplexStream {
    fn peer_addr(&self) -> Result<SocketAddr> {
        Err(CdpError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "in-memory transport has no address",
        )))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.peer_addr()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn peer_addr(&self) -> Result<SocketAddr> {
        (**self).peer_addr()
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        (**self).local_addr()
    }
}
