use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Buffer size of each direction of an in-memory pair.
pub const DEFAULT_MEMORY_CAPACITY: usize = 4 * 1024;

/// A connected bus link. Implements `AsyncRead + AsyncWrite`.
///
/// Every link carries an identity string (device path, peer address, ...)
/// that stays stable for the life of the link. Discovery mixes it into the
/// device identifier so two adapters reporting the same firmware stay distinct.
pub struct BusStream {
    inner: BusStreamInner,
    identity: String,
}

enum BusStreamInner {
    Device(DeviceLink),
    Tcp(tokio::net::TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Memory(DuplexStream),
}

/// A character device opened once per direction.
///
/// A `tokio::fs::File` runs one blocking operation at a time, so a single
/// handle would hold every write behind a read waiting on an idle line.
struct DeviceLink {
    rx: tokio::fs::File,
    tx: tokio::fs::File,
}

async fn open_node(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })
}

impl BusStream {
    /// Open a serial character device for reading and writing.
    ///
    /// Line settings (baud rate, parity) are not touched; configure them with
    /// `stty` or udev before opening.
    pub async fn open_device(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rx = open_node(path).await?;
        let tx = open_node(path).await?;

        info!(path = %path.display(), "opened bus device");
        Ok(Self {
            inner: BusStreamInner::Device(DeviceLink { rx, tx }),
            identity: format!("device:{}", path.display()),
        })
    }

    /// Connect to a TCP serial bridge.
    pub async fn connect_tcp(endpoint: &str) -> Result<Self> {
        let stream = tokio::net::TcpStream::connect(endpoint)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        // Packets are five bytes; don't let Nagle hold them back.
        stream.set_nodelay(true)?;

        info!(endpoint, "connected to bus bridge");
        Ok(Self::from_tcp(stream, format!("tcp:{endpoint}")))
    }

    /// Wrap an already-connected TCP stream (e.g. one accepted by a listener).
    pub fn from_tcp(stream: tokio::net::TcpStream, identity: impl Into<String>) -> Self {
        Self {
            inner: BusStreamInner::Tcp(stream),
            identity: identity.into(),
        }
    }

    /// Connect to a Unix domain socket bridge.
    #[cfg(unix)]
    pub async fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: path.display().to_string(),
                source,
            })?;

        info!(path = %path.display(), "connected to bus socket");
        Ok(Self {
            inner: BusStreamInner::Unix(stream),
            identity: format!("unix:{}", path.display()),
        })
    }

    /// Create two connected in-memory links.
    ///
    /// Bytes written to one end are readable from the other. The identities
    /// are `memory:{name}:a` and `memory:{name}:b`.
    pub fn memory_pair(name: &str, capacity: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(capacity);
        debug!(name, capacity, "created in-memory bus pair");
        (
            Self {
                inner: BusStreamInner::Memory(a),
                identity: format!("memory:{name}:a"),
            },
            Self {
                inner: BusStreamInner::Memory(b),
                identity: format!("memory:{name}:b"),
            },
        )
    }

    /// Stable identity of this link.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Short name of the link kind.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            BusStreamInner::Device(_) => "device",
            BusStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            BusStreamInner::Unix(_) => "unix",
            BusStreamInner::Memory(_) => "memory",
        }
    }
}

impl AsyncRead for BusStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            BusStreamInner::Device(link) => Pin::new(&mut link.rx).poll_read(cx, buf),
            BusStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            BusStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            BusStreamInner::Memory(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BusStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            BusStreamInner::Device(link) => Pin::new(&mut link.tx).poll_write(cx, buf),
            BusStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            BusStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            BusStreamInner::Memory(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            BusStreamInner::Device(link) => Pin::new(&mut link.tx).poll_flush(cx),
            BusStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            BusStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            BusStreamInner::Memory(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            BusStreamInner::Device(link) => Pin::new(&mut link.tx).poll_shutdown(cx),
            BusStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            BusStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            BusStreamInner::Memory(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for BusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusStream")
            .field("type", &self.kind())
            .field("identity", &self.identity)
            .finish()
    }
}
