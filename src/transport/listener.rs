//! Listening sockets for the FastCGI host.
//!
//! - Inherited: the socket the host passes as file descriptor 0 (Unix only)
//! - Unix Domain Socket bound to a path
//! - TCP address
//!
//! # Example
//!
//! ```no_run
//! use funcwire::transport::{ListenAddr, Listener};
//!
//! # async fn run() -> funcwire::Result<()> {
//! let addr: ListenAddr = "unix:/tmp/funcwire.sock".parse()?;
//! let listener = Listener::bind(&addr).await?;
//! let (reader, writer) = listener.accept().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::error::{FuncwireError, Result};

/// Read half of an accepted connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an accepted connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where to listen for the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListenAddr {
    /// The listening socket inherited as file descriptor 0.
    #[default]
    Inherited,
    /// A Unix Domain Socket path.
    Unix(PathBuf),
    /// A TCP address such as `127.0.0.1:9000`.
    Tcp(String),
}

impl FromStr for ListenAddr {
    type Err = FuncwireError;

    /// Accepts `fd:0`, `unix:<path>`, `tcp:<addr>`, a bare absolute path or a
    /// bare `host:port`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "fd:0" {
            return Ok(Self::Inherited);
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(FuncwireError::Config("empty unix socket path".to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return Self::tcp(addr);
        }
        if s.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }
        Self::tcp(s)
    }
}

impl ListenAddr {
    fn tcp(addr: &str) -> Result<Self> {
        match addr.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => Ok(Self::Tcp(addr.to_string())),
            _ => Err(FuncwireError::Config(format!(
                "invalid listen address {:?}",
                addr
            ))),
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherited => f.write_str("fd:0"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

enum Inner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

/// Removes the socket file on drop.
struct SocketCleanup {
    path: PathBuf,
}

impl Drop for SocketCleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A bound listener.
pub struct Listener {
    inner: Inner,
    addr: ListenAddr,
    _cleanup: Option<SocketCleanup>,
}

impl Listener {
    /// Bind to `addr`.
    ///
    /// A Unix socket path has any stale socket file removed first and is
    /// removed again when the listener is dropped.
    pub async fn bind(addr: &ListenAddr) -> Result<Self> {
        let (inner, cleanup) = match addr {
            ListenAddr::Tcp(tcp) => (Inner::Tcp(TcpListener::bind(tcp.as_str()).await?), None),
            ListenAddr::Unix(path) => bind_unix(path)?,
            ListenAddr::Inherited => (inherit_fd0()?, None),
        };
        tracing::debug!("Listening on {}", addr);
        Ok(Self {
            inner,
            addr: addr.clone(),
            _cleanup: cleanup,
        })
    }

    /// Accept a single connection and split it.
    pub async fn accept(&self) -> Result<(BoxedReader, BoxedWriter)> {
        match &self.inner {
            Inner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                tracing::trace!("Accepted TCP connection from {}", peer);
                let _ = stream.set_nodelay(true);
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            #[cfg(unix)]
            Inner::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }

    /// The address this listener was bound with.
    pub fn addr(&self) -> &ListenAddr {
        &self.addr
    }

    /// The local TCP address, if this is a TCP listener.
    pub fn tcp_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.inner {
            Inner::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Inner::Unix(_) => None,
        }
    }
}

#[cfg(unix)]
fn bind_unix(path: &std::path::Path) -> Result<(Inner, Option<SocketCleanup>)> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = tokio::net::UnixListener::bind(path)?;
    let cleanup = SocketCleanup {
        path: path.to_path_buf(),
    };
    Ok((Inner::Unix(listener), Some(cleanup)))
}

#[cfg(not(unix))]
fn bind_unix(path: &std::path::Path) -> Result<(Inner, Option<SocketCleanup>)> {
    Err(FuncwireError::UnsupportedListener(format!(
        "unix socket {} is not supported on this platform",
        path.display()
    )))
}

/// Adopt the listening socket passed as fd 0, Unix or TCP.
#[cfg(unix)]
fn inherit_fd0() -> Result<Inner> {
    use std::os::unix::io::{FromRawFd, IntoRawFd};

    // SAFETY: fd 0 is owned by this process for its whole lifetime and is
    // only adopted here, once, at start-up.
    let unix = unsafe { std::os::unix::net::UnixListener::from_raw_fd(0) };
    if unix.local_addr().is_ok() {
        unix.set_nonblocking(true)?;
        return Ok(Inner::Unix(tokio::net::UnixListener::from_std(unix)?));
    }

    // SAFETY: ownership of the same descriptor moves from the Unix wrapper.
    let tcp = unsafe { std::net::TcpListener::from_raw_fd(unix.into_raw_fd()) };
    match tcp.local_addr() {
        Ok(_) => {
            tcp.set_nonblocking(true)?;
            Ok(Inner::Tcp(TcpListener::from_std(tcp)?))
        }
        Err(e) => {
            // Leave stdin open for whoever else uses it.
            let _ = tcp.into_raw_fd();
            Err(not_a_listener(e))
        }
    }
}

#[cfg(unix)]
fn not_a_listener(e: std::io::Error) -> FuncwireError {
    FuncwireError::UnsupportedListener(format!(
        "fd 0 is not a listening socket ({}); it is probably a terminal or a pipe, \
         so start the process from a FastCGI host or set {}",
        e,
        crate::config::ENV_LISTEN
    ))
}

#[cfg(not(unix))]
fn inherit_fd0() -> Result<Inner> {
    Err(FuncwireError::UnsupportedListener(
        "inherited listeners require a Unix platform".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!("".parse::<ListenAddr>().unwrap(), ListenAddr::Inherited);
        assert_eq!("fd:0".parse::<ListenAddr>().unwrap(), ListenAddr::Inherited);
        assert_eq!(
            "unix:/run/app.sock".parse::<ListenAddr>().unwrap(),
            ListenAddr::Unix(PathBuf::from("/run/app.sock"))
        );
        assert_eq!(
            "/run/app.sock".parse::<ListenAddr>().unwrap(),
            ListenAddr::Unix(PathBuf::from("/run/app.sock"))
        );
        assert_eq!(
            "tcp:127.0.0.1:9000".parse::<ListenAddr>().unwrap(),
            ListenAddr::Tcp("127.0.0.1:9000".to_string())
        );
        assert_eq!(
            "localhost:9000".parse::<ListenAddr>().unwrap(),
            ListenAddr::Tcp("localhost:9000".to_string())
        );
    }

    #[test]
    fn test_parse_listen_addr_errors() {
        assert!("unix:".parse::<ListenAddr>().is_err());
        assert!("tcp:nowhere".parse::<ListenAddr>().is_err());
        assert!("host:port".parse::<ListenAddr>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for addr in [
            ListenAddr::Inherited,
            ListenAddr::Unix(PathBuf::from("/tmp/x.sock")),
            ListenAddr::Tcp("0.0.0.0:80".to_string()),
        ] {
            assert_eq!(addr.to_string().parse::<ListenAddr>().unwrap(), addr);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_fd0_error_names_the_likely_cause() {
        let err = not_a_listener(std::io::Error::from_raw_os_error(88));
        let message = err.to_string();
        assert!(matches!(err, FuncwireError::UnsupportedListener(_)));
        assert!(message.contains("terminal or a pipe"));
        assert!(message.contains("FUNCWIRE_LISTEN"));
    }

    #[tokio::test]
    async fn test_tcp_listener_accepts() {
        let listener = Listener::bind(&ListenAddr::Tcp("127.0.0.1:0".to_string()))
            .await
            .unwrap();
        let local = listener.tcp_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(local).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
        });

        let (mut reader, _writer) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        client.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_listener_replaces_stale_file_and_cleans_up() {
        let path = std::env::temp_dir().join(format!("funcwire-test-{}.sock", std::process::id()));
        std::fs::write(&path, b"stale").unwrap();

        let listener = Listener::bind(&ListenAddr::Unix(path.clone())).await.unwrap();
        assert!(listener.tcp_addr().is_none());

        let connect = path.clone();
        let client = tokio::spawn(async move {
            let mut stream = tokio::net::UnixStream::connect(connect).await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (_reader, mut writer) = listener.accept().await.unwrap();
        writer.write_all(b"pong").await.unwrap();
        assert_eq!(&client.await.unwrap(), b"pong");

        drop(listener);
        assert!(!path.exists());
    }
}
