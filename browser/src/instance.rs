use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use wire::{ArgumentBatch, MAX_LINE_BYTES};

use crate::consts::{CONNECT_TIMEOUT, READ_TIMEOUT, WRITE_TIMEOUT};
use crate::endpoint::Endpoint;

/// Bounds for the blocking waits of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            read: READ_TIMEOUT,
            write: WRITE_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("timed out connecting to {}", .0.display())]
    ConnectTimeout(PathBuf),
    #[error("endpoint {} is already bound", .path.display())]
    BindConflict {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no forwarded arguments within {0:?}")]
    ReadTimeout(Duration),
    #[error("connection closed before any data arrived")]
    NothingReceived,
    #[error("forwarding arguments to the primary instance failed")]
    Forward(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub enum InstanceRole {
    /// This process owns the endpoint and hosts the windows.
    Primary(PrimaryInstance),
    /// The arguments were handed to a running instance; nothing left to do.
    Secondary,
}

impl std::fmt::Debug for InstanceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceRole::Primary(p) => write!(f, "Primary({})", p.endpoint.path().display()),
            InstanceRole::Secondary => write!(f, "Secondary"),
        }
    }
}

/// Decide whether this process is the primary instance.
///
/// A reachable endpoint makes us secondary: `batch` is forwarded as one line
/// and the caller is expected to exit. Anything else (no socket, refused,
/// timeout) makes us primary and binds the endpoint.
pub async fn determine_role(
    endpoint: &Endpoint,
    batch: &ArgumentBatch,
    timeouts: &Timeouts,
) -> Result<InstanceRole, CoordinatorError> {
    match connect_primary(endpoint, timeouts.connect).await {
        Ok(stream) => {
            log::info!(
                "instance: primary found endpoint={} args={}",
                endpoint.path().display(),
                batch.len()
            );
            forward_batch(stream, batch, timeouts.write).await?;
            Ok(InstanceRole::Secondary)
        }
        Err(e) => {
            log::debug!("instance: no primary reachable ({e}), binding");
            PrimaryInstance::bind(endpoint).map(InstanceRole::Primary)
        }
    }
}

async fn connect_primary(
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<UnixStream, CoordinatorError> {
    match tokio::time::timeout(timeout, UnixStream::connect(endpoint.path())).await {
        Ok(r) => Ok(r?),
        Err(_) => Err(CoordinatorError::ConnectTimeout(endpoint.path().to_path_buf())),
    }
}

async fn forward_batch(
    mut stream: UnixStream,
    batch: &ArgumentBatch,
    timeout: Duration,
) -> Result<(), CoordinatorError> {
    let line = batch.to_line();
    log::debug!("forward: bytes={}", line.len());

    let write = async {
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CoordinatorError::Forward(e)),
        Err(_) => Err(CoordinatorError::Forward(io::Error::new(
            io::ErrorKind::TimedOut,
            "write timed out",
        ))),
    }
}

/// Bound endpoint of the primary instance. Dropping it releases the name.
pub struct PrimaryInstance {
    listener: UnixListener,
    endpoint: Endpoint,
    // (dev, ino) of the socket file this instance created.
    socket_id: Option<(u64, u64)>,
}

fn file_id(path: &Path) -> Option<(u64, u64)> {
    std::fs::symlink_metadata(path)
        .ok()
        .map(|m| (m.dev(), m.ino()))
}

impl PrimaryInstance {
    /// Bind the endpoint socket.
    ///
    /// A leftover socket file from a dead primary is removed and the bind is
    /// retried once. A live primary that lost the connect race looks exactly
    /// the same and gets its path taken over; that race is not guarded.
    pub fn bind(endpoint: &Endpoint) -> Result<Self, CoordinatorError> {
        let path = endpoint.path();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let listener = match UnixListener::bind(path) {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && path.exists() => {
                log::warn!("instance: removing stale endpoint path={}", path.display());
                let _ = std::fs::remove_file(path);
                UnixListener::bind(path).map_err(|source| CoordinatorError::BindConflict {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("instance: primary bound endpoint={}", path.display());
        Ok(Self {
            listener,
            endpoint: endpoint.clone(),
            socket_id: file_id(path),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Next pending secondary, in accept order.
    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

impl Drop for PrimaryInstance {
    fn drop(&mut self) {
        // Only unlink our own socket; the path may belong to a newer primary by now.
        let path = self.endpoint.path();
        if self.socket_id.is_some() && file_id(path) == self.socket_id {
            let _ = std::fs::remove_file(path);
        } else {
            log::debug!(
                "instance: endpoint path={} taken over, leaving it",
                path.display()
            );
        }
    }
}

/// Read the one line a secondary sends and decode it.
///
/// Damaged payloads are not an error: they decode to whatever could be
/// recovered (possibly nothing).
pub async fn read_forwarded(
    stream: UnixStream,
    timeouts: &Timeouts,
) -> Result<ArgumentBatch, CoordinatorError> {
    let mut reader = BufReader::new(stream.take(MAX_LINE_BYTES as u64));
    let mut buf = Vec::new();

    let n = match tokio::time::timeout(timeouts.read, reader.read_until(b'\n', &mut buf)).await {
        Ok(r) => r?,
        Err(_) => return Err(CoordinatorError::ReadTimeout(timeouts.read)),
    };
    if n == 0 {
        return Err(CoordinatorError::NothingReceived);
    }

    let text = String::from_utf8_lossy(&buf);
    let (batch, err) = ArgumentBatch::decode_lossy(&text);
    if let Some(e) = err {
        log::warn!(
            "instance: forwarded batch damaged kept={} err={}",
            batch.len(),
            e
        );
    }
    log::debug!("instance: received bytes={} args={}", n, batch.len());
    Ok(batch)
}
